// ABOUTME: Hostbased authentication using the type state pattern.
// ABOUTME: Exports the attempt states, request builder, and the HostbasedAuth method.

mod error;
mod flow;
mod request;
mod state;

pub use error::HostbasedError;
pub use flow::{Attempt, AuthOutcome, Failed, Fallback, HostbasedAuth};
pub use request::{AuthSession, METHOD_NAME, SERVICE_NAME, SigningRequest};
pub use state::{
    AttemptState, AwaitingHelper, BuildingRequest, Init, State, Submitting, ValidatingResponse,
};

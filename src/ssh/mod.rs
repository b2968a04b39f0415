// ABOUTME: russh-backed SSH session used by the CLI.
// ABOUTME: Implements the Transport seam and falls back to publickey after hostbased.

mod client;
mod error;
mod exec;
mod publickey;
mod transport;

pub use client::{Session, SessionConfig};
pub use error::{Error, Result};
pub use exec::CommandOutput;

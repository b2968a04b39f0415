// ABOUTME: Signing helper (ssh-keysign) process management.
// ABOUTME: Spawns the helper with the connection socket and exchanges one request.

mod error;
mod process;

pub use error::{ExitFailure, HelperError};
pub use process::{
    DEFAULT_HELPER_FD, DEFAULT_HELPER_TIMEOUT, DEFAULT_KEYSIGN_PATH, HelperConfig, HelperProcess,
};

// ABOUTME: Errors local to one hostbased attempt.
// ABOUTME: All of them turn into a fallback outcome; none ends the connection.

use crate::helper::HelperError;
use crate::identity::LookupError;
use crate::wire::FormatError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostbasedError {
    #[error("transport does not expose {0}")]
    Capability(&'static str),

    #[error("local identity lookup failed: {0}")]
    Lookup(#[from] LookupError),

    #[error("signing helper failed: {0}")]
    Helper(#[from] HelperError),

    #[error("malformed helper response: {0}")]
    Format(#[from] FormatError),

    #[error("helper answered with protocol version {actual}, expected {expected}")]
    ProtocolVersion { expected: u8, actual: u8 },
}

impl HostbasedError {
    /// Message for the user. Helper stderr is passed through unchanged.
    pub fn diagnostic(&self) -> String {
        match self {
            HostbasedError::Helper(e) => e.diagnostic(),
            other => other.to_string(),
        }
    }
}

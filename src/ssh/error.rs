// ABOUTME: Errors of the russh-backed session.
// ABOUTME: Connection setup, authentication outcome, and remote command failures.

use crate::transport::TransportError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot connect to {0}")]
    Connection(String),

    #[error("server did not present a host key")]
    NoHostKey,

    #[error("authentication failed (server still permits: {})", .0.join(", "))]
    AuthenticationFailed(Vec<String>),

    #[error("no publickey credentials: {0}")]
    NoCredentials(String),

    #[error("cannot load key {}: {reason}", .path.display())]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("remote command failed: {0}")]
    CommandFailed(String),

    #[error("remote command did not finish within {0:?}")]
    CommandTimeout(Duration),

    #[error("channel closed before the command reported an exit status")]
    ChannelClosed,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

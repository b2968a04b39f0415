// ABOUTME: The SSH transport capabilities the hostbased method depends on.
// ABOUTME: Also holds the one-shot host key capture filled during key exchange.

mod host_key;

pub use host_key::{HostKeyBlob, HostKeyCapture};

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::os::fd::BorrowedFd;
use thiserror::Error;

/// Connection-level failures. These end the connection, not just one method.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("transport does not support {0}")]
    Unsupported(&'static str),

    #[error("SSH protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The server's reply to a submitted userauth request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResponse {
    Accepted,
    Rejected {
        methods: Vec<String>,
        partial_success: bool,
    },
}

impl AuthResponse {
    pub fn success(&self) -> bool {
        matches!(self, AuthResponse::Accepted)
    }

    /// Methods that can continue authentication. Empty once accepted.
    pub fn methods(&self) -> &[String] {
        match self {
            AuthResponse::Accepted => &[],
            AuthResponse::Rejected { methods, .. } => methods,
        }
    }
}

/// What an authentication method needs from an established SSH transport.
///
/// Optional capabilities return `None` when the underlying implementation
/// cannot provide them.
#[async_trait]
pub trait Transport: Send {
    /// Exchange hash of the first key exchange.
    fn session_id(&self) -> Option<Bytes>;

    /// Negotiated server host key algorithm, e.g. `ssh-ed25519`.
    fn host_key_algorithm(&self) -> String;

    /// Local endpoint of the connection.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Raw socket descriptor of the connection, if the platform exposes one.
    fn socket_fd(&self) -> Option<BorrowedFd<'_>>;

    /// Send one payload over the encrypted packet connection.
    async fn write_packet(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Read and interpret the server's answer to the last userauth request.
    async fn read_auth_response(&mut self) -> Result<AuthResponse, TransportError>;

    /// Send a "none" request for `user`. The server either accepts it outright
    /// or rejects it with the methods it still permits.
    async fn permitted_methods(&mut self, user: &str) -> Result<AuthResponse, TransportError>;
}

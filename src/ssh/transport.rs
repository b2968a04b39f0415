// ABOUTME: Exposes a russh session through the Transport trait.
// ABOUTME: Capabilities russh keeps private are reported as absent or unsupported.

use super::client::Session;
use crate::transport::{AuthResponse, Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use russh::client::AuthResult;
use std::net::SocketAddr;
use std::os::fd::{AsFd, BorrowedFd};

#[async_trait]
impl Transport for Session {
    /// russh does not expose the exchange hash.
    fn session_id(&self) -> Option<Bytes> {
        None
    }

    fn host_key_algorithm(&self) -> String {
        self.host_key.algorithm().unwrap_or_default()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }

    fn socket_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.socket.as_fd())
    }

    async fn write_packet(&mut self, _payload: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("raw userauth packets"))
    }

    async fn read_auth_response(&mut self) -> Result<AuthResponse, TransportError> {
        Err(TransportError::Unsupported("raw userauth responses"))
    }

    async fn permitted_methods(&mut self, user: &str) -> Result<AuthResponse, TransportError> {
        let result = self
            .handle
            .authenticate_none(user)
            .await
            .map_err(|e| TransportError::Protocol(e.to_string()))?;

        Ok(match result {
            AuthResult::Success => {
                tracing::info!("server accepted \"none\" authentication for {}", user);
                AuthResponse::Accepted
            }
            AuthResult::Failure {
                remaining_methods,
                partial_success,
            } => AuthResponse::Rejected {
                methods: remaining_methods.iter().map(String::from).collect(),
                partial_success,
            },
        })
    }
}

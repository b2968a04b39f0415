// ABOUTME: Builds the signing request handed to ssh-keysign.
// ABOUTME: The signed message is kept so the final packet can reuse its exact fields.

use crate::identity::LocalIdentity;
use crate::transport::HostKeyBlob;
use crate::wire::{
    Envelope, PROTOCOL_VERSION, SSH_MSG_USERAUTH_REQUEST, Sign, SignMessage, encode,
};
use bytes::Bytes;

pub const SERVICE_NAME: &str = "ssh-connection";
pub const METHOD_NAME: &str = "hostbased";

/// Per-attempt facts about the connection and the claimed client identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub session_id: Bytes,
    pub user: String,
    pub service: String,
    pub host_algorithm: String,
    pub local_hostname: String,
    pub local_username: String,
}

impl AuthSession {
    pub fn new(
        session_id: Bytes,
        user: impl Into<String>,
        host_algorithm: impl Into<String>,
        identity: LocalIdentity,
    ) -> Self {
        Self {
            session_id,
            user: user.into(),
            service: SERVICE_NAME.to_string(),
            host_algorithm: host_algorithm.into(),
            local_hostname: identity.hostname,
            local_username: identity.username,
        }
    }
}

/// An encoded SigningEnvelope together with the message it carries.
#[derive(Debug, Clone)]
pub struct SigningRequest {
    message: SignMessage,
    encoded: Bytes,
}

impl SigningRequest {
    /// Assemble `Envelope{ Sign{ version, fd, SignMessage } }`.
    pub fn build(session: &AuthSession, host_key: &HostKeyBlob, fd: u32) -> Self {
        let message = SignMessage {
            session: session.session_id.clone(),
            msgtype: SSH_MSG_USERAUTH_REQUEST,
            user: session.user.clone(),
            service: session.service.clone(),
            method: METHOD_NAME.to_string(),
            host_algorithm: session.host_algorithm.clone(),
            host_key: host_key.as_bytes().clone(),
            local_hostname: session.local_hostname.clone(),
            local_username: session.local_username.clone(),
        };
        let sign = Sign {
            version: PROTOCOL_VERSION,
            fd,
            payload: encode(&message),
        };
        let encoded = encode(&Envelope::wrap(&sign));

        Self { message, encoded }
    }

    pub fn message(&self) -> &SignMessage {
        &self.message
    }

    /// Bytes written to the helper's stdin.
    pub fn encoded(&self) -> &Bytes {
        &self.encoded
    }
}

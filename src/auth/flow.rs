// ABOUTME: Drives one hostbased attempt from transport facts to the submitted packet.
// ABOUTME: Attempt-local failures become a Fallback outcome carrying the server's answer to "none".

use super::error::HostbasedError;
use super::request::{AuthSession, METHOD_NAME, SigningRequest};
use super::state::{
    AttemptState, AwaitingHelper, BuildingRequest, Init, State, Submitting, ValidatingResponse,
};
use crate::helper::{HelperConfig, HelperProcess};
use crate::identity::{IdentityResolver, LocalIdentity, SystemResolver};
use crate::transport::{AuthResponse, HostKeyBlob, Transport, TransportError};
use crate::wire::{Envelope, FinalAuthPacket, FormatError, PROTOCOL_VERSION, Signed, decode, encode};
use std::os::fd::BorrowedFd;
use std::sync::Arc;

/// A hostbased attempt in state `S`.
#[derive(Debug)]
pub struct Attempt<S> {
    state: S,
}

/// An attempt-local failure and the stage it happened in.
#[derive(Debug)]
pub struct Failed {
    pub stage: AttemptState,
    pub error: HostbasedError,
}

impl<S: State> Attempt<S> {
    fn fail(error: impl Into<HostbasedError>) -> Failed {
        Failed {
            stage: S::STAGE,
            error: error.into(),
        }
    }

    pub fn stage(&self) -> AttemptState {
        S::STAGE
    }
}

// =============================================================================
// Init -> BuildingRequest
// =============================================================================

impl Attempt<Init> {
    /// Read what the attempt needs from the transport.
    pub fn start<T: Transport + ?Sized>(transport: &T, user: &str) -> Self {
        Self {
            state: Init {
                user: user.to_string(),
                session_id: transport.session_id(),
                host_algorithm: transport.host_key_algorithm(),
                local_addr: transport.local_addr(),
            },
        }
    }

    /// Check that the transport exposed every capability the request needs.
    pub fn capture(self) -> Result<Attempt<BuildingRequest>, Failed> {
        let Init {
            user,
            session_id,
            host_algorithm,
            local_addr,
        } = self.state;

        let session_id =
            session_id.ok_or_else(|| Self::fail(HostbasedError::Capability("a session identifier")))?;
        let local_addr =
            local_addr.ok_or_else(|| Self::fail(HostbasedError::Capability("a local address")))?;

        Ok(Attempt {
            state: BuildingRequest {
                user,
                session_id,
                host_algorithm,
                local_addr,
            },
        })
    }
}

// =============================================================================
// BuildingRequest -> AwaitingHelper
// =============================================================================

impl Attempt<BuildingRequest> {
    /// Resolve the local identity and encode the signing request.
    pub async fn build_request(
        self,
        host_key: &HostKeyBlob,
        helper_fd: u32,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Result<Attempt<AwaitingHelper>, Failed> {
        let BuildingRequest {
            user,
            session_id,
            host_algorithm,
            local_addr,
        } = self.state;

        let identity = LocalIdentity::resolve(resolver, Some(local_addr))
            .await
            .map_err(Self::fail)?;
        let session = AuthSession::new(session_id, user, host_algorithm, identity);
        let request = SigningRequest::build(&session, host_key, helper_fd);

        Ok(Attempt {
            state: AwaitingHelper { request },
        })
    }
}

// =============================================================================
// AwaitingHelper -> ValidatingResponse
// =============================================================================

impl Attempt<AwaitingHelper> {
    pub fn request(&self) -> &SigningRequest {
        &self.state.request
    }

    /// Run the signing helper on the encoded request.
    pub async fn run_helper(
        self,
        helper: &HelperProcess,
        socket: Option<BorrowedFd<'_>>,
    ) -> Result<Attempt<ValidatingResponse>, Failed> {
        let socket =
            socket.ok_or_else(|| Self::fail(HostbasedError::Capability("a socket descriptor")))?;

        let response = helper
            .run(socket, self.state.request.encoded())
            .await
            .map_err(Self::fail)?;

        Ok(Attempt {
            state: ValidatingResponse {
                request: self.state.request,
                response,
            },
        })
    }
}

// =============================================================================
// ValidatingResponse -> Submitting
// =============================================================================

impl Attempt<ValidatingResponse> {
    /// Peel the envelope, check the version, and attach the signature.
    pub fn validate(self) -> Result<Attempt<Submitting>, Failed> {
        let envelope: Envelope = decode(&self.state.response).map_err(Self::fail)?;

        let version = *envelope.payload.first().ok_or_else(|| {
            Self::fail(FormatError::Truncated {
                offset: 0,
                needed: 1,
                available: 0,
            })
        })?;
        if version != PROTOCOL_VERSION {
            return Err(Self::fail(HostbasedError::ProtocolVersion {
                expected: PROTOCOL_VERSION,
                actual: version,
            }));
        }

        let signed: Signed = envelope.open().map_err(Self::fail)?;
        let packet = FinalAuthPacket::from_request(self.state.request.message(), signed.payload);

        Ok(Attempt {
            state: Submitting { packet },
        })
    }
}

// =============================================================================
// Submitting -> Success
// =============================================================================

impl Attempt<Submitting> {
    pub fn packet(&self) -> &FinalAuthPacket {
        &self.state.packet
    }

    /// Send the packet and let the transport interpret the server's reply.
    ///
    /// Errors here are connection-level and are not retried.
    pub async fn submit<T: Transport + ?Sized>(
        self,
        transport: &mut T,
    ) -> Result<AuthResponse, TransportError> {
        transport.write_packet(&encode(&self.state.packet)).await?;
        transport.read_auth_response().await
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// How a hostbased attempt ended.
#[derive(Debug)]
pub enum AuthOutcome {
    /// The packet was submitted; the server's verdict is inside.
    Completed(AuthResponse),
    /// No usable credentials were produced. The server's answer to a
    /// "none" request says what to try next.
    Fallback(Fallback),
}

#[derive(Debug)]
pub struct Fallback {
    pub stage: AttemptState,
    pub error: HostbasedError,
    pub response: AuthResponse,
}

impl Fallback {
    pub fn diagnostic(&self) -> String {
        self.error.diagnostic()
    }

    /// The server let the user in on the "none" request alone.
    pub fn authenticated(&self) -> bool {
        self.response.success()
    }

    pub fn methods(&self) -> &[String] {
        self.response.methods()
    }
}

/// The hostbased authentication method for one connection.
pub struct HostbasedAuth {
    host_key: HostKeyBlob,
    helper: HelperProcess,
    resolver: Arc<dyn IdentityResolver>,
}

impl std::fmt::Debug for HostbasedAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostbasedAuth")
            .field("host_key_len", &self.host_key.len())
            .field("helper", &self.helper)
            .field("resolver", &"<dyn IdentityResolver>")
            .finish()
    }
}

impl HostbasedAuth {
    /// `host_key` is the key captured during the connection's key exchange.
    pub fn new(host_key: HostKeyBlob, helper: HelperConfig) -> Self {
        Self {
            host_key,
            helper: HelperProcess::new(helper),
            resolver: Arc::new(SystemResolver),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn method(&self) -> &'static str {
        METHOD_NAME
    }

    /// Run one attempt for `user`.
    ///
    /// Returns `Err` only for connection-level failures; everything else is
    /// reported as `AuthOutcome::Fallback`.
    pub async fn authenticate<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        user: &str,
    ) -> Result<AuthOutcome, TransportError> {
        let prepared = self.prepare(transport, user).await;

        match prepared {
            Ok(attempt) => {
                tracing::debug!(state = %attempt.stage(), "sending hostbased userauth request");
                let response = attempt.submit(transport).await?;
                tracing::debug!(
                    state = %AttemptState::Success,
                    accepted = response.success(),
                    "server answered hostbased request"
                );
                Ok(AuthOutcome::Completed(response))
            }
            Err(failed) => self.fallback(transport, user, failed).await,
        }
    }

    async fn prepare<T: Transport + ?Sized>(
        &self,
        transport: &T,
        user: &str,
    ) -> Result<Attempt<Submitting>, Failed> {
        let attempt = Attempt::start(transport, user);
        tracing::debug!(state = %attempt.stage(), %user, "starting hostbased attempt");
        let attempt = attempt.capture()?;

        tracing::debug!(state = %attempt.stage(), "building signing request");
        let helper_fd = self.helper.config().socket_fd as u32;
        let attempt = attempt
            .build_request(&self.host_key, helper_fd, Arc::clone(&self.resolver))
            .await?;

        tracing::debug!(state = %attempt.stage(), "waiting for signing helper");
        let attempt = attempt
            .run_helper(&self.helper, transport.socket_fd())
            .await?;

        tracing::debug!(state = %attempt.stage(), "validating helper response");
        attempt.validate()
    }

    async fn fallback<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        user: &str,
        failed: Failed,
    ) -> Result<AuthOutcome, TransportError> {
        tracing::warn!(
            state = %AttemptState::Fallback,
            failed_in = %failed.stage,
            "hostbased authentication unavailable: {}",
            failed.error.diagnostic()
        );
        let response = transport.permitted_methods(user).await?;

        Ok(AuthOutcome::Fallback(Fallback {
            stage: failed.stage,
            error: failed.error,
            response,
        }))
    }
}

// ABOUTME: russh connection setup with host key capture and the authentication order.
// ABOUTME: The TCP socket is opened here so the signing helper can be handed a duplicate.

use super::error::{Error, Result};
use crate::auth::{AuthOutcome, HostbasedAuth};
use crate::helper::HelperConfig;
use crate::transport::{AuthResponse, HostKeyBlob, HostKeyCapture};
use russh::client::{self, Handle};
use russh::keys::ssh_key;
use russh::Disconnect;
use std::net::SocketAddr;
use std::os::fd::{AsFd, OwnedFd};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

/// How long to wait for key exchange to deliver the server host key.
const HOST_KEY_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Where to connect, as whom, and how to authenticate.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    /// Remote account to log in as.
    pub user: String,
    /// Signing helper used for hostbased authentication.
    pub helper: HelperConfig,
    /// Keys for publickey fallback. Empty means agent, then `~/.ssh` defaults.
    pub identity_files: Vec<PathBuf>,
    pub command_timeout: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            helper: HelperConfig::default(),
            identity_files: Vec::new(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn helper(mut self, helper: HelperConfig) -> Self {
        self.helper = helper;
        self
    }

    pub fn identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_files.push(path.into());
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// russh callback target. Records the host key instead of judging it.
pub(crate) struct SshHandler {
    capture: HostKeyCapture,
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let blob = match server_public_key.to_bytes() {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!("cannot encode server host key: {}", e);
                return Ok(false);
            }
        };
        tracing::debug!(
            algorithm = %server_public_key.algorithm(),
            "captured server host key"
        );
        self.capture.record(HostKeyBlob::new(blob));
        Ok(true)
    }
}

/// What the session does once the hostbased attempt is over.
#[derive(Debug, PartialEq, Eq)]
enum NextStep {
    /// The server accepted the user; carries the method that did it.
    Authenticated(&'static str),
    Publickey(Vec<String>),
    /// Nothing this client can offer is still permitted.
    GiveUp(Vec<String>),
}

fn next_step(outcome: AuthOutcome) -> NextStep {
    let remaining = match outcome {
        AuthOutcome::Completed(AuthResponse::Accepted) => {
            return NextStep::Authenticated("hostbased");
        }
        AuthOutcome::Completed(AuthResponse::Rejected { methods, .. }) => {
            tracing::warn!("server rejected hostbased authentication");
            methods
        }
        AuthOutcome::Fallback(fallback) => {
            tracing::warn!("hostbased authentication failed: {}", fallback.diagnostic());
            if fallback.authenticated() {
                return NextStep::Authenticated("none");
            }
            fallback.methods().to_vec()
        }
    };

    tracing::debug!(methods = ?remaining, "methods the server still permits");
    if remaining.iter().any(|m| m == "publickey") {
        NextStep::Publickey(remaining)
    } else {
        NextStep::GiveUp(remaining)
    }
}

/// An SSH connection past key exchange.
pub struct Session {
    pub(super) config: SessionConfig,
    pub(super) handle: Handle<SshHandler>,
    pub(super) host_key: HostKeyBlob,
    pub(super) local_addr: SocketAddr,
    /// Duplicate of the connection socket, lent to the signing helper.
    pub(super) socket: OwnedFd,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("host_key_len", &self.host_key.len())
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Connect and authenticate.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let mut session = Self::handshake(config).await?;
        session.authenticate().await?;
        Ok(session)
    }

    /// Open the TCP connection and complete key exchange, without authenticating.
    pub async fn handshake(config: SessionConfig) -> Result<Self> {
        let endpoint = format!("{}:{}", config.host, config.port);
        let stream = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(|e| Error::Connection(format!("{endpoint}: {e}")))?;
        let local_addr = stream.local_addr()?;
        let socket = stream.as_fd().try_clone_to_owned()?;
        tracing::debug!(%endpoint, %local_addr, "TCP connection established");

        let capture = HostKeyCapture::new();
        let handler = SshHandler {
            capture: capture.clone(),
        };
        let russh_config = client::Config {
            inactivity_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let handle = client::connect_stream(Arc::new(russh_config), stream, handler)
            .await
            .map_err(|e| Error::Connection(format!("{endpoint}: {e}")))?;

        // Recorded during key exchange, before any userauth message.
        let host_key = tokio::time::timeout(HOST_KEY_TIMEOUT, capture.wait())
            .await
            .map_err(|_| Error::NoHostKey)?;

        Ok(Self {
            config,
            handle,
            host_key,
            local_addr,
            socket,
        })
    }

    /// Host key captured during key exchange.
    pub fn host_key(&self) -> &HostKeyBlob {
        &self.host_key
    }

    /// Hostbased first; publickey only if the server still lists it.
    pub async fn authenticate(&mut self) -> Result<()> {
        let user = self.config.user.clone();
        let hostbased = HostbasedAuth::new(self.host_key.clone(), self.config.helper.clone());
        let outcome = hostbased.authenticate(self, &user).await?;

        let remaining = match next_step(outcome) {
            NextStep::Authenticated(method) => {
                tracing::info!("authenticated as {} with {}", user, method);
                return Ok(());
            }
            NextStep::Publickey(remaining) => remaining,
            NextStep::GiveUp(remaining) => return Err(Error::AuthenticationFailed(remaining)),
        };

        if self.authenticate_publickey().await? {
            tracing::info!("authenticated as {} with publickey", user);
            return Ok(());
        }
        Err(Error::AuthenticationFailed(remaining))
    }

    /// Close the connection.
    pub async fn disconnect(self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

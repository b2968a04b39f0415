// ABOUTME: Resolves the client identity signed into a hostbased request.
// ABOUTME: Reverse DNS of the local connection endpoint plus the current OS user.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("transport exposes no local address")]
    NoLocalAddress,

    #[error("reverse DNS lookup for {addr} failed: {source}")]
    ReverseDns {
        addr: IpAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("no PTR record for {0}")]
    NoHostname(IpAddr),

    #[error("cannot determine local username: {0}")]
    Username(String),

    #[error("identity lookup task failed: {0}")]
    Task(String),
}

/// Hostname and user name the client claims in the hostbased request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    /// Fully qualified name with a trailing dot, as ssh-keysign expects.
    pub hostname: String,
    pub username: String,
}

/// Source of the local identity. Calls may block.
pub trait IdentityResolver: Send + Sync {
    /// Name registered for `addr` in reverse DNS.
    fn hostname(&self, addr: IpAddr) -> Result<String, LookupError>;

    /// Login name of the user running this process.
    fn username(&self) -> Result<String, LookupError>;
}

/// Resolver backed by the system resolver and user database.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl IdentityResolver for SystemResolver {
    fn hostname(&self, addr: IpAddr) -> Result<String, LookupError> {
        let name = dns_lookup::lookup_addr(&addr)
            .map_err(|source| LookupError::ReverseDns { addr, source })?;

        // getnameinfo falls back to the numeric form when no PTR record exists.
        if name.is_empty() || name.parse::<IpAddr>().is_ok() {
            return Err(LookupError::NoHostname(addr));
        }
        Ok(name)
    }

    fn username(&self) -> Result<String, LookupError> {
        let uid = nix::unistd::getuid();
        match nix::unistd::User::from_uid(uid) {
            Ok(Some(user)) => Ok(user.name),
            Ok(None) => Err(LookupError::Username(format!("no passwd entry for uid {uid}"))),
            Err(errno) => Err(LookupError::Username(errno.to_string())),
        }
    }
}

impl LocalIdentity {
    /// Resolve the identity for a connection whose local endpoint is `local`.
    ///
    /// Runs on the blocking pool; DNS and passwd lookups are synchronous.
    pub async fn resolve(
        resolver: Arc<dyn IdentityResolver>,
        local: Option<SocketAddr>,
    ) -> Result<Self, LookupError> {
        let local = local.ok_or(LookupError::NoLocalAddress)?;

        tokio::task::spawn_blocking(move || Self::resolve_blocking(resolver.as_ref(), local))
            .await
            .map_err(|e| LookupError::Task(e.to_string()))?
    }

    fn resolve_blocking(
        resolver: &dyn IdentityResolver,
        local: SocketAddr,
    ) -> Result<Self, LookupError> {
        let hostname = fully_qualified(resolver.hostname(local.ip())?);
        let username = resolver.username()?;
        tracing::debug!(%hostname, %username, "resolved local identity");
        Ok(Self { hostname, username })
    }
}

fn fully_qualified(mut name: String) -> String {
    if !name.ends_with('.') {
        name.push('.');
    }
    name
}

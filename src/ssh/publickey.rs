// ABOUTME: Publickey fallback for when hostbased authentication is unavailable.
// ABOUTME: Uses configured key files, else the SSH agent, else the usual ~/.ssh keys.

use super::client::Session;
use super::error::{Error, Result};
use russh::keys::agent::client::AgentClient;
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixStream;

/// Key files looked for in `~/.ssh` when nothing else is available.
const DEFAULT_KEY_NAMES: [&str; 3] = ["id_ed25519", "id_ecdsa", "id_rsa"];

enum Credentials {
    Agent(AgentClient<UnixStream>),
    Keys(Vec<Arc<ssh_key::PrivateKey>>),
}

impl Credentials {
    async fn discover(identity_files: &[PathBuf]) -> Result<Self> {
        if !identity_files.is_empty() {
            let keys = identity_files
                .iter()
                .map(|path| load_key(path))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Credentials::Keys(keys));
        }

        match AgentClient::connect_env().await {
            Ok(agent) => return Ok(Credentials::Agent(agent)),
            Err(e) => tracing::debug!("no SSH agent: {}", e),
        }

        let keys: Vec<_> = default_key_paths()
            .iter()
            .filter_map(|path| load_key(path).ok())
            .collect();
        if keys.is_empty() {
            return Err(Error::NoCredentials(
                "no SSH agent and no readable key in ~/.ssh".to_string(),
            ));
        }
        Ok(Credentials::Keys(keys))
    }
}

fn load_key(path: &Path) -> Result<Arc<ssh_key::PrivateKey>> {
    load_secret_key(path, None)
        .map(Arc::new)
        .map_err(|e| Error::KeyLoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn default_key_paths() -> Vec<PathBuf> {
    let Some(home) = std::env::var_os("HOME") else {
        return Vec::new();
    };
    let ssh_dir = PathBuf::from(home).join(".ssh");
    DEFAULT_KEY_NAMES
        .iter()
        .map(|name| ssh_dir.join(name))
        .collect()
}

impl Session {
    /// Offer every available key until the server accepts one.
    pub(super) async fn authenticate_publickey(&mut self) -> Result<bool> {
        let user = self.config.user.clone();
        match Credentials::discover(&self.config.identity_files).await? {
            Credentials::Agent(agent) => self.offer_agent_keys(&user, agent).await,
            Credentials::Keys(keys) => self.offer_private_keys(&user, keys).await,
        }
    }

    async fn offer_agent_keys(
        &mut self,
        user: &str,
        mut agent: AgentClient<UnixStream>,
    ) -> Result<bool> {
        let identities = agent
            .request_identities()
            .await
            .map_err(|e| Error::NoCredentials(format!("cannot list agent keys: {e}")))?;
        tracing::debug!(count = identities.len(), "offering agent keys");

        for identity in identities {
            let result = self
                .handle
                .authenticate_publickey_with(user, identity, None, &mut agent)
                .await;
            match result {
                Ok(outcome) if outcome.success() => return Ok(true),
                Ok(_) => {}
                Err(e) => tracing::debug!("agent could not sign: {:?}", e),
            }
        }
        Ok(false)
    }

    async fn offer_private_keys(
        &mut self,
        user: &str,
        keys: Vec<Arc<ssh_key::PrivateKey>>,
    ) -> Result<bool> {
        // Only consulted for RSA keys; None lets russh pick its default.
        let rsa_hash = self.handle.best_supported_rsa_hash().await?.flatten();

        for key in keys {
            let outcome = self
                .handle
                .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, rsa_hash))
                .await?;
            if outcome.success() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

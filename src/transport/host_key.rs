// ABOUTME: Server host key captured once during key exchange.
// ABOUTME: First write wins; the blob is read-only and shared afterwards.

use crate::wire::WireReader;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

/// Wire encoding of the server host key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostKeyBlob(Bytes);

impl HostKeyBlob {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Key type named by the blob's leading string, e.g. `ssh-ed25519`.
    pub fn algorithm(&self) -> Option<String> {
        WireReader::new(&self.0).read_string().ok()
    }
}

/// Slot handed to the transport's host key callback.
#[derive(Debug, Clone, Default)]
pub struct HostKeyCapture {
    slot: Arc<Mutex<Option<HostKeyBlob>>>,
    recorded: Arc<Notify>,
}

impl HostKeyCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the key. Returns false if a key was already captured.
    pub fn record(&self, key: HostKeyBlob) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            tracing::debug!("ignoring host key offered after the first key exchange");
            return false;
        }
        *slot = Some(key);
        self.recorded.notify_one();
        true
    }

    pub fn get(&self) -> Option<HostKeyBlob> {
        self.slot.lock().clone()
    }

    /// Wait until the callback has recorded a key.
    pub async fn wait(&self) -> HostKeyBlob {
        loop {
            if let Some(key) = self.get() {
                return key;
            }
            self.recorded.notified().await;
        }
    }
}

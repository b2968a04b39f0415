// ABOUTME: Test support utilities.
// ABOUTME: Provides a scripted transport, fake signing helpers, and a fixed identity resolver.

use async_trait::async_trait;
use bytes::Bytes;
use hostbased::identity::{IdentityResolver, LookupError};
use hostbased::transport::{AuthResponse, Transport, TransportError};
use hostbased::wire::{Envelope, Signed, encode};
use std::net::{IpAddr, SocketAddr};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use tempfile::TempDir;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("hostbased=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

static SPAWN_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Serialize tests that write and execute helper scripts.
///
/// A script still open for writing in a concurrently forked child makes exec
/// fail with ETXTBSY.
#[allow(dead_code)]
pub async fn serial() -> tokio::sync::MutexGuard<'static, ()> {
    SPAWN_LOCK.lock().await
}

/// A fake signing helper: a shell script in its own temporary directory.
#[allow(dead_code)]
pub struct FakeHelper {
    dir: TempDir,
    program: PathBuf,
}

#[allow(dead_code)]
impl FakeHelper {
    /// Write `body` as `/bin/sh` script. `$DIR` in the body is the scratch directory.
    pub fn script(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("keysign");
        let script = format!(
            "#!/bin/sh\nDIR='{}'\n{}\n",
            dir.path().display(),
            body
        );
        std::fs::write(&program, script).unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, program }
    }

    /// A helper that saves its stdin to `request.bin` and replies with `response`.
    pub fn replying(response: &[u8]) -> Self {
        let helper = Self::script("cat > \"$DIR/request.bin\"\ncat \"$DIR/response.bin\"");
        std::fs::write(helper.path("response.bin"), response).unwrap();
        helper
    }

    /// A helper that answers with a well-formed signature of `signature`.
    pub fn signing(version: u8, signature: &[u8]) -> Self {
        Self::replying(&signed_response(version, signature))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// What the helper read from stdin, if it saved it.
    pub fn request(&self) -> Option<Vec<u8>> {
        std::fs::read(self.path("request.bin")).ok()
    }
}

/// Encoded `Envelope{ Signed{ version, signature } }`.
#[allow(dead_code)]
pub fn signed_response(version: u8, signature: &[u8]) -> Bytes {
    encode(&Envelope::wrap(&Signed {
        version,
        payload: Bytes::copy_from_slice(signature),
    }))
}

/// Resolver with canned answers that counts lookups.
#[allow(dead_code)]
pub struct StaticResolver {
    pub hostname: Option<String>,
    pub username: String,
    pub lookups: AtomicUsize,
}

#[allow(dead_code)]
impl StaticResolver {
    pub fn new(hostname: &str, username: &str) -> Arc<Self> {
        Arc::new(Self {
            hostname: Some(hostname.to_string()),
            username: username.to_string(),
            lookups: AtomicUsize::new(0),
        })
    }

    /// A resolver whose reverse lookup finds no name.
    pub fn unresolvable(username: &str) -> Arc<Self> {
        Arc::new(Self {
            hostname: None,
            username: username.to_string(),
            lookups: AtomicUsize::new(0),
        })
    }
}

impl IdentityResolver for StaticResolver {
    fn hostname(&self, addr: IpAddr) -> Result<String, LookupError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.hostname.clone().ok_or(LookupError::NoHostname(addr))
    }

    fn username(&self) -> Result<String, LookupError> {
        Ok(self.username.clone())
    }
}

/// In-memory transport with scripted capabilities and answers.
#[allow(dead_code)]
pub struct MockTransport {
    pub session_id: Option<Bytes>,
    pub host_key_algorithm: String,
    pub local_addr: Option<SocketAddr>,
    pub socket: Option<UnixStream>,
    pub response: AuthResponse,
    /// Answer to the "none" request sent on fallback.
    pub none_response: AuthResponse,
    pub fail_writes: bool,
    pub written: Vec<Vec<u8>>,
    pub method_queries: usize,
    // Keeps the socket's other end open while the helper runs.
    _peer: Option<UnixStream>,
}

#[allow(dead_code)]
impl MockTransport {
    /// A transport exposing every capability, with a 16-byte session id.
    pub fn capable() -> Self {
        let (socket, peer) = UnixStream::pair().unwrap();
        Self {
            session_id: Some(Bytes::from_static(&[
                0x5a, 0x11, 0x93, 0x0c, 0xe2, 0x47, 0x8b, 0x3d, 0x76, 0x01, 0xfe, 0x28, 0x9a,
                0xc4, 0x50, 0xb7,
            ])),
            host_key_algorithm: "ssh-ed25519".to_string(),
            local_addr: Some("192.0.2.10:50022".parse().unwrap()),
            socket: Some(socket),
            response: AuthResponse::Accepted,
            none_response: AuthResponse::Rejected {
                methods: vec!["publickey".to_string(), "password".to_string()],
                partial_success: false,
            },
            fail_writes: false,
            written: Vec::new(),
            method_queries: 0,
            _peer: Some(peer),
        }
    }

    pub fn without_session_id(mut self) -> Self {
        self.session_id = None;
        self
    }

    pub fn without_socket(mut self) -> Self {
        self.socket = None;
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn session_id(&self) -> Option<Bytes> {
        self.session_id.clone()
    }

    fn host_key_algorithm(&self) -> String {
        self.host_key_algorithm.clone()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn socket_fd(&self) -> Option<BorrowedFd<'_>> {
        self.socket.as_ref().map(|s| s.as_fd())
    }

    async fn write_packet(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if self.fail_writes {
            return Err(TransportError::Closed);
        }
        self.written.push(payload.to_vec());
        Ok(())
    }

    async fn read_auth_response(&mut self) -> Result<AuthResponse, TransportError> {
        Ok(self.response.clone())
    }

    async fn permitted_methods(&mut self, _user: &str) -> Result<AuthResponse, TransportError> {
        self.method_queries += 1;
        Ok(self.none_response.clone())
    }
}

/// A 32-byte ed25519 public key in SSH wire form.
#[allow(dead_code)]
pub fn ed25519_host_key() -> hostbased::transport::HostKeyBlob {
    let mut blob = Vec::new();
    blob.extend_from_slice(&11u32.to_be_bytes());
    blob.extend_from_slice(b"ssh-ed25519");
    blob.extend_from_slice(&32u32.to_be_bytes());
    blob.extend((0u8..32).map(|b| b.wrapping_mul(7)));
    hostbased::transport::HostKeyBlob::new(blob)
}

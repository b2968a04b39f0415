// ABOUTME: Integration tests for one hostbased attempt against a scripted transport.
// ABOUTME: Covers the happy path, helper failures, version mismatch, and lookup failures.

mod support;

use bytes::Bytes;
use hostbased::auth::{
    Attempt, AttemptState, AuthOutcome, HostbasedAuth, HostbasedError, METHOD_NAME, SERVICE_NAME,
};
use hostbased::helper::{ExitFailure, HelperConfig, HelperError};
use hostbased::identity::LookupError;
use hostbased::transport::{AuthResponse, HostKeyBlob};
use hostbased::wire::{
    Envelope, FinalAuthPacket, PROTOCOL_VERSION, SSH_MSG_USERAUTH_REQUEST, Sign, SignMessage,
    decode,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use support::{FakeHelper, MockTransport, StaticResolver, ed25519_host_key};

fn auth_with(helper: &FakeHelper, resolver: Arc<StaticResolver>) -> HostbasedAuth {
    HostbasedAuth::new(ed25519_host_key(), HelperConfig::new(helper.program()))
        .with_resolver(resolver)
}

fn expect_fallback(outcome: AuthOutcome) -> hostbased::auth::Fallback {
    match outcome {
        AuthOutcome::Fallback(fallback) => fallback,
        AuthOutcome::Completed(response) => panic!("expected fallback, got {:?}", response),
    }
}

mod success {
    use super::*;

    #[tokio::test]
    async fn signed_response_produces_one_packet() {
        support::init_tracing();
        let _guard = support::serial().await;
        let signature = [0xab; 64];
        let helper = FakeHelper::signing(PROTOCOL_VERSION, &signature);
        let mut transport = MockTransport::capable();
        let auth = auth_with(&helper, StaticResolver::new("client.example.com", "svc"));

        let outcome = auth.authenticate(&mut transport, "alice").await.unwrap();

        assert!(matches!(
            outcome,
            AuthOutcome::Completed(AuthResponse::Accepted)
        ));
        assert_eq!(transport.written.len(), 1);

        let packet: FinalAuthPacket = decode(&transport.written[0]).unwrap();
        assert_eq!(packet.msgtype, SSH_MSG_USERAUTH_REQUEST);
        assert_eq!(packet.user, "alice");
        assert_eq!(packet.service, SERVICE_NAME);
        assert_eq!(packet.method, METHOD_NAME);
        assert_eq!(packet.host_algorithm, "ssh-ed25519");
        assert_eq!(packet.local_hostname, "client.example.com.");
        assert_eq!(packet.local_username, "svc");
        assert_eq!(&packet.signature[..], &signature[..]);
    }

    #[tokio::test]
    async fn raw_32_byte_host_key_reaches_helper_and_packet_unchanged() {
        let _guard = support::serial().await;
        let host_key = HostKeyBlob::new(vec![0x42; 32]);
        let helper = FakeHelper::signing(PROTOCOL_VERSION, &[0x5c; 64]);
        let mut transport = MockTransport::capable();
        let auth = HostbasedAuth::new(host_key.clone(), HelperConfig::new(helper.program()))
            .with_resolver(StaticResolver::new("client.example.com", "svc"));

        let outcome = auth.authenticate(&mut transport, "alice").await.unwrap();

        assert!(matches!(outcome, AuthOutcome::Completed(AuthResponse::Accepted)));
        let request = helper.request().expect("helper should have saved its stdin");
        let envelope: Envelope = decode(&request).unwrap();
        let sign: Sign = envelope.open().unwrap();
        let signed: SignMessage = decode(&sign.payload).unwrap();
        assert_eq!(signed.host_key.len(), 32);
        assert_eq!(&signed.host_key, host_key.as_bytes());

        let packet: FinalAuthPacket = decode(&transport.written[0]).unwrap();
        assert_eq!(packet.host_key, signed.host_key);
    }

    #[tokio::test]
    async fn packet_fields_match_what_the_helper_signed() {
        let _guard = support::serial().await;
        let helper = FakeHelper::signing(PROTOCOL_VERSION, &[0x11; 64]);
        let mut transport = MockTransport::capable();
        let auth = auth_with(&helper, StaticResolver::new("client.example.com.", "svc"));

        auth.authenticate(&mut transport, "alice").await.unwrap();

        let request = helper.request().expect("helper should have saved its stdin");
        let envelope: Envelope = decode(&request).unwrap();
        let sign: Sign = envelope.open().unwrap();
        assert_eq!(sign.version, PROTOCOL_VERSION);
        assert_eq!(sign.fd, 3);
        let signed: SignMessage = decode(&sign.payload).unwrap();
        assert_eq!(signed.session, transport.session_id.clone().unwrap());

        let packet: FinalAuthPacket = decode(&transport.written[0]).unwrap();
        assert_eq!(packet.msgtype, signed.msgtype);
        assert_eq!(packet.user, signed.user);
        assert_eq!(packet.service, signed.service);
        assert_eq!(packet.method, signed.method);
        assert_eq!(packet.host_algorithm, signed.host_algorithm);
        assert_eq!(packet.host_key, signed.host_key);
        assert_eq!(packet.local_hostname, signed.local_hostname);
        assert_eq!(packet.local_username, signed.local_username);
    }

    #[tokio::test]
    async fn server_rejection_is_reported_not_retried() {
        let _guard = support::serial().await;
        let helper = FakeHelper::signing(PROTOCOL_VERSION, &[0x22; 64]);
        let mut transport = MockTransport::capable();
        transport.response = AuthResponse::Rejected {
            methods: vec!["publickey".to_string()],
            partial_success: false,
        };
        let auth = auth_with(&helper, StaticResolver::new("client.example.com", "svc"));

        let outcome = auth.authenticate(&mut transport, "alice").await.unwrap();

        match outcome {
            AuthOutcome::Completed(response) => assert!(!response.success()),
            other => panic!("expected completed outcome, got {:?}", other),
        }
        assert_eq!(transport.written.len(), 1);
        assert_eq!(transport.method_queries, 0);
    }

    #[tokio::test]
    async fn helper_sees_the_connection_socket_on_fd_3() {
        let _guard = support::serial().await;
        let response = support::signed_response(PROTOCOL_VERSION, &[0x33; 64]);
        let helper = FakeHelper::script(
            "cat > /dev/null\nif [ -S /dev/fd/3 ]; then cat \"$DIR/response.bin\"; else echo 'no socket on fd 3' >&2; exit 1; fi",
        );
        std::fs::write(helper.path("response.bin"), &response).unwrap();
        let mut transport = MockTransport::capable();
        let auth = auth_with(&helper, StaticResolver::new("client.example.com", "svc"));

        let outcome = auth.authenticate(&mut transport, "alice").await.unwrap();

        assert!(matches!(outcome, AuthOutcome::Completed(_)), "{:?}", outcome);
    }
}

mod helper_failures {
    use super::*;

    #[tokio::test]
    async fn stderr_is_the_diagnostic_and_nothing_is_sent() {
        let _guard = support::serial().await;
        let helper = FakeHelper::script("cat > /dev/null\nprintf 'permission denied' >&2\nexit 1");
        let mut transport = MockTransport::capable();
        let auth = auth_with(&helper, StaticResolver::new("client.example.com", "svc"));

        let outcome = auth.authenticate(&mut transport, "alice").await.unwrap();

        let fallback = expect_fallback(outcome);
        assert_eq!(fallback.stage, AttemptState::AwaitingHelper);
        assert_eq!(fallback.diagnostic(), "permission denied");
        assert_eq!(fallback.methods(), ["publickey", "password"]);
        assert!(!fallback.authenticated());
        assert!(transport.written.is_empty());
    }

    #[tokio::test]
    async fn silent_failure_reports_exit_status() {
        let _guard = support::serial().await;
        let helper = FakeHelper::script("exit 7");
        let mut transport = MockTransport::capable();
        let auth = auth_with(&helper, StaticResolver::new("client.example.com", "svc"));

        let outcome = auth.authenticate(&mut transport, "alice").await.unwrap();

        let fallback = expect_fallback(outcome);
        assert!(matches!(
            fallback.error,
            HostbasedError::Helper(HelperError::Exit(ExitFailure::Code(7)))
        ));
        assert!(transport.written.is_empty());
    }

    #[tokio::test]
    async fn missing_helper_falls_back() {
        let _guard = support::serial().await;
        let mut transport = MockTransport::capable();
        let auth = HostbasedAuth::new(
            ed25519_host_key(),
            HelperConfig::new("/nonexistent/hostbased-test/ssh-keysign"),
        )
        .with_resolver(StaticResolver::new("client.example.com", "svc"));

        let outcome = auth.authenticate(&mut transport, "alice").await.unwrap();

        let fallback = expect_fallback(outcome);
        assert!(matches!(
            fallback.error,
            HostbasedError::Helper(HelperError::Spawn { .. })
        ));
        assert!(transport.written.is_empty());
    }

    #[tokio::test]
    async fn hung_helper_is_killed_after_timeout() {
        let _guard = support::serial().await;
        let helper = FakeHelper::script("exec sleep 30");
        let mut transport = MockTransport::capable();
        let config = HelperConfig::new(helper.program()).timeout(Duration::from_millis(200));
        let auth = HostbasedAuth::new(ed25519_host_key(), config)
            .with_resolver(StaticResolver::new("client.example.com", "svc"));

        let started = std::time::Instant::now();
        let outcome = auth.authenticate(&mut transport, "alice").await.unwrap();

        let fallback = expect_fallback(outcome);
        assert!(matches!(
            fallback.error,
            HostbasedError::Helper(HelperError::Timeout(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(transport.written.is_empty());
    }

    #[tokio::test]
    async fn newer_protocol_version_is_rejected() {
        let _guard = support::serial().await;
        let helper = FakeHelper::signing(3, &[0x44; 64]);
        let mut transport = MockTransport::capable();
        let auth = auth_with(&helper, StaticResolver::new("client.example.com", "svc"));

        let outcome = auth.authenticate(&mut transport, "alice").await.unwrap();

        let fallback = expect_fallback(outcome);
        assert_eq!(fallback.stage, AttemptState::ValidatingResponse);
        assert!(matches!(
            fallback.error,
            HostbasedError::ProtocolVersion {
                expected: 2,
                actual: 3
            }
        ));
        assert!(transport.written.is_empty());
    }

    #[tokio::test]
    async fn garbage_output_is_a_format_error() {
        let _guard = support::serial().await;
        let helper = FakeHelper::replying(&[0x00, 0x00, 0x01]);
        let mut transport = MockTransport::capable();
        let auth = auth_with(&helper, StaticResolver::new("client.example.com", "svc"));

        let outcome = auth.authenticate(&mut transport, "alice").await.unwrap();

        let fallback = expect_fallback(outcome);
        assert_eq!(fallback.stage, AttemptState::ValidatingResponse);
        assert!(matches!(fallback.error, HostbasedError::Format(_)));
        assert!(transport.written.is_empty());
    }
}

mod preconditions {
    use super::*;

    #[tokio::test]
    async fn lookup_failure_stops_before_the_helper_runs() {
        let _guard = support::serial().await;
        let helper = FakeHelper::script("touch \"$DIR/spawned\"\nexit 1");
        let resolver = StaticResolver::unresolvable("svc");
        let mut transport = MockTransport::capable();
        let auth = auth_with(&helper, Arc::clone(&resolver));

        let outcome = auth.authenticate(&mut transport, "alice").await.unwrap();

        let fallback = expect_fallback(outcome);
        assert_eq!(fallback.stage, AttemptState::BuildingRequest);
        assert!(matches!(
            fallback.error,
            HostbasedError::Lookup(LookupError::NoHostname(_))
        ));
        assert_eq!(resolver.lookups.load(Ordering::SeqCst), 1);
        assert!(!helper.path("spawned").exists(), "helper must not be spawned");
        assert!(transport.written.is_empty());
    }

    #[tokio::test]
    async fn missing_session_id_falls_back_at_init() {
        let _guard = support::serial().await;
        let helper = FakeHelper::script("touch \"$DIR/spawned\"");
        let resolver = StaticResolver::new("client.example.com", "svc");
        let mut transport = MockTransport::capable().without_session_id();
        let auth = auth_with(&helper, Arc::clone(&resolver));

        let outcome = auth.authenticate(&mut transport, "alice").await.unwrap();

        let fallback = expect_fallback(outcome);
        assert_eq!(fallback.stage, AttemptState::Init);
        assert!(matches!(fallback.error, HostbasedError::Capability(_)));
        assert_eq!(transport.method_queries, 1);
        assert_eq!(resolver.lookups.load(Ordering::SeqCst), 0);
        assert!(!helper.path("spawned").exists());
    }

    #[tokio::test]
    async fn accepted_none_request_is_reported_as_authenticated() {
        let _guard = support::serial().await;
        let helper = FakeHelper::script("touch \"$DIR/spawned\"");
        let mut transport = MockTransport::capable().without_session_id();
        transport.none_response = AuthResponse::Accepted;
        let auth = auth_with(&helper, StaticResolver::new("client.example.com", "svc"));

        let outcome = auth.authenticate(&mut transport, "alice").await.unwrap();

        let fallback = expect_fallback(outcome);
        assert!(fallback.authenticated());
        assert!(fallback.methods().is_empty());
        assert_eq!(transport.method_queries, 1);
    }

    #[tokio::test]
    async fn missing_socket_falls_back_before_spawning() {
        let _guard = support::serial().await;
        let helper = FakeHelper::script("touch \"$DIR/spawned\"");
        let mut transport = MockTransport::capable().without_socket();
        let auth = auth_with(&helper, StaticResolver::new("client.example.com", "svc"));

        let outcome = auth.authenticate(&mut transport, "alice").await.unwrap();

        let fallback = expect_fallback(outcome);
        assert_eq!(fallback.stage, AttemptState::AwaitingHelper);
        assert!(matches!(fallback.error, HostbasedError::Capability(_)));
        assert!(!helper.path("spawned").exists());
    }
}

mod transport_errors {
    use super::*;
    use hostbased::transport::TransportError;

    #[tokio::test]
    async fn write_failure_is_returned_as_an_error() {
        let _guard = support::serial().await;
        let helper = FakeHelper::signing(PROTOCOL_VERSION, &[0x55; 64]);
        let mut transport = MockTransport::capable().failing_writes();
        let auth = auth_with(&helper, StaticResolver::new("client.example.com", "svc"));

        let result = auth.authenticate(&mut transport, "alice").await;

        assert!(matches!(result, Err(TransportError::Closed)));
        assert_eq!(transport.method_queries, 0);
    }
}

mod stages {
    use super::*;

    #[tokio::test]
    async fn attempt_walks_through_every_state() {
        let _guard = support::serial().await;
        let helper = FakeHelper::signing(PROTOCOL_VERSION, &[0x66; 64]);
        let process = hostbased::helper::HelperProcess::new(HelperConfig::new(helper.program()));
        let mut transport = MockTransport::capable();
        let host_key = ed25519_host_key();

        let attempt = Attempt::start(&transport, "alice");
        assert_eq!(attempt.stage(), AttemptState::Init);

        let attempt = attempt.capture().unwrap();
        assert_eq!(attempt.stage(), AttemptState::BuildingRequest);

        let attempt = attempt
            .build_request(&host_key, 3, StaticResolver::new("client.example.com", "svc"))
            .await
            .unwrap();
        assert_eq!(attempt.stage(), AttemptState::AwaitingHelper);
        assert_eq!(&attempt.request().message().host_key, host_key.as_bytes());

        let socket = transport.socket.as_ref().map(std::os::fd::AsFd::as_fd);
        let attempt = attempt.run_helper(&process, socket).await.unwrap();
        assert_eq!(attempt.stage(), AttemptState::ValidatingResponse);

        let attempt = attempt.validate().unwrap();
        assert_eq!(attempt.stage(), AttemptState::Submitting);
        assert_eq!(attempt.packet().signature, Bytes::from_static(&[0x66; 64]));

        let response = attempt.submit(&mut transport).await.unwrap();
        assert!(response.success());
        assert_eq!(transport.written.len(), 1);
    }
}

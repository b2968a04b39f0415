// ABOUTME: State types for a hostbased attempt (type state pattern).
// ABOUTME: Each state carries exactly the data the next transition needs.

use super::request::SigningRequest;
use crate::wire::FinalAuthPacket;
use bytes::Bytes;
use std::fmt;
use std::net::SocketAddr;

/// Named stage of an attempt, for logs and fallback reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Init,
    BuildingRequest,
    AwaitingHelper,
    ValidatingResponse,
    Submitting,
    Success,
    Fallback,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptState::Init => "init",
            AttemptState::BuildingRequest => "building-request",
            AttemptState::AwaitingHelper => "awaiting-helper",
            AttemptState::ValidatingResponse => "validating-response",
            AttemptState::Submitting => "submitting",
            AttemptState::Success => "success",
            AttemptState::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// Implemented by every in-progress state.
pub trait State {
    const STAGE: AttemptState;
}

/// Facts read from the transport. Available action: `capture()`.
#[derive(Debug, Clone)]
pub struct Init {
    pub(super) user: String,
    pub(super) session_id: Option<Bytes>,
    pub(super) host_algorithm: String,
    pub(super) local_addr: Option<SocketAddr>,
}

/// Transport facts verified. Available action: `build_request()`.
#[derive(Debug, Clone)]
pub struct BuildingRequest {
    pub(super) user: String,
    pub(super) session_id: Bytes,
    pub(super) host_algorithm: String,
    pub(super) local_addr: SocketAddr,
}

/// Request encoded. Available action: `run_helper()`.
#[derive(Debug, Clone)]
pub struct AwaitingHelper {
    pub(super) request: SigningRequest,
}

/// Helper output collected. Available action: `validate()`.
#[derive(Debug, Clone)]
pub struct ValidatingResponse {
    pub(super) request: SigningRequest,
    pub(super) response: Bytes,
}

/// Final packet assembled. Available action: `submit()`.
#[derive(Debug, Clone)]
pub struct Submitting {
    pub(super) packet: FinalAuthPacket,
}

impl State for Init {
    const STAGE: AttemptState = AttemptState::Init;
}

impl State for BuildingRequest {
    const STAGE: AttemptState = AttemptState::BuildingRequest;
}

impl State for AwaitingHelper {
    const STAGE: AttemptState = AttemptState::AwaitingHelper;
}

impl State for ValidatingResponse {
    const STAGE: AttemptState = AttemptState::ValidatingResponse;
}

impl State for Submitting {
    const STAGE: AttemptState = AttemptState::Submitting;
}

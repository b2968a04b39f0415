// ABOUTME: Wire format shared with the ssh-keysign helper.
// ABOUTME: SSH primitive encodings plus the nested envelope records.

mod codec;
mod error;
mod messages;

pub use codec::{Decode, Encode, WireReader, WireWriter, decode, encode};
pub use error::FormatError;
pub use messages::{Envelope, FinalAuthPacket, Sign, SignMessage, Signed};

/// Keysign protocol version spoken by both sides.
pub const PROTOCOL_VERSION: u8 = 2;

/// SSH_MSG_USERAUTH_REQUEST.
pub const SSH_MSG_USERAUTH_REQUEST: u8 = 50;

// ABOUTME: Records exchanged with ssh-keysign and the final userauth packet.
// ABOUTME: Envelope -> Sign -> SignMessage on the way out, Envelope -> Signed on the way back.

use super::codec::{Decode, Encode, WireReader, WireWriter, decode, encode};
use super::error::FormatError;
use bytes::Bytes;

/// Outer layer: an opaque blob holding an encoded inner record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub payload: Bytes,
}

impl Envelope {
    pub fn wrap<T: Encode>(inner: &T) -> Self {
        Self {
            payload: encode(inner),
        }
    }

    /// Decode the payload as the given inner record.
    pub fn open<T: Decode>(&self) -> Result<T, FormatError> {
        decode(&self.payload)
    }
}

impl Encode for Envelope {
    fn encode(&self, writer: &mut WireWriter) {
        writer.put_bytes(&self.payload);
    }
}

impl Decode for Envelope {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            payload: reader.read_bytes()?,
        })
    }
}

/// Request to the helper: protocol version, socket fd index, data to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sign {
    pub version: u8,
    pub fd: u32,
    pub payload: Bytes,
}

impl Encode for Sign {
    fn encode(&self, writer: &mut WireWriter) {
        writer.put_u8(self.version);
        writer.put_u32(self.fd);
        writer.put_bytes(&self.payload);
    }
}

impl Decode for Sign {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            version: reader.read_u8()?,
            fd: reader.read_u32()?,
            payload: reader.read_bytes()?,
        })
    }
}

/// The data the host key signs (RFC 4252 section 9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignMessage {
    pub session: Bytes,
    pub msgtype: u8,
    pub user: String,
    pub service: String,
    pub method: String,
    pub host_algorithm: String,
    pub host_key: Bytes,
    pub local_hostname: String,
    pub local_username: String,
}

impl Encode for SignMessage {
    fn encode(&self, writer: &mut WireWriter) {
        writer.put_bytes(&self.session);
        writer.put_u8(self.msgtype);
        writer.put_string(&self.user);
        writer.put_string(&self.service);
        writer.put_string(&self.method);
        writer.put_string(&self.host_algorithm);
        writer.put_bytes(&self.host_key);
        writer.put_string(&self.local_hostname);
        writer.put_string(&self.local_username);
    }
}

impl Decode for SignMessage {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            session: reader.read_bytes()?,
            msgtype: reader.read_u8()?,
            user: reader.read_string()?,
            service: reader.read_string()?,
            method: reader.read_string()?,
            host_algorithm: reader.read_string()?,
            host_key: reader.read_bytes()?,
            local_hostname: reader.read_string()?,
            local_username: reader.read_string()?,
        })
    }
}

/// Response from the helper: protocol version and the raw signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signed {
    pub version: u8,
    pub payload: Bytes,
}

impl Encode for Signed {
    fn encode(&self, writer: &mut WireWriter) {
        writer.put_u8(self.version);
        writer.put_bytes(&self.payload);
    }
}

impl Decode for Signed {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            version: reader.read_u8()?,
            payload: reader.read_bytes()?,
        })
    }
}

/// SSH_MSG_USERAUTH_REQUEST for the hostbased method, signature attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalAuthPacket {
    pub msgtype: u8,
    pub user: String,
    pub service: String,
    pub method: String,
    pub host_algorithm: String,
    pub host_key: Bytes,
    pub local_hostname: String,
    pub local_username: String,
    pub signature: Bytes,
}

impl FinalAuthPacket {
    /// Build the packet from the exact message the helper signed.
    ///
    /// The server recomputes the signed data from these fields, so they are
    /// copied from the request rather than rebuilt.
    pub fn from_request(message: &SignMessage, signature: Bytes) -> Self {
        Self {
            msgtype: message.msgtype,
            user: message.user.clone(),
            service: message.service.clone(),
            method: message.method.clone(),
            host_algorithm: message.host_algorithm.clone(),
            host_key: message.host_key.clone(),
            local_hostname: message.local_hostname.clone(),
            local_username: message.local_username.clone(),
            signature,
        }
    }
}

impl Encode for FinalAuthPacket {
    fn encode(&self, writer: &mut WireWriter) {
        writer.put_u8(self.msgtype);
        writer.put_string(&self.user);
        writer.put_string(&self.service);
        writer.put_string(&self.method);
        writer.put_string(&self.host_algorithm);
        writer.put_bytes(&self.host_key);
        writer.put_string(&self.local_hostname);
        writer.put_string(&self.local_username);
        writer.put_bytes(&self.signature);
    }
}

impl Decode for FinalAuthPacket {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            msgtype: reader.read_u8()?,
            user: reader.read_string()?,
            service: reader.read_string()?,
            method: reader.read_string()?,
            host_algorithm: reader.read_string()?,
            host_key: reader.read_bytes()?,
            local_hostname: reader.read_string()?,
            local_username: reader.read_string()?,
            signature: reader.read_bytes()?,
        })
    }
}

//! MAVLink frame.

use crate::protocol::signing::MavTimestamp;
use crate::protocol::spec::Message;

/// `MAVLink 1` frame start marker.
pub const MAGIC_V1: u8 = 0xFE;

/// `MAVLink 2` frame start marker.
pub const MAGIC_V2: u8 = 0xFD;

/// Incompatibility flag bit: the frame is signed.
pub const INCOMPAT_FLAG_SIGNED: u8 = 0x01;

/// Header length of a `MAVLink 1` frame, magic byte included.
pub(crate) const HEADER_LEN_V1: usize = 6;

/// Header length of a `MAVLink 2` frame, magic byte included.
pub(crate) const HEADER_LEN_V2: usize = 10;

/// MAVLink protocol version of a frame or a node.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum MavlinkVersion {
    /// `MAVLink 1`
    V1,
    /// `MAVLink 2`
    #[default]
    V2,
}

impl MavlinkVersion {
    pub(crate) fn header_len(&self) -> usize {
        match self {
            MavlinkVersion::V1 => HEADER_LEN_V1,
            MavlinkVersion::V2 => HEADER_LEN_V2,
        }
    }
}

/// Signature trailer of a signed `MAVLink 2` frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Link `ID` disambiguating signature streams between the same peers.
    pub link_id: u8,
    /// 48-bit signing timestamp.
    pub timestamp: MavTimestamp,
    /// First 6 bytes of the SHA-256 signature.
    pub signature: [u8; 6],
}

/// A decoded MAVLink frame.
///
/// Frames keep both the decoded message and the raw wire bytes, so routers
/// can forward them without re-encoding the payload (see
/// [`Node::write_frame_except`](crate::node::Node::write_frame_except)).
#[derive(Clone, Debug)]
pub struct Frame {
    pub(crate) version: MavlinkVersion,
    pub(crate) incompat_flags: u8,
    pub(crate) compat_flags: u8,
    pub(crate) sequence: u8,
    pub(crate) system_id: u8,
    pub(crate) component_id: u8,
    pub(crate) message_id: u32,
    pub(crate) message: Box<dyn Message>,
    pub(crate) raw: Vec<u8>,
    pub(crate) checksum: u16,
    pub(crate) signature: Option<Signature>,
}

impl Frame {
    /// MAVLink protocol version.
    pub fn version(&self) -> MavlinkVersion {
        self.version
    }

    /// Incompatibility flags (`0` for `MAVLink 1` frames).
    pub fn incompat_flags(&self) -> u8 {
        self.incompat_flags
    }

    /// Compatibility flags (`0` for `MAVLink 1` frames).
    pub fn compat_flags(&self) -> u8 {
        self.compat_flags
    }

    /// Packet sequence number.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// System `ID` of the frame source.
    pub fn system_id(&self) -> u8 {
        self.system_id
    }

    /// Component `ID` of the frame source.
    pub fn component_id(&self) -> u8 {
        self.component_id
    }

    /// Message `ID`.
    pub fn message_id(&self) -> u32 {
        self.message_id
    }

    /// The decoded message.
    pub fn message(&self) -> &dyn Message {
        self.message.as_ref()
    }

    /// Attempts to downcast the decoded message to a concrete type.
    pub fn message_as<M: Message>(&self) -> Option<&M> {
        self.message.as_ref().downcast_ref()
    }

    /// Raw frame bytes as observed on the wire, signature included.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Payload bytes as observed on the wire (possibly truncated for
    /// `MAVLink 2`).
    pub fn payload(&self) -> &[u8] {
        let header_len = self.version.header_len();
        let payload_len = self.raw[1] as usize;
        &self.raw[header_len..header_len + payload_len]
    }

    /// Frame checksum as observed on the wire.
    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    /// Signature trailer of a signed `MAVLink 2` frame.
    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// Returns `true` if the frame is signed.
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }
}

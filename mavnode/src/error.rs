//! Error types.
//!
//! All mavnode errors are variants of [`Error`]. Frame-level failures
//! ([`FrameError`]) never cross the node boundary as `Err`: they are reported
//! through [`Event::ParseError`](crate::node::Event::ParseError) and the
//! offending frame is dropped. Only [`Node::new`](crate::node::Node::new) and
//! explicit write operations return fatal errors.

use std::sync::mpsc;

/// Crate-wide result type.
pub type Result<T> = core::result::Result<T, Error>;

/// All errors returned by mavnode operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial transport error.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Invalid node or endpoint configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Invalid message declaration or dialect.
    #[error(transparent)]
    Spec(#[from] SpecError),

    /// Frame-level encoding or decoding error.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The node or channel has been closed.
    #[error("node is closed")]
    Closed,
}

/// Node and endpoint configuration errors, fatal at
/// [`Node::new`](crate::node::Node::new).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// System `ID` outside of the valid `1..=255` range.
    #[error("invalid system id: {0}")]
    InvalidSystemId(u8),

    /// Component `ID` outside of the valid `1..=255` range.
    #[error("invalid component id: {0}")]
    InvalidComponentId(u8),

    /// The endpoint list is empty.
    #[error("at least one endpoint is required")]
    NoEndpoints,

    /// Heartbeat emission requires the dialect to contain message `ID` 0.
    #[error("heartbeat is enabled but the dialect has no HEARTBEAT (id 0) message")]
    HeartbeatNotInDialect,

    /// Stream requests require the dialect to contain message `ID` 66.
    #[error("stream requests are enabled but the dialect has no REQUEST_DATA_STREAM (id 66) message")]
    StreamRequestNotInDialect,

    /// Secret keys are exactly 32 bytes long.
    #[error("signature key must be exactly 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Invalid socket address.
    #[error("invalid address `{0}`")]
    InvalidAddress(String),

    /// An endpoint whose transport was already consumed by a node was
    /// attached again.
    #[error("endpoint was already started by another node")]
    EndpointAlreadyStarted,
}

/// Message declaration and dialect construction errors.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    /// Two messages in a dialect share the same `ID`.
    #[error("duplicate message with id {0}")]
    DuplicateMessageId(u32),

    /// Message `ID` above the 24-bit wire range.
    #[error("message {name}: id {id} exceeds the 24-bit range")]
    IdOutOfRange {
        /// Message name.
        name: &'static str,
        /// Declared `ID`.
        id: u32,
    },

    /// An extension field declared before a non-extension field.
    #[error("message {message}: extension field precedes core field `{field}`")]
    ExtensionBeforeCore {
        /// Message name.
        message: &'static str,
        /// First offending core field.
        field: &'static str,
    },

    /// A char string with a zero declared length.
    #[error("message {message}: string field `{field}` requires a non-zero length")]
    UnsizedString {
        /// Message name.
        message: &'static str,
        /// Offending field.
        field: &'static str,
    },

    /// An array with a length outside of `1..=255`.
    #[error("message {message}: field `{field}` has invalid array length {len}")]
    InvalidArrayLength {
        /// Message name.
        message: &'static str,
        /// Offending field.
        field: &'static str,
        /// Declared length.
        len: usize,
    },

    /// A message with no fields.
    #[error("message {0} has no fields")]
    NoFields(&'static str),

    /// Payload larger than the 255-byte wire limit.
    #[error("message {name}: payload size {size} exceeds 255 bytes")]
    PayloadTooLarge {
        /// Message name.
        name: &'static str,
        /// Payload size including extensions.
        size: usize,
    },
}

/// Frame-level errors: per-frame, reported as events, never fatal.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Payload length does not match the message plan.
    #[error("invalid payload length {len} for message {id} (expected {expected})")]
    Length {
        /// Message `ID`.
        id: u32,
        /// Received payload length.
        len: usize,
        /// Expected payload length.
        expected: usize,
    },

    /// Checksum mismatch (wrong bytes or a dialect mismatch).
    #[error("checksum mismatch: computed {computed:#06x}, received {received:#06x}")]
    Checksum {
        /// Locally computed checksum.
        computed: u16,
        /// Checksum observed on the wire.
        received: u16,
    },

    /// Message `ID` not present in the dialect.
    #[error("unknown message id {0}")]
    UnknownId(u32),

    /// `MAVLink 2` frame with unsupported incompatibility flags.
    #[error("unsupported incompatibility flags {0:#04x}")]
    InvalidIncompatFlags(u8),

    /// A message `ID` above 255 cannot be sent in a `MAVLink 1` frame.
    #[error("message id {0} does not fit into a MAVLink 1 frame")]
    IdTooLargeV1(u32),

    /// An incoming key is set, but the frame is not signed.
    #[error("frame is not signed while a signature is required")]
    SignatureRequired,

    /// Frame signature does not verify against the incoming key.
    #[error("invalid frame signature")]
    InvalidSignature,

    /// Signature timestamp not greater than the last accepted one for the
    /// same link.
    #[error("signature timestamp {timestamp} is not newer than {last}")]
    Replay {
        /// Timestamp of the rejected frame.
        timestamp: u64,
        /// Last accepted timestamp for the link.
        last: u64,
    },

    /// Payload byte not valid for the target enum.
    #[error("value {value} is not valid for enum {enum_name}")]
    InvalidEnum {
        /// Enum type name.
        enum_name: &'static str,
        /// Received raw value.
        value: u64,
    },

    /// Char-string payload is not valid UTF-8.
    #[error("string field contains invalid UTF-8")]
    InvalidString,
}

impl<T> From<mpsc::SendError<T>> for Error {
    fn from(_: mpsc::SendError<T>) -> Self {
        Error::Closed
    }
}

impl From<mpsc::RecvError> for Error {
    fn from(_: mpsc::RecvError) -> Self {
        Error::Closed
    }
}

//! # MAVLink protocol entities
//!
//! This module contains everything related to the wire protocol itself:
//! message declarations and their compiled layouts, dialects, the frame
//! codec, the byte-stream parser, and message signing.
//!
//! Messages are declared with the derive macros re-exported from
//! [`derive`]:
//!
//! ```rust
//! use mavnode::protocol::derive::Message;
//!
//! /// Motor throttle report.
//! #[derive(Clone, Debug, Message)]
//! #[message_id(72101)]
//! pub struct ThrottleReport {
//!     /// Motor index.
//!     pub motor: u8,
//!     /// Throttle, %.
//!     pub throttle: f32,
//! }
//! ```

mod codec;
mod dialect;
mod frame;
pub mod minimal;
mod parser;
mod plan;
mod signing;
mod spec;

pub use dialect::Dialect;
pub use frame::{Frame, MavlinkVersion, Signature, INCOMPAT_FLAG_SIGNED, MAGIC_V1, MAGIC_V2};
pub use parser::{Parser, ParserEvent};
pub use plan::{FieldReader, FieldWriter, MessagePlan};
pub use signing::{MavTimestamp, SecretKey, SIGNATURE_LEN};
pub use spec::{FieldKind, FieldSpec, FieldValue, LoadFn, Message, MessageSpec};

pub(crate) use codec::{assemble_frame, decode_payload, reseal_frame};
pub(crate) use dialect::DialectEntry;
pub(crate) use signing::FrameSigner;

/// Derive macros for message and enum declarations.
pub mod derive {
    pub use mavnode_derive::{Enum, Message};
}

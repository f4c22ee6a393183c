//! Message declarations: field descriptors, static message specifications,
//! and the [`Message`] trait implemented by the
//! [`Message`](mavnode_derive::Message) derive macro.

use std::any::Any;
use std::fmt::Debug;

use crate::error::FrameError;
use crate::protocol::plan::{FieldReader, FieldWriter};

/// Primitive wire type of a message field.
///
/// Enums resolve to their underlying primitive; char strings are arrays of
/// [`FieldKind::Char`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// `uint8_t`
    U8,
    /// `int8_t`
    I8,
    /// `uint16_t`
    U16,
    /// `int16_t`
    I16,
    /// `uint32_t`
    U32,
    /// `int32_t`
    I32,
    /// `uint64_t`
    U64,
    /// `int64_t`
    I64,
    /// `float`
    F32,
    /// `double`
    F64,
    /// `char`
    Char,
}

impl FieldKind {
    /// Size of a single element in bytes. Defines the payload sort order.
    pub const fn base_size(&self) -> usize {
        match self {
            FieldKind::U64 | FieldKind::I64 | FieldKind::F64 => 8,
            FieldKind::U32 | FieldKind::I32 | FieldKind::F32 => 4,
            FieldKind::U16 | FieldKind::I16 => 2,
            FieldKind::U8 | FieldKind::I8 | FieldKind::Char => 1,
        }
    }

    /// MAVLink type name as hashed into the CRC-extra seed.
    pub const fn wire_name(&self) -> &'static str {
        match self {
            FieldKind::U8 => "uint8_t",
            FieldKind::I8 => "int8_t",
            FieldKind::U16 => "uint16_t",
            FieldKind::I16 => "int16_t",
            FieldKind::U32 => "uint32_t",
            FieldKind::I32 => "int32_t",
            FieldKind::U64 => "uint64_t",
            FieldKind::I64 => "int64_t",
            FieldKind::F32 => "float",
            FieldKind::F64 => "double",
            FieldKind::Char => "char",
        }
    }
}

/// Declared metadata of a single message field, in declaration order.
#[derive(Copy, Clone, Debug)]
pub struct FieldSpec {
    /// Wire name of the field.
    pub name: &'static str,
    /// Primitive element type (enums resolve to their underlying type).
    pub kind: FieldKind,
    /// Number of elements; for char strings the declared string length.
    pub array_len: usize,
    /// Whether the field is an array (char strings included).
    pub array: bool,
    /// `MAVLink 2` extension field, absent from `MAVLink 1` payloads.
    pub extension: bool,
}

impl FieldSpec {
    /// Total field size in bytes.
    pub const fn size(&self) -> usize {
        self.kind.base_size() * self.array_len
    }
}

/// Loader function emitted by the derive macro: reads fields in declaration
/// order and produces the boxed message.
pub type LoadFn = fn(&mut FieldReader<'_>) -> Result<Box<dyn Message>, FrameError>;

/// Static specification of a message type, emitted by the
/// [`Message`](mavnode_derive::Message) derive macro and consumed by
/// [`Dialect`](crate::protocol::Dialect).
#[derive(Debug)]
pub struct MessageSpec {
    /// Message `ID`.
    pub id: u32,
    /// Message wire name (`UPPER_SNAKE_CASE`).
    pub name: &'static str,
    /// Field descriptors in declaration order.
    pub fields: &'static [FieldSpec],
    /// Field loader.
    pub load: LoadFn,
}

/// A MAVLink message within some dialect.
///
/// Implemented via `#[derive(Message)]`; see
/// [`test_utils`](crate::test_utils) for declaration examples.
pub trait Message: Debug + Send + Sync + 'static {
    /// Static message specification.
    fn spec(&self) -> &'static MessageSpec;

    /// Writes fields in declaration order into `writer`.
    fn store(&self, writer: &mut FieldWriter<'_>);

    /// Upcast used to recover the concrete message type.
    fn as_any(&self) -> &dyn Any;

    /// Clones the message behind the trait object.
    fn clone_message(&self) -> Box<dyn Message>;
}

impl Clone for Box<dyn Message> {
    fn clone(&self) -> Self {
        self.clone_message()
    }
}

impl dyn Message {
    /// Message `ID` shorthand.
    pub fn id(&self) -> u32 {
        self.spec().id
    }

    /// Attempts to downcast the message to a concrete type.
    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.as_any().downcast_ref()
    }
}

/// A value that can be written to and read from a message payload.
///
/// Implemented for the integer and float primitives, fixed-size arrays,
/// `String` (char strings), and, through the [`Enum`](mavnode_derive::Enum)
/// derive macro, for fieldless enums.
pub trait FieldValue: Sized {
    /// Writes the little-endian representation into `buf`, whose length is
    /// the exact field size from the message plan.
    fn write_le(&self, buf: &mut [u8]);

    /// Reads the value back from `buf`.
    fn read_le(buf: &[u8]) -> Result<Self, FrameError>;
}

macro_rules! impl_field_value {
    ($($ty:ty),* $(,)?) => {$(
        impl FieldValue for $ty {
            fn write_le(&self, buf: &mut [u8]) {
                buf.copy_from_slice(&self.to_le_bytes());
            }

            fn read_le(buf: &[u8]) -> Result<Self, FrameError> {
                let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                bytes.copy_from_slice(buf);
                Ok(<$ty>::from_le_bytes(bytes))
            }
        }
    )*};
}

impl_field_value!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl<T: FieldValue + Default + Copy, const N: usize> FieldValue for [T; N] {
    fn write_le(&self, buf: &mut [u8]) {
        let elem = buf.len() / N;
        for (i, value) in self.iter().enumerate() {
            value.write_le(&mut buf[i * elem..(i + 1) * elem]);
        }
    }

    fn read_le(buf: &[u8]) -> Result<Self, FrameError> {
        let elem = buf.len() / N;
        let mut out = [T::default(); N];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = T::read_le(&buf[i * elem..(i + 1) * elem])?;
        }
        Ok(out)
    }
}

impl FieldValue for String {
    fn write_le(&self, buf: &mut [u8]) {
        let bytes = self.as_bytes();
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        for slot in &mut buf[len..] {
            *slot = 0;
        }
    }

    fn read_le(buf: &[u8]) -> Result<Self, FrameError> {
        let end = buf.iter().position(|&byte| byte == 0).unwrap_or(buf.len());
        String::from_utf8(buf[..end].to_vec()).map_err(|_| FrameError::InvalidString)
    }
}

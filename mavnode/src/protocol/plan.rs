//! Message layout reflection.
//!
//! A [`MessagePlan`] is computed once per message when a
//! [`Dialect`](crate::protocol::Dialect) is constructed. It fixes the wire
//! order of the declared fields (stable sort by primitive width, extensions
//! appended in declaration order), their payload offsets, the payload sizes
//! with and without extensions, and the CRC-extra byte folded into every
//! frame checksum.

use std::cmp::Reverse;

use crc_any::CRCu16;

use crate::error::{FrameError, SpecError};
use crate::protocol::spec::{FieldKind, FieldSpec, FieldValue, MessageSpec};

/// Resolved layout of a single field: its declared metadata plus the offset
/// assigned by the wire sort.
#[derive(Clone, Debug)]
pub(crate) struct FieldLayout {
    pub(crate) spec: FieldSpec,
    pub(crate) offset: usize,
    pub(crate) size: usize,
}

/// Fixed binary layout of one message within a dialect.
#[derive(Clone, Debug)]
pub struct MessagePlan {
    id: u32,
    crc_extra: u8,
    size_v1: usize,
    size_v2: usize,
    fields: Vec<FieldLayout>,
}

impl MessagePlan {
    /// Computes the plan of a message specification.
    pub fn new(spec: &MessageSpec) -> Result<Self, SpecError> {
        if spec.fields.is_empty() {
            return Err(SpecError::NoFields(spec.name));
        }
        if spec.id > 0x00FF_FFFF {
            return Err(SpecError::IdOutOfRange {
                name: spec.name,
                id: spec.id,
            });
        }

        let mut seen_extension = false;
        for field in spec.fields {
            if field.extension {
                seen_extension = true;
            } else if seen_extension {
                return Err(SpecError::ExtensionBeforeCore {
                    message: spec.name,
                    field: field.name,
                });
            }

            if field.kind == FieldKind::Char && (!field.array || field.array_len == 0) {
                return Err(SpecError::UnsizedString {
                    message: spec.name,
                    field: field.name,
                });
            }
            if field.array && (field.array_len == 0 || field.array_len > 255) {
                return Err(SpecError::InvalidArrayLength {
                    message: spec.name,
                    field: field.name,
                    len: field.array_len,
                });
            }
        }

        // Wire order: core fields stable-sorted by descending element width,
        // extensions afterwards in declaration order.
        let mut core: Vec<usize> = Vec::with_capacity(spec.fields.len());
        let mut extensions: Vec<usize> = Vec::new();
        for (index, field) in spec.fields.iter().enumerate() {
            if field.extension {
                extensions.push(index);
            } else {
                core.push(index);
            }
        }
        core.sort_by_key(|&index| Reverse(spec.fields[index].kind.base_size()));

        let mut offsets = vec![0usize; spec.fields.len()];
        let mut offset = 0;
        for &index in &core {
            offsets[index] = offset;
            offset += spec.fields[index].size();
        }
        let size_v1 = offset;
        for &index in &extensions {
            offsets[index] = offset;
            offset += spec.fields[index].size();
        }
        let size_v2 = offset;

        if size_v2 > 255 {
            return Err(SpecError::PayloadTooLarge {
                name: spec.name,
                size: size_v2,
            });
        }

        let crc_extra = compute_crc_extra(spec, &core);

        let fields = spec
            .fields
            .iter()
            .enumerate()
            .map(|(index, field)| FieldLayout {
                spec: *field,
                offset: offsets[index],
                size: field.size(),
            })
            .collect();

        Ok(MessagePlan {
            id: spec.id,
            crc_extra,
            size_v1,
            size_v2,
            fields,
        })
    }

    /// Message `ID`.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The CRC-extra byte folded into the wire checksum.
    pub fn crc_extra(&self) -> u8 {
        self.crc_extra
    }

    /// Payload size without extension fields (`MAVLink 1`).
    pub fn size_v1(&self) -> usize {
        self.size_v1
    }

    /// Payload size including extension fields (`MAVLink 2`).
    pub fn size_v2(&self) -> usize {
        self.size_v2
    }

    pub(crate) fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }
}

/// CRC-extra: X.25 CRC-16 over the message name and the core fields in wire
/// order (type name, field name, array length byte), folded to one byte.
fn compute_crc_extra(spec: &MessageSpec, wire_order: &[usize]) -> u8 {
    let mut crc = CRCu16::crc16mcrf4cc();
    crc.digest(spec.name.as_bytes());
    crc.digest(b" ");

    for &index in wire_order {
        let field = &spec.fields[index];
        crc.digest(field.kind.wire_name().as_bytes());
        crc.digest(b" ");
        crc.digest(field.name.as_bytes());
        crc.digest(b" ");
        if field.array {
            crc.digest(&[field.array_len as u8]);
        }
    }

    let sum = crc.get_crc();
    ((sum & 0xFF) ^ (sum >> 8)) as u8
}

/// Plan-driven payload writer handed to [`Message::store`].
///
/// [`Message::store`]: crate::protocol::Message::store
pub struct FieldWriter<'a> {
    fields: &'a [FieldLayout],
    buf: &'a mut [u8],
    index: usize,
}

impl<'a> FieldWriter<'a> {
    /// `buf` must be [`MessagePlan::size_v2`] bytes long.
    pub(crate) fn new(plan: &'a MessagePlan, buf: &'a mut [u8]) -> Self {
        Self {
            fields: &plan.fields,
            buf,
            index: 0,
        }
    }

    /// Writes the next field in declaration order at its wire offset.
    pub fn put<T: FieldValue>(&mut self, value: &T) {
        let layout = &self.fields[self.index];
        self.index += 1;
        value.write_le(&mut self.buf[layout.offset..layout.offset + layout.size]);
    }
}

/// Plan-driven payload reader handed to message loaders.
pub struct FieldReader<'a> {
    fields: &'a [FieldLayout],
    buf: &'a [u8],
    v2: bool,
    index: usize,
}

impl<'a> FieldReader<'a> {
    /// `buf` must be [`MessagePlan::size_v1`] bytes for `MAVLink 1` and
    /// [`MessagePlan::size_v2`] (zero-extended) bytes for `MAVLink 2`.
    pub(crate) fn new(plan: &'a MessagePlan, buf: &'a [u8], v2: bool) -> Self {
        Self {
            fields: &plan.fields,
            buf,
            v2,
            index: 0,
        }
    }

    /// Reads the next field in declaration order from its wire offset.
    ///
    /// Extension fields decode to their default value in `MAVLink 1` frames.
    pub fn get<T: FieldValue + Default>(&mut self) -> Result<T, FrameError> {
        let layout = &self.fields[self.index];
        self.index += 1;
        if layout.spec.extension && !self.v2 {
            return Ok(T::default());
        }
        T::read_le(&self.buf[layout.offset..layout.offset + layout.size])
    }
}

#[cfg(test)]
mod plan_tests {
    use super::*;
    use crate::protocol::minimal::{Heartbeat, RequestDataStream};
    use crate::test_utils::*;

    fn plan_of(spec: &MessageSpec) -> MessagePlan {
        MessagePlan::new(spec).unwrap()
    }

    #[test]
    fn crc_extra_matches_reference_dialect() {
        let cases: &[(&MessageSpec, u8)] = &[
            (Heartbeat::message_spec(), 50),
            (SysStatus::message_spec(), 124),
            (ChangeOperatorControl::message_spec(), 217),
            (AttitudeQuaternionCov::message_spec(), 167),
            (OpticalFlow::message_spec(), 175),
            (PlayTune::message_spec(), 187),
            (Ahrs::message_spec(), 127),
            (RequestDataStream::message_spec(), 148),
        ];

        for &(spec, crc_extra) in cases {
            assert_eq!(plan_of(spec).crc_extra(), crc_extra, "message {}", spec.name);
        }
    }

    #[test]
    fn fields_sort_by_width_with_extensions_last() {
        let plan = plan_of(OpticalFlow::message_spec());

        let offsets: Vec<usize> = plan.fields().iter().map(|field| field.offset).collect();
        // time_usec, sensor_id, flow_x, flow_y, flow_comp_m_x, flow_comp_m_y,
        // quality, ground_distance, flow_rate_x (ext), flow_rate_y (ext)
        assert_eq!(offsets, vec![0, 24, 20, 22, 8, 12, 25, 16, 26, 30]);
        assert_eq!(plan.size_v1(), 26);
        assert_eq!(plan.size_v2(), 34);
    }

    #[test]
    fn string_length_counts_as_array_length() {
        let plan = plan_of(ChangeOperatorControl::message_spec());
        assert_eq!(plan.size_v1(), 28);
        assert_eq!(plan.size_v2(), 28);
    }

    #[test]
    fn extension_before_core_field_is_rejected() {
        static FIELDS: &[FieldSpec] = &[
            FieldSpec {
                name: "first",
                kind: FieldKind::U8,
                array_len: 1,
                array: false,
                extension: true,
            },
            FieldSpec {
                name: "second",
                kind: FieldKind::U8,
                array_len: 1,
                array: false,
                extension: false,
            },
        ];
        let spec = MessageSpec {
            id: 1,
            name: "BROKEN",
            fields: FIELDS,
            load: |_| unreachable!(),
        };

        assert!(matches!(
            MessagePlan::new(&spec),
            Err(SpecError::ExtensionBeforeCore { field: "second", .. })
        ));
    }

    #[test]
    fn unsized_string_is_rejected() {
        static FIELDS: &[FieldSpec] = &[FieldSpec {
            name: "text",
            kind: FieldKind::Char,
            array_len: 0,
            array: true,
            extension: false,
        }];
        let spec = MessageSpec {
            id: 1,
            name: "BROKEN",
            fields: FIELDS,
            load: |_| unreachable!(),
        };

        assert!(matches!(
            MessagePlan::new(&spec),
            Err(SpecError::UnsizedString { field: "text", .. })
        ));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        static FIELDS: &[FieldSpec] = &[FieldSpec {
            name: "data",
            kind: FieldKind::U64,
            array_len: 40,
            array: true,
            extension: false,
        }];
        let spec = MessageSpec {
            id: 1,
            name: "BROKEN",
            fields: FIELDS,
            load: |_| unreachable!(),
        };

        assert!(matches!(
            MessagePlan::new(&spec),
            Err(SpecError::PayloadTooLarge { size: 320, .. })
        ));
    }
}

//! Payload and frame codec.
//!
//! Payload encoding walks the message fields through the plan offsets,
//! applies the `MAVLink 2` empty-byte truncation, and zero-extends truncated
//! payloads on decode. Frame assembly adds the header, the X.25 checksum
//! seeded with the plan's CRC-extra, and, for signing nodes, the
//! 13-byte signature trailer.

use crc_any::CRCu16;

use crate::error::FrameError;
use crate::protocol::dialect::{Dialect, DialectEntry};
use crate::protocol::frame::{
    Frame, MavlinkVersion, Signature, INCOMPAT_FLAG_SIGNED, MAGIC_V1, MAGIC_V2,
};
use crate::protocol::plan::{FieldReader, FieldWriter, MessagePlan};
use crate::protocol::signing::{FrameSigner, FrameVerifier, MavTimestamp};
use crate::protocol::spec::Message;

/// X.25 CRC-16 over the frame bytes after the magic byte, terminated by the
/// message's CRC-extra byte.
pub(crate) fn frame_crc(after_magic: &[u8], crc_extra: u8) -> u16 {
    let mut crc = CRCu16::crc16mcrf4cc();
    crc.digest(after_magic);
    crc.digest(&[crc_extra]);
    crc.get_crc()
}

/// Serializes a message payload in wire order.
///
/// `MAVLink 1` payloads exclude extension fields and are never truncated;
/// `MAVLink 2` payloads include extensions and strip trailing zero bytes,
/// but never below one byte.
pub(crate) fn encode_payload(
    plan: &MessagePlan,
    message: &dyn Message,
    version: MavlinkVersion,
) -> Vec<u8> {
    let mut buf = vec![0u8; plan.size_v2()];
    message.store(&mut FieldWriter::new(plan, &mut buf));

    match version {
        MavlinkVersion::V1 => buf.truncate(plan.size_v1()),
        MavlinkVersion::V2 => {
            let mut len = buf.len();
            while len > 1 && buf[len - 1] == 0 {
                len -= 1;
            }
            buf.truncate(len);
        }
    }

    buf
}

/// Deserializes a message payload.
pub(crate) fn decode_payload(
    entry: &DialectEntry,
    payload: &[u8],
    version: MavlinkVersion,
) -> Result<Box<dyn Message>, FrameError> {
    let plan = &entry.plan;

    let padded;
    let buf = match version {
        MavlinkVersion::V1 => {
            if payload.len() != plan.size_v1() {
                return Err(FrameError::Length {
                    id: plan.id(),
                    len: payload.len(),
                    expected: plan.size_v1(),
                });
            }
            payload
        }
        MavlinkVersion::V2 => {
            if payload.len() < plan.size_v2() {
                let mut extended = payload.to_vec();
                extended.resize(plan.size_v2(), 0);
                padded = extended;
                padded.as_slice()
            } else {
                payload
            }
        }
    };

    let mut reader = FieldReader::new(plan, buf, version == MavlinkVersion::V2);
    (entry.spec.load)(&mut reader)
}

/// Builds the raw wire bytes of a new frame.
pub(crate) fn assemble_frame(
    plan: &MessagePlan,
    message: &dyn Message,
    version: MavlinkVersion,
    sequence: u8,
    system_id: u8,
    component_id: u8,
    signer: Option<&FrameSigner>,
) -> Result<Vec<u8>, FrameError> {
    let payload = encode_payload(plan, message, version);
    let mut buf = Vec::with_capacity(version.header_len() + payload.len() + 2 + 13);

    match version {
        MavlinkVersion::V1 => {
            if plan.id() > u8::MAX as u32 {
                return Err(FrameError::IdTooLargeV1(plan.id()));
            }
            buf.push(MAGIC_V1);
            buf.push(payload.len() as u8);
            buf.push(sequence);
            buf.push(system_id);
            buf.push(component_id);
            buf.push(plan.id() as u8);
        }
        MavlinkVersion::V2 => {
            let incompat_flags = if signer.is_some() { INCOMPAT_FLAG_SIGNED } else { 0 };
            let id = plan.id().to_le_bytes();
            buf.push(MAGIC_V2);
            buf.push(payload.len() as u8);
            buf.push(incompat_flags);
            buf.push(0); // compatibility flags
            buf.push(sequence);
            buf.push(system_id);
            buf.push(component_id);
            buf.extend_from_slice(&id[..3]);
        }
    }

    buf.extend_from_slice(&payload);

    let crc = frame_crc(&buf[1..], plan.crc_extra());
    buf.extend_from_slice(&crc.to_le_bytes());

    if let (Some(signer), MavlinkVersion::V2) = (signer, version) {
        let (link_id, timestamp, signature) = signer.sign(&buf);
        buf.push(link_id);
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(&signature);
    }

    Ok(buf)
}

/// Re-seals the raw bytes of a received frame for forwarding: a fresh
/// sequence number, a recomputed checksum, and either a fresh signature (when
/// the relaying node signs) or no signature at all.
///
/// The original source system and component `ID`s are preserved.
pub(crate) fn reseal_frame(
    frame: &Frame,
    sequence: u8,
    crc_extra: u8,
    signer: Option<&FrameSigner>,
) -> Vec<u8> {
    let mut buf = frame.raw().to_vec();
    let payload_len = buf[1] as usize;
    let header_len = frame.version().header_len();
    let crc_end = header_len + payload_len + 2;

    match frame.version() {
        MavlinkVersion::V1 => {
            buf[2] = sequence;
        }
        MavlinkVersion::V2 => {
            buf[4] = sequence;
            if signer.is_some() {
                buf[2] |= INCOMPAT_FLAG_SIGNED;
            } else {
                buf[2] &= !INCOMPAT_FLAG_SIGNED;
            }
        }
    }

    let crc = frame_crc(&buf[1..crc_end - 2], crc_extra);
    buf[crc_end - 2..crc_end].copy_from_slice(&crc.to_le_bytes());
    buf.truncate(crc_end);

    if let (Some(signer), MavlinkVersion::V2) = (signer, frame.version()) {
        let (link_id, timestamp, signature) = signer.sign(&buf);
        buf.push(link_id);
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(&signature);
    }

    buf
}

/// Validates and decodes a complete raw frame.
///
/// `bytes` must hold exactly one frame, as delivered by the
/// [`Parser`](crate::protocol::Parser) state machine.
pub(crate) fn parse_frame(
    bytes: &[u8],
    dialect: &Dialect,
    verifier: Option<&mut FrameVerifier>,
) -> Result<Frame, FrameError> {
    let version = match bytes[0] {
        MAGIC_V1 => MavlinkVersion::V1,
        _ => MavlinkVersion::V2,
    };
    let payload_len = bytes[1] as usize;
    let header_len = version.header_len();
    let crc_end = header_len + payload_len + 2;

    let (incompat_flags, compat_flags, sequence, system_id, component_id, message_id) =
        match version {
            MavlinkVersion::V1 => (0, 0, bytes[2], bytes[3], bytes[4], bytes[5] as u32),
            MavlinkVersion::V2 => {
                let id = u32::from_le_bytes([bytes[7], bytes[8], bytes[9], 0]);
                (bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], id)
            }
        };

    if incompat_flags & !INCOMPAT_FLAG_SIGNED != 0 {
        return Err(FrameError::InvalidIncompatFlags(incompat_flags));
    }
    let signed = version == MavlinkVersion::V2 && incompat_flags & INCOMPAT_FLAG_SIGNED != 0;

    let entry = dialect
        .get(message_id)
        .ok_or(FrameError::UnknownId(message_id))?;

    let computed = frame_crc(&bytes[1..header_len + payload_len], entry.plan.crc_extra());
    let received = u16::from_le_bytes([bytes[crc_end - 2], bytes[crc_end - 1]]);
    if computed != received {
        return Err(FrameError::Checksum { computed, received });
    }

    let signature = if signed {
        let mut timestamp = [0u8; 6];
        timestamp.copy_from_slice(&bytes[crc_end + 1..crc_end + 7]);
        let mut sig = [0u8; 6];
        sig.copy_from_slice(&bytes[crc_end + 7..crc_end + 13]);
        Some(Signature {
            link_id: bytes[crc_end],
            timestamp: MavTimestamp::from_le_bytes(timestamp),
            signature: sig,
        })
    } else {
        None
    };

    if let Some(verifier) = verifier {
        match &signature {
            Some(signature) => verifier.verify(
                &bytes[..crc_end],
                signature.link_id,
                signature.timestamp,
                &signature.signature,
                system_id,
                component_id,
            )?,
            // MAVLink 1 frames cannot carry signatures and pass unsigned.
            None if version == MavlinkVersion::V2 => return Err(FrameError::SignatureRequired),
            None => {}
        }
    }

    let message = decode_payload(entry, &bytes[header_len..header_len + payload_len], version)?;

    Ok(Frame {
        version,
        incompat_flags,
        compat_flags,
        sequence,
        system_id,
        component_id,
        message_id,
        message,
        raw: bytes.to_vec(),
        checksum: received,
        signature,
    })
}

#[cfg(test)]
mod codec_tests {
    use super::*;
    use crate::protocol::minimal::{Heartbeat, MavAutopilot, MavState, MavType};
    use crate::test_utils::*;

    fn plan_for(message: &dyn Message) -> MessagePlan {
        MessagePlan::new(message.spec()).unwrap()
    }

    fn entry_for(message: &dyn Message) -> DialectEntry {
        DialectEntry {
            spec: message.spec(),
            plan: plan_for(message),
        }
    }

    fn check_round_trip<M: Message + PartialEq + Clone>(
        message: &M,
        version: MavlinkVersion,
        raw: &[u8],
    ) {
        let entry = entry_for(message);

        let encoded = encode_payload(&entry.plan, message, version);
        assert_eq!(encoded, raw, "encoding {}", entry.spec.name);

        let decoded = decode_payload(&entry, raw, version).unwrap();
        let decoded: &M = decoded.downcast_ref().unwrap();
        assert_eq!(decoded, message, "decoding {}", entry.spec.name);
    }

    #[test]
    fn v1_heartbeat() {
        check_round_trip(
            &Heartbeat {
                type_: MavType::FixedWing,
                autopilot: MavAutopilot::Slugs,
                base_mode: 3,
                custom_mode: 6,
                system_status: MavState::Active,
                mavlink_version: 5,
            },
            MavlinkVersion::V1,
            b"\x06\x00\x00\x00\x01\x02\x03\x04\x05",
        );
    }

    #[test]
    fn v1_sys_status() {
        check_round_trip(
            &SysStatus {
                onboard_control_sensors_present: 0x01010101,
                onboard_control_sensors_enabled: 0x01010101,
                onboard_control_sensors_health: 0x01010101,
                load: 0x0101,
                voltage_battery: 0x0101,
                current_battery: 0x0101,
                battery_remaining: 1,
                drop_rate_comm: 0x0101,
                errors_comm: 0x0101,
                errors_count1: 0x0101,
                errors_count2: 0x0101,
                errors_count3: 0x0101,
                errors_count4: 0x0101,
            },
            MavlinkVersion::V1,
            &[0x01; 31],
        );
    }

    #[test]
    fn v1_char_string_pads_to_declared_length() {
        check_round_trip(
            &ChangeOperatorControl {
                target_system: 1,
                control_request: 1,
                version: 1,
                passkey: "testing".to_string(),
            },
            MavlinkVersion::V1,
            b"\x01\x01\x01\x74\x65\x73\x74\x69\x6e\x67\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00",
        );
    }

    #[test]
    fn v1_float_arrays() {
        let mut raw = b"\x02\x00\x00\x00\x00\x00\x00\x00".to_vec();
        for _ in 0..16 {
            raw.extend_from_slice(b"\x00\x00\x80\x3F");
        }

        check_round_trip(
            &AttitudeQuaternionCov {
                time_usec: 2,
                q: [1.0; 4],
                rollspeed: 1.0,
                pitchspeed: 1.0,
                yawspeed: 1.0,
                covariance: [1.0; 9],
            },
            MavlinkVersion::V1,
            &raw,
        );
    }

    #[test]
    fn v1_skips_extension_fields() {
        check_round_trip(
            &OpticalFlow {
                time_usec: 3,
                sensor_id: 9,
                flow_x: 7,
                flow_y: 8,
                flow_comp_m_x: 1.0,
                flow_comp_m_y: 1.0,
                quality: 0x0A,
                ground_distance: 1.0,
                flow_rate_x: 0.0,
                flow_rate_y: 0.0,
            },
            MavlinkVersion::V1,
            b"\x03\x00\x00\x00\x00\x00\x00\x00\x00\x00\x80\x3F\x00\x00\x80\x3F\x00\x00\x80\x3F\x07\x00\x08\x00\x09\x0A",
        );
    }

    #[test]
    fn v1_enum_arrays() {
        let mut raw = 1u64.to_le_bytes().to_vec();
        for _ in 0..11 {
            for value in 1..=5 {
                raw.extend_from_slice(&(value as f32).to_le_bytes());
            }
        }
        for value in 1u16..=5 {
            raw.extend_from_slice(&value.to_le_bytes());
        }
        raw.push(2);

        check_round_trip(
            &TrajectoryRepresentationWaypoints {
                time_usec: 1,
                valid_points: 2,
                pos_x: [1.0, 2.0, 3.0, 4.0, 5.0],
                pos_y: [1.0, 2.0, 3.0, 4.0, 5.0],
                pos_z: [1.0, 2.0, 3.0, 4.0, 5.0],
                vel_x: [1.0, 2.0, 3.0, 4.0, 5.0],
                vel_y: [1.0, 2.0, 3.0, 4.0, 5.0],
                vel_z: [1.0, 2.0, 3.0, 4.0, 5.0],
                acc_x: [1.0, 2.0, 3.0, 4.0, 5.0],
                acc_y: [1.0, 2.0, 3.0, 4.0, 5.0],
                acc_z: [1.0, 2.0, 3.0, 4.0, 5.0],
                pos_yaw: [1.0, 2.0, 3.0, 4.0, 5.0],
                vel_yaw: [1.0, 2.0, 3.0, 4.0, 5.0],
                command: [1, 2, 3, 4, 5],
            },
            MavlinkVersion::V1,
            &raw,
        );
    }

    #[test]
    fn v2_truncates_to_a_single_byte_minimum() {
        check_round_trip(&Ahrs::default(), MavlinkVersion::V2, b"\x00");
    }

    #[test]
    fn v2_truncates_trailing_zeroes() {
        check_round_trip(
            &ChangeOperatorControl {
                target_system: 0,
                control_request: 1,
                version: 2,
                passkey: "testing".to_string(),
            },
            MavlinkVersion::V2,
            b"\x00\x01\x02\x74\x65\x73\x74\x69\x6e\x67",
        );

        check_round_trip(
            &Ahrs {
                omega_ix: 1.0,
                omega_iy: 2.0,
                omega_iz: 3.0,
                accel_weight: 4.0,
                renorm_val: 5.0,
                error_rp: 0.0,
                error_yaw: 0.0,
            },
            MavlinkVersion::V2,
            b"\x00\x00\x80\x3f\x00\x00\x00\x40\x00\x00\x40\x40\x00\x00\x80\x40\x00\x00\xa0\x40",
        );
    }

    #[test]
    fn v2_keeps_extension_fields() {
        check_round_trip(
            &OpticalFlow {
                time_usec: 3,
                sensor_id: 9,
                flow_x: 7,
                flow_y: 8,
                flow_comp_m_x: 1.0,
                flow_comp_m_y: 1.0,
                quality: 0x0A,
                ground_distance: 1.0,
                flow_rate_x: 1.0,
                flow_rate_y: 1.0,
            },
            MavlinkVersion::V2,
            b"\x03\x00\x00\x00\x00\x00\x00\x00\x00\x00\x80\x3F\x00\x00\x80\x3F\x00\x00\x80\x3F\x07\x00\x08\x00\x09\x0A\x00\x00\x80\x3F\x00\x00\x80\x3F",
        );

        check_round_trip(
            &PlayTune {
                target_system: 1,
                target_component: 2,
                tune: "test1".to_string(),
                tune2: "test2".to_string(),
            },
            MavlinkVersion::V2,
            b"\x01\x02\x74\x65\x73\x74\x31\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x74\x65\x73\x74\x32",
        );
    }

    #[test]
    fn v2_zero_extension_fields_truncate_like_absent_ones() {
        let with_defaults = OpticalFlow {
            time_usec: 3,
            flow_comp_m_x: 1.0,
            flow_comp_m_y: 1.0,
            ground_distance: 1.0,
            flow_x: 7,
            flow_y: 8,
            sensor_id: 9,
            quality: 0x0A,
            flow_rate_x: 0.0,
            flow_rate_y: 0.0,
        };
        let plan = plan_for(&with_defaults);

        let encoded = encode_payload(&plan, &with_defaults, MavlinkVersion::V2);
        assert_eq!(encoded.len(), plan.size_v1());
    }

    #[test]
    fn v1_length_mismatch_is_rejected() {
        let entry = entry_for(&Ahrs::default());
        let err = decode_payload(&entry, &[0u8; 4], MavlinkVersion::V1).unwrap_err();
        assert!(matches!(err, FrameError::Length { expected: 28, len: 4, .. }));
    }

    #[test]
    fn assembles_the_reference_heartbeat_frame() {
        let message = Heartbeat {
            type_: MavType::Airship,
            autopilot: MavAutopilot::GenericWaypointsOnly,
            base_mode: 4,
            custom_mode: 3,
            system_status: MavState::Calibrating,
            mavlink_version: 1,
        };
        let plan = plan_for(&message);

        let raw =
            assemble_frame(&plan, &message, MavlinkVersion::V2, 0, 11, 1, None).unwrap();
        assert_eq!(
            raw,
            [
                0xFD, 0x09, 0x00, 0x00, 0x00, 0x0B, 0x01, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00,
                0x00, 0x07, 0x05, 0x04, 0x02, 0x01, 0x9F, 0xDA
            ]
        );

        let dialect = Dialect::minimal();
        let frame = parse_frame(&raw, &dialect, None).unwrap();
        assert_eq!(frame.system_id(), 11);
        assert_eq!(frame.component_id(), 1);
        assert_eq!(frame.sequence(), 0);
        assert_eq!(frame.message_id(), 0);
        assert_eq!(frame.message_as::<Heartbeat>(), Some(&message));
    }

    #[test]
    fn corrupted_frames_fail_the_checksum() {
        let message = Heartbeat::default();
        let plan = plan_for(&message);
        let mut raw =
            assemble_frame(&plan, &message, MavlinkVersion::V2, 0, 1, 1, None).unwrap();
        raw[10] ^= 0xFF;

        let dialect = Dialect::minimal();
        assert!(matches!(
            parse_frame(&raw, &dialect, None),
            Err(FrameError::Checksum { .. })
        ));
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let message = Ahrs::default();
        let plan = plan_for(&message);
        let raw = assemble_frame(&plan, &message, MavlinkVersion::V2, 0, 1, 1, None).unwrap();

        let dialect = Dialect::minimal();
        assert!(matches!(
            parse_frame(&raw, &dialect, None),
            Err(FrameError::UnknownId(163))
        ));
    }

    #[test]
    fn v1_rejects_large_message_ids() {
        let message = PlayTune::default();
        let plan = plan_for(&message);
        assert!(matches!(
            assemble_frame(&plan, &message, MavlinkVersion::V1, 0, 1, 1, None),
            Err(FrameError::IdTooLargeV1(258))
        ));
    }

    #[test]
    fn resealed_frames_keep_the_source_identity() {
        let message = Heartbeat {
            type_: MavType::Airship,
            autopilot: MavAutopilot::GenericWaypointsOnly,
            base_mode: 4,
            custom_mode: 3,
            system_status: MavState::Calibrating,
            mavlink_version: 1,
        };
        let plan = plan_for(&message);
        let dialect = Dialect::minimal();

        let raw = assemble_frame(&plan, &message, MavlinkVersion::V2, 17, 10, 1, None).unwrap();
        let frame = parse_frame(&raw, &dialect, None).unwrap();

        let resealed = reseal_frame(&frame, 42, plan.crc_extra(), None);
        let relayed = parse_frame(&resealed, &dialect, None).unwrap();

        assert_eq!(relayed.sequence(), 42);
        assert_eq!(relayed.system_id(), 10);
        assert_eq!(relayed.component_id(), 1);
        assert_eq!(relayed.message_as::<Heartbeat>(), Some(&message));
    }

    #[test]
    fn resealing_with_a_signer_signs_the_frame() {
        use crate::protocol::signing::SecretKey;

        let message = Heartbeat::default();
        let plan = plan_for(&message);
        let dialect = Dialect::minimal();
        let signer = FrameSigner::new(SecretKey::new([0x4F; 32]));

        let raw = assemble_frame(&plan, &message, MavlinkVersion::V2, 0, 10, 1, None).unwrap();
        let frame = parse_frame(&raw, &dialect, None).unwrap();

        let resealed = reseal_frame(&frame, 1, plan.crc_extra(), Some(&signer));
        let mut verifier = FrameVerifier::new(SecretKey::new([0x4F; 32]));
        let relayed = parse_frame(&resealed, &dialect, Some(&mut verifier)).unwrap();

        assert!(relayed.is_signed());
        assert_eq!(relayed.system_id(), 10);
    }
}

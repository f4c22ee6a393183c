//! Stateful byte-stream frame scanner.
//!
//! One [`Parser`] instance lives inside each channel reader. It consumes
//! whatever the transport delivers, buffers partial frames, and emits one
//! event per recognized frame. A malformed byte never desynchronizes more
//! than one frame: scanning resumes at the next magic byte.

use std::mem;
use std::sync::Arc;

use crate::error::FrameError;
use crate::protocol::codec;
use crate::protocol::dialect::Dialect;
use crate::protocol::frame::{Frame, MavlinkVersion, INCOMPAT_FLAG_SIGNED, MAGIC_V1, MAGIC_V2};
use crate::protocol::signing::{FrameVerifier, SecretKey, SIGNATURE_LEN};

/// Outcome of scanning one complete frame.
#[derive(Debug)]
pub enum ParserEvent {
    /// A valid frame.
    Frame(Frame),
    /// A recognized but invalid frame, with the raw bytes consumed.
    Error {
        /// What went wrong.
        error: FrameError,
        /// The raw bytes of the rejected frame.
        raw: Vec<u8>,
    },
}

#[derive(Copy, Clone, Debug)]
enum State {
    Idle,
    Header(MavlinkVersion),
    Body { total_len: usize },
}

/// A single-connection frame parser.
///
/// Holds the dialect table and, when an incoming key is configured, the
/// signature verification state of the connection.
#[derive(Debug)]
pub struct Parser {
    dialect: Arc<Dialect>,
    verifier: Option<FrameVerifier>,
    state: State,
    buf: Vec<u8>,
}

impl Parser {
    /// Creates a parser over a dialect, with an optional incoming signature
    /// key.
    pub fn new(dialect: Arc<Dialect>, incoming_key: Option<SecretKey>) -> Self {
        Self {
            dialect,
            verifier: incoming_key.map(FrameVerifier::new),
            state: State::Idle,
            buf: Vec::new(),
        }
    }

    /// Feeds a chunk of bytes into the scanner and returns the frames and
    /// frame errors completed by it.
    ///
    /// The parser never blocks; partial frames stay buffered until the next
    /// call.
    pub fn consume(&mut self, bytes: &[u8]) -> Vec<ParserEvent> {
        let mut events = Vec::new();
        for &byte in bytes {
            self.push_byte(byte, &mut events);
        }
        events
    }

    fn push_byte(&mut self, byte: u8, events: &mut Vec<ParserEvent>) {
        match self.state {
            State::Idle => {
                let version = match byte {
                    MAGIC_V1 => MavlinkVersion::V1,
                    MAGIC_V2 => MavlinkVersion::V2,
                    // Stray byte between frames: resynchronize silently.
                    _ => return,
                };
                self.buf.clear();
                self.buf.push(byte);
                self.state = State::Header(version);
            }
            State::Header(version) => {
                self.buf.push(byte);

                if version == MavlinkVersion::V2
                    && self.buf.len() == 3
                    && byte & !INCOMPAT_FLAG_SIGNED != 0
                {
                    self.reject(FrameError::InvalidIncompatFlags(byte), events);
                    return;
                }

                let header_len = version.header_len();
                if self.buf.len() == header_len {
                    let mut total_len = header_len + self.buf[1] as usize + 2;
                    if version == MavlinkVersion::V2
                        && self.buf[2] & INCOMPAT_FLAG_SIGNED != 0
                    {
                        total_len += SIGNATURE_LEN;
                    }
                    self.state = State::Body { total_len };
                }
            }
            State::Body { total_len } => {
                self.buf.push(byte);
                if self.buf.len() == total_len {
                    let raw = mem::take(&mut self.buf);
                    self.state = State::Idle;
                    match codec::parse_frame(&raw, &self.dialect, self.verifier.as_mut()) {
                        Ok(frame) => events.push(ParserEvent::Frame(frame)),
                        Err(error) => events.push(ParserEvent::Error { error, raw }),
                    }
                }
            }
        }
    }

    fn reject(&mut self, error: FrameError, events: &mut Vec<ParserEvent>) {
        let raw = mem::take(&mut self.buf);
        self.state = State::Idle;
        events.push(ParserEvent::Error { error, raw });
    }
}

#[cfg(test)]
mod parser_tests {
    use super::*;
    use crate::protocol::codec::assemble_frame;
    use crate::protocol::minimal::Heartbeat;
    use crate::protocol::plan::MessagePlan;
    use crate::protocol::signing::FrameSigner;
    use crate::protocol::spec::Message;

    fn heartbeat_frame(version: MavlinkVersion, sequence: u8) -> Vec<u8> {
        let message = Heartbeat::default();
        let plan = MessagePlan::new(message.spec()).unwrap();
        assemble_frame(&plan, &message, version, sequence, 1, 1, None).unwrap()
    }

    fn signed_heartbeat_frame(signer: &FrameSigner) -> Vec<u8> {
        let message = Heartbeat::default();
        let plan = MessagePlan::new(message.spec()).unwrap();
        assemble_frame(&plan, &message, MavlinkVersion::V2, 0, 1, 1, Some(signer)).unwrap()
    }

    fn parser(incoming_key: Option<SecretKey>) -> Parser {
        Parser::new(Arc::new(Dialect::minimal()), incoming_key)
    }

    #[test]
    fn one_frame_per_wire_frame_byte_by_byte() {
        let raw = heartbeat_frame(MavlinkVersion::V2, 7);
        let mut parser = parser(None);

        let mut frames = 0;
        for &byte in &raw {
            for event in parser.consume(&[byte]) {
                match event {
                    ParserEvent::Frame(frame) => {
                        frames += 1;
                        assert_eq!(frame.sequence(), 7);
                    }
                    ParserEvent::Error { error, .. } => panic!("unexpected error: {error}"),
                }
            }
        }
        assert_eq!(frames, 1);
    }

    #[test]
    fn consecutive_frames_in_one_chunk() {
        let mut stream = heartbeat_frame(MavlinkVersion::V1, 0);
        stream.extend(heartbeat_frame(MavlinkVersion::V2, 1));
        stream.extend(heartbeat_frame(MavlinkVersion::V2, 2));

        let events = parser(None).consume(&stream);
        assert_eq!(events.len(), 3);
        for (i, event) in events.iter().enumerate() {
            match event {
                ParserEvent::Frame(frame) => assert_eq!(frame.sequence(), i as u8),
                ParserEvent::Error { error, .. } => panic!("unexpected error: {error}"),
            }
        }
    }

    #[test]
    fn stray_bytes_are_skipped() {
        let mut stream = vec![0x00, 0x42, 0x13];
        stream.extend(heartbeat_frame(MavlinkVersion::V2, 0));

        let events = parser(None).consume(&stream);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ParserEvent::Frame(_)));
    }

    #[test]
    fn corrupted_frame_produces_one_error_and_resyncs() {
        let mut corrupted = heartbeat_frame(MavlinkVersion::V2, 0);
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xFF;
        corrupted.extend(heartbeat_frame(MavlinkVersion::V2, 1));

        let events = parser(None).consume(&corrupted);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            ParserEvent::Error {
                error: FrameError::Checksum { .. },
                ..
            }
        ));
        assert!(matches!(events[1], ParserEvent::Frame(_)));
    }

    #[test]
    fn unknown_incompat_flags_are_rejected() {
        let mut raw = heartbeat_frame(MavlinkVersion::V2, 0);
        raw[2] = 0x02;

        let events = parser(None).consume(&raw);
        assert!(matches!(
            events[0],
            ParserEvent::Error {
                error: FrameError::InvalidIncompatFlags(0x02),
                ..
            }
        ));
    }

    #[test]
    fn signed_frames_verify_and_replays_are_rejected() {
        let signer = FrameSigner::new(SecretKey::new([0x4F; 32]));
        let raw = signed_heartbeat_frame(&signer);

        let mut parser = parser(Some(SecretKey::new([0x4F; 32])));

        let events = parser.consume(&raw);
        assert!(matches!(events[0], ParserEvent::Frame(ref frame) if frame.is_signed()));

        // Identical wire bytes again: same timestamp, same link.
        let events = parser.consume(&raw);
        assert!(matches!(
            events[0],
            ParserEvent::Error {
                error: FrameError::Replay { .. },
                ..
            }
        ));
    }

    #[test]
    fn unsigned_v2_frames_are_rejected_when_a_key_is_set() {
        let raw = heartbeat_frame(MavlinkVersion::V2, 0);
        let events = parser(Some(SecretKey::new([0x4F; 32]))).consume(&raw);
        assert!(matches!(
            events[0],
            ParserEvent::Error {
                error: FrameError::SignatureRequired,
                ..
            }
        ));
    }

    #[test]
    fn v1_frames_pass_unsigned_when_a_key_is_set() {
        let raw = heartbeat_frame(MavlinkVersion::V1, 0);
        let events = parser(Some(SecretKey::new([0x4F; 32]))).consume(&raw);
        assert!(matches!(events[0], ParserEvent::Frame(_)));
    }
}

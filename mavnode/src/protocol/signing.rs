//! MAVLink [message signing](https://mavlink.io/en/guide/message_signing.html).
//!
//! A node may hold two independent keys: the outgoing key signs emitted
//! `MAVLink 2` frames ([`FrameSigner`]), the incoming key admits signed
//! frames ([`FrameVerifier`], owned by each channel parser). Verification
//! enforces strictly increasing timestamps per `(link ID, system ID,
//! component ID)` tuple, which rejects replayed frames.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::error::{ConfigError, FrameError};

/// Length of the signature trailer of a signed `MAVLink 2` frame:
/// link `ID` (1) + timestamp (6) + signature (6).
pub const SIGNATURE_LEN: usize = 13;

/// Seconds between the Unix epoch and the MAVLink signing epoch
/// (2015-01-01T00:00:00Z).
const SIGNING_EPOCH_OFFSET_SECS: u64 = 1_420_070_400;

/// A 32-byte secret key used to sign and verify frames.
///
/// The key material is never printed by the [`Debug`] implementation.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    /// Creates a key from exactly 32 bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Creates a key from a slice, which must be exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ConfigError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(bytes))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for SecretKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Debug for SecretKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey(***)")
    }
}

/// A 48-bit MAVLink signature timestamp: 10 µs units since
/// 2015-01-01T00:00:00Z.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MavTimestamp(u64);

impl MavTimestamp {
    /// Timestamp for the current system time.
    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }

    /// Builds a timestamp from its raw 48-bit value.
    pub fn from_raw_u64(raw: u64) -> Self {
        Self(raw & 0x0000_FFFF_FFFF_FFFF)
    }

    /// Raw 48-bit value.
    pub fn as_raw_u64(&self) -> u64 {
        self.0
    }

    pub(crate) fn to_le_bytes(self) -> [u8; 6] {
        let bytes = self.0.to_le_bytes();
        [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]]
    }

    pub(crate) fn from_le_bytes(bytes: [u8; 6]) -> Self {
        let mut raw = [0u8; 8];
        raw[..6].copy_from_slice(&bytes);
        Self(u64::from_le_bytes(raw))
    }
}

impl From<SystemTime> for MavTimestamp {
    fn from(time: SystemTime) -> Self {
        let since_epoch = time
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;
        let signing_epoch_micros = SIGNING_EPOCH_OFFSET_SECS * 1_000_000;
        Self::from_raw_u64(since_epoch.saturating_sub(signing_epoch_micros) / 10)
    }
}

/// First 6 bytes of `SHA-256(key ‖ frame-through-crc ‖ link ‖ ts48le)`.
pub(crate) fn sign48(
    key: &SecretKey,
    frame_through_crc: &[u8],
    link_id: u8,
    timestamp: MavTimestamp,
) -> [u8; 6] {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(frame_through_crc);
    hasher.update([link_id]);
    hasher.update(timestamp.to_le_bytes());

    let digest = hasher.finalize();
    let mut signature = [0u8; 6];
    signature.copy_from_slice(&digest[..6]);
    signature
}

/// Outgoing signing state of a node: the key, the emitted link `ID`, and a
/// monotonically increasing timestamp.
pub(crate) struct FrameSigner {
    key: SecretKey,
    link_id: u8,
    last_timestamp: AtomicU64,
}

impl FrameSigner {
    pub(crate) fn new(key: SecretKey) -> Self {
        Self {
            key,
            link_id: 0,
            last_timestamp: AtomicU64::new(MavTimestamp::now().as_raw_u64()),
        }
    }

    pub(crate) fn key(&self) -> &SecretKey {
        &self.key
    }

    pub(crate) fn link_id(&self) -> u8 {
        self.link_id
    }

    /// Returns the next timestamp: the current time, or the last emitted
    /// value plus one when the clock has not advanced. Never decreases over
    /// the process lifetime.
    pub(crate) fn next_timestamp(&self) -> MavTimestamp {
        let now = MavTimestamp::now().as_raw_u64();
        let mut last = self.last_timestamp.load(Ordering::Acquire);
        loop {
            let next = now.max(last + 1);
            match self.last_timestamp.compare_exchange(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return MavTimestamp::from_raw_u64(next),
                Err(observed) => last = observed,
            }
        }
    }

    /// Signs a frame image that ends with its CRC, returning the trailer
    /// fields.
    pub(crate) fn sign(&self, frame_through_crc: &[u8]) -> (u8, MavTimestamp, [u8; 6]) {
        let timestamp = self.next_timestamp();
        let signature = sign48(&self.key, frame_through_crc, self.link_id, timestamp);
        (self.link_id, timestamp, signature)
    }
}

impl Debug for FrameSigner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSigner")
            .field("link_id", &self.link_id)
            .finish_non_exhaustive()
    }
}

/// Incoming signature verification state of one channel.
///
/// Owned by the channel parser; the per-link timestamp table is never shared
/// across channels.
#[derive(Debug)]
pub(crate) struct FrameVerifier {
    key: SecretKey,
    links: HashMap<(u8, u8, u8), u64>,
}

impl FrameVerifier {
    pub(crate) fn new(key: SecretKey) -> Self {
        Self {
            key,
            links: HashMap::new(),
        }
    }

    /// Verifies the signature of a frame image that ends with its CRC and
    /// enforces the monotonic timestamp rule for the frame's
    /// `(link, system, component)` tuple.
    pub(crate) fn verify(
        &mut self,
        frame_through_crc: &[u8],
        link_id: u8,
        timestamp: MavTimestamp,
        signature: &[u8; 6],
        system_id: u8,
        component_id: u8,
    ) -> Result<(), FrameError> {
        let expected = sign48(&self.key, frame_through_crc, link_id, timestamp);
        if &expected != signature {
            return Err(FrameError::InvalidSignature);
        }

        let key = (link_id, system_id, component_id);
        if let Some(&last) = self.links.get(&key) {
            if timestamp.as_raw_u64() <= last {
                return Err(FrameError::Replay {
                    timestamp: timestamp.as_raw_u64(),
                    last,
                });
            }
        }
        self.links.insert(key, timestamp.as_raw_u64());

        Ok(())
    }
}

#[cfg(test)]
mod signing_tests {
    use super::*;

    fn key(byte: u8) -> SecretKey {
        SecretKey::new([byte; 32])
    }

    #[test]
    fn key_length_is_enforced() {
        assert!(SecretKey::from_slice(&[0u8; 32]).is_ok());
        assert!(matches!(
            SecretKey::from_slice(&[0u8; 16]),
            Err(ConfigError::InvalidKeyLength(16))
        ));
    }

    #[test]
    fn timestamp_round_trips_through_six_bytes() {
        let timestamp = MavTimestamp::from_raw_u64(0x0000_0123_4567_89AB);
        let bytes = timestamp.to_le_bytes();
        assert_eq!(bytes, [0xAB, 0x89, 0x67, 0x45, 0x23, 0x01]);
        assert_eq!(MavTimestamp::from_le_bytes(bytes), timestamp);
    }

    #[test]
    fn timestamps_never_decrease() {
        let signer = FrameSigner::new(key(0x4F));
        let mut last = signer.next_timestamp();
        for _ in 0..1000 {
            let next = signer.next_timestamp();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn verification_accepts_then_rejects_replay() {
        let signer = FrameSigner::new(key(0x4F));
        let mut verifier = FrameVerifier::new(key(0x4F));

        let frame = [0xFDu8, 0x09, 0x01, 0x00];
        let (link_id, timestamp, signature) = signer.sign(&frame);

        assert!(verifier
            .verify(&frame, link_id, timestamp, &signature, 10, 1)
            .is_ok());
        assert!(matches!(
            verifier.verify(&frame, link_id, timestamp, &signature, 10, 1),
            Err(FrameError::Replay { .. })
        ));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let signer = FrameSigner::new(key(0x4F));
        let mut verifier = FrameVerifier::new(key(0xA8));

        let frame = [0xFDu8, 0x09, 0x01, 0x00];
        let (link_id, timestamp, signature) = signer.sign(&frame);

        assert!(matches!(
            verifier.verify(&frame, link_id, timestamp, &signature, 10, 1),
            Err(FrameError::InvalidSignature)
        ));
    }

    #[test]
    fn independent_links_have_independent_timestamps() {
        let mut verifier = FrameVerifier::new(key(0x11));
        let frame = [0xFDu8; 8];
        let timestamp = MavTimestamp::from_raw_u64(100);

        let sig_a = sign48(&key(0x11), &frame, 1, timestamp);
        assert!(verifier.verify(&frame, 1, timestamp, &sig_a, 10, 1).is_ok());

        // Same timestamp is fine for another source on the same channel.
        let sig_b = sign48(&key(0x11), &frame, 1, timestamp);
        assert!(verifier.verify(&frame, 1, timestamp, &sig_b, 11, 1).is_ok());
    }
}

//! Process-unique identifiers.

use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier, unique within the program run.
///
/// Used to compare runtime entities such as channels. Intentionally not
/// serializable.
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct UniqueId(u64);

impl UniqueId {
    /// Generates the next unique identifier.
    pub fn new() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for UniqueId {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for UniqueId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("UniqueId").field(&self.0).finish()
    }
}

//! # Utilities
//!
//! Synchronization and I/O helpers shared by the transports and the node
//! runtime.

pub mod closable;
mod mpsc_rw;
mod unique_id;

pub use closable::{Closable, Closer, SharedCloser};
pub use mpsc_rw::{MpscReader, MpscWriter};
pub use unique_id::UniqueId;

use std::thread;
use std::time::{Duration, Instant};

use crate::consts::SLEEP_POOLING_INTERVAL;

/// Sleeps for `duration`, waking up early when `state` is closed.
pub(crate) fn sleep_while_open(state: &Closable, duration: Duration) {
    let deadline = Instant::now() + duration;
    while !state.is_closed() {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return;
        }
        thread::sleep(left.min(SLEEP_POOLING_INTERVAL));
    }
}

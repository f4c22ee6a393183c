//! Close-state primitives for distributed tasks.
//!
//! A [`Closer`] is owned by the entity that controls a resource (a node, a
//! server listener). [`SharedCloser`] is its cloneable counterpart used when
//! several tasks co-own a resource (the reader and writer of one channel).
//! [`Closable`] is a read-only view handed to dependent loops, which stop
//! once the owner is gone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Close state owned by a single controlling task.
///
/// Closing is one-way and idempotent. The owner closes explicitly or by
/// dropping the closer.
#[derive(Debug)]
pub struct Closer(Arc<AtomicBool>);

impl Closer {
    /// Creates an open closer.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Returns a read-only view of the close state.
    pub fn as_closable(&self) -> Closable {
        Closable(self.0.clone())
    }

    /// Closes the resource.
    pub fn close(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns `true` if the resource is closed.
    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for Closer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Closer {
    fn drop(&mut self) {
        self.close()
    }
}

/// Close state co-owned by several tasks.
///
/// Unlike [`Closer`], dropping one copy does not close the resource; any
/// copy may close it explicitly.
#[derive(Clone, Debug, Default)]
pub struct SharedCloser(Arc<AtomicBool>);

impl SharedCloser {
    /// Creates an open shared closer.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Returns a read-only view of the close state.
    pub fn as_closable(&self) -> Closable {
        Closable(self.0.clone())
    }

    /// Closes the resource.
    pub fn close(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns `true` if the resource is closed.
    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Read-only view of a close state.
#[derive(Clone, Debug)]
pub struct Closable(Arc<AtomicBool>);

impl Closable {
    /// Returns `true` if the resource is closed.
    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

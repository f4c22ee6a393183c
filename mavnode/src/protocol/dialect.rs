//! Dialect: the message `ID` → message plan table of a node.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use crate::error::SpecError;
use crate::protocol::plan::MessagePlan;
use crate::protocol::spec::MessageSpec;

/// A dialect entry: the static message specification plus its computed plan.
#[derive(Debug)]
pub(crate) struct DialectEntry {
    pub(crate) spec: &'static MessageSpec,
    pub(crate) plan: MessagePlan,
}

/// A set of message definitions with unique `ID`s, compiled into per-message
/// plans.
///
/// # Usage
///
/// ```rust
/// use mavnode::protocol::minimal::{Heartbeat, RequestDataStream};
/// use mavnode::protocol::Dialect;
///
/// let dialect = Dialect::new(&[
///     Heartbeat::message_spec(),
///     RequestDataStream::message_spec(),
/// ]).unwrap();
///
/// assert!(dialect.contains(0));
/// ```
pub struct Dialect {
    entries: HashMap<u32, DialectEntry>,
}

impl Dialect {
    /// Compiles a dialect from message specifications.
    ///
    /// Fails on duplicate message `ID`s or an invalid message declaration.
    pub fn new(specs: &[&'static MessageSpec]) -> Result<Self, SpecError> {
        let mut entries = HashMap::with_capacity(specs.len());

        for &spec in specs {
            if entries.contains_key(&spec.id) {
                return Err(SpecError::DuplicateMessageId(spec.id));
            }
            let plan = MessagePlan::new(spec)?;
            entries.insert(spec.id, DialectEntry { spec, plan });
        }

        Ok(Dialect { entries })
    }

    /// The built-in minimal dialect: [`Heartbeat`] and [`RequestDataStream`].
    ///
    /// [`Heartbeat`]: crate::protocol::minimal::Heartbeat
    /// [`RequestDataStream`]: crate::protocol::minimal::RequestDataStream
    pub fn minimal() -> Self {
        use crate::protocol::minimal::{Heartbeat, RequestDataStream};

        match Self::new(&[Heartbeat::message_spec(), RequestDataStream::message_spec()]) {
            Ok(dialect) => dialect,
            Err(_) => unreachable!("the built-in dialect is valid"),
        }
    }

    /// Returns `true` if the dialect contains a message with the given `ID`.
    pub fn contains(&self, id: u32) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of messages in the dialect.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the dialect has no messages.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Plan of a message, if present.
    pub fn plan(&self, id: u32) -> Option<&MessagePlan> {
        self.entries.get(&id).map(|entry| &entry.plan)
    }

    pub(crate) fn get(&self, id: u32) -> Option<&DialectEntry> {
        self.entries.get(&id)
    }
}

impl Debug for Dialect {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<u32> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("Dialect").field("message_ids", &ids).finish()
    }
}

#[cfg(test)]
mod dialect_tests {
    use super::*;
    use crate::protocol::minimal::Heartbeat;

    #[test]
    fn duplicate_message_ids_are_rejected() {
        let result = Dialect::new(&[Heartbeat::message_spec(), Heartbeat::message_spec()]);
        assert!(matches!(result, Err(SpecError::DuplicateMessageId(0))));
    }

    #[test]
    fn lookup_by_id() {
        let dialect = Dialect::minimal();
        assert!(dialect.contains(0));
        assert!(dialect.contains(66));
        assert!(!dialect.contains(1));
        assert_eq!(dialect.plan(0).unwrap().size_v2(), 9);
    }
}

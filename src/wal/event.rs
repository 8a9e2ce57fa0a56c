//! Transaction log event types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Strictly increasing order position assigned to an event by the backend.
///
/// The backend is the sole sequence authority: sequences are assigned at
/// persist time, never by the submitting caller, and are never reused within
/// one backend instance. 0 means "not yet assigned".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Sequence(pub u64);

impl Sequence {
    /// Create a new, unassigned sequence.
    pub fn new() -> Self {
        Sequence(0)
    }

    /// Get the next sequence.
    pub fn next(&self) -> Self {
        Sequence(self.0 + 1)
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of mutation a log event captures. No other kinds exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Put,
    Delete,
}

impl EventKind {
    /// Stable integer code used by the relational backend's `event_type`
    /// column.
    pub fn code(self) -> i64 {
        match self {
            EventKind::Put => 1,
            EventKind::Delete => 2,
        }
    }

    /// Decode an `event_type` column value.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(EventKind::Put),
            2 => Some(EventKind::Delete),
            _ => None,
        }
    }
}

/// One durable record of a single store mutation.
///
/// `value` carries no meaning for `Delete` events and is stored as an empty
/// string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Order position assigned by the backend at persist time.
    pub sequence: Sequence,
    /// Kind of mutation.
    pub kind: EventKind,
    /// Store key the mutation applies to.
    pub key: String,
    /// New value for `Put`; empty for `Delete`.
    pub value: String,
}

impl Event {
    /// Build a put event.
    pub fn put(sequence: Sequence, key: &str, value: &str) -> Self {
        Event {
            sequence,
            kind: EventKind::Put,
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    /// Build a delete event.
    pub fn delete(sequence: Sequence, key: &str) -> Self {
        Event {
            sequence,
            kind: EventKind::Delete,
            key: key.to_string(),
            value: String::new(),
        }
    }

    /// Serialize the event to bytes.
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize an event from bytes.
    pub fn deserialize(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

/// A submitted mutation waiting in the queue for the persister to assign it a
/// sequence and write it to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub kind: EventKind,
    pub key: String,
    pub value: String,
}

impl Mutation {
    /// Build a put submission.
    pub fn put(key: &str, value: &str) -> Self {
        Mutation {
            kind: EventKind::Put,
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    /// Build a delete submission.
    pub fn delete(key: &str) -> Self {
        Mutation {
            kind: EventKind::Delete,
            key: key.to_string(),
            value: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_ordering() {
        let first = Sequence::new().next();
        let second = first.next();
        assert_eq!(first, Sequence(1));
        assert_eq!(second, Sequence(2));
        assert!(first < second);
    }

    #[test]
    fn test_event_kind_codes() {
        assert_eq!(
            EventKind::from_code(EventKind::Put.code()),
            Some(EventKind::Put)
        );
        assert_eq!(
            EventKind::from_code(EventKind::Delete.code()),
            Some(EventKind::Delete)
        );
        assert_eq!(EventKind::from_code(0), None);
        assert_eq!(EventKind::from_code(99), None);
    }

    #[test]
    fn test_event_serialization_roundtrip() {
        let event = Event::put(Sequence(7), "alpha", "one");
        let bytes = event.serialize().unwrap();
        let decoded = Event::deserialize(&bytes).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_delete_event_has_empty_value() {
        let event = Event::delete(Sequence(1), "alpha");
        assert_eq!(event.value, "");
        assert_eq!(Mutation::delete("alpha").value, "");
    }
}

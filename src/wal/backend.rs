//! Backend contract shared by the file and SQLite transaction logs.

use super::event::{Event, EventKind, Sequence};
use super::Result;

/// Durable append target for the transaction log.
///
/// A backend instance is owned by exactly one [`super::TransactionLogger`];
/// all appends go through that logger's single persister task, which is what
/// keeps sequence assignment serialized. An event is durable only once
/// `append` has returned `Ok`.
pub trait LogBackend: Send {
    /// Persist one event and return the sequence the backend assigned to it.
    fn append(&mut self, kind: EventKind, key: &str, value: &str) -> Result<Sequence>;

    /// Visit every persisted event, oldest sequence first.
    ///
    /// The visitor returns `false` to stop the scan early. A record that
    /// cannot be decoded terminates the scan with an error.
    fn scan(&mut self, visit: &mut dyn FnMut(Event) -> bool) -> Result<()>;

    /// Highest sequence persisted so far; `Sequence(0)` for an empty log.
    fn last_sequence(&self) -> Sequence;

    /// Flush outstanding writes and release the underlying resource.
    fn close(&mut self) -> Result<()>;
}

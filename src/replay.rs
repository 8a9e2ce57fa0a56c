//! Startup replay of the transaction log.
//!
//! Before the service accepts traffic, every persisted event is applied to a
//! fresh in-memory store in sequence order. Replay is fail-fast: any log
//! error or domain inconsistency aborts startup, because an unreplayable log
//! means the store state cannot be trusted.

use thiserror::Error;

use crate::store::{KeyValueStore, StoreError};
use crate::wal::{Event, EventKind, LogError, Sequence, TransactionLogger};

/// Errors that abort startup replay.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("transaction log read failed: {0}")]
    Log(#[from] LogError),

    #[error("inconsistent log: delete of missing key {key:?} at sequence {sequence}")]
    MissingKey { key: String, sequence: Sequence },

    #[error("inconsistent log: sequence {found} after {previous}")]
    OutOfOrder { previous: Sequence, found: Sequence },
}

/// Replay the whole transaction log into `store`.
///
/// Consumes the event feed and the error feed from
/// [`TransactionLogger::read_events`] and applies each event in order.
/// Returns the number of events applied. Must complete before
/// [`TransactionLogger::run`] is called and before any request is served.
pub async fn restore(
    store: &KeyValueStore,
    logger: &TransactionLogger,
) -> Result<u64, ReplayError> {
    let (mut events, mut errors) = logger.read_events();

    let mut applied = 0u64;
    let mut last = Sequence::new();

    while let Some(event) = events.recv().await {
        if event.sequence <= last {
            return Err(ReplayError::OutOfOrder {
                previous: last,
                found: event.sequence,
            });
        }
        last = event.sequence;

        apply(store, &event)?;
        applied += 1;
    }

    // The scan task has exited once the event feed closes, so its terminal
    // error, if any, is already buffered on the side feed.
    if let Ok(err) = errors.try_recv() {
        return Err(ReplayError::Log(err));
    }

    Ok(applied)
}

fn apply(store: &KeyValueStore, event: &Event) -> Result<(), ReplayError> {
    match event.kind {
        EventKind::Put => {
            store.put(&event.key, &event.value);
            Ok(())
        }
        EventKind::Delete => match store.delete(&event.key) {
            Ok(()) => Ok(()),
            Err(StoreError::KeyNotFound(key)) => Err(ReplayError::MissingKey {
                key,
                sequence: event.sequence,
            }),
        },
    }
}

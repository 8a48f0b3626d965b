use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{
    error::JournalError,
    event::{AtomicWrite, ReplayedEvent}
};

/// The journal's contract to its hosting framework
#[async_trait]
pub trait Journal: Send + Sync {
    /// Persists atomic writes for one persistence id
    ///
    /// The result vector corresponds 1:1 positionally to the input batches;
    /// each entry is success or a backing-store failure. Precondition and
    /// serialization errors fail the whole call instead.
    async fn write_atomic_batches(
        &self,
        batches: Vec<AtomicWrite>
    ) -> Result<Vec<Result<(), JournalError>>, JournalError>;

    /// Logically deletes all events with sequence nr <= `to_sequence_nr`
    ///
    /// `i64::MAX` means "delete everything currently stored". Physical
    /// deletion is best-effort; the logical marker is authoritative.
    async fn delete_to(&self, persistence_id: &str, to_sequence_nr: i64) -> Result<(), JournalError>;

    /// Highest stored sequence nr at or above `from_sequence_nr`, tolerant of
    /// deletion holes and partition-spanning writes
    async fn highest_sequence_nr(&self, persistence_id: &str, from_sequence_nr: i64) -> Result<i64, JournalError>;

    /// Streams committed events with sequence nr in `[from, to]` into `sink`,
    /// in ascending order, at most `max` of them, exactly once each
    async fn replay_messages(
        &self,
        persistence_id: &str,
        from_sequence_nr: i64,
        to_sequence_nr: i64,
        max: u64,
        sink: mpsc::Sender<ReplayedEvent>
    ) -> Result<(), JournalError>;
}

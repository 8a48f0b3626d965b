//! Domain Events - Structured events for internal monitoring and debugging

/// Journal Actor Events
pub mod journal {
    pub const JOURNAL_STARTED: &str = "journal.started";
    pub const STATEMENTS_PREPARED: &str = "statements.prepared";
    pub const WRITE_RECEIVED: &str = "write.received";
    pub const WRITE_COMPLETED: &str = "write.completed";
    pub const WRITE_FAILED: &str = "write.failed";
    pub const WRITE_REJECTED: &str = "write.rejected";
    pub const DELETE_RECEIVED: &str = "delete.received";
    pub const DELETE_QUEUED: &str = "delete.queued";
    pub const DELETE_BACKPRESSURE: &str = "delete.backpressure";
    pub const DELETE_COMPLETED: &str = "delete.completed";
    pub const DELETE_FAILED: &str = "delete.failed";
    pub const PHYSICAL_DELETE_FAILED: &str = "delete.physical_failed";
    pub const HIGHEST_REQUESTED: &str = "highest.requested";
    pub const REPLAY_STARTED: &str = "replay.started";
    pub const REPLAY_COMPLETED: &str = "replay.completed";
    pub const REPLAY_FAILED: &str = "replay.failed";
    pub const TAG_RECOVERY_FAILED: &str = "tag_recovery.failed";
    pub const FATAL_ERROR: &str = "journal.fatal_error";
    pub const SHUTDOWN_TRIGGERED: &str = "journal.shutdown_triggered";
}

/// TagWriter Actor Events
pub mod tag_writer {
    pub const WRITER_STARTED: &str = "tag_writer.started";
    pub const BULK_WRITE_RECEIVED: &str = "tag_writer.bulk_write_received";
    pub const TAG_WRITE_FAILED: &str = "tag_writer.write_failed";
    pub const PROGRESS_RESTORED: &str = "tag_writer.progress_restored";
    pub const PROGRESS_LOAD_FAILED: &str = "tag_writer.progress_load_failed";
    pub const FLUSHED: &str = "tag_writer.flushed";
}

use serde::{Deserialize, Serialize};

use crate::domain::{bucket::BucketSize, error::JournalError};

/// Journal configuration
///
/// `target_partition_size` must never change on an existing dataset; rows
/// already placed would no longer be found by the partition walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Partition width in events
    pub target_partition_size:         i64,
    /// Threshold above which a write call is chunked into sequential batches
    pub max_message_batch_size:        usize,
    /// Per-persistence-id bound on queued deletes
    pub max_concurrent_deletes:        usize,
    /// When false, `delete_to` fails with an unsupported error
    pub support_deletes:               bool,
    /// Selects per-row deletes instead of partition-range deletes
    pub cassandra_2x_compat:           bool,
    /// Gates the tag writer and the pre-snapshot tag scan
    pub events_by_tag_enabled:         bool,
    /// Execution profile bound to every write statement
    pub write_profile:                 String,
    /// Execution profile bound to every read statement
    pub read_profile:                  String,
    /// When true, a fatal journal error notifies the shutdown signal
    pub coordinated_shutdown_on_error: bool,
    /// Width of tag-view time windows
    pub bucket_size:                   BucketSize,
    /// Lower bound for the pre-snapshot tag-view scan
    pub tag_scan_start_sequence_nr:    i64
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            target_partition_size: 500_000,
            max_message_batch_size: 150,
            max_concurrent_deletes: 16,
            support_deletes: true,
            cassandra_2x_compat: false,
            events_by_tag_enabled: true,
            write_profile: "journal-write".to_string(),
            read_profile: "journal-read".to_string(),
            coordinated_shutdown_on_error: false,
            bucket_size: BucketSize::Hour,
            tag_scan_start_sequence_nr: 1
        }
    }
}

impl JournalConfig {
    pub fn validate(&self) -> Result<(), JournalError> {
        if self.target_partition_size < 1 {
            return Err(JournalError::Precondition("target_partition_size must be at least 1".to_string()));
        }
        if self.max_message_batch_size < 1 {
            return Err(JournalError::Precondition("max_message_batch_size must be at least 1".to_string()));
        }
        if self.support_deletes && self.max_concurrent_deletes < 1 {
            return Err(JournalError::Precondition("max_concurrent_deletes must be at least 1".to_string()));
        }
        Ok(())
    }
}

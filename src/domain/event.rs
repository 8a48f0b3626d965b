//! Event representations along the write and read paths
//!
//! An [`EventEnvelope`] is what the hosting framework hands the journal; an
//! [`AtomicWrite`] is a validated all-or-nothing group of envelopes for one
//! persistence id; a [`SerializedRow`] is the storage form produced by the
//! serializer gateway; a [`ReplayedEvent`] is the decoded form handed back
//! during replay.

use std::{collections::BTreeSet, sync::Arc};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::JournalError;

/// A single event as submitted by the hosting framework
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Stream this event belongs to
    pub persistence_id: String,
    /// Strictly monotonic per persistence id, starting at 1
    pub sequence_nr:    i64,
    /// Identity of the writing actor instance
    pub writer_uuid:    String,
    /// Event-adapter manifest carried through storage untouched
    pub manifest:       String,
    /// Opaque domain payload
    pub payload:        serde_json::Value,
    /// Tags making the event visible in by-tag queries
    pub tags:           BTreeSet<String>,
    /// Optional metadata, serialized independently of the payload
    pub metadata:       Option<serde_json::Value>
}

impl EventEnvelope {
    pub fn new(
        persistence_id: impl Into<String>,
        sequence_nr: i64,
        writer_uuid: impl Into<String>,
        payload: serde_json::Value
    ) -> Self {
        Self {
            persistence_id: persistence_id.into(),
            sequence_nr,
            writer_uuid: writer_uuid.into(),
            manifest: String::new(),
            payload,
            tags: BTreeSet::new(),
            metadata: None
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_manifest(mut self, manifest: impl Into<String>) -> Self {
        self.manifest = manifest.into();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// An ordered, non-empty group of events for one persistence id with
/// contiguous sequence numbers, committed all-or-nothing
#[derive(Debug, Clone)]
pub struct AtomicWrite {
    persistence_id: String,
    events:         Vec<EventEnvelope>
}

impl AtomicWrite {
    pub fn new(events: Vec<EventEnvelope>) -> Result<Self, JournalError> {
        let first = events
            .first()
            .ok_or_else(|| JournalError::Precondition("atomic write must contain at least one event".to_string()))?;
        let persistence_id = first.persistence_id.clone();

        let writer_uuid = first.writer_uuid.clone();
        let mut expected = first.sequence_nr;
        for event in &events {
            if event.persistence_id != persistence_id {
                return Err(JournalError::Precondition(format!(
                    "atomic write mixes persistence ids '{}' and '{}'",
                    persistence_id, event.persistence_id
                )));
            }
            if event.writer_uuid != writer_uuid {
                return Err(JournalError::Precondition(format!(
                    "atomic write for '{}' mixes writer uuids '{}' and '{}'",
                    persistence_id, writer_uuid, event.writer_uuid
                )));
            }
            if event.sequence_nr != expected {
                return Err(JournalError::Precondition(format!(
                    "atomic write for '{}' is not contiguous: expected sequence nr {}, got {}",
                    persistence_id, expected, event.sequence_nr
                )));
            }
            expected += 1;
        }

        Ok(Self { persistence_id, events })
    }

    pub fn persistence_id(&self) -> &str {
        &self.persistence_id
    }

    pub fn events(&self) -> &[EventEnvelope] {
        &self.events
    }

    pub fn lowest_sequence_nr(&self) -> i64 {
        self.events[0].sequence_nr
    }

    pub fn highest_sequence_nr(&self) -> i64 {
        self.events[self.events.len() - 1].sequence_nr
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Independently serialized event metadata
#[derive(Debug, Clone)]
pub struct SerializedMeta {
    pub payload:      Vec<u8>,
    pub ser_id:       i32,
    pub ser_manifest: String
}

/// The storage row: one event, serialized and placed into a partition
#[derive(Debug, Clone)]
pub struct SerializedRow {
    pub persistence_id:         String,
    pub partition_nr:           i64,
    pub sequence_nr:            i64,
    pub time_uuid:              Uuid,
    pub time_bucket:            String,
    pub writer_uuid:            String,
    pub event_payload:          Vec<u8>,
    pub ser_id:                 i32,
    pub ser_manifest:           String,
    pub event_adapter_manifest: String,
    pub tags:                   BTreeSet<String>,
    pub meta:                   Option<SerializedMeta>
}

/// Metadata recovered during replay
///
/// Unknown metadata is carried as an opaque blob instead of failing the
/// event, so readers built before a metadata schema change keep working.
#[derive(Debug, Clone)]
pub enum ReplayedMeta {
    Decoded(serde_json::Value),
    Unknown {
        ser_id:       i32,
        ser_manifest: String,
        payload:      Vec<u8>
    }
}

/// A decoded event delivered by the replay cursor
#[derive(Debug, Clone)]
pub struct ReplayedEvent {
    pub persistence_id: String,
    pub sequence_nr:    i64,
    pub writer_uuid:    String,
    pub manifest:       String,
    pub payload:        serde_json::Value,
    pub tags:           BTreeSet<String>,
    pub metadata:       Option<ReplayedMeta>,
    pub time_uuid:      Uuid
}

/// All events of one batch carrying a given tag, in original order
#[derive(Debug, Clone)]
pub struct TagWrite {
    pub tag:    String,
    pub events: Vec<Arc<SerializedRow>>
}

/// One batch's fan-out to the tag writer
#[derive(Debug, Clone)]
pub struct BulkTagWrite {
    pub tag_writes:   Vec<TagWrite>,
    pub without_tags: Vec<Arc<SerializedRow>>
}

impl BulkTagWrite {
    /// Groups rows by tag, preserving event order within each tag
    pub fn from_rows(rows: &[Arc<SerializedRow>]) -> Self {
        // single-event batches are the common case and need no grouping
        if let [row] = rows {
            return if row.tags.is_empty() {
                Self { tag_writes: Vec::new(), without_tags: vec![row.clone()] }
            } else {
                let tag_writes = row
                    .tags
                    .iter()
                    .map(|tag| TagWrite { tag: tag.clone(), events: vec![row.clone()] })
                    .collect();
                Self { tag_writes, without_tags: Vec::new() }
            };
        }

        let mut tag_writes: Vec<TagWrite> = Vec::new();
        let mut without_tags = Vec::new();
        for row in rows {
            if row.tags.is_empty() {
                without_tags.push(row.clone());
                continue;
            }
            for tag in &row.tags {
                match tag_writes.iter_mut().find(|tw| tw.tag == *tag) {
                    Some(tw) => tw.events.push(row.clone()),
                    None => tag_writes.push(TagWrite { tag: tag.clone(), events: vec![row.clone()] })
                }
            }
        }

        Self { tag_writes, without_tags }
    }

    pub fn is_empty(&self) -> bool {
        self.tag_writes.is_empty() && self.without_tags.is_empty()
    }
}

/// One materialized tag-view row, as read back by the by-tag scan
#[derive(Debug, Clone)]
pub struct TagViewRow {
    pub tag:                 String,
    pub time_bucket:         String,
    pub time_uuid:           Uuid,
    pub persistence_id:      String,
    pub tag_pid_sequence_nr: i64,
    pub sequence_nr:         i64,
    pub writer_uuid:         String,
    pub event_payload:       Vec<u8>,
    pub ser_id:              i32,
    pub ser_manifest:        String,
    pub event_manifest:      String
}

/// Per-(persistence id, tag) watermark of the tag view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagProgress {
    /// Highest event sequence nr materialized into the tag view
    pub sequence_nr:         i64,
    /// Dense per-(persistence id, tag) counter of tag-view rows
    pub tag_pid_sequence_nr: i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(pid: &str, sequence_nr: i64) -> EventEnvelope {
        EventEnvelope::new(pid, sequence_nr, "writer-1", serde_json::json!({ "n": sequence_nr }))
    }

    fn row(sequence_nr: i64, tags: &[&str]) -> Arc<SerializedRow> {
        Arc::new(SerializedRow {
            persistence_id: "a".to_string(),
            partition_nr: 0,
            sequence_nr,
            time_uuid: Uuid::new_v4(),
            time_bucket: "20240101".to_string(),
            writer_uuid: "writer-1".to_string(),
            event_payload: vec![1, 2, 3],
            ser_id: 1,
            ser_manifest: "json".to_string(),
            event_adapter_manifest: String::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            meta: None
        })
    }

    #[test]
    fn test_atomic_write_rejects_empty() {
        assert!(matches!(AtomicWrite::new(vec![]), Err(JournalError::Precondition(_))));
    }

    #[test]
    fn test_atomic_write_rejects_mixed_persistence_ids() {
        let result = AtomicWrite::new(vec![envelope("a", 1), envelope("b", 2)]);
        assert!(matches!(result, Err(JournalError::Precondition(_))));
    }

    #[test]
    fn test_atomic_write_rejects_sequence_gaps() {
        let result = AtomicWrite::new(vec![envelope("a", 1), envelope("a", 3)]);
        assert!(matches!(result, Err(JournalError::Precondition(_))));
    }

    #[test]
    fn test_atomic_write_rejects_mixed_writers() {
        let second = EventEnvelope::new("a", 2, "writer-2", serde_json::json!({}));
        let result = AtomicWrite::new(vec![envelope("a", 1), second]);
        assert!(matches!(result, Err(JournalError::Precondition(_))));
    }

    #[test]
    fn test_atomic_write_bounds() {
        let write = AtomicWrite::new(vec![envelope("a", 4), envelope("a", 5), envelope("a", 6)]).unwrap();
        assert_eq!(write.persistence_id(), "a");
        assert_eq!(write.lowest_sequence_nr(), 4);
        assert_eq!(write.highest_sequence_nr(), 6);
        assert_eq!(write.len(), 3);
    }

    #[test]
    fn test_bulk_tag_write_single_tagged_event() {
        let bulk = BulkTagWrite::from_rows(&[row(1, &["red"])]);
        assert_eq!(bulk.tag_writes.len(), 1);
        assert_eq!(bulk.tag_writes[0].tag, "red");
        assert_eq!(bulk.tag_writes[0].events.len(), 1);
        assert!(bulk.without_tags.is_empty());
    }

    #[test]
    fn test_bulk_tag_write_single_untagged_event() {
        let bulk = BulkTagWrite::from_rows(&[row(1, &[])]);
        assert!(bulk.tag_writes.is_empty());
        assert_eq!(bulk.without_tags.len(), 1);
    }

    #[test]
    fn test_bulk_tag_write_groups_by_tag_in_order() {
        let rows = vec![row(1, &["red"]), row(2, &["red", "blue"]), row(3, &[]), row(4, &["blue"])];
        let bulk = BulkTagWrite::from_rows(&rows);

        let red = bulk.tag_writes.iter().find(|tw| tw.tag == "red").unwrap();
        let red_seqs: Vec<i64> = red.events.iter().map(|e| e.sequence_nr).collect();
        assert_eq!(red_seqs, vec![1, 2]);

        let blue = bulk.tag_writes.iter().find(|tw| tw.tag == "blue").unwrap();
        let blue_seqs: Vec<i64> = blue.events.iter().map(|e| e.sequence_nr).collect();
        assert_eq!(blue_seqs, vec![2, 4]);

        assert_eq!(bulk.without_tags.len(), 1);
        assert_eq!(bulk.without_tags[0].sequence_nr, 3);
    }
}

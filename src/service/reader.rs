//! Read paths: sequence-number probes and the replay cursor
//!
//! Both walk the stream partition by partition. A partition can be entirely
//! empty even though later ones hold rows, because an atomic write is placed
//! in the partition of its last event; the walk therefore only stops after
//! two consecutive empty partitions.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::mpsc;

use crate::{
    adapter::serializer::SerializerGateway,
    domain::{
        error::JournalError,
        event::{ReplayedEvent, SerializedMeta, SerializedRow, TagProgress, TagViewRow},
        partition
    },
    port::session::{Row, Session},
    service::{config::JournalConfig, statements::JournalStatements}
};

pub struct JournalReader {
    session:    Arc<dyn Session>,
    statements: Arc<JournalStatements>,
    gateway:    Arc<SerializerGateway>,
    config:     JournalConfig
}

impl JournalReader {
    pub fn new(
        session: Arc<dyn Session>,
        statements: Arc<JournalStatements>,
        gateway: Arc<SerializerGateway>,
        config: JournalConfig
    ) -> Self {
        Self { session, statements, gateway, config }
    }

    /// Logical-delete watermark; a missing marker row means 0
    pub async fn read_deleted_to(&self, persistence_id: &str) -> Result<i64, JournalError> {
        let bound = self.statements.bind_select_deleted_to(persistence_id, &self.config.read_profile);
        let rows = self.session.execute(&bound).await?;
        match rows.first() {
            Some(row) => row.bigint("deleted_to"),
            None => Ok(0)
        }
    }

    /// Highest stored sequence nr within one partition, if any
    pub async fn highest_in_partition(
        &self,
        persistence_id: &str,
        partition_nr: i64
    ) -> Result<Option<i64>, JournalError> {
        let bound = self.statements.bind_select_highest(persistence_id, partition_nr, &self.config.read_profile);
        let rows = self.session.execute(&bound).await?;
        rows.first().map(|row| row.bigint("sequence_nr")).transpose()
    }

    /// Lowest stored sequence nr within one partition, if any
    pub async fn lowest_in_partition(
        &self,
        persistence_id: &str,
        partition_nr: i64
    ) -> Result<Option<i64>, JournalError> {
        let bound = self.statements.bind_select_lowest(persistence_id, partition_nr, &self.config.read_profile);
        let rows = self.session.execute(&bound).await?;
        rows.first().map(|row| row.bigint("sequence_nr")).transpose()
    }

    /// Highest stored sequence nr at or above `from_sequence_nr`
    ///
    /// Starts in the partition of `from_sequence_nr` and walks forward; an
    /// empty partition is probed past once, because a partition-spanning
    /// atomic write or a physical delete can leave one fully empty.
    pub async fn highest_sequence_nr(&self, persistence_id: &str, from_sequence_nr: i64) -> Result<i64, JournalError> {
        let mut partition_nr =
            partition::partition_of(from_sequence_nr.max(1), self.config.target_partition_size);
        let mut highest = from_sequence_nr;
        let mut found_empty_partition = false;

        loop {
            match self.highest_in_partition(persistence_id, partition_nr).await? {
                Some(max) => {
                    highest = max;
                    found_empty_partition = false;
                }
                None => {
                    if found_empty_partition {
                        return Ok(highest);
                    }
                    found_empty_partition = true;
                }
            }
            partition_nr += 1;
        }
    }

    /// First live sequence nr above the delete watermark, or `from_sequence_nr`
    /// when the stream holds nothing
    pub async fn lowest_sequence_nr(
        &self,
        persistence_id: &str,
        from_sequence_nr: i64,
        deleted_to: i64
    ) -> Result<i64, JournalError> {
        let start = (deleted_to + 1).max(1);
        let mut partition_nr = partition::partition_of(start, self.config.target_partition_size);
        let mut found_empty_partition = false;

        loop {
            let bound = self.statements.bind_select_messages(
                persistence_id,
                partition_nr,
                start,
                i64::MAX,
                &self.config.read_profile
            );
            let rows = self.session.execute(&bound).await?;
            match rows.first() {
                Some(row) => return row.bigint("sequence_nr"),
                None => {
                    if found_empty_partition {
                        return Ok(from_sequence_nr);
                    }
                    found_empty_partition = true;
                }
            }
            partition_nr += 1;
        }
    }

    /// Streams decoded events with sequence nr in `[from, to]` into `sink`
    ///
    /// Rows at or below the delete watermark are skipped even when their
    /// physical rows still exist. Returns the number of delivered events; a
    /// dropped sink ends the replay without error.
    pub async fn events_by_persistence_id(
        &self,
        persistence_id: &str,
        from_sequence_nr: i64,
        to_sequence_nr: i64,
        max: u64,
        sink: &mpsc::Sender<ReplayedEvent>
    ) -> Result<u64, JournalError> {
        let deleted_to = self.read_deleted_to(persistence_id).await?;
        let start = from_sequence_nr.max(deleted_to + 1).max(1);
        if start > to_sequence_nr || max == 0 {
            return Ok(0);
        }

        let events = self
            .scan_partitions(persistence_id, start, to_sequence_nr, max, |row| {
                let event = self.gateway.deserialize_row(row)?;
                Ok(Some(event))
            })
            .await?;

        let mut delivered = 0u64;
        for event in events {
            if sink.send(event).await.is_err() {
                return Ok(delivered);
            }
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Stored rows with sequence nr in `[from, to]`, undecoded
    ///
    /// Used by the pre-snapshot tag scan, which re-emits raw rows to the tag
    /// writer without paying a payload decode.
    pub async fn raw_rows(
        &self,
        persistence_id: &str,
        from_sequence_nr: i64,
        to_sequence_nr: i64
    ) -> Result<Vec<SerializedRow>, JournalError> {
        if from_sequence_nr > to_sequence_nr {
            return Ok(Vec::new());
        }
        self.scan_partitions(persistence_id, from_sequence_nr.max(1), to_sequence_nr, u64::MAX, |row| {
            row_to_serialized(row).map(Some)
        })
        .await
    }

    /// Tag-view watermarks for one persistence id
    pub async fn tag_progress(&self, persistence_id: &str) -> Result<HashMap<String, TagProgress>, JournalError> {
        let bound = self.statements.bind_select_tag_progress(persistence_id, &self.config.read_profile)?;
        let rows = self.session.execute(&bound).await?;
        let mut progress = HashMap::with_capacity(rows.len());
        for row in rows {
            progress.insert(
                row.text("tag")?,
                TagProgress {
                    sequence_nr: row.bigint("sequence_nr")?,
                    tag_pid_sequence_nr: row.bigint("tag_pid_sequence_nr")?
                }
            );
        }
        Ok(progress)
    }

    /// All tag-view rows for a tag in (bucket, timestamp) order
    ///
    /// Contract surface for the read side; internals of the by-tag query
    /// (paging, offsets) live with the read journal, not here.
    pub async fn current_events_by_tag(&self, tag: &str) -> Result<Vec<TagViewRow>, JournalError> {
        let bound = self.statements.bind_select_tag_views(tag, &self.config.read_profile)?;
        let rows = self.session.execute(&bound).await?;
        rows.iter()
            .map(|row| {
                Ok(TagViewRow {
                    tag: row.text("tag_name")?,
                    time_bucket: row.text("timebucket")?,
                    time_uuid: row.uuid("timestamp")?,
                    persistence_id: row.text("persistence_id")?,
                    tag_pid_sequence_nr: row.bigint("tag_pid_sequence_nr")?,
                    sequence_nr: row.bigint("sequence_nr")?,
                    writer_uuid: row.text("writer_uuid")?,
                    event_payload: row.blob("event")?,
                    ser_id: row.int("ser_id")?,
                    ser_manifest: row.text("ser_manifest")?,
                    event_manifest: row.text("event_manifest")?
                })
            })
            .collect()
    }

    /// Walks partitions from the one holding `start`, applying `decode` to
    /// every row in `[next, to]`, stopping after `max` collected items or two
    /// consecutive empty partitions
    async fn scan_partitions<T, F>(
        &self,
        persistence_id: &str,
        start: i64,
        to_sequence_nr: i64,
        max: u64,
        decode: F
    ) -> Result<Vec<T>, JournalError>
    where
        F: Fn(&Row) -> Result<Option<T>, JournalError>
    {
        let mut partition_nr = partition::partition_of(start, self.config.target_partition_size);
        let mut next_sequence_nr = start;
        let mut found_empty_partition = false;
        let mut collected = Vec::new();

        loop {
            let bound = self.statements.bind_select_messages(
                persistence_id,
                partition_nr,
                next_sequence_nr,
                to_sequence_nr,
                &self.config.read_profile
            );
            let rows = self.session.execute(&bound).await?;

            if rows.is_empty() {
                if found_empty_partition {
                    return Ok(collected);
                }
                found_empty_partition = true;
            } else {
                found_empty_partition = false;
                for row in &rows {
                    let sequence_nr = row.bigint("sequence_nr")?;
                    if let Some(item) = decode(row)? {
                        collected.push(item);
                    }
                    next_sequence_nr = sequence_nr + 1;
                    if collected.len() as u64 >= max {
                        return Ok(collected);
                    }
                }
                if next_sequence_nr > to_sequence_nr {
                    return Ok(collected);
                }
            }
            partition_nr += 1;
        }
    }
}

/// Rebuilds a [`SerializedRow`] from its stored columns
fn row_to_serialized(row: &Row) -> Result<SerializedRow, JournalError> {
    let meta = if row.get("meta").is_some() {
        Some(SerializedMeta {
            payload: row.blob("meta")?,
            ser_id: row.int("meta_ser_id")?,
            ser_manifest: row.text("meta_ser_manifest")?
        })
    } else {
        None
    };

    Ok(SerializedRow {
        persistence_id: row.text("persistence_id")?,
        partition_nr: row.bigint("partition_nr")?,
        sequence_nr: row.bigint("sequence_nr")?,
        time_uuid: row.uuid("timestamp")?,
        time_bucket: row.text("timebucket")?,
        writer_uuid: row.text("writer_uuid")?,
        event_payload: row.blob("event")?,
        ser_id: row.int("ser_id")?,
        ser_manifest: row.text("ser_manifest")?,
        event_adapter_manifest: row.text("event_manifest")?,
        tags: row.text_set("tags")?.into_iter().collect(),
        meta
    })
}

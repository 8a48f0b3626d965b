//! Statement building
//!
//! All statement text lives here, prepared eagerly at journal startup so the
//! first request pays no preparation latency. Writes come in two shapes, with
//! and without the metadata columns, chosen per row - deployments that never
//! attach metadata need no schema migration.

use crate::{
    domain::{
        error::JournalError,
        event::SerializedRow
    },
    port::session::{BoundStatement, PreparedStatement, Session, Value},
    service::config::JournalConfig
};

pub mod cql {
    pub const WRITE_MESSAGE: &str = "INSERT INTO messages (persistence_id, partition_nr, sequence_nr, timestamp, \
         timebucket, writer_uuid, ser_id, ser_manifest, event_manifest, event, tags) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

    pub const WRITE_MESSAGE_WITH_META: &str = "INSERT INTO messages (persistence_id, partition_nr, sequence_nr, \
         timestamp, timebucket, writer_uuid, ser_id, ser_manifest, event_manifest, event, tags, \
         meta, meta_ser_id, meta_ser_manifest) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

    pub const SELECT_HIGHEST_SEQUENCE_NR: &str = "SELECT sequence_nr FROM messages \
         WHERE persistence_id = ? AND partition_nr = ? ORDER BY sequence_nr DESC LIMIT 1";

    pub const SELECT_LOWEST_SEQUENCE_NR: &str = "SELECT sequence_nr FROM messages \
         WHERE persistence_id = ? AND partition_nr = ? ORDER BY sequence_nr ASC LIMIT 1";

    pub const SELECT_MESSAGES: &str = "SELECT * FROM messages \
         WHERE persistence_id = ? AND partition_nr = ? AND sequence_nr >= ? AND sequence_nr <= ?";

    pub const SELECT_DELETED_TO: &str = "SELECT deleted_to FROM metadata WHERE persistence_id = ?";

    pub const INSERT_DELETED_TO: &str = "INSERT INTO metadata (persistence_id, deleted_to) VALUES (?, ?)";

    pub const DELETE_TO_PARTITION: &str = "DELETE FROM messages \
         WHERE persistence_id = ? AND partition_nr = ? AND sequence_nr <= ?";

    pub const DELETE_MESSAGE: &str = "DELETE FROM messages \
         WHERE persistence_id = ? AND partition_nr = ? AND sequence_nr = ?";

    pub const WRITE_TAG_VIEW: &str = "INSERT INTO tag_views (tag_name, timebucket, timestamp, persistence_id, \
         tag_pid_sequence_nr, sequence_nr, writer_uuid, ser_id, ser_manifest, event_manifest, event) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

    pub const SELECT_TAG_VIEWS: &str = "SELECT * FROM tag_views WHERE tag_name = ?";

    pub const SELECT_TAG_PROGRESS: &str = "SELECT tag, sequence_nr, tag_pid_sequence_nr FROM tag_progress \
         WHERE persistence_id = ?";

    pub const INSERT_TAG_PROGRESS: &str = "INSERT INTO tag_progress (persistence_id, tag, sequence_nr, \
         tag_pid_sequence_nr) VALUES (?, ?, ?, ?)";
}

/// The journal's prepared-statement set
///
/// Delete statements exist only when deletes are supported, tag statements
/// only when the tag view is enabled. `select_deleted_to` is always prepared:
/// replay must honor markers written before deletes were disabled.
pub struct JournalStatements {
    pub write_message:              PreparedStatement,
    pub write_message_with_meta:    PreparedStatement,
    pub select_highest_sequence_nr: PreparedStatement,
    pub select_lowest_sequence_nr:  PreparedStatement,
    pub select_messages:            PreparedStatement,
    pub select_deleted_to:          PreparedStatement,
    pub insert_deleted_to:          Option<PreparedStatement>,
    pub delete_to_partition:        Option<PreparedStatement>,
    pub delete_message:             Option<PreparedStatement>,
    pub write_tag_view:             Option<PreparedStatement>,
    pub select_tag_views:           Option<PreparedStatement>,
    pub select_tag_progress:        Option<PreparedStatement>,
    pub insert_tag_progress:        Option<PreparedStatement>
}

impl JournalStatements {
    /// Prepares every statement the configuration calls for
    pub async fn prepare(session: &dyn Session, config: &JournalConfig) -> Result<Self, JournalError> {
        let write_message = session.prepare(cql::WRITE_MESSAGE).await?;
        let write_message_with_meta = session.prepare(cql::WRITE_MESSAGE_WITH_META).await?;
        let select_highest_sequence_nr = session.prepare(cql::SELECT_HIGHEST_SEQUENCE_NR).await?;
        let select_lowest_sequence_nr = session.prepare(cql::SELECT_LOWEST_SEQUENCE_NR).await?;
        let select_messages = session.prepare(cql::SELECT_MESSAGES).await?;
        let select_deleted_to = session.prepare(cql::SELECT_DELETED_TO).await?;

        let (insert_deleted_to, delete_to_partition, delete_message) = if config.support_deletes {
            (
                Some(session.prepare(cql::INSERT_DELETED_TO).await?),
                Some(session.prepare(cql::DELETE_TO_PARTITION).await?),
                Some(session.prepare(cql::DELETE_MESSAGE).await?)
            )
        } else {
            (None, None, None)
        };

        let (write_tag_view, select_tag_views, select_tag_progress, insert_tag_progress) =
            if config.events_by_tag_enabled {
                (
                    Some(session.prepare(cql::WRITE_TAG_VIEW).await?),
                    Some(session.prepare(cql::SELECT_TAG_VIEWS).await?),
                    Some(session.prepare(cql::SELECT_TAG_PROGRESS).await?),
                    Some(session.prepare(cql::INSERT_TAG_PROGRESS).await?)
                )
            } else {
                (None, None, None, None)
            };

        Ok(Self {
            write_message,
            write_message_with_meta,
            select_highest_sequence_nr,
            select_lowest_sequence_nr,
            select_messages,
            select_deleted_to,
            insert_deleted_to,
            delete_to_partition,
            delete_message,
            write_tag_view,
            select_tag_views,
            select_tag_progress,
            insert_tag_progress
        })
    }

    /// Binds one serialized row, choosing the meta or no-meta shape
    pub fn bind_write(&self, row: &SerializedRow, profile: &str) -> BoundStatement {
        let mut values = vec![
            Value::Text(row.persistence_id.clone()),
            Value::BigInt(row.partition_nr),
            Value::BigInt(row.sequence_nr),
            Value::Uuid(row.time_uuid),
            Value::Text(row.time_bucket.clone()),
            Value::Text(row.writer_uuid.clone()),
            Value::Int(row.ser_id),
            Value::Text(row.ser_manifest.clone()),
            Value::Text(row.event_adapter_manifest.clone()),
            Value::Blob(row.event_payload.clone()),
            Value::TextSet(row.tags.iter().cloned().collect()),
        ];

        match &row.meta {
            Some(meta) => {
                values.push(Value::Blob(meta.payload.clone()));
                values.push(Value::Int(meta.ser_id));
                values.push(Value::Text(meta.ser_manifest.clone()));
                BoundStatement::new(self.write_message_with_meta.clone(), values, profile)
            }
            None => BoundStatement::new(self.write_message.clone(), values, profile)
        }
    }

    pub fn bind_select_highest(&self, persistence_id: &str, partition_nr: i64, profile: &str) -> BoundStatement {
        BoundStatement::new(
            self.select_highest_sequence_nr.clone(),
            vec![Value::Text(persistence_id.to_string()), Value::BigInt(partition_nr)],
            profile
        )
    }

    pub fn bind_select_lowest(&self, persistence_id: &str, partition_nr: i64, profile: &str) -> BoundStatement {
        BoundStatement::new(
            self.select_lowest_sequence_nr.clone(),
            vec![Value::Text(persistence_id.to_string()), Value::BigInt(partition_nr)],
            profile
        )
    }

    pub fn bind_select_messages(
        &self,
        persistence_id: &str,
        partition_nr: i64,
        from_sequence_nr: i64,
        to_sequence_nr: i64,
        profile: &str
    ) -> BoundStatement {
        BoundStatement::new(
            self.select_messages.clone(),
            vec![
                Value::Text(persistence_id.to_string()),
                Value::BigInt(partition_nr),
                Value::BigInt(from_sequence_nr),
                Value::BigInt(to_sequence_nr),
            ],
            profile
        )
    }

    pub fn bind_select_deleted_to(&self, persistence_id: &str, profile: &str) -> BoundStatement {
        BoundStatement::new(self.select_deleted_to.clone(), vec![Value::Text(persistence_id.to_string())], profile)
    }

    pub fn bind_insert_deleted_to(
        &self,
        persistence_id: &str,
        deleted_to: i64,
        profile: &str
    ) -> Result<BoundStatement, JournalError> {
        let statement = self.require(&self.insert_deleted_to, "insert_deleted_to")?;
        Ok(BoundStatement::new(
            statement,
            vec![Value::Text(persistence_id.to_string()), Value::BigInt(deleted_to)],
            profile
        ))
    }

    pub fn bind_delete_to_partition(
        &self,
        persistence_id: &str,
        partition_nr: i64,
        to_sequence_nr: i64,
        profile: &str
    ) -> Result<BoundStatement, JournalError> {
        let statement = self.require(&self.delete_to_partition, "delete_to_partition")?;
        Ok(BoundStatement::new(
            statement,
            vec![Value::Text(persistence_id.to_string()), Value::BigInt(partition_nr), Value::BigInt(to_sequence_nr)],
            profile
        ))
    }

    pub fn bind_delete_message(
        &self,
        persistence_id: &str,
        partition_nr: i64,
        sequence_nr: i64,
        profile: &str
    ) -> Result<BoundStatement, JournalError> {
        let statement = self.require(&self.delete_message, "delete_message")?;
        Ok(BoundStatement::new(
            statement,
            vec![Value::Text(persistence_id.to_string()), Value::BigInt(partition_nr), Value::BigInt(sequence_nr)],
            profile
        ))
    }

    pub fn bind_write_tag_view(
        &self,
        tag: &str,
        tag_pid_sequence_nr: i64,
        row: &SerializedRow,
        profile: &str
    ) -> Result<BoundStatement, JournalError> {
        let statement = self.require(&self.write_tag_view, "write_tag_view")?;
        Ok(BoundStatement::new(
            statement,
            vec![
                Value::Text(tag.to_string()),
                Value::Text(row.time_bucket.clone()),
                Value::Uuid(row.time_uuid),
                Value::Text(row.persistence_id.clone()),
                Value::BigInt(tag_pid_sequence_nr),
                Value::BigInt(row.sequence_nr),
                Value::Text(row.writer_uuid.clone()),
                Value::Int(row.ser_id),
                Value::Text(row.ser_manifest.clone()),
                Value::Text(row.event_adapter_manifest.clone()),
                Value::Blob(row.event_payload.clone()),
            ],
            profile
        ))
    }

    pub fn bind_select_tag_views(&self, tag: &str, profile: &str) -> Result<BoundStatement, JournalError> {
        let statement = self.require(&self.select_tag_views, "select_tag_views")?;
        Ok(BoundStatement::new(statement, vec![Value::Text(tag.to_string())], profile))
    }

    pub fn bind_select_tag_progress(&self, persistence_id: &str, profile: &str) -> Result<BoundStatement, JournalError> {
        let statement = self.require(&self.select_tag_progress, "select_tag_progress")?;
        Ok(BoundStatement::new(statement, vec![Value::Text(persistence_id.to_string())], profile))
    }

    pub fn bind_insert_tag_progress(
        &self,
        persistence_id: &str,
        tag: &str,
        sequence_nr: i64,
        tag_pid_sequence_nr: i64,
        profile: &str
    ) -> Result<BoundStatement, JournalError> {
        let statement = self.require(&self.insert_tag_progress, "insert_tag_progress")?;
        Ok(BoundStatement::new(
            statement,
            vec![
                Value::Text(persistence_id.to_string()),
                Value::Text(tag.to_string()),
                Value::BigInt(sequence_nr),
                Value::BigInt(tag_pid_sequence_nr),
            ],
            profile
        ))
    }

    fn require(
        &self,
        statement: &Option<PreparedStatement>,
        name: &str
    ) -> Result<PreparedStatement, JournalError> {
        statement
            .clone()
            .ok_or_else(|| JournalError::Unsupported(format!("statement '{}' is disabled by configuration", name)))
    }
}

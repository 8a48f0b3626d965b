//! In-memory session - wide-column emulation for development and testing
//!
//! Interprets the journal's fixed statement set over ordered maps, mirroring
//! the store's semantics: rows clustered by sequence nr within a
//! (persistence id, partition) group, upsert metadata, and tag-view rows
//! ordered by (bucket, timestamp). Production deployments implement
//! [`Session`] over a real driver instead.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    domain::{error::JournalError, timeuuid},
    port::session::{BoundStatement, PreparedStatement, Row, Session, Value},
    service::statements::cql
};

#[derive(Default)]
struct SessionState {
    /// (persistence_id, partition_nr) -> sequence_nr -> row
    messages:          HashMap<(String, i64), BTreeMap<i64, Row>>,
    /// persistence_id -> deleted_to
    metadata:          HashMap<String, i64>,
    /// (tag, bucket, uuid ticks, persistence_id, sequence_nr) -> row
    tag_views:         BTreeMap<(String, String, u64, String, i64), Row>,
    /// (persistence_id, tag) -> progress row
    tag_progress:      HashMap<(String, String), Row>,
    prepared:          HashMap<String, PreparedStatement>,
    next_statement_id: u64,
    fail_writes:       bool,
    fail_deletes:      bool,
    write_delay:       Option<Duration>,
    delete_delay:      Option<Duration>
}

/// In-memory [`Session`] implementation
pub struct InMemorySession {
    state: Arc<RwLock<SessionState>>
}

impl InMemorySession {
    pub fn new() -> Self {
        Self { state: Arc::new(RwLock::new(SessionState::default())) }
    }

    /// Makes message inserts fail until reset (test hook)
    pub async fn set_fail_writes(&self, fail: bool) {
        self.state.write().await.fail_writes = fail;
    }

    /// Makes delete statements fail until reset (test hook)
    pub async fn set_fail_deletes(&self, fail: bool) {
        self.state.write().await.fail_deletes = fail;
    }

    /// Delays every message insert (test hook for in-progress coordination)
    pub async fn set_write_delay(&self, delay: Option<Duration>) {
        self.state.write().await.write_delay = delay;
    }

    /// Delays every delete statement (test hook for queueing behavior)
    pub async fn set_delete_delay(&self, delay: Option<Duration>) {
        self.state.write().await.delete_delay = delay;
    }

    /// Current delete watermark for a persistence id, if any
    pub async fn deleted_to(&self, persistence_id: &str) -> Option<i64> {
        self.state.read().await.metadata.get(persistence_id).copied()
    }

    /// Number of physically stored message rows for a persistence id
    pub async fn stored_message_count(&self, persistence_id: &str) -> usize {
        let state = self.state.read().await;
        state
            .messages
            .iter()
            .filter(|((pid, _), _)| pid == persistence_id)
            .map(|(_, rows)| rows.len())
            .sum()
    }

    /// Tag-view rows for a tag in materialized order (test hook)
    pub async fn tag_view_rows(&self, tag: &str) -> Vec<Row> {
        let state = self.state.read().await;
        state
            .tag_views
            .iter()
            .filter(|((row_tag, ..), _)| row_tag == tag)
            .map(|(_, row)| row.clone())
            .collect()
    }

    fn apply(state: &mut SessionState, statement: &BoundStatement) -> Result<Vec<Row>, JournalError> {
        match statement.statement.cql.as_ref() {
            c if c == cql::WRITE_MESSAGE || c == cql::WRITE_MESSAGE_WITH_META => {
                if state.fail_writes {
                    return Err(JournalError::Execution("write unavailable".to_string()));
                }
                let row = message_row(&statement.values, c == cql::WRITE_MESSAGE_WITH_META)?;
                let persistence_id = row.text("persistence_id")?;
                let partition_nr = row.bigint("partition_nr")?;
                let sequence_nr = row.bigint("sequence_nr")?;
                state.messages.entry((persistence_id, partition_nr)).or_default().insert(sequence_nr, row);
                Ok(Vec::new())
            }
            c if c == cql::SELECT_HIGHEST_SEQUENCE_NR => {
                let key = (text_arg(statement, 0)?, bigint_arg(statement, 1)?);
                let row = state.messages.get(&key).and_then(|rows| rows.keys().next_back()).map(|sequence_nr| {
                    Row::new().with_column("sequence_nr", Value::BigInt(*sequence_nr))
                });
                Ok(row.into_iter().collect())
            }
            c if c == cql::SELECT_LOWEST_SEQUENCE_NR => {
                let key = (text_arg(statement, 0)?, bigint_arg(statement, 1)?);
                let row = state.messages.get(&key).and_then(|rows| rows.keys().next()).map(|sequence_nr| {
                    Row::new().with_column("sequence_nr", Value::BigInt(*sequence_nr))
                });
                Ok(row.into_iter().collect())
            }
            c if c == cql::SELECT_MESSAGES => {
                let key = (text_arg(statement, 0)?, bigint_arg(statement, 1)?);
                let from = bigint_arg(statement, 2)?;
                let to = bigint_arg(statement, 3)?;
                if from > to {
                    return Ok(Vec::new());
                }
                let rows = state
                    .messages
                    .get(&key)
                    .map(|rows| rows.range(from..=to).map(|(_, row)| row.clone()).collect())
                    .unwrap_or_default();
                Ok(rows)
            }
            c if c == cql::SELECT_DELETED_TO => {
                let persistence_id = text_arg(statement, 0)?;
                let row = state
                    .metadata
                    .get(&persistence_id)
                    .map(|deleted_to| Row::new().with_column("deleted_to", Value::BigInt(*deleted_to)));
                Ok(row.into_iter().collect())
            }
            c if c == cql::INSERT_DELETED_TO => {
                let persistence_id = text_arg(statement, 0)?;
                let deleted_to = bigint_arg(statement, 1)?;
                state.metadata.insert(persistence_id, deleted_to);
                Ok(Vec::new())
            }
            c if c == cql::DELETE_TO_PARTITION => {
                if state.fail_deletes {
                    return Err(JournalError::Execution("delete unavailable".to_string()));
                }
                let key = (text_arg(statement, 0)?, bigint_arg(statement, 1)?);
                let to = bigint_arg(statement, 2)?;
                if let Some(rows) = state.messages.get_mut(&key) {
                    rows.retain(|sequence_nr, _| *sequence_nr > to);
                }
                Ok(Vec::new())
            }
            c if c == cql::DELETE_MESSAGE => {
                if state.fail_deletes {
                    return Err(JournalError::Execution("delete unavailable".to_string()));
                }
                let key = (text_arg(statement, 0)?, bigint_arg(statement, 1)?);
                let sequence_nr = bigint_arg(statement, 2)?;
                if let Some(rows) = state.messages.get_mut(&key) {
                    rows.remove(&sequence_nr);
                }
                Ok(Vec::new())
            }
            c if c == cql::WRITE_TAG_VIEW => {
                let row = tag_view_row(&statement.values)?;
                let time_uuid = row.uuid("timestamp")?;
                let key = (
                    row.text("tag_name")?,
                    row.text("timebucket")?,
                    timeuuid::ticks_of(&time_uuid).unwrap_or(0),
                    row.text("persistence_id")?,
                    row.bigint("sequence_nr")?
                );
                state.tag_views.insert(key, row);
                Ok(Vec::new())
            }
            c if c == cql::SELECT_TAG_VIEWS => {
                let tag = text_arg(statement, 0)?;
                let rows = state
                    .tag_views
                    .iter()
                    .filter(|((row_tag, ..), _)| *row_tag == tag)
                    .map(|(_, row)| row.clone())
                    .collect();
                Ok(rows)
            }
            c if c == cql::SELECT_TAG_PROGRESS => {
                let persistence_id = text_arg(statement, 0)?;
                let rows = state
                    .tag_progress
                    .iter()
                    .filter(|((pid, _), _)| *pid == persistence_id)
                    .map(|(_, row)| row.clone())
                    .collect();
                Ok(rows)
            }
            c if c == cql::INSERT_TAG_PROGRESS => {
                let persistence_id = text_arg(statement, 0)?;
                let tag = text_arg(statement, 1)?;
                let row = Row::new()
                    .with_column("tag", Value::Text(tag.clone()))
                    .with_column("sequence_nr", statement.values[2].clone())
                    .with_column("tag_pid_sequence_nr", statement.values[3].clone());
                state.tag_progress.insert((persistence_id, tag), row);
                Ok(Vec::new())
            }
            other => Err(JournalError::Execution(format!("statement not understood by in-memory session: {}", other)))
        }
    }

    fn is_delete(statement: &BoundStatement) -> bool {
        let c = statement.statement.cql.as_ref();
        c == cql::DELETE_TO_PARTITION || c == cql::DELETE_MESSAGE
    }

    fn is_message_write(statement: &BoundStatement) -> bool {
        let c = statement.statement.cql.as_ref();
        c == cql::WRITE_MESSAGE || c == cql::WRITE_MESSAGE_WITH_META
    }
}

impl Default for InMemorySession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Session for InMemorySession {
    async fn prepare(&self, cql: &str) -> Result<PreparedStatement, JournalError> {
        let mut state = self.state.write().await;
        if let Some(prepared) = state.prepared.get(cql) {
            return Ok(prepared.clone());
        }
        state.next_statement_id += 1;
        let prepared = PreparedStatement { id: state.next_statement_id, cql: Arc::from(cql) };
        state.prepared.insert(cql.to_string(), prepared.clone());
        Ok(prepared)
    }

    async fn execute(&self, statement: &BoundStatement) -> Result<Vec<Row>, JournalError> {
        let delay = {
            let state = self.state.read().await;
            if Self::is_delete(statement) {
                state.delete_delay
            } else if Self::is_message_write(statement) {
                state.write_delay
            } else {
                None
            }
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.write().await;
        Self::apply(&mut state, statement)
    }

    async fn execute_batch(&self, statements: &[BoundStatement], _profile: &str) -> Result<(), JournalError> {
        let delay = {
            let state = self.state.read().await;
            if statements.iter().any(Self::is_delete) {
                state.delete_delay
            } else if statements.iter().any(Self::is_message_write) {
                state.write_delay
            } else {
                None
            }
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        // fail before applying anything: an unlogged batch either lands or not
        if state.fail_writes && statements.iter().any(Self::is_message_write) {
            return Err(JournalError::Execution("write unavailable".to_string()));
        }
        if state.fail_deletes && statements.iter().any(Self::is_delete) {
            return Err(JournalError::Execution("delete unavailable".to_string()));
        }
        for statement in statements {
            Self::apply(&mut state, statement)?;
        }
        Ok(())
    }
}

const MESSAGE_COLUMNS: [&str; 11] = [
    "persistence_id",
    "partition_nr",
    "sequence_nr",
    "timestamp",
    "timebucket",
    "writer_uuid",
    "ser_id",
    "ser_manifest",
    "event_manifest",
    "event",
    "tags"
];

const MESSAGE_META_COLUMNS: [&str; 3] = ["meta", "meta_ser_id", "meta_ser_manifest"];

const TAG_VIEW_COLUMNS: [&str; 11] = [
    "tag_name",
    "timebucket",
    "timestamp",
    "persistence_id",
    "tag_pid_sequence_nr",
    "sequence_nr",
    "writer_uuid",
    "ser_id",
    "ser_manifest",
    "event_manifest",
    "event"
];

fn message_row(values: &[Value], with_meta: bool) -> Result<Row, JournalError> {
    let expected = MESSAGE_COLUMNS.len() + if with_meta { MESSAGE_META_COLUMNS.len() } else { 0 };
    if values.len() != expected {
        return Err(JournalError::Execution(format!("expected {} bound values, got {}", expected, values.len())));
    }
    let mut names: Vec<&str> = MESSAGE_COLUMNS.to_vec();
    if with_meta {
        names.extend(MESSAGE_META_COLUMNS);
    }
    let mut row = Row::new();
    for (name, value) in names.iter().zip(values) {
        row = row.with_column(*name, value.clone());
    }
    Ok(row)
}

fn tag_view_row(values: &[Value]) -> Result<Row, JournalError> {
    if values.len() != TAG_VIEW_COLUMNS.len() {
        return Err(JournalError::Execution(format!(
            "expected {} bound values, got {}",
            TAG_VIEW_COLUMNS.len(),
            values.len()
        )));
    }
    let mut row = Row::new();
    for (name, value) in TAG_VIEW_COLUMNS.iter().zip(values) {
        row = row.with_column(*name, value.clone());
    }
    Ok(row)
}

fn text_arg(statement: &BoundStatement, index: usize) -> Result<String, JournalError> {
    match statement.values.get(index) {
        Some(Value::Text(v)) => Ok(v.clone()),
        other => Err(JournalError::Execution(format!("bound value {} is not text: {:?}", index, other)))
    }
}

fn bigint_arg(statement: &BoundStatement, index: usize) -> Result<i64, JournalError> {
    match statement.values.get(index) {
        Some(Value::BigInt(v)) => Ok(*v),
        other => Err(JournalError::Execution(format!("bound value {} is not a bigint: {:?}", index, other)))
    }
}

//! TagWriter Actor - materializes per-tag views of the event stream
//!
//! Receives bulk tag writes from the journal in write order and turns them
//! into tag-view rows with a dense per-(persistence id, tag) counter. The
//! journal never blocks on tag-view durability: failures here are logged and
//! the view catches up through the pre-snapshot scan on the next recovery.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc
};

use ractor::{Actor, ActorProcessingErr, ActorRef};
use tracing::{Level, event};

use crate::{
    actor::message::TagWriterMessage,
    domain::{
        constant::tag_writer,
        error::JournalError,
        event::{BulkTagWrite, SerializedRow, TagProgress}
    },
    port::session::Session,
    service::{config::JournalConfig, statements::JournalStatements}
};

/// TagWriter Actor State - per-(persistence id, tag) watermarks
pub struct TagWriterState {
    session:     Arc<dyn Session>,
    statements:  Arc<JournalStatements>,
    config:      JournalConfig,
    /// (persistence_id, tag) -> watermark
    progress:    HashMap<(String, String), TagProgress>,
    /// Persistence ids whose stored progress has been loaded
    loaded_pids: HashSet<String>
}

/// TagWriter Actor - the receiving side of tag-write dispatch
pub struct TagWriter;

impl Actor for TagWriter {
    type Arguments = (Arc<dyn Session>, Arc<JournalStatements>, JournalConfig);
    type Msg = TagWriterMessage;
    type State = TagWriterState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        (session, statements, config): Self::Arguments
    ) -> Result<Self::State, ActorProcessingErr> {
        event!(Level::DEBUG, event = tag_writer::WRITER_STARTED);

        Ok(TagWriterState { session, statements, config, progress: HashMap::new(), loaded_pids: HashSet::new() })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State
    ) -> Result<(), ActorProcessingErr> {
        match message {
            TagWriterMessage::BulkWrite(bulk) => {
                self.handle_bulk_write(bulk, state).await;
                Ok(())
            }
            TagWriterMessage::PersistentActorStarting { persistence_id, progress } => {
                event!(Level::DEBUG, event = tag_writer::PROGRESS_RESTORED,
                       persistence_id = %persistence_id, tags = progress.len());
                for (tag, watermark) in progress {
                    state.progress.insert((persistence_id.clone(), tag), watermark);
                }
                state.loaded_pids.insert(persistence_id);
                Ok(())
            }
            TagWriterMessage::Flush { reply } => {
                event!(Level::DEBUG, event = tag_writer::FLUSHED);
                if let Err(e) = reply.send(()) {
                    event!(Level::ERROR, event = tag_writer::FLUSHED, error = %e);
                }
                Ok(())
            }
        }
    }
}

impl TagWriter {
    /// Applies one bulk write, skipping events already materialized
    ///
    /// Per-event failures are logged and skipped rather than surfaced: events
    /// count as journaled once their main rows commit, and a gap here is
    /// repaired by the pre-snapshot scan.
    async fn handle_bulk_write(&self, bulk: BulkTagWrite, state: &mut TagWriterState) {
        event!(Level::DEBUG, event = tag_writer::BULK_WRITE_RECEIVED,
               tags = bulk.tag_writes.len(), untagged = bulk.without_tags.len());

        for tag_write in &bulk.tag_writes {
            for row in &tag_write.events {
                if let Err(e) = Self::load_progress(&row.persistence_id, state).await {
                    event!(Level::WARN, event = tag_writer::PROGRESS_LOAD_FAILED,
                           persistence_id = %row.persistence_id, error = %e);
                }

                let key = (row.persistence_id.clone(), tag_write.tag.clone());
                let current = state.progress.entry(key.clone()).or_default();
                if row.sequence_nr <= current.sequence_nr {
                    continue;
                }
                let next = TagProgress {
                    sequence_nr: row.sequence_nr,
                    tag_pid_sequence_nr: current.tag_pid_sequence_nr + 1
                };

                match Self::write_view_row(&tag_write.tag, next, row, state).await {
                    Ok(()) => {
                        state.progress.insert(key, next);
                    }
                    Err(e) => {
                        event!(Level::WARN, event = tag_writer::TAG_WRITE_FAILED,
                               persistence_id = %row.persistence_id, tag = %tag_write.tag,
                               sequence_nr = row.sequence_nr, error = %e);
                    }
                }
            }
        }
    }

    /// Loads stored watermarks for a persistence id once per actor lifetime
    async fn load_progress(persistence_id: &str, state: &mut TagWriterState) -> Result<(), JournalError> {
        if state.loaded_pids.contains(persistence_id) {
            return Ok(());
        }
        state.loaded_pids.insert(persistence_id.to_string());

        let bound = state.statements.bind_select_tag_progress(persistence_id, &state.config.read_profile)?;
        let rows = state.session.execute(&bound).await?;
        for row in rows {
            let key = (persistence_id.to_string(), row.text("tag")?);
            let watermark = TagProgress {
                sequence_nr: row.bigint("sequence_nr")?,
                tag_pid_sequence_nr: row.bigint("tag_pid_sequence_nr")?
            };
            state.progress.entry(key).or_insert(watermark);
        }
        Ok(())
    }

    async fn write_view_row(
        tag: &str,
        next: TagProgress,
        row: &SerializedRow,
        state: &TagWriterState
    ) -> Result<(), JournalError> {
        let view = state.statements.bind_write_tag_view(tag, next.tag_pid_sequence_nr, row, &state.config.write_profile)?;
        state.session.execute(&view).await?;

        let progress = state.statements.bind_insert_tag_progress(
            &row.persistence_id,
            tag,
            next.sequence_nr,
            next.tag_pid_sequence_nr,
            &state.config.write_profile
        )?;
        state.session.execute(&progress).await?;
        Ok(())
    }
}

//! Journal Actor - owner of all per-entity coordination state
//!
//! The actor serializes every mutation of the `write_in_progress` and
//! `pending_deletes` maps; storage work runs in spawned tasks that settle by
//! casting `WriteFinished` / `DeleteFinished` back to the actor. Parallelism
//! exists across persistence ids, never within one.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc
};

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tokio::sync::{mpsc, watch};
use tracing::{Level, event};

use crate::{
    JournalContext,
    actor::{
        message::{JournalMessage, TagWriterMessage, WriteResults},
        tag_writer::TagWriter
    },
    adapter::serializer::SerializerGateway,
    domain::{
        constant::journal,
        error::JournalError,
        event::{AtomicWrite, BulkTagWrite, ReplayedEvent, SerializedRow},
        partition::{self, PartitionInfo}
    },
    service::{reader::JournalReader, statements::JournalStatements}
};

/// An accepted write call for one persistence id; the queue head is running
///
/// The watch channel is a synchronization hint, not a lock: sequence-nr
/// probes await the youngest accepted write, which settles only after every
/// older one has - the minimal substitute for read-your-writes on the
/// backing store.
struct PendingWrite {
    batches: Option<Vec<AtomicWrite>>,
    reply:   RpcReplyPort<Result<WriteResults, JournalError>>,
    done:    watch::Sender<bool>,
    waiter:  watch::Receiver<bool>
}

struct PendingDelete {
    to_sequence_nr: i64,
    reply:          RpcReplyPort<Result<(), JournalError>>
}

/// Journal Actor State
pub struct JournalActorState {
    context:           Arc<JournalContext>,
    statements:        Arc<JournalStatements>,
    gateway:           Arc<SerializerGateway>,
    reader:            Arc<JournalReader>,
    tag_writer:        Option<ActorRef<TagWriterMessage>>,
    write_in_progress: HashMap<String, VecDeque<PendingWrite>>,
    pending_deletes:   HashMap<String, VecDeque<PendingDelete>>
}

/// Journal Actor - top-level owner of the write, delete, and probe paths
pub struct JournalActor;

impl Actor for JournalActor {
    type Arguments = Arc<JournalContext>;
    type Msg = JournalMessage;
    type State = JournalActorState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        context: Self::Arguments
    ) -> Result<Self::State, ActorProcessingErr> {
        context.config.validate().map_err(ActorProcessingErr::from)?;

        // eager preparation: the first request must not pay statement latency
        let statements = Arc::new(
            JournalStatements::prepare(context.session.as_ref(), &context.config)
                .await
                .map_err(ActorProcessingErr::from)?
        );
        event!(Level::DEBUG, event = journal::STATEMENTS_PREPARED);

        let gateway = Arc::new(SerializerGateway::new(context.serializers.clone()));
        let reader = Arc::new(JournalReader::new(
            context.session.clone(),
            statements.clone(),
            gateway.clone(),
            context.config.clone()
        ));

        let tag_writer = if context.config.events_by_tag_enabled {
            let (writer_ref, _handle) = Actor::spawn(
                None,
                TagWriter,
                (context.session.clone(), statements.clone(), context.config.clone())
            )
            .await?;
            Some(writer_ref)
        } else {
            None
        };

        event!(Level::INFO, event = journal::JOURNAL_STARTED,
               events_by_tag = context.config.events_by_tag_enabled,
               support_deletes = context.config.support_deletes);

        Ok(JournalActorState {
            context,
            statements,
            gateway,
            reader,
            tag_writer,
            write_in_progress: HashMap::new(),
            pending_deletes: HashMap::new()
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State
    ) -> Result<(), ActorProcessingErr> {
        let result = match message {
            JournalMessage::WriteMessages { batches, reply } => {
                self.handle_write_messages(&myself, batches, reply, state)
            }
            JournalMessage::DeleteTo { persistence_id, to_sequence_nr, reply } => {
                self.handle_delete_to(&myself, persistence_id, to_sequence_nr, reply, state)
            }
            JournalMessage::HighestSequenceNr { persistence_id, from_sequence_nr, reply } => {
                self.handle_highest_sequence_nr(persistence_id, from_sequence_nr, reply, state)
            }
            JournalMessage::ReplayMessages { persistence_id, from_sequence_nr, to_sequence_nr, max, sink, reply } => {
                self.handle_replay_messages(persistence_id, from_sequence_nr, to_sequence_nr, max, sink, reply, state)
            }
            JournalMessage::WriteFinished { persistence_id, outcome } => {
                self.handle_write_finished(&myself, persistence_id, outcome, state)
            }
            JournalMessage::DeleteFinished { persistence_id, outcome } => {
                self.handle_delete_finished(&myself, persistence_id, outcome, state)
            }
        };

        // fail-fast: corrupted coordination state is worse than a restart
        if let Err(e) = result {
            event!(Level::ERROR, event = journal::FATAL_ERROR, error = %e);
            if state.context.config.coordinated_shutdown_on_error {
                event!(Level::ERROR, event = journal::SHUTDOWN_TRIGGERED);
                state.context.shutdown.notify_waiters();
            }
            return Err(ActorProcessingErr::from(e));
        }
        Ok(())
    }
}

impl JournalActor {
    fn handle_write_messages(
        &self,
        myself: &ActorRef<JournalMessage>,
        batches: Vec<AtomicWrite>,
        reply: RpcReplyPort<Result<WriteResults, JournalError>>,
        state: &mut JournalActorState
    ) -> Result<(), JournalError> {
        if batches.is_empty() {
            send_reply(reply, Ok(Vec::new()), journal::WRITE_COMPLETED);
            return Ok(());
        }

        let persistence_id = batches[0].persistence_id().to_string();
        event!(Level::DEBUG, event = journal::WRITE_RECEIVED,
               persistence_id = %persistence_id, batches = batches.len());

        if let Err(e) = validate_write(&batches, state.context.config.target_partition_size) {
            event!(Level::WARN, event = journal::WRITE_REJECTED, persistence_id = %persistence_id, error = %e);
            send_reply(reply, Err(e), journal::WRITE_REJECTED);
            return Ok(());
        }

        // queued behind any in-flight write, registered before any
        // suspension: per-pid writes settle in acceptance order and probes
        // defer on them
        let (done, waiter) = watch::channel(false);
        let start_now = {
            let queue = state.write_in_progress.entry(persistence_id.clone()).or_default();
            queue.push_back(PendingWrite { batches: Some(batches), reply, done, waiter });
            queue.len() == 1
        };
        if start_now {
            Self::start_write(myself, state, &persistence_id);
        }
        Ok(())
    }

    /// Launches the write pipeline for the queue head
    fn start_write(myself: &ActorRef<JournalMessage>, state: &mut JournalActorState, persistence_id: &str) {
        let batches = match state
            .write_in_progress
            .get_mut(persistence_id)
            .and_then(|queue| queue.front_mut())
            .and_then(|head| head.batches.take())
        {
            Some(batches) => batches,
            None => return
        };

        let context = state.context.clone();
        let statements = state.statements.clone();
        let gateway = state.gateway.clone();
        let tag_writer = state.tag_writer.clone();
        let journal_ref = myself.clone();
        let persistence_id = persistence_id.to_string();
        tokio::spawn(async move {
            let outcome = write_pipeline(&context, &statements, &gateway, tag_writer, batches).await;
            let _ = journal_ref.cast(JournalMessage::WriteFinished { persistence_id, outcome });
        });
    }

    fn handle_delete_to(
        &self,
        myself: &ActorRef<JournalMessage>,
        persistence_id: String,
        to_sequence_nr: i64,
        reply: RpcReplyPort<Result<(), JournalError>>,
        state: &mut JournalActorState
    ) -> Result<(), JournalError> {
        event!(Level::DEBUG, event = journal::DELETE_RECEIVED,
               persistence_id = %persistence_id, to_sequence_nr = to_sequence_nr);

        if !state.context.config.support_deletes {
            send_reply(
                reply,
                Err(JournalError::Unsupported("deletes are disabled (support_deletes = false)".to_string())),
                journal::DELETE_FAILED
            );
            return Ok(());
        }

        let max_concurrent = state.context.config.max_concurrent_deletes;
        let start_now = {
            let queue = state.pending_deletes.entry(persistence_id.clone()).or_default();
            if queue.is_empty() {
                queue.push_back(PendingDelete { to_sequence_nr, reply });
                true
            } else if queue.len() >= max_concurrent {
                let queued = queue.len();
                event!(Level::WARN, event = journal::DELETE_BACKPRESSURE,
                       persistence_id = %persistence_id, queued = queued);
                send_reply(
                    reply,
                    Err(JournalError::Backpressure(format!(
                        "{} deletes already pending for '{}'",
                        queued, persistence_id
                    ))),
                    journal::DELETE_BACKPRESSURE
                );
                false
            } else {
                queue.push_back(PendingDelete { to_sequence_nr, reply });
                event!(Level::DEBUG, event = journal::DELETE_QUEUED,
                       persistence_id = %persistence_id, queued = queue.len());
                false
            }
        };
        if start_now {
            Self::start_delete(myself, state, &persistence_id, to_sequence_nr);
        }
        Ok(())
    }

    /// Launches the delete pipeline for the queue head
    fn start_delete(
        myself: &ActorRef<JournalMessage>,
        state: &JournalActorState,
        persistence_id: &str,
        to_sequence_nr: i64
    ) {
        let context = state.context.clone();
        let statements = state.statements.clone();
        let reader = state.reader.clone();
        let journal_ref = myself.clone();
        let persistence_id = persistence_id.to_string();
        tokio::spawn(async move {
            let outcome = delete_pipeline(&context, &statements, &reader, &persistence_id, to_sequence_nr).await;
            let _ = journal_ref.cast(JournalMessage::DeleteFinished { persistence_id, outcome });
        });
    }

    fn handle_highest_sequence_nr(
        &self,
        persistence_id: String,
        from_sequence_nr: i64,
        reply: RpcReplyPort<Result<i64, JournalError>>,
        state: &mut JournalActorState
    ) -> Result<(), JournalError> {
        event!(Level::DEBUG, event = journal::HIGHEST_REQUESTED,
               persistence_id = %persistence_id, from_sequence_nr = from_sequence_nr);

        // the youngest accepted write settles last, so waiting on it covers
        // every older write for this persistence id
        let waiter =
            state.write_in_progress.get(&persistence_id).and_then(|queue| queue.back()).map(|write| write.waiter.clone());
        let context = state.context.clone();
        let reader = state.reader.clone();
        let tag_writer = state.tag_writer.clone();
        tokio::spawn(async move {
            if let Some(mut done) = waiter {
                let _ = done.wait_for(|finished| *finished).await;
            }

            let result = reader.highest_sequence_nr(&persistence_id, from_sequence_nr).await;

            // a recovery that will replay nothing never reaches the normal
            // "replay drives tag progress" path, so seed the tag writer here
            if let (Ok(highest), Some(tag_writer)) = (&result, &tag_writer) {
                if *highest == from_sequence_nr {
                    if let Err(e) =
                        recover_tag_views(&context, &reader, tag_writer, &persistence_id, *highest).await
                    {
                        event!(Level::WARN, event = journal::TAG_RECOVERY_FAILED,
                               persistence_id = %persistence_id, error = %e);
                    }
                }
            }

            send_reply(reply, result, journal::HIGHEST_REQUESTED);
        });
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_replay_messages(
        &self,
        persistence_id: String,
        from_sequence_nr: i64,
        to_sequence_nr: i64,
        max: u64,
        sink: mpsc::Sender<ReplayedEvent>,
        reply: RpcReplyPort<Result<(), JournalError>>,
        state: &mut JournalActorState
    ) -> Result<(), JournalError> {
        event!(Level::DEBUG, event = journal::REPLAY_STARTED,
               persistence_id = %persistence_id, from_sequence_nr = from_sequence_nr,
               to_sequence_nr = to_sequence_nr);

        let reader = state.reader.clone();
        tokio::spawn(async move {
            let result = reader
                .events_by_persistence_id(&persistence_id, from_sequence_nr, to_sequence_nr, max, &sink)
                .await;
            match &result {
                Ok(delivered) => event!(Level::DEBUG, event = journal::REPLAY_COMPLETED,
                                        persistence_id = %persistence_id, delivered = delivered),
                Err(e) => event!(Level::ERROR, event = journal::REPLAY_FAILED,
                                 persistence_id = %persistence_id, error = %e)
            }
            send_reply(reply, result.map(|_| ()), journal::REPLAY_COMPLETED);
        });
        Ok(())
    }

    fn handle_write_finished(
        &self,
        myself: &ActorRef<JournalMessage>,
        persistence_id: String,
        outcome: Result<WriteResults, JournalError>,
        state: &mut JournalActorState
    ) -> Result<(), JournalError> {
        let queue = state.write_in_progress.get_mut(&persistence_id).ok_or_else(|| {
            JournalError::Generic(format!("write finished for '{}' without an in-progress entry", persistence_id))
        })?;
        let head = queue.pop_front().ok_or_else(|| {
            JournalError::Generic(format!("write finished for '{}' with an empty queue", persistence_id))
        })?;

        match &outcome {
            Ok(_) => event!(Level::DEBUG, event = journal::WRITE_COMPLETED, persistence_id = %persistence_id),
            Err(e) => {
                event!(Level::ERROR, event = journal::WRITE_FAILED, persistence_id = %persistence_id, error = %e)
            }
        }
        // the write settles even on failure so probes and replays proceed
        let _ = head.done.send(true);
        send_reply(head.reply, outcome, journal::WRITE_COMPLETED);

        let has_next = queue.front().is_some();
        if has_next {
            Self::start_write(myself, state, &persistence_id);
        } else {
            state.write_in_progress.remove(&persistence_id);
        }
        Ok(())
    }

    fn handle_delete_finished(
        &self,
        myself: &ActorRef<JournalMessage>,
        persistence_id: String,
        outcome: Result<(), JournalError>,
        state: &mut JournalActorState
    ) -> Result<(), JournalError> {
        let queue = state.pending_deletes.get_mut(&persistence_id).ok_or_else(|| {
            JournalError::Generic(format!("delete finished for '{}' without a pending queue", persistence_id))
        })?;
        let head = queue.pop_front().ok_or_else(|| {
            JournalError::Generic(format!("delete finished for '{}' with an empty queue", persistence_id))
        })?;

        match &outcome {
            Ok(()) => event!(Level::DEBUG, event = journal::DELETE_COMPLETED,
                             persistence_id = %persistence_id, to_sequence_nr = head.to_sequence_nr),
            Err(e) => event!(Level::ERROR, event = journal::DELETE_FAILED,
                             persistence_id = %persistence_id, error = %e)
        }
        send_reply(head.reply, outcome, journal::DELETE_COMPLETED);

        let next_to_sequence_nr = queue.front().map(|next| next.to_sequence_nr);
        match next_to_sequence_nr {
            Some(to_sequence_nr) => Self::start_delete(myself, state, &persistence_id, to_sequence_nr),
            None => {
                state.pending_deletes.remove(&persistence_id);
            }
        }
        Ok(())
    }
}

fn send_reply<T>(reply: RpcReplyPort<T>, value: T, event_name: &'static str) {
    if let Err(e) = reply.send(value) {
        event!(Level::ERROR, event = event_name, error = %e, message = "reply_channel_closed");
    }
}

/// Call-level preconditions: one persistence id, at most two adjacent
/// partitions between the first and last row
fn validate_write(batches: &[AtomicWrite], partition_size: i64) -> Result<(), JournalError> {
    let persistence_id = batches[0].persistence_id();
    if batches.iter().any(|b| b.persistence_id() != persistence_id) {
        return Err(JournalError::Precondition("a write call must target a single persistence id".to_string()));
    }

    let min_partition_nr = partition::partition_of(batches[0].lowest_sequence_nr(), partition_size);
    let max_partition_nr =
        partition::partition_of(batches[batches.len() - 1].highest_sequence_nr(), partition_size);
    if max_partition_nr - min_partition_nr > 1 {
        return Err(JournalError::Precondition(format!(
            "write for '{}' would span {} partitions; the replay reader only scans adjacent ones",
            persistence_id,
            max_partition_nr - min_partition_nr + 1
        )));
    }
    Ok(())
}

/// Serializes, groups, executes, and fans out one accepted write call
async fn write_pipeline(
    context: &JournalContext,
    statements: &JournalStatements,
    gateway: &SerializerGateway,
    tag_writer: Option<ActorRef<TagWriterMessage>>,
    batches: Vec<AtomicWrite>
) -> Result<WriteResults, JournalError> {
    let config = &context.config;

    // serialization errors fail the whole call: a per-batch failure here
    // would leave sequence-nr holes visible to the tag view
    let mut serialized: Vec<Vec<Arc<SerializedRow>>> = Vec::with_capacity(batches.len());
    for batch in &batches {
        // every row of an atomic write lands in the partition of its last
        // event, so the write commits into a single row-group
        let partition_nr = partition::partition_of(batch.highest_sequence_nr(), config.target_partition_size);
        let mut rows = Vec::with_capacity(batch.len());
        for envelope in batch.events() {
            let time_uuid = context.uuid_generator.next_uuid();
            let row = gateway.serialize_event(envelope, time_uuid, partition_nr, config.bucket_size).await?;
            rows.push(Arc::new(row));
        }
        serialized.push(rows);
    }

    let total: usize = serialized.iter().map(|rows| rows.len()).sum();
    let groups = if total <= config.max_message_batch_size {
        vec![(0..serialized.len()).collect::<Vec<_>>()]
    } else {
        group_batches(&serialized, config.max_message_batch_size)
    };

    // groups run strictly sequentially; once one fails, later groups are not
    // issued, so no committed events ever sit behind a hole
    let mut results: WriteResults = vec![Ok(()); serialized.len()];
    let mut failure: Option<JournalError> = None;
    for group in &groups {
        if let Some(e) = &failure {
            for index in group {
                results[*index] = Err(e.clone());
            }
            continue;
        }
        let rows: Vec<&Arc<SerializedRow>> = group.iter().flat_map(|index| serialized[*index].iter()).collect();
        if let Err(e) = execute_group(context, statements, &rows).await {
            for index in group {
                results[*index] = Err(e.clone());
            }
            failure = Some(e);
        }
    }

    if let Some(tag_writer) = tag_writer {
        let committed: Vec<Arc<SerializedRow>> = groups
            .iter()
            .flat_map(|group| group.iter())
            .filter(|index| results[**index].is_ok())
            .flat_map(|index| serialized[*index].iter().cloned())
            .collect();
        if !committed.is_empty() {
            let _ = tag_writer.cast(TagWriterMessage::BulkWrite(BulkTagWrite::from_rows(&committed)));
        }
    }

    Ok(results)
}

/// Greedily groups batch indices so each group stays within the chunk size;
/// an oversized atomic write forms a group of its own
fn group_batches(serialized: &[Vec<Arc<SerializedRow>>], max_batch_size: usize) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_size = 0usize;
    for (index, rows) in serialized.iter().enumerate() {
        if !current.is_empty() && current_size + rows.len() > max_batch_size {
            groups.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current.push(index);
        current_size += rows.len();
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

async fn execute_group(
    context: &JournalContext,
    statements: &JournalStatements,
    rows: &[&Arc<SerializedRow>]
) -> Result<(), JournalError> {
    let profile = &context.config.write_profile;
    let bounds: Vec<_> = rows.iter().map(|row| statements.bind_write(row, profile)).collect();
    match bounds.as_slice() {
        [single] => context.session.execute(single).await.map(|_| ()),
        many => context.session.execute_batch(many, profile).await
    }
}

/// Reads the watermark, advances it, and best-effort removes physical rows
async fn delete_pipeline(
    context: &JournalContext,
    statements: &JournalStatements,
    reader: &JournalReader,
    persistence_id: &str,
    requested_to: i64
) -> Result<(), JournalError> {
    let config = &context.config;
    let deleted_to = reader.read_deleted_to(persistence_id).await?;

    let to_sequence_nr = if requested_to == i64::MAX {
        reader.highest_sequence_nr(persistence_id, deleted_to).await?
    } else {
        requested_to
    };
    if to_sequence_nr <= deleted_to {
        // watermark already past the request: idempotent success
        return Ok(());
    }

    let marker = statements.bind_insert_deleted_to(persistence_id, to_sequence_nr, &config.write_profile)?;
    context.session.execute(&marker).await?;

    // failures below are logged only, the marker above is authoritative
    if config.cassandra_2x_compat {
        physical_delete_compat(context, statements, reader, persistence_id, deleted_to, to_sequence_nr).await;
    } else {
        // the +1 catches rows of an atomic write that straddled into the
        // next partition
        let from_partition_nr = partition::partition_of(deleted_to + 1, config.target_partition_size);
        let to_partition_nr = partition::partition_of(to_sequence_nr, config.target_partition_size) + 1;
        for partition_nr in from_partition_nr..=to_partition_nr {
            let bound = match statements.bind_delete_to_partition(
                persistence_id,
                partition_nr,
                to_sequence_nr,
                &config.write_profile
            ) {
                Ok(bound) => bound,
                Err(e) => {
                    warn_physical_delete(persistence_id, partition_nr, &e);
                    continue;
                }
            };
            if let Err(e) = context.session.execute(&bound).await {
                warn_physical_delete(persistence_id, partition_nr, &e);
            }
        }
    }
    Ok(())
}

/// Per-row deletes for stores without range-delete support: probe each
/// partition's bounds, enumerate, and chunk into unlogged batches
async fn physical_delete_compat(
    context: &JournalContext,
    statements: &JournalStatements,
    reader: &JournalReader,
    persistence_id: &str,
    deleted_to: i64,
    to_sequence_nr: i64
) {
    let config = &context.config;
    let from_partition_nr = partition::partition_of(deleted_to + 1, config.target_partition_size);
    let to_partition_nr = partition::partition_of(to_sequence_nr, config.target_partition_size) + 1;

    for partition_nr in from_partition_nr..=to_partition_nr {
        let info = match partition_info(reader, persistence_id, partition_nr).await {
            Ok(Some(info)) => info,
            Ok(None) => continue,
            Err(e) => {
                warn_physical_delete(persistence_id, partition_nr, &e);
                continue;
            }
        };

        let first = info.min_sequence_nr.max(deleted_to + 1);
        let last = info.max_sequence_nr.min(to_sequence_nr);
        if first > last {
            continue;
        }

        let sequence_nrs: Vec<i64> = (first..=last).collect();
        for chunk in sequence_nrs.chunks(config.max_message_batch_size) {
            let mut deletes = Vec::with_capacity(chunk.len());
            for sequence_nr in chunk {
                match statements.bind_delete_message(persistence_id, partition_nr, *sequence_nr, &config.write_profile)
                {
                    Ok(bound) => deletes.push(bound),
                    Err(e) => warn_physical_delete(persistence_id, partition_nr, &e)
                }
            }
            if let Err(e) = context.session.execute_batch(&deletes, &config.write_profile).await {
                warn_physical_delete(persistence_id, partition_nr, &e);
            }
        }
    }
}

async fn partition_info(
    reader: &JournalReader,
    persistence_id: &str,
    partition_nr: i64
) -> Result<Option<PartitionInfo>, JournalError> {
    let highest = reader.highest_in_partition(persistence_id, partition_nr).await?;
    let lowest = reader.lowest_in_partition(persistence_id, partition_nr).await?;
    Ok(match (lowest, highest) {
        (Some(min_sequence_nr), Some(max_sequence_nr)) => {
            Some(PartitionInfo { partition_nr, min_sequence_nr, max_sequence_nr })
        }
        _ => None
    })
}

fn warn_physical_delete(persistence_id: &str, partition_nr: i64, error: &JournalError) {
    event!(Level::WARN, event = journal::PHYSICAL_DELETE_FAILED,
           persistence_id = %persistence_id, partition_nr = partition_nr, error = %error,
           message = "rows remain and need manual cleanup; the deleted_to marker is authoritative");
}

/// Seeds the tag writer when a recovery will replay zero events: restore the
/// stored watermarks, then re-emit any stored rows the view has not seen
async fn recover_tag_views(
    context: &JournalContext,
    reader: &JournalReader,
    tag_writer: &ActorRef<TagWriterMessage>,
    persistence_id: &str,
    highest_sequence_nr: i64
) -> Result<(), JournalError> {
    let progress = reader.tag_progress(persistence_id).await?;
    let _ = tag_writer.cast(TagWriterMessage::PersistentActorStarting {
        persistence_id: persistence_id.to_string(),
        progress: progress.clone()
    });

    let min_progress = progress.values().map(|p| p.sequence_nr).min().unwrap_or(0);
    let scan_from = context.config.tag_scan_start_sequence_nr.max(min_progress + 1);
    if scan_from > highest_sequence_nr {
        return Ok(());
    }

    let rows = reader.raw_rows(persistence_id, scan_from, highest_sequence_nr).await?;
    let missed: Vec<Arc<SerializedRow>> = rows
        .into_iter()
        .filter(|row| {
            row.tags
                .iter()
                .any(|tag| progress.get(tag).map(|p| p.sequence_nr).unwrap_or(0) < row.sequence_nr)
        })
        .map(Arc::new)
        .collect();

    if !missed.is_empty() {
        let _ = tag_writer.cast(TagWriterMessage::BulkWrite(BulkTagWrite::from_rows(&missed)));
    }
    Ok(())
}

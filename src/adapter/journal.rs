//! Journal adapter - the handle hosting frameworks talk to
//!
//! `JournalFactory` spawns the journal actor system; `JournalHandle` turns
//! the [`Journal`] port's calls into actor rpc.

use std::sync::Arc;

use async_trait::async_trait;
use ractor::{
    Actor, ActorRef,
    rpc::{CallResult, call}
};
use tokio::sync::mpsc;

use crate::{
    JournalContext,
    actor::{
        journal::JournalActor,
        message::{JournalMessage, WriteResults}
    },
    domain::{
        error::JournalError,
        event::{AtomicWrite, ReplayedEvent}
    },
    port::journal::Journal
};

/// Clonable handle to a running journal actor
#[derive(Clone)]
pub struct JournalHandle {
    journal: ActorRef<JournalMessage>
}

impl JournalHandle {
    pub fn actor(&self) -> &ActorRef<JournalMessage> {
        &self.journal
    }

    /// Stops the journal actor; outstanding calls fail with actor errors
    pub fn stop(&self) {
        self.journal.stop(None);
    }

    async fn rpc<T, F>(&self, build: F, operation: &str) -> Result<T, JournalError>
    where
        T: Send + 'static,
        F: FnOnce(ractor::RpcReplyPort<Result<T, JournalError>>) -> JournalMessage
    {
        match call(&self.journal, build, None).await {
            Ok(CallResult::Success(result)) => result,
            Ok(CallResult::Timeout) => Err(JournalError::Timeout(format!("{} timed out", operation))),
            Ok(CallResult::SenderError) => {
                Err(JournalError::Actor(format!("journal dropped the {} reply channel", operation)))
            }
            Err(e) => Err(JournalError::Actor(e.to_string()))
        }
    }
}

#[async_trait]
impl Journal for JournalHandle {
    async fn write_atomic_batches(&self, batches: Vec<AtomicWrite>) -> Result<WriteResults, JournalError> {
        self.rpc(|reply| JournalMessage::WriteMessages { batches, reply }, "write_atomic_batches").await
    }

    async fn delete_to(&self, persistence_id: &str, to_sequence_nr: i64) -> Result<(), JournalError> {
        let persistence_id = persistence_id.to_string();
        self.rpc(|reply| JournalMessage::DeleteTo { persistence_id, to_sequence_nr, reply }, "delete_to").await
    }

    async fn highest_sequence_nr(&self, persistence_id: &str, from_sequence_nr: i64) -> Result<i64, JournalError> {
        let persistence_id = persistence_id.to_string();
        self.rpc(
            |reply| JournalMessage::HighestSequenceNr { persistence_id, from_sequence_nr, reply },
            "highest_sequence_nr"
        )
        .await
    }

    async fn replay_messages(
        &self,
        persistence_id: &str,
        from_sequence_nr: i64,
        to_sequence_nr: i64,
        max: u64,
        sink: mpsc::Sender<ReplayedEvent>
    ) -> Result<(), JournalError> {
        let persistence_id = persistence_id.to_string();
        self.rpc(
            |reply| JournalMessage::ReplayMessages {
                persistence_id,
                from_sequence_nr,
                to_sequence_nr,
                max,
                sink,
                reply
            },
            "replay_messages"
        )
        .await
    }
}

/// Factory - spawns the journal actor system over a context
pub struct JournalFactory;

impl JournalFactory {
    pub async fn spawn(context: Arc<JournalContext>) -> Result<JournalHandle, JournalError> {
        let (journal, _handle) = Actor::spawn(None, JournalActor, context).await?;
        Ok(JournalHandle { journal })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{
        adapter::{serializer::SerializerRegistry, session::InMemorySession},
        domain::event::EventEnvelope,
        port::serializer::{EventSerializer, Serialized, SerializedPayload},
        service::config::JournalConfig
    };

    fn test_config() -> JournalConfig {
        JournalConfig {
            target_partition_size: 5,
            max_message_batch_size: 10,
            max_concurrent_deletes: 3,
            ..JournalConfig::default()
        }
    }

    async fn spawn_journal(config: JournalConfig) -> (JournalHandle, Arc<InMemorySession>) {
        let session = Arc::new(InMemorySession::new());
        let handle = spawn_over(config, session.clone()).await;
        (handle, session)
    }

    async fn spawn_over(config: JournalConfig, session: Arc<InMemorySession>) -> JournalHandle {
        let context = Arc::new(JournalContext::init(config, session.clone()));
        JournalFactory::spawn(context).await.unwrap()
    }

    fn atomic(persistence_id: &str, from: i64, to: i64, tags: &[&str]) -> AtomicWrite {
        let events = (from..=to)
            .map(|sequence_nr| {
                EventEnvelope::new(persistence_id, sequence_nr, "writer-1", json!({ "n": sequence_nr }))
                    .with_tags(tags.iter().copied())
            })
            .collect();
        AtomicWrite::new(events).unwrap()
    }

    async fn write_ok(handle: &JournalHandle, batch: AtomicWrite) {
        let results = handle.write_atomic_batches(vec![batch]).await.unwrap();
        assert!(results.iter().all(Result::is_ok), "write failed: {:?}", results);
    }

    async fn replay(handle: &JournalHandle, persistence_id: &str, from: i64, to: i64, max: u64) -> Vec<ReplayedEvent> {
        let (tx, mut rx) = mpsc::channel(1024);
        handle.replay_messages(persistence_id, from, to, max, tx).await.unwrap();
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn sequence_nrs(events: &[ReplayedEvent]) -> Vec<i64> {
        events.iter().map(|e| e.sequence_nr).collect()
    }

    /// (sequence_nr, tag_pid_sequence_nr) pairs in materialized order
    async fn tag_rows(session: &InMemorySession, tag: &str) -> Vec<(i64, i64)> {
        session
            .tag_view_rows(tag)
            .await
            .iter()
            .map(|row| (row.bigint("sequence_nr").unwrap(), row.bigint("tag_pid_sequence_nr").unwrap()))
            .collect()
    }

    async fn wait_for_tag_rows(session: &InMemorySession, tag: &str, expected: usize) {
        for _ in 0..100 {
            if session.tag_view_rows(tag).await.len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("tag '{}' never reached {} view rows", tag, expected);
    }

    #[tokio::test]
    async fn test_write_then_highest_then_replay() {
        let (handle, _session) = spawn_journal(test_config()).await;

        write_ok(&handle, atomic("a", 1, 3, &[])).await;

        assert_eq!(handle.highest_sequence_nr("a", 0).await.unwrap(), 3);

        let events = replay(&handle, "a", 1, i64::MAX, u64::MAX).await;
        assert_eq!(sequence_nrs(&events), vec![1, 2, 3]);
        assert_eq!(events[0].payload, json!({ "n": 1 }));
        assert_eq!(events[0].writer_uuid, "writer-1");
    }

    #[tokio::test]
    async fn test_writes_across_partition_boundary() {
        let (handle, _session) = spawn_journal(test_config()).await;

        write_ok(&handle, atomic("a", 1, 5, &[])).await;
        write_ok(&handle, atomic("a", 6, 7, &[])).await;

        assert_eq!(handle.highest_sequence_nr("a", 0).await.unwrap(), 7);
        assert_eq!(sequence_nrs(&replay(&handle, "a", 1, i64::MAX, u64::MAX).await), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn test_atomic_write_may_straddle_two_partitions() {
        let (handle, _session) = spawn_journal(test_config()).await;

        write_ok(&handle, atomic("a", 1, 3, &[])).await;
        // 4..6 straddles the partition-0/1 boundary
        write_ok(&handle, atomic("a", 4, 6, &[])).await;

        assert_eq!(handle.highest_sequence_nr("a", 0).await.unwrap(), 6);
        assert_eq!(sequence_nrs(&replay(&handle, "a", 1, i64::MAX, u64::MAX).await), vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_write_spanning_three_partitions_is_rejected() {
        let (handle, _session) = spawn_journal(test_config()).await;

        let result = handle.write_atomic_batches(vec![atomic("a", 3, 12, &[])]).await;
        assert!(matches!(result, Err(JournalError::Precondition(_))));
    }

    #[tokio::test]
    async fn test_write_call_requires_single_persistence_id() {
        let (handle, _session) = spawn_journal(test_config()).await;

        let result = handle.write_atomic_batches(vec![atomic("a", 1, 2, &[]), atomic("b", 1, 2, &[])]).await;
        assert!(matches!(result, Err(JournalError::Precondition(_))));
    }

    #[tokio::test]
    async fn test_empty_write_call_is_a_noop() {
        let (handle, _session) = spawn_journal(test_config()).await;
        assert!(handle.write_atomic_batches(Vec::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_highest_tolerates_fully_skipped_partition() {
        let (handle, _session) = spawn_journal(test_config()).await;

        write_ok(&handle, atomic("a", 1, 5, &[])).await;
        // 6..11 is placed in the partition of its last event, leaving
        // partition 1 completely empty
        write_ok(&handle, atomic("a", 6, 11, &[])).await;

        assert_eq!(handle.highest_sequence_nr("a", 0).await.unwrap(), 11);
        assert_eq!(
            sequence_nrs(&replay(&handle, "a", 1, i64::MAX, u64::MAX).await),
            (1..=11).collect::<Vec<i64>>()
        );
    }

    #[tokio::test]
    async fn test_highest_tolerates_sparse_stream() {
        let (handle, _session) = spawn_journal(test_config()).await;

        write_ok(&handle, atomic("a", 1, 1, &[])).await;
        write_ok(&handle, atomic("a", 10, 10, &[])).await;

        assert_eq!(handle.highest_sequence_nr("a", 1).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_highest_of_unknown_persistence_id() {
        let (handle, _session) = spawn_journal(test_config()).await;
        assert_eq!(handle.highest_sequence_nr("nobody", 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replay_respects_bounds_and_max() {
        let (handle, _session) = spawn_journal(test_config()).await;
        write_ok(&handle, atomic("a", 1, 5, &[])).await;

        assert_eq!(sequence_nrs(&replay(&handle, "a", 2, 4, u64::MAX).await), vec![2, 3, 4]);
        assert_eq!(sequence_nrs(&replay(&handle, "a", 1, i64::MAX, 2).await), vec![1, 2]);
        assert!(replay(&handle, "a", 6, i64::MAX, u64::MAX).await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_hides_events_from_replay() {
        let (handle, session) = spawn_journal(test_config()).await;
        write_ok(&handle, atomic("a", 1, 3, &[])).await;

        handle.delete_to("a", 3).await.unwrap();

        assert_eq!(session.deleted_to("a").await, Some(3));
        assert!(replay(&handle, "a", 1, i64::MAX, u64::MAX).await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_and_monotonic() {
        let (handle, session) = spawn_journal(test_config()).await;
        write_ok(&handle, atomic("a", 1, 5, &[])).await;

        handle.delete_to("a", 3).await.unwrap();
        handle.delete_to("a", 3).await.unwrap();
        assert_eq!(session.deleted_to("a").await, Some(3));

        // a lower request never regresses the watermark
        handle.delete_to("a", 2).await.unwrap();
        assert_eq!(session.deleted_to("a").await, Some(3));

        assert_eq!(sequence_nrs(&replay(&handle, "a", 1, i64::MAX, u64::MAX).await), vec![4, 5]);
    }

    #[tokio::test]
    async fn test_delete_everything_magic_value() {
        let (handle, session) = spawn_journal(test_config()).await;
        write_ok(&handle, atomic("a", 1, 7, &[])).await;

        handle.delete_to("a", i64::MAX).await.unwrap();

        assert_eq!(session.deleted_to("a").await, Some(7));
        assert!(replay(&handle, "a", 1, i64::MAX, u64::MAX).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_deletes_queue_and_backpressure() {
        let (handle, session) = spawn_journal(test_config()).await;
        write_ok(&handle, atomic("a", 1, 3, &[])).await;

        session.set_delete_delay(Some(Duration::from_millis(100))).await;

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move { handle.delete_to("a", 3).await }));
        }

        let mut succeeded = 0;
        let mut backpressured = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => succeeded += 1,
                Err(JournalError::Backpressure(_)) => backpressured += 1,
                Err(e) => panic!("unexpected delete outcome: {}", e)
            }
        }

        assert_eq!(succeeded, 3);
        assert_eq!(backpressured, 2);
        assert_eq!(session.deleted_to("a").await, Some(3));
    }

    #[tokio::test]
    async fn test_deletes_disabled_fail_unsupported() {
        let config = JournalConfig { support_deletes: false, ..test_config() };
        let (handle, _session) = spawn_journal(config).await;
        write_ok(&handle, atomic("a", 1, 3, &[])).await;

        let result = handle.delete_to("a", 2).await;
        assert!(matches!(result, Err(JournalError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_physical_delete_failure_is_swallowed() {
        let (handle, session) = spawn_journal(test_config()).await;
        write_ok(&handle, atomic("a", 1, 3, &[])).await;

        session.set_fail_deletes(true).await;
        handle.delete_to("a", 3).await.unwrap();

        // rows remain, but the authoritative marker hides them from readers
        assert_eq!(session.deleted_to("a").await, Some(3));
        assert_eq!(session.stored_message_count("a").await, 3);
        assert!(replay(&handle, "a", 1, i64::MAX, u64::MAX).await.is_empty());
    }

    #[tokio::test]
    async fn test_compat_mode_deletes_per_row() {
        let config = JournalConfig { cassandra_2x_compat: true, ..test_config() };
        let (handle, session) = spawn_journal(config).await;
        write_ok(&handle, atomic("a", 1, 5, &[])).await;
        write_ok(&handle, atomic("a", 6, 7, &[])).await;

        handle.delete_to("a", 4).await.unwrap();

        assert_eq!(session.deleted_to("a").await, Some(4));
        assert_eq!(session.stored_message_count("a").await, 3);
        assert_eq!(sequence_nrs(&replay(&handle, "a", 1, i64::MAX, u64::MAX).await), vec![5, 6, 7]);
    }

    #[tokio::test]
    async fn test_highest_defers_on_write_in_progress() {
        let (handle, session) = spawn_journal(test_config()).await;
        session.set_write_delay(Some(Duration::from_millis(120))).await;

        let writer = handle.clone();
        let write_task = tokio::spawn(async move { writer.write_atomic_batches(vec![atomic("a", 1, 3, &[])]).await });

        // let the write register before probing
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.highest_sequence_nr("a", 0).await.unwrap(), 3);

        assert!(write_task.await.unwrap().unwrap().iter().all(Result::is_ok));
    }

    #[tokio::test]
    async fn test_writes_for_one_persistence_id_settle_in_acceptance_order() {
        let (handle, session) = spawn_journal(test_config()).await;
        session.set_write_delay(Some(Duration::from_millis(100))).await;

        let started = std::time::Instant::now();
        let first = handle.clone();
        let first_task = tokio::spawn(async move { first.write_atomic_batches(vec![atomic("a", 1, 3, &[])]).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = handle.clone();
        let second_task = tokio::spawn(async move { second.write_atomic_batches(vec![atomic("a", 4, 5, &[])]).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // the probe arrives while both writes are outstanding and must
        // observe everything accepted before it
        assert_eq!(handle.highest_sequence_nr("a", 0).await.unwrap(), 5);

        assert!(first_task.await.unwrap().unwrap().iter().all(Result::is_ok));
        assert!(second_task.await.unwrap().unwrap().iter().all(Result::is_ok));

        // the second write only started after the first settled
        assert!(started.elapsed() >= Duration::from_millis(200), "writes for one persistence id overlapped");

        assert_eq!(sequence_nrs(&replay(&handle, "a", 1, i64::MAX, u64::MAX).await), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_execution_failure_marks_batches_failed_then_recovers() {
        let (handle, session) = spawn_journal(test_config()).await;

        session.set_fail_writes(true).await;
        let results = handle.write_atomic_batches(vec![atomic("a", 1, 2, &[])]).await.unwrap();
        assert!(matches!(results[0], Err(JournalError::Execution(_))));

        // the in-progress entry was still cleared: the retry proceeds
        session.set_fail_writes(false).await;
        write_ok(&handle, atomic("a", 1, 2, &[])).await;
        assert_eq!(handle.highest_sequence_nr("a", 0).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_large_call_is_chunked_into_sequential_groups() {
        let config = JournalConfig { target_partition_size: 500, ..test_config() };
        let (handle, _session) = spawn_journal(config).await;

        // 12 events across 3 batches exceed the chunk size of 10
        let results = handle
            .write_atomic_batches(vec![
                atomic("a", 1, 4, &[]),
                atomic("a", 5, 8, &[]),
                atomic("a", 9, 12, &[]),
            ])
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(Result::is_ok));

        assert_eq!(sequence_nrs(&replay(&handle, "a", 1, i64::MAX, u64::MAX).await), (1..=12).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_tag_writer_receives_events_in_order() {
        let (handle, session) = spawn_journal(test_config()).await;

        write_ok(&handle, atomic("a", 1, 5, &["red"])).await;
        write_ok(&handle, atomic("a", 6, 7, &["red", "blue"])).await;

        wait_for_tag_rows(&session, "red", 7).await;
        wait_for_tag_rows(&session, "blue", 2).await;

        assert_eq!(tag_rows(&session, "red").await, vec![(1, 1), (2, 2), (3, 3), (4, 4), (5, 5), (6, 6), (7, 7)]);
        assert_eq!(tag_rows(&session, "blue").await, vec![(6, 1), (7, 2)]);
    }

    #[tokio::test]
    async fn test_pre_snapshot_tag_scan_backfills_the_view() {
        let session = Arc::new(InMemorySession::new());

        // first incarnation stores tagged rows with the view disabled
        let disabled = JournalConfig { events_by_tag_enabled: false, ..test_config() };
        let first = spawn_over(disabled, session.clone()).await;
        write_ok(&first, atomic("a", 1, 3, &["red"])).await;
        assert!(session.tag_view_rows("red").await.is_empty());
        first.stop();

        // a recovery that replays nothing must still seed the tag view
        let second = spawn_over(test_config(), session.clone()).await;
        assert_eq!(second.highest_sequence_nr("a", 3).await.unwrap(), 3);

        wait_for_tag_rows(&session, "red", 3).await;
        assert_eq!(tag_rows(&session, "red").await, vec![(1, 1), (2, 2), (3, 3)]);
    }

    #[tokio::test]
    async fn test_metadata_and_manifest_survive_the_roundtrip() {
        let (handle, _session) = spawn_journal(test_config()).await;

        let event = EventEnvelope::new("a", 1, "writer-1", json!({ "kind": "created" }))
            .with_manifest("v2")
            .with_metadata(json!({ "correlation": "abc" }));
        write_ok(&handle, AtomicWrite::new(vec![event]).unwrap()).await;

        let events = replay(&handle, "a", 1, i64::MAX, u64::MAX).await;
        assert_eq!(events[0].manifest, "v2");
        match &events[0].metadata {
            Some(crate::domain::event::ReplayedMeta::Decoded(value)) => {
                assert_eq!(*value, json!({ "correlation": "abc" }))
            }
            other => panic!("expected decoded metadata, got {:?}", other)
        }
    }

    #[tokio::test]
    async fn test_pre_snapshot_scan_honors_the_configured_start() {
        let session = Arc::new(InMemorySession::new());

        let disabled = JournalConfig { events_by_tag_enabled: false, ..test_config() };
        let first = spawn_over(disabled, session.clone()).await;
        write_ok(&first, atomic("a", 1, 3, &["red"])).await;
        first.stop();

        let bounded = JournalConfig { tag_scan_start_sequence_nr: 3, ..test_config() };
        let second = spawn_over(bounded, session.clone()).await;
        assert_eq!(second.highest_sequence_nr("a", 3).await.unwrap(), 3);

        wait_for_tag_rows(&session, "red", 1).await;
        assert_eq!(tag_rows(&session, "red").await, vec![(3, 1)]);
    }

    #[tokio::test]
    async fn test_custom_uuid_generator_is_used() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        use crate::domain::timeuuid::{MonotonicTimeUuidGenerator, TimeUuidGenerator};

        struct RecordingGenerator {
            inner: MonotonicTimeUuidGenerator,
            count: AtomicUsize
        }

        impl TimeUuidGenerator for RecordingGenerator {
            fn next_uuid(&self) -> uuid::Uuid {
                self.count.fetch_add(1, Ordering::SeqCst);
                self.inner.next_uuid()
            }
        }

        let generator =
            Arc::new(RecordingGenerator { inner: MonotonicTimeUuidGenerator::new(), count: AtomicUsize::new(0) });
        let session = Arc::new(InMemorySession::new());
        let context =
            Arc::new(JournalContext::init(test_config(), session.clone()).with_uuid_generator(generator.clone()));
        let handle = JournalFactory::spawn(context).await.unwrap();

        write_ok(&handle, atomic("a", 1, 3, &[])).await;
        assert_eq!(generator.count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_triggers_coordinated_shutdown() {
        let config = JournalConfig { coordinated_shutdown_on_error: true, ..test_config() };
        let session = Arc::new(InMemorySession::new());
        let context = Arc::new(JournalContext::init(config, session.clone()));
        let handle = JournalFactory::spawn(context.clone()).await.unwrap();

        let shutdown = context.shutdown.clone();
        let notified = tokio::spawn(async move { shutdown.notified().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // a completion for a delete that was never accepted corrupts the
        // coordination state and must stop the journal
        handle
            .actor()
            .cast(crate::actor::message::JournalMessage::DeleteFinished {
                persistence_id: "ghost".to_string(),
                outcome: Ok(())
            })
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), notified).await.expect("shutdown never signaled").unwrap();
    }

    struct FailingSerializer;

    impl EventSerializer for FailingSerializer {
        fn ser_id(&self) -> i32 {
            99
        }

        fn manifest(&self) -> &str {
            "failing"
        }

        fn serialize(&self, _payload: &serde_json::Value) -> Serialized {
            Serialized::Sync(Err(JournalError::Serialization("encoder rejected the payload".to_string())))
        }

        fn deserialize(&self, _bytes: &[u8], _manifest: &str) -> Result<serde_json::Value, JournalError> {
            Err(JournalError::Deserialization("decoder always fails".to_string()))
        }
    }

    #[tokio::test]
    async fn test_serialization_error_fails_the_whole_call() {
        let session = Arc::new(InMemorySession::new());
        let registry = Arc::new(SerializerRegistry::json().with_serializer(Arc::new(FailingSerializer)).with_default(99));
        let context = Arc::new(JournalContext::init(test_config(), session.clone()).with_serializers(registry));
        let handle = JournalFactory::spawn(context).await.unwrap();

        let result = handle.write_atomic_batches(vec![atomic("a", 1, 2, &[])]).await;
        assert!(matches!(result, Err(JournalError::Serialization(_))));
        assert_eq!(session.stored_message_count("a").await, 0);
    }

    struct AsyncJsonSerializer;

    impl EventSerializer for AsyncJsonSerializer {
        fn ser_id(&self) -> i32 {
            7
        }

        fn manifest(&self) -> &str {
            "json-async"
        }

        fn serialize(&self, payload: &serde_json::Value) -> Serialized {
            let payload = payload.clone();
            Serialized::Async(Box::pin(async move {
                serde_json::to_vec(&payload)
                    .map(|bytes| SerializedPayload { bytes, ser_id: 7, manifest: "json-async".to_string() })
                    .map_err(|e| JournalError::Serialization(e.to_string()))
            }))
        }

        fn deserialize(&self, bytes: &[u8], _manifest: &str) -> Result<serde_json::Value, JournalError> {
            serde_json::from_slice(bytes).map_err(|e| JournalError::Deserialization(e.to_string()))
        }
    }

    #[tokio::test]
    async fn test_async_serializer_roundtrip() {
        let session = Arc::new(InMemorySession::new());
        let registry =
            Arc::new(SerializerRegistry::json().with_serializer(Arc::new(AsyncJsonSerializer)).with_default(7));
        let context = Arc::new(JournalContext::init(test_config(), session.clone()).with_serializers(registry));
        let handle = JournalFactory::spawn(context).await.unwrap();

        write_ok(&handle, atomic("a", 1, 3, &[])).await;

        let events = replay(&handle, "a", 1, i64::MAX, u64::MAX).await;
        assert_eq!(sequence_nrs(&events), vec![1, 2, 3]);
        assert_eq!(events[1].payload, json!({ "n": 2 }));
    }
}

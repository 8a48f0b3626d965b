//! Serializer gateway
//!
//! Turns framework events into storage rows and back. Metadata is serialized
//! independently of the payload: when its encoder or decoder fails, the event
//! survives with an opaque blob under a sentinel manifest, because forward
//! compatibility matters more than strict recovery of unknown metadata types.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc
    }
};

use chrono::Utc;
use uuid::Uuid;

use crate::{
    domain::{
        bucket::{self, BucketSize},
        error::JournalError,
        event::{EventEnvelope, ReplayedEvent, ReplayedMeta, SerializedMeta, SerializedRow},
        timeuuid
    },
    port::{
        serializer::{EventSerializer, Serialized, SerializedPayload},
        session::Row
    }
};

/// Manifest stored when metadata could not be encoded or decoded
pub const UNKNOWN_META_MANIFEST: &str = "unknown-meta";

pub const JSON_SERIALIZER_ID: i32 = 1;
pub const JSON_MANIFEST: &str = "json";

/// Default serializer: payloads stored as JSON bytes
pub struct JsonEventSerializer;

impl EventSerializer for JsonEventSerializer {
    fn ser_id(&self) -> i32 {
        JSON_SERIALIZER_ID
    }

    fn manifest(&self) -> &str {
        JSON_MANIFEST
    }

    fn serialize(&self, payload: &serde_json::Value) -> Serialized {
        let result = serde_json::to_vec(payload)
            .map(|bytes| SerializedPayload { bytes, ser_id: JSON_SERIALIZER_ID, manifest: JSON_MANIFEST.to_string() })
            .map_err(|e| JournalError::Serialization(e.to_string()));
        Serialized::Sync(result)
    }

    fn deserialize(&self, bytes: &[u8], _manifest: &str) -> Result<serde_json::Value, JournalError> {
        serde_json::from_slice(bytes).map_err(|e| JournalError::Deserialization(e.to_string()))
    }
}

/// Registry of event serializers keyed by serializer id
pub struct SerializerRegistry {
    serializers: HashMap<i32, Arc<dyn EventSerializer>>,
    default_id:  i32
}

impl SerializerRegistry {
    /// Registry with the JSON serializer as the only and default entry
    pub fn json() -> Self {
        let json: Arc<dyn EventSerializer> = Arc::new(JsonEventSerializer);
        let mut serializers = HashMap::new();
        serializers.insert(json.ser_id(), json);
        Self { serializers, default_id: JSON_SERIALIZER_ID }
    }

    /// Adds a serializer; the registry keeps its previous default
    pub fn with_serializer(mut self, serializer: Arc<dyn EventSerializer>) -> Self {
        self.serializers.insert(serializer.ser_id(), serializer);
        self
    }

    /// Makes an already-registered serializer the default for new writes
    pub fn with_default(mut self, ser_id: i32) -> Self {
        self.default_id = ser_id;
        self
    }

    pub fn get(&self, ser_id: i32) -> Option<&Arc<dyn EventSerializer>> {
        self.serializers.get(&ser_id)
    }

    pub fn default_serializer(&self) -> Result<&Arc<dyn EventSerializer>, JournalError> {
        self.serializers
            .get(&self.default_id)
            .ok_or_else(|| JournalError::Serialization(format!("no serializer registered for id {}", self.default_id)))
    }
}

/// Advisory process-wide cache of optional-column presence
///
/// The schema may or may not carry the `meta` and `tags` columns depending on
/// when it was created. Presence is discovered from the first row seen; a
/// cached miss re-probes, so a later schema migration is picked up without a
/// restart.
pub struct ColumnPresence {
    meta_seen: AtomicBool,
    tags_seen: AtomicBool
}

impl ColumnPresence {
    pub fn new() -> Self {
        Self { meta_seen: AtomicBool::new(false), tags_seen: AtomicBool::new(false) }
    }

    pub fn has_meta(&self, row: &Row) -> bool {
        Self::probe(&self.meta_seen, row, "meta")
    }

    pub fn has_tags(&self, row: &Row) -> bool {
        Self::probe(&self.tags_seen, row, "tags")
    }

    fn probe(seen: &AtomicBool, row: &Row, column: &str) -> bool {
        if seen.load(Ordering::Relaxed) {
            return true;
        }
        let present = row.has_column(column);
        if present {
            seen.store(true, Ordering::Relaxed);
        }
        present
    }
}

impl Default for ColumnPresence {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes envelopes into storage rows and decodes stored rows for replay
pub struct SerializerGateway {
    registry: Arc<SerializerRegistry>,
    presence: ColumnPresence
}

impl SerializerGateway {
    pub fn new(registry: Arc<SerializerRegistry>) -> Self {
        Self { registry, presence: ColumnPresence::new() }
    }

    /// Serializes one event into its storage row
    ///
    /// Payload encoding failures propagate and fail the write. Metadata
    /// failures degrade to the sentinel manifest instead.
    pub async fn serialize_event(
        &self,
        event: &EventEnvelope,
        time_uuid: Uuid,
        partition_nr: i64,
        bucket_size: BucketSize
    ) -> Result<SerializedRow, JournalError> {
        let serializer = self.registry.default_serializer()?;
        let payload = serializer.serialize(&event.payload).resolve().await?;

        let meta = match &event.metadata {
            Some(value) => Some(match serializer.serialize(value).resolve().await {
                Ok(encoded) => {
                    SerializedMeta { payload: encoded.bytes, ser_id: encoded.ser_id, ser_manifest: encoded.manifest }
                }
                Err(_) => SerializedMeta {
                    payload: value.to_string().into_bytes(),
                    ser_id: 0,
                    ser_manifest: UNKNOWN_META_MANIFEST.to_string()
                }
            }),
            None => None
        };

        let timestamp = timeuuid::timestamp_of(&time_uuid).unwrap_or_else(Utc::now);

        Ok(SerializedRow {
            persistence_id: event.persistence_id.clone(),
            partition_nr,
            sequence_nr: event.sequence_nr,
            time_uuid,
            time_bucket: bucket::bucket_key(timestamp, bucket_size),
            writer_uuid: event.writer_uuid.clone(),
            event_payload: payload.bytes,
            ser_id: payload.ser_id,
            ser_manifest: payload.manifest,
            event_adapter_manifest: event.manifest.clone(),
            tags: event.tags.clone(),
            meta
        })
    }

    /// Decodes one stored row for replay
    ///
    /// Payload decode failures propagate and fail the replay; metadata decode
    /// failures surface as [`ReplayedMeta::Unknown`].
    pub fn deserialize_row(&self, row: &Row) -> Result<ReplayedEvent, JournalError> {
        let ser_id = row.int("ser_id")?;
        let ser_manifest = row.text("ser_manifest")?;
        let bytes = row.blob("event")?;

        let serializer = self
            .registry
            .get(ser_id)
            .ok_or_else(|| JournalError::Deserialization(format!("no serializer registered for id {}", ser_id)))?;
        let payload = serializer.deserialize(&bytes, &ser_manifest)?;

        let tags = if self.presence.has_tags(row) {
            row.text_set("tags")?.into_iter().collect()
        } else {
            Default::default()
        };

        let metadata = if self.presence.has_meta(row) && row.get("meta").is_some() {
            let meta_bytes = row.blob("meta")?;
            let meta_ser_id = row.int("meta_ser_id")?;
            let meta_manifest = row.text("meta_ser_manifest")?;
            let decoded = self
                .registry
                .get(meta_ser_id)
                .filter(|_| meta_manifest != UNKNOWN_META_MANIFEST)
                .and_then(|s| s.deserialize(&meta_bytes, &meta_manifest).ok());
            Some(match decoded {
                Some(value) => ReplayedMeta::Decoded(value),
                None => ReplayedMeta::Unknown { ser_id: meta_ser_id, ser_manifest: meta_manifest, payload: meta_bytes }
            })
        } else {
            None
        };

        Ok(ReplayedEvent {
            persistence_id: row.text("persistence_id")?,
            sequence_nr: row.bigint("sequence_nr")?,
            writer_uuid: row.text("writer_uuid")?,
            manifest: row.text("event_manifest")?,
            payload,
            tags,
            metadata,
            time_uuid: row.uuid("timestamp")?
        })
    }
}

//! Serializer boundary
//!
//! Encoders may be synchronous or asynchronous; both shapes are normalized to
//! a future at the call site so the journal actor is never blocked.

use futures::future::BoxFuture;

use crate::domain::error::JournalError;

/// The product of encoding one payload
#[derive(Debug, Clone)]
pub struct SerializedPayload {
    pub bytes:    Vec<u8>,
    pub ser_id:   i32,
    pub manifest: String
}

/// Result of an encode call: immediate or deferred
pub enum Serialized {
    Sync(Result<SerializedPayload, JournalError>),
    Async(BoxFuture<'static, Result<SerializedPayload, JournalError>>)
}

impl Serialized {
    /// Normalizes both shapes to an awaited value
    pub async fn resolve(self) -> Result<SerializedPayload, JournalError> {
        match self {
            Serialized::Sync(result) => result,
            Serialized::Async(future) => future.await
        }
    }
}

/// Encodes and decodes opaque event payloads
pub trait EventSerializer: Send + Sync {
    /// Identifier stored alongside every payload this serializer produces
    fn ser_id(&self) -> i32;

    /// Manifest stored alongside every payload this serializer produces
    fn manifest(&self) -> &str;

    fn serialize(&self, payload: &serde_json::Value) -> Serialized;

    fn deserialize(&self, bytes: &[u8], manifest: &str) -> Result<serde_json::Value, JournalError>;
}

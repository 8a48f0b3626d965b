//! # Strata - Durable Event Journal for Wide-Column Stores
//!
//! Strata persists ordered event streams per persistence id into a
//! Cassandra-family store, shards each stream across bounded row-group
//! partitions, supports logical + physical deletion up to a sequence number,
//! and maintains secondary materialized views by tag.
//!
//! The backing store is reached through the [`port::session::Session`] port;
//! the journal itself is an actor owning all per-entity coordination state.

pub mod actor;
pub mod adapter;
pub mod domain;
pub mod port;
pub mod service;

use std::sync::Arc;

use tokio::sync::Notify;

use crate::{
    adapter::serializer::SerializerRegistry,
    domain::timeuuid::{MonotonicTimeUuidGenerator, TimeUuidGenerator},
    port::session::Session,
    service::config::JournalConfig
};

/// Journal context for dependency injection
#[derive(Clone)]
pub struct JournalContext {
    /// Journal configuration
    pub config:         JournalConfig,
    /// Backing-store session (shared process-wide)
    pub session:        Arc<dyn Session>,
    /// Registry of event serializers
    pub serializers:    Arc<SerializerRegistry>,
    /// Generator for time-based event identifiers
    pub uuid_generator: Arc<dyn TimeUuidGenerator>,
    /// Coordinated-shutdown signal, notified on fatal journal errors
    pub shutdown:       Arc<Notify>
}

impl JournalContext {
    /// Creates a context with the default serializer registry and uuid generator
    pub fn init(config: JournalConfig, session: Arc<dyn Session>) -> Self {
        Self {
            config,
            session,
            serializers: Arc::new(SerializerRegistry::json()),
            uuid_generator: Arc::new(MonotonicTimeUuidGenerator::new()),
            shutdown: Arc::new(Notify::new())
        }
    }

    /// Replaces the serializer registry
    pub fn with_serializers(mut self, serializers: Arc<SerializerRegistry>) -> Self {
        self.serializers = serializers;
        self
    }

    /// Replaces the time-uuid generator
    pub fn with_uuid_generator(mut self, uuid_generator: Arc<dyn TimeUuidGenerator>) -> Self {
        self.uuid_generator = uuid_generator;
        self
    }
}

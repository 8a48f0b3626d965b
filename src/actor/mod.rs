//! Actor-based journal core
//!
//! The journal controller and the tag writer are Ractor actors: all per-entity
//! coordination state lives in actor state and is mutated only from message
//! handlers, while storage work runs in spawned tasks that report back via
//! self-messages.

pub mod journal;
pub mod message;
pub mod tag_writer;

pub use journal::*;
pub use message::*;
pub use tag_writer::*;

//! Typed messages for actor communication

use std::collections::HashMap;

use ractor::{Message, RpcReplyPort};
use tokio::sync::mpsc;

use crate::domain::{
    error::JournalError,
    event::{AtomicWrite, BulkTagWrite, ReplayedEvent, TagProgress}
};

/// Per-batch outcomes of one write call, positionally 1:1 with its input
pub type WriteResults = Vec<Result<(), JournalError>>;

/// Messages for the Journal actor
#[derive(Debug)]
pub enum JournalMessage {
    /// Persist atomic writes for one persistence id
    WriteMessages {
        batches: Vec<AtomicWrite>,
        reply:   RpcReplyPort<Result<WriteResults, JournalError>>
    },
    /// Logically (and best-effort physically) delete up to a sequence nr
    DeleteTo {
        persistence_id: String,
        to_sequence_nr: i64,
        reply:          RpcReplyPort<Result<(), JournalError>>
    },
    /// Probe the highest stored sequence nr
    HighestSequenceNr {
        persistence_id:   String,
        from_sequence_nr: i64,
        reply:            RpcReplyPort<Result<i64, JournalError>>
    },
    /// Stream stored events into the sink
    ReplayMessages {
        persistence_id:   String,
        from_sequence_nr: i64,
        to_sequence_nr:   i64,
        max:              u64,
        sink:             mpsc::Sender<ReplayedEvent>,
        reply:            RpcReplyPort<Result<(), JournalError>>
    },
    /// A write pipeline settled; resolves the queue head and starts the next
    WriteFinished {
        persistence_id: String,
        outcome:        Result<WriteResults, JournalError>
    },
    /// A delete pipeline settled; resolves the queue head and starts the next
    DeleteFinished {
        persistence_id: String,
        outcome:        Result<(), JournalError>
    }
}

/// Messages for the TagWriter actor
#[derive(Debug)]
pub enum TagWriterMessage {
    /// One batch's per-tag writes, delivered in write order
    BulkWrite(BulkTagWrite),
    /// Seeds tag watermarks when a persistent actor recovers with no replay
    PersistentActorStarting {
        persistence_id: String,
        progress:       HashMap<String, TagProgress>
    },
    /// Barrier: replies once every previously received message is processed
    Flush { reply: RpcReplyPort<()> }
}

impl Message for JournalMessage {}
impl Message for TagWriterMessage {}

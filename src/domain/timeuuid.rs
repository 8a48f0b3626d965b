//! Time-based event identifiers
//!
//! Every stored event row carries a version-1 UUID whose timestamp orders the
//! tag view. The generator is pluggable so hosts can substitute a clock of
//! their own; the default guarantees strictly increasing timestamps within a
//! process even when the wall clock stalls or steps backwards.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::{Timestamp, Uuid};

/// 100-ns intervals between the gregorian epoch (1582-10-15) and the unix epoch
const GREGORIAN_OFFSET_100NS: u64 = 0x01B2_1DD2_1381_4000;

/// Source of time-based UUIDs for event rows
pub trait TimeUuidGenerator: Send + Sync {
    /// Mints the next identifier; successive calls must never go backwards
    fn next_uuid(&self) -> Uuid;
}

/// Default generator: wall clock with a monotonic tick guard
pub struct MonotonicTimeUuidGenerator {
    node_id:    [u8; 6],
    clock_seq:  u16,
    last_ticks: Mutex<u64>
}

impl MonotonicTimeUuidGenerator {
    pub fn new() -> Self {
        // random node identity with the multicast bit set, so it can never
        // collide with a real hardware address
        let seed = Uuid::new_v4();
        let bytes = seed.as_bytes();
        let mut node_id = [0u8; 6];
        node_id.copy_from_slice(&bytes[10..16]);
        node_id[0] |= 0x01;
        let clock_seq = u16::from_be_bytes([bytes[8], bytes[9]]) & 0x3fff;

        Self { node_id, clock_seq, last_ticks: Mutex::new(0) }
    }

    fn next_ticks(&self) -> u64 {
        let now = Utc::now();
        let unix_100ns = now.timestamp() as u64 * 10_000_000 + u64::from(now.timestamp_subsec_nanos()) / 100;
        let candidate = unix_100ns + GREGORIAN_OFFSET_100NS;

        let mut last = self.last_ticks.lock().expect("timeuuid clock poisoned");
        let ticks = if candidate > *last { candidate } else { *last + 1 };
        *last = ticks;
        ticks
    }
}

impl Default for MonotonicTimeUuidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeUuidGenerator for MonotonicTimeUuidGenerator {
    fn next_uuid(&self) -> Uuid {
        let ticks = self.next_ticks();
        Uuid::new_v1(Timestamp::from_rfc4122(ticks, self.clock_seq), &self.node_id)
    }
}

/// Raw 100-ns gregorian ticks of a time-based UUID
pub fn ticks_of(uuid: &Uuid) -> Option<u64> {
    uuid.get_timestamp().map(|ts| ts.to_rfc4122().0)
}

/// Wall-clock timestamp encoded in a time-based UUID
pub fn timestamp_of(uuid: &Uuid) -> Option<DateTime<Utc>> {
    uuid.get_timestamp().and_then(|ts| {
        let (secs, nanos) = ts.to_unix();
        DateTime::from_timestamp(secs as i64, nanos)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuids_are_version_1() {
        let generator = MonotonicTimeUuidGenerator::new();
        assert_eq!(generator.next_uuid().get_version_num(), 1);
    }

    #[test]
    fn test_ticks_strictly_increase() {
        let generator = MonotonicTimeUuidGenerator::new();
        let mut previous = 0u64;
        for _ in 0..1000 {
            let ticks = ticks_of(&generator.next_uuid()).unwrap();
            assert!(ticks > previous, "ticks must strictly increase");
            previous = ticks;
        }
    }

    #[test]
    fn test_timestamp_is_close_to_now() {
        let generator = MonotonicTimeUuidGenerator::new();
        let stamped = timestamp_of(&generator.next_uuid()).unwrap();
        let drift = (Utc::now() - stamped).num_seconds().abs();
        assert!(drift < 5, "uuid timestamp drifted {drift}s from the wall clock");
    }
}

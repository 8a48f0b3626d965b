//! Time buckets - coarse time windows used by the tag view for pagination

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Width of one tag-view time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BucketSize {
    #[serde(rename = "day")]
    Day,
    #[serde(rename = "hour")]
    Hour,
    #[serde(rename = "minute")]
    Minute
}

/// Bucket key for a timestamp, sortable lexicographically within one size
pub fn bucket_key(time: DateTime<Utc>, size: BucketSize) -> String {
    match size {
        BucketSize::Day => time.format("%Y%m%d").to_string(),
        BucketSize::Hour => time.format("%Y%m%dT%H").to_string(),
        BucketSize::Minute => time.format("%Y%m%dT%H%M").to_string()
    }
}

//! Partition arithmetic for sharding an event stream across row-groups

/// Partition number holding a given sequence number
pub fn partition_of(sequence_nr: i64, partition_size: i64) -> i64 {
    (sequence_nr - 1) / partition_size
}

/// First sequence number of a partition
pub fn min_sequence_nr(partition_nr: i64, partition_size: i64) -> i64 {
    partition_nr * partition_size + 1
}

/// Bounds of one partition's stored rows, derived during physical delete scans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionInfo {
    pub partition_nr:    i64,
    pub min_sequence_nr: i64,
    pub max_sequence_nr: i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_of() {
        assert_eq!(partition_of(1, 5), 0);
        assert_eq!(partition_of(5, 5), 0);
        assert_eq!(partition_of(6, 5), 1);
        assert_eq!(partition_of(10, 5), 1);
        assert_eq!(partition_of(11, 5), 2);
    }

    #[test]
    fn test_min_sequence_nr() {
        assert_eq!(min_sequence_nr(0, 5), 1);
        assert_eq!(min_sequence_nr(1, 5), 6);
        assert_eq!(min_sequence_nr(2, 500), 1001);
    }

    #[test]
    fn test_mapping_is_consistent() {
        // min_sequence_nr(partition_of(s)) <= s < min_sequence_nr(partition_of(s) + 1)
        for size in [1_i64, 5, 500] {
            for s in 1..=50_i64 {
                let p = partition_of(s, size);
                assert!(min_sequence_nr(p, size) <= s);
                assert!(s < min_sequence_nr(p + 1, size));
            }
        }
    }
}

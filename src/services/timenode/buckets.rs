// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::infrastructure::chain::{BlockInfo, BucketId, BucketKind, calc_bucket};
use std::collections::BTreeSet;

/// A watched bucket. Block and timestamp bucket 0 share an id, so the kind is
/// part of the key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bucket {
    pub kind: BucketKind,
    pub id: BucketId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketPair {
    pub block_bucket: BucketId,
    pub timestamp_bucket: BucketId,
}

impl BucketPair {
    /// Buckets `steps` widths past `block`.
    pub fn ahead(block: &BlockInfo, steps: u64) -> Self {
        let block_value = block
            .number
            .saturating_add(BucketKind::Block.width().saturating_mul(steps));
        let ts_value = block
            .timestamp
            .saturating_add(BucketKind::Timestamp.width().saturating_mul(steps));
        Self {
            block_bucket: calc_bucket(block_value, BucketKind::Block),
            timestamp_bucket: calc_bucket(ts_value, BucketKind::Timestamp),
        }
    }
}

/// Rolling window of buckets the scanner keeps watched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Buckets {
    pub current: BucketPair,
    pub next: BucketPair,
    pub after_next: BucketPair,
}

impl Buckets {
    pub fn from_block(block: &BlockInfo) -> Self {
        Self {
            current: BucketPair::ahead(block, 0),
            next: BucketPair::ahead(block, 1),
            after_next: BucketPair::ahead(block, 2),
        }
    }

    pub fn all(&self) -> BTreeSet<Bucket> {
        [self.current, self.next, self.after_next]
            .into_iter()
            .flat_map(|p| {
                [
                    Bucket {
                        kind: BucketKind::Block,
                        id: p.block_bucket,
                    },
                    Bucket {
                        kind: BucketKind::Timestamp,
                        id: p.timestamp_bucket,
                    },
                ]
            })
            .collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BucketDiff {
    pub start: Vec<Bucket>,
    pub stop: Vec<Bucket>,
}

/// Watches to start and stop to move from `old` to `new`. Buckets in both are
/// left alone.
pub fn diff_buckets(old: &BTreeSet<Bucket>, new: &BTreeSet<Bucket>) -> BucketDiff {
    BucketDiff {
        start: new.difference(old).copied().collect(),
        stop: old.difference(new).copied().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    fn block(number: u64, timestamp: u64) -> BlockInfo {
        BlockInfo {
            number,
            timestamp,
            hash: B256::ZERO,
        }
    }

    #[test]
    fn window_spans_three_buckets_per_kind() {
        let buckets = Buckets::from_block(&block(1_000, 7_250));
        assert_eq!(buckets.current.block_bucket, -960);
        assert_eq!(buckets.next.block_bucket, -1_200);
        assert_eq!(buckets.after_next.block_bucket, -1_440);
        assert_eq!(buckets.current.timestamp_bucket, 7_200);
        assert_eq!(buckets.next.timestamp_bucket, 10_800);
        assert_eq!(buckets.after_next.timestamp_bucket, 14_400);
        assert_eq!(buckets.all().len(), 6);
    }

    #[test]
    fn diff_only_touches_buckets_that_left_or_joined() {
        let old = Buckets::from_block(&block(1_000, 7_250)).all();
        // One block width and one timestamp width later.
        let new = Buckets::from_block(&block(1_240, 10_850)).all();
        let diff = diff_buckets(&old, &new);

        let ids = |v: &[Bucket]| v.iter().map(|b| b.id).collect::<Vec<_>>();
        assert_eq!(ids(&diff.start), vec![-1_680, 18_000]);
        assert_eq!(ids(&diff.stop), vec![-960, 7_200]);
        for kept in old.intersection(&new) {
            assert!(!diff.start.contains(kept) && !diff.stop.contains(kept));
        }
        assert_eq!(diff_buckets(&new, &new), BucketDiff::default());
    }

    #[test]
    fn first_tick_starts_everything() {
        // Both kinds sit in bucket 0 this early in the chain.
        let new = Buckets::from_block(&block(5, 5)).all();
        let diff = diff_buckets(&BTreeSet::new(), &new);
        assert_eq!(diff.start.len(), 6);
        assert!(diff.stop.is_empty());
        assert!(new.contains(&Bucket {
            kind: BucketKind::Block,
            id: 0
        }));
        assert!(new.contains(&Bucket {
            kind: BucketKind::Timestamp,
            id: 0
        }));
    }
}

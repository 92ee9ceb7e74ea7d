//! The Bucket Table: a fixed number of precomputed ring lookups.
//!
//! Bucket `i` covers the ring position `i * step` where `step = domain_max / buckets_number`.
//! Routing a key is then `buckets[hash(key) % buckets_number]`, which avoids a binary search
//! on every request. The price is paid when the topology changes: every bucket is probed again.
use super::lookup::probe;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BucketTable {
    // index of the owning virtual point (in the sorted points sequence) for each bucket.
    // Empty if there are no virtual points
    slots: Vec<usize>,
}

impl BucketTable {
    /// Computes a new table for the given sorted virtual points.
    ///
    /// The table is built from scratch and returned. It's up to the caller to publish it.
    pub fn build(points: &[u32], buckets_number: usize, step: u32) -> Self {
        let mut slots = Vec::with_capacity(buckets_number);
        for i in 0..buckets_number {
            match probe(points, anchor(step, i)) {
                Some(index) => slots.push(index),
                None => return Self::default(),
            }
        }

        Self { slots }
    }

    /// Index of the virtual point owning bucket `bucket`
    pub fn slot(&self, bucket: usize) -> Option<usize> {
        self.slots.get(bucket).copied()
    }

    pub fn slots(&self) -> &[usize] {
        &self.slots
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Ring position covered by bucket `bucket`
pub fn anchor(step: u32, bucket: usize) -> u32 {
    // step * bucket never exceeds domain_max for bucket < buckets_number
    (step as u64 * bucket as u64).min(u32::MAX as u64) as u32
}

/// Which bucket a key hash falls into
pub fn bucket_for(key_hash: u32, buckets_number: usize) -> usize {
    (key_hash as u64 % buckets_number as u64) as usize
}

//! The [`HashRing`]: consistent hashing with virtual points and a bucket lookup table.
//!
//! The goal of consistent hashing is to decide which node owns a given key in a way that
//! adding/removing a node only moves a small fraction of the keys (~1/N).
//! Every node is placed `replicas` times on a ring of u32 points (its virtual points) and
//! the owner of a key is the first virtual point at-or-after the key hash, wrapping around
//! at the end of the ring. For more details on how the owner of a point is found, see [`lookup`].
//!
//! Binary searching the ring on every request is avoided by a [`BucketTable`]: `buckets_number`
//! evenly spaced ring positions are probed every time the topology changes and routing a key
//! is just `buckets[hash(key) % buckets_number]`.
//!
//! # Concurrency
//! Mutations ([`HashRing::add_node`], [`HashRing::remove_node`], [`HashRing::rebuild`]) are serialized
//! by a [`Mutex`] guarding a private working [`RingIndex`]. Every mutation builds a brand new
//! [`RingSnapshot`] (index copy + bucket table) and publishes it by swapping an [`Arc`].
//! Readers only hold the [`RwLock`] long enough to clone that [`Arc`], so they always observe
//! either the old or the new snapshot, never a partially rebuilt one.
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::{event, instrument, Level};

use crate::{
    config::RingConfig,
    error::{Error, Result},
    hash::HashFunction,
    node::Node,
};

pub mod buckets;
pub mod index;
pub mod lookup;

use buckets::{bucket_for, BucketTable};
use index::RingIndex;

/// Default number of virtual points per node. This is the default in libmemcached
pub const POINTS_PER_SERVER: usize = 160;
/// Default size of the bucket table
pub const BUCKETS_NUMBER: usize = 1024;

/// An immutable view of the ring at some point in time.
///
/// The bucket table stored here was computed from the index stored here, so every
/// lookup made against a single snapshot is consistent.
#[derive(Debug)]
pub struct RingSnapshot<N> {
    index: RingIndex<N>,
    buckets: BucketTable,
    hash: HashFunction,
    buckets_number: usize,
    step: u32,
}

impl<N> RingSnapshot<N> {
    fn build(index: RingIndex<N>, hash: HashFunction, buckets_number: usize, step: u32) -> Self {
        let buckets = BucketTable::build(index.points(), buckets_number, step);
        Self {
            index,
            buckets,
            hash,
            buckets_number,
            step,
        }
    }

    /// Returns the node owning `key`
    pub fn route(&self, key: &[u8]) -> Option<Arc<N>> {
        self.route_with_index(key).map(|(node, _)| node)
    }

    /// Returns the node owning `key` and the bucket `key` falls into
    pub fn route_with_index(&self, key: &[u8]) -> Option<(Arc<N>, usize)> {
        let bucket = bucket_for(self.hash.hash(key), self.buckets_number);
        let node = self.bucket_owner(bucket)?;
        Some((node, bucket))
    }

    /// Returns the owner of an arbitrary ring point by binary searching the ring.
    /// This is the slow path used to build the bucket table.
    pub fn probe(&self, point: u32) -> Option<Arc<N>> {
        let index = lookup::probe(self.index.points(), point)?;
        self.index.owner(index).cloned()
    }

    /// Returns the node stored in bucket `bucket`
    pub fn bucket_owner(&self, bucket: usize) -> Option<Arc<N>> {
        let index = self.buckets.slot(bucket)?;
        self.index.owner(index).cloned()
    }

    /// Nodes in every bucket, in bucket order. Empty if the ring has no nodes
    pub fn buckets(&self) -> Vec<Arc<N>> {
        self.buckets
            .slots()
            .iter()
            .filter_map(|index| self.index.owner(*index).cloned())
            .collect()
    }

    /// Nodes starting at the virtual point owning `key`'s bucket and walking the ring
    /// forward until its last virtual point (there's no wrap around).
    ///
    /// The same node is yielded multiple times since nodes own multiple virtual points.
    pub fn iter_from_key(self: &Arc<Self>, key: &[u8]) -> NodeIter<N> {
        let bucket = bucket_for(self.hash.hash(key), self.buckets_number);
        let position = self.buckets.slot(bucket).unwrap_or(self.index.points().len());
        NodeIter {
            snapshot: self.clone(),
            start: position,
            position,
        }
    }

    /// All virtual points, sorted in ascending order
    pub fn sorted_points(&self) -> &[u32] {
        self.index.points()
    }

    /// Owner of the virtual point `point`, if `point` is a virtual point of this ring
    pub fn owner_of_point(&self, point: u32) -> Option<Arc<N>> {
        self.index.owner_of_point(point).cloned()
    }

    pub fn nodes(&self) -> &[Arc<N>] {
        self.index.nodes()
    }

    pub fn buckets_number(&self) -> usize {
        self.buckets_number
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// True if the ring has no nodes. Since every node owns at least one virtual point,
    /// this is also when there are no virtual points and every lookup returns `None`.
    pub fn is_empty(&self) -> bool {
        self.index.nodes().is_empty()
    }
}

/// Iterator returned by [`HashRing::iter_from_key`].
///
/// It holds the snapshot that was current when it was created, so mutations made to the ring
/// afterwards are not observed. Cloning it before iterating gives a way to restart the sequence.
#[derive(Debug)]
pub struct NodeIter<N> {
    snapshot: Arc<RingSnapshot<N>>,
    start: usize,
    position: usize,
}

impl<N> NodeIter<N> {
    /// Rewinds the iterator back to the virtual point it started from
    pub fn restart(&mut self) {
        self.position = self.start;
    }
}

impl<N> Clone for NodeIter<N> {
    fn clone(&self) -> Self {
        Self {
            snapshot: self.snapshot.clone(),
            start: self.start,
            position: self.position,
        }
    }
}

impl<N> Iterator for NodeIter<N> {
    type Item = Arc<N>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.snapshot.index.owner(self.position)?.clone();
        self.position += 1;
        Some(node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .snapshot
            .index
            .points()
            .len()
            .saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl<N> ExactSizeIterator for NodeIter<N> {}

/// See the module level docs.
pub struct HashRing<N> {
    replicas: usize,
    buckets_number: usize,
    step: u32,
    hash: HashFunction,
    // the writer's working copy. Holding this lock is what serializes mutations
    writer: Mutex<RingIndex<N>>,
    published: RwLock<Arc<RingSnapshot<N>>>,
}

impl<N: std::fmt::Debug> std::fmt::Debug for HashRing<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.published.try_read() {
            Ok(snapshot) => write!(f, "HashRing: {:?}", snapshot.nodes()),
            Err(_) => write!(f, "Unable to acquire lock for logging at this time..."),
        }
    }
}

impl<N: Node> HashRing<N> {
    /// Constructs a ring with the given nodes and configuration.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `replicas` or `buckets_number` are out of range
    pub fn new(nodes: impl IntoIterator<Item = N>, config: RingConfig) -> Result<Self> {
        let hash = config.hash.into();
        Self::with_hash_fn(nodes, config.replicas, config.buckets_number, hash)
    }

    /// Same as [`HashRing::new`] but with an injected hash function
    pub fn with_hash_fn(
        nodes: impl IntoIterator<Item = N>,
        replicas: usize,
        buckets_number: usize,
        hash: HashFunction,
    ) -> Result<Self> {
        RingConfig::validate(replicas, buckets_number, hash.domain_max())?;
        let step = hash.domain_max() / buckets_number as u32;

        let mut index = RingIndex::default();
        for node in nodes {
            index.add_node(Arc::new(node), replicas, &hash);
        }

        let snapshot = RingSnapshot::build(index.clone(), hash, buckets_number, step);
        event!(
            Level::DEBUG,
            "ring created with {} nodes and {} virtual points",
            snapshot.nodes().len(),
            snapshot.sorted_points().len()
        );

        Ok(Self {
            replicas,
            buckets_number,
            step,
            hash,
            writer: Mutex::new(index),
            published: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Adds a node (and its virtual points) to the ring and rebuilds the bucket table.
    ///
    /// Adding a node whose id is already part of the ring replaces it.
    #[instrument(name = "ring::add_node", level = "info", skip_all, fields(node = %node.id()))]
    pub fn add_node(&self, node: N) -> Result<()> {
        let mut writer = self.acquire_writer()?;
        let collisions = writer.add_node(Arc::new(node), self.replicas, &self.hash);
        if collisions > 0 {
            event!(Level::WARN, "{} virtual points skipped", collisions);
        }
        self.publish(&writer)
    }

    /// Removes the node identified by `node_id` and rebuilds the bucket table.
    /// Removing a node that is not part of the ring is a no-op.
    #[instrument(name = "ring::remove_node", level = "info", skip(self))]
    pub fn remove_node(&self, node_id: &str) -> Result<()> {
        let mut writer = self.acquire_writer()?;
        if !writer.remove_node(node_id, self.replicas, &self.hash) {
            event!(Level::DEBUG, "node not found, nothing to remove");
            return Ok(());
        }
        self.publish(&writer)
    }

    /// Recomputes the bucket table from the current ring and publishes it.
    /// Since the table is a pure function of the ring, this produces the same table when nothing changed.
    #[instrument(name = "ring::rebuild", level = "debug", skip(self))]
    pub fn rebuild(&self) -> Result<()> {
        let writer = self.acquire_writer()?;
        self.publish(&writer)
    }

    /// Returns true if a node identified by `node_id` is part of the ring
    pub fn contains(&self, node_id: &str) -> Result<bool> {
        Ok(self.snapshot()?.nodes().iter().any(|n| n.id() == node_id))
    }
}

impl<N> HashRing<N> {
    /// Returns the snapshot currently published
    pub fn snapshot(&self) -> Result<Arc<RingSnapshot<N>>> {
        match self.published.read() {
            Ok(guard) => Ok(guard.clone()),
            Err(_) => Err(Error::Logic {
                reason: "Unable to acquire read lock for HashRing - poisoned...".to_string(),
            }),
        }
    }

    /// Returns the node owning `key`, or `None` if the ring has no nodes
    pub fn route(&self, key: impl AsRef<[u8]>) -> Result<Option<Arc<N>>> {
        Ok(self.snapshot()?.route(key.as_ref()))
    }

    /// Returns the node owning `key` and the bucket `key` falls into, or `None` if the ring has no nodes
    pub fn route_with_index(&self, key: impl AsRef<[u8]>) -> Result<Option<(Arc<N>, usize)>> {
        Ok(self.snapshot()?.route_with_index(key.as_ref()))
    }

    /// Returns the nodes to try, in order, for `key`. See [`RingSnapshot::iter_from_key`].
    /// The iterator is empty if the ring has no nodes.
    pub fn iter_from_key(&self, key: impl AsRef<[u8]>) -> Result<NodeIter<N>> {
        Ok(self.snapshot()?.iter_from_key(key.as_ref()))
    }

    /// Returns the owner of an arbitrary ring point
    pub fn probe(&self, point: u32) -> Result<Option<Arc<N>>> {
        Ok(self.snapshot()?.probe(point))
    }

    pub fn nodes(&self) -> Result<Vec<Arc<N>>> {
        Ok(self.snapshot()?.nodes().to_vec())
    }

    /// Number of nodes in the ring
    pub fn len(&self) -> Result<usize> {
        Ok(self.snapshot()?.nodes().len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.snapshot()?.is_empty())
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    pub fn buckets_number(&self) -> usize {
        self.buckets_number
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    fn acquire_writer(&self) -> Result<MutexGuard<RingIndex<N>>> {
        match self.writer.lock() {
            Ok(guard) => Ok(guard),
            Err(_) => Err(Error::Logic {
                reason: "Unable to acquire writer lock for HashRing - poisoned...".to_string(),
            }),
        }
    }

    /// Builds a new snapshot out of the writer's index and swaps it in.
    /// Must be called with the writer lock held.
    fn publish(&self, index: &RingIndex<N>) -> Result<()> {
        let snapshot = Arc::new(RingSnapshot::build(
            index.clone(),
            self.hash,
            self.buckets_number,
            self.step,
        ));

        match self.published.write() {
            Ok(mut guard) => {
                *guard = snapshot;
            }
            Err(_) => {
                return Err(Error::Logic {
                    reason: "Unable to acquire write lock for HashRing - poisoned...".to_string(),
                })
            }
        }

        event!(
            Level::DEBUG,
            "published ring with {} nodes and {} virtual points",
            index.nodes().len(),
            index.points().len()
        );
        Ok(())
    }
}

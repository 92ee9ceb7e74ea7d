//! The Ring Index: the sorted sequence of virtual points and who owns each one of them.
//!
//! Each node owns `replicas` virtual points computed as `hash("{id}-{replica}")`.
//! `points` is kept sorted at all times (binary search + insert) and `owners` is kept
//! synchronized with it, ie: `owners[i]` is the node owning `points[i]`.
//!
//! Collisions are resolved as first-writer-wins: if a virtual point is already on the ring,
//! the later insertion is skipped and a warning is logged. Since removal only deletes points
//! owned by the node being removed, a collision can never evict another node's point.
//! Skipped points are remembered, in insertion order, so that when the owner of a point goes away
//! the point is handed to the next node that claimed it. The index of a set of nodes is then the
//! same no matter which nodes were added and removed before.
use std::sync::Arc;

use tracing::{event, Level};

use crate::{
    hash::HashFunction,
    node::{virtual_point_key, Node},
};

#[derive(Debug)]
pub struct RingIndex<N> {
    // nodes in insertion order
    nodes: Vec<Arc<N>>,
    points: Vec<u32>,
    owners: Vec<Arc<N>>,
    // virtual points that lost a collision, in insertion order
    shadowed: Vec<(u32, Arc<N>)>,
}

impl<N> Clone for RingIndex<N> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            points: self.points.clone(),
            owners: self.owners.clone(),
            shadowed: self.shadowed.clone(),
        }
    }
}

impl<N> Default for RingIndex<N> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            points: Vec::new(),
            owners: Vec::new(),
            shadowed: Vec::new(),
        }
    }
}

impl<N: Node> RingIndex<N> {
    /// Adds `node` and all its virtual points.
    ///
    /// If a node with the same id is already present it is replaced: its points are removed first.
    /// Returns how many virtual points were skipped because of collisions.
    pub fn add_node(&mut self, node: Arc<N>, replicas: usize, hash: &HashFunction) -> usize {
        let node_id = node.id();
        if self.remove_node(&node_id, replicas, hash) {
            event!(Level::DEBUG, "replacing node {}", node_id);
        }

        let mut collisions = 0;
        self.points.reserve(replicas);
        self.owners.reserve(replicas);
        for replica in 0..replicas {
            let point = hash.hash(virtual_point_key(&node_id, replica).as_bytes());
            match self.points.binary_search(&point) {
                Ok(index) => {
                    collisions += 1;
                    self.shadowed.push((point, node.clone()));
                    event!(
                        Level::WARN,
                        "virtual point {} of node {} collides with node {}, keeping the first owner",
                        point,
                        node_id,
                        self.owners[index].id()
                    );
                }
                Err(index) => {
                    self.points.insert(index, point);
                    self.owners.insert(index, node.clone());
                }
            }
        }

        self.nodes.push(node);
        collisions
    }

    /// Removes the node identified by `node_id` and the virtual points it owns.
    /// Returns false (and does nothing) if the node is not part of the ring.
    pub fn remove_node(&mut self, node_id: &str, replicas: usize, hash: &HashFunction) -> bool {
        let Some(position) = self.nodes.iter().position(|n| n.id() == node_id) else {
            return false;
        };
        let node = self.nodes.remove(position);
        self.shadowed.retain(|(_, owner)| !Arc::ptr_eq(owner, &node));

        for replica in 0..replicas {
            let point = hash.hash(virtual_point_key(node_id, replica).as_bytes());
            if let Ok(index) = self.points.binary_search(&point) {
                if Arc::ptr_eq(&self.owners[index], &node) {
                    match self.take_shadowed(point) {
                        Some(next_owner) => {
                            event!(
                                Level::DEBUG,
                                "virtual point {} handed over to node {}",
                                point,
                                next_owner.id()
                            );
                            self.owners[index] = next_owner;
                        }
                        None => {
                            self.points.remove(index);
                            self.owners.remove(index);
                        }
                    }
                }
            }
        }

        true
    }

    /// Removes and returns the first node that lost `point` to a collision
    fn take_shadowed(&mut self, point: u32) -> Option<Arc<N>> {
        let position = self.shadowed.iter().position(|(p, _)| *p == point)?;
        Some(self.shadowed.remove(position).1)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.iter().any(|n| n.id() == node_id)
    }
}

impl<N> RingIndex<N> {
    /// All virtual points, sorted in ascending order
    pub fn points(&self) -> &[u32] {
        &self.points
    }

    /// Owner of the virtual point at `index` in [`RingIndex::points`]
    pub fn owner(&self, index: usize) -> Option<&Arc<N>> {
        self.owners.get(index)
    }

    /// Owner of the virtual point `point`, if `point` is on the ring
    pub fn owner_of_point(&self, point: u32) -> Option<&Arc<N>> {
        let index = self.points.binary_search(&point).ok()?;
        self.owners.get(index)
    }

    pub fn nodes(&self) -> &[Arc<N>] {
        &self.nodes
    }

    /// True if there are no virtual points. This is the condition used to answer "no node".
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::RingIndex;
    use crate::{
        hash::{crc32_hash, HashFunction},
        node::virtual_point_key,
        utils::generate_random_nodes,
    };
    use quickcheck::Arbitrary;
    use std::{collections::HashMap, sync::Arc};

    #[derive(Debug, Clone)]
    struct AddNodeTestInput {
        nodes: Vec<String>,
        replicas: usize,
    }

    impl Arbitrary for AddNodeTestInput {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            Self {
                nodes: generate_random_nodes(1..30),
                replicas: usize::arbitrary(g) % 40 + 1,
            }
        }
    }

    /// This test asserts on the following invariants
    /// 1. All nodes provided are properly added when `add_node` is called
    /// 2. `points` contains all virtual points of all nodes and it is sorted
    /// 3. `owners` is synchronized with `points`
    #[quickcheck]
    fn test_add_nodes_randomized(test_input: AddNodeTestInput) {
        let hash = HashFunction::new(crc32_hash);
        let mut index = RingIndex::default();

        let mut point_owner: HashMap<u32, String> = HashMap::new();
        for node in test_input.nodes.iter() {
            for replica in 0..test_input.replicas {
                let point = crc32_hash(virtual_point_key(node, replica).as_bytes());
                point_owner.entry(point).or_insert_with(|| node.clone());
            }
        }

        let mut collisions = 0;
        for node in test_input.nodes.iter() {
            collisions += index.add_node(Arc::new(node.clone()), test_input.replicas, &hash);
        }

        let mut expected_points: Vec<u32> = point_owner.keys().copied().collect();
        expected_points.sort();

        assert_eq!(index.nodes().len(), test_input.nodes.len());
        assert_eq!(index.points(), expected_points.as_slice());
        assert_eq!(
            index.points().len() + collisions,
            test_input.nodes.len() * test_input.replicas
        );
        for (i, point) in index.points().iter().enumerate() {
            assert_eq!(index.owner(i).unwrap().as_str(), point_owner[point]);
        }
    }

    #[quickcheck]
    fn test_remove_all_nodes_randomized(test_input: AddNodeTestInput) {
        let hash = HashFunction::new(crc32_hash);
        let mut index = RingIndex::default();
        for node in test_input.nodes.iter() {
            index.add_node(Arc::new(node.clone()), test_input.replicas, &hash);
        }

        for node in test_input.nodes.iter() {
            assert!(index.remove_node(node, test_input.replicas, &hash));
            assert!(!index.contains(node));
            assert!(index.points().windows(2).all(|w| w[0] < w[1]));
        }

        assert!(index.is_empty());
        assert!(index.nodes().is_empty());
    }

    fn colliding_hash(key: &[u8]) -> u32 {
        // every node places replica 0 at the same point
        match key {
            b"A-0" | b"B-0" => 7,
            b"A-1" => 20,
            b"B-1" => 30,
            _ => 99,
        }
    }

    #[test]
    fn test_collision_first_writer_wins() {
        let hash = HashFunction::with_domain_max(colliding_hash, 63);
        let mut index = RingIndex::default();

        assert_eq!(index.add_node(Arc::new("A"), 2, &hash), 0);
        assert_eq!(index.add_node(Arc::new("B"), 2, &hash), 1);
        assert_eq!(index.points(), &[7, 20, 30]);
        assert_eq!(**index.owner_of_point(7).unwrap(), "A");
        assert_eq!(**index.owner_of_point(30).unwrap(), "B");

        // removing B must not evict A's point
        assert!(index.remove_node("B", 2, &hash));
        assert_eq!(index.points(), &[7, 20]);
        assert_eq!(**index.owner_of_point(7).unwrap(), "A");
    }

    #[test]
    fn test_collision_loser_takes_over_the_point() {
        let hash = HashFunction::with_domain_max(colliding_hash, 63);
        let mut index = RingIndex::default();
        index.add_node(Arc::new("A"), 2, &hash);
        index.add_node(Arc::new("B"), 2, &hash);
        assert!(index.remove_node("A", 2, &hash));

        let mut fresh = RingIndex::default();
        fresh.add_node(Arc::new("B"), 2, &hash);

        assert_eq!(index.points(), fresh.points());
        assert_eq!(index.points(), &[7, 30]);
        assert_eq!(**index.owner_of_point(7).unwrap(), "B");
        assert_eq!(**index.owner_of_point(30).unwrap(), "B");

        // the point is gone once no node claims it anymore
        assert!(index.remove_node("B", 2, &hash));
        assert!(index.is_empty());
    }

    #[test]
    fn test_collision_goes_to_the_earliest_remaining_node() {
        let hash = HashFunction::with_domain_max(colliding_hash, 63);
        let mut index = RingIndex::default();
        index.add_node(Arc::new("C"), 2, &hash);
        index.add_node(Arc::new("A"), 2, &hash);
        index.add_node(Arc::new("B"), 2, &hash);
        // C-0 and C-1 both hash to 99, so C owns 99 and loses nothing to A or B
        assert_eq!(**index.owner_of_point(7).unwrap(), "A");

        // re-adding A moves it after B: B must take over point 7
        index.add_node(Arc::new("A"), 2, &hash);
        assert_eq!(**index.owner_of_point(7).unwrap(), "B");

        assert!(index.remove_node("B", 2, &hash));
        assert_eq!(**index.owner_of_point(7).unwrap(), "A");
        assert_eq!(index.points(), &[7, 20, 99]);
    }

    /// Adding then removing a node must always give back the original index
    #[quickcheck]
    fn test_add_remove_restores_index_randomized(test_input: AddNodeTestInput) {
        // a tiny hash domain so collisions are frequent
        let hash = HashFunction::with_domain_max(|key| crc32_hash(key) % 64, 63);
        let (new_node, nodes) = match test_input.nodes.split_last() {
            Some(split) => split,
            None => return,
        };

        let mut index = RingIndex::default();
        for node in nodes.iter() {
            index.add_node(Arc::new(node.clone()), test_input.replicas, &hash);
        }
        let points = index.points().to_vec();
        let owners: Vec<String> = (0..points.len())
            .map(|i| index.owner(i).unwrap().to_string())
            .collect();

        index.add_node(Arc::new(new_node.clone()), test_input.replicas, &hash);
        index.remove_node(new_node, test_input.replicas, &hash);
        assert_eq!(index.points(), points.as_slice());
        for (i, owner) in owners.iter().enumerate() {
            assert_eq!(index.owner(i).unwrap().as_str(), owner.as_str());
        }

        // and removing the first node gives the same index as never adding it
        if let Some((first, rest)) = nodes.split_first() {
            index.remove_node(first, test_input.replicas, &hash);
            let mut fresh = RingIndex::default();
            for node in rest.iter() {
                fresh.add_node(Arc::new(node.clone()), test_input.replicas, &hash);
            }
            assert_eq!(index.points(), fresh.points());
            for i in 0..fresh.points().len() {
                assert_eq!(index.owner(i).unwrap(), fresh.owner(i).unwrap());
            }
        }
    }

    #[test]
    fn test_re_adding_a_node_replaces_it() {
        let hash = HashFunction::new(crc32_hash);
        let mut index = RingIndex::default();
        index.add_node(Arc::new("A"), 10, &hash);
        index.add_node(Arc::new("B"), 10, &hash);
        let points = index.points().to_vec();

        index.add_node(Arc::new("A"), 10, &hash);
        assert_eq!(index.points(), points.as_slice());
        assert_eq!(index.nodes().len(), 2);
        // replaced nodes go to the end of the node list
        assert_eq!(*index.nodes()[1], "A");
    }

    #[test]
    fn test_remove_unknown_node() {
        let hash = HashFunction::new(crc32_hash);
        let mut index: RingIndex<&'static str> = RingIndex::default();
        assert!(!index.remove_node("A", 10, &hash));

        index.add_node(Arc::new("A"), 10, &hash);
        assert!(!index.remove_node("B", 10, &hash));
        assert_eq!(index.points().len(), 10);
    }
}

//! The [`Node`] trait: the only thing the ring needs to know about the entities it routes to.
use bytes::Bytes;

/// A node is anything with a unique and stable identifier.
///
/// The identifier is used for two things:
///  1. identity - two nodes with the same id are the same node as far as the ring is concerned
///  2. placement - virtual points are computed as `hash("{id}-{replica}")`
///
/// The ring never calls anything else on a node. Connections, health, etc. are up to the caller.
pub trait Node {
    fn id(&self) -> String;
}

impl Node for String {
    fn id(&self) -> String {
        self.clone()
    }
}

impl Node for &'static str {
    fn id(&self) -> String {
        self.to_string()
    }
}

/// Raw byte ids are hex encoded, so every distinct byte string gets a distinct id
/// (even when it isn't valid utf8). Use `String` ids if they should stay human readable.
impl Node for Bytes {
    fn id(&self) -> String {
        hex::encode(self)
    }
}

/// The bytes hashed to place the virtual point `replica` of the node identified by `node_id`
pub(crate) fn virtual_point_key(node_id: &str, replica: usize) -> String {
    format!("{}-{}", node_id, replica)
}

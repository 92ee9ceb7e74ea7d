//! bucketring maps keys to one of a dynamic set of nodes using consistent hashing.
//!
//! See [`ring::HashRing`] for how it works.
pub mod config;
pub mod error;
pub mod hash;
pub mod node;
pub mod ring;

pub use config::{ClusterConfig, RingConfig};
pub use error::{Error, Result};
pub use hash::{HashAlgorithm, HashFunction};
pub use node::Node;
pub use ring::{HashRing, NodeIter, RingSnapshot};

#[cfg(test)]
mod utils;

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

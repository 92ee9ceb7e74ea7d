//! Random inputs shared by the property tests
use rand::{distributions::Alphanumeric, Rng};
use std::ops::Range;

pub fn generate_random_ascii_string(range_size: Range<usize>) -> String {
    let string_size = rand::thread_rng().gen_range(range_size);
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(string_size)
        .map(char::from)
        .collect()
}

/// Random node ids, sorted and without duplicates
pub fn generate_random_nodes(range: Range<usize>) -> Vec<String> {
    let n_nodes = rand::thread_rng().gen_range(range);
    let mut nodes = Vec::with_capacity(n_nodes);
    for _ in 0..n_nodes {
        nodes.push(generate_random_ascii_string(10..20));
    }
    nodes.sort();
    nodes.dedup();
    nodes
}

pub fn generate_random_keys(range: Range<usize>) -> Vec<String> {
    let n_keys = rand::thread_rng().gen_range(range);
    let mut keys = Vec::with_capacity(n_keys);
    for _ in 0..n_keys {
        keys.push(generate_random_ascii_string(1..20));
    }

    keys
}

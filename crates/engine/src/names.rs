// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-friendly cluster id allocation.
//!
//! Ids look like `cluster-brave-falcon-2`. Allocation collides against the
//! caller-supplied set of taken ids (in-memory clusters plus on-disk ledger
//! files); if the word space is exhausted a random hex suffix settles it.

use std::collections::HashSet;
use zs_core::ClusterId;

const ADJECTIVES: [&str; 20] = [
    "brave", "calm", "clever", "eager", "fuzzy", "gentle", "happy", "keen", "lively", "lucky",
    "mellow", "nimble", "proud", "quick", "quiet", "sharp", "sturdy", "sunny", "swift", "witty",
];

const NOUNS: [&str; 20] = [
    "badger", "condor", "dolphin", "falcon", "gecko", "heron", "ibex", "jaguar", "koala",
    "lemur", "marmot", "narwhal", "otter", "panda", "quokka", "raven", "sparrow", "tapir",
    "walrus", "yak",
];

const HEX: [char; 16] =
    ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f'];

/// A pseudo-random index derived from a nanoid draw.
fn random_index(bound: usize) -> usize {
    let draw = nanoid::nanoid!(8);
    let mut acc: usize = 0;
    for b in draw.bytes() {
        acc = acc.wrapping_mul(31).wrapping_add(b as usize);
    }
    acc % bound
}

/// Allocate a cluster id not present in `taken`.
pub fn allocate(taken: &HashSet<String>) -> ClusterId {
    let adjective = ADJECTIVES[random_index(ADJECTIVES.len())];
    let noun = NOUNS[random_index(NOUNS.len())];

    for n in 1..=99u32 {
        let candidate = format!("cluster-{adjective}-{noun}-{n}");
        if !taken.contains(&candidate) {
            return ClusterId::new(candidate);
        }
    }
    // Word space exhausted for this pair: settle with random hex.
    loop {
        let candidate = format!("cluster-{adjective}-{noun}-{}", nanoid::nanoid!(6, &HEX));
        if !taken.contains(&candidate) {
            return ClusterId::new(candidate);
        }
    }
}

#[cfg(test)]
#[path = "names_tests.rs"]
mod tests;

//! Consistent hashing ring over the current set of workers.

use std::collections::{BTreeMap, BTreeSet};

use sha1::{Digest, Sha1};

use crate::types::WorkerId;

pub const DEFAULT_VIRTUAL_NODES: u32 = 10;

/// Hash a string onto the ring: the first 4 bytes of its SHA-1 digest, big-endian.
pub fn ring_hash(key: &str) -> u32 {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Virtual nodes sorted ascending by hash. Rebuilt from scratch on every rehash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashRing {
    vnodes: Vec<(u32, WorkerId)>,
}

impl HashRing {
    /// Build a ring with `virtual_nodes` positions per worker, at `ring_hash("{worker}#{i}")`.
    ///
    /// Workers are placed in sorted order, so the ring only depends on the set of
    /// workers and not on how it was collected. Two virtual nodes that collide
    /// share a position, and the one placed last owns it.
    pub fn build<'a, I>(workers: I, virtual_nodes: u32) -> Self
    where
        I: IntoIterator<Item = &'a WorkerId>,
    {
        let workers: BTreeSet<&WorkerId> = workers.into_iter().collect();
        let mut positions: BTreeMap<u32, WorkerId> = BTreeMap::new();

        for worker in workers {
            for i in 0..virtual_nodes {
                let hash = ring_hash(&format!("{}#{}", worker, i));
                positions.insert(hash, worker.clone());
            }
        }

        Self {
            vnodes: positions.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vnodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vnodes.len()
    }

    pub fn vnodes(&self) -> &[(u32, WorkerId)] {
        &self.vnodes
    }

    /// Distinct workers owning at least one position.
    pub fn workers(&self) -> BTreeSet<&WorkerId> {
        self.vnodes.iter().map(|(_, worker)| worker).collect()
    }

    /// The owner of the first position at or after `hash`, wrapping around to the
    /// smallest position when `hash` is past the end of the ring.
    pub fn owner_of(&self, hash: u32) -> Option<&WorkerId> {
        let idx = self.vnodes.partition_point(|(position, _)| *position < hash);
        self.vnodes
            .get(idx)
            .or_else(|| self.vnodes.first())
            .map(|(_, worker)| worker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workers(names: &[&str]) -> Vec<WorkerId> {
        names.iter().map(|name| WorkerId::from(*name)).collect()
    }

    #[test]
    fn ring_hash_uses_sha1_prefix() {
        // sha1("") = da39a3ee...
        assert_eq!(ring_hash(""), 0xda39a3ee);
        // sha1("abc") = a9993e36...
        assert_eq!(ring_hash("abc"), 0xa9993e36);
    }

    #[test]
    fn empty_worker_set_builds_empty_ring() {
        let ring = HashRing::build(&Vec::<WorkerId>::new(), DEFAULT_VIRTUAL_NODES);
        assert!(ring.is_empty());
        assert_eq!(ring.owner_of(42), None);
    }

    #[test]
    fn ring_has_virtual_nodes_per_worker_sorted() {
        let ring = HashRing::build(&workers(&["a", "b", "c"]), DEFAULT_VIRTUAL_NODES);

        assert_eq!(ring.len(), 30);
        assert!(ring.vnodes().windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(ring.workers().len(), 3);
    }

    #[test]
    fn ring_positions_match_suffixed_hashes() {
        let ring = HashRing::build(&workers(&["worker-0"]), 3);
        let mut expected: Vec<u32> = (0..3)
            .map(|i| ring_hash(&format!("worker-0#{}", i)))
            .collect();
        expected.sort();

        let positions: Vec<u32> = ring.vnodes().iter().map(|(hash, _)| *hash).collect();
        assert_eq!(positions, expected);
    }

    #[test]
    fn ring_does_not_depend_on_input_order() {
        let forward = HashRing::build(&workers(&["a", "b", "c", "d"]), 16);
        let backward = HashRing::build(&workers(&["d", "c", "b", "a"]), 16);
        let duplicated = HashRing::build(&workers(&["b", "a", "d", "c", "a"]), 16);

        assert_eq!(forward, backward);
        assert_eq!(forward, duplicated);
    }

    #[test]
    fn owner_of_picks_first_position_at_or_after_hash() {
        let ring = HashRing::build(&workers(&["a", "b"]), 4);
        let (first_hash, first_owner) = ring.vnodes()[0].clone();
        let (second_hash, second_owner) = ring.vnodes()[1].clone();

        assert_eq!(ring.owner_of(first_hash), Some(&first_owner));
        assert_eq!(ring.owner_of(first_hash + 1), Some(&second_owner));
        assert_eq!(ring.owner_of(second_hash), Some(&second_owner));
        assert_eq!(ring.owner_of(0), Some(&first_owner));
    }

    #[test]
    fn owner_of_wraps_past_the_last_position() {
        let ring = HashRing::build(&workers(&["a", "b"]), 4);
        let (last_hash, _) = ring.vnodes().last().cloned().unwrap();
        let (_, smallest_owner) = ring.vnodes()[0].clone();

        if last_hash < u32::MAX {
            assert_eq!(ring.owner_of(last_hash + 1), Some(&smallest_owner));
            assert_eq!(ring.owner_of(u32::MAX), Some(&smallest_owner));
        }
    }
}

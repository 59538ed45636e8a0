// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Rust types corresponding to the Walrus objects stored on Sui.

use core::{fmt, num::NonZeroU16};

use serde::{Deserialize, Serialize};
use walrus_core::{Epoch, PublicKey, ShardIndex, bft};

pub use walrus_core::SuiObjectId as ObjectID;

pub mod move_structs;

/// The network address of a storage node, an authority such as `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkAddress(pub String);

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A storage node and the shards assigned to it within a committee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageNode {
    /// The name of the storage node.
    pub name: String,
    /// The object ID of the node on chain.
    pub node_id: ObjectID,
    /// The network address of the node.
    pub network_address: NetworkAddress,
    /// The protocol public key of the node.
    pub public_key: PublicKey,
    /// The shards assigned to the node, in increasing order.
    pub shard_ids: Vec<ShardIndex>,
}

/// Errors returned when constructing a [`Committee`] from inconsistent on-chain data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidCommittee {
    /// The shard assignment does not cover every shard exactly once.
    #[error("the shard assignment is not a partition of the shards")]
    InvalidShardAssignment,
    /// The committee has no members.
    #[error("the committee has no members")]
    EmptyCommittee,
}

/// The committee of storage nodes for a single epoch.
///
/// Immutable once materialized; the member order matches the on-chain committee so that node
/// indices are stable across the client and the certification bitmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committee {
    /// The epoch of the committee.
    pub epoch: Epoch,
    members: Vec<StorageNode>,
    n_shards: NonZeroU16,
}

impl Committee {
    /// Creates a new committee after checking that the shard assignment partitions the shards.
    pub fn new(
        epoch: Epoch,
        members: Vec<StorageNode>,
        n_shards: NonZeroU16,
    ) -> Result<Self, InvalidCommittee> {
        if members.is_empty() {
            return Err(InvalidCommittee::EmptyCommittee);
        }
        let mut seen = vec![false; usize::from(n_shards.get())];
        for shard in members.iter().flat_map(|node| &node.shard_ids) {
            match seen.get_mut(usize::from(shard.0)) {
                Some(slot) if !*slot => *slot = true,
                _ => return Err(InvalidCommittee::InvalidShardAssignment),
            }
        }
        if !seen.iter().all(|covered| *covered) {
            return Err(InvalidCommittee::InvalidShardAssignment);
        }
        Ok(Self {
            epoch,
            members,
            n_shards,
        })
    }

    /// The members of the committee, in on-chain order.
    pub fn members(&self) -> &[StorageNode] {
        &self.members
    }

    /// The number of members.
    pub fn n_members(&self) -> usize {
        self.members.len()
    }

    /// The total number of shards.
    pub fn n_shards(&self) -> NonZeroU16 {
        self.n_shards
    }

    /// Checks whether `weight` shards are a quorum (`3w > 2n`).
    pub fn is_quorum(&self, weight: usize) -> bool {
        bft::is_quorum(weight, self.n_shards)
    }

    /// Checks whether `weight` shards are above the validity threshold (`3w > n`).
    pub fn is_above_validity(&self, weight: usize) -> bool {
        bft::is_above_validity(weight, self.n_shards)
    }

    /// The smallest shard weight that is a quorum.
    pub fn min_quorum_weight(&self) -> usize {
        bft::min_quorum_weight(self.n_shards)
    }

    /// Returns the index of the member holding the given shard.
    pub fn member_index_for_shard(&self, shard: ShardIndex) -> Option<usize> {
        self.members
            .iter()
            .position(|node| node.shard_ids.contains(&shard))
    }
}

/// The on-chain epoch state of the staking object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpochState {
    /// Shards are migrating to the new committee; the epoch change is in progress.
    EpochChangeSync(u64),
    /// The epoch change has completed at the contained timestamp.
    EpochChangeDone(u64),
    /// The parameters for the next epoch have been selected.
    NextParamsSelected(u64),
}

impl EpochState {
    /// Returns true while shards are still migrating to the current committee.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, EpochState::EpochChangeSync(_))
    }
}

/// The shard assignment of a committee as stored on chain: ordered node IDs with their shards.
pub type CommitteeShardAssignment = Vec<(ObjectID, Vec<ShardIndex>)>;

#[cfg(test)]
mod tests {
    use walrus_core::test_utils;

    use super::*;

    fn node(seed: u64, shard_ids: Vec<u16>) -> StorageNode {
        StorageNode {
            name: format!("node-{seed}"),
            node_id: ObjectID([seed as u8; 32]),
            network_address: NetworkAddress(format!("node-{seed}.walrus.example:9185")),
            public_key: test_utils::protocol_key_pair(seed).public().clone(),
            shard_ids: shard_ids.into_iter().map(ShardIndex).collect(),
        }
    }

    fn n_shards(n: u16) -> NonZeroU16 {
        NonZeroU16::new(n).expect("positive")
    }

    #[test]
    fn committee_accepts_a_partition_and_sums_to_n_shards() {
        let members = vec![node(0, vec![0, 1, 2]), node(1, vec![4, 3]), node(2, vec![5])];
        let committee = Committee::new(7, members, n_shards(6)).expect("valid partition");
        let total: usize = committee
            .members()
            .iter()
            .map(|node| node.shard_ids.len())
            .sum();
        assert_eq!(total, 6);
        assert_eq!(committee.member_index_for_shard(ShardIndex(3)), Some(1));
    }

    #[test]
    fn committee_rejects_missing_and_duplicate_shards() {
        let missing = vec![node(0, vec![0, 1]), node(1, vec![3])];
        assert_eq!(
            Committee::new(1, missing, n_shards(4)).expect_err("shard 2 is missing"),
            InvalidCommittee::InvalidShardAssignment
        );

        let duplicate = vec![node(0, vec![0, 1]), node(1, vec![1, 2, 3])];
        assert_eq!(
            Committee::new(1, duplicate, n_shards(4)).expect_err("shard 1 is duplicated"),
            InvalidCommittee::InvalidShardAssignment
        );

        assert_eq!(
            Committee::new(1, vec![], n_shards(4)).expect_err("no members"),
            InvalidCommittee::EmptyCommittee
        );
    }

    #[test]
    fn quorum_and_validity_use_shard_weights() {
        let members = (0..10).map(|i| node(i, vec![i as u16])).collect();
        let committee = Committee::new(3, members, n_shards(10)).expect("valid partition");
        assert!(!committee.is_quorum(6));
        assert!(committee.is_quorum(7));
        assert!(!committee.is_above_validity(3));
        assert!(committee.is_above_validity(4));
    }
}

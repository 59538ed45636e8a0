// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! The client's view of the committees relevant for reading and writing.

use std::{num::NonZeroU16, sync::Arc};

use walrus_core::Epoch;
use walrus_sui::{
    client::CommitteesAndState,
    types::Committee,
};

/// The committees of the current and (if relevant) previous epoch.
///
/// Immutable once materialized; epoch changes produce a fresh value through the client's
/// committee cache.
#[derive(Debug, Clone)]
pub struct ActiveCommittees {
    current: Arc<Committee>,
    previous: Option<Arc<Committee>>,
    /// Whether shards are still migrating to the current committee.
    is_transitioning: bool,
}

impl ActiveCommittees {
    /// Creates a new view from the committees read from chain.
    pub fn new(committees_and_state: CommitteesAndState) -> Self {
        let CommitteesAndState {
            current,
            previous,
            epoch_state,
        } = committees_and_state;
        Self {
            current: Arc::new(current),
            previous: previous.map(Arc::new),
            is_transitioning: epoch_state.is_transitioning(),
        }
    }

    /// The current epoch.
    pub fn epoch(&self) -> Epoch {
        self.current.epoch
    }

    /// The total number of shards.
    pub fn n_shards(&self) -> NonZeroU16 {
        self.current.n_shards()
    }

    /// Returns true while shards are still migrating to the current committee.
    pub fn is_transitioning(&self) -> bool {
        self.is_transitioning
    }

    /// The committee to which blobs are written: always the current one.
    pub fn write_committee(&self) -> &Arc<Committee> {
        &self.current
    }

    /// The committee from which a blob certified at `certified_epoch` is read.
    ///
    /// During an epoch change, shards may still be migrating, so blobs certified before the
    /// current epoch are read from the previous committee, which holds the authoritative data.
    /// Returns `None` if the blob was certified *after* the client's current epoch, i.e., the
    /// client's view is stale.
    pub fn read_committee(&self, certified_epoch: Epoch) -> Option<&Arc<Committee>> {
        if certified_epoch > self.epoch() {
            return None;
        }
        if self.is_transitioning && certified_epoch < self.epoch() {
            return Some(self.previous.as_ref().unwrap_or(&self.current));
        }
        Some(&self.current)
    }

    /// Checks whether `weight` shards are a quorum.
    pub fn is_quorum(&self, weight: usize) -> bool {
        self.current.is_quorum(weight)
    }

    /// Checks whether `weight` shards are above the validity threshold.
    pub fn is_above_validity(&self, weight: usize) -> bool {
        self.current.is_above_validity(weight)
    }

    /// The smallest shard weight that is a quorum.
    pub fn min_quorum_weight(&self) -> usize {
        self.current.min_quorum_weight()
    }
}

#[cfg(test)]
mod tests {
    use walrus_core::{ShardIndex, test_utils};
    use walrus_sui::types::{EpochState, NetworkAddress, ObjectID, StorageNode};

    use super::*;

    fn committee(epoch: Epoch) -> Committee {
        let members = (0..4u16)
            .map(|i| StorageNode {
                name: format!("node-{i}"),
                node_id: ObjectID([i as u8; 32]),
                network_address: NetworkAddress(format!("node-{i}.example:9185")),
                public_key: test_utils::protocol_key_pair(u64::from(i)).public().clone(),
                shard_ids: (0..3).map(|s| ShardIndex(i * 3 + s)).collect(),
            })
            .collect();
        Committee::new(epoch, members, NonZeroU16::new(12).expect("positive"))
            .expect("valid committee")
    }

    fn committees(epoch: Epoch, epoch_state: EpochState) -> ActiveCommittees {
        ActiveCommittees::new(CommitteesAndState {
            current: committee(epoch),
            previous: Some(committee(epoch - 1)),
            epoch_state,
        })
    }

    #[test]
    fn reads_use_the_current_committee_outside_epoch_changes() {
        let committees = committees(5, EpochState::EpochChangeDone(0));
        assert_eq!(
            committees.read_committee(4).map(|c| c.epoch),
            Some(5),
        );
        assert_eq!(committees.read_committee(5).map(|c| c.epoch), Some(5));
    }

    #[test]
    fn reads_of_older_blobs_use_the_previous_committee_during_sync() {
        let committees = committees(5, EpochState::EpochChangeSync(0));
        // Certified before the current epoch: the previous committee holds the data.
        assert_eq!(committees.read_committee(4).map(|c| c.epoch), Some(4));
        assert_eq!(committees.read_committee(2).map(|c| c.epoch), Some(4));
        // Certified in the current epoch: the current committee must already hold it.
        assert_eq!(committees.read_committee(5).map(|c| c.epoch), Some(5));
    }

    #[test]
    fn reads_of_future_blobs_report_a_stale_view() {
        let committees = committees(5, EpochState::EpochChangeDone(0));
        assert!(committees.read_committee(6).is_none());
    }

    #[test]
    fn writes_always_use_the_current_committee() {
        let committees = committees(5, EpochState::EpochChangeSync(0));
        assert_eq!(committees.write_committee().epoch, 5);
    }
}

// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Types of the storage-node HTTP API.

use core::cmp::Ordering;

use serde::{Deserialize, Serialize};
use walrus_core::Epoch;

/// Whether an object (metadata or sliver) is already stored on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoredOnNodeStatus {
    /// The object is not stored on the node.
    Nonexistent,
    /// The object is stored on the node.
    Stored,
}

/// The status of a blob as reported by a storage node.
///
/// The ordering follows the blob lifecycle: a later lifecycle state compares greater than any
/// earlier one, and `Invalid` is terminal and outranks everything. Within a lifecycle state
/// every field participates in the tiebreak, so the order is total and consistent with
/// equality: two statuses compare as equal iff they are identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlobStatus {
    /// The node has no knowledge of the blob.
    Nonexistent,
    /// The blob exists only as one or more deletable blob objects.
    Deletable {
        /// The total number of deletable blob objects for this blob ID.
        count_deletable_total: u32,
        /// The number of certified deletable blob objects.
        count_deletable_certified: u32,
    },
    /// The blob is registered or certified as a permanent blob.
    Permanent {
        /// The latest epoch at which the blob expires.
        end_epoch: Epoch,
        /// Whether the blob is certified (else it is only registered).
        is_certified: bool,
        /// The epoch at which the blob was first certified, if any.
        initial_certified_epoch: Option<Epoch>,
    },
    /// The blob has been proven invalid.
    Invalid,
}

impl BlobStatus {
    /// Returns the epoch at which the blob was initially certified, if known.
    pub fn initial_certified_epoch(&self) -> Option<Epoch> {
        match self {
            BlobStatus::Permanent {
                initial_certified_epoch,
                ..
            } => *initial_certified_epoch,
            _ => None,
        }
    }

    /// Returns true if this status refers to an existing (registered, certified, or invalid)
    /// blob.
    pub fn is_existent(&self) -> bool {
        !matches!(self, BlobStatus::Nonexistent)
    }

    fn lifecycle_rank(&self) -> u8 {
        match self {
            BlobStatus::Nonexistent => 0,
            BlobStatus::Deletable { .. } => 1,
            BlobStatus::Permanent { .. } => 2,
            BlobStatus::Invalid => 3,
        }
    }
}

impl PartialOrd for BlobStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BlobStatus {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lifecycle_rank()
            .cmp(&other.lifecycle_rank())
            .then_with(|| match (self, other) {
                (
                    BlobStatus::Deletable {
                        count_deletable_total,
                        count_deletable_certified,
                    },
                    BlobStatus::Deletable {
                        count_deletable_total: other_total,
                        count_deletable_certified: other_certified,
                    },
                ) => (count_deletable_certified, count_deletable_total)
                    .cmp(&(other_certified, other_total)),
                (
                    BlobStatus::Permanent {
                        end_epoch,
                        is_certified,
                        initial_certified_epoch,
                    },
                    BlobStatus::Permanent {
                        end_epoch: other_end,
                        is_certified: other_certified,
                        initial_certified_epoch: other_initial,
                    },
                ) => (is_certified, end_epoch, initial_certified_epoch).cmp(&(
                    other_certified,
                    other_end,
                    other_initial,
                )),
                _ => Ordering::Equal,
            })
    }
}

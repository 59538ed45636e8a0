// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Move structs of the Walrus contracts, deserialized from their BCS object contents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use walrus_core::{BlobId, Epoch, EncodingType, merkle::Node};

use super::{CommitteeShardAssignment, EpochState, NetworkAddress, ObjectID};

/// Sui object for storage resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageResource {
    /// The object ID of the resource.
    pub id: ObjectID,
    /// The start epoch of the resource (inclusive).
    pub start_epoch: Epoch,
    /// The end epoch of the resource (exclusive).
    pub end_epoch: Epoch,
    /// The total amount of reserved storage in bytes.
    pub storage_size: u64,
}

/// Sui object for a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    /// The object ID of the blob.
    pub id: ObjectID,
    /// The epoch in which the blob has been registered.
    pub registered_epoch: Epoch,
    /// The blob ID.
    pub blob_id: BlobId,
    /// The unencoded size of the blob in bytes.
    pub size: u64,
    /// The encoding the blob was registered with.
    pub encoding_type: EncodingType,
    /// The epoch in which the blob was first certified, or `None` if it is uncertified.
    pub certified_epoch: Option<Epoch>,
    /// The [`StorageResource`] backing the blob.
    pub storage: StorageResource,
    /// Whether the blob is deletable.
    pub deletable: bool,
}

/// The key-value attributes attached to a blob object as the `"metadata"` dynamic field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobAttribute(pub BTreeMap<String, String>);

impl BlobAttribute {
    /// Returns the value for the provided key, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns an iterator over the key-value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for BlobAttribute {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// The parameters with which a blob is registered on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRegistrationParams {
    /// The blob ID.
    pub blob_id: BlobId,
    /// The root hash of the blob metadata.
    pub root_hash: Node,
    /// The unencoded size of the blob in bytes.
    pub unencoded_size: u64,
    /// The encoding type of the blob.
    pub encoding_type: EncodingType,
    /// Whether the blob is deletable.
    pub deletable: bool,
}

/// The inner system object of Walrus, exposing the storage parameters and prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStateInner {
    /// The current epoch.
    pub epoch: Epoch,
    /// The total number of shards.
    pub n_shards: u16,
    /// The price per unit size of storage, in FROST per epoch.
    pub storage_price_per_unit_size: u64,
    /// The additional price for writing a unit of storage, in FROST.
    pub write_price_per_unit_size: u64,
}

/// The inner staking object of Walrus, exposing the committees and the epoch state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingInner {
    /// The current epoch.
    pub epoch: Epoch,
    /// The state of the current epoch.
    pub epoch_state: EpochState,
    /// The shard assignment of the current committee.
    pub committee: CommitteeShardAssignment,
    /// The shard assignment of the previous committee; empty before the first epoch change.
    pub previous_committee: CommitteeShardAssignment,
}

/// The public node information stored in a staking pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// The name of the storage node.
    pub name: String,
    /// The network address of the storage node.
    pub network_address: NetworkAddress,
    /// The protocol public key of the storage node.
    pub public_key: walrus_core::PublicKey,
}

/// The staking pool of a single storage node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingPool {
    /// The object ID of the pool, which is also the node ID.
    pub id: ObjectID,
    /// The public information of the node.
    pub node_info: NodeInfo,
}

// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

// Allowing `unwrap`s in test utils.
#![allow(clippy::unwrap_used)]

//! An in-memory Sui network serving Walrus objects and interpreting the contract calls.
//!
//! Used by tests as the [`SuiObjectProvider`] backing the read and contract clients; the
//! transaction interpreter mirrors the Move contracts closely enough to exercise the full
//! register → certify lifecycle, including aggregate-signature verification.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use fastcrypto::{
    bls12381::min_pk::BLS12381AggregateSignature,
    traits::{AggregateAuthenticator as _, ToFromBytes as _},
};
use walrus_core::{
    BlobId, Epoch, EpochCount, PublicKey, ShardIndex,
    messages::Confirmation,
};

use crate::{
    client::{ContractConfig, RawObject, SuiClientError, SuiObjectProvider, TransactionEffects},
    contracts,
    transaction_builder::{Argument, CallArg, MoveCall, Transaction},
    types::{
        CommitteeShardAssignment, EpochState, NetworkAddress, ObjectID,
        move_structs::{
            Blob, BlobAttribute, NodeInfo, StakingInner, StakingPool, StorageResource,
            SystemStateInner,
        },
    },
};

/// The fixed object ID of the mock system object.
pub const SYSTEM_OBJECT_ID: ObjectID = ObjectID([0x0a; 32]);

/// Describes one storage node of a mock committee.
#[derive(Debug, Clone)]
pub struct MockNodeParams {
    /// The name of the node.
    pub name: String,
    /// The network address of the node.
    pub network_address: NetworkAddress,
    /// The protocol public key of the node.
    pub public_key: PublicKey,
    /// The shards assigned to the node.
    pub shard_ids: Vec<ShardIndex>,
}

#[derive(Debug)]
struct NetworkState {
    system: SystemStateInner,
    staking: StakingInner,
    pools: HashMap<ObjectID, StakingPool>,
    blobs: HashMap<ObjectID, Blob>,
    attributes: HashMap<ObjectID, BlobAttribute>,
    next_object_id: u64,
}

/// An in-memory Sui network holding the Walrus objects of a single deployment.
#[derive(Debug)]
pub struct MockSuiNetwork {
    state: Mutex<NetworkState>,
}

impl MockSuiNetwork {
    /// Creates a network with the given committee at the given epoch.
    pub fn new(
        epoch: Epoch,
        n_shards: u16,
        nodes: Vec<MockNodeParams>,
        storage_price_per_unit_size: u64,
        write_price_per_unit_size: u64,
    ) -> Self {
        let mut pools = HashMap::new();
        let mut committee: CommitteeShardAssignment = Vec::new();
        for (index, node) in nodes.into_iter().enumerate() {
            let node_id = ObjectID([index as u8 + 1; 32]);
            committee.push((node_id, node.shard_ids.clone()));
            pools.insert(
                node_id,
                StakingPool {
                    id: node_id,
                    node_info: NodeInfo {
                        name: node.name,
                        network_address: node.network_address,
                        public_key: node.public_key,
                    },
                },
            );
        }

        Self {
            state: Mutex::new(NetworkState {
                system: SystemStateInner {
                    epoch,
                    n_shards,
                    storage_price_per_unit_size,
                    write_price_per_unit_size,
                },
                staking: StakingInner {
                    epoch,
                    epoch_state: EpochState::EpochChangeDone(0),
                    committee,
                    previous_committee: Vec::new(),
                },
                pools,
                blobs: HashMap::new(),
                attributes: HashMap::new(),
                next_object_id: 0x100,
            }),
        }
    }

    /// The contract configuration addressing this mock network.
    pub fn contract_config() -> ContractConfig {
        ContractConfig {
            package_id: ObjectID([0xee; 32]),
            latest_package_id: None,
            wal_package_id: ObjectID([0xef; 32]),
            system_object_id: SYSTEM_OBJECT_ID,
            staking_pool_id: ObjectID([0x0b; 32]),
        }
    }

    /// Advances the network to the next epoch, keeping the same shard assignment and entering
    /// the `EpochChangeSync` state.
    pub fn advance_epoch_with_sync(&self) {
        let mut state = self.state.lock().unwrap();
        state.staking.previous_committee = state.staking.committee.clone();
        state.staking.epoch += 1;
        state.system.epoch += 1;
        state.staking.epoch_state = EpochState::EpochChangeSync(0);
    }

    /// Marks the in-progress epoch change as complete.
    pub fn finish_epoch_change(&self) {
        self.state.lock().unwrap().staking.epoch_state = EpochState::EpochChangeDone(0);
    }

    /// Returns the blob object with the given blob ID, if registered.
    pub fn blob_object_for_blob_id(&self, blob_id: &BlobId) -> Option<Blob> {
        self.state
            .lock()
            .unwrap()
            .blobs
            .values()
            .find(|blob| &blob.blob_id == blob_id)
            .cloned()
    }

    fn fresh_object_id(state: &mut NetworkState) -> ObjectID {
        state.next_object_id += 1;
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&state.next_object_id.to_be_bytes());
        ObjectID(bytes)
    }

    fn committee_public_keys(state: &NetworkState) -> Vec<PublicKey> {
        state
            .staking
            .committee
            .iter()
            .map(|(node_id, _)| state.pools[node_id].node_info.public_key.clone())
            .collect()
    }

    fn execute_call(
        state: &mut NetworkState,
        call: &MoveCall,
        results: &mut Vec<Option<StorageResource>>,
        effects: &mut TransactionEffects,
    ) -> Result<(), SuiClientError> {
        let execution_error =
            |message: &str| SuiClientError::TransactionExecutionError(message.to_owned());

        match call.function {
            contracts::system::RESERVE_SPACE => {
                let encoded_size: u64 = decode_pure(&call.arguments[1])?;
                let epochs_ahead: EpochCount = decode_pure(&call.arguments[2])?;
                let resource = StorageResource {
                    id: Self::fresh_object_id(state),
                    start_epoch: state.system.epoch,
                    end_epoch: state.system.epoch + epochs_ahead,
                    storage_size: encoded_size,
                };
                results.push(Some(resource));
            }
            contracts::system::REGISTER_BLOB => {
                let CallArg::Result(Argument(slot)) = call.arguments[1] else {
                    return Err(execution_error("register_blob requires a storage resource"));
                };
                let storage = results
                    .get(usize::from(slot))
                    .cloned()
                    .flatten()
                    .ok_or_else(|| execution_error("unknown storage resource"))?;
                let blob_id: BlobId = decode_pure(&call.arguments[2])?;
                let unencoded_size: u64 = decode_pure(&call.arguments[4])?;
                let deletable: bool = decode_pure(&call.arguments[6])?;

                let blob = Blob {
                    id: Self::fresh_object_id(state),
                    registered_epoch: state.system.epoch,
                    blob_id,
                    size: unencoded_size,
                    encoding_type: walrus_core::EncodingType::RS2,
                    certified_epoch: None,
                    storage,
                    deletable,
                };
                effects.created.push(RawObject {
                    id: blob.id,
                    type_tag: "0x42::blob::Blob".to_owned(),
                    bcs: bcs::to_bytes(&blob).unwrap(),
                });
                state.blobs.insert(blob.id, blob);
                results.push(None);
            }
            contracts::system::CERTIFY_BLOB => {
                let CallArg::Object(blob_object) = call.arguments[1] else {
                    return Err(execution_error("certify_blob requires a blob object"));
                };
                let signature_bytes: Vec<u8> = decode_pure(&call.arguments[2])?;
                let bitmap: Vec<u8> = decode_pure(&call.arguments[3])?;
                let message: Vec<u8> = decode_pure(&call.arguments[4])?;

                let public_keys = Self::committee_public_keys(state);
                let signers: Vec<PublicKey> = public_keys
                    .iter()
                    .enumerate()
                    .filter(|(index, _)| {
                        bitmap
                            .get(index / 8)
                            .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
                    })
                    .map(|(_, key)| key.clone())
                    .collect();

                let confirmation: Confirmation = bcs::from_bytes(&message)
                    .map_err(|_| execution_error("malformed confirmation message"))?;
                let epoch = state.system.epoch;
                let blob = state
                    .blobs
                    .get_mut(&blob_object)
                    .ok_or_else(|| execution_error("unknown blob object"))?;
                if confirmation.as_ref().epoch() != epoch
                    || confirmation.as_ref().contents().blob_id != blob.blob_id
                {
                    return Err(execution_error("confirmation does not match the blob"));
                }

                let signature = BLS12381AggregateSignature::from_bytes(&signature_bytes)
                    .map_err(|_| execution_error("malformed aggregate signature"))?;
                signature
                    .verify(&signers, &message)
                    .map_err(|_| execution_error("invalid aggregate signature"))?;

                blob.certified_epoch = Some(epoch);
                results.push(None);
            }
            contracts::system::EXTEND_BLOB => {
                let CallArg::Object(blob_object) = call.arguments[1] else {
                    return Err(execution_error("extend_blob requires a blob object"));
                };
                let epochs: u32 = decode_pure(&call.arguments[2])?;
                let blob = state
                    .blobs
                    .get_mut(&blob_object)
                    .ok_or_else(|| execution_error("unknown blob object"))?;
                blob.storage.end_epoch += epochs;
                results.push(None);
            }
            contracts::system::DELETE_BLOB => {
                let CallArg::Object(blob_object) = call.arguments[1] else {
                    return Err(execution_error("delete_blob requires a blob object"));
                };
                state
                    .blobs
                    .remove(&blob_object)
                    .ok_or_else(|| execution_error("unknown blob object"))?;
                state.attributes.remove(&blob_object);
                results.push(None);
            }
            contracts::blob::ADD_METADATA => {
                let CallArg::Object(blob_object) = call.arguments[0] else {
                    return Err(execution_error("add_metadata requires a blob object"));
                };
                state.attributes.entry(blob_object).or_default();
                results.push(None);
            }
            contracts::blob::INSERT_OR_UPDATE_METADATA_PAIR => {
                let CallArg::Object(blob_object) = call.arguments[0] else {
                    return Err(execution_error("metadata calls require a blob object"));
                };
                let key: String = decode_pure(&call.arguments[1])?;
                let value: String = decode_pure(&call.arguments[2])?;
                state
                    .attributes
                    .get_mut(&blob_object)
                    .ok_or_else(|| execution_error("attribute field does not exist"))?
                    .0
                    .insert(key, value);
                results.push(None);
            }
            contracts::blob::REMOVE_METADATA_PAIR => {
                let CallArg::Object(blob_object) = call.arguments[0] else {
                    return Err(execution_error("metadata calls require a blob object"));
                };
                let key: String = decode_pure(&call.arguments[1])?;
                state
                    .attributes
                    .get_mut(&blob_object)
                    .ok_or_else(|| execution_error("attribute field does not exist"))?
                    .0
                    .remove(&key);
                results.push(None);
            }
            contracts::coin::DESTROY_ZERO => {
                results.push(None);
            }
            _ => {
                return Err(execution_error("unknown Move call"));
            }
        }
        Ok(())
    }
}

fn decode_pure<T: serde::de::DeserializeOwned>(argument: &CallArg) -> Result<T, SuiClientError> {
    let CallArg::Pure(bytes) = argument else {
        return Err(SuiClientError::TransactionExecutionError(
            "expected a pure argument".to_owned(),
        ));
    };
    Ok(bcs::from_bytes(bytes)?)
}

#[async_trait]
impl SuiObjectProvider for MockSuiNetwork {
    async fn get_objects(&self, ids: &[ObjectID]) -> Result<Vec<RawObject>, SuiClientError> {
        let state = self.state.lock().unwrap();
        let config = Self::contract_config();
        Ok(ids
            .iter()
            .filter_map(|id| {
                let (type_tag, bcs) = if *id == config.system_object_id {
                    ("0x42::system::System", bcs::to_bytes(&state.system).unwrap())
                } else if *id == config.staking_pool_id {
                    ("0x42::staking::Staking", bcs::to_bytes(&state.staking).unwrap())
                } else if let Some(pool) = state.pools.get(id) {
                    ("0x42::staking_pool::StakingPool", bcs::to_bytes(pool).unwrap())
                } else if let Some(blob) = state.blobs.get(id) {
                    ("0x42::blob::Blob", bcs::to_bytes(blob).unwrap())
                } else {
                    return None;
                };
                Some(RawObject {
                    id: *id,
                    type_tag: type_tag.to_owned(),
                    bcs,
                })
            })
            .collect())
    }

    async fn get_dynamic_field(
        &self,
        parent: ObjectID,
        name: &[u8],
    ) -> Result<Option<Vec<u8>>, SuiClientError> {
        if name != crate::client::BLOB_ATTRIBUTE_FIELD_NAME {
            return Ok(None);
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .attributes
            .get(&parent)
            .map(|attribute| bcs::to_bytes(attribute).unwrap()))
    }

    async fn execute_transaction(
        &self,
        transaction: Transaction,
    ) -> Result<TransactionEffects, SuiClientError> {
        let mut state = self.state.lock().unwrap();
        let mut effects = TransactionEffects::default();
        let mut results = Vec::new();
        for call in transaction.calls() {
            Self::execute_call(&mut state, call, &mut results, &mut effects)?;
        }
        Ok(effects)
    }
}

// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Clients to read Walrus objects from Sui and to call the Walrus contracts.

use std::{num::NonZeroU16, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use walrus_core::{Epoch, EpochCount, messages::ConfirmationCertificate};

use crate::{
    object_loader::ObjectLoader,
    transaction_builder::{Transaction, TransactionThunk, WalrusTransactionBuilder},
    types::{
        Committee, CommitteeShardAssignment, EpochState, InvalidCommittee, ObjectID, StorageNode,
        move_structs::{
            Blob, BlobAttribute, BlobRegistrationParams, StakingInner, StakingPool,
            SystemStateInner,
        },
    },
};

/// The number of bytes per storage unit.
pub const BYTES_PER_UNIT_SIZE: u64 = 1024 * 1024;

/// The name of the dynamic field holding the blob attributes.
pub const BLOB_ATTRIBUTE_FIELD_NAME: &[u8] = b"metadata";

/// Returns the number of storage units required to store `size` encoded bytes.
pub fn storage_units_from_size(size: u64) -> u64 {
    size.div_ceil(BYTES_PER_UNIT_SIZE)
}

/// Error returned by the [`SuiContractClient`] and the [`SuiReadClient`].
#[derive(Debug, thiserror::Error)]
pub enum SuiClientError {
    /// Unexpected internal errors.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
    /// An object could not be found on chain.
    #[error("object {0} does not exist on chain")]
    ObjectDoesNotExist(ObjectID),
    /// A batched object load shared with another caller failed.
    #[error("{0}")]
    BatchLoadFailed(Arc<SuiClientError>),
    /// The object contents could not be decoded.
    #[error("failed to decode the object contents: {0}")]
    Bcs(#[from] bcs::Error),
    /// The on-chain committee data is inconsistent.
    #[error(transparent)]
    InvalidCommittee(#[from] InvalidCommittee),
    /// Error in a transaction execution.
    #[error("transaction execution failed: {0}")]
    TransactionExecutionError(String),
    /// The transaction effects do not contain an expected object.
    #[error("unexpected transaction response: {0}")]
    UnexpectedTransactionResponse(String),
    /// The attribute dynamic field does not exist on the blob object.
    #[error("the attribute does not exist on the blob")]
    AttributeDoesNotExist,
}

/// An object read from chain: its ID, Move type, and BCS-encoded contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawObject {
    /// The object ID.
    pub id: ObjectID,
    /// The full Move type of the object.
    pub type_tag: String,
    /// The BCS-encoded object contents.
    pub bcs: Vec<u8>,
}

impl RawObject {
    /// Deserializes the BCS contents into the corresponding Move struct.
    pub fn to_move_struct<T: DeserializeOwned>(&self) -> Result<T, SuiClientError> {
        Ok(bcs::from_bytes(&self.bcs)?)
    }
}

/// The effects of an executed transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionEffects {
    /// The objects created by the transaction.
    pub created: Vec<RawObject>,
}

impl TransactionEffects {
    /// Returns the single created object whose Move type ends with the provided suffix.
    pub fn created_object<T: DeserializeOwned>(
        &self,
        type_suffix: &str,
    ) -> Result<T, SuiClientError> {
        let mut matching = self
            .created
            .iter()
            .filter(|object| object.type_tag.ends_with(type_suffix));
        let (Some(object), None) = (matching.next(), matching.next()) else {
            return Err(SuiClientError::UnexpectedTransactionResponse(format!(
                "expected exactly one created object of type `{type_suffix}`"
            )));
        };
        object.to_move_struct()
    }
}

/// The narrow chain seam consumed by the Walrus client: batched object reads, dynamic-field
/// reads, and transaction execution (including coin selection and signing).
#[async_trait]
pub trait SuiObjectProvider: std::fmt::Debug + Send + Sync {
    /// Returns the objects with the provided IDs; IDs of nonexistent objects are omitted.
    async fn get_objects(&self, ids: &[ObjectID]) -> Result<Vec<RawObject>, SuiClientError>;

    /// Returns the BCS contents of the dynamic field with the given byte name, if present.
    async fn get_dynamic_field(
        &self,
        parent: ObjectID,
        name: &[u8],
    ) -> Result<Option<Vec<u8>>, SuiClientError>;

    /// Signs and executes the provided transaction, returning its effects.
    async fn execute_transaction(
        &self,
        transaction: Transaction,
    ) -> Result<TransactionEffects, SuiClientError>;
}

/// The contract configuration identifying a Walrus deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    /// The object ID of the original Walrus package.
    pub package_id: ObjectID,
    /// The object ID of the latest Walrus package, if upgraded.
    #[serde(default)]
    pub latest_package_id: Option<ObjectID>,
    /// The object ID of the WAL coin package.
    pub wal_package_id: ObjectID,
    /// The object ID of the shared Walrus system object.
    pub system_object_id: ObjectID,
    /// The object ID of the shared Walrus staking object.
    pub staking_pool_id: ObjectID,
}

/// The committees of the current and previous epoch together with the epoch state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitteesAndState {
    /// The committee of the current epoch.
    pub current: Committee,
    /// The committee of the previous epoch, if any.
    pub previous: Option<Committee>,
    /// The state of the current epoch.
    pub epoch_state: EpochState,
}

/// The persistence of a blob to be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobPersistence {
    /// The blob is stored as a permanent blob.
    Permanent,
    /// The blob is stored as a deletable blob.
    Deletable,
}

impl BlobPersistence {
    /// Returns true if the blob is deletable.
    pub fn is_deletable(&self) -> bool {
        matches!(self, Self::Deletable)
    }
}

/// Read interactions with the Walrus objects on chain.
#[async_trait]
pub trait ReadClient: std::fmt::Debug + Send + Sync {
    /// Returns the inner system object.
    async fn system_state(&self) -> Result<SystemStateInner, SuiClientError>;

    /// Returns the current and previous committees together with the epoch state.
    async fn committees_and_state(&self) -> Result<CommitteesAndState, SuiClientError>;

    /// Returns the storage and write price per unit size.
    async fn storage_and_write_price_per_unit_size(&self) -> Result<(u64, u64), SuiClientError>;

    /// Returns the blob object with the given object ID.
    async fn get_blob_object(&self, blob_object: ObjectID) -> Result<Blob, SuiClientError>;

    /// Returns the attributes attached to the blob object, or `None` if the attribute field
    /// does not exist.
    async fn get_blob_attributes(
        &self,
        blob_object: ObjectID,
    ) -> Result<Option<BlobAttribute>, SuiClientError>;

    /// Drops all cached on-chain state.
    fn reset(&self);
}

/// Client to read Walrus objects from Sui.
#[derive(Debug)]
pub struct SuiReadClient {
    provider: Arc<dyn SuiObjectProvider>,
    contract_config: ContractConfig,
    object_loader: ObjectLoader,
}

impl SuiReadClient {
    /// Creates a new read client over the given provider and contract configuration.
    pub fn new(provider: Arc<dyn SuiObjectProvider>, contract_config: ContractConfig) -> Self {
        let object_loader = ObjectLoader::new(Arc::clone(&provider));
        Self {
            provider,
            contract_config,
            object_loader,
        }
    }

    /// The contract configuration of this client.
    pub fn contract_config(&self) -> &ContractConfig {
        &self.contract_config
    }

    async fn staking_state(&self) -> Result<StakingInner, SuiClientError> {
        self.object_loader
            .load_move_struct(self.contract_config.staking_pool_id)
            .await
    }

    async fn materialize_committee(
        &self,
        epoch: Epoch,
        assignment: &CommitteeShardAssignment,
        n_shards: NonZeroU16,
    ) -> Result<Committee, SuiClientError> {
        let pool_ids: Vec<ObjectID> = assignment.iter().map(|(node_id, _)| *node_id).collect();
        let pools = self.object_loader.load_many(pool_ids).await?;

        let members = pools
            .iter()
            .zip(assignment)
            .map(|(pool, (node_id, shard_ids))| {
                let pool: StakingPool = pool.to_move_struct()?;
                Ok(StorageNode {
                    name: pool.node_info.name,
                    node_id: *node_id,
                    network_address: pool.node_info.network_address,
                    public_key: pool.node_info.public_key,
                    shard_ids: shard_ids.clone(),
                })
            })
            .collect::<Result<Vec<_>, SuiClientError>>()?;

        Ok(Committee::new(epoch, members, n_shards)?)
    }
}

#[async_trait]
impl ReadClient for SuiReadClient {
    async fn system_state(&self) -> Result<SystemStateInner, SuiClientError> {
        self.object_loader
            .load_move_struct(self.contract_config.system_object_id)
            .await
    }

    async fn committees_and_state(&self) -> Result<CommitteesAndState, SuiClientError> {
        let system_state = self.system_state().await?;
        let staking = self.staking_state().await?;
        let n_shards = NonZeroU16::new(system_state.n_shards)
            .ok_or_else(|| anyhow::anyhow!("the system object reports zero shards"))?;

        let current = self
            .materialize_committee(staking.epoch, &staking.committee, n_shards)
            .await?;
        let previous = if staking.previous_committee.is_empty() || staking.epoch == 0 {
            None
        } else {
            Some(
                self.materialize_committee(
                    staking.epoch - 1,
                    &staking.previous_committee,
                    n_shards,
                )
                .await?,
            )
        };

        tracing::debug!(
            epoch = staking.epoch,
            n_members = current.n_members(),
            transitioning = staking.epoch_state.is_transitioning(),
            "materialized committees from chain"
        );
        Ok(CommitteesAndState {
            current,
            previous,
            epoch_state: staking.epoch_state,
        })
    }

    async fn storage_and_write_price_per_unit_size(&self) -> Result<(u64, u64), SuiClientError> {
        let state = self.system_state().await?;
        Ok((
            state.storage_price_per_unit_size,
            state.write_price_per_unit_size,
        ))
    }

    async fn get_blob_object(&self, blob_object: ObjectID) -> Result<Blob, SuiClientError> {
        // Blob objects are mutable, so they bypass the epoch-scoped loader cache.
        let objects = self.provider.get_objects(&[blob_object]).await?;
        objects
            .first()
            .ok_or(SuiClientError::ObjectDoesNotExist(blob_object))?
            .to_move_struct()
    }

    async fn get_blob_attributes(
        &self,
        blob_object: ObjectID,
    ) -> Result<Option<BlobAttribute>, SuiClientError> {
        let field = self
            .provider
            .get_dynamic_field(blob_object, BLOB_ATTRIBUTE_FIELD_NAME)
            .await?;
        field
            .map(|bytes| Ok(bcs::from_bytes(&bytes)?))
            .transpose()
    }

    fn reset(&self) {
        self.object_loader.reset();
    }
}

/// The storage and write cost of storing a blob, in FROST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageCost {
    /// The cost of reserving the storage for the blob's lifetime.
    pub storage_cost: u64,
    /// The one-time cost of writing the blob.
    pub write_cost: u64,
}

impl StorageCost {
    /// The total cost.
    pub fn total(&self) -> u64 {
        self.storage_cost + self.write_cost
    }
}

/// Computes the cost of storing `encoded_length` encoded bytes for `epochs_ahead` epochs.
pub fn price_for_encoded_length(
    encoded_length: u64,
    storage_price_per_unit_size: u64,
    write_price_per_unit_size: u64,
    epochs_ahead: EpochCount,
) -> StorageCost {
    let units = storage_units_from_size(encoded_length);
    StorageCost {
        storage_cost: units * storage_price_per_unit_size * u64::from(epochs_ahead),
        write_cost: units * write_price_per_unit_size,
    }
}

/// Client to call the Walrus contracts on Sui.
#[derive(Debug)]
pub struct SuiContractClient {
    read_client: SuiReadClient,
    transaction_builder: WalrusTransactionBuilder,
}

impl SuiContractClient {
    /// Creates a new contract client over the given provider and contract configuration.
    pub fn new(provider: Arc<dyn SuiObjectProvider>, contract_config: ContractConfig) -> Self {
        let transaction_builder = WalrusTransactionBuilder::new(&contract_config);
        let read_client = SuiReadClient::new(provider, contract_config);
        Self {
            read_client,
            transaction_builder,
        }
    }

    /// The inner read client.
    pub fn read_client(&self) -> &SuiReadClient {
        &self.read_client
    }

    async fn execute(&self, transaction: Transaction) -> Result<TransactionEffects, SuiClientError> {
        self.read_client
            .provider
            .execute_transaction(transaction)
            .await
    }

    fn apply_thunks(thunks: Vec<TransactionThunk>) -> Transaction {
        let mut transaction = Transaction::default();
        for thunk in thunks {
            thunk(&mut transaction);
        }
        transaction
    }

    /// Reserves storage for the encoded blob and registers it, returning the created blob
    /// object.
    ///
    /// This must complete before any sliver is pushed to the storage nodes, as nodes refuse
    /// data for unregistered blob IDs.
    pub async fn reserve_and_register_blob(
        &self,
        encoded_length: u64,
        epochs_ahead: EpochCount,
        params: &BlobRegistrationParams,
    ) -> Result<Blob, SuiClientError> {
        let (storage_price, write_price) = self
            .read_client
            .storage_and_write_price_per_unit_size()
            .await?;
        let cost = price_for_encoded_length(encoded_length, storage_price, write_price, epochs_ahead);
        tracing::debug!(
            blob_id = %params.blob_id,
            encoded_length,
            epochs_ahead,
            total_cost = cost.total(),
            "registering blob on chain"
        );

        let mut transaction = Transaction::default();
        let storage = self.transaction_builder.reserve_space(
            encoded_length,
            epochs_ahead,
            cost.storage_cost,
        )(&mut transaction)
        .expect("reserve_space always produces a result handle");
        self.transaction_builder
            .register_blob(storage, params, cost.write_cost)(&mut transaction);

        self.execute(transaction).await?.created_object("::blob::Blob")
    }

    /// Certifies the registered blob with the aggregated confirmation certificate.
    ///
    /// `n_committee_members` is the size of the committee whose members signed; it determines
    /// the length of the signers bitmap.
    pub async fn certify_blob(
        &self,
        blob_object: ObjectID,
        certificate: &ConfirmationCertificate,
        n_committee_members: usize,
    ) -> Result<(), SuiClientError> {
        let transaction = Self::apply_thunks(vec![self.transaction_builder.certify_blob(
            blob_object,
            certificate,
            n_committee_members,
        )]);
        self.execute(transaction).await?;
        Ok(())
    }

    /// Deletes the given deletable blob object.
    pub async fn delete_blob(&self, blob_object: ObjectID) -> Result<(), SuiClientError> {
        let transaction =
            Self::apply_thunks(vec![self.transaction_builder.delete_blob(blob_object)]);
        self.execute(transaction).await?;
        Ok(())
    }

    /// Extends the blob so that its storage ends at `target_end_epoch`.
    ///
    /// A target at or before the current end epoch is a no-op.
    pub async fn extend_blob(
        &self,
        blob: &Blob,
        target_end_epoch: Epoch,
    ) -> Result<(), SuiClientError> {
        let additional_epochs =
            i64::from(target_end_epoch) - i64::from(blob.storage.end_epoch);
        let (storage_price, _) = self
            .read_client
            .storage_and_write_price_per_unit_size()
            .await?;
        let payment = storage_units_from_size(blob.storage.storage_size)
            * storage_price
            * u64::try_from(additional_epochs.max(0)).expect("non-negative");

        let transaction = Self::apply_thunks(vec![self.transaction_builder.extend_blob(
            blob.id,
            additional_epochs,
            payment,
        )]);
        if transaction.is_empty() {
            tracing::debug!(blob_object = %blob.id, "extension is a no-op; nothing to submit");
            return Ok(());
        }
        self.execute(transaction).await?;
        Ok(())
    }

    /// Inserts or updates an attribute pair on the blob object, creating the attribute field
    /// if it does not exist yet.
    pub async fn insert_or_update_blob_attribute(
        &self,
        blob_object: ObjectID,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), SuiClientError> {
        let mut thunks = Vec::new();
        if self
            .read_client
            .get_blob_attributes(blob_object)
            .await?
            .is_none()
        {
            thunks.push(self.transaction_builder.add_metadata(blob_object));
        }
        thunks.push(self.transaction_builder.insert_or_update_metadata_pair(
            blob_object,
            key.into(),
            value.into(),
        ));
        self.execute(Self::apply_thunks(thunks)).await?;
        Ok(())
    }

    /// Removes an attribute pair from the blob object.
    pub async fn remove_blob_attribute(
        &self,
        blob_object: ObjectID,
        key: impl Into<String>,
    ) -> Result<(), SuiClientError> {
        let key = key.into();
        let attributes = self
            .read_client
            .get_blob_attributes(blob_object)
            .await?
            .ok_or(SuiClientError::AttributeDoesNotExist)?;
        if attributes.get(&key).is_none() {
            return Err(SuiClientError::AttributeDoesNotExist);
        }
        let transaction = Self::apply_thunks(vec![
            self.transaction_builder.remove_metadata_pair(blob_object, key),
        ]);
        self.execute(transaction).await?;
        Ok(())
    }
}

#[async_trait]
impl ReadClient for SuiContractClient {
    async fn system_state(&self) -> Result<SystemStateInner, SuiClientError> {
        self.read_client.system_state().await
    }

    async fn committees_and_state(&self) -> Result<CommitteesAndState, SuiClientError> {
        self.read_client.committees_and_state().await
    }

    async fn storage_and_write_price_per_unit_size(&self) -> Result<(u64, u64), SuiClientError> {
        self.read_client.storage_and_write_price_per_unit_size().await
    }

    async fn get_blob_object(&self, blob_object: ObjectID) -> Result<Blob, SuiClientError> {
        self.read_client.get_blob_object(blob_object).await
    }

    async fn get_blob_attributes(
        &self,
        blob_object: ObjectID,
    ) -> Result<Option<BlobAttribute>, SuiClientError> {
        self.read_client.get_blob_attributes(blob_object).await
    }

    fn reset(&self) {
        self.read_client.reset();
    }
}

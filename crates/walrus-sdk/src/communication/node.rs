// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Communication with a single storage node of a committee.

use std::{future::Future, num::NonZeroU16, sync::Arc};

use fastcrypto::traits::EncodeDecodeBase64 as _;
use futures::{StreamExt, future::Either, stream::FuturesUnordered};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{Level, Span};
use walrus_core::{
    BlobId, Epoch, PublicKey, ShardIndex, SliverPairIndex, SliverType,
    encoding::{EncodingAxis, EncodingConfig, SliverData, SliverPair},
    messages::{BlobPersistenceType, SignedStorageConfirmation},
    metadata::VerifiedBlobMetadataWithId,
};
use walrus_storage_node_client::{
    NodeError, StorageNodeClient,
    api::{BlobStatus, StoredOnNodeStatus},
};
use walrus_sui::types::StorageNode;
use walrus_utils::backoff::{self, ExponentialBackoff};

use crate::{
    config::RequestRateConfig,
    utils::{WeightedResult, string_prefix},
};

/// Represents the index of the node in the vector of members of the committee.
pub type NodeIndex = usize;

/// Represents the result of an interaction with a storage node.
///
/// Contains the epoch, the "weight" of the interaction (e.g., the number of shards for which an
/// operation was performed), the index of the node that issued it, and the result of the
/// operation.
#[derive(Debug, Clone)]
pub struct NodeResult<T, E> {
    /// The epoch of the committee the node belongs to.
    pub committee_epoch: Epoch,
    /// The shard weight of the interaction.
    pub weight: usize,
    /// The committee index of the node.
    pub node: NodeIndex,
    /// The result of the operation.
    pub result: Result<T, E>,
}

impl<T, E> NodeResult<T, E> {
    fn new(committee_epoch: Epoch, weight: usize, node: NodeIndex, result: Result<T, E>) -> Self {
        Self {
            committee_epoch,
            weight,
            node,
            result,
        }
    }
}

impl<T, E> WeightedResult for NodeResult<T, E> {
    type Inner = T;
    type Error = E;

    fn weight(&self) -> usize {
        self.weight
    }

    fn inner_result(&self) -> &Result<Self::Inner, Self::Error> {
        &self.result
    }

    fn take_inner_result(self) -> Result<Self::Inner, Self::Error> {
        self.result
    }
}

/// Error raised while storing metadata and sliver pairs on a node.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The metadata could not be stored.
    #[error("unable to store the metadata on the node: {0}")]
    Metadata(NodeError),
    /// A sliver could not be stored.
    #[error(transparent)]
    SliverStore(#[from] SliverStoreError),
    /// The storage confirmation could not be retrieved or verified.
    #[error("unable to retrieve a valid confirmation from the node: {0}")]
    Confirmation(NodeError),
}

impl StoreError {
    /// Returns true if the underlying failure was an external cancellation.
    pub fn is_user_abort(&self) -> bool {
        match self {
            StoreError::Metadata(error) | StoreError::Confirmation(error) => {
                error.is_user_abort()
            }
            StoreError::SliverStore(inner) => inner.error.is_user_abort(),
        }
    }
}

/// Error raised while storing a single sliver on a node.
#[derive(Debug, thiserror::Error)]
#[error("unable to store sliver {pair_index} ({sliver_type}) on the node: {error}")]
pub struct SliverStoreError {
    /// The index of the sliver pair.
    pub pair_index: SliverPairIndex,
    /// The type of the sliver.
    pub sliver_type: SliverType,
    /// The underlying node error.
    pub error: NodeError,
}

/// Communication with a single storage node of a committee.
///
/// The type parameter `W` carries the write limits; it is `()` for read-only communication.
#[derive(Debug, Clone)]
pub struct NodeCommunication<W = ()> {
    /// The index of the node in the committee.
    pub node_index: NodeIndex,
    /// The epoch of the committee.
    pub committee_epoch: Epoch,
    /// The storage node.
    pub node: StorageNode,
    /// The encoding configuration.
    pub encoding_config: Arc<EncodingConfig>,
    /// The span tying together all interactions with this node.
    pub span: Span,
    /// The HTTP client for the node.
    pub client: StorageNodeClient,
    /// The per-node rate and retry configuration.
    pub config: RequestRateConfig,
    /// The cancellation token of the surrounding operation.
    pub cancel: CancellationToken,
    /// Slivers smaller than this are stored without a prior existence check.
    pub sliver_status_check_threshold: usize,
    /// Global and per-node write limits.
    pub write_limits: W,
}

/// Read-only communication with a storage node.
pub type NodeReadCommunication = NodeCommunication;

/// The semaphores limiting concurrent sliver writes.
#[derive(Debug, Clone)]
pub struct WriteLimits {
    /// The global limit on concurrent sliver uploads across all nodes.
    pub sliver_write_limit: Arc<Semaphore>,
    /// The limit on concurrent connections to this node.
    pub node_write_limit: Arc<Semaphore>,
}

/// Write-capable communication with a storage node.
pub type NodeWriteCommunication = NodeCommunication<WriteLimits>;

impl NodeReadCommunication {
    /// Creates a new [`NodeCommunication`].
    ///
    /// Returns `None` if the `node` has no shards.
    pub fn new(
        node_index: NodeIndex,
        committee_epoch: Epoch,
        client: StorageNodeClient,
        node: StorageNode,
        encoding_config: Arc<EncodingConfig>,
        config: RequestRateConfig,
        cancel: CancellationToken,
        sliver_status_check_threshold: usize,
    ) -> Option<Self> {
        if node.shard_ids.is_empty() {
            tracing::debug!("do not create NodeCommunication for node without shards");
            return None;
        }
        let pk_prefix = string_prefix(&node.public_key.encode_base64());
        Some(Self {
            node_index,
            committee_epoch,
            node,
            encoding_config,
            span: tracing::span!(
                Level::ERROR,
                "node",
                index = node_index,
                committee_epoch,
                pk_prefix = %pk_prefix
            ),
            client,
            config,
            cancel,
            sliver_status_check_threshold,
            write_limits: (),
        })
    }

    /// Converts this into a write-capable communication with the provided limits.
    pub(crate) fn with_write_limits(
        self,
        sliver_write_limit: Arc<Semaphore>,
    ) -> NodeWriteCommunication {
        let node_write_limit =
            Arc::new(Semaphore::new(self.config.max_node_connections));
        let Self {
            node_index,
            committee_epoch,
            node,
            encoding_config,
            span,
            client,
            config,
            cancel,
            sliver_status_check_threshold,
            ..
        } = self;
        NodeWriteCommunication {
            node_index,
            committee_epoch,
            node,
            encoding_config,
            span,
            client,
            config,
            cancel,
            sliver_status_check_threshold,
            write_limits: WriteLimits {
                sliver_write_limit,
                node_write_limit,
            },
        }
    }
}

impl<W> NodeCommunication<W> {
    /// Returns the number of shards in the committee.
    pub fn n_shards(&self) -> NonZeroU16 {
        self.encoding_config.n_shards()
    }

    /// Returns the number of shards owned by the node.
    pub fn n_owned_shards(&self) -> usize {
        self.node.shard_ids.len()
    }

    fn to_node_result<T, E>(&self, weight: usize, result: Result<T, E>) -> NodeResult<T, E> {
        NodeResult::new(self.committee_epoch, weight, self.node_index, result)
    }

    fn to_node_result_with_n_shards<T, E>(&self, result: Result<T, E>) -> NodeResult<T, E> {
        self.to_node_result(self.n_owned_shards(), result)
    }

    /// Races the provided future against the operation's cancellation token.
    async fn with_abort<T>(
        &self,
        future: impl Future<Output = Result<T, NodeError>>,
    ) -> Result<T, NodeError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(NodeError::canceled()),
            result = future => result,
        }
    }

    // Read operations.

    /// Requests the metadata for a blob ID from the node.
    #[tracing::instrument(level = Level::TRACE, parent = &self.span, skip_all)]
    pub async fn retrieve_verified_metadata(
        &self,
        blob_id: &BlobId,
    ) -> NodeResult<VerifiedBlobMetadataWithId, NodeError> {
        tracing::debug!(%blob_id, "retrieving metadata");
        let result = self
            .with_abort(self.client.get_and_verify_metadata(blob_id, &self.encoding_config))
            .await;
        self.to_node_result_with_n_shards(result)
    }

    /// Requests a sliver from the storage node, verifying it against the metadata and encoding
    /// configuration.
    #[tracing::instrument(level = Level::TRACE, parent = &self.span, skip(self, metadata))]
    pub async fn retrieve_verified_sliver<A: EncodingAxis>(
        &self,
        metadata: &VerifiedBlobMetadataWithId,
        shard_index: ShardIndex,
    ) -> NodeResult<SliverData<A>, NodeError> {
        tracing::debug!(
            %shard_index,
            sliver_type = A::NAME,
            "retrieving verified sliver"
        );
        let sliver_pair_index = shard_index.to_pair_index(self.n_shards(), metadata.blob_id());
        let result = self
            .with_abort(self.client.get_and_verify_sliver(
                sliver_pair_index,
                metadata,
                &self.encoding_config,
            ))
            .await;

        // Each sliver is requested individually, so the weight is 1.
        self.to_node_result(1, result)
    }

    /// Requests the status for a blob ID from the node.
    #[tracing::instrument(level = Level::TRACE, parent = &self.span, skip_all)]
    pub async fn get_blob_status(&self, blob_id: &BlobId) -> NodeResult<BlobStatus, NodeError> {
        tracing::debug!(%blob_id, "retrieving blob status");
        let result = self.with_abort(self.client.get_blob_status(blob_id)).await;
        self.to_node_result_with_n_shards(result)
    }

    /// Retrieves a confirmation from the node, retrying with backoff, and verifies it.
    async fn get_confirmation_with_retries_inner(
        &self,
        blob_id: &BlobId,
        epoch: Epoch,
        blob_persistence_type: &BlobPersistenceType,
    ) -> Result<SignedStorageConfirmation, NodeError> {
        let confirmation = self
            .with_abort(backoff::retry(self.backoff_strategy(), || {
                self.client.get_confirmation(blob_id, blob_persistence_type)
            }))
            .await?;

        let _ = confirmation
            .verify(self.public_key(), epoch, *blob_id, *blob_persistence_type)
            .map_err(NodeError::other)?;

        Ok(confirmation)
    }

    /// Requests a verified storage confirmation from the node.
    #[tracing::instrument(level = Level::TRACE, parent = &self.span, skip_all)]
    pub async fn get_confirmation_with_retries(
        &self,
        blob_id: &BlobId,
        epoch: Epoch,
        blob_persistence_type: &BlobPersistenceType,
    ) -> NodeResult<SignedStorageConfirmation, NodeError> {
        tracing::debug!("retrieving confirmation");
        let result = self
            .get_confirmation_with_retries_inner(blob_id, epoch, blob_persistence_type)
            .await;
        self.to_node_result_with_n_shards(result)
    }

    /// Gets the backoff strategy for the node, seeded by the node index so that concurrent
    /// per-node retries are not synchronized.
    fn backoff_strategy(&self) -> ExponentialBackoff {
        self.config
            .backoff_config
            .get_strategy(self.node_index as u64)
    }

    fn public_key(&self) -> &PublicKey {
        &self.node.public_key
    }
}

impl NodeWriteCommunication {
    /// Stores metadata and sliver pairs on a node, and requests a storage confirmation.
    ///
    /// Returns a [`NodeResult`], where the weight is the number of shards for which the
    /// storage confirmation was issued.
    #[tracing::instrument(level = Level::TRACE, parent = &self.span, skip_all)]
    pub async fn store_metadata_and_pairs(
        &self,
        metadata: &VerifiedBlobMetadataWithId,
        pairs: impl IntoIterator<Item = &SliverPair>,
        blob_persistence_type: &BlobPersistenceType,
    ) -> NodeResult<SignedStorageConfirmation, StoreError> {
        let result = async {
            let metadata_status = self
                .store_metadata_with_retries(metadata)
                .await
                .map_err(StoreError::Metadata)?;

            let n_stored = self
                .store_pairs(metadata.blob_id(), &metadata_status, pairs)
                .await?;
            tracing::debug!(
                n_stored,
                blob_id = %metadata.blob_id(),
                "finished storing metadata and slivers on the node"
            );

            self.get_confirmation_with_retries_inner(
                metadata.blob_id(),
                self.committee_epoch,
                blob_persistence_type,
            )
            .await
            .map_err(StoreError::Confirmation)
        }
        .await;
        tracing::debug!(
            blob_id = %metadata.blob_id(),
            success = result.is_ok(),
            "storing metadata and sliver pairs finished"
        );
        self.to_node_result_with_n_shards(result)
    }

    /// Stores the metadata on the storage node, unless it is already stored.
    ///
    /// Returns the [`StoredOnNodeStatus`] of the metadata before the call.
    async fn store_metadata_with_retries(
        &self,
        metadata: &VerifiedBlobMetadataWithId,
    ) -> Result<StoredOnNodeStatus, NodeError> {
        let metadata_status = self
            .retry_with_limits_and_backoff(|| {
                self.client.get_metadata_status(metadata.blob_id())
            })
            .await?;

        match metadata_status {
            StoredOnNodeStatus::Stored => {
                tracing::debug!("the metadata is already stored on the node");
            }
            StoredOnNodeStatus::Nonexistent => {
                self.retry_with_limits_and_backoff(|| self.client.store_metadata(metadata))
                    .await?;
            }
        }
        Ok(metadata_status)
    }

    /// Stores the sliver pairs on the node.
    ///
    /// If `metadata_status` indicates that the metadata was already present, each sliver's
    /// existence is checked before uploading it (unless it is small enough that the check is
    /// not worthwhile).
    ///
    /// Returns the number of slivers stored (twice the number of pairs).
    async fn store_pairs(
        &self,
        blob_id: &BlobId,
        metadata_status: &StoredOnNodeStatus,
        pairs: impl IntoIterator<Item = &SliverPair>,
    ) -> Result<usize, SliverStoreError> {
        let mut requests = pairs
            .into_iter()
            .flat_map(|pair| {
                [
                    Either::Left(self.check_and_store_sliver(
                        blob_id,
                        metadata_status,
                        &pair.primary,
                        pair.index(),
                    )),
                    Either::Right(self.check_and_store_sliver(
                        blob_id,
                        metadata_status,
                        &pair.secondary,
                        pair.index(),
                    )),
                ]
            })
            .collect::<FuturesUnordered<_>>();

        let n_slivers = requests.len();

        while let Some(result) = requests.next().await {
            if let Err(error) = result {
                tracing::warn!(
                    %error,
                    "could not store sliver after retrying; stopping storing on the node"
                );
                return Err(error);
            }
        }
        Ok(n_slivers)
    }

    /// Stores a sliver on a node, first checking whether it is already stored.
    async fn check_and_store_sliver<A: EncodingAxis>(
        &self,
        blob_id: &BlobId,
        metadata_status: &StoredOnNodeStatus,
        sliver: &SliverData<A>,
        pair_index: SliverPairIndex,
    ) -> Result<(), SliverStoreError> {
        // If the metadata was only just stored, the slivers are almost certainly absent too,
        // so the status check is skipped. The same holds for slivers small enough that the
        // check costs about as much as the store.
        if *metadata_status == StoredOnNodeStatus::Stored
            && sliver.len() >= self.sliver_status_check_threshold
            && self.get_sliver_status::<A>(blob_id, pair_index).await?
                == StoredOnNodeStatus::Stored
        {
            tracing::debug!(
                %pair_index,
                sliver_type = A::NAME,
                "the sliver is already stored on the node"
            );
            return Ok(());
        }
        self.store_sliver(blob_id, sliver, pair_index).await
    }

    /// Stores a sliver on a node.
    async fn store_sliver<A: EncodingAxis>(
        &self,
        blob_id: &BlobId,
        sliver: &SliverData<A>,
        pair_index: SliverPairIndex,
    ) -> Result<(), SliverStoreError> {
        self.retry_with_limits_and_backoff(|| {
            self.client.store_sliver(blob_id, pair_index, sliver)
        })
        .await
        .map_err(|error| SliverStoreError {
            pair_index,
            sliver_type: A::sliver_type(),
            error,
        })
    }

    /// Requests the status for a sliver, retrying with limits and backoff.
    async fn get_sliver_status<A: EncodingAxis>(
        &self,
        blob_id: &BlobId,
        pair_index: SliverPairIndex,
    ) -> Result<StoredOnNodeStatus, SliverStoreError> {
        self.retry_with_limits_and_backoff(|| {
            self.client.get_sliver_status::<A>(blob_id, pair_index)
        })
        .await
        .map_err(|error| SliverStoreError {
            pair_index,
            sliver_type: A::sliver_type(),
            error,
        })
    }

    async fn retry_with_limits_and_backoff<F, Fut, T>(&self, f: F) -> Result<T, NodeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NodeError>>,
    {
        let _global_permit = self
            .write_limits
            .sliver_write_limit
            .acquire()
            .await
            .expect("semaphore never closed");
        let _node_permit = self
            .write_limits
            .node_write_limit
            .acquire()
            .await
            .expect("semaphore never closed");
        self.with_abort(backoff::retry(self.backoff_strategy(), f))
            .await
    }
}

// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! The high-level Walrus client: reading, storing, and managing blobs.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use walrus_core::{
    BlobId, Epoch, EpochCount, ShardIndex,
    encoding::{BlobCodec, Primary, PrimarySliver, SliverPair},
    messages::{BlobPersistenceType, ConfirmationCertificate},
    metadata::VerifiedBlobMetadataWithId,
};
use walrus_storage_node_client::{NodeError, api::BlobStatus};
use walrus_sui::{
    client::{
        BlobPersistence, ReadClient, StorageCost, SuiContractClient, price_for_encoded_length,
    },
    types::{Committee, ObjectID, move_structs::{Blob, BlobAttribute, BlobRegistrationParams}},
};

use crate::{
    active_committees::ActiveCommittees,
    communication::{NodeCommunicationFactory, NodeReadCommunication, node::StoreError},
    config::{ClientConfig, CommunicationLimits},
    error::{ClientError, ClientErrorKind, ClientResult},
    quorum::{Decision, DispatchConfig, DispatchOutcome, FailureClass, NodeTask, dispatch},
    utils::{WeightedResult as _, weighted_shuffle},
};

/// The result of storing a blob.
#[derive(Debug, Clone)]
pub struct BlobStoreResult {
    /// The blob ID of the stored blob.
    pub blob_id: BlobId,
    /// The on-chain blob object, as it is after certification.
    pub blob_object: Blob,
}

/// The memoized committee view.
///
/// The slot holds the resolved value behind a read-write lock for the common path; a refresh
/// mutex serializes materialization so that concurrent callers share a single in-flight load.
#[derive(Debug, Default)]
struct CommitteesCache {
    cached: RwLock<Option<Arc<ActiveCommittees>>>,
    refresh_lock: Mutex<()>,
}

/// A client to read and store blobs on Walrus.
///
/// The type parameter is the Sui client: any [`ReadClient`] suffices for reads, while storing
/// and managing blobs requires a [`SuiContractClient`].
#[derive(Debug)]
pub struct Client<T> {
    sui_client: T,
    codec: Arc<dyn BlobCodec>,
    committees: CommitteesCache,
    communication_factory: NodeCommunicationFactory,
}

impl<T: ReadClient> Client<T> {
    /// Creates a new client with the given configuration, Sui client, and codec.
    pub fn new(config: ClientConfig, sui_client: T, codec: Arc<dyn BlobCodec>) -> Self {
        let communication_factory = NodeCommunicationFactory::new(
            config.communication_config.clone(),
            codec.encoding_config().n_shards(),
        );
        Self {
            sui_client,
            codec,
            committees: CommitteesCache::default(),
            communication_factory,
        }
    }

    /// The inner Sui client.
    pub fn sui_client(&self) -> &T {
        &self.sui_client
    }

    /// Drops all cached committee and chain state, so that the next operation observes a fresh
    /// view.
    pub fn reset(&self) {
        tracing::debug!("resetting the client's cached committees and chain state");
        self.committees
            .cached
            .write()
            .expect("committee cache lock not poisoned")
            .take();
        self.sui_client.reset();
    }

    /// Returns the active committees, loading and memoizing them on first use.
    async fn get_committees(&self) -> ClientResult<Arc<ActiveCommittees>> {
        if let Some(committees) = self
            .committees
            .cached
            .read()
            .expect("committee cache lock not poisoned")
            .clone()
        {
            return Ok(committees);
        }

        let _guard = self.committees.refresh_lock.lock().await;
        // Another caller may have refreshed the cache while this one awaited the lock.
        if let Some(committees) = self
            .committees
            .cached
            .read()
            .expect("committee cache lock not poisoned")
            .clone()
        {
            return Ok(committees);
        }

        let committees_and_state = self.sui_client.committees_and_state().await?;
        let committees = Arc::new(ActiveCommittees::new(committees_and_state));
        if committees.n_shards() != self.codec.encoding_config().n_shards() {
            return Err(ClientError::other(anyhow::anyhow!(
                "the codec is configured for {} shards but the committee has {}",
                self.codec.encoding_config().n_shards(),
                committees.n_shards(),
            )));
        }
        self.committees
            .cached
            .write()
            .expect("committee cache lock not poisoned")
            .replace(Arc::clone(&committees));
        Ok(committees)
    }

    fn limits(&self, committees: &ActiveCommittees) -> CommunicationLimits {
        self.communication_factory
            .config()
            .limits(committees.write_committee().n_members())
    }

    // Read path.

    /// Reads the blob with the given blob ID from Walrus.
    ///
    /// If the operation fails with a retryable error (a stale committee view), the committee
    /// cache is reset and the read is retried exactly once.
    pub async fn read_blob(&self, blob_id: &BlobId) -> ClientResult<Vec<u8>> {
        self.read_blob_with_cancellation(blob_id, &CancellationToken::new())
            .await
    }

    /// Reads a blob; the provided cancellation token aborts the operation promptly.
    pub async fn read_blob_with_cancellation(
        &self,
        blob_id: &BlobId,
        cancel: &CancellationToken,
    ) -> ClientResult<Vec<u8>> {
        match self.read_blob_internal(blob_id, cancel).await {
            Err(error) if error.is_retryable() => {
                tracing::info!(%error, "retrying the read with a refreshed committee view");
                self.reset();
                self.read_blob_internal(blob_id, cancel).await
            }
            result => result,
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(%blob_id))]
    async fn read_blob_internal(
        &self,
        blob_id: &BlobId,
        cancel: &CancellationToken,
    ) -> ClientResult<Vec<u8>> {
        let committees = self.get_committees().await?;

        // During an epoch change the blob's certification epoch decides which committee holds
        // its slivers, so it is fetched from the nodes first.
        let certified_epoch = if committees.is_transitioning() {
            let status = self.get_verified_blob_status_internal(blob_id, cancel).await?;
            certified_epoch_from_status(blob_id, &status, committees.epoch())?
        } else {
            committees.epoch()
        };

        let metadata = self
            .retrieve_metadata_internal(&committees, certified_epoch, blob_id, cancel)
            .await?;
        let slivers = self
            .retrieve_slivers(&committees, certified_epoch, &metadata, cancel)
            .await?;

        let blob = self
            .codec
            .decode_primary_slivers(metadata.metadata().unencoded_length, slivers)
            .map_err(|error| match error {
                walrus_core::encoding::DecodeError::NotEnoughSlivers { .. } => {
                    ClientError::from(ClientErrorKind::NotEnoughSliversReceived)
                }
                walrus_core::encoding::DecodeError::DecodingFailed => {
                    ClientError::from(ClientErrorKind::InconsistentBlob(*blob_id))
                }
            })?;

        // Re-encode and compare: the decoded bytes must map back to the requested blob ID.
        let recomputed = self.codec.compute_metadata(&blob).map_err(ClientError::other)?;
        if recomputed.blob_id() != blob_id {
            return Err(ClientErrorKind::InconsistentBlob(*blob_id).into());
        }

        Ok(blob)
    }

    /// Retrieves the metadata of a blob from the committee that holds it.
    pub async fn retrieve_metadata(
        &self,
        blob_id: &BlobId,
        certified_epoch: Epoch,
    ) -> ClientResult<VerifiedBlobMetadataWithId> {
        let committees = self.get_committees().await?;
        self.retrieve_metadata_internal(
            &committees,
            certified_epoch,
            blob_id,
            &CancellationToken::new(),
        )
        .await
    }

    /// First-success metadata retrieval: a single randomly chosen node is tried first, and the
    /// dispatcher fans out to the rest only if it does not answer.
    async fn retrieve_metadata_internal(
        &self,
        committees: &ActiveCommittees,
        certified_epoch: Epoch,
        blob_id: &BlobId,
        cancel: &CancellationToken,
    ) -> ClientResult<VerifiedBlobMetadataWithId> {
        let communications = self.communication_factory.node_read_communications(
            committees,
            certified_epoch,
            cancel,
        )?;
        let limits = self.limits(committees);

        let tasks = communications.iter().map(|communication| NodeTask {
            node: communication.node_index,
            weight: communication.n_owned_shards(),
            future: async move {
                communication
                    .retrieve_verified_metadata(blob_id)
                    .await
                    .take_inner_result()
            },
        });
        let config = DispatchConfig {
            slow_start: true,
            ..DispatchConfig::new(
                committees.n_shards(),
                1,
                limits.max_concurrent_metadata_reads,
            )
        };

        match dispatch(&config, tasks, classify_node_error, |_| Decision::Continue).await {
            DispatchOutcome::Complete { mut results, .. } => Ok(results
                .pop()
                .expect("a completed dispatch contains at least one result")
                .value),
            DispatchOutcome::NotCertified => {
                Err(ClientErrorKind::BlobNotCertified(*blob_id).into())
            }
            DispatchOutcome::Blocked => Err(ClientErrorKind::BlobBlocked(*blob_id).into()),
            DispatchOutcome::Aborted => Err(ClientErrorKind::UserAbort.into()),
            DispatchOutcome::Insufficient { .. } => {
                Err(ClientErrorKind::NoBlobMetadataReceived.into())
            }
        }
    }

    /// Collects exactly `n_primary_source_symbols` distinct primary slivers.
    ///
    /// Tasks are ordered column-wise over a weighted shuffle of the nodes: every round draws
    /// from distinct nodes first, which maximizes shard diversity and minimizes the load on
    /// any single node. Nodes that failed once are not asked again.
    async fn retrieve_slivers(
        &self,
        committees: &ActiveCommittees,
        certified_epoch: Epoch,
        metadata: &VerifiedBlobMetadataWithId,
        cancel: &CancellationToken,
    ) -> ClientResult<Vec<PrimarySliver>> {
        let communications = self.communication_factory.node_read_communications(
            committees,
            certified_epoch,
            cancel,
        )?;
        let limits = self.limits(committees);
        let blob_id = metadata.blob_id();

        let ordered = weighted_shuffle(communications, NodeReadCommunication::n_owned_shards);
        let max_shards_per_node = ordered
            .iter()
            .map(NodeReadCommunication::n_owned_shards)
            .max()
            .unwrap_or(0);
        let mut tasks = Vec::new();
        for row in 0..max_shards_per_node {
            for communication in &ordered {
                let Some(shard) = communication.node.shard_ids.get(row).copied() else {
                    continue;
                };
                tasks.push(NodeTask {
                    node: communication.node_index,
                    weight: 1,
                    future: async move {
                        communication
                            .retrieve_verified_sliver::<Primary>(metadata, shard)
                            .await
                            .take_inner_result()
                    },
                });
            }
        }

        let required = usize::from(
            self.codec
                .encoding_config()
                .n_primary_source_symbols()
                .get(),
        );
        let config = DispatchConfig {
            launch_only_needed: true,
            blacklist_failed_nodes: true,
            ..DispatchConfig::new(
                committees.n_shards(),
                required,
                limits.max_concurrent_sliver_reads,
            )
        };

        match dispatch(&config, tasks, classify_node_error, |_| Decision::Continue).await {
            DispatchOutcome::Complete { results, .. } => {
                Ok(results.into_iter().map(|success| success.value).collect())
            }
            DispatchOutcome::NotCertified => {
                Err(ClientErrorKind::BlobNotCertified(*blob_id).into())
            }
            DispatchOutcome::Blocked => Err(ClientErrorKind::BlobBlocked(*blob_id).into()),
            DispatchOutcome::Aborted => Err(ClientErrorKind::UserAbort.into()),
            DispatchOutcome::Insufficient { .. } => {
                Err(ClientErrorKind::NotEnoughSliversReceived.into())
            }
        }
    }

    // Blob status.

    /// Returns the most advanced blob status reported by any node.
    pub async fn get_blob_status(&self, blob_id: &BlobId) -> ClientResult<BlobStatus> {
        let statuses = self
            .collect_blob_statuses(blob_id, &CancellationToken::new())
            .await?;
        // `BlobStatus` is totally ordered and consistent with equality, so the maximum is
        // independent of the iteration order of the aggregated statuses.
        statuses
            .into_iter()
            .map(|(status, _)| status)
            .max()
            .ok_or_else(|| ClientErrorKind::NoBlobStatusReceived.into())
    }

    /// Returns the most advanced blob status that is supported by at least a validity weight
    /// of shards, i.e., vouched for by at least one honest node.
    pub async fn get_verified_blob_status(&self, blob_id: &BlobId) -> ClientResult<BlobStatus> {
        self.get_verified_blob_status_internal(blob_id, &CancellationToken::new())
            .await
    }

    async fn get_verified_blob_status_internal(
        &self,
        blob_id: &BlobId,
        cancel: &CancellationToken,
    ) -> ClientResult<BlobStatus> {
        let committees = self.get_committees().await?;
        let statuses = self.collect_blob_statuses(blob_id, cancel).await?;

        // `BlobStatus` is totally ordered and consistent with equality, so the selected
        // status (and thereby its `initial_certified_epoch`) is deterministic even though the
        // aggregation is unordered.
        statuses
            .into_iter()
            .filter(|(_, weight)| committees.is_above_validity(*weight))
            .map(|(status, _)| status)
            .max()
            .ok_or_else(|| ClientErrorKind::NoVerifiedBlobStatusReceived.into())
    }

    /// Queries all nodes of the current committee for the blob status and returns the
    /// aggregated per-status shard weights.
    ///
    /// Stops early once a single status reaches a quorum: the remaining weight is below the
    /// validity threshold and can no longer promote any other status.
    async fn collect_blob_statuses(
        &self,
        blob_id: &BlobId,
        cancel: &CancellationToken,
    ) -> ClientResult<Vec<(BlobStatus, usize)>> {
        let committees = self.get_committees().await?;
        let communications = self.communication_factory.node_read_communications(
            &committees,
            committees.epoch(),
            cancel,
        )?;

        let tasks = communications.iter().map(|communication| NodeTask {
            node: communication.node_index,
            weight: communication.n_owned_shards(),
            future: async move { communication.get_blob_status(blob_id).await.take_inner_result() },
        });
        let config = DispatchConfig::new(
            committees.n_shards(),
            usize::from(committees.n_shards().get()),
            communications.len().max(1),
        );

        let mut weights: HashMap<BlobStatus, usize> = HashMap::new();
        let outcome = dispatch(&config, tasks, classify_node_error, |success| {
            let weight = weights.entry(success.value).or_insert(0);
            *weight += success.weight;
            if committees.is_quorum(*weight) {
                Decision::Done
            } else {
                Decision::Continue
            }
        })
        .await;

        match outcome {
            DispatchOutcome::Complete { .. } | DispatchOutcome::Insufficient { .. } => {
                Ok(weights.into_iter().collect())
            }
            // A quorum of authoritative 404s means the blob is simply unknown everywhere.
            DispatchOutcome::NotCertified => Ok(vec![(
                BlobStatus::Nonexistent,
                usize::from(committees.n_shards().get()),
            )]),
            DispatchOutcome::Blocked => Err(ClientErrorKind::BlobBlocked(*blob_id).into()),
            DispatchOutcome::Aborted => Err(ClientErrorKind::UserAbort.into()),
        }
    }

    // Cost estimation.

    /// Computes the cost of storing a blob of `unencoded_size` bytes for `epochs_ahead`
    /// epochs, from the on-chain prices and the deterministic encoded size.
    pub async fn storage_cost(
        &self,
        unencoded_size: u64,
        epochs_ahead: EpochCount,
    ) -> ClientResult<StorageCost> {
        let encoded_length = self
            .codec
            .encoding_config()
            .encoded_blob_length(unencoded_size)
            .ok_or_else(|| {
                ClientError::other(anyhow::anyhow!(
                    "blob of {unencoded_size} bytes is too large to be encoded"
                ))
            })?;
        let (storage_price, write_price) = self
            .sui_client
            .storage_and_write_price_per_unit_size()
            .await?;
        Ok(price_for_encoded_length(
            encoded_length,
            storage_price,
            write_price,
            epochs_ahead,
        ))
    }

    /// Reads the attributes attached to a blob object, or `None` if the attribute field does
    /// not exist.
    pub async fn read_blob_attributes(
        &self,
        blob_object: ObjectID,
    ) -> ClientResult<Option<BlobAttribute>> {
        Ok(self.sui_client.get_blob_attributes(blob_object).await?)
    }
}

impl Client<SuiContractClient> {
    /// Encodes, registers, distributes, and certifies a blob.
    pub async fn reserve_and_store_blob(
        &self,
        blob: &[u8],
        epochs_ahead: EpochCount,
        persistence: BlobPersistence,
    ) -> ClientResult<BlobStoreResult> {
        self.reserve_and_store_blob_with_cancellation(
            blob,
            epochs_ahead,
            persistence,
            &CancellationToken::new(),
        )
        .await
    }

    /// Stores a blob; the provided cancellation token aborts the operation promptly.
    #[tracing::instrument(level = "debug", skip_all, fields(blob_len = blob.len()))]
    pub async fn reserve_and_store_blob_with_cancellation(
        &self,
        blob: &[u8],
        epochs_ahead: EpochCount,
        persistence: BlobPersistence,
        cancel: &CancellationToken,
    ) -> ClientResult<BlobStoreResult> {
        let committees = self.get_committees().await?;
        let limits = self.limits(&committees);

        // Encode the blob into one sliver pair per shard and route each pair to the committee
        // member owning its shard.
        let (pairs, metadata) = self
            .codec
            .encode_with_metadata(blob)
            .map_err(ClientError::other)?;
        let blob_id = *metadata.blob_id();
        let pairs_per_node =
            pairs_per_node(committees.write_committee(), &blob_id, pairs);
        tracing::debug!(%blob_id, "encoded the blob; registering it on chain");

        let encoded_length = self
            .codec
            .encoding_config()
            .encoded_blob_length(blob.len() as u64)
            .ok_or_else(|| {
                ClientError::other(anyhow::anyhow!("the blob is too large to be encoded"))
            })?;
        let params = BlobRegistrationParams {
            blob_id,
            root_hash: metadata.metadata().compute_root_hash(),
            unencoded_size: blob.len() as u64,
            encoding_type: metadata.metadata().encoding_type,
            deletable: persistence.is_deletable(),
        };

        // Registration must complete before any slivers are pushed: nodes refuse data for
        // unregistered blob IDs.
        let blob_object = self
            .sui_client
            .reserve_and_register_blob(encoded_length, epochs_ahead, &params)
            .await?;
        let blob_persistence_type = match persistence {
            BlobPersistence::Permanent => BlobPersistenceType::Permanent,
            BlobPersistence::Deletable => BlobPersistenceType::Deletable {
                object_id: blob_object.id,
            },
        };

        let certificate = self
            .distribute_and_collect_confirmations(
                &committees,
                &limits,
                &metadata,
                &pairs_per_node,
                &blob_persistence_type,
                cancel,
            )
            .await?;

        self.sui_client
            .certify_blob(
                blob_object.id,
                &certificate,
                committees.write_committee().n_members(),
            )
            .await?;
        tracing::info!(%blob_id, blob_object = %blob_object.id, "blob certified on chain");

        let blob_object = self.sui_client.get_blob_object(blob_object.id).await?;
        Ok(BlobStoreResult {
            blob_id,
            blob_object,
        })
    }

    /// Pushes metadata and slivers to all committee members concurrently and collects a quorum
    /// of verified storage confirmations into a certificate.
    ///
    /// The dispatcher's exhaustion bound aborts the distribution as soon as the failed weight
    /// exceeds the validity threshold, since a quorum of confirmations is then unreachable.
    async fn distribute_and_collect_confirmations(
        &self,
        committees: &ActiveCommittees,
        limits: &CommunicationLimits,
        metadata: &VerifiedBlobMetadataWithId,
        pairs_per_node: &[Vec<SliverPair>],
        blob_persistence_type: &BlobPersistenceType,
        cancel: &CancellationToken,
    ) -> ClientResult<ConfirmationCertificate> {
        let sliver_write_limit = Arc::new(Semaphore::new(limits.max_concurrent_sliver_writes));
        let communications = self.communication_factory.node_write_communications(
            committees,
            sliver_write_limit,
            cancel,
        )?;

        let tasks = communications.iter().map(|communication| NodeTask {
            node: communication.node_index,
            weight: communication.n_owned_shards(),
            future: async move {
                communication
                    .store_metadata_and_pairs(
                        metadata,
                        &pairs_per_node[communication.node_index],
                        blob_persistence_type,
                    )
                    .await
                    .take_inner_result()
            },
        });

        let required = committees.min_quorum_weight();
        let config = DispatchConfig::new(
            committees.n_shards(),
            required,
            limits.max_concurrent_writes,
        );

        match dispatch(&config, tasks, classify_store_error, |_| Decision::Continue).await {
            DispatchOutcome::Complete { results, weight } => {
                tracing::debug!(
                    confirmed_weight = weight,
                    n_nodes = results.len(),
                    "collected a quorum of storage confirmations"
                );
                let signers = results
                    .iter()
                    .map(|success| {
                        u16::try_from(success.node).expect("committee size fits into a u16")
                    })
                    .collect();
                let confirmations = results.iter().map(|success| &success.value).collect();
                ConfirmationCertificate::from_signed_messages_and_indices(confirmations, signers)
                    .map_err(ClientError::other)
            }
            DispatchOutcome::Aborted => Err(ClientErrorKind::UserAbort.into()),
            DispatchOutcome::Insufficient { weight, .. } => {
                Err(ClientErrorKind::NotEnoughBlobConfirmations {
                    obtained: weight,
                    required,
                }
                .into())
            }
            // Store errors are never classified as not-found or blocked.
            DispatchOutcome::NotCertified | DispatchOutcome::Blocked => {
                unreachable!("store errors are classified as transient or abort")
            }
        }
    }

    /// Deletes the given deletable blob object.
    pub async fn delete_blob(&self, blob_object: ObjectID) -> ClientResult<()> {
        Ok(self.sui_client.delete_blob(blob_object).await?)
    }

    /// Extends the blob so that its storage ends at `target_end_epoch`; a no-op if the blob
    /// already lives at least that long.
    pub async fn extend_blob(
        &self,
        blob_object: ObjectID,
        target_end_epoch: Epoch,
    ) -> ClientResult<()> {
        let blob = self.sui_client.get_blob_object(blob_object).await?;
        Ok(self.sui_client.extend_blob(&blob, target_end_epoch).await?)
    }

    /// Inserts or updates an attribute pair on the blob object.
    pub async fn write_blob_attribute(
        &self,
        blob_object: ObjectID,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> ClientResult<()> {
        Ok(self
            .sui_client
            .insert_or_update_blob_attribute(blob_object, key, value)
            .await?)
    }

    /// Removes an attribute pair from the blob object.
    pub async fn remove_blob_attribute(
        &self,
        blob_object: ObjectID,
        key: impl Into<String>,
    ) -> ClientResult<()> {
        Ok(self.sui_client.remove_blob_attribute(blob_object, key).await?)
    }
}

/// Maps node-transport failures to the dispatcher's weighted classification.
fn classify_node_error(error: &NodeError) -> FailureClass {
    if error.is_user_abort() {
        FailureClass::UserAbort
    } else if error.is_status_not_found() {
        FailureClass::NotFound
    } else if error.is_legally_unavailable() {
        FailureClass::Blocked
    } else {
        FailureClass::Transient
    }
}

/// Maps store failures to the dispatcher's classification; every failure other than an abort
/// merely reduces the achievable confirmation weight.
fn classify_store_error(error: &StoreError) -> FailureClass {
    if error.is_user_abort() {
        FailureClass::UserAbort
    } else {
        FailureClass::Transient
    }
}

/// Derives the certification epoch of a blob from its verified status.
fn certified_epoch_from_status(
    blob_id: &BlobId,
    status: &BlobStatus,
    current_epoch: Epoch,
) -> ClientResult<Epoch> {
    match status {
        BlobStatus::Nonexistent | BlobStatus::Invalid => {
            Err(ClientErrorKind::BlobNotCertified(*blob_id).into())
        }
        BlobStatus::Permanent {
            initial_certified_epoch: Some(epoch),
            ..
        } => Ok(*epoch),
        BlobStatus::Permanent {
            is_certified: false,
            ..
        } => Err(ClientErrorKind::BlobNotCertified(*blob_id).into()),
        // Certified deletable blobs do not carry their certification epoch; the current epoch
        // is the latest epoch at which they can have been certified.
        BlobStatus::Deletable {
            count_deletable_certified,
            ..
        } if *count_deletable_certified > 0 => Ok(current_epoch),
        BlobStatus::Deletable { .. } => Err(ClientErrorKind::BlobNotCertified(*blob_id).into()),
        BlobStatus::Permanent { .. } => Ok(current_epoch),
    }
}

/// Groups the sliver pairs by the committee member owning their shard.
fn pairs_per_node(
    committee: &Committee,
    blob_id: &BlobId,
    pairs: Vec<SliverPair>,
) -> Vec<Vec<SliverPair>> {
    let mut pairs_per_node: Vec<Vec<SliverPair>> = committee
        .members()
        .iter()
        .map(|node| Vec::with_capacity(node.shard_ids.len()))
        .collect();
    let shard_to_node: HashMap<ShardIndex, usize> = committee
        .members()
        .iter()
        .enumerate()
        .flat_map(|(index, node)| node.shard_ids.iter().map(move |shard| (*shard, index)))
        .collect();
    for pair in pairs {
        let shard = pair
            .index()
            .to_shard_index(committee.n_shards(), blob_id);
        pairs_per_node[shard_to_node[&shard]].push(pair);
    }
    pairs_per_node
}

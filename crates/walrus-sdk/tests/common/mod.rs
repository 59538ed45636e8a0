// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! A test cluster: in-process storage nodes served over HTTP plus an in-memory Sui network.

use std::{
    collections::HashMap,
    future::IntoFuture,
    num::NonZeroU16,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use walrus_core::{
    BlobId, Epoch, ProtocolKeyPair, ShardIndex, SuiObjectId,
    encoding::BlobCodec,
    messages::{BlobPersistenceType, Confirmation, SignedStorageConfirmation},
    metadata::BlobMetadata,
    test_utils::ReplicationCodec,
};
use walrus_sdk::{Client, ClientConfig};
use walrus_storage_node_client::api::{BlobStatus, StoredOnNodeStatus};
use walrus_sui::{
    client::SuiContractClient,
    test_utils::{MockNodeParams, MockSuiNetwork},
    types::NetworkAddress,
};
use walrus_utils::backoff::ExponentialBackoffConfig;

/// Behavior knobs of a test node, settable per test.
#[derive(Debug, Default)]
pub struct NodeBehavior {
    /// Status code returned for all metadata reads, overriding the stored data.
    pub fail_metadata_reads_with: Option<StatusCode>,
    /// If true, all sliver reads fail with an internal error.
    pub fail_sliver_reads: bool,
    /// If true, all writes (metadata, slivers) fail with an internal error.
    pub fail_writes: bool,
}

#[derive(Debug, Default)]
struct NodeStorage {
    metadata: HashMap<BlobId, BlobMetadata>,
    slivers: HashMap<(BlobId, u16, String), Vec<u8>>,
    statuses: HashMap<BlobId, BlobStatus>,
}

/// An in-process storage node.
#[derive(Debug)]
pub struct TestNode {
    pub keypair: ProtocolKeyPair,
    pub shard_ids: Vec<ShardIndex>,
    pub epoch: Mutex<Epoch>,
    pub behavior: Mutex<NodeBehavior>,
    pub sliver_read_count: AtomicUsize,
    storage: Mutex<NodeStorage>,
}

impl TestNode {
    fn new(seed: u64, shard_ids: Vec<ShardIndex>, epoch: Epoch) -> Self {
        Self {
            keypair: walrus_core::test_utils::protocol_key_pair(seed),
            shard_ids,
            epoch: Mutex::new(epoch),
            behavior: Mutex::new(NodeBehavior::default()),
            sliver_read_count: AtomicUsize::new(0),
            storage: Mutex::new(NodeStorage::default()),
        }
    }

    /// Stores the metadata, slivers, and status of a blob directly, bypassing HTTP.
    pub fn seed_blob(
        &self,
        blob_id: &BlobId,
        metadata: &BlobMetadata,
        pairs: &[walrus_core::encoding::SliverPair],
        status: BlobStatus,
    ) {
        let mut storage = self.storage.lock().unwrap();
        storage.metadata.insert(*blob_id, metadata.clone());
        for pair in pairs {
            storage.slivers.insert(
                (*blob_id, pair.index().0, "primary".to_owned()),
                bcs::to_bytes(&pair.primary).unwrap(),
            );
            storage.slivers.insert(
                (*blob_id, pair.index().0, "secondary".to_owned()),
                bcs::to_bytes(&pair.secondary).unwrap(),
            );
        }
        storage.statuses.insert(*blob_id, status);
    }

    /// Sets the status reported for the given blob.
    pub fn set_status(&self, blob_id: &BlobId, status: BlobStatus) {
        self.storage.lock().unwrap().statuses.insert(*blob_id, status);
    }
}

fn bcs_ok<T: serde::Serialize>(value: &T) -> (StatusCode, Vec<u8>) {
    (StatusCode::OK, bcs::to_bytes(value).unwrap())
}

async fn get_metadata(
    State(node): State<Arc<TestNode>>,
    Path(blob_id): Path<String>,
) -> (StatusCode, Vec<u8>) {
    if let Some(code) = node.behavior.lock().unwrap().fail_metadata_reads_with {
        return (code, Vec::new());
    }
    let Ok(blob_id) = blob_id.parse::<BlobId>() else {
        return (StatusCode::BAD_REQUEST, Vec::new());
    };
    match node.storage.lock().unwrap().metadata.get(&blob_id) {
        Some(metadata) => bcs_ok(metadata),
        None => (StatusCode::NOT_FOUND, Vec::new()),
    }
}

async fn put_metadata(
    State(node): State<Arc<TestNode>>,
    Path(blob_id): Path<String>,
    body: Bytes,
) -> (StatusCode, Vec<u8>) {
    if node.behavior.lock().unwrap().fail_writes {
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new());
    }
    let (Ok(blob_id), Ok(metadata)) = (
        blob_id.parse::<BlobId>(),
        bcs::from_bytes::<BlobMetadata>(&body),
    ) else {
        return (StatusCode::BAD_REQUEST, Vec::new());
    };
    node.storage.lock().unwrap().metadata.insert(blob_id, metadata);
    (StatusCode::OK, Vec::new())
}

async fn get_metadata_status(
    State(node): State<Arc<TestNode>>,
    Path(blob_id): Path<String>,
) -> (StatusCode, Vec<u8>) {
    let Ok(blob_id) = blob_id.parse::<BlobId>() else {
        return (StatusCode::BAD_REQUEST, Vec::new());
    };
    let status = if node.storage.lock().unwrap().metadata.contains_key(&blob_id) {
        StoredOnNodeStatus::Stored
    } else {
        StoredOnNodeStatus::Nonexistent
    };
    bcs_ok(&status)
}

async fn get_sliver(
    State(node): State<Arc<TestNode>>,
    Path((blob_id, pair_index, sliver_type)): Path<(String, u16, String)>,
) -> (StatusCode, Vec<u8>) {
    node.sliver_read_count.fetch_add(1, Ordering::SeqCst);
    if node.behavior.lock().unwrap().fail_sliver_reads {
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new());
    }
    let Ok(blob_id) = blob_id.parse::<BlobId>() else {
        return (StatusCode::BAD_REQUEST, Vec::new());
    };
    match node
        .storage
        .lock()
        .unwrap()
        .slivers
        .get(&(blob_id, pair_index, sliver_type))
    {
        Some(bytes) => (StatusCode::OK, bytes.clone()),
        None => (StatusCode::NOT_FOUND, Vec::new()),
    }
}

async fn put_sliver(
    State(node): State<Arc<TestNode>>,
    Path((blob_id, pair_index, sliver_type)): Path<(String, u16, String)>,
    body: Bytes,
) -> (StatusCode, Vec<u8>) {
    if node.behavior.lock().unwrap().fail_writes {
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new());
    }
    let Ok(blob_id) = blob_id.parse::<BlobId>() else {
        return (StatusCode::BAD_REQUEST, Vec::new());
    };
    node.storage
        .lock()
        .unwrap()
        .slivers
        .insert((blob_id, pair_index, sliver_type), body.to_vec());
    (StatusCode::OK, Vec::new())
}

async fn get_sliver_status(
    State(node): State<Arc<TestNode>>,
    Path((blob_id, pair_index, sliver_type)): Path<(String, u16, String)>,
) -> (StatusCode, Vec<u8>) {
    let Ok(blob_id) = blob_id.parse::<BlobId>() else {
        return (StatusCode::BAD_REQUEST, Vec::new());
    };
    let status = if node
        .storage
        .lock()
        .unwrap()
        .slivers
        .contains_key(&(blob_id, pair_index, sliver_type))
    {
        StoredOnNodeStatus::Stored
    } else {
        StoredOnNodeStatus::Nonexistent
    };
    bcs_ok(&status)
}

async fn get_blob_status(
    State(node): State<Arc<TestNode>>,
    Path(blob_id): Path<String>,
) -> (StatusCode, Vec<u8>) {
    let Ok(blob_id) = blob_id.parse::<BlobId>() else {
        return (StatusCode::BAD_REQUEST, Vec::new());
    };
    let status = node
        .storage
        .lock()
        .unwrap()
        .statuses
        .get(&blob_id)
        .copied()
        .unwrap_or(BlobStatus::Nonexistent);
    bcs_ok(&status)
}

fn signed_confirmation(
    node: &TestNode,
    blob_id: BlobId,
    blob_type: BlobPersistenceType,
) -> (StatusCode, Vec<u8>) {
    let epoch = *node.epoch.lock().unwrap();
    let confirmation = Confirmation::new(epoch, blob_id, blob_type);
    let message = bcs::to_bytes(&confirmation).unwrap();
    let signature = node.keypair.sign(&message);
    bcs_ok(&SignedStorageConfirmation::new_from_encoded(
        message, signature,
    ))
}

async fn get_confirmation_permanent(
    State(node): State<Arc<TestNode>>,
    Path(blob_id): Path<String>,
) -> (StatusCode, Vec<u8>) {
    if node.behavior.lock().unwrap().fail_writes {
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new());
    }
    let Ok(blob_id) = blob_id.parse::<BlobId>() else {
        return (StatusCode::BAD_REQUEST, Vec::new());
    };
    signed_confirmation(&node, blob_id, BlobPersistenceType::Permanent)
}

async fn get_confirmation_deletable(
    State(node): State<Arc<TestNode>>,
    Path(blob_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, Vec<u8>) {
    if node.behavior.lock().unwrap().fail_writes {
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new());
    }
    let (Ok(blob_id), Some(Ok(object_id))) = (
        blob_id.parse::<BlobId>(),
        query
            .get("object_id")
            .map(|value| value.parse::<SuiObjectId>()),
    ) else {
        return (StatusCode::BAD_REQUEST, Vec::new());
    };
    signed_confirmation(&node, blob_id, BlobPersistenceType::Deletable { object_id })
}

fn router(node: Arc<TestNode>) -> Router {
    Router::new()
        .route("/v1/blobs/:blob_id/metadata", get(get_metadata).put(put_metadata))
        .route("/v1/blobs/:blob_id/metadata/status", get(get_metadata_status))
        .route(
            "/v1/blobs/:blob_id/slivers/:pair_index/:sliver_type",
            get(get_sliver).put(put_sliver),
        )
        .route(
            "/v1/blobs/:blob_id/slivers/:pair_index/:sliver_type/status",
            get(get_sliver_status),
        )
        .route("/v1/blobs/:blob_id/status", get(get_blob_status))
        .route(
            "/v1/blobs/:blob_id/confirmation/permanent",
            get(get_confirmation_permanent),
        )
        .route(
            "/v1/blobs/:blob_id/confirmation/deletable",
            get(get_confirmation_deletable),
        )
        .with_state(node)
}

/// A committee of in-process storage nodes with an in-memory chain.
pub struct TestCluster {
    pub nodes: Vec<Arc<TestNode>>,
    pub network: Arc<MockSuiNetwork>,
    pub codec: Arc<ReplicationCodec>,
    pub config: ClientConfig,
    pub epoch: Epoch,
}

impl TestCluster {
    /// Spawns `n_nodes` storage nodes with `shards_per_node` shards each, at the given epoch.
    pub async fn start(epoch: Epoch, n_nodes: u16, shards_per_node: u16) -> Self {
        let n_shards = n_nodes * shards_per_node;
        let mut nodes = Vec::new();
        let mut node_params = Vec::new();

        for i in 0..n_nodes {
            let shard_ids: Vec<ShardIndex> = (0..shards_per_node)
                .map(|s| ShardIndex(i * shards_per_node + s))
                .collect();
            let node = Arc::new(TestNode::new(u64::from(i), shard_ids.clone(), epoch));

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("can bind an ephemeral port");
            let address = listener.local_addr().expect("listener has an address");
            tokio::spawn(axum::serve(listener, router(node.clone())).into_future());

            node_params.push(MockNodeParams {
                name: format!("node-{i}"),
                network_address: NetworkAddress(format!("http://{address}")),
                public_key: node.keypair.public().clone(),
                shard_ids,
            });
            nodes.push(node);
        }

        let network = Arc::new(MockSuiNetwork::new(epoch, n_shards, node_params, 100, 10));
        let codec = Arc::new(ReplicationCodec::new(
            NonZeroU16::new(n_shards).expect("positive"),
        ));
        let mut config =
            ClientConfig::new_from_contract_config(MockSuiNetwork::contract_config());
        // Keep the per-node retries short so that failure-path tests finish quickly.
        config.communication_config.request_rate_config.backoff_config = ExponentialBackoffConfig {
            min_backoff: std::time::Duration::from_millis(10),
            max_backoff: std::time::Duration::from_millis(50),
            max_retries: Some(2),
        };

        Self {
            nodes,
            network,
            codec,
            config,
            epoch,
        }
    }

    /// Creates a fresh client against this cluster.
    pub fn client(&self) -> Client<SuiContractClient> {
        let sui_client = SuiContractClient::new(
            self.network.clone(),
            MockSuiNetwork::contract_config(),
        );
        Client::new(self.config.clone(), sui_client, self.codec.clone())
    }

    /// Encodes the blob and seeds it on the given nodes (by index), marking it certified at
    /// the cluster's epoch. Returns its blob ID.
    pub fn seed_blob(&self, blob: &[u8], node_indices: impl IntoIterator<Item = usize>) -> BlobId {
        let (pairs, metadata) = self.codec.encode_with_metadata(blob).expect("encodes");
        let blob_id = *metadata.blob_id();
        let status = BlobStatus::Permanent {
            end_epoch: self.epoch + 10,
            is_certified: true,
            initial_certified_epoch: Some(self.epoch),
        };

        for index in node_indices {
            let node = &self.nodes[index];
            let node_pairs: Vec<_> = pairs
                .iter()
                .filter(|pair| {
                    node.shard_ids.contains(
                        &pair
                            .index()
                            .to_shard_index(self.codec.encoding_config().n_shards(), &blob_id),
                    )
                })
                .cloned()
                .collect();
            node.seed_blob(&blob_id, metadata.metadata(), &node_pairs, status);
        }
        blob_id
    }

    /// The total number of sliver reads observed across all nodes.
    pub fn total_sliver_reads(&self) -> usize {
        self.nodes
            .iter()
            .map(|node| node.sliver_read_count.load(Ordering::SeqCst))
            .sum()
    }
}

// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests of the client against in-process storage nodes and an in-memory chain.

use axum::http::StatusCode;
use walrus_core::encoding::BlobCodec as _;
use walrus_sdk::error::ClientErrorKind;
use walrus_storage_node_client::api::BlobStatus;
use walrus_sui::client::BlobPersistence;

mod common;
use common::TestCluster;

fn test_blob(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn read_blob_returns_the_original_bytes_with_minimal_sliver_requests() {
    let cluster = TestCluster::start(1, 10, 10).await;
    let blob = test_blob(2048);
    let blob_id = cluster.seed_blob(&blob, 0..10);

    let client = cluster.client();
    let read = client.read_blob(&blob_id).await.expect("read succeeds");
    assert_eq!(read, blob);

    // Exactly `n_primary_source_symbols` distinct slivers are requested; the dispatcher stops
    // collecting the moment the threshold is reached.
    assert_eq!(cluster.total_sliver_reads(), 34);
}

#[tokio::test]
async fn read_succeeds_when_only_a_subset_of_nodes_holds_slivers() {
    let cluster = TestCluster::start(1, 10, 10).await;
    let blob = test_blob(1024);
    // Slivers live on 4 nodes (40 shards); k = 34 distinct slivers are still reachable.
    let blob_id = cluster.seed_blob(&blob, 0..4);
    for node in &cluster.nodes[4..] {
        // The other nodes still know the blob's metadata, but have no slivers.
        let (_, metadata) = cluster.codec.encode_with_metadata(&blob).expect("encodes");
        node.seed_blob(
            &blob_id,
            metadata.metadata(),
            &[],
            BlobStatus::Permanent {
                end_epoch: 11,
                is_certified: true,
                initial_certified_epoch: Some(1),
            },
        );
    }

    let client = cluster.client();
    let read = client.read_blob(&blob_id).await.expect("read succeeds");
    assert_eq!(read, blob);
}

#[tokio::test]
async fn read_falls_back_to_healthy_nodes_when_sliver_reads_fail() {
    let cluster = TestCluster::start(1, 10, 10).await;
    let blob = test_blob(4096);
    let blob_id = cluster.seed_blob(&blob, 0..10);
    // Three nodes (30 shards) fail every sliver request; 70 shards remain, well above the 34
    // required. The failing nodes are blacklisted after their first failure.
    for node in &cluster.nodes[..3] {
        node.behavior.lock().unwrap().fail_sliver_reads = true;
    }

    let client = cluster.client();
    let read = client.read_blob(&blob_id).await.expect("read succeeds");
    assert_eq!(read, blob);
}

#[tokio::test]
async fn reading_an_unknown_blob_fails_as_not_certified() {
    let cluster = TestCluster::start(1, 10, 10).await;
    let client = cluster.client();
    let blob_id = walrus_core::test_utils::blob_id_from_u64(42);

    let error = client.read_blob(&blob_id).await.expect_err("read fails");
    assert!(matches!(
        error.kind(),
        ClientErrorKind::BlobNotCertified(id) if *id == blob_id
    ));
    // The read never got past the metadata phase.
    assert_eq!(cluster.total_sliver_reads(), 0);
}

#[tokio::test]
async fn reading_a_blocked_blob_fails_as_blocked() {
    let cluster = TestCluster::start(1, 10, 10).await;
    let blob_id = cluster.seed_blob(&test_blob(512), 0..10);
    for node in &cluster.nodes {
        node.behavior.lock().unwrap().fail_metadata_reads_with =
            Some(StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS);
    }

    let client = cluster.client();
    let error = client.read_blob(&blob_id).await.expect_err("read fails");
    assert!(matches!(
        error.kind(),
        ClientErrorKind::BlobBlocked(id) if *id == blob_id
    ));
}

#[tokio::test]
async fn inconsistent_metadata_is_detected_after_decoding() {
    let cluster = TestCluster::start(1, 10, 10).await;
    let blob = test_blob(1024);

    // Craft self-consistent metadata whose sliver hashes match the served slivers but whose
    // unencoded length was tampered with: decoding succeeds, yet the decoded bytes re-hash to
    // a different blob ID.
    let (pairs, metadata) = cluster.codec.encode_with_metadata(&blob).expect("encodes");
    let mut tampered = metadata.metadata().clone();
    tampered.unencoded_length -= 1;
    let tampered_id = walrus_core::BlobId::from_sliver_pair_metadata(&tampered);
    let status = BlobStatus::Permanent {
        end_epoch: 11,
        is_certified: true,
        initial_certified_epoch: Some(1),
    };
    for node in &cluster.nodes {
        let node_pairs: Vec<_> = pairs
            .iter()
            .filter(|pair| {
                node.shard_ids.contains(&pair.index().to_shard_index(
                    cluster.codec.encoding_config().n_shards(),
                    &tampered_id,
                ))
            })
            .cloned()
            .collect();
        node.seed_blob(&tampered_id, &tampered, &node_pairs, status);
    }

    let client = cluster.client();
    let error = client.read_blob(&tampered_id).await.expect_err("read fails");
    assert!(matches!(
        error.kind(),
        ClientErrorKind::InconsistentBlob(id) if *id == tampered_id
    ));
}

#[tokio::test]
async fn store_blob_registers_distributes_and_certifies() {
    let cluster = TestCluster::start(1, 10, 10).await;
    let blob = test_blob(1024);

    let client = cluster.client();
    let result = client
        .reserve_and_store_blob(&blob, 3, BlobPersistence::Permanent)
        .await
        .expect("store succeeds");

    // The mock chain verified the aggregate signature and bitmap before certifying.
    assert_eq!(result.blob_object.certified_epoch, Some(1));
    assert_eq!(result.blob_object.storage.end_epoch, 4);
    assert!(!result.blob_object.deletable);

    let on_chain = cluster
        .network
        .blob_object_for_blob_id(&result.blob_id)
        .expect("blob object exists");
    assert_eq!(on_chain.certified_epoch, Some(1));

    // A successful write is immediately readable.
    let read = client.read_blob(&result.blob_id).await.expect("read succeeds");
    assert_eq!(read, blob);
}

#[tokio::test]
async fn store_tolerates_failures_below_the_validity_threshold() {
    let cluster = TestCluster::start(1, 10, 10).await;
    // Nodes 7, 8, and 9 (30 shards) fail all writes: 30 of 100 shards is below the validity
    // threshold, so the remaining 70 confirmations still form a quorum.
    for node in &cluster.nodes[7..] {
        node.behavior.lock().unwrap().fail_writes = true;
    }

    let client = cluster.client();
    let result = client
        .reserve_and_store_blob(&test_blob(777), 3, BlobPersistence::Permanent)
        .await
        .expect("store succeeds with 7 of 10 nodes");
    assert_eq!(result.blob_object.certified_epoch, Some(1));
}

#[tokio::test]
async fn store_fails_once_failures_exceed_the_validity_threshold() {
    let cluster = TestCluster::start(1, 10, 10).await;
    // Four failing nodes are 40 shards: a quorum of 67 confirmations is unreachable.
    for node in &cluster.nodes[6..] {
        node.behavior.lock().unwrap().fail_writes = true;
    }

    let client = cluster.client();
    let error = client
        .reserve_and_store_blob(&test_blob(777), 3, BlobPersistence::Permanent)
        .await
        .expect_err("store fails");
    assert!(matches!(
        error.kind(),
        ClientErrorKind::NotEnoughBlobConfirmations { obtained, required }
            if *obtained <= 60 && *required == 67
    ));
}

#[tokio::test]
async fn deletable_blobs_are_confirmed_with_their_object_id() {
    let cluster = TestCluster::start(1, 10, 10).await;
    let client = cluster.client();

    let result = client
        .reserve_and_store_blob(&test_blob(256), 2, BlobPersistence::Deletable)
        .await
        .expect("store succeeds");
    assert!(result.blob_object.deletable);

    client
        .delete_blob(result.blob_object.id)
        .await
        .expect("delete succeeds");
    assert!(
        cluster
            .network
            .blob_object_for_blob_id(&result.blob_id)
            .is_none()
    );
}

#[tokio::test]
async fn reads_during_an_epoch_change_use_the_blob_status_and_retry_once() {
    let cluster = TestCluster::start(5, 10, 10).await;
    let blob_before = test_blob(300);

    // Enter the epoch change to epoch 6 and prime the client's committee view.
    cluster.network.advance_epoch_with_sync();
    let blob_id_before = cluster.seed_blob(&blob_before, 0..10);
    for node in &cluster.nodes {
        node.set_status(
            &blob_id_before,
            BlobStatus::Permanent {
                end_epoch: 20,
                is_certified: true,
                initial_certified_epoch: Some(5),
            },
        );
    }
    let client = cluster.client();
    let read = client
        .read_blob(&blob_id_before)
        .await
        .expect("read during sync succeeds via the previous committee");
    assert_eq!(read, blob_before);

    // The chain moves on to epoch 7 while the client still caches epoch 6. A blob certified
    // at epoch 7 makes the cached view stale; the client resets and retries exactly once.
    cluster.network.advance_epoch_with_sync();
    let blob_after = test_blob(301);
    let blob_id_after = cluster.seed_blob(&blob_after, 0..10);
    for node in &cluster.nodes {
        node.set_status(
            &blob_id_after,
            BlobStatus::Permanent {
                end_epoch: 20,
                is_certified: true,
                initial_certified_epoch: Some(7),
            },
        );
    }

    let read = client
        .read_blob(&blob_id_after)
        .await
        .expect("read succeeds after one retry with a refreshed committee view");
    assert_eq!(read, blob_after);

    // Once the epoch change completes, reads go back to the current committee directly.
    cluster.network.finish_epoch_change();
    client.reset();
    let read = client
        .read_blob(&blob_id_before)
        .await
        .expect("read succeeds after the epoch change completes");
    assert_eq!(read, blob_before);
}

#[tokio::test]
async fn verified_blob_status_requires_validity_weight() {
    let cluster = TestCluster::start(1, 10, 10).await;
    let blob_id = walrus_core::test_utils::blob_id_from_u64(7);
    let certified = BlobStatus::Permanent {
        end_epoch: 9,
        is_certified: true,
        initial_certified_epoch: Some(1),
    };

    // Three nodes (30 shards) claim the blob is certified; 30 is below the validity
    // threshold, so the verified status stays `Nonexistent`.
    for node in &cluster.nodes[..3] {
        node.set_status(&blob_id, certified);
    }
    let client = cluster.client();
    let status = client
        .get_verified_blob_status(&blob_id)
        .await
        .expect("a verified status exists");
    assert_eq!(status, BlobStatus::Nonexistent);

    // A fourth node (40 shards total) pushes the certified status over the threshold; the
    // certified status outranks `Nonexistent`.
    cluster.nodes[3].set_status(&blob_id, certified);
    let status = client
        .get_verified_blob_status(&blob_id)
        .await
        .expect("a verified status exists");
    assert_eq!(status, certified);
}

#[tokio::test]
async fn storage_cost_is_deterministic() {
    let cluster = TestCluster::start(1, 10, 10).await;
    let client = cluster.client();

    let cost = client.storage_cost(1024, 3).await.expect("cost computes");
    let again = client.storage_cost(1024, 3).await.expect("cost computes");
    assert_eq!(cost, again);
    assert_eq!(cost.total(), cost.storage_cost + cost.write_cost);
    assert!(cost.storage_cost > 0);
}

#[tokio::test]
async fn blob_attributes_round_trip() {
    let cluster = TestCluster::start(1, 10, 10).await;
    let client = cluster.client();
    let result = client
        .reserve_and_store_blob(&test_blob(128), 2, BlobPersistence::Permanent)
        .await
        .expect("store succeeds");
    let blob_object = result.blob_object.id;

    assert!(client.read_blob_attributes(blob_object).await.expect("reads").is_none());

    client
        .write_blob_attribute(blob_object, "content-type", "application/octet-stream")
        .await
        .expect("attribute write succeeds");
    let attributes = client
        .read_blob_attributes(blob_object)
        .await
        .expect("reads")
        .expect("attributes exist");
    assert_eq!(attributes.get("content-type"), Some("application/octet-stream"));

    client
        .remove_blob_attribute(blob_object, "content-type")
        .await
        .expect("attribute removal succeeds");
    let attributes = client
        .read_blob_attributes(blob_object)
        .await
        .expect("reads")
        .expect("the attribute field still exists");
    assert!(attributes.get("content-type").is_none());
}

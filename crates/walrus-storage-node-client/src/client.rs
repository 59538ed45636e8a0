// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! The typed HTTP client for a single storage node.

use std::time::Duration;

use reqwest::{Client as ReqwestClient, ClientBuilder as ReqwestBuilder, Response};
use serde::de::DeserializeOwned;
use walrus_core::{
    BlobId, SliverPairIndex,
    encoding::{EncodingAxis, EncodingConfig, SliverData},
    ensure,
    messages::{BlobPersistenceType, SignedStorageConfirmation},
    metadata::{BlobMetadata, UnverifiedBlobMetadataWithId, VerifiedBlobMetadataWithId},
};

use crate::{
    NodeError,
    api::{BlobStatus, StoredOnNodeStatus},
    error::{ClientBuildError, Kind},
};

/// Error returned when a sliver received from a storage node fails verification against the
/// blob metadata.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SliverVerificationError {
    /// The sliver pair index is too large for the number of shards in the metadata.
    #[error("the sliver pair index is too large for the metadata")]
    PairIndexTooLarge,
    /// The sliver carries an unexpected sliver index.
    #[error("the sliver carries an unexpected sliver index")]
    IndexMismatch,
    /// The number of symbols in the sliver does not match the encoding configuration.
    #[error("the number of symbols in the sliver does not match the encoding configuration")]
    SliverSizeMismatch,
    /// The recomputed hash of the sliver does not match the hash stored in the metadata.
    #[error("the recomputed sliver hash does not match the metadata")]
    HashMismatch,
}

/// Builder for [`StorageNodeClient`].
#[derive(Debug, Default)]
pub struct StorageNodeClientBuilder {
    inner: Option<ReqwestBuilder>,
    request_timeout: Option<Duration>,
}

impl StorageNodeClientBuilder {
    /// Creates a new builder on top of an existing [`reqwest::ClientBuilder`].
    pub fn from_reqwest(inner: ReqwestBuilder) -> Self {
        Self {
            inner: Some(inner),
            ..Self::default()
        }
    }

    /// Sets the per-request timeout enforced by the transport.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Builds the client for a node reachable at the provided authority.
    ///
    /// The authority may carry an explicit scheme (used, e.g., in tests); otherwise `https` is
    /// assumed.
    pub fn build(self, address: &str) -> Result<StorageNodeClient, ClientBuildError> {
        if address.is_empty() {
            return Err(ClientBuildError::invalid_authority());
        }
        let base_url = if address.contains("://") {
            address.trim_end_matches('/').to_owned()
        } else {
            format!("https://{address}")
        };

        let mut builder = self.inner.unwrap_or_else(ReqwestClient::builder);
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        let inner = builder.build().map_err(ClientBuildError::reqwest)?;
        Ok(StorageNodeClient { inner, base_url })
    }
}

/// A client for a single storage node.
///
/// The client is stateless per call and cheap to clone; concurrent use is safe.
#[derive(Debug, Clone)]
pub struct StorageNodeClient {
    inner: ReqwestClient,
    base_url: String,
}

impl StorageNodeClient {
    /// Creates a builder for a [`StorageNodeClient`].
    pub fn builder() -> StorageNodeClientBuilder {
        StorageNodeClientBuilder::default()
    }

    // Read operations.

    /// Fetches the metadata of a blob.
    pub async fn get_metadata(&self, blob_id: &BlobId) -> Result<BlobMetadata, NodeError> {
        let response = self
            .inner
            .get(self.metadata_endpoint(blob_id))
            .send()
            .await
            .map_err(NodeError::reqwest)?;
        bcs_response(response).await
    }

    /// Fetches the metadata of a blob and verifies it against the blob ID.
    pub async fn get_and_verify_metadata(
        &self,
        blob_id: &BlobId,
        encoding_config: &EncodingConfig,
    ) -> Result<VerifiedBlobMetadataWithId, NodeError> {
        let metadata = self.get_metadata(blob_id).await?;
        UnverifiedBlobMetadataWithId::new(*blob_id, metadata)
            .verify(encoding_config)
            .map_err(NodeError::other)
    }

    /// Checks whether the metadata of a blob is stored on the node.
    pub async fn get_metadata_status(
        &self,
        blob_id: &BlobId,
    ) -> Result<StoredOnNodeStatus, NodeError> {
        let response = self
            .inner
            .get(format!("{}/status", self.metadata_endpoint(blob_id)))
            .send()
            .await
            .map_err(NodeError::reqwest)?;
        bcs_response(response).await
    }

    /// Fetches a sliver of the given axis.
    pub async fn get_sliver<A: EncodingAxis>(
        &self,
        blob_id: &BlobId,
        pair_index: SliverPairIndex,
    ) -> Result<SliverData<A>, NodeError> {
        let response = self
            .inner
            .get(self.sliver_endpoint::<A>(blob_id, pair_index))
            .send()
            .await
            .map_err(NodeError::reqwest)?;
        bcs_response(response).await
    }

    /// Fetches a sliver and verifies it against the blob metadata and encoding configuration.
    pub async fn get_and_verify_sliver<A: EncodingAxis>(
        &self,
        pair_index: SliverPairIndex,
        metadata: &VerifiedBlobMetadataWithId,
        encoding_config: &EncodingConfig,
    ) -> Result<SliverData<A>, NodeError> {
        let sliver = self
            .get_sliver::<A>(metadata.blob_id(), pair_index)
            .await?;
        verify_sliver(&sliver, pair_index, metadata, encoding_config)
            .map_err(NodeError::other)?;
        Ok(sliver)
    }

    /// Checks whether a sliver is stored on the node.
    pub async fn get_sliver_status<A: EncodingAxis>(
        &self,
        blob_id: &BlobId,
        pair_index: SliverPairIndex,
    ) -> Result<StoredOnNodeStatus, NodeError> {
        let response = self
            .inner
            .get(format!(
                "{}/status",
                self.sliver_endpoint::<A>(blob_id, pair_index)
            ))
            .send()
            .await
            .map_err(NodeError::reqwest)?;
        bcs_response(response).await
    }

    /// Fetches the status of a blob.
    pub async fn get_blob_status(&self, blob_id: &BlobId) -> Result<BlobStatus, NodeError> {
        let response = self
            .inner
            .get(format!("{}/v1/blobs/{blob_id}/status", self.base_url))
            .send()
            .await
            .map_err(NodeError::reqwest)?;
        bcs_response(response).await
    }

    /// Requests a signed storage confirmation for the blob.
    pub async fn get_confirmation(
        &self,
        blob_id: &BlobId,
        blob_persistence_type: &BlobPersistenceType,
    ) -> Result<SignedStorageConfirmation, NodeError> {
        let url = match blob_persistence_type {
            BlobPersistenceType::Permanent => {
                format!("{}/v1/blobs/{blob_id}/confirmation/permanent", self.base_url)
            }
            BlobPersistenceType::Deletable { object_id } => format!(
                "{}/v1/blobs/{blob_id}/confirmation/deletable?object_id={object_id}",
                self.base_url
            ),
        };
        let response = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(NodeError::reqwest)?;
        bcs_response(response).await
    }

    // Write operations.

    /// Stores the metadata of a blob on the node.
    pub async fn store_metadata(
        &self,
        metadata: &VerifiedBlobMetadataWithId,
    ) -> Result<(), NodeError> {
        let body =
            bcs::to_bytes(metadata.metadata()).map_err(|error| NodeError::from(Kind::Bcs(error)))?;
        let response = self
            .inner
            .put(self.metadata_endpoint(metadata.blob_id()))
            .body(body)
            .send()
            .await
            .map_err(NodeError::reqwest)?;
        empty_response(response).await
    }

    /// Stores a sliver on the node.
    pub async fn store_sliver<A: EncodingAxis>(
        &self,
        blob_id: &BlobId,
        pair_index: SliverPairIndex,
        sliver: &SliverData<A>,
    ) -> Result<(), NodeError> {
        let body = bcs::to_bytes(sliver).map_err(|error| NodeError::from(Kind::Bcs(error)))?;
        let response = self
            .inner
            .put(self.sliver_endpoint::<A>(blob_id, pair_index))
            .body(body)
            .send()
            .await
            .map_err(NodeError::reqwest)?;
        empty_response(response).await
    }

    // Endpoints.

    fn metadata_endpoint(&self, blob_id: &BlobId) -> String {
        format!("{}/v1/blobs/{blob_id}/metadata", self.base_url)
    }

    fn sliver_endpoint<A: EncodingAxis>(
        &self,
        blob_id: &BlobId,
        pair_index: SliverPairIndex,
    ) -> String {
        format!(
            "{}/v1/blobs/{blob_id}/slivers/{pair_index}/{}",
            self.base_url,
            A::NAME,
        )
    }
}

/// Checks that the provided sliver matches the corresponding hash in the metadata.
fn verify_sliver<A: EncodingAxis>(
    sliver: &SliverData<A>,
    pair_index: SliverPairIndex,
    metadata: &VerifiedBlobMetadataWithId,
    encoding_config: &EncodingConfig,
) -> Result<(), SliverVerificationError> {
    let pair_metadata = metadata
        .metadata()
        .hashes
        .get(usize::from(pair_index.0))
        .ok_or(SliverVerificationError::PairIndexTooLarge)?;

    let expected_index = if A::IS_PRIMARY {
        pair_index.0
    } else {
        encoding_config.n_shards().get() - pair_index.0 - 1
    };
    ensure!(
        sliver.index.0 == expected_index,
        SliverVerificationError::IndexMismatch
    );
    ensure!(
        sliver.symbols.n_symbols()
            == usize::from(
                encoding_config
                    .n_source_symbols::<A::OrthogonalAxis>()
                    .get()
            ),
        SliverVerificationError::SliverSizeMismatch
    );
    ensure!(
        sliver.hash() == *pair_metadata.hash::<A>(),
        SliverVerificationError::HashMismatch
    );
    Ok(())
}

async fn check_status(response: Response) -> Result<Response, NodeError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let message = response.text().await.unwrap_or_default();
        tracing::debug!(%status, "storage node replied with an error status");
        Err(NodeError::status(status, message))
    }
}

async fn bcs_response<T: DeserializeOwned>(response: Response) -> Result<T, NodeError> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await.map_err(NodeError::reqwest)?;
    bcs::from_bytes(&bytes).map_err(|error| NodeError::from(Kind::Bcs(error)))
}

async fn empty_response(response: Response) -> Result<(), NodeError> {
    check_status(response).await?;
    Ok(())
}

// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Errors returned by the Walrus client.

use walrus_core::{BlobId, Epoch};
use walrus_storage_node_client::ClientBuildError;
use walrus_sui::client::SuiClientError;

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// An error returned by the Walrus client.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ClientError {
    #[from]
    kind: ClientErrorKind,
}

impl ClientError {
    /// The kind of the error.
    pub fn kind(&self) -> &ClientErrorKind {
        &self.kind
    }

    /// Returns true if the error may be resolved by refreshing the committee view and
    /// retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ClientErrorKind::BehindCurrentEpoch { .. })
    }

    /// Creates a [`ClientError`] from an arbitrary error for client-side misuse or unexpected
    /// collaborator behavior.
    pub fn other<E>(error: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        ClientErrorKind::WalrusClient(error.into()).into()
    }
}

impl From<SuiClientError> for ClientError {
    fn from(error: SuiClientError) -> Self {
        ClientErrorKind::WalrusClient(error.into()).into()
    }
}

/// The closed set of error conditions surfaced by the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientErrorKind {
    /// The client's view of the committees is older than the blob's certification epoch.
    ///
    /// Retryable: resetting the committee cache and retrying resolves this unless the chain
    /// view itself is stale.
    #[error(
        "the client is at epoch {client_epoch} but the blob was certified at epoch \
        {certified_epoch}; the committee view is stale"
    )]
    BehindCurrentEpoch {
        /// The epoch of the client's committee view.
        client_epoch: Epoch,
        /// The certification epoch of the blob.
        certified_epoch: Epoch,
    },
    /// A quorum of shards authoritatively does not store the blob.
    #[error("blob {0} has not been certified on Walrus")]
    BlobNotCertified(BlobId),
    /// A quorum of shards refuses to serve the blob, predominantly for legal reasons.
    #[error("blob {0} is blocked and cannot be read")]
    BlobBlocked(BlobId),
    /// The reconstructed blob re-hashes to a different blob ID.
    #[error("the decoded blob is inconsistent with blob ID {0}")]
    InconsistentBlob(BlobId),
    /// Too few slivers could be retrieved to reconstruct the blob.
    #[error("not enough slivers were received to reconstruct the blob")]
    NotEnoughSliversReceived,
    /// No node returned valid blob metadata.
    #[error("no valid blob metadata was received from the storage nodes")]
    NoBlobMetadataReceived,
    /// No node returned a blob status.
    #[error("no blob status was received from the storage nodes")]
    NoBlobStatusReceived,
    /// No blob status is supported by enough shard weight to be trustworthy.
    #[error("no blob status could be verified against a validity threshold of shards")]
    NoVerifiedBlobStatusReceived,
    /// Fewer than a quorum of shards returned a valid storage confirmation.
    #[error(
        "too few valid blob confirmations were retrieved (obtained {obtained}, require \
        {required})"
    )]
    NotEnoughBlobConfirmations {
        /// The shard weight of the valid confirmations obtained.
        obtained: usize,
        /// The required quorum weight.
        required: usize,
    },
    /// The operation was canceled through the caller's cancellation token.
    #[error("the operation was aborted by the caller")]
    UserAbort,
    /// The committee has no members to communicate with.
    #[error("the committee is empty")]
    EmptyCommittee,
    /// No storage-node client could be constructed for any committee member.
    #[error("unable to establish a connection to any storage node: {0}")]
    AllConnectionsFailed(#[source] ClientBuildError),
    /// Generic client-side misuse, misconfiguration, or unexpected collaborator behavior.
    #[error("walrus client error: {0}")]
    WalrusClient(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_stale_epoch_errors_are_retryable() {
        let stale = ClientError::from(ClientErrorKind::BehindCurrentEpoch {
            client_epoch: 3,
            certified_epoch: 4,
        });
        assert!(stale.is_retryable());

        let blocked = ClientError::from(ClientErrorKind::BlobBlocked(BlobId::ZERO));
        assert!(!blocked.is_retryable());
        assert!(!ClientError::other(anyhow::anyhow!("misuse")).is_retryable());
    }
}

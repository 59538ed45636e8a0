// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Blob metadata: the per-sliver-pair hashes from which the blob ID is derived.

use fastcrypto::hash::{Blake2b256, HashFunction};
use serde::{Deserialize, Serialize};

use crate::{
    BlobId, EncodingType, ensure,
    encoding::{EncodingAxis, EncodingConfig},
    merkle::{self, DIGEST_LEN, Node},
};

/// The hashes of the primary and secondary sliver of a single sliver pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliverPairMetadata {
    /// The hash of the primary sliver.
    pub primary_hash: Node,
    /// The hash of the secondary sliver.
    pub secondary_hash: Node,
}

impl SliverPairMetadata {
    /// Returns the hash for the sliver of the given [`EncodingAxis`].
    pub fn hash<A: EncodingAxis>(&self) -> &Node {
        if A::IS_PRIMARY {
            &self.primary_hash
        } else {
            &self.secondary_hash
        }
    }
}

/// The metadata of a blob, consisting of the per-pair sliver hashes and the unencoded length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    /// The type of the encoding that produced the sliver hashes.
    pub encoding_type: EncodingType,
    /// The length of the unencoded blob in bytes.
    pub unencoded_length: u64,
    /// The sliver hashes, ordered by sliver pair index.
    pub hashes: Vec<SliverPairMetadata>,
}

impl BlobMetadata {
    /// Creates a new [`BlobMetadata`].
    pub fn new(
        encoding_type: EncodingType,
        unencoded_length: u64,
        hashes: Vec<SliverPairMetadata>,
    ) -> Self {
        Self {
            encoding_type,
            unencoded_length,
            hashes,
        }
    }

    /// Computes the Merkle root over the per-pair sliver hashes.
    ///
    /// This is the root hash recorded on chain when the blob is registered.
    pub fn compute_root_hash(&self) -> Node {
        merkle::merkle_root(self.hashes.iter().map(|pair| {
            let mut leaf = Vec::with_capacity(2 * DIGEST_LEN);
            leaf.extend_from_slice(&pair.primary_hash.bytes());
            leaf.extend_from_slice(&pair.secondary_hash.bytes());
            leaf
        }))
    }
}

impl BlobId {
    /// Derives the blob ID as the Blake2b-256 hash of the BCS-encoded metadata.
    pub fn from_sliver_pair_metadata(metadata: &BlobMetadata) -> Self {
        let encoded = bcs::to_bytes(metadata).expect("trusted in-memory value can be serialized");
        Self(Blake2b256::digest(&encoded).digest)
    }
}

/// Errors returned when verifying [`UnverifiedBlobMetadataWithId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// The number of sliver hashes does not match the number of shards.
    #[error("the metadata contains {actual} sliver hashes, expected {expected}")]
    UnexpectedNumberOfHashes {
        /// The number of hashes in the metadata.
        actual: usize,
        /// The number of shards of the encoding configuration.
        expected: usize,
    },
    /// The unencoded length is too large for the encoding configuration.
    #[error("the unencoded length {0} cannot be encoded")]
    UnencodedLengthTooLarge(u64),
    /// The recomputed blob ID does not match the claimed one.
    #[error("the blob ID does not match the metadata")]
    BlobIdMismatch,
}

/// Blob metadata received from a storage node, not yet checked against its blob ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnverifiedBlobMetadataWithId {
    blob_id: BlobId,
    metadata: BlobMetadata,
}

impl UnverifiedBlobMetadataWithId {
    /// Creates a new unverified metadata with the given blob ID.
    pub fn new(blob_id: BlobId, metadata: BlobMetadata) -> Self {
        Self { blob_id, metadata }
    }

    /// The claimed blob ID.
    pub fn blob_id(&self) -> &BlobId {
        &self.blob_id
    }

    /// The contained metadata.
    pub fn metadata(&self) -> &BlobMetadata {
        &self.metadata
    }

    /// Verifies the metadata against the encoding configuration and the claimed blob ID.
    pub fn verify(
        self,
        encoding_config: &EncodingConfig,
    ) -> Result<VerifiedBlobMetadataWithId, VerificationError> {
        let expected = usize::from(encoding_config.n_shards().get());
        ensure!(
            self.metadata.hashes.len() == expected,
            VerificationError::UnexpectedNumberOfHashes {
                actual: self.metadata.hashes.len(),
                expected,
            }
        );
        ensure!(
            encoding_config
                .symbol_size_for_blob(self.metadata.unencoded_length)
                .is_some(),
            VerificationError::UnencodedLengthTooLarge(self.metadata.unencoded_length)
        );
        ensure!(
            BlobId::from_sliver_pair_metadata(&self.metadata) == self.blob_id,
            VerificationError::BlobIdMismatch
        );
        Ok(VerifiedBlobMetadataWithId {
            blob_id: self.blob_id,
            metadata: self.metadata,
        })
    }
}

/// Blob metadata that has been verified against its blob ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedBlobMetadataWithId {
    blob_id: BlobId,
    metadata: BlobMetadata,
}

impl VerifiedBlobMetadataWithId {
    /// Creates a verified metadata without performing verification.
    ///
    /// The caller is responsible for the consistency of the blob ID and the metadata.
    pub fn new_verified_unchecked(blob_id: BlobId, metadata: BlobMetadata) -> Self {
        Self { blob_id, metadata }
    }

    /// The blob ID of the metadata.
    pub fn blob_id(&self) -> &BlobId {
        &self.blob_id
    }

    /// The contained metadata.
    pub fn metadata(&self) -> &BlobMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use core::num::NonZeroU16;

    use super::*;

    fn metadata_for_testing(n_shards: u16) -> BlobMetadata {
        let hashes = (0..n_shards)
            .map(|i| {
                let byte = u8::try_from(i % 251).expect("fits into a u8");
                SliverPairMetadata {
                    primary_hash: Node::Digest([byte; 32]),
                    secondary_hash: Node::Digest([byte.wrapping_add(1); 32]),
                }
            })
            .collect();
        BlobMetadata::new(EncodingType::RS2, 62_831, hashes)
    }

    #[test]
    fn verify_accepts_consistent_metadata() {
        let config = EncodingConfig::new(NonZeroU16::new(10).expect("positive"));
        let metadata = metadata_for_testing(10);
        let blob_id = BlobId::from_sliver_pair_metadata(&metadata);
        let verified = UnverifiedBlobMetadataWithId::new(blob_id, metadata)
            .verify(&config)
            .expect("consistent metadata verifies");
        assert_eq!(verified.blob_id(), &blob_id);
    }

    #[test]
    fn verify_rejects_wrong_blob_id() {
        let config = EncodingConfig::new(NonZeroU16::new(10).expect("positive"));
        let metadata = metadata_for_testing(10);
        let mut wrong_id = BlobId::from_sliver_pair_metadata(&metadata);
        wrong_id.0[0] ^= 1;
        assert_eq!(
            UnverifiedBlobMetadataWithId::new(wrong_id, metadata).verify(&config),
            Err(VerificationError::BlobIdMismatch)
        );
    }

    #[test]
    fn verify_rejects_wrong_number_of_hashes() {
        let config = EncodingConfig::new(NonZeroU16::new(11).expect("positive"));
        let metadata = metadata_for_testing(10);
        let blob_id = BlobId::from_sliver_pair_metadata(&metadata);
        assert!(matches!(
            UnverifiedBlobMetadataWithId::new(blob_id, metadata).verify(&config),
            Err(VerificationError::UnexpectedNumberOfHashes {
                actual: 10,
                expected: 11,
            })
        ));
    }

    #[test]
    fn blob_id_changes_with_metadata() {
        let metadata = metadata_for_testing(10);
        let mut modified = metadata.clone();
        modified.unencoded_length += 1;
        assert_ne!(
            BlobId::from_sliver_pair_metadata(&metadata),
            BlobId::from_sliver_pair_metadata(&modified),
        );
    }
}

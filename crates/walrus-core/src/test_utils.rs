// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

// Allowing `unwrap`s in test utils.
#![allow(clippy::unwrap_used)]

//! Utility functions and fixtures for tests.

use core::num::NonZeroU16;

use rand::{RngCore, SeedableRng, rngs::StdRng};

use crate::{
    BlobId, EncodingType, SliverIndex,
    encoding::{
        BlobCodec, DecodeError, EncodeError, EncodingConfig, PrimarySliver, SliverData,
        SliverPair, Symbols,
    },
    keys::ProtocolKeyPair,
    metadata::{BlobMetadata, SliverPairMetadata, VerifiedBlobMetadataWithId},
};

/// Returns a deterministic protocol key pair for testing, parameterized by a seed.
pub fn protocol_key_pair(seed: u64) -> ProtocolKeyPair {
    ProtocolKeyPair::generate_with_rng(&mut StdRng::seed_from_u64(seed))
}

/// Returns a random blob ID for testing.
pub fn random_blob_id() -> BlobId {
    let mut bytes = [0; BlobId::LENGTH];
    rand::thread_rng().fill_bytes(&mut bytes);
    BlobId(bytes)
}

/// Returns the blob ID with the given number in its trailing bytes.
pub const fn blob_id_from_u64(num: u64) -> BlobId {
    let mut blob_id = [0u8; 32];
    let u64_bytes = num.to_be_bytes();

    let mut i = 0usize;
    while i < 8 {
        blob_id[24 + i] = u64_bytes[i];
        i += 1;
    }
    BlobId(blob_id)
}

/// A trivial [`BlobCodec`] for tests that replicates the blob into every primary sliver.
///
/// It honors the codec contract observable by the client: decoding requires at least
/// `n_primary_source_symbols` distinct primary slivers, sliver hashes match the metadata, and
/// the blob ID is deterministic in the blob contents.
#[derive(Debug, Clone)]
pub struct ReplicationCodec {
    config: EncodingConfig,
}

impl ReplicationCodec {
    /// Creates a new codec for the given number of shards.
    pub fn new(n_shards: NonZeroU16) -> Self {
        Self {
            config: EncodingConfig::new(n_shards),
        }
    }

    fn padded_symbols(&self, blob: &[u8], n_symbols: u16) -> Result<Symbols, EncodeError> {
        let symbol_size = u64::try_from(blob.len())
            .expect("usize fits into a u64")
            .max(1)
            .div_ceil(u64::from(n_symbols));
        let symbol_size = NonZeroU16::new(
            u16::try_from(symbol_size)
                .map_err(|_| EncodeError::DataTooLarge(blob.len() as u64))?,
        )
        .expect("size is at least 1");

        let mut data = blob.to_vec();
        data.resize(usize::from(n_symbols) * usize::from(symbol_size.get()), 0);
        Ok(Symbols::new(data, symbol_size))
    }
}

impl BlobCodec for ReplicationCodec {
    fn encoding_config(&self) -> &EncodingConfig {
        &self.config
    }

    fn encode_with_metadata(
        &self,
        blob: &[u8],
    ) -> Result<(Vec<SliverPair>, VerifiedBlobMetadataWithId), EncodeError> {
        let n_shards = self.config.n_shards().get();
        let primary_symbols =
            self.padded_symbols(blob, self.config.n_secondary_source_symbols().get())?;
        let secondary_symbols =
            self.padded_symbols(blob, self.config.n_primary_source_symbols().get())?;

        let pairs: Vec<SliverPair> = (0..n_shards)
            .map(|i| SliverPair {
                primary: SliverData::new(SliverIndex(i), primary_symbols.clone()),
                secondary: SliverData::new(
                    SliverIndex(n_shards - i - 1),
                    secondary_symbols.clone(),
                ),
            })
            .collect();

        let hashes = pairs
            .iter()
            .map(|pair| SliverPairMetadata {
                primary_hash: pair.primary.hash(),
                secondary_hash: pair.secondary.hash(),
            })
            .collect();
        let metadata = BlobMetadata::new(EncodingType::RS2, blob.len() as u64, hashes);
        let blob_id = BlobId::from_sliver_pair_metadata(&metadata);

        Ok((
            pairs,
            VerifiedBlobMetadataWithId::new_verified_unchecked(blob_id, metadata),
        ))
    }

    fn compute_metadata(&self, blob: &[u8]) -> Result<VerifiedBlobMetadataWithId, EncodeError> {
        let (_, metadata) = self.encode_with_metadata(blob)?;
        Ok(metadata)
    }

    fn decode_primary_slivers(
        &self,
        unencoded_length: u64,
        slivers: Vec<PrimarySliver>,
    ) -> Result<Vec<u8>, DecodeError> {
        let required = usize::from(self.config.n_primary_source_symbols().get());
        let mut indices: Vec<_> = slivers.iter().map(|sliver| sliver.index).collect();
        indices.sort_unstable();
        indices.dedup();
        if indices.len() < required {
            return Err(DecodeError::NotEnoughSlivers {
                received: indices.len(),
                required,
            });
        }

        let sliver = slivers
            .into_iter()
            .next()
            .expect("at least `required` slivers");
        let unencoded_length =
            usize::try_from(unencoded_length).map_err(|_| DecodeError::DecodingFailed)?;
        if sliver.len() < unencoded_length {
            return Err(DecodeError::DecodingFailed);
        }
        let mut data = sliver.symbols.into_data();
        data.truncate(unencoded_length);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips() {
        let codec = ReplicationCodec::new(NonZeroU16::new(10).unwrap());
        let blob: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();

        let (pairs, metadata) = codec.encode_with_metadata(&blob).unwrap();
        assert_eq!(pairs.len(), 10);

        let required = usize::from(codec.encoding_config().n_primary_source_symbols().get());
        let primary: Vec<_> = pairs
            .into_iter()
            .take(required)
            .map(|pair| pair.primary)
            .collect();
        let decoded = codec
            .decode_primary_slivers(metadata.metadata().unencoded_length, primary)
            .unwrap();
        assert_eq!(decoded, blob);
    }

    #[test]
    fn decoding_requires_distinct_slivers() {
        let codec = ReplicationCodec::new(NonZeroU16::new(10).unwrap());
        let (pairs, metadata) = codec.encode_with_metadata(b"some blob").unwrap();

        let repeated: Vec<_> = core::iter::repeat(pairs[0].primary.clone()).take(4).collect();
        assert!(matches!(
            codec.decode_primary_slivers(metadata.metadata().unencoded_length, repeated),
            Err(DecodeError::NotEnoughSlivers {
                received: 1,
                required: 4,
            })
        ));
    }

    #[test]
    fn metadata_is_deterministic_in_the_blob() {
        let codec = ReplicationCodec::new(NonZeroU16::new(10).unwrap());
        let id_a = *codec.compute_metadata(b"blob a").unwrap().blob_id();
        let id_b = *codec.compute_metadata(b"blob a").unwrap().blob_id();
        let id_c = *codec.compute_metadata(b"blob c").unwrap().blob_id();
        assert_eq!(id_a, id_b);
        assert_ne!(id_a, id_c);
    }
}

// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Sliver types, encoding bookkeeping, and the codec interface consumed by the client.
//!
//! The concrete erasure code is provided externally through the [`BlobCodec`] trait; this module
//! only fixes the shapes the client needs: how many source symbols exist per axis, how slivers
//! are addressed, and how the encoded size of a blob is computed for pricing.

use core::{fmt, marker::PhantomData, num::NonZeroU16};

use serde::{Deserialize, Serialize};

use crate::{
    SliverIndex, SliverType, bft,
    merkle::{self, DIGEST_LEN, Node},
    metadata::VerifiedBlobMetadataWithId,
};

/// Marker trait to indicate the encoding axis (primary or secondary).
pub trait EncodingAxis:
    Clone + Copy + PartialEq + Eq + Default + fmt::Debug + Send + Sync + 'static
{
    /// The complementary encoding axis.
    type OrthogonalAxis: EncodingAxis;
    /// Whether this corresponds to the primary (true) or secondary (false) encoding.
    const IS_PRIMARY: bool;
    /// String representation of this type.
    const NAME: &'static str;

    /// The associated [`SliverType`].
    fn sliver_type() -> SliverType {
        SliverType::for_encoding::<Self>()
    }
}

/// Marker type to indicate the primary encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Primary;
impl EncodingAxis for Primary {
    type OrthogonalAxis = Secondary;
    const IS_PRIMARY: bool = true;
    const NAME: &'static str = "primary";
}

/// Marker type to indicate the secondary encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Secondary;
impl EncodingAxis for Secondary {
    type OrthogonalAxis = Primary;
    const IS_PRIMARY: bool = false;
    const NAME: &'static str = "secondary";
}

/// A flat buffer of equally-sized symbols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbols {
    data: Vec<u8>,
    symbol_size: NonZeroU16,
}

impl Symbols {
    /// Creates a new `Symbols` buffer.
    ///
    /// The length of `data` must be a multiple of `symbol_size`.
    pub fn new(data: Vec<u8>, symbol_size: NonZeroU16) -> Self {
        debug_assert!(data.len() % usize::from(symbol_size.get()) == 0);
        Self { data, symbol_size }
    }

    /// The number of symbols in the buffer.
    pub fn n_symbols(&self) -> usize {
        self.data.len() / usize::from(self.symbol_size.get())
    }

    /// The size of each symbol in bytes.
    pub fn symbol_size(&self) -> NonZeroU16 {
        self.symbol_size
    }

    /// The underlying bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the buffer and returns the underlying bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Returns an iterator over the individual symbols.
    pub fn to_symbols(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(usize::from(self.symbol_size.get()))
    }
}

/// A sliver of an erasure-encoded blob along one [`EncodingAxis`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliverData<A: EncodingAxis> {
    /// The index of this sliver within its axis.
    pub index: SliverIndex,
    /// The symbols of the sliver.
    pub symbols: Symbols,
    #[serde(skip)]
    _axis: PhantomData<A>,
}

impl<A: EncodingAxis> SliverData<A> {
    /// Creates a new sliver from the provided symbols.
    pub fn new(index: SliverIndex, symbols: Symbols) -> Self {
        Self {
            index,
            symbols,
            _axis: PhantomData,
        }
    }

    /// The length of the sliver in bytes.
    pub fn len(&self) -> usize {
        self.symbols.data().len()
    }

    /// Returns true iff the sliver contains no symbols.
    pub fn is_empty(&self) -> bool {
        self.symbols.data().is_empty()
    }

    /// Computes the Merkle root over the symbols of this sliver.
    ///
    /// This is the per-sliver hash recorded in the blob metadata.
    pub fn hash(&self) -> Node {
        merkle::merkle_root(self.symbols.to_symbols())
    }
}

/// A primary sliver.
pub type PrimarySliver = SliverData<Primary>;
/// A secondary sliver.
pub type SecondarySliver = SliverData<Secondary>;

/// A sliver of an erasure-encoded blob along either axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sliver {
    /// A primary sliver.
    Primary(PrimarySliver),
    /// A secondary sliver.
    Secondary(SecondarySliver),
}

impl Sliver {
    /// Returns the [`SliverType`] of this sliver.
    pub fn r#type(&self) -> SliverType {
        match self {
            Sliver::Primary(_) => SliverType::Primary,
            Sliver::Secondary(_) => SliverType::Secondary,
        }
    }
}

/// Error returned when converting a [`Sliver`] to the wrong axis-specific sliver type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("the sliver is not of the expected variant")]
pub struct WrongSliverVariantError;

impl TryFrom<Sliver> for PrimarySliver {
    type Error = WrongSliverVariantError;

    fn try_from(sliver: Sliver) -> Result<Self, Self::Error> {
        match sliver {
            Sliver::Primary(inner) => Ok(inner),
            Sliver::Secondary(_) => Err(WrongSliverVariantError),
        }
    }
}

impl TryFrom<Sliver> for SecondarySliver {
    type Error = WrongSliverVariantError;

    fn try_from(sliver: Sliver) -> Result<Self, Self::Error> {
        match sliver {
            Sliver::Primary(_) => Err(WrongSliverVariantError),
            Sliver::Secondary(inner) => Ok(inner),
        }
    }
}

/// A pair of a primary and a secondary sliver, stored together on a single shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliverPair {
    /// The primary sliver.
    pub primary: PrimarySliver,
    /// The secondary sliver.
    pub secondary: SecondarySliver,
}

impl SliverPair {
    /// The index of this sliver pair.
    pub fn index(&self) -> crate::SliverPairIndex {
        crate::SliverPairIndex(self.primary.index.0)
    }
}

/// Configuration of the blob encoding for a fixed number of shards.
///
/// Fixes the BFT-derived source-symbol counts and the deterministic encoded-size computation;
/// the actual encoding and decoding is performed by a [`BlobCodec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingConfig {
    n_shards: NonZeroU16,
}

impl EncodingConfig {
    /// Creates a new [`EncodingConfig`] for the given number of shards.
    pub fn new(n_shards: NonZeroU16) -> Self {
        Self { n_shards }
    }

    /// The total number of shards.
    pub fn n_shards(&self) -> NonZeroU16 {
        self.n_shards
    }

    /// The number of primary source symbols, i.e., the minimum number of distinct primary
    /// slivers required to reconstruct a blob.
    pub fn n_primary_source_symbols(&self) -> NonZeroU16 {
        NonZeroU16::new(self.n_shards.get() - 2 * bft::max_n_faulty(self.n_shards))
            .expect("`n - 2 * (n-1)/3` is at least 1")
    }

    /// The number of secondary source symbols.
    pub fn n_secondary_source_symbols(&self) -> NonZeroU16 {
        NonZeroU16::new(self.n_shards.get() - bft::max_n_faulty(self.n_shards))
            .expect("`n - (n-1)/3` is at least 1")
    }

    /// The number of source symbols of the given [`EncodingAxis`].
    ///
    /// A sliver of axis `A` consists of `n_source_symbols::<A::OrthogonalAxis>()` symbols.
    pub fn n_source_symbols<A: EncodingAxis>(&self) -> NonZeroU16 {
        if A::IS_PRIMARY {
            self.n_primary_source_symbols()
        } else {
            self.n_secondary_source_symbols()
        }
    }

    /// The number of source symbols of the full two-dimensional encoding.
    pub fn source_symbols_per_blob(&self) -> u64 {
        u64::from(self.n_primary_source_symbols().get())
            * u64::from(self.n_secondary_source_symbols().get())
    }

    /// The symbol size for a blob of `unencoded_length` bytes, or `None` if the blob is too
    /// large to be encoded with this configuration.
    pub fn symbol_size_for_blob(&self, unencoded_length: u64) -> Option<NonZeroU16> {
        let size = unencoded_length
            .max(1)
            .div_ceil(self.source_symbols_per_blob());
        NonZeroU16::new(u16::try_from(size).ok()?)
    }

    /// The total encoded length of a blob of `unencoded_length` bytes across all shards,
    /// including the replicated metadata, or `None` if the blob is too large.
    pub fn encoded_blob_length(&self, unencoded_length: u64) -> Option<u64> {
        let symbol_size = u64::from(self.symbol_size_for_blob(unencoded_length)?.get());
        let slivers_per_shard = u64::from(self.n_primary_source_symbols().get())
            + u64::from(self.n_secondary_source_symbols().get());
        Some(u64::from(self.n_shards.get()) * (slivers_per_shard * symbol_size + 2 * DIGEST_LEN as u64))
    }
}

/// Errors that can occur while encoding a blob.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// The blob is too large to be encoded with the given configuration.
    #[error("the blob is too large to be encoded ({0} bytes)")]
    DataTooLarge(u64),
}

/// Errors that can occur while decoding a blob from its slivers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Too few distinct slivers were provided to reconstruct the blob.
    #[error("not enough distinct slivers to reconstruct the blob (received {received}, require {required})")]
    NotEnoughSlivers {
        /// The number of distinct slivers provided.
        received: usize,
        /// The number of distinct slivers required.
        required: usize,
    },
    /// The provided slivers are inconsistent with each other or with the blob parameters.
    #[error("the provided slivers could not be decoded")]
    DecodingFailed,
}

/// The codec used to encode and decode blobs.
///
/// Implementations provide the concrete erasure code; the client treats this purely as a
/// collaborator and only relies on the contract that decoding succeeds with at least
/// [`EncodingConfig::n_primary_source_symbols`] distinct primary slivers.
pub trait BlobCodec: fmt::Debug + Send + Sync {
    /// The encoding configuration used by this codec.
    fn encoding_config(&self) -> &EncodingConfig;

    /// Encodes the blob into one sliver pair per shard and computes its verified metadata,
    /// including the blob ID.
    fn encode_with_metadata(
        &self,
        blob: &[u8],
    ) -> Result<(Vec<SliverPair>, VerifiedBlobMetadataWithId), EncodeError>;

    /// Computes the verified metadata (and thereby the blob ID) of a blob without keeping the
    /// encoded slivers.
    fn compute_metadata(&self, blob: &[u8]) -> Result<VerifiedBlobMetadataWithId, EncodeError>;

    /// Reconstructs the blob from at least `n_primary_source_symbols` distinct primary slivers.
    fn decode_primary_slivers(
        &self,
        unencoded_length: u64,
        slivers: Vec<PrimarySliver>,
    ) -> Result<Vec<u8>, DecodeError>;
}

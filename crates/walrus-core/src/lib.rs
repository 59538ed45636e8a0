// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Core functionality for Walrus.

use core::{fmt, num::NonZeroU16, str::FromStr};

use base64::{Engine, display::Base64Display, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

pub mod bft;
pub mod encoding;
pub mod keys;
pub mod merkle;
pub mod messages;
pub mod metadata;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use encoding::{Sliver, SliverData};
pub use keys::{ProtocolKeyPair, PublicKey};

/// The epoch number.
pub type Epoch = u32;

/// A count of epochs, e.g., the lifetime of a blob measured in epochs.
pub type EpochCount = u32;

/// Ensures that a condition holds, otherwise returns early with the provided error.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr $(,)?) => {
        if !$cond {
            return Err($err.into());
        }
    };
}

/// A unique identifier for a blob stored on Walrus.
///
/// Derived from the Blake2b-256 hash of the BCS-encoded blob metadata, so the mapping from blob
/// contents to blob ID is deterministic for a fixed number of shards.
///
/// Serialized as the raw 32 bytes in binary formats and as URL-safe base64 in human-readable
/// ones.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlobId(pub [u8; Self::LENGTH]);

impl Serialize for BlobId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for BlobId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let string = String::deserialize(deserializer)?;
            string.parse().map_err(serde::de::Error::custom)
        } else {
            Ok(Self(<[u8; Self::LENGTH]>::deserialize(deserializer)?))
        }
    }
}

impl BlobId {
    /// The length of a blob ID in bytes.
    pub const LENGTH: usize = 32;

    /// The blob ID consisting of all zeros.
    pub const ZERO: Self = Self([0; Self::LENGTH]);

    /// Returns the rotation that the blob ID imposes on the mapping from sliver pairs to shards.
    fn shard_rotation(&self, n_shards: NonZeroU16) -> u16 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.0[..8]);
        u16::try_from(u64::from_le_bytes(bytes) % u64::from(n_shards.get()))
            .expect("the modulus is at most `u16::MAX`")
    }
}

impl AsRef<[u8]> for BlobId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Base64Display::new(self.as_ref(), &URL_SAFE_NO_PAD).fmt(f)
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({self})")
    }
}

/// Error returned when unable to parse a blob ID.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("unable to parse the blob ID")]
pub struct BlobIdParseError;

impl TryFrom<&[u8]> for BlobId {
    type Error = BlobIdParseError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes = <[u8; Self::LENGTH]>::try_from(value).map_err(|_| BlobIdParseError)?;
        Ok(Self(bytes))
    }
}

impl FromStr for BlobId {
    type Err = BlobIdParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut blob_id = Self([0; Self::LENGTH]);
        if let Ok(Self::LENGTH) = URL_SAFE_NO_PAD.decode_slice(input, &mut blob_id.0) {
            Ok(blob_id)
        } else {
            Err(BlobIdParseError)
        }
    }
}

/// The ID of an object on Sui.
///
/// Serialized as the raw 32 bytes in binary formats and as a `0x`-prefixed hex literal in
/// human-readable ones.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SuiObjectId(pub [u8; Self::LENGTH]);

impl Serialize for SuiObjectId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for SuiObjectId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let string = String::deserialize(deserializer)?;
            string.parse().map_err(serde::de::Error::custom)
        } else {
            Ok(Self(<[u8; Self::LENGTH]>::deserialize(deserializer)?))
        }
    }
}

impl SuiObjectId {
    /// The length of an object ID in bytes.
    pub const LENGTH: usize = 32;
}

impl AsRef<[u8]> for SuiObjectId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for SuiObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for SuiObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SuiObjectId({self})")
    }
}

/// Error returned when unable to parse an object ID.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("unable to parse the object ID")]
pub struct SuiObjectIdParseError;

impl FromStr for SuiObjectId {
    type Err = SuiObjectIdParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let hex = input.strip_prefix("0x").ok_or(SuiObjectIdParseError)?;
        ensure!(hex.len() == 2 * Self::LENGTH, SuiObjectIdParseError);
        let mut bytes = [0u8; Self::LENGTH];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let chunk = core::str::from_utf8(chunk).map_err(|_| SuiObjectIdParseError)?;
            bytes[i] = u8::from_str_radix(chunk, 16).map_err(|_| SuiObjectIdParseError)?;
        }
        Ok(Self(bytes))
    }
}

/// Represents the index of a shard.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ShardIndex(pub u16);

impl fmt::Display for ShardIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard-{}", self.0)
    }
}

impl ShardIndex {
    /// Returns an iterator over the shard indices in the range `0..n`.
    pub fn range(n: u16) -> impl Iterator<Item = Self> {
        (0..n).map(Self)
    }

    /// Returns the index of the sliver pair stored at this shard for the given blob.
    ///
    /// This is the inverse of [`SliverPairIndex::to_shard_index`].
    pub fn to_pair_index(self, n_shards: NonZeroU16, blob_id: &BlobId) -> SliverPairIndex {
        let n = u32::from(n_shards.get());
        let rotation = u32::from(blob_id.shard_rotation(n_shards));
        let pair_index = (u32::from(self.0) + n - rotation) % n;
        SliverPairIndex(u16::try_from(pair_index).expect("the index is less than `n_shards`"))
    }
}

/// Represents the index of a sliver within the encoding of a blob.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct SliverIndex(pub u16);

impl fmt::Display for SliverIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents the index of a sliver pair within the encoding of a blob.
///
/// The sliver pair at index `i` consists of the primary sliver at index `i` and the secondary
/// sliver at index `n_shards - i - 1`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct SliverPairIndex(pub u16);

impl fmt::Display for SliverPairIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SliverPairIndex {
    /// Returns the index of the shard holding this sliver pair for the given blob.
    ///
    /// The mapping rotates the pair index by a value derived from the blob ID, so that the
    /// systematic part of each blob's encoding lands on a different set of shards.
    pub fn to_shard_index(self, n_shards: NonZeroU16, blob_id: &BlobId) -> ShardIndex {
        let n = u32::from(n_shards.get());
        let rotation = u32::from(blob_id.shard_rotation(n_shards));
        let shard_index = (u32::from(self.0) + rotation) % n;
        ShardIndex(u16::try_from(shard_index).expect("the index is less than `n_shards`"))
    }
}

/// The type of a sliver (primary or secondary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SliverType {
    /// A primary sliver.
    Primary,
    /// A secondary sliver.
    Secondary,
}

impl SliverType {
    /// Returns the [`SliverType`] for the given [`encoding::EncodingAxis`].
    pub fn for_encoding<A: encoding::EncodingAxis>() -> Self {
        if A::IS_PRIMARY {
            SliverType::Primary
        } else {
            SliverType::Secondary
        }
    }
}

impl fmt::Display for SliverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SliverType::Primary => write!(f, "primary"),
            SliverType::Secondary => write!(f, "secondary"),
        }
    }
}

/// Supported blob encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum EncodingType {
    /// Two-dimensional Reed-Solomon encoding.
    #[default]
    RS2 = 1,
}

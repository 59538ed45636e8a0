// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Protocol key pairs used by storage nodes to sign confirmations.

use fastcrypto::{
    bls12381::min_pk::{BLS12381KeyPair, BLS12381Signature},
    traits::{KeyPair as _, Signer as _},
};
use rand::rngs::StdRng;

/// The public key used by storage nodes to sign protocol messages.
pub type PublicKey = fastcrypto::bls12381::min_pk::BLS12381PublicKey;

/// A BLS12-381 min-pk key pair identifying a storage node within the protocol.
#[derive(Debug)]
pub struct ProtocolKeyPair(BLS12381KeyPair);

impl ProtocolKeyPair {
    /// Creates a new [`ProtocolKeyPair`] from the provided key pair.
    pub fn new(keypair: BLS12381KeyPair) -> Self {
        Self(keypair)
    }

    /// Generates a new key pair using the provided source of randomness.
    pub fn generate_with_rng(rng: &mut StdRng) -> Self {
        Self(BLS12381KeyPair::generate(rng))
    }

    /// Returns the public key of this key pair.
    pub fn public(&self) -> &PublicKey {
        self.0.public()
    }

    /// Signs the provided message bytes.
    pub fn sign(&self, message: &[u8]) -> BLS12381Signature {
        self.0.sign(message)
    }
}

impl AsRef<BLS12381KeyPair> for ProtocolKeyPair {
    fn as_ref(&self) -> &BLS12381KeyPair {
        &self.0
    }
}

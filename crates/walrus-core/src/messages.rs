// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Signed protocol messages exchanged with storage nodes, and certificates aggregated from them.
//!
//! All messages are BCS-encoded records prefixed with a three-byte intent header; verification
//! reproduces the expected encoding byte-for-byte before checking the signature.

use core::{fmt, marker::PhantomData};

use fastcrypto::{
    bls12381::min_pk::{BLS12381AggregateSignature, BLS12381Signature},
    error::FastCryptoError,
    traits::{AggregateAuthenticator as _, VerifyingKey as _},
};
use serde::{Deserialize, Serialize};

use crate::{BlobId, Epoch, PublicKey, SuiObjectId, ensure};

/// Type of the intent of a signed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentType(pub u8);

impl IntentType {
    /// Intent of a blob-certification confirmation.
    pub const BLOB_CERT_MSG: Self = Self(1);
}

/// Version of the intent of a signed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IntentVersion(pub u8);

/// The app ID of a signed message, identifying the Walrus protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentAppId(pub u8);

impl IntentAppId {
    /// The Walrus storage app ID.
    pub const STORAGE: Self = Self(3);
}

/// The intent header prefixed to every signed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    /// The type of the message.
    pub r#type: IntentType,
    /// The intent version.
    pub version: IntentVersion,
    /// The app ID.
    pub app_id: IntentAppId,
}

impl Intent {
    /// Creates a storage intent of the given type.
    pub const fn storage(r#type: IntentType) -> Self {
        Self {
            r#type,
            version: IntentVersion(0),
            app_id: IntentAppId::STORAGE,
        }
    }
}

/// A message of the Walrus protocol: an intent header, the epoch at which the message was
/// created, and the message contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolMessage<T> {
    intent: Intent,
    epoch: Epoch,
    message_contents: T,
}

impl<T> ProtocolMessage<T> {
    /// The epoch of the message.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// The contents of the message.
    pub fn contents(&self) -> &T {
        &self.message_contents
    }
}

/// Error returned when a message carries an unexpected intent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid intent: expected {expected:?}, got {actual:?}")]
pub struct InvalidIntent {
    /// The expected intent.
    pub expected: Intent,
    /// The intent of the message.
    pub actual: Intent,
}

/// Errors returned when verifying signed messages or certificates.
#[derive(Debug, thiserror::Error)]
pub enum MessageVerificationError {
    /// The signature verification failed.
    #[error(transparent)]
    Signature(#[from] FastCryptoError),
    /// The message contents differ from the expected ones.
    #[error("the message contents do not match the expected message")]
    MessageContent,
    /// The message was created at a different epoch than expected.
    #[error("message epoch mismatch (actual {actual}, expected {expected})")]
    EpochMismatch {
        /// The epoch of the message.
        actual: Epoch,
        /// The expected epoch.
        expected: Epoch,
    },
    /// Signatures could not be aggregated into a certificate.
    #[error("unable to aggregate the signatures: {0}")]
    Aggregation(FastCryptoError),
    /// The set of messages to aggregate is empty or inconsistent.
    #[error("the messages to aggregate are empty or differ from each other")]
    InconsistentAggregationSet,
}

/// Indicates the persistence of a blob.
///
/// For deletable blobs, the object ID of the associated Sui object is included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobPersistenceType {
    /// The blob is permanent.
    Permanent,
    /// The blob is deletable and has the given object ID.
    Deletable {
        /// The object ID of the associated Sui object.
        object_id: SuiObjectId,
    },
}

/// The message body of a [`Confirmation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfirmationBody {
    /// The blob ID of the blob that is being confirmed.
    pub blob_id: BlobId,
    /// Whether the blob is permanent or deletable.
    pub blob_type: BlobPersistenceType,
}

/// A confirmation that a storage node has stored all slivers of a blob assigned to its shards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProtocolMessage<StorageConfirmationBody>")]
pub struct Confirmation(ProtocolMessage<StorageConfirmationBody>);

impl Confirmation {
    const INTENT: Intent = Intent::storage(IntentType::BLOB_CERT_MSG);

    /// Creates a new confirmation message for the provided blob ID.
    pub fn new(epoch: Epoch, blob_id: BlobId, blob_type: BlobPersistenceType) -> Self {
        Self(ProtocolMessage {
            intent: Self::INTENT,
            epoch,
            message_contents: StorageConfirmationBody { blob_id, blob_type },
        })
    }
}

impl TryFrom<ProtocolMessage<StorageConfirmationBody>> for Confirmation {
    type Error = InvalidIntent;

    fn try_from(message: ProtocolMessage<StorageConfirmationBody>) -> Result<Self, Self::Error> {
        if message.intent == Self::INTENT {
            Ok(Self(message))
        } else {
            Err(InvalidIntent {
                expected: Self::INTENT,
                actual: message.intent,
            })
        }
    }
}

impl AsRef<ProtocolMessage<StorageConfirmationBody>> for Confirmation {
    fn as_ref(&self) -> &ProtocolMessage<StorageConfirmationBody> {
        &self.0
    }
}

/// A message signed by a storage node, stored in its serialized form.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage<T> {
    /// The BCS-serialized message.
    pub serialized_message: Vec<u8>,
    /// The signature over the serialized message.
    pub signature: BLS12381Signature,
    #[serde(skip)]
    message_type: PhantomData<T>,
}

impl<T> SignedMessage<T> {
    /// Creates a signed message from an already-encoded message and its signature.
    pub fn new_from_encoded(serialized_message: Vec<u8>, signature: BLS12381Signature) -> Self {
        Self {
            serialized_message,
            signature,
            message_type: PhantomData,
        }
    }
}

impl<T> fmt::Debug for SignedMessage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedMessage")
            .field("serialized_message_len", &self.serialized_message.len())
            .finish_non_exhaustive()
    }
}

/// A signed [`Confirmation`] from a storage node.
pub type SignedStorageConfirmation = SignedMessage<Confirmation>;

impl SignedStorageConfirmation {
    /// Verifies that this confirmation is valid for the specified public key, epoch, and blob.
    ///
    /// The expected message is reproduced byte-for-byte and compared with the signed bytes
    /// before the signature is checked.
    pub fn verify(
        &self,
        public_key: &PublicKey,
        epoch: Epoch,
        blob_id: BlobId,
        blob_type: BlobPersistenceType,
    ) -> Result<Confirmation, MessageVerificationError> {
        let expected = Confirmation::new(epoch, blob_id, blob_type);
        let expected_bytes =
            bcs::to_bytes(&expected).expect("trusted in-memory value can be serialized");

        if self.serialized_message != expected_bytes {
            // Decode the actual message to distinguish a wrong epoch from other mismatches.
            if let Ok(actual) = bcs::from_bytes::<Confirmation>(&self.serialized_message) {
                if actual.0.epoch != epoch {
                    return Err(MessageVerificationError::EpochMismatch {
                        actual: actual.0.epoch,
                        expected: epoch,
                    });
                }
            }
            return Err(MessageVerificationError::MessageContent);
        }

        public_key.verify(&self.serialized_message, &self.signature)?;
        Ok(expected)
    }
}

/// A certificate over a [`Confirmation`], aggregating a quorum of node signatures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationCertificate {
    /// The indices of the committee members whose signatures are aggregated, in increasing
    /// order.
    pub signers: Vec<u16>,
    /// The BCS-serialized confirmation message.
    pub serialized_message: Vec<u8>,
    /// The aggregate signature over the serialized message.
    pub signature: BLS12381AggregateSignature,
}

impl ConfirmationCertificate {
    /// Aggregates the provided signed confirmations into a certificate.
    ///
    /// All confirmations must be over the identical serialized message; `signers` are the
    /// committee indices of the respective signing nodes.
    pub fn from_signed_messages_and_indices(
        confirmations: Vec<&SignedStorageConfirmation>,
        mut signers: Vec<u16>,
    ) -> Result<Self, MessageVerificationError> {
        let (Some(first), true) = (confirmations.first(), confirmations.len() == signers.len())
        else {
            return Err(MessageVerificationError::InconsistentAggregationSet);
        };
        ensure!(
            confirmations
                .iter()
                .all(|c| c.serialized_message == first.serialized_message),
            MessageVerificationError::InconsistentAggregationSet
        );

        let signatures: Vec<BLS12381Signature> =
            confirmations.iter().map(|c| c.signature.clone()).collect();
        let signature = BLS12381AggregateSignature::aggregate(&signatures)
            .map_err(MessageVerificationError::Aggregation)?;
        signers.sort_unstable();

        Ok(Self {
            signers,
            serialized_message: first.serialized_message.clone(),
            signature,
        })
    }

    /// Verifies the certificate against the public keys of the signers (in signer order), the
    /// epoch, and the blob.
    pub fn verify(
        &self,
        signer_public_keys: &[PublicKey],
        epoch: Epoch,
        blob_id: BlobId,
        blob_type: BlobPersistenceType,
    ) -> Result<(), MessageVerificationError> {
        let expected = Confirmation::new(epoch, blob_id, blob_type);
        let expected_bytes =
            bcs::to_bytes(&expected).expect("trusted in-memory value can be serialized");
        ensure!(
            self.serialized_message == expected_bytes,
            MessageVerificationError::MessageContent
        );
        self.signature
            .verify(signer_public_keys, &self.serialized_message)?;
        Ok(())
    }
}

// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Builder for the Move-call transactions the client submits.
//!
//! The builder methods return *thunks*: closures that, applied to a mutable [`Transaction`],
//! append the corresponding Move calls. Thunks are pure composition and never suspend, so a
//! caller can assemble a full transaction before handing it to an executor.

use fastcrypto::traits::ToFromBytes as _;
use walrus_core::messages::ConfirmationCertificate;

use crate::{
    client::ContractConfig,
    contracts::{self, FunctionTag},
    types::{ObjectID, move_structs::BlobRegistrationParams},
};

/// A handle to the result of an earlier call within the same transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argument(pub u16);

/// An argument to a Move call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    /// A shared or owned object.
    Object(ObjectID),
    /// A BCS-encoded pure value.
    Pure(Vec<u8>),
    /// The result of an earlier call in the same transaction.
    Result(Argument),
    /// A WAL coin with the given balance, split off by the executor from the sender's coins.
    WalCoin {
        /// The balance of the coin in FROST.
        amount: u64,
    },
}

/// A single Move call within a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCall {
    /// The package containing the called function.
    pub package: ObjectID,
    /// The called function.
    pub function: FunctionTag,
    /// The arguments of the call.
    pub arguments: Vec<CallArg>,
}

/// A transaction under construction: an ordered list of Move calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    calls: Vec<MoveCall>,
}

impl Transaction {
    /// Appends a call and returns the handle to its result.
    pub fn add_call(&mut self, call: MoveCall) -> Argument {
        let argument = Argument(u16::try_from(self.calls.len()).expect("call count is small"));
        self.calls.push(call);
        argument
    }

    /// The calls of the transaction, in execution order.
    pub fn calls(&self) -> &[MoveCall] {
        &self.calls
    }

    /// Returns true if the transaction contains no calls.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// A closure that appends Move calls to a transaction and returns the handle of its main
/// result, if any.
pub type TransactionThunk = Box<dyn FnOnce(&mut Transaction) -> Option<Argument> + Send>;

fn pure<T: serde::Serialize>(value: &T) -> CallArg {
    CallArg::Pure(bcs::to_bytes(value).expect("trusted in-memory value can be serialized"))
}

/// Encodes the signer indices of a certificate into the on-chain bitmap format.
///
/// The bitmap has `ceil(n_members / 8)` bytes; bit `i` (little-endian bit order within each
/// byte) is set iff member `i` signed.
pub fn signers_bitmap(signers: &[u16], n_members: usize) -> Vec<u8> {
    let mut bitmap = vec![0u8; n_members.div_ceil(8)];
    for signer in signers {
        let index = usize::from(*signer);
        if index < n_members {
            bitmap[index / 8] |= 1 << (index % 8);
        }
    }
    bitmap
}

/// Builds the Move calls of the Walrus contract interactions.
#[derive(Debug, Clone)]
pub struct WalrusTransactionBuilder {
    package_id: ObjectID,
    system_object: ObjectID,
}

impl WalrusTransactionBuilder {
    /// Creates a new builder for the given contract configuration.
    pub fn new(contract_config: &ContractConfig) -> Self {
        Self {
            package_id: contract_config.package_id,
            system_object: contract_config.system_object_id,
        }
    }

    fn system_call(&self, function: FunctionTag, mut arguments: Vec<CallArg>) -> MoveCall {
        arguments.insert(0, CallArg::Object(self.system_object));
        MoveCall {
            package: self.package_id,
            function,
            arguments,
        }
    }

    /// Returns a thunk reserving `encoded_size` bytes of storage for `epochs_ahead` epochs,
    /// paid with a WAL coin of `payment` FROST. The thunk returns the storage-resource handle.
    pub fn reserve_space(
        &self,
        encoded_size: u64,
        epochs_ahead: walrus_core::EpochCount,
        payment: u64,
    ) -> TransactionThunk {
        let builder = self.clone();
        Box::new(move |transaction| {
            Some(transaction.add_call(builder.system_call(
                contracts::system::RESERVE_SPACE,
                vec![
                    pure(&encoded_size),
                    pure(&epochs_ahead),
                    CallArg::WalCoin { amount: payment },
                ],
            )))
        })
    }

    /// Returns a thunk registering a blob against the storage resource produced by an earlier
    /// [`reserve_space`][Self::reserve_space] call. The thunk returns the blob-object handle.
    pub fn register_blob(
        &self,
        storage: Argument,
        params: &BlobRegistrationParams,
        write_payment: u64,
    ) -> TransactionThunk {
        let builder = self.clone();
        let params = params.clone();
        Box::new(move |transaction| {
            Some(transaction.add_call(builder.system_call(
                contracts::system::REGISTER_BLOB,
                vec![
                    CallArg::Result(storage),
                    pure(&params.blob_id),
                    pure(&params.root_hash.bytes()),
                    pure(&params.unencoded_size),
                    pure(&(params.encoding_type as u8)),
                    pure(&params.deletable),
                    CallArg::WalCoin {
                        amount: write_payment,
                    },
                ],
            )))
        })
    }

    /// Returns a thunk certifying a registered blob with the aggregated certificate.
    pub fn certify_blob(
        &self,
        blob_object: ObjectID,
        certificate: &ConfirmationCertificate,
        n_members: usize,
    ) -> TransactionThunk {
        let builder = self.clone();
        let signature_bytes: Vec<u8> = certificate.signature.as_bytes().to_vec();
        let bitmap = signers_bitmap(&certificate.signers, n_members);
        let message = certificate.serialized_message.clone();
        Box::new(move |transaction| {
            transaction.add_call(builder.system_call(
                contracts::system::CERTIFY_BLOB,
                vec![
                    CallArg::Object(blob_object),
                    pure(&signature_bytes),
                    pure(&bitmap),
                    pure(&message),
                ],
            ));
            None
        })
    }

    /// Returns a thunk extending the blob's lifetime by `additional_epochs`.
    ///
    /// The thunk is a no-op if the epoch delta is zero or negative.
    pub fn extend_blob(
        &self,
        blob_object: ObjectID,
        additional_epochs: i64,
        payment: u64,
    ) -> TransactionThunk {
        let builder = self.clone();
        Box::new(move |transaction| {
            if additional_epochs <= 0 {
                return None;
            }
            let epochs = u32::try_from(additional_epochs).expect("checked to be positive");
            transaction.add_call(builder.system_call(
                contracts::system::EXTEND_BLOB,
                vec![
                    CallArg::Object(blob_object),
                    pure(&epochs),
                    CallArg::WalCoin { amount: payment },
                ],
            ));
            None
        })
    }

    /// Returns a thunk deleting a deletable blob.
    pub fn delete_blob(&self, blob_object: ObjectID) -> TransactionThunk {
        let builder = self.clone();
        Box::new(move |transaction| {
            transaction.add_call(builder.system_call(
                contracts::system::DELETE_BLOB,
                vec![CallArg::Object(blob_object)],
            ));
            None
        })
    }

    /// Returns a thunk attaching an empty attribute field to a blob.
    pub fn add_metadata(&self, blob_object: ObjectID) -> TransactionThunk {
        let package = self.package_id;
        Box::new(move |transaction| {
            transaction.add_call(MoveCall {
                package,
                function: contracts::blob::ADD_METADATA,
                arguments: vec![CallArg::Object(blob_object)],
            });
            None
        })
    }

    /// Returns a thunk inserting or updating a single attribute pair on a blob.
    pub fn insert_or_update_metadata_pair(
        &self,
        blob_object: ObjectID,
        key: String,
        value: String,
    ) -> TransactionThunk {
        let package = self.package_id;
        Box::new(move |transaction| {
            transaction.add_call(MoveCall {
                package,
                function: contracts::blob::INSERT_OR_UPDATE_METADATA_PAIR,
                arguments: vec![CallArg::Object(blob_object), pure(&key), pure(&value)],
            });
            None
        })
    }

    /// Returns a thunk removing a single attribute pair from a blob.
    pub fn remove_metadata_pair(&self, blob_object: ObjectID, key: String) -> TransactionThunk {
        let package = self.package_id;
        Box::new(move |transaction| {
            transaction.add_call(MoveCall {
                package,
                function: contracts::blob::REMOVE_METADATA_PAIR,
                arguments: vec![CallArg::Object(blob_object), pure(&key)],
            });
            None
        })
    }

    /// Returns a thunk destroying the zero remainder of a payment coin.
    pub fn destroy_zero(&self, coin: Argument) -> TransactionThunk {
        let package = self.package_id;
        Box::new(move |transaction| {
            transaction.add_call(MoveCall {
                package,
                function: contracts::coin::DESTROY_ZERO,
                arguments: vec![CallArg::Result(coin)],
            });
            None
        })
    }
}

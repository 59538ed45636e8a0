// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Descriptors of the Move entry functions the client calls.

/// A Move function identified by its module and name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionTag {
    /// The module containing the function.
    pub module: &'static str,
    /// The name of the function.
    pub name: &'static str,
}

macro_rules! function {
    ($module:ident :: $name:ident) => {
        FunctionTag {
            module: stringify!($module),
            name: stringify!($name),
        }
    };
}

/// Functions of the Walrus `system` module.
pub mod system {
    use super::FunctionTag;

    /// Reserves storage space for a number of epochs.
    pub const RESERVE_SPACE: FunctionTag = function!(system::reserve_space);
    /// Registers a blob against a storage resource.
    pub const REGISTER_BLOB: FunctionTag = function!(system::register_blob);
    /// Certifies a registered blob with an aggregated confirmation certificate.
    pub const CERTIFY_BLOB: FunctionTag = function!(system::certify_blob);
    /// Extends the lifetime of a blob.
    pub const EXTEND_BLOB: FunctionTag = function!(system::extend_blob);
    /// Deletes a deletable blob.
    pub const DELETE_BLOB: FunctionTag = function!(system::delete_blob);
}

/// Functions of the Walrus `blob` module.
pub mod blob {
    use super::FunctionTag;

    /// Attaches a fresh attribute dynamic field to a blob.
    pub const ADD_METADATA: FunctionTag = function!(blob::add_metadata);
    /// Inserts or updates a single attribute pair.
    pub const INSERT_OR_UPDATE_METADATA_PAIR: FunctionTag =
        function!(blob::insert_or_update_metadata_pair);
    /// Removes a single attribute pair.
    pub const REMOVE_METADATA_PAIR: FunctionTag = function!(blob::remove_metadata_pair);
}

/// Functions of the Sui framework's `coin` module.
pub mod coin {
    use super::FunctionTag;

    /// Destroys a coin with zero balance.
    pub const DESTROY_ZERO: FunctionTag = function!(coin::destroy_zero);
}

// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Bindings to call the Walrus contracts and read Walrus objects from Sui.
//!
//! The actual Sui RPC stack is out of scope: chain access is narrowed to the
//! [`SuiObjectProvider`][client::SuiObjectProvider] trait, which carries BCS-encoded object
//! payloads and Move-call transactions.

pub mod client;
pub mod contracts;
pub mod object_loader;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transaction_builder;
pub mod types;

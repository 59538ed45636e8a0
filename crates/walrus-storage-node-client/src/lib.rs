// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Client to communicate with the HTTP API of a single Walrus storage node.
//!
//! All node-facing failures are collapsed into the [`NodeError`] taxonomy consumed by the
//! quorum dispatcher: authoritative not-found, legal unavailability, user abort, and transient
//! transport errors.

pub mod api;
mod client;
mod error;

pub use client::{SliverVerificationError, StorageNodeClient, StorageNodeClientBuilder};
pub use error::{ClientBuildError, NodeError};

// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Client for the Walrus decentralized blob store.
//!
//! The client encodes blobs into per-shard slivers, distributes them to a
//! Byzantine-fault-tolerant committee of storage nodes, and certifies them on Sui; reads
//! reconstruct and verify blobs from a quorum-sampled subset of slivers. The heart of the crate
//! is the shard-weighted quorum dispatcher in [`quorum`], which all multi-node operations are
//! built on.

pub mod active_committees;
pub mod client;
pub mod communication;
pub mod config;
pub mod error;
pub mod quorum;
pub mod utils;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{ClientError, ClientErrorKind, ClientResult};

// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Communication with the storage nodes of a committee.

pub mod factory;
pub mod node;

pub use factory::NodeCommunicationFactory;
pub use node::{
    NodeCommunication, NodeIndex, NodeReadCommunication, NodeResult, NodeWriteCommunication,
};

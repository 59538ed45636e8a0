// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Create the vectors of node communication objects.

use std::{
    collections::{HashMap, HashSet, hash_map::Entry},
    num::NonZeroU16,
    sync::{Arc, Mutex},
};

use rand::{seq::SliceRandom, thread_rng};
use reqwest::Client as ReqwestClient;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use walrus_core::{Epoch, encoding::EncodingConfig};
use walrus_storage_node_client::{ClientBuildError, StorageNodeClient, StorageNodeClientBuilder};
use walrus_sui::types::{Committee, NetworkAddress, StorageNode};

use super::{NodeCommunication, NodeReadCommunication, NodeWriteCommunication};
use crate::{
    active_committees::ActiveCommittees,
    config::ClientCommunicationConfig,
    error::{ClientError, ClientErrorKind, ClientResult},
};

/// Factory to create objects amenable to communication with storage nodes.
#[derive(Debug)]
pub struct NodeCommunicationFactory {
    config: ClientCommunicationConfig,
    encoding_config: Arc<EncodingConfig>,
    client_cache: Arc<Mutex<HashMap<NetworkAddress, StorageNodeClient>>>,
}

impl NodeCommunicationFactory {
    /// Creates a new [`NodeCommunicationFactory`].
    pub fn new(config: ClientCommunicationConfig, n_shards: NonZeroU16) -> Self {
        Self {
            config,
            encoding_config: Arc::new(EncodingConfig::new(n_shards)),
            client_cache: Default::default(),
        }
    }

    /// The encoding configuration used by the factory.
    pub fn encoding_config(&self) -> &Arc<EncodingConfig> {
        &self.encoding_config
    }

    /// The communication configuration of the factory.
    pub fn config(&self) -> &ClientCommunicationConfig {
        &self.config
    }

    /// Returns a vector of [`NodeWriteCommunication`] objects representing the nodes of the
    /// write committee in random order.
    pub(crate) fn node_write_communications(
        &self,
        committees: &ActiveCommittees,
        sliver_write_limit: Arc<Semaphore>,
        cancel: &CancellationToken,
    ) -> ClientResult<Vec<NodeWriteCommunication>> {
        self.remove_old_cached_clients(committees);

        let write_committee = committees.write_committee();
        node_communications(write_committee, |index| {
            Ok(self
                .create_node_communication(write_committee, index, cancel)?
                .map(|communication| {
                    communication.with_write_limits(Arc::clone(&sliver_write_limit))
                }))
        })
    }

    /// Returns a vector of [`NodeReadCommunication`] objects representing the nodes of the
    /// read committee in random order.
    ///
    /// `certified_epoch` is the epoch at which the blob to be read was initially certified.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] with [`ClientErrorKind::BehindCurrentEpoch`] if the certified
    /// epoch is ahead of the client's committee view.
    pub(crate) fn node_read_communications(
        &self,
        committees: &ActiveCommittees,
        certified_epoch: Epoch,
        cancel: &CancellationToken,
    ) -> ClientResult<Vec<NodeReadCommunication>> {
        self.remove_old_cached_clients(committees);

        let read_committee = committees.read_committee(certified_epoch).ok_or_else(|| {
            ClientError::from(ClientErrorKind::BehindCurrentEpoch {
                client_epoch: committees.epoch(),
                certified_epoch,
            })
        })?;

        node_communications(read_committee, |index| {
            self.create_node_communication(read_committee, index, cancel)
        })
    }

    /// Builds a [`NodeCommunication`] object for the identified storage node within the
    /// committee.
    ///
    /// Returns `None` if the node has no shards.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range of the committee members.
    fn create_node_communication(
        &self,
        committee: &Committee,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<Option<NodeCommunication>, ClientBuildError> {
        let node = committee.members()[index].clone();
        let client = self.create_client(&node)?;

        Ok(NodeCommunication::new(
            index,
            committee.epoch,
            client,
            node,
            Arc::clone(&self.encoding_config),
            self.config.request_rate_config.clone(),
            cancel.child_token(),
            self.config.sliver_status_check_threshold,
        ))
    }

    /// Creates or reuses a cached [`StorageNodeClient`] for the given storage node.
    fn create_client(&self, node: &StorageNode) -> Result<StorageNodeClient, ClientBuildError> {
        let mut cache = self
            .client_cache
            .lock()
            .expect("other threads should not panic");

        match cache.entry(node.network_address.clone()) {
            Entry::Occupied(occupied) => Ok(occupied.get().clone()),
            Entry::Vacant(vacant) => {
                let client = StorageNodeClientBuilder::from_reqwest(ReqwestClient::builder())
                    .request_timeout(self.config.request_timeout)
                    .build(&node.network_address.0)?;
                Ok(vacant.insert(client).clone())
            }
        }
    }

    /// Clears the cache of all clients that are not in the current or previous committee.
    fn remove_old_cached_clients(&self, committees: &ActiveCommittees) {
        let mut active_addresses: HashSet<&NetworkAddress> = committees
            .write_committee()
            .members()
            .iter()
            .map(|node| &node.network_address)
            .collect();
        let previous_committee = committees.read_committee(0);
        if let Some(committee) = &previous_committee {
            active_addresses.extend(
                committee
                    .members()
                    .iter()
                    .map(|node| &node.network_address),
            );
        }
        self.client_cache
            .lock()
            .expect("other threads should not panic")
            .retain(|address, _| active_addresses.contains(address));
    }
}

/// Create a vector of node communication objects from the given committee and constructor.
fn node_communications<W>(
    committee: &Committee,
    constructor: impl Fn(usize) -> Result<Option<NodeCommunication<W>>, ClientBuildError>,
) -> ClientResult<Vec<NodeCommunication<W>>> {
    if committee.n_members() == 0 {
        return Err(ClientError::from(ClientErrorKind::EmptyCommittee));
    }

    let mut communications: Vec<_> = (0..committee.n_members())
        .map(|index| (index, constructor(index)))
        .collect();

    if communications.iter().all(|(_, result)| result.is_err()) {
        let Some((_, Err(sample_error))) = communications.pop() else {
            unreachable!("`all()` guarantees at least 1 result and all results are errors");
        };
        return Err(ClientError::from(ClientErrorKind::AllConnectionsFailed(
            sample_error,
        )));
    }

    let mut communications: Vec<_> = communications
        .into_iter()
        .filter_map(|(index, result)| match result {
            Ok(maybe_communication) => maybe_communication,
            Err(error) => {
                tracing::warn!(
                    node = index,
                    %error,
                    "unable to establish a connection to a storage node"
                );
                None
            }
        })
        .collect();
    communications.shuffle(&mut thread_rng());

    Ok(communications)
}

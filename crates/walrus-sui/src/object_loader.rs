// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! A deduplicating, coalescing loader for on-chain objects.
//!
//! Concurrent requests for the same object share a single in-flight fetch, and all objects
//! missing from the cache within one `load_many` call are fetched in a single provider batch.
//! The cache is cleared by [`ObjectLoader::reset`].

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use serde::de::DeserializeOwned;

use crate::{
    client::{RawObject, SuiClientError, SuiObjectProvider},
    types::ObjectID,
};

type BatchResult = Result<Arc<HashMap<ObjectID, Arc<RawObject>>>, Arc<SuiClientError>>;
type BatchFuture = Shared<BoxFuture<'static, BatchResult>>;

#[derive(Clone)]
enum CacheSlot {
    Loaded(Arc<RawObject>),
    InFlight(BatchFuture),
}

/// A caching object loader over a [`SuiObjectProvider`].
pub struct ObjectLoader {
    provider: Arc<dyn SuiObjectProvider>,
    slots: Mutex<HashMap<ObjectID, CacheSlot>>,
}

impl std::fmt::Debug for ObjectLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectLoader")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl ObjectLoader {
    /// Creates a new loader over the given provider.
    pub fn new(provider: Arc<dyn SuiObjectProvider>) -> Self {
        Self {
            provider,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Clears the cache, so that subsequent loads observe fresh on-chain state.
    pub fn reset(&self) {
        self.slots.lock().expect("loader mutex not poisoned").clear();
    }

    /// Loads a single object.
    pub async fn load(&self, id: ObjectID) -> Result<Arc<RawObject>, SuiClientError> {
        let mut objects = self.load_many(vec![id]).await?;
        Ok(objects.pop().expect("`load_many` returns one object per id"))
    }

    /// Loads a single object and deserializes its BCS contents into a Move struct.
    pub async fn load_move_struct<T: DeserializeOwned>(
        &self,
        id: ObjectID,
    ) -> Result<T, SuiClientError> {
        self.load(id).await?.to_move_struct()
    }

    /// Loads the provided objects, returning them in request order.
    ///
    /// Objects already cached are served directly; the remainder is fetched from the provider
    /// in a single batch that concurrent callers join instead of duplicating.
    pub async fn load_many(
        &self,
        ids: Vec<ObjectID>,
    ) -> Result<Vec<Arc<RawObject>>, SuiClientError> {
        let pending: Vec<(ObjectID, CacheSlot)> = {
            let mut slots = self.slots.lock().expect("loader mutex not poisoned");

            let missing: Vec<ObjectID> = ids
                .iter()
                .filter(|id| !slots.contains_key(id))
                .copied()
                .collect();
            if !missing.is_empty() {
                let batch = self.spawn_batch(missing.clone());
                for id in missing {
                    slots.insert(id, CacheSlot::InFlight(batch.clone()));
                }
            }

            ids.iter()
                .map(|id| (*id, slots[id].clone()))
                .collect()
        };

        let mut objects = Vec::with_capacity(pending.len());
        for (id, slot) in pending {
            let object = match slot {
                CacheSlot::Loaded(object) => object,
                CacheSlot::InFlight(batch) => {
                    let result = batch.await;
                    self.finalize_slot(id, result)?
                }
            };
            objects.push(object);
        }
        Ok(objects)
    }

    fn spawn_batch(&self, ids: Vec<ObjectID>) -> BatchFuture {
        let provider = Arc::clone(&self.provider);
        tracing::trace!(n_objects = ids.len(), "fetching object batch from chain");
        async move {
            let objects = provider
                .get_objects(&ids)
                .await
                .map_err(Arc::new)?
                .into_iter()
                .map(|object| (object.id, Arc::new(object)))
                .collect();
            Ok(Arc::new(objects))
        }
        .boxed()
        .shared()
    }

    fn finalize_slot(&self, id: ObjectID, result: BatchResult) -> Result<Arc<RawObject>, SuiClientError> {
        let mut slots = self.slots.lock().expect("loader mutex not poisoned");
        match result {
            Ok(objects) => {
                if let Some(object) = objects.get(&id) {
                    slots.insert(id, CacheSlot::Loaded(Arc::clone(object)));
                    Ok(Arc::clone(object))
                } else {
                    slots.remove(&id);
                    Err(SuiClientError::ObjectDoesNotExist(id))
                }
            }
            Err(error) => {
                slots.remove(&id);
                Err(SuiClientError::BatchLoadFailed(error))
            }
        }
    }
}

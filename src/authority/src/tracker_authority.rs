// Copyright 2021 The arrowkv Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use dashmap::DashMap;
use kernel::{BlockManagerId, MapId, MapStatus, ShuffleId};
use transport::BroadcastManager;

use crate::config::{TrackerConfig, REDUCER_PREF_LOCS_FRACTION, SHUFFLE_PREF_MAP_THRESHOLD, SHUFFLE_PREF_REDUCE_THRESHOLD};
use crate::dispatcher::{Dispatcher, PendingRequest};
use crate::epoch::Epoch;
use crate::error::{AuthorityError, Result};
use crate::shuffle_status::ShuffleStatus;
use crate::statistics::{self, MapOutputStatistics};

struct Inner {
    shuffle_statuses: DashMap<ShuffleId, Arc<ShuffleStatus>>,
    epoch: Epoch,
    config: TrackerConfig,
    broadcast_mgr: Arc<dyn BroadcastManager>,
}

impl Inner {
    /// Resolved against §4.3's open question: an absent shuffle replies
    /// with an explicit `UnknownShuffle` rather than letting an
    /// exception escape the dispatcher thread unswallowed — cheaper for
    /// a caller to diagnose than a bare RPC timeout. See DESIGN.md.
    fn dispatch_get_map_output_statuses(&self, shuffle_id: ShuffleId) -> Result<Vec<u8>, AuthorityError> {
        let status = self
            .shuffle_statuses
            .get(&shuffle_id)
            .ok_or(AuthorityError::UnknownShuffle(shuffle_id))?;
        let bytes = status.serialized_map_status(
            self.broadcast_mgr.as_ref(),
            self.config.local_mode,
            self.config.min_size_for_broadcast,
        )?;
        Ok(bytes)
    }
}

/// Driver-resident authority: owns every `ShuffleStatus`, services
/// `GetMapOutputStatuses` through a fixed dispatcher pool, and handles
/// topology-triggered invalidation.
pub struct TrackerAuthority {
    inner: Arc<Inner>,
    dispatcher: Option<Dispatcher>,
}

impl TrackerAuthority {
    pub fn new(config: TrackerConfig, broadcast_mgr: Arc<dyn BroadcastManager>) -> Result<Self> {
        config.validate()?;
        let num_threads = config.dispatcher_num_threads;
        let inner = Arc::new(Inner {
            shuffle_statuses: DashMap::new(),
            epoch: Epoch::new(),
            config,
            broadcast_mgr,
        });

        let dispatch_inner = inner.clone();
        let dispatcher = Dispatcher::start(num_threads, move |shuffle_id| {
            dispatch_inner.dispatch_get_map_output_statuses(shuffle_id)
        });

        Ok(Self { inner, dispatcher: Some(dispatcher) })
    }

    /// Entry point the transport hands incoming `GetMapOutputStatuses`
    /// RPCs to. Enqueues the request; it runs on a dispatcher thread,
    /// never on the transport's own thread pool.
    pub fn submit_get_map_output_statuses(
        &self,
        shuffle_id: ShuffleId,
        reply: crossbeam_channel::Sender<Result<Vec<u8>, AuthorityError>>,
    ) {
        self.dispatcher
            .as_ref()
            .expect("dispatcher only taken by shutdown")
            .submit(PendingRequest::new(shuffle_id, reply));
    }

    pub fn register_shuffle(&self, shuffle_id: ShuffleId, num_maps: usize) -> Result<()> {
        use dashmap::mapref::entry::Entry;
        match self.inner.shuffle_statuses.entry(shuffle_id) {
            Entry::Occupied(_) => Err(AuthorityError::AlreadyRegistered(shuffle_id)),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(ShuffleStatus::new(num_maps)));
                Ok(())
            }
        }
    }

    pub fn register_map_output(&self, shuffle_id: ShuffleId, map_id: MapId, status: MapStatus) -> Result<()> {
        let catalog = self
            .inner
            .shuffle_statuses
            .get(&shuffle_id)
            .ok_or(AuthorityError::UnknownShuffle(shuffle_id))?;
        catalog.add_map_output(map_id, status);
        Ok(())
    }

    pub fn unregister_map_output(&self, shuffle_id: ShuffleId, map_id: MapId, bm_address: &BlockManagerId) -> Result<()> {
        let catalog = self
            .inner
            .shuffle_statuses
            .get(&shuffle_id)
            .ok_or(AuthorityError::UnknownShuffle(shuffle_id))?;
        catalog.remove_map_output(map_id, bm_address);
        self.inner.epoch.increment();
        Ok(())
    }

    /// Removes the catalog entry; still invalidates its cache first so
    /// a pinned broadcast is released even though nothing else will
    /// ever read this catalog again.
    pub fn unregister_shuffle(&self, shuffle_id: ShuffleId) {
        if let Some((_, catalog)) = self.inner.shuffle_statuses.remove(&shuffle_id) {
            catalog.invalidate_serialized_map_output_status_cache();
        }
    }

    /// Applies the filter across every catalog, then bumps the epoch
    /// exactly once regardless of how many catalogs were touched.
    pub fn remove_outputs_on_host(&self, host: &str) {
        for entry in self.inner.shuffle_statuses.iter() {
            entry.value().remove_outputs_on_host(host);
        }
        self.inner.epoch.increment();
    }

    pub fn remove_outputs_on_executor(&self, executor_id: &str) {
        for entry in self.inner.shuffle_statuses.iter() {
            entry.value().remove_outputs_on_executor(executor_id);
        }
        self.inner.epoch.increment();
    }

    pub fn contains_shuffle(&self, shuffle_id: ShuffleId) -> bool {
        self.inner.shuffle_statuses.contains_key(&shuffle_id)
    }

    pub fn get_num_available_outputs(&self, shuffle_id: ShuffleId) -> Result<usize> {
        self.inner
            .shuffle_statuses
            .get(&shuffle_id)
            .map(|s| s.num_available_outputs())
            .ok_or(AuthorityError::UnknownShuffle(shuffle_id))
    }

    pub fn find_missing_partitions(&self, shuffle_id: ShuffleId) -> Option<Vec<i32>> {
        self.inner.shuffle_statuses.get(&shuffle_id).map(|s| s.find_missing_partitions())
    }

    pub fn get_statistics(&self, shuffle_id: ShuffleId, num_reduces: usize) -> Result<MapOutputStatistics> {
        let catalog = self
            .inner
            .shuffle_statuses
            .get(&shuffle_id)
            .ok_or(AuthorityError::UnknownShuffle(shuffle_id))?;
        Ok(statistics::get_statistics(shuffle_id, &catalog, num_reduces, self.inner.config.parallel_agg_threshold))
    }

    /// Skips the O(numMaps) locality computation entirely once either
    /// dimension passes its threshold, to save scheduling time on large
    /// jobs (spec §4.3).
    pub fn get_preferred_locations_for_shuffle(
        &self,
        shuffle_id: ShuffleId,
        reducer_id: i32,
        num_reducers: i32,
    ) -> Vec<String> {
        if !self.inner.config.shuffle_locality_enabled {
            return Vec::new();
        }
        let Some(catalog) = self.inner.shuffle_statuses.get(&shuffle_id) else {
            return Vec::new();
        };
        if catalog.num_maps() as i32 >= SHUFFLE_PREF_MAP_THRESHOLD || num_reducers >= SHUFFLE_PREF_REDUCE_THRESHOLD {
            return Vec::new();
        }

        catalog
            .with_map_statuses(|statuses| statistics::get_locations_with_largest_outputs(statuses, reducer_id, REDUCER_PREF_LOCS_FRACTION))
            .map(|locations| locations.into_iter().map(|bm| bm.host).collect())
            .unwrap_or_default()
    }

    pub fn get_epoch(&self) -> u64 {
        self.inner.epoch.get()
    }

    pub fn increment_epoch(&self) -> u64 {
        self.inner.epoch.increment()
    }

    /// Posts the poison pill, shuts the dispatcher pool down, and
    /// releases every catalog (invalidating each's cache along the way
    /// so no broadcast artifact outlives the authority).
    pub fn shutdown(&mut self) {
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.shutdown();
        }
        for entry in self.inner.shuffle_statuses.iter() {
            entry.value().invalidate_serialized_map_output_status_cache();
        }
        self.inner.shuffle_statuses.clear();
    }
}

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

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use kernel::{BlockId, BlockManagerId, MapId, MapStatus, ShuffleId};
use parking_lot::{Condvar, Mutex};
use transport::{BroadcastResolver, RpcEndpoint};

use crate::error::{ClientError, Result};

type Catalog = Arc<Vec<Option<MapStatus>>>;

/// Guards the set of shuffle ids currently being fetched from the
/// authority, plus the condvar threads park on while they wait for
/// someone else's fetch to land.
#[derive(Default)]
struct FetchGate {
    in_flight: Mutex<HashSet<ShuffleId>>,
    landed: Condvar,
}

impl FetchGate {
    /// Returns `true` if the caller is now responsible for fetching
    /// `shuffle_id` (and must call [`Self::finish`] when done). Returns
    /// `false` if another thread is already fetching it and this call
    /// blocked until that fetch landed — the caller should simply
    /// re-check the cache.
    fn begin_or_wait(&self, shuffle_id: ShuffleId) -> bool {
        let mut in_flight = self.in_flight.lock();
        if in_flight.contains(&shuffle_id) {
            while in_flight.contains(&shuffle_id) {
                self.landed.wait(&mut in_flight);
            }
            false
        } else {
            in_flight.insert(shuffle_id);
            true
        }
    }

    fn finish(&self, shuffle_id: ShuffleId) {
        self.in_flight.lock().remove(&shuffle_id);
        self.landed.notify_all();
    }
}

/// Worker-resident cache of fetched shuffle catalogs. Concurrent
/// first-fetches for the same `shuffleId` coalesce into a single RPC
/// (spec invariant 7); a topology-change epoch bump drops the whole
/// cache so stale locations are never served (spec invariant 8).
pub struct TrackerClient {
    map_statuses: DashMap<ShuffleId, Catalog>,
    fetch_gate: FetchGate,
    epoch: Mutex<u64>,
    endpoint: Arc<dyn RpcEndpoint>,
    broadcast_resolver: Arc<dyn BroadcastResolver>,
}

impl TrackerClient {
    pub fn new(endpoint: Arc<dyn RpcEndpoint>, broadcast_resolver: Arc<dyn BroadcastResolver>) -> Self {
        Self {
            map_statuses: DashMap::new(),
            fetch_gate: FetchGate::default(),
            epoch: Mutex::new(0),
            endpoint,
            broadcast_resolver,
        }
    }

    /// Fast path hits the cache directly. On a miss, at most one
    /// thread per `shuffleId` asks the authority; every other caller
    /// blocks on [`FetchGate`] and re-reads the cache once that fetch
    /// lands, rather than issuing a redundant RPC of its own.
    pub fn get_statuses(&self, shuffle_id: ShuffleId) -> Result<Catalog> {
        loop {
            if let Some(cached) = self.map_statuses.get(&shuffle_id) {
                return Ok(cached.clone());
            }

            if !self.fetch_gate.begin_or_wait(shuffle_id) {
                continue;
            }

            let outcome = self.fetch_and_cache(shuffle_id);
            self.fetch_gate.finish(shuffle_id);
            return outcome;
        }
    }

    fn fetch_and_cache(&self, shuffle_id: ShuffleId) -> Result<Catalog> {
        let bytes = self.endpoint.ask_get_map_output_statuses(shuffle_id)?;
        let statuses = wire::deserialize_map_statuses(&bytes, self.broadcast_resolver.as_ref())?;
        let catalog: Catalog = Arc::new(statuses);
        self.map_statuses.insert(shuffle_id, catalog.clone());
        Ok(catalog)
    }

    /// Resolves every `(BlockId, size)` pair for the reduce-partition
    /// range `[start_partition, end_partition)`, grouped by the
    /// `BlockManagerId` hosting them. Fails with
    /// [`ClientError::MetadataFetchFailed`] the moment any map slot in
    /// the catalog is empty — a partial catalog cannot be trusted for
    /// any partition in the range, since a missing map means every
    /// partition of that map is missing too.
    pub fn get_map_sizes_by_executor_id(
        &self,
        shuffle_id: ShuffleId,
        start_partition: i32,
        end_partition: i32,
    ) -> Result<Vec<(BlockManagerId, Vec<(BlockId, u64)>)>> {
        let catalog = self.get_statuses(shuffle_id)?;
        let by_location = match self.convert_map_statuses(shuffle_id, start_partition, end_partition, &catalog) {
            Ok(resolved) => resolved,
            Err(e) => {
                // A partial catalog is presumed poisoned for every shuffle,
                // not just this one — drop the whole cache so the next
                // fetch for any shuffle goes back to the authority.
                self.map_statuses.clear();
                return Err(e);
            }
        };

        let mut grouped: Vec<(BlockManagerId, Vec<(BlockId, u64)>)> = Vec::new();
        for (block_id, location, size) in by_location {
            match grouped.iter_mut().find(|(bm, _)| bm == &location) {
                Some((_, blocks)) => blocks.push((block_id, size)),
                None => grouped.push((location, vec![(block_id, size)])),
            }
        }
        Ok(grouped)
    }

    /// Core translation from a raw `Vec<Option<MapStatus>>` into
    /// `(BlockId, BlockManagerId, size)` triples for the requested
    /// partition range. `partition_id` on the resulting error is
    /// `start_partition`, mirroring the source system's
    /// `MetadataFetchFailedException(shuffleId, startPartition, ...)`.
    fn convert_map_statuses(
        &self,
        shuffle_id: ShuffleId,
        start_partition: i32,
        end_partition: i32,
        catalog: &[Option<MapStatus>],
    ) -> Result<Vec<(BlockId, BlockManagerId, u64)>> {
        let mut out = Vec::new();
        for (map_id, slot) in catalog.iter().enumerate() {
            let map_id = map_id as MapId;
            let status = slot.as_ref().ok_or(ClientError::MetadataFetchFailed {
                shuffle_id,
                partition_id: start_partition,
            })?;
            for reduce_id in start_partition..end_partition {
                let size = status.size_for_block(reduce_id);
                if size > 0 {
                    out.push((BlockId::new(shuffle_id, map_id, reduce_id), status.location().clone(), size));
                }
            }
        }
        Ok(out)
    }

    pub fn unregister_shuffle(&self, shuffle_id: ShuffleId) {
        self.map_statuses.remove(&shuffle_id);
    }

    /// Drops the entire cache exactly once per distinct epoch value,
    /// so a burst of identical `updateEpoch` calls (every worker
    /// hears the topology change once) does not re-clear a cache
    /// that's already been refreshed since.
    pub fn update_epoch(&self, new_epoch: u64) {
        let mut epoch = self.epoch.lock();
        if new_epoch <= *epoch {
            return;
        }
        tracing::info!(from = *epoch, to = new_epoch, "epoch advanced, dropping cached catalogs");
        *epoch = new_epoch;
        self.map_statuses.clear();
    }

    pub fn current_epoch(&self) -> u64 {
        *self.epoch.lock()
    }

    pub fn stop(&self) -> Result<bool> {
        Ok(self.endpoint.send_stop()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use transport::local::LocalEndpoint;

    fn bm(exec: &str, host: &str) -> BlockManagerId {
        BlockManagerId::new(exec, host, 7337)
    }

    fn sample_wire_bytes(statuses: &[Option<MapStatus>], resolver: &transport::local::LocalBroadcastManager) -> Vec<u8> {
        wire::serialize_map_statuses(statuses, resolver, true, 1 << 20).unwrap().bytes
    }

    #[test]
    fn s1_basic_roundtrip() {
        let resolver = Arc::new(transport::local::LocalBroadcastManager::default());
        let statuses = vec![
            Some(MapStatus::compressed(bm("e0", "host-a"), &[10, 20, 30])),
            Some(MapStatus::compressed(bm("e1", "host-b"), &[5, 5, 5])),
        ];
        let bytes = sample_wire_bytes(&statuses, &resolver);

        let resolver_for_endpoint = resolver.clone();
        let endpoint = Arc::new(LocalEndpoint::new(move |shuffle_id| {
            assert_eq!(shuffle_id, 7);
            let _ = &resolver_for_endpoint;
            Ok(bytes.clone())
        }));
        let client = TrackerClient::new(endpoint, resolver);

        let grouped = client.get_map_sizes_by_executor_id(7, 0, 3).unwrap();
        assert_eq!(grouped.len(), 2);
        let total: u64 = grouped.iter().flat_map(|(_, blocks)| blocks.iter().map(|(_, s)| *s)).sum();
        assert!(total > 0);
    }

    #[test]
    fn s2_missing_map_is_metadata_fetch_failed_with_start_partition() {
        let resolver = Arc::new(transport::local::LocalBroadcastManager::default());
        let statuses = vec![Some(MapStatus::compressed(bm("e0", "host-a"), &[10, 20, 30])), None, None];
        let bytes = sample_wire_bytes(&statuses, &resolver);

        let endpoint = Arc::new(LocalEndpoint::new(move |_| Ok(bytes.clone())));
        let client = TrackerClient::new(endpoint, resolver);

        let err = client.get_map_sizes_by_executor_id(7, 0, 3).unwrap_err();
        match err {
            ClientError::MetadataFetchFailed { shuffle_id, partition_id } => {
                assert_eq!(shuffle_id, 7);
                assert_eq!(partition_id, 0);
            }
            other => panic!("expected MetadataFetchFailed, got {other:?}"),
        }
    }

    #[test]
    fn concurrent_first_fetches_coalesce_into_one_rpc() {
        let resolver = Arc::new(transport::local::LocalBroadcastManager::default());
        let statuses = vec![Some(MapStatus::compressed(bm("e0", "host-a"), &[10]))];
        let bytes = sample_wire_bytes(&statuses, &resolver);

        let rpc_count = Arc::new(AtomicUsize::new(0));
        let rpc_count_clone = rpc_count.clone();
        let endpoint = Arc::new(LocalEndpoint::new(move |_| {
            rpc_count_clone.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(bytes.clone())
        }));
        let client = Arc::new(TrackerClient::new(endpoint, resolver));

        const THREADS: usize = 8;
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let client = client.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    client.get_statuses(42).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(rpc_count.load(Ordering::SeqCst), 1, "every concurrent first-fetch must share one RPC");
    }

    #[test]
    fn epoch_bump_drops_cache_and_forces_refetch() {
        let resolver = Arc::new(transport::local::LocalBroadcastManager::default());
        let statuses = vec![Some(MapStatus::compressed(bm("e0", "host-a"), &[10]))];
        let bytes = sample_wire_bytes(&statuses, &resolver);

        let rpc_count = Arc::new(AtomicUsize::new(0));
        let rpc_count_clone = rpc_count.clone();
        let endpoint = Arc::new(LocalEndpoint::new(move |_| {
            rpc_count_clone.fetch_add(1, Ordering::SeqCst);
            Ok(bytes.clone())
        }));
        let client = TrackerClient::new(endpoint, resolver);

        client.get_statuses(1).unwrap();
        client.get_statuses(1).unwrap();
        assert_eq!(rpc_count.load(Ordering::SeqCst), 1, "second call should hit the cache");

        client.update_epoch(1);
        client.get_statuses(1).unwrap();
        assert_eq!(rpc_count.load(Ordering::SeqCst), 2, "cache must be dropped after an epoch bump");

        client.update_epoch(1);
        client.get_statuses(1).unwrap();
        assert_eq!(rpc_count.load(Ordering::SeqCst), 2, "a repeated epoch value must not re-clear an already fresh cache");
    }

    #[test]
    fn unregister_shuffle_forces_refetch() {
        let resolver = Arc::new(transport::local::LocalBroadcastManager::default());
        let statuses = vec![Some(MapStatus::compressed(bm("e0", "host-a"), &[10]))];
        let bytes = sample_wire_bytes(&statuses, &resolver);

        let rpc_count = Arc::new(AtomicUsize::new(0));
        let rpc_count_clone = rpc_count.clone();
        let endpoint = Arc::new(LocalEndpoint::new(move |_| {
            rpc_count_clone.fetch_add(1, Ordering::SeqCst);
            Ok(bytes.clone())
        }));
        let client = TrackerClient::new(endpoint, resolver);

        client.get_statuses(3).unwrap();
        client.unregister_shuffle(3);
        client.get_statuses(3).unwrap();
        assert_eq!(rpc_count.load(Ordering::SeqCst), 2);
    }
}

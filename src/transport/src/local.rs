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

//! In-process stand-ins for the transport and broadcast manager,
//! good enough to exercise the protocol end to end in tests and in
//! the `node` demo binary without standing up a real network stack.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    BroadcastHandle, BroadcastManager, BroadcastPayload, BroadcastResolver, ClientIdentity,
    RpcEndpoint, TransportError,
};

/// Routes `ask_get_map_output_statuses` straight into a closure — in
/// practice the authority's own dispatch entry point — skipping any
/// wire hop. `send_stop` reports success unconditionally; there is no
/// real connection to tear down.
pub struct LocalEndpoint<F>
where
    F: Fn(i32) -> Result<Vec<u8>, TransportError> + Send + Sync,
{
    handler: F,
}

impl<F> LocalEndpoint<F>
where
    F: Fn(i32) -> Result<Vec<u8>, TransportError> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> RpcEndpoint for LocalEndpoint<F>
where
    F: Fn(i32) -> Result<Vec<u8>, TransportError> + Send + Sync,
{
    fn ask_get_map_output_statuses(&self, shuffle_id: i32) -> Result<Vec<u8>, TransportError> {
        (self.handler)(shuffle_id)
    }

    fn send_stop(&self) -> Result<bool, TransportError> {
        Ok(true)
    }
}

/// A client identity fixed at construction time, for tests that need
/// to exercise `checkAuthorization`.
pub struct StaticIdentity(pub Option<String>);

impl ClientIdentity for StaticIdentity {
    fn app_id(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[derive(Debug)]
struct LocalPayload {
    bytes: Mutex<Option<Vec<u8>>>,
    destroyed: AtomicBool,
}

impl BroadcastPayload for LocalPayload {
    fn value(&self) -> Vec<u8> {
        self.bytes.lock().clone().unwrap_or_default()
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        *self.bytes.lock() = None;
    }
}

/// Broadcast manager that just holds the bytes in memory. Good enough
/// to exercise the DIRECT/BROADCAST framing switch (spec §4.2, S4)
/// without depending on a real cluster-wide distribution layer.
#[derive(Default)]
pub struct LocalBroadcastManager {
    next_id: AtomicU64,
    registry: Mutex<HashMap<u64, Arc<LocalPayload>>>,
}

impl BroadcastManager for LocalBroadcastManager {
    fn new_broadcast(&self, bytes: Vec<u8>, _is_local: bool) -> BroadcastHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let payload = Arc::new(LocalPayload {
            bytes: Mutex::new(Some(bytes)),
            destroyed: AtomicBool::new(false),
        });
        self.registry.lock().insert(id, payload.clone());
        BroadcastHandle::new(id, payload)
    }
}

impl BroadcastResolver for LocalBroadcastManager {
    fn resolve(&self, id: u64) -> Option<Vec<u8>> {
        let registry = self.registry.lock();
        let payload = registry.get(&id)?;
        if payload.destroyed.load(Ordering::SeqCst) {
            None
        } else {
            Some(payload.value())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_handle_round_trips_and_destroys() {
        let mgr = LocalBroadcastManager::default();
        let handle = mgr.new_broadcast(vec![1, 2, 3], true);
        assert_eq!(handle.value(), vec![1, 2, 3]);
        handle.destroy();
        assert!(handle.value().is_empty());
    }

    #[test]
    fn local_endpoint_delegates_to_closure() {
        let endpoint = LocalEndpoint::new(|shuffle_id| Ok(vec![shuffle_id as u8]));
        assert_eq!(endpoint.ask_get_map_output_statuses(7).unwrap(), vec![7]);
        assert!(endpoint.send_stop().unwrap());
    }
}

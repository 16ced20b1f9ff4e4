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

//! Interfaces for the collaborators the tracker subsystem consumes
//! from its environment but does not implement itself: the RPC
//! transport and the broadcast manager (see spec §6, "Provided
//! collaborators"). Only [`local`] ships a concrete implementation,
//! in-process wiring meant for tests and for the `node` demo binary;
//! a production deployment plugs a real transport (tonic, a custom
//! framed-TCP protocol, whatever the surrounding system already uses)
//! in behind the same traits.

pub mod local;

use std::sync::Arc;

/// Well-known endpoint name the authority registers with the transport.
pub const MAP_OUTPUT_TRACKER_ENDPOINT: &str = "MapOutputTracker";

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("rpc timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("no route to endpoint {0}")]
    NoRoute(String),
    #[error("transport closed")]
    Closed,
}

/// What a `TrackerClient` needs from the RPC layer to reach the
/// authority. A real implementation authenticates, frames, and
/// delivers bytes over the wire; it does not interpret them.
pub trait RpcEndpoint: Send + Sync {
    /// Ask-with-timeout: send `GetMapOutputStatuses(shuffle_id)` and
    /// block for the framed catalog reply.
    fn ask_get_map_output_statuses(&self, shuffle_id: i32) -> Result<Vec<u8>, TransportError>;

    /// Send `StopMapOutputTracker` and await its boolean reply.
    fn send_stop(&self) -> Result<bool, TransportError>;
}

/// Identity of the client making a stream request, as the transport's
/// per-connection authentication layer would supply it.
pub trait ClientIdentity: Send + Sync {
    fn app_id(&self) -> Option<&str>;
}

/// Opaque handle to a broadcast artifact. Cheap to clone and to hold;
/// the expensive payload lives in the broadcast manager, not here.
#[derive(Debug, Clone)]
pub struct BroadcastHandle {
    pub id: u64,
    inner: Arc<dyn BroadcastPayload>,
}

impl BroadcastHandle {
    pub fn new(id: u64, payload: Arc<dyn BroadcastPayload>) -> Self {
        Self { id, inner: payload }
    }

    /// Pull the broadcast's payload bytes (itself a DIRECT-framed blob
    /// per the wire contract).
    pub fn value(&self) -> Vec<u8> {
        self.inner.value()
    }

    /// Non-blocking, error-swallowing destroy: broadcast teardown RPCs
    /// to dead workers must never cascade failure into the catalog
    /// that invalidated this handle.
    pub fn destroy(&self) {
        self.inner.destroy();
    }
}

pub trait BroadcastPayload: Send + Sync + std::fmt::Debug {
    fn value(&self) -> Vec<u8>;
    fn destroy(&self);
}

/// Distribution primitive: ships a large blob once per node and hands
/// back a cheap handle. `is_local` mirrors the source system's
/// single-process test/dev mode, where "broadcast" degenerates to
/// holding the bytes in memory.
pub trait BroadcastManager: Send + Sync {
    fn new_broadcast(&self, bytes: Vec<u8>, is_local: bool) -> BroadcastHandle;
}

/// Counterpart a receiver uses to turn a broadcast id (the only thing
/// that travels over the wire) back into bytes. A real broadcast layer
/// fetches the blob from whichever node published it; [`local`]'s
/// implementation just looks the id up in a local table.
pub trait BroadcastResolver: Send + Sync {
    fn resolve(&self, id: u64) -> Option<Vec<u8>>;
}

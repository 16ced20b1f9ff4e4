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

use std::iter::Peekable;
use std::sync::Arc;

use crate::buffer::{LazyBufferSequence, ManagedBuffer};

/// A connection identifier, as the transport layer would supply it.
/// Out of scope to model further here (spec: "RPC transport internals").
pub type ConnectionId = u64;

/// Per-stream mutable state: the registered app id, the connection
/// allowed to consume it, the remaining lazy sequence, and the chunk
/// bookkeeping `registerStream`/`getChunk`/`chunkBeingSent` mutate.
pub(crate) struct StreamState {
    pub(crate) app_id: Option<String>,
    pub(crate) connection: Option<ConnectionId>,
    pub(crate) buffers: Peekable<LazyBufferSequence>,
    pub(crate) next_expected_chunk_index: i64,
    pub(crate) chunks_in_flight: u64,
}

impl StreamState {
    pub(crate) fn new(app_id: Option<String>, buffers: LazyBufferSequence) -> Self {
        Self {
            app_id,
            connection: None,
            buffers: buffers.peekable(),
            next_expected_chunk_index: 0,
            chunks_in_flight: 0,
        }
    }

    /// Whether the lazy sequence has no more buffers to hand out.
    pub(crate) fn is_drained(&mut self) -> bool {
        self.buffers.peek().is_none()
    }

    /// Release every remaining buffer, consuming the sequence.
    pub(crate) fn release_remaining(&mut self) {
        for buffer in self.buffers.by_ref() {
            buffer.release();
        }
    }
}

impl std::fmt::Debug for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamState")
            .field("app_id", &self.app_id)
            .field("connection", &self.connection)
            .field("next_expected_chunk_index", &self.next_expected_chunk_index)
            .field("chunks_in_flight", &self.chunks_in_flight)
            .finish()
    }
}

#[allow(dead_code)]
fn assert_send<T: Send>() {}
#[allow(dead_code)]
fn _assertions() {
    assert_send::<Arc<dyn ManagedBuffer>>();
}

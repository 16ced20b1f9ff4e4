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

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use transport::ClientIdentity;

use crate::buffer::{LazyBufferSequence, ManagedBuffer};
use crate::error::{ChunkError, Result};
use crate::stream_state::{ConnectionId, StreamState};

/// Serves ordered, one-shot chunk sequences to the single connection
/// each claims. A stream is removed from the registry the moment its
/// sequence drains or its connection terminates — whichever comes
/// first (spec §4.5).
pub struct ChunkServer {
    streams: DashMap<i64, Arc<Mutex<StreamState>>>,
    next_stream_id: AtomicI64,
}

impl Default for ChunkServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkServer {
    pub fn new() -> Self {
        // A random 32-bit seed times 1000 keeps stream ids from
        // different process runs visually distinct in logs, the same
        // convention the source system's OneForOneStreamManager uses.
        let seed: u32 = rand::thread_rng().gen();
        Self {
            streams: DashMap::new(),
            next_stream_id: AtomicI64::new(seed as i64 * 1000),
        }
    }

    pub fn register_stream(&self, app_id: Option<String>, buffers: LazyBufferSequence) -> i64 {
        let stream_id = self.next_stream_id.fetch_add(1, Ordering::SeqCst);
        self.streams.insert(stream_id, Arc::new(Mutex::new(StreamState::new(app_id, buffers))));
        tracing::debug!(stream_id, "stream registered");
        stream_id
    }

    /// Associates `connection` with `stream_id`. At most one
    /// connection is ever allowed per stream; a later call simply
    /// replaces the association, matching a reconnect scenario where
    /// the old connection is already gone.
    pub fn register_channel(&self, connection: ConnectionId, stream_id: i64) -> Result<()> {
        let entry = self.streams.get(&stream_id).ok_or(ChunkError::UnknownStream(stream_id))?;
        entry.lock().connection = Some(connection);
        Ok(())
    }

    /// Produces the next buffer of `stream_id`, requiring
    /// `chunk_index == nextExpectedChunkIndex`. Removes the stream
    /// from the registry once its sequence drains; the handed-out
    /// buffer stays valid regardless.
    pub fn get_chunk(&self, stream_id: i64, chunk_index: i64) -> Result<Arc<dyn ManagedBuffer>> {
        let entry = self.streams.get(&stream_id).ok_or(ChunkError::UnknownStream(stream_id))?.clone();
        let mut state = entry.lock();

        if state.is_drained() {
            return Err(ChunkError::PastEndChunk(stream_id));
        }
        if chunk_index != state.next_expected_chunk_index {
            return Err(ChunkError::OutOfOrderChunk {
                stream_id,
                requested: chunk_index,
                expected: state.next_expected_chunk_index,
            });
        }

        let buffer = state.buffers.next().expect("checked not drained above");
        state.next_expected_chunk_index += 1;

        let now_drained = state.is_drained();
        drop(state);
        if now_drained {
            self.streams.remove(&stream_id);
            tracing::debug!(stream_id, "stream drained, deregistered");
        }
        Ok(buffer)
    }

    /// Accepts the `"streamId_chunkId"` textual form transports use on
    /// the wire and re-enters [`Self::get_chunk`].
    pub fn open_stream(&self, stream_chunk_id: &str) -> Result<Arc<dyn ManagedBuffer>> {
        let (stream_id, chunk_index) = parse_stream_chunk_id(stream_chunk_id)?;
        self.get_chunk(stream_id, chunk_index)
    }

    /// If the client carries an identity, it must match the stream's
    /// registered `appId`; a client with no identity is unconditionally
    /// allowed through, since there is nothing to check it against.
    pub fn check_authorization(&self, identity: &dyn ClientIdentity, stream_id: i64) -> Result<()> {
        let entry = self.streams.get(&stream_id).ok_or(ChunkError::UnknownStream(stream_id))?;
        let state = entry.lock();
        if let Some(client_app_id) = identity.app_id() {
            if state.app_id.as_deref() != Some(client_app_id) {
                return Err(ChunkError::Unauthorized(stream_id));
            }
        }
        Ok(())
    }

    /// Tolerates an unknown stream id as a no-op: by the time a chunk
    /// is done sending, its stream may already have been deregistered
    /// because the sequence drained on the final `getChunk`.
    pub fn chunk_being_sent(&self, stream_id: i64) {
        if let Some(entry) = self.streams.get(&stream_id) {
            entry.lock().chunks_in_flight += 1;
        }
    }

    pub fn chunk_sent(&self, stream_id: i64) {
        if let Some(entry) = self.streams.get(&stream_id) {
            let mut state = entry.lock();
            state.chunks_in_flight = state.chunks_in_flight.saturating_sub(1);
        }
    }

    pub fn chunks_being_transferred(&self) -> u64 {
        self.streams.iter().map(|entry| entry.value().lock().chunks_in_flight).sum()
    }

    /// Deregisters and releases every remaining buffer of every stream
    /// associated with `connection`. Buffers are reference-counted
    /// external resources; leaking one leaks whatever it wraps (a file
    /// descriptor, a pooled network buffer).
    pub fn connection_terminated(&self, connection: ConnectionId) {
        let affected: Vec<i64> = self
            .streams
            .iter()
            .filter(|entry| entry.value().lock().connection == Some(connection))
            .map(|entry| *entry.key())
            .collect();

        for stream_id in affected {
            if let Some((_, state)) = self.streams.remove(&stream_id) {
                state.lock().release_remaining();
                tracing::debug!(stream_id, connection, "connection terminated, stream released");
            }
        }
    }
}

fn parse_stream_chunk_id(raw: &str) -> Result<(i64, i64)> {
    let (stream_part, chunk_part) = raw
        .split_once('_')
        .ok_or_else(|| ChunkError::MalformedStreamChunkId(raw.to_string()))?;
    let stream_id: i64 = stream_part.parse().map_err(|_| ChunkError::MalformedStreamChunkId(raw.to_string()))?;
    let chunk_index: i64 = chunk_part.parse().map_err(|_| ChunkError::MalformedStreamChunkId(raw.to_string()))?;
    Ok((stream_id, chunk_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::InMemoryBuffer;
    use transport::local::StaticIdentity;

    fn sequence(labels: &[&str]) -> (LazyBufferSequence, Vec<Arc<InMemoryBuffer>>) {
        let buffers: Vec<Arc<InMemoryBuffer>> = labels.iter().map(|l| InMemoryBuffer::new(*l)).collect();
        let iter_buffers = buffers.clone();
        let seq: LazyBufferSequence = Box::new(iter_buffers.into_iter().map(|b| b as Arc<dyn ManagedBuffer>));
        (seq, buffers)
    }

    #[test]
    fn s6_chunk_stream_ordering_and_cleanup() {
        let server = ChunkServer::new();
        let (seq, buffers) = sequence(&["b0", "b1", "b2"]);
        let stream_id = server.register_stream(Some("app-1".into()), seq);
        server.register_channel(1, stream_id).unwrap();

        let b0 = server.get_chunk(stream_id, 0).unwrap();
        assert!(format!("{b0:?}").contains("b0"));

        let err = server.get_chunk(stream_id, 2).unwrap_err();
        assert!(matches!(err, ChunkError::OutOfOrderChunk { requested: 2, expected: 1, .. }));

        let _b1 = server.get_chunk(stream_id, 1).unwrap();

        server.connection_terminated(1);
        assert!(buffers[2].was_released());
        assert!(server.streams.get(&stream_id).is_none());
    }

    #[test]
    fn past_end_after_sequence_drains() {
        let server = ChunkServer::new();
        let (seq, _buffers) = sequence(&["only"]);
        let stream_id = server.register_stream(None, seq);

        server.get_chunk(stream_id, 0).unwrap();
        // draining the last chunk deregisters the stream entirely
        let err = server.get_chunk(stream_id, 1).unwrap_err();
        assert!(matches!(err, ChunkError::UnknownStream(_)));
    }

    #[test]
    fn open_stream_parses_composite_id() {
        let server = ChunkServer::new();
        let (seq, _buffers) = sequence(&["a"]);
        let stream_id = server.register_stream(None, seq);
        let result = server.open_stream(&format!("{stream_id}_0"));
        assert!(result.is_ok());

        let err = server.open_stream("not-an-id").unwrap_err();
        assert!(matches!(err, ChunkError::MalformedStreamChunkId(_)));
    }

    #[test]
    fn authorization_checks_identity_only_when_present() {
        let server = ChunkServer::new();
        let (seq, _buffers) = sequence(&["a"]);
        let stream_id = server.register_stream(Some("app-1".into()), seq);

        assert!(server.check_authorization(&StaticIdentity(None), stream_id).is_ok());
        assert!(server.check_authorization(&StaticIdentity(Some("app-1".into())), stream_id).is_ok());
        let err = server.check_authorization(&StaticIdentity(Some("app-2".into())), stream_id).unwrap_err();
        assert!(matches!(err, ChunkError::Unauthorized(_)));
    }

    #[test]
    fn chunk_in_flight_tracking_tolerates_unknown_streams() {
        let server = ChunkServer::new();
        let (seq, _buffers) = sequence(&["a", "b"]);
        let stream_id = server.register_stream(None, seq);

        server.chunk_being_sent(stream_id);
        server.chunk_being_sent(stream_id);
        assert_eq!(server.chunks_being_transferred(), 2);
        server.chunk_sent(stream_id);
        assert_eq!(server.chunks_being_transferred(), 1);

        // no panic for a stream id that was never registered
        server.chunk_being_sent(99999);
        server.chunk_sent(99999);
    }
}

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

pub type Result<T, E = ChunkError> = std::result::Result<T, E>;

/// Error taxonomy for the chunk server. Surfaced to the transport,
/// which is expected to close the offending connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("unknown stream {0}")]
    UnknownStream(i64),

    #[error("stream {stream_id} requested chunk {requested} out of order, expected {expected}")]
    OutOfOrderChunk { stream_id: i64, requested: i64, expected: i64 },

    #[error("stream {0} has no more chunks")]
    PastEndChunk(i64),

    #[error("client is not authorized to access stream {0}")]
    Unauthorized(i64),

    #[error("malformed stream chunk id {0:?}")]
    MalformedStreamChunkId(String),
}

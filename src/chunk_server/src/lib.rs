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

//! One-shot ordered chunk streaming: registers lazy sequences of
//! buffers and serves them chunk-by-chunk to the single connection
//! that claims each stream, reclaiming unsent buffers on disconnect
//! (spec §4.5).

mod buffer;
#[allow(clippy::module_inception)]
mod chunk_server;
mod error;
mod stream_state;

pub use buffer::{InMemoryBuffer, LazyBufferSequence, ManagedBuffer};
pub use chunk_server::ChunkServer;
pub use error::{ChunkError, Result};
pub use stream_state::ConnectionId;

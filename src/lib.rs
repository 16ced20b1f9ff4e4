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

//! Map-output tracking for a distributed shuffle.
//!
//! This crate is a thin re-export surface over the workspace members:
//! [`kernel`] for the shared data model, [`wire`] for catalog framing,
//! [`authority`] for the driver-resident tracker, [`tracker_client`]
//! for the worker-resident cache, [`chunk_server`] for one-shot chunk
//! streaming, and [`transport`] for the collaborator traits these all
//! sit behind.

pub use authority::{TrackerAuthority, TrackerConfig};
pub use chunk_server::ChunkServer;
pub use kernel::{BlockId, BlockManagerId, MapStatus, ShuffleId};
pub use tracker_client::TrackerClient;
pub use wire::{deserialize_map_statuses, serialize_map_statuses, WireError};

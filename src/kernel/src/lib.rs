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

//! Shared data model for the shuffle map-output tracker.
//!
//! # Abstraction
//!
//! [`MapStatus`] describes where one map task's output lives and how
//! large each downstream partition of it is. [`BlockManagerId`] is the
//! logical address of the node holding those bytes.
//!
//! [`MapStatus`]: crate::MapStatus
//! [`BlockManagerId`]: crate::BlockManagerId

mod block_manager;
mod map_status;

pub use self::{
    block_manager::BlockManagerId,
    map_status::{compress_size, decompress_size, MapStatus},
};

/// Shuffle identifier, as assigned by the DAG scheduler.
pub type ShuffleId = i32;

/// Index of a map task's output within a shuffle, 0-based.
pub type MapId = i32;

/// Index of a downstream reduce partition, 0-based.
pub type ReducePartitionId = i32;

/// Sentinel enqueued to each dispatcher thread to cascade a clean shutdown.
///
/// Any shuffle id would do as a stand-in; `-99` matches the source
/// system's convention so it is visually distinct from any real id in
/// logs.
pub const POISON_PILL_SHUFFLE_ID: ShuffleId = -99;

/// Identifies one block of shuffle bytes: the output of `map_id`
/// within `shuffle_id`, destined for `reduce_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId {
    pub shuffle_id: ShuffleId,
    pub map_id: MapId,
    pub reduce_id: ReducePartitionId,
}

impl BlockId {
    pub fn new(shuffle_id: ShuffleId, map_id: MapId, reduce_id: ReducePartitionId) -> Self {
        Self { shuffle_id, map_id, reduce_id }
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "shuffle_{}_{}_{}", self.shuffle_id, self.map_id, self.reduce_id)
    }
}

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

use kernel::ShuffleId;
use transport::TransportError;
use wire::WireError;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Error taxonomy for the worker-resident cache.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Wire(#[from] WireError),

    /// A fetched catalog has at least one empty slot within the
    /// requested reduce-partition range. `partition_id` is the start of
    /// that range, matching the source system's
    /// `MetadataFetchFailedException(shuffleId, startPartition, ...)`
    /// convention rather than naming the specific missing map.
    #[error("metadata fetch failed for shuffle {shuffle_id} partition {partition_id}")]
    MetadataFetchFailed { shuffle_id: ShuffleId, partition_id: i32 },
}

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

//! Driver-resident half of the shuffle map-output tracker: the
//! per-stage catalog ([`ShuffleStatus`]), the authority that owns
//! every catalog and services metadata RPCs through a dispatcher
//! pool ([`TrackerAuthority`]), and the epoch used to invalidate
//! worker caches on topology change.

mod config;
mod dispatcher;
mod epoch;
mod error;
mod shuffle_status;
mod statistics;
mod tracker_authority;

pub use config::{TrackerConfig, REDUCER_PREF_LOCS_FRACTION, SHUFFLE_PREF_MAP_THRESHOLD, SHUFFLE_PREF_REDUCE_THRESHOLD};
pub use dispatcher::PendingRequest;
pub use epoch::Epoch;
pub use error::{AuthorityError, Result};
pub use shuffle_status::ShuffleStatus;
pub use statistics::MapOutputStatistics;
pub use tracker_authority::TrackerAuthority;

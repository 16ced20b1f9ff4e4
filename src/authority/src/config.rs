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

use crate::error::AuthorityError;

/// Threshold below which `numMaps`/`numReducers` still get a locality
/// computation (spec §4.3, `getPreferredLocationsForShuffle`).
pub const SHUFFLE_PREF_MAP_THRESHOLD: i32 = 1000;
pub const SHUFFLE_PREF_REDUCE_THRESHOLD: i32 = 1000;
pub const REDUCER_PREF_LOCS_FRACTION: f64 = 0.2;

/// Configuration for a [`crate::TrackerAuthority`]. Loading this from
/// a file or environment is outside this crate's scope (spec §1); a
/// caller builds one however its own configuration layer prefers and
/// hands it to `TrackerAuthority::new`.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Threshold above which catalog replies switch to broadcast delivery.
    pub min_size_for_broadcast: usize,
    pub max_rpc_message_size: usize,
    pub shuffle_locality_enabled: bool,
    /// Above this, `getStatistics`'s summation parallelizes.
    pub parallel_agg_threshold: usize,
    pub dispatcher_num_threads: usize,
    /// Passed through to the broadcast manager; `true` in
    /// single-process deployments where "broadcast" has no real
    /// distribution to do.
    pub local_mode: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_size_for_broadcast: 512 * 1024,
            max_rpc_message_size: 128 * 1024 * 1024,
            shuffle_locality_enabled: true,
            parallel_agg_threshold: 10_000_000,
            dispatcher_num_threads: 8,
            local_mode: false,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), AuthorityError> {
        if self.min_size_for_broadcast > self.max_rpc_message_size {
            return Err(AuthorityError::InvalidConfiguration(format!(
                "min_size_for_broadcast ({}) must be <= max_rpc_message_size ({})",
                self.min_size_for_broadcast, self.max_rpc_message_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_broadcast_threshold_above_rpc_max() {
        let config = TrackerConfig {
            min_size_for_broadcast: 200 * 1024 * 1024,
            max_rpc_message_size: 128 * 1024 * 1024,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn defaults_are_valid() {
        assert!(TrackerConfig::default().validate().is_ok());
    }
}

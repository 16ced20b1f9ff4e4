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

use std::collections::HashMap;

use kernel::{BlockManagerId, MapStatus, ShuffleId};
use rayon::prelude::*;

use crate::shuffle_status::ShuffleStatus;

/// Total bytes per downstream reduce partition, summed across every
/// map in a shuffle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapOutputStatistics {
    pub shuffle_id: ShuffleId,
    pub total_size: Vec<u64>,
}

/// Sums `totalSize[reducePartition]` across all maps. Holds
/// `status`'s lock for the entire aggregation — statuses may not
/// mutate mid-aggregation (spec §4.3). Above `parallel_agg_threshold`
/// the reducer-partition range is split into near-equal contiguous
/// sub-ranges and summed with scoped parallelism; each thread only
/// ever touches its own sub-range of the output, so no synchronization
/// is needed across them.
pub fn get_statistics(
    shuffle_id: ShuffleId,
    status: &ShuffleStatus,
    num_reduces: usize,
    parallel_agg_threshold: usize,
) -> MapOutputStatistics {
    status.with_map_statuses(|statuses| {
        let total_size = if statuses.len() * num_reduces > parallel_agg_threshold {
            sum_parallel(statuses, num_reduces, parallel_agg_threshold)
        } else {
            sum_sequential(statuses, num_reduces)
        };
        MapOutputStatistics { shuffle_id, total_size }
    })
}

fn sum_sequential(statuses: &[Option<MapStatus>], num_reduces: usize) -> Vec<u64> {
    let mut total = vec![0u64; num_reduces];
    for status in statuses.iter().flatten() {
        for (partition, slot) in total.iter_mut().enumerate() {
            *slot += status.size_for_block(partition as i32);
        }
    }
    total
}

fn sum_parallel(statuses: &[Option<MapStatus>], num_reduces: usize, threshold: usize) -> Vec<u64> {
    let parallelism = std::cmp::min(
        rayon::current_num_threads(),
        statuses.len() * num_reduces / threshold + 1,
    )
    .max(1);
    let chunk_size = num_reduces.div_ceil(parallelism).max(1);

    let mut total = vec![0u64; num_reduces];
    total
        .par_chunks_mut(chunk_size)
        .enumerate()
        .for_each(|(chunk_idx, chunk)| {
            let base = chunk_idx * chunk_size;
            for status in statuses.iter().flatten() {
                for (offset, slot) in chunk.iter_mut().enumerate() {
                    *slot += status.size_for_block((base + offset) as i32);
                }
            }
        });
    total
}

/// For `reducer_id`, sums bytes per [`BlockManagerId`] across all
/// non-empty statuses; returns every location whose fraction of the
/// total is at least `fraction_threshold`. `None` if there is no such
/// location (including the degenerate case of zero total bytes).
pub fn get_locations_with_largest_outputs(
    statuses: &[Option<MapStatus>],
    reducer_id: i32,
    fraction_threshold: f64,
) -> Option<Vec<BlockManagerId>> {
    let mut by_location: HashMap<&BlockManagerId, u64> = HashMap::new();
    let mut total: u64 = 0;

    for status in statuses.iter().flatten() {
        let size = status.size_for_block(reducer_id);
        if size > 0 {
            total += size;
            *by_location.entry(status.location()).or_insert(0) += size;
        }
    }

    if total == 0 {
        return None;
    }

    let winners: Vec<BlockManagerId> = by_location
        .into_iter()
        .filter(|(_, size)| (*size as f64) / (total as f64) >= fraction_threshold)
        .map(|(loc, _)| loc.clone())
        .collect();

    if winners.is_empty() {
        None
    } else {
        Some(winners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::MapId;

    fn bm(exec: &str, host: &str) -> BlockManagerId {
        BlockManagerId::new(exec, host, 7337)
    }

    #[test]
    fn sequential_and_parallel_paths_agree() {
        let status = ShuffleStatus::new(50);
        for m in 0..50i32 {
            let sizes: Vec<u64> = (0..10u64).map(|r| (m as u64 + 1) * (r + 1)).collect();
            status.add_map_output(m as MapId, MapStatus::compressed(bm(&format!("e{m}"), "h"), &sizes));
        }

        let seq = status.with_map_statuses(|s| sum_sequential(s, 10));
        let par = status.with_map_statuses(|s| sum_parallel(s, 10, 1));
        // both are lossy through the same compression, so they must agree with each other exactly
        assert_eq!(seq, par);
    }

    #[test]
    fn locality_gate_matches_s3() {
        let status = ShuffleStatus::new(3);
        status.add_map_output(0, MapStatus::compressed(bm("eA", "host-a"), &[10, 20, 30]));
        status.add_map_output(1, MapStatus::compressed(bm("eB", "host-b"), &[5, 5, 5]));
        status.add_map_output(2, MapStatus::compressed(bm("eA", "host-a"), &[0, 100, 0]));

        let winners = status
            .with_map_statuses(|s| get_locations_with_largest_outputs(s, 1, 0.2))
            .unwrap();
        assert_eq!(winners, vec![bm("eA", "host-a")]);
    }

    #[test]
    fn no_winner_when_nothing_registered() {
        let status = ShuffleStatus::new(2);
        let winners = status.with_map_statuses(|s| get_locations_with_largest_outputs(s, 0, 0.2));
        assert!(winners.is_none());
    }
}

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

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::BlockManagerId;

/// Base of the logarithm used to bucket partition byte sizes into a
/// single compressed byte. Matches the source system's `LOG_BASE`.
const LOG_BASE: f64 = 1.1;

/// Above this exact size a highly-compressed status still records the
/// partition's compressed size exactly instead of folding it into the
/// average, so one outsized partition cannot skew every other
/// partition's estimate.
const HUGE_BLOCK_THRESHOLD: u64 = 1 << 20; // 1 MiB, uncompressed

/// Log-bucket a byte count into a single byte. `0` maps to `0`; any
/// positive size maps to `max(1, ceil(log_base(size)))`, clamped to
/// `u8::MAX`.
pub fn compress_size(bytes: u64) -> u8 {
    if bytes == 0 {
        0
    } else if bytes <= 1 {
        1
    } else {
        let bucket = (bytes as f64).log(LOG_BASE).ceil();
        bucket.clamp(1.0, u8::MAX as f64) as u8
    }
}

/// Inverse of [`compress_size`]. `0` decodes to `0`.
pub fn decompress_size(byte: u8) -> u64 {
    if byte == 0 {
        0
    } else {
        LOG_BASE.powi(byte as i32).round() as u64
    }
}

/// One map task's output: where it lives, and an estimate of each
/// downstream partition's byte size.
///
/// The two variants are a tagged union chosen at registration time by
/// whichever the map task's executor produced; the serializer (see the
/// `wire` crate) must round-trip either without caring which one it has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapStatus {
    /// One log-bucketed byte per downstream partition.
    Compressed {
        location: BlockManagerId,
        compressed_sizes: Vec<u8>,
    },
    /// For catalogs with many partitions: only partitions that are
    /// empty or unusually large are recorded explicitly; every other
    /// non-empty partition shares a single average size.
    HighlyCompressed {
        location: BlockManagerId,
        num_reduces: i32,
        empty_blocks: HashSet<i32>,
        avg_size: u64,
        /// Exact compressed sizes for partitions whose uncompressed
        /// size exceeded [`HUGE_BLOCK_THRESHOLD`].
        huge_blocks: HashMap<i32, u8>,
    },
}

impl MapStatus {
    /// Build the compressed (one byte per partition) variant.
    pub fn compressed(location: BlockManagerId, uncompressed_sizes: &[u64]) -> Self {
        MapStatus::Compressed {
            location,
            compressed_sizes: uncompressed_sizes.iter().copied().map(compress_size).collect(),
        }
    }

    /// Build the highly-compressed variant from exact uncompressed
    /// partition sizes, following the source system's thresholding: the
    /// average is derived from the *sum* of non-huge, non-empty
    /// uncompressed sizes divided by their count, not by decompressing
    /// an already-lossy average.
    pub fn highly_compressed(location: BlockManagerId, uncompressed_sizes: &[u64]) -> Self {
        let num_reduces = uncompressed_sizes.len() as i32;
        let mut empty_blocks = HashSet::new();
        let mut huge_blocks = HashMap::new();
        let mut total: u128 = 0;
        let mut counted = 0u64;

        for (idx, &size) in uncompressed_sizes.iter().enumerate() {
            let partition = idx as i32;
            if size == 0 {
                empty_blocks.insert(partition);
            } else if size > HUGE_BLOCK_THRESHOLD {
                huge_blocks.insert(partition, compress_size(size));
            } else {
                total += size as u128;
                counted += 1;
            }
        }

        let avg_size = if counted == 0 { 0 } else { (total / counted as u128) as u64 };

        MapStatus::HighlyCompressed {
            location,
            num_reduces,
            empty_blocks,
            avg_size,
            huge_blocks,
        }
    }

    pub fn location(&self) -> &BlockManagerId {
        match self {
            MapStatus::Compressed { location, .. } => location,
            MapStatus::HighlyCompressed { location, .. } => location,
        }
    }

    /// Size estimate for one downstream partition's block.
    pub fn size_for_block(&self, partition_id: i32) -> u64 {
        match self {
            MapStatus::Compressed { compressed_sizes, .. } => compressed_sizes
                .get(partition_id as usize)
                .map(|&b| decompress_size(b))
                .unwrap_or(0),
            MapStatus::HighlyCompressed {
                num_reduces,
                empty_blocks,
                avg_size,
                huge_blocks,
                ..
            } => {
                if partition_id < 0 || partition_id >= *num_reduces {
                    return 0;
                }
                if let Some(&huge) = huge_blocks.get(&partition_id) {
                    decompress_size(huge)
                } else if empty_blocks.contains(&partition_id) {
                    0
                } else {
                    *avg_size
                }
            }
        }
    }
}

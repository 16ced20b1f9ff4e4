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

//! Bidirectional compact encoding of a shuffle catalog, with adaptive
//! direct-reply vs. broadcast delivery to stay under a message-size
//! budget.
//!
//! # Wire format
//!
//! Byte 0 is a tag: `DIRECT` (`0x00`) or `BROADCAST` (`0x01`). Any
//! other tag is [`WireError::Protocol`]. The remaining bytes are a
//! GZIP-compressed, `bincode`-encoded payload: for `DIRECT` the
//! payload is the `Vec<Option<MapStatus>>` array itself; for
//! `BROADCAST` the payload is a [`BroadcastRef`] pointing at a
//! DIRECT-framed blob held by the broadcast manager. This framing is
//! the wire contract and must stay stable across versions of this
//! crate.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use kernel::MapStatus;
use serde::{Deserialize, Serialize};
use transport::{BroadcastHandle, BroadcastManager, BroadcastResolver};

const DIRECT: u8 = 0x00;
const BROADCAST: u8 = 0x01;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("io error while framing catalog: {0}")]
    Io(String),
    #[error("failed to encode catalog: {0}")]
    Encode(String),
    #[error("failed to decode catalog: {0}")]
    Decode(String),
    #[error("unknown wire tag {0:#x}")]
    Protocol(u8),
    #[error("broadcast handle could not be resolved")]
    DanglingBroadcast,
}

#[derive(Debug, Serialize, Deserialize)]
struct BroadcastRef {
    id: u64,
}

/// Result of [`serialize_map_statuses`]: the bytes to send as the RPC
/// reply, and — only when the reply switched to broadcast delivery —
/// the handle the catalog must pin for the broadcast artifact's
/// lifetime.
pub struct SerializedCatalog {
    pub bytes: Vec<u8>,
    pub broadcast: Option<BroadcastHandle>,
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>, WireError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).map_err(|e| WireError::Io(e.to_string()))?;
    encoder.finish().map_err(|e| WireError::Io(e.to_string()))
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>, WireError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(|e| WireError::Io(e.to_string()))?;
    Ok(out)
}

/// Encode `statuses` as a DIRECT blob; if its length meets or exceeds
/// `min_broadcast_size`, replace it with a small BROADCAST blob that
/// points at the original, publishing the original through
/// `broadcast_mgr`.
///
/// Callers are expected to hold whatever exclusion guards `statuses`
/// for the duration of this call (spec: "synchronize on the statuses
/// array while encoding to tolerate concurrent authoritative
/// mutation") — this function takes an immutable snapshot slice and
/// does no locking of its own.
pub fn serialize_map_statuses(
    statuses: &[Option<MapStatus>],
    broadcast_mgr: &dyn BroadcastManager,
    local_mode: bool,
    min_broadcast_size: usize,
) -> Result<SerializedCatalog, WireError> {
    let encoded = bincode::serialize(statuses).map_err(|e| WireError::Encode(e.to_string()))?;
    let compressed = gzip(&encoded)?;

    let mut direct_blob = Vec::with_capacity(compressed.len() + 1);
    direct_blob.push(DIRECT);
    direct_blob.extend_from_slice(&compressed);

    if direct_blob.len() < min_broadcast_size {
        return Ok(SerializedCatalog { bytes: direct_blob, broadcast: None });
    }

    tracing::debug!(
        bytes = direct_blob.len(),
        min_broadcast_size,
        "catalog exceeds broadcast threshold, switching to broadcast delivery"
    );

    let handle = broadcast_mgr.new_broadcast(direct_blob, local_mode);
    let reference = BroadcastRef { id: handle.id };
    let ref_encoded = bincode::serialize(&reference).map_err(|e| WireError::Encode(e.to_string()))?;
    let ref_compressed = gzip(&ref_encoded)?;

    let mut outer = Vec::with_capacity(ref_compressed.len() + 1);
    outer.push(BROADCAST);
    outer.extend_from_slice(&ref_compressed);

    Ok(SerializedCatalog { bytes: outer, broadcast: Some(handle) })
}

/// Decode a catalog reply, transparently following a `BROADCAST`
/// indirection through `resolver`.
pub fn deserialize_map_statuses(
    bytes: &[u8],
    resolver: &dyn BroadcastResolver,
) -> Result<Vec<Option<MapStatus>>, WireError> {
    let (tag, rest) = bytes.split_first().ok_or(WireError::Protocol(0))?;
    match *tag {
        DIRECT => decode_direct_payload(rest),
        BROADCAST => {
            let raw = gunzip(rest)?;
            let reference: BroadcastRef = bincode::deserialize(&raw).map_err(|e| WireError::Decode(e.to_string()))?;
            let inner = resolver.resolve(reference.id).ok_or(WireError::DanglingBroadcast)?;
            let (inner_tag, inner_rest) = inner.split_first().ok_or(WireError::Protocol(0))?;
            if *inner_tag != DIRECT {
                return Err(WireError::Protocol(*inner_tag));
            }
            decode_direct_payload(inner_rest)
        }
        other => Err(WireError::Protocol(other)),
    }
}

fn decode_direct_payload(gzipped: &[u8]) -> Result<Vec<Option<MapStatus>>, WireError> {
    let raw = gunzip(gzipped)?;
    bincode::deserialize(&raw).map_err(|e| WireError::Decode(e.to_string()))
}

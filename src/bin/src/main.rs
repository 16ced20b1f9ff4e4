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

//! Local demo: brings up an in-process `TrackerAuthority`, a
//! `TrackerClient` wired straight to it through `transport::local`,
//! and a `ChunkServer`, then registers and resolves one shuffle so the
//! whole round trip can be exercised by hand.

use std::sync::Arc;

use clap::Parser;
use kernel::{BlockManagerId, MapStatus};
use transport::local::{LocalBroadcastManager, LocalEndpoint, StaticIdentity};
use transport::{ClientIdentity, TransportError};

#[derive(Parser, Debug)]
#[command(name = "node", about = "Shuffle map-output tracker demo node")]
struct Args {
    /// Number of dispatcher threads the authority runs.
    #[arg(long, default_value_t = 4)]
    dispatcher_threads: usize,

    /// Catalog byte size at or above which replies switch to broadcast delivery.
    #[arg(long, default_value_t = 512 * 1024)]
    broadcast_threshold: usize,

    /// Run every collaborator in-process (the only mode this binary supports today).
    #[arg(long, default_value_t = true)]
    local: bool,

    /// Shuffle id to register and resolve for the demo run.
    #[arg(long, default_value_t = 7)]
    shuffle_id: i32,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    if !args.local {
        anyhow::bail!("only --local is implemented; a real transport is out of scope for this crate");
    }

    let broadcast_mgr = Arc::new(LocalBroadcastManager::default());
    let config = authority::TrackerConfig {
        dispatcher_num_threads: args.dispatcher_threads,
        min_size_for_broadcast: args.broadcast_threshold,
        local_mode: true,
        ..authority::TrackerConfig::default()
    };
    let mut tracker_authority = authority::TrackerAuthority::new(config, broadcast_mgr.clone())?;

    tracker_authority.register_shuffle(args.shuffle_id, 3)?;
    tracker_authority.register_map_output(
        args.shuffle_id,
        0,
        MapStatus::compressed(BlockManagerId::new("exec-0", "host-a", 7337), &[100, 200, 300]),
    )?;
    tracker_authority.register_map_output(
        args.shuffle_id,
        1,
        MapStatus::compressed(BlockManagerId::new("exec-1", "host-b", 7337), &[50, 50, 50]),
    )?;
    tracker_authority.register_map_output(
        args.shuffle_id,
        2,
        MapStatus::compressed(BlockManagerId::new("exec-0", "host-a", 7337), &[0, 400, 0]),
    )?;

    let authority_for_endpoint = Arc::new(tracker_authority);
    let authority_handle = authority_for_endpoint.clone();
    let endpoint = Arc::new(LocalEndpoint::new(move |shuffle_id| {
        let (tx, rx) = crossbeam_channel::unbounded();
        authority_handle.submit_get_map_output_statuses(shuffle_id, tx);
        rx.recv()
            .map_err(|_| TransportError::Closed)?
            .map_err(|e| TransportError::NoRoute(e.to_string()))
    }));

    let client = tracker_client::TrackerClient::new(endpoint, broadcast_mgr);
    let grouped = client.get_map_sizes_by_executor_id(args.shuffle_id, 0, 3)?;

    println!("shuffle {} resolved to {} block manager(s):", args.shuffle_id, grouped.len());
    for (location, blocks) in &grouped {
        println!("  {location}: {} block(s)", blocks.len());
        for (block_id, size) in blocks {
            println!("    {block_id} ~{size} bytes");
        }
    }

    let chunk_server = chunk_server::ChunkServer::new();
    let stream_id = chunk_server.register_stream(
        Some("demo-app".into()),
        Box::new(std::iter::once(chunk_server::InMemoryBuffer::new("demo-chunk") as Arc<dyn chunk_server::ManagedBuffer>)),
    );
    chunk_server.register_channel(1, stream_id)?;
    chunk_server.check_authorization(&StaticIdentity(Some("demo-app".into())) as &dyn ClientIdentity, stream_id)?;
    let chunk = chunk_server.get_chunk(stream_id, 0)?;
    println!("chunk server served {chunk:?} for stream {stream_id}");

    Ok(())
}

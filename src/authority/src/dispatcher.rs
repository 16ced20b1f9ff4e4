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

//! The incoming-request queue and its fixed pool of `MessageLoop`
//! consumers (spec §4.3, "Dispatcher"). Deliberately built on OS
//! threads and a blocking channel rather than an async runtime: this
//! layer's suspension is "classical blocking waits on queues and
//! monitors" (spec §5), not cooperative scheduling.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use kernel::{ShuffleId, POISON_PILL_SHUFFLE_ID};

use crate::error::AuthorityError;

/// One `GetMapOutputStatuses` request, queued by the RPC entry point
/// and consumed by a dispatcher thread. `reply` is `None` only for the
/// poison-pill sentinel.
pub struct PendingRequest {
    pub shuffle_id: ShuffleId,
    pub reply: Option<Sender<Result<Vec<u8>, AuthorityError>>>,
}

impl PendingRequest {
    pub fn new(shuffle_id: ShuffleId, reply: Sender<Result<Vec<u8>, AuthorityError>>) -> Self {
        Self { shuffle_id, reply: Some(reply) }
    }

    fn poison_pill() -> Self {
        Self { shuffle_id: POISON_PILL_SHUFFLE_ID, reply: None }
    }

    fn is_poison_pill(&self) -> bool {
        self.shuffle_id == POISON_PILL_SHUFFLE_ID
    }
}

/// Fixed pool of dispatcher threads draining an unbounded FIFO queue.
pub struct Dispatcher {
    queue_tx: Sender<PendingRequest>,
    handles: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawns `num_threads` consumer threads, each calling `handler`
    /// for every non-sentinel request and replying with its result.
    pub fn start<F>(num_threads: usize, handler: F) -> Self
    where
        F: Fn(ShuffleId) -> Result<Vec<u8>, AuthorityError> + Send + Sync + 'static,
    {
        let (queue_tx, queue_rx): (Sender<PendingRequest>, Receiver<PendingRequest>) = crossbeam_channel::unbounded();
        let handler = Arc::new(handler);

        let handles = (0..num_threads)
            .map(|worker_id| {
                let queue_rx = queue_rx.clone();
                let queue_tx = queue_tx.clone();
                let handler = handler.clone();
                std::thread::Builder::new()
                    .name(format!("map-output-dispatcher-{worker_id}"))
                    .spawn(move || message_loop(worker_id, queue_rx, queue_tx, handler))
                    .expect("failed to spawn dispatcher thread")
            })
            .collect();

        Self { queue_tx, handles }
    }

    pub fn submit(&self, request: PendingRequest) {
        // The requester timed out and hung up; nothing to log, nothing to retry.
        let _ = self.queue_tx.send(request);
    }

    /// Posts one poison pill and joins every dispatcher thread. Each
    /// thread that dequeues the pill re-offers it before exiting, so
    /// one sentinel cascades through the whole pool regardless of its
    /// size.
    pub fn shutdown(mut self) {
        let _ = self.queue_tx.send(PendingRequest::poison_pill());
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn message_loop<F>(worker_id: usize, queue_rx: Receiver<PendingRequest>, queue_tx: Sender<PendingRequest>, handler: Arc<F>)
where
    F: Fn(ShuffleId) -> Result<Vec<u8>, AuthorityError> + Send + Sync + 'static,
{
    loop {
        let request = match queue_rx.recv() {
            Ok(request) => request,
            Err(_) => {
                tracing::warn!(worker_id, "dispatcher queue closed, exiting message loop");
                return;
            }
        };

        if request.is_poison_pill() {
            let _ = queue_tx.send(PendingRequest::poison_pill());
            tracing::debug!(worker_id, "dispatcher thread exiting on poison pill");
            return;
        }

        let shuffle_id = request.shuffle_id;
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(shuffle_id)));
        match outcome {
            Ok(result) => {
                if let Err(e) = &result {
                    tracing::warn!(worker_id, shuffle_id, error = %e, "non-fatal error serving GetMapOutputStatuses");
                }
                if let Some(reply) = request.reply {
                    let _ = reply.send(result);
                }
            }
            Err(_) => {
                tracing::error!(worker_id, shuffle_id, "dispatcher thread panicked, terminating message loop");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn serves_requests_and_shuts_down_cleanly() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let dispatcher = Dispatcher::start(4, move |shuffle_id| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(vec![shuffle_id as u8])
        });

        let (tx, rx) = crossbeam_channel::unbounded();
        dispatcher.submit(PendingRequest::new(7, tx));
        let reply = rx.recv().unwrap().unwrap();
        assert_eq!(reply, vec![7]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        dispatcher.shutdown();
    }
}

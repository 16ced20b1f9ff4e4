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

use std::sync::Arc;

/// One chunk of a stream: a reference-counted handle onto bytes the
/// chunk server itself never reads, only hands out and eventually
/// releases. A real implementation wraps a memory-mapped file segment
/// or a pooled network buffer; [`release`] is where it gives that
/// resource back.
///
/// [`release`]: ManagedBuffer::release
pub trait ManagedBuffer: Send + Sync + std::fmt::Debug {
    /// Release the underlying resource. Called once for every buffer
    /// that is never sent, e.g. because its connection terminated
    /// first. Must tolerate being called at most once per buffer;
    /// the chunk server never calls it twice on the same handle.
    fn release(&self);
}

/// A stream's backing data: produced lazily so registering a stream
/// never has to materialize the whole sequence up front.
pub type LazyBufferSequence = Box<dyn Iterator<Item = Arc<dyn ManagedBuffer>> + Send>;

/// In-memory buffer for tests and the `node` demo binary: `release`
/// just records that it ran, so tests can assert every undrained
/// buffer was released exactly once.
#[derive(Debug)]
pub struct InMemoryBuffer {
    pub label: String,
    released: std::sync::atomic::AtomicBool,
}

impl InMemoryBuffer {
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            released: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn was_released(&self) -> bool {
        self.released.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl ManagedBuffer for InMemoryBuffer {
    fn release(&self) {
        self.released.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

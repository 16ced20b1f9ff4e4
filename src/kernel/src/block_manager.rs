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

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical address of a node's block-storage service: the executor
/// that produced a map output, and the host/port its blocks can be
/// fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockManagerId {
    pub executor_id: String,
    pub host: String,
    pub port: u16,
}

impl BlockManagerId {
    pub fn new(executor_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            executor_id: executor_id.into(),
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BlockManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.executor_id, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_executor_host_port() {
        let bm = BlockManagerId::new("exec-1", "host-a", 7337);
        assert_eq!(bm.to_string(), "exec-1@host-a:7337");
    }
}

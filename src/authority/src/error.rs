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

pub type Result<T, E = AuthorityError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    #[error("shuffle {0} already registered")]
    AlreadyRegistered(ShuffleId),

    #[error("unknown shuffle {0}")]
    UnknownShuffle(ShuffleId),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Wire(#[from] wire::WireError),
}

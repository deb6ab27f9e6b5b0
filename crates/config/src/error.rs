// Copyright 2024 FerroFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config is not well-formed JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate key '{0}' in config")]
    DuplicateKey(String),

    #[error("config version mismatch, expected '{expected}', found '{found}'")]
    Version { expected: String, found: String },

    #[error("invalid browser flag '{0}', expected \"on\" or \"off\"")]
    InvalidBrowser(String),

    #[error("invalid worm flag '{0}', expected \"on\" or \"off\"")]
    InvalidWorm(String),

    #[error("credential is missing")]
    MissingCredential,

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("notify target {target} '{id}': {message}")]
    Target {
        target: &'static str,
        id: String,
        message: String,
    },
}

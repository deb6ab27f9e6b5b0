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

mod config;
mod error;
pub mod notify;

pub use config::{validate_config, Credential, NotifyConfig, ServerConfig};
pub use error::ConfigError;

/// Current config schema version. A config file with any other `version`
/// value is rejected at startup.
pub const SERVER_CONFIG_VERSION: &str = "1";

pub const DEFAULT_REGION: &str = "us-east-1";

// Environment variable names understood by the server binary.
pub const ENV_ACCESS_KEY: &str = "FERROFS_ACCESS_KEY";
pub const ENV_SECRET_KEY: &str = "FERROFS_SECRET_KEY";
pub const ENV_BROWSER: &str = "FERROFS_BROWSER";
pub const ENV_DOMAIN: &str = "FERROFS_DOMAIN";
pub const ENV_CACHE_DRIVES: &str = "FERROFS_CACHE_DRIVES";
pub const ENV_CACHE_EXCLUDE: &str = "FERROFS_CACHE_EXCLUDE";
pub const ENV_CACHE_EXPIRY: &str = "FERROFS_CACHE_EXPIRY";
pub const ENV_WORM: &str = "FERROFS_WORM";

pub const DEFAULT_ACCESS_KEY: &str = "ferrofsadmin";
pub const DEFAULT_SECRET_KEY: &str = "ferrofsadmin";

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

pub mod error;
pub mod fs;
pub mod gateway;
pub mod httprange;
pub mod store_api;

pub use error::{Error, Result, StorageError};
pub use fs::FsStore;
pub use gateway::GatewayStore;
pub use httprange::HTTPRangeSpec;
pub use store_api::ObjectLayer;

use std::time::Duration;

/// Reserved bucket directory holding all server-internal state.
pub const META_BUCKET: &str = ".ferrofs.sys";
/// Per-bucket metadata tree under the meta bucket.
pub const BUCKET_META_PREFIX: &str = "buckets";
/// In-progress multipart uploads under the meta bucket.
pub const MULTIPART_META_PREFIX: &str = "multipart";
/// Per-request temporary files under the meta bucket.
pub const TMP_META_PREFIX: &str = "tmp";
/// Server config tree under the meta bucket.
pub const CONFIG_PREFIX: &str = "config";

pub const FS_META_JSON_FILE: &str = "fs.json";
pub const FORMAT_CONFIG_FILE: &str = "format.json";
pub const BUCKET_POLICY_FILE: &str = "policy.json";
pub const CONFIG_FILE: &str = "config.json";

/// Largest page a single listing call returns.
pub const MAX_OBJECT_LIST: i32 = 1000;

/// Staging buffer for object reads and writes.
pub const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Every part of a multipart upload except the last must be at least this
/// large.
pub const MIN_PART_SIZE: i64 = 5 * 1024 * 1024;

/// Lock acquisition timeout for object operations (PUT/GET/COPY/HEAD).
pub const OBJECT_OP_TIMEOUT: Duration = Duration::from_secs(60);
/// Lock acquisition timeout for delete operations.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(60);
/// Per-entry lock timeout while composing a listing page.
pub const LISTING_TIMEOUT: Duration = Duration::from_secs(10);
/// Idle lifetime of a parked listing walker.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(60);

pub const USAGE_CHECK_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);
pub const MULTIPART_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const MULTIPART_EXPIRY: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Hidden prefix inside every gateway bucket holding emulation state.
pub const GATEWAY_SYS_TMP: &str = "ferrofs.sys.tmp/";
pub const GATEWAY_CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
pub const GATEWAY_MULTIPART_EXPIRY: Duration = Duration::from_secs(14 * 24 * 60 * 60);

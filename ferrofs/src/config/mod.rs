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

use clap::builder::NonEmptyStringValueParser;
use clap::{Args, Parser, Subcommand};


#[derive(Parser, Debug)]
#[command(name = "ferrofs", version, about = "FerroFS Object Storage Server")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the object storage server on a filesystem export path.
    Server(ServerArgs),
    /// Start in gateway mode, proxying to a remote object store backend.
    Gateway(GatewayArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// PATH points to a directory on a filesystem to export over the S3 API.
    #[arg(required = true, value_parser = NonEmptyStringValueParser::new())]
    pub path: String,

    /// Access key used for authentication.
    #[arg(long, env = "FERROFS_ACCESS_KEY", default_value_t = ferrofs_config::DEFAULT_ACCESS_KEY.to_string())]
    pub access_key: String,

    /// Secret key used for authentication.
    #[arg(long, env = "FERROFS_SECRET_KEY", default_value_t = ferrofs_config::DEFAULT_SECRET_KEY.to_string())]
    pub secret_key: String,

    /// Web browser console toggle: "on" or "off".
    #[arg(long, env = "FERROFS_BROWSER")]
    pub browser: Option<String>,

    /// Domain name for virtual-host-style requests.
    #[arg(long, env = "FERROFS_DOMAIN")]
    pub domain: Option<String>,

    /// Write-once-read-many mode: existing objects cannot be overwritten.
    #[arg(long, env = "FERROFS_WORM")]
    pub worm: Option<String>,

    /// Cache drives, ';'-delimited.
    #[arg(long, env = "FERROFS_CACHE_DRIVES", value_delimiter = ';')]
    pub cache_drives: Vec<String>,

    /// Cache exclusion patterns, ';'-delimited.
    #[arg(long, env = "FERROFS_CACHE_EXCLUDE", value_delimiter = ';')]
    pub cache_exclude: Vec<String>,

    /// Cache expiry in days.
    #[arg(long, env = "FERROFS_CACHE_EXPIRY")]
    pub cache_expiry: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct GatewayArgs {
    /// Remote backend kind; "gcs" is the known cloud-store backend.
    #[arg(required = true, value_parser = NonEmptyStringValueParser::new())]
    pub backend: String,

    /// Cloud project id; read from GOOGLE_APPLICATION_CREDENTIALS when
    /// omitted.
    pub project_id: Option<String>,

    /// Remote bucket holding the gateway namespace root; defaults to the
    /// project id.
    #[arg(long, env = "FERROFS_GATEWAY_BUCKET")]
    pub gateway_bucket: Option<String>,

    /// Access key used for authentication.
    #[arg(long, env = "FERROFS_ACCESS_KEY", default_value_t = ferrofs_config::DEFAULT_ACCESS_KEY.to_string())]
    pub access_key: String,

    /// Secret key used for authentication.
    #[arg(long, env = "FERROFS_SECRET_KEY", default_value_t = ferrofs_config::DEFAULT_SECRET_KEY.to_string())]
    pub secret_key: String,

    /// Web browser console toggle: "on" or "off".
    #[arg(long, env = "FERROFS_BROWSER")]
    pub browser: Option<String>,
}

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

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use config::{Command, GatewayArgs, Opt, ServerArgs};
use ferrofs_config::{validate_config, ServerConfig};
use ferrofs_store::fs::workers::{spawn_multipart_cleaner, spawn_usage_scanner};
use ferrofs_store::gateway::{is_valid_project_id, parse_project_id, spawn_gateway_tmp_cleaner, GatewayStore};
use ferrofs_store::store_api::ObjectLayer;
use ferrofs_store::{
    FsStore, CONFIG_FILE, CONFIG_PREFIX, GATEWAY_CLEANUP_INTERVAL, META_BUCKET, MULTIPART_CLEANUP_INTERVAL,
    MULTIPART_EXPIRY, USAGE_CHECK_INTERVAL,
};

const LOGO: &str = r#"

  ░█▀▀░█▀▀░█▀▄░█▀▄░█▀█░█▀▀░█▀▀
  ░█▀▀░█▀▀░█▀▄░█▀▄░█░█░█▀▀░▀▀█
  ░▀░░░▀▀▀░▀░▀░▀░▀░▀▀▀░▀░░░▀▀▀

"#;

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let opt = Opt::parse();

    info!("{}", LOGO);
    info!("FerroFS Object Storage Server");

    let result = match opt.command {
        Command::Server(args) => run_server(args).await,
        Command::Gateway(args) => run_gateway(args).await,
    };

    if let Err(err) = result {
        error!("startup failed: {err}");
        std::process::exit(1);
    }
}

/// Reads the server config from the export, creating a default one on
/// first start, and validates it.
async fn load_or_create_config(export: &PathBuf, args: &ServerArgs) -> Result<ServerConfig, String> {
    let config_dir = export.join(META_BUCKET).join(CONFIG_PREFIX);
    let config_path = config_dir.join(CONFIG_FILE);

    if tokio::fs::metadata(&config_path).await.is_err() {
        let mut config = ServerConfig::new_default(&args.access_key, &args.secret_key);
        config.browser = args.browser.clone().or(config.browser);
        config.domain = args.domain.clone();
        config.worm = args.worm.clone();
        let data = serde_json::to_vec_pretty(&config).map_err(|e| e.to_string())?;
        tokio::fs::create_dir_all(&config_dir).await.map_err(|e| e.to_string())?;
        tokio::fs::write(&config_path, data).await.map_err(|e| e.to_string())?;
        info!(path = %config_path.display(), "wrote default server config");
    }

    let data = tokio::fs::read_to_string(&config_path).await.map_err(|e| e.to_string())?;
    validate_config(&data).map_err(|e| format!("invalid config {}: {e}", config_path.display()))
}

async fn run_server(args: ServerArgs) -> Result<(), String> {
    let export = PathBuf::from(&args.path);
    tokio::fs::create_dir_all(&export).await.map_err(|e| e.to_string())?;

    let config = load_or_create_config(&export, &args).await?;
    info!(region = config.region(), browser = config.browser_enabled(), "configuration loaded");

    // The caching disk tier is wired up elsewhere; its settings are only
    // surfaced here so an operator can confirm what the server saw.
    if !args.cache_drives.is_empty() {
        info!(
            drives = %args.cache_drives.join(";"),
            exclude = %args.cache_exclude.join(";"),
            expiry_days = args.cache_expiry.unwrap_or(90),
            "cache tier configured"
        );
    }

    let worm = config.worm_enabled() || args.worm.as_deref() == Some("on");
    let store = FsStore::new(&export, worm).await.map_err(|e| e.to_string())?;

    let cancel = CancellationToken::new();
    let usage = spawn_usage_scanner(store.clone(), USAGE_CHECK_INTERVAL, cancel.clone());
    let cleaner = spawn_multipart_cleaner(store.clone(), MULTIPART_CLEANUP_INTERVAL, MULTIPART_EXPIRY, cancel.clone());

    info!(path = %export.display(), "filesystem backend ready");
    wait_for_shutdown().await;

    cancel.cancel();
    let _ = usage.await;
    let _ = cleaner.await;
    store.shutdown().await.map_err(|e| e.to_string())?;
    info!("shutdown complete");
    Ok(())
}

async fn run_gateway(args: GatewayArgs) -> Result<(), String> {
    if args.backend != "gcs" {
        return Err(format!("unknown gateway backend '{}'", args.backend));
    }

    let creds_file = std::env::var("GOOGLE_APPLICATION_CREDENTIALS").ok();
    let project_id = match &args.project_id {
        Some(project_id) => project_id.clone(),
        None => {
            let creds = creds_file
                .as_deref()
                .ok_or("project id is required when GOOGLE_APPLICATION_CREDENTIALS is not set")?;
            parse_project_id(creds).map_err(|e| e.to_string())?
        }
    };
    if !is_valid_project_id(&project_id) {
        return Err(format!("project id '{project_id}' is either empty or invalid"));
    }

    let root_bucket = args.gateway_bucket.clone().unwrap_or_else(|| project_id.clone());
    let mut builder = object_store::gcp::GoogleCloudStorageBuilder::new().with_bucket_name(&root_bucket);
    if let Some(creds) = &creds_file {
        builder = builder.with_service_account_path(creds);
    }
    let remote = builder.build().map_err(|e| e.to_string())?;

    let gateway = GatewayStore::new(Arc::new(remote));
    let cancel = CancellationToken::new();
    let cleaner = spawn_gateway_tmp_cleaner(gateway.clone(), GATEWAY_CLEANUP_INTERVAL, cancel.clone());

    info!(%project_id, %root_bucket, "gateway backend ready");
    wait_for_shutdown().await;

    cancel.cancel();
    let _ = cleaner.await;
    gateway.shutdown().await.map_err(|e| e.to_string())?;
    info!("shutdown complete");
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to wait for shutdown signal: {err}");
    }
}

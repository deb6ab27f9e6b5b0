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

//! Multipart emulation for remote backends without native S3 multipart.
//! An upload is a set of component objects under the hidden prefix: one
//! `gateway.json` sidecar written at initiation plus one `NNNNN.<etag>`
//! object per part. Complete stitches the parts into the final object with
//! a tiered compose plan (flat up to 32 components, two levels up to
//! 32 x 32), carrying the sidecar's attributes onto the result.

use futures::StreamExt;
use object_store::path::Path as RemotePath;
use object_store::{Attributes, PutOptions, PutPayload};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ferrofs_utils::path::trim_etag;
use ferrofs_utils::{gen_etag, md5_hex};

use super::{attributes_from_metadata, gw_err, object_info_from_remote, GatewayStore};
use crate::error::{Result, StorageError};
use crate::store_api::{CompletePart, ObjectInfo, ObjectLayer, PartInfo, PutObjReader};
use crate::{GATEWAY_MULTIPART_EXPIRY, GATEWAY_SYS_TMP, MIN_PART_SIZE};

/// Multipart state lives under `<sys-tmp>/multipart/v1/<uploadID>/`. A new
/// backend format would move to `/v2` without migrating old uploads.
const GATEWAY_MULTIPART_PATH_V1: &str = "multipart/v1";

/// The upload sidecar object.
const GATEWAY_MULTIPART_META: &str = "gateway.json";
const GATEWAY_MULTIPART_META_VERSION: &str = "1";

/// Most components a single compose round may merge.
const MAX_COMPOSE_COMPONENTS: usize = 32;

/// Sidecar contents. Used to validate that a complete call names the same
/// bucket and object the upload was created for.
#[derive(Debug, Serialize, Deserialize)]
struct GatewayMultipartMeta {
    version: String,
    bucket: String,
    object: String,
}

fn multipart_meta_key(upload_id: &str) -> String {
    format!("{GATEWAY_SYS_TMP}{GATEWAY_MULTIPART_PATH_V1}/{upload_id}/{GATEWAY_MULTIPART_META}")
}

fn multipart_part_key(upload_id: &str, part_number: usize, etag: &str) -> String {
    format!("{GATEWAY_SYS_TMP}{GATEWAY_MULTIPART_PATH_V1}/{upload_id}/{part_number:05}.{etag}")
}

fn multipart_prefix(upload_id: &str) -> String {
    format!("{GATEWAY_SYS_TMP}{GATEWAY_MULTIPART_PATH_V1}/{upload_id}")
}

fn compose_key(upload_id: &str, compose_number: usize) -> String {
    format!("{GATEWAY_SYS_TMP}tmp/{upload_id}/composed-object-{compose_number:05}")
}

impl GatewayStore {
    pub(crate) async fn gw_check_upload_id(&self, bucket: &str, _object: &str, upload_id: &str) -> Result<()> {
        let meta_path = self.remote_path(bucket, &multipart_meta_key(upload_id));
        self.remote()
            .head(&meta_path)
            .await
            .map_err(|_| StorageError::InvalidUploadID(upload_id.to_string()))?;
        Ok(())
    }

    pub(crate) async fn gw_new_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        metadata: HashMap<String, String>,
    ) -> Result<String> {
        let upload_id = uuid::Uuid::new_v4().to_string();
        let meta_path = self.remote_path(bucket, &multipart_meta_key(&upload_id));

        let meta = GatewayMultipartMeta {
            version: GATEWAY_MULTIPART_META_VERSION.to_string(),
            bucket: bucket.to_string(),
            object: object.to_string(),
        };
        let body = serde_json::to_vec(&meta).map_err(StorageError::other)?;

        // The final object's attributes ride on the sidecar until complete.
        let mut options = PutOptions::default();
        options.attributes = attributes_from_metadata(&metadata);
        self.remote()
            .put_opts(&meta_path, PutPayload::from(body), options)
            .await
            .map_err(|e| gw_err(e, bucket, object))?;

        debug!(bucket, object, %upload_id, "created gateway multipart upload");
        Ok(upload_id)
    }

    pub(crate) async fn gw_put_object_part(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_id: usize,
        data: &mut PutObjReader,
    ) -> Result<PartInfo> {
        self.gw_check_upload_id(bucket, object, upload_id).await?;

        let body = data.read_all().await.map_err(StorageError::other)?;
        if data.size() > 0 && (body.len() as i64) < data.size() {
            return Err(StorageError::IncompleteBody);
        }

        let etag = if body.is_empty() { gen_etag() } else { md5_hex(&body) };
        let size = body.len() as i64;
        let part_path = self.remote_path(bucket, &multipart_part_key(upload_id, part_id, &etag));
        self.remote()
            .put(&part_path, PutPayload::from(body))
            .await
            .map_err(|e| gw_err(e, bucket, object))?;

        Ok(PartInfo {
            part_num: part_id,
            last_mod: Some(OffsetDateTime::now_utc()),
            etag: Some(etag),
            size,
        })
    }

    async fn delete_remote_prefix(&self, bucket: &str, prefix: &str) -> Result<()> {
        let prefix_path = self.remote_path(bucket, prefix);
        let mut stream = self.remote().list(Some(&prefix_path));
        while let Some(entry) = stream.next().await {
            let entry = entry.map_err(|e| gw_err(e, bucket, prefix))?;
            // A racing abort may have deleted it already.
            let _ = self.remote().delete(&entry.location).await;
        }
        Ok(())
    }

    pub(crate) async fn gw_abort_multipart_upload(&self, bucket: &str, object: &str, upload_id: &str) -> Result<()> {
        self.gw_check_upload_id(bucket, object, upload_id).await?;
        self.delete_remote_prefix(bucket, &multipart_prefix(upload_id)).await
    }

    /// Concatenates `sources` into `dst`, carrying `attrs`. The generic
    /// remote API has no native compose, so the bytes stream through.
    async fn compose_objects(&self, bucket: &str, sources: &[RemotePath], dst: &RemotePath, attrs: Attributes) -> Result<()> {
        let mut writer =
            object_store::buffered::BufWriter::new(self.remote().clone(), dst.clone()).with_attributes(attrs);
        for source in sources {
            let result = self
                .remote()
                .get(source)
                .await
                .map_err(|e| gw_err(e, bucket, source.as_ref()))?;
            let mut stream = result.into_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| gw_err(e, bucket, source.as_ref()))?;
                writer.write_all(&chunk).await.map_err(StorageError::other)?;
            }
        }
        writer.shutdown().await.map_err(StorageError::other)?;
        Ok(())
    }

    pub(crate) async fn gw_complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        uploaded_parts: Vec<CompletePart>,
    ) -> Result<ObjectInfo> {
        let meta_path = self.remote_path(bucket, &multipart_meta_key(upload_id));

        // The sidecar must exist, speak this version, and name this exact
        // bucket and object.
        let (_, sidecar_attrs) = self
            .remote_attrs(&meta_path)
            .await
            .map_err(|_| StorageError::InvalidUploadID(upload_id.to_string()))?;
        let sidecar_body = self
            .remote()
            .get(&meta_path)
            .await
            .map_err(|_| StorageError::InvalidUploadID(upload_id.to_string()))?
            .bytes()
            .await
            .map_err(|e| gw_err(e, bucket, object))?;
        let sidecar: GatewayMultipartMeta =
            serde_json::from_slice(&sidecar_body).map_err(|_| StorageError::InvalidUploadID(upload_id.to_string()))?;
        if sidecar.version != GATEWAY_MULTIPART_META_VERSION || sidecar.bucket != bucket || sidecar.object != object {
            return Err(StorageError::InvalidUploadID(upload_id.to_string()));
        }

        if uploaded_parts.is_empty() {
            return Err(StorageError::InvalidArgument("no parts supplied".to_string()));
        }
        if uploaded_parts.len() > MAX_COMPOSE_COMPONENTS * MAX_COMPOSE_COMPONENTS {
            return Err(StorageError::InvalidArgument(format!(
                "{} parts exceed the compose limit",
                uploaded_parts.len()
            )));
        }

        // Resolve and verify every declared part before any compose work.
        let mut part_paths = Vec::with_capacity(uploaded_parts.len());
        let mut part_sizes = Vec::with_capacity(uploaded_parts.len());
        for part in &uploaded_parts {
            let etag = trim_etag(part.etag.as_deref().unwrap_or_default());
            let path = self.remote_path(bucket, &multipart_part_key(upload_id, part.part_num, &etag));
            let meta = self
                .remote()
                .head(&path)
                .await
                .map_err(|_| StorageError::InvalidPart(part.part_num))?;
            part_sizes.push(meta.size as i64);
            part_paths.push(path);
        }
        let last = uploaded_parts.len() - 1;
        for (i, size) in part_sizes.iter().enumerate() {
            if i != last && *size < MIN_PART_SIZE {
                return Err(StorageError::EntityTooSmall {
                    part_number: uploaded_parts[i].part_num,
                    part_size: *size,
                });
            }
        }

        // Tiered compose: up to 32 parts go straight to the final object;
        // beyond that, intermediate composed objects of 32 parts each.
        let dst = self.remote_path(bucket, object);
        let mut intermediates: Vec<RemotePath> = Vec::new();
        let final_sources: Vec<RemotePath> = if part_paths.len() > MAX_COMPOSE_COMPONENTS {
            for (i, group) in part_paths.chunks(MAX_COMPOSE_COMPONENTS).enumerate() {
                let composed = self.remote_path(bucket, &compose_key(upload_id, i));
                self.compose_objects(bucket, group, &composed, sidecar_attrs.clone()).await?;
                intermediates.push(composed);
            }
            intermediates.clone()
        } else {
            part_paths.clone()
        };

        let compose_result = self.compose_objects(bucket, &final_sources, &dst, sidecar_attrs.clone()).await;

        // Intermediates are scratch state either way.
        for composed in &intermediates {
            let _ = self.remote().delete(composed).await;
        }
        let _ = self.delete_remote_prefix(bucket, &format!("{GATEWAY_SYS_TMP}tmp/{upload_id}")).await;
        compose_result?;

        self.delete_remote_prefix(bucket, &multipart_prefix(upload_id)).await?;

        let (meta, attrs) = self.remote_attrs(&dst).await.map_err(|e| gw_err(e, bucket, object))?;
        debug!(bucket, object, upload_id, parts = uploaded_parts.len(), "gateway multipart complete");
        Ok(object_info_from_remote(bucket, object, &meta, &attrs))
    }

    /// Removes hidden-prefix entries older than `expiry` in every bucket.
    /// The bucket marker itself is exempt: it is what keeps an otherwise
    /// empty bucket alive.
    pub async fn cleanup_gateway_tmp(&self, expiry: Duration) -> Result<usize> {
        let buckets = self.list_buckets().await?;
        let now = chrono::Utc::now();
        let mut removed = 0usize;

        for bucket in buckets {
            let prefix = self.remote_path(&bucket.name, GATEWAY_SYS_TMP.trim_end_matches('/'));
            let mut stale = Vec::new();
            {
                let mut stream = self.remote().list(Some(&prefix));
                while let Some(entry) = stream.next().await {
                    let Ok(entry) = entry else {
                        break;
                    };
                    if entry.location.as_ref().ends_with(super::BUCKET_MARKER) {
                        continue;
                    }
                    let age = now.signed_duration_since(entry.last_modified);
                    if age.to_std().map(|a| a >= expiry).unwrap_or(false) {
                        stale.push(entry.location);
                    }
                }
            }
            for location in stale {
                match self.remote().delete(&location).await {
                    Ok(()) => removed += 1,
                    Err(err) => warn!(bucket = %bucket.name, location = %location, %err, "failed to expire tmp entry"),
                }
            }
        }
        Ok(removed)
    }
}

/// Daily sweep of expired multipart debris under every bucket's hidden
/// prefix. Exits promptly on cancellation.
pub fn spawn_gateway_tmp_cleaner(
    gateway: Arc<GatewayStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match gateway.cleanup_gateway_tmp(GATEWAY_MULTIPART_EXPIRY).await {
                        Ok(0) => {}
                        Ok(removed) => debug!(removed, "expired gateway tmp entries"),
                        Err(err) => warn!(%err, "gateway tmp cleanup failed"),
                    }
                }
            }
        }
    })
}

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

//! Gateway object-layer tests against an in-memory remote store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use object_store::memory::InMemory;

use ferrofs_store::gateway::{is_valid_project_id, parse_project_id, GATEWAY_TOKEN_PREFIX};
use ferrofs_store::store_api::{CompletePart, ObjectLayer, PutObjReader};
use ferrofs_store::{GatewayStore, StorageError, GATEWAY_SYS_TMP};

fn new_gateway() -> Arc<GatewayStore> {
    GatewayStore::new(Arc::new(InMemory::new()))
}

async fn put(gateway: &GatewayStore, bucket: &str, object: &str, data: &[u8]) -> ferrofs_store::store_api::ObjectInfo {
    let mut reader = PutObjReader::from_vec(data.to_vec());
    gateway
        .put_object(bucket, object, &mut reader, HashMap::new())
        .await
        .unwrap()
}

async fn get_bytes(
    gateway: &GatewayStore,
    bucket: &str,
    object: &str,
    offset: i64,
    length: i64,
) -> Result<Vec<u8>, StorageError> {
    let mut out = Vec::new();
    gateway
        .get_object(bucket, object, offset, length, &mut out, "", None)
        .await?;
    Ok(out)
}

#[tokio::test]
async fn test_bucket_lifecycle() {
    let gateway = new_gateway();

    assert!(matches!(
        gateway.get_bucket_info("mybucket").await.unwrap_err(),
        StorageError::BucketNotFound(_)
    ));

    gateway.make_bucket("mybucket", "us-east-1").await.unwrap();
    let err = gateway.make_bucket("mybucket", "us-east-1").await.unwrap_err();
    assert!(matches!(err, StorageError::BucketAlreadyOwnedByYou(_)), "got {err:?}");

    let info = gateway.get_bucket_info("mybucket").await.unwrap();
    assert_eq!(info.name, "mybucket");
    assert!(info.created.is_some());

    let buckets = gateway.list_buckets().await.unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].name, "mybucket");

    gateway.delete_bucket("mybucket").await.unwrap();
    assert!(matches!(
        gateway.get_bucket_info("mybucket").await.unwrap_err(),
        StorageError::BucketNotFound(_)
    ));
}

#[tokio::test]
async fn test_delete_bucket_not_empty() {
    let gateway = new_gateway();
    gateway.make_bucket("b1", "").await.unwrap();
    put(&gateway, "b1", "obj", b"data").await;

    let err = gateway.delete_bucket("b1").await.unwrap_err();
    assert!(matches!(err, StorageError::BucketNotEmpty(_)), "got {err:?}");

    gateway.delete_object("b1", "obj").await.unwrap();
    gateway.delete_bucket("b1").await.unwrap();
}

#[tokio::test]
async fn test_put_get_with_metadata() {
    let gateway = new_gateway();
    gateway.make_bucket("b1", "").await.unwrap();

    let mut metadata = HashMap::new();
    metadata.insert("content-type".to_string(), "text/plain".to_string());
    metadata.insert("x-amz-meta-owner".to_string(), "alice".to_string());

    let mut reader = PutObjReader::from_vec(b"hello gateway".to_vec());
    let info = gateway.put_object("b1", "greeting.txt", &mut reader, metadata).await.unwrap();
    assert_eq!(info.size, 13);

    let head = gateway.get_object_info("b1", "greeting.txt").await.unwrap();
    assert_eq!(head.content_type.as_deref(), Some("text/plain"));
    assert_eq!(head.user_defined.get("x-amz-meta-owner").map(String::as_str), Some("alice"));
    assert!(head.etag.is_some());

    let body = get_bytes(&gateway, "b1", "greeting.txt", 0, -1).await.unwrap();
    assert_eq!(body, b"hello gateway");

    // Range read.
    let body = get_bytes(&gateway, "b1", "greeting.txt", 6, 7).await.unwrap();
    assert_eq!(body, b"gateway");

    let err = get_bytes(&gateway, "b1", "greeting.txt", 50, -1).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidRange { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_get_missing() {
    let gateway = new_gateway();
    gateway.make_bucket("b1", "").await.unwrap();

    let err = get_bytes(&gateway, "b1", "ghost", 0, -1).await.unwrap_err();
    assert!(matches!(err, StorageError::ObjectNotFound(_, _)), "got {err:?}");

    let err = get_bytes(&gateway, "nobucket", "x", 0, -1).await.unwrap_err();
    assert!(matches!(err, StorageError::BucketNotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn test_copy_applies_metadata() {
    let gateway = new_gateway();
    gateway.make_bucket("b1", "").await.unwrap();
    put(&gateway, "b1", "src", b"copy me").await;

    let mut src_info = gateway.get_object_info("b1", "src").await.unwrap();
    src_info
        .user_defined
        .insert("x-amz-meta-stage".to_string(), "copied".to_string());

    let copied = gateway.copy_object("b1", "src", "b1", "dst", &mut src_info).await.unwrap();
    assert_eq!(copied.size, 7);

    let head = gateway.get_object_info("b1", "dst").await.unwrap();
    assert_eq!(head.user_defined.get("x-amz-meta-stage").map(String::as_str), Some("copied"));
    assert_eq!(get_bytes(&gateway, "b1", "dst", 0, -1).await.unwrap(), b"copy me");
}

#[tokio::test]
async fn test_listing_hides_sys_tmp() {
    let gateway = new_gateway();
    gateway.make_bucket("b1", "").await.unwrap();
    for key in ["a", "b/c", "b/d"] {
        put(&gateway, "b1", key, b"x").await;
    }
    // Multipart debris lives under the hidden prefix.
    gateway.new_multipart_upload("b1", "pending", HashMap::new()).await.unwrap();

    let loi = gateway.list_objects("b1", "", "", "", 1000).await.unwrap();
    let names: Vec<&str> = loi.objects.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b/c", "b/d"], "hidden prefix must not leak");

    let loi = gateway.list_objects("b1", "", "", "/", 1000).await.unwrap();
    let names: Vec<&str> = loi.objects.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["a"]);
    assert_eq!(loi.prefixes, vec!["b/"]);

    // Explicitly listing inside the hidden prefix shows the state.
    let loi = gateway
        .list_objects("b1", GATEWAY_SYS_TMP, "", "", 1000)
        .await
        .unwrap();
    assert!(!loi.objects.is_empty(), "listing inside the hidden prefix is allowed");
}

#[tokio::test]
async fn test_list_markers_and_sentinel() {
    let gateway = new_gateway();
    gateway.make_bucket("b1", "").await.unwrap();
    for key in ["k1", "k2", "k3", "k4", "k5"] {
        put(&gateway, "b1", key, b"v").await;
    }

    let page = gateway.list_objects("b1", "", "", "", 2).await.unwrap();
    let names: Vec<&str> = page.objects.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["k1", "k2"]);
    assert!(page.is_truncated);
    let marker = page.next_marker.clone().unwrap();
    assert!(marker.starts_with(GATEWAY_TOKEN_PREFIX), "remote markers carry the sentinel");

    let page = gateway.list_objects("b1", "", &marker, "", 1000).await.unwrap();
    let names: Vec<&str> = page.objects.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["k3", "k4", "k5"]);
    assert!(!page.is_truncated);

    // A user-supplied marker is honoured by lexicographic skip.
    let page = gateway.list_objects("b1", "", "k3", "", 1000).await.unwrap();
    let names: Vec<&str> = page.objects.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["k4", "k5"]);
}

#[tokio::test]
async fn test_multipart_roundtrip() {
    let gateway = new_gateway();
    gateway.make_bucket("b1", "").await.unwrap();

    let mut metadata = HashMap::new();
    metadata.insert("content-type".to_string(), "application/zip".to_string());
    let upload_id = gateway.new_multipart_upload("b1", "archive.zip", metadata).await.unwrap();

    let part1 = vec![7u8; 5 * 1024 * 1024];
    let part2 = vec![9u8; 2048];

    let mut reader = PutObjReader::from_vec(part1.clone());
    let info1 = gateway
        .put_object_part("b1", "archive.zip", &upload_id, 1, &mut reader)
        .await
        .unwrap();
    let mut reader = PutObjReader::from_vec(part2.clone());
    let info2 = gateway
        .put_object_part("b1", "archive.zip", &upload_id, 2, &mut reader)
        .await
        .unwrap();

    let completed = gateway
        .complete_multipart_upload(
            "b1",
            "archive.zip",
            &upload_id,
            vec![
                CompletePart {
                    part_num: 1,
                    etag: info1.etag,
                },
                CompletePart {
                    part_num: 2,
                    etag: info2.etag,
                },
            ],
        )
        .await
        .unwrap();
    assert_eq!(completed.size, (part1.len() + part2.len()) as i64);

    let body = get_bytes(&gateway, "b1", "archive.zip", 0, -1).await.unwrap();
    assert_eq!(body.len(), part1.len() + part2.len());
    assert_eq!(&body[..part1.len()], &part1[..]);
    assert_eq!(&body[part1.len()..], &part2[..]);

    // Attributes from the initiation sidecar reached the final object.
    let head = gateway.get_object_info("b1", "archive.zip").await.unwrap();
    assert_eq!(head.content_type.as_deref(), Some("application/zip"));

    // The upload prefix was cleared: only the final object remains visible
    // inside the hidden tree.
    let loi = gateway
        .list_objects("b1", GATEWAY_SYS_TMP, "", "", 1000)
        .await
        .unwrap();
    let leftover: Vec<&str> = loi
        .objects
        .iter()
        .map(|o| o.name.as_str())
        .filter(|n| n.contains(&upload_id))
        .collect();
    assert!(leftover.is_empty(), "upload state must be deleted, found {leftover:?}");

    let err = gateway
        .abort_multipart_upload("b1", "archive.zip", &upload_id)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidUploadID(_)));
}

#[tokio::test]
async fn test_multipart_part_too_small() {
    let gateway = new_gateway();
    gateway.make_bucket("b1", "").await.unwrap();
    let upload_id = gateway.new_multipart_upload("b1", "obj", HashMap::new()).await.unwrap();

    let mut reader = PutObjReader::from_vec(vec![1u8; 64]);
    let info1 = gateway.put_object_part("b1", "obj", &upload_id, 1, &mut reader).await.unwrap();
    let mut reader = PutObjReader::from_vec(vec![2u8; 64]);
    let info2 = gateway.put_object_part("b1", "obj", &upload_id, 2, &mut reader).await.unwrap();

    let err = gateway
        .complete_multipart_upload(
            "b1",
            "obj",
            &upload_id,
            vec![
                CompletePart {
                    part_num: 1,
                    etag: info1.etag,
                },
                CompletePart {
                    part_num: 2,
                    etag: info2.etag,
                },
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::EntityTooSmall { part_number: 1, .. }), "got {err:?}");
}

#[tokio::test]
async fn test_multipart_wrong_object_rejected() {
    let gateway = new_gateway();
    gateway.make_bucket("b1", "").await.unwrap();
    let upload_id = gateway.new_multipart_upload("b1", "intended", HashMap::new()).await.unwrap();

    let err = gateway
        .complete_multipart_upload(
            "b1",
            "other-object",
            &upload_id,
            vec![CompletePart {
                part_num: 1,
                etag: Some("x".to_string()),
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidUploadID(_)), "got {err:?}");
}

#[tokio::test]
async fn test_multipart_too_many_parts() {
    let gateway = new_gateway();
    gateway.make_bucket("b1", "").await.unwrap();
    let upload_id = gateway.new_multipart_upload("b1", "obj", HashMap::new()).await.unwrap();

    let parts: Vec<CompletePart> = (1..=1025)
        .map(|i| CompletePart {
            part_num: i,
            etag: Some("e".to_string()),
        })
        .collect();
    let err = gateway
        .complete_multipart_upload("b1", "obj", &upload_id, parts)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidArgument(_)), "got {err:?}");
}

#[tokio::test]
async fn test_multipart_abort_clears_parts() {
    let gateway = new_gateway();
    gateway.make_bucket("b1", "").await.unwrap();
    let upload_id = gateway.new_multipart_upload("b1", "obj", HashMap::new()).await.unwrap();

    let mut reader = PutObjReader::from_vec(vec![5u8; 128]);
    gateway.put_object_part("b1", "obj", &upload_id, 1, &mut reader).await.unwrap();

    gateway.abort_multipart_upload("b1", "obj", &upload_id).await.unwrap();

    let mut reader = PutObjReader::from_vec(vec![5u8; 128]);
    let err = gateway
        .put_object_part("b1", "obj", &upload_id, 2, &mut reader)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidUploadID(_)));
}

#[tokio::test]
async fn test_tmp_cleanup_spares_bucket_marker() {
    let gateway = new_gateway();
    gateway.make_bucket("b1", "").await.unwrap();
    gateway.new_multipart_upload("b1", "obj", HashMap::new()).await.unwrap();

    // With a zero expiry all emulation debris is stale immediately.
    let removed = gateway.cleanup_gateway_tmp(Duration::ZERO).await.unwrap();
    assert!(removed >= 1, "the upload sidecar should be expired");

    // The bucket survives its own cleanup.
    gateway.get_bucket_info("b1").await.unwrap();
}

#[tokio::test]
async fn test_policy_not_implemented() {
    let gateway = new_gateway();
    assert!(matches!(
        gateway.get_bucket_policy("b1").await.unwrap_err(),
        StorageError::NotImplemented
    ));
    assert!(matches!(
        gateway.heal_format(true).await.unwrap_err(),
        StorageError::NotImplemented
    ));
}

#[test]
fn test_project_id_validation() {
    assert!(is_valid_project_id("my-project-1234"));
    assert!(is_valid_project_id("abcdef"));
    assert!(!is_valid_project_id("short"));
    assert!(!is_valid_project_id("Uppercase-project"));
    assert!(!is_valid_project_id("1starts-with-digit"));
    assert!(!is_valid_project_id(""));
    assert!(!is_valid_project_id(&"x".repeat(31)));
}

#[test]
fn test_parse_project_id_from_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let creds = dir.path().join("credentials.json");
    std::fs::write(&creds, br#"{"type":"service_account","project_id":"my-project-id"}"#).unwrap();
    assert_eq!(parse_project_id(creds.to_str().unwrap()).unwrap(), "my-project-id");

    std::fs::write(&creds, br#"{"type":"service_account"}"#).unwrap();
    assert!(parse_project_id(creds.to_str().unwrap()).is_err());
}

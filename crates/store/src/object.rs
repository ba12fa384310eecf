// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin wrapper over the S3 client.
//!
//! Normalizes the SDK surface to what the file store and state archive
//! need: byte-oriented get/put/delete, stat, prefix listing, and presigned
//! URLs. Missing keys come back as `Ok(None)` instead of service errors.

use crate::error::StoreError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Validity window for presigned upload/download URLs.
pub const PRESIGN_VALIDITY: Duration = Duration::from_secs(3600);

/// Metadata of one stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// S3-compatible object store bound to one bucket.
#[derive(Clone)]
pub struct ObjectStore {
    client: Client,
    bucket: String,
}

impl ObjectStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self { client, bucket: bucket.into() }
    }

    /// Build a client from the ambient AWS environment with an optional
    /// custom endpoint (MinIO and friends need path-style addressing).
    pub async fn connect(bucket: &str, endpoint_url: Option<&str>) -> Self {
        let base = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_s3::config::Builder::from(&base).force_path_style(true);
        if let Some(url) = endpoint_url {
            builder = builder.endpoint_url(url);
        }
        Self::new(Client::from_conf(builder.build()), bucket)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(StoreError::object)?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let result = self.client.get_object().bucket(&self.bucket).key(key).send().await;
        match result {
            Ok(output) => {
                let data = output.body.collect().await.map_err(StoreError::object)?;
                Ok(Some(data.into_bytes().to_vec()))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(StoreError::object(service_err))
                }
            }
        }
    }

    /// Object size and mtime without fetching the body.
    pub async fn stat(&self, key: &str) -> Result<Option<ObjectInfo>, StoreError> {
        let result = self.client.head_object().bucket(&self.bucket).key(key).send().await;
        match result {
            Ok(output) => Ok(Some(ObjectInfo {
                key: key.to_string(),
                size: output.content_length().unwrap_or(0).max(0) as u64,
                last_modified: output.last_modified().and_then(smithy_to_chrono),
            })),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(None)
                } else {
                    Err(StoreError::object(service_err))
                }
            }
        }
    }

    /// Delete is idempotent: deleting a missing key succeeds.
    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(StoreError::object)?;
        Ok(())
    }

    /// List every object under `prefix`, following continuation tokens.
    pub async fn list_prefix(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError> {
        let mut objects = Vec::new();
        let mut paginator = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = paginator.next().await {
            let page = page.map_err(StoreError::object)?;
            for obj in page.contents() {
                let Some(key) = obj.key() else { continue };
                objects.push(ObjectInfo {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified: obj.last_modified().and_then(smithy_to_chrono),
                });
            }
        }
        Ok(objects)
    }

    pub async fn presigned_put(&self, key: &str) -> Result<String, StoreError> {
        let config =
            PresigningConfig::expires_in(PRESIGN_VALIDITY).map_err(StoreError::object)?;
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(StoreError::object)?;
        Ok(presigned.uri().to_string())
    }

    pub async fn presigned_get(&self, key: &str) -> Result<String, StoreError> {
        let config =
            PresigningConfig::expires_in(PRESIGN_VALIDITY).map_err(StoreError::object)?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(StoreError::object)?;
        Ok(presigned.uri().to_string())
    }
}

fn smithy_to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

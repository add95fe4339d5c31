// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! HTTP implementations of the answer and image services.
//!
//! The answer endpoint replies with a plain chunked text body (no SSE
//! framing): the concatenation of all chunks is the answer.  The image
//! endpoint replies with a JSON array of image objects.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, trace};

use seeker_config::ServiceConfig;

use crate::{AnswerRequest, AnswerService, ByteStream, ImageRef, ImageService, ServiceError};

const ANSWER: &str = "answer";
const IMAGES: &str = "images";

/// Build the shared HTTP client.  Only the connect phase is bounded; a
/// streaming answer may take as long as the server needs.
pub fn build_client(cfg: &ServiceConfig) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
        .build()?;
    Ok(client)
}

pub struct HttpAnswerService {
    client: reqwest::Client,
    url: String,
}

impl HttpAnswerService {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl AnswerService for HttpAnswerService {
    fn name(&self) -> &str {
        "http"
    }

    async fn open(&self, req: AnswerRequest) -> Result<ByteStream, ServiceError> {
        debug!(
            url = %self.url,
            model = %req.model,
            query_len = req.query.len(),
            history_len = req.history.len(),
            "opening answer stream"
        );

        let resp = self
            .client
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| ServiceError::transport(ANSWER, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Status { service: ANSWER, status: status.as_u16(), body });
        }
        if status == StatusCode::NO_CONTENT {
            return Err(ServiceError::MissingBody(ANSWER));
        }

        let body = resp.bytes_stream().map(|chunk| {
            chunk
                .inspect(|b| trace!(bytes = b.len(), "answer chunk"))
                .map_err(|e| ServiceError::transport(ANSWER, e))
        });
        Ok(Box::pin(body))
    }
}

pub struct HttpImageService {
    client: reqwest::Client,
    url: String,
}

impl HttpImageService {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }
}

/// Accepted image response shapes: a bare array, or the array wrapped in an
/// `images` field.
#[derive(Deserialize)]
#[serde(untagged)]
enum ImageResponse {
    List(Vec<ImageRef>),
    Wrapped { images: Vec<ImageRef> },
}

impl ImageResponse {
    fn into_vec(self) -> Vec<ImageRef> {
        match self {
            ImageResponse::List(v) | ImageResponse::Wrapped { images: v } => v,
        }
    }
}

#[async_trait]
impl ImageService for HttpImageService {
    async fn fetch_images(&self, query: &str, limit: usize) -> Result<Vec<ImageRef>, ServiceError> {
        debug!(url = %self.url, limit, "fetching images");

        let resp = self
            .client
            .get(&self.url)
            .query(&[("query", query.to_string()), ("images", limit.to_string())])
            .send()
            .await
            .map_err(|e| ServiceError::transport(IMAGES, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Status { service: IMAGES, status: status.as_u16(), body });
        }

        let text = resp.text().await.map_err(|e| ServiceError::transport(IMAGES, e))?;
        let parsed: ImageResponse =
            serde_json::from_str(&text).map_err(|e| ServiceError::decode(IMAGES, e))?;
        let mut images = parsed.into_vec();
        images.truncate(limit);
        Ok(images)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

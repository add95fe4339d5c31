// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// Maximum number of image results attached to a single answer.
pub const MAX_IMAGES: usize = 4;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_provider() -> String {
    "http".into()
}
fn default_base_url() -> String {
    "http://localhost:3000".into()
}
fn default_answer_path() -> String {
    "/api/answer".into()
}
fn default_images_path() -> String {
    "/api/images".into()
}
fn default_model() -> String {
    "default".into()
}
fn default_image_limit() -> usize {
    MAX_IMAGES
}
fn default_connect_timeout_secs() -> u64 {
    10
}

/// Where answers and image results come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service backend: `"http"` talks to a real answer server, `"mock"`
    /// echoes the query back locally (no network).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Scheme + host (+ optional port) of the answer server.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path of the streaming answer endpoint (POST).
    #[serde(default = "default_answer_path")]
    pub answer_path: String,
    /// Path of the image search endpoint (GET).
    #[serde(default = "default_images_path")]
    pub images_path: String,
    /// Model identifier sent with every answer request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Number of images requested per query, clamped to
    /// `1..=`[`MAX_IMAGES`].
    #[serde(default = "default_image_limit")]
    pub image_limit: usize,
    /// TCP connect timeout.  There is no total request deadline: a stalled
    /// answer stream is only ended by a newer submission.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            answer_path: default_answer_path(),
            images_path: default_images_path(),
            model: default_model(),
            image_limit: default_image_limit(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl ServiceConfig {
    pub fn answer_url(&self) -> String {
        join_url(&self.base_url, &self.answer_path)
    }

    pub fn images_url(&self) -> String {
        join_url(&self.base_url, &self.images_path)
    }

    pub fn effective_image_limit(&self) -> usize {
        self.image_limit.clamp(1, MAX_IMAGES)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Query submitted automatically when the session starts.
    #[serde(default)]
    pub initial_query: Option<String>,
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

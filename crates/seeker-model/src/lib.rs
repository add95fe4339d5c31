// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod types;
mod store;
mod error;
mod service;
mod http;
mod mock;

pub use types::*;
pub use store::{MessageHandle, MessageStore};
pub use error::ServiceError;
pub use service::{AnswerService, ByteStream, ImageService};
pub use http::{build_client, HttpAnswerService, HttpImageService};
pub use mock::{
    AnswerScript, EchoAnswerService, ImageScript, LiveFeed, NoImageService,
    ScriptedAnswerService, ScriptedImageService,
};

use std::sync::Arc;

use anyhow::bail;
use seeker_config::ServiceConfig;

/// The pair of backends a session talks to.
#[derive(Clone)]
pub struct Services {
    pub answers: Arc<dyn AnswerService>,
    pub images: Arc<dyn ImageService>,
}

/// Construct the answer and image services from configuration.
///
/// Provider selection:
/// - `"http"` → [`HttpAnswerService`] + [`HttpImageService`] sharing one client
/// - `"mock"` → [`EchoAnswerService`] + [`NoImageService`] (no network)
pub fn from_config(cfg: &ServiceConfig) -> anyhow::Result<Services> {
    match cfg.provider.as_str() {
        "http" => {
            let client = build_client(cfg)?;
            Ok(Services {
                answers: Arc::new(HttpAnswerService::new(client.clone(), cfg.answer_url())),
                images: Arc::new(HttpImageService::new(client, cfg.images_url())),
            })
        }
        "mock" => Ok(Services {
            answers: Arc::new(EchoAnswerService),
            images: Arc::new(NoImageService),
        }),
        other => bail!("unknown service provider: {other}"),
    }
}

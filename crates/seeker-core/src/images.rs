// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use seeker_model::{ImageRef, ImageService};

use crate::SessionError;

/// Image search running alongside the answer stream.
///
/// Started before the answer stream is opened and joined once the text is
/// complete, so the images are attached in one step with the final text.
pub struct ImageFetch {
    handle: JoinHandle<Result<Vec<ImageRef>, SessionError>>,
}

impl ImageFetch {
    /// Spawn the fetch.  When `cancel` fires, the request is dropped and the
    /// task resolves to an empty list.
    pub fn start(
        service: Arc<dyn ImageService>,
        query: String,
        limit: usize,
        cancel: CancellationToken,
    ) -> Self {
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(%query, "image fetch cancelled");
                    Ok(Vec::new())
                }
                result = service.fetch_images(&query, limit) => {
                    result.map_err(SessionError::Images).map(|mut images| {
                        images.truncate(limit);
                        debug!(%query, count = images.len(), "image fetch done");
                        images
                    })
                }
            }
        });
        Self { handle }
    }

    /// Wait for the result.
    pub async fn join(self) -> Result<Vec<ImageRef>, SessionError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(SessionError::Task(e.to_string())),
        }
    }

    /// Stop the fetch without waiting for it.
    pub fn abort(self) {
        self.handle.abort();
    }
}

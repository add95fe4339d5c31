// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::{AnswerRequest, ImageRef, ServiceError};

/// Raw response body of the answer endpoint: an ordered, finite sequence of
/// byte chunks.  Chunk boundaries carry no meaning and may split characters.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ServiceError>> + Send>>;

#[async_trait]
pub trait AnswerService: Send + Sync {
    /// Backend name for logs and error messages.
    fn name(&self) -> &str;

    /// Open the streaming answer for `req`.  Resolves once the response
    /// headers are in; the text arrives through the returned body.
    ///
    /// Dropping the body stops delivery and releases the connection.
    async fn open(&self, req: AnswerRequest) -> Result<ByteStream, ServiceError>;
}

#[async_trait]
pub trait ImageService: Send + Sync {
    /// Search images for `query`, asking for `limit` results.  Services may
    /// return more; callers truncate.
    async fn fetch_images(&self, query: &str, limit: usize) -> Result<Vec<ImageRef>, ServiceError>;
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{AnswerRequest, AnswerService, ByteStream, ImageRef, ImageService, ServiceError};

/// Deterministic offline answer service.  Echoes the query back, split into
/// a few chunks so consumers see a real stream.
#[derive(Default)]
pub struct EchoAnswerService;

#[async_trait]
impl AnswerService for EchoAnswerService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn open(&self, req: AnswerRequest) -> Result<ByteStream, ServiceError> {
        let reply = format!("MOCK: {}", req.query);
        let chunks: Vec<Result<Bytes, ServiceError>> = reply
            .as_bytes()
            .chunks(8)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

/// Offline image service that never finds anything.
#[derive(Default)]
pub struct NoImageService;

#[async_trait]
impl ImageService for NoImageService {
    async fn fetch_images(&self, _query: &str, _limit: usize) -> Result<Vec<ImageRef>, ServiceError> {
        Ok(Vec::new())
    }
}

// ─── Scripted answers ─────────────────────────────────────────────────────────

/// What one call to [`ScriptedAnswerService::open`] does.
pub enum AnswerScript {
    /// Reply with these chunks, then end the body.
    Chunks(Vec<Bytes>),
    /// Reply with whatever the paired [`LiveFeed`] sends; the body ends when
    /// the feed is dropped or finished.
    Live(mpsc::UnboundedReceiver<Result<Bytes, ServiceError>>),
    /// Fail to open the stream.
    Fail(ServiceError),
    /// Never resolve (a server that accepts the connection and goes silent).
    Hang,
}

impl AnswerScript {
    pub fn text_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Self::Chunks(chunks.into_iter().map(|c| Bytes::copy_from_slice(c.as_ref())).collect())
    }

    /// A script driven by the test at its own pace.
    pub fn live() -> (Self, LiveFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::Live(rx), LiveFeed { tx })
    }
}

/// Sending half of an [`AnswerScript::Live`] body.
pub struct LiveFeed {
    tx: mpsc::UnboundedSender<Result<Bytes, ServiceError>>,
}

impl LiveFeed {
    /// Deliver one chunk.  Returns `false` if the consumer dropped the body.
    pub fn send(&self, chunk: impl AsRef<[u8]>) -> bool {
        self.tx.send(Ok(Bytes::copy_from_slice(chunk.as_ref()))).is_ok()
    }

    /// Deliver a body read error.
    pub fn fail(&self, err: ServiceError) -> bool {
        self.tx.send(Err(err)).is_ok()
    }

    /// `true` once the consumer has dropped the body.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// End the body.
    pub fn finish(self) {}
}

/// A pre-scripted answer service.  Each call to `open` pops the next script
/// from the front of the queue; every request is recorded so tests can
/// inspect what was sent.
pub struct ScriptedAnswerService {
    scripts: Mutex<VecDeque<AnswerScript>>,
    pub requests: Arc<Mutex<Vec<AnswerRequest>>>,
}

impl ScriptedAnswerService {
    pub fn new(scripts: impl IntoIterator<Item = AnswerScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Convenience: one reply made of these chunks.
    pub fn always_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Self::new([AnswerScript::text_chunks(chunks)])
    }

    pub fn recorded(&self) -> Vec<AnswerRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl AnswerService for ScriptedAnswerService {
    fn name(&self) -> &str {
        "scripted-mock"
    }

    async fn open(&self, req: AnswerRequest) -> Result<ByteStream, ServiceError> {
        lock(&self.requests).push(req);
        let script = lock(&self.scripts).pop_front();
        match script {
            Some(AnswerScript::Chunks(chunks)) => {
                let items: Vec<Result<Bytes, ServiceError>> = chunks.into_iter().map(Ok).collect();
                Ok(Box::pin(stream::iter(items)))
            }
            Some(AnswerScript::Live(rx)) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            Some(AnswerScript::Fail(err)) => Err(err),
            Some(AnswerScript::Hang) => futures::future::pending().await,
            None => Ok(Box::pin(stream::iter(vec![Ok(Bytes::from_static(b"[no more scripts]"))]))),
        }
    }
}

// ─── Scripted images ──────────────────────────────────────────────────────────

/// What one call to [`ScriptedImageService::fetch_images`] does.
pub enum ImageScript {
    Images(Vec<ImageRef>),
    Fail(ServiceError),
    /// Resolve when the paired sender fires; a dropped sender is a failure.
    Gated(oneshot::Receiver<Vec<ImageRef>>),
}

impl ImageScript {
    pub fn srcs<I, S>(srcs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Images(srcs.into_iter().map(ImageRef::new).collect())
    }

    pub fn gated() -> (Self, oneshot::Sender<Vec<ImageRef>>) {
        let (tx, rx) = oneshot::channel();
        (Self::Gated(rx), tx)
    }
}

pub struct ScriptedImageService {
    scripts: Mutex<VecDeque<ImageScript>>,
    pub queries: Arc<Mutex<Vec<(String, usize)>>>,
}

impl ScriptedImageService {
    pub fn new(scripts: impl IntoIterator<Item = ImageScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// No scripts: every call returns an empty list.
    pub fn empty() -> Self {
        Self::new([])
    }

    pub fn recorded(&self) -> Vec<(String, usize)> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl ImageService for ScriptedImageService {
    async fn fetch_images(&self, query: &str, limit: usize) -> Result<Vec<ImageRef>, ServiceError> {
        lock(&self.queries).push((query.to_string(), limit));
        let script = lock(&self.scripts).pop_front();
        match script {
            Some(ImageScript::Images(images)) => Ok(images),
            Some(ImageScript::Fail(err)) => Err(err),
            Some(ImageScript::Gated(rx)) => rx
                .await
                .map_err(|_| ServiceError::transport("images", "gate dropped")),
            None => Ok(Vec::new()),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

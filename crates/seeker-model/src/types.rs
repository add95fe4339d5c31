// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Identity ─────────────────────────────────────────────────────────────────

/// Opaque message identity.  Assigned once at creation, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Bot => write!(f, "bot"),
        }
    }
}

// ─── Images ───────────────────────────────────────────────────────────────────

/// One image search result.  Only the source reference is required; search
/// backends disagree on the field name so a few aliases are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    #[serde(alias = "url", alias = "image")]
    pub src: String,
    #[serde(default, alias = "alt", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ImageRef {
    pub fn new(src: impl Into<String>) -> Self {
        Self { src: src.into(), title: None }
    }
}

// ─── Message ──────────────────────────────────────────────────────────────────

/// One turn of the conversation as seen by the rendering layer.
///
/// Bot messages start life as a placeholder (`is_streaming = true`, empty
/// content) and are filled in by the session controller.  The flags move in
/// one direction only: `has_started_streaming` false → true once, and
/// `is_streaming` true → false at most once.  A message abandoned by a newer
/// submission keeps `is_streaming = true` forever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    /// At most [`seeker_config::MAX_IMAGES`] references, attached once after
    /// the text stream completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageRef>>,
    /// Set instead of `images` when the image fetch failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images_error: Option<String>,
    pub is_streaming: bool,
    pub has_started_streaming: bool,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::User,
            content: text.into(),
            images: None,
            images_error: None,
            is_streaming: false,
            has_started_streaming: false,
        }
    }

    /// Empty bot message shown while waiting for the first byte.
    pub fn bot_placeholder() -> Self {
        Self {
            id: MessageId::new(),
            role: Role::Bot,
            content: String::new(),
            images: None,
            images_error: None,
            is_streaming: true,
            has_started_streaming: false,
        }
    }

    /// A bot message that is already complete (used when seeding history).
    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            content: text.into(),
            is_streaming: false,
            has_started_streaming: true,
            ..Self::bot_placeholder()
        }
    }

    /// Copy of `self` with the cumulative streamed text applied.
    ///
    /// Content never shrinks while streaming; a shorter snapshot is ignored.
    pub fn with_partial(&self, text: &str) -> Self {
        let mut next = self.clone();
        if text.len() >= next.content.len() {
            next.content = text.to_string();
        }
        next.is_streaming = true;
        next.has_started_streaming = true;
        next
    }

    /// Copy of `self` in its final state: full text, images (or the reason
    /// they are missing) and streaming cleared.  Images already present are
    /// kept as they are.
    pub fn finished(&self, text: &str, images: Result<Vec<ImageRef>, String>) -> Self {
        let mut next = self.clone();
        next.content = text.to_string();
        if next.images.is_none() && next.images_error.is_none() {
            match images {
                Ok(list) => next.images = Some(list),
                Err(reason) => next.images_error = Some(reason),
            }
        }
        next.is_streaming = false;
        next.has_started_streaming = true;
        next
    }

    /// `true` while the placeholder has not received its first chunk.
    pub fn is_waiting_for_first_chunk(&self) -> bool {
        self.is_streaming && !self.has_started_streaming
    }

    pub fn history_entry(&self) -> HistoryEntry {
        HistoryEntry { role: self.role, content: self.content.clone() }
    }
}

// ─── Wire types ───────────────────────────────────────────────────────────────

/// One prior turn forwarded to the answer service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// Body of the streaming answer request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub query: String,
    pub model: String,
    pub history: Vec<HistoryEntry>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

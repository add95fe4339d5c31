// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use seeker_model::Message;

use crate::SessionError;

/// Sequential number of a submission within one session, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionId(pub u64);

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of the current submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Nothing submitted yet.
    #[default]
    Idle,
    /// Messages are in the store; waiting for the answer stream to open.
    Submitting,
    /// Answer chunks are being applied to the placeholder.
    Streaming,
    /// Text is complete; waiting for the image results.
    Joining,
    Finalized,
    Aborted,
    Failed,
}

impl Phase {
    pub fn is_in_flight(self) -> bool {
        matches!(self, Phase::Submitting | Phase::Streaming | Phase::Joining)
    }
}

/// How a submission ended.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Text and images merged into the bot message.
    Finalized,
    /// Cancelled, either explicitly or by a newer submission.  The bot
    /// message was left as it was.
    Aborted,
    /// Transport failure.  The bot message was left as it was.
    Failed(SessionError),
}

impl Outcome {
    pub fn phase(&self) -> Phase {
        match self {
            Outcome::Finalized => Phase::Finalized,
            Outcome::Aborted => Phase::Aborted,
            Outcome::Failed(_) => Phase::Failed,
        }
    }
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Started { id: SubmissionId, query: String },
    Finalized { id: SubmissionId },
    /// Not an error: the submission was cancelled or superseded.
    Aborted { id: SubmissionId },
    /// User-visible failure.
    Failed { id: SubmissionId, error: SessionError },
    /// The answer is complete but the image search failed.
    ImagesUnavailable { id: SubmissionId, error: SessionError },
}

/// State published to renderers after every store mutation.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub messages: Arc<[Message]>,
    pub is_loading: bool,
}

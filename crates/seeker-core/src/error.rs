// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use seeker_model::ServiceError;
use thiserror::Error;

/// Why a submission (or its image fetch) did not complete.
///
/// Cancellation is deliberately not represented here: a superseded
/// submission ends as `Outcome::Aborted`, never as an error.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("could not open answer stream: {0}")]
    Open(#[source] ServiceError),

    #[error("answer stream broke off: {0}")]
    Body(#[source] ServiceError),

    #[error("image search failed: {0}")]
    Images(#[source] ServiceError),

    #[error("background task ended unexpectedly: {0}")]
    Task(String),
}

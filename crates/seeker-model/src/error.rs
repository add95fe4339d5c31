// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

/// Failure talking to the answer or image service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("{service} request failed: {message}")]
    Transport { service: &'static str, message: String },

    #[error("{service} returned {status}: {body}")]
    Status { service: &'static str, status: u16, body: String },

    #[error("{0} response has no body")]
    MissingBody(&'static str),

    #[error("could not decode {service} response: {message}")]
    Decode { service: &'static str, message: String },
}

impl ServiceError {
    pub fn transport(service: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Transport { service, message: err.to_string() }
    }

    pub fn decode(service: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Decode { service, message: err.to_string() }
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod decoder;
mod consumer;
mod images;
mod events;
mod error;
mod controller;
#[cfg(test)]
mod tests;

pub use decoder::Utf8StreamDecoder;
pub use consumer::cumulative_text;
pub use images::ImageFetch;
pub use events::{Outcome, Phase, SessionEvent, SessionSnapshot, SubmissionId};
pub use error::SessionError;
pub use controller::{SessionController, SessionOptions, SubmissionHandle};
pub use tokio_util::sync::CancellationToken;

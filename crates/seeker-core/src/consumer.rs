// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Turns a raw answer body into cumulative text snapshots.
//!
//! Every item is the whole text decoded so far, so each emission extends the
//! previous one and the caller can store it as-is without concatenating.

use futures::{stream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use seeker_model::{ByteStream, ServiceError};

use crate::Utf8StreamDecoder;

struct ConsumerState {
    body: Option<ByteStream>,
    decoder: Utf8StreamDecoder,
    text: String,
    cancel: CancellationToken,
}

/// Lazily read `body`, yielding the cumulative decoded text after each chunk.
///
/// - End of body: the decoder tail is flushed (one last emission if it
///   produced anything) and the sequence ends.
/// - Body error: the error is yielded once and the sequence ends.
/// - `cancel` triggered: the sequence ends immediately, dropping the body
///   (which aborts the connection) and any partially decoded bytes.
///   Callers tell this apart from a normal end with `cancel.is_cancelled()`.
pub fn cumulative_text(
    body: ByteStream,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<String, ServiceError>> + Send {
    let state = ConsumerState {
        body: Some(body),
        decoder: Utf8StreamDecoder::new(),
        text: String::new(),
        cancel,
    };

    stream::unfold(state, |mut st| async move {
        let body = st.body.as_mut()?;
        let next = tokio::select! {
            biased;
            _ = st.cancel.cancelled() => {
                trace!(pending = st.decoder.pending_len(), "answer stream cancelled");
                return None;
            }
            next = body.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                let piece = st.decoder.decode(&bytes);
                st.text.push_str(&piece);
                let snapshot = st.text.clone();
                Some((Ok(snapshot), st))
            }
            Some(Err(e)) => {
                st.body = None;
                Some((Err(e), st))
            }
            None => {
                st.body = None;
                let tail = st.decoder.finish();
                if tail.is_empty() {
                    None
                } else {
                    st.text.push_str(&tail);
                    let snapshot = st.text.clone();
                    Some((Ok(snapshot), st))
                }
            }
        }
    })
}

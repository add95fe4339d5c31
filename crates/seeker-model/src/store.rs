// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Ordered log of conversation turns.
//!
//! Every mutation installs a freshly copied log instead of editing in place,
//! so a renderer holding an older [`MessageStore::snapshot`] can detect a
//! change with `Arc::ptr_eq` and never observes a half-applied update.

use std::sync::Arc;

use crate::{HistoryEntry, Message, MessageId, Role};

/// Direct reference to a message that was appended to the store.
///
/// Carries the position the message had when it was appended so updates are
/// O(1); the id is re-checked and a scan is done if the position is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle {
    pub id: MessageId,
    index: usize,
}

#[derive(Debug, Clone)]
pub struct MessageStore {
    messages: Arc<[Message]>,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    pub fn new() -> Self {
        Self { messages: Arc::from(Vec::new()) }
    }

    /// Shared, immutable view of the current log.
    pub fn snapshot(&self) -> Arc<[Message]> {
        Arc::clone(&self.messages)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, handle: MessageHandle) -> Option<&Message> {
        self.position(handle).map(|i| &self.messages[i])
    }

    /// Append messages to the end of the log, preserving existing order.
    pub fn append(&mut self, new: impl IntoIterator<Item = Message>) -> Vec<MessageHandle> {
        let mut next = self.messages.to_vec();
        let start = next.len();
        next.extend(new);
        let handles = handles_from(&next, start);
        self.messages = next.into();
        handles
    }

    /// Replace the whole log.
    pub fn replace_all(&mut self, messages: impl IntoIterator<Item = Message>) -> Vec<MessageHandle> {
        let next: Vec<Message> = messages.into_iter().collect();
        let handles = handles_from(&next, 0);
        self.messages = next.into();
        handles
    }

    /// Replace the message behind `handle` with `mutator(current)`.
    ///
    /// Returns `false` (and leaves the log untouched) if the message is gone.
    pub fn update(
        &mut self,
        handle: MessageHandle,
        mutator: impl FnOnce(&Message) -> Message,
    ) -> bool {
        match self.position(handle) {
            Some(i) => {
                self.replace_at(i, mutator);
                true
            }
            None => false,
        }
    }

    /// Replace the most recent message with the given role.  No-op when there
    /// is no such message.
    pub fn update_last_of_role(
        &mut self,
        role: Role,
        mutator: impl FnOnce(&Message) -> Message,
    ) -> bool {
        match self.messages.iter().rposition(|m| m.role == role) {
            Some(i) => {
                self.replace_at(i, mutator);
                true
            }
            None => false,
        }
    }

    /// Prior turns suitable for an answer request.  Messages still marked as
    /// streaming are left out so a reply is never fed back to the model that
    /// is producing it.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.messages
            .iter()
            .filter(|m| !m.is_streaming)
            .map(Message::history_entry)
            .collect()
    }

    pub fn streaming_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_streaming).count()
    }

    fn position(&self, handle: MessageHandle) -> Option<usize> {
        match self.messages.get(handle.index) {
            Some(m) if m.id == handle.id => Some(handle.index),
            _ => self.messages.iter().rposition(|m| m.id == handle.id),
        }
    }

    fn replace_at(&mut self, i: usize, mutator: impl FnOnce(&Message) -> Message) {
        let mut next = self.messages.to_vec();
        let id = next[i].id;
        let mut updated = mutator(&next[i]);
        // Identity is fixed at creation.
        updated.id = id;
        next[i] = updated;
        self.messages = next.into();
    }
}

fn handles_from(messages: &[Message], start: usize) -> Vec<MessageHandle> {
    messages[start..]
        .iter()
        .enumerate()
        .map(|(offset, m)| MessageHandle { id: m.id, index: start + offset })
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Plain-text rendering of session snapshots.
//!
//! Only the newest bot message is printed.  Its text is written
//! incrementally as snapshots arrive; when it completes, image sources (or
//! the reason they are missing) follow on their own lines.

use std::io::{self, Write};

use seeker_core::{SessionEvent, SessionSnapshot};
use seeker_model::{Message, MessageId, Role};

/// Progress on the bot message currently being printed.
struct Printing {
    id: MessageId,
    bytes: usize,
    done: bool,
}

pub struct Renderer<W: Write> {
    out: W,
    printing: Option<Printing>,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self { out, printing: None }
    }

    pub fn render(&mut self, snapshot: &SessionSnapshot) -> io::Result<()> {
        let Some(message) = snapshot.messages.iter().rev().find(|m| m.role == Role::Bot) else {
            return Ok(());
        };

        let previous = self.printing.as_ref().map(|p| (p.id, p.done));
        match previous {
            Some((id, _)) if id == message.id => {}
            other => {
                // A newer submission took over.
                if other.is_some_and(|(_, done)| !done) {
                    writeln!(self.out, " [interrupted]")?;
                }
                self.printing = Some(Printing { id: message.id, bytes: 0, done: false });
            }
        }

        let Some(p) = self.printing.as_mut() else {
            return Ok(());
        };
        if p.done {
            return Ok(());
        }

        if let Some(delta) = message.content.get(p.bytes..) {
            if !delta.is_empty() {
                self.out.write_all(delta.as_bytes())?;
                p.bytes = message.content.len();
            }
        }

        if !message.is_streaming {
            p.done = true;
            writeln!(self.out)?;
            write_images(&mut self.out, message)?;
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Notifications go to stderr so stdout carries only answers.
pub fn report(event: &SessionEvent) {
    match event {
        SessionEvent::Failed { id, error } => eprintln!("[seeker:error] {id}: {error}"),
        SessionEvent::ImagesUnavailable { id, error } => {
            eprintln!("[seeker:warn] {id}: {error}")
        }
        SessionEvent::Started { id, query } => tracing::debug!(%id, %query, "started"),
        SessionEvent::Finalized { id } => tracing::debug!(%id, "finalized"),
        SessionEvent::Aborted { id } => tracing::debug!(%id, "aborted"),
    }
}

fn write_images(out: &mut impl Write, message: &Message) -> io::Result<()> {
    if let Some(images) = &message.images {
        for image in images {
            match &image.title {
                Some(title) => writeln!(out, "  [image] {} ({title})", image.src)?,
                None => writeln!(out, "  [image] {}", image.src)?,
            }
        }
    }
    if let Some(reason) = &message.images_error {
        writeln!(out, "  (images unavailable: {reason})")?;
    }
    Ok(())
}

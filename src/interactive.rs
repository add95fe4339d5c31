// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Line-oriented interactive session.
//!
//! Each input line is a new query that supersedes the answer in flight.
//! An interrupt cancels the running answer, or ends the session when
//! nothing is running.  At end of input the last answer is allowed to
//! finish, but an interrupt still cancels it so a stalled server never
//! keeps the process alive.

use std::io::Write;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use seeker_core::{Outcome, SessionController, SessionEvent, SubmissionHandle};

use crate::render::{report, Renderer};

/// Forward every Ctrl-C as one `()` on the returned channel.
pub fn ctrl_c_interrupts() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

/// Run the session until `input` ends or an interrupt arrives while idle.
/// Returns the output sink once everything has been rendered.
pub async fn run<R, W>(
    controller: SessionController,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    input: R,
    out: W,
    mut interrupts: mpsc::UnboundedReceiver<()>,
) -> anyhow::Result<W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut renderer = Renderer::new(out);
    let mut snapshots = controller.subscribe();
    let mut lines = input.lines();
    let mut last: Option<SubmissionHandle> = controller.submit_initial();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading input")? else { break };
                let query = line.trim();
                if !query.is_empty() {
                    last = Some(controller.submit(query));
                }
            }
            Ok(()) = snapshots.changed() => {
                let snapshot = snapshots.borrow_and_update().clone();
                renderer.render(&snapshot)?;
            }
            Some(event) = events.recv() => report(&event),
            Some(()) = interrupts.recv() => {
                if controller.is_loading() {
                    controller.cancel();
                } else {
                    break;
                }
            }
        }
    }

    if let Some(handle) = last {
        finish_last(&controller, handle, &mut interrupts).await;
    }
    renderer.render(&snapshots.borrow_and_update().clone())?;
    while let Ok(event) = events.try_recv() {
        report(&event);
    }
    Ok(renderer.into_inner())
}

/// Wait for the last answer; an interrupt cancels it first.
async fn finish_last(
    controller: &SessionController,
    handle: SubmissionHandle,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> Outcome {
    let id = handle.id();
    let mut wait = std::pin::pin!(handle.wait());
    tokio::select! {
        outcome = &mut wait => outcome,
        Some(()) = interrupts.recv() => {
            tracing::debug!(%id, "interrupted while waiting for the last answer");
            controller.cancel();
            (&mut wait).await
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use seeker_core::SessionOptions;
    use seeker_model::{AnswerScript, ScriptedAnswerService, ScriptedImageService};

    use super::*;

    fn session(
        answers: &Arc<ScriptedAnswerService>,
    ) -> (SessionController, mpsc::UnboundedReceiver<SessionEvent>) {
        SessionController::new(
            answers.clone(),
            Arc::new(ScriptedImageService::empty()),
            SessionOptions::default(),
        )
    }

    #[tokio::test]
    async fn answers_each_line_until_end_of_input() {
        let answers = Arc::new(ScriptedAnswerService::always_chunks(["Par", "is."]));
        let (ctl, events) = session(&answers);
        let (_tx, interrupts) = mpsc::unbounded_channel();

        let out = run(ctl.clone(), events, &b"capital of France\n"[..], Vec::new(), interrupts)
            .await
            .unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "Paris.\n");
        assert!(!ctl.is_loading());
    }

    #[tokio::test]
    async fn interrupt_after_end_of_input_cancels_stalled_answer() {
        let answers = Arc::new(ScriptedAnswerService::new([AnswerScript::Hang]));
        let (ctl, events) = session(&answers);
        let (tx, interrupts) = mpsc::unbounded_channel();

        let task = tokio::spawn(run(ctl.clone(), events, &b"q\n"[..], Vec::new(), interrupts));

        // Input is exhausted and the answer request is stuck.
        tokio::time::timeout(Duration::from_secs(5), async {
            while answers.recorded().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(ctl.is_loading());

        tx.send(()).unwrap();
        let finished = tokio::time::timeout(Duration::from_secs(5), task).await;
        assert!(finished.is_ok(), "session did not end after interrupt");
        finished.unwrap().unwrap().unwrap();

        assert!(!ctl.is_loading());
        assert!(ctl.messages()[1].is_waiting_for_first_chunk());
    }

    #[tokio::test]
    async fn interrupt_while_idle_ends_session() {
        let answers = Arc::new(ScriptedAnswerService::new([]));
        let (ctl, events) = session(&answers);
        let (tx, interrupts) = mpsc::unbounded_channel();
        tx.send(()).unwrap();

        // Input that never ends: only the interrupt can stop the loop.
        let (_writer, reader) = tokio::io::duplex(64);
        let reader = tokio::io::BufReader::new(reader);
        let out = tokio::time::timeout(
            Duration::from_secs(5),
            run(ctl.clone(), events, reader, Vec::new(), interrupts),
        )
        .await
        .expect("session should end on interrupt")
        .unwrap();

        assert!(out.is_empty());
        assert!(ctl.messages().is_empty());
    }
}

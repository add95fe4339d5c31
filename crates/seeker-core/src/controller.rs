// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use seeker_config::{Config, MAX_IMAGES};
use seeker_model::{
    AnswerRequest, AnswerService, HistoryEntry, ImageService, Message, MessageHandle,
    MessageStore,
};

use crate::{
    cumulative_text, ImageFetch, Outcome, Phase, SessionError, SessionEvent, SessionSnapshot,
    SubmissionId,
};

/// Per-session settings taken from configuration.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Model identifier sent with every answer request.
    pub model: String,
    /// Images requested per query, clamped to `1..=`[`MAX_IMAGES`].
    pub image_limit: usize,
    /// Query supplied by the caller at startup.  The first submission with
    /// exactly this text replaces the store instead of appending to it.
    pub initial_query: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { model: "default".into(), image_limit: MAX_IMAGES, initial_query: None }
    }
}

impl SessionOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            model: cfg.service.model.clone(),
            image_limit: cfg.service.effective_image_limit(),
            initial_query: cfg.session.initial_query.clone(),
        }
    }
}

/// A submission running in the background.
pub struct SubmissionHandle {
    id: SubmissionId,
    task: JoinHandle<Outcome>,
}

impl SubmissionHandle {
    pub fn id(&self) -> SubmissionId {
        self.id
    }

    /// Wait until the submission reaches a terminal state.
    pub async fn wait(self) -> Outcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => Outcome::Failed(SessionError::Task(e.to_string())),
        }
    }
}

/// The submission currently allowed to mutate the store.
struct Active {
    id: SubmissionId,
    token: CancellationToken,
}

struct Shared {
    store: MessageStore,
    current: Option<Active>,
    is_loading: bool,
    phase: Phase,
    submissions: u64,
}

struct Inner {
    answers: Arc<dyn AnswerService>,
    images: Arc<dyn ImageService>,
    options: SessionOptions,
    state: Mutex<Shared>,
    snapshots: watch::Sender<SessionSnapshot>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

/// Everything a spawned submission needs, captured under the state lock.
struct Prepared {
    id: SubmissionId,
    query: String,
    history: Vec<HistoryEntry>,
    token: CancellationToken,
    target: MessageHandle,
}

/// Drives one conversation: owns the message store, runs submissions and
/// makes sure only the newest one can touch the store.
///
/// A new submission cancels the one in flight before its own messages are
/// added.  The cancelled submission's bot message is left exactly as it was
/// (partial text, still marked streaming) and its cleanup never clears
/// `is_loading` on behalf of the newer submission.
///
/// Cloning is cheap; clones share the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    /// Create a session.  The returned receiver yields [`SessionEvent`]s for
    /// every submission, in the order they happen.
    pub fn new(
        answers: Arc<dyn AnswerService>,
        images: Arc<dyn ImageService>,
        options: SessionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let store = MessageStore::new();
        let (snapshots, _) = watch::channel(SessionSnapshot {
            messages: store.snapshot(),
            is_loading: false,
        });
        let inner = Inner {
            answers,
            images,
            options,
            state: Mutex::new(Shared {
                store,
                current: None,
                is_loading: false,
                phase: Phase::Idle,
                submissions: 0,
            }),
            snapshots,
            events,
        };
        (Self { inner: Arc::new(inner) }, rx)
    }

    /// Submit `query`, superseding whatever is in flight.
    ///
    /// The user message and an empty bot placeholder are in the store by the
    /// time this returns.  Must be called from within a tokio runtime.
    pub fn submit(&self, query: impl Into<String>) -> SubmissionHandle {
        let prepared = self.inner.prepare(query.into());
        self.spawn(prepared)
    }

    /// Submit the configured initial query, once.
    ///
    /// Returns `None` if there is no initial query or anything has been
    /// submitted already, so calling this twice during startup is harmless.
    pub fn submit_initial(&self) -> Option<SubmissionHandle> {
        let query = self.inner.options.initial_query.clone()?;
        let prepared = {
            let mut st = self.inner.lock();
            if st.submissions > 0 {
                debug!("initial query already submitted");
                return None;
            }
            self.inner.prepare_locked(&mut st, query)
        };
        Some(self.spawn(prepared))
    }

    /// Cancel the submission in flight.  No-op when idle or already
    /// cancelled.
    pub fn cancel(&self) {
        let st = self.inner.lock();
        if let Some(active) = &st.current {
            if !active.token.is_cancelled() {
                debug!(id = %active.id, "cancelling submission");
                active.token.cancel();
            }
        }
    }

    pub fn messages(&self) -> Arc<[Message]> {
        self.inner.lock().store.snapshot()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().is_loading
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock().phase
    }

    /// The submission that currently owns the store, if any.
    pub fn current_submission(&self) -> Option<SubmissionId> {
        self.inner.lock().current.as_ref().map(|a| a.id)
    }

    /// Store snapshots, republished after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    fn spawn(&self, prepared: Prepared) -> SubmissionHandle {
        let id = prepared.id;
        self.inner.emit(SessionEvent::Started { id, query: prepared.query.clone() });
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.run(prepared).await });
        SubmissionHandle { id, task }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn prepare(&self, query: String) -> Prepared {
        let mut st = self.lock();
        self.prepare_locked(&mut st, query)
    }

    /// Supersede the current submission and install the new message pair.
    /// Runs entirely under the state lock so no old mutation can slip in
    /// between the cancellation and the append.
    fn prepare_locked(&self, st: &mut Shared, query: String) -> Prepared {
        if let Some(previous) = st.current.take() {
            previous.token.cancel();
            debug!(id = %previous.id, "superseded by new submission");
        }

        st.submissions += 1;
        let id = SubmissionId(st.submissions);
        let initial = st.submissions == 1
            && self.options.initial_query.as_deref() == Some(query.as_str());

        let pair = [Message::user(query.clone()), Message::bot_placeholder()];
        let (history, handles) = if initial {
            (Vec::new(), st.store.replace_all(pair))
        } else {
            (st.store.history(), st.store.append(pair))
        };
        let target = handles[1];

        let token = CancellationToken::new();
        st.current = Some(Active { id, token: token.clone() });
        st.is_loading = true;
        st.phase = Phase::Submitting;
        self.publish(st);

        debug!(%id, %query, history = history.len(), initial, "submission started");
        Prepared { id, query, history, token, target }
    }

    async fn run(&self, prepared: Prepared) -> Outcome {
        let id = prepared.id;
        let outcome = self.drive(prepared).await;
        self.finish(id, &outcome);
        outcome
    }

    async fn drive(&self, prepared: Prepared) -> Outcome {
        let Prepared { id, query, history, token, target } = prepared;

        // Started before the answer stream is opened; joined after it ends.
        let images = ImageFetch::start(
            Arc::clone(&self.images),
            query.clone(),
            self.options.image_limit.clamp(1, MAX_IMAGES),
            token.child_token(),
        );

        let request = AnswerRequest { query, model: self.options.model.clone(), history };
        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = self.answers.open(request) => Some(result),
        };
        let body = match opened {
            None => {
                images.abort();
                return Outcome::Aborted;
            }
            Some(Err(e)) => {
                images.abort();
                return Outcome::Failed(SessionError::Open(e));
            }
            Some(Ok(body)) => body,
        };
        self.set_phase(id, &token, Phase::Streaming);

        let mut text = String::new();
        let mut chunks = pin!(cumulative_text(body, token.clone()));
        while let Some(item) = chunks.next().await {
            match item {
                Ok(snapshot) => {
                    if !self.apply(&token, target, |m| m.with_partial(&snapshot)) {
                        images.abort();
                        return Outcome::Aborted;
                    }
                    text = snapshot;
                }
                Err(e) => {
                    images.abort();
                    return Outcome::Failed(SessionError::Body(e));
                }
            }
        }
        if token.is_cancelled() {
            images.abort();
            return Outcome::Aborted;
        }

        self.set_phase(id, &token, Phase::Joining);
        let images = tokio::select! {
            biased;
            _ = token.cancelled() => return Outcome::Aborted,
            result = images.join() => result,
        };

        let (merged, unavailable) = match images {
            Ok(list) => (Ok(list), None),
            Err(e) => {
                warn!(%id, error = %e, "images unavailable");
                (Err(e.to_string()), Some(e))
            }
        };
        if !self.apply(&token, target, |m| m.finished(&text, merged)) {
            return Outcome::Aborted;
        }
        if let Some(error) = unavailable {
            self.emit(SessionEvent::ImagesUnavailable { id, error });
        }
        Outcome::Finalized
    }

    /// Mutate the submission's bot message, unless the submission has been
    /// cancelled.  The token is checked under the same lock a newer
    /// submission takes to cancel it.
    fn apply(
        &self,
        token: &CancellationToken,
        target: MessageHandle,
        mutator: impl FnOnce(&Message) -> Message,
    ) -> bool {
        let mut st = self.lock();
        if token.is_cancelled() {
            return false;
        }
        if !st.store.update(target, mutator) {
            debug!(message = %target.id, "streamed message no longer in store");
        }
        self.publish(&st);
        true
    }

    fn set_phase(&self, id: SubmissionId, token: &CancellationToken, phase: Phase) {
        let mut st = self.lock();
        if !token.is_cancelled() && st.current.as_ref().is_some_and(|a| a.id == id) {
            st.phase = phase;
        }
    }

    /// Terminal bookkeeping.  Shared state is only reset if `id` still owns
    /// it; the event is always emitted.
    fn finish(&self, id: SubmissionId, outcome: &Outcome) {
        {
            let mut st = self.lock();
            if st.current.as_ref().is_some_and(|a| a.id == id) {
                st.current = None;
                st.is_loading = false;
                st.phase = outcome.phase();
                self.publish(&st);
            }
        }

        let event = match outcome {
            Outcome::Finalized => {
                debug!(%id, "submission finalized");
                SessionEvent::Finalized { id }
            }
            Outcome::Aborted => {
                debug!(%id, "submission aborted");
                SessionEvent::Aborted { id }
            }
            Outcome::Failed(error) => {
                warn!(%id, %error, "submission failed");
                SessionEvent::Failed { id, error: error.clone() }
            }
        };
        self.emit(event);
    }

    fn publish(&self, st: &Shared) {
        self.snapshots.send_replace(SessionSnapshot {
            messages: st.store.snapshot(),
            is_loading: st.is_loading,
        });
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

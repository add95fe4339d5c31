// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
/// Session scenarios driven end-to-end through the controller.
///
/// Uses the scripted answer and image services so every scenario is
/// deterministic and needs no network access.
#[cfg(test)]
mod controller_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use seeker_config::MAX_IMAGES;
    use seeker_model::{
        AnswerScript, ImageScript, Message, Role, ScriptedAnswerService, ScriptedImageService,
        ServiceError,
    };
    use tokio::sync::mpsc;

    use crate::{
        Outcome, Phase, SessionController, SessionError, SessionEvent, SessionOptions,
        SubmissionId,
    };

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn session(
        answers: &Arc<ScriptedAnswerService>,
        images: &Arc<ScriptedImageService>,
    ) -> (SessionController, mpsc::UnboundedReceiver<SessionEvent>) {
        session_with(answers, images, SessionOptions::default())
    }

    fn session_with(
        answers: &Arc<ScriptedAnswerService>,
        images: &Arc<ScriptedImageService>,
        options: SessionOptions,
    ) -> (SessionController, mpsc::UnboundedReceiver<SessionEvent>) {
        SessionController::new(answers.clone(), images.clone(), options)
    }

    /// Poll `cond` while letting the spawned submission tasks run.
    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        events
    }

    fn bot(ctl: &SessionController, index: usize) -> Message {
        let messages = ctl.messages();
        assert_eq!(messages[index].role, Role::Bot, "message {index} should be a bot message");
        messages[index].clone()
    }

    fn terminal_count(events: &[SessionEvent], id: SubmissionId) -> usize {
        events
            .iter()
            .filter(|e| match e {
                SessionEvent::Finalized { id: i }
                | SessionEvent::Aborted { id: i }
                | SessionEvent::Failed { id: i, .. } => *i == id,
                _ => false,
            })
            .count()
    }

    // ── Basic turn ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn chunks_accumulate_into_final_answer() {
        let answers = Arc::new(ScriptedAnswerService::always_chunks(["Par", "is."]));
        let images = Arc::new(ScriptedImageService::new([ImageScript::srcs(["eiffel.jpg"])]));
        let (ctl, mut events) = session(&answers, &images);

        let handle = ctl.submit("capital of France");
        let id = handle.id();
        assert!(matches!(handle.wait().await, Outcome::Finalized));

        let messages = ctl.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "capital of France");

        let answer = bot(&ctl, 1);
        assert_eq!(answer.content, "Paris.");
        assert!(!answer.is_streaming);
        assert!(answer.has_started_streaming);
        assert_eq!(answer.images.as_ref().map(Vec::len), Some(1));
        assert!(answer.images_error.is_none());

        assert!(!ctl.is_loading());
        assert_eq!(ctl.phase(), Phase::Finalized);
        assert!(ctl.current_submission().is_none());

        let events = drain(&mut events);
        assert!(matches!(&events[0], SessionEvent::Started { query, .. } if query == "capital of France"));
        assert!(matches!(events.last(), Some(SessionEvent::Finalized { id: i }) if *i == id));
    }

    #[tokio::test]
    async fn messages_are_in_store_before_stream_opens() {
        let answers = Arc::new(ScriptedAnswerService::new([AnswerScript::Hang]));
        let images = Arc::new(ScriptedImageService::empty());
        let (ctl, _events) = session(&answers, &images);

        let _handle = ctl.submit("q");
        let placeholder = bot(&ctl, 1);
        assert!(placeholder.is_waiting_for_first_chunk());
        assert!(placeholder.content.is_empty());
        assert!(ctl.is_loading());
        assert!(ctl.phase().is_in_flight());
        ctl.cancel();
    }

    #[tokio::test]
    async fn request_carries_model_and_image_limit() {
        let answers = Arc::new(ScriptedAnswerService::always_chunks(["ok"]));
        let images = Arc::new(ScriptedImageService::empty());
        let options = SessionOptions { model: "sonar".into(), image_limit: 2, initial_query: None };
        let (ctl, _events) = session_with(&answers, &images, options);

        ctl.submit("q").wait().await;

        assert_eq!(answers.recorded()[0].model, "sonar");
        assert_eq!(images.recorded(), vec![("q".to_string(), 2)]);
    }

    #[tokio::test]
    async fn multibyte_char_split_across_chunks_decodes_once() {
        let answers = Arc::new(ScriptedAnswerService::new([AnswerScript::text_chunks([
            &b"caf\xC3"[..],
            &b"\xA9!"[..],
        ])]));
        let images = Arc::new(ScriptedImageService::empty());
        let (ctl, _events) = session(&answers, &images);

        ctl.submit("q").wait().await;

        let answer = bot(&ctl, 1);
        assert_eq!(answer.content, "café!");
        assert!(!answer.content.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn empty_body_finalizes_with_empty_text() {
        let answers = Arc::new(ScriptedAnswerService::new([AnswerScript::Chunks(vec![])]));
        let images = Arc::new(ScriptedImageService::empty());
        let (ctl, _events) = session(&answers, &images);

        assert!(matches!(ctl.submit("q").wait().await, Outcome::Finalized));
        let answer = bot(&ctl, 1);
        assert!(answer.content.is_empty());
        assert!(!answer.is_streaming);
        assert_eq!(answer.images, Some(vec![]));
    }

    // ── Superseding ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn newer_submission_freezes_the_older_one() {
        let (first_script, first_feed) = AnswerScript::live();
        let (second_script, second_feed) = AnswerScript::live();
        let answers = Arc::new(ScriptedAnswerService::new([first_script, second_script]));
        let images = Arc::new(ScriptedImageService::empty());
        let (ctl, mut events) = session(&answers, &images);

        let first = ctl.submit("first");
        assert!(first_feed.send("partial"));
        wait_until(|| ctl.messages()[1].content == "partial").await;
        let frozen = bot(&ctl, 1);

        let second = ctl.submit("second");
        let first_id = first.id();
        assert!(matches!(first.wait().await, Outcome::Aborted));

        // The old body was dropped with its consumer.
        assert!(first_feed.is_closed());
        assert!(!first_feed.send(" and more"));

        // The newer submission still owns the loading flag.
        assert!(ctl.is_loading());
        assert_eq!(ctl.current_submission(), Some(second.id()));

        assert!(second_feed.send("second answer"));
        second_feed.finish();
        let second_id = second.id();
        assert!(matches!(second.wait().await, Outcome::Finalized));
        assert!(!ctl.is_loading());

        let messages = ctl.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1], frozen);
        assert!(messages[1].is_streaming);
        assert_eq!(messages[3].content, "second answer");
        assert!(!messages[3].is_streaming);

        let events = drain(&mut events);
        assert_eq!(terminal_count(&events, first_id), 1);
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Aborted { id } if *id == first_id)));
        assert!(events.iter().all(|e| !matches!(e, SessionEvent::Failed { .. })));
        assert_eq!(terminal_count(&events, second_id), 1);
    }

    #[tokio::test]
    async fn superseding_before_first_chunk_leaves_empty_placeholder() {
        let answers = Arc::new(ScriptedAnswerService::new([
            AnswerScript::Hang,
            AnswerScript::text_chunks(["done"]),
        ]));
        let images = Arc::new(ScriptedImageService::empty());
        let (ctl, _events) = session(&answers, &images);

        let first = ctl.submit("first");
        wait_until(|| !answers.recorded().is_empty()).await;
        let second = ctl.submit("second");

        assert!(matches!(first.wait().await, Outcome::Aborted));
        assert!(matches!(second.wait().await, Outcome::Finalized));

        let abandoned = bot(&ctl, 1);
        assert!(abandoned.is_waiting_for_first_chunk());
        assert_eq!(bot(&ctl, 3).content, "done");
    }

    #[tokio::test]
    async fn only_the_current_submission_is_live() {
        let mut feeds = Vec::new();
        let mut scripts = Vec::new();
        for _ in 0..3 {
            let (script, feed) = AnswerScript::live();
            scripts.push(script);
            feeds.push(feed);
        }
        let answers = Arc::new(ScriptedAnswerService::new(scripts));
        let images = Arc::new(ScriptedImageService::empty());
        let (ctl, _events) = session(&answers, &images);

        let mut handles = Vec::new();
        for (n, feed) in feeds.iter().enumerate() {
            handles.push(ctl.submit(format!("q{n}")));
            assert!(feed.send(format!("a{n}")));
            let bot_index = n * 2 + 1;
            wait_until(|| ctl.messages()[bot_index].has_started_streaming).await;
        }

        // Every older feed has been disconnected; only the newest still accepts bytes.
        for feed in &feeds[..2] {
            wait_until(|| feed.is_closed()).await;
        }
        assert!(!feeds[2].is_closed());
        assert_eq!(ctl.current_submission(), Some(handles[2].id()));
    }

    // ── History ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn history_excludes_streaming_messages() {
        let (first_script, first_feed) = AnswerScript::live();
        let answers = Arc::new(ScriptedAnswerService::new([
            first_script,
            AnswerScript::text_chunks(["second answer"]),
            AnswerScript::text_chunks(["third answer"]),
        ]));
        let images = Arc::new(ScriptedImageService::empty());
        let (ctl, _events) = session(&answers, &images);

        let _first = ctl.submit("first");
        first_feed.send("half an ans");
        wait_until(|| ctl.messages()[1].has_started_streaming).await;

        ctl.submit("second").wait().await;
        ctl.submit("third").wait().await;

        let requests = answers.recorded();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].history.is_empty());

        let second: Vec<_> = requests[1].history.iter().map(|h| h.content.as_str()).collect();
        assert_eq!(second, ["first"]);

        let third: Vec<_> = requests[2].history.iter().map(|h| h.content.as_str()).collect();
        assert_eq!(third, ["first", "second", "second answer"]);
        assert!(requests[2].history.iter().all(|h| h.content != "half an ans"));
    }

    // ── Cancellation ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let answers = Arc::new(ScriptedAnswerService::new([AnswerScript::Hang]));
        let images = Arc::new(ScriptedImageService::empty());
        let (ctl, mut events) = session(&answers, &images);

        let handle = ctl.submit("q");
        let id = handle.id();
        ctl.cancel();
        ctl.cancel();
        assert!(matches!(handle.wait().await, Outcome::Aborted));
        assert!(!ctl.is_loading());
        assert_eq!(ctl.phase(), Phase::Aborted);

        // After completion, cancel has no observable effect.
        let before = ctl.messages();
        ctl.cancel();
        assert!(Arc::ptr_eq(&before, &ctl.messages()));

        let events = drain(&mut events);
        assert_eq!(events.len(), 2);
        assert_eq!(terminal_count(&events, id), 1);
    }

    #[tokio::test]
    async fn cancel_when_idle_is_noop() {
        let answers = Arc::new(ScriptedAnswerService::new([]));
        let images = Arc::new(ScriptedImageService::empty());
        let (ctl, mut events) = session(&answers, &images);

        ctl.cancel();
        assert_eq!(ctl.phase(), Phase::Idle);
        assert!(ctl.messages().is_empty());
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn cancel_mid_stream_keeps_partial_text() {
        let (script, feed) = AnswerScript::live();
        let answers = Arc::new(ScriptedAnswerService::new([script]));
        let images = Arc::new(ScriptedImageService::new([ImageScript::srcs(["x.png"])]));
        let (ctl, _events) = session(&answers, &images);

        let handle = ctl.submit("q");
        feed.send("so far");
        wait_until(|| ctl.messages()[1].content == "so far").await;
        ctl.cancel();

        assert!(matches!(handle.wait().await, Outcome::Aborted));
        let answer = bot(&ctl, 1);
        assert_eq!(answer.content, "so far");
        assert!(answer.is_streaming);
        assert!(answer.images.is_none());
        assert!(feed.is_closed());
    }

    // ── Image join ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn final_update_waits_for_images() {
        let (script, gate) = ImageScript::gated();
        let answers = Arc::new(ScriptedAnswerService::always_chunks(["Par", "is."]));
        let images = Arc::new(ScriptedImageService::new([script]));
        let (ctl, _events) = session(&answers, &images);

        let handle = ctl.submit("capital of France");
        wait_until(|| ctl.phase() == Phase::Joining).await;

        // Text is complete but the message is not final until the images land.
        let pending = bot(&ctl, 1);
        assert_eq!(pending.content, "Paris.");
        assert!(pending.is_streaming);
        assert!(pending.images.is_none());
        assert!(ctl.is_loading());

        gate.send(vec![seeker_model::ImageRef::new("eiffel.jpg")]).unwrap();
        assert!(matches!(handle.wait().await, Outcome::Finalized));

        let answer = bot(&ctl, 1);
        assert!(!answer.is_streaming);
        assert_eq!(answer.images.unwrap()[0].src, "eiffel.jpg");
    }

    #[tokio::test]
    async fn image_failure_keeps_text_and_records_reason() {
        let answers = Arc::new(ScriptedAnswerService::always_chunks(["Par", "is."]));
        let images = Arc::new(ScriptedImageService::new([ImageScript::Fail(
            ServiceError::Status { service: "images", status: 503, body: "busy".into() },
        )]));
        let (ctl, mut events) = session(&answers, &images);

        let handle = ctl.submit("capital of France");
        let id = handle.id();
        assert!(matches!(handle.wait().await, Outcome::Finalized));

        let answer = bot(&ctl, 1);
        assert_eq!(answer.content, "Paris.");
        assert!(!answer.is_streaming);
        assert!(answer.images.is_none());
        assert!(answer.images_error.as_deref().is_some_and(|e| e.contains("503")));

        let events = drain(&mut events);
        let unavailable = events
            .iter()
            .position(|e| matches!(e, SessionEvent::ImagesUnavailable { id: i, error: SessionError::Images(_) } if *i == id));
        let finalized = events.iter().position(|e| matches!(e, SessionEvent::Finalized { .. }));
        assert!(unavailable.is_some());
        assert!(unavailable < finalized);
    }

    #[tokio::test]
    async fn cancel_while_joining_discards_images() {
        let (script, gate) = ImageScript::gated();
        let answers = Arc::new(ScriptedAnswerService::always_chunks(["text"]));
        let images = Arc::new(ScriptedImageService::new([script]));
        let (ctl, _events) = session(&answers, &images);

        let handle = ctl.submit("q");
        wait_until(|| ctl.phase() == Phase::Joining).await;
        ctl.cancel();

        assert!(matches!(handle.wait().await, Outcome::Aborted));
        wait_until(|| gate.is_closed()).await;
        let answer = bot(&ctl, 1);
        assert_eq!(answer.content, "text");
        assert!(answer.is_streaming);
        assert!(answer.images.is_none());
    }

    // ── Failures ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn open_failure_is_reported_and_placeholder_left() {
        let answers = Arc::new(ScriptedAnswerService::new([AnswerScript::Fail(
            ServiceError::transport("answer", "connection refused"),
        )]));
        let images = Arc::new(ScriptedImageService::empty());
        let (ctl, mut events) = session(&answers, &images);

        let outcome = ctl.submit("q").wait().await;
        assert!(matches!(outcome, Outcome::Failed(SessionError::Open(_))));
        assert!(!ctl.is_loading());
        assert_eq!(ctl.phase(), Phase::Failed);

        let placeholder = bot(&ctl, 1);
        assert!(placeholder.is_waiting_for_first_chunk());

        let events = drain(&mut events);
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Failed { error: SessionError::Open(_), .. })));
    }

    #[tokio::test]
    async fn body_error_keeps_partial_text() {
        let (script, feed) = AnswerScript::live();
        let answers = Arc::new(ScriptedAnswerService::new([script]));
        let images = Arc::new(ScriptedImageService::empty());
        let (ctl, _events) = session(&answers, &images);

        let handle = ctl.submit("q");
        feed.send("half");
        feed.fail(ServiceError::transport("answer", "reset by peer"));

        assert!(matches!(handle.wait().await, Outcome::Failed(SessionError::Body(_))));
        let answer = bot(&ctl, 1);
        assert_eq!(answer.content, "half");
        assert!(answer.is_streaming);
    }

    // ── Initial query ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn initial_query_submits_once() {
        let answers = Arc::new(ScriptedAnswerService::always_chunks(["hi there"]));
        let images = Arc::new(ScriptedImageService::empty());
        let options = SessionOptions { initial_query: Some("hello".into()), ..SessionOptions::default() };
        let (ctl, _events) = session_with(&answers, &images, options);

        let handle = ctl.submit_initial().expect("initial query configured");
        assert!(ctl.submit_initial().is_none());
        handle.wait().await;

        let messages = ctl.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[1].content, "hi there");
        assert_eq!(answers.recorded().len(), 1);
    }

    #[tokio::test]
    async fn first_submission_matching_initial_query_starts_fresh() {
        let answers = Arc::new(ScriptedAnswerService::always_chunks(["hi there"]));
        let images = Arc::new(ScriptedImageService::empty());
        let options = SessionOptions { initial_query: Some("hello".into()), ..SessionOptions::default() };
        let (ctl, _events) = session_with(&answers, &images, options);

        ctl.submit("hello").wait().await;
        // The initial query has been consumed by the matching submission.
        assert!(ctl.submit_initial().is_none());

        let messages = ctl.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[1].content, "hi there");
        let requests = answers.recorded();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].history.is_empty());
    }

    #[tokio::test]
    async fn first_submission_not_matching_initial_query_appends() {
        let answers = Arc::new(ScriptedAnswerService::new([
            AnswerScript::text_chunks(["ok"]),
            AnswerScript::text_chunks(["hi"]),
        ]));
        let images = Arc::new(ScriptedImageService::empty());
        let options = SessionOptions { initial_query: Some("hello".into()), ..SessionOptions::default() };
        let (ctl, _events) = session_with(&answers, &images, options);

        ctl.submit("other").wait().await;
        assert!(ctl.submit_initial().is_none());

        // Matching text on a later submission no longer resets the store.
        ctl.submit("hello").wait().await;

        let messages = ctl.messages();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["other", "ok", "hello", "hi"]);
        let requests = answers.recorded();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].history.is_empty());
        assert_eq!(requests[1].history.len(), 2);
        assert_eq!(requests[1].history[0].content, "other");
    }

    #[tokio::test]
    async fn image_limit_outside_range_is_clamped() {
        let answers = Arc::new(ScriptedAnswerService::always_chunks(["ok"]));
        let images = Arc::new(ScriptedImageService::empty());
        let options = SessionOptions { image_limit: 0, ..SessionOptions::default() };
        let (ctl, _events) = session_with(&answers, &images, options);
        ctl.submit("none").wait().await;

        let options = SessionOptions { image_limit: 12, ..SessionOptions::default() };
        let (ctl, _events) = session_with(&answers, &images, options);
        ctl.submit("many").wait().await;

        assert_eq!(
            images.recorded(),
            vec![("none".to_string(), 1), ("many".to_string(), MAX_IMAGES)]
        );
    }

    #[tokio::test]
    async fn no_initial_query_means_nothing_to_submit() {
        let answers = Arc::new(ScriptedAnswerService::new([]));
        let images = Arc::new(ScriptedImageService::empty());
        let (ctl, _events) = session(&answers, &images);
        assert!(ctl.submit_initial().is_none());
        assert!(ctl.messages().is_empty());
    }

    // ── Snapshots ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn subscribers_see_the_final_state() {
        let answers = Arc::new(ScriptedAnswerService::always_chunks(["a", "b"]));
        let images = Arc::new(ScriptedImageService::empty());
        let (ctl, _events) = session(&answers, &images);
        let mut rx = ctl.subscribe();

        let handle = ctl.submit("q");
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_loading);

        handle.wait().await;
        let snapshot = rx.borrow_and_update().clone();
        assert!(!snapshot.is_loading);
        assert!(Arc::ptr_eq(&snapshot.messages, &ctl.messages()));
        assert_eq!(snapshot.messages[1].content, "ab");
    }
}

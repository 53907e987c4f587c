#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use assert_matches::assert_matches;
use copilot_core::ActionKind;
use copilot_core::AskError;
use copilot_core::CompletionError;
use copilot_core::ConversationSession;
use copilot_core::ErrorKind;
use copilot_core::PanelEvent;
use copilot_core::PanelEventSender;
use copilot_core::PanelMode;
use copilot_core::error::CHAT_FAILURE_MARKER;
use copilot_core::host::ResizeRequest;
use copilot_core::host::TextDocumentProxy;
use copilot_core::panel::state::HeightAnimation;
use copilot_core::protocol::ConversationTurn;
use copilot_core::session::CancelledTurn;
use copilot_core::session::TurnOutcome;
use core_test_support::backend::DEFAULT_REPLY;
use core_test_support::backend::ScriptedBackend;
use core_test_support::shell::KEYBOARD_HEIGHT_PX;
use core_test_support::shell::SCREEN_HEIGHT_PX;
use core_test_support::test_panel::TestPanel;
use core_test_support::test_panel::test_panel;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc::unbounded_channel;

const BASE_HEIGHT: f64 = SCREEN_HEIGHT_PX * 0.45;

async fn answered_chat(backend: Arc<ScriptedBackend>) -> TestPanel {
    let mut panel = test_panel().with_text("what is rust?").build(backend);
    panel.controller.invoke_kind(ActionKind::Chat);
    panel.apply_completion().await;
    panel
}

#[tokio::test]
async fn chat_hides_keyboard_and_answers() {
    let backend = ScriptedBackend::new();
    let mut panel = test_panel().with_text("what is rust?").build(backend);

    panel.controller.invoke_kind(ActionKind::Chat);
    {
        let state = panel.controller.state();
        assert_eq!(state.mode, PanelMode::Loading);
        assert!(state.inverted_toggle);
        assert!(!state.key_input_visible);
        assert_eq!(state.height_px, BASE_HEIGHT);
        assert_eq!(state.transcript, vec![ConversationTurn::user("what is rust?")]);
        let shell = panel.shell.borrow();
        assert!(!shell.key_input_visible);
        assert_eq!(
            shell.resizes,
            vec![ResizeRequest {
                generation: 1,
                total_height_px: BASE_HEIGHT,
                animated: false,
            }]
        );
    }

    panel.apply_completion().await;
    let state = panel.controller.state();
    assert_eq!(state.mode, PanelMode::AwaitingFollowup);
    assert_eq!(state.primary_action_label, "Insert");
    assert_eq!(state.scroll_to_turn, Some(1));
    assert_eq!(
        state.transcript,
        vec![
            ConversationTurn::user("what is rust?"),
            ConversationTurn::assistant(DEFAULT_REPLY),
        ]
    );
}

#[tokio::test]
async fn second_ask_while_pending_is_rejected() {
    let backend = ScriptedBackend::held();
    let mut panel = test_panel().with_text("what is rust?").build(backend.clone());
    panel.controller.invoke_kind(ActionKind::Chat);

    panel.controller.toggle();
    panel.document.borrow_mut().insert_text("more?");
    assert_eq!(panel.controller.ask(), Err(AskError::Busy));
    assert_eq!(panel.controller.state().transcript.len(), 1);
    // The rejected draft stays in the host field.
    assert_eq!(panel.host_text(), "more?");

    backend.release(1);
    panel.apply_completion().await;
    assert_eq!(panel.controller.ask(), Ok(()));
    assert_eq!(
        panel.controller.state().transcript.last(),
        Some(&ConversationTurn::user("more?"))
    );
    assert_eq!(panel.host_text(), "");
}

#[tokio::test]
async fn ask_without_text_is_rejected() {
    let backend = ScriptedBackend::new();
    let mut panel = answered_chat(backend).await;

    panel.controller.toggle();
    assert_eq!(panel.controller.ask(), Err(AskError::EmptyInput));
    assert_eq!(panel.controller.state().transcript.len(), 2);
}

#[tokio::test]
async fn ask_outside_chat_has_no_session() {
    let backend = ScriptedBackend::new();
    let mut panel = test_panel().with_text("draft").build(backend);
    assert_eq!(panel.controller.ask(), Err(AskError::NoSession));

    panel.controller.invoke_kind(ActionKind::Compose);
    assert_eq!(panel.controller.ask(), Err(AskError::NoSession));
}

#[tokio::test]
async fn cancel_restores_the_prior_transcript() {
    let backend = ScriptedBackend::held();
    backend.release(1);
    let mut panel = answered_chat(backend.clone()).await;
    let before = panel.controller.state().transcript.clone();

    panel.controller.toggle();
    panel.document.borrow_mut().insert_text("and then?");
    panel.controller.ask().unwrap();
    assert!(panel.controller.state().is_busy);
    assert_eq!(panel.controller.state().transcript.len(), 3);

    panel.controller.cancel();
    let state = panel.controller.state();
    assert_eq!(state.transcript, before);
    assert!(!state.is_busy);
    assert_eq!(state.primary_action_label, "Insert");
    assert_eq!(state.mode, PanelMode::ComposingFollowup);

    // The unsent question goes back where it was typed.
    assert_eq!(state.pending_followup, "and then?");
    assert_eq!(panel.host_text(), "and then?");

    // A late answer to the cancelled turn changes nothing.
    backend.release(1);
    tokio::task::yield_now().await;
    panel.drain();
    assert_eq!(panel.controller.state().transcript, before);
    assert_eq!(panel.controller.state().pending_followup, "and then?");

    panel.controller.dismiss();
    assert_eq!(panel.host_text(), "what is rust?");
}

#[tokio::test]
async fn cancelled_regenerate_brings_back_the_previous_reply() {
    let backend = ScriptedBackend::held();
    backend.release(1);
    let mut panel = answered_chat(backend).await;
    let before = panel.controller.state().transcript.clone();
    assert_eq!(before.len(), 2);

    panel.controller.reload();
    let state = panel.controller.state();
    assert!(state.is_busy);
    assert_eq!(state.transcript, vec![ConversationTurn::user("what is rust?")]);

    panel.controller.cancel();
    let state = panel.controller.state();
    assert_eq!(state.transcript, before);
    assert!(!state.is_busy);
    assert!(!state.is_hidden());
    assert_eq!(state.mode, PanelMode::AwaitingFollowup);
    assert_eq!(state.primary_action_label, "Insert");
    // Regenerating sends no new question, so there is nothing to hand back.
    assert_eq!(state.pending_followup, "");
    assert_eq!(panel.host_text(), "what is rust?");
}

#[tokio::test]
async fn cancelling_the_first_turn_closes_the_panel() {
    let backend = ScriptedBackend::held();
    let mut panel = test_panel().with_text("what is rust?").build(backend);
    panel.controller.invoke_kind(ActionKind::Chat);

    panel.controller.cancel();
    assert!(panel.controller.state().is_hidden());
    let shell = panel.shell.borrow();
    assert!(shell.key_input_visible);
    assert_eq!(
        shell.last_resize().map(|r| r.total_height_px),
        Some(KEYBOARD_HEIGHT_PX)
    );
}

#[tokio::test]
async fn inverted_toggle_keeps_panel_height() {
    let backend = ScriptedBackend::new();
    let mut panel = answered_chat(backend).await;
    let height = panel.controller.state().height_px;
    assert_eq!(height, BASE_HEIGHT);

    panel.controller.toggle();
    let state = panel.controller.state();
    assert_eq!(state.mode, PanelMode::ComposingFollowup);
    assert!(!state.is_expanded);
    assert!(state.key_input_visible);
    assert_eq!(state.height_px, height);
    assert_eq!(state.target_height_px, height);
    assert_eq!(
        panel.shell.borrow().last_resize().map(|r| r.total_height_px),
        Some(BASE_HEIGHT + KEYBOARD_HEIGHT_PX)
    );
    // Composing starts from an empty host field.
    assert_eq!(panel.host_text(), "");

    panel.controller.toggle();
    let state = panel.controller.state();
    assert_eq!(state.mode, PanelMode::AwaitingFollowup);
    assert!(state.is_expanded);
    assert!(!state.key_input_visible);
    assert_eq!(state.height_px, height);
    assert_eq!(
        panel.shell.borrow().last_resize().map(|r| r.total_height_px),
        Some(BASE_HEIGHT)
    );
}

#[tokio::test]
async fn enlarge_and_collapse_animate_panel_and_host_together() {
    let backend = ScriptedBackend::new();
    let mut panel = answered_chat(backend).await;
    let enlarged = BASE_HEIGHT + KEYBOARD_HEIGHT_PX;

    panel.controller.expand_collapse_enlarged();
    let state = panel.controller.state().clone();
    assert!(state.is_enlarged);
    assert_eq!(state.target_height_px, enlarged);
    assert_eq!(state.height_px, BASE_HEIGHT);
    let generation = assert_matches!(
        state.height_animation,
        HeightAnimation::Running { generation } => generation
    );
    let resize = panel.shell.borrow().last_resize().unwrap();
    assert_eq!(resize.total_height_px, enlarged);
    assert!(resize.animated);

    panel
        .controller
        .handle_event(PanelEvent::HeightAnimationFinished { generation });
    assert_eq!(panel.controller.state().height_px, enlarged);

    panel.controller.expand_collapse_enlarged();
    let state = panel.controller.state();
    assert!(!state.is_enlarged);
    assert_eq!(state.target_height_px, BASE_HEIGHT);
    assert_eq!(
        panel.shell.borrow().last_resize().map(|r| r.total_height_px),
        Some(BASE_HEIGHT)
    );
}

#[tokio::test]
async fn enlarge_with_keyboard_visible_hides_it() {
    let backend = ScriptedBackend::new();
    let mut panel = answered_chat(backend).await;

    panel.controller.toggle();
    assert!(panel.controller.bridge().is_polling());

    panel.controller.expand_collapse_enlarged();
    let state = panel.controller.state();
    assert!(state.is_expanded);
    assert!(state.is_enlarged);
    assert!(!state.key_input_visible);
    assert_eq!(state.mode, PanelMode::AwaitingFollowup);
    assert!(!panel.controller.bridge().is_polling());
    assert!(!panel.shell.borrow().key_input_visible);
}

#[tokio::test]
async fn superseded_animation_end_is_ignored() {
    let backend = ScriptedBackend::new();
    let mut panel = answered_chat(backend).await;

    panel.controller.expand_collapse_enlarged();
    let first = assert_matches!(
        panel.controller.state().height_animation,
        HeightAnimation::Running { generation } => generation
    );
    panel.controller.expand_collapse_enlarged();

    panel
        .controller
        .handle_event(PanelEvent::HeightAnimationFinished { generation: first });
    assert_eq!(panel.controller.state().height_px, BASE_HEIGHT);
    assert_matches!(
        panel.controller.state().height_animation,
        HeightAnimation::Running { .. }
    );
}

#[tokio::test]
async fn failed_turn_appends_marker_and_regenerate_replaces_it() {
    let backend = ScriptedBackend::new();
    backend.push_reply(Err(CompletionError::Network("offline".to_string())));
    let mut panel = answered_chat(backend.clone()).await;

    let state = panel.controller.state();
    assert_eq!(state.last_error, Some(ErrorKind::NetworkFailure));
    assert_eq!(state.primary_action_label, "Retry");
    assert_eq!(
        state.transcript.last(),
        Some(&ConversationTurn::assistant(CHAT_FAILURE_MARKER))
    );

    panel.controller.primary_action();
    assert!(panel.controller.state().is_busy);
    panel.apply_completion().await;

    let state = panel.controller.state();
    assert_eq!(state.last_error, None);
    assert_eq!(
        state.transcript,
        vec![
            ConversationTurn::user("what is rust?"),
            ConversationTurn::assistant(DEFAULT_REPLY),
        ]
    );
}

#[tokio::test]
async fn commit_restores_context_then_inserts_reply() {
    let backend = ScriptedBackend::new();
    backend.push_reply(Ok("A systems language.".to_string()));
    let mut panel = answered_chat(backend).await;

    panel.controller.toggle();
    assert_eq!(panel.host_text(), "");
    panel.controller.commit();

    assert_eq!(panel.host_text(), "what is rust?\n\nA systems language.");
    assert!(panel.controller.state().is_hidden());
    let shell = panel.shell.borrow();
    assert!(shell.key_input_visible);
    assert_eq!(
        shell.last_resize().map(|r| r.total_height_px),
        Some(KEYBOARD_HEIGHT_PX)
    );
}

#[tokio::test]
async fn dismiss_returns_host_to_keyboard_height() {
    let backend = ScriptedBackend::new();
    let mut panel = answered_chat(backend).await;

    panel.controller.expand_collapse_enlarged();
    panel.controller.dismiss();

    assert!(panel.controller.state().is_hidden());
    assert_eq!(panel.controller.state().transcript, Vec::new());
    let shell = panel.shell.borrow();
    assert!(shell.key_input_visible);
    assert_eq!(
        shell.last_resize(),
        Some(ResizeRequest {
            generation: 3,
            total_height_px: KEYBOARD_HEIGHT_PX,
            animated: false,
        })
    );
}

#[tokio::test]
async fn session_discards_completions_for_other_requests() {
    let (tx, _rx) = unbounded_channel();
    let backend = ScriptedBackend::held();
    let mut session = ConversationSession::new(backend, PanelEventSender::new(tx));

    let request_id = session.ask("hello").unwrap();
    assert_eq!(
        session.on_completion(request_id + 1_000, Ok("stray".to_string())),
        None
    );
    assert!(session.is_busy());

    let outcome = session.on_completion(request_id, Ok("hi".to_string()));
    assert_eq!(
        outcome,
        Some(TurnOutcome::Answered { turn_index: 1 })
    );
    assert_eq!(session.last_reply(), Some("hi"));
    assert_eq!(session.regenerate().map(|_| ()), Ok(()));
    assert_eq!(session.transcript(), &[ConversationTurn::user("hello")]);
}

#[tokio::test]
async fn backend_cancellation_returns_the_question() {
    let (tx, _rx) = unbounded_channel();
    let backend = ScriptedBackend::held();
    let mut session = ConversationSession::new(backend, PanelEventSender::new(tx));

    let request_id = session.ask("  hello  ").unwrap();
    let outcome = session.on_completion(request_id, Err(CompletionError::Cancelled));
    assert_eq!(
        outcome,
        Some(TurnOutcome::Cancelled(CancelledTurn {
            request_id,
            unsent: Some("hello".to_string()),
        }))
    );
    assert!(session.transcript().is_empty());
    assert!(!session.is_busy());
    assert_eq!(session.cancel(), None);
}

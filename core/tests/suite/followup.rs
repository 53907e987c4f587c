#![allow(clippy::unwrap_used)]

use std::time::Duration;

use copilot_core::ActionKind;
use copilot_core::PanelEvent;
use copilot_core::PanelMode;
use copilot_core::host::TextDocumentProxy;
use copilot_core::protocol::ConversationTurn;
use core_test_support::backend::ScriptedBackend;
use core_test_support::test_panel::TestPanel;
use core_test_support::test_panel::test_panel;
use pretty_assertions::assert_eq;

async fn composing_panel() -> TestPanel {
    let backend = ScriptedBackend::new();
    let mut panel = test_panel()
        .with_text("original text")
        .with_config(|config| config.followup_poll_interval = Duration::from_millis(100))
        .build(backend);
    panel.controller.invoke_kind(ActionKind::Chat);
    panel.apply_completion().await;
    panel.controller.toggle();
    assert_eq!(panel.controller.state().mode, PanelMode::ComposingFollowup);
    panel
}

async fn apply_poll(panel: &mut TestPanel) {
    panel
        .apply_next(|event| matches!(event, PanelEvent::FollowupPoll { .. }))
        .await;
}

fn queued_polls(panel: &mut TestPanel) -> usize {
    let mut polls = 0;
    while let Ok(event) = panel.events.try_recv() {
        if matches!(event, PanelEvent::FollowupPoll { .. }) {
            polls += 1;
        }
    }
    polls
}

#[tokio::test(start_paused = true)]
async fn poll_mirrors_the_host_field_into_the_draft() {
    let mut panel = composing_panel().await;

    panel.document.borrow_mut().insert_text("and then?");
    apply_poll(&mut panel).await;
    assert_eq!(panel.controller.state().pending_followup, "and then?");

    panel.document.borrow_mut().insert_text(" really");
    apply_poll(&mut panel).await;
    assert_eq!(
        panel.controller.state().pending_followup,
        "and then? really"
    );
}

#[tokio::test(start_paused = true)]
async fn ask_consumes_the_mirrored_draft() {
    let mut panel = composing_panel().await;

    panel.document.borrow_mut().insert_text("why?");
    apply_poll(&mut panel).await;
    panel.controller.ask().unwrap();

    let state = panel.controller.state();
    assert_eq!(state.pending_followup, "");
    assert_eq!(state.transcript.last(), Some(&ConversationTurn::user("why?")));
    assert_eq!(panel.host_text(), "");
}

#[tokio::test(start_paused = true)]
async fn dismiss_stops_the_poll_timer() {
    let mut panel = composing_panel().await;
    apply_poll(&mut panel).await;
    assert!(panel.controller.bridge().is_polling());

    panel.controller.dismiss();
    assert!(!panel.controller.bridge().is_polling());
    panel.drain();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(queued_polls(&mut panel), 0);
}

#[tokio::test(start_paused = true)]
async fn hiding_the_keyboard_pauses_polling() {
    let mut panel = composing_panel().await;
    panel.controller.toggle();
    assert_eq!(panel.controller.state().mode, PanelMode::AwaitingFollowup);
    panel.drain();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(queued_polls(&mut panel), 0);

    // Showing it again resumes against the same saved context.
    panel.controller.toggle();
    panel.document.borrow_mut().insert_text("resumed");
    apply_poll(&mut panel).await;
    assert_eq!(panel.controller.state().pending_followup, "resumed");
}

#[tokio::test(start_paused = true)]
async fn dismiss_puts_back_text_replaced_by_an_unsent_draft() {
    let mut panel = composing_panel().await;
    assert_eq!(panel.host_text(), "");

    panel.document.borrow_mut().insert_text("never sent");
    apply_poll(&mut panel).await;
    panel.controller.dismiss();

    assert_eq!(panel.host_text(), "original text");
}

#[tokio::test(start_paused = true)]
async fn foreign_host_edits_survive_dismiss() {
    let mut panel = composing_panel().await;

    panel.document.borrow_mut().insert_text("draft");
    apply_poll(&mut panel).await;
    // Edited by something other than the follow-up after the last poll.
    panel.document.borrow_mut().insert_text(" plus more");
    panel.controller.dismiss();

    assert_eq!(panel.host_text(), "draft plus more");
}

#[tokio::test(start_paused = true)]
async fn dropping_the_controller_stops_polling() {
    let TestPanel {
        controller,
        mut events,
        ..
    } = composing_panel().await;
    drop(controller);

    tokio::time::sleep(Duration::from_secs(1)).await;
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, PanelEvent::FollowupPoll { .. }),
            "poll after teardown"
        );
    }
}

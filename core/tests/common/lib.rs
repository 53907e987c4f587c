//! Shared helpers for the copilot-core integration suite.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use copilot_core::PanelEvent;
use tokio::sync::mpsc::UnboundedReceiver;

pub mod responses;

/// Long enough for any mocked request; short enough that a missing event
/// fails the test instead of hanging it.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Receives events until one matches `predicate`, returning it. Events that
/// do not match are dropped.
pub async fn wait_for_event<F>(
    rx: &mut UnboundedReceiver<PanelEvent>,
    mut predicate: F,
) -> PanelEvent
where
    F: FnMut(&PanelEvent) -> bool,
{
    loop {
        let event = tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
            .await
            .expect("timeout waiting for panel event")
            .expect("panel event channel closed");
        if predicate(&event) {
            return event;
        }
    }
}

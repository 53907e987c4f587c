//! Reads and writes the host text field and mirrors follow-up drafts typed
//! into it back into the panel.
//!
//! Host change notifications cannot be relied on inside an input-method
//! extension, so while a follow-up is being composed a fixed-interval poll
//! re-reads the text before the insertion point. The poll is the only
//! long-lived background activity in the panel; it is owned by a
//! [`PollTask`] that cancels itself when dropped, so every path that drops
//! the follow-up state also stops the timer.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use unicode_segmentation::UnicodeSegmentation;

use crate::host::TextDocumentProxy;
use crate::protocol::PanelEvent;
use crate::protocol::PanelEventSender;

/// Host text saved when follow-up composition starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedContext {
    pub before: String,
    pub after: String,
}

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollTask {
    /// Must be called from within a tokio runtime.
    fn spawn(capture_id: u64, period: Duration, events: PanelEventSender) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if !events.send(PanelEvent::FollowupPoll { capture_id }) {
                            break;
                        }
                    }
                }
            }
            trace!(capture_id, "follow-up poll stopped");
        });
        Self { cancel, handle }
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

struct Followup {
    saved: SavedContext,
    /// Last text seen before the insertion point while composing.
    draft: String,
    capture_id: u64,
    poll: Option<PollTask>,
}

pub struct HostTextBridge {
    document: Box<dyn TextDocumentProxy>,
    followup: Option<Followup>,
    next_capture_id: u64,
}

impl HostTextBridge {
    pub fn new(document: Box<dyn TextDocumentProxy>) -> Self {
        Self {
            document,
            followup: None,
            next_capture_id: 0,
        }
    }

    /// Source text for an action: a non-empty selection, else everything
    /// before the insertion point, else nothing.
    pub fn capture_for_action(&self) -> Option<String> {
        if let Some(selected) = self
            .document
            .selected_text()
            .filter(|selected| !selected.trim().is_empty())
        {
            return Some(selected);
        }
        let before = self.document.text_before_cursor();
        if before.trim().is_empty() {
            None
        } else {
            Some(before)
        }
    }

    /// Starts (or resumes) mirroring the host field into the follow-up draft.
    ///
    /// The first call of a follow-up saves the surrounding text and empties
    /// the field before the insertion point so the user composes into a
    /// blank field. Resuming after [`Self::exit_followup_capture`] keeps the
    /// saved context and only restarts the poll. Returns the id carried by
    /// the poll events of this capture.
    pub fn enter_followup_capture(&mut self, period: Duration, events: PanelEventSender) -> u64 {
        self.next_capture_id += 1;
        let capture_id = self.next_capture_id;

        if self.followup.is_none() {
            let saved = SavedContext {
                before: self.document.text_before_cursor(),
                after: self.document.text_after_cursor(),
            };
            self.clear_before_cursor();
            debug!(
                capture_id,
                saved_chars = saved.before.chars().count(),
                "entering follow-up capture"
            );
            self.followup = Some(Followup {
                saved,
                draft: String::new(),
                capture_id,
                poll: None,
            });
        }

        if let Some(followup) = self.followup.as_mut() {
            followup.capture_id = capture_id;
            // Replacing the task drops, and therefore stops, any previous poll.
            followup.poll = Some(PollTask::spawn(capture_id, period, events));
        }
        capture_id
    }

    /// Stops polling. The saved context and the current draft are kept.
    pub fn exit_followup_capture(&mut self) {
        if let Some(followup) = self.followup.as_mut() {
            if followup.poll.take().is_some() {
                debug!(capture_id = followup.capture_id, "follow-up poll stopped");
            }
        }
    }

    pub fn is_polling(&self) -> bool {
        self.followup
            .as_ref()
            .is_some_and(|followup| followup.poll.is_some())
    }

    pub fn has_followup(&self) -> bool {
        self.followup.is_some()
    }

    /// Handles one poll tick. Returns the new draft when the host text changed
    /// since the last tick; stale ticks from an earlier capture are ignored.
    pub fn poll(&mut self, capture_id: u64) -> Option<String> {
        let followup = self.followup.as_mut()?;
        if followup.capture_id != capture_id || followup.poll.is_none() {
            trace!(capture_id, "ignoring stale follow-up poll");
            return None;
        }
        let current = self.document.text_before_cursor();
        if current == followup.draft {
            return None;
        }
        followup.draft = current.clone();
        Some(current)
    }

    /// Hands out the current follow-up draft and removes it from the host
    /// field. The host is re-read first; the field is only cleared when it
    /// still holds nothing but the draft.
    pub fn take_draft(&mut self) -> String {
        let current = self.document.text_before_cursor();
        let Some(followup) = self.followup.as_mut() else {
            return String::new();
        };
        if followup.poll.is_some() {
            followup.draft = current.clone();
        }
        let draft = std::mem::take(&mut followup.draft);
        if !draft.is_empty() && current == draft {
            self.clear_before_cursor();
        }
        draft
    }

    /// Puts a draft that was taken for a turn that never completed back into
    /// the host field. The host is re-read first and left alone unless the
    /// field before the insertion point is still empty.
    pub fn restore_draft(&mut self, draft: &str) {
        let current = self.document.text_before_cursor();
        let Some(followup) = self.followup.as_mut() else {
            return;
        };
        if draft.is_empty() || !current.is_empty() {
            debug!("host field not empty; unsent draft kept in the panel only");
            return;
        }
        followup.draft = draft.to_string();
        self.document.insert_text(draft);
    }

    /// Stops polling and puts back the text saved when the follow-up began,
    /// provided the host field holds only the abandoned draft (or nothing)
    /// and the text after the insertion point is what it was when the
    /// follow-up began.
    pub fn end_followup(&mut self) {
        let Some(mut followup) = self.followup.take() else {
            return;
        };
        followup.poll = None;

        let current = self.document.text_before_cursor();
        let untouched = current.is_empty() || current == followup.draft;
        if !untouched || self.document.text_after_cursor() != followup.saved.after {
            debug!("host text changed outside the follow-up; leaving it untouched");
            return;
        }
        self.clear_before_cursor();
        if !followup.saved.before.is_empty() {
            self.document.insert_text(&followup.saved.before);
        }
        debug!(capture_id = followup.capture_id, "follow-up context restored");
    }

    /// Inserts generated text at the insertion point, separated from existing
    /// content by a blank line. Existing host text is never deleted: a live
    /// selection is written back ahead of the generated text, since the host
    /// replaces selected text on insert.
    pub fn insert_generated(&mut self, text: &str) {
        if let Some(selected) = self
            .document
            .selected_text()
            .filter(|selected| !selected.is_empty())
        {
            self.document.insert_text(&format!("{selected}\n\n{text}"));
            return;
        }
        let before = self.document.text_before_cursor();
        let after = self.document.text_after_cursor();
        let insertion = if !before.is_empty() {
            format!("\n\n{text}")
        } else if !after.is_empty() {
            format!("{text}\n\n")
        } else {
            text.to_string()
        };
        self.document.insert_text(&insertion);
    }

    /// Deletes everything before the insertion point one unit at a time,
    /// re-reading between deletions. Bounded by the units seen up front so a
    /// host that ignores deletions cannot stall the loop.
    fn clear_before_cursor(&mut self) {
        let budget = self.document.text_before_cursor().graphemes(true).count();
        for _ in 0..budget {
            if self.document.text_before_cursor().is_empty() {
                break;
            }
            self.document.delete_backward();
        }
    }
}

impl Drop for HostTextBridge {
    fn drop(&mut self) {
        self.exit_followup_capture();
    }
}

//! The panel state machine.
//!
//! ```text
//! Hidden -> Loading -> ShowingResult | ShowingWebContent       (single actions)
//! Hidden -> Loading -> AwaitingFollowup <-> ComposingFollowup  (chat)
//! any    -> Hidden                                             (dismiss, commit)
//! ```
//!
//! All mutation happens through the commands below and through
//! [`PanelController::handle_event`], which applies results produced by
//! background tasks once they have been marshalled back onto the caller's
//! context.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;
use url::Url;

use crate::bridge::HostTextBridge;
use crate::client::CompletionBackend;
use crate::config::Config;
use crate::error::AskError;
use crate::error::CompletionError;
use crate::error::ErrorKind;
use crate::host::HostShell;
use crate::host::LayoutMetrics;
use crate::host::TextDocumentProxy;
use crate::panel::layout::HeightBudget;
use crate::panel::layout::HeightTransition;
use crate::panel::layout::ResizeCoordinator;
use crate::panel::layout::animates;
use crate::panel::layout::base_panel_height;
use crate::panel::state::LABEL_INSERT;
use crate::panel::state::LABEL_OPEN;
use crate::panel::state::LABEL_RETRY;
use crate::panel::state::PanelMode;
use crate::panel::state::PanelState;
use crate::panel::state::VisualCue;
use crate::protocol::ActionKind;
use crate::protocol::ActionRequest;
use crate::protocol::ConversationTurn;
use crate::protocol::PanelEvent;
use crate::protocol::PanelEventSender;
use crate::protocol::Role;
use crate::protocol::next_request_id;
use crate::session::ConversationSession;
use crate::session::TurnOutcome;

const WEB_SEARCH_BASE: &str = "https://www.google.com/search";

/// An outstanding single-turn request. Dropping it aborts the request.
struct SingleInFlight {
    request_id: u64,
    cancel: CancellationToken,
}

impl Drop for SingleInFlight {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum ActiveContent {
    Text { in_flight: Option<SingleInFlight> },
    Web { url: Url },
    Chat { session: ConversationSession },
}

struct ActiveAction {
    request: ActionRequest,
    base_height_px: f64,
    content: ActiveContent,
}

pub struct PanelController {
    config: Config,
    backend: Arc<dyn CompletionBackend>,
    events: PanelEventSender,
    bridge: HostTextBridge,
    shell: Box<dyn HostShell>,
    state: PanelState,
    resize: ResizeCoordinator,
    active: Option<ActiveAction>,
    animation_generation: u64,
}

impl PanelController {
    pub fn new(
        config: Config,
        backend: Arc<dyn CompletionBackend>,
        events: PanelEventSender,
        document: Box<dyn TextDocumentProxy>,
        shell: Box<dyn HostShell>,
    ) -> Self {
        Self {
            config,
            backend,
            events,
            bridge: HostTextBridge::new(document),
            shell,
            state: PanelState::default(),
            resize: ResizeCoordinator::default(),
            active: None,
            animation_generation: 0,
        }
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn bridge(&self) -> &HostTextBridge {
        &self.bridge
    }

    /// Sender views and shells use to report animation and web-content
    /// completion back into [`Self::handle_event`].
    pub fn event_sender(&self) -> PanelEventSender {
        self.events.clone()
    }

    /// Runs `kind` on whatever [`HostTextBridge::capture_for_action`] finds.
    /// Does nothing when the host has no usable text.
    pub fn invoke_kind(&mut self, kind: ActionKind) {
        match self.bridge.capture_for_action() {
            Some(source_text) => self.invoke(ActionRequest::new(kind, source_text)),
            None => debug!(?kind, "no source text; ignoring action"),
        }
    }

    pub fn invoke(&mut self, request: ActionRequest) {
        if request.source_text().trim().is_empty() {
            debug!(kind = ?request.kind(), "no source text; ignoring action");
            return;
        }
        if !self.state.is_hidden() {
            self.dismiss();
        }

        let kind = request.kind();
        let metrics = self.shell.metrics();
        let base_height_px = base_panel_height(&metrics, &self.config);
        info!(
            ?kind,
            source_chars = request.source_text().chars().count(),
            "invoking action"
        );

        self.state.mode = PanelMode::Loading;
        self.state.action_kind = Some(kind);
        self.state.last_error = None;
        self.state.set_busy(true);

        let content = if kind.is_conversational() {
            self.open_chat(&request, base_height_px, &metrics)
        } else if kind.is_resource_backed() {
            let Some(url) = web_search_url(request.source_text()) else {
                warn!("could not build a search locator");
                self.state.reset();
                return;
            };
            self.open_web(url, &metrics)
        } else {
            self.open_text(&request, &metrics)
        };

        self.active = Some(ActiveAction {
            request,
            base_height_px,
            content,
        });
    }

    fn open_chat(
        &mut self,
        request: &ActionRequest,
        base_height_px: f64,
        metrics: &LayoutMetrics,
    ) -> ActiveContent {
        self.state.inverted_toggle = true;
        self.state.allows_toggle = true;
        self.state.is_expanded = true;
        self.state.is_enlarged = false;
        self.set_key_input_visible(false);

        // Host first, then the panel's own height.
        let budget = HeightBudget::for_panel(base_height_px, metrics);
        self.request_resize(budget.panel_only, animates(HeightTransition::Open, false));
        self.set_panel_height(base_height_px, animates(HeightTransition::Open, false));

        let mut session = ConversationSession::new(Arc::clone(&self.backend), self.events.clone());
        if let Err(err) = session.ask(request.source_text()) {
            warn!(session_id = %session.id(), "initial chat turn rejected: {err}");
        }
        self.state.transcript = session.transcript().to_vec();
        ActiveContent::Chat { session }
    }

    fn open_web(&mut self, url: Url, metrics: &LayoutMetrics) -> ActiveContent {
        self.state.inverted_toggle = false;
        self.state.allows_toggle = true;
        self.state.is_expanded = true;
        self.state.web_url = Some(url.clone());
        // Overlays the key surface; the host keeps its height.
        self.set_panel_height(
            metrics.keyboard_height_px,
            animates(HeightTransition::Open, true),
        );
        self.shell.present_web_content(&url);
        ActiveContent::Web { url }
    }

    fn open_text(&mut self, request: &ActionRequest, metrics: &LayoutMetrics) -> ActiveContent {
        self.state.inverted_toggle = false;
        self.state.allows_toggle = false;
        self.state.is_expanded = true;
        self.set_panel_height(
            metrics.keyboard_height_px,
            animates(HeightTransition::Open, false),
        );
        ActiveContent::Text {
            in_flight: Some(self.spawn_single(request)),
        }
    }

    fn spawn_single(&self, request: &ActionRequest) -> SingleInFlight {
        let request_id = next_request_id();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let backend = Arc::clone(&self.backend);
        let events = self.events.clone();
        let kind = request.kind();
        let source_text = request.source_text().to_string();

        debug!(request_id, ?kind, "sending single-turn request");
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                result = backend.complete_single(kind, &source_text) => result,
            };
            events.send(PanelEvent::SingleCompleted { request_id, result });
        });
        SingleInFlight { request_id, cancel }
    }

    /// Applies an event produced off the UI context.
    pub fn handle_event(&mut self, event: PanelEvent) {
        match event {
            PanelEvent::SingleCompleted { request_id, result } => match result {
                Ok(text) => self.handle_result(request_id, text),
                Err(err) => {
                    if let CompletionError::RemoteApi(message) = &err {
                        warn!(request_id, "completion service returned an error: {message}");
                    }
                    self.handle_failure(request_id, ErrorKind::from(&err));
                }
            },
            PanelEvent::ChatCompleted { request_id, result } => {
                self.on_chat_completed(request_id, result);
            }
            PanelEvent::FollowupPoll { capture_id } => self.on_followup_poll(capture_id),
            PanelEvent::HeightAnimationFinished { generation } => {
                if !self.state.finish_animation(generation) {
                    debug!(generation, "ignoring superseded height animation");
                }
            }
            PanelEvent::WebContentFinished { url, result } => {
                self.on_web_content_finished(url, result);
            }
        }
    }

    /// Takes the pending single-turn request for `request_id`, if it is the
    /// current one.
    fn take_single(&mut self, request_id: u64) -> Option<SingleInFlight> {
        let Some(ActiveAction {
            content: ActiveContent::Text { in_flight },
            ..
        }) = self.active.as_mut()
        else {
            return None;
        };
        if in_flight
            .as_ref()
            .is_none_or(|pending| pending.request_id != request_id)
        {
            return None;
        }
        in_flight.take()
    }

    pub fn handle_result(&mut self, request_id: u64, text: String) {
        if self.take_single(request_id).is_none() {
            debug!(request_id, "discarding stale result");
            return;
        }
        self.state.mode = PanelMode::ShowingResult;
        self.state.result_text = Some(text);
        self.state.last_error = None;
        self.state.visual_cue = None;
        self.state.set_busy(false);
        self.state.set_label(LABEL_INSERT);
    }

    pub fn handle_failure(&mut self, request_id: u64, kind: ErrorKind) {
        if self.take_single(request_id).is_none() {
            debug!(request_id, "discarding stale failure");
            return;
        }
        if kind == ErrorKind::Cancelled {
            debug!(request_id, "request cancelled by backend");
            self.dismiss();
            return;
        }
        self.state.mode = PanelMode::ShowingResult;
        self.state.result_text = kind.user_message().map(str::to_string);
        self.state.last_error = Some(kind);
        self.state.visual_cue = None;
        self.state.set_busy(false);
        self.state.set_label(LABEL_RETRY);
    }

    fn on_chat_completed(&mut self, request_id: u64, result: Result<String, CompletionError>) {
        let Some(ActiveAction {
            content: ActiveContent::Chat { session },
            ..
        }) = self.active.as_mut()
        else {
            debug!(request_id, "discarding chat completion without a session");
            return;
        };
        let Some(outcome) = session.on_completion(request_id, result) else {
            return;
        };
        self.state.transcript = session.transcript().to_vec();
        let has_reply = session.last_reply().is_some();
        let transcript_empty = session.transcript().is_empty();

        self.state.set_busy(false);
        self.state.visual_cue = None;
        match outcome {
            TurnOutcome::Answered { turn_index } => {
                self.state.scroll_to_turn = Some(turn_index);
                self.state.last_error = None;
            }
            TurnOutcome::Failed { turn_index, error } => {
                self.state.scroll_to_turn = Some(turn_index);
                self.state.last_error = Some(error);
            }
            TurnOutcome::Cancelled(_) if transcript_empty => {
                self.dismiss();
                return;
            }
            TurnOutcome::Cancelled(cancelled) => self.restore_unsent(cancelled.unsent),
        }
        self.state.set_label(if has_reply { LABEL_INSERT } else { LABEL_RETRY });
        self.state.mode = self.chat_mode();
    }

    /// Hands the text of a rolled-back question back to the user, both in
    /// the panel and in the host field it was typed into.
    fn restore_unsent(&mut self, unsent: Option<String>) {
        let Some(text) = unsent else {
            return;
        };
        self.bridge.restore_draft(&text);
        self.state.pending_followup = text;
    }

    fn on_followup_poll(&mut self, capture_id: u64) {
        if self.state.mode != PanelMode::ComposingFollowup {
            return;
        }
        if let Some(draft) = self.bridge.poll(capture_id) {
            self.state.pending_followup = draft;
        }
    }

    fn on_web_content_finished(&mut self, url: Url, result: Result<(), CompletionError>) {
        let current = match &self.active {
            Some(ActiveAction {
                content: ActiveContent::Web { url: current },
                ..
            }) => current,
            _ => {
                debug!(%url, "web content finished without an active web panel");
                return;
            }
        };
        if *current != url {
            debug!(%url, "ignoring stale web content");
            return;
        }
        self.state.mode = PanelMode::ShowingWebContent;
        self.state.set_busy(false);
        match result {
            Ok(()) => {
                self.state.last_error = None;
                self.state.set_label(LABEL_OPEN);
            }
            Err(err) => {
                warn!(%url, "web content failed to load: {err}");
                self.state.last_error = Some(ErrorKind::NetworkFailure);
                self.state.set_label(LABEL_RETRY);
            }
        }
    }

    /// Refreshes web content in place, or asks for a fresh generation of the
    /// current text (the old text dissolves while the new one is fetched).
    pub fn reload(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        match &mut active.content {
            ActiveContent::Web { url } => {
                info!(%url, "reloading web content");
                self.shell.reload_web_content();
                self.state.last_error = None;
                self.state.set_busy(true);
            }
            ActiveContent::Text { in_flight } => {
                if in_flight.is_some() {
                    debug!("reload ignored: request in flight");
                    return;
                }
                let request = active.request.clone();
                let pending = self.spawn_single(&request);
                if let Some(ActiveAction {
                    content: ActiveContent::Text { in_flight },
                    ..
                }) = self.active.as_mut()
                {
                    *in_flight = Some(pending);
                }
                self.state.mode = PanelMode::Loading;
                self.state.result_text = None;
                self.state.last_error = None;
                self.state.visual_cue = Some(VisualCue::Dissolve);
                self.state.set_busy(true);
            }
            ActiveContent::Chat { session } => match session.regenerate() {
                Ok(request_id) => {
                    info!(session_id = %session.id(), request_id, "regenerating last reply");
                    self.state.transcript = session.transcript().to_vec();
                    self.state.last_error = None;
                    self.state.visual_cue = Some(VisualCue::Dissolve);
                    self.state.set_busy(true);
                }
                Err(err) => debug!("regenerate rejected: {err}"),
            },
        }
    }

    /// Chat: swaps which of panel and key-input surface is showing, keeping
    /// the content height. Other toggleable content: resizes itself between
    /// filling the extension and sharing it with the keyboard.
    pub fn toggle(&mut self) {
        if self.active.is_none() || !self.state.allows_toggle {
            return;
        }
        if self.state.inverted_toggle {
            if self.state.is_expanded {
                self.show_keyboard_for_followup();
            } else {
                self.hide_keyboard();
            }
            self.state.mode = self.chat_mode();
            return;
        }

        let metrics = self.shell.metrics();
        self.state.is_expanded = !self.state.is_expanded;
        let height = if self.state.is_expanded {
            metrics.keyboard_height_px
        } else {
            metrics.keyboard_height_px * self.config.shared_height_ratio
        };
        self.set_panel_height(height, animates(HeightTransition::Toggle, true));
    }

    /// Chat-only three-way size change:
    /// enlarged with keyboard hidden collapses to base size, base size with
    /// keyboard hidden enlarges, and with the keyboard visible the keyboard
    /// is hidden and the panel enlarged in one step.
    pub fn expand_collapse_enlarged(&mut self) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        if !self.state.is_chat() {
            return;
        }
        let base = active.base_height_px;
        let metrics = self.shell.metrics();
        let enlarged = (base + metrics.keyboard_height_px).min(metrics.max_total_height_px);

        let (height, transition) = match (self.state.is_expanded, self.state.is_enlarged) {
            (true, true) => {
                self.state.is_enlarged = false;
                (base, HeightTransition::Collapse)
            }
            (true, false) => {
                self.state.is_enlarged = true;
                (enlarged, HeightTransition::Enlarge)
            }
            (false, _) => {
                self.bridge.exit_followup_capture();
                self.set_key_input_visible(false);
                self.state.is_expanded = true;
                self.state.is_enlarged = true;
                (enlarged, HeightTransition::Enlarge)
            }
        };
        let animated = animates(transition, false);
        debug!(?transition, height, "resizing chat panel");
        self.request_resize(height, animated);
        self.set_panel_height(height, animated);
        self.state.mode = self.chat_mode();
    }

    /// Sends the mirrored follow-up draft as the next chat turn.
    pub fn ask(&mut self) -> Result<(), AskError> {
        let Some(ActiveAction {
            content: ActiveContent::Chat { session },
            ..
        }) = self.active.as_mut()
        else {
            return Err(AskError::NoSession);
        };
        if session.is_busy() {
            debug!(session_id = %session.id(), "ask rejected: request in flight");
            return Err(AskError::Busy);
        }
        let draft = self.bridge.take_draft();
        let text = if draft.trim().is_empty() {
            std::mem::take(&mut self.state.pending_followup)
        } else {
            draft
        };
        session.ask(&text)?;
        self.state.transcript = session.transcript().to_vec();
        self.state.scroll_to_turn = self.state.transcript.len().checked_sub(1);
        self.state.pending_followup.clear();
        self.state.last_error = None;
        self.state.set_busy(true);
        Ok(())
    }

    /// Aborts the in-flight request. In chat the pending turn is rolled
    /// back and the conversation stays open; anywhere else the panel closes.
    pub fn cancel(&mut self) {
        let Some(ActiveAction {
            content: ActiveContent::Chat { session },
            ..
        }) = self.active.as_mut()
        else {
            self.dismiss();
            return;
        };
        let Some(cancelled) = session.cancel() else {
            self.dismiss();
            return;
        };
        self.state.transcript = session.transcript().to_vec();
        let has_reply = session.last_reply().is_some();
        if self.state.transcript.is_empty() {
            self.dismiss();
            return;
        }
        self.restore_unsent(cancelled.unsent);
        self.state.set_busy(false);
        self.state.visual_cue = None;
        self.state.set_label(if has_reply { LABEL_INSERT } else { LABEL_RETRY });
        self.state.mode = self.chat_mode();
    }

    /// Inserts the generated text into the host, or opens the web result
    /// externally, then closes the panel.
    pub fn commit(&mut self) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        match &active.content {
            ActiveContent::Text { in_flight } => {
                if in_flight.is_some() || self.state.last_error.is_some() {
                    debug!("nothing to commit yet");
                    return;
                }
                let Some(text) = self.state.result_text.clone() else {
                    return;
                };
                self.bridge.insert_generated(&text);
            }
            ActiveContent::Web { url } => {
                let url = url.clone();
                self.shell.open_url(&url);
            }
            ActiveContent::Chat { session } => {
                let Some(text) = session.last_reply().map(str::to_string) else {
                    debug!("no reply to commit");
                    return;
                };
                // Put the host text back before appending to it.
                self.bridge.end_followup();
                self.bridge.insert_generated(&text);
            }
        }
        info!(kind = ?self.state.action_kind, "committed panel result");
        self.dismiss();
    }

    /// Runs whatever the primary button currently offers.
    pub fn primary_action(&mut self) {
        if self.state.is_busy {
            self.cancel();
        } else if self.state.last_error.is_some() {
            self.reload();
        } else {
            self.commit();
        }
    }

    /// Cancels outstanding work, stops the follow-up poll, releases held
    /// content and returns to `Hidden`.
    pub fn dismiss(&mut self) {
        let active = self.active.take();
        self.bridge.end_followup();

        let held_web_content = active
            .as_ref()
            .is_some_and(|active| matches!(active.content, ActiveContent::Web { .. }));
        if held_web_content {
            self.shell.release_web_content();
        }
        // Dropping the action aborts any request it still owns.
        drop(active);

        if !self.state.key_input_visible {
            self.set_key_input_visible(true);
        }
        let metrics = self.shell.metrics();
        if let Some(request) = self.resize.restore(&metrics) {
            self.shell.request_resize(request);
        }
        if !self.state.is_hidden() {
            debug!(kind = ?self.state.action_kind, "panel dismissed");
        }
        self.state.reset();
    }

    /// Called when the extension is about to be torn down.
    pub fn prepare_for_teardown(&mut self) {
        self.dismiss();
    }

    fn show_keyboard_for_followup(&mut self) {
        let metrics = self.shell.metrics();
        self.state.is_expanded = false;
        self.set_key_input_visible(true);
        let budget = HeightBudget::for_panel(self.state.target_height_px, &metrics);
        self.request_resize(budget.panel_with_keyboard, false);
        self.bridge
            .enter_followup_capture(self.config.followup_poll_interval, self.events.clone());
    }

    fn hide_keyboard(&mut self) {
        let metrics = self.shell.metrics();
        self.bridge.exit_followup_capture();
        self.state.is_expanded = true;
        self.set_key_input_visible(false);
        let budget = HeightBudget::for_panel(self.state.target_height_px, &metrics);
        self.request_resize(budget.panel_only, false);
    }

    fn chat_mode(&self) -> PanelMode {
        if self.bridge.is_polling() {
            PanelMode::ComposingFollowup
        } else if self.state.is_busy && !self.state.transcript.iter().any(is_reply) {
            PanelMode::Loading
        } else {
            PanelMode::AwaitingFollowup
        }
    }

    fn set_key_input_visible(&mut self, visible: bool) {
        self.state.key_input_visible = visible;
        self.shell.set_key_input_visible(visible);
    }

    fn request_resize(&mut self, total_height_px: f64, animated: bool) {
        let metrics = self.shell.metrics();
        if let Some(request) = self.resize.request(total_height_px, &metrics, animated) {
            debug!(
                generation = request.generation,
                height = request.total_height_px,
                animated,
                "requesting host resize"
            );
            self.shell.request_resize(request);
        }
    }

    fn set_panel_height(&mut self, height_px: f64, animated: bool) {
        if animated {
            self.animation_generation += 1;
            self.state
                .animate_height_to(height_px, self.animation_generation);
        } else {
            self.state.set_height_immediate(height_px);
        }
    }
}

impl Drop for PanelController {
    fn drop(&mut self) {
        self.bridge.exit_followup_capture();
    }
}

fn is_reply(turn: &ConversationTurn) -> bool {
    turn.role == Role::Assistant
}

fn web_search_url(query: &str) -> Option<Url> {
    Url::parse_with_params(WEB_SEARCH_BASE, &[("q", query.trim())]).ok()
}

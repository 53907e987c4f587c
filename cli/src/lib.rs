//! Headless driver for the copilot panel: runs one action over a line of
//! text with an in-memory host field, then commits the result.

use std::cell::RefCell;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use clap::Subcommand;
use copilot_core::ActionKind;
use copilot_core::CompletionBackend;
use copilot_core::CompletionError;
use copilot_core::Config;
use copilot_core::ConfigToml;
use copilot_core::PanelController;
use copilot_core::PanelEvent;
use copilot_core::PanelEventSender;
use copilot_core::RemoteCompletionClient;
use copilot_core::config::load_config;
use copilot_core::host::HostShell;
use copilot_core::host::InMemoryDocument;
use copilot_core::host::LayoutMetrics;
use copilot_core::host::ResizeRequest;
use copilot_core::protocol::ConversationTurn;
use copilot_core::protocol::Role;
use tokio::sync::mpsc::unbounded_channel;
use tracing::debug;
use tracing::info;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "keyboard-copilot")]
#[command(about = "Run keyboard copilot actions from the command line")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to ~/.keyboard-copilot/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Answer with an offline echo backend instead of the remote service
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one action over TEXT and insert its result
    Act {
        /// compose, polish, shorten, explain, fact-check, google or ask
        #[arg(value_parser = parse_kind)]
        kind: ActionKind,

        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

fn parse_kind(name: &str) -> Result<ActionKind, String> {
    ActionKind::parse(name).ok_or_else(|| format!("unknown action `{name}`"))
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".keyboard-copilot").join("config.toml"))
}

fn resolve_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => load_config(path)?,
        None => match default_config_path() {
            Some(path) => load_config(&path)?,
            None => Config::load_from_base_config(ConfigToml::default())?,
        },
    };
    Ok(config)
}

pub async fn run(cli: Cli, out: &mut impl Write) -> anyhow::Result<()> {
    let config = resolve_config(cli.config.as_deref())?;
    let backend: Arc<dyn CompletionBackend> = if cli.dry_run {
        Arc::new(EchoBackend)
    } else {
        Arc::new(RemoteCompletionClient::new(config.clone())?)
    };

    match cli.command {
        Command::Act { kind, text } => {
            run_action(config, backend, kind, &text.join(" "), out).await?;
        }
    }
    Ok(())
}

/// Drives one action to completion and commits it. Returns the final host
/// text.
pub async fn run_action(
    config: Config,
    backend: Arc<dyn CompletionBackend>,
    kind: ActionKind,
    text: &str,
    out: &mut impl Write,
) -> anyhow::Result<String> {
    let (tx, mut events) = unbounded_channel();
    let sender = PanelEventSender::new(tx);
    let document = Rc::new(RefCell::new(InMemoryDocument::new(text)));
    let shell = Rc::new(RefCell::new(HeadlessShell::new(sender.clone())));
    let mut controller = PanelController::new(
        config,
        backend,
        sender,
        Box::new(Rc::clone(&document)),
        Box::new(Rc::clone(&shell)),
    );

    controller.invoke_kind(kind);
    if controller.state().is_hidden() {
        anyhow::bail!("nothing to act on");
    }
    while controller.state().is_busy {
        let event = events
            .recv()
            .await
            .context("panel event channel closed")?;
        controller.handle_event(event);
    }

    let state = controller.state();
    if let Some(error) = &state.last_error {
        let message = error.user_message().unwrap_or_default();
        anyhow::bail!("{} failed ({error:?}): {message}", kind.title());
    }
    let shown = if state.is_chat() {
        last_assistant_text(&state.transcript)
    } else if let Some(url) = &state.web_url {
        Some(url.to_string())
    } else {
        state.result_text.clone()
    };
    writeln!(out, "{}:\n{}", kind.title(), shown.unwrap_or_default())?;

    controller.commit();
    for url in &shell.borrow().opened {
        writeln!(out, "\nopened {url}")?;
    }
    let final_text = document.borrow().text().to_string();
    writeln!(out, "\nhost text:\n{final_text}")?;
    Ok(final_text)
}

fn last_assistant_text(transcript: &[ConversationTurn]) -> Option<String> {
    transcript
        .iter()
        .rev()
        .find(|turn| turn.role == Role::Assistant)
        .map(|turn| turn.text.clone())
}

/// Offline backend: answers with the input it was given.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoBackend;

#[async_trait]
impl CompletionBackend for EchoBackend {
    async fn complete_single(
        &self,
        kind: ActionKind,
        source_text: &str,
    ) -> Result<String, CompletionError> {
        Ok(format!("[{}] {source_text}", kind.title()))
    }

    async fn complete_chat(
        &self,
        transcript: &[ConversationTurn],
    ) -> Result<String, CompletionError> {
        let question = transcript
            .iter()
            .rev()
            .find(|turn| turn.role == Role::User)
            .map(|turn| turn.text.as_str())
            .unwrap_or_default();
        Ok(format!("echo: {question}"))
    }
}

const SCREEN_HEIGHT_PX: f64 = 844.0;
const KEYBOARD_HEIGHT_PX: f64 = 260.0;
const MAX_TOTAL_HEIGHT_PX: f64 = 700.0;

/// A shell with nothing on screen. Web content "loads" as soon as it is
/// presented; opened locators are collected for the caller to report.
pub struct HeadlessShell {
    events: PanelEventSender,
    presented: Option<Url>,
    pub opened: Vec<Url>,
}

impl HeadlessShell {
    pub fn new(events: PanelEventSender) -> Self {
        Self {
            events,
            presented: None,
            opened: Vec::new(),
        }
    }

    fn finish_loading(&self) {
        if let Some(url) = &self.presented {
            self.events.send(PanelEvent::WebContentFinished {
                url: url.clone(),
                result: Ok(()),
            });
        }
    }
}

impl HostShell for HeadlessShell {
    fn metrics(&self) -> LayoutMetrics {
        LayoutMetrics {
            screen_height_px: SCREEN_HEIGHT_PX,
            keyboard_height_px: KEYBOARD_HEIGHT_PX,
            max_total_height_px: MAX_TOTAL_HEIGHT_PX,
        }
    }

    fn request_resize(&mut self, request: ResizeRequest) {
        debug!(
            generation = request.generation,
            height = request.total_height_px,
            "resize"
        );
    }

    fn set_key_input_visible(&mut self, visible: bool) {
        debug!(visible, "key input visibility");
    }

    fn present_web_content(&mut self, url: &Url) {
        info!(%url, "presenting web content");
        self.presented = Some(url.clone());
        self.finish_loading();
    }

    fn reload_web_content(&mut self) {
        self.finish_loading();
    }

    fn release_web_content(&mut self) {
        self.presented = None;
    }

    fn open_url(&mut self, url: &Url) {
        self.opened.push(url.clone());
    }
}

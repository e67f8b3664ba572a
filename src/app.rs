// ABOUTME: App orchestrator: owns the session, page selection, and incorporator.
// ABOUTME: Runs a line-oriented REPL that dispatches commands and streams replies to stdout.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use crossterm::style::Stylize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{
    ExchangeParams, StreamEvent, StreamOutcome, StreamingIncorporator, Transport, run_exchange,
};
use crate::commands::{Command, HELP, parse_command};
use crate::config::Config;
use crate::context::{ContextSet, assemble_with_report};
use crate::error::StreamError;
use crate::session::persistence::{default_conversation_path, load_conversation, save_conversation};
use crate::session::{Role, Session, Turn};

/// Whether the REPL keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Top-level application state. Every operation goes through this value;
/// there is no global session.
pub struct App {
    config: Config,
    contexts: ContextSet,
    session: Session,
    incorporator: StreamingIncorporator,
    transport: Arc<dyn Transport>,
    restored: Option<String>,
    config_path: PathBuf,
}

impl App {
    /// Create an app over an already loaded page selection.
    pub fn new(config: Config, contexts: ContextSet, transport: Arc<dyn Transport>) -> Self {
        let session = Session::new(Turn::system(config.system_prompt.clone()));
        let mut app = Self {
            config,
            contexts,
            session,
            incorporator: StreamingIncorporator::new(),
            transport,
            restored: None,
            config_path: Config::config_path(),
        };
        app.refresh_context();
        app
    }

    /// Where `/set` saves the configuration.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    /// Load the page selection named by `pages` (or the configured default).
    /// A missing or malformed pages file starts with an empty selection.
    pub fn load_initial_pages(config: &Config, pages: Option<&Path>) -> ContextSet {
        let Some(path) = pages.or(config.default_pages.as_deref()) else {
            return ContextSet::default();
        };
        match ContextSet::load(path) {
            Ok(set) => set,
            Err(e) => {
                warn!(error = %e, "starting without pages");
                ContextSet::default()
            }
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn contexts(&self) -> &ContextSet {
        &self.contexts
    }

    pub fn incorporator(&self) -> &StreamingIncorporator {
        &self.incorporator
    }

    /// Text removed by the last undo, waiting to be retried.
    pub fn restored(&self) -> Option<&str> {
        self.restored.as_deref()
    }

    /// Re-derive the system turn from the selected pages, keeping history.
    /// Returns the paths of pages that could not be read.
    pub fn refresh_context(&mut self) -> Vec<PathBuf> {
        let root = self
            .contexts
            .root_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let report = assemble_with_report(&self.contexts, &root, &self.config.system_prompt);
        self.session.replace_system_turn(Turn::system(report.text));
        report.skipped
    }

    /// Append the user turn and stream the reply into the session.
    pub async fn send(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<StreamOutcome, StreamError> {
        if !self.incorporator.is_idle() {
            return Err(StreamError::AlreadyStreaming);
        }
        self.session.append(Turn::user(text));
        let params = ExchangeParams {
            max_tokens: self.config.response_limit,
            model: self.config.model_name(),
            stream: self.config.stream,
        };
        run_exchange(
            &mut self.session,
            &mut self.incorporator,
            self.transport.as_ref(),
            &params,
            cancel,
        )
        .await
    }

    /// Toggle pages and rebuild the system turn. Returns the selectors that
    /// matched no page.
    pub fn select_pages(&mut self, selectors: &[String]) -> Vec<String> {
        let mut unknown = Vec::new();
        for selector in selectors {
            match self.contexts.toggle(selector) {
                Some((key, selected)) => debug!(key = %key, selected, "page toggled"),
                None => unknown.push(selector.clone()),
            }
        }
        self.refresh_context();
        unknown
    }

    /// Remove the last exchange and remember its text for `/retry`.
    pub fn undo(&mut self) -> anyhow::Result<String> {
        let text = self.session.undo_last_exchange()?;
        self.restored = Some(text.clone());
        Ok(text)
    }

    /// Start a fresh conversation over the current page selection.
    pub fn new_session(&mut self) {
        self.incorporator.cancel(&mut self.session);
        let system = self.session.system_turn().clone();
        self.session.reset(system);
        self.restored = None;
    }

    /// Save the conversation and return where it went.
    pub fn save(&self, path: Option<PathBuf>) -> anyhow::Result<PathBuf> {
        let path = path.unwrap_or_else(|| default_conversation_path(&Config::conversations_dir()));
        save_conversation(&path, &self.session)
            .with_context(|| format!("saving conversation to {}", path.display()))?;
        Ok(path)
    }

    /// Replace the conversation with one loaded from `path`.
    pub fn load(&mut self, path: &Path) -> anyhow::Result<usize> {
        let turns = load_conversation(path)
            .with_context(|| format!("loading conversation from {}", path.display()))?;
        self.incorporator.cancel(&mut self.session);
        let count = turns.len();
        self.session.load(turns)?;
        self.restored = None;
        Ok(count)
    }

    /// Change one setting and save the config file. The edit goes to the
    /// file's contents, not the running config, so environment and
    /// command-line overrides stay out of it. An invalid value changes nothing.
    pub fn set_option(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = &self.config_path;
        let mut on_disk = Config::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?;
        on_disk.set(key, value)?;
        on_disk.validate()?;

        let mut running = self.config.clone();
        running.set(key, value)?;
        running.validate()?;

        on_disk
            .save_to(path)
            .with_context(|| format!("saving config to {}", path.display()))?;
        info!(key, path = %path.display(), "setting saved");

        let prompt_changed = running.system_prompt != self.config.system_prompt;
        self.config = running;
        if prompt_changed {
            self.refresh_context();
        }
        Ok(())
    }

    pub fn save_pages(&self, path: &Path) -> anyhow::Result<()> {
        self.contexts
            .save(path)
            .with_context(|| format!("saving pages to {}", path.display()))
    }

    /// Replace the page selection and rebuild the system turn.
    pub fn load_pages(&mut self, path: &Path) -> anyhow::Result<Vec<PathBuf>> {
        self.contexts = ContextSet::load(path)
            .with_context(|| format!("loading pages from {}", path.display()))?;
        Ok(self.refresh_context())
    }

    /// Run one command, printing its result.
    pub async fn dispatch(
        &mut self,
        command: Command,
        display: &mut Display,
    ) -> anyhow::Result<Flow> {
        match command {
            Command::Send(text) => {
                print_turn(&Turn::user(text.as_str()));
                self.stream_reply(&text, display).await?;
            }
            Command::Retry => match self.restored.take() {
                Some(text) => {
                    print_turn(&Turn::user(text.as_str()));
                    self.stream_reply(&text, display).await?;
                }
                None => notice("nothing to retry"),
            },
            Command::SelectPages(selectors) => {
                for selector in self.select_pages(&selectors) {
                    notice(&format!("no page matches '{}'", selector));
                }
                self.print_header();
            }
            Command::Pages => self.print_pages(),
            Command::Save(path) => {
                let path = self.save(path)?;
                notice(&format!("saved conversation to {}", path.display()));
            }
            Command::Load(path) => {
                let count = self.load(&path)?;
                for turn in self.session.history() {
                    print_turn(turn);
                }
                notice(&format!("loaded {} messages from {}", count, path.display()));
            }
            Command::SavePages(path) => {
                self.save_pages(&path)?;
                notice(&format!("saved pages to {}", path.display()));
            }
            Command::LoadPages(path) => {
                for skipped in self.load_pages(&path)? {
                    notice(&format!("could not read {}", skipped.display()));
                }
                self.print_header();
            }
            Command::Undo => {
                let text = self.undo()?;
                notice(&format!("removed last exchange; /retry resends: {}", text));
            }
            Command::NewSession => {
                self.new_session();
                notice("new conversation");
            }
            Command::Set { key, value } => {
                self.set_option(&key, &value)?;
                notice(&format!("{} saved", key));
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => return Ok(Flow::Quit),
            Command::Usage(usage) => notice(&format!("usage: {}", usage)),
            Command::Unknown(name) => {
                notice(&format!("unknown command {}; try /help", name));
            }
        }
        Ok(Flow::Continue)
    }

    /// Stream a reply, cancelling on Ctrl-C, and wait for the display to catch up.
    async fn stream_reply(&mut self, text: &str, display: &mut Display) -> anyhow::Result<()> {
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        let watcher = tokio::spawn({
            let cancel = cancel.clone();
            let finished = finished.clone();
            async move {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if result.is_ok() {
                            cancel.cancel();
                        }
                    }
                    _ = finished.cancelled() => {}
                }
            }
        });

        print!("{} ", format!("{}:", Role::Assistant.label()).blue().bold());
        let _ = std::io::stdout().flush();

        let outcome = self.send(text, &cancel).await;
        finished.cancel();
        let _ = watcher.await;

        let outcome = outcome?;
        display.wait_finished().await;
        debug!(?outcome, "reply finished");
        Ok(())
    }

    fn print_header(&self) {
        println!("{}", self.contexts.summary().bold());
    }

    fn print_pages(&self) {
        if self.contexts.is_empty() {
            notice("no pages loaded; use /loadpages <file>");
            return;
        }
        for (key, entry) in &self.contexts.pages {
            let mark = if entry.selected { "*" } else { " " };
            println!("{} {:<12} {}", mark, key, entry.relative_path);
        }
        self.print_header();
    }

    /// Run the REPL until /quit, end of input, or Ctrl-C at the prompt.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.incorporator = StreamingIncorporator::new().with_display(tx);
        let mut display = Display::spawn(rx);

        self.print_header();
        notice("type /help for commands");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line.context("reading input")?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else { break };
            let Some(command) = parse_command(&line) else {
                continue;
            };
            match self.dispatch(command, &mut display).await {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(e) => notice(&format!("error: {:#}", e)),
            }
        }

        info!(messages = self.session.history().len(), "session ended");
        Ok(())
    }
}

/// Prints streamed fragments on its own task.
pub struct Display {
    finished_rx: mpsc::UnboundedReceiver<()>,
}

impl Display {
    /// Start printing events from the incorporator.
    pub fn spawn(mut events: mpsc::UnboundedReceiver<StreamEvent>) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    StreamEvent::Fragment(text) => {
                        let mut stdout = std::io::stdout().lock();
                        let _ = write!(stdout, "{}", text);
                        let _ = stdout.flush();
                    }
                    StreamEvent::Finished(outcome) => {
                        match outcome {
                            StreamOutcome::Completed => println!(),
                            StreamOutcome::Failed(message) => {
                                println!();
                                println!("{}", message.red());
                            }
                            StreamOutcome::Cancelled => {
                                println!();
                                println!("{}", "(stopped)".dark_grey());
                            }
                        }
                        let _ = finished_tx.send(());
                    }
                }
            }
        });
        Self { finished_rx }
    }

    /// Wait until the display has printed the end of the current reply.
    pub async fn wait_finished(&mut self) {
        let _ = self.finished_rx.recv().await;
    }
}

fn print_turn(turn: &Turn) {
    let label = format!("{}:", turn.role.label());
    let label = match turn.role {
        Role::User => label.red().bold(),
        Role::Assistant => label.blue().bold(),
        Role::System => label.dark_grey().bold(),
    };
    println!("{} {}", label, turn.content);
}

fn notice(text: &str) {
    println!("{}", text.dark_grey());
}

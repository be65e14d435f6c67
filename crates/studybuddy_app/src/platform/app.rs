use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context};
use studybuddy_core::{update, AppState, DocumentId, Msg, TaskOutcome};
use studybuddy_engine::{EngineEvent, EngineHandle};
use studybuddy_logging::sb_info;

use super::config;
use super::effects::EffectRunner;
use super::logging;
use super::render::{write_documents, Renderer};
use crate::cli::{Cli, Command};

/// How long one wait for an engine event may block before the loop ticks.
const TICK: Duration = Duration::from_millis(75);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(35);

pub fn run_app(cli: Cli) -> anyhow::Result<()> {
    logging::initialize(cli.log);
    sb_info!("studybuddy v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load(cli.config.as_deref())?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(n_results) = cli.n_results {
        config.n_results = n_results;
    }
    let n_results = config.n_results;
    let engine = EngineHandle::new(config.into_engine_config()?)
        .context("cannot start the backend client")?;

    let mut session = Session::new(
        EffectRunner::new(engine),
        AppState::new().with_n_results(n_results),
    );
    match cli.command {
        Command::Health => session.health(),
        Command::Upload { file, timeout } => {
            session.upload(file, timeout.map(Duration::from_secs))
        }
        Command::Ask { document, query } => session.ask(document, query),
        Command::Chat { document } => session.chat(document),
        Command::Documents => session.documents(),
        Command::Delete { document_id } => session.delete(document_id),
    }
}

struct Session {
    state: AppState,
    runner: EffectRunner,
    renderer: Renderer,
}

impl Session {
    fn new(runner: EffectRunner, state: AppState) -> Self {
        Self {
            state,
            runner,
            renderer: Renderer::new(),
        }
    }

    fn dispatch(&mut self, msg: Msg) -> anyhow::Result<()> {
        let state = std::mem::take(&mut self.state);
        let (mut state, effects) = update(state, msg);
        self.runner.enqueue(effects);
        let was_dirty = state.consume_dirty();
        let view = state.view();
        self.state = state;
        if was_dirty {
            self.renderer.render(&view, &mut io::stdout().lock())?;
        }
        Ok(())
    }

    /// Feeds engine events through `update` until `done` accepts one.
    fn pump_until(&mut self, mut done: impl FnMut(&Msg, &AppState) -> bool) -> anyhow::Result<()> {
        loop {
            let msg = self.runner.next_msg(TICK)?;
            let observed = msg.clone();
            self.dispatch(msg)?;
            if done(&observed, &self.state) {
                return Ok(());
            }
        }
    }

    fn notice(&self) -> String {
        self.state
            .view()
            .notice
            .unwrap_or_else(|| "request was not sent".to_string())
    }

    fn health(&mut self) -> anyhow::Result<()> {
        self.runner.check_health();
        let deadline = Instant::now() + HEALTH_TIMEOUT;
        while Instant::now() < deadline {
            match self.runner.next_event(TICK)? {
                Some(EngineEvent::HealthChecked(health)) => {
                    println!("{} {} ({})", health.message, health.version, health.status);
                    return Ok(());
                }
                Some(EngineEvent::RequestFailed { error }) => {
                    bail!("backend unreachable: {error}")
                }
                _ => {}
            }
        }
        bail!("backend did not answer the health check")
    }

    fn upload(&mut self, file: PathBuf, timeout: Option<Duration>) -> anyhow::Result<()> {
        self.dispatch(Msg::UploadRequested { path: file })?;
        if !self.state.is_busy() {
            bail!(self.notice());
        }
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let expired = || deadline.is_some_and(|deadline| Instant::now() >= deadline);
        self.pump_until(|_, state| !state.is_busy() || expired())?;
        if self.state.is_busy() {
            self.dispatch(Msg::CancelTask)?;
            bail!("processing did not finish in time");
        }
        match self.state.view().task_outcome {
            Some(TaskOutcome::Failed { message, .. }) => Err(anyhow!(message)),
            _ => Ok(()),
        }
    }

    fn ask(&mut self, document: Option<DocumentId>, query: String) -> anyhow::Result<()> {
        self.dispatch(Msg::SelectDocument(document))?;
        self.dispatch(Msg::SendMessage(query))?;
        if self.state.in_flight_turn().is_none() {
            bail!(self.notice());
        }
        self.pump_until(|_, state| state.in_flight_turn().is_none())?;
        let failed = self
            .state
            .transcript()
            .messages()
            .last()
            .is_some_and(|message| message.is_error);
        if failed {
            bail!("the assistant could not answer");
        }
        Ok(())
    }

    fn chat(&mut self, document: Option<DocumentId>) -> anyhow::Result<()> {
        self.dispatch(Msg::SelectDocument(document))?;
        println!("Ask about your documents. /help lists commands, Ctrl-D quits.");
        prompt()?;
        let input = spawn_input_reader();

        loop {
            while let Ok(line) = input.try_recv() {
                match line {
                    ChatInput::Quit => return Ok(()),
                    ChatInput::Help => {
                        println!("{HELP}");
                        prompt()?;
                    }
                    ChatInput::Clear => {
                        self.dispatch(Msg::ClearConversation)?;
                        println!("Conversation cleared.");
                        prompt()?;
                    }
                    ChatInput::Select(document) => {
                        let label = document.clone().unwrap_or_else(|| "all documents".to_string());
                        self.dispatch(Msg::SelectDocument(document))?;
                        println!("Searching {label}.");
                        prompt()?;
                    }
                    ChatInput::Upload(path) => {
                        self.dispatch(Msg::UploadRequested { path })?;
                        prompt()?;
                    }
                    ChatInput::Cancel => {
                        if self.state.active_task().is_none() {
                            println!("No document is being processed.");
                        } else {
                            self.dispatch(Msg::CancelTask)?;
                        }
                        prompt()?;
                    }
                    ChatInput::Send(text) => {
                        let was_idle = self.state.in_flight_turn().is_none();
                        self.dispatch(Msg::SendMessage(text))?;
                        if was_idle && self.state.in_flight_turn().is_none() {
                            prompt()?;
                        }
                    }
                }
            }

            let was_streaming = self.state.in_flight_turn().is_some();
            let msg = self.runner.next_msg(TICK)?;
            self.dispatch(msg)?;
            if was_streaming && self.state.in_flight_turn().is_none() {
                prompt()?;
            }
        }
    }

    fn documents(&mut self) -> anyhow::Result<()> {
        self.dispatch(Msg::RefreshDocuments)?;
        let mut failed = false;
        self.pump_until(|msg, _| match msg {
            Msg::DocumentsLoaded(_) => true,
            Msg::RequestFailed { .. } => {
                failed = true;
                true
            }
            _ => false,
        })?;
        if failed {
            bail!(self.notice());
        }
        let view = self.state.view();
        write_documents(
            &view.documents,
            view.selected_document.as_deref(),
            &mut io::stdout().lock(),
        )?;
        Ok(())
    }

    fn delete(&mut self, document_id: DocumentId) -> anyhow::Result<()> {
        self.dispatch(Msg::DeleteDocument {
            document_id: document_id.clone(),
        })?;
        let mut failed = false;
        self.pump_until(|msg, _| match msg {
            Msg::DocumentDeleted { .. } => true,
            Msg::RequestFailed { .. } => {
                failed = true;
                true
            }
            _ => false,
        })?;
        if failed {
            bail!(self.notice());
        }
        println!("Deleted {document_id}");
        Ok(())
    }
}

const HELP: &str = "\
/doc ID       only search document ID
/all          search all documents
/upload PATH  upload a PDF while chatting
/cancel       stop following the current upload
/clear        start a new conversation
/quit         leave (Ctrl-D works too)";

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChatInput {
    Send(String),
    Select(Option<DocumentId>),
    Upload(PathBuf),
    Cancel,
    Clear,
    Help,
    Quit,
}

fn parse_chat_line(line: &str) -> ChatInput {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return ChatInput::Send(line.to_string());
    };
    if let Some(path) = command.strip_prefix("upload ") {
        let path = path.trim();
        if !path.is_empty() {
            return ChatInput::Upload(PathBuf::from(path));
        }
    }
    let mut words = command.split_whitespace();
    match (words.next(), words.next()) {
        (Some("quit" | "exit"), _) => ChatInput::Quit,
        (Some("cancel"), _) => ChatInput::Cancel,
        (Some("clear"), _) => ChatInput::Clear,
        (Some("all"), _) | (Some("doc"), None) => ChatInput::Select(None),
        (Some("doc"), Some(id)) => ChatInput::Select(Some(id.to_string())),
        _ => ChatInput::Help,
    }
}

/// Reads stdin on its own thread; end of input becomes `Quit`.
fn spawn_input_reader() -> mpsc::Receiver<ChatInput> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let input = parse_chat_line(&line);
            let quit = input == ChatInput::Quit;
            if tx.send(input).is_err() || quit {
                return;
            }
        }
        let _ = tx.send(ChatInput::Quit);
    });
    rx
}

fn prompt() -> io::Result<()> {
    let mut out = io::stdout().lock();
    write!(out, "> ")?;
    out.flush()
}

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use studybuddy_core::{ChatRequest, DocumentId, ProcessingTask, TaskId, TurnId};
use studybuddy_logging::{sb_error, sb_info};
use tokio::sync::mpsc as async_mpsc;
use tokio_util::sync::CancellationToken;

use crate::poller::{ChannelEventSink, EventSink, PollSettings, TaskPoller};
use crate::{
    ChatStream, ClientError, ClientSettings, EngineEvent, EngineStopped, FailureKind,
    ReqwestTransport, Transport,
};

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub client: ClientSettings,
    pub poll: PollSettings,
}

enum EngineCommand {
    Upload { path: PathBuf },
    Poll { task_id: TaskId },
    AbandonTask { task_id: TaskId },
    Chat { turn: TurnId, request: ChatRequest },
    AbandonTurn { turn: TurnId },
    ListDocuments,
    DeleteDocument { document_id: DocumentId },
    CheckHealth,
}

/// Background jobs that can be abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum JobKey {
    Task(TaskId),
    Turn(TurnId),
}

struct Job {
    generation: u64,
    token: CancellationToken,
}

/// Cancellation handles of running polls and chat streams.
#[derive(Default)]
struct Jobs {
    running: HashMap<JobKey, Job>,
    next_generation: u64,
}

impl Jobs {
    /// Registers a job, cancelling any older job under the same key.
    fn register(&mut self, key: JobKey) -> (u64, CancellationToken) {
        self.next_generation += 1;
        let token = CancellationToken::new();
        let job = Job {
            generation: self.next_generation,
            token: token.clone(),
        };
        if let Some(previous) = self.running.insert(key, job) {
            previous.token.cancel();
        }
        (self.next_generation, token)
    }

    fn abandon(&mut self, key: &JobKey) {
        if let Some(job) = self.running.remove(key) {
            sb_info!("Abandoning {:?}", key);
            job.token.cancel();
        }
    }

    /// Forgets a job that ended on its own, unless a newer one replaced it.
    fn finished(&mut self, key: JobKey, generation: u64) {
        if self
            .running
            .get(&key)
            .is_some_and(|job| job.generation == generation)
        {
            self.running.remove(&key);
        }
    }

    fn cancel_all(&mut self) {
        for (_, job) in self.running.drain() {
            job.token.cancel();
        }
    }
}

type Finished = async_mpsc::UnboundedSender<(JobKey, u64)>;

/// Runs backend work on a dedicated thread with a single-threaded tokio
/// runtime and reports [`EngineEvent`]s back over a channel.
pub struct EngineHandle {
    cmd_tx: async_mpsc::UnboundedSender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
}

impl EngineHandle {
    pub fn new(config: EngineConfig) -> Result<Self, ClientError> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(config.client)?);
        Self::with_transport(transport, config.poll)
    }

    pub fn with_transport(
        transport: Arc<dyn Transport>,
        poll: PollSettings,
    ) -> Result<Self, ClientError> {
        let (cmd_tx, cmd_rx) = async_mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| ClientError::new(FailureKind::Io, err.to_string()))?;

        thread::Builder::new()
            .name("studybuddy-engine".to_string())
            .spawn(move || runtime.block_on(run(transport, poll, cmd_rx, event_tx)))
            .map_err(|err| ClientError::new(FailureKind::Io, err.to_string()))?;

        Ok(Self { cmd_tx, event_rx })
    }

    pub fn upload(&self, path: impl Into<PathBuf>) {
        self.send(EngineCommand::Upload { path: path.into() });
    }

    pub fn poll(&self, task_id: impl Into<TaskId>) {
        self.send(EngineCommand::Poll {
            task_id: task_id.into(),
        });
    }

    pub fn abandon_task(&self, task_id: impl Into<TaskId>) {
        self.send(EngineCommand::AbandonTask {
            task_id: task_id.into(),
        });
    }

    pub fn chat(&self, turn: TurnId, request: ChatRequest) {
        self.send(EngineCommand::Chat { turn, request });
    }

    pub fn abandon_turn(&self, turn: TurnId) {
        self.send(EngineCommand::AbandonTurn { turn });
    }

    pub fn list_documents(&self) {
        self.send(EngineCommand::ListDocuments);
    }

    pub fn delete_document(&self, document_id: impl Into<DocumentId>) {
        self.send(EngineCommand::DeleteDocument {
            document_id: document_id.into(),
        });
    }

    pub fn check_health(&self) {
        self.send(EngineCommand::CheckHealth);
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Waits up to `timeout` for the next event. `Ok(None)` means nothing
    /// arrived in time.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<EngineEvent>, EngineStopped> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(EngineStopped),
        }
    }

    fn send(&self, command: EngineCommand) {
        if self.cmd_tx.send(command).is_err() {
            sb_error!("Engine thread has stopped; command dropped");
        }
    }
}

async fn run(
    transport: Arc<dyn Transport>,
    poll: PollSettings,
    mut cmd_rx: async_mpsc::UnboundedReceiver<EngineCommand>,
    event_tx: mpsc::Sender<EngineEvent>,
) {
    let mut jobs = Jobs::default();
    let (finished_tx, mut finished_rx) = async_mpsc::unbounded_channel();

    loop {
        tokio::select! {
            command = cmd_rx.recv() => {
                let Some(command) = command else { break };
                handle_command(command, &transport, &poll, &event_tx, &mut jobs, &finished_tx);
            }
            Some((key, generation)) = finished_rx.recv() => jobs.finished(key, generation),
        }
    }

    jobs.cancel_all();
    sb_info!("Engine stopped");
}

fn handle_command(
    command: EngineCommand,
    transport: &Arc<dyn Transport>,
    poll: &PollSettings,
    event_tx: &mpsc::Sender<EngineEvent>,
    jobs: &mut Jobs,
    finished_tx: &Finished,
) {
    let transport = transport.clone();
    let sink = ChannelEventSink::new(event_tx.clone());
    match command {
        EngineCommand::Upload { path } => {
            tokio::spawn(async move {
                match transport.upload(&path).await {
                    Ok(receipt) => sink.emit(EngineEvent::Uploaded(ProcessingTask {
                        task_id: receipt.task_id,
                        document_id: receipt.document_id,
                        filename: receipt.filename,
                        source_file: path,
                    })),
                    Err(error) => sink.emit(EngineEvent::UploadFailed { error }),
                }
            });
        }
        EngineCommand::Poll { task_id } => {
            let key = JobKey::Task(task_id.clone());
            let (generation, token) = jobs.register(key.clone());
            let finished_tx = finished_tx.clone();
            let poll = poll.clone();
            tokio::spawn(async move {
                let poller = TaskPoller::new(transport.as_ref(), poll);
                let outcome = poller.run(&task_id, &sink, &token).await;
                sb_info!(
                    "Task {} tracking ended: {:?} after {} fetches",
                    task_id,
                    outcome.terminal,
                    outcome.fetches
                );
                let _ = finished_tx.send((key, generation));
            });
        }
        EngineCommand::Chat { turn, request } => {
            let key = JobKey::Turn(turn);
            let (generation, token) = jobs.register(key.clone());
            let finished_tx = finished_tx.clone();
            tokio::spawn(async move {
                run_chat(transport.as_ref(), turn, &request, &sink, &token).await;
                let _ = finished_tx.send((key, generation));
            });
        }
        EngineCommand::AbandonTask { task_id } => jobs.abandon(&JobKey::Task(task_id)),
        EngineCommand::AbandonTurn { turn } => jobs.abandon(&JobKey::Turn(turn)),
        EngineCommand::ListDocuments => {
            tokio::spawn(async move {
                match transport.list_documents().await {
                    Ok(listing) => sink.emit(EngineEvent::DocumentsListed(
                        listing.documents.into_iter().map(Into::into).collect(),
                    )),
                    Err(error) => sink.emit(EngineEvent::RequestFailed { error }),
                }
            });
        }
        EngineCommand::DeleteDocument { document_id } => {
            tokio::spawn(async move {
                match transport.delete_document(&document_id).await {
                    Ok(()) => sink.emit(EngineEvent::DocumentDeleted { document_id }),
                    Err(error) => sink.emit(EngineEvent::RequestFailed { error }),
                }
            });
        }
        EngineCommand::CheckHealth => {
            tokio::spawn(async move {
                match transport.health().await {
                    Ok(health) => sink.emit(EngineEvent::HealthChecked(health)),
                    Err(error) => sink.emit(EngineEvent::RequestFailed { error }),
                }
            });
        }
    }
}

/// Streams one chat turn. Nothing is emitted once the turn is abandoned.
async fn run_chat(
    transport: &dyn Transport,
    turn: TurnId,
    request: &ChatRequest,
    sink: &dyn EventSink,
    cancel: &CancellationToken,
) {
    let opened = tokio::select! {
        _ = cancel.cancelled() => return,
        opened = transport.open_chat(request) => opened,
    };
    let mut stream = match opened {
        Ok(body) => ChatStream::new(body),
        Err(error) => ChatStream::failed(error),
    };

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return,
            next = stream.next_event() => next,
        };
        match next {
            Some(event) => sink.emit(EngineEvent::Chat { turn, event }),
            None => break,
        }
    }
    sink.emit(EngineEvent::ChatClosed { turn });
}

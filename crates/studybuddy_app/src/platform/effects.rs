use std::time::Duration;

use studybuddy_core::{Effect, Msg};
use studybuddy_engine::{EngineEvent, EngineHandle, EngineStopped};
use studybuddy_logging::{sb_info, sb_warn};

/// Executes core effects on the engine and feeds its events back as messages.
pub struct EffectRunner {
    engine: EngineHandle,
}

impl EffectRunner {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }

    pub fn enqueue(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::UploadFile { path } => {
                    sb_info!("UploadFile path={}", path.display());
                    self.engine.upload(path);
                }
                Effect::PollTask { task_id } => self.engine.poll(task_id),
                Effect::AbandonTask { task_id } => self.engine.abandon_task(task_id),
                Effect::OpenChat { turn, request } => {
                    sb_info!(
                        "OpenChat turn={} query_len={} history={} document={:?}",
                        turn,
                        request.query.len(),
                        request.conversation_history.len(),
                        request.document_id
                    );
                    self.engine.chat(turn, request);
                }
                Effect::AbandonTurn { turn } => self.engine.abandon_turn(turn),
                Effect::ListDocuments => self.engine.list_documents(),
                Effect::DeleteDocument { document_id } => self.engine.delete_document(document_id),
            }
        }
    }

    pub fn check_health(&self) {
        self.engine.check_health();
    }

    pub fn next_event(&self, timeout: Duration) -> Result<Option<EngineEvent>, EngineStopped> {
        self.engine.recv_timeout(timeout)
    }

    /// Next engine event as a message; `Tick` when none arrived in time.
    pub fn next_msg(&self, timeout: Duration) -> Result<Msg, EngineStopped> {
        Ok(self.next_event(timeout)?.map_or(Msg::Tick, to_msg))
    }
}

pub fn to_msg(event: EngineEvent) -> Msg {
    match event {
        EngineEvent::Uploaded(task) => Msg::UploadAccepted(task),
        EngineEvent::UploadFailed { error } => {
            sb_warn!("Upload failed: {}", error);
            Msg::UploadRejected {
                message: error.to_string(),
            }
        }
        EngineEvent::TaskProgress { task_id, snapshot } => Msg::TaskProgress { task_id, snapshot },
        EngineEvent::TaskCompleted { task_id, result } => Msg::TaskCompleted { task_id, result },
        EngineEvent::TaskFailed { task_id, message } => Msg::TaskFailed { task_id, message },
        EngineEvent::Chat { turn, event } => Msg::ChatEvent { turn, event },
        EngineEvent::ChatClosed { turn } => Msg::ChatClosed { turn },
        EngineEvent::DocumentsListed(documents) => Msg::DocumentsLoaded(documents),
        EngineEvent::DocumentDeleted { document_id } => Msg::DocumentDeleted { document_id },
        EngineEvent::RequestFailed { error } => {
            sb_warn!("Request failed: {}", error);
            Msg::RequestFailed {
                message: error.to_string(),
            }
        }
        EngineEvent::HealthChecked(_) => Msg::NoOp,
    }
}

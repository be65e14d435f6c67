use std::path::PathBuf;

use serde::Serialize;

use crate::{DocumentId, HistoryEntry, TaskId, TurnId};

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub query: String,
    pub document_id: Option<DocumentId>,
    pub conversation_history: Vec<HistoryEntry>,
    pub n_results: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    UploadFile { path: PathBuf },
    PollTask { task_id: TaskId },
    /// Stop observing a task; the backend keeps processing it.
    AbandonTask { task_id: TaskId },
    OpenChat { turn: TurnId, request: ChatRequest },
    /// Stop reading a turn's stream; late events are dropped.
    AbandonTurn { turn: TurnId },
    ListDocuments,
    DeleteDocument { document_id: DocumentId },
}

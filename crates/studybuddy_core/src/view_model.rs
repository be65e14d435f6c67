use crate::{ChatMessage, Document, DocumentId, TaskOutcome, TaskStatus};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppViewModel {
    pub messages: Vec<ChatMessage>,
    pub chat_busy: bool,
    pub uploading: bool,
    pub progress: Option<ProgressView>,
    pub task_outcome: Option<TaskOutcome>,
    pub documents: Vec<Document>,
    pub selected_document: Option<DocumentId>,
    pub notice: Option<String>,
    pub dirty: bool,
}

/// Progress of the active task. `status` is `None` until the first poll lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressView {
    pub filename: String,
    pub status: Option<TaskStatus>,
    pub progress: u8,
    pub message: String,
    pub current_stage: String,
}

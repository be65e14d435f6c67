use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User picked a PDF to upload.
    UploadRequested { path: PathBuf },
    /// Backend accepted the upload and started a processing task.
    UploadAccepted(crate::ProcessingTask),
    /// Upload request itself failed.
    UploadRejected { message: String },
    /// Poller read a non-terminal or terminal snapshot.
    TaskProgress {
        task_id: crate::TaskId,
        snapshot: crate::ProgressSnapshot,
    },
    /// Poller saw `completed`.
    TaskCompleted {
        task_id: crate::TaskId,
        result: crate::ProcessingResult,
    },
    /// Poller saw `failed`, or a status fetch failed.
    TaskFailed {
        task_id: crate::TaskId,
        message: String,
    },
    /// User abandoned the running task.
    CancelTask,
    /// Restrict chat retrieval to one document, or search all of them.
    SelectDocument(Option<crate::DocumentId>),
    /// User submitted a chat message.
    SendMessage(String),
    /// Decoded event of a chat turn's stream.
    ChatEvent {
        turn: crate::TurnId,
        event: crate::StreamEvent,
    },
    /// The turn's stream ended (server closed it, or it aborted).
    ChatClosed { turn: crate::TurnId },
    /// User cleared the conversation.
    ClearConversation,
    RefreshDocuments,
    DocumentsLoaded(Vec<crate::Document>),
    DeleteDocument { document_id: crate::DocumentId },
    DocumentDeleted { document_id: crate::DocumentId },
    /// A one-shot request (listing, deletion) failed.
    RequestFailed { message: String },
    /// UI/render tick to coalesce rendering.
    Tick,
    /// Fallback for placeholder wiring.
    NoOp,
}

use std::fmt;

use serde::Deserialize;
use studybuddy_core::{
    Document, DocumentId, ProcessingResult, ProcessingTask, ProgressSnapshot, StreamEvent, TaskId,
    TurnId,
};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Uploaded(ProcessingTask),
    UploadFailed {
        error: ClientError,
    },
    TaskProgress {
        task_id: TaskId,
        snapshot: ProgressSnapshot,
    },
    TaskCompleted {
        task_id: TaskId,
        result: ProcessingResult,
    },
    TaskFailed {
        task_id: TaskId,
        message: String,
    },
    Chat {
        turn: TurnId,
        event: StreamEvent,
    },
    ChatClosed {
        turn: TurnId,
    },
    DocumentsListed(Vec<Document>),
    DocumentDeleted {
        document_id: DocumentId,
    },
    RequestFailed {
        error: ClientError,
    },
    HealthChecked(HealthStatus),
}

/// Response of `POST /api/documents/upload`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadReceipt {
    pub task_id: TaskId,
    pub document_id: DocumentId,
    pub filename: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `GET /api/documents`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentListing {
    #[serde(default)]
    pub collection: String,
    #[serde(default)]
    pub total_chunks: u64,
    #[serde(default)]
    pub documents: Vec<DocumentEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentEntry {
    pub document_id: DocumentId,
    pub filename: String,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

impl From<DocumentEntry> for Document {
    fn from(entry: DocumentEntry) -> Self {
        Document {
            document_id: entry.document_id,
            filename: entry.filename,
            num_pages: None,
            num_chunks: None,
            size_bytes: entry.size_bytes,
        }
    }
}

/// Response of the `GET /` health check.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ClientError {
    pub kind: FailureKind,
    pub message: String,
}

impl ClientError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        self.kind.class()
    }
}

/// The engine thread is gone; no further events will arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("engine thread has stopped")]
pub struct EngineStopped;

/// Coarse error taxonomy: who is at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network failure, timeout or non-2xx response.
    Transport,
    /// The backend answered with something we cannot decode.
    Protocol,
    /// The backend reported a failure itself.
    Application,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    UnsupportedFile,
    Io,
    HttpStatus(u16),
    Timeout,
    Network,
    MissingBody,
    MalformedRecord,
    MalformedResponse,
    ServerError,
    TaskFailed,
}

impl FailureKind {
    pub fn class(&self) -> ErrorClass {
        match self {
            FailureKind::InvalidUrl
            | FailureKind::UnsupportedFile
            | FailureKind::Io
            | FailureKind::HttpStatus(_)
            | FailureKind::Timeout
            | FailureKind::Network => ErrorClass::Transport,
            FailureKind::MissingBody
            | FailureKind::MalformedRecord
            | FailureKind::MalformedResponse => ErrorClass::Protocol,
            FailureKind::ServerError | FailureKind::TaskFailed => ErrorClass::Application,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::UnsupportedFile => write!(f, "unsupported file"),
            FailureKind::Io => write!(f, "io error"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::MissingBody => write!(f, "missing response body"),
            FailureKind::MalformedRecord => write!(f, "malformed stream record"),
            FailureKind::MalformedResponse => write!(f, "malformed response"),
            FailureKind::ServerError => write!(f, "server error"),
            FailureKind::TaskFailed => write!(f, "task failed"),
        }
    }
}

use std::collections::BTreeMap;
use std::path::PathBuf;

use studybuddy_logging::{sb_debug, sb_info, sb_warn};

use crate::view_model::{AppViewModel, ProgressView};
use crate::{
    ChatRequest, ProcessingResult, ProgressSnapshot, StreamEvent, Transcript,
};

pub type TaskId = String;
pub type DocumentId = String;
pub type TurnId = u64;

const DEFAULT_N_RESULTS: u32 = 5;

/// An accepted upload whose backend processing is being tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingTask {
    pub task_id: TaskId,
    pub document_id: DocumentId,
    pub filename: String,
    pub source_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub document_id: DocumentId,
    pub filename: String,
    pub num_pages: Option<u32>,
    pub num_chunks: Option<u32>,
    pub size_bytes: Option<u64>,
}

/// How the last processing task ended. Replaces the progress view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed {
        document_id: DocumentId,
        filename: String,
        num_pages: Option<u32>,
        num_chunks: Option<u32>,
    },
    Failed {
        filename: String,
        message: String,
    },
}

/// Session-scoped state: the transcript, the current processing task and
/// the document list. Only [`crate::update`] mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    transcript: Transcript,
    /// Message index of every turn whose stream is still open.
    turns: BTreeMap<TurnId, usize>,
    in_flight: Option<TurnId>,
    next_turn: TurnId,
    uploading: Option<PathBuf>,
    active_task: Option<ProcessingTask>,
    progress: Option<ProgressSnapshot>,
    task_outcome: Option<TaskOutcome>,
    documents: Vec<Document>,
    selected_document: Option<DocumentId>,
    n_results: u32,
    notice: Option<String>,
    dirty: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            transcript: Transcript::new(),
            turns: BTreeMap::new(),
            in_flight: None,
            next_turn: 1,
            uploading: None,
            active_task: None,
            progress: None,
            task_outcome: None,
            documents: Vec::new(),
            selected_document: None,
            n_results: DEFAULT_N_RESULTS,
            notice: None,
            dirty: false,
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of retrieved chunks requested per chat turn.
    pub fn with_n_results(mut self, n_results: u32) -> Self {
        self.n_results = n_results.max(1);
        self
    }

    pub fn view(&self) -> AppViewModel {
        let progress = match (&self.active_task, &self.progress) {
            (Some(task), snapshot) => Some(ProgressView {
                filename: task.filename.clone(),
                status: snapshot.as_ref().map(|s| s.status),
                progress: snapshot.as_ref().map_or(0, |s| s.progress),
                message: snapshot
                    .as_ref()
                    .map_or_else(|| "Waiting for status...".to_string(), |s| s.message.clone()),
                current_stage: snapshot
                    .as_ref()
                    .map(|s| s.current_stage.clone())
                    .unwrap_or_default(),
            }),
            (None, _) => None,
        };
        AppViewModel {
            messages: self.transcript.messages().to_vec(),
            chat_busy: self.in_flight.is_some(),
            uploading: self.uploading.is_some(),
            progress,
            task_outcome: self.task_outcome.clone(),
            documents: self.documents.clone(),
            selected_document: self.selected_document.clone(),
            notice: self.notice.clone(),
            dirty: self.dirty,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn active_task(&self) -> Option<&ProcessingTask> {
        self.active_task.as_ref()
    }

    pub fn progress(&self) -> Option<&ProgressSnapshot> {
        self.progress.as_ref()
    }

    pub fn in_flight_turn(&self) -> Option<TurnId> {
        self.in_flight
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some() || self.uploading.is_some() || self.active_task.is_some()
    }

    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn set_notice(&mut self, notice: impl Into<String>) {
        self.notice = Some(notice.into());
        self.mark_dirty();
    }

    pub(crate) fn clear_notice(&mut self) {
        if self.notice.take().is_some() {
            self.mark_dirty();
        }
    }

    // ---- processing task ----

    /// Returns false when an upload or task is already active.
    pub(crate) fn begin_upload(&mut self, path: PathBuf) -> bool {
        if self.uploading.is_some() || self.active_task.is_some() {
            return false;
        }
        self.uploading = Some(path);
        self.task_outcome = None;
        self.mark_dirty();
        true
    }

    pub(crate) fn accept_upload(&mut self, task: ProcessingTask) -> bool {
        if self.active_task.is_some() {
            sb_warn!("Upload accepted while task {:?} is active; ignoring", self.active_task);
            return false;
        }
        self.uploading = None;
        sb_info!("Tracking task {} for {}", task.task_id, task.filename);
        self.active_task = Some(task);
        self.progress = None;
        self.mark_dirty();
        true
    }

    pub(crate) fn reject_upload(&mut self, message: String) {
        let filename = self
            .uploading
            .take()
            .map(|path| display_name(&path))
            .unwrap_or_default();
        self.task_outcome = Some(TaskOutcome::Failed { filename, message });
        self.mark_dirty();
    }

    fn is_active_task(&self, task_id: &str) -> bool {
        match &self.active_task {
            Some(task) if task.task_id == task_id => true,
            _ => {
                sb_debug!("Dropping event for inactive task {}", task_id);
                false
            }
        }
    }

    pub(crate) fn apply_snapshot(&mut self, task_id: &str, snapshot: ProgressSnapshot) {
        if !self.is_active_task(task_id) {
            return;
        }
        if self.progress.as_ref() != Some(&snapshot) {
            self.progress = Some(snapshot);
            self.mark_dirty();
        }
    }

    pub(crate) fn complete_task(&mut self, task_id: &str, result: ProcessingResult) {
        if !self.is_active_task(task_id) {
            return;
        }
        let Some(task) = self.active_task.take() else {
            return;
        };
        self.progress = None;
        let document = Document {
            document_id: result
                .document_id()
                .map(str::to_string)
                .unwrap_or_else(|| task.document_id.clone()),
            filename: task.filename.clone(),
            num_pages: result.num_pages(),
            num_chunks: result.num_chunks(),
            size_bytes: None,
        };
        self.task_outcome = Some(TaskOutcome::Completed {
            document_id: document.document_id.clone(),
            filename: document.filename.clone(),
            num_pages: document.num_pages,
            num_chunks: document.num_chunks,
        });
        if self.selected_document.is_none() {
            self.selected_document = Some(document.document_id.clone());
        }
        self.upsert_document(document);
        self.mark_dirty();
    }

    pub(crate) fn fail_task(&mut self, task_id: &str, message: String) {
        if !self.is_active_task(task_id) {
            return;
        }
        let Some(task) = self.active_task.take() else {
            return;
        };
        self.progress = None;
        self.task_outcome = Some(TaskOutcome::Failed {
            filename: task.filename,
            message,
        });
        self.mark_dirty();
    }

    /// Tears down the active task and returns its id.
    pub(crate) fn abandon_task(&mut self) -> Option<TaskId> {
        let task = self.active_task.take()?;
        self.progress = None;
        self.mark_dirty();
        Some(task.task_id)
    }

    // ---- documents ----

    fn upsert_document(&mut self, document: Document) {
        match self
            .documents
            .iter_mut()
            .find(|d| d.document_id == document.document_id)
        {
            Some(existing) => *existing = document,
            None => self.documents.push(document),
        }
    }

    /// Replaces the list with the backend's, keeping details only known locally.
    pub(crate) fn load_documents(&mut self, loaded: Vec<Document>) {
        let merged = loaded
            .into_iter()
            .map(|doc| match self.documents.iter().find(|d| d.document_id == doc.document_id) {
                Some(local) => Document {
                    filename: local.filename.clone(),
                    num_pages: local.num_pages.or(doc.num_pages),
                    num_chunks: local.num_chunks.or(doc.num_chunks),
                    size_bytes: doc.size_bytes.or(local.size_bytes),
                    document_id: doc.document_id,
                },
                None => doc,
            })
            .collect::<Vec<_>>();
        if merged != self.documents {
            self.documents = merged;
            self.mark_dirty();
        }
    }

    pub(crate) fn remove_document(&mut self, document_id: &str) {
        let before = self.documents.len();
        self.documents.retain(|d| d.document_id != document_id);
        if self.selected_document.as_deref() == Some(document_id) {
            self.selected_document = None;
            self.mark_dirty();
        }
        if self.documents.len() != before {
            self.mark_dirty();
        }
    }

    pub(crate) fn select_document(&mut self, document_id: Option<DocumentId>) {
        if self.selected_document != document_id {
            self.selected_document = document_id;
            self.mark_dirty();
        }
    }

    // ---- chat ----

    /// Appends the user message and assistant placeholder and returns the
    /// turn to open. `None` while another turn is in flight.
    pub(crate) fn begin_turn(&mut self, query: String) -> Option<(TurnId, ChatRequest)> {
        if self.in_flight.is_some() {
            return None;
        }
        let conversation_history = self.transcript.history();
        self.transcript.push_user(query.clone());
        let index = self.transcript.begin_assistant();
        let turn = self.next_turn;
        self.next_turn += 1;
        self.turns.insert(turn, index);
        self.in_flight = Some(turn);
        self.mark_dirty();
        Some((
            turn,
            ChatRequest {
                query,
                document_id: self.selected_document.clone(),
                conversation_history,
                n_results: self.n_results,
            },
        ))
    }

    pub(crate) fn apply_chat_event(&mut self, turn: TurnId, event: &StreamEvent) {
        let Some(&index) = self.turns.get(&turn) else {
            sb_debug!("Dropping stream event for closed turn {}", turn);
            return;
        };
        if let StreamEvent::Error(reason) = event {
            sb_warn!("Chat turn {} failed: {}", turn, reason);
        }
        if self.transcript.apply(index, event) {
            self.mark_dirty();
        }
    }

    pub(crate) fn close_turn(&mut self, turn: TurnId) {
        let Some(index) = self.turns.remove(&turn) else {
            return;
        };
        if self.transcript.seal(index) {
            self.mark_dirty();
        }
        if self.in_flight == Some(turn) {
            self.in_flight = None;
            self.mark_dirty();
        }
    }

    /// Clears the transcript and returns the turn that was still open, if any.
    pub(crate) fn clear_conversation(&mut self) -> Option<TurnId> {
        let open = self.in_flight.take();
        self.turns.clear();
        if !self.transcript.is_empty() || open.is_some() {
            self.transcript.clear();
            self.mark_dirty();
        }
        open
    }
}

fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

//! Study Buddy core: data model, transcript reducer and the pure session state machine.
mod effect;
mod msg;
mod progress;
mod state;
mod transcript;
mod update;
mod view_model;

pub use effect::{ChatRequest, Effect};
pub use msg::Msg;
pub use progress::{ProcessingResult, ProgressSnapshot, TaskStatus};
pub use state::{AppState, Document, DocumentId, ProcessingTask, TaskId, TaskOutcome, TurnId};
pub use transcript::{
    reduce, ChatMessage, HistoryEntry, Role, Source, StreamEvent, Transcript,
    ASSISTANT_ERROR_MESSAGE,
};
pub use update::update;
pub use view_model::{AppViewModel, ProgressView};

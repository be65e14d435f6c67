use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Backend processing status of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Started,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// `completed` and `failed` are terminal: no transition leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Opaque success payload of a completed processing task.
///
/// The raw JSON object is kept as-is; the accessors read the fields the
/// backend is known to send.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessingResult(Map<String, Value>);

impl ProcessingResult {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn num_pages(&self) -> Option<u32> {
        self.u32_field("num_pages")
    }

    pub fn num_chunks(&self) -> Option<u32> {
        self.u32_field("num_chunks")
    }

    pub fn document_id(&self) -> Option<&str> {
        self.0.get("document_id").and_then(Value::as_str)
    }

    pub fn filename(&self) -> Option<&str> {
        self.0.get("filename").and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    fn u32_field(&self, key: &str) -> Option<u32> {
        self.0
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }
}

/// One point-in-time read of a processing task.
///
/// Progress is not monotonic: the backend may move back when it resets a
/// stage, so consumers replace the whole snapshot on every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub status: TaskStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "clamped_percent")]
    pub progress: u8,
    #[serde(default)]
    pub current_stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ProcessingResult>,
    #[serde(default, alias = "error", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ProgressSnapshot {
    pub fn new(status: TaskStatus, progress: u8, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            progress: progress.min(100),
            current_stage: String::new(),
            result: None,
            error_message: None,
            timestamp: None,
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.current_stage = stage.into();
        self
    }

    pub fn with_result(mut self, result: ProcessingResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }

    /// Failure reason for a `failed` snapshot.
    ///
    /// The backend puts the reason in `message`; an explicit
    /// `error_message` wins when present.
    pub fn failure_message(&self) -> String {
        self.error_message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| Some(self.message.as_str()).filter(|m| !m.trim().is_empty()))
            .unwrap_or("processing failed")
            .to_string()
    }
}

fn clamped_percent<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    Ok(raw.clamp(0.0, 100.0).round() as u8)
}

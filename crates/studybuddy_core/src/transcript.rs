use serde::{Deserialize, Deserializer, Serialize};
use studybuddy_logging::sb_debug;

/// Shown in place of an assistant reply whose turn failed.
pub const ASSISTANT_ERROR_MESSAGE: &str =
    "Sorry, I encountered an error processing your request. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A retrieved passage the assistant based its answer on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub page_number: u32,
    #[serde(default, deserialize_with = "unit_interval")]
    pub similarity: f64,
}

fn unit_interval<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    Ok(if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) })
}

/// Decoded chat stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Fragment to append to the reply, in arrival order.
    Content(String),
    /// Final source list; seals the reply but does not end the stream.
    Sources {
        sources: Vec<Source>,
        context_used: u32,
    },
    Done,
    /// The turn failed; carries the server or transport reason for logging.
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub sources: Option<Vec<Source>>,
    pub context_used: Option<u32>,
    pub is_streaming: bool,
    pub is_error: bool,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: None,
            context_used: None,
            is_streaming: false,
            is_error: false,
        }
    }

    /// Empty assistant reply waiting for stream events.
    pub fn assistant_placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            sources: None,
            context_used: None,
            is_streaming: true,
            is_error: false,
        }
    }

    /// Applies one stream event. Returns whether the message changed.
    fn apply(&mut self, event: &StreamEvent) -> bool {
        match event {
            StreamEvent::Content(fragment) => {
                if !self.is_streaming || self.is_error || fragment.is_empty() {
                    return false;
                }
                self.content.push_str(fragment);
                true
            }
            StreamEvent::Sources {
                sources,
                context_used,
            } => {
                if self.is_error {
                    return false;
                }
                let changed = self.is_streaming
                    || self.sources.as_ref() != Some(sources)
                    || self.context_used != Some(*context_used);
                self.sources = Some(sources.clone());
                self.context_used = Some(*context_used);
                self.is_streaming = false;
                changed
            }
            StreamEvent::Done => std::mem::replace(&mut self.is_streaming, false),
            StreamEvent::Error(_) => {
                if self.is_error {
                    return false;
                }
                self.content = ASSISTANT_ERROR_MESSAGE.to_string();
                self.sources = None;
                self.context_used = None;
                self.is_streaming = false;
                self.is_error = true;
                true
            }
        }
    }
}

/// Role/content pair sent back to the backend as conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// Ordered conversation. Append-only, except that a streaming assistant
/// reply is mutated in place through the index returned when it was added.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn get(&self, index: usize) -> Option<&ChatMessage> {
        self.messages.get(index)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> usize {
        self.messages.push(ChatMessage::user(content));
        self.messages.len() - 1
    }

    /// Appends a streaming assistant placeholder and returns its index.
    pub fn begin_assistant(&mut self) -> usize {
        self.messages.push(ChatMessage::assistant_placeholder());
        self.messages.len() - 1
    }

    /// Applies `event` to the assistant message at `index`.
    ///
    /// Returns whether anything changed; an index that does not address an
    /// assistant message is ignored.
    pub fn apply(&mut self, index: usize, event: &StreamEvent) -> bool {
        match self.messages.get_mut(index) {
            Some(message) if message.role == Role::Assistant => message.apply(event),
            _ => {
                sb_debug!("Ignoring stream event for index {} (no assistant message)", index);
                false
            }
        }
    }

    /// Seals the message at `index` if it is still streaming.
    pub fn seal(&mut self, index: usize) -> bool {
        self.apply(index, &StreamEvent::Done)
    }

    /// Complete, non-error messages in conversation order.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.messages
            .iter()
            .filter(|m| !m.is_streaming && !m.is_error && !m.content.is_empty())
            .map(|m| HistoryEntry {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// Pure fold of one stream event into a transcript.
pub fn reduce(mut transcript: Transcript, index: usize, event: &StreamEvent) -> Transcript {
    transcript.apply(index, event);
    transcript
}

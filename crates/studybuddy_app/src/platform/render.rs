use std::io::{self, Write};

use studybuddy_core::{AppViewModel, ChatMessage, Document, ProgressView, Role, TaskOutcome};

/// Writes view model changes to a terminal as append-only text.
///
/// Assistant replies are printed incrementally: each render writes only the
/// content that arrived since the previous one.
#[derive(Debug, Default)]
pub struct Renderer {
    /// Messages completely written out.
    flushed: usize,
    /// Bytes of the message at `flushed` already written.
    partial: usize,
    progress: Option<ProgressView>,
    outcome: Option<TaskOutcome>,
    notice: Option<String>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, view: &AppViewModel, out: &mut impl Write) -> io::Result<()> {
        if view.notice != self.notice {
            if let Some(notice) = &view.notice {
                writeln!(out, "! {notice}")?;
            }
            self.notice = view.notice.clone();
        }

        if view.progress != self.progress {
            if let Some(progress) = &view.progress {
                write_progress(progress, out)?;
            }
            self.progress = view.progress.clone();
        }

        if view.task_outcome != self.outcome {
            if let Some(outcome) = &view.task_outcome {
                write_outcome(outcome, out)?;
            }
            self.outcome = view.task_outcome.clone();
        }

        self.render_messages(&view.messages, out)?;
        out.flush()
    }

    fn render_messages(&mut self, messages: &[ChatMessage], out: &mut impl Write) -> io::Result<()> {
        if messages.len() < self.flushed {
            self.flushed = 0;
            self.partial = 0;
        }
        while let Some(message) = messages.get(self.flushed) {
            if message.role == Role::User {
                self.flushed += 1;
                continue;
            }
            if message.is_error {
                if self.partial > 0 {
                    writeln!(out)?;
                }
                writeln!(out, "{}", message.content)?;
            } else {
                if let Some(fresh) = message.content.get(self.partial..) {
                    write!(out, "{fresh}")?;
                }
                self.partial = message.content.len();
                if message.is_streaming {
                    break;
                }
                writeln!(out)?;
                write_sources(message, out)?;
            }
            self.flushed += 1;
            self.partial = 0;
        }
        Ok(())
    }
}

fn write_progress(progress: &ProgressView, out: &mut impl Write) -> io::Result<()> {
    if progress.current_stage.is_empty() {
        writeln!(out, "[{:>3}%] {}: {}", progress.progress, progress.filename, progress.message)
    } else {
        writeln!(
            out,
            "[{:>3}%] {}: {} ({})",
            progress.progress, progress.filename, progress.message, progress.current_stage
        )
    }
}

fn write_outcome(outcome: &TaskOutcome, out: &mut impl Write) -> io::Result<()> {
    match outcome {
        TaskOutcome::Completed {
            document_id,
            filename,
            num_pages,
            num_chunks,
        } => writeln!(
            out,
            "Processed {filename}: {} pages, {} chunks (document {document_id})",
            count(*num_pages),
            count(*num_chunks)
        ),
        TaskOutcome::Failed { filename, message } => {
            writeln!(out, "Processing {filename} failed: {message}")
        }
    }
}

fn write_sources(message: &ChatMessage, out: &mut impl Write) -> io::Result<()> {
    let Some(sources) = message.sources.as_deref().filter(|s| !s.is_empty()) else {
        return Ok(());
    };
    writeln!(out, "Sources:")?;
    for source in sources {
        writeln!(
            out,
            "  {} p.{} ({:.0}%)",
            source.filename,
            source.page_number,
            source.similarity * 100.0
        )?;
    }
    Ok(())
}

pub fn write_documents(
    documents: &[Document],
    selected: Option<&str>,
    out: &mut impl Write,
) -> io::Result<()> {
    if documents.is_empty() {
        writeln!(out, "No documents uploaded yet.")?;
        return Ok(());
    }
    for doc in documents {
        let marker = if selected == Some(doc.document_id.as_str()) { '*' } else { ' ' };
        write!(out, "{marker} {}  {}", doc.document_id, doc.filename)?;
        if let Some(bytes) = doc.size_bytes {
            write!(out, "  {} KiB", bytes.div_ceil(1024))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn count(value: Option<u32>) -> String {
    value.map_or_else(|| "?".to_string(), |v| v.to_string())
}

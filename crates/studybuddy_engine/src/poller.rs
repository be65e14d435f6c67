use std::time::Duration;

use studybuddy_core::TaskStatus;
use studybuddy_logging::{sb_debug, sb_info, sb_warn};
use tokio_util::sync::CancellationToken;

use crate::{ClientError, EngineEvent, FailureKind, Transport};

#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Delay between a resolved status fetch and the next one.
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelEventSink {
    tx: std::sync::mpsc::Sender<EngineEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: std::sync::mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTerminal {
    Completed,
    Failed,
    /// Abandoned before a terminal status; nothing was reported after that.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Status fetches issued, including one whose answer was discarded.
    pub fetches: usize,
    pub terminal: PollTerminal,
}

/// Drives status fetches for one processing task until it is terminal.
///
/// Fetches run strictly one after another: the next one is scheduled only
/// once the previous answer is in. Any fetch failure ends tracking; there
/// is no retry.
pub struct TaskPoller<'a> {
    transport: &'a dyn Transport,
    settings: PollSettings,
}

impl<'a> TaskPoller<'a> {
    pub fn new(transport: &'a dyn Transport, settings: PollSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub async fn run(
        &self,
        task_id: &str,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        let mut fetches = 0;
        loop {
            if cancel.is_cancelled() {
                return cancelled(task_id, fetches);
            }
            fetches += 1;
            let fetched = self.transport.fetch_status(task_id).await;
            if cancel.is_cancelled() {
                sb_debug!("Discarding status of abandoned task {}", task_id);
                return cancelled(task_id, fetches);
            }

            let snapshot = match fetched {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    sb_warn!("Status fetch for task {} failed: {}", task_id, err);
                    sink.emit(EngineEvent::TaskFailed {
                        task_id: task_id.to_string(),
                        message: err.to_string(),
                    });
                    return PollOutcome {
                        fetches,
                        terminal: PollTerminal::Failed,
                    };
                }
            };

            let status = snapshot.status;
            let result = snapshot.result.clone();
            let failure = snapshot.failure_message();
            sink.emit(EngineEvent::TaskProgress {
                task_id: task_id.to_string(),
                snapshot,
            });

            if !status.is_terminal() {
                tokio::select! {
                    _ = cancel.cancelled() => return cancelled(task_id, fetches),
                    _ = tokio::time::sleep(self.settings.interval) => {}
                }
                continue;
            }

            let terminal = match (status, result) {
                (TaskStatus::Completed, Some(result)) => {
                    sb_info!("Task {} completed after {} fetches", task_id, fetches);
                    sink.emit(EngineEvent::TaskCompleted {
                        task_id: task_id.to_string(),
                        result,
                    });
                    PollTerminal::Completed
                }
                (TaskStatus::Completed, None) => {
                    let err = ClientError::new(
                        FailureKind::MalformedResponse,
                        "completed status without a result",
                    );
                    sb_warn!("Task {}: {}", task_id, err);
                    sink.emit(EngineEvent::TaskFailed {
                        task_id: task_id.to_string(),
                        message: err.to_string(),
                    });
                    PollTerminal::Failed
                }
                _ => {
                    let err = ClientError::new(FailureKind::TaskFailed, failure);
                    sb_warn!("Task {} failed ({:?}): {}", task_id, err.class(), err.message);
                    sink.emit(EngineEvent::TaskFailed {
                        task_id: task_id.to_string(),
                        message: err.message,
                    });
                    PollTerminal::Failed
                }
            };
            return PollOutcome { fetches, terminal };
        }
    }
}

fn cancelled(task_id: &str, fetches: usize) -> PollOutcome {
    sb_info!("Stopped tracking task {} after {} fetches", task_id, fetches);
    PollOutcome {
        fetches,
        terminal: PollTerminal::Cancelled,
    }
}

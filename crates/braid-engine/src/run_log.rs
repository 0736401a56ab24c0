use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use braid_core::config::LogConfig;
use braid_core::event::EventBus;
use braid_core::types::{RunId, WorkflowEvent};

/// JSONL run logger.
///
/// Subscribes to the EventBus and writes one JSON object per line for a single
/// run. Append-only, so a crash mid-segment leaves every earlier line intact.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

/// A single log entry written to the JSONL file.
#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    run_id: String,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    /// Logs go to `{log_dir}/{run_id}/{timestamp}.jsonl`.
    /// `level`: 1 = run events only, 2 = + node events.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    /// `None` when logging is disabled.
    pub fn from_config(config: &LogConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.resolved_dir(), config.level))
    }

    /// Subscribe now and write in a background task until the run's segment
    /// ends, the bus closes, or `cancel` fires.
    ///
    /// Subscribing before spawning means no event published after this call
    /// returns can be missed.
    pub fn spawn(
        self,
        event_bus: &Arc<EventBus>,
        run_id: RunId,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let rx = event_bus.subscribe();
        tokio::spawn(self.run(rx, run_id, cancel))
    }

    async fn run(
        self,
        mut rx: broadcast::Receiver<WorkflowEvent>,
        run_id: RunId,
        cancel: CancellationToken,
    ) {
        let run_dir = self.log_dir.join(run_id.as_str());
        if let Err(e) = tokio::fs::create_dir_all(&run_dir).await {
            error!(error = %e, "Failed to create log directory");
            return;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S%.3f").to_string();
        let log_path = run_dir.join(format!("{}.jsonl", timestamp));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");
        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if event.run_id() != &run_id {
                                continue;
                            }
                            if let Some(entry) = self.event_to_entry(&event) {
                                if let Ok(json) = serde_json::to_string(&entry) {
                                    let line = format!("{}\n", json);
                                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                                        error!(error = %e, "Failed to write log entry");
                                        break;
                                    }
                                    // Flush after each entry for crash resilience
                                    if let Err(e) = writer.flush().await {
                                        error!(error = %e, "Failed to flush log");
                                    }
                                }
                            }
                            if event.ends_segment() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
    }

    /// `None` when filtered out by level.
    fn event_to_entry(&self, event: &WorkflowEvent) -> Option<LogEntry> {
        let entry = |event_type, node_id: Option<&String>, detail| LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id: event.run_id().to_string(),
            event_type,
            node_id: node_id.cloned(),
            detail,
        };

        match event {
            // L1: run-level
            WorkflowEvent::RunStarted {
                workflow_id,
                node_id,
                ..
            } => Some(entry(
                "run_started",
                node_id.as_ref(),
                Some(serde_json::json!({ "workflow_id": workflow_id })),
            )),
            WorkflowEvent::RunPaused { node_id, reason, .. } => Some(entry(
                "run_paused",
                Some(node_id),
                Some(serde_json::json!({ "reason": reason })),
            )),
            WorkflowEvent::RunCompleted { steps, .. } => Some(entry(
                "run_completed",
                None,
                Some(serde_json::json!({ "steps": steps })),
            )),
            WorkflowEvent::RunFailed { error, .. } => Some(entry(
                "run_failed",
                None,
                Some(serde_json::json!({ "error": error })),
            )),
            WorkflowEvent::RunCancelled { .. } => Some(entry("run_cancelled", None, None)),

            // L2: per-node
            WorkflowEvent::NodeStarted { node_id, step, .. } if self.level >= 2 => Some(entry(
                "node_started",
                Some(node_id),
                Some(serde_json::json!({ "step": step })),
            )),
            WorkflowEvent::NodeCompleted {
                node_id,
                elapsed_ms,
                ..
            } if self.level >= 2 => Some(entry(
                "node_completed",
                Some(node_id),
                Some(serde_json::json!({ "elapsed_ms": elapsed_ms })),
            )),
            WorkflowEvent::NodeFailed { node_id, error, .. } if self.level >= 2 => Some(entry(
                "node_failed",
                Some(node_id),
                Some(serde_json::json!({ "error": error })),
            )),

            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writes_run_events_for_one_run() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(EventBus::default());
        let run_id = RunId::from("run-a");

        let handle = RunLogger::new(dir.path().to_path_buf(), 1).spawn(
            &bus,
            run_id.clone(),
            CancellationToken::new(),
        );

        bus.publish(WorkflowEvent::RunStarted {
            run_id: run_id.clone(),
            workflow_id: "wf".into(),
            node_id: Some("start".into()),
        });
        bus.publish(WorkflowEvent::NodeStarted {
            run_id: run_id.clone(),
            node_id: "start".into(),
            step: 1,
        });
        bus.publish(WorkflowEvent::RunCompleted {
            run_id: RunId::from("other-run"),
            steps: 9,
        });
        bus.publish(WorkflowEvent::RunCompleted {
            run_id: run_id.clone(),
            steps: 1,
        });
        handle.await.unwrap();

        let run_dir = dir.path().join("run-a");
        let file = std::fs::read_dir(&run_dir).unwrap().next().unwrap().unwrap();
        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        // level 1 skips the node event and the other run
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event_type"], "run_started");
        assert_eq!(lines[0]["node_id"], "start");
        assert_eq!(lines[1]["event_type"], "run_completed");
        assert_eq!(lines[1]["detail"]["steps"], 1);
    }

    #[tokio::test]
    async fn test_level_two_includes_node_events() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(EventBus::default());
        let run_id = RunId::from("run-b");
        let handle = RunLogger::new(dir.path().to_path_buf(), 2).spawn(
            &bus,
            run_id.clone(),
            CancellationToken::new(),
        );

        bus.publish(WorkflowEvent::NodeFailed {
            run_id: run_id.clone(),
            node_id: "n".into(),
            error: "bad".into(),
        });
        bus.publish(WorkflowEvent::RunFailed {
            run_id: run_id.clone(),
            error: "bad".into(),
        });
        handle.await.unwrap();

        let file = std::fs::read_dir(dir.path().join("run-b"))
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("node_failed"));
    }

    #[tokio::test]
    async fn test_cancel_stops_logger() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(EventBus::default());
        let cancel = CancellationToken::new();
        let handle =
            RunLogger::new(dir.path().to_path_buf(), 1).spawn(&bus, RunId::from("r"), cancel.clone());
        cancel.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn test_disabled_config() {
        let config = LogConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(RunLogger::from_config(&config).is_none());
    }
}

use std::collections::HashMap;

use futures::future::BoxFuture;
use tokio::sync::Mutex;

use braid_core::error::Result;
use braid_core::traits::StateRepository;
use braid_core::types::{RunFilter, RunId, RunSummary, WorkflowState};

/// In-memory repository that keeps every saved snapshot, in order.
#[derive(Default)]
pub struct RecordingRepository {
    runs: Mutex<HashMap<RunId, WorkflowState>>,
    saves: Mutex<Vec<WorkflowState>>,
}

impl RecordingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save_count(&self) -> usize {
        self.saves.lock().await.len()
    }

    /// Every snapshot passed to `save`, oldest first.
    pub async fn saves(&self) -> Vec<WorkflowState> {
        self.saves.lock().await.clone()
    }
}

impl StateRepository for RecordingRepository {
    fn save<'a>(&'a self, state: &'a WorkflowState) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.saves.lock().await.push(state.clone());
            self.runs
                .lock()
                .await
                .insert(state.run_id.clone(), state.clone());
            Ok(())
        })
    }

    fn find<'a>(&'a self, run_id: &'a RunId) -> BoxFuture<'a, Result<Option<WorkflowState>>> {
        Box::pin(async move { Ok(self.runs.lock().await.get(run_id).cloned()) })
    }

    fn list<'a>(&'a self, filter: &'a RunFilter) -> BoxFuture<'a, Result<Vec<RunSummary>>> {
        Box::pin(async move {
            let runs = self.runs.lock().await;
            let mut rows: Vec<RunSummary> = runs
                .values()
                .filter(|s| filter.matches(s))
                .map(RunSummary::from)
                .collect();
            rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            if let Some(limit) = filter.limit {
                rows.truncate(limit);
            }
            Ok(rows)
        })
    }

    fn delete<'a>(&'a self, run_id: &'a RunId) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.runs.lock().await.remove(run_id).is_some()) })
    }
}

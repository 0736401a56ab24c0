use std::collections::HashMap;

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use braid_core::error::Result;
use braid_core::traits::StateRepository;
use braid_core::types::{RunFilter, RunId, RunSummary, WorkflowState};

/// Process-local repository. Runs do not survive a restart.
#[derive(Default)]
pub struct InMemoryStateRepository {
    runs: RwLock<HashMap<RunId, WorkflowState>>,
}

impl InMemoryStateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }
}

impl StateRepository for InMemoryStateRepository {
    fn save<'a>(&'a self, state: &'a WorkflowState) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.runs
                .write()
                .await
                .insert(state.run_id.clone(), state.clone());
            Ok(())
        })
    }

    fn find<'a>(&'a self, run_id: &'a RunId) -> BoxFuture<'a, Result<Option<WorkflowState>>> {
        Box::pin(async move { Ok(self.runs.read().await.get(run_id).cloned()) })
    }

    fn list<'a>(&'a self, filter: &'a RunFilter) -> BoxFuture<'a, Result<Vec<RunSummary>>> {
        Box::pin(async move {
            let runs = self.runs.read().await;
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
        Box::pin(async move { Ok(self.runs.write().await.remove(run_id).is_some()) })
    }
}

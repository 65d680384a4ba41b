use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::tester::AccountTester;
use crate::common::{AccountId, AccountTestResult, BatchTask};
use crate::config::ProbeConfiguration;
use crate::error::AuthError;

/// Bounded fan-out of account probes with pollable progress.
///
/// Task records live in memory only and are dropped by
/// [`BatchCoordinator::cleanup_old_tasks`] once finished and past retention.
pub struct BatchCoordinator {
    tester: Arc<AccountTester>,
    tasks: Arc<DashMap<String, BatchTask>>,
    concurrency: usize,
    retention: chrono::Duration,
}

impl BatchCoordinator {
    pub fn new(config: &ProbeConfiguration, tester: Arc<AccountTester>) -> Self {
        let retention = chrono::Duration::from_std(config.task_retention())
            .unwrap_or_else(|_| chrono::Duration::hours(1));

        Self {
            tester,
            tasks: Arc::new(DashMap::new()),
            concurrency: config.batch_concurrency.max(1),
            retention,
        }
    }

    /// Register a task for `ids` and probe them in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn batch_test_accounts(&self, ids: Vec<AccountId>) -> Result<String, AuthError> {
        if ids.is_empty() {
            return Err(AuthError::InvalidInput("account ids are required".to_string()));
        }

        let task_id = format!("batch_{}", uuid::Uuid::new_v4().simple());
        self.tasks.insert(
            task_id.clone(),
            BatchTask {
                task_id: task_id.clone(),
                total: ids.len(),
                completed: 0,
                in_progress: true,
                results: Vec::with_capacity(ids.len()),
                started_at: Utc::now(),
                finished_at: None,
            },
        );

        tracing::info!(task_id = %task_id, total = ids.len(), "Started batch account test");

        tokio::spawn(run_batch(
            Arc::clone(&self.tester),
            Arc::clone(&self.tasks),
            task_id.clone(),
            ids,
            self.concurrency,
        ));

        Ok(task_id)
    }

    /// Snapshot of a task's progress and results
    pub fn get_batch_test_result(&self, task_id: &str) -> Result<BatchTask, AuthError> {
        self.tasks
            .get(task_id)
            .map(|task| task.clone())
            .ok_or_else(|| AuthError::NotFound(format!("batch task {} not found", task_id)))
    }

    /// Drop finished tasks older than the retention window
    pub fn cleanup_old_tasks(&self) -> usize {
        self.cleanup_at(Utc::now())
    }

    pub(crate) fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let initial_count = self.tasks.len();
        self.tasks.retain(|_, task| match task.finished_at {
            Some(finished_at) => finished_at > cutoff,
            None => true,
        });
        initial_count.saturating_sub(self.tasks.len())
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

async fn run_batch(
    tester: Arc<AccountTester>,
    tasks: Arc<DashMap<String, BatchTask>>,
    task_id: String,
    ids: Vec<AccountId>,
    concurrency: usize,
) {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut handles = Vec::with_capacity(ids.len());

    for id in ids {
        let sem = Arc::clone(&semaphore);
        let tester = Arc::clone(&tester);
        let tasks = Arc::clone(&tasks);
        let task_id = task_id.clone();

        let handle = tokio::spawn(async move {
            let _permit = sem.acquire().await;

            let result = match tester.test_account(id).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(task_id = %task_id, account_id = id, error = %e, "Account test failed");
                    AccountTestResult::error(id, e.to_string())
                }
            };
            record_result(&tasks, &task_id, result);
        });
        handles.push((id, handle));
    }

    for (id, handle) in handles {
        if let Err(e) = handle.await {
            tracing::error!(task_id = %task_id, account_id = id, "Account test worker aborted: {}", e);
            record_result(
                &tasks,
                &task_id,
                AccountTestResult::error(id, format!("worker aborted: {}", e)),
            );
        }
    }

    if let Some(mut task) = tasks.get_mut(&task_id) {
        task.in_progress = false;
        task.finished_at = Some(Utc::now());
        tracing::info!(
            task_id = %task_id,
            completed = task.completed,
            total = task.total,
            "Batch account test finished"
        );
    }
}

fn record_result(tasks: &DashMap<String, BatchTask>, task_id: &str, result: AccountTestResult) {
    if let Some(mut task) = tasks.get_mut(task_id) {
        if task.completed < task.total {
            task.results.push(result);
            task.completed += 1;
        }
    }
}

/// Background task that periodically evicts finished batch tasks
pub async fn run_task_sweeper(coordinator: Arc<BatchCoordinator>, interval: Duration) {
    let mut interval = tokio::time::interval(interval);
    loop {
        interval.tick().await;
        let cleaned = coordinator.cleanup_old_tasks();
        if cleaned > 0 {
            tracing::info!(
                "Cleaned up {} finished batch tasks, {} remaining",
                cleaned,
                coordinator.task_count()
            );
        }
    }
}

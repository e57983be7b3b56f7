//! An executor pairs a ready queue with its own permit pool and dispatch
//! loop. The default executor takes untagged downloads and every tag
//! without a dedicated executor.

use std::sync::Arc;
use tokio::sync::Semaphore;

use super::queue::ReadyQueue;
use crate::config::ExecutorConfig;

pub(crate) const DEFAULT_EXECUTOR: &str = "default";

#[derive(Debug)]
pub(crate) struct Executor {
    name: String,
    tag: Option<String>,
    permits: Arc<Semaphore>,
    max_permits: usize,
    pub(crate) ready: ReadyQueue,
}

/// Point-in-time view of one executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorStats {
    pub name: String,
    /// `None` for the default executor.
    pub tag: Option<String>,
    pub max_running: usize,
    pub available_permits: usize,
    pub queued: usize,
}

impl Executor {
    pub(crate) fn new(name: impl Into<String>, tag: Option<String>, max_permits: usize) -> Self {
        let max_permits = max_permits.max(1);
        Self {
            name: name.into(),
            tag,
            permits: Arc::new(Semaphore::new(max_permits)),
            max_permits,
            ready: ReadyQueue::default(),
        }
    }

    pub(crate) fn from_config(cfg: &ExecutorConfig) -> Self {
        Self::new(&cfg.name, Some(cfg.tag.clone()), cfg.max_running_downloads)
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub(crate) fn max_permits(&self) -> usize {
        self.max_permits
    }

    pub(crate) fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub(crate) fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            name: self.name.clone(),
            tag: self.tag.clone(),
            max_running: self.max_permits,
            available_permits: self.available_permits(),
            queued: self.ready.len(),
        }
    }
}

/// Waits for a queued task before reserving a permit, so an idle executor
/// holds none.
pub(crate) async fn dispatch_loop(executor: Arc<Executor>) {
    loop {
        if !executor.ready.wait_nonempty().await {
            break;
        }
        let permit = match Arc::clone(&executor.permits).acquire_owned().await {
            Ok(p) => p,
            Err(_) => break,
        };
        let Some(task) = executor.ready.try_pop() else {
            // Removed while we waited for the permit.
            drop(permit);
            continue;
        };
        tracing::debug!(
            executor = %executor.name,
            task = task.id(),
            url = %task.url(),
            "dispatching"
        );
        tokio::spawn(task.run(permit));
    }
    tracing::debug!(executor = %executor.name, "dispatch loop exited");
}

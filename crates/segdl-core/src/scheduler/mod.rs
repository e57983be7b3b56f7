//! Download scheduler: bounded concurrency, per-url dedup, ready-queue
//! dispatch, task registry and shutdown sequencing.
//!
//! Each executor owns a semaphore gating its running tasks. The default
//! executor is sized to `max_running_downloads`; configured executors take
//! downloads by tag under their own limit. A dispatch loop waits for a
//! queued task, reserves a permit, then pops the task and spawns its run;
//! the permit moves into the running set and is released when the task
//! reports its end.

mod builder;
mod control;
mod executor;
mod query;
mod queue;
#[cfg(test)]
mod tests;

pub use builder::SchedulerBuilder;
pub use executor::ExecutorStats;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, Notify, OwnedSemaphorePermit};
use tokio::task::JoinHandle;

use self::executor::{Executor, DEFAULT_EXECUTOR};
use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::task::{Download, DownloadTask, ProgressEvent, TaskId, TaskLifecycle};

/// Handle to a running engine. Cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Shared>,
}

pub(crate) struct Shared {
    ctx: Arc<EngineContext>,
    /// Default executor first, then the configured ones.
    executors: Vec<Arc<Executor>>,
    book: Mutex<Bookkeeping>,
    /// Serializes submit and delete check-then-act sequences.
    submit_lock: tokio::sync::Mutex<()>,
    shutdown: AtomicBool,
    next_id: AtomicU64,
    /// Signalled whenever the registry and running set become empty.
    idle: Notify,
    dispatchers: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Default)]
struct Bookkeeping {
    /// Live (queued or running) task per url.
    tasks: HashMap<String, Arc<DownloadTask>>,
    /// Running tasks with the permit each holds.
    running: HashMap<TaskId, (Arc<DownloadTask>, OwnedSemaphorePermit)>,
    /// Records known in memory, by url.
    downloads: HashMap<String, Arc<Download>>,
}

impl Shared {
    fn book(&self) -> MutexGuard<'_, Bookkeeping> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Executor dedicated to `tag`, else the default one.
    fn executor_for(&self, tag: Option<&str>) -> &Arc<Executor> {
        tag.and_then(|tag| self.executors.iter().find(|e| e.tag() == Some(tag)))
            .unwrap_or(&self.executors[0])
    }

    fn unqueue(&self, id: TaskId) -> Option<Arc<DownloadTask>> {
        self.executors.iter().find_map(|e| e.ready.remove(id))
    }

    fn is_idle(&self) -> bool {
        let book = self.book();
        book.tasks.is_empty() && book.running.is_empty()
    }
}

impl TaskLifecycle for Shared {
    fn on_task_start(&self, task: &Arc<DownloadTask>, permit: OwnedSemaphorePermit) {
        let mut book = self.book();
        book.running.insert(task.id(), (Arc::clone(task), permit));
        tracing::debug!(task = task.id(), running = book.running.len(), "task started");
    }

    fn on_task_end(&self, task: &Arc<DownloadTask>) {
        let released;
        let idle;
        {
            let mut book = self.book();
            released = book.running.remove(&task.id());
            if book
                .tasks
                .get(task.url())
                .is_some_and(|t| Arc::ptr_eq(t, task))
            {
                book.tasks.remove(task.url());
            }
            idle = book.tasks.is_empty() && book.running.is_empty();
        }
        self.unqueue(task.id());
        if released.is_some() {
            tracing::debug!(task = task.id(), "task ended, permit released");
        }
        drop(released);
        if idle {
            self.idle.notify_waiters();
        }
    }
}

impl Scheduler {
    /// Engine with the default collaborators (in-memory store, curl).
    pub fn builder(config: EngineConfig) -> SchedulerBuilder {
        SchedulerBuilder::new(config)
    }

    pub(crate) fn start(ctx: Arc<EngineContext>) -> Self {
        let mut executors = vec![Arc::new(Executor::new(
            DEFAULT_EXECUTOR,
            None,
            ctx.config.permits(),
        ))];
        for cfg in &ctx.config.executors {
            if executors.iter().any(|e| e.tag() == Some(cfg.tag.as_str())) {
                tracing::warn!(
                    executor = %cfg.name,
                    tag = %cfg.tag,
                    "tag already has an executor, ignoring"
                );
                continue;
            }
            executors.push(Arc::new(Executor::from_config(cfg)));
        }
        let shared = Arc::new(Shared {
            ctx,
            executors,
            book: Mutex::new(Bookkeeping::default()),
            submit_lock: tokio::sync::Mutex::new(()),
            shutdown: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            idle: Notify::new(),
            dispatchers: Mutex::new(Vec::new()),
        });
        let handles = shared
            .executors
            .iter()
            .map(|e| tokio::spawn(executor::dispatch_loop(Arc::clone(e))))
            .collect();
        *shared
            .dispatchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = handles;
        for e in &shared.executors {
            tracing::info!(executor = e.name(), max_running = e.max_permits(), "executor started");
        }
        tracing::info!("scheduler started");
        Scheduler { inner: shared }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.ctx.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.inner.ctx.subscribe()
    }

    /// Tasks currently holding a permit.
    pub fn running_count(&self) -> usize {
        self.inner.book().running.len()
    }

    /// Tasks waiting in any ready queue.
    pub fn queued_count(&self) -> usize {
        self.inner.executors.iter().map(|e| e.ready.len()).sum()
    }

    /// Free permits across all executors.
    pub fn available_permits(&self) -> usize {
        self.inner.executors.iter().map(|e| e.available_permits()).sum()
    }

    pub fn max_permits(&self) -> usize {
        self.inner.executors.iter().map(|e| e.max_permits()).sum()
    }

    /// Default executor first.
    pub fn executors(&self) -> Vec<ExecutorStats> {
        self.inner.executors.iter().map(|e| e.stats()).collect()
    }

    /// Whether a task for `url` is queued or running.
    pub fn is_active(&self, url: &str) -> bool {
        self.inner.book().tasks.contains_key(url)
    }

    /// Resolves once no task is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

//! Ordered interceptor pipeline.
//!
//! A run walks the process-wide stage list: caller-registered stages first,
//! then [`ProbeInterceptor`], [`FetchInterceptor`] and [`MergeInterceptor`].
//! Each stage gets a [`Chain`] and either returns a record directly or calls
//! [`Chain::proceed`] and may adjust the downstream result. `proceed`
//! consumes the chain, so a stage can continue at most once.
//!
//! Stages report expected failures through the record's error code (see
//! [`DownloadTask::fail`]) rather than by returning errors.

mod checksum;
mod fetch;
mod merge;
mod probe;

pub use checksum::{sha256_path, ChecksumInterceptor};
pub use fetch::FetchInterceptor;
pub use merge::MergeInterceptor;
pub use probe::ProbeInterceptor;

use async_trait::async_trait;
use std::sync::Arc;

use crate::record::{DownloadRecord, DownloadRequest};
use crate::task::DownloadTask;

#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, chain: Chain<'_>) -> DownloadRecord;
}

/// Position in the stage list for one run.
pub struct Chain<'a> {
    stages: &'a [Arc<dyn Interceptor>],
    index: usize,
    task: Arc<DownloadTask>,
    request: DownloadRequest,
}

impl<'a> Chain<'a> {
    pub fn new(
        stages: &'a [Arc<dyn Interceptor>],
        task: Arc<DownloadTask>,
        request: DownloadRequest,
    ) -> Self {
        Self {
            stages,
            index: 0,
            task,
            request,
        }
    }

    pub fn request(&self) -> &DownloadRequest {
        &self.request
    }

    /// Downstream stages see the modified request.
    pub fn request_mut(&mut self) -> &mut DownloadRequest {
        &mut self.request
    }

    pub fn task(&self) -> &Arc<DownloadTask> {
        &self.task
    }

    /// Run the rest of the pipeline. Past the last stage this yields the
    /// current record.
    pub async fn proceed(self) -> DownloadRecord {
        match self.stages.get(self.index) {
            Some(stage) => {
                let next = Chain {
                    index: self.index + 1,
                    ..self
                };
                stage.intercept(next).await
            }
            None => self.task.download().snapshot().await,
        }
    }
}

/// Built-in stages in pipeline order.
pub fn builtin_stages() -> Vec<Arc<dyn Interceptor>> {
    vec![
        Arc::new(ProbeInterceptor),
        Arc::new(FetchInterceptor),
        Arc::new(MergeInterceptor),
    ]
}

/// Drive a task's request through its engine's stage list.
pub async fn run_pipeline(task: Arc<DownloadTask>) -> DownloadRecord {
    let stages = Arc::clone(&task.context().stages);
    let mut request = task.request().clone();
    request.segment_count = task.segment_count();
    Chain::new(&stages, task, request).proceed().await
}

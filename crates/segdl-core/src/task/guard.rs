//! RAII guard that reports the end of a task run when dropped.

use std::sync::Arc;

use super::DownloadTask;

/// Calls the scheduler's end callback on drop, also when the run unwinds.
pub(super) struct EndGuard<'a> {
    pub(super) task: &'a Arc<DownloadTask>,
}

impl Drop for EndGuard<'_> {
    fn drop(&mut self) {
        self.task.end();
    }
}

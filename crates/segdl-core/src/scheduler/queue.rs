//! FIFO of tasks waiting for a permit. Closing it is the dispatch loop's
//! exit signal.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use crate::task::{DownloadTask, TaskId};

#[derive(Debug, Default)]
pub(crate) struct ReadyQueue {
    items: Mutex<VecDeque<Arc<DownloadTask>>>,
    closed: AtomicBool,
    notify: Notify,
}

impl ReadyQueue {
    fn items(&self) -> MutexGuard<'_, VecDeque<Arc<DownloadTask>>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a task; false once the queue is closed.
    pub(crate) fn push(&self, task: Arc<DownloadTask>) -> bool {
        {
            let mut items = self.items();
            if self.is_closed() {
                return false;
            }
            items.push_back(task);
        }
        self.notify.notify_one();
        true
    }

    pub(crate) fn remove(&self, id: TaskId) -> Option<Arc<DownloadTask>> {
        let mut items = self.items();
        let pos = items.iter().position(|t| t.id() == id)?;
        items.remove(pos)
    }

    pub(crate) fn drain(&self) -> Vec<Arc<DownloadTask>> {
        self.items().drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.items().len()
    }

    pub(crate) fn close(&self) {
        {
            let _items = self.items();
            self.closed.store(true, Ordering::SeqCst);
        }
        self.notify.notify_one();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn try_pop(&self) -> Option<Arc<DownloadTask>> {
        self.items().pop_front()
    }

    /// Wait until a task is queued. False once the queue is closed and empty.
    /// Reserves nothing: a concurrent `remove` can empty the queue again
    /// before the caller pops.
    pub(crate) async fn wait_nonempty(&self) -> bool {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let items = self.items();
                if !items.is_empty() {
                    return true;
                }
                if self.is_closed() {
                    return false;
                }
            }
            notified.await;
        }
    }
}

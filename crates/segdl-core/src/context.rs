//! Collaborators shared by the scheduler, its tasks and the pipeline stages.

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::EngineConfig;
use crate::interceptor::Interceptor;
use crate::store::RecordStore;
use crate::task::ProgressEvent;
use crate::transport::ConnectionFactory;

/// Progress events buffered per subscriber before old ones are dropped.
pub const EVENT_CAPACITY: usize = 256;

pub struct EngineContext {
    pub config: EngineConfig,
    pub store: Arc<dyn RecordStore>,
    pub connector: Arc<dyn ConnectionFactory>,
    /// Ordered stage list; immutable after start.
    pub stages: Arc<[Arc<dyn Interceptor>]>,
    events: broadcast::Sender<ProgressEvent>,
}

impl EngineContext {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn RecordStore>,
        connector: Arc<dyn ConnectionFactory>,
        stages: Vec<Arc<dyn Interceptor>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            store,
            connector,
            stages: stages.into(),
            events,
        }
    }

    /// Publish an event; having no subscribers is fine.
    pub fn emit(&self, event: ProgressEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }
}

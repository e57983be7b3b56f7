use std::sync::Arc;

use super::Scheduler;
use crate::config::{EngineConfig, ExecutorConfig};
use crate::context::EngineContext;
use crate::interceptor::{self, Interceptor};
use crate::store::{MemoryStore, RecordStore};
use crate::transport::{ConnectionFactory, CurlConnectionFactory, CurlOptions};

/// Collects the engine's collaborators and starts the dispatch loop.
/// Defaults: in-memory store, curl transport configured from the config.
pub struct SchedulerBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn RecordStore>>,
    connector: Option<Arc<dyn ConnectionFactory>>,
    stages: Vec<Arc<dyn Interceptor>>,
}

impl SchedulerBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            store: None,
            connector: None,
            stages: Vec::new(),
        }
    }

    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn connection_factory(mut self, connector: Arc<dyn ConnectionFactory>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Register a stage. Stages run in registration order, all before the
    /// built-in probe, fetch and merge stages.
    pub fn interceptor(mut self, stage: Arc<dyn Interceptor>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Add a dedicated executor after those from the config. A tag that
    /// already has one keeps the first.
    pub fn executor(mut self, executor: ExecutorConfig) -> Self {
        self.config.executors.push(executor);
        self
    }

    /// Must be called inside a tokio runtime.
    pub fn start(self) -> Scheduler {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let connector = self.connector.unwrap_or_else(|| {
            Arc::new(CurlConnectionFactory::new(CurlOptions::from_config(
                &self.config,
            )))
        });
        let mut stages = self.stages;
        stages.extend(interceptor::builtin_stages());
        let ctx = EngineContext::new(self.config, store, connector, stages);
        Scheduler::start(Arc::new(ctx))
    }
}

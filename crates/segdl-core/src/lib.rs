pub mod config;
pub mod logging;

pub mod context;
pub mod error;
pub mod interceptor;
pub mod record;
pub mod scheduler;
pub mod segmenter;
pub mod storage;
pub mod store;
pub mod task;
pub mod transport;

pub use config::{EngineConfig, ExecutorConfig};
pub use error::{EngineError, ErrorCode};
pub use interceptor::{Chain, ChecksumInterceptor, Interceptor};
pub use record::{CacheEntry, DownloadRecord, DownloadRequest, DownloadStatus};
pub use scheduler::{ExecutorStats, Scheduler, SchedulerBuilder};
pub use store::{MemoryStore, RecordStore, SqliteStore};
pub use task::ProgressEvent;
pub use transport::{ByteRange, ConnectionFactory, CurlConnectionFactory, Response, TransportError};

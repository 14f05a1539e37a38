//! docline core: resilient remote generation for document extraction
//!
//! A [`ResilientClient`] wraps a provider's upload/invoke primitives with a
//! response cache, a degraded fallback for oversized payloads, bounded
//! retries for transient failures, and a failure-rate circuit breaker.
//! [`run_batch`] drives many requests through per-worker clients.

pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod logging;
pub mod monitor;
pub mod progress;
pub mod request;
pub mod retry;
pub mod work_queue;

// Re-exports for convenience
pub use batch::{Job, Summary, run_batch};
pub use client::{ClientStats, Provider, ResilientClient};
pub use config::{ClientConfig, ExtractionConfig};
pub use error::{FailureClass, GenerationError};
pub use extract::{MarkdownSink, parse_response};
pub use fallback::{Completion, DEGRADED_RESPONSE, with_fallback};
pub use logging::init_logging;
pub use monitor::{ExceptionMonitor, MonitorConfig, MonitorError};
pub use progress::ProgressContext;
pub use request::{Attachment, Request};
pub use retry::RetryExecutor;
pub use work_queue::WorkQueue;

//! Resilient generation client
//!
//! Layering, innermost first:
//!
//! ```text
//! monitor.call(            circuit breaker: swallow or propagate
//!   retry.call(            backoff on transient failures
//!     with_fallback(       oversized payload -> degraded marker
//!       upload + invoke    provider primitives
//! ```
//!
//! Cache lookups happen before any of it; cache writes after, and only for
//! generated or degraded results.

use anyhow::{Context, Result};
use docline_store::{EMPTY_RESPONSE_PLACEHOLDER, Fingerprint, ResponseCache};

use crate::config::ClientConfig;
use crate::error::GenerationError;
use crate::fallback::{Completion, with_fallback};
use crate::monitor::ExceptionMonitor;
use crate::request::{Attachment, Request};
use crate::retry::RetryExecutor;

/// Remote generation primitives supplied by a provider binding.
pub trait Provider {
    /// Handle to an uploaded attachment.
    type File;

    fn upload(&self, attachment: &Attachment) -> Result<Self::File, GenerationError>;

    /// Generate a response from the prompt and uploaded files, in request order.
    fn invoke(&self, request: &Request, files: &[Self::File]) -> Result<String, GenerationError>;
}

/// Per-client counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub cache_hits: usize,
    /// Requests that went past the cache.
    pub generations: usize,
    /// Provider invocations, retries included.
    pub invocations: usize,
    pub degraded: usize,
    pub suppressed: usize,
    pub cache_write_failures: usize,
}

impl ClientStats {
    pub fn merge(&mut self, other: &ClientStats) {
        self.cache_hits += other.cache_hits;
        self.generations += other.generations;
        self.invocations += other.invocations;
        self.degraded += other.degraded;
        self.suppressed += other.suppressed;
        self.cache_write_failures += other.cache_write_failures;
    }
}

/// Provider wrapped with caching, fallback, retry and circuit breaking.
///
/// Owns its breaker window; give every worker its own client.
pub struct ResilientClient<P> {
    provider: P,
    cache: Option<ResponseCache>,
    retry: RetryExecutor,
    monitor: ExceptionMonitor,
    stats: ClientStats,
}

impl<P: Provider> ResilientClient<P> {
    pub fn new(provider: P, config: &ClientConfig) -> Result<Self> {
        let cache = if config.cache_enabled {
            let cache = ResponseCache::open(&config.cache_dir).with_context(|| {
                format!("failed to create cache dir: {}", config.cache_dir.display())
            })?;
            Some(cache)
        } else {
            None
        };
        let monitor = ExceptionMonitor::new(config.monitor_config())?;
        Ok(Self::from_parts(
            provider,
            cache,
            RetryExecutor::new(config.backoff()),
            monitor,
        ))
    }

    pub fn from_parts(
        provider: P,
        cache: Option<ResponseCache>,
        retry: RetryExecutor,
        monitor: ExceptionMonitor,
    ) -> Self {
        Self {
            provider,
            cache,
            retry,
            monitor,
            stats: ClientStats::default(),
        }
    }

    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    pub fn monitor(&self) -> &ExceptionMonitor {
        &self.monitor
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    /// Produce the response text for `request`.
    ///
    /// `Ok(None)` means the call failed but the breaker suppressed it; the
    /// caller should skip this request. `Err` means the failure rate is past
    /// the threshold and the batch should stop.
    pub fn generate(&mut self, request: &Request) -> Result<Option<String>, GenerationError> {
        let fingerprint = match &self.cache {
            Some(cache) => {
                let fingerprint = match request.fingerprint() {
                    Ok(fp) => fp,
                    Err(e) => {
                        self.monitor.call(|| Err::<(), _>(e))?;
                        self.stats.suppressed += 1;
                        return Ok(None);
                    }
                };
                match cache.get(&fingerprint) {
                    Ok(Some(text)) => {
                        self.stats.cache_hits += 1;
                        log::debug!("cache hit {}", fingerprint.short());
                        return Ok(Some(text));
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!(
                        "cache read {} failed, treating as miss: {e}",
                        fingerprint.short()
                    ),
                }
                Some(fingerprint)
            }
            None => None,
        };

        self.stats.generations += 1;
        let mut invocations = 0;
        let provider = &self.provider;
        let retry = &self.retry;
        let outcome = self.monitor.call(|| {
            retry.call(|| {
                invocations += 1;
                with_fallback(|| invoke(provider, request))
            })
        });
        self.stats.invocations += invocations;

        let Some(completion) = outcome? else {
            self.stats.suppressed += 1;
            return Ok(None);
        };
        if completion.is_degraded() {
            self.stats.degraded += 1;
        }
        let text = match completion {
            Completion::Generated(text) if text.is_empty() => EMPTY_RESPONSE_PLACEHOLDER.to_string(),
            other => other.into_text(),
        };

        if let Some(fingerprint) = fingerprint {
            self.store(&fingerprint, &text);
        }
        Ok(Some(text))
    }

    /// Best-effort cache write; failures are logged and counted, never returned.
    fn store(&mut self, fingerprint: &Fingerprint, text: &str) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(e) = cache.put(fingerprint, text) {
            self.stats.cache_write_failures += 1;
            log::error!(
                "cache write {} failed, response will be regenerated next time: {e}",
                fingerprint.short()
            );
        }
    }
}

/// Upload every attachment, then invoke the provider.
fn invoke<P: Provider>(provider: &P, request: &Request) -> Result<String, GenerationError> {
    let files = request
        .attachments()
        .iter()
        .map(|attachment| {
            provider
                .upload(attachment)
                .map_err(|e| GenerationError::upload(attachment.name(), e))
        })
        .collect::<Result<Vec<_>, _>>()?;
    provider.invoke(request, &files)
}

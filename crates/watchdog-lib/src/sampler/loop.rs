//! Sampler loop
//!
//! Each iteration reloads the scale factors if the live configuration
//! changed, takes one sample, prepends it to the history, pushes the
//! whole history and then sleeps a jittered delay. A failed push is
//! logged and counted; the history and the schedule are left untouched.

use super::{JitterScheduler, MetricsSampler};
use crate::buffer::{RingBuffer, DEFAULT_HISTORY_CAPACITY};
use crate::config::ConfigWatcher;
use crate::models::Sample;
use crate::observability::{StructuredLogger, WatchdogMetrics};
use crate::transport::SampleTransport;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Scale factors the sampler picks up from the live configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerFactors {
    pub cpu_factor: f64,
    pub randomization_factor: f64,
}

impl Default for SamplerFactors {
    fn default() -> Self {
        Self {
            cpu_factor: 1.0,
            randomization_factor: 5.0,
        }
    }
}

/// What a single iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub sampled: bool,
    pub pushed: bool,
    pub history_len: usize,
}

/// Sampler loop that periodically samples and pushes
pub struct SamplerLoop {
    sampler: Box<dyn MetricsSampler>,
    transport: Arc<dyn SampleTransport>,
    watcher: Option<ConfigWatcher>,
    factors: SamplerFactors,
    history: RingBuffer<Sample>,
    scheduler: JitterScheduler,
    push_failures: u64,
    metrics: WatchdogMetrics,
    logger: StructuredLogger,
}

impl SamplerLoop {
    pub fn new(
        sampler: Box<dyn MetricsSampler>,
        transport: Arc<dyn SampleTransport>,
        factors: SamplerFactors,
    ) -> Self {
        Self {
            sampler,
            transport,
            watcher: None,
            factors,
            history: RingBuffer::new(DEFAULT_HISTORY_CAPACITY),
            scheduler: JitterScheduler::new(),
            push_failures: 0,
            metrics: WatchdogMetrics::new(),
            logger: StructuredLogger::new("sampler"),
        }
    }

    /// Run until a shutdown signal arrives
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            cpu_factor = self.factors.cpu_factor,
            randomization_factor = self.factors.randomization_factor,
            capacity = self.history.capacity(),
            "Starting sampler loop"
        );

        loop {
            tokio::select! {
                outcome = self.tick() => {
                    debug!(
                        sampled = outcome.sampled,
                        pushed = outcome.pushed,
                        history = outcome.history_len,
                        "Sampler iteration complete"
                    );
                }
                _ = shutdown.recv() => {
                    info!("Shutting down sampler loop");
                    break;
                }
            }

            let delay = self.scheduler.next_delay(self.factors.randomization_factor);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down sampler loop");
                    break;
                }
            }
        }
    }

    /// One iteration without the trailing sleep
    pub async fn tick(&mut self) -> TickOutcome {
        self.refresh_factors().await;

        let sample = match self.sampler.sample(self.factors.cpu_factor).await {
            Ok(sample) => sample,
            Err(e) => {
                warn!(error = %e, "Failed to sample host metrics");
                return TickOutcome {
                    sampled: false,
                    pushed: false,
                    history_len: self.history.len(),
                };
            }
        };

        if self.history.push_front(sample).is_some() {
            debug!("History full, evicted oldest sample");
        }
        self.metrics.set_ring_buffer_items(self.history.len());

        let pushed = match self.transport.push(&self.history.snapshot()).await {
            Ok(()) => true,
            Err(e) => {
                self.push_failures += 1;
                self.metrics.inc_sampler_push_failures();
                self.logger
                    .log_push_failure(&e.to_string(), self.push_failures, self.history.len());
                false
            }
        };

        TickOutcome {
            sampled: true,
            pushed,
            history_len: self.history.len(),
        }
    }

    async fn refresh_factors(&mut self) {
        let Some(watcher) = self.watcher.as_mut() else {
            return;
        };

        match watcher.poll().await {
            Ok(Some(config)) => {
                let next = SamplerFactors {
                    cpu_factor: config.cpu_factor,
                    randomization_factor: config.randomization_factor,
                };
                if next != self.factors {
                    info!(
                        cpu_factor = next.cpu_factor,
                        randomization_factor = next.randomization_factor,
                        "Sampler factors updated"
                    );
                    self.factors = next;
                }
            }
            Ok(None) => {}
            Err(e) => error!(
                path = %watcher.path().display(),
                error = %e,
                "Failed to reload sampler factors, keeping previous"
            ),
        }
    }

    pub fn factors(&self) -> SamplerFactors {
        self.factors
    }

    pub fn history(&self) -> &RingBuffer<Sample> {
        &self.history
    }

    pub fn push_failures(&self) -> u64 {
        self.push_failures
    }
}

/// Builder for creating the sampler loop
pub struct SamplerLoopBuilder {
    sampler: Option<Box<dyn MetricsSampler>>,
    transport: Option<Arc<dyn SampleTransport>>,
    watcher: Option<ConfigWatcher>,
    factors: SamplerFactors,
    capacity: usize,
    seed: Option<u64>,
}

impl SamplerLoopBuilder {
    pub fn new() -> Self {
        Self {
            sampler: None,
            transport: None,
            watcher: None,
            factors: SamplerFactors::default(),
            capacity: DEFAULT_HISTORY_CAPACITY,
            seed: None,
        }
    }

    pub fn sampler(mut self, sampler: Box<dyn MetricsSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn SampleTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Poll this watcher for factor changes before every sample
    pub fn config_watcher(mut self, watcher: ConfigWatcher) -> Self {
        self.watcher = Some(watcher);
        self
    }

    /// Starting factors, used until the live configuration says otherwise
    pub fn factors(mut self, factors: SamplerFactors) -> Self {
        self.factors = factors;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Seed the jitter source
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<SamplerLoop> {
        let sampler = self
            .sampler
            .ok_or_else(|| anyhow::anyhow!("Sampler is required"))?;
        let transport = self
            .transport
            .ok_or_else(|| anyhow::anyhow!("Transport is required"))?;

        let mut sampler_loop = SamplerLoop::new(sampler, transport, self.factors);
        sampler_loop.watcher = self.watcher;
        sampler_loop.history = RingBuffer::new(self.capacity);
        if let Some(seed) = self.seed {
            sampler_loop.scheduler = JitterScheduler::with_seed(seed);
        }
        Ok(sampler_loop)
    }
}

impl Default for SamplerLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

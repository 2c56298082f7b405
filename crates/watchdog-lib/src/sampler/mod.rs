//! Host metrics sampling
//!
//! The sampler reads host utilization, keeps a bounded newest-first
//! history and pushes that history to the collector after every sample,
//! sleeping a jittered delay in between.

mod host;
mod jitter;
mod r#loop;


pub use host::{HostSampler, CPU_MEASUREMENT_WINDOW};
pub use jitter::{jittered_delay_secs, JitterScheduler, JITTER_FLOOR};
pub use r#loop::{SamplerFactors, SamplerLoop, SamplerLoopBuilder, TickOutcome};

use crate::models::Sample;
use anyhow::Result;
use async_trait::async_trait;

/// Source of host samples
#[async_trait]
pub trait MetricsSampler: Send {
    /// Take one sample, scaling CPU utilization by `cpu_factor`
    async fn sample(&mut self, cpu_factor: f64) -> Result<Sample>;
}

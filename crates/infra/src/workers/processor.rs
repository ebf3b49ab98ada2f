//! The unit of work a worker runs for each job.

use std::time::Duration;

use async_trait::async_trait;

use jobflow_events::WorkMessage;

/// Message recorded on jobs failed by [`SimulatedProcessor`].
pub const SIMULATED_FAILURE_MESSAGE: &str = "Simulated processing failure";

/// Outcome of processing one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Success,
    /// Failed with an error message, recorded on the job.
    Failure(String),
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success)
    }
}

/// Executes the work behind a job.
///
/// Implementations may take arbitrarily long; the worker races them against
/// its shutdown signal and drops the future on shutdown.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &WorkMessage) -> JobResult;
}

#[async_trait]
impl<P> JobProcessor for std::sync::Arc<P>
where
    P: JobProcessor + ?Sized,
{
    async fn process(&self, job: &WorkMessage) -> JobResult {
        (**self).process(job).await
    }
}

/// Timing and failure behavior of [`SimulatedProcessor`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub min_processing: Duration,
    pub max_processing: Duration,
    /// Probability in `0.0..=1.0` that a job fails.
    pub failure_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            min_processing: Duration::from_secs(2),
            max_processing: Duration::from_secs(5),
            failure_rate: 0.2,
        }
    }
}

impl SimulationConfig {
    /// No delay, never fails.
    pub fn instant() -> Self {
        Self {
            min_processing: Duration::ZERO,
            max_processing: Duration::ZERO,
            failure_rate: 0.0,
        }
    }

    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate;
        self
    }

    pub fn with_processing_time(mut self, min: Duration, max: Duration) -> Self {
        self.min_processing = min;
        self.max_processing = max;
        self
    }
}

/// Sleeps for a random time, then fails at the configured rate.
#[derive(Debug, Clone, Default)]
pub struct SimulatedProcessor {
    config: SimulationConfig,
}

impl SimulatedProcessor {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    fn processing_time(&self) -> Duration {
        let min = self.config.min_processing.as_millis() as u64;
        let max = (self.config.max_processing.as_millis() as u64).max(min);
        Duration::from_millis(fastrand::u64(min..=max))
    }
}

#[async_trait]
impl JobProcessor for SimulatedProcessor {
    async fn process(&self, _job: &WorkMessage) -> JobResult {
        let delay = self.processing_time();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if fastrand::f64() < self.config.failure_rate {
            JobResult::Failure(SIMULATED_FAILURE_MESSAGE.to_string())
        } else {
            JobResult::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobflow_core::{Job, JobType};

    fn message() -> WorkMessage {
        WorkMessage::from_job(&Job::new("n", JobType::Process, None))
    }

    #[tokio::test]
    async fn zero_failure_rate_always_succeeds() {
        let p = SimulatedProcessor::new(SimulationConfig::instant());
        for _ in 0..50 {
            assert_eq!(p.process(&message()).await, JobResult::Success);
        }
    }

    #[tokio::test]
    async fn full_failure_rate_always_fails_with_fixed_message() {
        let p = SimulatedProcessor::new(SimulationConfig::instant().with_failure_rate(1.0));
        assert_eq!(
            p.process(&message()).await,
            JobResult::Failure(SIMULATED_FAILURE_MESSAGE.to_string())
        );
    }

    #[test]
    fn processing_time_stays_within_bounds() {
        let p = SimulatedProcessor::new(SimulationConfig::default().with_processing_time(
            Duration::from_millis(20),
            Duration::from_millis(30),
        ));
        for _ in 0..100 {
            let t = p.processing_time();
            assert!(t >= Duration::from_millis(20) && t <= Duration::from_millis(30));
        }
    }

    #[test]
    fn inverted_bounds_collapse_to_min() {
        let p = SimulatedProcessor::new(SimulationConfig::default().with_processing_time(
            Duration::from_millis(50),
            Duration::from_millis(10),
        ));
        assert_eq!(p.processing_time(), Duration::from_millis(50));
    }
}

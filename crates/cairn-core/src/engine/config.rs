use crate::engine::options::{FallbackMatrix, JobOptions};
use thiserror::Error;

pub const DEFAULT_DEDUP_RTOL: f64 = 1.0e-3;

pub const DEFAULT_FEEDBACK_TRIES: usize = 3;

// 30 degrees, in radians.
pub const DEFAULT_SCAN_INCREMENT: f64 = 30.0 * std::f64::consts::PI / 180.0;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub matrix: FallbackMatrix,
    pub feedback_tries: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { matrix: FallbackMatrix::default(), feedback_tries: DEFAULT_FEEDBACK_TRIES }
    }
}

impl RetryPolicy {
    pub fn new(matrix: FallbackMatrix) -> Self {
        Self { matrix, feedback_tries: DEFAULT_FEEDBACK_TRIES }
    }

    pub fn standard() -> Self {
        Self::new(FallbackMatrix::standard_optimization())
    }
}

#[derive(Debug, Clone)]
pub struct SamplingConfig {
    pub nsamp: usize,
    pub dedup_rtol: f64,
    pub base_options: JobOptions,
    pub retry: RetryPolicy,
}

#[derive(Debug, Default)]
pub struct SamplingConfigBuilder {
    nsamp: Option<usize>,
    dedup_rtol: Option<f64>,
    base_options: Option<JobOptions>,
    retry: Option<RetryPolicy>,
}

impl SamplingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nsamp(mut self, nsamp: usize) -> Self {
        self.nsamp = Some(nsamp);
        self
    }

    pub fn dedup_rtol(mut self, rtol: f64) -> Self {
        self.dedup_rtol = Some(rtol);
        self
    }

    pub fn base_options(mut self, options: JobOptions) -> Self {
        self.base_options = Some(options);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn build(self) -> Result<SamplingConfig, ConfigError> {
        Ok(SamplingConfig {
            nsamp: self.nsamp.ok_or(ConfigError::MissingParameter("nsamp"))?,
            dedup_rtol: self.dedup_rtol.unwrap_or(DEFAULT_DEDUP_RTOL),
            base_options: self.base_options.unwrap_or_default(),
            retry: self.retry.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    // Radians.
    pub increment: f64,
    pub base_options: JobOptions,
    pub retry: RetryPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            increment: DEFAULT_SCAN_INCREMENT,
            base_options: JobOptions::default(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RefineConfig {
    // Hartree. Samples above the ceiling are skipped.
    pub energy_ceiling: Option<f64>,
    pub base_options: JobOptions,
    pub retry: RetryPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_builder_requires_a_sample_count() {
        let err = SamplingConfigBuilder::new().build().unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("nsamp"));
    }

    #[test]
    fn unset_fields_fall_back_to_defaults() {
        let config = SamplingConfigBuilder::new().nsamp(12).build().unwrap();
        assert_eq!(config.nsamp, 12);
        assert_eq!(config.dedup_rtol, DEFAULT_DEDUP_RTOL);
        assert!(config.retry.matrix.is_empty());
    }

    #[test]
    fn explicit_fields_are_kept() {
        let config = SamplingConfigBuilder::new()
            .nsamp(3)
            .dedup_rtol(2.0e-2)
            .retry(RetryPolicy::standard())
            .build()
            .unwrap();
        assert_eq!(config.dedup_rtol, 2.0e-2);
        assert!(!config.retry.matrix.is_empty());
        assert_eq!(config.retry.feedback_tries, DEFAULT_FEEDBACK_TRIES);
    }
}

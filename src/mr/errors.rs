use std::result;
use thiserror::Error;

#[derive(Clone, Error, Debug, PartialEq, Eq)]
pub enum ReclaimError {
    #[error("Collect threshold must be at least one retired node")]
    ZeroThreshold,
    #[error("Collect threshold {threshold} exceeds the maximum of {max}")]
    ThresholdTooLarge { threshold: usize, max: usize },
}

pub type ReclaimResult<T> = result::Result<T, ReclaimError>;

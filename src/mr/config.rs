use super::errors::{ReclaimError, ReclaimResult};

/// Retired nodes that have to pile up before a leaving scope tries to free them.
pub const DEFAULT_COLLECT_THRESHOLD: usize = 64;
/// Upper bound for [CountedConfig::collect_threshold].
pub const MAX_COLLECT_THRESHOLD: usize = 1 << 20;

///
/// Tuning of the [Counted](super::Counted) backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountedConfig {
    /// Minimum number of retired nodes before a scope attempts a collection.
    ///
    /// A threshold of one frees retired nodes as soon as the last active
    /// scope leaves. Larger values batch the work at the cost of memory.
    pub collect_threshold: usize,
}

impl Default for CountedConfig {
    fn default() -> Self {
        CountedConfig {
            collect_threshold: DEFAULT_COLLECT_THRESHOLD,
        }
    }
}

impl CountedConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collect_threshold(mut self, threshold: usize) -> Self {
        self.collect_threshold = threshold;
        self
    }

    ///
    /// Check the configuration before a backend is built from it.
    pub fn validate(&self) -> ReclaimResult<()> {
        match self.collect_threshold {
            0 => Err(ReclaimError::ZeroThreshold),
            threshold if threshold > MAX_COLLECT_THRESHOLD => {
                Err(ReclaimError::ThresholdTooLarge {
                    threshold,
                    max: MAX_COLLECT_THRESHOLD,
                })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CountedConfig::default();
        assert_eq!(config.collect_threshold, DEFAULT_COLLECT_THRESHOLD);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let config = CountedConfig::new().with_collect_threshold(0);
        assert_eq!(config.validate(), Err(ReclaimError::ZeroThreshold));
    }

    #[test]
    fn oversized_threshold_is_rejected() {
        let config = CountedConfig::new().with_collect_threshold(MAX_COLLECT_THRESHOLD + 1);
        let err = config.validate().unwrap_err();
        assert_eq!(
            err,
            ReclaimError::ThresholdTooLarge {
                threshold: MAX_COLLECT_THRESHOLD + 1,
                max: MAX_COLLECT_THRESHOLD,
            }
        );
        assert_eq!(
            err.to_string(),
            format!(
                "Collect threshold {} exceeds the maximum of {}",
                MAX_COLLECT_THRESHOLD + 1,
                MAX_COLLECT_THRESHOLD
            )
        );
    }
}

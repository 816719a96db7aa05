//! Engine configuration.

use chrono::{FixedOffset, Local, Offset};

/// Default page size for event listing.
pub const DEFAULT_MAX_RESULTS: u32 = 250;

/// Sync engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Page size requested from the remote event listing.
    pub max_results: u32,

    /// Offset used to derive local dates and times-of-day from remote
    /// timestamps, and to build timestamps for pushed events.
    pub utc_offset: FixedOffset,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            utc_offset: Local::now().offset().fix(),
        }
    }
}

impl EngineConfig {
    /// Builder: set page size (clamped to at least 1).
    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    /// Builder: set the UTC offset.
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_results, 250);
    }

    #[test]
    fn builder() {
        let offset = FixedOffset::east_opt(-5 * 3600).unwrap();
        let config = EngineConfig::default()
            .with_max_results(0)
            .with_utc_offset(offset);
        assert_eq!(config.max_results, 1);
        assert_eq!(config.utc_offset, offset);
    }
}

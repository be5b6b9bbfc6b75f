//! Chronicle configuration.

use crate::policy::ContentScreen;
use crate::summary::DEFAULT_CHANGE_LOG_LIMIT;
use crate::timeline::{DEFAULT_CONSEQUENCE_LIMIT, DEFAULT_KEEP_FULL_DETAIL};
use std::path::PathBuf;

/// Environment variable overriding the save directory.
pub const SAVE_DIR_ENV: &str = "CHRONICLE_SAVE_DIR";
/// Environment variable overriding the number of full-detail events per phase.
pub const KEEP_FULL_DETAIL_ENV: &str = "CHRONICLE_KEEP_FULL_DETAIL";

/// Tunables for the write path and persistence.
#[derive(Debug, Clone)]
pub struct ChronicleConfig {
    /// Newest events per phase kept at full detail.
    pub keep_full_detail: usize,

    /// Length of each character's recent-change log.
    pub change_log_limit: usize,

    /// Consequence lines kept in a phase digest.
    pub summary_consequence_limit: usize,

    /// Where saves are written.
    pub save_dir: PathBuf,

    /// Keyword screen used to escalate unflagged prose in SFW mode.
    pub screen: ContentScreen,
}

impl Default for ChronicleConfig {
    fn default() -> Self {
        Self {
            keep_full_detail: DEFAULT_KEEP_FULL_DETAIL,
            change_log_limit: DEFAULT_CHANGE_LOG_LIMIT,
            summary_consequence_limit: DEFAULT_CONSEQUENCE_LIMIT,
            save_dir: PathBuf::from("data/saves"),
            screen: ContentScreen::default(),
        }
    }
}

impl ChronicleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `CHRONICLE_SAVE_DIR` and `CHRONICLE_KEEP_FULL_DETAIL`.
    ///
    /// Unparsable numbers are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var(SAVE_DIR_ENV) {
            if !dir.trim().is_empty() {
                config.save_dir = PathBuf::from(dir);
            }
        }

        if let Ok(raw) = std::env::var(KEEP_FULL_DETAIL_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(keep) if keep > 0 => config.keep_full_detail = keep,
                _ => tracing::warn!(
                    value = %raw,
                    "ignoring invalid {}",
                    KEEP_FULL_DETAIL_ENV
                ),
            }
        }

        config
    }

    /// At least one event per phase stays at full detail.
    pub fn with_keep_full_detail(mut self, keep: usize) -> Self {
        self.keep_full_detail = keep.max(1);
        self
    }

    pub fn with_change_log_limit(mut self, limit: usize) -> Self {
        self.change_log_limit = limit;
        self
    }

    pub fn with_summary_consequence_limit(mut self, limit: usize) -> Self {
        self.summary_consequence_limit = limit;
        self
    }

    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = dir.into();
        self
    }

    pub fn with_screen(mut self, screen: ContentScreen) -> Self {
        self.screen = screen;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChronicleConfig::new();
        assert_eq!(config.keep_full_detail, 50);
        assert_eq!(config.change_log_limit, 10);
        assert_eq!(config.save_dir, PathBuf::from("data/saves"));
    }

    #[test]
    fn test_builder() {
        let config = ChronicleConfig::new()
            .with_keep_full_detail(5)
            .with_change_log_limit(2)
            .with_save_dir("/tmp/saves");
        assert_eq!(config.keep_full_detail, 5);
        assert_eq!(config.change_log_limit, 2);
        assert_eq!(config.save_dir, PathBuf::from("/tmp/saves"));
    }

    #[test]
    fn test_keep_full_detail_at_least_one() {
        assert_eq!(ChronicleConfig::new().with_keep_full_detail(0).keep_full_detail, 1);
    }
}

//! Diff configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::resolver::RENAME_SIMILARITY_THRESHOLD;

/// How the generated statements will be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffMode {
    /// Statements are written to a migration file.
    #[default]
    Generate,
    /// Statements are applied directly to a database. View definition
    /// changes are not re-applied in this mode.
    Push,
}

/// Options for a diff run.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffConfig {
    /// Generate or push.
    pub mode: DiffMode,
    /// Separate statements with breakpoints in migration files.
    pub breakpoints: bool,
    /// Directory holding migrations, snapshots and the journal.
    pub out_dir: PathBuf,
    /// Explicit `from->to` renames.
    pub renames: Vec<String>,
    /// Detect renames by name similarity.
    pub detect_renames: bool,
    /// Similarity threshold for detected renames.
    pub rename_threshold: f64,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            mode: DiffMode::Generate,
            breakpoints: true,
            out_dir: PathBuf::from("migrations"),
            renames: Vec::new(),
            detect_renames: false,
            rename_threshold: RENAME_SIMILARITY_THRESHOLD,
        }
    }
}

impl DiffConfig {
    /// Creates a default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the mode.
    #[must_use]
    pub fn mode(mut self, mode: DiffMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enables or disables statement breakpoints.
    #[must_use]
    pub fn breakpoints(mut self, breakpoints: bool) -> Self {
        self.breakpoints = breakpoints;
        self
    }

    /// Sets the output directory.
    #[must_use]
    pub fn out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = out_dir.into();
        self
    }

    /// Adds an explicit rename.
    #[must_use]
    pub fn rename(mut self, rule: impl Into<String>) -> Self {
        self.renames.push(rule.into());
        self
    }

    /// Enables rename detection with the given threshold.
    #[must_use]
    pub fn detect_renames(mut self, threshold: f64) -> Self {
        self.detect_renames = true;
        self.rename_threshold = threshold;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = DiffConfig::new()
            .mode(DiffMode::Push)
            .breakpoints(false)
            .out_dir("drizzle")
            .rename("users->accounts")
            .detect_renames(0.6);

        assert_eq!(config.mode, DiffMode::Push);
        assert!(!config.breakpoints);
        assert_eq!(config.out_dir, PathBuf::from("drizzle"));
        assert_eq!(config.renames, vec!["users->accounts"]);
        assert!(config.detect_renames);
        assert!((config.rename_threshold - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_defaults() {
        let config = DiffConfig::default();
        assert_eq!(config.mode, DiffMode::Generate);
        assert!(config.breakpoints);
        assert!(!config.detect_renames);
    }
}

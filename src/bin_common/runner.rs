//! Binary runner utilities
//!
//! Provides a standardized way to run binaries with banners,
//! a bounded number of rounds and Ctrl+C handling.

use std::time::Duration;
use tracing::info;

/// Configuration for running a binary application
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Name of the binary (for logging)
    pub name: String,
    /// Number of rounds to run
    pub rounds: u32,
    /// Pause between rounds
    pub round_interval_secs: Option<f64>,
}

impl RunConfig {
    /// Create a new run configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rounds: 1,
            round_interval_secs: None,
        }
    }

    /// Set number of rounds
    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds.max(1);
        self
    }

    /// Set pause between rounds
    pub fn with_round_interval(mut self, secs: f64) -> Self {
        self.round_interval_secs = Some(secs);
        self
    }

    pub fn round_interval(&self) -> Option<Duration> {
        self.round_interval_secs.map(Duration::from_secs_f64)
    }
}

/// Trait for binary applications
pub trait BinaryRunner {
    /// Run the application
    async fn run(&mut self) -> anyhow::Result<()>;

    /// Get the run configuration
    fn config(&self) -> &RunConfig;

    /// Summary line printed in the shutdown banner
    fn summary(&self) -> Option<String> {
        None
    }

    /// Print startup banner
    fn print_banner(&self) {
        let config = self.config();
        info!("");
        info!("========================================");
        info!("Starting {} ({} rounds)", config.name, config.rounds);
        info!("Press Ctrl+C to stop");
        info!("========================================");
        info!("");
    }

    /// Print shutdown banner
    fn print_shutdown(&self, stats: Option<&str>) {
        let config = self.config();
        info!("");
        info!("========================================");
        info!("{} stopped gracefully", config.name);
        if let Some(stats) = stats {
            info!("{}", stats);
        }
        info!("========================================");
    }

    /// Execute the binary with banners around `run`
    async fn execute(&mut self) -> anyhow::Result<()> {
        self.print_banner();
        let result = self.run().await;
        let summary = self.summary();
        self.print_shutdown(summary.as_deref());
        result
    }
}

/// Sleep that Ctrl+C cuts short
///
/// # Returns
/// `true` if the full duration elapsed, `false` on Ctrl+C
pub async fn interruptible_sleep(duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_builder() {
        let config = RunConfig::new("test-binary")
            .with_rounds(3)
            .with_round_interval(0.5);

        assert_eq!(config.name, "test-binary");
        assert_eq!(config.rounds, 3);
        assert_eq!(config.round_interval(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_default_config() {
        let config = RunConfig::new("default").with_rounds(0);
        assert_eq!(config.rounds, 1);
        assert_eq!(config.round_interval_secs, None);
    }

    #[tokio::test]
    async fn test_interruptible_sleep_completes() {
        assert!(interruptible_sleep(Duration::from_millis(5)).await);
    }
}

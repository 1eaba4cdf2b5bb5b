//! Configuration for the reachability analysis.

/// Configuration for an [`AnalysisSession`](crate::analysis::AnalysisSession).
///
/// Controls the precision and resource limits of the per-method dataflow analysis and
/// which optional checks run after a method converges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Maximum number of constant indices tracked per array (default: 32).
    ///
    /// Stores to further indices are dropped and read back as unknown.
    pub max_tracked_array_values: usize,

    /// Maximum block visits per method before the fixpoint iteration is abandoned
    /// (default: 100 000).
    pub max_iterations: usize,

    /// Analyze method batches on the `rayon` thread pool (default: true).
    pub parallel: bool,

    /// Report stack underflows and similar inconsistencies as informational diagnostics
    /// (default: true).
    pub report_invalid_il: bool,

    /// Check p/invoke signatures for types that may be marshalled as COM interfaces
    /// (default: true).
    pub com_interop_checks: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_tracked_array_values: 32,
            max_iterations: 100_000,
            parallel: true,
            report_invalid_il: true,
            com_interop_checks: true,
        }
    }
}

impl AnalysisConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration for single-threaded, reproducible runs.
    ///
    /// Results do not depend on this setting; it only avoids the thread pool, which is
    /// useful when the host is not `Sync`-friendly or when debugging.
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    /// Sets the per-array limit of tracked indices.
    #[must_use]
    pub fn with_max_tracked_array_values(mut self, max: usize) -> Self {
        self.max_tracked_array_values = max;
        self
    }

    /// Sets the per-method block visit budget.
    #[must_use]
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Enables or disables parallel batch analysis.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Enables or disables invalid-IL diagnostics.
    #[must_use]
    pub fn with_invalid_il_reports(mut self, enabled: bool) -> Self {
        self.report_invalid_il = enabled;
        self
    }

    /// Enables or disables the COM interop heuristic.
    #[must_use]
    pub fn with_com_interop_checks(mut self, enabled: bool) -> Self {
        self.com_interop_checks = enabled;
        self
    }
}

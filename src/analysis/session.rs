//! Analysis sessions.
//!
//! An [`AnalysisSession`] ties a host to one [`AnalysisConfig`] and one set of
//! [`AnalysisCaches`], and analyzes methods against them. Each method is analyzed on its
//! own: build the control-flow graph, iterate the scanner to a fixpoint, then apply the
//! recorded patterns. Marks and diagnostics flow to the host as patterns are applied.
//!
//! # Usage
//!
//! ```rust,ignore
//! use dotreach::analysis::{AnalysisConfig, AnalysisSession};
//!
//! let session = AnalysisSession::new(&host, AnalysisConfig::default());
//! for result in session.analyze_methods(&entry_points) {
//!     let analysis = result?;
//!     println!("{} returns {}", analysis.method, analysis.return_value);
//! }
//! ```

use log::debug;
use rayon::prelude::*;

use crate::{
    analysis::{
        caches::AnalysisCaches,
        cfg::ControlFlowGraph,
        config::AnalysisConfig,
        context::MethodContext,
        dataflow::{AnalysisResults, DataFlowSolver, DataflowState},
        scanner::MethodScanner,
        value::MultiValue,
    },
    host::AnalysisHost,
    metadata::{signatures::TypeSignature, token::Token},
    Error, Result,
};

/// How the analysis of a method ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// The fixpoint was reached and all patterns were applied
    Converged {
        /// Block visits until the fixpoint
        iterations: usize,
    },
    /// The method could not be analyzed; its return value is unknown
    Fallback {
        /// Why the method could not be analyzed
        reason: String,
    },
}

/// The result of analyzing one method.
#[derive(Debug, Clone)]
pub struct MethodAnalysis {
    /// The analyzed method
    pub method: Token,
    /// Everything the method may return; empty for `void` methods
    pub return_value: MultiValue,
    /// How the analysis ended
    pub outcome: AnalysisOutcome,
    /// Number of applied patterns
    pub patterns: usize,
    /// Block boundary states, present when the analysis converged
    pub states: Option<AnalysisResults<DataflowState>>,
}

impl MethodAnalysis {
    fn fallback(method: Token, reason: String) -> Self {
        MethodAnalysis {
            method,
            return_value: MultiValue::unknown(),
            outcome: AnalysisOutcome::Fallback { reason },
            patterns: 0,
            states: None,
        }
    }

    /// Returns `true` if the analysis reached its fixpoint.
    #[must_use]
    pub fn converged(&self) -> bool {
        matches!(self.outcome, AnalysisOutcome::Converged { .. })
    }
}

/// A run of the analysis against one host.
pub struct AnalysisSession<'h, H: ?Sized> {
    host: &'h H,
    config: AnalysisConfig,
    caches: AnalysisCaches,
}

impl<'h, H: AnalysisHost + ?Sized> AnalysisSession<'h, H> {
    /// Creates a session with empty caches.
    pub fn new(host: &'h H, config: AnalysisConfig) -> Self {
        AnalysisSession {
            host,
            config,
            caches: AnalysisCaches::new(),
        }
    }

    /// The host.
    pub fn host(&self) -> &'h H {
        self.host
    }

    /// The session configuration.
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// The session memo tables.
    pub fn caches(&self) -> &AnalysisCaches {
        &self.caches
    }

    /// Analyzes a method definition without generic instantiation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBranchTarget`], [`Error::IterationLimit`] or
    /// [`Error::InternalError`]. Methods that cannot be resolved or have no body are not
    /// errors; they produce a [`AnalysisOutcome::Fallback`] result.
    pub fn analyze_method(&self, method: Token) -> Result<MethodAnalysis> {
        self.analyze_instantiation(method, Vec::new(), Vec::new())
    }

    /// Analyzes a method definition under a generic instantiation.
    ///
    /// # Arguments
    ///
    /// * `method` - The method definition token
    /// * `type_args` - Arguments for the declaring type's generic parameters
    /// * `method_args` - Arguments for the method's own generic parameters
    ///
    /// # Errors
    ///
    /// See [`AnalysisSession::analyze_method`].
    pub fn analyze_instantiation(
        &self,
        method: Token,
        type_args: Vec<TypeSignature>,
        method_args: Vec<TypeSignature>,
    ) -> Result<MethodAnalysis> {
        debug!("analyzing {method}");
        match self.run(method, type_args, method_args) {
            Err(error) if error.is_fallback() => {
                debug!("{method} falls back to unknown: {error}");
                Ok(MethodAnalysis::fallback(method, error.to_string()))
            }
            other => other,
        }
    }

    fn run(
        &self,
        token: Token,
        type_args: Vec<TypeSignature>,
        method_args: Vec<TypeSignature>,
    ) -> Result<MethodAnalysis> {
        let method = self
            .host
            .resolve_method_definition(token)
            .ok_or(Error::MethodNotFound(token))?;
        let body = self
            .host
            .method_body(method.token)
            .ok_or(Error::MissingMethodBody(token))?;
        let cfg = ControlFlowGraph::build(&body, method.token)?;

        let ctx = MethodContext {
            host: self.host,
            caches: &self.caches,
            config: &self.config,
            method,
            type_args,
            method_args,
        };
        let scanner = MethodScanner::new(&ctx, &body, &cfg);
        let mut solver = DataFlowSolver::new(scanner, self.config.max_iterations);
        let states = solver.solve(&cfg)?;
        let scanner = solver.into_analysis();
        let patterns = scanner.apply_patterns();
        debug!(
            "{token} converged after {} block visits, {patterns} patterns",
            states.iterations
        );

        Ok(MethodAnalysis {
            method: token,
            return_value: scanner.return_value(),
            outcome: AnalysisOutcome::Converged {
                iterations: states.iterations,
            },
            patterns,
            states: Some(states),
        })
    }
}

impl<H: AnalysisHost + Sync + ?Sized> AnalysisSession<'_, H> {
    /// Analyzes a batch of method definitions.
    ///
    /// Methods are analyzed on the `rayon` thread pool when
    /// [`AnalysisConfig::parallel`] is set. Results are in input order either way, and
    /// the marks and diagnostics the host receives are the same.
    pub fn analyze_methods(&self, methods: &[Token]) -> Vec<Result<MethodAnalysis>> {
        if self.config.parallel {
            methods
                .par_iter()
                .map(|method| self.analyze_method(*method))
                .collect()
        } else {
            methods
                .iter()
                .map(|method| self.analyze_method(*method))
                .collect()
        }
    }
}

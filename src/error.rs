use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors fall into two groups. Per-method conditions ([`Error::EmptyMethodBody`],
/// [`Error::MethodNotFound`], [`Error::MissingMethodBody`]) make a single method unanalyzable;
/// the session degrades that method to a fully unknown result and keeps going
/// (see [`Error::is_fallback`]). Everything else aborts the run: it either means the input is
/// structurally broken in a way the scanner cannot recover from, or the analysis itself has
/// violated one of its own invariants.
///
/// Unrecognized reflection patterns and invalid stack usage are *not* errors. They are
/// reported as diagnostics through the host and the analysis continues with `Unknown` values.
///
/// # Examples
///
/// ```rust,ignore
/// use dotreach::{Error, analysis::AnalysisSession};
///
/// match session.analyze_method(token) {
///     Ok(result) => println!("returns {:?}", result.return_value),
///     Err(Error::IterationLimit(limit)) => eprintln!("no fixpoint after {limit} visits"),
///     Err(e) => eprintln!("analysis failed: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Caller-constructed input is inconsistent.
    ///
    /// Raised for example when a method body builder references a label that was never
    /// placed. The error includes the source location where the malformation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The method body has no instructions, so no control-flow graph can be built.
    #[error("Method {0} has an empty body")]
    EmptyMethodBody(Token),

    /// The method token could not be resolved by the host.
    #[error("Method {0} could not be resolved")]
    MethodNotFound(Token),

    /// The method resolved but has no IL body (abstract, extern, runtime-implemented).
    #[error("Method {0} has no IL body")]
    MissingMethodBody(Token),

    /// A branch targets an offset that is not the start of an instruction.
    ///
    /// The scanner cannot process a body whose control transfers land mid-instruction,
    /// so this aborts the run instead of degrading the method.
    #[error("Branch at IL_{offset:04x} targets IL_{target:04x}, which is not an instruction boundary")]
    InvalidBranchTarget {
        /// Offset of the branching instruction
        offset: u32,
        /// The unresolved target offset
        target: u32,
    },

    /// The fixpoint solver exceeded its block visit budget.
    ///
    /// A terminating analysis never hits this; reaching it indicates a non-monotone
    /// transfer function. The associated value is the budget that was exhausted.
    #[error("Dataflow analysis did not converge within {0} block visits")]
    IterationLimit(usize),

    /// An internal invariant of the analysis was violated.
    ///
    /// For example, an intrinsic produced a return value that does not satisfy the
    /// annotation declared on the method it models.
    #[error("Internal error: {0}")]
    InternalError(String),

    /// Control-flow graph construction failed for a reason other than the above.
    #[error("{0}")]
    GraphError(String),
}

impl Error {
    /// Returns `true` if this error only invalidates the method being analyzed.
    ///
    /// Such methods are treated as producing fully unknown values instead of aborting
    /// the analysis run.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            Error::EmptyMethodBody(_) | Error::MethodNotFound(_) | Error::MissingMethodBody(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_classification() {
        let token = Token::new(0x0600_0001);
        assert!(Error::EmptyMethodBody(token).is_fallback());
        assert!(Error::MissingMethodBody(token).is_fallback());
        assert!(Error::MethodNotFound(token).is_fallback());
        assert!(!Error::IterationLimit(10).is_fallback());
        assert!(!Error::InternalError("x".into()).is_fallback());
        assert!(!Error::InvalidBranchTarget {
            offset: 0,
            target: 3
        }
        .is_fallback());
    }

    #[test]
    fn malformed_macro_records_location() {
        let err = malformed_error!("label {} undefined", 3);
        match err {
            Error::Malformed { message, file, .. } => {
                assert_eq!(message, "label 3 undefined");
                assert!(file.ends_with("error.rs"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

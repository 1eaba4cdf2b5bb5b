//! Reachability and dataflow analysis of CIL method bodies.
//!
//! This module answers one question per method: which types and members may be accessed
//! through reflection, and which reflection patterns cannot be understood statically.
//! It is built from layers that each stand on their own:
//!
//! - [`cfg`] - Control-flow graphs with entry and exit sentinels and handler entries
//! - [`dataflow`] - Lattices, a forward fixpoint solver and the scanner's state model
//! - [`value`] - Abstract values and flat value sets
//! - [`requirements`] - Member categories, member selection and requirement checks
//! - [`intrinsics`] - Models of reflection APIs and the COM interop check
//!
//! [`AnalysisSession`] puts them together: for each method it builds the graph, runs the
//! scanner to a fixpoint, then applies what the scanner recorded, marking members and
//! reporting diagnostics through the [`AnalysisHost`](crate::host::AnalysisHost).
//!
//! # Usage
//!
//! ```rust,ignore
//! use dotreach::analysis::{AnalysisConfig, AnalysisSession};
//! use dotreach::host::RecordingHost;
//!
//! let host = RecordingHost::new(&store);
//! let session = AnalysisSession::new(&host, AnalysisConfig::default());
//! let result = session.analyze_method(entry_point)?;
//!
//! for member in host.marks.members() {
//!     println!("keep {member:?}");
//! }
//! for diagnostic in host.diagnostics.sorted() {
//!     println!("{diagnostic}");
//! }
//! ```

pub mod cfg;
pub mod dataflow;
pub mod intrinsics;
pub mod requirements;
pub mod value;

mod caches;
mod config;
mod context;
mod scanner;
mod session;

pub use caches::{AnalysisCaches, MethodAnnotations};
pub use cfg::{BasicBlock, BlockId, BlockKind, CfgEdgeKind, ControlFlowGraph};
pub use config::AnalysisConfig;
pub use context::MethodContext;
pub use dataflow::{
    AnalysisResults, DataFlowAnalysis, DataFlowSolver, DataflowState, Lattice, LocalKey,
    LocalsMap, MeetSemiLattice, OperandStack,
};
pub use intrinsics::IntrinsicId;
pub use requirements::{MemberTypes, RequirementTarget};
pub use scanner::{MethodScanner, Pattern, PatternLog};
pub use session::{AnalysisOutcome, AnalysisSession, MethodAnalysis};
pub use value::{AbstractValue, ArrayValue, MultiValue};

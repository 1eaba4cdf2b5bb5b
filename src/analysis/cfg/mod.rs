//! Control flow graph construction for CIL method bodies.
//!
//! The graph is built directly from the decoded instruction list and the exception handler
//! table. Every graph has an entry and an exit sentinel; real blocks are numbered between
//! them in offset order, which keeps block ids stable and iteration deterministic.
//!
//! # Examples
//!
//! ```rust,ignore
//! use dotreach::analysis::ControlFlowGraph;
//!
//! let cfg = ControlFlowGraph::build(&body, method_token)?;
//! for block in cfg.reverse_postorder() {
//!     println!("{block}: {:?}", cfg.block(block).map(|b| b.start_offset));
//! }
//! ```

mod block;
mod edge;
mod graph;

pub use block::{BasicBlock, BlockId, BlockKind};
pub use edge::CfgEdgeKind;
pub use graph::ControlFlowGraph;

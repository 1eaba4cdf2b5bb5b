//! Dataflow analysis framework trait and results.
//!
//! An analysis implements [`DataFlowAnalysis`] to describe its lattice, its boundary
//! conditions and its per-block transfer function; the
//! [`DataFlowSolver`](super::DataFlowSolver) iterates it to a fixpoint. Only forward
//! analyses are supported.

use crate::{
    analysis::{
        cfg::{BasicBlock, BlockId, ControlFlowGraph},
        dataflow::lattice::Lattice,
    },
    Result,
};

/// A forward dataflow analysis over a [`ControlFlowGraph`].
///
/// # Examples
///
/// ```rust,ignore
/// use dotreach::analysis::{DataFlowAnalysis, DataFlowSolver};
///
/// struct Reachability;
///
/// impl DataFlowAnalysis for Reachability {
///     type Lattice = Reached;
///
///     fn boundary(&self, cfg: &ControlFlowGraph) -> Vec<(BlockId, Reached)> {
///         vec![(cfg.entry(), Reached(true))]
///     }
///
///     fn transfer(&mut self, _block: &BasicBlock, input: &Reached) -> Result<Reached> {
///         Ok(input.clone())
///     }
/// }
/// ```
pub trait DataFlowAnalysis {
    /// The abstract state at block boundaries.
    type Lattice: Lattice;

    /// States injected at graph roots: the entry block and, for analyses that model them,
    /// exception handler entries.
    ///
    /// A boundary state is met with whatever flows in from predecessors.
    fn boundary(&self, cfg: &ControlFlowGraph) -> Vec<(BlockId, Self::Lattice)>;

    /// Computes the state after `block` from the state before it.
    ///
    /// The solver calls this once per visit; the analysis may keep per-instruction
    /// observations as long as a later visit of the same block replaces those of an
    /// earlier one.
    ///
    /// # Errors
    ///
    /// Any error aborts the fixpoint iteration and is returned by the solver.
    fn transfer(&mut self, block: &BasicBlock, input: &Self::Lattice) -> Result<Self::Lattice>;
}

/// Block boundary states computed by the solver.
#[derive(Debug, Clone)]
pub struct AnalysisResults<L> {
    /// State before each block, indexed by block id
    pub in_states: Vec<L>,
    /// State after each block, indexed by block id
    pub out_states: Vec<L>,
    /// Number of block visits until the fixpoint was reached
    pub iterations: usize,
}

impl<L> AnalysisResults<L> {
    /// State before `block`.
    #[must_use]
    pub fn in_state(&self, block: BlockId) -> Option<&L> {
        self.in_states.get(block.index())
    }

    /// State after `block`.
    #[must_use]
    pub fn out_state(&self, block: BlockId) -> Option<&L> {
        self.out_states.get(block.index())
    }

    /// Number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.in_states.len()
    }
}

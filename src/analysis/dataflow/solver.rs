//! Worklist-based forward dataflow solver.
//!
//! # Algorithm
//!
//! 1. Every block starts with the top state.
//! 2. The worklist is seeded with the blocks reachable from the entry in reverse
//!    postorder, followed by the remaining blocks in id order.
//! 3. A block's input is the meet of its boundary state (if any) and the outputs of its
//!    predecessors. An input that is still top means nothing has reached the block yet,
//!    and the block is skipped.
//! 4. When a block's output changes, its successors are queued again.
//!
//! The loop ends when the worklist drains. The number of block visits is bounded; running
//! out of budget is an error rather than a silently partial result.

use std::collections::VecDeque;

use log::trace;

use crate::{
    analysis::{
        cfg::{BlockId, ControlFlowGraph},
        dataflow::{
            framework::{AnalysisResults, DataFlowAnalysis},
            lattice::{Lattice, MeetSemiLattice},
        },
    },
    Error, Result,
};

/// Iterates a [`DataFlowAnalysis`] to its fixpoint.
///
/// # Usage
///
/// ```rust,ignore
/// use dotreach::analysis::DataFlowSolver;
///
/// let mut solver = DataFlowSolver::new(analysis, 10_000);
/// let results = solver.solve(&cfg)?;
/// let analysis = solver.into_analysis();
/// ```
pub struct DataFlowSolver<A: DataFlowAnalysis> {
    analysis: A,
    max_iterations: usize,
}

impl<A: DataFlowAnalysis> DataFlowSolver<A> {
    /// Creates a solver allowing at most `max_iterations` block visits.
    #[must_use]
    pub fn new(analysis: A, max_iterations: usize) -> Self {
        Self {
            analysis,
            max_iterations,
        }
    }

    /// The analysis being solved.
    #[must_use]
    pub fn analysis(&self) -> &A {
        &self.analysis
    }

    /// Consumes the solver, returning the analysis with whatever it recorded.
    pub fn into_analysis(self) -> A {
        self.analysis
    }

    /// Runs the analysis to a fixpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IterationLimit`] if the fixpoint is not reached within the visit
    /// budget, and propagates any error of the transfer function.
    pub fn solve(&mut self, cfg: &ControlFlowGraph) -> Result<AnalysisResults<A::Lattice>> {
        let block_count = cfg.block_count();
        let mut in_states = vec![A::Lattice::top(); block_count];
        let mut out_states = vec![A::Lattice::top(); block_count];

        let mut boundary: Vec<Option<A::Lattice>> = vec![None; block_count];
        for (block, state) in self.analysis.boundary(cfg) {
            if let Some(slot) = boundary.get_mut(block.index()) {
                *slot = Some(match slot.take() {
                    Some(existing) => existing.meet(&state),
                    None => state,
                });
            }
        }

        let mut worklist = VecDeque::with_capacity(block_count);
        let mut queued = vec![false; block_count];
        for block in cfg.reverse_postorder() {
            worklist.push_back(block);
            queued[block.index()] = true;
        }
        for index in 0..block_count {
            if !queued[index] {
                worklist.push_back(BlockId::new(index));
                queued[index] = true;
            }
        }

        let mut iterations = 0;
        while let Some(block_id) = worklist.pop_front() {
            let index = block_id.index();
            queued[index] = false;

            iterations += 1;
            if iterations > self.max_iterations {
                return Err(Error::IterationLimit(self.max_iterations));
            }

            let mut input = boundary[index].clone().unwrap_or_else(A::Lattice::top);
            for pred in cfg.predecessors(block_id) {
                input = input.meet(&out_states[pred.index()]);
            }
            if input.is_top() {
                continue;
            }

            let Some(block) = cfg.block(block_id) else {
                continue;
            };
            let output = self.analysis.transfer(block, &input)?;
            in_states[index] = input;

            if output != out_states[index] {
                out_states[index] = output;
                for succ in cfg.successors(block_id) {
                    if !queued[succ.index()] {
                        queued[succ.index()] = true;
                        worklist.push_back(succ);
                    }
                }
            }
        }

        trace!("fixpoint reached after {iterations} block visits");
        Ok(AnalysisResults {
            in_states,
            out_states,
            iterations,
        })
    }
}

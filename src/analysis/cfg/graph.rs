//! Control flow graph construction.

use std::{collections::BTreeMap, fmt::Write};

use crate::{
    analysis::cfg::{BasicBlock, BlockId, BlockKind, CfgEdgeKind},
    assembly::FlowType,
    metadata::{
        body::{HandlerKind, MethodBody},
        token::Token,
    },
    utils::graph::DirectedGraph,
    Error, Result,
};

/// The control flow graph of one method body.
///
/// Block 0 is always the entry sentinel and the last block is always the exit sentinel;
/// the real blocks sit between them in offset order. The graph is immutable once built.
///
/// Exception flow is not modelled as edges. Blocks that start a handler or filter are
/// listed in [`ControlFlowGraph::handler_entries`] so that an analysis can seed them with
/// a conservative state.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    graph: DirectedGraph<BasicBlock, CfgEdgeKind>,
    entry: BlockId,
    exit: BlockId,
    handler_entries: Vec<(BlockId, HandlerKind)>,
    offsets: BTreeMap<u32, BlockId>,
}

impl ControlFlowGraph {
    /// Builds the graph for `body`.
    ///
    /// Leaders are the first instruction, every branch and switch target, every handler and
    /// filter start, and the instruction following any block-ending instruction.
    ///
    /// # Arguments
    ///
    /// * `body` - The method body
    /// * `method` - Token of the method, used for error reporting
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyMethodBody`] if the body has no instructions and
    /// [`Error::InvalidBranchTarget`] if a branch or handler start does not land on an
    /// instruction boundary.
    pub fn build(body: &MethodBody, method: Token) -> Result<Self> {
        let instructions = &body.instructions;
        if instructions.is_empty() {
            return Err(Error::EmptyMethodBody(method));
        }

        let mut leaders = vec![false; instructions.len()];
        leaders[0] = true;
        for (index, instr) in instructions.iter().enumerate() {
            for target in instr.branch_targets() {
                let target_index = body.instruction_index(target).ok_or(
                    Error::InvalidBranchTarget {
                        offset: instr.offset,
                        target,
                    },
                )?;
                leaders[target_index] = true;
            }
            if instr.opcode.flow_type().ends_block() && index + 1 < instructions.len() {
                leaders[index + 1] = true;
            }
        }

        let mut handler_starts: BTreeMap<u32, HandlerKind> = BTreeMap::new();
        for handler in &body.exception_handlers {
            for (offset, kind) in handler.entry_points() {
                let index = body
                    .instruction_index(offset)
                    .ok_or(Error::InvalidBranchTarget {
                        offset: handler.try_offset,
                        target: offset,
                    })?;
                leaders[index] = true;
                handler_starts.entry(offset).or_insert(kind);
            }
        }

        let mut graph = DirectedGraph::new();
        let entry = graph.add_node(BasicBlock {
            id: BlockId::new(0),
            kind: BlockKind::Entry,
            instructions: None,
            start_offset: None,
        });

        let mut offsets = BTreeMap::new();
        let mut handler_entries = Vec::new();
        let mut start = 0;
        while start < instructions.len() {
            let end = (start + 1..instructions.len())
                .find(|&i| leaders[i])
                .unwrap_or(instructions.len());
            let offset = instructions[start].offset;
            let kind = handler_starts
                .get(&offset)
                .map_or(BlockKind::Body, |&k| BlockKind::Handler(k));
            let id = BlockId::new(graph.node_count());
            graph.add_node(BasicBlock {
                id,
                kind,
                instructions: Some(start..end),
                start_offset: Some(offset),
            });
            if let BlockKind::Handler(kind) = kind {
                handler_entries.push((id, kind));
            }
            offsets.insert(offset, id);
            start = end;
        }

        let exit = BlockId::new(graph.node_count());
        graph.add_node(BasicBlock {
            id: exit,
            kind: BlockKind::Exit,
            instructions: None,
            start_offset: None,
        });

        let mut cfg = ControlFlowGraph {
            graph,
            entry,
            exit,
            handler_entries,
            offsets,
        };
        cfg.connect(body)?;
        Ok(cfg)
    }

    fn connect(&mut self, body: &MethodBody) -> Result<()> {
        self.graph
            .add_edge(self.entry, BlockId::new(1), CfgEdgeKind::Entry)?;

        let real_blocks: Vec<(BlockId, usize)> = self
            .graph
            .nodes()
            .filter_map(|(id, block)| block.instructions.as_ref().map(|r| (id, r.end)))
            .collect();

        for (id, end) in real_blocks {
            let last = &body.instructions[end - 1];
            let next = body
                .instructions
                .get(end)
                .and_then(|i| self.offsets.get(&i.offset).copied())
                .unwrap_or(self.exit);
            let target_block = |target: u32| {
                self.offsets
                    .get(&target)
                    .copied()
                    .ok_or(Error::InvalidBranchTarget {
                        offset: last.offset,
                        target,
                    })
            };

            let mut edges = Vec::new();
            match last.opcode.flow_type() {
                FlowType::UnconditionalBranch | FlowType::Leave => {
                    for target in last.branch_targets() {
                        edges.push((target_block(target)?, CfgEdgeKind::Branch));
                    }
                }
                FlowType::ConditionalBranch => {
                    for target in last.branch_targets() {
                        edges.push((target_block(target)?, CfgEdgeKind::ConditionalTrue));
                    }
                    edges.push((next, CfgEdgeKind::ConditionalFalse));
                }
                FlowType::Switch => {
                    for (case, target) in (0u32..).zip(last.branch_targets()) {
                        edges.push((target_block(target)?, CfgEdgeKind::Switch { case }));
                    }
                    edges.push((next, CfgEdgeKind::SwitchDefault));
                }
                FlowType::Return | FlowType::Throw => edges.push((self.exit, CfgEdgeKind::Exit)),
                FlowType::EndFinally => {}
                FlowType::Sequential | FlowType::Call | FlowType::Meta => {
                    let kind = if next == self.exit {
                        CfgEdgeKind::Exit
                    } else {
                        CfgEdgeKind::Fallthrough
                    };
                    edges.push((next, kind));
                }
            }

            for (target, kind) in edges {
                self.graph.add_edge(id, target, kind)?;
            }
        }
        Ok(())
    }

    /// The entry sentinel.
    #[must_use]
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    /// The exit sentinel.
    #[must_use]
    pub fn exit(&self) -> BlockId {
        self.exit
    }

    /// Number of blocks, sentinels included.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Block by id.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.graph.node(id)
    }

    /// All blocks in id order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> + '_ {
        self.graph.nodes().map(|(_, block)| block)
    }

    /// Successor blocks in edge order.
    pub fn successors(&self, id: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.graph.successors(id)
    }

    /// Predecessor blocks in edge order.
    pub fn predecessors(&self, id: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.graph.predecessors(id)
    }

    /// Outgoing edges with their kinds.
    pub fn edges(&self, id: BlockId) -> impl Iterator<Item = (BlockId, CfgEdgeKind)> + '_ {
        self.graph.outgoing_edges(id).map(|(t, k)| (t, *k))
    }

    /// Blocks that start an exception handler or filter, in offset order.
    #[must_use]
    pub fn handler_entries(&self) -> &[(BlockId, HandlerKind)] {
        &self.handler_entries
    }

    /// The block starting exactly at `offset`.
    #[must_use]
    pub fn block_at(&self, offset: u32) -> Option<BlockId> {
        self.offsets.get(&offset).copied()
    }

    /// The block containing the instruction at `offset`.
    #[must_use]
    pub fn block_of_offset(&self, offset: u32) -> Option<BlockId> {
        self.offsets.range(..=offset).next_back().map(|(_, &id)| id)
    }

    /// Blocks reachable from the entry in reverse postorder.
    #[must_use]
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        self.graph.reverse_postorder(self.entry)
    }

    /// Renders the graph in DOT format, one node per block labelled with its offset.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph cfg {\n");
        for block in self.blocks() {
            let label = match (block.kind, block.start_offset) {
                (BlockKind::Entry, _) => "entry".to_string(),
                (BlockKind::Exit, _) => "exit".to_string(),
                (_, Some(offset)) => format!("IL_{offset:04x}"),
                (_, None) => block.id.to_string(),
            };
            let _ = writeln!(dot, "  {} [label=\"{label}\"];", block.id.index());
        }
        for block in self.blocks() {
            for (target, kind) in self.edges(block.id) {
                let _ = writeln!(
                    dot,
                    "  {} -> {} [label=\"{kind:?}\"];",
                    block.id.index(),
                    target.index()
                );
            }
        }
        dot.push('}');
        dot
    }
}

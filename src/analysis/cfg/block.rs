//! Basic blocks of a method body.

use std::ops::Range;

use crate::{metadata::body::HandlerKind, utils::graph::NodeId};

/// Identifier of a block within its [`ControlFlowGraph`](super::ControlFlowGraph).
pub type BlockId = NodeId;

/// Role of a block in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// The entry sentinel; holds no instructions
    Entry,
    /// The exit sentinel; holds no instructions
    Exit,
    /// An ordinary block
    Body,
    /// A block starting an exception handler or filter
    Handler(HandlerKind),
}

/// A maximal straight-line run of instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Sequential block id
    pub id: BlockId,
    /// Role of the block
    pub kind: BlockKind,
    /// Range of instruction indices into the method body, `None` for sentinels
    pub instructions: Option<Range<usize>>,
    /// IL offset of the first instruction, `None` for sentinels
    pub start_offset: Option<u32>,
}

impl BasicBlock {
    /// Returns `true` for the entry and exit sentinels.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        matches!(self.kind, BlockKind::Entry | BlockKind::Exit)
    }

    /// Number of instructions in the block.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.as_ref().map_or(0, ExactSizeIterator::len)
    }

    /// Returns `true` if the block holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handler kind for handler entry blocks.
    #[must_use]
    pub fn handler_kind(&self) -> Option<HandlerKind> {
        match self.kind {
            BlockKind::Handler(kind) => Some(kind),
            _ => None,
        }
    }
}

//! Control flow edge kinds.

/// The kind of control flow an edge represents.
///
/// Edge kinds are informational; the solver propagates state along every edge the same
/// way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CfgEdgeKind {
    /// From the entry sentinel to the first real block
    Entry,
    /// Unconditional branch target (`br`, `leave`)
    Branch,
    /// Taken side of a conditional branch
    ConditionalTrue,
    /// Fall-through side of a conditional branch
    ConditionalFalse,
    /// A switch case target
    Switch {
        /// Index into the switch table
        case: u32,
    },
    /// Switch fall-through when the selector is out of range
    SwitchDefault,
    /// Sequential fall-through into the next block
    Fallthrough,
    /// To the exit sentinel (`ret`, `throw`, `jmp`, or falling off the end)
    Exit,
}

impl CfgEdgeKind {
    /// Returns `true` for either side of a conditional branch.
    #[must_use]
    pub const fn is_conditional(self) -> bool {
        matches!(self, CfgEdgeKind::ConditionalTrue | CfgEdgeKind::ConditionalFalse)
    }

    /// Returns `true` for switch edges, the default case included.
    #[must_use]
    pub const fn is_switch(self) -> bool {
        matches!(self, CfgEdgeKind::Switch { .. } | CfgEdgeKind::SwitchDefault)
    }
}

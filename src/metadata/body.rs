//! Method bodies and exception handler tables.

use bitflags::bitflags;

use crate::{
    assembly::Instruction,
    metadata::{signatures::TypeSignature, token::Token},
};

bitflags! {
    /// Exception handler clause flags (ECMA-335 II.25.4.6).
    ///
    /// A typed `catch` clause has no flag set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ExceptionHandlerFlags: u16 {
        /// Filter expression decides whether the handler runs
        const FILTER = 0x0001;
        /// Handler always runs when leaving the protected region
        const FINALLY = 0x0002;
        /// Handler runs only when the protected region throws
        const FAULT = 0x0004;
    }
}

/// What kind of region a handler block starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandlerKind {
    /// Typed catch handler; entered with the exception object on the stack
    Catch,
    /// Filter expression block; entered with the exception object on the stack
    Filter,
    /// Handler block following a filter; entered with the exception object on the stack
    FilteredCatch,
    /// Finally handler; entered with an empty stack
    Finally,
    /// Fault handler; entered with an empty stack
    Fault,
}

impl HandlerKind {
    /// Returns `true` if the runtime pushes the exception object on entry.
    #[must_use]
    pub fn receives_exception(self) -> bool {
        matches!(
            self,
            HandlerKind::Catch | HandlerKind::Filter | HandlerKind::FilteredCatch
        )
    }
}

/// One clause of a method's exception handler table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Clause kind flags
    pub flags: ExceptionHandlerFlags,
    /// Start of the protected region
    pub try_offset: u32,
    /// Length of the protected region
    pub try_length: u32,
    /// Start of the handler
    pub handler_offset: u32,
    /// Length of the handler
    pub handler_length: u32,
    /// Caught exception type for typed catch clauses
    pub catch_type: Option<Token>,
    /// Start of the filter expression for filter clauses
    pub filter_offset: Option<u32>,
}

impl ExceptionHandler {
    /// Kind of the handler block.
    #[must_use]
    pub fn handler_kind(&self) -> HandlerKind {
        if self.flags.contains(ExceptionHandlerFlags::FILTER) {
            HandlerKind::FilteredCatch
        } else if self.flags.contains(ExceptionHandlerFlags::FINALLY) {
            HandlerKind::Finally
        } else if self.flags.contains(ExceptionHandlerFlags::FAULT) {
            HandlerKind::Fault
        } else {
            HandlerKind::Catch
        }
    }

    /// Region entry points this clause introduces: the handler start and, for filter
    /// clauses, the filter start.
    pub fn entry_points(&self) -> impl Iterator<Item = (u32, HandlerKind)> {
        let filter = self
            .filter_offset
            .filter(|_| self.flags.contains(ExceptionHandlerFlags::FILTER))
            .map(|offset| (offset, HandlerKind::Filter));
        std::iter::once((self.handler_offset, self.handler_kind())).chain(filter)
    }
}

/// A decoded method body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodBody {
    /// Declared maximum evaluation stack depth
    pub max_stack: u16,
    /// Locals are zero-initialized
    pub init_locals: bool,
    /// Local variable types
    pub locals: Vec<TypeSignature>,
    /// Instructions in offset order
    pub instructions: Vec<Instruction>,
    /// Exception handler table
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// Total encoded size of the instruction stream in bytes.
    #[must_use]
    pub fn code_size(&self) -> u32 {
        self.instructions
            .last()
            .map_or(0, Instruction::next_offset)
    }

    /// Index of the instruction starting at `offset`, found by binary search.
    #[must_use]
    pub fn instruction_index(&self, offset: u32) -> Option<usize> {
        self.instructions
            .binary_search_by_key(&offset, |i| i.offset)
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(flags: ExceptionHandlerFlags, filter: Option<u32>) -> ExceptionHandler {
        ExceptionHandler {
            flags,
            try_offset: 0,
            try_length: 10,
            handler_offset: 20,
            handler_length: 5,
            catch_type: None,
            filter_offset: filter,
        }
    }

    #[test]
    fn handler_kinds() {
        assert_eq!(
            handler(ExceptionHandlerFlags::empty(), None).handler_kind(),
            HandlerKind::Catch
        );
        assert_eq!(
            handler(ExceptionHandlerFlags::FINALLY, None).handler_kind(),
            HandlerKind::Finally
        );
        assert!(!HandlerKind::Fault.receives_exception());
        assert!(HandlerKind::Filter.receives_exception());
    }

    #[test]
    fn filter_clause_has_two_entries() {
        let entries: Vec<_> = handler(ExceptionHandlerFlags::FILTER, Some(12))
            .entry_points()
            .collect();
        assert_eq!(
            entries,
            vec![(20, HandlerKind::FilteredCatch), (12, HandlerKind::Filter)]
        );

        let catch: Vec<_> = handler(ExceptionHandlerFlags::empty(), Some(12))
            .entry_points()
            .collect();
        assert_eq!(catch, vec![(20, HandlerKind::Catch)]);
    }
}

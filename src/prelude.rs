//! # dotreach Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the dotreach library. Import this module to get quick access to the essential
//! types for building metadata, running an analysis and reading its results.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotreach operations
pub use crate::Error;

/// The result type used throughout dotreach
pub use crate::Result;

// ================================================================================================
// Analysis Entry Points
// ================================================================================================

/// Session, configuration and per-method results
pub use crate::analysis::{AnalysisConfig, AnalysisOutcome, AnalysisSession, MethodAnalysis};

/// Member requirements and where they come from
pub use crate::analysis::{MemberTypes, RequirementTarget};

/// The abstract value domain
pub use crate::analysis::{AbstractValue, ArrayValue, MultiValue};

/// Control-flow graphs and the generic solver
pub use crate::analysis::{
    ControlFlowGraph, DataFlowAnalysis, DataFlowSolver, Lattice, MeetSemiLattice,
};

// ================================================================================================
// Host Boundary
// ================================================================================================

/// Traits the analysis queries and reports through
pub use crate::host::{
    AnalysisHost, AnnotationProvider, DiagnosticSink, FieldValueProvider, MetadataResolver,
    ReachabilityMarker,
};

/// In-memory host and its collected results
pub use crate::host::{
    Diagnostic, DiagnosticCode, DiagnosticLog, MarkReason, MemberKind, Origin,
    ReachabilityRecorder, RecordingHost,
};

// ================================================================================================
// Metadata and Bytecode
// ================================================================================================

/// Metadata token type for referencing table entries
pub use crate::metadata::token::Token;

/// Builder-populated metadata registry
pub use crate::metadata::MetadataStore;

/// Signatures
pub use crate::metadata::signatures::{SignatureMethod, TypeSignature};

/// Attribute flags of member definitions
pub use crate::metadata::types::{
    FieldAttributes, GenericParamAttributes, MethodAttributes, TypeAttributes,
};

/// Method bodies and exception handlers
pub use crate::metadata::body::{ExceptionHandler, ExceptionHandlerFlags, HandlerKind, MethodBody};

/// Instructions and the body builder
pub use crate::assembly::{Instruction, MethodBodyBuilder, OpCode, Operand};

//! Metadata model consumed by the analysis.
//!
//! This is the narrow slice of the ECMA-335 object model the dataflow engine needs: tokens,
//! signatures with generic substitution, member descriptors with their attribute flags,
//! method bodies with exception handler tables, and marshalling descriptors for p/invoke
//! signatures. Reading metadata from binaries is left to the embedding; the
//! [`MetadataStore`] is an in-memory registry that is populated directly.
//!
//! # Key Components
//!
//! - [`token`] - Metadata table row references used by every instruction operand
//! - [`signatures`] - Type and method signatures, with `!n`/`!!n` substitution
//! - [`types`] - Type, method, field, property and event descriptors
//! - [`body`] - Method bodies and exception handlers
//! - [`marshalling`] - Native types of p/invoke parameters
//! - [`store`] - Builder-populated registry implementing the host's metadata traits

/// Method bodies and exception handler tables
pub mod body;
/// Implementation of the type marshalling for native code invocations
pub mod marshalling;
/// Implementation of method and type signatures
pub mod signatures;
/// In-memory metadata registry
pub mod store;
/// Metadata tokens
pub mod token;
/// Member descriptors and attribute flags
pub mod types;

pub use store::MetadataStore;

//! Shared data structures.

/// Directed graph with typed node identifiers
pub mod graph;

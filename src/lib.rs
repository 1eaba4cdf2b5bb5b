// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # dotreach
//!
//! Reachability and reflection dataflow analysis for .NET CIL.
//!
//! `dotreach` decides which types and members of an assembly may be reached through
//! reflection, so a trimmer can keep them and remove the rest. It abstractly interprets
//! each method body over a lattice of value sets: string literals, known types, method and
//! field handles, arrays of those, and placeholders for values whose origin carries a
//! member requirement. Calls into reflection APIs are modeled by intrinsic handlers. When a
//! value reaches a location annotated with a member requirement, the members the
//! requirement names are marked reachable; when it cannot be understood, a diagnostic is
//! reported with an `IL2xxx` warning code.
//!
//! ## Features
//!
//! - **🧭 Control-flow graphs** - Basic blocks, exception handler entries and sentinels
//! - **🔁 Generic fixpoint solver** - Forward worklist iteration over any meet-semilattice
//! - **🧮 Value-set domain** - Flat sets of abstract values with an absorbing unknown
//! - **🪞 Reflection intrinsics** - `Type.GetType`, `GetMethod`, `Activator.CreateInstance`,
//!   `Expression.Call`, `MakeGenericType` and friends
//! - **⚠️ Trimming diagnostics** - Stable warning codes, deterministic ordering
//! - **🧵 Parallel batches** - Independent methods analyzed on the `rayon` pool
//!
//! ## Quick Start
//!
//! The analysis talks to its embedding through the [`host::AnalysisHost`] traits. The
//! bundled [`metadata::MetadataStore`] and [`host::RecordingHost`] are enough to get going:
//!
//! ```rust,ignore
//! use dotreach::prelude::*;
//!
//! let mut store = MetadataStore::new();
//! // ... populate types, methods, bodies and annotations ...
//!
//! let host = RecordingHost::new(&store);
//! let session = AnalysisSession::new(&host, AnalysisConfig::default());
//! let analysis = session.analyze_method(entry_point)?;
//!
//! println!("{} marked, {} diagnostics", host.marks.len(), host.diagnostics.count());
//! # Ok::<(), dotreach::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - Tokens, signatures, member descriptors and the in-memory store
//! - [`assembly`] - CIL opcodes, instructions and a method body builder
//! - [`analysis`] - Graph construction, the dataflow engine and reflection modeling
//! - [`host`] - The traits the analysis queries and reports through
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: session progress at `debug`, individual
//! marks and scanner decisions at `trace`. Nothing is printed unless the embedding
//! installs a logger.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,ignore
/// use dotreach::prelude::*;
///
/// let store = MetadataStore::new();
/// let host = RecordingHost::new(&store);
/// let session = AnalysisSession::new(&host, AnalysisConfig::default());
/// ```
pub mod prelude;

/// Dataflow analysis of CIL method bodies
///
/// # Key Components
///
/// - [`analysis::AnalysisSession`] - Analyzes methods against one host and configuration
/// - [`analysis::ControlFlowGraph`] - Basic blocks with entry, exit and handler edges
/// - [`analysis::DataFlowSolver`] - Forward fixpoint iteration over a lattice
/// - [`analysis::MultiValue`] - The abstract value domain
/// - [`analysis::MemberTypes`] - Member categories a value is required to keep
pub mod analysis;

/// CIL instructions and a builder for method bodies
///
/// This module covers the part of ECMA-335 partition III the analysis interprets: the
/// opcode table with stack behaviour and flow classification, decoded instructions with
/// typed operands, and [`assembly::MethodBodyBuilder`] for assembling bodies with labels
/// and exception handlers.
pub mod assembly;

/// The boundary between the analysis and its embedding
///
/// Metadata resolution, annotation queries, reachability marks and diagnostics all go
/// through the traits defined here. [`host::RecordingHost`] collects marks and diagnostics
/// in memory.
pub mod host;

/// Metadata model consumed by the analysis
pub mod metadata;

/// Shared data structures
pub mod utils;

/// `dotreach` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotreach` Error type
///
/// # Examples
///
/// ```rust,ignore
/// use dotreach::Error;
///
/// match session.analyze_method(method) {
///     Ok(analysis) => println!("returns {}", analysis.return_value),
///     Err(Error::IterationLimit(limit)) => println!("no fixpoint after {limit} visits"),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;

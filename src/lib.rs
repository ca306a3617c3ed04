//! # nnet-compiler - Buffer-Computation Analyzer and Optimizing Compiler
//!
//! Compiles a request for neural-network outputs into a linear list of
//! buffer commands, validates it, and rewrites it to use less memory and do
//! less redundant work without changing what it computes.
//!
//! ## Features
//!
//! - **Fine-grained liveness** - every buffer is split at the row and column
//!   boundaries of its views, and reads/writes are tracked per cell
//! - **Checker** - structural and temporal invariants of a computation, run
//!   before and after optimization
//! - **Optimizer** - in-place merging, zero elision, lifetime tightening,
//!   allocation reuse, model-update consolidation, derivative-time limiting
//! - **Caching compiler** - bounded LRU cache of compiled computations
//!
//! ## Quick Start
//!
//! ```rust
//! use nnet_compiler::compiler::ir::{
//!     Command, ComponentProperties, Computation, NetworkSpec, NodeKind,
//! };
//! use nnet_compiler::compiler::{CheckComputationOptions, ComputationChecker};
//!
//! # fn main() -> nnet_compiler::Result<()> {
//! let mut network = NetworkSpec::new();
//! let relu = network.add_component("relu", 4, 4, ComponentProperties::simple().in_place());
//! let input = network.add_node("input", NodeKind::Input);
//! let output = network.add_node("output", NodeKind::Output);
//!
//! let mut computation = Computation::new();
//! let x = computation.new_matrix(10, 4);
//! let y = computation.new_matrix(10, 4);
//! computation.commands = vec![
//!     Command::AcceptInput { submatrix: x, node: input },
//!     Command::AllocMatrixUndefined { submatrix: y },
//!     Command::Propagate { component: relu, precomputed_indexes: 0, input: x, output: y },
//!     Command::ProvideOutput { submatrix: y, node: output },
//!     Command::NoOperationMarker,
//! ];
//!
//! let report = ComputationChecker::new(CheckComputationOptions::default(), &network, &computation)
//!     .check()?;
//! assert!(report.unused_inputs.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`compiler::ir`] - buffers, views, commands, printing
//! - [`compiler::analysis`] - variables, command attributes, access lists, queries
//! - [`compiler::checker`] - invariant checks
//! - [`compiler::optimizer`] - optimization passes
//! - [`compiler::cache`] - LRU cache of compiled computations
//! - [`error`] - error types

#![allow(clippy::needless_range_loop)] // Index needed for error messages

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod compiler;
pub mod error;

// Re-export main types
pub use compiler::{
    CachingCompiler, CachingCompilerOptions, CheckComputationOptions, ComputationLowering,
    ComputationRequest, IoSpecification, OptimizeOptions,
};
pub use compiler::ir::{Command, Computation, Network, NetworkSpec};
pub use error::{Error, ErrorSeverity, Result};

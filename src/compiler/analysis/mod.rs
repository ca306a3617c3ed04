//! # Computation Analysis
//!
//! Dataflow facts about a [`Computation`], rebuilt from scratch whenever the
//! command list changes:
//!
//! ```text
//! views ──► ComputationVariables ──► CommandAttributes
//!       ──► variable / matrix accesses
//!                                                              │
//!                                                              ▼
//!                                                     ComputationAnalysis (queries)
//! ```

pub mod accesses;
pub mod attributes;
pub mod debug;
pub mod query;
pub mod variables;

pub use accesses::{
    compute_matrix_accesses, compute_variable_accesses, Access, AccessType, MatrixAccesses,
};
pub use attributes::{compute_command_attributes, CommandAttributes};
pub use debug::{print_command_attributes, print_matrix_accesses};
pub use query::ComputationAnalysis;
pub use variables::ComputationVariables;

use crate::compiler::ir::{Computation, Network};
use crate::Result;

/// Variables, command attributes and access lists of one computation
#[derive(Debug, Clone)]
pub struct Analyzer {
    pub variables: ComputationVariables,
    pub command_attributes: Vec<CommandAttributes>,
    /// Indexed by variable
    pub variable_accesses: Vec<Vec<Access>>,
    /// Indexed by buffer
    pub matrix_accesses: Vec<MatrixAccesses>,
}

impl Analyzer {
    pub fn new<N: Network + ?Sized>(network: &N, computation: &Computation) -> Result<Self> {
        let variables = ComputationVariables::new(computation)?;
        let command_attributes = compute_command_attributes(network, computation, &variables)?;
        let variable_accesses = compute_variable_accesses(&variables, &command_attributes);
        let matrix_accesses =
            compute_matrix_accesses(computation, &variables, &command_attributes)?;
        Ok(Self {
            variables,
            command_attributes,
            variable_accesses,
            matrix_accesses,
        })
    }
}

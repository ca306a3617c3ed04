//! Compilation requests: which outputs are needed, given which inputs
//!
//! Requests are compared and hashed by value, so two separately built
//! requests with the same contents hit the same cache entry.

pub use super::ir::Index;
use serde::{Deserialize, Serialize};

/// One named input or output and the rows requested for it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IoSpecification {
    /// Network node name
    pub name: String,
    /// One index per row, in row order
    pub indexes: Vec<Index>,
    /// For inputs: derivative w.r.t. this input is wanted.
    /// For outputs: a derivative will be supplied.
    pub has_deriv: bool,
}

impl IoSpecification {
    /// Rows `indexes` of node `name`, without a derivative
    pub fn new(name: &str, indexes: Vec<Index>) -> Self {
        Self {
            name: name.to_string(),
            indexes,
            has_deriv: false,
        }
    }

    /// Rows `t_begin..t_end` of sequence 0
    pub fn with_time_range(name: &str, t_begin: i32, t_end: i32) -> Self {
        Self::new(name, (t_begin..t_end).map(|t| Index::new(0, t, 0)).collect())
    }

    /// Mark a derivative as wanted (inputs) or supplied (outputs)
    pub fn with_deriv(mut self) -> Self {
        self.has_deriv = true;
        self
    }
}

/// Key of the compilation cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComputationRequest {
    /// Values supplied by the caller
    pub inputs: Vec<IoSpecification>,
    /// Values the computation must produce
    pub outputs: Vec<IoSpecification>,
    /// Parameter gradients are needed
    pub need_model_derivative: bool,
    /// Components accumulate statistics during propagation
    pub store_component_stats: bool,
}

impl ComputationRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an input
    pub fn input(mut self, io: IoSpecification) -> Self {
        self.inputs.push(io);
        self
    }

    /// Append an output
    pub fn output(mut self, io: IoSpecification) -> Self {
        self.outputs.push(io);
        self
    }

    pub fn need_model_derivative(mut self, value: bool) -> Self {
        self.need_model_derivative = value;
        self
    }

    pub fn store_component_stats(mut self, value: bool) -> Self {
        self.store_component_stats = value;
        self
    }

    /// True if the computation has a backward pass
    pub fn need_derivatives(&self) -> bool {
        self.need_model_derivative
            || self.inputs.iter().any(|io| io.has_deriv)
            || self.outputs.iter().any(|io| io.has_deriv)
    }

    pub fn find_input(&self, name: &str) -> Option<&IoSpecification> {
        self.inputs.iter().find(|io| io.name == name)
    }

    pub fn find_output(&self, name: &str) -> Option<&IoSpecification> {
        self.outputs.iter().find(|io| io.name == name)
    }
}

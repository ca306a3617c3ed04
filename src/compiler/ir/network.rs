//! Network description consumed by the analyzer and checker
//!
//! The analyzer never evaluates a component. It only needs each component's
//! dimensions and the properties that decide how a command reads and writes
//! its views.

use serde::{Deserialize, Serialize};

/// Properties of a component that affect buffer access
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentProperties {
    /// Rows are processed independently; input and output row counts match
    pub simple: bool,
    /// Has trainable parameters
    pub updatable: bool,
    /// Propagate adds to its output instead of overwriting it
    pub propagate_adds: bool,
    /// Backprop adds to the input derivative instead of overwriting it
    pub backprop_adds: bool,
    /// Propagate may use the same view for input and output
    pub propagate_in_place: bool,
    /// Backprop may use the same view for output and input derivative
    pub backprop_in_place: bool,
    /// Backprop reads the input value
    pub backprop_needs_input: bool,
    /// Backprop reads the output value
    pub backprop_needs_output: bool,
    /// Supports StoreStats
    pub stores_stats: bool,
}

impl ComponentProperties {
    /// Row-wise component without parameters
    pub fn simple() -> Self {
        Self {
            simple: true,
            ..Self::default()
        }
    }

    /// Mark as having trainable parameters
    pub fn updatable(mut self) -> Self {
        self.updatable = true;
        self
    }

    /// Mark propagate as accumulating
    pub fn propagate_adds(mut self) -> Self {
        self.propagate_adds = true;
        self
    }

    /// Mark backprop as accumulating
    pub fn backprop_adds(mut self) -> Self {
        self.backprop_adds = true;
        self
    }

    /// Allow in-place propagate and backprop
    pub fn in_place(mut self) -> Self {
        self.propagate_in_place = true;
        self.backprop_in_place = true;
        self
    }

    /// Backprop reads the input value
    pub fn needs_input(mut self) -> Self {
        self.backprop_needs_input = true;
        self
    }

    /// Backprop reads the output value
    pub fn needs_output(mut self) -> Self {
        self.backprop_needs_output = true;
        self
    }

    /// Supports StoreStats
    pub fn stores_stats(mut self) -> Self {
        self.stores_stats = true;
        self
    }
}

/// A component as seen by the compiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInfo {
    pub name: String,
    pub input_dim: usize,
    pub output_dim: usize,
    pub properties: ComponentProperties,
}

/// The network a computation was lowered from
pub trait Network {
    /// Number of components
    fn num_components(&self) -> usize;

    /// Component by index, `None` when out of range
    fn component(&self, index: usize) -> Option<&ComponentInfo>;

    /// True if `node` is an input node
    fn is_input_node(&self, node: usize) -> bool;

    /// True if `node` is an output node
    fn is_output_node(&self, node: usize) -> bool;
}

/// Role of a network node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Input,
    Output,
    Component,
}

/// In-memory [`Network`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub components: Vec<ComponentInfo>,
    pub nodes: Vec<(String, NodeKind)>,
}

impl NetworkSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component, returning its index
    pub fn add_component(
        &mut self,
        name: &str,
        input_dim: usize,
        output_dim: usize,
        properties: ComponentProperties,
    ) -> usize {
        self.components.push(ComponentInfo {
            name: name.to_string(),
            input_dim,
            output_dim,
            properties,
        });
        self.components.len() - 1
    }

    /// Add a node, returning its index
    pub fn add_node(&mut self, name: &str, kind: NodeKind) -> usize {
        self.nodes.push((name.to_string(), kind));
        self.nodes.len() - 1
    }

    /// Index of the node called `name`
    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|(n, _)| n == name)
    }
}

impl Network for NetworkSpec {
    fn num_components(&self) -> usize {
        self.components.len()
    }

    fn component(&self, index: usize) -> Option<&ComponentInfo> {
        self.components.get(index)
    }

    fn is_input_node(&self, node: usize) -> bool {
        matches!(self.nodes.get(node), Some((_, NodeKind::Input)))
    }

    fn is_output_node(&self, node: usize) -> bool {
        matches!(self.nodes.get(node), Some((_, NodeKind::Output)))
    }
}

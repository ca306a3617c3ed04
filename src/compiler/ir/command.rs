//! Command definitions
//!
//! Every field named `submatrix`, `dst`, `src`, `input`, ... is an index into
//! [`Computation::submatrices`](super::Computation::submatrices); index 0 is
//! the null view.

use serde::{Deserialize, Serialize};

/// Command kind, without arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommandType {
    /// Allocate a buffer and set it to zero
    AllocMatrixZeroed,
    /// Allocate a buffer, contents undefined
    AllocMatrixUndefined,
    /// Take over the storage of a buffer freed at the same command
    AllocMatrixFromOther,
    /// Take over the storage of a freed buffer and zero it
    AllocMatrixFromOtherZeroed,
    /// Free a buffer
    DeallocMatrix,
    /// Forward computation of a component
    Propagate,
    /// Accumulate component statistics from its output
    StoreStats,
    /// Backward computation with model update
    Backprop,
    /// Backward computation without model update
    BackpropNoModelUpdate,
    /// Copy between two views of equal shape
    MatrixCopy,
    /// Add between two views of equal shape
    MatrixAdd,
    /// Gather rows from a view
    CopyRows,
    /// Gather and add rows from a view
    AddRows,
    /// Gather rows from several views
    CopyRowsMulti,
    /// Scatter rows into several views
    CopyToRowsMulti,
    /// Gather and add rows from several views
    AddRowsMulti,
    /// Scatter and add rows into several views
    AddToRowsMulti,
    /// Add sums of row ranges
    AddRowRanges,
    /// Receive an input from the caller
    AcceptInput,
    /// Hand an output to the caller
    ProvideOutput,
    /// Does nothing; removed by the optimizer
    NoOperation,
    /// Boundary between the forward and the backward pass
    NoOperationMarker,
}

impl CommandType {
    /// Human readable name
    pub fn name(self) -> &'static str {
        match self {
            CommandType::AllocMatrixZeroed => "alloc-zeroed",
            CommandType::AllocMatrixUndefined => "alloc-undefined",
            CommandType::AllocMatrixFromOther => "alloc-from-other",
            CommandType::AllocMatrixFromOtherZeroed => "alloc-from-other-zeroed",
            CommandType::DeallocMatrix => "dealloc",
            CommandType::Propagate => "propagate",
            CommandType::StoreStats => "store-stats",
            CommandType::Backprop => "backprop",
            CommandType::BackpropNoModelUpdate => "backprop-no-update",
            CommandType::MatrixCopy => "copy",
            CommandType::MatrixAdd => "add",
            CommandType::CopyRows => "copy-rows",
            CommandType::AddRows => "add-rows",
            CommandType::CopyRowsMulti => "copy-rows-multi",
            CommandType::CopyToRowsMulti => "copy-to-rows-multi",
            CommandType::AddRowsMulti => "add-rows-multi",
            CommandType::AddToRowsMulti => "add-to-rows-multi",
            CommandType::AddRowRanges => "add-row-ranges",
            CommandType::AcceptInput => "accept-input",
            CommandType::ProvideOutput => "provide-output",
            CommandType::NoOperation => "no-op",
            CommandType::NoOperationMarker => "marker",
        }
    }

    /// Any of the four allocation kinds
    pub fn is_allocation(self) -> bool {
        matches!(
            self,
            CommandType::AllocMatrixZeroed
                | CommandType::AllocMatrixUndefined
                | CommandType::AllocMatrixFromOther
                | CommandType::AllocMatrixFromOtherZeroed
        )
    }

    /// Allocation or deallocation
    pub fn is_sizing(self) -> bool {
        self.is_allocation() || self == CommandType::DeallocMatrix
    }

    /// May only appear after the marker
    pub fn is_backward_only(self) -> bool {
        matches!(
            self,
            CommandType::Backprop | CommandType::BackpropNoModelUpdate
        )
    }

    /// May only appear before the marker
    pub fn is_forward_only(self) -> bool {
        matches!(self, CommandType::Propagate | CommandType::StoreStats)
    }
}

/// A single command of a computation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Allocate the whole-buffer view `submatrix`, zeroed
    AllocMatrixZeroed { submatrix: usize },
    /// Allocate the whole-buffer view `submatrix`, undefined
    AllocMatrixUndefined { submatrix: usize },
    /// Allocate `submatrix` by taking over the storage of `from`, which is freed
    AllocMatrixFromOther { submatrix: usize, from: usize },
    /// Like `AllocMatrixFromOther`, then zero
    AllocMatrixFromOtherZeroed { submatrix: usize, from: usize },
    /// Free the whole-buffer view `submatrix`
    DeallocMatrix { submatrix: usize },
    /// output = component(input)
    Propagate {
        component: usize,
        precomputed_indexes: usize,
        input: usize,
        output: usize,
    },
    /// Accumulate stats of `component` from `output`
    StoreStats { component: usize, output: usize },
    /// Backward pass of `component`, updating its parameters
    Backprop {
        component: usize,
        precomputed_indexes: usize,
        input_value: usize,
        output_value: usize,
        output_deriv: usize,
        input_deriv: usize,
    },
    /// Backward pass of `component` without touching its parameters
    BackpropNoModelUpdate {
        component: usize,
        precomputed_indexes: usize,
        input_value: usize,
        output_value: usize,
        output_deriv: usize,
        input_deriv: usize,
    },
    /// dst = src
    MatrixCopy { dst: usize, src: usize },
    /// dst += src
    MatrixAdd { dst: usize, src: usize },
    /// dst\[i\] = src\[indexes\[i\]\], rows with -1 left untouched
    CopyRows {
        dst: usize,
        src: usize,
        indexes: usize,
    },
    /// dst\[i\] += src\[indexes\[i\]\]
    AddRows {
        dst: usize,
        src: usize,
        indexes: usize,
    },
    /// dst\[i\] = view(pair.0)\[pair.1\], zero for (-1,-1)
    CopyRowsMulti { dst: usize, indexes_multi: usize },
    /// view(pair.0)\[pair.1\] = src\[i\]
    CopyToRowsMulti { src: usize, indexes_multi: usize },
    /// dst\[i\] += view(pair.0)\[pair.1\]
    AddRowsMulti { dst: usize, indexes_multi: usize },
    /// view(pair.0)\[pair.1\] += src\[i\]
    AddToRowsMulti { src: usize, indexes_multi: usize },
    /// dst\[i\] += sum of src rows in range
    AddRowRanges {
        dst: usize,
        src: usize,
        indexes_ranges: usize,
    },
    /// Receive network node `node` into `submatrix`
    AcceptInput { submatrix: usize, node: usize },
    /// Hand `submatrix` to the caller as network node `node`
    ProvideOutput { submatrix: usize, node: usize },
    NoOperation,
    NoOperationMarker,
}

impl Command {
    /// Kind of this command
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::AllocMatrixZeroed { .. } => CommandType::AllocMatrixZeroed,
            Command::AllocMatrixUndefined { .. } => CommandType::AllocMatrixUndefined,
            Command::AllocMatrixFromOther { .. } => CommandType::AllocMatrixFromOther,
            Command::AllocMatrixFromOtherZeroed { .. } => CommandType::AllocMatrixFromOtherZeroed,
            Command::DeallocMatrix { .. } => CommandType::DeallocMatrix,
            Command::Propagate { .. } => CommandType::Propagate,
            Command::StoreStats { .. } => CommandType::StoreStats,
            Command::Backprop { .. } => CommandType::Backprop,
            Command::BackpropNoModelUpdate { .. } => CommandType::BackpropNoModelUpdate,
            Command::MatrixCopy { .. } => CommandType::MatrixCopy,
            Command::MatrixAdd { .. } => CommandType::MatrixAdd,
            Command::CopyRows { .. } => CommandType::CopyRows,
            Command::AddRows { .. } => CommandType::AddRows,
            Command::CopyRowsMulti { .. } => CommandType::CopyRowsMulti,
            Command::CopyToRowsMulti { .. } => CommandType::CopyToRowsMulti,
            Command::AddRowsMulti { .. } => CommandType::AddRowsMulti,
            Command::AddToRowsMulti { .. } => CommandType::AddToRowsMulti,
            Command::AddRowRanges { .. } => CommandType::AddRowRanges,
            Command::AcceptInput { .. } => CommandType::AcceptInput,
            Command::ProvideOutput { .. } => CommandType::ProvideOutput,
            Command::NoOperation => CommandType::NoOperation,
            Command::NoOperationMarker => CommandType::NoOperationMarker,
        }
    }

    /// Views referenced directly by this command (not through `indexes_multi`)
    pub fn submatrices(&self) -> Vec<usize> {
        match *self {
            Command::AllocMatrixZeroed { submatrix }
            | Command::AllocMatrixUndefined { submatrix }
            | Command::DeallocMatrix { submatrix }
            | Command::AcceptInput { submatrix, .. }
            | Command::ProvideOutput { submatrix, .. } => vec![submatrix],
            Command::AllocMatrixFromOther { submatrix, from }
            | Command::AllocMatrixFromOtherZeroed { submatrix, from } => vec![submatrix, from],
            Command::Propagate { input, output, .. } => vec![input, output],
            Command::StoreStats { output, .. } => vec![output],
            Command::Backprop {
                input_value,
                output_value,
                output_deriv,
                input_deriv,
                ..
            }
            | Command::BackpropNoModelUpdate {
                input_value,
                output_value,
                output_deriv,
                input_deriv,
                ..
            } => vec![input_value, output_value, output_deriv, input_deriv],
            Command::MatrixCopy { dst, src }
            | Command::MatrixAdd { dst, src }
            | Command::CopyRows { dst, src, .. }
            | Command::AddRows { dst, src, .. }
            | Command::AddRowRanges { dst, src, .. } => vec![dst, src],
            Command::CopyRowsMulti { dst, .. } | Command::AddRowsMulti { dst, .. } => vec![dst],
            Command::CopyToRowsMulti { src, .. } | Command::AddToRowsMulti { src, .. } => {
                vec![src]
            }
            Command::NoOperation | Command::NoOperationMarker => vec![],
        }
    }

    /// Rewrite every directly referenced view through `f`
    pub fn map_submatrices(&mut self, mut f: impl FnMut(usize) -> usize) {
        match self {
            Command::AllocMatrixZeroed { submatrix }
            | Command::AllocMatrixUndefined { submatrix }
            | Command::DeallocMatrix { submatrix }
            | Command::AcceptInput { submatrix, .. }
            | Command::ProvideOutput { submatrix, .. } => *submatrix = f(*submatrix),
            Command::AllocMatrixFromOther { submatrix, from }
            | Command::AllocMatrixFromOtherZeroed { submatrix, from } => {
                *submatrix = f(*submatrix);
                *from = f(*from);
            }
            Command::Propagate { input, output, .. } => {
                *input = f(*input);
                *output = f(*output);
            }
            Command::StoreStats { output, .. } => *output = f(*output),
            Command::Backprop {
                input_value,
                output_value,
                output_deriv,
                input_deriv,
                ..
            }
            | Command::BackpropNoModelUpdate {
                input_value,
                output_value,
                output_deriv,
                input_deriv,
                ..
            } => {
                *input_value = f(*input_value);
                *output_value = f(*output_value);
                *output_deriv = f(*output_deriv);
                *input_deriv = f(*input_deriv);
            }
            Command::MatrixCopy { dst, src }
            | Command::MatrixAdd { dst, src }
            | Command::CopyRows { dst, src, .. }
            | Command::AddRows { dst, src, .. }
            | Command::AddRowRanges { dst, src, .. } => {
                *dst = f(*dst);
                *src = f(*src);
            }
            Command::CopyRowsMulti { dst, .. } | Command::AddRowsMulti { dst, .. } => {
                *dst = f(*dst)
            }
            Command::CopyToRowsMulti { src, .. } | Command::AddToRowsMulti { src, .. } => {
                *src = f(*src)
            }
            Command::NoOperation | Command::NoOperationMarker => {}
        }
    }

    /// Index into `indexes_multi`, for the four *-multi commands
    pub fn indexes_multi(&self) -> Option<usize> {
        match *self {
            Command::CopyRowsMulti { indexes_multi, .. }
            | Command::CopyToRowsMulti { indexes_multi, .. }
            | Command::AddRowsMulti { indexes_multi, .. }
            | Command::AddToRowsMulti { indexes_multi, .. } => Some(indexes_multi),
            _ => None,
        }
    }

    /// The view allocated by an allocation command
    pub fn allocated_submatrix(&self) -> Option<usize> {
        match *self {
            Command::AllocMatrixZeroed { submatrix }
            | Command::AllocMatrixUndefined { submatrix }
            | Command::AllocMatrixFromOther { submatrix, .. }
            | Command::AllocMatrixFromOtherZeroed { submatrix, .. } => Some(submatrix),
            _ => None,
        }
    }

    /// The view whose buffer this command frees
    pub fn freed_submatrix(&self) -> Option<usize> {
        match *self {
            Command::DeallocMatrix { submatrix } => Some(submatrix),
            Command::AllocMatrixFromOther { from, .. }
            | Command::AllocMatrixFromOtherZeroed { from, .. } => Some(from),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_submatrices_rewrites_every_view() {
        let mut cmd = Command::Backprop {
            component: 2,
            precomputed_indexes: 0,
            input_value: 1,
            output_value: 0,
            output_deriv: 3,
            input_deriv: 4,
        };
        cmd.map_submatrices(|s| if s == 0 { 0 } else { s + 10 });
        assert_eq!(cmd.submatrices(), vec![11, 0, 13, 14]);
        assert_eq!(cmd.command_type(), CommandType::Backprop);
    }

    #[test]
    fn test_type_categories() {
        assert!(CommandType::AllocMatrixFromOther.is_allocation());
        assert!(CommandType::DeallocMatrix.is_sizing());
        assert!(!CommandType::AcceptInput.is_sizing());
        assert!(CommandType::BackpropNoModelUpdate.is_backward_only());
        assert!(CommandType::StoreStats.is_forward_only());
        assert_eq!(
            Command::AllocMatrixFromOther { submatrix: 2, from: 1 }.freed_submatrix(),
            Some(1)
        );
    }
}

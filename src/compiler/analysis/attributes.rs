//! Per-command read/write sets
//!
//! One dispatch over [`Command`] records, for each command, which variables,
//! views and buffers it reads and writes. A read-write access is recorded in
//! both the read and the written sets.

use super::variables::ComputationVariables;
use crate::compiler::ir::{Command, Computation, Network};
use crate::{Error, Result};

/// How a command touches one of its views
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Touch {
    Read,
    Write,
    ReadWrite,
}

/// Read and write sets of one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandAttributes {
    pub variables_read: Vec<usize>,
    pub variables_written: Vec<usize>,
    pub submatrices_read: Vec<usize>,
    pub submatrices_written: Vec<usize>,
    pub matrices_read: Vec<usize>,
    pub matrices_written: Vec<usize>,
    /// Changes state outside the buffers (a model update)
    pub has_side_effects: bool,
}

impl CommandAttributes {
    fn record(
        &mut self,
        computation: &Computation,
        variables: &ComputationVariables,
        submatrix: usize,
        touch: Touch,
    ) {
        if submatrix == 0 {
            return;
        }
        let Some(info) = computation.submatrices.get(submatrix) else {
            return;
        };
        let m = info.matrix_index;
        let vars = variables.variables_for_submatrix(submatrix);
        if matches!(touch, Touch::Read | Touch::ReadWrite) {
            self.variables_read.extend_from_slice(vars);
            self.submatrices_read.push(submatrix);
            self.matrices_read.push(m);
        }
        if matches!(touch, Touch::Write | Touch::ReadWrite) {
            self.variables_written.extend_from_slice(vars);
            self.submatrices_written.push(submatrix);
            self.matrices_written.push(m);
            // the rest of the buffer keeps its previous contents
            if !variables.is_whole_matrix(submatrix) {
                self.matrices_read.push(m);
            }
        }
    }

    fn finalize(&mut self) {
        for list in [
            &mut self.variables_read,
            &mut self.variables_written,
            &mut self.submatrices_read,
            &mut self.submatrices_written,
            &mut self.matrices_read,
            &mut self.matrices_written,
        ] {
            list.sort_unstable();
            list.dedup();
        }
    }
}

fn multi_views(computation: &Computation, indexes_multi: usize) -> Result<Vec<usize>> {
    let pairs = computation.indexes_multi.get(indexes_multi).ok_or_else(|| {
        Error::invariant(format!("indexes_multi index {} out of range", indexes_multi))
    })?;
    let mut views: Vec<usize> = pairs
        .iter()
        .filter(|&&(s, _)| s > 0)
        .map(|&(s, _)| s as usize)
        .collect();
    views.sort_unstable();
    views.dedup();
    Ok(views)
}

/// Attributes of every command, in command order
pub fn compute_command_attributes<N: Network + ?Sized>(
    network: &N,
    computation: &Computation,
    variables: &ComputationVariables,
) -> Result<Vec<CommandAttributes>> {
    let mut all = Vec::with_capacity(computation.commands.len());
    for (c, command) in computation.commands.iter().enumerate() {
        let mut attr = CommandAttributes::default();
        let mut side_effects = false;
        let mut rec = |s: usize, t: Touch| attr.record(computation, variables, s, t);
        match *command {
            Command::AllocMatrixZeroed { submatrix }
            | Command::AllocMatrixFromOtherZeroed { submatrix, .. } => rec(submatrix, Touch::Write),
            Command::AllocMatrixUndefined { .. }
            | Command::AllocMatrixFromOther { .. }
            | Command::DeallocMatrix { .. }
            | Command::NoOperation
            | Command::NoOperationMarker => {}
            Command::Propagate {
                component,
                input,
                output,
                ..
            } => {
                let props = component_properties(network, component, c)?;
                rec(input, Touch::Read);
                rec(
                    output,
                    if props.propagate_adds {
                        Touch::ReadWrite
                    } else {
                        Touch::Write
                    },
                );
            }
            Command::StoreStats { output, .. } => rec(output, Touch::Read),
            Command::Backprop {
                component,
                input_value,
                output_value,
                output_deriv,
                input_deriv,
                ..
            }
            | Command::BackpropNoModelUpdate {
                component,
                input_value,
                output_value,
                output_deriv,
                input_deriv,
                ..
            } => {
                let props = component_properties(network, component, c)?;
                rec(input_value, Touch::Read);
                rec(output_value, Touch::Read);
                rec(output_deriv, Touch::Read);
                rec(
                    input_deriv,
                    if props.backprop_adds {
                        Touch::ReadWrite
                    } else {
                        Touch::Write
                    },
                );
                side_effects = matches!(command, Command::Backprop { .. }) && props.updatable;
            }
            Command::MatrixCopy { dst, src } => {
                rec(dst, Touch::Write);
                rec(src, Touch::Read);
            }
            Command::MatrixAdd { dst, src }
            | Command::AddRows { dst, src, .. }
            | Command::AddRowRanges { dst, src, .. } => {
                rec(dst, Touch::ReadWrite);
                rec(src, Touch::Read);
            }
            Command::CopyRows { dst, src, indexes } => {
                let list = computation.indexes.get(indexes).ok_or_else(|| {
                    Error::invariant(format!("Command c{}: indexes {} out of range", c, indexes))
                })?;
                // rows with -1 keep their previous value
                let partial = list.iter().any(|&i| i < 0);
                rec(dst, if partial { Touch::ReadWrite } else { Touch::Write });
                rec(src, Touch::Read);
            }
            Command::AddRowsMulti { dst, indexes_multi } => {
                rec(dst, Touch::ReadWrite);
                for s in multi_views(computation, indexes_multi)? {
                    rec(s, Touch::Read);
                }
            }
            Command::CopyRowsMulti { dst, indexes_multi } => {
                rec(dst, Touch::Write);
                for s in multi_views(computation, indexes_multi)? {
                    rec(s, Touch::Read);
                }
            }
            Command::AddToRowsMulti { src, indexes_multi }
            | Command::CopyToRowsMulti { src, indexes_multi } => {
                rec(src, Touch::Read);
                for s in multi_views(computation, indexes_multi)? {
                    rec(s, Touch::ReadWrite);
                }
            }
            Command::AcceptInput { submatrix, .. } => rec(submatrix, Touch::Write),
            Command::ProvideOutput { submatrix, .. } => rec(submatrix, Touch::Read),
        }
        attr.has_side_effects = side_effects;
        attr.finalize();
        all.push(attr);
    }
    Ok(all)
}

fn component_properties<N: Network + ?Sized>(
    network: &N,
    component: usize,
    command: usize,
) -> Result<crate::compiler::ir::ComponentProperties> {
    network
        .component(component)
        .map(|info| info.properties)
        .ok_or_else(|| {
            Error::invariant(format!(
                "Command c{}: component {} out of range",
                command, component
            ))
        })
}

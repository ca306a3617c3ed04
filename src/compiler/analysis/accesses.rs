//! Access lists per variable and per buffer

use super::attributes::CommandAttributes;
use super::variables::ComputationVariables;
use crate::compiler::ir::{Command, Computation};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessType {
    Read,
    Write,
    ReadWrite,
}

impl AccessType {
    /// Write or ReadWrite
    pub fn writes(self) -> bool {
        matches!(self, AccessType::Write | AccessType::ReadWrite)
    }

    /// Read or ReadWrite
    pub fn reads(self) -> bool {
        matches!(self, AccessType::Read | AccessType::ReadWrite)
    }
}

/// One command touching a variable or buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    pub command_index: usize,
    pub access_type: AccessType,
}

impl Access {
    pub fn new(command_index: usize, access_type: AccessType) -> Self {
        Self {
            command_index,
            access_type,
        }
    }
}

/// Lifetime and access history of one buffer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixAccesses {
    /// Allocation, from-other allocation or AcceptInput
    pub allocate_command: Option<usize>,
    /// Deallocation, or the from-other allocation that takes the buffer over
    pub deallocate_command: Option<usize>,
    /// Ascending by command index
    pub accesses: Vec<Access>,
    pub is_input: bool,
    pub is_output: bool,
}

/// Merge sorted read and write sets into one access list entry per item
fn merge_accesses(
    read: &[usize],
    written: &[usize],
    command_index: usize,
    mut emit: impl FnMut(usize, Access),
) {
    let (mut i, mut j) = (0, 0);
    while i < read.len() || j < written.len() {
        let (item, access_type) = match (read.get(i), written.get(j)) {
            (Some(&r), Some(&w)) if r == w => {
                i += 1;
                j += 1;
                (r, AccessType::ReadWrite)
            }
            (Some(&r), Some(&w)) if r < w => {
                i += 1;
                (r, AccessType::Read)
            }
            (Some(&r), None) => {
                i += 1;
                (r, AccessType::Read)
            }
            (_, Some(&w)) => {
                j += 1;
                (w, AccessType::Write)
            }
            (None, None) => break,
        };
        emit(item, Access::new(command_index, access_type));
    }
}

/// Access list of every variable
pub fn compute_variable_accesses(
    variables: &ComputationVariables,
    attributes: &[CommandAttributes],
) -> Vec<Vec<Access>> {
    let mut accesses = vec![Vec::new(); variables.num_variables()];
    for (c, attr) in attributes.iter().enumerate() {
        merge_accesses(&attr.variables_read, &attr.variables_written, c, |v, a| {
            accesses[v].push(a)
        });
    }
    accesses
}

/// Access summary of every buffer
pub fn compute_matrix_accesses(
    computation: &Computation,
    variables: &ComputationVariables,
    attributes: &[CommandAttributes],
) -> Result<Vec<MatrixAccesses>> {
    let num_matrices = computation.matrices.len();
    let mut out = vec![MatrixAccesses::default(); num_matrices];

    for (c, attr) in attributes.iter().enumerate() {
        merge_accesses(&attr.matrices_read, &attr.matrices_written, c, |m, a| {
            out[m].accesses.push(a)
        });
    }

    let whole_matrix = |c: usize, s: usize| -> Result<usize> {
        if !variables.is_whole_matrix(s) {
            return Err(Error::invariant(format!(
                "Command c{} allocates or frees submatrix {} which is not a whole matrix",
                c, s
            )));
        }
        Ok(computation.matrix_of(s))
    };

    for (c, command) in computation.commands.iter().enumerate() {
        if let Some(s) = command.allocated_submatrix() {
            let m = whole_matrix(c, s)?;
            if out[m].allocate_command.is_some() {
                return Err(Error::invariant(format!("Matrix m{} is allocated twice", m)));
            }
            out[m].allocate_command = Some(c);
        }
        if let Some(s) = command.freed_submatrix() {
            let m = whole_matrix(c, s)?;
            if out[m].deallocate_command.is_some() {
                return Err(Error::invariant(format!("Matrix m{} is freed twice", m)));
            }
            out[m].deallocate_command = Some(c);
        }
        match *command {
            Command::AcceptInput { submatrix, .. } => {
                let m = whole_matrix(c, submatrix)?;
                out[m].is_input = true;
                if out[m].allocate_command.is_none() {
                    out[m].allocate_command = Some(c);
                }
            }
            Command::ProvideOutput { submatrix, .. } => {
                let m = whole_matrix(c, submatrix)?;
                out[m].is_output = true;
            }
            _ => {}
        }
    }
    Ok(out)
}

//! Point queries over a built [`Analyzer`]

use super::accesses::Access;
use super::Analyzer;
use crate::compiler::ir::Computation;

/// Borrowed view of a computation together with its analysis
pub struct ComputationAnalysis<'a> {
    computation: &'a Computation,
    analyzer: &'a Analyzer,
}

impl<'a> ComputationAnalysis<'a> {
    pub fn new(computation: &'a Computation, analyzer: &'a Analyzer) -> Self {
        Self {
            computation,
            analyzer,
        }
    }

    fn num_commands(&self) -> usize {
        self.computation.commands.len()
    }

    fn is_allocation(&self, access: &Access) -> bool {
        self.computation
            .commands
            .get(access.command_index)
            .map(|c| c.command_type().is_allocation())
            .unwrap_or(false)
    }

    fn variable_accesses(&self, submatrix: usize) -> impl Iterator<Item = &'a [Access]> + '_ {
        let analyzer = self.analyzer;
        analyzer
            .variables
            .variables_for_submatrix(submatrix)
            .iter()
            .map(move |&v| analyzer.variable_accesses[v].as_slice())
    }

    /// First command touching the view other than a zeroing allocation;
    /// `num_commands` if there is none
    pub fn first_access(&self, submatrix: usize) -> usize {
        self.variable_accesses(submatrix)
            .filter_map(|list| list.iter().find(|a| !self.is_allocation(a)))
            .map(|a| a.command_index)
            .min()
            .unwrap_or_else(|| self.num_commands())
    }

    /// Last command touching the view
    pub fn last_access(&self, submatrix: usize) -> Option<usize> {
        self.variable_accesses(submatrix)
            .filter_map(|list| list.last())
            .map(|a| a.command_index)
            .max()
    }

    /// First command touching the buffer, ignoring allocations;
    /// `num_commands` if there is none
    pub fn first_matrix_access(&self, matrix_index: usize) -> usize {
        self.analyzer
            .matrix_accesses
            .get(matrix_index)
            .and_then(|ma| ma.accesses.iter().find(|a| !self.is_allocation(a)))
            .map(|a| a.command_index)
            .unwrap_or_else(|| self.num_commands())
    }

    /// Last command touching the buffer, ignoring allocations
    pub fn last_matrix_access(&self, matrix_index: usize) -> Option<usize> {
        self.analyzer
            .matrix_accesses
            .get(matrix_index)
            .and_then(|ma| ma.accesses.iter().rev().find(|a| !self.is_allocation(a)))
            .map(|a| a.command_index)
    }

    /// Last command writing any part of the view; `num_commands` when the
    /// buffer is an output, since the caller reads it after the last command
    pub fn last_write_access(&self, submatrix: usize) -> Option<usize> {
        let m = self.computation.submatrices.get(submatrix)?.matrix_index;
        if self
            .analyzer
            .matrix_accesses
            .get(m)
            .map(|ma| ma.is_output)
            .unwrap_or(false)
        {
            return Some(self.num_commands());
        }
        self.variable_accesses(submatrix)
            .filter_map(|list| list.iter().rev().find(|a| a.access_type.writes()))
            .map(|a| a.command_index)
            .max()
    }

    /// First command after `command_index` that overwrites part of the view
    /// or frees its buffer; `num_commands` if neither happens
    pub fn data_invalidated_command(&self, command_index: usize, submatrix: usize) -> usize {
        let mut ans = self.num_commands();
        for list in self.variable_accesses(submatrix) {
            if let Some(a) = list
                .iter()
                .find(|a| a.command_index > command_index && a.access_type.writes())
            {
                ans = ans.min(a.command_index);
            }
        }
        if let Some(info) = self.computation.submatrices.get(submatrix) {
            if let Some(d) = self
                .analyzer
                .matrix_accesses
                .get(info.matrix_index)
                .and_then(|ma| ma.deallocate_command)
            {
                if d > command_index {
                    ans = ans.min(d);
                }
            }
        }
        ans
    }
}

//! Computation: buffers, views, auxiliary index tables and the command list

use super::command::Command;
use super::device::DeviceIndexes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sequence index of one row: (sequence, time, extra)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Index {
    /// Sequence within the minibatch
    pub n: i32,
    /// Time
    pub t: i32,
    /// Extra dimension, usually 0
    pub x: i32,
}

impl Index {
    pub fn new(n: i32, t: i32, x: i32) -> Self {
        Self { n, t, x }
    }
}

/// A row's identity: network node plus sequence index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cindex {
    /// Network node the row belongs to
    pub node_index: usize,
    pub index: Index,
}

/// A 2-D buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatrixInfo {
    pub num_rows: usize,
    pub num_cols: usize,
}

/// Optional per-buffer row labels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixDebugInfo {
    /// Buffer holds derivatives
    pub is_deriv: bool,
    /// One entry per row
    pub cindexes: Vec<Cindex>,
}

/// A rectangular window into one buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubMatrixInfo {
    /// Buffer this view looks into
    pub matrix_index: usize,
    pub row_offset: usize,
    pub num_rows: usize,
    pub col_offset: usize,
    pub num_cols: usize,
}

impl SubMatrixInfo {
    pub fn new(
        matrix_index: usize,
        row_offset: usize,
        num_rows: usize,
        col_offset: usize,
        num_cols: usize,
    ) -> Self {
        Self {
            matrix_index,
            row_offset,
            num_rows,
            col_offset,
            num_cols,
        }
    }
}

/// A compiled (or about to be compiled) computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Computation {
    /// Buffers; index 0 is the empty buffer
    pub matrices: Vec<MatrixInfo>,
    /// Either empty or one entry per buffer
    pub matrix_debug_info: Vec<MatrixDebugInfo>,
    /// Views; index 0 is the null view
    pub submatrices: Vec<SubMatrixInfo>,
    /// Number of precomputed-index objects; ids `1..=n` are valid, 0 means none
    pub num_precomputed_indexes: usize,
    /// Row gather lists for CopyRows / AddRows; -1 means no source
    pub indexes: Vec<Vec<i32>>,
    /// (view, row) lists for the *-multi commands; (-1, -1) means none
    pub indexes_multi: Vec<Vec<(i32, i32)>>,
    /// (begin, end) row ranges for AddRowRanges; (-1, -1) means empty
    pub indexes_ranges: Vec<Vec<(i32, i32)>>,
    /// Commands in execution order
    pub commands: Vec<Command>,
    /// Filled in once the computation is final
    pub device_indexes: Option<DeviceIndexes>,
}

impl Computation {
    /// Empty computation holding only the null buffer and the null view
    pub fn new() -> Self {
        Self {
            matrices: vec![MatrixInfo::default()],
            matrix_debug_info: Vec::new(),
            submatrices: vec![SubMatrixInfo::default()],
            num_precomputed_indexes: 0,
            indexes: Vec::new(),
            indexes_multi: Vec::new(),
            indexes_ranges: Vec::new(),
            commands: Vec::new(),
            device_indexes: None,
        }
    }

    /// Add a buffer and a whole-buffer view of it; returns the view index
    pub fn new_matrix(&mut self, num_rows: usize, num_cols: usize) -> usize {
        let matrix_index = self.matrices.len();
        self.matrices.push(MatrixInfo { num_rows, num_cols });
        if !self.matrix_debug_info.is_empty() {
            self.matrix_debug_info.push(MatrixDebugInfo::default());
        }
        self.submatrices.push(SubMatrixInfo::new(
            matrix_index,
            0,
            num_rows,
            0,
            num_cols,
        ));
        self.submatrices.len() - 1
    }

    /// Add a view relative to an existing view; returns the new view index
    pub fn new_sub_matrix(
        &mut self,
        base: usize,
        row_offset: usize,
        num_rows: usize,
        col_offset: usize,
        num_cols: usize,
    ) -> usize {
        let b = self.submatrices[base];
        self.submatrices.push(SubMatrixInfo::new(
            b.matrix_index,
            b.row_offset + row_offset,
            num_rows,
            b.col_offset + col_offset,
            num_cols,
        ));
        self.submatrices.len() - 1
    }

    /// Register a row gather list; returns its id
    pub fn add_indexes(&mut self, indexes: Vec<i32>) -> usize {
        self.indexes.push(indexes);
        self.indexes.len() - 1
    }

    /// Register a (view, row) list; returns its id
    pub fn add_indexes_multi(&mut self, pairs: Vec<(i32, i32)>) -> usize {
        self.indexes_multi.push(pairs);
        self.indexes_multi.len() - 1
    }

    /// Register a row range list; returns its id
    pub fn add_indexes_ranges(&mut self, ranges: Vec<(i32, i32)>) -> usize {
        self.indexes_ranges.push(ranges);
        self.indexes_ranges.len() - 1
    }

    /// Attach row labels to a buffer, creating the debug-info table if needed
    pub fn set_debug_info(&mut self, matrix_index: usize, info: MatrixDebugInfo) {
        if self.matrix_debug_info.len() < self.matrices.len() {
            self.matrix_debug_info
                .resize(self.matrices.len(), MatrixDebugInfo::default());
        }
        self.matrix_debug_info[matrix_index] = info;
    }

    /// Number of commands, including no-ops
    pub fn num_commands(&self) -> usize {
        self.commands.len()
    }

    /// Buffer a view belongs to
    pub fn matrix_of(&self, submatrix: usize) -> usize {
        self.submatrices[submatrix].matrix_index
    }

    /// True if the view covers its whole buffer
    pub fn is_whole_matrix(&self, submatrix: usize) -> bool {
        let Some(s) = self.submatrices.get(submatrix) else {
            return false;
        };
        let Some(m) = self.matrices.get(s.matrix_index) else {
            return false;
        };
        s.row_offset == 0
            && s.col_offset == 0
            && s.num_rows == m.num_rows
            && s.num_cols == m.num_cols
    }

    /// Index of a whole-buffer view of `matrix_index`, if one exists
    pub fn whole_submatrix(&self, matrix_index: usize) -> Option<usize> {
        (1..self.submatrices.len())
            .find(|&s| self.submatrices[s].matrix_index == matrix_index && self.is_whole_matrix(s))
    }

    /// Drop `NoOperation` commands
    pub fn remove_no_ops(&mut self) {
        self.commands.retain(|c| !matches!(c, Command::NoOperation));
    }

    /// Remove views and buffers nothing refers to, merge identical views and
    /// renumber everything densely. Index 0 of each table is preserved.
    pub fn renumber(&mut self) {
        let num_submatrices = self.submatrices.len();
        let mut referenced = vec![false; num_submatrices];
        referenced[0] = true;
        for command in &self.commands {
            for s in command.submatrices() {
                if s < num_submatrices {
                    referenced[s] = true;
                }
            }
        }
        for pairs in &self.indexes_multi {
            for &(s, _) in pairs {
                if s > 0 && (s as usize) < num_submatrices {
                    referenced[s as usize] = true;
                }
            }
        }

        let num_matrices = self.matrices.len();
        let mut matrix_used = vec![false; num_matrices];
        matrix_used[0] = true;
        for (s, info) in self.submatrices.iter().enumerate() {
            if referenced[s] && info.matrix_index < num_matrices {
                matrix_used[info.matrix_index] = true;
            }
        }

        let mut matrix_map = vec![0usize; num_matrices];
        let mut new_matrices = Vec::new();
        let mut new_debug_info = Vec::new();
        let has_debug_info = self.matrix_debug_info.len() == num_matrices;
        for m in 0..num_matrices {
            if matrix_used[m] {
                matrix_map[m] = new_matrices.len();
                new_matrices.push(self.matrices[m]);
                if has_debug_info {
                    new_debug_info.push(std::mem::take(&mut self.matrix_debug_info[m]));
                }
            }
        }

        let mut submatrix_map = vec![0usize; num_submatrices];
        let mut new_submatrices: Vec<SubMatrixInfo> = vec![SubMatrixInfo::default()];
        let mut seen: HashMap<SubMatrixInfo, usize> = HashMap::new();
        for s in 1..num_submatrices {
            if !referenced[s] {
                continue;
            }
            let mut info = self.submatrices[s];
            info.matrix_index = matrix_map[info.matrix_index];
            let new_index = *seen.entry(info).or_insert_with(|| {
                new_submatrices.push(info);
                new_submatrices.len() - 1
            });
            submatrix_map[s] = new_index;
        }

        for command in &mut self.commands {
            command.map_submatrices(|s| submatrix_map.get(s).copied().unwrap_or(s));
        }
        for pairs in &mut self.indexes_multi {
            for pair in pairs.iter_mut() {
                if pair.0 > 0 && (pair.0 as usize) < num_submatrices {
                    pair.0 = submatrix_map[pair.0 as usize] as i32;
                }
            }
        }

        self.matrices = new_matrices;
        self.submatrices = new_submatrices;
        if has_debug_info {
            self.matrix_debug_info = new_debug_info;
        }
    }
}

impl Default for Computation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_matrix_returns_whole_view() {
        let mut c = Computation::new();
        let s = c.new_matrix(10, 4);
        assert_eq!(s, 1);
        assert!(c.is_whole_matrix(s));
        let part = c.new_sub_matrix(s, 2, 3, 0, 4);
        assert!(!c.is_whole_matrix(part));
        assert_eq!(c.submatrices[part].row_offset, 2);
        assert_eq!(c.matrix_of(part), 1);
        assert_eq!(c.whole_submatrix(1), Some(s));
        assert!(!c.is_whole_matrix(99));
    }

    #[test]
    fn test_renumber_drops_unreferenced() {
        let mut c = Computation::new();
        let a = c.new_matrix(2, 2);
        let _unused = c.new_matrix(3, 3);
        let b = c.new_matrix(2, 2);
        let dup = c.new_sub_matrix(b, 0, 2, 0, 2);
        c.commands.push(Command::AllocMatrixZeroed { submatrix: a });
        c.commands.push(Command::AllocMatrixZeroed { submatrix: b });
        c.commands.push(Command::MatrixCopy { dst: dup, src: a });
        c.commands.push(Command::NoOperation);
        c.remove_no_ops();
        c.renumber();

        assert_eq!(c.matrices.len(), 3);
        assert_eq!(c.submatrices.len(), 3);
        assert_eq!(c.commands.len(), 3);
        // the duplicate view of b collapses onto b's whole view
        assert_eq!(c.commands[2], Command::MatrixCopy { dst: 2, src: 1 });
        assert_eq!(c.submatrices[2].matrix_index, 2);
    }
}

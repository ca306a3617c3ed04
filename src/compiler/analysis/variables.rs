//! Split-point variables
//!
//! Every buffer is cut into the coarsest grid of rectangles such that each
//! view of the buffer is an exact union of grid cells. A cell is a
//! "variable", the unit of liveness tracking. Two views that overlap share
//! variables, so aliasing is handled without any special casing.

use crate::compiler::ir::Computation;
use crate::{Error, Result};

/// Variable numbering for one computation
#[derive(Debug, Clone)]
pub struct ComputationVariables {
    /// Sorted, deduplicated row boundaries per buffer
    row_split_points: Vec<Vec<usize>>,
    /// Sorted, deduplicated column boundaries per buffer
    column_split_points: Vec<Vec<usize>>,
    /// First variable of each buffer; one extra trailing entry
    matrix_to_variable_index: Vec<usize>,
    variable_to_matrix: Vec<usize>,
    variables_for_submatrix: Vec<Vec<usize>>,
    submatrix_is_whole_matrix: Vec<bool>,
}

impl ComputationVariables {
    /// Compute split points and variables for `computation`
    pub fn new(computation: &Computation) -> Result<Self> {
        let num_matrices = computation.matrices.len();
        let mut row_split_points: Vec<Vec<usize>> = Vec::with_capacity(num_matrices);
        let mut column_split_points: Vec<Vec<usize>> = Vec::with_capacity(num_matrices);
        for info in &computation.matrices {
            row_split_points.push(vec![0, info.num_rows]);
            column_split_points.push(vec![0, info.num_cols]);
        }

        for (s, info) in computation.submatrices.iter().enumerate().skip(1) {
            let m = info.matrix_index;
            let Some(matrix) = computation.matrices.get(m) else {
                return Err(Error::invariant(format!(
                    "Submatrix {} refers to nonexistent matrix m{}",
                    s, m
                )));
            };
            if info.row_offset + info.num_rows > matrix.num_rows
                || info.col_offset + info.num_cols > matrix.num_cols
            {
                return Err(Error::invariant(format!(
                    "Submatrix {} lies outside matrix m{}",
                    s, m
                )));
            }
            row_split_points[m].push(info.row_offset);
            row_split_points[m].push(info.row_offset + info.num_rows);
            column_split_points[m].push(info.col_offset);
            column_split_points[m].push(info.col_offset + info.num_cols);
        }

        let mut matrix_to_variable_index = Vec::with_capacity(num_matrices + 1);
        let mut variable_to_matrix = Vec::new();
        for m in 0..num_matrices {
            row_split_points[m].sort_unstable();
            row_split_points[m].dedup();
            column_split_points[m].sort_unstable();
            column_split_points[m].dedup();
            matrix_to_variable_index.push(variable_to_matrix.len());
            let n = (row_split_points[m].len() - 1) * (column_split_points[m].len() - 1);
            variable_to_matrix.extend(std::iter::repeat(m).take(n));
        }
        matrix_to_variable_index.push(variable_to_matrix.len());

        let mut vars = Self {
            row_split_points,
            column_split_points,
            matrix_to_variable_index,
            variable_to_matrix,
            variables_for_submatrix: Vec::with_capacity(computation.submatrices.len()),
            submatrix_is_whole_matrix: Vec::with_capacity(computation.submatrices.len()),
        };

        for (s, info) in computation.submatrices.iter().enumerate() {
            let m = info.matrix_index;
            let rows = &vars.row_split_points[m];
            let cols = &vars.column_split_points[m];
            let split = |points: &Vec<usize>, value: usize| {
                points.binary_search(&value).map_err(|_| {
                    Error::invariant(format!(
                        "Boundary {} of submatrix {} is not a split point of m{}",
                        value, s, m
                    ))
                })
            };
            let r0 = split(rows, info.row_offset)?;
            let r1 = split(rows, info.row_offset + info.num_rows)?;
            let c0 = split(cols, info.col_offset)?;
            let c1 = split(cols, info.col_offset + info.num_cols)?;
            let ncols = cols.len() - 1;
            let start = vars.matrix_to_variable_index[m];
            let mut list = Vec::with_capacity((r1 - r0) * (c1 - c0));
            for r in r0..r1 {
                for c in c0..c1 {
                    list.push(start + r * ncols + c);
                }
            }
            let whole = s != 0 && r0 == 0 && c0 == 0 && r1 == rows.len() - 1 && c1 == ncols;
            vars.variables_for_submatrix.push(list);
            vars.submatrix_is_whole_matrix.push(whole);
        }
        Ok(vars)
    }

    pub fn num_variables(&self) -> usize {
        self.variable_to_matrix.len()
    }

    /// Variables covered by a view, ascending
    pub fn variables_for_submatrix(&self, submatrix: usize) -> &[usize] {
        self.variables_for_submatrix
            .get(submatrix)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// All variables of a buffer, ascending
    pub fn variables_for_matrix(&self, matrix_index: usize) -> std::ops::Range<usize> {
        match (
            self.matrix_to_variable_index.get(matrix_index),
            self.matrix_to_variable_index.get(matrix_index + 1),
        ) {
            (Some(&a), Some(&b)) => a..b,
            _ => 0..0,
        }
    }

    pub fn matrix_for_variable(&self, variable: usize) -> usize {
        self.variable_to_matrix[variable]
    }

    /// True if the view spans every variable of its buffer
    pub fn is_whole_matrix(&self, submatrix: usize) -> bool {
        self.submatrix_is_whole_matrix
            .get(submatrix)
            .copied()
            .unwrap_or(false)
    }

    /// e.g. `m3(10:19,0:39)`; `:` stands for an axis that is not split, and a
    /// buffer with a single variable is just `m3`
    pub fn describe_variable(&self, variable: usize) -> String {
        let m = self.variable_to_matrix[variable];
        let rows = &self.row_split_points[m];
        let cols = &self.column_split_points[m];
        let ncols = cols.len() - 1;
        let offset = variable - self.matrix_to_variable_index[m];
        let (r, c) = (offset / ncols, offset % ncols);
        if rows.len() == 2 && cols.len() == 2 {
            return format!("m{}", m);
        }
        let axis = |points: &Vec<usize>, i: usize| {
            if points.len() == 2 {
                ":".to_string()
            } else {
                format!("{}:{}", points[i], points[i + 1] - 1)
            }
        };
        format!("m{}({},{})", m, axis(rows, r), axis(cols, c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_points_and_description() {
        let mut c = Computation::new();
        let whole = c.new_matrix(20, 40);
        let top = c.new_sub_matrix(whole, 0, 10, 0, 40);
        let bottom = c.new_sub_matrix(whole, 10, 10, 0, 40);
        let single = c.new_matrix(5, 5);

        let vars = ComputationVariables::new(&c).unwrap();
        assert_eq!(vars.num_variables(), 3);
        assert_eq!(vars.variables_for_submatrix(whole), &[0, 1]);
        assert_eq!(vars.variables_for_submatrix(top), &[0]);
        assert_eq!(vars.variables_for_submatrix(bottom), &[1]);
        assert!(vars.variables_for_submatrix(0).is_empty());
        assert!(vars.is_whole_matrix(whole));
        assert!(!vars.is_whole_matrix(top));
        assert!(vars.is_whole_matrix(single));
        assert_eq!(vars.variables_for_matrix(1), 0..2);
        assert_eq!(vars.matrix_for_variable(2), 2);
        assert_eq!(vars.describe_variable(1), "m1(10:19,:)");
        assert_eq!(vars.describe_variable(2), "m2");
    }

    #[test]
    fn test_overlapping_views_share_variables() {
        let mut c = Computation::new();
        let whole = c.new_matrix(10, 10);
        let a = c.new_sub_matrix(whole, 0, 6, 0, 10);
        let b = c.new_sub_matrix(whole, 4, 6, 0, 4);
        let vars = ComputationVariables::new(&c).unwrap();
        // rows {0,4,6,10} x cols {0,4,10}
        assert_eq!(vars.num_variables(), 6);
        let va = vars.variables_for_submatrix(a);
        let vb = vars.variables_for_submatrix(b);
        assert!(va.iter().any(|v| vb.contains(v)));
        assert_eq!(vars.describe_variable(vb[0]), "m1(4:5,0:3)");
    }

    #[test]
    fn test_view_outside_matrix_is_rejected() {
        let mut c = Computation::new();
        let whole = c.new_matrix(4, 4);
        c.new_sub_matrix(whole, 2, 4, 0, 4);
        let err = ComputationVariables::new(&c).unwrap_err();
        assert!(err.is_invariant_violation());
    }
}

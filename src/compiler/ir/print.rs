//! Human readable rendering of computations
//!
//! ```text
//! # computation
//! matrix m1 = 10 x 4
//! c0: m1 = zeroed()
//! c1: m2 = propagate[affine](m1)
//! ```

use super::command::Command;
use super::computation::Computation;
use std::fmt;

/// Render a view as `m3` (whole buffer) or `m3(2:5, 0:9)` (inclusive ranges)
pub fn format_submatrix(computation: &Computation, submatrix: usize) -> String {
    let Some(info) = computation.submatrices.get(submatrix) else {
        return format!("<bad view {}>", submatrix);
    };
    if submatrix == 0 {
        return "[]".to_string();
    }
    if computation.is_whole_matrix(submatrix) {
        format!("m{}", info.matrix_index)
    } else {
        format!(
            "m{}({}:{}, {}:{})",
            info.matrix_index,
            info.row_offset,
            (info.row_offset + info.num_rows).saturating_sub(1),
            info.col_offset,
            (info.col_offset + info.num_cols).saturating_sub(1)
        )
    }
}

fn format_indexes(list: Option<&Vec<i32>>) -> String {
    match list {
        Some(v) => {
            let parts: Vec<String> = v.iter().map(|i| i.to_string()).collect();
            format!("[{}]", parts.join(","))
        }
        None => "[?]".to_string(),
    }
}

fn format_pairs(
    computation: &Computation,
    list: Option<&Vec<(i32, i32)>>,
    as_views: bool,
) -> String {
    match list {
        Some(v) => {
            let parts: Vec<String> = v
                .iter()
                .map(|&(a, b)| {
                    if a < 0 {
                        "-".to_string()
                    } else if as_views {
                        format!("{}[{}]", format_submatrix(computation, a as usize), b)
                    } else {
                        format!("{}:{}", a, b)
                    }
                })
                .collect();
            format!("[{}]", parts.join(","))
        }
        None => "[?]".to_string(),
    }
}

/// Render one command as a line of pseudo code (without the `cN:` prefix)
pub fn format_command(computation: &Computation, command: &Command) -> String {
    let sm = |s: usize| format_submatrix(computation, s);
    match *command {
        Command::AllocMatrixZeroed { submatrix } => format!("{} = zeroed()", sm(submatrix)),
        Command::AllocMatrixUndefined { submatrix } => format!("{} = undefined()", sm(submatrix)),
        Command::AllocMatrixFromOther { submatrix, from } => {
            format!("{}.swap({}) [dim = {}]", sm(submatrix), sm(from), dims(computation, submatrix))
        }
        Command::AllocMatrixFromOtherZeroed { submatrix, from } => format!(
            "{}.swap({}); {}.zero() [dim = {}]",
            sm(submatrix),
            sm(from),
            sm(submatrix),
            dims(computation, submatrix)
        ),
        Command::DeallocMatrix { submatrix } => format!("{} = []", sm(submatrix)),
        Command::Propagate {
            component,
            precomputed_indexes,
            input,
            output,
        } => format!(
            "{} = propagate[c{}, p{}]({})",
            sm(output),
            component,
            precomputed_indexes,
            sm(input)
        ),
        Command::StoreStats { component, output } => {
            format!("c{}.store-stats({})", component, sm(output))
        }
        Command::Backprop {
            component,
            precomputed_indexes,
            input_value,
            output_value,
            output_deriv,
            input_deriv,
        }
        | Command::BackpropNoModelUpdate {
            component,
            precomputed_indexes,
            input_value,
            output_value,
            output_deriv,
            input_deriv,
        } => format!(
            "{} = {}[c{}, p{}]({}, {}, {})",
            sm(input_deriv),
            command.command_type().name(),
            component,
            precomputed_indexes,
            sm(input_value),
            sm(output_value),
            sm(output_deriv)
        ),
        Command::MatrixCopy { dst, src } => format!("{} = {}", sm(dst), sm(src)),
        Command::MatrixAdd { dst, src } => format!("{} += {}", sm(dst), sm(src)),
        Command::CopyRows { dst, src, indexes } => format!(
            "{}.copy-rows({}, {})",
            sm(dst),
            sm(src),
            format_indexes(computation.indexes.get(indexes))
        ),
        Command::AddRows { dst, src, indexes } => format!(
            "{}.add-rows({}, {})",
            sm(dst),
            sm(src),
            format_indexes(computation.indexes.get(indexes))
        ),
        Command::CopyRowsMulti { dst, indexes_multi }
        | Command::AddRowsMulti { dst, indexes_multi } => format!(
            "{}.{}({})",
            sm(dst),
            command.command_type().name(),
            format_pairs(computation, computation.indexes_multi.get(indexes_multi), true)
        ),
        Command::CopyToRowsMulti { src, indexes_multi }
        | Command::AddToRowsMulti { src, indexes_multi } => format!(
            "{}.{}({})",
            sm(src),
            command.command_type().name(),
            format_pairs(computation, computation.indexes_multi.get(indexes_multi), true)
        ),
        Command::AddRowRanges {
            dst,
            src,
            indexes_ranges,
        } => format!(
            "{}.add-row-ranges({}, {})",
            sm(dst),
            sm(src),
            format_pairs(computation, computation.indexes_ranges.get(indexes_ranges), false)
        ),
        Command::AcceptInput { submatrix, node } => {
            format!("{} = user-input(node {})", sm(submatrix), node)
        }
        Command::ProvideOutput { submatrix, node } => {
            format!("output(node {}) = {}", node, sm(submatrix))
        }
        Command::NoOperation => "[no-op]".to_string(),
        Command::NoOperationMarker => "# begin backward commands".to_string(),
    }
}

fn dims(computation: &Computation, submatrix: usize) -> String {
    match computation.submatrices.get(submatrix) {
        Some(info) => format!("{} x {}", info.num_rows, info.num_cols),
        None => "?".to_string(),
    }
}

impl fmt::Display for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# computation")?;
        for (m, info) in self.matrices.iter().enumerate().skip(1) {
            write!(f, "matrix m{} = {} x {}", m, info.num_rows, info.num_cols)?;
            if let Some(debug) = self.matrix_debug_info.get(m) {
                if debug.is_deriv {
                    write!(f, " (deriv)")?;
                }
            }
            writeln!(f)?;
        }
        for (c, command) in self.commands.iter().enumerate() {
            writeln!(f, "c{}: {}", c, format_command(self, command))?;
        }
        Ok(())
    }
}

//! Derivative-time limiting
//!
//! Derivatives at times outside `[min_deriv_time, max_deriv_time]` are
//! treated as zero. A backprop command whose output-derivative rows all lie
//! outside the window therefore contributes nothing:
//! - if it has no input derivative, or adds into it, it is removed;
//! - otherwise it still has to write its input derivative, but its model
//!   update is dropped (`Backprop` becomes `BackpropNoModelUpdate`).
//!
//! Row times come from the matrix debug info; without it the pass does
//! nothing.

use crate::compiler::ir::{Command, Computation, Network};
use tracing::debug;

fn outside(t: i32, min: Option<i32>, max: Option<i32>) -> bool {
    min.is_some_and(|lo| t < lo) || max.is_some_and(|hi| t > hi)
}

/// True if every row of `submatrix` is labelled with a time outside the window
fn all_rows_outside(
    computation: &Computation,
    submatrix: usize,
    min: Option<i32>,
    max: Option<i32>,
) -> bool {
    let Some(info) = computation.submatrices.get(submatrix) else {
        return false;
    };
    let Some(debug_info) = computation.matrix_debug_info.get(info.matrix_index) else {
        return false;
    };
    let Some(rows) = debug_info
        .cindexes
        .get(info.row_offset..info.row_offset + info.num_rows)
    else {
        return false;
    };
    !rows.is_empty() && rows.iter().all(|c| outside(c.index.t, min, max))
}

/// Returns the number of commands removed or demoted
pub fn limit_derivative_times<N: Network + ?Sized>(
    network: &N,
    min_deriv_time: Option<i32>,
    max_deriv_time: Option<i32>,
    computation: &mut Computation,
) -> usize {
    if min_deriv_time.is_none() && max_deriv_time.is_none() {
        return 0;
    }
    if computation.matrix_debug_info.len() != computation.matrices.len() {
        debug!("limit-derivative-times skipped: no matrix debug info");
        return 0;
    }
    let mut changed = 0;
    for c in 0..computation.commands.len() {
        let (component, output_deriv, input_deriv, updates) = match computation.commands[c] {
            Command::Backprop {
                component,
                output_deriv,
                input_deriv,
                ..
            } => (component, output_deriv, input_deriv, true),
            Command::BackpropNoModelUpdate {
                component,
                output_deriv,
                input_deriv,
                ..
            } => (component, output_deriv, input_deriv, false),
            _ => continue,
        };
        let Some(info) = network.component(component) else {
            continue;
        };
        if !all_rows_outside(computation, output_deriv, min_deriv_time, max_deriv_time) {
            continue;
        }
        if input_deriv == 0 || info.properties.backprop_adds {
            computation.commands[c] = Command::NoOperation;
            changed += 1;
        } else if updates && info.properties.updatable {
            if let Command::Backprop {
                component,
                precomputed_indexes,
                input_value,
                output_value,
                output_deriv,
                input_deriv,
            } = computation.commands[c]
            {
                computation.commands[c] = Command::BackpropNoModelUpdate {
                    component,
                    precomputed_indexes,
                    input_value,
                    output_value,
                    output_deriv,
                    input_deriv,
                };
                changed += 1;
            }
        }
    }
    computation.remove_no_ops();
    changed
}

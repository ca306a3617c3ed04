//! Model-update consolidation
//!
//! A simple updatable component that is backpropagated several times (for
//! instance once per time step) would update its parameters once per
//! command. Because a simple component treats rows independently, the same
//! update is obtained from a single backprop over the row-wise concatenation
//! of all inputs, outputs and output derivatives:
//!
//! ```text
//! before                          after
//! c5: backprop[c2](x1, y1, dy1)   m9 = undefined() ...
//!                                 m9(0:9, :) = x1 ...
//!                                 (c5 dropped, or kept without update)
//! c8: backprop[c2](x2, y2, dy2)   m9(10:19, :) = x2 ...
//!                                 backprop[c2](m9, m10, m11)
//!                                 m9 = [] ...
//! ```

use crate::compiler::ir::{Cindex, Command, Computation, MatrixDebugInfo, Network};
use tracing::debug;

/// The three views a consolidated backprop reads
const ROLES: usize = 3;

struct Update {
    position: usize,
    /// input value, output value, output derivative
    reads: [usize; ROLES],
    input_deriv: usize,
    precomputed_indexes: usize,
}

/// Returns the number of components whose updates were consolidated
pub fn consolidate_model_update<N: Network + ?Sized>(
    network: &N,
    computation: &mut Computation,
) -> usize {
    let mut consolidated = 0;
    for component in 0..network.num_components() {
        let Some(info) = network.component(component) else {
            continue;
        };
        if !info.properties.simple || !info.properties.updatable {
            continue;
        }
        let updates: Vec<Update> = computation
            .commands
            .iter()
            .enumerate()
            .filter_map(|(position, cmd)| match *cmd {
                Command::Backprop {
                    component: k,
                    precomputed_indexes,
                    input_value,
                    output_value,
                    output_deriv,
                    input_deriv,
                } if k == component => Some(Update {
                    position,
                    reads: [input_value, output_value, output_deriv],
                    input_deriv,
                    precomputed_indexes,
                }),
                _ => None,
            })
            .collect();
        if updates.len() < 2 {
            continue;
        }
        if consolidate_component(computation, component, &updates) {
            debug!(
                component = info.name.as_str(),
                commands = updates.len(),
                "consolidated model update"
            );
            consolidated += 1;
        }
    }
    consolidated
}

fn consolidate_component(
    computation: &mut Computation,
    component: usize,
    updates: &[Update],
) -> bool {
    if updates.iter().any(|u| u.precomputed_indexes != 0) {
        return false;
    }

    // per role: None when no command supplies it
    let mut shapes: [Option<(usize, usize)>; ROLES] = [None; ROLES];
    for (role, shape) in shapes.iter_mut().enumerate() {
        let views: Vec<usize> = updates.iter().map(|u| u.reads[role]).collect();
        if views.iter().all(|&s| s == 0) {
            continue;
        }
        if views.iter().any(|&s| s == 0) {
            return false;
        }
        let cols = computation.submatrices[views[0]].num_cols;
        if views.iter().any(|&s| computation.submatrices[s].num_cols != cols) {
            return false;
        }
        let rows: usize = views.iter().map(|&s| computation.submatrices[s].num_rows).sum();
        *shape = Some((rows, cols));
    }
    if shapes[2].is_none() {
        return false;
    }

    let has_debug_info = !computation.matrix_debug_info.is_empty();
    let mut wholes: [usize; ROLES] = [0; ROLES];
    let mut segments: Vec<[usize; ROLES]> = vec![[0; ROLES]; updates.len()];
    for role in 0..ROLES {
        let Some((rows, cols)) = shapes[role] else {
            continue;
        };
        let whole = computation.new_matrix(rows, cols);
        wholes[role] = whole;
        let mut offset = 0;
        let mut cindexes: Vec<Cindex> = Vec::with_capacity(rows);
        for (i, u) in updates.iter().enumerate() {
            let src = computation.submatrices[u.reads[role]];
            segments[i][role] = computation.new_sub_matrix(whole, offset, src.num_rows, 0, cols);
            offset += src.num_rows;
            if has_debug_info {
                if let Some(labels) = computation
                    .matrix_debug_info
                    .get(src.matrix_index)
                    .and_then(|d| d.cindexes.get(src.row_offset..src.row_offset + src.num_rows))
                {
                    cindexes.extend_from_slice(labels);
                }
            }
        }
        if has_debug_info && cindexes.len() == rows {
            let m = computation.matrix_of(whole);
            computation.set_debug_info(
                m,
                MatrixDebugInfo {
                    is_deriv: role == 2,
                    cindexes,
                },
            );
        }
    }

    let first = updates[0].position;
    let last = updates[updates.len() - 1].position;
    let old = std::mem::take(&mut computation.commands);
    let mut commands = Vec::with_capacity(old.len() + 4 * updates.len() + 2 * ROLES);
    let mut next = 0;
    for (c, cmd) in old.into_iter().enumerate() {
        if c == first {
            for &whole in wholes.iter().filter(|&&w| w != 0) {
                commands.push(Command::AllocMatrixUndefined { submatrix: whole });
            }
        }
        if next < updates.len() && updates[next].position == c {
            let u = &updates[next];
            for role in 0..ROLES {
                if wholes[role] != 0 {
                    commands.push(Command::MatrixCopy {
                        dst: segments[next][role],
                        src: u.reads[role],
                    });
                }
            }
            if u.input_deriv != 0 {
                commands.push(Command::BackpropNoModelUpdate {
                    component,
                    precomputed_indexes: 0,
                    input_value: u.reads[0],
                    output_value: u.reads[1],
                    output_deriv: u.reads[2],
                    input_deriv: u.input_deriv,
                });
            }
            next += 1;
        } else {
            commands.push(cmd);
        }
        if c == last {
            commands.push(Command::Backprop {
                component,
                precomputed_indexes: 0,
                input_value: wholes[0],
                output_value: wholes[1],
                output_deriv: wholes[2],
                input_deriv: 0,
            });
            for &whole in wholes.iter().filter(|&&w| w != 0) {
                commands.push(Command::DeallocMatrix { submatrix: whole });
            }
        }
    }
    computation.commands = commands;
    true
}

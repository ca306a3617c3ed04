//! Allocation reuse
//!
//! When a buffer is freed and another buffer of the same shape is allocated
//! with nothing but sizing commands in between, the allocation takes over
//! the freed storage instead: the deallocation becomes a no-op and the
//! allocation becomes `AllocMatrixFromOther{,Zeroed}`. Deallocations are
//! visited latest first; each is paired with the earliest still-unused
//! allocation of its shape that follows it.

use crate::compiler::ir::{Command, Computation, Network};
use std::collections::BTreeMap;

#[derive(Default)]
struct ShapeGroup {
    deallocs: Vec<usize>,
    allocs: Vec<usize>,
}

/// Returns the number of pairs formed
pub fn remove_unnecessary_allocation<N: Network + ?Sized>(
    _network: &N,
    computation: &mut Computation,
) -> usize {
    let mut groups: BTreeMap<(usize, usize), ShapeGroup> = BTreeMap::new();
    for (c, command) in computation.commands.iter().enumerate() {
        let (submatrix, is_alloc) = match *command {
            Command::AllocMatrixZeroed { submatrix }
            | Command::AllocMatrixUndefined { submatrix } => (submatrix, true),
            Command::DeallocMatrix { submatrix } => (submatrix, false),
            _ => continue,
        };
        let Some(info) = computation.submatrices.get(submatrix) else {
            continue;
        };
        let group = groups.entry((info.num_rows, info.num_cols)).or_default();
        if is_alloc {
            group.allocs.push(c);
        } else {
            group.deallocs.push(c);
        }
    }

    let commands = &computation.commands;
    let only_sizing_between = |d: usize, a: usize| {
        commands[d + 1..a]
            .iter()
            .all(|cmd| cmd.command_type().is_sizing() || matches!(cmd, Command::NoOperation))
    };
    let matrix_at = |c: usize| {
        commands[c]
            .allocated_submatrix()
            .or_else(|| commands[c].freed_submatrix())
            .map(|s| computation.matrix_of(s))
    };

    let mut pairs: Vec<(usize, usize)> = Vec::new();
    for group in groups.values() {
        let mut used = vec![false; group.allocs.len()];
        for &d in group.deallocs.iter().rev() {
            let Some(i) = (0..group.allocs.len()).find(|&i| !used[i] && group.allocs[i] > d) else {
                continue;
            };
            let a = group.allocs[i];
            if only_sizing_between(d, a) && matrix_at(d) != matrix_at(a) {
                used[i] = true;
                pairs.push((d, a));
            }
        }
    }

    for &(d, a) in &pairs {
        let Command::DeallocMatrix { submatrix: from } = computation.commands[d] else {
            continue;
        };
        computation.commands[a] = match computation.commands[a] {
            Command::AllocMatrixZeroed { submatrix } => {
                Command::AllocMatrixFromOtherZeroed { submatrix, from }
            }
            Command::AllocMatrixUndefined { submatrix } => {
                Command::AllocMatrixFromOther { submatrix, from }
            }
            _ => continue,
        };
        computation.commands[d] = Command::NoOperation;
    }
    pairs.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::NetworkSpec;

    #[test]
    fn test_pairs_adjacent_same_shape() {
        let net = NetworkSpec::new();
        let mut c = Computation::new();
        let x = c.new_matrix(3, 3);
        let y = c.new_matrix(3, 3);
        let z = c.new_matrix(2, 3);
        c.commands = vec![
            Command::AllocMatrixZeroed { submatrix: x },
            Command::DeallocMatrix { submatrix: x },
            Command::AllocMatrixUndefined { submatrix: z },
            Command::AllocMatrixZeroed { submatrix: y },
            Command::DeallocMatrix { submatrix: y },
            Command::DeallocMatrix { submatrix: z },
        ];
        assert_eq!(remove_unnecessary_allocation(&net, &mut c), 1);
        assert_eq!(c.commands[1], Command::NoOperation);
        assert_eq!(
            c.commands[3],
            Command::AllocMatrixFromOtherZeroed { submatrix: y, from: x }
        );
        // z has a different shape and is left alone
        assert_eq!(c.commands[2], Command::AllocMatrixUndefined { submatrix: z });
    }

    #[test]
    fn test_compute_command_in_between_blocks_pairing() {
        let net = NetworkSpec::new();
        let mut c = Computation::new();
        let x = c.new_matrix(3, 3);
        let y = c.new_matrix(3, 3);
        let w = c.new_matrix(3, 3);
        c.commands = vec![
            Command::DeallocMatrix { submatrix: x },
            Command::MatrixCopy { dst: w, src: w },
            Command::AllocMatrixUndefined { submatrix: y },
        ];
        assert_eq!(remove_unnecessary_allocation(&net, &mut c), 0);
        assert_eq!(c.commands[0], Command::DeallocMatrix { submatrix: x });
    }
}

//! Lifetime tightening
//!
//! Each command gets rank `3c`. A plain allocation is re-ranked to just
//! before the first command that uses its buffer (`3·first - 1`), a plain
//! deallocation to just after the last one (`3·last + 1`), and the list is
//! stably sorted. Only sizing commands move, and the set of commands is
//! unchanged. Input/output commands and from-other allocations stay put.

use crate::compiler::analysis::Analyzer;
use crate::compiler::ir::{Command, Computation, Network};
use tracing::debug;

/// Returns the number of commands that moved
pub fn move_sizing_commands<N: Network + ?Sized>(
    network: &N,
    computation: &mut Computation,
) -> usize {
    let analyzer = match Analyzer::new(network, computation) {
        Ok(a) => a,
        Err(e) => {
            debug!(error = %e, "move-sizing-commands skipped");
            return 0;
        }
    };
    let num_commands = computation.commands.len();
    let mut ranks: Vec<(usize, usize)> = (0..num_commands).map(|c| (3 * c, c)).collect();

    for ma in analyzer.matrix_accesses.iter().skip(1) {
        if let Some(a) = ma.allocate_command {
            if matches!(
                computation.commands[a],
                Command::AllocMatrixZeroed { .. } | Command::AllocMatrixUndefined { .. }
            ) {
                if let Some(first) = ma.accesses.iter().find(|x| x.command_index != a) {
                    if first.command_index > a {
                        ranks[a].0 = 3 * first.command_index - 1;
                    }
                }
            }
        }
        if let Some(d) = ma.deallocate_command {
            if matches!(computation.commands[d], Command::DeallocMatrix { .. }) {
                if let Some(last) = ma.accesses.last() {
                    if last.command_index < d {
                        ranks[d].0 = 3 * last.command_index + 1;
                    }
                }
            }
        }
    }

    // sort_by_key is stable: equal ranks keep their original order
    ranks.sort_by_key(|&(rank, _)| rank);
    let moved = ranks
        .iter()
        .enumerate()
        .filter(|&(new_pos, &(_, old_pos))| new_pos != old_pos)
        .count();
    if moved == 0 {
        return 0;
    }
    let mut old: Vec<Option<Command>> = std::mem::take(&mut computation.commands)
        .into_iter()
        .map(Some)
        .collect();
    computation.commands = ranks
        .iter()
        .filter_map(|&(_, c)| old[c].take())
        .collect();
    moved
}

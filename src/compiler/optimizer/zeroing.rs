//! Zero elision
//!
//! A zeroed allocation becomes an undefined allocation when, for every
//! variable of the buffer, the access right after the allocation is a pure
//! write. A variable touched only by the allocation keeps the buffer zeroed
//! if the buffer is an output: the caller would otherwise receive garbage
//! where it expects zeros (e.g. a derivative nothing contributed to).

use crate::compiler::analysis::{AccessType, Analyzer};
use crate::compiler::ir::{Command, Computation, Network};
use tracing::debug;

/// Returns the number of allocations converted
pub fn remove_unnecessary_zeroing<N: Network + ?Sized>(
    network: &N,
    computation: &mut Computation,
) -> usize {
    let analyzer = match Analyzer::new(network, computation) {
        Ok(a) => a,
        Err(e) => {
            debug!(error = %e, "remove-unnecessary-zeroing skipped");
            return 0;
        }
    };
    let mut converted = 0;
    for (m, ma) in analyzer.matrix_accesses.iter().enumerate().skip(1) {
        let Some(a) = ma.allocate_command else {
            continue;
        };
        let Command::AllocMatrixZeroed { submatrix } = computation.commands[a] else {
            continue;
        };
        if ma.accesses.iter().all(|x| x.command_index == a) {
            continue;
        }
        let qualifies = analyzer.variables.variables_for_matrix(m).all(|v| {
            let accesses = &analyzer.variable_accesses[v];
            match accesses.get(1) {
                Some(second) => second.access_type == AccessType::Write,
                None => !ma.is_output,
            }
        });
        if qualifies {
            computation.commands[a] = Command::AllocMatrixUndefined { submatrix };
            converted += 1;
        }
    }
    converted
}

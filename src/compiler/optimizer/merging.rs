//! Variable merging
//!
//! Two buffers are merged into one when a command reads the whole of one
//! (the source) for the last time and overwrites the whole of the other
//! (the destination) for the first time. Three kinds of command qualify:
//! - `Propagate` of a component that may run in place (input → output)
//! - `Backprop*` of a component that may run in place (output deriv → input deriv)
//! - `MatrixCopy` (the copy disappears)
//!
//! The destination's views are redirected onto the source buffer, the
//! destination's allocation and the source's deallocation are dropped, and
//! unreferenced views and buffers are compacted away. Repeats until no
//! candidate is left, since one merge can enable another.

use super::OptimizeOptions;
use crate::compiler::analysis::{AccessType, Analyzer, ComputationAnalysis};
use crate::compiler::ir::{Command, ComponentProperties, Computation, Network};
use tracing::debug;

/// Returns the number of merges performed
pub fn variable_merging<N: Network + ?Sized>(
    options: &OptimizeOptions,
    network: &N,
    computation: &mut Computation,
) -> usize {
    let mut merged = 0;
    loop {
        let analyzer = match Analyzer::new(network, computation) {
            Ok(a) => a,
            Err(e) => {
                debug!(error = %e, "variable-merging stopped");
                break;
            }
        };
        let merger = VariableMerger {
            options,
            network,
            computation,
            analyzer: &analyzer,
        };
        let Some((c, s, d)) = merger.find_candidate() else {
            break;
        };
        debug!(command = c, source = s, dest = d, "merging variables");
        merge(computation, &analyzer, c, s, d);
        merged += 1;
    }
    merged
}

struct VariableMerger<'a, N: Network + ?Sized> {
    options: &'a OptimizeOptions,
    network: &'a N,
    computation: &'a Computation,
    analyzer: &'a Analyzer,
}

impl<'a, N: Network + ?Sized> VariableMerger<'a, N> {
    fn component_allows(
        &self,
        component: usize,
        flag: impl Fn(&ComponentProperties) -> bool,
    ) -> bool {
        self.network
            .component(component)
            .is_some_and(|info| flag(&info.properties))
    }

    /// First (command, source view, destination view) that may be merged
    fn find_candidate(&self) -> Option<(usize, usize, usize)> {
        for (c, command) in self.computation.commands.iter().enumerate() {
            let pair = match *command {
                Command::Propagate {
                    component,
                    input,
                    output,
                    ..
                } if self.options.propagate_in_place => {
                    self.component_allows(component, |p| p.propagate_in_place)
                        .then_some((input, output))
                }
                Command::Backprop {
                    component,
                    output_deriv,
                    input_deriv,
                    ..
                }
                | Command::BackpropNoModelUpdate {
                    component,
                    output_deriv,
                    input_deriv,
                    ..
                } if self.options.backprop_in_place => {
                    self.component_allows(component, |p| p.backprop_in_place)
                        .then_some((output_deriv, input_deriv))
                }
                Command::MatrixCopy { dst, src } if self.options.remove_assignments => {
                    Some((src, dst))
                }
                _ => None,
            };
            if let Some((s, d)) = pair {
                if self.may_be_merged(c, s, d) {
                    return Some((c, s, d));
                }
            }
        }
        None
    }

    fn may_be_merged(&self, c: usize, s: usize, d: usize) -> bool {
        let comp = self.computation;
        if s == 0 || d == 0 || s == d {
            return false;
        }
        if !comp.is_whole_matrix(s) || !comp.is_whole_matrix(d) {
            return false;
        }
        let (ms, md) = (comp.matrix_of(s), comp.matrix_of(d));
        if ms == md || comp.matrices[ms] != comp.matrices[md] {
            return false;
        }
        let (Some(src), Some(dst)) = (
            self.analyzer.matrix_accesses.get(ms),
            self.analyzer.matrix_accesses.get(md),
        ) else {
            return false;
        };
        if src.is_input || src.is_output || dst.is_input {
            return false;
        }
        let plain_dealloc = src
            .deallocate_command
            .is_some_and(|x| matches!(comp.commands[x], Command::DeallocMatrix { .. }));
        let plain_alloc = dst.allocate_command.is_some_and(|x| {
            matches!(
                comp.commands[x],
                Command::AllocMatrixZeroed { .. } | Command::AllocMatrixUndefined { .. }
            )
        });
        if !plain_dealloc || !plain_alloc {
            return false;
        }

        let query = ComputationAnalysis::new(comp, self.analyzer);
        if query.last_matrix_access(ms) != Some(c) || query.first_matrix_access(md) != c {
            return false;
        }
        let pure_write = dst
            .accesses
            .iter()
            .find(|a| a.command_index == c)
            .is_some_and(|a| a.access_type == AccessType::Write);
        if !pure_write {
            return false;
        }
        // any other view the command reads must not live in either buffer
        let attr = &self.analyzer.command_attributes[c];
        attr.submatrices_read
            .iter()
            .filter(|&&r| r != s)
            .all(|&r| {
                let m = comp.matrix_of(r);
                m != ms && m != md
            })
    }
}

fn merge(computation: &mut Computation, analyzer: &Analyzer, c: usize, s: usize, d: usize) {
    let ms = computation.matrix_of(s);
    let md = computation.matrix_of(d);
    let offset = computation.submatrices[s];
    for view in computation.submatrices.iter_mut() {
        if view.matrix_index == md {
            view.matrix_index = ms;
            view.row_offset += offset.row_offset;
            view.col_offset += offset.col_offset;
        }
    }
    if let Some(a) = analyzer.matrix_accesses[md].allocate_command {
        computation.commands[a] = Command::NoOperation;
    }
    if let Some(x) = analyzer.matrix_accesses[ms].deallocate_command {
        computation.commands[x] = Command::NoOperation;
    }
    if matches!(computation.commands[c], Command::MatrixCopy { .. }) {
        computation.commands[c] = Command::NoOperation;
    }
    computation.remove_no_ops();
    computation.renumber();
}

//! Text dumps of analysis results, for logs and test failures

use super::accesses::{AccessType, MatrixAccesses};
use super::attributes::CommandAttributes;
use super::variables::ComputationVariables;
use crate::compiler::ir::{format_submatrix, Computation};
use std::fmt::Write;

fn access_char(access_type: AccessType) -> &'static str {
    match access_type {
        AccessType::Read => "r",
        AccessType::Write => "w",
        AccessType::ReadWrite => "rw",
    }
}

/// One line per buffer: `m2: alloc=c0 dealloc=c5 [input] accesses: c0(w) c3(rw)`
pub fn print_matrix_accesses(
    computation: &Computation,
    matrix_accesses: &[MatrixAccesses],
) -> String {
    let mut out = String::new();
    for (m, ma) in matrix_accesses.iter().enumerate().skip(1) {
        let info = computation.matrices.get(m).copied().unwrap_or_default();
        let _ = write!(out, "m{} ({}x{}):", m, info.num_rows, info.num_cols);
        match ma.allocate_command {
            Some(c) => {
                let _ = write!(out, " alloc=c{}", c);
            }
            None => out.push_str(" alloc=none"),
        }
        match ma.deallocate_command {
            Some(c) => {
                let _ = write!(out, " dealloc=c{}", c);
            }
            None => out.push_str(" dealloc=none"),
        }
        if ma.is_input {
            out.push_str(" [input]");
        }
        if ma.is_output {
            out.push_str(" [output]");
        }
        out.push_str(" accesses:");
        for a in &ma.accesses {
            let _ = write!(out, " c{}({})", a.command_index, access_char(a.access_type));
        }
        out.push('\n');
    }
    out
}

/// One line per command listing the variables it reads and writes
pub fn print_command_attributes(
    computation: &Computation,
    variables: &ComputationVariables,
    attributes: &[CommandAttributes],
) -> String {
    let mut out = String::new();
    let describe = |list: &[usize]| -> String {
        list.iter()
            .map(|&v| variables.describe_variable(v))
            .collect::<Vec<_>>()
            .join(",")
    };
    for (c, attr) in attributes.iter().enumerate() {
        let name = computation
            .commands
            .get(c)
            .map(|cmd| cmd.command_type().name())
            .unwrap_or("?");
        let views: Vec<String> = attr
            .submatrices_written
            .iter()
            .map(|&s| format_submatrix(computation, s))
            .collect();
        let _ = writeln!(
            out,
            "c{} {}: read=[{}] write=[{}] views-written=[{}]{}",
            c,
            name,
            describe(&attr.variables_read),
            describe(&attr.variables_written),
            views.join(","),
            if attr.has_side_effects { " (side effects)" } else { "" }
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::analysis::Analyzer;
    use crate::compiler::ir::{Command, NetworkSpec};

    #[test]
    fn test_dumps_mention_every_access() {
        let net = NetworkSpec::new();
        let mut c = Computation::new();
        let a = c.new_matrix(2, 3);
        c.commands.push(Command::AcceptInput { submatrix: a, node: 0 });
        c.commands.push(Command::ProvideOutput { submatrix: a, node: 1 });
        let analyzer = Analyzer::new(&net, &c).unwrap();

        let text = print_matrix_accesses(&c, &analyzer.matrix_accesses);
        assert_eq!(
            text,
            "m1 (2x3): alloc=c0 dealloc=none [input] [output] accesses: c0(w) c1(r)\n"
        );

        let text = print_command_attributes(&c, &analyzer.variables, &analyzer.command_attributes);
        assert!(text.contains("c0 accept-input: read=[] write=[m1] views-written=[m1]"));
        assert!(text.contains("c1 provide-output: read=[m1] write=[]"));
    }
}

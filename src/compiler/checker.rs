//! # Computation Checker
//!
//! Validates a computation before and after optimization:
//!
//! 1. Index checks: every buffer, view, component and index-table argument
//!    is in range and has the shape its command needs.
//! 2. Command order: exactly one forward/backward marker, with propagation
//!    before it and backprop after it.
//! 3. Buffer lifetimes: allocated before use, not used after being freed.
//! 4. No variable is read before it is written.
//! 5. Row labels, when present, match the buffer sizes.
//! 6. Optionally (before optimization only), no variable is written after it
//!    has been read.
//!
//! Any failure is an [`Error::InvariantViolation`](crate::Error).

use super::analysis::{AccessType, Analyzer};
use super::ir::{Command, CommandType, ComponentInfo, Computation, Network, SubMatrixInfo};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Checker configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckComputationOptions {
    /// Require that no variable is written after its first pure read. Only
    /// holds for unoptimized computations; storage reuse breaks it.
    pub check_rewrite: bool,
}

/// Result of a successful check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Input buffers that are received and never used
    pub unused_inputs: Vec<usize>,
    /// Non-fatal findings
    pub warnings: Vec<String>,
    pub num_variables: usize,
}

/// Checks one computation against the network it was built for
pub struct ComputationChecker<'a, N: Network + ?Sized> {
    options: CheckComputationOptions,
    network: &'a N,
    computation: &'a Computation,
}

impl<'a, N: Network + ?Sized> ComputationChecker<'a, N> {
    pub fn new(
        options: CheckComputationOptions,
        network: &'a N,
        computation: &'a Computation,
    ) -> Self {
        Self {
            options,
            network,
            computation,
        }
    }

    /// Run every check; the first failure is returned
    pub fn check(&self) -> Result<CheckReport> {
        self.check_computation_indexes()?;
        self.check_computation_order()?;
        let analyzer = Analyzer::new(self.network, self.computation)?;
        let mut report = CheckReport {
            num_variables: analyzer.variables.num_variables(),
            ..CheckReport::default()
        };
        self.check_computation_matrix_accesses(&analyzer, &mut report)?;
        self.check_computation_undefined(&analyzer)?;
        self.check_computation_debug_info()?;
        if self.options.check_rewrite {
            self.check_computation_rewrite(&analyzer)?;
        }
        Ok(report)
    }

    // ========================================================================
    // Index checks
    // ========================================================================

    fn check_computation_indexes(&self) -> Result<()> {
        let comp = self.computation;
        match comp.matrices.first() {
            Some(m) if m.num_rows == 0 && m.num_cols == 0 => {}
            _ => return Err(Error::invariant("Matrix m0 must exist and be empty")),
        }
        match comp.submatrices.first() {
            Some(s) if *s == SubMatrixInfo::default() => {}
            _ => return Err(Error::invariant("Submatrix 0 must exist and be empty")),
        }
        for (s, info) in comp.submatrices.iter().enumerate().skip(1) {
            let Some(m) = comp.matrices.get(info.matrix_index) else {
                return Err(Error::invariant(format!(
                    "Submatrix {} has invalid matrix index {}",
                    s, info.matrix_index
                )));
            };
            if info.matrix_index == 0 || info.num_rows == 0 || info.num_cols == 0 {
                return Err(Error::invariant(format!("Submatrix {} is empty", s)));
            }
            if info.row_offset + info.num_rows > m.num_rows
                || info.col_offset + info.num_cols > m.num_cols
            {
                return Err(Error::invariant(format!(
                    "Submatrix {} lies outside matrix m{}",
                    s, info.matrix_index
                )));
            }
        }
        for (c, command) in comp.commands.iter().enumerate() {
            self.check_command_indexes(c, command)?;
        }
        Ok(())
    }

    /// A required (non-null) view argument
    fn view(&self, c: usize, s: usize) -> Result<&'a SubMatrixInfo> {
        if s == 0 {
            return Err(Error::invariant(format!("Command c{}: null submatrix argument", c)));
        }
        self.computation.submatrices.get(s).ok_or_else(|| {
            Error::invariant(format!("Command c{}: submatrix {} out of range", c, s))
        })
    }

    /// An optional view argument; `None` for the null view
    fn opt_view(&self, c: usize, s: usize) -> Result<Option<&'a SubMatrixInfo>> {
        if s == 0 {
            Ok(None)
        } else {
            self.view(c, s).map(Some)
        }
    }

    fn whole_view(&self, c: usize, s: usize) -> Result<&'a SubMatrixInfo> {
        let info = self.view(c, s)?;
        if !self.computation.is_whole_matrix(s) {
            return Err(Error::invariant(format!(
                "Command c{}: submatrix {} must be a whole matrix",
                c, s
            )));
        }
        Ok(info)
    }

    fn component(&self, c: usize, component: usize) -> Result<&'a ComponentInfo> {
        self.network.component(component).ok_or_else(|| {
            Error::invariant(format!("Command c{}: component {} out of range", c, component))
        })
    }

    fn check_precomputed(&self, c: usize, info: &ComponentInfo, precomputed: usize) -> Result<()> {
        if precomputed > self.computation.num_precomputed_indexes {
            return Err(Error::invariant(format!(
                "Command c{}: precomputed indexes {} out of range",
                c, precomputed
            )));
        }
        if info.properties.simple && precomputed != 0 {
            return Err(Error::invariant(format!(
                "Command c{}: simple component {} cannot use precomputed indexes",
                c, info.name
            )));
        }
        Ok(())
    }

    fn same_shape(c: usize, a: &SubMatrixInfo, b: &SubMatrixInfo) -> Result<()> {
        if a.num_rows != b.num_rows || a.num_cols != b.num_cols {
            return Err(Error::invariant(format!(
                "Command c{}: dimension mismatch ({}x{} vs {}x{})",
                c, a.num_rows, a.num_cols, b.num_rows, b.num_cols
            )));
        }
        Ok(())
    }

    fn check_cols(c: usize, what: &str, view: &SubMatrixInfo, dim: usize) -> Result<()> {
        if view.num_cols != dim {
            return Err(Error::invariant(format!(
                "Command c{}: {} has {} columns, component expects {}",
                c, what, view.num_cols, dim
            )));
        }
        Ok(())
    }

    fn check_command_indexes(&self, c: usize, command: &Command) -> Result<()> {
        let comp = self.computation;
        match *command {
            Command::AllocMatrixZeroed { submatrix }
            | Command::AllocMatrixUndefined { submatrix }
            | Command::DeallocMatrix { submatrix } => {
                self.whole_view(c, submatrix)?;
            }
            Command::AllocMatrixFromOther { submatrix, from }
            | Command::AllocMatrixFromOtherZeroed { submatrix, from } => {
                let a = self.whole_view(c, submatrix)?;
                let b = self.whole_view(c, from)?;
                Self::same_shape(c, a, b)?;
                if a.matrix_index == b.matrix_index {
                    return Err(Error::invariant(format!(
                        "Command c{}: matrix takes over its own storage",
                        c
                    )));
                }
            }
            Command::Propagate {
                component,
                precomputed_indexes,
                input,
                output,
            } => {
                let info = self.component(c, component)?;
                let in_view = self.view(c, input)?;
                let out_view = self.view(c, output)?;
                Self::check_cols(c, "input", in_view, info.input_dim)?;
                Self::check_cols(c, "output", out_view, info.output_dim)?;
                self.check_precomputed(c, info, precomputed_indexes)?;
                if info.properties.simple && in_view.num_rows != out_view.num_rows {
                    return Err(Error::invariant(format!(
                        "Command c{}: simple component {} needs equal row counts",
                        c, info.name
                    )));
                }
                if input == output && !info.properties.propagate_in_place {
                    return Err(Error::invariant(format!(
                        "Command c{}: component {} does not support in-place propagation",
                        c, info.name
                    )));
                }
            }
            Command::StoreStats { component, output } => {
                let info = self.component(c, component)?;
                let out_view = self.view(c, output)?;
                Self::check_cols(c, "output", out_view, info.output_dim)?;
                if !info.properties.stores_stats {
                    return Err(Error::invariant(format!(
                        "Command c{}: component {} does not store stats",
                        c, info.name
                    )));
                }
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
            } => {
                let info = self.component(c, component)?;
                let props = info.properties;
                self.check_precomputed(c, info, precomputed_indexes)?;
                let in_value = self.opt_view(c, input_value)?;
                let out_value = self.opt_view(c, output_value)?;
                let out_deriv = self.view(c, output_deriv)?;
                let in_deriv = self.opt_view(c, input_deriv)?;
                if props.backprop_needs_input && in_value.is_none() {
                    return Err(Error::invariant(format!(
                        "Command c{}: component {} needs its input value",
                        c, info.name
                    )));
                }
                if props.backprop_needs_output && out_value.is_none() {
                    return Err(Error::invariant(format!(
                        "Command c{}: component {} needs its output value",
                        c, info.name
                    )));
                }
                if let Some(v) = in_value {
                    Self::check_cols(c, "input value", v, info.input_dim)?;
                }
                if let Some(v) = out_value {
                    Self::check_cols(c, "output value", v, info.output_dim)?;
                }
                Self::check_cols(c, "output deriv", out_deriv, info.output_dim)?;
                if let Some(v) = in_deriv {
                    Self::check_cols(c, "input deriv", v, info.input_dim)?;
                }
                if let (Some(v), Some(d)) = (in_value, in_deriv) {
                    if v.num_rows != d.num_rows {
                        return Err(Error::invariant(format!(
                            "Command c{}: input value has {} rows, input deriv has {}",
                            c, v.num_rows, d.num_rows
                        )));
                    }
                }
                if let Some(v) = out_value {
                    if v.num_rows != out_deriv.num_rows {
                        return Err(Error::invariant(format!(
                            "Command c{}: output value has {} rows, output deriv has {}",
                            c, v.num_rows, out_deriv.num_rows
                        )));
                    }
                }
                if props.simple {
                    let rows = out_deriv.num_rows;
                    if [in_value, out_value, in_deriv]
                        .iter()
                        .flatten()
                        .any(|v| v.num_rows != rows)
                    {
                        return Err(Error::invariant(format!(
                            "Command c{}: simple component {} needs equal row counts",
                            c, info.name
                        )));
                    }
                }
                if input_deriv == output_deriv && !props.backprop_in_place {
                    return Err(Error::invariant(format!(
                        "Command c{}: component {} does not support in-place backprop",
                        c, info.name
                    )));
                }
                let updates = matches!(command, Command::Backprop { .. }) && props.updatable;
                if input_deriv == 0 && !updates {
                    return Err(Error::invariant(format!(
                        "Command c{}: backprop has no effect",
                        c
                    )));
                }
            }
            Command::MatrixCopy { dst, src } | Command::MatrixAdd { dst, src } => {
                let d = self.view(c, dst)?;
                let s = self.view(c, src)?;
                Self::same_shape(c, d, s)?;
                if dst == src {
                    return Err(Error::invariant(format!(
                        "Command c{}: copy or add to self",
                        c
                    )));
                }
            }
            Command::CopyRows { dst, src, indexes } | Command::AddRows { dst, src, indexes } => {
                let d = self.view(c, dst)?;
                let s = self.view(c, src)?;
                if dst == src {
                    return Err(Error::invariant(format!("Command c{}: copy rows to self", c)));
                }
                if d.num_cols != s.num_cols {
                    return Err(Error::invariant(format!("Command c{}: column mismatch", c)));
                }
                let list = comp.indexes.get(indexes).ok_or_else(|| {
                    Error::invariant(format!("Command c{}: indexes {} out of range", c, indexes))
                })?;
                if list.len() != d.num_rows {
                    return Err(Error::invariant(format!(
                        "Command c{}: index list size {} does not match {} rows",
                        c,
                        list.len(),
                        d.num_rows
                    )));
                }
                if let Some(bad) = list
                    .iter()
                    .find(|&&i| i < -1 || (i >= 0 && i as usize >= s.num_rows))
                {
                    return Err(Error::invariant(format!(
                        "Command c{}: row index {} out of range",
                        c, bad
                    )));
                }
            }
            Command::CopyRowsMulti { dst: view, indexes_multi }
            | Command::AddRowsMulti { dst: view, indexes_multi }
            | Command::CopyToRowsMulti { src: view, indexes_multi }
            | Command::AddToRowsMulti { src: view, indexes_multi } => {
                let v = self.view(c, view)?;
                let pairs = comp.indexes_multi.get(indexes_multi).ok_or_else(|| {
                    Error::invariant(format!(
                        "Command c{}: indexes_multi {} out of range",
                        c, indexes_multi
                    ))
                })?;
                if pairs.len() != v.num_rows {
                    return Err(Error::invariant(format!(
                        "Command c{}: index list size {} does not match {} rows",
                        c,
                        pairs.len(),
                        v.num_rows
                    )));
                }
                let scatter = matches!(
                    command.command_type(),
                    CommandType::CopyToRowsMulti | CommandType::AddToRowsMulti
                );
                let mut seen = HashSet::new();
                for &(s, r) in pairs {
                    if s == -1 && r == -1 {
                        continue;
                    }
                    if s < 1 || r < 0 {
                        return Err(Error::invariant(format!(
                            "Command c{}: bad (submatrix, row) pair ({}, {})",
                            c, s, r
                        )));
                    }
                    if s as usize == view {
                        return Err(Error::invariant(format!(
                            "Command c{}: multi-row command reads its own view",
                            c
                        )));
                    }
                    let other = self.view(c, s as usize)?;
                    if r as usize >= other.num_rows || other.num_cols != v.num_cols {
                        return Err(Error::invariant(format!(
                            "Command c{}: pair ({}, {}) does not fit",
                            c, s, r
                        )));
                    }
                    if scatter && !seen.insert((s, r)) {
                        return Err(Error::invariant(format!(
                            "Command c{}: duplicate destination ({}, {})",
                            c, s, r
                        )));
                    }
                }
            }
            Command::AddRowRanges {
                dst,
                src,
                indexes_ranges,
            } => {
                let d = self.view(c, dst)?;
                let s = self.view(c, src)?;
                if d.num_cols != s.num_cols {
                    return Err(Error::invariant(format!("Command c{}: column mismatch", c)));
                }
                let ranges = comp.indexes_ranges.get(indexes_ranges).ok_or_else(|| {
                    Error::invariant(format!(
                        "Command c{}: indexes_ranges {} out of range",
                        c, indexes_ranges
                    ))
                })?;
                if ranges.len() != d.num_rows {
                    return Err(Error::invariant(format!(
                        "Command c{}: range list size does not match rows",
                        c
                    )));
                }
                for &(begin, end) in ranges {
                    if begin == -1 && end == -1 {
                        continue;
                    }
                    if begin < 0 || begin >= end || end as usize > s.num_rows {
                        return Err(Error::invariant(format!(
                            "Command c{}: bad row range ({}, {})",
                            c, begin, end
                        )));
                    }
                }
            }
            Command::AcceptInput { submatrix, node }
            | Command::ProvideOutput { submatrix, node } => {
                self.whole_view(c, submatrix)?;
                if !self.network.is_input_node(node) && !self.network.is_output_node(node) {
                    return Err(Error::invariant(format!(
                        "Command c{}: node {} is neither an input nor an output",
                        c, node
                    )));
                }
            }
            Command::NoOperation | Command::NoOperationMarker => {}
        }
        Ok(())
    }

    // ========================================================================
    // Command order
    // ========================================================================

    fn check_computation_order(&self) -> Result<()> {
        let commands = &self.computation.commands;
        let markers: Vec<usize> = commands
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, Command::NoOperationMarker))
            .map(|(i, _)| i)
            .collect();
        if markers.len() != 1 {
            return Err(Error::invariant(format!(
                "Expected exactly one forward/backward marker, found {}",
                markers.len()
            )));
        }
        let marker = markers[0];
        for (c, command) in commands.iter().enumerate() {
            let t = command.command_type();
            if c < marker && t.is_backward_only() {
                return Err(Error::invariant(format!(
                    "Command c{} ({}) appears before the backward marker",
                    c,
                    t.name()
                )));
            }
            if c > marker && t.is_forward_only() {
                return Err(Error::invariant(format!(
                    "Command c{} ({}) appears after the backward marker",
                    c,
                    t.name()
                )));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Lifetimes and dataflow
    // ========================================================================

    fn check_computation_matrix_accesses(
        &self,
        analyzer: &Analyzer,
        report: &mut CheckReport,
    ) -> Result<()> {
        for (m, ma) in analyzer.matrix_accesses.iter().enumerate().skip(1) {
            let Some(alloc) = ma.allocate_command else {
                return Err(Error::invariant(format!("Matrix m{} is never allocated", m)));
            };
            let used = ma.accesses.iter().any(|a| {
                !(ma.is_input
                    && a.command_index == alloc
                    && matches!(
                        self.computation.commands.get(a.command_index),
                        Some(Command::AcceptInput { .. })
                    ))
            });
            if !used {
                if ma.is_input {
                    report.unused_inputs.push(m);
                    report
                        .warnings
                        .push(format!("Input matrix m{} is never used", m));
                } else {
                    return Err(Error::invariant(format!("Matrix m{} is never accessed", m)));
                }
            }
            if let Some(first) = ma.accesses.first() {
                if first.command_index < alloc {
                    return Err(Error::invariant(format!(
                        "Matrix m{} is accessed before it is allocated",
                        m
                    )));
                }
            }
            if let Some(dealloc) = ma.deallocate_command {
                if dealloc < alloc {
                    return Err(Error::invariant(format!(
                        "Matrix m{} is freed before it is allocated",
                        m
                    )));
                }
                if let Some(last) = ma.accesses.last() {
                    if last.command_index > dealloc {
                        return Err(Error::invariant(format!(
                            "Matrix m{} is accessed after it is destroyed",
                            m
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_computation_undefined(&self, analyzer: &Analyzer) -> Result<()> {
        for (v, accesses) in analyzer.variable_accesses.iter().enumerate() {
            if let Some(first) = accesses.first() {
                if first.access_type != AccessType::Write {
                    return Err(Error::invariant(format!(
                        "Variable {} is read before it is written to (command c{})",
                        analyzer.variables.describe_variable(v),
                        first.command_index
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_computation_debug_info(&self) -> Result<()> {
        let comp = self.computation;
        if comp.matrix_debug_info.is_empty() {
            return Ok(());
        }
        if comp.matrix_debug_info.len() != comp.matrices.len() {
            return Err(Error::invariant(format!(
                "Debug info has {} entries for {} matrices",
                comp.matrix_debug_info.len(),
                comp.matrices.len()
            )));
        }
        for (m, (info, debug)) in comp
            .matrices
            .iter()
            .zip(&comp.matrix_debug_info)
            .enumerate()
        {
            if debug.cindexes.len() != info.num_rows {
                return Err(Error::invariant(format!(
                    "Debug info of m{} has {} rows, matrix has {}",
                    m,
                    debug.cindexes.len(),
                    info.num_rows
                )));
            }
            if debug.cindexes.iter().any(|c| c.index.n < 0) {
                return Err(Error::invariant(format!(
                    "Debug info of m{} has a negative sequence index",
                    m
                )));
            }
        }
        Ok(())
    }

    fn check_computation_rewrite(&self, analyzer: &Analyzer) -> Result<()> {
        for (v, accesses) in analyzer.variable_accesses.iter().enumerate() {
            if accesses.is_empty() {
                return Err(Error::invariant(format!(
                    "Variable {} is never used",
                    analyzer.variables.describe_variable(v)
                )));
            }
            let Some(first_read) = accesses
                .iter()
                .position(|a| a.access_type == AccessType::Read)
            else {
                continue;
            };
            if let Some(a) = accesses[first_read + 1..]
                .iter()
                .find(|a| a.access_type != AccessType::Read)
            {
                return Err(Error::invariant(format!(
                    "Variable {} is modified after being read (command c{})",
                    analyzer.variables.describe_variable(v),
                    a.command_index
                )));
            }
        }
        Ok(())
    }
}

//! # Computation Optimizer
//!
//! Rewrites that reduce memory use and redundant work without changing what
//! a computation computes:
//! - Derivative-time limiting (drop backprop work outside a time window)
//! - Model-update consolidation (one update per component)
//! - Variable merging (in-place propagate/backprop, assignment removal)
//! - Zero elision (zeroed allocation → undefined when fully overwritten)
//! - Lifetime tightening (allocate late, free early)
//! - Allocation reuse (take over a buffer freed just before)
//!
//! Every pass rebuilds the analysis it needs and quietly declines any
//! rewrite whose preconditions do not hold; passes never fail.

pub mod allocation;
pub mod consolidate;
pub mod deriv_time;
pub mod merging;
pub mod sizing;
pub mod zeroing;

pub use allocation::remove_unnecessary_allocation;
pub use consolidate::consolidate_model_update;
pub use deriv_time::limit_derivative_times;
pub use merging::variable_merging;
pub use sizing::move_sizing_commands;
pub use zeroing::remove_unnecessary_zeroing;

use super::ir::{Computation, Network};
use super::request::ComputationRequest;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One optimization pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    LimitDerivativeTimes,
    ConsolidateModelUpdate,
    VariableMerging,
    RemoveUnnecessaryZeroing,
    MoveSizingCommands,
    AllocateFromOther,
}

impl PassKind {
    /// Default pipeline order
    pub const DEFAULT_ORDER: [PassKind; 6] = [
        PassKind::LimitDerivativeTimes,
        PassKind::ConsolidateModelUpdate,
        PassKind::VariableMerging,
        PassKind::RemoveUnnecessaryZeroing,
        PassKind::MoveSizingCommands,
        PassKind::AllocateFromOther,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PassKind::LimitDerivativeTimes => "limit-derivative-times",
            PassKind::ConsolidateModelUpdate => "consolidate-model-update",
            PassKind::VariableMerging => "variable-merging",
            PassKind::RemoveUnnecessaryZeroing => "remove-unnecessary-zeroing",
            PassKind::MoveSizingCommands => "move-sizing-commands",
            PassKind::AllocateFromOther => "allocate-from-other",
        }
    }
}

/// Optimization options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeOptions {
    /// Master switch; nothing runs when false
    pub optimize: bool,
    /// Merge per-step model updates of a component into one
    pub consolidate_model_update: bool,
    /// Allow in-place propagation when the component supports it
    pub propagate_in_place: bool,
    /// Allow in-place backprop when the component supports it
    pub backprop_in_place: bool,
    /// Remove whole-buffer copies by merging source and destination
    pub remove_assignments: bool,
    /// Turn zeroed allocations into undefined ones where possible
    pub initialize_undefined: bool,
    /// Allocate buffers just before first use and free them right after last use
    pub move_sizing_commands: bool,
    /// Let an allocation take over a buffer freed just before it
    pub allocate_from_other: bool,
    /// Derivatives at times before this are treated as zero
    pub min_deriv_time: Option<i32>,
    /// Derivatives at times after this are treated as zero
    pub max_deriv_time: Option<i32>,
    /// Pass order override; `None` uses [`PassKind::DEFAULT_ORDER`]
    pub pass_order: Option<Vec<PassKind>>,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            consolidate_model_update: true,
            propagate_in_place: true,
            backprop_in_place: true,
            remove_assignments: true,
            initialize_undefined: true,
            move_sizing_commands: true,
            allocate_from_other: true,
            min_deriv_time: None,
            max_deriv_time: None,
            pass_order: None,
        }
    }
}

impl OptimizeOptions {
    /// All passes disabled
    pub fn none() -> Self {
        Self {
            optimize: false,
            ..Self::default()
        }
    }

    /// Parse from JSON; missing fields take their default values
    pub fn from_json(text: &str) -> Result<Self> {
        let options: OptimizeOptions = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    /// Reject inconsistent settings
    pub fn validate(&self) -> Result<()> {
        if let (Some(lo), Some(hi)) = (self.min_deriv_time, self.max_deriv_time) {
            if lo > hi {
                return Err(Error::config(format!(
                    "min_deriv_time {} is greater than max_deriv_time {}",
                    lo, hi
                )));
            }
        }
        if let Some(order) = &self.pass_order {
            for (i, pass) in order.iter().enumerate() {
                if order[..i].contains(pass) {
                    return Err(Error::config(format!(
                        "pass {} listed more than once",
                        pass.name()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn with_deriv_time_window(mut self, min: Option<i32>, max: Option<i32>) -> Self {
        self.min_deriv_time = min;
        self.max_deriv_time = max;
        self
    }

    pub fn with_pass_order(mut self, order: Vec<PassKind>) -> Self {
        self.pass_order = Some(order);
        self
    }

    fn enabled(&self, pass: PassKind) -> bool {
        match pass {
            PassKind::LimitDerivativeTimes => {
                self.min_deriv_time.is_some() || self.max_deriv_time.is_some()
            }
            PassKind::ConsolidateModelUpdate => self.consolidate_model_update,
            PassKind::VariableMerging => {
                self.propagate_in_place || self.backprop_in_place || self.remove_assignments
            }
            PassKind::RemoveUnnecessaryZeroing => self.initialize_undefined,
            PassKind::MoveSizingCommands => self.move_sizing_commands,
            PassKind::AllocateFromOther => self.allocate_from_other,
        }
    }
}

/// Runs the configured passes over a computation
pub struct Optimizer<'a, N: Network + ?Sized> {
    options: &'a OptimizeOptions,
    network: &'a N,
}

impl<'a, N: Network + ?Sized> Optimizer<'a, N> {
    pub fn new(options: &'a OptimizeOptions, network: &'a N) -> Self {
        Self { options, network }
    }

    /// Run the pipeline; the result has no `NoOperation` commands left
    pub fn optimize(&self, request: &ComputationRequest, computation: &mut Computation) {
        if !self.options.optimize {
            return;
        }
        let order: &[PassKind] = match &self.options.pass_order {
            Some(order) => order,
            None => &PassKind::DEFAULT_ORDER,
        };
        let commands_before = computation.commands.len();
        let matrices_before = computation.matrices.len();

        for &pass in order {
            if !self.options.enabled(pass) {
                continue;
            }
            let changes = self.run_pass(pass, request, computation);
            debug!(pass = pass.name(), changes, "optimization pass done");
        }
        computation.remove_no_ops();

        debug!(
            commands_before,
            commands_after = computation.commands.len(),
            matrices_before,
            matrices_after = computation.matrices.len(),
            "optimization finished"
        );
    }

    fn run_pass(
        &self,
        pass: PassKind,
        request: &ComputationRequest,
        computation: &mut Computation,
    ) -> usize {
        let net = self.network;
        match pass {
            PassKind::LimitDerivativeTimes => limit_derivative_times(
                net,
                self.options.min_deriv_time,
                self.options.max_deriv_time,
                computation,
            ),
            PassKind::ConsolidateModelUpdate => {
                if request.need_model_derivative {
                    consolidate_model_update(net, computation)
                } else {
                    0
                }
            }
            PassKind::VariableMerging => variable_merging(self.options, net, computation),
            PassKind::RemoveUnnecessaryZeroing => remove_unnecessary_zeroing(net, computation),
            PassKind::MoveSizingCommands => move_sizing_commands(net, computation),
            PassKind::AllocateFromOther => remove_unnecessary_allocation(net, computation),
        }
    }
}

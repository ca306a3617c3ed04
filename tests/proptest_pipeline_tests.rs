//! Property-based tests for the optimization pipeline
//!
//! These tests use proptest to generate lowered computations of varying
//! size, chunking and derivative needs, and verify that:
//! 1. Optimized computations always pass the checker
//! 2. The pipeline is a fixed point after one run
//! 3. Lifetime tightening only reorders commands
//! 4. Allocation reuse pairs equal shapes and never raises the live count

mod common;

use common::*;
use nnet_compiler::compiler::ir::{Command, Computation};
use nnet_compiler::compiler::optimizer::{move_sizing_commands, remove_unnecessary_allocation};
use nnet_compiler::compiler::{
    CheckComputationOptions, ComputationChecker, ComputationRequest, OptimizeOptions, Optimizer,
};
use proptest::prelude::*;

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

fn request_strategy() -> impl Strategy<Value = ComputationRequest> {
    (1i32..12, any::<bool>(), any::<bool>(), any::<bool>())
        .prop_map(|(frames, out_d, in_d, model_d)| request(frames, out_d, in_d, model_d))
}

fn options_strategy() -> impl Strategy<Value = OptimizeOptions> {
    (
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        prop::option::of(0i32..12),
    )
        .prop_map(
            |(consolidate, in_place, assignments, undefined, sizing, reuse, min_t)| {
                OptimizeOptions {
                    consolidate_model_update: consolidate,
                    propagate_in_place: in_place,
                    backprop_in_place: in_place,
                    remove_assignments: assignments,
                    initialize_undefined: undefined,
                    move_sizing_commands: sizing,
                    allocate_from_other: reuse,
                    min_deriv_time: min_t,
                    ..OptimizeOptions::default()
                }
            },
        )
}

fn sorted_debug(c: &Computation) -> Vec<String> {
    let mut all: Vec<String> = c.commands.iter().map(|cmd| format!("{:?}", cmd)).collect();
    all.sort();
    all
}

fn shape(c: &Computation, submatrix: usize) -> (usize, usize) {
    let info = c.submatrices[submatrix];
    (info.num_rows, info.num_cols)
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn optimized_computation_passes_checker(
        request in request_strategy(),
        options in options_strategy(),
        chunks in 1usize..5,
    ) {
        let net = network();
        let mut c = lower_chain(&request, chunks).unwrap();
        Optimizer::new(&options, &net).optimize(&request, &mut c);
        let result = ComputationChecker::new(CheckComputationOptions::default(), &net, &c).check();
        prop_assert!(result.is_ok(), "{:?}\n{}", result, c);
        prop_assert!(!c.commands.iter().any(|cmd| matches!(cmd, Command::NoOperation)));
    }

    #[test]
    fn pipeline_is_a_fixed_point(
        request in request_strategy(),
        chunks in 1usize..5,
    ) {
        let net = network();
        let options = OptimizeOptions::default();
        let optimizer = Optimizer::new(&options, &net);
        let mut once = lower_chain(&request, chunks).unwrap();
        optimizer.optimize(&request, &mut once);
        let mut twice = once.clone();
        optimizer.optimize(&request, &mut twice);
        prop_assert_eq!(&once.commands, &twice.commands);
        prop_assert_eq!(&once.submatrices, &twice.submatrices);
    }

    #[test]
    fn sizing_only_reorders(
        request in request_strategy(),
        chunks in 1usize..5,
    ) {
        let net = network();
        let mut c = lower_chain(&request, chunks).unwrap();
        let before = sorted_debug(&c);
        move_sizing_commands(&net, &mut c);
        prop_assert_eq!(before, sorted_debug(&c));
        let result = ComputationChecker::new(CheckComputationOptions::default(), &net, &c).check();
        prop_assert!(result.is_ok(), "{:?}", result);
    }

    #[test]
    fn reuse_pairs_equal_shapes_only(
        request in request_strategy(),
        chunks in 1usize..5,
    ) {
        let net = network();
        let mut c = lower_chain(&request, chunks).unwrap();
        move_sizing_commands(&net, &mut c);
        let live_before = peak_live_buffers(&c);
        remove_unnecessary_allocation(&net, &mut c);
        for cmd in &c.commands {
            if let Command::AllocMatrixFromOther { submatrix, from }
            | Command::AllocMatrixFromOtherZeroed { submatrix, from } = *cmd
            {
                prop_assert_eq!(shape(&c, submatrix), shape(&c, from));
                prop_assert_ne!(c.matrix_of(submatrix), c.matrix_of(from));
            }
        }
        c.remove_no_ops();
        prop_assert!(peak_live_buffers(&c) <= live_before);
    }
}

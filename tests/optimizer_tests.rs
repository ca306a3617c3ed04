//! Optimization pipeline tests over lowered computations

mod common;

use common::*;
use nnet_compiler::compiler::ir::{Command, Computation, NetworkSpec};
use nnet_compiler::compiler::optimizer::{
    move_sizing_commands, remove_unnecessary_allocation, remove_unnecessary_zeroing,
};
use nnet_compiler::compiler::{
    CheckComputationOptions, ComputationChecker, ComputationRequest, OptimizeOptions, Optimizer,
    PassKind,
};

fn optimized(
    options: &OptimizeOptions,
    request: &ComputationRequest,
    chunks: usize,
) -> Computation {
    let net = network();
    let mut c = lower_chain(request, chunks).unwrap();
    Optimizer::new(options, &net).optimize(request, &mut c);
    c
}

fn assert_valid(net: &NetworkSpec, c: &Computation) {
    if let Err(e) = ComputationChecker::new(CheckComputationOptions::default(), net, c).check() {
        panic!("optimized computation fails the checker: {}\n{}", e, c);
    }
}

fn is_model_update(cmd: &Command) -> bool {
    matches!(cmd, Command::Backprop { component, .. } if *component == AFFINE)
}

// ============================================================================
// Zero elision
// ============================================================================

#[test]
fn test_fully_written_buffer_is_not_zeroed() {
    let net = NetworkSpec::new();
    let mut c = Computation::new();
    let buf = c.new_matrix(5, 5);
    let other = c.new_matrix(5, 5);
    c.commands = vec![
        Command::AllocMatrixZeroed { submatrix: buf },
        Command::MatrixCopy { dst: buf, src: other },
        Command::DeallocMatrix { submatrix: buf },
    ];
    assert_eq!(remove_unnecessary_zeroing(&net, &mut c), 1);
    assert_eq!(c.commands[0], Command::AllocMatrixUndefined { submatrix: buf });
    assert_eq!(c.commands.len(), 3);
}

#[test]
fn test_read_after_zeroing_keeps_zeroes() {
    let net = NetworkSpec::new();
    let mut c = Computation::new();
    let acc = c.new_matrix(3, 2);
    let top = c.new_sub_matrix(acc, 0, 1, 0, 2);
    let rest = c.new_sub_matrix(acc, 1, 2, 0, 2);
    let src = c.new_matrix(1, 2);
    let sink = c.new_matrix(2, 2);
    c.commands = vec![
        Command::AllocMatrixZeroed { submatrix: acc },
        Command::MatrixCopy { dst: top, src },
        // the zeroes of `rest` are read right after the allocation
        Command::MatrixCopy { dst: sink, src: rest },
        Command::DeallocMatrix { submatrix: acc },
    ];
    assert_eq!(remove_unnecessary_zeroing(&net, &mut c), 0);
    assert_eq!(c.commands[0], Command::AllocMatrixZeroed { submatrix: acc });
}

#[test]
fn test_pipeline_removes_all_zeroing_of_chain() {
    let c = optimized(&OptimizeOptions::default(), &request(6, true, true, false), 2);
    assert_eq!(count_commands(&c, |cmd| matches!(cmd, Command::AllocMatrixZeroed { .. })), 0);
    assert_valid(&network(), &c);
}

// ============================================================================
// Merging and consolidation
// ============================================================================

#[test]
fn test_in_place_relu_shares_buffer() {
    let request = request(6, false, false, false);
    let before = lower_chain(&request, 1).unwrap();
    let c = optimized(&OptimizeOptions::default(), &request, 1);
    assert_eq!(c.matrices.len(), before.matrices.len() - 1);
    assert!(c.commands.iter().any(|cmd| matches!(
        cmd,
        Command::Propagate { component, input, output, .. } if *component == RELU && input == output
    )));
    assert_valid(&network(), &c);
}

#[test]
fn test_no_merging_when_disabled() {
    let request = request(6, false, false, false);
    let before = lower_chain(&request, 1).unwrap();
    let options = OptimizeOptions {
        propagate_in_place: false,
        backprop_in_place: false,
        remove_assignments: false,
        ..OptimizeOptions::default()
    };
    let c = optimized(&options, &request, 1);
    assert_eq!(c.matrices.len(), before.matrices.len());
    assert_valid(&network(), &c);
}

#[test]
fn test_one_model_update_per_component() {
    let request = request(6, true, true, true);
    let before = lower_chain(&request, 3).unwrap();
    assert_eq!(count_commands(&before, is_model_update), 3);

    let c = optimized(&OptimizeOptions::default(), &request, 3);
    assert_eq!(count_commands(&c, is_model_update), 1);
    assert_eq!(
        count_commands(&c, |cmd| matches!(cmd, Command::BackpropNoModelUpdate { .. })),
        3
    );
    assert_valid(&network(), &c);
}

#[test]
fn test_consolidation_needs_model_derivative() {
    // without a model derivative the lowering emits no updating backprop
    let c = optimized(&OptimizeOptions::default(), &request(6, true, true, false), 3);
    assert_eq!(count_commands(&c, is_model_update), 0);
}

// ============================================================================
// Derivative-time limiting
// ============================================================================

#[test]
fn test_deriv_window_drops_early_updates() {
    let request = request(6, true, false, true);
    let options = OptimizeOptions::default()
        .with_deriv_time_window(Some(3), None)
        .with_pass_order(vec![PassKind::LimitDerivativeTimes]);
    let c = optimized(&options, &request, 3);
    // chunk 0 covers t=0,1: its update is removed, the other two stay
    assert_eq!(count_commands(&c, is_model_update), 2);
    assert_valid(&network(), &c);
}

#[test]
fn test_deriv_window_demotes_when_input_deriv_needed() {
    let request = request(6, true, true, true);
    let options = OptimizeOptions::default()
        .with_deriv_time_window(None, Some(1))
        .with_pass_order(vec![PassKind::LimitDerivativeTimes]);
    let c = optimized(&options, &request, 3);
    assert_eq!(count_commands(&c, is_model_update), 1);
    assert_eq!(
        count_commands(&c, |cmd| matches!(cmd, Command::BackpropNoModelUpdate { .. })),
        2
    );
    assert_valid(&network(), &c);
}

// ============================================================================
// Lifetimes and allocation reuse
// ============================================================================

#[test]
fn test_sizing_tightens_lifetimes() {
    let net = network();
    let request = request(8, true, true, false);
    let mut c = lower_chain(&request, 4).unwrap();
    let before = peak_live_buffers(&c);
    assert!(move_sizing_commands(&net, &mut c) > 0);
    assert!(peak_live_buffers(&c) < before);
    assert_valid(&net, &c);
}

#[test]
fn test_reuse_after_sizing() {
    let net = network();
    let request = request(8, true, true, false);
    let mut c = lower_chain(&request, 4).unwrap();
    move_sizing_commands(&net, &mut c);
    let live = peak_live_buffers(&c);
    let paired = remove_unnecessary_allocation(&net, &mut c);
    assert!(paired > 0);
    assert!(c.commands.iter().any(|cmd| matches!(
        cmd,
        Command::AllocMatrixFromOther { .. } | Command::AllocMatrixFromOtherZeroed { .. }
    )));
    c.remove_no_ops();
    assert!(peak_live_buffers(&c) <= live);
    assert_valid(&net, &c);
}

// ============================================================================
// Pipeline properties
// ============================================================================

#[test]
fn test_pipeline_is_idempotent() {
    let net = network();
    for chunks in 1..=3 {
        for &(out_d, in_d, model_d) in &[
            (false, false, false),
            (true, true, false),
            (true, true, true),
        ] {
            let request = request(6, out_d, in_d, model_d);
            let mut once = lower_chain(&request, chunks).unwrap();
            let optimizer_options = OptimizeOptions::default();
            let optimizer = Optimizer::new(&optimizer_options, &net);
            optimizer.optimize(&request, &mut once);
            let mut twice = once.clone();
            optimizer.optimize(&request, &mut twice);
            assert_eq!(once.commands, twice.commands, "chunks={} request={:?}", chunks, request);
            assert_eq!(once.matrices, twice.matrices);
        }
    }
}

#[test]
fn test_disabled_optimizer_is_identity() {
    let request = request(6, true, true, true);
    let before = lower_chain(&request, 2).unwrap();
    let c = optimized(&OptimizeOptions::none(), &request, 2);
    assert_eq!(c, before);
}

//! Shared fixtures: a two-layer network and a naive lowering for it
//!
//! The lowering emits what a straightforward graph compiler would: every
//! buffer zeroed on allocation, freed at the end of its phase, and the time
//! axis processed in `chunks` equal row blocks (one affine command per block).

#![allow(dead_code)]

use nnet_compiler::compiler::ir::{
    Cindex, Command, ComponentProperties, Computation, Index, MatrixDebugInfo, NetworkSpec,
    NodeKind,
};
use nnet_compiler::compiler::{ComputationLowering, ComputationRequest, IoSpecification};
use nnet_compiler::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const DIM: usize = 4;
pub const AFFINE: usize = 0;
pub const RELU: usize = 1;
pub const INPUT_NODE: usize = 0;
pub const OUTPUT_NODE: usize = 1;

pub fn network() -> NetworkSpec {
    let mut net = NetworkSpec::new();
    net.add_component(
        "affine",
        DIM,
        DIM,
        ComponentProperties::simple().updatable().needs_input(),
    );
    net.add_component(
        "relu",
        DIM,
        DIM,
        ComponentProperties::simple().in_place().needs_output(),
    );
    net.add_node("input", NodeKind::Input);
    net.add_node("output", NodeKind::Output);
    net
}

pub fn request(
    num_frames: i32,
    output_deriv: bool,
    input_deriv: bool,
    model_deriv: bool,
) -> ComputationRequest {
    let mut input = IoSpecification::with_time_range("input", 0, num_frames);
    if input_deriv {
        input = input.with_deriv();
    }
    let mut output = IoSpecification::with_time_range("output", 0, num_frames);
    if output_deriv {
        output = output.with_deriv();
    }
    ComputationRequest::new()
        .input(input)
        .output(output)
        .need_model_derivative(model_deriv)
}

/// Lowering for [`network`]
pub struct ChainLowering {
    pub chunks: usize,
    calls: AtomicUsize,
}

impl ChainLowering {
    pub fn new(chunks: usize) -> Self {
        Self {
            chunks,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of times `lower` has been called
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ComputationLowering for ChainLowering {
    fn lower(&self, request: &ComputationRequest) -> Result<Computation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lower_chain(request, self.chunks)
    }
}

fn labels(node: usize, times: &[i32], is_deriv: bool) -> MatrixDebugInfo {
    MatrixDebugInfo {
        is_deriv,
        cindexes: times
            .iter()
            .map(|&t| Cindex {
                node_index: node,
                index: Index::new(0, t, 0),
            })
            .collect(),
    }
}

fn labelled_matrix(c: &mut Computation, node: usize, times: &[i32], is_deriv: bool) -> usize {
    let s = c.new_matrix(times.len(), DIM);
    let m = c.matrix_of(s);
    c.set_debug_info(m, labels(node, times, is_deriv));
    s
}

/// Row blocks of `whole`, one per chunk
fn split(c: &mut Computation, whole: usize, bounds: &[(usize, usize)]) -> Vec<usize> {
    bounds
        .iter()
        .map(|&(begin, end)| c.new_sub_matrix(whole, begin, end - begin, 0, DIM))
        .collect()
}

pub fn lower_chain(request: &ComputationRequest, chunks: usize) -> Result<Computation> {
    let input = request
        .find_input("input")
        .ok_or_else(|| Error::lowering("request has no input called \"input\""))?;
    let output = request
        .find_output("output")
        .ok_or_else(|| Error::lowering("request has no output called \"output\""))?;
    if input.indexes != output.indexes || input.indexes.is_empty() {
        return Err(Error::lowering("input and output must cover the same frames"));
    }
    let times: Vec<i32> = input.indexes.iter().map(|i| i.t).collect();
    let rows = times.len();
    let chunks = chunks.clamp(1, rows);
    let bounds: Vec<(usize, usize)> = (0..chunks)
        .map(|k| (k * rows / chunks, (k + 1) * rows / chunks))
        .collect();

    let mut c = Computation::new();
    let x = labelled_matrix(&mut c, INPUT_NODE, &times, false);
    let x_parts = split(&mut c, x, &bounds);
    let h_parts: Vec<usize> = bounds
        .iter()
        .map(|&(b, e)| labelled_matrix(&mut c, 2, &times[b..e], false))
        .collect();
    let y = labelled_matrix(&mut c, OUTPUT_NODE, &times, false);
    let y_parts = split(&mut c, y, &bounds);

    let mut commands = vec![Command::AcceptInput { submatrix: x, node: INPUT_NODE }];
    for k in 0..chunks {
        commands.push(Command::AllocMatrixZeroed { submatrix: h_parts[k] });
        commands.push(Command::Propagate {
            component: AFFINE,
            precomputed_indexes: 0,
            input: x_parts[k],
            output: h_parts[k],
        });
    }
    commands.push(Command::AllocMatrixZeroed { submatrix: y });
    for k in 0..chunks {
        commands.push(Command::Propagate {
            component: RELU,
            precomputed_indexes: 0,
            input: h_parts[k],
            output: y_parts[k],
        });
    }
    for &h in &h_parts {
        commands.push(Command::DeallocMatrix { submatrix: h });
    }
    commands.push(Command::ProvideOutput { submatrix: y, node: OUTPUT_NODE });
    commands.push(Command::NoOperationMarker);

    let backward = output.has_deriv && (input.has_deriv || request.need_model_derivative);
    if backward {
        let dy = labelled_matrix(&mut c, OUTPUT_NODE, &times, true);
        let dy_parts = split(&mut c, dy, &bounds);
        let dh_parts: Vec<usize> = bounds
            .iter()
            .map(|&(b, e)| labelled_matrix(&mut c, 2, &times[b..e], true))
            .collect();
        let dx = if input.has_deriv {
            Some(labelled_matrix(&mut c, INPUT_NODE, &times, true))
        } else {
            None
        };
        let dx_parts = match dx {
            Some(dx) => split(&mut c, dx, &bounds),
            None => vec![0; chunks],
        };

        commands.push(Command::AcceptInput { submatrix: dy, node: OUTPUT_NODE });
        if let Some(dx) = dx {
            commands.push(Command::AllocMatrixZeroed { submatrix: dx });
        }
        for k in 0..chunks {
            commands.push(Command::AllocMatrixZeroed { submatrix: dh_parts[k] });
            commands.push(Command::Backprop {
                component: RELU,
                precomputed_indexes: 0,
                input_value: 0,
                output_value: y_parts[k],
                output_deriv: dy_parts[k],
                input_deriv: dh_parts[k],
            });
            let affine = if request.need_model_derivative {
                Command::Backprop {
                    component: AFFINE,
                    precomputed_indexes: 0,
                    input_value: x_parts[k],
                    output_value: 0,
                    output_deriv: dh_parts[k],
                    input_deriv: dx_parts[k],
                }
            } else {
                Command::BackpropNoModelUpdate {
                    component: AFFINE,
                    precomputed_indexes: 0,
                    input_value: x_parts[k],
                    output_value: 0,
                    output_deriv: dh_parts[k],
                    input_deriv: dx_parts[k],
                }
            };
            commands.push(affine);
        }
        for &dh in &dh_parts {
            commands.push(Command::DeallocMatrix { submatrix: dh });
        }
        if let Some(dx) = dx {
            commands.push(Command::ProvideOutput { submatrix: dx, node: INPUT_NODE });
        }
    }
    c.commands = commands;
    Ok(c)
}

/// Number of buffers allocated at the busiest compute command
pub fn peak_live_buffers(c: &Computation) -> usize {
    let mut live = 0usize;
    let mut peak = 0usize;
    for command in &c.commands {
        match command {
            Command::AllocMatrixZeroed { .. }
            | Command::AllocMatrixUndefined { .. }
            | Command::AcceptInput { .. } => {
                live += 1;
            }
            Command::DeallocMatrix { .. } => live = live.saturating_sub(1),
            // takes over storage: count unchanged
            Command::AllocMatrixFromOther { .. } | Command::AllocMatrixFromOtherZeroed { .. } => {}
            _ => peak = peak.max(live),
        }
    }
    peak
}

/// Shorthand for the counting lowering
pub fn counting_lowering(chunks: usize) -> ChainLowering {
    ChainLowering::new(chunks)
}

pub fn count_commands(c: &Computation, pred: impl Fn(&Command) -> bool) -> usize {
    c.commands.iter().filter(|cmd| pred(cmd)).count()
}

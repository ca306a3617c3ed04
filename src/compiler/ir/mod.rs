//! # Computation IR
//!
//! A computation is a flat list of commands over numbered buffers
//! ("matrices") and rectangular views into them ("submatrices").
//!
//! ```text
//! ir/
//! ├── mod.rs          # This file - module definition and re-exports
//! ├── command.rs      # CommandType, Command (closed set of operations)
//! ├── computation.rs  # Computation, MatrixInfo, SubMatrixInfo, debug info
//! ├── network.rs      # Network trait, component properties
//! ├── device.rs       # DeviceIndexes (executor-facing index layout)
//! └── print.rs        # Textual rendering
//! ```
//!
//! Index 0 of the buffer table and of the view table is reserved: buffer 0
//! is empty and view 0 is the null view used for absent arguments.

mod command;
mod computation;
pub mod device;
mod network;
pub mod print;

pub use command::{Command, CommandType};
pub use computation::{
    Cindex, Computation, Index, MatrixDebugInfo, MatrixInfo, SubMatrixInfo,
};
pub use device::{DeviceIndexes, DeviceRowRef};
pub use network::{ComponentInfo, ComponentProperties, Network, NetworkSpec, NodeKind};
pub use print::{format_command, format_submatrix};

//! Executor-facing index layout
//!
//! The `(view, row)` pairs of `indexes_multi` are resolved into absolute
//! buffer coordinates once a computation is final, so the executor never
//! has to consult the view table while running a *-multi command.

use super::computation::Computation;
use serde::{Deserialize, Serialize};

/// Absolute location of one row; all fields are -1 for the no-op sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceRowRef {
    pub matrix: i32,
    pub row: i32,
    pub col_offset: i32,
}

impl DeviceRowRef {
    pub const NONE: DeviceRowRef = DeviceRowRef {
        matrix: -1,
        row: -1,
        col_offset: -1,
    };

    pub fn is_none(&self) -> bool {
        self.matrix < 0
    }
}

/// Resolved index tables, parallel to `Computation::indexes_multi`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIndexes {
    pub rows_multi: Vec<Vec<DeviceRowRef>>,
}

impl DeviceIndexes {
    /// Resolve every `(view, row)` pair of `computation`
    pub fn build(computation: &Computation) -> Self {
        let rows_multi = computation
            .indexes_multi
            .iter()
            .map(|pairs| {
                pairs
                    .iter()
                    .map(|&(s, r)| {
                        if s < 0 || r < 0 {
                            return DeviceRowRef::NONE;
                        }
                        match computation.submatrices.get(s as usize) {
                            Some(info) => DeviceRowRef {
                                matrix: info.matrix_index as i32,
                                row: info.row_offset as i32 + r,
                                col_offset: info.col_offset as i32,
                            },
                            None => DeviceRowRef::NONE,
                        }
                    })
                    .collect()
            })
            .collect();
        Self { rows_multi }
    }
}

impl Computation {
    /// Fill in `device_indexes`; call once no further rewrites will happen
    pub fn compute_device_indexes(&mut self) {
        self.device_indexes = Some(DeviceIndexes::build(self));
    }
}

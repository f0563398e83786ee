//! Places returned values into the condensed output buffer.

use crate::block::BlockPlan;
use crate::condensed::CondensedMatrix;
use crate::farm_error::{FarmError, try_vec};

/// Owns the output buffer for one run; every cell is written exactly once.
#[derive(Debug)]
pub struct ResultAssembler {
    plan: BlockPlan,
    values: Vec<f64>,
    written: Vec<bool>,
    remaining: usize,
}

impl ResultAssembler {
    pub fn new(plan: BlockPlan) -> Result<Self, FarmError> {
        let len = plan.len();
        let mut values = try_vec("output buffer", len)?;
        values.resize(len, f64::NAN);
        let mut written = try_vec("write map", len)?;
        written.resize(len, false);
        Ok(Self {
            plan,
            values,
            written,
            remaining: len,
        })
    }

    /// Store `value` for `(row, col)` and return its flat index.
    pub fn write(&mut self, row: usize, col: usize, value: f64) -> Result<usize, FarmError> {
        let idx = self
            .plan
            .flat_index(row, col)
            .ok_or(FarmError::PairOutOfBlock { row, col })?;
        if std::mem::replace(&mut self.written[idx], true) {
            return Err(FarmError::DuplicateResult { row, col });
        }
        self.values[idx] = value;
        self.remaining -= 1;
        Ok(idx)
    }

    pub fn plan(&self) -> &BlockPlan {
        &self.plan
    }

    /// Cells still waiting for a result.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    pub fn into_matrix(self) -> Result<CondensedMatrix, FarmError> {
        if !self.is_complete() {
            return Err(FarmError::Incomplete {
                missing: self.remaining,
            });
        }
        CondensedMatrix::from_parts(self.plan, self.values)
    }
}

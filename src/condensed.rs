//! Condensed distance matrix: the flat output buffer plus the plan that
//! indexes it.

use crate::block::BlockPlan;
use crate::farm_error::FarmError;

#[derive(Debug, Clone, PartialEq)]
pub struct CondensedMatrix {
    plan: BlockPlan,
    values: Vec<f64>,
}

impl CondensedMatrix {
    /// Pair a plan with its values; lengths must agree.
    pub fn from_parts(plan: BlockPlan, values: Vec<f64>) -> Result<Self, FarmError> {
        if values.len() != plan.len() {
            return Err(FarmError::InvalidBlock(format!(
                "{} values for a plan of {} pairs",
                values.len(),
                plan.len()
            )));
        }
        Ok(Self { plan, values })
    }

    pub fn plan(&self) -> &BlockPlan {
        &self.plan
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of series spanned by the block (its larger end bound).
    pub fn num_series(&self) -> usize {
        let b = self.plan.block();
        b.row_end.max(b.col_end)
    }

    /// Value stored for exactly `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.plan.flat_index(row, col).map(|i| self.values[i])
    }

    /// Symmetric lookup: 0 on the diagonal, otherwise whichever of `(i, j)`
    /// or `(j, i)` the block holds.
    pub fn get_distance(&self, i: usize, j: usize) -> Option<f64> {
        if i == j {
            return Some(0.0);
        }
        self.get(i, j).or_else(|| self.get(j, i))
    }

    /// Dense symmetric matrix over `num_series()` series; pairs outside the
    /// block are `NaN`.
    pub fn to_square(&self) -> Vec<Vec<f64>> {
        let n = self.num_series();
        (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| self.get_distance(i, j).unwrap_or(f64::NAN))
                    .collect()
            })
            .collect()
    }
}

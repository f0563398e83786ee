//! Block planning: which `(row, col)` pairs a run computes, and where each
//! result lands in the condensed output.
//!
//! A [`Block`] selects a rectangle of the `rows_total × cols_total` pair
//! space, optionally cut to its strict upper triangle. [`BlockPlan`] turns a
//! block into a per-row offsets table so that any pair maps to its flat
//! output index in O(1):
//!
//! ```text
//! index(row, col) = row_start[row] + (col - col_start[row])
//! ```
//!
//! For a triangular block `col_start(r) = max(r + 1, col_begin)` and
//! `row_start(r)` is the number of pairs contributed by all rows above `r`.
//! Rectangular blocks are laid out row-major and need no table.

use crate::farm_error::{FarmError, try_vec};
use serde::{Deserialize, Serialize};

/// Sub-region of the pair space selected for one run.
///
/// `row_end == 0` and `col_end == 0` mean "up to the last sequence".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    pub row_begin: usize,
    pub row_end: usize,
    pub col_begin: usize,
    pub col_end: usize,
    /// Only enumerate `col > row` (symmetric, zero-diagonal matrices).
    pub triangular: bool,
}

impl Default for Block {
    /// The whole strict upper triangle.
    fn default() -> Self {
        Self::full()
    }
}

impl Block {
    /// The whole strict upper triangle of the pair space.
    pub const fn full() -> Self {
        Self {
            row_begin: 0,
            row_end: 0,
            col_begin: 0,
            col_end: 0,
            triangular: true,
        }
    }

    /// Upper-triangular cut of rows `rows` against columns `cols`.
    pub const fn triangular(
        rows: std::ops::Range<usize>,
        cols: std::ops::Range<usize>,
    ) -> Self {
        Self {
            row_begin: rows.start,
            row_end: rows.end,
            col_begin: cols.start,
            col_end: cols.end,
            triangular: true,
        }
    }

    /// Every pair of `rows × cols`, diagonal included.
    pub const fn rectangular(
        rows: std::ops::Range<usize>,
        cols: std::ops::Range<usize>,
    ) -> Self {
        Self {
            row_begin: rows.start,
            row_end: rows.end,
            col_begin: cols.start,
            col_end: cols.end,
            triangular: false,
        }
    }

    /// Resolve open-ended bounds against the table size.
    pub fn normalized(mut self, rows_total: usize, cols_total: usize) -> Self {
        if self.row_end == 0 {
            self.row_end = rows_total;
        }
        if self.col_end == 0 {
            self.col_end = cols_total;
        }
        self
    }

    /// True when the block selects no rows or no columns.
    pub fn is_degenerate(&self) -> bool {
        self.row_end <= self.row_begin || self.col_end <= self.col_begin
    }

    pub fn width(&self) -> usize {
        self.col_end.saturating_sub(self.col_begin)
    }
}

/// Offsets table for a normalized block.
///
/// Built once per run and read-only afterwards. Two plans built from the same
/// inputs compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPlan {
    block: Block,
    len: usize,
    /// First valid column of each block row (triangular only).
    col_start: Vec<usize>,
    /// Pairs contributed by all preceding block rows (triangular only).
    row_start: Vec<usize>,
}

impl BlockPlan {
    /// Plan `block` against a `rows_total × cols_total` pair space.
    ///
    /// A degenerate block yields an empty plan, not an error. Bounds past the
    /// table are rejected rather than truncated.
    pub fn new(rows_total: usize, cols_total: usize, block: Block) -> Result<Self, FarmError> {
        let block = block.normalized(rows_total, cols_total);
        if block.row_end > rows_total || block.col_end > cols_total {
            return Err(FarmError::InvalidBlock(format!(
                "block rows {}..{} cols {}..{} exceed table of {} x {}",
                block.row_begin,
                block.row_end,
                block.col_begin,
                block.col_end,
                rows_total,
                cols_total
            )));
        }
        if block.is_degenerate() {
            log::debug!("block {block:?} is degenerate; planning a zero-length job");
            return Ok(Self {
                block,
                len: 0,
                col_start: Vec::new(),
                row_start: Vec::new(),
            });
        }

        let rows = block.row_end - block.row_begin;
        if !block.triangular {
            let len = rows.checked_mul(block.width()).ok_or(FarmError::Allocation {
                what: "rectangular block",
                len: usize::MAX,
            })?;
            return Ok(Self {
                block,
                len,
                col_start: Vec::new(),
                row_start: Vec::new(),
            });
        }

        let mut col_start = try_vec("column offsets", rows)?;
        let mut row_start = try_vec("row offsets", rows)?;
        let mut acc = 0usize;
        for r in block.row_begin..block.row_end {
            let cb = (r + 1).max(block.col_begin);
            col_start.push(cb);
            row_start.push(acc);
            // rows entirely left of the diagonal contribute nothing
            acc += block.col_end.saturating_sub(cb);
        }
        Ok(Self {
            block,
            len: acc,
            col_start,
            row_start,
        })
    }

    /// The normalized block this plan was built from.
    pub fn block(&self) -> &Block {
        &self.block
    }

    /// Number of pairs (and output cells).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_triangular(&self) -> bool {
        self.block.triangular
    }

    /// First valid column of `row`, or `None` if `row` is outside the block.
    pub fn col_start(&self, row: usize) -> Option<usize> {
        if row < self.block.row_begin || row >= self.block.row_end {
            return None;
        }
        if self.block.triangular {
            self.col_start.get(row - self.block.row_begin).copied()
        } else {
            Some(self.block.col_begin)
        }
    }

    /// Flat index of the first pair of `row`, or `None` if `row` is outside the block.
    pub fn row_start(&self, row: usize) -> Option<usize> {
        if row < self.block.row_begin || row >= self.block.row_end {
            return None;
        }
        let ri = row - self.block.row_begin;
        if self.block.triangular {
            self.row_start.get(ri).copied()
        } else {
            Some(ri * self.block.width())
        }
    }

    /// Condensed index of `(row, col)`, or `None` if the block does not contain it.
    #[inline]
    pub fn flat_index(&self, row: usize, col: usize) -> Option<usize> {
        let b = &self.block;
        if row < b.row_begin || row >= b.row_end || col < b.col_begin || col >= b.col_end {
            return None;
        }
        let ri = row - b.row_begin;
        if b.triangular {
            let cb = self.col_start[ri];
            if col < cb {
                return None;
            }
            Some(self.row_start[ri] + (col - cb))
        } else {
            Some(ri * b.width() + (col - b.col_begin))
        }
    }

    /// Inverse of [`flat_index`](Self::flat_index).
    pub fn pair_at(&self, index: usize) -> Option<(usize, usize)> {
        if index >= self.len {
            return None;
        }
        let b = &self.block;
        if b.triangular {
            // last row whose start is <= index; empty rows share their
            // successor's start and are skipped by taking the last match
            let ri = self.row_start.partition_point(|&s| s <= index) - 1;
            Some((b.row_begin + ri, self.col_start[ri] + (index - self.row_start[ri])))
        } else {
            let w = b.width();
            Some((b.row_begin + index / w, b.col_begin + index % w))
        }
    }

    /// All planned pairs in row-major ascending order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let b = self.block;
        let rows = if self.len == 0 { 0..0 } else { b.row_begin..b.row_end };
        rows.flat_map(move |r| {
            let cb = if b.triangular {
                self.col_start[r - b.row_begin]
            } else {
                b.col_begin
            };
            (cb..b.col_end).map(move |c| (r, c))
        })
    }
}

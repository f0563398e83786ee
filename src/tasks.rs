//! Flat, ordered task list materialized from a [`BlockPlan`].

use crate::block::BlockPlan;
use crate::farm_error::{FarmError, try_vec};
use std::ops::Range;

/// One `(row, col)` pair to compute. Indices refer to the sequence table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Task {
    pub row: usize,
    pub col: usize,
}

impl Task {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl From<(usize, usize)> for Task {
    fn from((row, col): (usize, usize)) -> Self {
        Self { row, col }
    }
}

/// Dense row-major list of tasks plus a cursor over the unassigned tail.
///
/// Tasks are handed out in contiguous index ranges so a batch can be
/// identified by its start index alone.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    tasks: Vec<Task>,
    next: usize,
}

impl TaskQueue {
    /// Enumerate every pair of `plan`; the count always equals `plan.len()`.
    pub fn from_plan(plan: &BlockPlan) -> Result<Self, FarmError> {
        let mut tasks = try_vec("task list", plan.len())?;
        tasks.extend(plan.pairs().map(Task::from));
        debug_assert_eq!(tasks.len(), plan.len());
        Ok(Self { tasks, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks not yet handed out.
    pub fn remaining(&self) -> usize {
        self.tasks.len() - self.next
    }

    pub fn is_drained(&self) -> bool {
        self.next == self.tasks.len()
    }

    pub fn get(&self, index: usize) -> Option<Task> {
        self.tasks.get(index).copied()
    }

    /// Tasks in `range`, or `None` if it reaches past the end.
    pub fn slice(&self, range: Range<usize>) -> Option<&[Task]> {
        self.tasks.get(range)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    /// Claim the next `min(batch_size, remaining)` tasks.
    pub fn next_unit(&mut self, batch_size: usize) -> Option<Range<usize>> {
        if self.is_drained() || batch_size == 0 {
            return None;
        }
        let start = self.next;
        let end = start + batch_size.min(self.remaining());
        self.next = end;
        Some(start..end)
    }
}

//! Worker loop: receive work, compute distances, reply, until TERMINATE.

use crate::comm::Communicator;
use crate::coordinator::COORDINATOR;
use crate::distance::Distance;
use crate::farm_error::FarmError;
use crate::protocol::{ResultReply, Tag, WorkOrder};
use crate::sequence::SequenceTable;
use bytes::Bytes;
use std::sync::Arc;

/// Counters a worker reports when it shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub tasks: usize,
    pub units: usize,
    /// Messages with a tag the worker does not understand.
    pub ignored: usize,
}

/// Purely reactive: never sends anything except the reply to a WORK.
pub struct Worker<'a, C: Communicator, D: Distance + ?Sized> {
    comm: &'a C,
    distance: &'a D,
    /// Local copy of the table; required only for pair-only work orders.
    table: Option<Arc<SequenceTable>>,
    stats: WorkerStats,
}

impl<'a, C: Communicator, D: Distance + ?Sized> Worker<'a, C, D> {
    pub fn new(comm: &'a C, distance: &'a D, table: Option<Arc<SequenceTable>>) -> Self {
        Self {
            comm,
            distance,
            table,
            stats: WorkerStats::default(),
        }
    }

    pub fn run(mut self) -> Result<WorkerStats, FarmError> {
        let me = self.comm.rank();
        loop {
            let env = self.comm.recv_from(COORDINATOR)?;
            match Tag::from_u16(env.tag) {
                Some(Tag::Terminate) => {
                    log::debug!(
                        "worker {me}: terminate after {} tasks in {} units",
                        self.stats.tasks,
                        self.stats.units
                    );
                    return Ok(self.stats);
                }
                Some(Tag::Work) => {
                    let reply = self.handle(env.payload)?;
                    self.comm
                        .send(COORDINATOR, Tag::Result.as_u16(), reply.encode())?;
                    self.stats.units += 1;
                    self.stats.tasks += reply.len();
                }
                _ => {
                    log::warn!(
                        "worker {me}: unknown message tag {} from coordinator, ignoring",
                        env.tag
                    );
                    self.stats.ignored += 1;
                }
            }
        }
    }

    fn handle(&self, payload: Bytes) -> Result<ResultReply, FarmError> {
        match WorkOrder::decode(payload)? {
            WorkOrder::Pair { task } => {
                let table = self.table.as_deref().ok_or(FarmError::MissingTable)?;
                let value = self
                    .distance
                    .distance(table.series(task.row)?, table.series(task.col)?);
                Ok(ResultReply::Pair { task, value })
            }
            WorkOrder::Inline { task, a, b } => Ok(ResultReply::Pair {
                task,
                value: self.distance.distance(&a, &b),
            }),
            WorkOrder::Batch { batch_id, pairs } => Ok(ResultReply::Batch {
                batch_id,
                values: compute_batch(self.distance, &pairs),
            }),
        }
    }
}

/// Distances of a batch, in batch order.
#[cfg(feature = "rayon")]
fn compute_batch<D: Distance + ?Sized>(distance: &D, pairs: &[(Vec<f64>, Vec<f64>)]) -> Vec<f64> {
    use rayon::prelude::*;
    pairs
        .par_iter()
        .map(|(a, b)| distance.distance(a, b))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn compute_batch<D: Distance + ?Sized>(distance: &D, pairs: &[(Vec<f64>, Vec<f64>)]) -> Vec<f64> {
    pairs.iter().map(|(a, b)| distance.distance(a, b)).collect()
}

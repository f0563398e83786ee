//! Rank-0 scheduling loop.
//!
//! The coordinator owns the task queue, the offsets table and the output
//! buffer. It hands one unit of work to every worker, then reacts to
//! replies: each reply is placed into the output and the replying worker
//! immediately gets the next unit, or a TERMINATE once the queue is empty.
//! At most one unit is outstanding per worker, so faster workers simply
//! pull more units.
//!
//! ```text
//! DistributingInitial ─▶ AwaitingResult ⇄ DistributingNext
//!                              │
//!                              ▼
//!                          Draining ─▶ Done
//! ```
//!
//! There is no timeout. A worker that never answers stalls the run.

use crate::assembler::ResultAssembler;
use crate::block::{Block, BlockPlan};
use crate::comm::{Communicator, Envelope};
use crate::condensed::CondensedMatrix;
use crate::farm_error::FarmError;
use crate::protocol::{Protocol, ResultReply, Tag};
use crate::sequence::SequenceTable;
use crate::tasks::TaskQueue;
use bytes::Bytes;
use hashbrown::HashMap;
use std::time::{Duration, Instant};

/// Rank of the coordinator in every communicator.
pub const COORDINATOR: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    DistributingInitial,
    AwaitingResult,
    DistributingNext,
    /// Queue is empty; remaining replies are answered with TERMINATE.
    Draining,
    Done,
}

/// The unit currently assigned to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outstanding {
    pub batch_id: u64,
    /// Index of the first task of the unit in the queue.
    pub start: usize,
    pub count: usize,
}

/// Coordinator-side bookkeeping for one worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerState {
    pub outstanding: Option<Outstanding>,
    pub tasks_completed: usize,
    pub units_completed: usize,
    pub terminated: bool,
}

/// Message and task counters for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub tasks: usize,
    pub workers: usize,
    pub work_sent: usize,
    pub results_received: usize,
    pub terminates_sent: usize,
    pub ignored: usize,
    /// Tasks completed per worker, indexed by `rank - 1`.
    pub per_worker: Vec<usize>,
    /// Distinct phases in the order they were first entered.
    pub phases: Vec<Phase>,
    /// Wall-clock time of [`Coordinator::run`].
    pub elapsed: Duration,
}

pub struct Coordinator<'a, C: Communicator> {
    comm: &'a C,
    table: &'a SequenceTable,
    protocol: Protocol,
    queue: TaskQueue,
    assembler: ResultAssembler,
    workers: HashMap<usize, WorkerState>,
    pending_terminations: usize,
    next_batch_id: u64,
    phase: Phase,
    report: RunReport,
}

impl<'a, C: Communicator> Coordinator<'a, C> {
    /// Plan `block` over the square pair space of `table` and set up the
    /// queue and output buffer. Nothing is sent yet.
    pub fn new(
        comm: &'a C,
        table: &'a SequenceTable,
        protocol: Protocol,
        block: Block,
    ) -> Result<Self, FarmError> {
        if comm.rank() != COORDINATOR {
            return Err(FarmError::InvalidConfig(format!(
                "coordinator must run on rank {COORDINATOR}, not {}",
                comm.rank()
            )));
        }
        if protocol.unit_size() == 0 {
            return Err(FarmError::InvalidConfig("batch_size must be > 0".into()));
        }
        let plan = BlockPlan::new(table.len(), table.len(), block)?;
        let queue = TaskQueue::from_plan(&plan)?;
        let assembler = ResultAssembler::new(plan)?;
        let n_workers = comm.size().saturating_sub(1);
        if n_workers == 0 && !queue.is_empty() {
            return Err(FarmError::NoWorkers);
        }
        let workers = (1..=n_workers).map(|w| (w, WorkerState::default())).collect();
        Ok(Self {
            comm,
            table,
            protocol,
            report: RunReport {
                tasks: queue.len(),
                workers: n_workers,
                per_worker: vec![0; n_workers],
                ..RunReport::default()
            },
            queue,
            assembler,
            workers,
            pending_terminations: n_workers,
            next_batch_id: 0,
            phase: Phase::DistributingInitial,
        })
    }

    pub fn plan(&self) -> &BlockPlan {
        self.assembler.plan()
    }

    /// Drive the run to completion and hand back the filled matrix.
    pub fn run(mut self) -> Result<(CondensedMatrix, RunReport), FarmError> {
        let started = Instant::now();
        self.enter(Phase::DistributingInitial);
        log::info!(
            "coordinator: {} tasks over {} workers ({:?})",
            self.queue.len(),
            self.pending_terminations,
            self.protocol
        );
        let ranks: Vec<usize> = (1..=self.report.workers).collect();
        for worker in ranks {
            self.dispatch(worker)?;
        }

        while self.pending_terminations > 0 {
            self.enter(Phase::AwaitingResult);
            let env = self.comm.recv_any()?;
            if Tag::from_u16(env.tag) != Some(Tag::Result) {
                log::warn!(
                    "coordinator: unexpected tag {} from rank {}, ignoring",
                    env.tag,
                    env.source
                );
                self.report.ignored += 1;
                continue;
            }
            let worker = self.absorb(env)?;
            self.enter(if self.queue.is_drained() {
                Phase::Draining
            } else {
                Phase::DistributingNext
            });
            self.dispatch(worker)?;
        }

        self.enter(Phase::Done);
        if !self.assembler.is_complete() {
            return Err(FarmError::Incomplete {
                missing: self.assembler.remaining(),
            });
        }
        self.report.elapsed = started.elapsed();
        log::info!(
            "coordinator: done in {:?}, {} work / {} result / {} terminate messages",
            self.report.elapsed,
            self.report.work_sent,
            self.report.results_received,
            self.report.terminates_sent
        );
        let matrix = self.assembler.into_matrix()?;
        Ok((matrix, self.report))
    }

    fn enter(&mut self, phase: Phase) {
        if !self.report.phases.contains(&phase) {
            log::debug!("coordinator: {:?} -> {:?}", self.phase, phase);
            self.report.phases.push(phase);
        }
        self.phase = phase;
    }

    /// Give `worker` its next unit, or TERMINATE if nothing is left.
    fn dispatch(&mut self, worker: usize) -> Result<(), FarmError> {
        let state = self.workers.get_mut(&worker).ok_or_else(|| FarmError::Protocol {
            peer: worker,
            reason: "not a worker rank".into(),
        })?;
        debug_assert!(state.outstanding.is_none());

        match self.queue.next_unit(self.protocol.unit_size()) {
            Some(range) => {
                let tasks = self.queue.slice(range.clone()).unwrap_or_default();
                let batch_id = self.next_batch_id;
                self.next_batch_id += 1;
                let payload = self.protocol.encode_work(batch_id, tasks, self.table)?;
                self.comm.send(worker, Tag::Work.as_u16(), payload)?;
                log::debug!(
                    "coordinator: unit {batch_id} (tasks {}..{}) -> rank {worker}",
                    range.start,
                    range.end
                );
                state.outstanding = Some(Outstanding {
                    batch_id,
                    start: range.start,
                    count: range.len(),
                });
                self.report.work_sent += 1;
            }
            None => {
                self.comm.send(worker, Tag::Terminate.as_u16(), Bytes::new())?;
                state.terminated = true;
                self.pending_terminations -= 1;
                self.report.terminates_sent += 1;
                log::debug!(
                    "coordinator: terminate -> rank {worker}, {} pending",
                    self.pending_terminations
                );
            }
        }
        Ok(())
    }

    /// Decode a RESULT and write its values. Returns the replying rank.
    fn absorb(&mut self, env: Envelope) -> Result<usize, FarmError> {
        let worker = env.source;
        let violation = |reason: String| FarmError::Protocol {
            peer: worker,
            reason,
        };
        let state = self
            .workers
            .get_mut(&worker)
            .ok_or_else(|| violation("not a worker rank".into()))?;
        let unit = state
            .outstanding
            .take()
            .ok_or_else(|| violation("result without outstanding work".into()))?;

        match ResultReply::decode(env.payload)? {
            ResultReply::Pair { task, value } => {
                if unit.count != 1 || self.queue.get(unit.start) != Some(task) {
                    return Err(violation(format!(
                        "result for ({}, {}) does not match unit {}",
                        task.row, task.col, unit.batch_id
                    )));
                }
                self.assembler.write(task.row, task.col, value)?;
            }
            ResultReply::Batch { batch_id, values } => {
                if batch_id != unit.batch_id || values.len() != unit.count {
                    return Err(violation(format!(
                        "batch {batch_id} with {} values, expected batch {} with {}",
                        values.len(),
                        unit.batch_id,
                        unit.count
                    )));
                }
                let tasks = self
                    .queue
                    .slice(unit.start..unit.start + unit.count)
                    .ok_or_else(|| violation("unit outside the task list".into()))?;
                // values arrive in the task order of the unit
                for (task, value) in tasks.iter().zip(values) {
                    self.assembler.write(task.row, task.col, value)?;
                }
            }
        }

        state.tasks_completed += unit.count;
        state.units_completed += 1;
        self.report.per_worker[worker - 1] += unit.count;
        self.report.results_received += 1;
        Ok(worker)
    }
}

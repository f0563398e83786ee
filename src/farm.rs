//! Entry points tying planner, coordinator and workers together.
//!
//! * [`run_local`]: coordinator on the calling thread, `workers` scoped
//!   threads over [`LocalComm`].
//! * [`run_rank`]: SPMD entry for an already-running communicator (MPI);
//!   rank 0 coordinates, every other rank works.
//! * [`serial_distance_matrix`]: single-threaded reference with the same
//!   output layout.

use crate::block::{Block, BlockPlan};
use crate::comm::{Communicator, LocalComm};
use crate::condensed::CondensedMatrix;
use crate::config::FarmConfig;
use crate::coordinator::{COORDINATOR, Coordinator, RunReport};
use crate::distance::Distance;
use crate::farm_error::{FarmError, try_vec};
use crate::protocol::{Protocol, Tag, decode_table, encode_table};
use crate::sequence::SequenceTable;
use crate::worker::{Worker, WorkerStats};
use bytes::Bytes;
use std::sync::Arc;

/// Everything a finished local run produces.
#[derive(Debug, Clone)]
pub struct FarmOutput {
    pub matrix: CondensedMatrix,
    pub report: RunReport,
    /// Per-worker counters, indexed by `rank - 1`.
    pub workers: Vec<WorkerStats>,
}

/// Role-specific outcome of [`run_rank`].
#[derive(Debug, Clone)]
pub enum RankOutcome {
    Coordinator {
        matrix: CondensedMatrix,
        report: RunReport,
    },
    Worker(WorkerStats),
}

/// Compute the matrix with an in-process coordinator and `config.workers`
/// worker threads.
pub fn run_local<D: Distance + ?Sized>(
    table: Arc<SequenceTable>,
    distance: &D,
    config: &FarmConfig,
) -> Result<FarmOutput, FarmError> {
    config.validate()?;
    let protocol = config.protocol();
    let mut comms = LocalComm::world(config.workers + 1);
    let root = comms.remove(COORDINATOR);

    std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                // pre-distributed copy for the index-only protocol
                let local = protocol.needs_table().then(|| Arc::clone(&table));
                s.spawn(move || Worker::new(&comm, distance, local).run())
            })
            .collect();

        let outcome = Coordinator::new(&root, &table, protocol, config.block)
            .and_then(Coordinator::run);
        if outcome.is_err() {
            // release workers still blocked on their inbox
            for w in 1..=config.workers {
                let _ = root.send(w, Tag::Terminate.as_u16(), Bytes::new());
            }
        }

        let mut workers = Vec::with_capacity(handles.len());
        let mut worker_err = None;
        for h in handles {
            match h.join() {
                Ok(Ok(stats)) => workers.push(stats),
                Ok(Err(e)) => {
                    log::warn!("worker failed: {e}");
                    worker_err.get_or_insert(e);
                    workers.push(WorkerStats::default());
                }
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        // a failing worker is the root cause of whatever the coordinator saw
        if let Some(e) = worker_err {
            return Err(e);
        }
        let (matrix, report) = outcome?;
        Ok(FarmOutput {
            matrix,
            report,
            workers,
        })
    })
}

/// Run this rank's role. Rank 0 must pass the table; workers pass `None`
/// and receive a copy at start-up when the protocol needs one.
pub fn run_rank<C: Communicator, D: Distance + ?Sized>(
    comm: &C,
    table: Option<Arc<SequenceTable>>,
    distance: &D,
    config: &FarmConfig,
) -> Result<RankOutcome, FarmError> {
    config.validate()?;
    let protocol = config.protocol();
    if comm.rank() == COORDINATOR {
        let outcome = coordinate(comm, table, protocol, config.block);
        if let Err(e) = &outcome {
            log::warn!("coordinator failed, terminating workers: {e}");
            // workers may still be waiting on the table or their first unit
            for w in 1..comm.size() {
                let _ = comm.send(w, Tag::Terminate.as_u16(), Bytes::new());
            }
        }
        let (matrix, report) = outcome?;
        Ok(RankOutcome::Coordinator { matrix, report })
    } else {
        let local = match (protocol.needs_table(), table) {
            (true, Some(t)) => Some(t),
            (true, None) => match receive_table(comm)? {
                Some(t) => Some(Arc::new(t)),
                None => {
                    log::debug!("worker {}: terminated before the table arrived", comm.rank());
                    return Ok(RankOutcome::Worker(WorkerStats::default()));
                }
            },
            (false, t) => t,
        };
        Worker::new(comm, distance, local)
            .run()
            .map(RankOutcome::Worker)
    }
}

/// Plan the block, ship the table if the protocol needs it, then run.
fn coordinate<C: Communicator>(
    comm: &C,
    table: Option<Arc<SequenceTable>>,
    protocol: Protocol,
    block: Block,
) -> Result<(CondensedMatrix, RunReport), FarmError> {
    let table = table.ok_or_else(|| {
        FarmError::InvalidConfig("the coordinator needs the sequence table".into())
    })?;
    let coordinator = Coordinator::new(comm, &table, protocol, block)?;
    if protocol.needs_table() {
        broadcast_table(comm, &table)?;
    }
    coordinator.run()
}

/// Ship the table to every worker rank (start-up, singleton protocol).
pub fn broadcast_table<C: Communicator>(comm: &C, table: &SequenceTable) -> Result<(), FarmError> {
    let payload = encode_table(table)?;
    log::info!(
        "coordinator: broadcasting {} sequences ({} bytes) to {} workers",
        table.len(),
        payload.len(),
        comm.size().saturating_sub(1)
    );
    for w in 1..comm.size() {
        comm.send(w, Tag::Table.as_u16(), payload.clone())?;
    }
    Ok(())
}

/// Worker side of [`broadcast_table`]. `None` means the coordinator sent
/// TERMINATE instead, because it failed before the broadcast.
pub fn receive_table<C: Communicator>(comm: &C) -> Result<Option<SequenceTable>, FarmError> {
    let env = comm.recv_from(COORDINATOR)?;
    match Tag::from_u16(env.tag) {
        Some(Tag::Table) => decode_table(env.payload).map(Some),
        Some(Tag::Terminate) => Ok(None),
        _ => Err(FarmError::Protocol {
            peer: COORDINATOR,
            reason: format!("expected table broadcast, got tag {}", env.tag),
        }),
    }
}

/// Compute the same condensed matrix on the calling thread.
pub fn serial_distance_matrix<D: Distance + ?Sized>(
    table: &SequenceTable,
    distance: &D,
    block: Block,
) -> Result<CondensedMatrix, FarmError> {
    let plan = BlockPlan::new(table.len(), table.len(), block)?;
    let mut values = try_vec("output buffer", plan.len())?;
    for (r, c) in plan.pairs() {
        values.push(distance.distance(table.series(r)?, table.series(c)?));
    }
    CondensedMatrix::from_parts(plan, values)
}

/// Convenience for callers that just want one protocol.
pub fn run_local_with<D: Distance + ?Sized>(
    table: Arc<SequenceTable>,
    distance: &D,
    protocol: Protocol,
    workers: usize,
) -> Result<FarmOutput, FarmError> {
    let (kind, batch_size) = match protocol {
        Protocol::Singleton => (crate::protocol::ProtocolKind::Singleton, 1),
        Protocol::Inline => (crate::protocol::ProtocolKind::Inline, 1),
        Protocol::Packed { batch_size } => (crate::protocol::ProtocolKind::Packed, batch_size),
    };
    let config = FarmConfig {
        protocol: kind,
        batch_size,
        workers,
        block: Block::full(),
    };
    run_local(table, distance, &config)
}

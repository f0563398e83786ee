#![cfg_attr(docsrs, feature(doc_cfg))]
//! # pairwise-farm
//!
//! pairwise-farm computes condensed pairwise distance matrices (DTW by default)
//! over a table of time series, using a master/worker task farm. Rank 0 plans
//! the pairs, hands out units of work on demand and assembles the replies; every
//! other rank computes distances until told to stop.
//!
//! ## Features
//! - Block planning with O(1) pair → output index mapping (triangular or rectangular)
//! - Three work protocols: index-only, inline sequences, packed batches
//! - Pluggable communication backends (in-process threads, MPI) behind one trait
//! - Pull-based load balancing with at most one outstanding unit per worker
//! - CSV loading, pair-list output and clustering of the finished matrix
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! pairwise-farm = "0.1"
//! # Optional features:
//! # features = ["mpi-support"]
//! ```
//!
//! ```no_run
//! use pairwise_farm::prelude::*;
//!
//! let table = SequenceTable::new(vec![vec![0.0, 1.0, 2.0], vec![0.0, 2.0, 1.0]]);
//! let out = run_local(table.into_shared(), &Dtw::default(), &FarmConfig::default())?;
//! println!("{:?}", out.matrix.as_slice());
//! # Ok::<(), FarmError>(())
//! ```
//!
//! ## Determinism
//!
//! The output layout depends only on the block and the table size. Which worker
//! computes which pair does not affect the result.

pub mod assembler;
pub mod block;
pub mod cluster;
pub mod comm;
pub mod condensed;
pub mod config;
pub mod coordinator;
pub mod distance;
pub mod farm;
pub mod farm_error;
pub mod io;
pub mod protocol;
pub mod sequence;
pub mod tasks;
pub mod wire;
pub mod worker;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::assembler::ResultAssembler;
    pub use crate::block::{Block, BlockPlan};
    pub use crate::cluster::{Algorithm, Clustering};
    pub use crate::comm::{Communicator, Envelope, LocalComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::condensed::CondensedMatrix;
    pub use crate::config::FarmConfig;
    pub use crate::coordinator::{COORDINATOR, Coordinator, Phase, RunReport};
    pub use crate::distance::{Distance, Dtw, Euclidean};
    pub use crate::farm::{
        FarmOutput, RankOutcome, run_local, run_local_with, run_rank, serial_distance_matrix,
    };
    pub use crate::farm_error::FarmError;
    pub use crate::protocol::{Protocol, ProtocolKind, Tag};
    pub use crate::sequence::{SequenceTable, SeriesMeta};
    pub use crate::tasks::{Task, TaskQueue};
    pub use crate::worker::{Worker, WorkerStats};
}

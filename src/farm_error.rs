//! FarmError: unified error type for pairwise-farm public APIs
//!
//! Every fallible public operation in the crate returns `Result<_, FarmError>`.
//! Local, recoverable conditions (a degenerate block, an unknown message tag
//! at a worker) never surface here; they are absorbed where they occur.

use thiserror::Error;

/// Unified error type for pairwise-farm operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FarmError {
    /// Block bounds reach past the sequence table.
    #[error("invalid block: {0}")]
    InvalidBlock(String),
    /// A configuration value is out of range (e.g. zero batch size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Task list, offsets or output buffer could not be allocated.
    #[error("cannot allocate {what} (length = {len})")]
    Allocation { what: &'static str, len: usize },
    /// A payload did not match the expected wire layout.
    #[error("malformed wire payload: {0}")]
    Wire(String),
    /// A worker answered something the coordinator cannot place.
    #[error("protocol violation from rank {peer}: {reason}")]
    Protocol { peer: usize, reason: String },
    /// The same output cell was written twice.
    #[error("result for pair ({row}, {col}) was already written")]
    DuplicateResult { row: usize, col: usize },
    /// A result names a pair that the plan does not contain.
    #[error("pair ({row}, {col}) lies outside the planned block")]
    PairOutOfBlock { row: usize, col: usize },
    /// The run ended before every cell was written.
    #[error("run finished with {missing} results missing")]
    Incomplete { missing: usize },
    /// Transport failure (peer gone, MPI error).
    #[error("communication error with rank {peer}: {reason}")]
    Comm { peer: usize, reason: String },
    /// Tasks exist but the communicator has no worker ranks.
    #[error("no workers available for a non-empty task queue")]
    NoWorkers,
    /// A pair-only work order arrived at a worker without a local table.
    #[error("pair work order received but no sequence table is available locally")]
    MissingTable,
    #[error("sequence id {0} is not in the table")]
    UnknownSequence(usize),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("clustering error: {0}")]
    Cluster(String),
}

impl From<std::io::Error> for FarmError {
    fn from(e: std::io::Error) -> Self {
        FarmError::Io(e.to_string())
    }
}

/// Allocate an empty vector with room for exactly `len` items, reporting
/// failure as [`FarmError::Allocation`] instead of aborting.
pub(crate) fn try_vec<T>(what: &'static str, len: usize) -> Result<Vec<T>, FarmError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| FarmError::Allocation { what, len })?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_vec_reserves_requested_capacity() {
        let v: Vec<u64> = try_vec("test buffer", 17).unwrap();
        assert!(v.capacity() >= 17);
        assert!(v.is_empty());
    }

    #[test]
    fn try_vec_reports_impossible_allocation() {
        let err = try_vec::<u64>("huge buffer", usize::MAX).unwrap_err();
        assert_eq!(
            err,
            FarmError::Allocation {
                what: "huge buffer",
                len: usize::MAX
            }
        );
    }

    #[test]
    fn messages_name_the_peer() {
        let e = FarmError::Protocol {
            peer: 3,
            reason: "result without outstanding work".into(),
        };
        assert_eq!(
            e.to_string(),
            "protocol violation from rank 3: result without outstanding work"
        );
    }
}

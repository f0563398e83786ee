//! Run configuration.

use crate::block::Block;
use crate::farm_error::FarmError;
use crate::protocol::{Protocol, ProtocolKind};
use serde::{Deserialize, Serialize};

/// Settings for one distance-matrix run.
///
/// `batch_size` applies to the packed protocol only; singleton protocols
/// always ship one task per message. `workers` is used by
/// [`crate::farm::run_local`]; with MPI the world size decides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FarmConfig {
    pub protocol: ProtocolKind,
    pub batch_size: usize,
    pub workers: usize,
    pub block: Block,
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolKind::Packed,
            batch_size: 4,
            workers: std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1)
                .max(1),
            block: Block::full(),
        }
    }
}

impl FarmConfig {
    pub fn validate(&self) -> Result<(), FarmError> {
        if self.batch_size == 0 {
            return Err(FarmError::InvalidConfig("batch_size must be > 0".into()));
        }
        if self.workers == 0 {
            log::warn!("no local workers configured; only an empty block can complete");
        }
        Ok(())
    }

    pub fn protocol(&self) -> Protocol {
        match self.protocol {
            ProtocolKind::Singleton => Protocol::Singleton,
            ProtocolKind::Inline => Protocol::Inline,
            ProtocolKind::Packed => Protocol::Packed {
                batch_size: self.batch_size,
            },
        }
    }
}

//! Message tags and the three WORK/RESULT payload strategies.
//!
//! | protocol    | WORK                                   | RESULT                       |
//! |-------------|----------------------------------------|------------------------------|
//! | `Singleton` | `(row, col)`                           | `(row, col, value)`          |
//! | `Inline`    | `(row, col)` + both sequences          | `(row, col, value)`          |
//! | `Packed`    | `(batch_id, n)` + `n` sequence pairs   | `(batch_id, n)` + `n` values |
//!
//! All three share the same coordinator state machine; only the payloads
//! differ. Payloads are self-describing (see [`crate::wire`]), so a worker
//! decodes whatever it receives without knowing the configured protocol.

use crate::farm_error::FarmError;
use crate::sequence::SequenceTable;
use crate::tasks::Task;
use crate::wire::{
    PayloadReader, PayloadWriter, WireBatchHdr, WirePair, WirePairResult, kind, series_len,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::mem::size_of;

/// Message tags. `Terminate` carries no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Tag {
    Work = 1,
    Terminate = 2,
    Result = 3,
    /// Start-up broadcast of the sequence table (singleton protocol only).
    Table = 4,
}

impl Tag {
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(tag: u16) -> Option<Self> {
        match tag {
            1 => Some(Tag::Work),
            2 => Some(Tag::Terminate),
            3 => Some(Tag::Result),
            4 => Some(Tag::Table),
            _ => None,
        }
    }
}

/// Serializable protocol selector used by [`crate::config::FarmConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    Singleton,
    Inline,
    #[default]
    Packed,
}

/// Resolved payload strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Workers hold the table; WORK carries indices only.
    Singleton,
    /// WORK carries both sequences of one pair.
    Inline,
    /// WORK carries up to `batch_size` pairs packed into one buffer.
    Packed { batch_size: usize },
}

impl Protocol {
    /// Tasks per WORK message.
    pub fn unit_size(&self) -> usize {
        match *self {
            Protocol::Singleton | Protocol::Inline => 1,
            Protocol::Packed { batch_size } => batch_size,
        }
    }

    /// Whether workers need their own copy of the sequence table.
    pub fn needs_table(&self) -> bool {
        matches!(self, Protocol::Singleton)
    }

    /// Encode one unit of work. Singleton protocols expect exactly one task.
    pub fn encode_work(
        &self,
        batch_id: u64,
        tasks: &[Task],
        table: &SequenceTable,
    ) -> Result<Bytes, FarmError> {
        match self {
            Protocol::Singleton => {
                let task = single(tasks)?;
                let mut w = PayloadWriter::new(kind::PAIR, size_of::<WirePair>());
                w.put_record(&WirePair::new(task.row, task.col));
                Ok(w.finish())
            }
            Protocol::Inline => {
                let task = single(tasks)?;
                let a = table.series(task.row)?;
                let b = table.series(task.col)?;
                let body = size_of::<WirePair>() + series_len(a) + series_len(b);
                let mut w = PayloadWriter::new(kind::INLINE, body);
                w.put_record(&WirePair::new(task.row, task.col));
                w.put_series(a)?;
                w.put_series(b)?;
                Ok(w.finish())
            }
            Protocol::Packed { .. } => {
                let mut body = size_of::<WireBatchHdr>();
                for t in tasks {
                    body += series_len(table.series(t.row)?) + series_len(table.series(t.col)?);
                }
                let mut w = PayloadWriter::new(kind::BATCH, body);
                w.put_record(&WireBatchHdr::new(batch_id, tasks.len()));
                for t in tasks {
                    w.put_series(table.series(t.row)?)?;
                    w.put_series(table.series(t.col)?)?;
                }
                debug_assert_eq!(w.len(), size_of::<crate::wire::WireHdr>() + body);
                Ok(w.finish())
            }
        }
    }
}

fn single(tasks: &[Task]) -> Result<Task, FarmError> {
    match tasks {
        [t] => Ok(*t),
        _ => Err(FarmError::InvalidConfig(format!(
            "singleton protocols send exactly one task per message, got {}",
            tasks.len()
        ))),
    }
}

/// A decoded WORK payload.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkOrder {
    /// Look both sequences up in the local table.
    Pair { task: Task },
    Inline { task: Task, a: Vec<f64>, b: Vec<f64> },
    Batch {
        batch_id: u64,
        pairs: Vec<(Vec<f64>, Vec<f64>)>,
    },
}

impl WorkOrder {
    pub fn decode(payload: Bytes) -> Result<Self, FarmError> {
        let mut r = PayloadReader::new(payload)?;
        let order = match r.kind() {
            kind::PAIR => {
                let p: WirePair = r.take_record()?;
                WorkOrder::Pair {
                    task: Task::new(p.row(), p.col()),
                }
            }
            kind::INLINE => {
                let p: WirePair = r.take_record()?;
                let a = r.take_series()?;
                let b = r.take_series()?;
                WorkOrder::Inline {
                    task: Task::new(p.row(), p.col()),
                    a,
                    b,
                }
            }
            kind::BATCH => {
                let hdr: WireBatchHdr = r.take_record()?;
                // each pair needs at least its two length prefixes
                if hdr.count() > r.remaining() / (2 * size_of::<u32>()) {
                    return Err(FarmError::Wire(format!(
                        "batch of {} pairs does not fit in {} bytes",
                        hdr.count(),
                        r.remaining()
                    )));
                }
                let mut pairs = Vec::with_capacity(hdr.count());
                for _ in 0..hdr.count() {
                    let a = r.take_series()?;
                    let b = r.take_series()?;
                    pairs.push((a, b));
                }
                WorkOrder::Batch {
                    batch_id: hdr.batch_id(),
                    pairs,
                }
            }
            other => {
                return Err(FarmError::Wire(format!("payload kind {other} is not a work order")));
            }
        };
        r.finish()?;
        Ok(order)
    }

    /// Number of tasks in the order.
    pub fn len(&self) -> usize {
        match self {
            WorkOrder::Pair { .. } | WorkOrder::Inline { .. } => 1,
            WorkOrder::Batch { pairs, .. } => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A RESULT payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultReply {
    Pair { task: Task, value: f64 },
    /// Values in the exact task order of the batch they answer.
    Batch { batch_id: u64, values: Vec<f64> },
}

impl ResultReply {
    pub fn encode(&self) -> Bytes {
        match self {
            ResultReply::Pair { task, value } => {
                let mut w = PayloadWriter::new(kind::PAIR_RESULT, size_of::<WirePairResult>());
                w.put_record(&WirePairResult::new(task.row, task.col, *value));
                w.finish()
            }
            ResultReply::Batch { batch_id, values } => {
                let body = size_of::<WireBatchHdr>() + values.len() * size_of::<f64>();
                let mut w = PayloadWriter::new(kind::BATCH_RESULT, body);
                w.put_record(&WireBatchHdr::new(*batch_id, values.len()));
                for &v in values {
                    w.put_f64(v);
                }
                w.finish()
            }
        }
    }

    pub fn decode(payload: Bytes) -> Result<Self, FarmError> {
        let mut r = PayloadReader::new(payload)?;
        let reply = match r.kind() {
            kind::PAIR_RESULT => {
                let p: WirePairResult = r.take_record()?;
                ResultReply::Pair {
                    task: Task::new(p.row(), p.col()),
                    value: p.value(),
                }
            }
            kind::BATCH_RESULT => {
                let hdr: WireBatchHdr = r.take_record()?;
                if r.remaining() != hdr.count() * size_of::<f64>() {
                    return Err(FarmError::Wire(format!(
                        "batch result announces {} values but carries {} bytes",
                        hdr.count(),
                        r.remaining()
                    )));
                }
                let values = (0..hdr.count())
                    .map(|_| r.take_f64())
                    .collect::<Result<Vec<_>, _>>()?;
                ResultReply::Batch {
                    batch_id: hdr.batch_id(),
                    values,
                }
            }
            other => {
                return Err(FarmError::Wire(format!("payload kind {other} is not a result")));
            }
        };
        r.finish()?;
        Ok(reply)
    }

    pub fn len(&self) -> usize {
        match self {
            ResultReply::Pair { .. } => 1,
            ResultReply::Batch { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Encode the whole table for the start-up broadcast.
pub fn encode_table(table: &SequenceTable) -> Result<Bytes, FarmError> {
    let body = size_of::<u32>() + table.iter().map(series_len).sum::<usize>();
    let mut w = PayloadWriter::new(kind::TABLE, body);
    let count = u32::try_from(table.len())
        .map_err(|_| FarmError::Wire(format!("table of {} sequences is too large", table.len())))?;
    w.put_record(&count.to_le());
    for s in table.iter() {
        w.put_series(s)?;
    }
    Ok(w.finish())
}

/// Inverse of [`encode_table`]; labels are regenerated, since workers never
/// need them.
pub fn decode_table(payload: Bytes) -> Result<SequenceTable, FarmError> {
    let mut r = PayloadReader::new(payload)?;
    if r.kind() != kind::TABLE {
        return Err(FarmError::Wire(format!("payload kind {} is not a table", r.kind())));
    }
    let count = u32::from_le(r.take_record::<u32>()?) as usize;
    let mut series = Vec::with_capacity(count.min(r.remaining() / size_of::<u32>()));
    for _ in 0..count {
        series.push(r.take_series()?);
    }
    r.finish()?;
    Ok(SequenceTable::new(series))
}

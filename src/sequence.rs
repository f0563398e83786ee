//! Immutable table of input sequences shared by the coordinator and workers.

use crate::farm_error::FarmError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Descriptive data carried alongside a sequence (e.g. a ticker symbol).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesMeta {
    pub label: String,
}

impl SeriesMeta {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// Index → sequence mapping, constant for the duration of a run.
///
/// Share it with [`into_shared`](Self::into_shared); nothing mutates a table
/// once it is built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SequenceTable {
    series: Vec<Vec<f64>>,
    meta: Vec<SeriesMeta>,
}

impl SequenceTable {
    /// Table with generated labels `s0, s1, ...`.
    pub fn new(series: Vec<Vec<f64>>) -> Self {
        let meta = (0..series.len())
            .map(|i| SeriesMeta::new(format!("s{i}")))
            .collect();
        Self { series, meta }
    }

    /// Table with caller-supplied metadata, one entry per sequence.
    pub fn with_meta(series: Vec<Vec<f64>>, meta: Vec<SeriesMeta>) -> Result<Self, FarmError> {
        if series.len() != meta.len() {
            return Err(FarmError::InvalidConfig(format!(
                "{} sequences but {} metadata entries",
                series.len(),
                meta.len()
            )));
        }
        Ok(Self { series, meta })
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&[f64]> {
        self.series.get(id).map(Vec::as_slice)
    }

    /// Like [`get`](Self::get) but reports a missing id as an error.
    pub fn series(&self, id: usize) -> Result<&[f64], FarmError> {
        self.get(id).ok_or(FarmError::UnknownSequence(id))
    }

    pub fn meta(&self) -> &[SeriesMeta] {
        &self.meta
    }

    pub fn label(&self, id: usize) -> Option<&str> {
        self.meta.get(id).map(|m| m.label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f64]> {
        self.series.iter().map(Vec::as_slice)
    }
}

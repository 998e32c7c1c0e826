//! Compiled dataset: the in-memory artifact, its writer, its loader.
//!
//! ```text
//!   SpectrumBuffer ──truncate──▶ CompiledDataset ──writer──▶ <name>.parquet
//!                                                               │
//!                                          (spectra, labels) ◀──┘ loader
//! ```

pub mod loader;
pub mod stats;
pub mod writer;

use ndarray::Array2;

/// One named per-row column of a compiled dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::F32(v) => v.len(),
            Column::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values as `f32`, narrowing `f64` columns.
    pub fn to_f32(&self) -> Vec<f32> {
        match self {
            Column::F32(v) => v.clone(),
            Column::F64(v) => v.iter().map(|&x| x as f32).collect(),
        }
    }
}

/// Every array of a finished compilation, all `rows()` long.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledDataset {
    pub spectra: Array2<f32>,
    pub spectra_err: Array2<f32>,
    /// 0 for a combined spectrum, 1 for an individual visit.
    pub in_flag: Vec<i32>,
    /// Catalog row each spectrum came from.
    pub index: Vec<i64>,
    /// Metadata and label columns in output order; empty when compiled
    /// spectra-only.
    pub fields: Vec<(String, Column)>,
}

impl CompiledDataset {
    pub fn rows(&self) -> usize {
        self.in_flag.len()
    }

    pub fn pixels(&self) -> usize {
        self.spectra.ncols()
    }

    pub fn field(&self, name: &str) -> Option<&Column> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }
}

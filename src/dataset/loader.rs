use std::fs::File;
use std::path::{Path, PathBuf};

use ndarray::{Array2, Axis};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use serde::{Deserialize, Serialize};

use super::writer::EXTENSION;
use crate::catalog::filter::intersect_sorted;
use crate::columnar;
use crate::error::{Error, Result};
use crate::schema::{self, Target, SENTINEL};

/// Which rows and label columns to extract from a compiled dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadSelection {
    pub target: Target,
    /// Combined spectra when true, individual visits when false.
    pub load_combined: bool,
    /// Drop rows where any target holds the sentinel.
    pub exclude_sentinel: bool,
}

impl Default for LoadSelection {
    fn default() -> Self {
        Self {
            target: Target::default(),
            load_combined: true,
            exclude_sentinel: false,
        }
    }
}

pub struct DatasetLoader {
    dir: PathBuf,
    name: String,
    selection: LoadSelection,
}

impl DatasetLoader {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
            selection: LoadSelection::default(),
        }
    }

    pub fn with_selection(mut self, selection: LoadSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn selection(&self) -> &LoadSelection {
        &self.selection
    }

    /// `<dir>/<name>` if it exists, else `<dir>/<name>.parquet`.
    pub fn resolve_path(&self) -> Result<PathBuf> {
        let bare = self.dir.join(&self.name);
        if bare.is_file() {
            return Ok(bare);
        }
        let with_ext = self.dir.join(format!("{}.{EXTENSION}", self.name));
        if with_ext.is_file() {
            return Ok(with_ext);
        }
        Err(Error::NotFound(bare))
    }

    /// Selected spectra (`rows x pixels`) and the matching label matrix
    /// (`rows x targets`).
    pub fn load(&self) -> Result<(Array2<f32>, Array2<f32>)> {
        let path = self.resolve_path()?;
        let targets = self.selection.target.resolve();
        let columns = read_columns(&path, &targets)?;

        let wanted_flag = if self.selection.load_combined { 0 } else { 1 };
        let mut rows: Vec<usize> = columns
            .in_flag
            .iter()
            .enumerate()
            .filter(|(_, &f)| f == wanted_flag)
            .map(|(i, _)| i)
            .collect();

        if self.selection.exclude_sentinel {
            for values in &columns.targets {
                let present: Vec<usize> = values
                    .iter()
                    .enumerate()
                    .filter(|(_, &v)| v != SENTINEL)
                    .map(|(i, _)| i)
                    .collect();
                rows = intersect_sorted(&rows, &present);
            }
        }

        let spectra = columns.spectra.select(Axis(0), &rows);
        let labels = Array2::from_shape_fn((rows.len(), targets.len()), |(r, t)| {
            columns.targets[t][rows[r]]
        });
        log::info!(
            "loaded {} spectra and {} label columns from {}",
            rows.len(),
            targets.len(),
            path.display()
        );
        Ok((spectra, labels))
    }
}

struct LoadedColumns {
    spectra: Array2<f32>,
    in_flag: Vec<i64>,
    targets: Vec<Vec<f32>>,
}

/// Read only the spectra, the visit flag and the requested targets.
fn read_columns(path: &Path, targets: &[String]) -> Result<LoadedColumns> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let arrow_schema = builder.schema().clone();
    let mut wanted = vec![schema::SPECTRA.to_string(), schema::IN_FLAG.to_string()];
    wanted.extend(targets.iter().cloned());
    let mut roots = Vec::with_capacity(wanted.len());
    for name in &wanted {
        let idx = arrow_schema
            .index_of(name)
            .map_err(|_| Error::MissingColumn(name.clone()))?;
        roots.push(idx);
    }
    let mask = ProjectionMask::roots(builder.parquet_schema(), roots);
    let reader = builder.with_projection(mask).build()?;

    let mut flat = Vec::new();
    let mut width = None;
    let mut in_flag = Vec::new();
    let mut target_values = vec![Vec::new(); targets.len()];
    for batch in reader {
        let batch = batch?;
        let (values, w) = columnar::f32_matrix(&batch, schema::SPECTRA)?;
        width = Some(w);
        flat.extend(values);
        in_flag.extend(columnar::i64_values(&batch, schema::IN_FLAG, -1)?);
        for (t, name) in targets.iter().enumerate() {
            target_values[t].extend(columnar::f32_values(&batch, name, f32::NAN)?);
        }
    }

    let width = match width {
        Some(w) => w,
        None => spectra_width(&arrow_schema)?,
    };
    let spectra = Array2::from_shape_vec((in_flag.len(), width), flat)
        .map_err(|e| Error::Schema(format!("{}: {e}", path.display())))?;
    Ok(LoadedColumns {
        spectra,
        in_flag,
        targets: target_values,
    })
}

/// Pixel count from the schema, for files without any record batch.
fn spectra_width(schema: &arrow::datatypes::Schema) -> Result<usize> {
    match schema.field_with_name(schema::SPECTRA)?.data_type() {
        arrow::datatypes::DataType::FixedSizeList(_, w) => Ok(*w as usize),
        other => Err(Error::Schema(format!("spectra column is {other:?}"))),
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float32Array, Float64Array, Int32Array, Int64Array};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;

use super::{Column, CompiledDataset};
use crate::columnar;
use crate::error::{Error, Result};
use crate::schema;

/// File extension of compiled datasets.
pub const EXTENSION: &str = "parquet";

/// `<dir>/<name>.parquet`, unless `name` already carries the extension.
pub fn dataset_path(dir: &Path, name: &str) -> PathBuf {
    if Path::new(name).extension().is_some_and(|e| e == EXTENSION) {
        dir.join(name)
    } else {
        dir.join(format!("{name}.{EXTENSION}"))
    }
}

fn to_batch(dataset: &CompiledDataset) -> Result<RecordBatch> {
    let width = dataset.pixels();
    let flat = |m: &ndarray::Array2<f32>| -> Vec<f32> { m.iter().copied().collect() };

    let mut columns: Vec<(String, ArrayRef)> = vec![
        (
            schema::SPECTRA.to_string(),
            columnar::f32_matrix_array(flat(&dataset.spectra), width)?,
        ),
        (
            schema::SPECTRA_ERR.to_string(),
            columnar::f32_matrix_array(flat(&dataset.spectra_err), width)?,
        ),
        (
            schema::IN_FLAG.to_string(),
            Arc::new(Int32Array::from(dataset.in_flag.clone())),
        ),
        (
            schema::INDEX.to_string(),
            Arc::new(Int64Array::from(dataset.index.clone())),
        ),
    ];
    for (name, column) in &dataset.fields {
        if column.len() != dataset.rows() {
            return Err(Error::Schema(format!(
                "column '{name}' has {} rows, dataset has {}",
                column.len(),
                dataset.rows()
            )));
        }
        let array: ArrayRef = match column {
            Column::F32(v) => Arc::new(Float32Array::from(v.clone())),
            Column::F64(v) => Arc::new(Float64Array::from(v.clone())),
        };
        columns.push((name.clone(), array));
    }

    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, arr)| Field::new(name, arr.data_type().clone(), false))
        .collect();
    let arrays = columns.into_iter().map(|(_, arr)| arr).collect();
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

/// Persist `dataset` at `path`.
///
/// The file is written beside its destination and renamed into place, so a
/// failed write never leaves a partial dataset under `path`.
pub fn write_dataset(dataset: &CompiledDataset, path: &Path) -> Result<()> {
    let batch = to_batch(dataset)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    if let Err(e) = columnar::write_parquet(&tmp, &batch) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        Error::io(path, e)
    })?;
    log::debug!("wrote {} rows to {}", dataset.rows(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn extension_is_added_once() {
        let dir = Path::new("/tmp/out");
        assert_eq!(dataset_path(dir, "train"), dir.join("train.parquet"));
        assert_eq!(dataset_path(dir, "train.parquet"), dir.join("train.parquet"));
    }

    #[test]
    fn mismatched_column_is_rejected() {
        let ds = CompiledDataset {
            spectra: Array2::zeros((2, 3)),
            spectra_err: Array2::zeros((2, 3)),
            in_flag: vec![0, 1],
            index: vec![4, 4],
            fields: vec![("teff".into(), Column::F32(vec![1.0]))],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dataset_path(dir.path(), "bad");
        assert!(matches!(write_dataset(&ds, &path), Err(Error::Schema(_))));
        assert!(!path.exists());
    }

    #[test]
    fn no_temporary_file_is_left_behind() {
        let ds = CompiledDataset {
            spectra: Array2::from_elem((1, 2), 1.0),
            spectra_err: Array2::from_elem((1, 2), 0.1),
            in_flag: vec![0],
            index: vec![9],
            fields: vec![],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dataset_path(dir.path(), "ok");
        write_dataset(&ds, &path).unwrap();
        assert!(path.exists());
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }
}

//! Arrow / Parquet helpers shared by every on-disk format in the crate.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, FixedSizeListArray, Float32Array, Float32Builder, ListBuilder,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Float32Type, Float64Type, Int64Type};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read every record batch of a Parquet file.
pub(crate) fn read_parquet(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }
    log::debug!("read {} batches from {}", batches.len(), path.display());
    Ok(batches)
}

pub(crate) fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::MissingColumn(name.to_string()))
}

/// Numeric column as `f64`, whatever its stored width. Nulls become `null`.
pub(crate) fn f64_values(batch: &RecordBatch, name: &str, null: f64) -> Result<Vec<f64>> {
    let col = cast(column(batch, name)?, &DataType::Float64)?;
    Ok(col
        .as_primitive::<Float64Type>()
        .iter()
        .map(|v| v.unwrap_or(null))
        .collect())
}

pub(crate) fn f32_values(batch: &RecordBatch, name: &str, null: f32) -> Result<Vec<f32>> {
    let col = cast(column(batch, name)?, &DataType::Float32)?;
    Ok(col
        .as_primitive::<Float32Type>()
        .iter()
        .map(|v| v.unwrap_or(null))
        .collect())
}

pub(crate) fn i64_values(batch: &RecordBatch, name: &str, null: i64) -> Result<Vec<i64>> {
    let col = cast(column(batch, name)?, &DataType::Int64)?;
    Ok(col
        .as_primitive::<Int64Type>()
        .iter()
        .map(|v| v.unwrap_or(null))
        .collect())
}

pub(crate) fn string_values(batch: &RecordBatch, name: &str) -> Result<Vec<String>> {
    let col = cast(column(batch, name)?, &DataType::Utf8)?;
    Ok(col
        .as_string::<i32>()
        .iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

/// List / LargeList / FixedSizeList column as one `Vec<f32>` per row.
///
/// A null row yields an empty vector; a null element yields `null`.
pub(crate) fn f32_lists(batch: &RecordBatch, name: &str, null: f32) -> Result<Vec<Vec<f32>>> {
    let col = column(batch, name)?;
    let target = DataType::List(Arc::new(Field::new("item", DataType::Float32, true)));
    let col = match col.data_type() {
        DataType::List(_) | DataType::LargeList(_) | DataType::FixedSizeList(_, _) => {
            cast(col, &target)?
        }
        other => {
            return Err(Error::Schema(format!(
                "column '{name}' is {other:?}, expected a list of floats"
            )))
        }
    };
    let list = col.as_list::<i32>();
    let rows = (0..list.len())
        .map(|row| {
            if list.is_null(row) {
                return Vec::new();
            }
            list.value(row)
                .as_primitive::<Float32Type>()
                .iter()
                .map(|v| v.unwrap_or(null))
                .collect()
        })
        .collect();
    Ok(rows)
}

/// Fixed-width float matrix column flattened row-major, with its width.
pub(crate) fn f32_matrix(batch: &RecordBatch, name: &str) -> Result<(Vec<f32>, usize)> {
    let col = column(batch, name)?;
    let fixed = col
        .as_any()
        .downcast_ref::<FixedSizeListArray>()
        .ok_or_else(|| {
            Error::Schema(format!(
                "column '{name}' is {:?}, expected FixedSizeList<Float32>",
                col.data_type()
            ))
        })?;
    let width = fixed.value_length() as usize;
    let mut flat = Vec::with_capacity(fixed.len() * width);
    for row in 0..fixed.len() {
        let values = cast(&fixed.value(row), &DataType::Float32)?;
        flat.extend(values.as_primitive::<Float32Type>().iter().map(|v| v.unwrap_or(f32::NAN)));
    }
    Ok((flat, width))
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Variable-length float lists, one per row.
pub(crate) fn f32_list_array(rows: &[Vec<f32>]) -> ArrayRef {
    let mut builder = ListBuilder::new(Float32Builder::new());
    for row in rows {
        builder.values().append_slice(row);
        builder.append(true);
    }
    Arc::new(builder.finish())
}

/// Row-major `rows x width` matrix as a FixedSizeList column.
pub(crate) fn f32_matrix_array(flat: Vec<f32>, width: usize) -> Result<ArrayRef> {
    let item = Arc::new(Field::new("item", DataType::Float32, false));
    let values: ArrayRef = Arc::new(Float32Array::from(flat));
    let size = i32::try_from(width)
        .map_err(|_| Error::Schema(format!("spectrum width {width} does not fit a column")))?;
    Ok(Arc::new(FixedSizeListArray::try_new(item, size, values, None)?))
}

pub(crate) fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int32Array, StringArray};
    use arrow::datatypes::Schema;

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("f", DataType::Float64, true),
            Field::new("i", DataType::Int32, false),
            Field::new("s", DataType::Utf8, false),
            Field::new(
                "l",
                DataType::List(Arc::new(Field::new("item", DataType::Float32, true))),
                true,
            ),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float64Array::from(vec![Some(1.5), None])),
                Arc::new(Int32Array::from(vec![3, 4])),
                Arc::new(StringArray::from(vec!["a", "b"])),
                f32_list_array(&[vec![1.0, 2.0], vec![]]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn scalar_columns_cast_and_fill_nulls() {
        let b = batch();
        assert_eq!(f64_values(&b, "f", -1.0).unwrap(), vec![1.5, -1.0]);
        assert_eq!(f32_values(&b, "i", 0.0).unwrap(), vec![3.0, 4.0]);
        assert_eq!(i64_values(&b, "i", 0).unwrap(), vec![3, 4]);
        assert_eq!(string_values(&b, "s").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn list_columns_read_per_row() {
        let b = batch();
        let rows = f32_lists(&b, "l", -1.0).unwrap();
        assert_eq!(rows, vec![vec![1.0, 2.0], vec![]]);
        assert!(matches!(f32_lists(&b, "s", 0.0), Err(Error::Schema(_))));
    }

    #[test]
    fn missing_column_is_reported_by_name() {
        let b = batch();
        match f64_values(&b, "nope", 0.0) {
            Err(Error::MissingColumn(name)) => assert_eq!(name, "nope"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn matrix_column_survives_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.parquet");
        let col = f32_matrix_array(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3).unwrap();
        let schema = Arc::new(Schema::new(vec![Field::new(
            "m",
            col.data_type().clone(),
            false,
        )]));
        let b = RecordBatch::try_new(schema, vec![col]).unwrap();
        write_parquet(&path, &b).unwrap();

        let batches = read_parquet(&path).unwrap();
        let (flat, width) = f32_matrix(&batches[0], "m").unwrap();
        assert_eq!(width, 3);
        assert_eq!(flat, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}

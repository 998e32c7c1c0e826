use std::ops::Range;

use ndarray::{s, Array2};

use crate::dataset::{Column, CompiledDataset};
use crate::error::{Error, Result};
use crate::schema::{self, err_name, DERIVED, LABELS};

/// Float columns carried per row besides RA/DEC, in output order:
/// metadata, labels, derived labels, then every uncertainty.
pub fn float_columns() -> Vec<String> {
    let mut names = vec![schema::SNR.to_string(), schema::KMAG.to_string()];
    names.extend(LABELS.iter().map(|l| l.name.to_string()));
    names.extend(DERIVED.iter().map(|d| d.to_string()));
    names.extend(LABELS.iter().map(|l| err_name(l.name)));
    names.extend(DERIVED.iter().map(|d| err_name(d)));
    names
}

/// Preallocated output rows of a compilation.
///
/// Only `[0, cursor)` holds data; the remainder stays zeroed and is dropped
/// by [`SpectrumBuffer::into_dataset`]. A fixed buffer rejects a claim past
/// its capacity; a growable one doubles instead.
#[derive(Debug)]
pub struct SpectrumBuffer {
    flux: Array2<f32>,
    error: Array2<f32>,
    in_flag: Vec<i32>,
    index: Vec<i64>,
    ra: Vec<f64>,
    dec: Vec<f64>,
    names: Vec<String>,
    columns: Vec<Vec<f32>>,
    cursor: usize,
    growable: bool,
}

impl SpectrumBuffer {
    pub fn new(capacity: usize, pixels: usize) -> Self {
        let names = float_columns();
        let columns = names.iter().map(|_| vec![0.0; capacity]).collect();
        Self {
            flux: Array2::zeros((capacity, pixels)),
            error: Array2::zeros((capacity, pixels)),
            in_flag: vec![0; capacity],
            index: vec![0; capacity],
            ra: vec![0.0; capacity],
            dec: vec![0.0; capacity],
            names,
            columns,
            cursor: 0,
            growable: false,
        }
    }

    /// A buffer that reallocates when a claim does not fit.
    pub fn growable(initial: usize, pixels: usize) -> Self {
        Self {
            growable: true,
            ..Self::new(initial, pixels)
        }
    }

    pub fn capacity(&self) -> usize {
        self.in_flag.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn pixels(&self) -> usize {
        self.flux.ncols()
    }

    /// Hand out the next `rows` rows and advance the cursor past them.
    pub fn claim(&mut self, rows: usize) -> Result<Range<usize>> {
        let end = self.cursor + rows;
        if end > self.capacity() && self.growable {
            self.grow(end.max(self.capacity() * 2));
        }
        if end > self.capacity() {
            return Err(Error::CapacityExceeded {
                capacity: self.capacity(),
                cursor: self.cursor,
                rows,
            });
        }
        let range = self.cursor..end;
        self.cursor = end;
        Ok(range)
    }

    fn grow(&mut self, capacity: usize) {
        log::debug!("growing output buffer from {} to {capacity} rows", self.capacity());
        let pixels = self.pixels();
        let mut flux = Array2::zeros((capacity, pixels));
        let mut error = Array2::zeros((capacity, pixels));
        let kept = self.cursor;
        flux
            .slice_mut(s![..kept, ..])
            .assign(&self.flux.slice(s![..kept, ..]));
        error
            .slice_mut(s![..kept, ..])
            .assign(&self.error.slice(s![..kept, ..]));
        self.flux = flux;
        self.error = error;
        self.in_flag.resize(capacity, 0);
        self.index.resize(capacity, 0);
        self.ra.resize(capacity, 0.0);
        self.dec.resize(capacity, 0.0);
        for column in &mut self.columns {
            column.resize(capacity, 0.0);
        }
    }

    pub fn set_spectra(
        &mut self,
        rows: Range<usize>,
        flux: &Array2<f32>,
        error: &Array2<f32>,
    ) -> Result<()> {
        if flux.dim() != (rows.len(), self.pixels()) || error.dim() != flux.dim() {
            return Err(Error::Schema(format!(
                "spectra of shape {:?} do not fit {} rows of {} pixels",
                flux.dim(),
                rows.len(),
                self.pixels()
            )));
        }
        self.flux.slice_mut(s![rows.clone(), ..]).assign(flux);
        self.error.slice_mut(s![rows, ..]).assign(error);
        Ok(())
    }

    /// First row of `rows` is the combined spectrum, the rest are visits.
    pub fn set_visit_flags(&mut self, rows: Range<usize>) {
        let first = rows.start;
        for row in rows {
            self.in_flag[row] = i32::from(row != first);
        }
    }

    pub fn set_position(&mut self, rows: Range<usize>, catalog_index: usize, ra: f64, dec: f64) {
        self.index[rows.clone()].fill(catalog_index as i64);
        self.ra[rows.clone()].fill(ra);
        self.dec[rows].fill(dec);
    }

    /// Tile `value` over `rows` of column `name`.
    pub fn fill(&mut self, name: &str, rows: Range<usize>, value: f32) -> Result<()> {
        let col = self.position(name)?;
        self.columns[col][rows].fill(value);
        Ok(())
    }

    /// Valid prefix of a float column.
    pub fn column(&self, name: &str) -> Result<&[f32]> {
        let col = self.position(name)?;
        Ok(&self.columns[col][..self.cursor])
    }

    pub fn column_mut(&mut self, name: &str) -> Result<&mut [f32]> {
        let col = self.position(name)?;
        let cursor = self.cursor;
        Ok(&mut self.columns[col][..cursor])
    }

    pub fn ra(&self) -> &[f64] {
        &self.ra[..self.cursor]
    }

    pub fn dec(&self) -> &[f64] {
        &self.dec[..self.cursor]
    }

    pub fn in_flag(&self) -> &[i32] {
        &self.in_flag[..self.cursor]
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| Error::MissingColumn(name.to_string()))
    }

    /// Truncate every array to the cursor.
    pub fn into_dataset(self, spectra_only: bool) -> CompiledDataset {
        let n = self.cursor;
        let mut fields = Vec::new();
        if !spectra_only {
            let mut columns: Vec<(String, Column)> = self
                .names
                .into_iter()
                .zip(self.columns)
                .map(|(name, mut values)| {
                    values.truncate(n);
                    (name, Column::F32(values))
                })
                .collect();
            // SNR, RA, DEC, Kmag lead the metadata block.
            let snr = columns.remove(0);
            fields.push(snr);
            fields.push((schema::RA.to_string(), Column::F64(self.ra[..n].to_vec())));
            fields.push((schema::DEC.to_string(), Column::F64(self.dec[..n].to_vec())));
            fields.extend(columns);
        }
        CompiledDataset {
            spectra: self.flux.slice_move(s![..n, ..]),
            spectra_err: self.error.slice_move(s![..n, ..]),
            in_flag: self.in_flag[..n].to_vec(),
            index: self.index[..n].to_vec(),
            fields,
        }
    }
}

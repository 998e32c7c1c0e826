//! Spectrum access and normalization.
//!
//! A [`SpectrumSource`] hands out raw detector-frame spectra; the
//! [`SpectrumNormalizer`] removes the detector gaps and, for visit spectra,
//! divides out the continuum. A source that cannot provide a star answers
//! [`Fetched::Unavailable`], which the accumulator treats as "skip this star".

pub mod continuum;

use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use ndarray::{concatenate, s, Array2, Axis};

use crate::columnar;
use crate::error::{Error, Result};
use continuum::ContinuumFit;

// ---------------------------------------------------------------------------
// Chip layout
// ---------------------------------------------------------------------------

/// Pixel ranges of the three detector chips within a raw spectrum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipLayout {
    pub chips: [Range<usize>; 3],
}

impl ChipLayout {
    pub fn for_release(release: u32) -> Result<Self> {
        let chips = match release {
            11 | 12 => [322..3243, 3648..6049, 6412..8306],
            13 | 14 => [246..3274, 3585..6080, 6344..8335],
            other => {
                return Err(Error::Config(format!(
                    "no detector layout known for data release {other}"
                )))
            }
        };
        Ok(Self { chips })
    }

    /// Number of pixels left after the gaps are removed.
    pub fn total_pixels(&self) -> usize {
        self.chips.iter().map(|c| c.len()).sum()
    }

    /// Chip ranges in the gap-free pixel frame.
    pub fn degapped_chips(&self) -> [Range<usize>; 3] {
        let mut start = 0;
        self.chips.clone().map(|c| {
            let r = start..start + c.len();
            start = r.end;
            r
        })
    }

    /// Drop the inter-chip gaps from every row.
    pub fn gap_delete(&self, raw: &Array2<f32>) -> Result<Array2<f32>> {
        let needed = self.chips[2].end;
        if raw.ncols() < needed {
            return Err(Error::Schema(format!(
                "spectrum has {} pixels, layout needs at least {needed}",
                raw.ncols()
            )));
        }
        let parts: Vec<_> = self
            .chips
            .iter()
            .map(|c| raw.slice(s![.., c.clone()]))
            .collect();
        concatenate(Axis(1), &parts).map_err(|e| Error::Schema(format!("gap delete: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Raw spectra and their source
// ---------------------------------------------------------------------------

/// Flux and error, one spectrum per row.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSpectra {
    pub flux: Array2<f32>,
    pub error: Array2<f32>,
}

/// Outcome of a spectrum lookup that did not fail outright.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Ready(T),
    /// The star has no usable spectrum; the message explains why.
    Unavailable(String),
}

pub trait SpectrumSource {
    /// Combined, pseudo-continuum normalized spectrum (single row).
    fn combined(
        &self,
        release: u32,
        location_id: i64,
        apogee_id: &str,
    ) -> Result<Fetched<RawSpectra>>;

    /// Visit cube: a single row for one visit, otherwise two combined rows
    /// followed by one row per visit.
    fn visits(
        &self,
        release: u32,
        location_id: i64,
        apogee_id: &str,
    ) -> Result<Fetched<RawSpectra>>;
}

/// Number of visits encoded by a visit cube with `rows` rows.
pub fn visit_count(rows: usize) -> Result<usize> {
    match rows {
        1 => Ok(1),
        n if n >= 3 => Ok(n - 2),
        n => Err(Error::Schema(format!("visit cube with {n} rows"))),
    }
}

const FLUX: &str = "flux";
const ERROR: &str = "error";

/// Read a per-star spectrum file (`flux` and `error` list columns).
pub fn read_spectrum_file(path: &Path) -> Result<RawSpectra> {
    let mut flux_rows = Vec::new();
    let mut err_rows = Vec::new();
    for batch in columnar::read_parquet(path)? {
        flux_rows.extend(columnar::f32_lists(&batch, FLUX, f32::NAN)?);
        err_rows.extend(columnar::f32_lists(&batch, ERROR, f32::NAN)?);
    }
    Ok(RawSpectra {
        flux: rows_to_matrix(&flux_rows, path)?,
        error: rows_to_matrix(&err_rows, path)?,
    })
}

pub fn write_spectrum_file(path: &Path, spectra: &RawSpectra) -> Result<()> {
    let to_rows =
        |m: &Array2<f32>| -> Vec<Vec<f32>> { m.rows().into_iter().map(|r| r.to_vec()).collect() };
    let flux: ArrayRef = columnar::f32_list_array(&to_rows(&spectra.flux));
    let error: ArrayRef = columnar::f32_list_array(&to_rows(&spectra.error));
    let schema = Schema::new(vec![
        Field::new(FLUX, flux.data_type().clone(), false),
        Field::new(ERROR, error.data_type().clone(), false),
    ]);
    let batch = RecordBatch::try_new(Arc::new(schema), vec![flux, error])?;
    columnar::write_parquet(path, &batch)
}

fn rows_to_matrix(rows: &[Vec<f32>], path: &Path) -> Result<Array2<f32>> {
    let width = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|r| r.len() != width) {
        return Err(Error::Schema(format!(
            "{}: spectrum rows differ in length",
            path.display()
        )));
    }
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), width), flat)
        .map_err(|e| Error::Schema(format!("{}: {e}", path.display())))
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Gap-free spectra ready for the accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectra {
    pub flux: Array2<f32>,
    pub error: Array2<f32>,
    /// Visits reported for the star (1 for a combined spectrum).
    pub nvisits: usize,
}

pub struct SpectrumNormalizer<'a> {
    source: &'a dyn SpectrumSource,
    release: u32,
    layout: ChipLayout,
    continuum: ContinuumFit,
}

impl<'a> SpectrumNormalizer<'a> {
    pub fn new(
        source: &'a dyn SpectrumSource,
        release: u32,
        continuum: ContinuumFit,
    ) -> Result<Self> {
        Ok(Self {
            source,
            release,
            layout: ChipLayout::for_release(release)?,
            continuum,
        })
    }

    pub fn layout(&self) -> &ChipLayout {
        &self.layout
    }

    /// The star's combined spectrum with gaps removed.
    pub fn combined(&self, location_id: i64, apogee_id: &str) -> Result<Fetched<Spectra>> {
        let raw = match self.source.combined(self.release, location_id, apogee_id)? {
            Fetched::Ready(raw) => raw,
            Fetched::Unavailable(why) => return Ok(Fetched::Unavailable(why)),
        };
        Ok(Fetched::Ready(Spectra {
            flux: self.layout.gap_delete(&raw.flux)?,
            error: self.layout.gap_delete(&raw.error)?,
            nvisits: 1,
        }))
    }

    /// The star's visit spectra, gap-free and continuum normalized.
    ///
    /// For one visit the single row is returned. For more, the leading
    /// combined row is dropped, leaving one combined row then every visit.
    pub fn visits(&self, location_id: i64, apogee_id: &str) -> Result<Fetched<Spectra>> {
        let raw = match self.source.visits(self.release, location_id, apogee_id)? {
            Fetched::Ready(raw) => raw,
            Fetched::Unavailable(why) => return Ok(Fetched::Unavailable(why)),
        };
        let nvisits = visit_count(raw.flux.nrows())?;
        let first = if nvisits == 1 { 0 } else { 1 };
        let flux = self.layout.gap_delete(&raw.flux.slice(s![first.., ..]).to_owned())?;
        let error = self.layout.gap_delete(&raw.error.slice(s![first.., ..]).to_owned())?;

        match self.continuum.normalize(&flux, &error, &self.layout) {
            Some((flux, error)) => Ok(Fetched::Ready(Spectra {
                flux,
                error,
                nvisits,
            })),
            None => Ok(Fetched::Unavailable(format!(
                "continuum fit failed for {apogee_id}"
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory spectrum source keyed by star id.
    #[derive(Default)]
    pub(crate) struct MemorySpectra {
        pub combined: HashMap<String, RawSpectra>,
        pub visits: HashMap<String, RawSpectra>,
    }

    impl SpectrumSource for MemorySpectra {
        fn combined(&self, _: u32, _: i64, id: &str) -> Result<Fetched<RawSpectra>> {
            Ok(self.combined.get(id).cloned().map_or_else(
                || Fetched::Unavailable(format!("no spectrum for {id}")),
                Fetched::Ready,
            ))
        }

        fn visits(&self, _: u32, _: i64, id: &str) -> Result<Fetched<RawSpectra>> {
            Ok(self.visits.get(id).cloned().map_or_else(
                || Fetched::Unavailable(format!("no visits for {id}")),
                Fetched::Ready,
            ))
        }
    }

    /// Raw DR14-width spectra; row `r` has flux `base + r` and error 0.01.
    pub(crate) fn raw_rows(rows: usize, base: f32) -> RawSpectra {
        let width = 8575;
        RawSpectra {
            flux: Array2::from_shape_fn((rows, width), |(r, _)| base + r as f32),
            error: Array2::from_elem((rows, width), 0.01),
        }
    }

    #[test]
    fn dr14_layout() {
        let layout = ChipLayout::for_release(14).unwrap();
        assert_eq!(layout.total_pixels(), 7514);
        let chips = layout.degapped_chips();
        assert_eq!(chips[0], 0..3028);
        assert_eq!(chips[2].end, 7514);
        assert!(ChipLayout::for_release(99).is_err());
    }

    #[test]
    fn gap_delete_keeps_chip_pixels_in_order() {
        let layout = ChipLayout::for_release(14).unwrap();
        let raw = Array2::from_shape_fn((2, 8575), |(_, c)| c as f32);
        let out = layout.gap_delete(&raw).unwrap();
        assert_eq!(out.dim(), (2, 7514));
        assert_eq!(out[[0, 0]], 246.0);
        assert_eq!(out[[1, 3028]], 3585.0);
        assert_eq!(out[[0, 7513]], 8334.0);

        let short = Array2::<f32>::zeros((1, 100));
        assert!(layout.gap_delete(&short).is_err());
    }

    #[test]
    fn visit_counts() {
        assert_eq!(visit_count(1).unwrap(), 1);
        assert_eq!(visit_count(5).unwrap(), 3);
        assert!(visit_count(2).is_err());
        assert!(visit_count(0).is_err());
    }

    #[test]
    fn visits_drop_the_leading_combined_row() {
        let mut source = MemorySpectra::default();
        source.visits.insert("a".into(), raw_rows(5, 1.0));
        let normalizer = SpectrumNormalizer::new(&source, 14, ContinuumFit::default()).unwrap();
        match normalizer.visits(4000, "a").unwrap() {
            Fetched::Ready(s) => {
                assert_eq!(s.nvisits, 3);
                assert_eq!(s.flux.dim(), (4, 7514));
                // Flat spectra normalize to one.
                approx::assert_relative_eq!(s.flux[[0, 10]], 1.0, epsilon = 1e-4);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            normalizer.visits(4000, "missing").unwrap(),
            Fetched::Unavailable(_)
        ));
    }

    #[test]
    fn spectrum_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apStar.parquet");
        let raw = RawSpectra {
            flux: Array2::from_shape_fn((3, 4), |(r, c)| (r * 4 + c) as f32),
            error: Array2::from_elem((3, 4), 0.5),
        };
        write_spectrum_file(&path, &raw).unwrap();
        assert_eq!(read_spectrum_file(&path).unwrap(), raw);
    }
}

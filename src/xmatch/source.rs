//! Supplementary astrometric catalogs.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::columnar;
use crate::error::{Error, Result};

/// The external parallax catalog a compilation is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplementarySource {
    /// Anderson et al. (2017) data-driven parallaxes; J2000 positions.
    Anderson2017,
    /// Gaia DR1 TGAS; J2015 positions with proper motions.
    EsaTgas,
}

impl SupplementarySource {
    /// Epoch (Julian year) the catalog positions refer to.
    pub fn epoch(&self) -> f64 {
        match self {
            SupplementarySource::Anderson2017 => 2000.0,
            SupplementarySource::EsaTgas => 2015.0,
        }
    }
}

/// Provides the rows of a supplementary catalog.
pub trait AstrometrySource {
    fn load_astrometry(&self, source: SupplementarySource) -> Result<AstrometricCatalog>;
}

/// Parallel arrays of a supplementary catalog. Angles in degrees, parallax
/// in mas, proper motion in mas/yr with `pmra` including `cos(dec)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AstrometricCatalog {
    pub ra: Vec<f64>,
    pub dec: Vec<f64>,
    pub parallax: Vec<f64>,
    pub parallax_var: Vec<f64>,
    pub proper_motion: Option<(Vec<f64>, Vec<f64>)>,
    pub epoch: f64,
}

impl AstrometricCatalog {
    pub fn len(&self) -> usize {
        self.ra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ra.is_empty()
    }

    /// Drop rows without a parallax.
    pub fn without_missing_parallax(self) -> Self {
        let keep: Vec<usize> = (0..self.len())
            .filter(|&i| !self.parallax[i].is_nan())
            .collect();
        let pick = |v: &[f64]| -> Vec<f64> { keep.iter().map(|&i| v[i]).collect() };
        let dropped = self.len() - keep.len();
        if dropped > 0 {
            log::info!("dropped {dropped} supplementary rows without parallax");
        }
        AstrometricCatalog {
            ra: pick(&self.ra),
            dec: pick(&self.dec),
            parallax: pick(&self.parallax),
            parallax_var: pick(&self.parallax_var),
            proper_motion: self
                .proper_motion
                .as_ref()
                .map(|(pmra, pmdec)| (pick(pmra), pick(pmdec))),
            epoch: self.epoch,
        }
    }

    /// Positions carried to `epoch` along the proper motion, if any.
    pub fn positions_at(&self, epoch: f64) -> Vec<(f64, f64)> {
        let dt = epoch - self.epoch;
        (0..self.len())
            .map(|i| match &self.proper_motion {
                Some((pmra, pmdec)) if dt != 0.0 => {
                    super::sphere::propagate(self.ra[i], self.dec[i], pmra[i], pmdec[i], dt)
                }
                _ => (self.ra[i], self.dec[i]),
            })
            .collect()
    }

    fn check_lengths(&self) -> Result<()> {
        let n = self.len();
        let pm_ok = self
            .proper_motion
            .as_ref()
            .map_or(true, |(a, b)| a.len() == n && b.len() == n);
        if self.dec.len() != n || self.parallax.len() != n || self.parallax_var.len() != n || !pm_ok
        {
            return Err(Error::Schema(
                "supplementary catalog columns differ in length".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct AndersonRow {
    ra: f64,
    dec: f64,
    parallax: Option<f64>,
    parallax_var: Option<f64>,
}

/// Anderson et al. (2017) CSV: `ra,dec,parallax,parallax_var`; blank
/// parallaxes read as NaN.
pub fn read_anderson_csv(path: &Path) -> Result<AstrometricCatalog> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut cat = AstrometricCatalog {
        epoch: SupplementarySource::Anderson2017.epoch(),
        ..AstrometricCatalog::default()
    };
    for row in reader.deserialize::<AndersonRow>() {
        let row = row?;
        cat.ra.push(row.ra);
        cat.dec.push(row.dec);
        cat.parallax.push(row.parallax.unwrap_or(f64::NAN));
        cat.parallax_var.push(row.parallax_var.unwrap_or(f64::NAN));
    }
    log::info!("loaded {} Anderson 2017 parallaxes", cat.len());
    Ok(cat)
}

/// TGAS Parquet: `ra,dec,pmra,pmdec,parallax,parallax_error`.
pub fn read_tgas_parquet(path: &Path) -> Result<AstrometricCatalog> {
    let mut cat = AstrometricCatalog {
        epoch: SupplementarySource::EsaTgas.epoch(),
        ..AstrometricCatalog::default()
    };
    let (mut pmra, mut pmdec) = (Vec::new(), Vec::new());
    for batch in columnar::read_parquet(path)? {
        cat.ra.extend(columnar::f64_values(&batch, "ra", f64::NAN)?);
        cat.dec.extend(columnar::f64_values(&batch, "dec", f64::NAN)?);
        pmra.extend(columnar::f64_values(&batch, "pmra", 0.0)?);
        pmdec.extend(columnar::f64_values(&batch, "pmdec", 0.0)?);
        cat.parallax
            .extend(columnar::f64_values(&batch, "parallax", f64::NAN)?);
        cat.parallax_var.extend(
            columnar::f64_values(&batch, "parallax_error", f64::NAN)?
                .into_iter()
                .map(|e| e * e),
        );
    }
    cat.proper_motion = Some((pmra, pmdec));
    cat.check_lengths()?;
    log::info!("loaded {} TGAS sources", cat.len());
    Ok(cat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Float64Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;

    #[test]
    fn anderson_blank_parallax_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anderson2017.csv");
        std::fs::write(
            &path,
            "ra,dec,parallax,parallax_var\n10.0,20.0,1.5,0.01\n11.0,21.0,,\n12.0,22.0,0.8,0.04\n",
        )
        .unwrap();
        let cat = read_anderson_csv(&path).unwrap();
        assert_eq!(cat.len(), 3);
        assert!(cat.parallax[1].is_nan());
        assert_eq!(cat.epoch, 2000.0);

        let cat = cat.without_missing_parallax();
        assert_eq!(cat.ra, vec![10.0, 12.0]);
        assert_eq!(cat.parallax_var, vec![0.01, 0.04]);
    }

    #[test]
    fn tgas_reads_variance_and_proper_motion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tgas.parquet");
        let names = ["ra", "dec", "pmra", "pmdec", "parallax", "parallax_error"];
        let values = [
            vec![10.0, 11.0],
            vec![-5.0, 6.0],
            vec![3.0, -4.0],
            vec![1.0, 2.0],
            vec![2.0, 0.5],
            vec![0.3, 0.2],
        ];
        let fields: Vec<Field> = names
            .iter()
            .map(|n| Field::new(*n, DataType::Float64, true))
            .collect();
        let arrays: Vec<ArrayRef> = values
            .iter()
            .map(|v| Arc::new(Float64Array::from(v.clone())) as ArrayRef)
            .collect();
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap();
        columnar::write_parquet(&path, &batch).unwrap();

        let cat = read_tgas_parquet(&path).unwrap();
        assert_eq!(cat.epoch, 2015.0);
        approx::assert_relative_eq!(cat.parallax_var[0], 0.09, epsilon = 1e-12);
        let (pmra, pmdec) = cat.proper_motion.as_ref().unwrap();
        assert_eq!(pmra, &vec![3.0, -4.0]);
        assert_eq!(pmdec, &vec![1.0, 2.0]);
    }

    #[test]
    fn static_catalog_positions_ignore_epoch() {
        let cat = AstrometricCatalog {
            ra: vec![100.0],
            dec: vec![-30.0],
            parallax: vec![1.0],
            parallax_var: vec![0.1],
            proper_motion: None,
            epoch: 2000.0,
        };
        assert_eq!(cat.positions_at(2015.0), vec![(100.0, -30.0)]);
    }
}

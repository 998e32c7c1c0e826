use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::SENTINEL;

/// Per-target mean and standard deviation of a label matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelStats {
    pub names: Vec<String>,
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl LabelStats {
    /// Statistics of each column of `labels`, ignoring sentinel and
    /// non-finite entries. A column without any usable value gets a NaN
    /// mean and std.
    pub fn from_labels(names: Vec<String>, labels: &Array2<f32>) -> Result<Self> {
        if names.len() != labels.ncols() {
            return Err(Error::Schema(format!(
                "{} names for {} label columns",
                names.len(),
                labels.ncols()
            )));
        }
        let mut mean = Vec::with_capacity(names.len());
        let mut std = Vec::with_capacity(names.len());
        for column in labels.columns() {
            let values: Vec<f64> = column
                .iter()
                .filter(|&&v| v != SENTINEL && v.is_finite())
                .map(|&v| v as f64)
                .collect();
            if values.is_empty() {
                mean.push(f64::NAN);
                std.push(f64::NAN);
                continue;
            }
            let n = values.len() as f64;
            let m = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            mean.push(m);
            std.push(var.sqrt());
        }
        Ok(Self { names, mean, std })
    }

    /// `(x - mean) / std` in place. Sentinels, and columns with zero or
    /// undefined spread, are left untouched.
    pub fn standardize(&self, labels: &mut Array2<f32>) {
        for (j, mut column) in labels.columns_mut().into_iter().enumerate() {
            let (Some(&m), Some(&s)) = (self.mean.get(j), self.std.get(j)) else {
                continue;
            };
            if !(s.is_finite() && s > 0.0) {
                continue;
            }
            for v in column.iter_mut().filter(|v| **v != SENTINEL) {
                *v = ((*v as f64 - m) / s) as f32;
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path).map_err(|e| Error::io(path, e))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn sentinels_do_not_count() {
        let labels = array![[4000.0, 1.0], [SENTINEL, 3.0], [5000.0, SENTINEL]];
        let stats = LabelStats::from_labels(vec!["teff".into(), "logg".into()], &labels).unwrap();
        assert_relative_eq!(stats.mean[0], 4500.0);
        assert_relative_eq!(stats.std[0], 500.0);
        assert_relative_eq!(stats.mean[1], 2.0);
        assert_relative_eq!(stats.std[1], 1.0);
    }

    #[test]
    fn standardize_keeps_sentinels() {
        let mut labels = array![[4000.0f32], [SENTINEL], [5000.0]];
        let stats = LabelStats::from_labels(vec!["teff".into()], &labels).unwrap();
        stats.standardize(&mut labels);
        assert_relative_eq!(labels[[0, 0]], -1.0);
        assert_eq!(labels[[1, 0]], SENTINEL);
        assert_relative_eq!(labels[[2, 0]], 1.0);
    }

    #[test]
    fn all_missing_column_is_nan_and_untouched() {
        let mut labels = array![[SENTINEL], [SENTINEL]];
        let stats = LabelStats::from_labels(vec!["Fe".into()], &labels).unwrap();
        assert!(stats.mean[0].is_nan());
        stats.standardize(&mut labels);
        assert_eq!(labels[[0, 0]], SENTINEL);
    }

    #[test]
    fn name_count_must_match() {
        let labels = Array2::<f32>::zeros((2, 2));
        assert!(LabelStats::from_labels(vec!["teff".into()], &labels).is_err());
    }

    #[test]
    fn json_round_trip() {
        let labels = array![[1.0f32, 2.0], [3.0, 6.0]];
        let stats = LabelStats::from_labels(vec!["a".into(), "b".into()], &labels).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meanstd.json");
        stats.save(&path).unwrap();
        assert_eq!(LabelStats::load(&path).unwrap(), stats);
    }
}

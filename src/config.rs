use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::filter::FilterCriteria;
use crate::error::{Error, Result};
use crate::spectra::continuum::ContinuumFit;
use crate::xmatch::SupplementarySource;

/// Which spectra each accepted star contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpectrumMode {
    /// One pipeline-normalized combined spectrum per star.
    Combined,
    /// Combined spectrum plus every visit, continuum normalized here.
    #[default]
    Visits,
}

/// Everything a compilation run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileConfig {
    pub apogee_dr: u32,
    pub gaia_dr: u32,
    /// Root of the survey data tree.
    pub data_root: PathBuf,
    /// Base name of the compiled dataset, without extension.
    pub output: String,
    pub output_dir: PathBuf,
    pub filter: FilterCriteria,
    pub mode: SpectrumMode,
    pub spectra_only: bool,
    pub continuum_degree: usize,
    /// JSON array of booleans over the gap-free pixels.
    pub continuum_mask: Option<PathBuf>,
    pub supplementary: Option<SupplementarySource>,
    pub match_tolerance_arcsec: f64,
    /// Row capacity of the output buffer; derived from the catalog when unset.
    pub capacity: Option<usize>,
    pub progress_every: usize,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            apogee_dr: 14,
            gaia_dr: 1,
            data_root: PathBuf::from("."),
            output: String::new(),
            output_dir: PathBuf::from("."),
            filter: FilterCriteria::default(),
            mode: SpectrumMode::default(),
            spectra_only: false,
            continuum_degree: 2,
            continuum_mask: None,
            supplementary: Some(SupplementarySource::Anderson2017),
            match_tolerance_arcsec: 2.0,
            capacity: None,
            progress_every: 100,
        }
    }
}

impl CompileConfig {
    /// Parse a JSON config. Validation is left to the caller so overrides
    /// can be applied first.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.output.trim().is_empty() {
            return Err(Error::Config("output dataset name is required".into()));
        }
        if !(self.match_tolerance_arcsec > 0.0) {
            return Err(Error::Config(format!(
                "match tolerance must be positive, got {}",
                self.match_tolerance_arcsec
            )));
        }
        if self.progress_every == 0 {
            return Err(Error::Config("progress_every must be at least 1".into()));
        }
        Ok(())
    }

    /// Continuum fit settings, reading the mask file if one is configured.
    pub fn continuum_fit(&self) -> Result<ContinuumFit> {
        let mask = match &self.continuum_mask {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
                Some(serde_json::from_str::<Vec<bool>>(&text)?)
            }
            None => None,
        };
        Ok(ContinuumFit {
            degree: self.continuum_degree,
            mask,
        })
    }
}

use std::path::{Path, PathBuf};

use crate::catalog::{self, CatalogRecord, CatalogSource};
use crate::error::Result;
use crate::spectra::{self, Fetched, RawSpectra, SpectrumSource};
use crate::xmatch::source::{self, AstrometricCatalog, AstrometrySource, SupplementarySource};

/// On-disk survey data tree.
///
/// ```text
/// <root>/apogee/dr<N>/allStar.parquet
/// <root>/apogee/dr<N>/stars/<location>/aspcapStar-<id>.parquet
/// <root>/apogee/dr<N>/stars/<location>/apStar-<id>.parquet
/// <root>/gaia/anderson2017.csv
/// <root>/gaia/dr<M>/tgas.parquet
/// ```
#[derive(Debug, Clone)]
pub struct DataRoot {
    root: PathBuf,
    gaia_dr: u32,
}

impl DataRoot {
    pub fn new(root: impl Into<PathBuf>, gaia_dr: u32) -> Self {
        Self {
            root: root.into(),
            gaia_dr,
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    fn release_dir(&self, release: u32) -> PathBuf {
        self.root.join("apogee").join(format!("dr{release}"))
    }

    pub fn allstar_path(&self, release: u32) -> PathBuf {
        self.release_dir(release).join("allStar.parquet")
    }

    pub fn star_dir(&self, release: u32, location_id: i64) -> PathBuf {
        self.release_dir(release)
            .join("stars")
            .join(location_id.to_string())
    }

    pub fn combined_path(&self, release: u32, location_id: i64, apogee_id: &str) -> PathBuf {
        self.star_dir(release, location_id)
            .join(format!("aspcapStar-{apogee_id}.parquet"))
    }

    pub fn visits_path(&self, release: u32, location_id: i64, apogee_id: &str) -> PathBuf {
        self.star_dir(release, location_id)
            .join(format!("apStar-{apogee_id}.parquet"))
    }

    pub fn anderson_path(&self) -> PathBuf {
        self.root.join("gaia").join("anderson2017.csv")
    }

    pub fn tgas_path(&self) -> PathBuf {
        self.root
            .join("gaia")
            .join(format!("dr{}", self.gaia_dr))
            .join("tgas.parquet")
    }
}

/// A missing spectrum file is an unavailable star, not an error.
fn fetch_file(path: PathBuf) -> Result<Fetched<RawSpectra>> {
    if !path.is_file() {
        return Ok(Fetched::Unavailable(format!("{} not found", path.display())));
    }
    spectra::read_spectrum_file(&path).map(Fetched::Ready)
}

impl CatalogSource for DataRoot {
    fn load_catalog(&self, release: u32) -> Result<Vec<CatalogRecord>> {
        log::info!("loading allStar DR{release} catalog");
        catalog::read_catalog(&self.allstar_path(release))
    }
}

impl SpectrumSource for DataRoot {
    fn combined(
        &self,
        release: u32,
        location_id: i64,
        apogee_id: &str,
    ) -> Result<Fetched<RawSpectra>> {
        fetch_file(self.combined_path(release, location_id, apogee_id))
    }

    fn visits(
        &self,
        release: u32,
        location_id: i64,
        apogee_id: &str,
    ) -> Result<Fetched<RawSpectra>> {
        fetch_file(self.visits_path(release, location_id, apogee_id))
    }
}

impl AstrometrySource for DataRoot {
    fn load_astrometry(&self, which: SupplementarySource) -> Result<AstrometricCatalog> {
        match which {
            SupplementarySource::Anderson2017 => source::read_anderson_csv(&self.anderson_path()),
            SupplementarySource::EsaTgas => source::read_tgas_parquet(&self.tgas_path()),
        }
    }
}

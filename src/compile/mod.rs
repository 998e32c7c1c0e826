//! Compilation pipeline.
//!
//! ```text
//!   catalog ──filter──▶ accepted rows ──accumulate──▶ SpectrumBuffer
//!                                                        │
//!                                   cross-match ◀────────┘
//!                                        │
//!                                        ▼
//!                                 CompiledDataset ──▶ <output>.parquet
//! ```

pub mod accumulate;
pub mod buffer;

use std::path::PathBuf;

use crate::catalog::filter::filter_indices;
use crate::catalog::{CatalogRecord, CatalogSource};
use crate::config::{CompileConfig, SpectrumMode};
use crate::dataset::writer::{dataset_path, write_dataset};
use crate::dataset::CompiledDataset;
use crate::error::Result;
use crate::spectra::{SpectrumNormalizer, SpectrumSource};
use crate::xmatch::{apply_astrometry, AstrometrySource};
use accumulate::Accumulator;
use buffer::SpectrumBuffer;

/// The collaborators a compilation reads from.
#[derive(Clone, Copy)]
pub struct Sources<'a> {
    pub catalog: &'a dyn CatalogSource,
    pub spectra: &'a dyn SpectrumSource,
    pub astrometry: &'a dyn AstrometrySource,
}

impl<'a> Sources<'a> {
    /// All three collaborators served by one value, e.g. a [`crate::DataRoot`].
    pub fn from_one<T>(source: &'a T) -> Self
    where
        T: CatalogSource + SpectrumSource + AstrometrySource,
    {
        Self {
            catalog: source,
            spectra: source,
            astrometry: source,
        }
    }
}

/// Summary of a finished compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileReport {
    pub path: PathBuf,
    pub accepted_stars: usize,
    pub rows: usize,
    pub matched_rows: usize,
}

pub struct DatasetCompiler {
    config: CompileConfig,
}

impl DatasetCompiler {
    pub fn new(config: CompileConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CompileConfig {
        &self.config
    }

    /// Initial row estimate for `accepted` in the configured mode, or the
    /// configured capacity when one is set.
    pub fn capacity_for(&self, records: &[CatalogRecord], accepted: &[usize]) -> usize {
        if let Some(capacity) = self.config.capacity {
            return capacity;
        }
        match self.config.mode {
            SpectrumMode::Combined => accepted.len(),
            SpectrumMode::Visits => accepted
                .iter()
                .map(|&i| records[i].nvisits.max(1) as usize + 1)
                .sum(),
        }
    }

    /// Run the pipeline in memory.
    pub fn build(&self, sources: Sources<'_>) -> Result<(CompiledDataset, usize, usize)> {
        let cfg = &self.config;
        let records = sources.catalog.load_catalog(cfg.apogee_dr)?;
        let accepted = filter_indices(&records, &cfg.filter);

        let normalizer =
            SpectrumNormalizer::new(sources.spectra, cfg.apogee_dr, cfg.continuum_fit()?)?;
        let capacity = self.capacity_for(&records, &accepted);
        let pixels = normalizer.layout().total_pixels();
        // An explicit capacity is a hard limit; the catalog estimate is only
        // a starting size, since visit cubes may disagree with NVISITS.
        let buffer = match cfg.capacity {
            Some(_) => SpectrumBuffer::new(capacity, pixels),
            None => SpectrumBuffer::growable(capacity, pixels),
        };
        log::info!("preallocating {capacity} rows");
        let mut acc = Accumulator::with_buffer(normalizer, cfg.mode, buffer);
        acc.run(&records, &accepted, cfg.progress_every)?;
        let mut buffer = acc.into_buffer();

        let mut matched = 0;
        if !cfg.spectra_only {
            if let Some(which) = cfg.supplementary {
                let catalog = sources.astrometry.load_astrometry(which)?;
                matched = apply_astrometry(&mut buffer, catalog, cfg.match_tolerance_arcsec)?;
            }
        }
        Ok((buffer.into_dataset(cfg.spectra_only), accepted.len(), matched))
    }

    /// Run the pipeline and write `<output_dir>/<output>.parquet`.
    pub fn compile(&self, sources: Sources<'_>) -> Result<CompileReport> {
        let (dataset, accepted_stars, matched_rows) = self.build(sources)?;
        let path = dataset_path(&self.config.output_dir, &self.config.output);
        log::info!("creating {}", path.display());
        write_dataset(&dataset, &path)?;
        log::info!("created {} with {} rows", path.display(), dataset.rows());
        Ok(CompileReport {
            path,
            accepted_stars,
            rows: dataset.rows(),
            matched_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::filter::FilterCriteria;
    use crate::dataset::loader::{DatasetLoader, LoadSelection};
    use crate::dataset::Column;
    use crate::error::Error;
    use crate::schema::SENTINEL;
    use crate::spectra::tests::{raw_rows, MemorySpectra};
    use crate::xmatch::{AstrometricCatalog, SupplementarySource};

    struct MemoryCatalog(Vec<CatalogRecord>);

    impl CatalogSource for MemoryCatalog {
        fn load_catalog(&self, _: u32) -> Result<Vec<CatalogRecord>> {
            Ok(self.0.clone())
        }
    }

    struct MemoryAstrometry(AstrometricCatalog);

    impl AstrometrySource for MemoryAstrometry {
        fn load_astrometry(&self, _: SupplementarySource) -> Result<AstrometricCatalog> {
            Ok(self.0.clone())
        }
    }

    fn star(id: &str, teff: f32, nvisits: u32, ra: f64) -> CatalogRecord {
        let mut x_h = vec![0.05; 26];
        x_h[17] = -0.3;
        CatalogRecord {
            apogee_id: id.into(),
            location_id: 4000,
            snr: 200.0,
            vscatter: 0.2,
            param: vec![teff, 2.4, 1.1, -0.3, 0.0, 0.0, 0.1],
            param_cov: vec![25.0; 49],
            x_h,
            x_h_err: vec![0.03; 26],
            k_mag: 10.0,
            ra,
            dec: 30.0,
            nvisits,
            ..CatalogRecord::default()
        }
    }

    struct Fixture {
        catalog: MemoryCatalog,
        spectra: MemorySpectra,
        astrometry: MemoryAstrometry,
    }

    impl Fixture {
        fn new() -> Self {
            let catalog = MemoryCatalog(vec![
                star("a", 4500.0, 3, 10.0),
                star("hot", 7000.0, 1, 20.0),
                star("b", 4800.0, 1, 30.0),
                star("gone", 4900.0, 2, 40.0),
            ]);
            let mut spectra = MemorySpectra::default();
            spectra.visits.insert("a".into(), raw_rows(5, 1.0));
            spectra.visits.insert("hot".into(), raw_rows(1, 1.0));
            spectra.visits.insert("b".into(), raw_rows(1, 4.0));
            spectra.combined.insert("a".into(), raw_rows(1, 1.0));
            spectra.combined.insert("b".into(), raw_rows(1, 1.0));
            let astrometry = MemoryAstrometry(AstrometricCatalog {
                ra: vec![10.0, 55.0],
                dec: vec![30.0, 0.0],
                parallax: vec![2.0, 1.0],
                parallax_var: vec![0.01, 0.01],
                proper_motion: None,
                epoch: 2000.0,
            });
            Self {
                catalog,
                spectra,
                astrometry,
            }
        }

        fn sources(&self) -> Sources<'_> {
            Sources {
                catalog: &self.catalog,
                spectra: &self.spectra,
                astrometry: &self.astrometry,
            }
        }
    }

    fn config(dir: &std::path::Path) -> CompileConfig {
        CompileConfig {
            output: "train".into(),
            output_dir: dir.to_path_buf(),
            ..CompileConfig::default()
        }
    }

    fn f32_field(ds: &CompiledDataset, name: &str) -> Vec<f32> {
        ds.field(name).map(Column::to_f32).unwrap()
    }

    #[test]
    fn visits_pipeline_end_to_end() {
        let fixture = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let compiler = DatasetCompiler::new(config(dir.path())).unwrap();
        let (ds, accepted, matched) = compiler.build(fixture.sources()).unwrap();

        // "hot" fails the teff cut, "gone" has no spectra.
        assert_eq!(accepted, 3);
        assert_eq!(ds.rows(), 5);
        assert_eq!(ds.index, vec![0, 0, 0, 0, 2]);
        assert_eq!(ds.in_flag, vec![0, 1, 1, 1, 0]);
        assert_eq!(ds.pixels(), 7514);
        assert_eq!(matched, 4);

        let parallax = f32_field(&ds, "parallax");
        assert_eq!(parallax, vec![2.0, 2.0, 2.0, 2.0, SENTINEL]);
        let fakemag = f32_field(&ds, "fakemag");
        assert_eq!(fakemag[0], 10.0f32 / 2.0f32);
        assert_eq!(fakemag[4], SENTINEL);
        assert_eq!(f32_field(&ds, "teff")[4], 4800.0);
    }

    #[test]
    fn compiling_twice_gives_identical_output() {
        let fixture = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let compiler = DatasetCompiler::new(config(dir.path())).unwrap();
        let (first, _, _) = compiler.build(fixture.sources()).unwrap();
        let (second, _, _) = compiler.build(fixture.sources()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn combined_mode_and_spectra_only() {
        let fixture = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let compiler = DatasetCompiler::new(CompileConfig {
            mode: SpectrumMode::Combined,
            spectra_only: true,
            ..config(dir.path())
        })
        .unwrap();
        let (ds, _, matched) = compiler.build(fixture.sources()).unwrap();
        assert_eq!(ds.rows(), 2);
        assert_eq!(ds.in_flag, vec![0, 0]);
        assert!(ds.fields.is_empty());
        assert_eq!(matched, 0);
    }

    #[test]
    fn undersized_capacity_aborts_without_writing() {
        let fixture = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let compiler = DatasetCompiler::new(CompileConfig {
            capacity: Some(2),
            ..config(dir.path())
        })
        .unwrap();
        assert!(matches!(
            compiler.compile(fixture.sources()),
            Err(Error::CapacityExceeded { .. })
        ));
        assert!(!dir.path().join("train.parquet").exists());
    }

    #[test]
    fn visit_cube_larger_than_catalog_nvisits_still_compiles() {
        let mut fixture = Fixture::new();
        fixture.catalog = MemoryCatalog(vec![star("a", 4500.0, 1, 10.0)]);
        fixture.spectra.visits.insert("a".into(), raw_rows(5, 1.0));
        let dir = tempfile::tempdir().unwrap();
        let compiler = DatasetCompiler::new(CompileConfig {
            filter: FilterCriteria::disabled(),
            ..config(dir.path())
        })
        .unwrap();
        assert_eq!(compiler.capacity_for(&fixture.catalog.0, &[0]), 2);

        let (ds, _, _) = compiler.build(fixture.sources()).unwrap();
        assert_eq!(ds.rows(), 4);
        assert_eq!(ds.in_flag, vec![0, 1, 1, 1]);
        assert_eq!(ds.index, vec![0; 4]);
    }

    #[test]
    fn compile_then_load_round_trip() {
        let fixture = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let compiler = DatasetCompiler::new(CompileConfig {
            filter: FilterCriteria::disabled(),
            ..config(dir.path())
        })
        .unwrap();
        let (in_memory, _, _) = compiler.build(fixture.sources()).unwrap();
        let report = compiler.compile(fixture.sources()).unwrap();
        assert_eq!(report.rows, in_memory.rows());
        assert_eq!(report.accepted_stars, 4);

        let loader = DatasetLoader::new(dir.path(), "train").with_selection(LoadSelection {
            target: "teff".into(),
            load_combined: true,
            exclude_sentinel: false,
        });
        let (spectra, labels) = loader.load().unwrap();
        let combined: Vec<usize> = (0..in_memory.rows())
            .filter(|&i| in_memory.in_flag[i] == 0)
            .collect();
        assert_eq!(spectra.nrows(), combined.len());
        let teff = f32_field(&in_memory, "teff");
        let expected: Vec<f32> = combined.iter().map(|&i| teff[i]).collect();
        assert_eq!(labels.column(0).to_vec(), expected);
        assert_eq!(spectra.row(0), in_memory.spectra.row(combined[0]));
    }
}

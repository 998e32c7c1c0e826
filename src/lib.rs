//! Compile stellar spectra and catalog labels into a training dataset, and
//! load it back.
//!
//! ```text
//!   DataRoot (allStar, apStar/aspcapStar, parallax catalogs)
//!        │
//!        ▼
//!   DatasetCompiler ── filter ─ normalize ─ accumulate ─ cross-match
//!        │
//!        ▼
//!   <output>.parquet ──▶ DatasetLoader ──▶ (spectra, labels)
//! ```

pub mod catalog;
pub(crate) mod columnar;
pub mod compile;
pub mod config;
pub mod data_root;
pub mod dataset;
pub mod error;
pub mod schema;
pub mod spectra;
pub mod xmatch;

pub use compile::{CompileReport, DatasetCompiler, Sources};
pub use config::{CompileConfig, SpectrumMode};
pub use data_root::DataRoot;
pub use dataset::loader::{DatasetLoader, LoadSelection};
pub use dataset::stats::LabelStats;
pub use dataset::CompiledDataset;
pub use error::{Error, Result};
pub use schema::{Target, SENTINEL};

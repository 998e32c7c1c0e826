//! Stellar catalog: row type, the source trait, and the allStar Parquet
//! layout.
//!
//! ```text
//!   allStar.parquet
//!        │
//!        ▼
//!   ┌──────────────┐
//!   │ read_catalog  │  columns → Vec<CatalogRecord>
//!   └──────────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  filter   │  quality cuts → accepted row indices
//!   └──────────┘
//! ```

pub mod filter;

use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;

use crate::columnar;
use crate::error::Result;
use crate::schema::SENTINEL;

const APOGEE_ID: &str = "APOGEE_ID";
const LOCATION_ID: &str = "LOCATION_ID";
const STARFLAG: &str = "STARFLAG";
const ASPCAPFLAG: &str = "ASPCAPFLAG";
const SNR: &str = "SNR";
const VSCATTER: &str = "VSCATTER";
const PARAM: &str = "PARAM";
const PARAM_COV: &str = "PARAM_COV";
const X_H: &str = "X_H";
const X_H_ERR: &str = "X_H_ERR";
const K: &str = "K";
const RA: &str = "RA";
const DEC: &str = "DEC";
const NVISITS: &str = "NVISITS";

/// One row of the stellar catalog.
///
/// Missing numeric values carry [`SENTINEL`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CatalogRecord {
    pub apogee_id: String,
    pub location_id: i64,
    pub star_flag: i64,
    pub aspcap_flag: i64,
    pub snr: f32,
    pub vscatter: f32,
    /// teff, logg, vmicro, [M/H], [C/M], [N/M], [alpha/M]
    pub param: Vec<f32>,
    /// Row-major 7x7 covariance of `param`.
    pub param_cov: Vec<f32>,
    pub x_h: Vec<f32>,
    pub x_h_err: Vec<f32>,
    pub k_mag: f32,
    /// Degrees, J2000.
    pub ra: f64,
    pub dec: f64,
    pub nvisits: u32,
}

impl CatalogRecord {
    pub fn teff(&self) -> f32 {
        self.param.first().copied().unwrap_or(SENTINEL)
    }

    pub fn logg(&self) -> f32 {
        self.param.get(1).copied().unwrap_or(SENTINEL)
    }

    pub fn fe_h(&self) -> f32 {
        self.x_h
            .get(crate::schema::FE_INDEX)
            .copied()
            .unwrap_or(SENTINEL)
    }
}

/// Provides the catalog for a data release.
pub trait CatalogSource {
    fn load_catalog(&self, release: u32) -> Result<Vec<CatalogRecord>>;
}

/// Read an allStar-layout Parquet file.
pub fn read_catalog(path: &Path) -> Result<Vec<CatalogRecord>> {
    let mut records = Vec::new();
    for batch in columnar::read_parquet(path)? {
        let ids = columnar::string_values(&batch, APOGEE_ID)?;
        let location = columnar::i64_values(&batch, LOCATION_ID, -1)?;
        let star_flag = columnar::i64_values(&batch, STARFLAG, 0)?;
        let aspcap_flag = columnar::i64_values(&batch, ASPCAPFLAG, 0)?;
        let snr = columnar::f32_values(&batch, SNR, SENTINEL)?;
        let vscatter = columnar::f32_values(&batch, VSCATTER, SENTINEL)?;
        let param = columnar::f32_lists(&batch, PARAM, SENTINEL)?;
        let param_cov = columnar::f32_lists(&batch, PARAM_COV, SENTINEL)?;
        let x_h = columnar::f32_lists(&batch, X_H, SENTINEL)?;
        let x_h_err = columnar::f32_lists(&batch, X_H_ERR, SENTINEL)?;
        let k = columnar::f32_values(&batch, K, SENTINEL)?;
        let ra = columnar::f64_values(&batch, RA, SENTINEL as f64)?;
        let dec = columnar::f64_values(&batch, DEC, SENTINEL as f64)?;
        let nvisits = columnar::i64_values(&batch, NVISITS, 0)?;

        let rows = ids
            .into_iter()
            .zip(param)
            .zip(param_cov)
            .zip(x_h)
            .zip(x_h_err)
            .enumerate();
        for (i, ((((apogee_id, param), param_cov), x_h), x_h_err)) in rows {
            records.push(CatalogRecord {
                apogee_id,
                location_id: location[i],
                star_flag: star_flag[i],
                aspcap_flag: aspcap_flag[i],
                snr: snr[i],
                vscatter: vscatter[i],
                param,
                param_cov,
                x_h,
                x_h_err,
                k_mag: k[i],
                ra: ra[i],
                dec: dec[i],
                nvisits: nvisits[i].max(0) as u32,
            });
        }
    }
    log::info!("loaded {} catalog rows from {}", records.len(), path.display());
    Ok(records)
}

/// Write records in the layout [`read_catalog`] expects.
pub fn write_catalog(path: &Path, records: &[CatalogRecord]) -> Result<()> {
    let lists = |f: fn(&CatalogRecord) -> &Vec<f32>| -> ArrayRef {
        let rows: Vec<Vec<f32>> = records.iter().map(|r| f(r).clone()).collect();
        columnar::f32_list_array(&rows)
    };
    let columns: Vec<(&str, ArrayRef)> = vec![
        (
            APOGEE_ID,
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.apogee_id.as_str()),
            )),
        ),
        (
            LOCATION_ID,
            Arc::new(Int64Array::from_iter_values(records.iter().map(|r| r.location_id))),
        ),
        (
            STARFLAG,
            Arc::new(Int64Array::from_iter_values(records.iter().map(|r| r.star_flag))),
        ),
        (
            ASPCAPFLAG,
            Arc::new(Int64Array::from_iter_values(records.iter().map(|r| r.aspcap_flag))),
        ),
        (
            SNR,
            Arc::new(Float32Array::from_iter_values(records.iter().map(|r| r.snr))),
        ),
        (
            VSCATTER,
            Arc::new(Float32Array::from_iter_values(records.iter().map(|r| r.vscatter))),
        ),
        (PARAM, lists(|r| &r.param)),
        (PARAM_COV, lists(|r| &r.param_cov)),
        (X_H, lists(|r| &r.x_h)),
        (X_H_ERR, lists(|r| &r.x_h_err)),
        (
            K,
            Arc::new(Float32Array::from_iter_values(records.iter().map(|r| r.k_mag))),
        ),
        (
            RA,
            Arc::new(Float64Array::from_iter_values(records.iter().map(|r| r.ra))),
        ),
        (
            DEC,
            Arc::new(Float64Array::from_iter_values(records.iter().map(|r| r.dec))),
        ),
        (
            NVISITS,
            Arc::new(Int64Array::from_iter_values(records.iter().map(|r| r.nvisits as i64))),
        ),
    ];

    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, arr)| Field::new(*name, arr.data_type().clone(), true))
        .collect();
    let arrays: Vec<ArrayRef> = columns.into_iter().map(|(_, arr)| arr).collect();
    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?;
    columnar::write_parquet(path, &batch)
}

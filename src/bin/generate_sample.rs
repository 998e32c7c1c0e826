//! Write a small synthetic survey data tree and a matching compile config.
//!
//! ```text
//! generate_sample [DIR]     (default: sample_root)
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use ndarray::Array2;
use parquet::arrow::ArrowWriter;
use serde::Serialize;

use starlabel::catalog::{write_catalog, CatalogRecord};
use starlabel::spectra::{write_spectrum_file, RawSpectra};
use starlabel::{CompileConfig, DataRoot, SpectrumMode, SENTINEL};

const RELEASE: u32 = 14;
const RAW_PIXELS: usize = 8575;
const STARS: usize = 40;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// One raw-frame spectrum: sloped continuum times absorption lines whose
/// depth follows `teff`, plus noise.
fn raw_spectrum(teff: f64, scale: f64, rng: &mut SimpleRng) -> (Vec<f32>, Vec<f32>) {
    let depth = 0.2 + (5500.0 - teff) / 5000.0;
    let lines = [1200.0, 2600.0, 4100.0, 5200.0, 6900.0, 7800.0];
    let mut flux = Vec::with_capacity(RAW_PIXELS);
    let mut error = Vec::with_capacity(RAW_PIXELS);
    for px in 0..RAW_PIXELS {
        let x = px as f64;
        let continuum = scale * (1.0 + 0.3 * x / RAW_PIXELS as f64);
        let absorption: f64 = lines.iter().map(|&mu| gaussian(x, mu, 6.0, depth)).sum();
        let sigma = 0.01 * continuum;
        flux.push((continuum * (1.0 - absorption) + rng.gauss(0.0, sigma)) as f32);
        error.push(sigma as f32);
    }
    (flux, error)
}

fn spectra_matrix(rows: Vec<(Vec<f32>, Vec<f32>)>) -> Result<RawSpectra> {
    let n = rows.len();
    let (flux, error): (Vec<_>, Vec<_>) = rows.into_iter().unzip();
    Ok(RawSpectra {
        flux: Array2::from_shape_vec((n, RAW_PIXELS), flux.concat())?,
        error: Array2::from_shape_vec((n, RAW_PIXELS), error.concat())?,
    })
}

#[derive(Serialize)]
struct AndersonRow {
    ra: f64,
    dec: f64,
    parallax: Option<f64>,
    parallax_var: Option<f64>,
}

fn write_tgas(path: &Path, stars: &[CatalogRecord], rng: &mut SimpleRng) -> Result<()> {
    let n = stars.len();
    let mut pmra = Vec::with_capacity(n);
    let mut pmdec = Vec::with_capacity(n);
    let mut ra = Vec::with_capacity(n);
    let mut dec = Vec::with_capacity(n);
    for star in stars {
        let (pa, pd) = (rng.gauss(0.0, 30.0), rng.gauss(0.0, 30.0));
        // Carry the J2000 position forward to the J2015 catalog epoch.
        let years = 15.0;
        let cos_dec = star.dec.to_radians().cos();
        ra.push(star.ra + pa * years / 3.6e6 / cos_dec);
        dec.push(star.dec + pd * years / 3.6e6);
        pmra.push(pa);
        pmdec.push(pd);
    }
    let parallax: Vec<f64> = (0..n).map(|_| rng.uniform(0.5, 4.0)).collect();
    let parallax_error: Vec<f64> = (0..n).map(|_| rng.uniform(0.2, 0.4)).collect();

    let columns: Vec<(&str, Vec<f64>)> = vec![
        ("ra", ra),
        ("dec", dec),
        ("pmra", pmra),
        ("pmdec", pmdec),
        ("parallax", parallax),
        ("parallax_error", parallax_error),
    ];
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, _)| Field::new(*name, arrow::datatypes::DataType::Float64, false))
        .collect();
    let arrays: Vec<ArrayRef> = columns
        .into_iter()
        .map(|(_, v)| Arc::new(Float64Array::from(v)) as ArrayRef)
        .collect();
    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let out = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_root"));
    let root = DataRoot::new(&out, 1);
    let mut rng = SimpleRng::new(42);

    let mut stars = Vec::with_capacity(STARS);
    for i in 0..STARS {
        let teff = rng.uniform(3800.0, 5800.0);
        let mut x_h: Vec<f32> = (0..26).map(|_| rng.gauss(0.0, 0.15) as f32).collect();
        let fe_h = rng.gauss(-0.2, 0.3) as f32;
        x_h[17] = fe_h;
        let mut param = vec![
            teff as f32,
            rng.uniform(1.0, 3.5) as f32,
            1.2,
            fe_h,
            0.0,
            0.0,
            rng.gauss(0.05, 0.05) as f32,
        ];
        let mut param_cov = vec![0.0f32; 49];
        for (j, var) in [2500.0, 0.01, 0.01, 0.0004, 0.001, 0.001, 0.0004].iter().enumerate() {
            param_cov[j * 7 + j] = *var;
        }
        // Every seventh star is missing logg, every ninth its K magnitude.
        if i % 7 == 6 {
            param[1] = SENTINEL;
        }
        let k_mag = if i % 9 == 8 { SENTINEL } else { rng.uniform(7.0, 11.0) as f32 };

        stars.push(CatalogRecord {
            apogee_id: format!("2M{:08}", 1_000_000 + i * 137),
            location_id: 4000 + (i % 4) as i64,
            star_flag: if i % 11 == 10 { 4 } else { 0 },
            aspcap_flag: 0,
            snr: rng.uniform(60.0, 400.0) as f32,
            vscatter: rng.uniform(0.0, 1.5) as f32,
            param,
            param_cov,
            x_h,
            x_h_err: vec![0.03; 26],
            k_mag,
            ra: rng.uniform(0.0, 360.0),
            dec: rng.uniform(-20.0, 60.0),
            nvisits: 1 + (rng.next_u64() % 4) as u32,
        });
    }

    let allstar = root.allstar_path(RELEASE);
    std::fs::create_dir_all(allstar.parent().context("allStar path has no parent")?)?;
    write_catalog(&allstar, &stars)?;

    let mut written = 0;
    for (i, star) in stars.iter().enumerate() {
        // A few stars have no spectra on disk at all.
        if i % 13 == 12 {
            continue;
        }
        std::fs::create_dir_all(root.star_dir(RELEASE, star.location_id))?;
        let teff = star.param[0] as f64;
        let scale = rng.uniform(200.0, 800.0);

        let combined = spectra_matrix(vec![raw_spectrum(teff, 1.0, &mut rng)])?;
        write_spectrum_file(
            &root.combined_path(RELEASE, star.location_id, &star.apogee_id),
            &combined,
        )?;

        let rows = if star.nvisits > 1 { star.nvisits as usize + 2 } else { 1 };
        let cube = spectra_matrix(
            (0..rows)
                .map(|_| raw_spectrum(teff, scale, &mut rng))
                .collect(),
        )?;
        write_spectrum_file(
            &root.visits_path(RELEASE, star.location_id, &star.apogee_id),
            &cube,
        )?;
        written += 1;
    }

    let anderson = root.anderson_path();
    std::fs::create_dir_all(anderson.parent().context("catalog path has no parent")?)?;
    let mut csv = csv::Writer::from_path(&anderson)?;
    for (i, star) in stars.iter().enumerate() {
        let missing = i % 5 == 4;
        csv.serialize(AndersonRow {
            ra: star.ra,
            dec: star.dec,
            parallax: (!missing).then(|| rng.uniform(0.3, 5.0)),
            parallax_var: (!missing).then(|| rng.uniform(0.001, 0.05)),
        })?;
    }
    csv.flush()?;

    let tgas = root.tgas_path();
    std::fs::create_dir_all(tgas.parent().context("catalog path has no parent")?)?;
    write_tgas(&tgas, &stars, &mut rng)?;

    let config = CompileConfig {
        apogee_dr: RELEASE,
        data_root: out.clone(),
        output: "sample_train".into(),
        output_dir: out.clone(),
        mode: SpectrumMode::Visits,
        ..CompileConfig::default()
    };
    let config_path = out.join("compile.json");
    std::fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;

    println!(
        "Wrote {} catalog rows and spectra for {written} stars under {}",
        stars.len(),
        out.display()
    );
    println!("Compile with: starlabel compile {}", config_path.display());
    Ok(())
}

//! Continuum normalization of visit spectra.
//!
//! Each detector chip gets its own low-order Chebyshev fit through the
//! continuum pixels, weighted by inverse variance. Flux and error are both
//! divided by the fitted continuum.

use std::ops::Range;

use ndarray::{Array2, ArrayView1};

use super::ChipLayout;

#[derive(Debug, Clone, PartialEq)]
pub struct ContinuumFit {
    pub degree: usize,
    /// Gap-free pixel mask of continuum pixels; `None` uses every pixel.
    pub mask: Option<Vec<bool>>,
}

impl Default for ContinuumFit {
    fn default() -> Self {
        Self {
            degree: 2,
            mask: None,
        }
    }
}

impl ContinuumFit {
    /// Normalize every row. Returns `None` when any chip of any row has no
    /// usable fit.
    pub fn normalize(
        &self,
        flux: &Array2<f32>,
        error: &Array2<f32>,
        layout: &ChipLayout,
    ) -> Option<(Array2<f32>, Array2<f32>)> {
        let mut out_flux = flux.clone();
        let mut out_err = error.clone();
        for row in 0..flux.nrows() {
            for chip in layout.degapped_chips() {
                let cont = self.fit_chip(flux.row(row), error.row(row), chip.clone())?;
                for (k, px) in chip.enumerate() {
                    out_flux[[row, px]] = (flux[[row, px]] as f64 / cont[k]) as f32;
                    out_err[[row, px]] = (error[[row, px]] as f64 / cont[k]) as f32;
                }
            }
        }
        Some((out_flux, out_err))
    }

    /// Continuum evaluated over `chip`.
    fn fit_chip(
        &self,
        flux: ArrayView1<f32>,
        error: ArrayView1<f32>,
        chip: Range<usize>,
    ) -> Option<Vec<f64>> {
        let n_coef = self.degree + 1;
        let len = chip.len();
        if len < n_coef {
            return None;
        }
        let x_of = |k: usize| -> f64 {
            if len == 1 {
                0.0
            } else {
                2.0 * k as f64 / (len - 1) as f64 - 1.0
            }
        };

        let mut ata = vec![vec![0.0f64; n_coef]; n_coef];
        let mut atb = vec![0.0f64; n_coef];
        let mut used = 0usize;
        for (k, px) in chip.clone().enumerate() {
            if let Some(mask) = &self.mask {
                if !mask.get(px).copied().unwrap_or(false) {
                    continue;
                }
            }
            let (f, e) = (flux[px] as f64, error[px] as f64);
            if !f.is_finite() || !e.is_finite() || e <= 0.0 {
                continue;
            }
            let w = 1.0 / (e * e);
            let basis = chebyshev(x_of(k), n_coef);
            for i in 0..n_coef {
                atb[i] += w * basis[i] * f;
                for j in 0..n_coef {
                    ata[i][j] += w * basis[i] * basis[j];
                }
            }
            used += 1;
        }
        if used < n_coef {
            return None;
        }

        let coef = solve(ata, atb)?;
        let cont: Vec<f64> = (0..len)
            .map(|k| {
                chebyshev(x_of(k), n_coef)
                    .iter()
                    .zip(&coef)
                    .map(|(b, c)| b * c)
                    .sum()
            })
            .collect();
        if cont.iter().any(|c| !c.is_finite() || *c == 0.0) {
            return None;
        }
        Some(cont)
    }
}

/// T_0(x) .. T_{n-1}(x).
fn chebyshev(x: f64, n: usize) -> Vec<f64> {
    let mut t = Vec::with_capacity(n);
    for i in 0..n {
        let v = match i {
            0 => 1.0,
            1 => x,
            _ => 2.0 * x * t[i - 1] - t[i - 2],
        };
        t.push(v);
    }
    t
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    let scale = a
        .iter()
        .flatten()
        .fold(0.0f64, |m, v| m.max(v.abs()))
        .max(f64::MIN_POSITIVE);
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 * scale {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

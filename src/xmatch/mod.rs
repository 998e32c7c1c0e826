//! Positional cross-match against a supplementary parallax catalog.
//!
//! Supplementary positions are carried to the survey epoch, indexed in a
//! KD-tree of unit vectors, and each compiled row takes its nearest
//! neighbour within the tolerance. Matched rows receive the parallax and the
//! derived `fakemag = Kmag / parallax`.

pub mod kdtree;
pub mod source;
pub mod sphere;

pub use source::{AstrometricCatalog, AstrometrySource, SupplementarySource};

use crate::compile::buffer::SpectrumBuffer;
use crate::error::Result;
use crate::schema::{self, err_name, SENTINEL};
use kdtree::KdTree;

/// Epoch of the survey catalog positions.
pub const SURVEY_EPOCH: f64 = 2000.0;

/// One association between a compiled row (`m1`) and a supplementary row
/// (`m2`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossMatch {
    pub m1: usize,
    pub m2: usize,
    pub separation_arcsec: f64,
}

/// Nearest supplementary neighbour of every position within
/// `tolerance_arcsec`. Each `m1` appears at most once, in ascending order.
/// Positions holding the sentinel never match.
pub fn cross_match(
    ra: &[f64],
    dec: &[f64],
    epoch: f64,
    catalog: &AstrometricCatalog,
    tolerance_arcsec: f64,
) -> Vec<CrossMatch> {
    let points: Vec<[f64; 3]> = catalog
        .positions_at(epoch)
        .into_iter()
        .map(|(r, d)| sphere::radec_to_xyz(r, d))
        .collect();
    let tree = KdTree::build(&points);
    let max_dist_sq = sphere::chord_sq(tolerance_arcsec / sphere::ARCSEC_PER_RAD);

    ra.iter()
        .zip(dec)
        .enumerate()
        .filter_map(|(m1, (&r, &d))| {
            if r == SENTINEL as f64 || d == SENTINEL as f64 {
                return None;
            }
            let hit = tree.nearest_within(&sphere::radec_to_xyz(r, d), max_dist_sq)?;
            Some(CrossMatch {
                m1,
                m2: hit.index,
                separation_arcsec: sphere::chord_angle(hit.dist_sq) * sphere::ARCSEC_PER_RAD,
            })
        })
        .collect()
}

/// Fill parallax and fakemag of matched rows. Returns the match count.
///
/// Rows without a match, and the fakemag of rows without a K magnitude,
/// keep the sentinel.
pub fn apply_astrometry(
    buffer: &mut SpectrumBuffer,
    catalog: AstrometricCatalog,
    tolerance_arcsec: f64,
) -> Result<usize> {
    let catalog = catalog.without_missing_parallax();
    let matches = cross_match(
        buffer.ra(),
        buffer.dec(),
        SURVEY_EPOCH,
        &catalog,
        tolerance_arcsec,
    );

    let kmag = buffer.column(schema::KMAG)?.to_vec();
    let mut parallax = buffer.column("parallax")?.to_vec();
    let mut parallax_err = buffer.column(&err_name("parallax"))?.to_vec();
    let mut fakemag = buffer.column("fakemag")?.to_vec();
    let mut fakemag_err = buffer.column(&err_name("fakemag"))?.to_vec();

    for m in &matches {
        let p = catalog.parallax[m.m2] as f32;
        let var = catalog.parallax_var[m.m2] as f32;
        parallax[m.m1] = p;
        parallax_err[m.m1] = var;
        if kmag[m.m1] != SENTINEL {
            fakemag[m.m1] = kmag[m.m1] / p;
            fakemag_err[m.m1] = (var / p * fakemag[m.m1]).abs();
        }
    }

    buffer.column_mut("parallax")?.copy_from_slice(&parallax);
    buffer
        .column_mut(&err_name("parallax"))?
        .copy_from_slice(&parallax_err);
    buffer.column_mut("fakemag")?.copy_from_slice(&fakemag);
    buffer
        .column_mut(&err_name("fakemag"))?
        .copy_from_slice(&fakemag_err);

    log::info!(
        "cross-matched {} of {} rows against {} supplementary sources",
        matches.len(),
        buffer.cursor(),
        catalog.len()
    );
    Ok(matches.len())
}

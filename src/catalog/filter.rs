use serde::{Deserialize, Serialize};

use super::CatalogRecord;
use crate::schema::SENTINEL;

// ---------------------------------------------------------------------------
// FilterCriteria – configurable quality cuts
// ---------------------------------------------------------------------------

/// Quality cuts applied to the catalog before compilation.
///
/// A `None` threshold or a `false` toggle disables that cut; a disabled cut
/// accepts every row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    pub star_flag_cut: bool,
    pub aspcap_flag_cut: bool,
    pub vscatter_max: Option<f32>,
    pub teff_low: Option<f32>,
    pub teff_high: Option<f32>,
    pub snr_low: Option<f32>,
    pub snr_high: Option<f32>,
    pub iron_low: Option<f32>,
    pub require_location: bool,
    pub require_logg: bool,
    pub require_kmag: bool,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            star_flag_cut: true,
            aspcap_flag_cut: true,
            vscatter_max: Some(1.0),
            teff_low: Some(4000.0),
            teff_high: Some(5500.0),
            snr_low: Some(100.0),
            snr_high: Some(99999.0),
            iron_low: Some(-3.0),
            require_location: true,
            require_logg: true,
            require_kmag: true,
        }
    }
}

impl FilterCriteria {
    /// Every cut switched off.
    pub fn disabled() -> Self {
        Self {
            star_flag_cut: false,
            aspcap_flag_cut: false,
            vscatter_max: None,
            teff_low: None,
            teff_high: None,
            snr_low: None,
            snr_high: None,
            iron_low: None,
            require_location: false,
            require_logg: false,
            require_kmag: false,
        }
    }

    /// The enabled cuts as individual criteria.
    pub fn criteria(&self) -> Vec<Criterion> {
        let mut out = Vec::new();
        if self.star_flag_cut {
            out.push(Criterion::StarFlagClear);
        }
        if self.aspcap_flag_cut {
            out.push(Criterion::AspcapFlagClear);
        }
        if let Some(v) = self.teff_low {
            out.push(Criterion::TeffAtLeast(v));
        }
        if let Some(v) = self.teff_high {
            out.push(Criterion::TeffAtMost(v));
        }
        if let Some(v) = self.vscatter_max {
            out.push(Criterion::VscatterBelow(v));
        }
        if let Some(v) = self.iron_low {
            out.push(Criterion::IronAbove(v));
        }
        if let Some(v) = self.snr_low {
            out.push(Criterion::SnrAbove(v));
        }
        if let Some(v) = self.snr_high {
            out.push(Criterion::SnrBelow(v));
        }
        if self.require_location {
            out.push(Criterion::LocationValid);
        }
        if self.require_logg {
            out.push(Criterion::LoggPresent);
        }
        if self.require_kmag {
            out.push(Criterion::KmagPresent);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Criterion – one cut
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Criterion {
    StarFlagClear,
    AspcapFlagClear,
    TeffAtLeast(f32),
    TeffAtMost(f32),
    VscatterBelow(f32),
    IronAbove(f32),
    SnrAbove(f32),
    SnrBelow(f32),
    LocationValid,
    LoggPresent,
    KmagPresent,
}

impl Criterion {
    pub fn accepts(&self, r: &CatalogRecord) -> bool {
        match *self {
            Criterion::StarFlagClear => r.star_flag == 0,
            Criterion::AspcapFlagClear => r.aspcap_flag == 0,
            Criterion::TeffAtLeast(v) => v <= r.teff(),
            Criterion::TeffAtMost(v) => r.teff() <= v,
            Criterion::VscatterBelow(v) => r.vscatter < v,
            Criterion::IronAbove(v) => r.fe_h() > v,
            Criterion::SnrAbove(v) => r.snr > v,
            Criterion::SnrBelow(v) => r.snr < v,
            Criterion::LocationValid => r.location_id > 1,
            Criterion::LoggPresent => r.logg() != SENTINEL,
            Criterion::KmagPresent => r.k_mag != SENTINEL,
        }
    }

    /// Sorted indices of the rows this criterion accepts.
    pub fn accepted(&self, records: &[CatalogRecord]) -> Vec<usize> {
        records
            .iter()
            .enumerate()
            .filter(|(_, r)| self.accepts(r))
            .map(|(i, _)| i)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Set intersection
// ---------------------------------------------------------------------------

/// Intersection of two ascending index lists.
pub fn intersect_sorted(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Rows accepted by every criterion in `criteria`, ascending.
pub fn apply_criteria(records: &[CatalogRecord], criteria: &[Criterion]) -> Vec<usize> {
    criteria
        .iter()
        .map(|c| c.accepted(records))
        .fold((0..records.len()).collect(), |acc: Vec<usize>, subset| {
            intersect_sorted(&acc, &subset)
        })
}

/// Return the catalog rows that pass every enabled cut.
pub fn filter_indices(records: &[CatalogRecord], criteria: &FilterCriteria) -> Vec<usize> {
    let accepted = apply_criteria(records, &criteria.criteria());
    let visits: u64 = accepted.iter().map(|&i| records[i].nvisits as u64).sum();
    log::info!("{} of {} catalog stars pass the quality cuts", accepted.len(), records.len());
    log::info!("{visits} individual visit spectra belong to the accepted stars");
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn star(teff: f32, snr: f32) -> CatalogRecord {
        let mut x_h = vec![0.0; 26];
        x_h[17] = -0.2;
        CatalogRecord {
            location_id: 4000,
            snr,
            vscatter: 0.1,
            param: vec![teff, 2.5, 1.0, -0.2, 0.0, 0.0, 0.1],
            x_h,
            k_mag: 10.0,
            nvisits: 2,
            ..CatalogRecord::default()
        }
    }

    fn five_stars() -> Vec<CatalogRecord> {
        [(3000.0, 50.0), (4500.0, 150.0), (5000.0, 200.0), (6000.0, 300.0), (4800.0, 90.0)]
            .into_iter()
            .map(|(t, s)| star(t, s))
            .collect()
    }

    #[test]
    fn disabled_criteria_keep_everything() {
        let mut records = five_stars();
        records[0].star_flag = 8;
        records[1].k_mag = SENTINEL;
        records[2].location_id = 1;
        assert_eq!(
            filter_indices(&records, &FilterCriteria::disabled()),
            vec![0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn teff_band_and_snr_floor_keep_both_qualifying_rows() {
        let criteria = FilterCriteria {
            teff_low: Some(4000.0),
            teff_high: Some(5500.0),
            snr_low: Some(100.0),
            ..FilterCriteria::disabled()
        };
        // 0 and 3 fall outside the teff band, 4 is below the SNR floor.
        // Row 1 (4500 K, SNR 150) passes both cuts, so it is kept with row 2.
        assert_eq!(filter_indices(&five_stars(), &criteria), vec![1, 2]);
    }

    #[test]
    fn snr_bounds_are_exclusive_teff_bounds_inclusive() {
        let records = vec![star(4000.0, 100.0), star(5500.0, 101.0), star(4500.0, 99999.0)];
        let criteria = FilterCriteria {
            teff_low: Some(4000.0),
            teff_high: Some(5500.0),
            snr_low: Some(100.0),
            snr_high: Some(99999.0),
            ..FilterCriteria::disabled()
        };
        assert_eq!(filter_indices(&records, &criteria), vec![1]);
    }

    #[test]
    fn presence_checks_drop_sentinels() {
        let mut records = five_stars();
        records[1].param[1] = SENTINEL;
        records[2].k_mag = SENTINEL;
        let criteria = FilterCriteria {
            require_logg: true,
            require_kmag: true,
            ..FilterCriteria::disabled()
        };
        assert_eq!(filter_indices(&records, &criteria), vec![0, 3, 4]);
    }

    #[test]
    fn default_cuts() {
        let mut records = five_stars();
        records.push(star(4700.0, 180.0));
        records[5].aspcap_flag = 1;
        let mut iron_poor = star(4700.0, 180.0);
        iron_poor.x_h[17] = -3.5;
        records.push(iron_poor);
        let mut scattered = star(4700.0, 180.0);
        scattered.vscatter = 1.0;
        records.push(scattered);
        let mut bad_location = star(4700.0, 180.0);
        bad_location.location_id = 1;
        records.push(bad_location);
        assert_eq!(filter_indices(&records, &FilterCriteria::default()), vec![1, 2]);
    }

    #[test]
    fn criterion_order_does_not_matter() {
        let mut records = five_stars();
        records[2].star_flag = 2;
        records.extend(five_stars());
        let criteria = FilterCriteria::default().criteria();
        let forward = apply_criteria(&records, &criteria);

        let mut reversed = criteria.clone();
        reversed.reverse();
        assert_eq!(apply_criteria(&records, &reversed), forward);

        let mut rotated = criteria.clone();
        rotated.rotate_left(4);
        assert_eq!(apply_criteria(&records, &rotated), forward);
    }

    #[test]
    fn empty_subset_gives_empty_result() {
        let criteria = FilterCriteria {
            snr_low: Some(1e6),
            ..FilterCriteria::disabled()
        };
        assert!(filter_indices(&five_stars(), &criteria).is_empty());
    }

    #[test]
    fn intersection_of_sorted_lists() {
        assert_eq!(intersect_sorted(&[1, 3, 5, 7], &[0, 3, 4, 7, 9]), vec![3, 7]);
        assert!(intersect_sorted(&[], &[1, 2]).is_empty());
    }
}

const MAS_PER_DEG: f64 = 3.6e6;
pub const ARCSEC_PER_RAD: f64 = 180.0 / std::f64::consts::PI * 3600.0;

/// (RA, Dec) in degrees to a unit vector.
pub fn radec_to_xyz(ra_deg: f64, dec_deg: f64) -> [f64; 3] {
    let (ra, dec) = (ra_deg.to_radians(), dec_deg.to_radians());
    let cos_dec = dec.cos();
    [cos_dec * ra.cos(), cos_dec * ra.sin(), dec.sin()]
}

/// Squared chord length between two unit vectors separated by `angle_rad`.
pub fn chord_sq(angle_rad: f64) -> f64 {
    let chord = 2.0 * (angle_rad / 2.0).sin();
    chord * chord
}

/// Angle subtended by a chord whose squared length is `dist_sq`.
pub fn chord_angle(dist_sq: f64) -> f64 {
    2.0 * (dist_sq.sqrt() / 2.0).clamp(-1.0, 1.0).asin()
}

/// Move a position by proper motion over `dt_years`.
///
/// `pmra` includes the `cos(dec)` factor; RA is wrapped into `[0, 360)`.
pub fn propagate(ra: f64, dec: f64, pmra: f64, pmdec: f64, dt_years: f64) -> (f64, f64) {
    let new_dec = dec + pmdec * dt_years / MAS_PER_DEG;
    let cos_dec = dec.to_radians().cos();
    let new_ra = if cos_dec.abs() > 1e-12 {
        ra + pmra * dt_years / MAS_PER_DEG / cos_dec
    } else {
        ra
    };
    (new_ra.rem_euclid(360.0), new_dec)
}

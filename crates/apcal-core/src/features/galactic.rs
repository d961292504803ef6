//! Equatorial (ICRS) to galactic coordinate conversion.

/// Rotation from ICRS unit vectors to galactic unit vectors (Hipparcos
/// definition of the galactic frame).
const ICRS_TO_GALACTIC: [[f64; 3]; 3] = [
    [-0.0548755604162154, -0.8734370902348850, -0.4838350155487132],
    [0.4941094278755837, -0.4448296299600112, 0.7469822444972189],
    [-0.8676661490190047, -0.1980763734312015, 0.4559837761750669],
];

fn galactic_unit_vector(ra_deg: f64, dec_deg: f64) -> [f64; 3] {
    let (ra, dec) = (ra_deg.to_radians(), dec_deg.to_radians());
    let icrs = [dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin()];

    let mut galactic = [0.0; 3];
    for (out, row) in galactic.iter_mut().zip(ICRS_TO_GALACTIC.iter()) {
        *out = row.iter().zip(icrs.iter()).map(|(m, v)| m * v).sum();
    }
    galactic
}

/// Galactic longitude and latitude, in degrees, of an ICRS position given in
/// degrees. Longitude is in `[0, 360)`.
pub fn equatorial_to_galactic(ra_deg: f64, dec_deg: f64) -> (f64, f64) {
    let [x, y, z] = galactic_unit_vector(ra_deg, dec_deg);
    let l = y.atan2(x).to_degrees().rem_euclid(360.0);
    let b = z.clamp(-1.0, 1.0).asin().to_degrees();
    (l, b)
}

/// `cos(b)` for an ICRS position in degrees. NaN in, NaN out.
///
/// Computed as the length of the vector's projection on the galactic plane,
/// which stays accurate near the poles where `cos(asin(z))` loses precision.
pub fn cos_galactic_latitude(ra_deg: f64, dec_deg: f64) -> f64 {
    let [x, y, _] = galactic_unit_vector(ra_deg, dec_deg);
    x.hypot(y)
}

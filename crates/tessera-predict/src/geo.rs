//! Great-circle geometry on a spherical Earth.
//!
//! All angles are in degrees. Azimuths are clockwise from north and
//! normalised to `[0, 360)`.

/// Mean Earth radius used for degree/kilometre conversions.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometres per degree of arc at the surface.
pub const KM_PER_DEGREE: f64 = EARTH_RADIUS_KM * core::f64::consts::PI / 180.0;

/// Normalise an azimuth to `[0, 360)`.
pub fn normalize_azimuth(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Normalise a longitude to `[-180, 180)`.
pub fn normalize_longitude(degrees: f64) -> f64 {
    (degrees + 180.0).rem_euclid(360.0) - 180.0
}

/// Great-circle distance between two points, in degrees of arc.
///
/// Uses the haversine form, which stays accurate for short paths.
pub fn distance_degrees(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = phi2 - phi1;
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().clamp(0.0, 1.0).asin();
    c.to_degrees()
}

/// Initial azimuth of the great circle from point 1 toward point 2.
pub fn azimuth_degrees(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_lambda = (lon2 - lon1).to_radians();
    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    normalize_azimuth(y.atan2(x).to_degrees())
}

/// Point reached by travelling `distance` degrees from a start point along
/// the given initial azimuth. Returns `(latitude, longitude)`.
pub fn destination(lat: f64, lon: f64, azimuth: f64, distance: f64) -> (f64, f64) {
    let phi1 = lat.to_radians();
    let lambda1 = lon.to_radians();
    let theta = azimuth.to_radians();
    let delta = distance.to_radians();

    let sin_phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).clamp(-1.0, 1.0);
    let phi2 = sin_phi2.asin();
    let y = theta.sin() * delta.sin() * phi1.cos();
    let x = delta.cos() - phi1.sin() * sin_phi2;
    let lambda2 = lambda1 + y.atan2(x);

    (phi2.to_degrees(), normalize_longitude(lambda2.to_degrees()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn quarter_circle_along_equator() {
        assert!((distance_degrees(0.0, 0.0, 0.0, 90.0) - 90.0).abs() < EPS);
        assert!((azimuth_degrees(0.0, 0.0, 0.0, 90.0) - 90.0).abs() < EPS);
    }

    #[test]
    fn pole_is_due_north() {
        assert!(azimuth_degrees(10.0, 40.0, 90.0, 0.0).abs() < EPS);
        assert!((distance_degrees(10.0, 40.0, 90.0, 0.0) - 80.0).abs() < EPS);
    }

    #[test]
    fn destination_inverts_distance_and_azimuth() {
        let (lat, lon) = destination(35.0, -120.0, 47.0, 12.5);
        assert!((distance_degrees(35.0, -120.0, lat, lon) - 12.5).abs() < 1e-8);
        assert!((azimuth_degrees(35.0, -120.0, lat, lon) - 47.0).abs() < 1e-8);
    }

    #[test]
    fn destination_wraps_dateline() {
        let (_, lon) = destination(0.0, 179.0, 90.0, 2.0);
        assert!((lon - -179.0).abs() < 1e-9);
    }

    #[test]
    fn azimuth_is_normalised() {
        let az = azimuth_degrees(0.0, 0.0, 0.0, -10.0);
        assert!((az - 270.0).abs() < EPS);
        assert!(normalize_azimuth(-1e-20) < 360.0);
    }
}

//! Great-circle distance for GPS vs access-point cross-checks.

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometres between two (lat, lon) points.
pub fn haversine_km(a_lat: f64, a_lon: f64, b_lat: f64, b_lon: f64) -> f64 {
    let dlat = (b_lat - a_lat).to_radians();
    let dlon = (b_lon - a_lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a_lat.to_radians().cos() * b_lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_same_point() {
        assert!(haversine_km(52.52, 13.40, 52.52, 13.40) < 1e-9);
    }

    #[test]
    fn berlin_to_london_is_about_930km() {
        let d = haversine_km(52.52, 13.40, 51.51, -0.13);
        assert!((900.0..=960.0).contains(&d), "got {d}");
    }

    #[test]
    fn antipodal_points_near_half_circumference() {
        let d = haversine_km(0.0, 0.0, 0.0, 180.0);
        assert!((d - std::f64::consts::PI * 6371.0).abs() < 1.0);
    }
}

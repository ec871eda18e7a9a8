use super::Vec2;

/// Latitude limit of the square web-mercator world.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// Projects WGS84 degrees into normalized web-mercator space.
///
/// `x` is `(lng + 180) / 360`, so one world spans `[0, 1)` and wrapped copies
/// of the world continue past either end. `y` grows southwards, `0` at the
/// northern mercator limit and `1` at the southern one.
pub fn lng_lat_to_normalized(lng_deg: f64, lat_deg: f64) -> Vec2 {
    let lat = lat_deg.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    let x = (lng_deg + 180.0) / 360.0;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / std::f64::consts::PI) / 2.0;
    Vec2::new(x, y)
}

/// Inverse of the x half of [`lng_lat_to_normalized`].
pub fn normalized_x_to_lng(x: f64) -> f64 {
    x * 360.0 - 180.0
}

#[cfg(test)]
mod tests {
    use super::{MAX_MERCATOR_LAT, lng_lat_to_normalized, normalized_x_to_lng};

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn origin_is_world_center() {
        let p = lng_lat_to_normalized(0.0, 0.0);
        assert_close(p.x, 0.5, 1e-12);
        assert_close(p.y, 0.5, 1e-12);
    }

    #[test]
    fn mercator_limits_map_to_unit_square() {
        let nw = lng_lat_to_normalized(-180.0, MAX_MERCATOR_LAT);
        let se = lng_lat_to_normalized(180.0, -90.0);
        assert_close(nw.x, 0.0, 1e-12);
        assert_close(nw.y, 0.0, 1e-9);
        assert_close(se.x, 1.0, 1e-12);
        assert_close(se.y, 1.0, 1e-9);
    }

    #[test]
    fn x_round_trips_through_longitude() {
        for lng in [-180.0, -45.5, 0.0, 179.9, 540.0] {
            let p = lng_lat_to_normalized(lng, 10.0);
            assert_close(normalized_x_to_lng(p.x), lng, 1e-9);
        }
    }
}

//! Great-circle geometry primitives shared by the task and airspace engines.
//!
//! All functions operate on WGS84 latitude/longitude in degrees, assume a
//! spherical earth with mean radius 6371 km, and are pure: no shared state,
//! no side effects. Distances are meters, bearings are degrees clockwise
//! from true north in `[0, 360)`.

/// Mean earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Calculate distance between two points using the Haversine formula
pub fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial great-circle bearing from the first point to the second
pub fn initial_bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let y = delta_lon.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * delta_lon.cos();

    normalize_deg(y.atan2(x).to_degrees())
}

/// Normalize an angle into `[0, 360)`
pub fn normalize_deg(angle: f64) -> f64 {
    let a = angle % 360.0;
    if a < 0.0 { a + 360.0 } else { a }
}

/// Calculate the angular difference between two headings in degrees
/// Returns the smallest angle between the two headings (0-180 degrees)
pub fn angular_difference_deg(angle1: f64, angle2: f64) -> f64 {
    let diff = (angle1 - angle2).abs() % 360.0;
    if diff > 180.0 { 360.0 - diff } else { diff }
}

/// Circular mean of two bearings, resolving the 0/360 discontinuity
pub fn mean_bearing_deg(b1: f64, b2: f64) -> f64 {
    let (b1, b2) = (b1.to_radians(), b2.to_radians());
    let y = b1.sin() + b2.sin();
    let x = b1.cos() + b2.cos();
    normalize_deg(y.atan2(x).to_degrees())
}

/// Cylinder test: true when the point is within `radius_m` of the center.
/// The boundary itself counts as inside.
pub fn point_in_cylinder(lat: f64, lon: f64, center_lat: f64, center_lon: f64, radius_m: f64) -> bool {
    distance_m(lat, lon, center_lat, center_lon) <= radius_m
}

/// Sector test: radial distance within `[inner_m, outer_m]` (boundaries
/// inclusive) and the bearing from the center to the point within an
/// angular window of `angle_deg` centered on `bisector_deg`. The window
/// wraps correctly across north: a bisector of 350 with an 80 degree
/// window accepts 310..360 and 0..30.
pub fn point_in_sector(
    lat: f64,
    lon: f64,
    center_lat: f64,
    center_lon: f64,
    inner_m: f64,
    outer_m: f64,
    bisector_deg: f64,
    angle_deg: f64,
) -> bool {
    let dist = distance_m(lat, lon, center_lat, center_lon);

    if dist > outer_m || dist < inner_m {
        return false;
    }

    if dist == 0.0 {
        // On the apex the bearing is undefined; the apex belongs to the sector
        return true;
    }

    let bearing = initial_bearing_deg(center_lat, center_lon, lat, lon);
    angular_difference_deg(bearing, bisector_deg) <= angle_deg / 2.0
}

/// Local east/north offset of a point relative to an origin, meters.
/// Equirectangular approximation, valid for the short ranges task and
/// airspace geometry works at.
fn local_offset_m(lat: f64, lon: f64, origin_lat: f64, origin_lon: f64) -> (f64, f64) {
    let east = (lon - origin_lon).to_radians() * origin_lat.to_radians().cos() * EARTH_RADIUS_M;
    let north = (lat - origin_lat).to_radians() * EARTH_RADIUS_M;
    (east, north)
}

/// Signed along-track projection of a point onto the axis through
/// `(axis_lat, axis_lon)` with direction `axis_bearing_deg`. Positive
/// values lie ahead of the axis origin in bearing direction.
pub fn along_track_m(lat: f64, lon: f64, axis_lat: f64, axis_lon: f64, axis_bearing_deg: f64) -> f64 {
    let (east, north) = local_offset_m(lat, lon, axis_lat, axis_lon);
    let bearing_rad = axis_bearing_deg.to_radians();
    east * bearing_rad.sin() + north * bearing_rad.cos()
}

/// Signed cross-track offset of a point from the same axis; positive to
/// the right of the bearing direction.
pub fn cross_track_m(lat: f64, lon: f64, axis_lat: f64, axis_lon: f64, axis_bearing_deg: f64) -> f64 {
    let (east, north) = local_offset_m(lat, lon, axis_lat, axis_lon);
    let bearing_rad = axis_bearing_deg.to_radians();
    east * bearing_rad.cos() - north * bearing_rad.sin()
}

/// Line-crossing test for a finite chord of `length_m` centered on
/// `(center_lat, center_lon)` and oriented perpendicular to
/// `leg_bearing_deg` (the course of the task leg the line terminates).
///
/// A crossing is a sign change of the along-track projection between the
/// previous and the current fix while the crossing stays within half the
/// chord length of the center. A fix exactly on the chord (projection 0)
/// counts as crossed.
pub fn crossed_line(
    prev_lat: f64,
    prev_lon: f64,
    lat: f64,
    lon: f64,
    center_lat: f64,
    center_lon: f64,
    leg_bearing_deg: f64,
    length_m: f64,
) -> bool {
    let before = along_track_m(prev_lat, prev_lon, center_lat, center_lon, leg_bearing_deg);
    let after = along_track_m(lat, lon, center_lat, center_lon, leg_bearing_deg);

    if before == after {
        return false;
    }

    // Sign change, or landing exactly on the chord
    if (before < 0.0) == (after < 0.0) && after != 0.0 {
        return false;
    }

    // Interpolate the crossing point and check it against the chord extent
    let t = before / (before - after);
    let cross_before = cross_track_m(prev_lat, prev_lon, center_lat, center_lon, leg_bearing_deg);
    let cross_after = cross_track_m(lat, lon, center_lat, center_lon, leg_bearing_deg);
    let cross_at = cross_before + t * (cross_after - cross_before);

    cross_at.abs() <= length_m / 2.0
}

/// Distance from a point to the great-circle segment between `a` and `b`,
/// clamped to the segment ends. Used for lateral distance to airspace
/// polygon boundaries.
pub fn distance_to_segment_m(
    lat: f64,
    lon: f64,
    a_lat: f64,
    a_lon: f64,
    b_lat: f64,
    b_lon: f64,
) -> f64 {
    let seg_len = distance_m(a_lat, a_lon, b_lat, b_lon);
    if seg_len == 0.0 {
        return distance_m(lat, lon, a_lat, a_lon);
    }

    let bearing = initial_bearing_deg(a_lat, a_lon, b_lat, b_lon);
    let along = along_track_m(lat, lon, a_lat, a_lon, bearing);

    if along <= 0.0 {
        distance_m(lat, lon, a_lat, a_lon)
    } else if along >= seg_len {
        distance_m(lat, lon, b_lat, b_lon)
    } else {
        cross_track_m(lat, lon, a_lat, a_lon, bearing).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Roughly one degree of latitude in meters
    const DEG_LAT_M: f64 = 111_195.0;

    #[test]
    fn test_distance_known_pair() {
        // Munich to Innsbruck, roughly 100 km
        let d = distance_m(48.1374, 11.5755, 47.2692, 11.4041);
        assert!((d - 96_700.0).abs() < 1_500.0, "got {d}");
    }

    #[test]
    fn test_distance_is_symmetric() {
        let d1 = distance_m(47.0, 11.0, 47.5, 11.5);
        let d2 = distance_m(47.5, 11.5, 47.0, 11.0);
        assert!((d1 - d2).abs() < 1e-6);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        assert!((initial_bearing_deg(47.0, 11.0, 48.0, 11.0) - 0.0).abs() < 0.01);
        assert!((initial_bearing_deg(47.0, 11.0, 46.0, 11.0) - 180.0).abs() < 0.01);
        assert!((initial_bearing_deg(0.0, 11.0, 0.0, 12.0) - 90.0).abs() < 0.01);
        assert!((initial_bearing_deg(0.0, 11.0, 0.0, 10.0) - 270.0).abs() < 0.01);
    }

    #[test]
    fn test_normalize_deg() {
        assert_eq!(normalize_deg(370.0), 10.0);
        assert_eq!(normalize_deg(-10.0), 350.0);
        assert_eq!(normalize_deg(0.0), 0.0);
        assert_eq!(normalize_deg(360.0), 0.0);
    }

    #[test]
    fn test_angular_difference() {
        assert_eq!(angular_difference_deg(350.0, 10.0), 20.0);
        assert_eq!(angular_difference_deg(10.0, 350.0), 20.0);
        assert_eq!(angular_difference_deg(0.0, 180.0), 180.0);
        assert_eq!(angular_difference_deg(90.0, 90.0), 0.0);
    }

    #[test]
    fn test_mean_bearing_wraps_north() {
        assert!((mean_bearing_deg(350.0, 10.0) - 0.0).abs() < 0.01);
        assert!((mean_bearing_deg(90.0, 180.0) - 135.0).abs() < 0.01);
    }

    #[test]
    fn test_cylinder_boundary_inclusive() {
        let center = (47.0, 11.0);
        // A point almost exactly 500 m north of the center
        let lat = 47.0 + 500.0 / DEG_LAT_M;
        let d = distance_m(lat, 11.0, center.0, center.1);
        assert!(point_in_cylinder(lat, 11.0, center.0, center.1, d));
        assert!(!point_in_cylinder(lat, 11.0, center.0, center.1, d - 0.5));
    }

    #[test]
    fn test_sector_accepts_inside_band_and_window() {
        // Point 2 km north of center, sector opening north
        let lat = 47.0 + 2_000.0 / DEG_LAT_M;
        assert!(point_in_sector(lat, 11.0, 47.0, 11.0, 500.0, 3_000.0, 0.0, 90.0));
        // Same point against a south-opening sector
        assert!(!point_in_sector(lat, 11.0, 47.0, 11.0, 500.0, 3_000.0, 180.0, 90.0));
        // Inside the inner radius
        let near_lat = 47.0 + 100.0 / DEG_LAT_M;
        assert!(!point_in_sector(near_lat, 11.0, 47.0, 11.0, 500.0, 3_000.0, 0.0, 90.0));
    }

    #[test]
    fn test_sector_window_wraps_north() {
        // Bisector 350 with a 80 degree window accepts 330..360 and 0..10
        let center = (47.0, 11.0);
        let offset = 2_000.0 / DEG_LAT_M;

        for bearing in [335.0_f64, 355.0, 5.0] {
            let lat = center.0 + offset * bearing.to_radians().cos();
            let lon = center.1 + offset * bearing.to_radians().sin() / center.0.to_radians().cos();
            assert!(
                point_in_sector(lat, lon, center.0, center.1, 0.0, 3_000.0, 350.0, 80.0),
                "bearing {bearing} should be inside"
            );
        }
        for bearing in [320.0_f64, 20.0, 170.0] {
            let lat = center.0 + offset * bearing.to_radians().cos();
            let lon = center.1 + offset * bearing.to_radians().sin() / center.0.to_radians().cos();
            assert!(
                !point_in_sector(lat, lon, center.0, center.1, 0.0, 3_000.0, 350.0, 80.0),
                "bearing {bearing} should be outside"
            );
        }
    }

    #[test]
    fn test_along_track_sign() {
        // Axis pointing east through (47, 11): points east are positive
        let ahead = along_track_m(47.0, 11.01, 47.0, 11.0, 90.0);
        let behind = along_track_m(47.0, 10.99, 47.0, 11.0, 90.0);
        assert!(ahead > 0.0);
        assert!(behind < 0.0);
    }

    #[test]
    fn test_crossed_line_detects_perpendicular_crossing() {
        // Leg runs east; the chord runs north-south through (47, 11).
        // Fly west-to-east across the center.
        assert!(crossed_line(
            47.0, 10.995, 47.0, 11.005, 47.0, 11.0, 90.0, 1_000.0
        ));
        // Same track but offset 2 km north misses a 1 km chord
        let off_lat = 47.0 + 2_000.0 / DEG_LAT_M;
        assert!(!crossed_line(
            off_lat, 10.995, off_lat, 11.005, 47.0, 11.0, 90.0, 1_000.0
        ));
        // Flying parallel to the chord never crosses
        assert!(!crossed_line(
            47.005, 11.001, 46.995, 11.001, 47.0, 11.0, 90.0, 1_000.0
        ));
    }

    #[test]
    fn test_crossed_line_requires_sign_change() {
        // Both fixes on the same side
        assert!(!crossed_line(
            47.0, 11.001, 47.0, 11.002, 47.0, 11.0, 90.0, 1_000.0
        ));
    }

    #[test]
    fn test_distance_to_segment() {
        // Segment running east along latitude 47, point 1 km north of its middle
        let lat = 47.0 + 1_000.0 / DEG_LAT_M;
        let d = distance_to_segment_m(lat, 11.05, 47.0, 11.0, 47.0, 11.1);
        assert!((d - 1_000.0).abs() < 20.0, "got {d}");

        // Point beyond the end clamps to the endpoint distance
        let d_end = distance_to_segment_m(47.0, 11.2, 47.0, 11.0, 47.0, 11.1);
        let expect = distance_m(47.0, 11.2, 47.0, 11.1);
        assert!((d_end - expect).abs() < 1.0);
    }
}

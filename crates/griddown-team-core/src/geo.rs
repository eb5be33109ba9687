//! Great-circle helpers for member and rally point tracking
//!
//! All functions take degrees and work in statute miles.

/// Mean Earth radius in statute miles
pub const EARTH_RADIUS_MILES: f64 = 3959.0;

const FEET_PER_MILE: f64 = 5280.0;

/// 16-point compass rose, clockwise from north
pub const COMPASS_POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// Haversine distance between two points, in miles
pub fn distance_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_MILES * c
}

/// Initial bearing from point 1 to point 2, in degrees [0, 360)
pub fn bearing_degrees(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let y = d_lon.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Quantize a bearing to the nearest of 16 compass points
pub fn compass_direction(bearing: f64) -> &'static str {
    let index = (bearing.rem_euclid(360.0) / 22.5).round() as usize % 16;
    COMPASS_POINTS[index]
}

/// Human-readable distance: feet under 0.1 mi, otherwise miles to 0.1
pub fn format_distance(miles: f64) -> String {
    if miles < 0.1 {
        format!("{} ft", (miles * FEET_PER_MILE).round() as i64)
    } else {
        format!("{:.1} mi", miles)
    }
}

/// Distance and direction from an observer to a target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub miles: f64,
    pub bearing: f64,
}

impl Fix {
    pub fn between(from: (f64, f64), to: (f64, f64)) -> Self {
        Self {
            miles: distance_miles(from.0, from.1, to.0, to.1),
            bearing: bearing_degrees(from.0, from.1, to.0, to.1),
        }
    }

    pub fn compass(&self) -> &'static str {
        compass_direction(self.bearing)
    }

    pub fn formatted(&self) -> String {
        format_distance(self.miles)
    }
}

/// Sort entries by ascending distance; entries without a fix go last
pub fn sort_by_distance<T>(entries: &mut [(T, Option<Fix>)]) {
    entries.sort_by(|a, b| match (&a.1, &b.1) {
        (Some(x), Some(y)) => x.miles.total_cmp(&y.miles),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

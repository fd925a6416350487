//! Great-circle distance and the service-area geofence.

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Inclusive bounding box covering India.
pub const INDIA_LAT: (f64, f64) = (6.5, 37.6);
pub const INDIA_LNG: (f64, f64) = (68.1, 97.4);

/// Haversine distance in meters.
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

pub fn within_india(lat: f64, lng: f64) -> bool {
    (INDIA_LAT.0..=INDIA_LAT.1).contains(&lat) && (INDIA_LNG.0..=INDIA_LNG.1).contains(&lng)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Parse `min_lng,min_lat,max_lng,max_lat`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let parts: Vec<f64> = raw
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| "bbox must be four comma-separated numbers".to_string())?;

        let [min_lng, min_lat, max_lng, max_lat] = parts[..] else {
            return Err("bbox must be min_lng,min_lat,max_lng,max_lat".to_string());
        };
        if min_lng > max_lng || min_lat > max_lat {
            return Err("bbox minimum exceeds maximum".to_string());
        }
        Ok(Self {
            min_lng,
            min_lat,
            max_lng,
            max_lat,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_same_point() {
        assert!(haversine_m(12.97, 77.59, 12.97, 77.59) < 1e-6);
    }

    #[test]
    fn known_distance_is_close() {
        // ~0.0004 deg of latitude is about 44.5 m.
        let d = haversine_m(12.9716, 77.5946, 12.9720, 77.5946);
        assert!((d - 44.5).abs() < 1.0, "got {d}");

        // Delhi to Mumbai is roughly 1150 km.
        let d = haversine_m(28.6139, 77.2090, 19.0760, 72.8777);
        assert!((1_130_000.0..1_170_000.0).contains(&d), "got {d}");
    }

    #[test]
    fn geofence_edges_are_inclusive() {
        assert!(within_india(6.5, 68.1));
        assert!(within_india(37.6, 97.4));
        assert!(!within_india(6.49, 77.0));
        assert!(!within_india(20.0, 97.5));
        assert!(!within_india(51.5, -0.12));
    }

    #[test]
    fn bbox_parses_and_validates() {
        let b = BoundingBox::parse("77.0, 12.0, 78.0, 13.0").unwrap();
        assert_eq!(b.min_lat, 12.0);
        assert_eq!(b.max_lng, 78.0);
        assert!(BoundingBox::parse("77,12,78").is_err());
        assert!(BoundingBox::parse("78,12,77,13").is_err());
        assert!(BoundingBox::parse("a,b,c,d").is_err());
    }
}

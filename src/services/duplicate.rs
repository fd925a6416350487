use crate::{
    error::AppResult,
    models::{issue, Issue},
    utils::geo::haversine_m,
};
use chrono::NaiveDateTime;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect};

pub const DUPLICATE_RADIUS_M: f64 = 50.0;
pub const DUPLICATE_WINDOW_HOURS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicateMatch {
    pub issue_id: i32,
    pub distance_m: f64,
}

/// Nearest point within `radius_m`; equal distances resolve to the lower id.
pub fn nearest_within(
    lat: f64,
    lng: f64,
    candidates: &[(i32, f64, f64)],
    radius_m: f64,
) -> Option<DuplicateMatch> {
    candidates
        .iter()
        .map(|&(id, c_lat, c_lng)| DuplicateMatch {
            issue_id: id,
            distance_m: haversine_m(lat, lng, c_lat, c_lng),
        })
        .filter(|m| m.distance_m <= radius_m)
        .min_by(|a, b| {
            a.distance_m
                .total_cmp(&b.distance_m)
                .then(a.issue_id.cmp(&b.issue_id))
        })
}

/// Same-category issues reported near `(lat, lng)` in the last two hours.
pub async fn find_duplicate<C: ConnectionTrait>(
    conn: &C,
    category: &str,
    lat: f64,
    lng: f64,
    now: NaiveDateTime,
) -> AppResult<Option<DuplicateMatch>> {
    let since = now - chrono::Duration::hours(DUPLICATE_WINDOW_HOURS);

    let candidates: Vec<(i32, Option<f64>, Option<f64>)> = Issue::find()
        .select_only()
        .column(issue::Column::Id)
        .column(issue::Column::Lat)
        .column(issue::Column::Lng)
        .filter(issue::Column::Category.eq(category))
        .filter(issue::Column::CreatedAt.gte(since))
        .filter(issue::Column::Lat.is_not_null())
        .filter(issue::Column::Lng.is_not_null())
        .into_tuple()
        .all(conn)
        .await?;

    let points: Vec<(i32, f64, f64)> = candidates
        .into_iter()
        .filter_map(|(id, lat, lng)| Some((id, lat?, lng?)))
        .collect();

    Ok(nearest_within(lat, lng, &points, DUPLICATE_RADIUS_M))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ~0.0001 deg latitude is about 11 m.
    const BASE: (f64, f64) = (12.9716, 77.5946);

    #[test]
    fn picks_nearest_not_first() {
        let candidates = [
            (1, BASE.0 + 0.0004, BASE.1), // ~44 m
            (2, BASE.0 + 0.0001, BASE.1), // ~11 m
        ];
        let m = nearest_within(BASE.0, BASE.1, &candidates, DUPLICATE_RADIUS_M).unwrap();
        assert_eq!(m.issue_id, 2);
        assert!(m.distance_m < 12.0);
    }

    #[test]
    fn outside_radius_is_ignored() {
        let candidates = [(1, BASE.0 + 0.0005, BASE.1)]; // ~55 m
        assert!(nearest_within(BASE.0, BASE.1, &candidates, DUPLICATE_RADIUS_M).is_none());
    }

    #[test]
    fn equal_distance_prefers_lower_id() {
        let candidates = [(8, BASE.0, BASE.1), (3, BASE.0, BASE.1)];
        let m = nearest_within(BASE.0, BASE.1, &candidates, DUPLICATE_RADIUS_M).unwrap();
        assert_eq!(m.issue_id, 3);
    }

    #[test]
    fn no_candidates() {
        assert!(nearest_within(BASE.0, BASE.1, &[], DUPLICATE_RADIUS_M).is_none());
    }
}

//! Great-circle proximity helpers
//!
//! Distance and bearing between two lat/lng points, radius filtering with
//! nearest-first ranking, and the linear match score used when pairing help
//! requests with nearby volunteers. Everything here is pure.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
/// Distance at which the match score reaches zero
pub const SCORE_ZERO_DISTANCE_M: f64 = 5_000.0;
/// Assumed walking speed for navigation estimates (m/s)
pub const WALKING_SPEED_MPS: f64 = 1.4;

/// A WGS84 coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and inside [-90, 90] x [-180, 180]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Anything that may carry a known position
pub trait Located {
    fn position(&self) -> Option<GeoPoint>;
}

impl Located for GeoPoint {
    fn position(&self) -> Option<GeoPoint> {
        Some(*self)
    }
}

/// Matching profile: how far to look and how many candidates to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Ordinary help requests
    Routine,
    /// SOS: tighter radius, fewer candidates
    Emergency,
}

impl MatchMode {
    pub fn radius_m(&self) -> f64 {
        match self {
            Self::Routine => 5_000.0,
            Self::Emergency => 3_000.0,
        }
    }

    pub fn limit(&self) -> usize {
        match self {
            Self::Routine => 20,
            Self::Emergency => 10,
        }
    }
}

/// A candidate paired with its distance from the reference point
#[derive(Debug, Clone, Serialize)]
pub struct Ranked<T> {
    #[serde(flatten)]
    pub item: T,
    pub distance: f64,
}

/// Haversine distance in meters
pub fn distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial bearing from `a` towards `b`, degrees clockwise from north in [0, 360)
pub fn bearing_deg(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Keep candidates strictly closer than `radius_m`, nearest first, at most `limit`.
/// Candidates without a position are skipped.
pub fn rank_within_radius<T, I>(reference: GeoPoint, candidates: I, radius_m: f64, limit: usize) -> Vec<Ranked<T>>
where
    T: Located,
    I: IntoIterator<Item = T>,
{
    let mut ranked: Vec<Ranked<T>> = candidates
        .into_iter()
        .filter_map(|item| {
            let distance = distance_m(reference, item.position()?);
            (distance < radius_m).then_some(Ranked { item, distance })
        })
        .collect();

    ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    ranked.truncate(limit);
    ranked
}

/// Rank using a predefined matching profile
pub fn rank_for_mode<T, I>(reference: GeoPoint, candidates: I, mode: MatchMode) -> Vec<Ranked<T>>
where
    T: Located,
    I: IntoIterator<Item = T>,
{
    rank_within_radius(reference, candidates, mode.radius_m(), mode.limit())
}

/// 100 at the reference point, decaying linearly to 0 at 5 km and beyond
pub fn match_score(distance_m: f64) -> f64 {
    (100.0 - distance_m / SCORE_ZERO_DISTANCE_M * 100.0).max(0.0)
}

/// Straight-line walking estimate between two points
#[derive(Debug, Clone, Serialize)]
pub struct Navigation {
    pub start: GeoPoint,
    pub end: GeoPoint,
    pub distance: f64,
    pub bearing: f64,
    pub eta_seconds: u64,
    pub distance_text: String,
    pub duration_text: String,
}

pub fn navigate(start: GeoPoint, end: GeoPoint) -> Navigation {
    let distance = distance_m(start, end);
    let eta_seconds = (distance / WALKING_SPEED_MPS) as u64;
    Navigation {
        start,
        end,
        distance,
        bearing: bearing_deg(start, end),
        eta_seconds,
        distance_text: format_distance(distance),
        duration_text: format_duration(eta_seconds),
    }
}

pub fn format_distance(distance_m: f64) -> String {
    if distance_m < 1000.0 {
        format!("{:.0} m", distance_m)
    } else {
        format!("{:.1} km", distance_m / 1000.0)
    }
}

pub fn format_duration(seconds: u64) -> String {
    match seconds {
        s if s < 60 => format!("{} s", s),
        s if s < 3600 => format!("{} min", s / 60),
        s => format!("{} h {} min", s / 3600, (s % 3600) / 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Candidate {
        id: i64,
        at: Option<GeoPoint>,
    }

    impl Located for Candidate {
        fn position(&self) -> Option<GeoPoint> {
            self.at
        }
    }

    fn candidate(id: i64, lat: f64, lng: f64) -> Candidate {
        Candidate { id, at: Some(GeoPoint::new(lat, lng)) }
    }

    #[test]
    fn test_distance_one_hundredth_degree_on_equator() {
        let d = distance_m(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.01));
        assert!((d - 1111.95).abs() < 0.5, "got {}", d);
        assert_eq!(distance_m(GeoPoint::new(31.2, 121.4), GeoPoint::new(31.2, 121.4)), 0.0);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = GeoPoint::new(0.0, 0.0);
        assert!((bearing_deg(origin, GeoPoint::new(1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((bearing_deg(origin, GeoPoint::new(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((bearing_deg(origin, GeoPoint::new(-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((bearing_deg(origin, GeoPoint::new(0.0, -1.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_radius_filter_and_score() {
        let ranked = rank_within_radius(
            GeoPoint::new(0.0, 0.0),
            vec![candidate(2, 0.0, 0.05), candidate(1, 0.0, 0.01)],
            5000.0,
            20,
        );

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].item.id, 1);
        assert_eq!(match_score(ranked[0].distance).round(), 78.0);
    }

    #[test]
    fn test_radius_is_exclusive_and_unlocated_skipped() {
        let reference = GeoPoint::new(0.0, 0.0);
        let edge = candidate(1, 0.0, 0.01);
        let exact = distance_m(reference, edge.at.unwrap());
        let unlocated = Candidate { id: 2, at: None };

        let ranked = rank_within_radius(reference, vec![edge, unlocated], exact, 10);
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_emergency_mode_limits_and_orders() {
        // 15 candidates roughly 111 m apart, shuffled
        let candidates: Vec<Candidate> = (1..=15)
            .rev()
            .map(|i| candidate(i, 0.0, 0.001 * i as f64))
            .chain(std::iter::once(candidate(99, 0.0, 0.04)))
            .collect();

        let ranked = rank_for_mode(GeoPoint::new(0.0, 0.0), candidates, MatchMode::Emergency);

        assert_eq!(ranked.len(), 10);
        let ids: Vec<i64> = ranked.iter().map(|r| r.item.id).collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
        assert!(ranked.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert!(ranked.iter().all(|r| r.distance < 3000.0));
    }

    #[test]
    fn test_routine_mode_limit() {
        let candidates: Vec<Candidate> = (1..=30).map(|i| candidate(i, 0.0, 0.0015 * i as f64)).collect();
        let ranked = rank_for_mode(GeoPoint::new(0.0, 0.0), candidates, MatchMode::Routine);
        assert_eq!(ranked.len(), 20);
        assert!(ranked.iter().all(|r| r.distance < 5000.0));
    }

    #[test]
    fn test_match_score_bounds() {
        assert_eq!(match_score(0.0), 100.0);
        assert_eq!(match_score(2500.0), 50.0);
        assert_eq!(match_score(5000.0), 0.0);
        assert_eq!(match_score(12_000.0), 0.0);
    }

    #[test]
    fn test_navigation_estimate() {
        let nav = navigate(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.01));
        assert_eq!(nav.eta_seconds, 794);
        assert_eq!(nav.distance_text, "1.1 km");
        assert_eq!(nav.duration_text, "13 min");
        assert!((nav.bearing - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_distance(850.4), "850 m");
        assert_eq!(format_duration(45), "45 s");
        assert_eq!(format_duration(3725), "1 h 2 min");
    }

    #[test]
    fn test_point_validation() {
        assert!(GeoPoint::new(39.9, 116.4).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, f64::NAN).is_valid());
    }
}

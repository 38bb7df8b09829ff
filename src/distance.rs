//! Distance metrics and the splitting hyperplanes derived from them.
//!
//! The same [`DistanceMetric`] value drives both tree construction and the
//! final exact ranking of candidates, so the tree structure always
//! approximates the distance the caller is ranked by.

use serde::{Deserialize, Serialize};

/// Distance function used for splitting and ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Straight-line distance, `sqrt(sum((a_i - b_i)^2))`.
    Euclidean,
    /// Angle-based distance, `sqrt(max(0, 2 - 2 * cos(a, b)))`.
    Angular,
}

/// A separating hyperplane stored at a split node.
///
/// An item falls on the left side when `dot(normal, v) - offset > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperplane {
    pub normal: Vec<f32>,
    pub offset: f32,
}

impl Hyperplane {
    /// Signed distance of `v` from the plane along its normal.
    #[inline]
    pub(crate) fn margin(&self, v: &[f32]) -> f32 {
        dot(&self.normal, v) - self.offset
    }
}

impl DistanceMetric {
    /// Exact, non-negative distance between two vectors of equal length.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        match self {
            DistanceMetric::Euclidean => squared_euclidean(a, b).sqrt(),
            DistanceMetric::Angular => {
                let cos = cosine(a, b);
                (2.0 - 2.0 * cos).max(0.0).sqrt()
            }
        }
    }

    /// Build the hyperplane separating the two pivot vectors.
    ///
    /// For the Euclidean metric this is the perpendicular bisector of the
    /// segment `a..b`; for the angular metric it is the plane through the
    /// origin equidistant from the normalized pivot directions.
    ///
    /// Returns `None` when the pivots are indistinguishable under the metric
    /// (identical points, or parallel directions) and no plane exists.
    pub(crate) fn split(&self, a: &[f32], b: &[f32]) -> Option<Hyperplane> {
        debug_assert_eq!(a.len(), b.len());
        match self {
            DistanceMetric::Euclidean => {
                let normal: Vec<f32> = a.iter().zip(b).map(|(x, y)| x - y).collect();
                if is_zero(&normal) {
                    return None;
                }
                // dot(normal, midpoint) == (|a|^2 - |b|^2) / 2
                let offset = (dot(a, a) - dot(b, b)) / 2.0;
                Some(Hyperplane { normal, offset })
            }
            DistanceMetric::Angular => {
                let na = dot(a, a).sqrt();
                let nb = dot(b, b).sqrt();
                if na == 0.0 || nb == 0.0 {
                    return None;
                }
                let normal: Vec<f32> = a
                    .iter()
                    .zip(b)
                    .map(|(x, y)| x / na - y / nb)
                    .collect();
                if is_zero(&normal) {
                    return None;
                }
                Some(Hyperplane {
                    normal,
                    offset: 0.0,
                })
            }
        }
    }
}

#[inline]
pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[inline]
fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let na = dot(a, a).sqrt();
    let nb = dot(b, b).sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot(a, b) / (na * nb)).clamp(-1.0, 1.0)
}

#[inline]
fn is_zero(v: &[f32]) -> bool {
    v.iter().all(|&x| x == 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_distance_matches_direct_computation() {
        let metric = DistanceMetric::Euclidean;
        assert_eq!(metric.distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(metric.distance(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn angular_distance_of_identical_directions_is_zero() {
        let metric = DistanceMetric::Angular;
        let d = metric.distance(&[1.0, 0.0], &[2.0, 0.0]);
        assert!(d.abs() < 1e-6);
    }

    #[test]
    fn angular_distance_of_orthogonal_directions() {
        let metric = DistanceMetric::Angular;
        let d = metric.distance(&[1.0, 0.0], &[0.0, 1.0]);
        assert!((d - 2.0f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn euclidean_split_bisects_the_pivots() {
        let a = [0.0, 0.0];
        let b = [2.0, 0.0];
        let plane = DistanceMetric::Euclidean.split(&a, &b).unwrap();

        // Pivots fall on opposite sides, the midpoint sits on the plane.
        assert!(plane.margin(&a) > 0.0);
        assert!(plane.margin(&b) < 0.0);
        assert!(plane.margin(&[1.0, 0.0]).abs() < 1e-6);
    }

    #[test]
    fn split_on_identical_pivots_is_degenerate() {
        let v = [1.5, -2.0, 0.25];
        assert!(DistanceMetric::Euclidean.split(&v, &v).is_none());
        assert!(DistanceMetric::Angular.split(&v, &v).is_none());
    }

    #[test]
    fn angular_split_ignores_magnitude() {
        let a = [1.0, 0.0];
        let scaled_a = [100.0, 0.0];
        assert!(DistanceMetric::Angular.split(&a, &scaled_a).is_none());

        let b = [0.0, 1.0];
        let plane = DistanceMetric::Angular.split(&a, &b).unwrap();
        assert!(plane.margin(&[3.0, 0.1]) > 0.0);
        assert!(plane.margin(&[0.1, 3.0]) < 0.0);
    }

    #[test]
    fn metric_serde_round_trip() {
        let json = serde_json::to_string(&DistanceMetric::Angular).unwrap();
        assert_eq!(json, "\"angular\"");
        let back: DistanceMetric = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DistanceMetric::Angular);
    }
}

//! 68-point face landmarks in display pixel space.
//!
//! Point order follows the iBUG 300-W convention consumed by the peripheral:
//! 0-16 jaw, 17-26 brows, 27-35 nose, 36-47 eyes, 48-67 mouth.

use crate::shared::constants::LANDMARK_COUNT;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
}

impl LandmarkPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Exactly [`LANDMARK_COUNT`] ordered points for one detected face.
#[derive(Clone, Debug, PartialEq)]
pub struct LandmarkSet {
    points: [LandmarkPoint; LANDMARK_COUNT],
}

impl LandmarkSet {
    pub fn new(points: [LandmarkPoint; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    /// Builds a set from a slice, returning `None` unless it has exactly 68 points.
    pub fn from_slice(points: &[LandmarkPoint]) -> Option<Self> {
        let points: [LandmarkPoint; LANDMARK_COUNT] = points.try_into().ok()?;
        Some(Self { points })
    }

    pub fn points(&self) -> &[LandmarkPoint; LANDMARK_COUNT] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &LandmarkPoint> {
        self.points.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn grid_points() -> Vec<LandmarkPoint> {
        (0..LANDMARK_COUNT)
            .map(|i| LandmarkPoint::new(i as f64 * 2.0, i as f64 * 3.0))
            .collect()
    }

    #[test]
    fn test_from_slice_exact_count() {
        let set = LandmarkSet::from_slice(&grid_points()).unwrap();
        assert_eq!(set.points().len(), 68);
        assert_eq!(set.points()[0], LandmarkPoint::new(0.0, 0.0));
        assert_eq!(set.points()[67], LandmarkPoint::new(134.0, 201.0));
    }

    #[rstest]
    #[case::empty(0)]
    #[case::five_point(5)]
    #[case::one_short(67)]
    #[case::one_over(69)]
    fn test_from_slice_rejects_wrong_count(#[case] n: usize) {
        let pts = vec![LandmarkPoint::default(); n];
        assert!(LandmarkSet::from_slice(&pts).is_none());
    }

    #[test]
    fn test_iter_preserves_order() {
        let set = LandmarkSet::from_slice(&grid_points()).unwrap();
        let xs: Vec<f64> = set.iter().map(|p| p.x).take(3).collect();
        assert_eq!(xs, vec![0.0, 2.0, 4.0]);
    }
}

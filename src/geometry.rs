//! Geometric asymmetry scoring
//!
//! Turns a single landmark frame into a per-frame measurement:
//! - Face: eye, eyebrow and mouth-corner asymmetry
//! - Arm: wrist drift and arm extension
//!
//! Everything here is pure. Unusable input never errors, it yields the neutral
//! score and is marked as untracked so the window does not count it toward
//! confidence.

use crate::config::AnalysisConfig;
use crate::types::{FaceFrame, FaceRegion, Joint, Landmark, PoseFrame, NEUTRAL_SCORE};
use serde::{Deserialize, Serialize};

/// Asymmetry measured on one face frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceMeasurement {
    /// Mean over the measurable regions (0-1)
    pub asymmetry: f64,
    /// Number of regions (eyes, eyebrows, mouth) that contributed
    pub regions: usize,
}

impl FaceMeasurement {
    pub fn is_tracked(&self) -> bool {
        self.regions > 0
    }
}

/// Drift and extension measured on one pose frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmMeasurement {
    pub drift: f64,
    pub strength: f64,
    /// All six arm joints cleared the confidence threshold
    pub tracked: bool,
}

impl ArmMeasurement {
    fn neutral() -> Self {
        Self {
            drift: NEUTRAL_SCORE,
            strength: NEUTRAL_SCORE,
            tracked: false,
        }
    }
}

/// Per-frame face and arm scorer
#[derive(Debug, Clone)]
pub struct GeometricAsymmetryScorer {
    min_joint_confidence: f64,
    min_mouth_points: usize,
}

impl Default for GeometricAsymmetryScorer {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl GeometricAsymmetryScorer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            min_joint_confidence: config.min_joint_confidence,
            min_mouth_points: config.min_mouth_points,
        }
    }

    /// Measure facial asymmetry on one frame
    pub fn face(&self, frame: &FaceFrame) -> FaceMeasurement {
        let mut scores = Vec::with_capacity(3);

        if let Some(eyes) =
            self.paired_region_asymmetry(frame, FaceRegion::LeftEye, FaceRegion::RightEye)
        {
            scores.push(eyes);
        }

        if let Some(mouth) = self.mouth_asymmetry(frame) {
            scores.push(mouth);
        }

        if let Some(brows) =
            self.paired_region_asymmetry(frame, FaceRegion::LeftEyebrow, FaceRegion::RightEyebrow)
        {
            scores.push(brows);
        }

        if scores.is_empty() {
            return FaceMeasurement {
                asymmetry: NEUTRAL_SCORE,
                regions: 0,
            };
        }

        FaceMeasurement {
            asymmetry: (scores.iter().sum::<f64>() / scores.len() as f64).clamp(0.0, 1.0),
            regions: scores.len(),
        }
    }

    /// Measure arm drift and extension on one frame
    pub fn arm(&self, frame: &PoseFrame) -> ArmMeasurement {
        let joint = |j: Joint| -> Option<&Landmark> {
            frame
                .joints
                .get(&j)
                .filter(|p| p.is_finite() && p.confidence > self.min_joint_confidence)
        };

        let [
            Some(left_shoulder),
            Some(right_shoulder),
            Some(left_elbow),
            Some(right_elbow),
            Some(left_wrist),
            Some(right_wrist),
        ] = Joint::ARM_JOINTS.map(joint)
        else {
            return ArmMeasurement::neutral();
        };

        let drift = ((left_wrist.y - right_wrist.y).abs() * 2.0).min(1.0);

        let left = arm_extension(left_wrist, left_elbow, left_shoulder);
        let right = arm_extension(right_wrist, right_elbow, right_shoulder);

        ArmMeasurement {
            drift,
            strength: (left + right) / 2.0,
            tracked: true,
        }
    }

    /// Height asymmetry between a left/right region pair, if both are usable
    fn paired_region_asymmetry(
        &self,
        frame: &FaceFrame,
        left: FaceRegion,
        right: FaceRegion,
    ) -> Option<f64> {
        let left_height = region_height(&finite_points(frame, left)?);
        let right_height = region_height(&finite_points(frame, right)?);

        let average = (left_height + right_height) / 2.0;
        if average > 0.0 {
            Some(((left_height - right_height).abs() / average).clamp(0.0, 1.0))
        } else {
            Some(NEUTRAL_SCORE)
        }
    }

    /// Vertical offset between the two mouth corners
    fn mouth_asymmetry(&self, frame: &FaceFrame) -> Option<f64> {
        let lips = finite_points(frame, FaceRegion::OuterLips)?;
        if lips.len() < self.min_mouth_points.max(2) {
            return None;
        }

        let left_corner = lips[0];
        let right_corner = lips[lips.len() / 2];
        Some(((left_corner.y - right_corner.y).abs() * 2.0).min(1.0))
    }
}

/// Finite points of a region, or None when the region is missing or empty
fn finite_points(frame: &FaceFrame, region: FaceRegion) -> Option<Vec<&Landmark>> {
    let points: Vec<&Landmark> = frame
        .regions
        .get(&region)?
        .iter()
        .filter(|p| p.is_finite())
        .collect();

    if points.is_empty() {
        None
    } else {
        Some(points)
    }
}

/// Vertical extent of a set of points
fn region_height(points: &[&Landmark]) -> f64 {
    let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
    max_y - min_y
}

/// How straight an arm is: 1.0 = fully extended, lower = bent
///
/// Formula: `dist(wrist, shoulder) / (dist(wrist, elbow) + dist(elbow, shoulder))`
fn arm_extension(wrist: &Landmark, elbow: &Landmark, shoulder: &Landmark) -> f64 {
    let path = wrist.distance(elbow) + elbow.distance(shoulder);
    if path <= 0.0 {
        // All three joints collapsed onto one point
        return NEUTRAL_SCORE;
    }
    (wrist.distance(shoulder) / path).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eye(top: f64, bottom: f64) -> Vec<Landmark> {
        vec![
            Landmark::at(0.30, bottom),
            Landmark::at(0.32, top),
            Landmark::at(0.34, (top + bottom) / 2.0),
        ]
    }

    fn lips(left_y: f64, right_y: f64) -> Vec<Landmark> {
        vec![
            Landmark::at(0.40, left_y),
            Landmark::at(0.45, 0.33),
            Landmark::at(0.50, 0.32),
            Landmark::at(0.60, right_y),
            Landmark::at(0.50, 0.28),
            Landmark::at(0.45, 0.29),
        ]
    }

    fn pose(left_wrist_y: f64, right_wrist_y: f64, confidence: f64) -> PoseFrame {
        PoseFrame::new(0.0)
            .with_joint(Joint::LeftShoulder, Landmark::new(0.40, 0.70, confidence))
            .with_joint(Joint::RightShoulder, Landmark::new(0.60, 0.70, confidence))
            .with_joint(Joint::LeftElbow, Landmark::new(0.25, 0.70, confidence))
            .with_joint(Joint::RightElbow, Landmark::new(0.75, 0.70, confidence))
            .with_joint(Joint::LeftWrist, Landmark::new(0.10, left_wrist_y, confidence))
            .with_joint(Joint::RightWrist, Landmark::new(0.90, right_wrist_y, confidence))
    }

    #[test]
    fn test_symmetric_face_scores_zero() {
        let frame = FaceFrame::new(0.0)
            .with_region(FaceRegion::LeftEye, eye(0.62, 0.58))
            .with_region(FaceRegion::RightEye, eye(0.62, 0.58))
            .with_region(FaceRegion::LeftEyebrow, eye(0.70, 0.68))
            .with_region(FaceRegion::RightEyebrow, eye(0.70, 0.68))
            .with_region(FaceRegion::OuterLips, lips(0.30, 0.30));

        let m = GeometricAsymmetryScorer::default().face(&frame);
        assert_eq!(m.regions, 3);
        assert!(m.asymmetry.abs() < 1e-9);
    }

    #[test]
    fn test_eye_height_asymmetry() {
        // Heights 0.04 and 0.02: |0.04 - 0.02| / 0.03 = 0.667
        let frame = FaceFrame::new(0.0)
            .with_region(FaceRegion::LeftEye, eye(0.62, 0.58))
            .with_region(FaceRegion::RightEye, eye(0.61, 0.59));

        let m = GeometricAsymmetryScorer::default().face(&frame);
        assert_eq!(m.regions, 1);
        assert!((m.asymmetry - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_flat_regions_are_neutral() {
        let flat = vec![Landmark::at(0.3, 0.6), Landmark::at(0.4, 0.6)];
        let frame = FaceFrame::new(0.0)
            .with_region(FaceRegion::LeftEyebrow, flat.clone())
            .with_region(FaceRegion::RightEyebrow, flat);

        let m = GeometricAsymmetryScorer::default().face(&frame);
        assert_eq!(m.regions, 1);
        assert_eq!(m.asymmetry, NEUTRAL_SCORE);
    }

    #[test]
    fn test_mouth_corner_drop() {
        // Corners at 0.30 and 0.20: 0.1 * 2 = 0.2
        let frame = FaceFrame::new(0.0).with_region(FaceRegion::OuterLips, lips(0.30, 0.20));
        let m = GeometricAsymmetryScorer::default().face(&frame);
        assert!((m.asymmetry - 0.2).abs() < 1e-9);

        // Large drop saturates
        let frame = FaceFrame::new(0.0).with_region(FaceRegion::OuterLips, lips(0.90, 0.10));
        assert_eq!(GeometricAsymmetryScorer::default().face(&frame).asymmetry, 1.0);
    }

    #[test]
    fn test_sparse_mouth_and_single_eye_ignored() {
        let frame = FaceFrame::new(0.0)
            .with_region(
                FaceRegion::OuterLips,
                vec![Landmark::at(0.4, 0.3), Landmark::at(0.6, 0.1)],
            )
            .with_region(FaceRegion::LeftEye, eye(0.62, 0.58));

        let m = GeometricAsymmetryScorer::default().face(&frame);
        assert_eq!(m.regions, 0);
        assert!(!m.is_tracked());
        assert_eq!(m.asymmetry, NEUTRAL_SCORE);
    }

    #[test]
    fn test_non_finite_points_dropped() {
        let mut left = eye(0.62, 0.58);
        left.push(Landmark::at(0.3, f64::NAN));
        let frame = FaceFrame::new(0.0)
            .with_region(FaceRegion::LeftEye, left)
            .with_region(FaceRegion::RightEye, eye(0.62, 0.58));

        let m = GeometricAsymmetryScorer::default().face(&frame);
        assert!(m.asymmetry.is_finite());
        assert!(m.asymmetry.abs() < 1e-9);
    }

    #[test]
    fn test_level_extended_arms() {
        let m = GeometricAsymmetryScorer::default().arm(&pose(0.70, 0.70, 0.9));
        assert!(m.tracked);
        assert!(m.drift.abs() < 1e-9);
        assert!((m.strength - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_arm_drift() {
        // Left wrist 0.15 lower: 0.15 * 2 = 0.3
        let m = GeometricAsymmetryScorer::default().arm(&pose(0.55, 0.70, 0.9));
        assert!((m.drift - 0.3).abs() < 1e-9);
        assert!(m.strength < 1.0);
        assert!(m.strength > 0.0);
    }

    #[test]
    fn test_bent_arm_lowers_strength() {
        // Wrist folded back onto the shoulder
        let frame = pose(0.70, 0.70, 0.9)
            .with_joint(Joint::LeftWrist, Landmark::new(0.40, 0.70, 0.9))
            .with_joint(Joint::RightWrist, Landmark::new(0.60, 0.70, 0.9));
        let m = GeometricAsymmetryScorer::default().arm(&frame);
        assert!(m.strength.abs() < 1e-9);
    }

    #[test]
    fn test_low_confidence_joint_gives_neutral_pair() {
        let frame =
            pose(0.30, 0.70, 0.9).with_joint(Joint::RightElbow, Landmark::new(0.75, 0.70, 0.3));
        let m = GeometricAsymmetryScorer::default().arm(&frame);
        assert!(!m.tracked);
        assert_eq!((m.drift, m.strength), (NEUTRAL_SCORE, NEUTRAL_SCORE));
    }

    #[test]
    fn test_missing_or_nan_joint_gives_neutral_pair() {
        let mut frame = pose(0.30, 0.70, 0.9);
        frame.joints.remove(&Joint::LeftWrist);
        assert!(!GeometricAsymmetryScorer::default().arm(&frame).tracked);

        let frame = pose(0.30, 0.70, 0.9)
            .with_joint(Joint::LeftShoulder, Landmark::new(0.4, 0.7, f64::NAN));
        assert!(!GeometricAsymmetryScorer::default().arm(&frame).tracked);
    }

    #[test]
    fn test_every_arm_joint_is_required() {
        let scorer = GeometricAsymmetryScorer::default();
        assert!(scorer.arm(&pose(0.30, 0.70, 0.9)).tracked);

        for joint in Joint::ARM_JOINTS {
            let mut frame = pose(0.30, 0.70, 0.9);
            frame.joints.remove(&joint);
            assert!(!scorer.arm(&frame).tracked, "{joint:?}");
        }
    }

    #[test]
    fn test_collapsed_arm_is_neutral_strength() {
        let p = Landmark::at(0.5, 0.5);
        assert_eq!(arm_extension(&p, &p, &p), NEUTRAL_SCORE);
    }
}

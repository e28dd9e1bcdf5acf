//! Per-test verdicts and overall risk aggregation
//!
//! A test's (score, confidence) pair becomes a [`TestVerdict`] through
//! [`VerdictPolicy`]; three verdicts become a [`RiskTier`] through
//! [`RiskAggregator`]. Both steps are pure.

use crate::config::{AggregationPolicy, LowConfidencePolicy, VerdictConfig, VerdictThresholds};
use crate::types::{ArmAnalysis, FaceAnalysis, RiskTier, SpeechAnalysis, TestVerdict};
use serde::{Deserialize, Serialize};

/// Turns analysis results into per-test verdicts
#[derive(Debug, Clone, Default)]
pub struct VerdictPolicy {
    thresholds: VerdictThresholds,
    low_confidence: LowConfidencePolicy,
}

impl VerdictPolicy {
    pub fn new(config: &VerdictConfig) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
            low_confidence: config.low_confidence,
        }
    }

    /// Face is abnormal when asymmetry exceeds the limit
    pub fn face(&self, analysis: &FaceAnalysis) -> TestVerdict {
        self.judge(&[analysis.asymmetry], analysis.confidence, || {
            analysis.asymmetry > self.thresholds.face_asymmetry_max
        })
    }

    /// Arm is abnormal on excess drift or weak extension
    pub fn arm(&self, analysis: &ArmAnalysis) -> TestVerdict {
        self.judge(&[analysis.drift, analysis.strength], analysis.confidence, || {
            analysis.drift > self.thresholds.arm_drift_max
                || analysis.strength < self.thresholds.arm_strength_min
        })
    }

    /// Speech is abnormal when clarity falls below the minimum
    pub fn speech(&self, analysis: &SpeechAnalysis) -> TestVerdict {
        self.judge(&[analysis.clarity], analysis.confidence, || {
            analysis.clarity < self.thresholds.speech_clarity_min
        })
    }

    fn judge(
        &self,
        scores: &[f64],
        confidence: f64,
        abnormal: impl FnOnce() -> bool,
    ) -> TestVerdict {
        if !confidence.is_finite() || scores.iter().any(|s| !s.is_finite()) {
            return TestVerdict::Inconclusive;
        }

        if confidence < self.thresholds.min_confidence {
            return match self.low_confidence {
                LowConfidencePolicy::Inconclusive => TestVerdict::Inconclusive,
                LowConfidencePolicy::Abnormal => TestVerdict::Abnormal,
            };
        }

        if abnormal() {
            TestVerdict::Abnormal
        } else {
            TestVerdict::Normal
        }
    }
}

/// Combines the three test verdicts into a risk tier
pub struct RiskAggregator;

impl RiskAggregator {
    /// Aggregate verdicts; a test that was not run counts as Normal.
    ///
    /// Two or more abnormal tests is an emergency, a single one a possible
    /// stroke. Under [`AggregationPolicy::Broad`] an inconclusive test also
    /// raises an otherwise clean screening to a possible stroke.
    pub fn aggregate(
        face: Option<TestVerdict>,
        arm: Option<TestVerdict>,
        speech: Option<TestVerdict>,
        policy: AggregationPolicy,
    ) -> RiskTier {
        let verdicts = [face, arm, speech].map(|v| v.unwrap_or(TestVerdict::Normal));
        let abnormal = verdicts.iter().filter(|v| **v == TestVerdict::Abnormal).count();
        let inconclusive = verdicts
            .iter()
            .filter(|v| **v == TestVerdict::Inconclusive)
            .count();

        match (abnormal, policy) {
            (n, _) if n >= 2 => RiskTier::Emergency,
            (1, _) => RiskTier::PossibleStroke,
            (_, AggregationPolicy::Broad) if inconclusive >= 1 => RiskTier::PossibleStroke,
            _ => RiskTier::NoStroke,
        }
    }
}

/// Verdicts in, tier out, with the user-facing wording attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub face: Option<TestVerdict>,
    pub arm: Option<TestVerdict>,
    pub speech: Option<TestVerdict>,
    pub tier: RiskTier,
    pub label: String,
    pub advice: String,
}

impl RiskAssessment {
    pub fn new(
        face: Option<TestVerdict>,
        arm: Option<TestVerdict>,
        speech: Option<TestVerdict>,
        policy: AggregationPolicy,
    ) -> Self {
        let tier = RiskAggregator::aggregate(face, arm, speech, policy);
        Self {
            face,
            arm,
            speech,
            tier,
            label: tier.label().to_string(),
            advice: tier.advice().to_string(),
        }
    }
}

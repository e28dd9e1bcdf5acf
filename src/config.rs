//! Screening configuration
//!
//! Timings, thresholds and the verdict/aggregation policies. Everything has a
//! calibrated default; a JSON document only needs to name what it overrides.

use crate::error::ScreeningError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of sessions kept in history
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Upper bound for every configured duration (seconds)
pub const MAX_DURATION_SECS: f64 = 3600.0;

/// How a test with confidence below the minimum is classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LowConfidencePolicy {
    /// Too little signal to judge
    #[default]
    Inconclusive,
    /// Treat missing signal as a positive finding
    Abnormal,
}

/// How three test verdicts are combined into a risk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Any inconclusive test escalates an otherwise normal screening to PossibleStroke
    #[default]
    Broad,
    /// Only abnormal tests raise the tier
    AbnormalOnly,
}

/// Frame analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Length of the face/arm analysis window (seconds)
    pub window_secs: f64,
    /// Joints at or below this confidence invalidate a pose frame
    pub min_joint_confidence: f64,
    /// Outer-lip contours with fewer points are ignored
    pub min_mouth_points: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_secs: 3.0,
            min_joint_confidence: 0.3,
            min_mouth_points: 4,
        }
    }
}

impl AnalysisConfig {
    pub fn window(&self) -> Duration {
        secs_to_duration(self.window_secs)
    }
}

/// Speech recognition session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Hard limit on a recording (seconds)
    pub timeout_secs: f64,
    /// Retryable backend errors tolerated before giving up
    pub max_retries: u32,
    /// Wait before reinitializing the backend, multiplied by the attempt number (seconds)
    pub retry_backoff_secs: f64,
    /// Extra settle time after teardown before the backend is rebuilt (seconds)
    pub reset_delay_secs: f64,
    /// Capacity of the command and backend event channels
    pub channel_capacity: usize,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30.0,
            max_retries: 2,
            retry_backoff_secs: 2.0,
            reset_delay_secs: 1.0,
            channel_capacity: 64,
        }
    }
}

impl RecognitionConfig {
    pub fn timeout(&self) -> Duration {
        secs_to_duration(self.timeout_secs)
    }

    /// Delay before the backend is reinitialized for the given retry attempt (1-based)
    pub fn reset_delay(&self, attempt: u32) -> Duration {
        secs_to_duration(self.retry_backoff_secs * f64::from(attempt) + self.reset_delay_secs)
    }
}

/// Per-test abnormality thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictThresholds {
    /// Below this confidence a test is not judged on its score
    pub min_confidence: f64,
    /// Face is abnormal above this asymmetry
    pub face_asymmetry_max: f64,
    /// Arm is abnormal above this drift
    pub arm_drift_max: f64,
    /// Arm is abnormal below this strength
    pub arm_strength_min: f64,
    /// Speech is abnormal below this clarity
    pub speech_clarity_min: f64,
}

impl Default for VerdictThresholds {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            face_asymmetry_max: 0.3,
            arm_drift_max: 0.4,
            arm_strength_min: 0.6,
            speech_clarity_min: 0.6,
        }
    }
}

/// Verdict thresholds plus the two policy switches
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictConfig {
    pub thresholds: VerdictThresholds,
    pub low_confidence: LowConfidencePolicy,
    pub aggregation: AggregationPolicy,
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    pub analysis: AnalysisConfig,
    pub recognition: RecognitionConfig,
    pub verdict: VerdictConfig,
    /// Sessions retained in history, oldest dropped first
    pub history_limit: usize,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            recognition: RecognitionConfig::default(),
            verdict: VerdictConfig::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl ScreeningConfig {
    /// Load and validate configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, ScreeningError> {
        let config: ScreeningConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, ScreeningError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<(), ScreeningError> {
        positive("analysis.window_secs", self.analysis.window_secs)?;
        unit_interval(
            "analysis.min_joint_confidence",
            self.analysis.min_joint_confidence,
        )?;

        positive("recognition.timeout_secs", self.recognition.timeout_secs)?;
        non_negative(
            "recognition.retry_backoff_secs",
            self.recognition.retry_backoff_secs,
        )?;
        non_negative(
            "recognition.reset_delay_secs",
            self.recognition.reset_delay_secs,
        )?;
        if self.recognition.channel_capacity == 0 {
            return Err(ScreeningError::InvalidConfig(
                "recognition.channel_capacity must be at least 1".to_string(),
            ));
        }

        let t = &self.verdict.thresholds;
        unit_interval("verdict.thresholds.min_confidence", t.min_confidence)?;
        unit_interval("verdict.thresholds.face_asymmetry_max", t.face_asymmetry_max)?;
        unit_interval("verdict.thresholds.arm_drift_max", t.arm_drift_max)?;
        unit_interval("verdict.thresholds.arm_strength_min", t.arm_strength_min)?;
        unit_interval("verdict.thresholds.speech_clarity_min", t.speech_clarity_min)?;

        if self.history_limit == 0 {
            return Err(ScreeningError::InvalidConfig(
                "history_limit must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Seconds to a duration, saturating at [`MAX_DURATION_SECS`]
///
/// Negative and NaN inputs map to zero.
fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs.min(MAX_DURATION_SECS)).unwrap_or(Duration::ZERO)
}

fn positive(name: &str, value: f64) -> Result<(), ScreeningError> {
    if value > 0.0 && value <= MAX_DURATION_SECS {
        Ok(())
    } else {
        Err(ScreeningError::InvalidConfig(format!(
            "{name} must be within (0, {MAX_DURATION_SECS}], got {value}"
        )))
    }
}

fn non_negative(name: &str, value: f64) -> Result<(), ScreeningError> {
    if (0.0..=MAX_DURATION_SECS).contains(&value) {
        Ok(())
    } else {
        Err(ScreeningError::InvalidConfig(format!(
            "{name} must be within [0, {MAX_DURATION_SECS}], got {value}"
        )))
    }
}

fn unit_interval(name: &str, value: f64) -> Result<(), ScreeningError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ScreeningError::InvalidConfig(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

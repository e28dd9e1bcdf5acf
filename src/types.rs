//! Core types for the FAST Screen scoring core
//!
//! This module defines the data that flows through each stage: landmark frames
//! and speech segments coming in from capture, per-window analyses, per-test
//! verdicts and the overall risk tier.

use crate::error::ScreeningError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Score reported when there is nothing usable to measure
pub const NEUTRAL_SCORE: f64 = 0.5;

fn full_confidence() -> f64 {
    1.0
}

/// A single 2D landmark in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    /// Detector confidence (0-1); face landmarks without one count as certain
    #[serde(default = "full_confidence")]
    pub confidence: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, confidence: f64) -> Self {
        Self { x, y, confidence }
    }

    /// Landmark with full confidence
    pub fn at(x: f64, y: f64) -> Self {
        Self::new(x, y, 1.0)
    }

    /// True when both coordinates are finite numbers
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Euclidean distance to another landmark
    pub fn distance(&self, other: &Landmark) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Facial landmark regions used for asymmetry measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceRegion {
    LeftEye,
    RightEye,
    LeftEyebrow,
    RightEyebrow,
    /// Outer lip contour; the first point and the midpoint-index point are the corners
    OuterLips,
}

/// Body-pose joints used for the arm test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
}

impl Joint {
    /// Every joint the arm measurement needs
    pub const ARM_JOINTS: [Joint; 6] = [
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
    ];
}

/// One captured frame of face landmarks, grouped by region
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaceFrame {
    /// Capture time (seconds, producer clock)
    pub timestamp: f64,
    pub regions: HashMap<FaceRegion, Vec<Landmark>>,
}

impl FaceFrame {
    pub fn new(timestamp: f64) -> Self {
        Self {
            timestamp,
            regions: HashMap::new(),
        }
    }

    /// Builder-style helper for attaching a region
    pub fn with_region(mut self, region: FaceRegion, points: Vec<Landmark>) -> Self {
        self.regions.insert(region, points);
        self
    }
}

/// One captured frame of body-pose joints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoseFrame {
    /// Capture time (seconds, producer clock)
    pub timestamp: f64,
    pub joints: HashMap<Joint, Landmark>,
}

impl PoseFrame {
    pub fn new(timestamp: f64) -> Self {
        Self {
            timestamp,
            joints: HashMap::new(),
        }
    }

    pub fn with_joint(mut self, joint: Joint, landmark: Landmark) -> Self {
        self.joints.insert(joint, landmark);
        self
    }
}

/// Voice-quality measurements a recognition backend may attach to a segment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceAnalytics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shimmer: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voicing: Option<f64>,
}

/// A unit of transcribed speech emitted by the recognition backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechSegment {
    pub text: String,
    /// Recognition confidence (0-1)
    pub confidence: f64,
    /// Offset from the start of the recording (seconds)
    pub timestamp: f64,
    /// Segment duration (seconds)
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_analytics: Option<VoiceAnalytics>,
}

impl SpeechSegment {
    pub fn new(text: impl Into<String>, confidence: f64, timestamp: f64, duration: f64) -> Self {
        Self {
            text: text.into(),
            confidence,
            timestamp,
            duration,
            voice_analytics: None,
        }
    }

    pub fn with_voice_analytics(mut self, analytics: VoiceAnalytics) -> Self {
        self.voice_analytics = Some(analytics);
        self
    }

    /// True when confidence, timestamp and duration are all finite
    pub fn is_finite(&self) -> bool {
        self.confidence.is_finite() && self.timestamp.is_finite() && self.duration.is_finite()
    }
}

/// The three FAST tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    Face,
    Arm,
    Speech,
}

impl TestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestKind::Face => "face",
            TestKind::Arm => "arm",
            TestKind::Speech => "speech",
        }
    }
}

impl std::str::FromStr for TestKind {
    type Err = ScreeningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "face" => Ok(TestKind::Face),
            "arm" => Ok(TestKind::Arm),
            "speech" => Ok(TestKind::Speech),
            other => Err(ScreeningError::ParseError(format!("unknown test: {other}"))),
        }
    }
}

/// Per-test classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestVerdict {
    Normal,
    Abnormal,
    Inconclusive,
}

impl TestVerdict {
    pub fn label(&self) -> &'static str {
        match self {
            TestVerdict::Normal => "Normal",
            TestVerdict::Abnormal => "Abnormal",
            TestVerdict::Inconclusive => "Inconclusive",
        }
    }
}

/// Overall session classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    NoStroke,
    PossibleStroke,
    Emergency,
}

impl RiskTier {
    pub fn label(&self) -> &'static str {
        match self {
            RiskTier::NoStroke => "No Stroke Detected",
            RiskTier::PossibleStroke => "Possible Stroke - Seek Medical Attention",
            RiskTier::Emergency => "Emergency - Call 911 Immediately",
        }
    }

    /// Advice shown alongside the tier
    pub fn advice(&self) -> &'static str {
        match self {
            RiskTier::NoStroke => {
                "No obvious stroke symptoms were detected. Continue to monitor for any changes."
            }
            RiskTier::PossibleStroke => {
                "A possible stroke symptom or an inconclusive test was detected. Seek medical evaluation."
            }
            RiskTier::Emergency => {
                "Multiple stroke symptoms detected. Call emergency services or go to the nearest emergency room immediately."
            }
        }
    }
}

/// Result of one face analysis window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceAnalysis {
    /// Mean asymmetry (0-1, higher = more asymmetric)
    pub asymmetry: f64,
    pub confidence: f64,
    /// Frames received during the window
    pub frames: usize,
    /// Frames with at least one measurable region
    pub valid_frames: usize,
}

impl FaceAnalysis {
    /// Result for a window that produced nothing usable
    pub fn neutral() -> Self {
        Self {
            asymmetry: NEUTRAL_SCORE,
            confidence: 0.0,
            frames: 0,
            valid_frames: 0,
        }
    }
}

/// Result of one arm analysis window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmAnalysis {
    /// Mean wrist height difference (0-1, higher = more drift)
    pub drift: f64,
    /// Mean arm extension (0-1, lower = weaker)
    pub strength: f64,
    pub confidence: f64,
    pub frames: usize,
    /// Frames where all six arm joints cleared the confidence threshold
    pub valid_frames: usize,
}

impl ArmAnalysis {
    pub fn neutral() -> Self {
        Self {
            drift: NEUTRAL_SCORE,
            strength: NEUTRAL_SCORE,
            confidence: 0.0,
            frames: 0,
            valid_frames: 0,
        }
    }
}

/// Why a start request was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum RejectReason {
    AlreadyRecording,
    Resetting,
    /// Microphone or recognition permission missing, or recognizer unavailable
    Unavailable,
    /// The backend refused to begin capturing
    BackendStart(String),
    ControllerClosed,
}

/// How a recognition session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum SpeechSessionEnd {
    /// Backend flagged a final result
    FinalResult,
    /// Caller stopped the recording
    Stopped,
    /// Hard recording timeout elapsed
    TimedOut,
    /// Non-retryable backend error
    BackendError(String),
    /// Retryable backend error with no retries left
    RetriesExhausted(String),
    /// Interrupted by a retryable backend error; the backend is being reset
    BackendReset,
    /// The start request was refused
    Rejected(RejectReason),
}

/// Result of one recognition session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechAnalysis {
    /// Final clarity (0-1, lower = less clear)
    pub clarity: f64,
    pub confidence: f64,
    /// Best transcript at the end of the session
    pub transcript: String,
    /// Word overlap between transcript and expected sentence (0-1)
    pub text_similarity: f64,
    /// Segments that contributed to the score
    pub segments: usize,
    pub end: SpeechSessionEnd,
}

impl SpeechAnalysis {
    /// Neutral result used when a session produced no segments
    pub fn neutral(transcript: String, end: SpeechSessionEnd) -> Self {
        Self {
            clarity: NEUTRAL_SCORE,
            confidence: 0.0,
            transcript,
            text_similarity: 0.0,
            segments: 0,
            end,
        }
    }

    /// Immediate completion for a refused start
    pub fn rejected(reason: RejectReason) -> Self {
        Self {
            clarity: 0.0,
            confidence: 0.0,
            transcript: String::new(),
            text_similarity: 0.0,
            segments: 0,
            end: SpeechSessionEnd::Rejected(reason),
        }
    }
}

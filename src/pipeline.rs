//! Pipeline orchestration
//!
//! This module provides the public API for FAST Screen.
//! It takes captured frames and speech segments through scoring and verdicts
//! to the overall risk tier and session history.

use crate::config::ScreeningConfig;
use crate::error::ScreeningError;
use crate::geometry::GeometricAsymmetryScorer;
use crate::risk::{RiskAssessment, VerdictPolicy};
use crate::session::{InMemorySessionRepository, Session, SessionRepository};
use crate::speech::SpeechClarityScorer;
use crate::types::{
    ArmAnalysis, FaceAnalysis, FaceFrame, PoseFrame, SpeechAnalysis, SpeechSegment,
    SpeechSessionEnd, TestKind, TestVerdict,
};
use crate::window::{analyze_face_frames, analyze_pose_frames, ArmWindow, FaceWindow};
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A test's analysis and the verdict derived from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult<A> {
    pub test: TestKind,
    pub verdict: TestVerdict,
    pub analysis: A,
}

/// Recorded speech to score offline
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechInput {
    pub segments: Vec<SpeechSegment>,
    #[serde(default)]
    pub transcript: String,
    pub expected: String,
}

/// Verdicts to combine; absent tests count as Normal
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AssessInput {
    pub face: Option<TestVerdict>,
    pub arm: Option<TestVerdict>,
    pub speech: Option<TestVerdict>,
}

/// Score a recorded face window.
///
/// # Arguments
/// * `frames_json` - JSON array of face frames captured during one window
/// * `config` - Screening configuration
///
/// # Returns
/// JSON `TestResult` with the face analysis and verdict
pub fn score_face_frames_json(
    frames_json: &str,
    config: &ScreeningConfig,
) -> Result<String, ScreeningError> {
    let frames: Vec<FaceFrame> = parse(frames_json, "face frames")?;
    let scorer = GeometricAsymmetryScorer::new(&config.analysis);
    let analysis = analyze_face_frames(&scorer, &frames);
    let verdict = VerdictPolicy::new(&config.verdict).face(&analysis);
    to_json(&TestResult {
        test: TestKind::Face,
        verdict,
        analysis,
    })
}

/// Score a recorded arm window from a JSON array of pose frames
pub fn score_pose_frames_json(
    frames_json: &str,
    config: &ScreeningConfig,
) -> Result<String, ScreeningError> {
    let frames: Vec<PoseFrame> = parse(frames_json, "pose frames")?;
    let scorer = GeometricAsymmetryScorer::new(&config.analysis);
    let analysis = analyze_pose_frames(&scorer, &frames);
    let verdict = VerdictPolicy::new(&config.verdict).arm(&analysis);
    to_json(&TestResult {
        test: TestKind::Arm,
        verdict,
        analysis,
    })
}

/// Score a finished recording.
///
/// `input_json` is a [`SpeechInput`] object: the final segment list, the
/// transcript and the sentence the user was asked to read. When the transcript
/// is omitted it is rebuilt from the segment texts.
pub fn score_speech_json(
    input_json: &str,
    config: &ScreeningConfig,
) -> Result<String, ScreeningError> {
    let input: SpeechInput = parse(input_json, "speech input")?;
    let analysis = score_speech(&input);
    let verdict = VerdictPolicy::new(&config.verdict).speech(&analysis);
    to_json(&TestResult {
        test: TestKind::Speech,
        verdict,
        analysis,
    })
}

/// Combine three verdicts into a risk assessment.
///
/// `verdicts_json` looks like `{"face": "normal", "arm": "abnormal", "speech": null}`.
pub fn assess_json(
    verdicts_json: &str,
    config: &ScreeningConfig,
) -> Result<String, ScreeningError> {
    let input: AssessInput = parse(verdicts_json, "verdicts")?;
    to_json(&RiskAssessment::new(
        input.face,
        input.arm,
        input.speech,
        config.verdict.aggregation,
    ))
}

/// Speech analysis for a completed segment list
///
/// A rebuilt transcript only uses the segments the scorer keeps.
pub fn score_speech(input: &SpeechInput) -> SpeechAnalysis {
    let transcript = if input.transcript.trim().is_empty() {
        input
            .segments
            .iter()
            .filter(|s| s.is_finite())
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        input.transcript.clone()
    };

    let score = SpeechClarityScorer::score(&input.segments, &transcript, &input.expected);
    SpeechAnalysis {
        clarity: score.clarity,
        confidence: score.confidence,
        transcript,
        text_similarity: score.text_similarity,
        segments: score.segments,
        end: SpeechSessionEnd::FinalResult,
    }
}

fn parse<T: serde::de::DeserializeOwned>(json: &str, what: &str) -> Result<T, ScreeningError> {
    serde_json::from_str(json)
        .map_err(|e| ScreeningError::ParseError(format!("invalid {what}: {e}")))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, ScreeningError> {
    Ok(serde_json::to_string(value)?)
}

/// Stateful processor for a screening session and its history.
///
/// Use this when the host runs the three tests one after another and wants the
/// results collected into a saved session.
pub struct ScreeningProcessor {
    config: ScreeningConfig,
    scorer: GeometricAsymmetryScorer,
    verdicts: VerdictPolicy,
    repository: Box<dyn SessionRepository>,
    current: Option<Session>,
}

impl Default for ScreeningProcessor {
    fn default() -> Self {
        let config = ScreeningConfig::default();
        let repository = InMemorySessionRepository::new(config.history_limit);
        Self::build(config, Box::new(repository))
    }
}

impl ScreeningProcessor {
    /// Create a processor with validated configuration and a session store
    pub fn new(
        config: ScreeningConfig,
        repository: Box<dyn SessionRepository>,
    ) -> Result<Self, ScreeningError> {
        config.validate()?;
        Ok(Self::build(config, repository))
    }

    fn build(config: ScreeningConfig, repository: Box<dyn SessionRepository>) -> Self {
        Self {
            scorer: GeometricAsymmetryScorer::new(&config.analysis),
            verdicts: VerdictPolicy::new(&config.verdict),
            config,
            repository,
            current: None,
        }
    }

    pub fn config(&self) -> &ScreeningConfig {
        &self.config
    }

    /// Scorer configured for this processor, for feeding live windows
    pub fn scorer(&self) -> &GeometricAsymmetryScorer {
        &self.scorer
    }

    /// Live face window lasting the configured analysis window
    pub fn face_window(&self) -> FaceWindow {
        FaceWindow::new(&self.config.analysis)
    }

    /// Live arm window lasting the configured analysis window
    pub fn arm_window(&self) -> ArmWindow {
        ArmWindow::new(&self.config.analysis)
    }

    /// Start a fresh session, discarding any unsaved one
    pub fn begin_session(&mut self) -> Uuid {
        let session = Session::new();
        let id = session.id;
        if self.current.replace(session).is_some() {
            info!("Discarding unsaved screening session");
        }
        id
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    fn session_mut(&mut self) -> &mut Session {
        self.current.get_or_insert_with(Session::new)
    }

    /// Record a finished face window; starts a session if none is open
    pub fn record_face(&mut self, analysis: &FaceAnalysis) -> TestVerdict {
        let verdict = self.verdicts.face(analysis);
        self.session_mut().record_face(analysis, verdict);
        verdict
    }

    pub fn record_arm(&mut self, analysis: &ArmAnalysis) -> TestVerdict {
        let verdict = self.verdicts.arm(analysis);
        self.session_mut().record_arm(analysis, verdict);
        verdict
    }

    pub fn record_speech(&mut self, analysis: &SpeechAnalysis) -> TestVerdict {
        let verdict = self.verdicts.speech(analysis);
        self.session_mut().record_speech(analysis, verdict);
        verdict
    }

    /// Score a batch of face frames and record the result
    pub fn score_face_frames(&mut self, frames: &[FaceFrame]) -> TestResult<FaceAnalysis> {
        let analysis = analyze_face_frames(&self.scorer, frames);
        let verdict = self.record_face(&analysis);
        TestResult {
            test: TestKind::Face,
            verdict,
            analysis,
        }
    }

    /// Score a batch of pose frames and record the result
    pub fn score_pose_frames(&mut self, frames: &[PoseFrame]) -> TestResult<ArmAnalysis> {
        let analysis = analyze_pose_frames(&self.scorer, frames);
        let verdict = self.record_arm(&analysis);
        TestResult {
            test: TestKind::Arm,
            verdict,
            analysis,
        }
    }

    /// Forget one test of the open session so it can be retaken
    pub fn clear_test(&mut self, test: TestKind) {
        if let Some(session) = self.current.as_mut() {
            session.clear_test(test);
        }
    }

    /// Fix the risk tier of the open session and persist it
    pub fn save_current(&mut self) -> Result<Session, ScreeningError> {
        let mut session = self.current.take().ok_or(ScreeningError::NoActiveSession)?;
        let tier = session.assess(self.config.verdict.aggregation);

        if let Err(e) = self.repository.save(session.clone()) {
            // Keep the session so the caller can retry the save
            self.current = Some(session);
            return Err(e);
        }

        info!("Saved screening session {}: {}", session.id, tier.label());
        Ok(session)
    }

    /// Saved sessions, newest first
    pub fn history(&self) -> Result<Vec<Session>, ScreeningError> {
        self.repository.load_all()
    }

    pub fn clear_history(&mut self) -> Result<(), ScreeningError> {
        self.repository.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AggregationPolicy;
    use crate::types::{FaceRegion, Joint, Landmark, RiskTier};
    use pretty_assertions::assert_eq;

    fn symmetric_face_json(frames: usize) -> String {
        let frames: Vec<FaceFrame> = (0..frames)
            .map(|i| {
                FaceFrame::new(i as f64 / 30.0)
                    .with_region(
                        FaceRegion::LeftEye,
                        vec![Landmark::at(0.3, 0.4), Landmark::at(0.35, 0.5)],
                    )
                    .with_region(
                        FaceRegion::RightEye,
                        vec![Landmark::at(0.6, 0.4), Landmark::at(0.65, 0.5)],
                    )
            })
            .collect();
        serde_json::to_string(&frames).unwrap()
    }

    fn raised_arms(frames: usize, right_wrist_y: f64) -> Vec<PoseFrame> {
        (0..frames)
            .map(|i| {
                PoseFrame::new(i as f64 / 30.0)
                    .with_joint(Joint::LeftShoulder, Landmark::new(0.4, 0.5, 0.9))
                    .with_joint(Joint::RightShoulder, Landmark::new(0.6, 0.5, 0.9))
                    .with_joint(Joint::LeftElbow, Landmark::new(0.25, 0.5, 0.9))
                    .with_joint(Joint::RightElbow, Landmark::new(0.75, 0.5, 0.9))
                    .with_joint(Joint::LeftWrist, Landmark::new(0.1, 0.5, 0.9))
                    .with_joint(Joint::RightWrist, Landmark::new(0.9, right_wrist_y, 0.9))
            })
            .collect()
    }

    #[test]
    fn test_score_face_frames_json() {
        let config = ScreeningConfig::default();
        let result = score_face_frames_json(&symmetric_face_json(12), &config).unwrap();

        let value: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert_eq!(value["test"], "face");
        assert_eq!(value["verdict"], "normal");
        assert_eq!(value["analysis"]["asymmetry"], 0.0);
        assert_eq!(value["analysis"]["confidence"], 1.0);
    }

    #[test]
    fn test_score_empty_face_window_is_inconclusive() {
        let result = score_face_frames_json("[]", &ScreeningConfig::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert_eq!(value["verdict"], "inconclusive");
        assert_eq!(value["analysis"]["asymmetry"], 0.5);
    }

    #[test]
    fn test_score_pose_frames_json_detects_drift() {
        let json = serde_json::to_string(&raised_arms(10, 0.8)).unwrap();
        let result = score_pose_frames_json(&json, &ScreeningConfig::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert_eq!(value["test"], "arm");
        assert_eq!(value["verdict"], "abnormal");
    }

    #[test]
    fn test_score_speech_json_rebuilds_transcript() {
        let input = r#"{
            "segments": [
                {"text": "the", "confidence": 0.9, "timestamp": 0.0, "duration": 0.2},
                {"text": "quick", "confidence": 0.9, "timestamp": 0.2, "duration": 0.3},
                {"text": "brown", "confidence": 0.9, "timestamp": 0.5, "duration": 0.3},
                {"text": "fox", "confidence": 0.9, "timestamp": 0.8, "duration": 0.3}
            ],
            "expected": "the quick brown fox jumps over the lazy dog"
        }"#;
        let result = score_speech_json(input, &ScreeningConfig::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&result).unwrap();

        assert_eq!(value["analysis"]["transcript"], "the quick brown fox");
        let similarity = value["analysis"]["text_similarity"].as_f64().unwrap();
        assert!((similarity - 4.0 / 9.0).abs() < 1e-12);
        // (0.9 + 4/9) / 2 ≈ 0.672
        assert_eq!(value["verdict"], "normal");
    }

    #[test]
    fn test_assess_json() {
        let config = ScreeningConfig::default();
        let result = assess_json(r#"{"face": "abnormal", "arm": "abnormal"}"#, &config).unwrap();
        let value: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert_eq!(value["tier"], "emergency");
        assert_eq!(value["speech"], serde_json::Value::Null);
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let result = score_face_frames_json("not json", &ScreeningConfig::default());
        assert!(matches!(result, Err(ScreeningError::ParseError(_))));
    }

    #[test]
    fn test_processor_full_session() {
        let mut processor = ScreeningProcessor::default();
        processor.begin_session();

        let frames: Vec<FaceFrame> = serde_json::from_str(&symmetric_face_json(10)).unwrap();
        assert_eq!(processor.score_face_frames(&frames).verdict, TestVerdict::Normal);
        assert_eq!(
            processor.score_pose_frames(&raised_arms(10, 0.5)).verdict,
            TestVerdict::Normal
        );

        let speech = score_speech(&SpeechInput {
            segments: vec![SpeechSegment::new("hello", 0.95, 0.0, 0.5)],
            transcript: "hello".to_string(),
            expected: "hello".to_string(),
        });
        assert_eq!(processor.record_speech(&speech), TestVerdict::Normal);
        assert!(processor.current_session().unwrap().is_complete());

        let saved = processor.save_current().unwrap();
        assert_eq!(saved.risk_tier, Some(RiskTier::NoStroke));
        assert!(processor.current_session().is_none());

        let history = processor.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, saved.id);

        processor.clear_history().unwrap();
        assert!(processor.history().unwrap().is_empty());
    }

    #[test]
    fn test_processor_missing_tests_and_retake() {
        let mut processor = ScreeningProcessor::default();
        processor.record_face(&FaceAnalysis::neutral());
        assert_eq!(
            processor.current_session().unwrap().face_verdict,
            Some(TestVerdict::Inconclusive)
        );

        processor.clear_test(TestKind::Face);
        let saved = processor.save_current().unwrap();
        assert_eq!(saved.risk_tier, Some(RiskTier::NoStroke));
    }

    #[test]
    fn test_processor_respects_aggregation_policy() {
        let mut config = ScreeningConfig::default();
        config.verdict.aggregation = AggregationPolicy::AbnormalOnly;
        let repository = InMemorySessionRepository::new(config.history_limit);
        let mut processor = ScreeningProcessor::new(config, Box::new(repository)).unwrap();

        processor.record_face(&FaceAnalysis::neutral());
        let saved = processor.save_current().unwrap();
        assert_eq!(saved.risk_tier, Some(RiskTier::NoStroke));
    }

    #[test]
    fn test_save_without_session() {
        let mut processor = ScreeningProcessor::default();
        assert!(matches!(
            processor.save_current(),
            Err(ScreeningError::NoActiveSession)
        ));
    }

    #[test]
    fn test_rebuilt_transcript_skips_dropped_segments() {
        let analysis = score_speech(&SpeechInput {
            segments: vec![
                SpeechSegment::new("hello", 0.9, 0.0, 0.4),
                SpeechSegment::new("there", f64::NAN, 0.4, 0.3),
            ],
            transcript: String::new(),
            expected: "hello".to_string(),
        });

        assert_eq!(analysis.transcript, "hello");
        assert_eq!(analysis.segments, 1);
        assert_eq!(analysis.text_similarity, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_processor_windows_use_configured_length() {
        let mut config = ScreeningConfig::default();
        config.analysis.window_secs = 2.0;
        let repository = InMemorySessionRepository::new(config.history_limit);
        let mut processor = ScreeningProcessor::new(config, Box::new(repository)).unwrap();

        assert_eq!(processor.face_window().length(), std::time::Duration::from_secs(2));

        let window = processor.arm_window();
        let started = tokio::time::Instant::now();
        let analysis = window.analyze().await;
        let elapsed = started.elapsed();
        assert!(elapsed >= std::time::Duration::from_secs(2));
        assert!(elapsed < std::time::Duration::from_secs(3));

        assert_eq!(processor.record_arm(&analysis), TestVerdict::Inconclusive);
    }
}

//! Screening session records and their persistence
//!
//! A [`Session`] collects the three test results as they complete. Its risk tier
//! is computed once, when the session is saved, from whatever verdicts are set
//! at that moment. Storage is behind [`SessionRepository`] so the host can plug
//! in its own store; an in-memory and a JSON-file implementation ship here.

use crate::config::{AggregationPolicy, DEFAULT_HISTORY_LIMIT};
use crate::error::ScreeningError;
use crate::risk::RiskAggregator;
use crate::types::{ArmAnalysis, FaceAnalysis, RiskTier, SpeechAnalysis, TestKind, TestVerdict};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Key the JSON store keeps the session list under
pub const SESSIONS_KEY: &str = "stroke_sessions";

/// One screening: up to three test results and the tier derived from them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,

    pub face_verdict: Option<TestVerdict>,
    pub arm_verdict: Option<TestVerdict>,
    pub speech_verdict: Option<TestVerdict>,

    pub face_asymmetry_score: Option<f64>,
    /// Older records call this the arm symmetry score
    #[serde(alias = "arm_symmetry_score")]
    pub arm_drift_score: Option<f64>,
    pub arm_strength_score: Option<f64>,
    pub speech_clarity_score: Option<f64>,

    #[serde(default)]
    pub face_confidence: Option<f64>,
    #[serde(default)]
    pub arm_confidence: Option<f64>,
    #[serde(default)]
    pub speech_confidence: Option<f64>,

    /// Set once, when the session is saved
    pub risk_tier: Option<RiskTier>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Session created at a specific time
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            face_verdict: None,
            arm_verdict: None,
            speech_verdict: None,
            face_asymmetry_score: None,
            arm_drift_score: None,
            arm_strength_score: None,
            speech_clarity_score: None,
            face_confidence: None,
            arm_confidence: None,
            speech_confidence: None,
            risk_tier: None,
        }
    }

    pub fn record_face(&mut self, analysis: &FaceAnalysis, verdict: TestVerdict) {
        self.face_verdict = Some(verdict);
        self.face_asymmetry_score = Some(analysis.asymmetry);
        self.face_confidence = Some(analysis.confidence);
    }

    pub fn record_arm(&mut self, analysis: &ArmAnalysis, verdict: TestVerdict) {
        self.arm_verdict = Some(verdict);
        self.arm_drift_score = Some(analysis.drift);
        self.arm_strength_score = Some(analysis.strength);
        self.arm_confidence = Some(analysis.confidence);
    }

    pub fn record_speech(&mut self, analysis: &SpeechAnalysis, verdict: TestVerdict) {
        self.speech_verdict = Some(verdict);
        self.speech_clarity_score = Some(analysis.clarity);
        self.speech_confidence = Some(analysis.confidence);
    }

    /// Forget one test's result so it can be run again
    pub fn clear_test(&mut self, test: TestKind) {
        match test {
            TestKind::Face => {
                self.face_verdict = None;
                self.face_asymmetry_score = None;
                self.face_confidence = None;
            }
            TestKind::Arm => {
                self.arm_verdict = None;
                self.arm_drift_score = None;
                self.arm_strength_score = None;
                self.arm_confidence = None;
            }
            TestKind::Speech => {
                self.speech_verdict = None;
                self.speech_clarity_score = None;
                self.speech_confidence = None;
            }
        }
    }

    pub fn verdict(&self, test: TestKind) -> Option<TestVerdict> {
        match test {
            TestKind::Face => self.face_verdict,
            TestKind::Arm => self.arm_verdict,
            TestKind::Speech => self.speech_verdict,
        }
    }

    /// True once all three tests have a verdict
    pub fn is_complete(&self) -> bool {
        self.face_verdict.is_some() && self.arm_verdict.is_some() && self.speech_verdict.is_some()
    }

    /// Compute and fix the risk tier.
    ///
    /// The first call decides; later calls return the stored tier unchanged.
    pub fn assess(&mut self, policy: AggregationPolicy) -> RiskTier {
        if let Some(tier) = self.risk_tier {
            return tier;
        }
        let tier = RiskAggregator::aggregate(
            self.face_verdict,
            self.arm_verdict,
            self.speech_verdict,
            policy,
        );
        self.risk_tier = Some(tier);
        tier
    }
}

/// Storage for completed sessions
pub trait SessionRepository: Send {
    /// Append a session, dropping the oldest beyond the retention limit
    fn save(&mut self, session: Session) -> Result<(), ScreeningError>;

    /// All retained sessions, newest first
    fn load_all(&self) -> Result<Vec<Session>, ScreeningError>;

    fn clear(&mut self) -> Result<(), ScreeningError>;
}

fn newest_first(mut sessions: Vec<Session>) -> Vec<Session> {
    // Reverse first so later saves win ties under the stable sort
    sessions.reverse();
    sessions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    sessions
}

fn enforce_limit(sessions: &mut Vec<Session>, limit: usize) {
    if sessions.len() > limit {
        let excess = sessions.len() - limit;
        sessions.drain(..excess);
    }
}

/// Volatile repository, mainly for tests and embedding
#[derive(Debug, Clone)]
pub struct InMemorySessionRepository {
    sessions: Vec<Session>,
    limit: usize,
}

impl Default for InMemorySessionRepository {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl InMemorySessionRepository {
    pub fn new(limit: usize) -> Self {
        Self {
            sessions: Vec::new(),
            limit: limit.max(1),
        }
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn save(&mut self, session: Session) -> Result<(), ScreeningError> {
        self.sessions.push(session);
        enforce_limit(&mut self.sessions, self.limit);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Session>, ScreeningError> {
        Ok(newest_first(self.sessions.clone()))
    }

    fn clear(&mut self) -> Result<(), ScreeningError> {
        self.sessions.clear();
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionDocument {
    #[serde(rename = "stroke_sessions", default)]
    sessions: Vec<Session>,
}

/// Repository backed by a single JSON document on disk
///
/// The document is an object holding the session list under
/// [`SESSIONS_KEY`]. A file that cannot be parsed is treated as empty history.
#[derive(Debug, Clone)]
pub struct JsonFileSessionRepository {
    path: PathBuf,
    limit: usize,
}

impl JsonFileSessionRepository {
    pub fn new(path: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            path: path.into(),
            limit: limit.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<SessionDocument, ScreeningError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No session store at {}", self.path.display());
                return Ok(SessionDocument::default());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&contents) {
            Ok(document) => Ok(document),
            Err(e) => {
                warn!(
                    "Session store {} is corrupted ({}); treating as empty",
                    self.path.display(),
                    e
                );
                Ok(SessionDocument::default())
            }
        }
    }

    fn write_document(&self, document: &SessionDocument) -> Result<(), ScreeningError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            ScreeningError::StorageError(format!(
                "failed to replace {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Throw away an unreadable store
    pub fn reset_corrupted(&mut self) -> Result<(), ScreeningError> {
        warn!("Resetting session store {}", self.path.display());
        self.clear()
    }
}

impl SessionRepository for JsonFileSessionRepository {
    fn save(&mut self, session: Session) -> Result<(), ScreeningError> {
        let mut document = self.read_document()?;
        let id = session.id;
        document.sessions.push(session);
        enforce_limit(&mut document.sessions, self.limit);
        self.write_document(&document)?;
        info!(
            "Saved session {} ({} retained)",
            id,
            document.sessions.len()
        );
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Session>, ScreeningError> {
        Ok(newest_first(self.read_document()?.sessions))
    }

    fn clear(&mut self) -> Result<(), ScreeningError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

//! Speech clarity scoring
//!
//! Reduces a segment snapshot plus the transcript and expected sentence to a
//! clarity score and a confidence:
//!
//! ```text
//! segment clarity = confidence                                  (no voice analytics)
//!                 = (confidence + normalized speaking rate) / 2 (voice analytics present)
//! final clarity   = (mean segment clarity + text similarity) / 2
//! confidence      = mean segment confidence
//! ```

use crate::types::{SpeechSegment, NEUTRAL_SCORE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Speaking rate used when a segment has no usable duration (characters per second)
const DEFAULT_SPEAKING_RATE: f64 = 1.0;

/// Speaking rate mapped to 0.0
const SLOW_RATE: f64 = 0.5;

/// Width of the rate range mapped onto 0-1
const RATE_SPAN: f64 = 1.5;

/// Clarity result for one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClarityScore {
    pub clarity: f64,
    pub confidence: f64,
    pub text_similarity: f64,
    /// Segments that contributed to the score
    pub segments: usize,
}

/// Pure scorer over segment snapshots
pub struct SpeechClarityScorer;

impl SpeechClarityScorer {
    /// Score a snapshot against the expected sentence
    pub fn score(segments: &[SpeechSegment], transcript: &str, expected: &str) -> ClarityScore {
        let text_similarity = text_similarity(transcript, expected);

        let Some((clarity, confidence, used)) = aggregate(segments) else {
            return ClarityScore {
                clarity: NEUTRAL_SCORE,
                confidence: 0.0,
                text_similarity,
                segments: 0,
            };
        };

        ClarityScore {
            clarity: ((clarity + text_similarity) / 2.0).clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            text_similarity,
            segments: used,
        }
    }

    /// Clarity of a single segment (0-1)
    pub fn segment_clarity(segment: &SpeechSegment) -> f64 {
        if !segment.confidence.is_finite() {
            return NEUTRAL_SCORE;
        }

        let mut clarity = segment.confidence;

        if segment.voice_analytics.is_some() {
            clarity = (clarity + normalized_speaking_rate(segment)) / 2.0;
        }

        clarity.clamp(0.0, 1.0)
    }
}

/// Mean clarity, mean confidence and count over the usable segments
fn aggregate(segments: &[SpeechSegment]) -> Option<(f64, f64, usize)> {
    let mut total_clarity = 0.0;
    let mut total_confidence = 0.0;
    let mut used = 0usize;

    for segment in segments.iter().filter(|s| s.is_finite()) {
        let clarity = SpeechClarityScorer::segment_clarity(segment);
        if !clarity.is_finite() {
            continue;
        }
        total_clarity += clarity;
        total_confidence += segment.confidence;
        used += 1;
    }

    if used == 0 {
        return None;
    }

    let n = used as f64;
    Some((
        (total_clarity / n).clamp(0.0, 1.0),
        (total_confidence / n).clamp(0.0, 1.0),
        used,
    ))
}

/// Characters per second, mapped so 0.5/s → 0.0 and 2.0/s → 1.0
fn normalized_speaking_rate(segment: &SpeechSegment) -> f64 {
    let rate = if segment.duration > 0.0 && segment.duration.is_finite() {
        segment.text.chars().count() as f64 / segment.duration
    } else {
        DEFAULT_SPEAKING_RATE
    };

    if !rate.is_finite() {
        return NEUTRAL_SCORE;
    }

    ((rate - SLOW_RATE) / RATE_SPAN).clamp(0.0, 1.0)
}

/// Word-overlap similarity between two sentences (0-1)
///
/// Jaccard over word multisets: repeated words count once per occurrence, so
/// "the quick brown fox" against "the quick brown fox jumps over the lazy dog"
/// is 4/9. Words are case-folded and stripped of surrounding punctuation.
/// Two empty sentences have similarity 0.0.
pub fn text_similarity(transcribed: &str, expected: &str) -> f64 {
    let transcribed = word_counts(transcribed);
    let expected = word_counts(expected);

    if transcribed.is_empty() && expected.is_empty() {
        return 0.0;
    }

    let mut intersection = 0usize;
    let mut union = 0usize;

    for (word, &count) in &transcribed {
        let other = expected.get(word).copied().unwrap_or(0);
        intersection += count.min(other);
        union += count.max(other);
    }
    for (word, &count) in &expected {
        if !transcribed.contains_key(word) {
            union += count;
        }
    }

    intersection as f64 / union as f64
}

fn word_counts(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for token in text.split_whitespace() {
        let word = token
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if !word.is_empty() {
            *counts.entry(word).or_insert(0) += 1;
        }
    }
    counts
}

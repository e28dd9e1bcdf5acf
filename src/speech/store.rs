//! Speech segment store
//!
//! Holds the latest segment list delivered by the recognition backend. The
//! backend resends its whole best transcription on every update, so the store
//! never merges: each accepted update swaps in a new immutable list, and a
//! snapshot is that list shared by reference. A snapshot can never observe a
//! half-applied replace.

use crate::types::SpeechSegment;
use log::debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Outcome of a `replace_all` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreUpdate {
    /// The store now holds this many segments
    Replaced(usize),
    /// Every incoming segment was non-finite; the previous contents were kept
    Ignored { dropped: usize },
}

/// Thread-safe holder of the current segment list
#[derive(Debug, Clone)]
pub struct SpeechSegmentStore {
    segments: Arc<Mutex<Arc<[SpeechSegment]>>>,
}

impl Default for SpeechSegmentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechSegmentStore {
    pub fn new() -> Self {
        Self {
            segments: Arc::new(Mutex::new(empty_segments())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Arc<[SpeechSegment]>> {
        self.segments.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the stored segments with the finite entries of `segments`
    ///
    /// An empty list is a valid update and empties the store. A non-empty list
    /// whose entries are all non-finite is not an update at all.
    pub fn replace_all(&self, segments: Vec<SpeechSegment>) -> StoreUpdate {
        let incoming = segments.len();
        let valid: Vec<SpeechSegment> = segments.into_iter().filter(|s| s.is_finite()).collect();
        let dropped = incoming - valid.len();

        if dropped > 0 {
            debug!("Dropped {} non-finite speech segments of {}", dropped, incoming);
        }

        if incoming > 0 && valid.is_empty() {
            return StoreUpdate::Ignored { dropped };
        }

        let count = valid.len();
        let replacement: Arc<[SpeechSegment]> = valid.into();
        *self.lock() = replacement;
        StoreUpdate::Replaced(count)
    }

    /// Consistent copy of the current segments
    pub fn snapshot(&self) -> Arc<[SpeechSegment]> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        *self.lock() = empty_segments();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn empty_segments() -> Arc<[SpeechSegment]> {
    Arc::from(Vec::<SpeechSegment>::new())
}

use std::collections::HashSet;
use std::sync::Mutex;

/// Order-preserving, de-duplicating transcript collector for one session.
///
/// Engines re-emit overlapping or corrected text for the same utterance, so
/// duplicate suppression runs against the full accepted history, keyed by
/// the lower-cased trimmed fragment. Safe for concurrent producers: the
/// live collector and late drain arrivals both append through `accept`.
#[derive(Debug, Default)]
pub struct TranscriptAccumulator {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    fragments: Vec<String>,
    seen: HashSet<String>,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a fragment; returns true if it was appended.
    ///
    /// Empty (after trimming) and previously seen fragments are ignored.
    pub fn accept(&self, fragment: &str) -> bool {
        let trimmed = fragment.trim();
        if trimmed.is_empty() {
            return false;
        }

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !inner.seen.insert(trimmed.to_lowercase()) {
            return false;
        }
        inner.fragments.push(trimmed.to_string());
        true
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .fragments
            .is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .fragments
            .len()
    }

    /// Join accepted fragments, in arrival order, with single spaces.
    pub fn finalize(&self) -> String {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .fragments
            .join(" ")
            .trim()
            .to_string()
    }
}

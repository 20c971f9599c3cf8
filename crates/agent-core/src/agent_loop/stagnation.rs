//! Trailing-window loop detector.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Which value is compared when looking for repeated decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagnationKey {
    /// Normalized action signature (kind + parameters).
    #[default]
    Normalized,
    /// Provider's raw response text, falling back to the signature when the
    /// provider does not supply one.
    Raw,
}

/// Flags the loop as stuck once the last `capacity` keys are identical.
#[derive(Debug, Clone)]
pub struct StagnationDetector {
    capacity: usize,
    window: VecDeque<String>,
}

impl StagnationDetector {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window: VecDeque::with_capacity(capacity),
        }
    }

    /// Push a key and report whether the full window is now uniform.
    pub fn observe(&mut self, key: impl Into<String>) -> bool {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(key.into());
        self.is_stuck()
    }

    pub fn is_stuck(&self) -> bool {
        if self.window.len() < self.capacity {
            return false;
        }
        match self.window.front() {
            Some(first) => self.window.iter().all(|key| key == first),
            None => false,
        }
    }

    /// Break the streak, e.g. after an iteration that produced no action.
    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Key currently repeated, if any.
    pub fn repeated_key(&self) -> Option<&str> {
        if self.is_stuck() {
            self.window.back().map(String::as_str)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_identical_keys_trip_the_detector() {
        let mut detector = StagnationDetector::new(3);
        assert!(!detector.observe("click(10,10)"));
        assert!(!detector.observe("click(10,10)"));
        assert!(detector.observe("click(10,10)"));
        assert_eq!(detector.repeated_key(), Some("click(10,10)"));
    }

    #[test]
    fn only_consecutive_repeats_count() {
        let mut detector = StagnationDetector::new(3);
        for key in ["a", "a", "b", "a", "a"] {
            assert!(!detector.observe(key));
        }
        assert!(detector.observe("a"));
    }

    #[test]
    fn window_never_exceeds_capacity() {
        let mut detector = StagnationDetector::new(3);
        for i in 0..50 {
            detector.observe(format!("key-{i}"));
            assert!(detector.len() <= 3);
        }
        assert_eq!(detector.len(), 3);
    }

    #[test]
    fn reset_breaks_the_streak() {
        let mut detector = StagnationDetector::new(3);
        detector.observe("x");
        detector.observe("x");
        detector.reset();
        assert!(detector.is_empty());
        assert!(!detector.observe("x"));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut detector = StagnationDetector::new(0);
        assert_eq!(detector.capacity(), 1);
        assert!(detector.observe("anything"));
    }
}

//! Consecutive-failure counters for the gated stages.

use serde::{Deserialize, Serialize};

use crate::core::types::{Reason, Stage};

pub const DEFAULT_MAX_FAIL_ATTEMPTS: u32 = 3;

/// Per-stage count of consecutive failures since the last success.
///
/// Counters are stage-local: recording a Verify failure never touches the
/// Review counter. The tracker is the only authority for the
/// `<stage>_fail_limit_reached` abort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptTracker {
    review: u32,
    verify: u32,
    ceiling: u32,
}

impl AttemptTracker {
    pub fn new(ceiling: u32) -> Self {
        Self {
            review: 0,
            verify: 0,
            ceiling,
        }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Current counter for a gated stage (always 0 for Generate/Done).
    pub fn get(&self, stage: Stage) -> u32 {
        match stage {
            Stage::Review => self.review,
            Stage::Verify => self.verify,
            Stage::Generate | Stage::Done => 0,
        }
    }

    /// Record a stage verdict.
    ///
    /// Success resets the counter. Failure increments it and returns the abort
    /// reason once the counter reaches the ceiling.
    pub fn record(&mut self, stage: Stage, passed: bool) -> Option<Reason> {
        let counter = match stage {
            Stage::Review => &mut self.review,
            Stage::Verify => &mut self.verify,
            Stage::Generate | Stage::Done => return None,
        };
        if passed {
            *counter = 0;
            return None;
        }
        *counter = counter.saturating_add(1);
        if *counter >= self.ceiling {
            return Reason::fail_limit(stage);
        }
        None
    }
}

impl Default for AttemptTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FAIL_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_resets_counter() {
        let mut tracker = AttemptTracker::new(3);
        assert_eq!(tracker.record(Stage::Review, false), None);
        assert_eq!(tracker.record(Stage::Review, false), None);
        assert_eq!(tracker.get(Stage::Review), 2);
        assert_eq!(tracker.record(Stage::Review, true), None);
        assert_eq!(tracker.get(Stage::Review), 0);
    }

    #[test]
    fn ceiling_triggers_stage_specific_abort() {
        let mut tracker = AttemptTracker::new(3);
        tracker.record(Stage::Verify, false);
        tracker.record(Stage::Verify, false);
        assert_eq!(
            tracker.record(Stage::Verify, false),
            Some(Reason::VerifyFailLimitReached)
        );

        let mut tracker = AttemptTracker::new(1);
        assert_eq!(
            tracker.record(Stage::Review, false),
            Some(Reason::ReviewFailLimitReached)
        );
    }

    #[test]
    fn counters_are_stage_local() {
        let mut tracker = AttemptTracker::new(10);
        for _ in 0..5 {
            tracker.record(Stage::Verify, false);
        }
        assert_eq!(tracker.get(Stage::Verify), 5);
        assert_eq!(tracker.get(Stage::Review), 0);

        tracker.record(Stage::Review, false);
        tracker.record(Stage::Review, true);
        assert_eq!(tracker.get(Stage::Verify), 5);
    }

    #[test]
    fn ungated_stages_are_ignored() {
        let mut tracker = AttemptTracker::new(1);
        assert_eq!(tracker.record(Stage::Generate, false), None);
        assert_eq!(tracker.get(Stage::Generate), 0);
    }
}

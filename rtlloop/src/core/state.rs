//! Run state owned by the orchestrator.
//!
//! Stage executors receive `&RunState` and can read everything here; only the
//! orchestrator holds it mutably, so the round counter and terminal flag move
//! exclusively through the transitions below.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::attempts::AttemptTracker;
use crate::core::types::{Reason, Stage, StageFeedback};

/// Ordered source paths written by the most recent Generate stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    paths: Vec<PathBuf>,
}

impl ArtifactSet {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Append paths not already present, keeping first-seen order.
    pub fn merge(&mut self, other: &ArtifactSet) {
        for path in &other.paths {
            if !self.paths.contains(path) {
                self.paths.push(path.clone());
            }
        }
    }
}

/// Bookkeeping for one generate/review/verify run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// 0 before the first Generate; incremented on every entry into Generate.
    round: u32,
    stage: Stage,
    last_reason: Option<Reason>,
    attempts: AttemptTracker,
    terminal: bool,
    artifacts: ArtifactSet,
    /// Every path written by any Generate in this run.
    sources: ArtifactSet,
    review_feedback: Option<StageFeedback>,
    verify_feedback: Option<StageFeedback>,
}

impl RunState {
    pub fn new(max_fail_attempts: u32) -> Self {
        Self {
            round: 0,
            stage: Stage::Generate,
            last_reason: None,
            attempts: AttemptTracker::new(max_fail_attempts),
            terminal: false,
            artifacts: ArtifactSet::default(),
            sources: ArtifactSet::default(),
            review_feedback: None,
            verify_feedback: None,
        }
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn last_reason(&self) -> Option<&Reason> {
        self.last_reason.as_ref()
    }

    pub fn attempts(&self) -> &AttemptTracker {
        &self.attempts
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn artifacts(&self) -> &ArtifactSet {
        &self.artifacts
    }

    /// Generated sources so far, in first-write order.
    ///
    /// A patch that rewrites some files (or none) keeps the rest in play for
    /// Review, Verify and the next prompt.
    pub fn sources(&self) -> &ArtifactSet {
        &self.sources
    }

    pub fn review_feedback(&self) -> Option<&StageFeedback> {
        self.review_feedback.as_ref()
    }

    pub fn verify_feedback(&self) -> Option<&StageFeedback> {
        self.verify_feedback.as_ref()
    }

    /// True once any gated stage has produced feedback for Generate to act on.
    pub fn has_feedback(&self) -> bool {
        self.review_feedback.is_some() || self.verify_feedback.is_some()
    }

    /// Enter Generate: the only place the round counter moves.
    pub(crate) fn begin_round(&mut self) -> u32 {
        self.round = self.round.saturating_add(1);
        self.round
    }

    /// Whether the round counter has exceeded `max_rounds`.
    pub fn rounds_exhausted(&self, max_rounds: u32) -> bool {
        self.round > max_rounds
    }

    pub(crate) fn attempts_mut(&mut self) -> &mut AttemptTracker {
        &mut self.attempts
    }

    pub(crate) fn set_artifacts(&mut self, artifacts: ArtifactSet) {
        self.sources.merge(&artifacts);
        self.artifacts = artifacts;
    }

    pub(crate) fn set_feedback(&mut self, stage: Stage, feedback: StageFeedback) {
        match stage {
            Stage::Review => self.review_feedback = Some(feedback),
            Stage::Verify => self.verify_feedback = Some(feedback),
            Stage::Generate | Stage::Done => {}
        }
    }

    /// Record the transition into `next`; entering `Done` sets the terminal flag.
    pub(crate) fn advance_to(&mut self, next: Stage, reason: Reason) {
        self.stage = next;
        self.last_reason = Some(reason);
        if next.is_terminal() {
            self.terminal = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SkipReason;

    #[test]
    fn new_state_starts_before_first_round() {
        let state = RunState::new(3);
        assert_eq!(state.round(), 0);
        assert_eq!(state.stage(), Stage::Generate);
        assert!(!state.is_terminal());
        assert!(state.artifacts().is_empty());
        assert!(!state.has_feedback());
    }

    #[test]
    fn begin_round_is_monotonic() {
        let mut state = RunState::new(3);
        assert_eq!(state.begin_round(), 1);
        assert_eq!(state.begin_round(), 2);
        assert!(!state.rounds_exhausted(2));
        assert_eq!(state.begin_round(), 3);
        assert!(state.rounds_exhausted(2));
    }

    #[test]
    fn entering_done_sets_terminal() {
        let mut state = RunState::new(3);
        state.advance_to(Stage::Review, Reason::Generated);
        assert!(!state.is_terminal());
        state.advance_to(Stage::Done, Reason::MaxRoundsReached);
        assert!(state.is_terminal());
        assert_eq!(state.last_reason(), Some(&Reason::MaxRoundsReached));
    }

    #[test]
    fn sources_accumulate_across_generations() {
        let mut state = RunState::new(3);
        state.set_artifacts(ArtifactSet::new(vec![
            PathBuf::from("rtl/top.v"),
            PathBuf::from("rtl/alu.v"),
        ]));
        state.set_artifacts(ArtifactSet::new(vec![PathBuf::from("rtl/top.v")]));
        assert_eq!(state.artifacts().paths(), &[PathBuf::from("rtl/top.v")]);
        state.set_artifacts(ArtifactSet::default());
        assert!(state.artifacts().is_empty());
        assert_eq!(
            state.sources().paths(),
            &[PathBuf::from("rtl/top.v"), PathBuf::from("rtl/alu.v")]
        );
    }

    #[test]
    fn feedback_is_stored_per_stage() {
        let mut state = RunState::new(3);
        state.set_feedback(
            Stage::Verify,
            StageFeedback::skipped(Stage::Verify, SkipReason::MissingReviewFeedback),
        );
        assert!(state.review_feedback().is_none());
        assert!(state.verify_feedback().is_some());
        assert!(state.has_feedback());
    }
}

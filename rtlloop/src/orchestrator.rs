//! The generate/review/verify state machine.
//!
//! The orchestrator owns the [`RunState`]. Each step invokes the executor for
//! the current stage, applies the round guard and the attempt tracker to its
//! proposed transition, and resolves the next stage from the
//! [`TransitionTable`]. Collaborator failures end the run as `Aborted`; they
//! are never returned as errors.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use serde::Serialize;
use tracing::{info, warn};

use crate::core::attempts::AttemptTracker;
use crate::core::state::{ArtifactSet, RunState};
use crate::core::transitions::TransitionTable;
use crate::core::types::{
    GenerationMode, Reason, RunStatus, SkipReason, Stage, StageFeedback, Transition,
};
use crate::errors::FlowError;
use crate::io::config::FlowConfig;
use crate::io::generator::Generator;
use crate::io::reviewer::Reviewer;
use crate::io::run_log::{RunPaths, StageRecord, record_stage};
use crate::io::verifier::Verifier;
use crate::stages::generate::{generation_mode, run_generate};
use crate::stages::review::run_review;
use crate::stages::verify::run_verify;
use crate::stages::{StageContext, StageRun};

/// Final result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub reason: Reason,
    /// Rounds entered, including a final round whose generation was skipped.
    pub rounds: u32,
    pub generate_invocations: u32,
    pub stage_invocations: u32,
    pub attempts: AttemptTracker,
    /// Paths written by the last Generate.
    pub artifacts: ArtifactSet,
    /// Every path generated during the run.
    pub sources: ArtifactSet,
    pub review_feedback: Option<StageFeedback>,
    pub verify_feedback: Option<StageFeedback>,
}

/// How a terminal reason classifies the run.
pub fn status_for(reason: &Reason) -> RunStatus {
    match reason {
        Reason::VerifyOk => RunStatus::Succeeded,
        Reason::ContractViolation(_) | Reason::ToolFailure(_) => RunStatus::Aborted,
        _ => RunStatus::Failed,
    }
}

/// Map a collaborator error onto the abort reason that ends the run.
fn abort_reason(stage: Stage, err: &anyhow::Error) -> Reason {
    match err.downcast_ref::<FlowError>() {
        Some(FlowError::Validation(detail)) => Reason::ContractViolation(detail.clone()),
        Some(FlowError::ToolInvocation(detail)) => Reason::ToolFailure(detail.clone()),
        None => Reason::ToolFailure(format!("{stage}: {err:#}")),
    }
}

/// Advisory summary fields gathered while executing one stage.
#[derive(Default)]
struct StageNotes {
    mode: Option<GenerationMode>,
    passed: Option<bool>,
    error_count: Option<usize>,
    warning_count: Option<usize>,
    edit_summary: Option<String>,
    artifacts: BTreeMap<String, PathBuf>,
}

impl StageNotes {
    fn from_feedback(feedback: &StageFeedback) -> Self {
        Self {
            passed: Some(feedback.passed),
            error_count: Some(feedback.error_count()),
            warning_count: Some(feedback.warning_count()),
            artifacts: feedback.artifacts.clone(),
            ..Self::default()
        }
    }
}

/// Stages that sit behind the round guard and the attempt tracker.
#[derive(Debug, Clone, Copy)]
enum GatedStage {
    Review,
    Verify,
}

impl GatedStage {
    fn stage(self) -> Stage {
        match self {
            GatedStage::Review => Stage::Review,
            GatedStage::Verify => Stage::Verify,
        }
    }
}

pub struct Orchestrator<'a, G, R, V> {
    config: &'a FlowConfig,
    spec: &'a str,
    table: TransitionTable,
    paths: RunPaths,
    generator: &'a G,
    reviewer: &'a R,
    verifier: &'a V,
    state: RunState,
    generate_invocations: u32,
    stage_invocations: u32,
}

impl<'a, G: Generator, R: Reviewer, V: Verifier> Orchestrator<'a, G, R, V> {
    pub fn new(
        config: &'a FlowConfig,
        spec: &'a str,
        generator: &'a G,
        reviewer: &'a R,
        verifier: &'a V,
    ) -> Self {
        Self {
            config,
            spec,
            table: TransitionTable::standard(),
            paths: RunPaths::new(&config.out_dir()),
            generator,
            reviewer,
            verifier,
            state: RunState::new(config.max_fail_attempts),
            generate_invocations: 0,
            stage_invocations: 0,
        }
    }

    /// Replace the routing table.
    pub fn with_table(mut self, table: TransitionTable) -> Self {
        self.table = table;
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    fn step_generate(&mut self) -> (Transition, StageNotes) {
        let round = self.state.begin_round();
        if self.state.rounds_exhausted(self.config.max_rounds) {
            info!(round, max_rounds = self.config.max_rounds, "round ceiling exceeded, skipping generation");
            return (
                Transition::advance(Reason::MaxRoundsReached),
                StageNotes::default(),
            );
        }

        self.generate_invocations += 1;
        let ctx = StageContext {
            config: self.config,
            paths: &self.paths,
            spec: self.spec,
        };
        match run_generate(self.generator, &self.state, &ctx) {
            Ok(run) => {
                let notes = StageNotes {
                    mode: Some(run.mode),
                    edit_summary: Some(run.edit_summary),
                    artifacts: run.logs,
                    ..StageNotes::default()
                };
                self.state.set_artifacts(run.artifacts);
                (run.transition, notes)
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "generation failed");
                let notes = StageNotes {
                    mode: Some(generation_mode(&self.state)),
                    ..StageNotes::default()
                };
                (Transition::abort(abort_reason(Stage::Generate, &err)), notes)
            }
        }
    }

    fn step_gated(&mut self, gated: GatedStage) -> (Transition, StageNotes) {
        let stage = gated.stage();
        if self.state.rounds_exhausted(self.config.max_rounds) {
            let feedback = StageFeedback::skipped(stage, SkipReason::MaxRoundsReached);
            let notes = StageNotes::from_feedback(&feedback);
            self.state.set_feedback(stage, feedback);
            return (Transition::abort(Reason::MaxRoundsReached), notes);
        }

        let ctx = StageContext {
            config: self.config,
            paths: &self.paths,
            spec: self.spec,
        };
        let result = match gated {
            GatedStage::Review => run_review(self.reviewer, &self.state, &ctx),
            GatedStage::Verify => run_verify(self.verifier, &self.state, &ctx),
        };
        match result {
            Ok(StageRun {
                feedback,
                mut transition,
            }) => {
                // A gated skip is not a verdict of the stage itself.
                if feedback.skipped.is_none()
                    && let Some(limit) = self.state.attempts_mut().record(stage, feedback.passed)
                {
                    transition = Transition::abort(limit);
                }
                let notes = StageNotes::from_feedback(&feedback);
                self.state.set_feedback(stage, feedback);
                (transition, notes)
            }
            Err(err) => {
                warn!(%stage, err = %format!("{err:#}"), "stage collaborator failed");
                (Transition::abort(abort_reason(stage, &err)), StageNotes::default())
            }
        }
    }

    /// Run the current stage and move to the next one. Returns the new stage.
    pub fn step(&mut self) -> Result<Stage> {
        let stage = self.state.stage();
        let (transition, notes) = match stage {
            Stage::Done => return Ok(stage),
            Stage::Generate => self.step_generate(),
            Stage::Review => self.step_gated(GatedStage::Review),
            Stage::Verify => self.step_gated(GatedStage::Verify),
        };
        self.stage_invocations += 1;

        let next = self.table.next(stage, transition.outcome).ok_or_else(|| {
            anyhow!(
                "no transition declared from {stage} on {}",
                transition.outcome
            )
        })?;
        let round = self.state.round();
        info!(
            round,
            %stage,
            outcome = %transition.outcome,
            reason = %transition.reason,
            %next,
            "transition"
        );

        let attempts = self.state.attempts();
        record_stage(
            &self.paths.summary_path,
            &StageRecord {
                round,
                stage,
                mode: notes.mode,
                passed: notes.passed,
                outcome: transition.outcome,
                reason: transition.reason.to_string(),
                review_attempts: attempts.get(Stage::Review),
                verify_attempts: attempts.get(Stage::Verify),
                error_count: notes.error_count,
                warning_count: notes.warning_count,
                edit_summary: notes.edit_summary,
                artifacts: notes.artifacts,
            },
        );
        self.state.advance_to(next, transition.reason);
        Ok(next)
    }

    /// Step until `Done` and summarize the run.
    pub fn run(mut self) -> Result<RunReport> {
        while !self.state.is_terminal() {
            self.step()?;
        }
        let reason = self
            .state
            .last_reason()
            .cloned()
            .ok_or_else(|| anyhow!("run finished without a reason"))?;
        let status = status_for(&reason);
        info!(?status, %reason, rounds = self.state.round(), "run finished");
        Ok(RunReport {
            status,
            reason,
            rounds: self.state.round(),
            generate_invocations: self.generate_invocations,
            stage_invocations: self.stage_invocations,
            attempts: self.state.attempts().clone(),
            artifacts: self.state.artifacts().clone(),
            sources: self.state.sources().clone(),
            review_feedback: self.state.review_feedback().cloned(),
            verify_feedback: self.state.verify_feedback().cloned(),
        })
    }
}

/// Drive one full run with the standard transition table.
pub fn run_flow<G: Generator, R: Reviewer, V: Verifier>(
    config: &FlowConfig,
    spec: &str,
    generator: &G,
    reviewer: &R,
    verifier: &V,
) -> Result<RunReport> {
    Orchestrator::new(config, spec, generator, reviewer, verifier).run()
}

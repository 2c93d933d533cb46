//! Replay orchestration
//!
//! Drives a session's steps through an injected [`StepRunner`], enforcing the
//! run state machine, the pause gate, breakpoints, per-step timeouts and
//! retry backoff. The controller is cheaply cloneable; control methods
//! (pause, resume, step, stop) act on the same run from any task.

use crate::backoff::retry_delay;
use crate::errors::ReplayError;
use crate::gate::{GateRelease, PauseGate};
use crate::types::{
    Breakpoint, ReplayOptions, ReplayProgress, ReplayResult, ReplaySession, ReplayState,
    ReplayStats, StepResult, StepStatus,
};
use chrono::Utc;
use replay_core_types::Step;
use replay_executor::{ErrorCode, StepContext, StepError, StepRunner};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Observer invoked after every finished step.
pub type ProgressCallback = Arc<dyn Fn(&ReplayProgress) + Send + Sync>;
/// Observer invoked with each step's result as it lands.
pub type StepCallback = Arc<dyn Fn(&StepResult) + Send + Sync>;
/// Observer invoked on every state transition.
pub type StateCallback = Arc<dyn Fn(ReplayState) + Send + Sync>;

enum StepRun {
    Done(StepResult),
    Aborted,
}

struct ControllerInner {
    runner: Arc<dyn StepRunner>,
    options: ReplayOptions,
    state: Mutex<ReplayState>,
    gate: PauseGate,
    cancel: Mutex<CancellationToken>,
    stats: Mutex<ReplayStats>,
    breakpoints: Mutex<Vec<Breakpoint>>,
    last_break_index: Mutex<Option<usize>>,
    progress_callbacks: Mutex<Vec<ProgressCallback>>,
    step_callbacks: Mutex<Vec<StepCallback>>,
    state_callbacks: Mutex<Vec<StateCallback>>,
}

#[derive(Clone)]
pub struct ReplayController {
    inner: Arc<ControllerInner>,
}

impl ReplayController {
    pub fn new(runner: Arc<dyn StepRunner>) -> Self {
        Self::with_options(runner, ReplayOptions::default())
    }

    pub fn with_options(runner: Arc<dyn StepRunner>, options: ReplayOptions) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                runner,
                options,
                state: Mutex::new(ReplayState::Idle),
                gate: PauseGate::new(),
                cancel: Mutex::new(CancellationToken::new()),
                stats: Mutex::new(ReplayStats::default()),
                breakpoints: Mutex::new(Vec::new()),
                last_break_index: Mutex::new(None),
                progress_callbacks: Mutex::new(Vec::new()),
                step_callbacks: Mutex::new(Vec::new()),
                state_callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn state(&self) -> ReplayState {
        *self.inner.state.lock().unwrap()
    }

    pub fn stats(&self) -> ReplayStats {
        *self.inner.stats.lock().unwrap()
    }

    pub fn reset_stats(&self) {
        self.inner.stats.lock().unwrap().reset();
    }

    pub fn add_breakpoint(&self, breakpoint: Breakpoint) {
        self.inner.breakpoints.lock().unwrap().push(breakpoint);
    }

    pub fn clear_breakpoints(&self) {
        self.inner.breakpoints.lock().unwrap().clear();
    }

    pub fn on_progress(&self, callback: ProgressCallback) {
        self.inner.progress_callbacks.lock().unwrap().push(callback);
    }

    pub fn on_step(&self, callback: StepCallback) {
        self.inner.step_callbacks.lock().unwrap().push(callback);
    }

    pub fn on_state_change(&self, callback: StateCallback) {
        self.inner.state_callbacks.lock().unwrap().push(callback);
    }

    /// Pause before the next step. The in-flight step finishes first.
    pub fn pause(&self) -> Result<(), ReplayError> {
        self.transition(ReplayState::Paused)?;
        self.inner.gate.pause();
        info!("replay paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<(), ReplayError> {
        let state = self.state();
        if state != ReplayState::Paused {
            return Err(ReplayError::NotRunning);
        }
        self.transition(ReplayState::Running)?;
        self.inner.gate.resume();
        info!("replay resumed");
        Ok(())
    }

    /// While paused, run exactly one step and stay paused.
    pub fn step_once(&self) -> Result<(), ReplayError> {
        if self.state() != ReplayState::Paused {
            return Err(ReplayError::NotRunning);
        }
        self.inner.gate.step_once();
        Ok(())
    }

    /// Abort the run. Remaining steps are recorded as skipped and the
    /// controller returns to idle.
    pub fn stop(&self) -> Result<(), ReplayError> {
        let state = self.state();
        if !matches!(state, ReplayState::Running | ReplayState::Paused) {
            return Err(ReplayError::NotRunning);
        }
        info!("replay stop requested");
        self.inner.cancel.lock().unwrap().cancel();
        self.inner.gate.cancel();
        Ok(())
    }

    /// Replay the whole session to completion, failure, or abort.
    pub async fn run(&self, session: &ReplaySession) -> Result<ReplayResult, ReplayError> {
        if session.steps.is_empty() {
            return Err(ReplayError::EmptySession(session.name.clone()));
        }
        self.begin_run()?;
        info!(session = %session.name, steps = session.steps.len(), "replay started");

        let started = Instant::now();
        let started_at = Utc::now();
        let token = self.inner.cancel.lock().unwrap().clone();
        let ctx = self.context();
        let total = session.steps.len();

        let mut results: Vec<StepResult> = Vec::with_capacity(total);
        let mut aborted = false;
        let mut any_failed = false;

        for (index, step) in session.steps.iter().enumerate() {
            if token.is_cancelled() {
                aborted = true;
                skip_rest(&mut results, &session.steps, index);
                break;
            }

            if self.should_break(step, index) {
                info!(index, step_id = %step.id, "breakpoint hit");
                // A failed pause means the run is no longer pausable
                // (stop raced us); the cancel check above catches it.
                let _ = self.pause();
            }

            match self.inner.gate.wait().await {
                GateRelease::Cancelled => {
                    aborted = true;
                    skip_rest(&mut results, &session.steps, index);
                    break;
                }
                GateRelease::Resumed | GateRelease::SingleStep => {}
            }

            if !self.inner.options.slow_motion.is_zero() {
                tokio::time::sleep(self.inner.options.slow_motion).await;
            }

            let result = match self.execute_with_retries(step, index, &ctx, &token).await {
                StepRun::Aborted => {
                    aborted = true;
                    skip_rest(&mut results, &session.steps, index);
                    break;
                }
                StepRun::Done(result) => result,
            };

            let failed = result.status == StepStatus::Failed;
            any_failed |= failed;
            self.inner.stats.lock().unwrap().record(&result);
            self.emit_step(&result);
            results.push(result);
            self.emit_progress(session, index, total, &results, started);

            if failed && !self.inner.options.continue_on_failure {
                warn!(index, step_id = %step.id, "aborting run on step failure");
                skip_rest(&mut results, &session.steps, index + 1);
                break;
            }

            if !self.inner.options.step_delay.is_zero() && index + 1 < total {
                tokio::time::sleep(self.inner.options.step_delay).await;
            }
        }

        for skipped in results.iter().filter(|r| r.status == StepStatus::Skipped) {
            self.inner.stats.lock().unwrap().record(skipped);
        }

        let final_state = if aborted {
            ReplayState::Idle
        } else if any_failed {
            ReplayState::Failed
        } else {
            ReplayState::Completed
        };
        self.finalize(final_state);
        self.inner.stats.lock().unwrap().runs += 1;

        info!(state = %final_state, "replay finished");
        let first_error = results
            .iter()
            .find(|r| r.status == StepStatus::Failed)
            .and_then(|r| r.error.clone());
        let stopped_at = results
            .iter()
            .find(|r| r.status == StepStatus::Skipped)
            .map(|r| r.index);
        Ok(ReplayResult {
            session_id: session.id.clone(),
            success: !aborted && !any_failed,
            final_state,
            results,
            stats: self.stats(),
            first_error,
            stopped_early: stopped_at.is_some(),
            stopped_at,
            duration: started.elapsed(),
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn context(&self) -> StepContext {
        let mut ctx = StepContext::new();
        ctx.data = self.inner.options.data.clone();
        ctx
    }

    fn begin_run(&self) -> Result<(), ReplayError> {
        {
            let mut state = self.inner.state.lock().unwrap();
            match *state {
                ReplayState::Running | ReplayState::Paused => {
                    return Err(ReplayError::AlreadyRunning)
                }
                // Completed re-runs through idle; failed re-runs directly.
                ReplayState::Completed | ReplayState::Idle | ReplayState::Failed => {
                    *state = ReplayState::Running
                }
            }
        }
        self.inner.gate.reset();
        *self.inner.cancel.lock().unwrap() = CancellationToken::new();
        *self.inner.last_break_index.lock().unwrap() = None;
        self.notify_state(ReplayState::Running);
        Ok(())
    }

    fn transition(&self, to: ReplayState) -> Result<(), ReplayError> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if !state.can_transition(to) {
                return Err(ReplayError::InvalidTransition {
                    from: state.to_string(),
                    to: to.to_string(),
                });
            }
            debug!(from = %*state, to = %to, "state transition");
            *state = to;
        }
        self.notify_state(to);
        Ok(())
    }

    /// Route to `to` through the transition table, bridging via Running when
    /// the run ends while paused.
    fn finalize(&self, to: ReplayState) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if *state == ReplayState::Paused && !state.can_transition(to) {
                *state = ReplayState::Running;
            }
            if !state.can_transition(to) {
                warn!(from = %*state, to = %to, "unexpected final transition");
            }
            *state = to;
        }
        self.notify_state(to);
    }

    fn notify_state(&self, state: ReplayState) {
        let callbacks = self.inner.state_callbacks.lock().unwrap();
        for callback in callbacks.iter() {
            callback(state);
        }
    }

    fn should_break(&self, step: &Step, index: usize) -> bool {
        let breakpoints = self.inner.breakpoints.lock().unwrap();
        if !breakpoints.iter().any(|b| b.matches(step, index)) {
            return false;
        }
        // Do not re-trigger on the index we already broke at (single-step
        // and resume would otherwise never get past it).
        let mut last = self.inner.last_break_index.lock().unwrap();
        if *last == Some(index) {
            return false;
        }
        *last = Some(index);
        true
    }

    async fn execute_with_retries(
        &self,
        step: &Step,
        index: usize,
        ctx: &StepContext,
        token: &CancellationToken,
    ) -> StepRun {
        let options = &self.inner.options;
        let per_step_attempts = step
            .metadata
            .as_ref()
            .and_then(|m| m.retry_attempts)
            .unwrap_or(options.retry_attempts);
        let max_attempts = per_step_attempts + 1;
        let started_at = Utc::now();
        let started = Instant::now();
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = retry_delay(
                    options.retry_base_delay,
                    options.retry_max_delay,
                    attempt - 1,
                );
                debug!(index, attempt, ?delay, "retrying step");
                tokio::select! {
                    _ = token.cancelled() => return StepRun::Aborted,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let attempt_result = tokio::select! {
                _ = token.cancelled() => return StepRun::Aborted,
                timed = tokio::time::timeout(
                    options.step_timeout,
                    self.inner.runner.run_step(step, ctx),
                ) => timed,
            };

            match attempt_result {
                Ok(execution) if execution.success => {
                    let (locator_used, confidence) = execution
                        .resolution
                        .map(|r| (Some(r.best.strategy), Some(r.best.confidence)))
                        .unwrap_or((None, None));
                    return StepRun::Done(StepResult {
                        step_id: step.id.clone(),
                        index,
                        status: StepStatus::Passed,
                        attempts: attempt,
                        error: None,
                        locator_used,
                        confidence,
                        duration: started.elapsed(),
                        started_at,
                    });
                }
                Ok(execution) => {
                    last_error = execution.error.map(|e| e.to_string());
                }
                Err(_) => {
                    last_error = Some(
                        StepError::new(
                            ErrorCode::Timeout,
                            format!(
                                "step timed out after {}ms",
                                options.step_timeout.as_millis()
                            ),
                        )
                        .to_string(),
                    );
                }
            }
        }

        StepRun::Done(StepResult {
            step_id: step.id.clone(),
            index,
            status: StepStatus::Failed,
            attempts: max_attempts,
            error: last_error,
            locator_used: None,
            confidence: None,
            duration: started.elapsed(),
            started_at,
        })
    }

    fn emit_step(&self, result: &StepResult) {
        let callbacks = self.inner.step_callbacks.lock().unwrap();
        for callback in callbacks.iter() {
            callback(result);
        }
    }

    fn emit_progress(
        &self,
        session: &ReplaySession,
        index: usize,
        total: usize,
        results: &[StepResult],
        started: Instant,
    ) {
        let completed_steps = results
            .iter()
            .filter(|r| r.status == StepStatus::Passed)
            .count();
        let failed_steps = results
            .iter()
            .filter(|r| r.status == StepStatus::Failed)
            .count();
        let attempted = results.len();
        let elapsed = started.elapsed();
        let estimated_remaining = (attempted > 0).then(|| {
            let per_step = elapsed / attempted as u32;
            per_step * (total - attempted) as u32
        });
        let progress = ReplayProgress {
            session_id: session.id.clone(),
            state: self.state(),
            current_index: index,
            total_steps: total,
            completed_steps,
            failed_steps,
            percentage: attempted as f64 / total as f64 * 100.0,
            elapsed,
            estimated_remaining,
            stats: self.stats(),
        };
        let callbacks = self.inner.progress_callbacks.lock().unwrap();
        for callback in callbacks.iter() {
            callback(&progress);
        }
    }
}

fn skip_rest(results: &mut Vec<StepResult>, steps: &[Step], from: usize) {
    for (index, step) in steps.iter().enumerate().skip(from) {
        results.push(StepResult::skipped(step, index));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::SimulatedStepRunner;
    use crate::types::TestRun;
    use replay_core_types::LocatorBundle;
    use std::time::Duration;

    fn five_step_session() -> ReplaySession {
        let steps = (1..=5)
            .map(|i| {
                Step::click(LocatorBundle::new().with_id(format!("el-{i}")))
                    .with_id(format!("s{i}"))
            })
            .collect();
        ReplaySession::new("five-steps", steps)
    }

    fn quick_options() -> ReplayOptions {
        ReplayOptions::default()
            .with_retry_attempts(2)
            .with_retry_delays(Duration::from_millis(1), Duration::from_millis(4))
            .with_step_timeout(Duration::from_secs(1))
    }

    fn controller(runner: Arc<SimulatedStepRunner>, options: ReplayOptions) -> ReplayController {
        ReplayController::with_options(runner, options)
    }

    #[tokio::test]
    async fn clean_run_completes() {
        let runner = Arc::new(SimulatedStepRunner::new());
        let ctrl = controller(Arc::clone(&runner), quick_options());

        let result = ctrl.run(&five_step_session()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.final_state, ReplayState::Completed);
        assert_eq!(result.results.len(), 5);
        assert!(result
            .results
            .iter()
            .all(|r| r.status == StepStatus::Passed && r.attempts == 1));
        assert_eq!(ctrl.state(), ReplayState::Completed);
        assert_eq!(ctrl.stats().steps_passed, 5);
    }

    #[tokio::test]
    async fn failure_aborts_and_skips_the_rest() {
        let runner = Arc::new(SimulatedStepRunner::new());
        runner.always_fail("s3");
        let ctrl = controller(Arc::clone(&runner), quick_options());

        let result = ctrl.run(&five_step_session()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.final_state, ReplayState::Failed);

        let statuses: Vec<StepStatus> = result.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                StepStatus::Passed,
                StepStatus::Passed,
                StepStatus::Failed,
                StepStatus::Skipped,
                StepStatus::Skipped,
            ]
        );
        // 2 retries after the first attempt.
        assert_eq!(result.results[2].attempts, 3);
        assert_eq!(runner.calls().len(), 2 + 3);
        assert_eq!(ctrl.stats().steps_skipped, 2);

        assert!(result.stopped_early);
        assert_eq!(result.stopped_at, Some(3));
        assert!(result
            .first_error
            .as_deref()
            .unwrap()
            .contains("scripted failure"));
    }

    #[tokio::test]
    async fn continue_on_failure_runs_everything() {
        let runner = Arc::new(SimulatedStepRunner::new());
        runner.always_fail("s3");
        let ctrl = controller(
            Arc::clone(&runner),
            quick_options().continuing_on_failure(),
        );

        let result = ctrl.run(&five_step_session()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.final_state, ReplayState::Failed);
        assert_eq!(
            result
                .results
                .iter()
                .filter(|r| r.status == StepStatus::Passed)
                .count(),
            4
        );
        assert!(!result
            .results
            .iter()
            .any(|r| r.status == StepStatus::Skipped));
        assert!(!result.stopped_early);
        assert_eq!(result.stopped_at, None);
    }

    #[tokio::test]
    async fn continue_on_failure_attempts_every_step_when_the_tail_fails() {
        let runner = Arc::new(SimulatedStepRunner::new());
        runner.always_fail("s3");
        runner.always_fail("s4");
        runner.always_fail("s5");
        let ctrl = controller(
            Arc::clone(&runner),
            quick_options().continuing_on_failure(),
        );

        let result = ctrl.run(&five_step_session()).await.unwrap();
        assert_eq!(result.results.len(), 5);
        assert_eq!(
            result
                .results
                .iter()
                .filter(|r| r.status == StepStatus::Failed)
                .count(),
            3
        );
        assert_eq!(ctrl.stats().steps_executed, 5);
        assert_eq!(ctrl.stats().steps_failed, 3);
    }

    #[tokio::test]
    async fn flaky_step_passes_on_retry() {
        let runner = Arc::new(SimulatedStepRunner::new());
        runner.fail_times("s2", 1);
        let ctrl = controller(Arc::clone(&runner), quick_options());

        let result = ctrl.run(&five_step_session()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.results[1].attempts, 2);
        assert_eq!(ctrl.stats().retries, 1);
    }

    #[tokio::test]
    async fn step_timeout_counts_as_failure() {
        let runner =
            Arc::new(SimulatedStepRunner::new().with_delay(Duration::from_millis(50)));
        let options = quick_options()
            .with_retry_attempts(0)
            .with_step_timeout(Duration::from_millis(5));
        let ctrl = controller(runner, options);

        let result = ctrl.run(&five_step_session()).await.unwrap();
        assert!(!result.success);
        let failed = &result.results[0];
        assert_eq!(failed.status, StepStatus::Failed);
        assert!(failed.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn pause_and_resume_mid_run() {
        let runner =
            Arc::new(SimulatedStepRunner::new().with_delay(Duration::from_millis(10)));
        let ctrl = controller(Arc::clone(&runner), quick_options());

        let handle = {
            let ctrl = ctrl.clone();
            let session = five_step_session();
            tokio::spawn(async move { ctrl.run(&session).await.unwrap() })
        };

        tokio::time::sleep(Duration::from_millis(15)).await;
        ctrl.pause().unwrap();
        assert_eq!(ctrl.state(), ReplayState::Paused);

        let calls_at_pause = runner.calls().len();
        tokio::time::sleep(Duration::from_millis(50)).await;
        // At most the in-flight step finished; nothing new started.
        assert!(runner.calls().len() <= calls_at_pause + 1);

        ctrl.resume().unwrap();
        let result = handle.await.unwrap();
        assert!(result.success);
        assert_eq!(result.results.len(), 5);
    }

    #[tokio::test]
    async fn stop_aborts_to_idle() {
        let runner =
            Arc::new(SimulatedStepRunner::new().with_delay(Duration::from_millis(10)));
        let ctrl = controller(runner, quick_options());

        let handle = {
            let ctrl = ctrl.clone();
            let session = five_step_session();
            tokio::spawn(async move { (session.clone(), ctrl.run(&session).await.unwrap()) })
        };

        tokio::time::sleep(Duration::from_millis(15)).await;
        ctrl.stop().unwrap();

        let (session, result) = handle.await.unwrap();
        assert!(!result.success);
        assert_eq!(result.final_state, ReplayState::Idle);
        assert_eq!(ctrl.state(), ReplayState::Idle);
        assert!(result
            .results
            .iter()
            .any(|r| r.status == StepStatus::Skipped));

        let run = TestRun::from_result(&session, &result);
        assert_eq!(run.status, crate::types::RunStatus::Stopped);
    }

    #[tokio::test]
    async fn breakpoint_pauses_then_single_steps() {
        let runner = Arc::new(SimulatedStepRunner::new());
        let ctrl = controller(Arc::clone(&runner), quick_options());
        ctrl.add_breakpoint(Breakpoint::at_index(2));

        let handle = {
            let ctrl = ctrl.clone();
            let session = five_step_session();
            tokio::spawn(async move { ctrl.run(&session).await.unwrap() })
        };

        // Wait for the breakpoint to trip.
        for _ in 0..100 {
            if ctrl.state() == ReplayState::Paused {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(ctrl.state(), ReplayState::Paused);
        assert_eq!(runner.calls().len(), 2, "paused before the matching step");

        ctrl.step_once().unwrap();
        for _ in 0..100 {
            if runner.calls().len() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(runner.calls().len(), 3);
        assert_eq!(ctrl.state(), ReplayState::Paused);

        ctrl.resume().unwrap();
        let result = handle.await.unwrap();
        assert!(result.success);
        assert_eq!(result.results.len(), 5);
    }

    #[tokio::test]
    async fn control_methods_require_a_run() {
        let ctrl = controller(Arc::new(SimulatedStepRunner::new()), quick_options());
        assert!(matches!(
            ctrl.pause(),
            Err(ReplayError::InvalidTransition { .. })
        ));
        assert_eq!(ctrl.resume(), Err(ReplayError::NotRunning));
        assert_eq!(ctrl.step_once(), Err(ReplayError::NotRunning));
        assert_eq!(ctrl.stop(), Err(ReplayError::NotRunning));
    }

    #[tokio::test]
    async fn empty_session_is_rejected() {
        let ctrl = controller(Arc::new(SimulatedStepRunner::new()), quick_options());
        let session = ReplaySession::new("empty", Vec::new());
        assert!(matches!(
            ctrl.run(&session).await,
            Err(ReplayError::EmptySession(_))
        ));
        assert_eq!(ctrl.state(), ReplayState::Idle);
    }

    #[tokio::test]
    async fn stats_accumulate_across_runs_until_reset() {
        let runner = Arc::new(SimulatedStepRunner::new());
        let ctrl = controller(runner, quick_options());

        ctrl.run(&five_step_session()).await.unwrap();
        ctrl.run(&five_step_session()).await.unwrap();
        let stats = ctrl.stats();
        assert_eq!(stats.runs, 2);
        assert_eq!(stats.steps_passed, 10);

        ctrl.reset_stats();
        assert_eq!(ctrl.stats(), ReplayStats::default());
    }

    #[tokio::test]
    async fn progress_callbacks_observe_every_step() {
        let runner = Arc::new(SimulatedStepRunner::new());
        let ctrl = controller(runner, quick_options());
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            ctrl.on_progress(Arc::new(move |p: &ReplayProgress| {
                seen.lock().unwrap().push(p.current_index);
            }));
        }

        ctrl.run(&five_step_session()).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn progress_tracks_percentage_and_counts() {
        let runner = Arc::new(SimulatedStepRunner::new());
        runner.always_fail("s2");
        let ctrl = controller(runner, quick_options().continuing_on_failure());
        let snapshots = Arc::new(Mutex::new(Vec::new()));
        {
            let snapshots = Arc::clone(&snapshots);
            ctrl.on_progress(Arc::new(move |p: &ReplayProgress| {
                snapshots.lock().unwrap().push(p.clone());
            }));
        }

        ctrl.run(&five_step_session()).await.unwrap();
        let snapshots = snapshots.lock().unwrap();
        assert_eq!(snapshots.len(), 5);
        assert!((snapshots[0].percentage - 20.0).abs() < 1e-9);
        assert!((snapshots[4].percentage - 100.0).abs() < 1e-9);
        assert_eq!(snapshots[4].completed_steps, 4);
        assert_eq!(snapshots[4].failed_steps, 1);
        assert!(snapshots[0].estimated_remaining.is_some());
        assert_eq!(snapshots[4].estimated_remaining, Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn step_and_state_callbacks_fire() {
        let runner = Arc::new(SimulatedStepRunner::new());
        let ctrl = controller(runner, quick_options());
        let steps_seen = Arc::new(Mutex::new(Vec::new()));
        let states_seen = Arc::new(Mutex::new(Vec::new()));
        {
            let steps_seen = Arc::clone(&steps_seen);
            ctrl.on_step(Arc::new(move |r: &StepResult| {
                steps_seen.lock().unwrap().push((r.index, r.status));
            }));
            let states_seen = Arc::clone(&states_seen);
            ctrl.on_state_change(Arc::new(move |s| {
                states_seen.lock().unwrap().push(s);
            }));
        }

        ctrl.run(&five_step_session()).await.unwrap();
        let steps_seen = steps_seen.lock().unwrap();
        assert_eq!(steps_seen.len(), 5);
        assert!(steps_seen.iter().all(|(_, s)| *s == StepStatus::Passed));
        assert_eq!(
            *states_seen.lock().unwrap(),
            vec![ReplayState::Running, ReplayState::Completed]
        );
    }

    #[tokio::test]
    async fn slow_motion_paces_the_run() {
        let runner = Arc::new(SimulatedStepRunner::new());
        let options = quick_options().with_slow_motion(Duration::from_millis(5));
        let ctrl = controller(runner, options);

        let started = std::time::Instant::now();
        let result = ctrl.run(&five_step_session()).await.unwrap();
        assert!(result.success);
        assert!(started.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn rerun_after_failure_goes_straight_to_running() {
        let runner = Arc::new(SimulatedStepRunner::new());
        runner.fail_times("s1", 10);
        let ctrl = controller(Arc::clone(&runner), quick_options());

        let first = ctrl.run(&five_step_session()).await.unwrap();
        assert_eq!(first.final_state, ReplayState::Failed);

        // The scripted failures are exhausted mid-way through the next run.
        let second = ctrl.run(&five_step_session()).await.unwrap();
        assert!(second.results[0].attempts >= 1);
        assert_eq!(ctrl.state(), second.final_state);
    }
}

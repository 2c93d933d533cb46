//! Orchestration types: session state machine, results, statistics

use chrono::{DateTime, Utc};
use replay_core_types::Step;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle of a replay run.
///
/// Legal transitions:
/// - Idle -> Running
/// - Running -> Paused, Completed, Failed, Idle (abort)
/// - Paused -> Running, Completed, Idle
/// - Failed -> Idle, Running (direct re-run)
/// - Completed -> Idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayState {
    Idle,
    Running,
    Paused,
    Completed,
    Failed,
}

impl ReplayState {
    pub fn can_transition(self, to: ReplayState) -> bool {
        use ReplayState::*;
        matches!(
            (self, to),
            (Idle, Running)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Idle)
                | (Paused, Running)
                | (Paused, Completed)
                | (Paused, Idle)
                | (Failed, Idle)
                | (Failed, Running)
                | (Completed, Idle)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReplayState::Completed | ReplayState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReplayState::Idle => "idle",
            ReplayState::Running => "running",
            ReplayState::Paused => "paused",
            ReplayState::Completed => "completed",
            ReplayState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ReplayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-run tuning.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Keep going after a failed step instead of aborting the run.
    pub continue_on_failure: bool,
    /// Wall-clock budget for one step, all retries included per attempt.
    pub step_timeout: Duration,
    /// Retries after the first attempt; 2 means up to 3 attempts total.
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// Fixed pacing delay between consecutive steps.
    pub step_delay: Duration,
    /// Slow-motion delay applied before every step, for watching a run.
    pub slow_motion: Duration,
    /// Label-keyed value overrides for data-driven runs.
    pub data: BTreeMap<String, String>,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            continue_on_failure: false,
            step_timeout: Duration::from_secs(30),
            retry_attempts: 2,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(10),
            step_delay: Duration::ZERO,
            slow_motion: Duration::ZERO,
            data: BTreeMap::new(),
        }
    }
}

impl ReplayOptions {
    pub fn continuing_on_failure(mut self) -> Self {
        self.continue_on_failure = true;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    pub fn with_retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay = base;
        self.retry_max_delay = max;
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn with_slow_motion(mut self, delay: Duration) -> Self {
        self.slow_motion = delay;
        self
    }

    pub fn with_data(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(label.into(), value.into());
        self
    }
}

/// Where a breakpoint fires.
#[derive(Clone)]
pub enum BreakpointTarget {
    StepId(String),
    StepIndex(usize),
    /// Arbitrary predicate over the step and its index.
    Condition(Arc<dyn Fn(&Step, usize) -> bool + Send + Sync>),
}

impl std::fmt::Debug for BreakpointTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakpointTarget::StepId(id) => f.debug_tuple("StepId").field(id).finish(),
            BreakpointTarget::StepIndex(index) => f.debug_tuple("StepIndex").field(index).finish(),
            BreakpointTarget::Condition(_) => f.write_str("Condition(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Breakpoint {
    pub target: BreakpointTarget,
    pub enabled: bool,
}

impl Breakpoint {
    pub fn at_step_id(id: impl Into<String>) -> Self {
        Self {
            target: BreakpointTarget::StepId(id.into()),
            enabled: true,
        }
    }

    pub fn at_index(index: usize) -> Self {
        Self {
            target: BreakpointTarget::StepIndex(index),
            enabled: true,
        }
    }

    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&Step, usize) -> bool + Send + Sync + 'static,
    {
        Self {
            target: BreakpointTarget::Condition(Arc::new(predicate)),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn matches(&self, step: &Step, index: usize) -> bool {
        if !self.enabled {
            return false;
        }
        match &self.target {
            BreakpointTarget::StepId(id) => step.id == *id,
            BreakpointTarget::StepIndex(want) => index == *want,
            BreakpointTarget::Condition(predicate) => predicate(step, index),
        }
    }
}

/// Outcome of one step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: String,
    pub index: usize,
    pub status: StepStatus,
    /// Attempts actually made, including the first.
    pub attempts: u32,
    pub error: Option<String>,
    /// Strategy that re-found the element, when the step resolved one.
    pub locator_used: Option<String>,
    pub confidence: Option<f64>,
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
}

impl StepResult {
    pub fn skipped(step: &Step, index: usize) -> Self {
        Self {
            step_id: step.id.clone(),
            index,
            status: StepStatus::Skipped,
            attempts: 0,
            error: None,
            locator_used: None,
            confidence: None,
            duration: Duration::ZERO,
            started_at: Utc::now(),
        }
    }
}

/// A recorded sequence ready for replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySession {
    pub id: String,
    pub name: String,
    pub steps: Vec<Step>,
    pub created_at: DateTime<Utc>,
}

impl ReplaySession {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            steps,
            created_at: Utc::now(),
        }
    }
}

/// Cumulative counters. Persist across runs until explicitly reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayStats {
    pub runs: u32,
    pub steps_executed: u32,
    pub steps_passed: u32,
    pub steps_failed: u32,
    pub steps_skipped: u32,
    pub retries: u32,
}

impl ReplayStats {
    pub fn record(&mut self, result: &StepResult) {
        match result.status {
            StepStatus::Passed => {
                self.steps_executed += 1;
                self.steps_passed += 1;
            }
            StepStatus::Failed => {
                self.steps_executed += 1;
                self.steps_failed += 1;
            }
            StepStatus::Skipped => self.steps_skipped += 1,
            StepStatus::Pending | StepStatus::Running => {}
        }
        self.retries += result.attempts.saturating_sub(1);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Progress snapshot pushed to observers after every step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayProgress {
    pub session_id: String,
    pub state: ReplayState,
    /// Index of the step that just finished.
    pub current_index: usize,
    pub total_steps: usize,
    /// Steps that passed so far in this run.
    pub completed_steps: usize,
    /// Steps that failed so far in this run.
    pub failed_steps: usize,
    /// Share of the session attempted so far, 0 to 100.
    pub percentage: f64,
    pub elapsed: Duration,
    /// Linear projection from the pace so far; absent before the first step.
    pub estimated_remaining: Option<Duration>,
    pub stats: ReplayStats,
}

/// Final outcome of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResult {
    pub session_id: String,
    pub success: bool,
    pub final_state: ReplayState,
    pub results: Vec<StepResult>,
    pub stats: ReplayStats,
    /// Error of the earliest failed step, when any failed.
    pub first_error: Option<String>,
    /// The run ended before every step was attempted.
    pub stopped_early: bool,
    /// Index of the first step that was not attempted, when stopped early.
    pub stopped_at: Option<usize>,
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Reportable status of a stored test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Stopped,
}

/// Persistable record of one run, log lines flattened for report storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    pub id: String,
    pub session_id: String,
    pub session_name: String,
    pub status: RunStatus,
    /// Newline-joined per-step log lines.
    pub logs: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TestRun {
    pub fn from_result(session: &ReplaySession, result: &ReplayResult) -> Self {
        let status = match result.final_state {
            ReplayState::Completed => RunStatus::Passed,
            ReplayState::Failed => RunStatus::Failed,
            ReplayState::Idle => RunStatus::Stopped,
            ReplayState::Running | ReplayState::Paused => RunStatus::Running,
        };
        let logs = result
            .results
            .iter()
            .map(|r| match (&r.status, &r.error) {
                (StepStatus::Failed, Some(error)) => {
                    format!("step {} [{}] failed: {}", r.index + 1, r.step_id, error)
                }
                (StepStatus::Skipped, _) => {
                    format!("step {} [{}] skipped", r.index + 1, r.step_id)
                }
                _ => format!(
                    "step {} [{}] {:?} in {}ms",
                    r.index + 1,
                    r.step_id,
                    r.status,
                    r.duration.as_millis()
                ),
            })
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            session_name: session.name.clone(),
            status,
            logs,
            started_at: result.started_at,
            finished_at: Some(result.finished_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_core_types::{LocatorBundle, StepEvent};

    #[test]
    fn transition_table() {
        use ReplayState::*;
        assert!(Idle.can_transition(Running));
        assert!(Running.can_transition(Paused));
        assert!(Running.can_transition(Idle));
        assert!(Paused.can_transition(Running));
        assert!(Paused.can_transition(Completed));
        assert!(Failed.can_transition(Running));
        assert!(Completed.can_transition(Idle));

        assert!(!Idle.can_transition(Paused));
        assert!(!Idle.can_transition(Completed));
        assert!(!Paused.can_transition(Failed));
        assert!(!Completed.can_transition(Running));
    }

    #[test]
    fn breakpoints_match_by_id_index_and_predicate() {
        let step = Step::click(LocatorBundle::new().with_id("x")).with_id("step-3");

        assert!(Breakpoint::at_step_id("step-3").matches(&step, 0));
        assert!(!Breakpoint::at_step_id("step-4").matches(&step, 0));
        assert!(Breakpoint::at_index(2).matches(&step, 2));
        assert!(Breakpoint::when(|s, _| s.event == StepEvent::Click).matches(&step, 7));
        assert!(!Breakpoint::at_step_id("step-3").disabled().matches(&step, 0));
    }

    #[test]
    fn stats_accumulate_and_reset() {
        let step = Step::open("https://example.com");
        let mut stats = ReplayStats::default();

        let mut passed = StepResult::skipped(&step, 0);
        passed.status = StepStatus::Passed;
        passed.attempts = 3;
        stats.record(&passed);
        stats.record(&StepResult::skipped(&step, 1));

        assert_eq!(stats.steps_passed, 1);
        assert_eq!(stats.steps_skipped, 1);
        assert_eq!(stats.retries, 2);

        stats.reset();
        assert_eq!(stats, ReplayStats::default());
    }

    #[test]
    fn test_run_flattens_logs() {
        let steps = vec![Step::open("https://example.com").with_id("s1")];
        let session = ReplaySession::new("login", steps);
        let mut result = ReplayResult {
            session_id: session.id.clone(),
            success: false,
            final_state: ReplayState::Failed,
            results: vec![],
            stats: ReplayStats::default(),
            first_error: Some("ELEMENT_NOT_FOUND: no match".to_string()),
            stopped_early: true,
            stopped_at: Some(1),
            duration: Duration::from_secs(1),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        let mut failed = StepResult::skipped(&session.steps[0], 0);
        failed.status = StepStatus::Failed;
        failed.error = Some("ELEMENT_NOT_FOUND: no match".to_string());
        result.results.push(failed);

        let run = TestRun::from_result(&session, &result);
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.logs.contains("step 1 [s1] failed: ELEMENT_NOT_FOUND"));
    }
}

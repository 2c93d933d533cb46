//! Scripted step runners
//!
//! Orchestration is tested (and demoed) without a browser by injecting these
//! through the [`StepRunner`] seam: a scriptable runner with per-step failure
//! schedules, and a closure adapter for one-off behaviors.

use async_trait::async_trait;
use replay_core_types::Step;
use replay_executor::{ErrorCode, ExecPhase, StepContext, StepError, StepExecution, StepRunner};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct ScriptState {
    /// Remaining failures per step id; decremented on each call.
    fail_remaining: BTreeMap<String, u32>,
    always_fail: BTreeSet<String>,
    calls: Vec<String>,
}

/// Step runner that passes everything except what it was told to fail.
#[derive(Default)]
pub struct SimulatedStepRunner {
    state: Mutex<ScriptState>,
    delay: Duration,
}

impl SimulatedStepRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fixed per-step latency, for pause and timeout tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the first `times` calls for `step_id`, then pass.
    pub fn fail_times(&self, step_id: impl Into<String>, times: u32) {
        self.state
            .lock()
            .unwrap()
            .fail_remaining
            .insert(step_id.into(), times);
    }

    /// Fail every call for `step_id`.
    pub fn always_fail(&self, step_id: impl Into<String>) {
        self.state.lock().unwrap().always_fail.insert(step_id.into());
    }

    /// Step ids in call order, one entry per attempt.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn decide(&self, step_id: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        state.calls.push(step_id.to_string());
        if state.always_fail.contains(step_id) {
            return false;
        }
        if let Some(remaining) = state.fail_remaining.get_mut(step_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl StepRunner for SimulatedStepRunner {
    async fn run_step(&self, step: &Step, _ctx: &StepContext) -> StepExecution {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.decide(&step.id) {
            StepExecution::passed(&step.id)
        } else {
            StepExecution::failed(
                &step.id,
                ExecPhase::Act,
                StepError::new(ErrorCode::ClickFailed, "scripted failure"),
            )
        }
    }
}

/// Adapter turning a closure into a [`StepRunner`].
pub struct FnStepRunner<F>(pub F);

#[async_trait]
impl<F> StepRunner for FnStepRunner<F>
where
    F: Fn(&Step, &StepContext) -> StepExecution + Send + Sync,
{
    async fn run_step(&self, step: &Step, ctx: &StepContext) -> StepExecution {
        (self.0)(step, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_core_types::{LocatorBundle, Step};

    #[tokio::test]
    async fn scripted_failures_then_success() {
        let runner = SimulatedStepRunner::new();
        let step = Step::click(LocatorBundle::new().with_id("x")).with_id("s1");
        runner.fail_times("s1", 2);
        let ctx = StepContext::new();

        assert!(!runner.run_step(&step, &ctx).await.success);
        assert!(!runner.run_step(&step, &ctx).await.success);
        assert!(runner.run_step(&step, &ctx).await.success);
        assert_eq!(runner.calls(), vec!["s1", "s1", "s1"]);
    }

    #[tokio::test]
    async fn closure_runner_delegates() {
        let runner = FnStepRunner(|step: &Step, _: &StepContext| StepExecution::passed(&step.id));
        let step = Step::open("https://example.com");
        assert!(runner.run_step(&step, &StepContext::new()).await.success);
    }
}

//! Execution records and configuration

use crate::errors::StepError;
use async_trait::async_trait;
use replay_locator::ResolveOutcome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// The phases a step passes through, in order. A failed execution reports
/// the phase it died in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecPhase {
    Validate,
    PreHooks,
    Locate,
    Verify,
    Stabilize,
    Act,
    PostHooks,
}

impl ExecPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecPhase::Validate => "validate",
            ExecPhase::PreHooks => "pre-hooks",
            ExecPhase::Locate => "locate",
            ExecPhase::Verify => "verify",
            ExecPhase::Stabilize => "stabilize",
            ExecPhase::Act => "act",
            ExecPhase::PostHooks => "post-hooks",
        }
    }
}

impl std::fmt::Display for ExecPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long one phase took.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTiming {
    pub phase: ExecPhase,
    pub duration: Duration,
}

/// Full record of one step execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepExecution {
    pub step_id: String,
    pub success: bool,
    /// Phase the step failed in; `None` on success.
    pub failed_phase: Option<ExecPhase>,
    pub error: Option<StepError>,
    /// Remediation hints matching the error code.
    pub suggestions: Vec<String>,
    /// Resolution detail when the step reached the locate phase.
    pub resolution: Option<ResolveOutcome>,
    /// Value actually applied, after any data-map substitution. The URL for
    /// navigation steps.
    pub value_used: Option<String>,
    pub phases: Vec<PhaseTiming>,
    pub duration: Duration,
}

impl StepExecution {
    pub fn passed(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            success: true,
            failed_phase: None,
            error: None,
            suggestions: Vec::new(),
            resolution: None,
            value_used: None,
            phases: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn failed(step_id: impl Into<String>, phase: ExecPhase, error: StepError) -> Self {
        let suggestions = error
            .suggestions()
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self {
            step_id: step_id.into(),
            success: false,
            failed_phase: Some(phase),
            error: Some(error),
            suggestions,
            resolution: None,
            value_used: None,
            phases: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn with_resolution(mut self, resolution: ResolveOutcome) -> Self {
        self.resolution = Some(resolution);
        self
    }
}

/// Executor tuning knobs.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Require the element to be visible before acting.
    pub verify_visibility: bool,
    /// Require the element to be enabled before acting.
    pub verify_enabled: bool,
    /// Elements below this opacity count as invisible.
    pub min_opacity: f64,
    /// Settle delay between stabilization samples and before the action.
    pub stabilize_delay: Duration,
    /// Extra samples taken when the element's bounding box is still moving.
    /// Zero disables motion checking; the delay alone still applies.
    pub stabilize_attempts: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            verify_visibility: true,
            verify_enabled: true,
            min_opacity: 0.05,
            stabilize_delay: Duration::from_millis(50),
            stabilize_attempts: 3,
        }
    }
}

impl ExecutorConfig {
    pub fn with_stabilize_delay(mut self, delay: Duration) -> Self {
        self.stabilize_delay = delay;
        self
    }

    pub fn with_stabilize_attempts(mut self, attempts: u32) -> Self {
        self.stabilize_attempts = attempts;
        self
    }

    pub fn without_verification(mut self) -> Self {
        self.verify_visibility = false;
        self.verify_enabled = false;
        self
    }
}

/// Per-run execution context, shared by every step of a run.
///
/// The data map drives data-driven replay: when a step's label matches a key,
/// the mapped value replaces the recorded one.
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    pub data: BTreeMap<String, String>,
}

impl StepContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(label.into(), value.into());
        self
    }

    /// The value a step should apply: the data-map override when the step's
    /// label has one, the recorded value otherwise.
    pub fn value_for(&self, step: &replay_core_types::Step) -> Option<String> {
        if let Some(label) = &step.label {
            if let Some(value) = self.data.get(label) {
                return Some(value.clone());
            }
        }
        step.value.clone()
    }
}

/// Seam between orchestration and single-step execution. The controller only
/// knows this trait; tests inject scripted runners through it.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run_step(&self, step: &replay_core_types::Step, ctx: &StepContext) -> StepExecution;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use replay_core_types::{LocatorBundle, Step};

    #[test]
    fn failed_execution_carries_suggestions() {
        let error = StepError::new(ErrorCode::ElementNotFound, "no match");
        let exec = StepExecution::failed("step-1", ExecPhase::Locate, error);
        assert!(!exec.success);
        assert_eq!(exec.failed_phase, Some(ExecPhase::Locate));
        assert_eq!(
            exec.suggestions,
            ErrorCode::ElementNotFound
                .suggestions()
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn context_substitutes_by_label() {
        let ctx = StepContext::new().with_data("Username", "bob");
        let step = Step::input(LocatorBundle::new().with_id("u"), "alice").with_label("Username");
        assert_eq!(ctx.value_for(&step).as_deref(), Some("bob"));

        let unlabeled = Step::input(LocatorBundle::new().with_id("u"), "alice");
        assert_eq!(ctx.value_for(&unlabeled).as_deref(), Some("alice"));
    }

    #[test]
    fn phases_display_kebab_case() {
        assert_eq!(ExecPhase::PreHooks.to_string(), "pre-hooks");
        let json = serde_json::to_string(&ExecPhase::PostHooks).unwrap();
        assert_eq!(json, "\"post-hooks\"");
    }
}

//! Phased step execution
//!
//! Every step moves through the same pipeline: validate, pre-hooks, locate,
//! verify, stabilize, act, post-hooks. Navigation steps skip the element
//! phases. A failure stops the pipeline and reports the phase it died in,
//! the classified error code, and the matching remediation hint.

use crate::errors::{ErrorCode, StepError};
use crate::interaction::{apply_click, apply_input, classify};
use crate::ports::{BrowserPort, ElementHandle};
use crate::types::{ExecPhase, ExecutorConfig, PhaseTiming, StepContext, StepExecution, StepRunner};
use async_trait::async_trait;
use replay_core_types::{PageModel, Step, StepEvent};
use replay_locator::{LocatorResolver, ResolveOutcome, ResolverConfig};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Hook invoked around a step. Returning an error vetoes the step.
pub type StepHook = Arc<dyn Fn(&Step) -> Result<(), String> + Send + Sync>;

/// Executes one step at a time against a browser port.
#[derive(Clone)]
pub struct StepExecutor {
    port: Arc<dyn BrowserPort>,
    resolver: LocatorResolver,
    config: ExecutorConfig,
    pre_hooks: Vec<StepHook>,
    post_hooks: Vec<StepHook>,
}

impl StepExecutor {
    pub fn new(port: Arc<dyn BrowserPort>) -> Self {
        Self {
            port,
            resolver: LocatorResolver::new(),
            config: ExecutorConfig::default(),
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: LocatorResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_pre_hook(mut self, hook: StepHook) -> Self {
        self.pre_hooks.push(hook);
        self
    }

    pub fn with_post_hook(mut self, hook: StepHook) -> Self {
        self.post_hooks.push(hook);
        self
    }

    pub fn port(&self) -> &Arc<dyn BrowserPort> {
        &self.port
    }

    /// Run one step through the full pipeline.
    pub async fn execute(&self, step: &Step, ctx: &StepContext) -> StepExecution {
        let started = Instant::now();
        let mut phases = Vec::new();
        debug!(step_id = %step.id, event = %step.event, "executing step");

        let result = self.run_phases(step, ctx, &mut phases).await;
        let mut execution = match result {
            Ok((resolution, value_used)) => {
                info!(step_id = %step.id, event = %step.event, "step passed");
                let mut execution = StepExecution::passed(&step.id);
                execution.resolution = resolution;
                execution.value_used = value_used;
                execution
            }
            Err((phase, error, resolution)) => {
                warn!(
                    step_id = %step.id,
                    phase = %phase,
                    code = %error.code,
                    message = %error.message,
                    "step failed"
                );
                let mut execution = StepExecution::failed(&step.id, phase, error);
                execution.resolution = resolution;
                execution
            }
        };
        execution.phases = phases;
        execution.duration = started.elapsed();
        execution
    }

    async fn run_phases(
        &self,
        step: &Step,
        ctx: &StepContext,
        phases: &mut Vec<PhaseTiming>,
    ) -> Result<(Option<ResolveOutcome>, Option<String>), (ExecPhase, StepError, Option<ResolveOutcome>)>
    {
        let fail = |phase, error| (phase, error, None);

        timed(phases, ExecPhase::Validate, || validate(step, ctx))
            .map_err(|e| fail(ExecPhase::Validate, e))?;

        timed(phases, ExecPhase::PreHooks, || {
            run_hooks(&self.pre_hooks, step)
        })
        .map_err(|e| fail(ExecPhase::PreHooks, e))?;

        let mut value_used = None;
        let resolution = if step.event == StepEvent::Open {
            let phase_started = Instant::now();
            let url = step.value.as_deref().unwrap_or_default();
            let navigated = self.port.navigate(url).await;
            phases.push(PhaseTiming {
                phase: ExecPhase::Act,
                duration: phase_started.elapsed(),
            });
            navigated.map_err(|e| {
                fail(
                    ExecPhase::Act,
                    StepError::new(ErrorCode::NavigationFailed, e.to_string()),
                )
            })?;
            value_used = Some(url.to_string());
            None
        } else {
            let (outcome, target, page) = self.locate(step, phases).await?;

            timed(phases, ExecPhase::Verify, || {
                self.verify(&page, &target)
            })
            .map_err(|e| (ExecPhase::Verify, e, Some(outcome.clone())))?;

            let phase_started = Instant::now();
            let settled = self.stabilize(&target, page).await;
            phases.push(PhaseTiming {
                phase: ExecPhase::Stabilize,
                duration: phase_started.elapsed(),
            });
            let page = settled.map_err(|e| (ExecPhase::Stabilize, e, Some(outcome.clone())))?;

            if step.event == StepEvent::Input {
                value_used = ctx.value_for(step);
            }
            let phase_started = Instant::now();
            let acted = self.act(step, &page, &target, value_used.as_deref()).await;
            phases.push(PhaseTiming {
                phase: ExecPhase::Act,
                duration: phase_started.elapsed(),
            });
            acted.map_err(|e| (ExecPhase::Act, e, Some(outcome.clone())))?;
            Some(outcome)
        };

        timed(phases, ExecPhase::PostHooks, || {
            run_hooks(&self.post_hooks, step)
        })
        .map_err(|e| (ExecPhase::PostHooks, e, resolution.clone()))?;

        Ok((resolution, value_used))
    }

    /// Resolve the step's bundle and return the handle the remaining phases
    /// act through. The resolved node id lives in the arena of the document
    /// the bundle's iframe/shadow chains lead to, so the handle carries those
    /// chains along and every later snapshot is narrowed through them.
    async fn locate(
        &self,
        step: &Step,
        phases: &mut Vec<PhaseTiming>,
    ) -> Result<
        (ResolveOutcome, ElementHandle, PageModel),
        (ExecPhase, StepError, Option<ResolveOutcome>),
    > {
        let phase_started = Instant::now();
        let bundle = step.bundle.clone().unwrap_or_default();
        let config = self.resolver_config_for(step);
        let port = Arc::clone(&self.port);
        let outcome = self
            .resolver
            .resolve_from(
                &bundle,
                || {
                    let port = Arc::clone(&port);
                    async move { port.snapshot().await }
                },
                &config,
            )
            .await;
        phases.push(PhaseTiming {
            phase: ExecPhase::Locate,
            duration: phase_started.elapsed(),
        });

        if !outcome.success {
            let reason = outcome
                .failure
                .map(|f| f.to_string())
                .unwrap_or_else(|| "no matching element".to_string());
            let message = format!(
                "resolution failed ({}) after {} retry cycle(s)",
                reason, outcome.retry_cycles
            );
            return Err((
                ExecPhase::Locate,
                StepError::new(ErrorCode::ElementNotFound, message),
                Some(outcome),
            ));
        }

        let node = outcome.best.element.unwrap_or(PageModel::ROOT);
        let target = ElementHandle::for_bundle(&bundle, node);
        let page = self.port.snapshot().await;
        Ok((outcome, target, page))
    }

    /// Per-step timeout override narrows the resolver deadline.
    fn resolver_config_for(&self, step: &Step) -> ResolverConfig {
        let mut config = self.resolver.config().clone();
        if let Some(timeout_ms) = step.metadata.as_ref().and_then(|m| m.timeout_ms) {
            config.timeout = std::time::Duration::from_millis(timeout_ms);
        }
        config
    }

    fn verify(&self, page: &PageModel, target: &ElementHandle) -> Result<(), StepError> {
        let document = target.document(page).ok_or_else(|| {
            StepError::new(
                ErrorCode::ElementNotFound,
                "resolved element's document detached before verification",
            )
        })?;
        if target.node.0 >= document.len() {
            return Err(StepError::new(
                ErrorCode::ElementNotFound,
                "resolved element detached before verification",
            ));
        }
        let element = document.node(target.node);
        if self.config.verify_visibility
            && (!element.visible || element.opacity < self.config.min_opacity)
        {
            return Err(StepError::new(
                ErrorCode::ElementNotVisible,
                format!(
                    "element <{}> is not visible (opacity {})",
                    element.tag, element.opacity
                ),
            ));
        }
        if self.config.verify_enabled && !element.enabled {
            return Err(StepError::new(
                ErrorCode::ElementNotInteractable,
                format!("element <{}> is disabled", element.tag),
            ));
        }
        Ok(())
    }

    /// Wait for the element's bounding box to stop moving. Animated elements
    /// that never settle within the sample budget fail the step.
    async fn stabilize(
        &self,
        target: &ElementHandle,
        page: PageModel,
    ) -> Result<PageModel, StepError> {
        if self.config.stabilize_attempts == 0 {
            tokio::time::sleep(self.config.stabilize_delay).await;
            return Ok(page);
        }
        let mut last = match target.document(&page) {
            Some(document) if target.node.0 < document.len() => {
                document.node(target.node).bounding
            }
            _ => {
                return Err(StepError::new(
                    ErrorCode::ElementNotStable,
                    "element detached while settling",
                ))
            }
        };
        for _ in 0..self.config.stabilize_attempts {
            tokio::time::sleep(self.config.stabilize_delay).await;
            let next = self.port.snapshot().await;
            let bounding = match target.document(&next) {
                Some(document) if target.node.0 < document.len() => {
                    document.node(target.node).bounding
                }
                _ => {
                    return Err(StepError::new(
                        ErrorCode::ElementNotStable,
                        "element detached while settling",
                    ))
                }
            };
            if bounding == last {
                return Ok(next);
            }
            debug!(node = target.node.0, "element still moving, sampling again");
            last = bounding;
        }
        Err(StepError::new(
            ErrorCode::ElementNotStable,
            format!(
                "element kept moving across {} samples",
                self.config.stabilize_attempts
            ),
        ))
    }

    async fn act(
        &self,
        step: &Step,
        page: &PageModel,
        target: &ElementHandle,
        value: Option<&str>,
    ) -> Result<(), StepError> {
        let document = target.document(page).ok_or_else(|| {
            StepError::new(
                ErrorCode::ElementNotFound,
                "resolved element's document detached before acting",
            )
        })?;
        let element = document.node(target.node);
        let kind = classify(element);
        let (result, code) = match step.event {
            StepEvent::Open => unreachable!("navigation is handled before the element phases"),
            StepEvent::Click => (
                apply_click(self.port.as_ref(), kind, target, element).await,
                ErrorCode::ClickFailed,
            ),
            StepEvent::Input => (
                apply_input(self.port.as_ref(), kind, target, value.unwrap_or_default()).await,
                ErrorCode::InputFailed,
            ),
            StepEvent::Enter => (self.port.press_enter(target).await, ErrorCode::EnterFailed),
        };
        result.map_err(|e| StepError::new(code, e.to_string()))
    }
}

#[async_trait]
impl StepRunner for StepExecutor {
    async fn run_step(&self, step: &Step, ctx: &StepContext) -> StepExecution {
        self.execute(step, ctx).await
    }
}

fn validate(step: &Step, ctx: &StepContext) -> Result<(), StepError> {
    match step.event {
        StepEvent::Open => {
            if step.value.as_deref().is_none_or(|v| v.trim().is_empty()) {
                return Err(StepError::new(
                    ErrorCode::ValidationFailed,
                    "open step has no URL",
                ));
            }
        }
        StepEvent::Input => {
            require_bundle(step)?;
            if ctx.value_for(step).is_none() {
                return Err(StepError::new(
                    ErrorCode::ValidationFailed,
                    "input step has no value and no data-map entry",
                ));
            }
        }
        StepEvent::Click | StepEvent::Enter => require_bundle(step)?,
    }
    Ok(())
}

fn require_bundle(step: &Step) -> Result<(), StepError> {
    let bundle = match &step.bundle {
        Some(bundle) if !bundle.is_empty() => bundle,
        _ => {
            return Err(StepError::new(
                ErrorCode::ValidationFailed,
                format!("{} step has no usable locator bundle", step.event),
            ))
        }
    };
    if bundle.tag.as_deref().is_none_or(|t| t.trim().is_empty()) {
        return Err(StepError::new(
            ErrorCode::ValidationFailed,
            format!("{} step bundle records no tag", step.event),
        ));
    }
    Ok(())
}

fn run_hooks(hooks: &[StepHook], step: &Step) -> Result<(), StepError> {
    for hook in hooks {
        hook(step).map_err(|reason| {
            StepError::new(ErrorCode::ValidationFailed, format!("hook veto: {reason}"))
        })?;
    }
    Ok(())
}

fn timed<F>(phases: &mut Vec<PhaseTiming>, phase: ExecPhase, body: F) -> Result<(), StepError>
where
    F: FnOnce() -> Result<(), StepError>,
{
    let started = Instant::now();
    let result = body();
    phases.push(PhaseTiming {
        phase,
        duration: started.elapsed(),
    });
    result
}

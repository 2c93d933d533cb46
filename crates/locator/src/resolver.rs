//! Resolution orchestration
//!
//! Runs the registered strategies in priority order against a page snapshot,
//! retrying on a fresh snapshot until an acceptable match, the deadline, or
//! the retry cap. Every consulted strategy leaves an audit record, including
//! the ones whose `can_handle` rejected the bundle.

use crate::errors::LocatorError;
use crate::registry::StrategyRegistry;
use crate::strategies::LocateStrategy;
use crate::types::{
    AttemptRecord, ResolutionResult, ResolveFailure, ResolveOutcome, ResolverConfig,
};
use replay_core_types::{LocatorBundle, PageModel};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of one pass over the strategy chain.
struct CycleResult {
    attempts: Vec<AttemptRecord>,
    best: Option<ResolutionResult>,
    /// Set when the cycle produced a result at or above `min_confidence`.
    accepted: Option<ResolutionResult>,
}

/// Resolves recorded bundles back to live elements.
///
/// Cheap to share: the registry sits behind an `Arc`, so clones observe
/// registry reconfiguration immediately.
#[derive(Clone)]
pub struct LocatorResolver {
    registry: Arc<StrategyRegistry>,
    config: ResolverConfig,
}

impl Default for LocatorResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl LocatorResolver {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(StrategyRegistry::with_defaults()),
            config: ResolverConfig::default(),
        }
    }

    pub fn with_registry(registry: Arc<StrategyRegistry>) -> Self {
        Self {
            registry,
            config: ResolverConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Arc<StrategyRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve against a fixed snapshot with the resolver's own config.
    pub async fn resolve(&self, bundle: &LocatorBundle, page: &PageModel) -> ResolveOutcome {
        self.resolve_with(bundle, || page.clone(), &self.config).await
    }

    /// Resolve with a per-call config, taking a fresh snapshot each retry
    /// cycle.
    pub async fn resolve_with<F>(
        &self,
        bundle: &LocatorBundle,
        mut snapshot: F,
        config: &ResolverConfig,
    ) -> ResolveOutcome
    where
        F: FnMut() -> PageModel,
    {
        self.resolve_from(bundle, move || std::future::ready(snapshot()), config)
            .await
    }

    /// Like [`resolve_with`](Self::resolve_with) but the snapshot provider is
    /// asynchronous. This is the entry point adapters use against a live
    /// document.
    pub async fn resolve_from<S, Fut>(
        &self,
        bundle: &LocatorBundle,
        mut snapshot: S,
        config: &ResolverConfig,
    ) -> ResolveOutcome
    where
        S: FnMut() -> Fut,
        Fut: std::future::Future<Output = PageModel>,
    {
        let started = Instant::now();
        let deadline = started + config.timeout;
        let strategies = self.selected_strategies(config);
        if strategies.is_empty() {
            warn!("resolution impossible: no strategies selected");
            let mut outcome = ResolveOutcome::failed(
                ResolutionResult::not_found("none"),
                Vec::new(),
                0,
                ResolveFailure::NoStrategies,
            );
            outcome.duration = started.elapsed();
            return outcome;
        }

        let mut attempts = Vec::new();
        let mut best: Option<ResolutionResult> = None;
        let mut retry_cycles: u32 = 0;

        loop {
            let page = snapshot().await;
            let cycle = self.run_cycle(&strategies, bundle, &page, config);
            attempts.extend(cycle.attempts);
            merge_best(&mut best, cycle.best);

            if let Some(winner) = cycle.accepted {
                info!(
                    strategy = %winner.strategy,
                    confidence = winner.confidence,
                    retry_cycles,
                    "element resolved"
                );
                let mut outcome = ResolveOutcome::succeeded(winner, attempts, retry_cycles);
                outcome.duration = started.elapsed();
                return outcome;
            }

            if !config.enable_retry || retry_cycles >= config.max_retries {
                return finish_failure(
                    best,
                    attempts,
                    retry_cycles,
                    ResolveFailure::NoMatch,
                    started,
                );
            }
            let now = Instant::now();
            if now + config.retry_interval >= deadline {
                debug!(retry_cycles, "resolution deadline reached");
                return finish_failure(
                    best,
                    attempts,
                    retry_cycles,
                    ResolveFailure::TimedOut,
                    started,
                );
            }

            tokio::time::sleep(config.retry_interval).await;
            retry_cycles += 1;
        }
    }

    /// Run exactly one named strategy, bypassing the priority chain. One
    /// cycle, no retries.
    pub fn resolve_named(
        &self,
        name: &str,
        bundle: &LocatorBundle,
        page: &PageModel,
    ) -> Result<ResolveOutcome, LocatorError> {
        let strategy = self
            .registry
            .active()
            .into_iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| LocatorError::StrategyNotFound(name.to_string()))?;

        let started = Instant::now();
        let cycle = self.run_cycle(&[strategy], bundle, page, &self.config);
        Ok(match cycle.accepted {
            Some(winner) => {
                let mut outcome = ResolveOutcome::succeeded(winner, cycle.attempts, 0);
                outcome.duration = started.elapsed();
                outcome
            }
            None => finish_failure(
                cycle.best,
                cycle.attempts,
                0,
                ResolveFailure::NoMatch,
                started,
            ),
        })
    }

    /// One pass, no retries, no async. Useful for tests and for callers that
    /// manage their own retry cadence.
    pub fn resolve_sync(&self, bundle: &LocatorBundle, page: &PageModel) -> ResolveOutcome {
        let started = Instant::now();
        let strategies = self.selected_strategies(&self.config);
        if strategies.is_empty() {
            let mut outcome = ResolveOutcome::failed(
                ResolutionResult::not_found("none"),
                Vec::new(),
                0,
                ResolveFailure::NoStrategies,
            );
            outcome.duration = started.elapsed();
            return outcome;
        }

        let cycle = self.run_cycle(&strategies, bundle, page, &self.config);
        match cycle.accepted {
            Some(winner) => {
                let mut outcome = ResolveOutcome::succeeded(winner, cycle.attempts, 0);
                outcome.duration = started.elapsed();
                outcome
            }
            None => finish_failure(
                cycle.best,
                cycle.attempts,
                0,
                ResolveFailure::NoMatch,
                started,
            ),
        }
    }

    fn selected_strategies(&self, config: &ResolverConfig) -> Vec<Arc<dyn LocateStrategy>> {
        self.registry
            .active()
            .into_iter()
            .filter(|s| {
                if let Some(only) = &config.only_strategies {
                    if !only.iter().any(|n| n == s.name()) {
                        return false;
                    }
                }
                !config.skip_strategies.iter().any(|n| n == s.name())
            })
            .collect()
    }

    fn run_cycle(
        &self,
        strategies: &[Arc<dyn LocateStrategy>],
        bundle: &LocatorBundle,
        page: &PageModel,
        config: &ResolverConfig,
    ) -> CycleResult {
        let mut attempts = Vec::new();
        let mut best: Option<ResolutionResult> = None;

        let root = match narrow_root(bundle, page) {
            Ok(root) => root,
            Err(err) => {
                // The frame or shadow tree may simply not be attached yet;
                // the retry loop takes another snapshot.
                debug!(error = %err, "could not narrow to the recorded document");
                return CycleResult {
                    attempts,
                    best,
                    accepted: None,
                };
            }
        };

        for strategy in strategies {
            if !strategy.can_handle(bundle) {
                attempts.push(AttemptRecord::skipped(strategy.name()));
                continue;
            }

            let find_started = Instant::now();
            let mut result = strategy.find(bundle, root);
            result.duration = find_started.elapsed();
            attempts.push(AttemptRecord::from_result(&result));

            if let Some(error) = &result.error {
                debug!(strategy = strategy.name(), %error, "strategy failed");
            }
            if result.is_found() {
                debug!(
                    strategy = strategy.name(),
                    confidence = result.confidence,
                    "candidate match"
                );
                let early_exit = result.confidence >= config.early_exit_confidence;
                merge_best(&mut best, Some(result));
                if early_exit {
                    break;
                }
            }
        }

        let accepted = best
            .as_ref()
            .filter(|b| b.confidence >= config.min_confidence)
            .cloned();
        CycleResult {
            attempts,
            best,
            accepted,
        }
    }
}

/// Follow the bundle's recorded iframe chain and shadow-host path down to the
/// document the element lives in.
pub fn narrow_root<'a>(
    bundle: &LocatorBundle,
    page: &'a PageModel,
) -> Result<&'a PageModel, LocatorError> {
    let mut root = page;
    if let Some(chain) = &bundle.iframe_chain {
        for descriptor in chain {
            root = root
                .find_frame(descriptor)
                .ok_or_else(|| LocatorError::FrameNotFound(format!("{:?}", descriptor)))?;
        }
    }
    if let Some(hosts) = &bundle.shadow_hosts {
        for host in hosts {
            root = root
                .find_shadow_root(host)
                .ok_or_else(|| LocatorError::ShadowRootNotFound(host.clone()))?;
        }
    }
    Ok(root)
}

fn merge_best(best: &mut Option<ResolutionResult>, candidate: Option<ResolutionResult>) {
    if let Some(candidate) = candidate {
        let better = best
            .as_ref()
            .is_none_or(|b| candidate.confidence > b.confidence);
        if better {
            *best = Some(candidate);
        }
    }
}

fn finish_failure(
    best: Option<ResolutionResult>,
    attempts: Vec<AttemptRecord>,
    retry_cycles: u32,
    failure: ResolveFailure,
    started: Instant,
) -> ResolveOutcome {
    let best = best.unwrap_or_else(|| ResolutionResult::not_found("none"));
    let mut outcome = ResolveOutcome::failed(best, attempts, retry_cycles, failure);
    outcome.duration = started.elapsed();
    outcome
}

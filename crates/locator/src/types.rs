//! Core types for the locator system

use replay_core_types::NodeId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Static description of one strategy: its unique name, its rank in the
/// fallback chain (lower is tried earlier) and the confidence a clean,
/// unambiguous match earns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyDescriptor {
    pub name: &'static str,
    pub priority: i32,
    pub base_confidence: f64,
}

impl StrategyDescriptor {
    pub const fn new(name: &'static str, priority: i32, base_confidence: f64) -> Self {
        Self {
            name,
            priority,
            base_confidence,
        }
    }
}

/// How a strategy arrived at its match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Attribute/selector matched exactly
    Exact,
    /// Weaker signal (contains-text, class subset) with a penalty applied
    Partial,
    /// Ranked among candidates on secondary signals
    Scored,
    /// Matched by bounding-box proximity
    Positional,
}

/// Extra detail about a match, mostly for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMetadata {
    pub kind: MatchKind,
    pub candidate_count: usize,
}

/// Outcome of a single strategy's `find`.
///
/// A confidence of 0 or a missing element means "not found" regardless of the
/// other fields. `error` carries unexpected failures (malformed selector,
/// traversal error); an ordinary miss is not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub element: Option<NodeId>,
    pub confidence: f64,
    pub strategy: String,
    pub duration: Duration,
    pub error: Option<String>,
    pub metadata: Option<MatchMetadata>,
}

impl ResolutionResult {
    pub fn not_found(strategy: impl Into<String>) -> Self {
        Self {
            element: None,
            confidence: 0.0,
            strategy: strategy.into(),
            duration: Duration::ZERO,
            error: None,
            metadata: None,
        }
    }

    pub fn found(
        strategy: impl Into<String>,
        element: NodeId,
        confidence: f64,
        metadata: MatchMetadata,
    ) -> Self {
        Self {
            element: Some(element),
            confidence: confidence.clamp(0.0, 1.0),
            strategy: strategy.into(),
            duration: Duration::ZERO,
            error: None,
            metadata: Some(metadata),
        }
    }

    pub fn failed(strategy: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            element: None,
            confidence: 0.0,
            strategy: strategy.into(),
            duration: Duration::ZERO,
            error: Some(error.into()),
            metadata: None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.element.is_some() && self.confidence > 0.0
    }
}

/// One entry of the resolution audit trail: every strategy consulted during a
/// cycle leaves a record, including the ones skipped by `can_handle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub strategy: String,
    /// False when `can_handle` rejected the bundle and `find` never ran.
    pub handled: bool,
    pub success: bool,
    pub duration: Duration,
    pub error: Option<String>,
}

impl AttemptRecord {
    pub fn skipped(strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            handled: false,
            success: false,
            duration: Duration::ZERO,
            error: None,
        }
    }

    pub fn from_result(result: &ResolutionResult) -> Self {
        Self {
            strategy: result.strategy.clone(),
            handled: true,
            success: result.is_found(),
            duration: result.duration,
            error: result.error.clone(),
        }
    }
}

/// Why a resolution came back without a usable element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolveFailure {
    NoStrategies,
    NoMatch,
    TimedOut,
}

impl std::fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ResolveFailure::NoStrategies => "no strategies available",
            ResolveFailure::NoMatch => "no matching element",
            ResolveFailure::TimedOut => "timed out",
        };
        f.write_str(text)
    }
}

/// Full result of a resolution run: the winning (or best losing) result plus
/// the audit trail and retry accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOutcome {
    pub success: bool,
    /// Winning result on success; best-so-far (possibly below threshold) on
    /// failure.
    pub best: ResolutionResult,
    pub attempts: Vec<AttemptRecord>,
    pub retry_cycles: u32,
    pub duration: Duration,
    pub failure: Option<ResolveFailure>,
}

impl ResolveOutcome {
    pub fn succeeded(best: ResolutionResult, attempts: Vec<AttemptRecord>, retry_cycles: u32) -> Self {
        Self {
            success: true,
            best,
            attempts,
            retry_cycles,
            duration: Duration::ZERO,
            failure: None,
        }
    }

    pub fn failed(
        best: ResolutionResult,
        attempts: Vec<AttemptRecord>,
        retry_cycles: u32,
        failure: ResolveFailure,
    ) -> Self {
        Self {
            success: false,
            best,
            attempts,
            retry_cycles,
            duration: Duration::ZERO,
            failure: Some(failure),
        }
    }
}

/// Tuning knobs for one resolution run.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Overall deadline for the retry loop.
    pub timeout: Duration,
    /// Sleep between retry cycles.
    pub retry_interval: Duration,
    /// Lowest confidence accepted as a success.
    pub min_confidence: f64,
    /// Confidence that short-circuits the remaining strategies in a cycle.
    pub early_exit_confidence: f64,
    /// Strategy names excluded from this run.
    pub skip_strategies: Vec<String>,
    /// When set, only these strategies run.
    pub only_strategies: Option<Vec<String>>,
    pub enable_retry: bool,
    pub max_retries: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retry_interval: Duration::from_millis(200),
            min_confidence: 0.5,
            early_exit_confidence: 0.85,
            skip_strategies: Vec::new(),
            only_strategies: None,
            enable_retry: true,
            max_retries: 10,
        }
    }
}

impl ResolverConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = min;
        self
    }

    pub fn with_early_exit_confidence(mut self, threshold: f64) -> Self {
        self.early_exit_confidence = threshold;
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.enable_retry = false;
        self
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn skipping(mut self, names: &[&str]) -> Self {
        self.skip_strategies = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn only(mut self, names: &[&str]) -> Self {
        self.only_strategies = Some(names.iter().map(|s| s.to_string()).collect());
        self
    }
}

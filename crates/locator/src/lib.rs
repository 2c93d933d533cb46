//! Element re-finding for recorded interaction steps
//!
//! A recorded step carries a bundle of identifying attributes captured at
//! record time. Pages drift between recording and replay, so no single
//! selector is trusted: ten independent strategies are consulted in priority
//! order, each producing a confidence-scored candidate, and a retry loop
//! keeps taking fresh page snapshots until a candidate clears the acceptance
//! threshold or the deadline passes.
//!
//! ```
//! use replay_core_types::{ElementNode, LocatorBundle, PageModel};
//! use replay_locator::LocatorResolver;
//!
//! # tokio_test::block_on(async {
//! let mut page = PageModel::new("https://example.com/login");
//! page.append_root(ElementNode::new("input").with_id("username"));
//!
//! let resolver = LocatorResolver::new();
//! let bundle = LocatorBundle::new().with_id("username");
//! let outcome = resolver.resolve(&bundle, &page).await;
//! assert!(outcome.success);
//! # });
//! ```

pub mod errors;
pub mod registry;
pub mod resolver;
pub mod scoring;
pub mod strategies;
pub mod types;

pub use errors::LocatorError;
pub use registry::{RegistryState, StrategyRegistry};
pub use resolver::{narrow_root, LocatorResolver};
pub use strategies::{default_strategies, LocateStrategy};
pub use types::{
    AttemptRecord, MatchKind, MatchMetadata, ResolutionResult, ResolveFailure, ResolveOutcome,
    ResolverConfig, StrategyDescriptor,
};

//! Element re-finding strategies
//!
//! Ten independent heuristics, each a pure function of a recorded bundle and
//! a searchable page tree. Default fallback order (lower priority first):
//! xpath, id, data-attrs, name, css, aria, placeholder, text, class,
//! position.

mod attribute;
mod content;
mod selector;
mod spatial;

pub use attribute::{AriaStrategy, DataAttrStrategy, IdStrategy, NameStrategy, PlaceholderStrategy};
pub use content::{ClassStrategy, TextStrategy};
pub use selector::{CssStrategy, XPathStrategy};
pub use spatial::PositionStrategy;

use crate::types::{ResolutionResult, StrategyDescriptor};
use replay_core_types::{LocatorBundle, NodeId, PageModel};
use std::sync::Arc;

/// Capability contract of one matching heuristic.
///
/// `find` never fails for the expected case of "no match" - it returns a
/// result with no element and zero confidence. Unexpected failures
/// (malformed selector, traversal error) are reported through the result's
/// `error` field and likewise never panic past the resolver.
pub trait LocateStrategy: Send + Sync {
    fn descriptor(&self) -> StrategyDescriptor;

    fn name(&self) -> &'static str {
        self.descriptor().name
    }

    /// Cheap precondition: does the bundle carry the attribute this strategy
    /// matches on?
    fn can_handle(&self, bundle: &LocatorBundle) -> bool;

    /// Search `page` for the element the bundle describes.
    fn find(&self, bundle: &LocatorBundle, page: &PageModel) -> ResolutionResult;

    /// Inverse operation used during recording: derive this strategy's
    /// selector from a live element, when one can be derived.
    fn generate_selector(&self, page: &PageModel, node: NodeId) -> Option<String>;

    /// Check a located element against an expected value.
    fn validate(&self, page: &PageModel, node: NodeId, expected: &str) -> bool {
        default_validate(page, node, expected)
    }
}

/// Shared validation: the expected value appears as the element's `value`
/// attribute, aria-label, or (deep) text.
pub(crate) fn default_validate(page: &PageModel, node: NodeId, expected: &str) -> bool {
    let element = page.node(node);
    if element.attr("value") == Some(expected) {
        return true;
    }
    if element.attr("aria-label") == Some(expected) {
        return true;
    }
    page.deep_text(node).contains(expected)
}

/// The full default strategy set in fallback order.
pub fn default_strategies() -> Vec<Arc<dyn LocateStrategy>> {
    vec![
        Arc::new(XPathStrategy),
        Arc::new(IdStrategy),
        Arc::new(DataAttrStrategy),
        Arc::new(NameStrategy),
        Arc::new(CssStrategy),
        Arc::new(AriaStrategy),
        Arc::new(PlaceholderStrategy),
        Arc::new(TextStrategy),
        Arc::new(ClassStrategy),
        Arc::new(PositionStrategy),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_has_ten_strategies_in_priority_order() {
        let strategies = default_strategies();
        assert_eq!(strategies.len(), 10);
        let priorities: Vec<i32> = strategies.iter().map(|s| s.descriptor().priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);
        assert_eq!(strategies[0].name(), "xpath");
        assert_eq!(strategies[1].name(), "id");
        assert_eq!(strategies[9].name(), "position");
    }

    #[test]
    fn empty_bundle_is_handled_by_no_strategy() {
        let bundle = LocatorBundle::new();
        for strategy in default_strategies() {
            assert!(
                !strategy.can_handle(&bundle),
                "strategy '{}' claimed an empty bundle",
                strategy.name()
            );
        }
    }

    #[test]
    fn strategy_names_are_unique() {
        let strategies = default_strategies();
        let mut names: Vec<&str> = strategies.iter().map(|s| s.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), strategies.len());
    }
}

//! Attribute-keyed strategies: id, name, placeholder, aria-label, data-*

use super::LocateStrategy;
use crate::scoring;
use crate::types::{MatchKind, MatchMetadata, ResolutionResult, StrategyDescriptor};
use replay_core_types::{LocatorBundle, NodeId, PageModel};
use tracing::debug;

/// Data attribute keys the recorder treats as test hooks, in preference
/// order. Matched before any other recorded data attribute.
const TEST_ID_KEYS: [&str; 5] = [
    "data-testid",
    "data-test",
    "data-test-id",
    "data-qa",
    "data-cy",
];

/// Shared exact-attribute lookup with secondary-signal disambiguation.
fn find_by_attribute(
    descriptor: &StrategyDescriptor,
    bundle: &LocatorBundle,
    page: &PageModel,
    key: &str,
    value: &str,
) -> ResolutionResult {
    let candidates = page.find_by_attr(key, value);
    match scoring::rank(bundle, page, &candidates) {
        Some(ranked) => {
            if !ranked.decisive {
                debug!(
                    strategy = descriptor.name,
                    candidates = ranked.candidate_count,
                    "ambiguous attribute match"
                );
            }
            ResolutionResult::found(
                descriptor.name,
                ranked.node,
                scoring::exact_confidence(descriptor, &ranked),
                MatchMetadata {
                    kind: MatchKind::Exact,
                    candidate_count: ranked.candidate_count,
                },
            )
        }
        None => ResolutionResult::not_found(descriptor.name),
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// `id` attribute match.
pub struct IdStrategy;

impl LocateStrategy for IdStrategy {
    fn descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor::new("id", 20, 0.90)
    }

    fn can_handle(&self, bundle: &LocatorBundle) -> bool {
        non_empty(&bundle.id)
    }

    fn find(&self, bundle: &LocatorBundle, page: &PageModel) -> ResolutionResult {
        let Some(id) = bundle.id.as_deref() else {
            return ResolutionResult::not_found(self.name());
        };
        find_by_attribute(&self.descriptor(), bundle, page, "id", id)
    }

    fn generate_selector(&self, page: &PageModel, node: NodeId) -> Option<String> {
        page.node(node).id_attr().map(String::from)
    }
}

/// `name` attribute match.
pub struct NameStrategy;

impl LocateStrategy for NameStrategy {
    fn descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor::new("name", 40, 0.85)
    }

    fn can_handle(&self, bundle: &LocatorBundle) -> bool {
        non_empty(&bundle.name)
    }

    fn find(&self, bundle: &LocatorBundle, page: &PageModel) -> ResolutionResult {
        let Some(name) = bundle.name.as_deref() else {
            return ResolutionResult::not_found(self.name());
        };
        find_by_attribute(&self.descriptor(), bundle, page, "name", name)
    }

    fn generate_selector(&self, page: &PageModel, node: NodeId) -> Option<String> {
        page.node(node).name_attr().map(String::from)
    }
}

/// `placeholder` attribute match.
pub struct PlaceholderStrategy;

impl LocateStrategy for PlaceholderStrategy {
    fn descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor::new("placeholder", 70, 0.70)
    }

    fn can_handle(&self, bundle: &LocatorBundle) -> bool {
        non_empty(&bundle.placeholder)
    }

    fn find(&self, bundle: &LocatorBundle, page: &PageModel) -> ResolutionResult {
        let Some(placeholder) = bundle.placeholder.as_deref() else {
            return ResolutionResult::not_found(self.name());
        };
        find_by_attribute(&self.descriptor(), bundle, page, "placeholder", placeholder)
    }

    fn generate_selector(&self, page: &PageModel, node: NodeId) -> Option<String> {
        page.node(node).attr("placeholder").map(String::from)
    }
}

/// `aria-label` match, narrowed to the recorded tag when one is present and
/// at least one candidate carries it.
pub struct AriaStrategy;

impl LocateStrategy for AriaStrategy {
    fn descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor::new("aria", 60, 0.75)
    }

    fn can_handle(&self, bundle: &LocatorBundle) -> bool {
        non_empty(&bundle.aria)
    }

    fn find(&self, bundle: &LocatorBundle, page: &PageModel) -> ResolutionResult {
        let Some(label) = bundle.aria.as_deref() else {
            return ResolutionResult::not_found(self.name());
        };
        let mut candidates = page.find_by_attr("aria-label", label);
        if let Some(tag) = bundle.tag.as_deref() {
            let tagged: Vec<NodeId> = candidates
                .iter()
                .copied()
                .filter(|id| page.node(*id).tag.eq_ignore_ascii_case(tag))
                .collect();
            if !tagged.is_empty() {
                candidates = tagged;
            }
        }
        let descriptor = self.descriptor();
        match scoring::rank(bundle, page, &candidates) {
            Some(ranked) => ResolutionResult::found(
                descriptor.name,
                ranked.node,
                scoring::exact_confidence(&descriptor, &ranked),
                MatchMetadata {
                    kind: MatchKind::Exact,
                    candidate_count: ranked.candidate_count,
                },
            ),
            None => ResolutionResult::not_found(descriptor.name),
        }
    }

    fn generate_selector(&self, page: &PageModel, node: NodeId) -> Option<String> {
        page.node(node).attr("aria-label").map(String::from)
    }
}

/// Recorded `data-*` attribute match. A candidate matching every recorded
/// data attribute is exact; a candidate matching only some of them is a
/// partial match with the penalty scaled by coverage.
pub struct DataAttrStrategy;

impl DataAttrStrategy {
    /// Recorded keys in match preference order: known test-id keys first,
    /// then the rest in map order.
    fn ordered_keys(bundle: &LocatorBundle) -> Vec<&str> {
        let mut keys: Vec<&str> = TEST_ID_KEYS
            .iter()
            .copied()
            .filter(|k| bundle.data_attrs.contains_key(*k))
            .collect();
        for key in bundle.data_attrs.keys() {
            if !keys.contains(&key.as_str()) {
                keys.push(key);
            }
        }
        keys
    }
}

impl LocateStrategy for DataAttrStrategy {
    fn descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor::new("data-attrs", 30, 0.88)
    }

    fn can_handle(&self, bundle: &LocatorBundle) -> bool {
        !bundle.data_attrs.is_empty()
    }

    fn find(&self, bundle: &LocatorBundle, page: &PageModel) -> ResolutionResult {
        let descriptor = self.descriptor();
        let total = bundle.data_attrs.len();
        if total == 0 {
            return ResolutionResult::not_found(descriptor.name);
        }

        // Full matches: every recorded data attribute present and equal.
        let full: Vec<NodeId> = page.find_where(|n| {
            bundle
                .data_attrs
                .iter()
                .all(|(k, v)| n.attr(k) == Some(v.as_str()))
        });
        if let Some(ranked) = scoring::rank(bundle, page, &full) {
            return ResolutionResult::found(
                descriptor.name,
                ranked.node,
                scoring::exact_confidence(&descriptor, &ranked),
                MatchMetadata {
                    kind: MatchKind::Exact,
                    candidate_count: ranked.candidate_count,
                },
            );
        }

        // Partial fallback: first key (test-id keys preferred) that still
        // matches something.
        for key in Self::ordered_keys(bundle) {
            let value = &bundle.data_attrs[key];
            let candidates = page.find_by_attr(key, value);
            if let Some(ranked) = scoring::rank(bundle, page, &candidates) {
                let matched = bundle
                    .data_attrs
                    .iter()
                    .filter(|(k, v)| page.node(ranked.node).attr(k) == Some(v.as_str()))
                    .count();
                return ResolutionResult::found(
                    descriptor.name,
                    ranked.node,
                    scoring::partial_confidence(&descriptor, matched as f64 / total as f64),
                    MatchMetadata {
                        kind: MatchKind::Partial,
                        candidate_count: ranked.candidate_count,
                    },
                );
            }
        }

        ResolutionResult::not_found(descriptor.name)
    }

    fn generate_selector(&self, page: &PageModel, node: NodeId) -> Option<String> {
        let element = page.node(node);
        for key in TEST_ID_KEYS {
            if let Some(value) = element.attr(key) {
                return Some(format!("[{}=\"{}\"]", key, value));
            }
        }
        None
    }
}

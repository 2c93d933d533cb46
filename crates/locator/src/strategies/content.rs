//! Content-driven strategies: visible text and class lists
//!
//! Both are weak signals. Text falls back from exact to contains matching
//! with a partial penalty, and class matching tolerates missing classes the
//! same way. They sit near the bottom of the fallback chain on purpose.

use super::LocateStrategy;
use crate::scoring;
use crate::types::{MatchKind, MatchMetadata, ResolutionResult, StrategyDescriptor};
use replay_core_types::{LocatorBundle, NodeId, PageModel};
use tracing::debug;

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Matches on the element's visible text.
///
/// Exact own-text equality first; when nothing matches exactly, elements
/// whose own text merely contains the recorded text are accepted with a
/// partial penalty.
pub struct TextStrategy;

impl TextStrategy {
    fn exact_candidates(page: &PageModel, wanted: &str) -> Vec<NodeId> {
        page.find_where(|n| n.text.as_deref().map(str::trim) == Some(wanted))
    }

    fn contains_candidates(page: &PageModel, wanted: &str) -> Vec<NodeId> {
        page.find_where(|n| n.text.as_deref().is_some_and(|t| t.contains(wanted)))
    }
}

impl LocateStrategy for TextStrategy {
    fn descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor::new("text", 80, 0.65)
    }

    fn can_handle(&self, bundle: &LocatorBundle) -> bool {
        non_empty(&bundle.text)
    }

    fn find(&self, bundle: &LocatorBundle, page: &PageModel) -> ResolutionResult {
        let descriptor = self.descriptor();
        let Some(wanted) = bundle.text.as_deref().map(str::trim) else {
            return ResolutionResult::not_found(descriptor.name);
        };
        if wanted.is_empty() {
            return ResolutionResult::not_found(descriptor.name);
        }

        let exact = Self::exact_candidates(page, wanted);
        if let Some(ranked) = scoring::rank(bundle, page, &exact) {
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

        let contains = Self::contains_candidates(page, wanted);
        match scoring::rank(bundle, page, &contains) {
            Some(ranked) => {
                let actual_len = page
                    .node(ranked.node)
                    .text
                    .as_deref()
                    .map(|t| t.trim().len())
                    .unwrap_or(wanted.len())
                    .max(wanted.len());
                let completeness = wanted.len() as f64 / actual_len as f64;
                debug!(
                    text = wanted,
                    candidates = ranked.candidate_count,
                    "text matched by containment"
                );
                ResolutionResult::found(
                    descriptor.name,
                    ranked.node,
                    scoring::partial_confidence(&descriptor, completeness),
                    MatchMetadata {
                        kind: MatchKind::Partial,
                        candidate_count: ranked.candidate_count,
                    },
                )
            }
            None => ResolutionResult::not_found(descriptor.name),
        }
    }

    fn generate_selector(&self, page: &PageModel, node: NodeId) -> Option<String> {
        page.node(node)
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }
}

/// Matches on class-list overlap, optionally narrowed by the recorded tag.
pub struct ClassStrategy;

impl ClassStrategy {
    fn overlap(bundle: &LocatorBundle, page: &PageModel, id: NodeId) -> usize {
        let node = page.node(id);
        bundle.classes.iter().filter(|c| node.has_class(c)).count()
    }
}

impl LocateStrategy for ClassStrategy {
    fn descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor::new("class", 90, 0.55)
    }

    fn can_handle(&self, bundle: &LocatorBundle) -> bool {
        !bundle.classes.is_empty()
    }

    fn find(&self, bundle: &LocatorBundle, page: &PageModel) -> ResolutionResult {
        let descriptor = self.descriptor();
        if bundle.classes.is_empty() {
            return ResolutionResult::not_found(descriptor.name);
        }

        let tag_filter =
            |id: &NodeId| bundle.tag.as_deref().is_none_or(|t| page.node(*id).tag == t);

        // Full class-set match first.
        let full: Vec<NodeId> = page
            .find_where(|n| bundle.classes.iter().all(|c| n.has_class(c)))
            .into_iter()
            .filter(tag_filter)
            .collect();
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

        // Fall back to the best partial overlap.
        let partial: Vec<NodeId> = page
            .ids()
            .filter(|id| Self::overlap(bundle, page, *id) > 0)
            .filter(tag_filter)
            .collect();
        match scoring::rank(bundle, page, &partial) {
            Some(ranked) => {
                let completeness =
                    Self::overlap(bundle, page, ranked.node) as f64 / bundle.classes.len() as f64;
                ResolutionResult::found(
                    descriptor.name,
                    ranked.node,
                    scoring::partial_confidence(&descriptor, completeness),
                    MatchMetadata {
                        kind: MatchKind::Partial,
                        candidate_count: ranked.candidate_count,
                    },
                )
            }
            None => ResolutionResult::not_found(descriptor.name),
        }
    }

    fn generate_selector(&self, page: &PageModel, node: NodeId) -> Option<String> {
        let classes = &page.node(node).classes;
        if classes.is_empty() {
            return None;
        }
        Some(format!(".{}", classes.join(".")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_core_types::ElementNode;

    fn page() -> PageModel {
        let mut page = PageModel::new("https://example.com");
        let body = page.append_root(ElementNode::new("body"));
        page.append(
            body,
            ElementNode::new("button")
                .with_class("btn")
                .with_class("primary")
                .with_text("Submit"),
        );
        page.append(
            body,
            ElementNode::new("a")
                .with_class("btn")
                .with_text("Submit your application"),
        );
        page
    }

    #[test]
    fn text_exact_match_beats_containment() {
        let page = page();
        let bundle = LocatorBundle::new().with_text("Submit");
        let result = TextStrategy.find(&bundle, &page);
        assert!(result.is_found());
        assert_eq!(result.metadata.unwrap().kind, MatchKind::Exact);
        let button = page.find_by_tag("button")[0];
        assert_eq!(result.element, Some(button));
    }

    #[test]
    fn text_containment_takes_partial_penalty() {
        let page = page();
        let bundle = LocatorBundle::new().with_text("your application");
        let result = TextStrategy.find(&bundle, &page);
        assert!(result.is_found());
        assert_eq!(result.metadata.unwrap().kind, MatchKind::Partial);
        assert!(result.confidence < 0.65 - scoring::PARTIAL_MATCH_PENALTY + 1e-9);
    }

    #[test]
    fn text_miss_is_clean() {
        let page = page();
        let bundle = LocatorBundle::new().with_text("Cancel");
        let result = TextStrategy.find(&bundle, &page);
        assert!(!result.is_found());
        assert!(result.error.is_none());
    }

    #[test]
    fn full_class_set_is_exact() {
        let page = page();
        let bundle = LocatorBundle::new()
            .with_classes(vec!["btn".to_string(), "primary".to_string()]);
        let result = ClassStrategy.find(&bundle, &page);
        assert!(result.is_found());
        assert_eq!(result.metadata.unwrap().kind, MatchKind::Exact);
        assert!((result.confidence - 0.55).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_class_overlap_is_penalized() {
        let page = page();
        let bundle = LocatorBundle::new()
            .with_classes(vec!["primary".to_string(), "rounded".to_string()]);
        let result = ClassStrategy.find(&bundle, &page);
        assert!(result.is_found());
        assert_eq!(result.metadata.unwrap().kind, MatchKind::Partial);
        assert!(result.confidence < 0.55);
    }

    #[test]
    fn class_match_respects_recorded_tag() {
        let page = page();
        let bundle = LocatorBundle::new()
            .with_tag("a")
            .with_classes(vec!["btn".to_string()]);
        let result = ClassStrategy.find(&bundle, &page);
        let anchor = page.find_by_tag("a")[0];
        assert_eq!(result.element, Some(anchor));
        // Tag narrowed the field to one candidate.
        assert_eq!(result.metadata.unwrap().candidate_count, 1);
    }

    #[test]
    fn class_selector_generation() {
        let page = page();
        let button = page.find_by_tag("button")[0];
        assert_eq!(
            ClassStrategy.generate_selector(&page, button).as_deref(),
            Some(".btn.primary")
        );
        let body = page.find_by_tag("body")[0];
        assert!(ClassStrategy.generate_selector(&page, body).is_none());
    }
}

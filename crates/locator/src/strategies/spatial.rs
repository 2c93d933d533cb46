//! Position-based fallback strategy
//!
//! Last resort when every attribute and selector signal has drifted: match
//! the element whose bounding box sits closest to the recorded one. Only
//! visible elements within a cutoff radius are considered, narrowed to the
//! recorded tag when one is present.

use super::LocateStrategy;
use crate::scoring;
use crate::types::{MatchKind, MatchMetadata, ResolutionResult, StrategyDescriptor};
use replay_core_types::{LocatorBundle, NodeId, PageModel};
use tracing::debug;

/// Candidates beyond this center-to-center distance are not considered.
const MAX_DISTANCE_PX: f64 = scoring::FAR_DISTANCE_PX;
/// The runner-up must be at least this much farther away for the match to
/// count as unambiguous.
const AMBIGUITY_DISTANCE_PX: f64 = 15.0;

pub struct PositionStrategy;

impl LocateStrategy for PositionStrategy {
    fn descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor::new("position", 100, 0.40)
    }

    fn can_handle(&self, bundle: &LocatorBundle) -> bool {
        bundle.bounding.is_some()
    }

    fn find(&self, bundle: &LocatorBundle, page: &PageModel) -> ResolutionResult {
        let descriptor = self.descriptor();
        let Some(recorded) = &bundle.bounding else {
            return ResolutionResult::not_found(descriptor.name);
        };

        let mut candidates: Vec<(NodeId, f64)> = page
            .ids()
            .filter_map(|id| {
                let node = page.node(id);
                if !node.visible {
                    return None;
                }
                if let Some(tag) = &bundle.tag {
                    if node.tag != *tag {
                        return None;
                    }
                }
                let distance = recorded.distance_to(node.bounding.as_ref()?);
                (distance <= MAX_DISTANCE_PX).then_some((id, distance))
            })
            .collect();
        candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let Some(&(winner, distance)) = candidates.first() else {
            return ResolutionResult::not_found(descriptor.name);
        };

        let decisive = match candidates.get(1) {
            Some(&(_, runner_up)) => runner_up - distance >= AMBIGUITY_DISTANCE_PX,
            None => true,
        };
        let confidence = if decisive {
            descriptor.base_confidence
        } else {
            (descriptor.base_confidence - scoring::ambiguity_penalty(candidates.len())).max(0.0)
        };
        debug!(
            distance,
            candidates = candidates.len(),
            decisive,
            "positional match"
        );

        ResolutionResult::found(
            descriptor.name,
            winner,
            confidence,
            MatchMetadata {
                kind: MatchKind::Positional,
                candidate_count: candidates.len(),
            },
        )
    }

    /// Position has no selector form.
    fn generate_selector(&self, _page: &PageModel, _node: NodeId) -> Option<String> {
        None
    }
}

//! Candidate scoring and penalty arithmetic
//!
//! Heuristic tuning values live here as named constants so they stay
//! independently testable and adjustable. Two penalty mechanisms exist and
//! are mutually exclusive on any one result: a partial-match penalty for
//! weak-signal matches, and an ambiguity penalty when several candidates are
//! too close to call.

use crate::types::StrategyDescriptor;
use replay_core_types::{LocatorBundle, NodeId, PageModel};

/// Winner must beat the runner-up by at least this much to be decisive.
pub const AMBIGUITY_MARGIN: f64 = 0.2;
/// Ambiguity penalty grows with each extra candidate...
pub const AMBIGUITY_PENALTY_STEP: f64 = 0.05;
/// ...up to this cap.
pub const AMBIGUITY_PENALTY_MAX: f64 = 0.3;
/// Flat penalty for matches on weak signals (contains-text, partial class set).
pub const PARTIAL_MATCH_PENALTY: f64 = 0.15;

// Secondary ranking signals. These order candidates within one strategy;
// they never raise confidence above the strategy's base.
pub const TAG_MATCH_BONUS: f64 = 0.05;
pub const ID_MATCH_BONUS: f64 = 0.10;
pub const NAME_MATCH_BONUS: f64 = 0.08;
pub const CLASS_OVERLAP_BONUS_MAX: f64 = 0.10;

/// Bounding-box distance bands, page pixels.
pub const NEAR_DISTANCE_PX: f64 = 20.0;
pub const MID_DISTANCE_PX: f64 = 100.0;
pub const FAR_DISTANCE_PX: f64 = 300.0;
pub const NEAR_DISTANCE_BONUS: f64 = 0.10;
pub const MID_DISTANCE_BONUS: f64 = 0.05;
pub const FAR_DISTANCE_BONUS: f64 = 0.02;

/// The winner of a ranking pass.
#[derive(Debug, Clone, Copy)]
pub struct Ranked {
    pub node: NodeId,
    pub score: f64,
    pub candidate_count: usize,
    /// True when the winner is clearly better than the runner-up.
    pub decisive: bool,
}

/// Secondary-signal score of one candidate against the recorded bundle.
pub fn secondary_score(bundle: &LocatorBundle, page: &PageModel, id: NodeId) -> f64 {
    let node = page.node(id);
    let mut score = 0.0;

    if let Some(tag) = &bundle.tag {
        if node.tag.eq_ignore_ascii_case(tag) {
            score += TAG_MATCH_BONUS;
        }
    }
    if let Some(want) = &bundle.id {
        if node.id_attr() == Some(want.as_str()) {
            score += ID_MATCH_BONUS;
        }
    }
    if let Some(want) = &bundle.name {
        if node.name_attr() == Some(want.as_str()) {
            score += NAME_MATCH_BONUS;
        }
    }
    if !bundle.classes.is_empty() {
        let overlap = bundle
            .classes
            .iter()
            .filter(|c| node.has_class(c))
            .count() as f64;
        score += CLASS_OVERLAP_BONUS_MAX * (overlap / bundle.classes.len() as f64);
    }
    if let (Some(recorded), Some(actual)) = (&bundle.bounding, &node.bounding) {
        score += distance_bonus(recorded.distance_to(actual));
    }

    score
}

/// Near/mid/far confidence bonus for a center-to-center distance.
pub fn distance_bonus(distance: f64) -> f64 {
    if distance <= NEAR_DISTANCE_PX {
        NEAR_DISTANCE_BONUS
    } else if distance <= MID_DISTANCE_PX {
        MID_DISTANCE_BONUS
    } else if distance <= FAR_DISTANCE_PX {
        FAR_DISTANCE_BONUS
    } else {
        0.0
    }
}

/// Rank candidates on secondary signals; the caller turns the winner into a
/// confidence via [`exact_confidence`] or [`partial_confidence`].
pub fn rank(bundle: &LocatorBundle, page: &PageModel, candidates: &[NodeId]) -> Option<Ranked> {
    if candidates.is_empty() {
        return None;
    }

    let mut scored: Vec<(NodeId, f64)> = candidates
        .iter()
        .map(|id| (*id, secondary_score(bundle, page, *id)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let (node, score) = scored[0];
    let decisive = match scored.get(1) {
        Some((_, runner_up)) => score - runner_up >= AMBIGUITY_MARGIN,
        None => true,
    };

    Some(Ranked {
        node,
        score,
        candidate_count: candidates.len(),
        decisive,
    })
}

/// Penalty proportional to how crowded the candidate field was.
pub fn ambiguity_penalty(candidate_count: usize) -> f64 {
    (AMBIGUITY_PENALTY_STEP * candidate_count.saturating_sub(1) as f64).min(AMBIGUITY_PENALTY_MAX)
}

/// Confidence for an exact match: the base, docked only when the field was
/// ambiguous. A single candidate always earns the full base confidence.
pub fn exact_confidence(descriptor: &StrategyDescriptor, ranked: &Ranked) -> f64 {
    if ranked.decisive {
        descriptor.base_confidence
    } else {
        (descriptor.base_confidence - ambiguity_penalty(ranked.candidate_count)).max(0.0)
    }
}

/// Confidence for a partial match: flat penalty scaled by how incomplete the
/// match was (`completeness` in 0..=1, 1 meaning everything matched). The
/// ambiguity penalty never stacks on top of this.
pub fn partial_confidence(descriptor: &StrategyDescriptor, completeness: f64) -> f64 {
    let completeness = completeness.clamp(0.0, 1.0);
    (descriptor.base_confidence - PARTIAL_MATCH_PENALTY * (2.0 - completeness)).max(0.05)
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_core_types::{BoundingBox, ElementNode};

    const TEST_DESC: StrategyDescriptor = StrategyDescriptor::new("test", 10, 0.9);

    fn page_with_two_buttons() -> PageModel {
        let mut page = PageModel::new("https://example.com");
        page.append_root(
            ElementNode::new("button")
                .with_id("save")
                .with_class("primary")
                .with_bounding(BoundingBox::new(10.0, 10.0, 80.0, 30.0)),
        );
        page.append_root(
            ElementNode::new("a")
                .with_class("secondary")
                .with_bounding(BoundingBox::new(400.0, 400.0, 80.0, 30.0)),
        );
        page
    }

    #[test]
    fn secondary_signals_prefer_matching_tag_and_id() {
        let page = page_with_two_buttons();
        let bundle = LocatorBundle::new()
            .with_tag("button")
            .with_id("save")
            .with_bounding(BoundingBox::new(10.0, 10.0, 80.0, 30.0));
        let candidates: Vec<NodeId> = page.ids().skip(1).collect();

        let ranked = rank(&bundle, &page, &candidates).unwrap();
        assert_eq!(ranked.node, NodeId(1));
        assert!(ranked.decisive);
        assert_eq!(ranked.candidate_count, 2);
    }

    #[test]
    fn single_candidate_earns_full_base_confidence() {
        let page = page_with_two_buttons();
        let bundle = LocatorBundle::new();
        let ranked = rank(&bundle, &page, &[NodeId(1)]).unwrap();
        assert!((exact_confidence(&TEST_DESC, &ranked) - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn indistinguishable_candidates_are_penalized() {
        let page = page_with_two_buttons();
        // No secondary signals at all: both score 0, not decisive.
        let bundle = LocatorBundle::new();
        let candidates: Vec<NodeId> = page.ids().skip(1).collect();
        let ranked = rank(&bundle, &page, &candidates).unwrap();
        assert!(!ranked.decisive);
        let confidence = exact_confidence(&TEST_DESC, &ranked);
        assert!((confidence - (0.9 - AMBIGUITY_PENALTY_STEP)).abs() < f64::EPSILON);
    }

    #[test]
    fn ambiguity_penalty_is_capped() {
        assert!((ambiguity_penalty(2) - AMBIGUITY_PENALTY_STEP).abs() < f64::EPSILON);
        assert!((ambiguity_penalty(100) - AMBIGUITY_PENALTY_MAX).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_confidence_scales_with_completeness() {
        let full = partial_confidence(&TEST_DESC, 1.0);
        let half = partial_confidence(&TEST_DESC, 0.5);
        assert!((full - (0.9 - PARTIAL_MATCH_PENALTY)).abs() < f64::EPSILON);
        assert!(half < full);
        assert!(half >= 0.05);
    }

    #[test]
    fn distance_bands() {
        assert_eq!(distance_bonus(5.0), NEAR_DISTANCE_BONUS);
        assert_eq!(distance_bonus(50.0), MID_DISTANCE_BONUS);
        assert_eq!(distance_bonus(200.0), FAR_DISTANCE_BONUS);
        assert_eq!(distance_bonus(1000.0), 0.0);
    }
}

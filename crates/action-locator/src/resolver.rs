//! Deterministic selector resolution against a snapshot
//!
//! Resolution is a pure function of `(selector, snapshot)`: every predicate is
//! evaluated into a boolean mask over the snapshot arena, so results always
//! come back in document order and never depend on live UI state.

use perceiver_structural::{ElementRef, NodeIndex, ScreenSnapshot, UiElement};
use tracing::debug;

use crate::types::{Pick, Predicate, Relation, Selector, TextMatch};

/// Maximum center-to-center distance for `near(..)`
pub const NEAR_DISTANCE: f64 = 50.0;

/// Outcome of resolving one selector
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    /// Matching elements in document order, after the pick policy
    pub matches: Vec<NodeIndex>,
    /// Index of the alternative that produced the matches
    pub alternative: Option<usize>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// True when a fallback rather than the primary predicate matched
    pub fn used_fallback(&self) -> bool {
        matches!(self.alternative, Some(i) if i > 0)
    }

    pub fn refs(&self, snapshot: &ScreenSnapshot) -> Vec<ElementRef> {
        self.matches
            .iter()
            .filter_map(|index| snapshot.element_ref(*index))
            .collect()
    }
}

/// Resolves selectors to element references
pub trait ElementResolver: Send + Sync {
    fn resolve(&self, selector: &Selector, snapshot: &ScreenSnapshot) -> Resolution;
}

/// Mask-based resolver used by the executor
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultElementResolver;

impl ElementResolver for DefaultElementResolver {
    fn resolve(&self, selector: &Selector, snapshot: &ScreenSnapshot) -> Resolution {
        for (position, alternative) in selector.alternatives.iter().enumerate() {
            let mask = evaluate(alternative, snapshot);
            let matched: Vec<NodeIndex> = mask
                .iter()
                .enumerate()
                .filter_map(|(index, hit)| hit.then_some(index))
                .collect();
            let picked = apply_pick(selector.pick, matched);
            if !picked.is_empty() {
                debug!(
                    selector = %selector,
                    alternative = position,
                    matches = picked.len(),
                    "selector resolved"
                );
                return Resolution {
                    matches: picked,
                    alternative: Some(position),
                };
            }
        }
        debug!(selector = %selector, "selector matched nothing");
        Resolution::default()
    }
}

/// Resolve `selector` against `snapshot` into element references
pub fn resolve(selector: &Selector, snapshot: &ScreenSnapshot) -> Vec<ElementRef> {
    DefaultElementResolver
        .resolve(selector, snapshot)
        .refs(snapshot)
}

fn apply_pick(pick: Pick, matched: Vec<NodeIndex>) -> Vec<NodeIndex> {
    match pick {
        Pick::Unique => matched,
        Pick::First => matched.first().copied().into_iter().collect(),
        Pick::Last => matched.last().copied().into_iter().collect(),
        Pick::Nth(n) => matched.get(n).copied().into_iter().collect(),
    }
}

fn evaluate(predicate: &Predicate, snapshot: &ScreenSnapshot) -> Vec<bool> {
    match predicate {
        Predicate::Id(_)
        | Predicate::Role(_)
        | Predicate::Text { .. }
        | Predicate::Enabled(_)
        | Predicate::Visible(_) => snapshot
            .iter()
            .map(|(_, element)| matches_attribute(predicate, element))
            .collect(),
        Predicate::And(items) => {
            let mut mask = vec![true; snapshot.len()];
            for item in items {
                let other = evaluate(item, snapshot);
                for (hit, next) in mask.iter_mut().zip(other) {
                    *hit &= next;
                }
            }
            mask
        }
        Predicate::Has(inner) => {
            let inner = evaluate(inner, snapshot);
            // Children always follow their parent in the arena, so a reverse
            // sweep sees every child before the parent.
            let mut has = vec![false; snapshot.len()];
            for index in (0..snapshot.len()).rev() {
                if let Some(element) = snapshot.get(index) {
                    has[index] = element
                        .children
                        .iter()
                        .any(|child| inner[*child] || has[*child]);
                }
            }
            has
        }
        Predicate::Descendant { ancestor, target } => {
            let ancestors = evaluate(ancestor, snapshot);
            let targets = evaluate(target, snapshot);
            let mut inside = vec![false; snapshot.len()];
            for (index, element) in snapshot.iter() {
                if let Some(parent) = element.parent {
                    inside[index] = ancestors[parent] || inside[parent];
                }
            }
            inside
                .into_iter()
                .zip(targets)
                .map(|(inside, target)| inside && target)
                .collect()
        }
        Predicate::Relative { relation, anchor } => {
            let anchors = evaluate(anchor, snapshot);
            let mut mask = vec![false; snapshot.len()];
            let Some(anchor_index) = anchors.iter().position(|hit| *hit) else {
                return mask;
            };
            let Some(anchor_element) = snapshot.get(anchor_index) else {
                return mask;
            };
            let excluded: Vec<NodeIndex> = std::iter::once(anchor_index)
                .chain(snapshot.ancestors(anchor_index).map(|(index, _)| index))
                .collect();
            for (index, element) in snapshot.iter() {
                if excluded.contains(&index) || element.bounds.is_empty() {
                    continue;
                }
                mask[index] = in_relation(*relation, element, anchor_element);
            }
            mask
        }
    }
}

fn matches_attribute(predicate: &Predicate, element: &UiElement) -> bool {
    match predicate {
        Predicate::Id(id) => element.id == *id,
        Predicate::Role(role) => element.role.eq_ignore_ascii_case(role),
        Predicate::Text { value, mode } => {
            let Some(text) = element.visible_text() else {
                return false;
            };
            match mode {
                TextMatch::Exact => text == value.trim(),
                TextMatch::Contains => text.to_lowercase().contains(&value.to_lowercase()),
                TextMatch::Prefix => text.to_lowercase().starts_with(&value.to_lowercase()),
            }
        }
        Predicate::Enabled(flag) => element.enabled == *flag,
        Predicate::Visible(flag) => element.visible == *flag,
        _ => false,
    }
}

fn in_relation(relation: Relation, element: &UiElement, anchor: &UiElement) -> bool {
    let (el, an) = (&element.bounds, &anchor.bounds);
    match relation {
        Relation::Below => el.y >= an.bottom(),
        Relation::Above => el.bottom() <= an.y,
        Relation::RightOf => el.x >= an.right(),
        Relation::LeftOf => el.right() <= an.x,
        Relation::Near => el.center_distance(an) <= NEAR_DISTANCE,
    }
}

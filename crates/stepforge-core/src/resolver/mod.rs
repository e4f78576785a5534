//! Self-healing element resolution.
//!
//! `ElementResolver::find_element` tries, in order and stopping at the first
//! hit: the primary selector, each fallback, visual matching, semantic
//! matching. A fallback hit feeds the selector-confidence store.

pub mod semantic;
pub mod visual;

use std::sync::Arc;

use serde::Serialize;
use stepforge_types::config::ResolverConfig;
use stepforge_types::element::ElementInfo;
use stepforge_types::error::PageError;
use stepforge_types::selector::Selector;
use stepforge_types::timing::WaitCondition;

use crate::page::BoxPage;
use crate::repository::selector::SelectorStore;

use self::semantic::SemanticMatcher;
use self::visual::VisualMatcher;

/// Confidence assigned to a selector the first time it is scored.
const INITIAL_CONFIDENCE: f64 = 0.5;

/// Exponential smoothing factor for confidence updates.
const LEARNING_RATE: f64 = 0.2;

/// Which strategy located the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ResolutionStrategy {
    Primary,
    Fallback { index: usize },
    Visual,
    Semantic,
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionStrategy::Primary => write!(f, "primary"),
            ResolutionStrategy::Fallback { index } => write!(f, "fallback[{index}]"),
            ResolutionStrategy::Visual => write!(f, "visual"),
            ResolutionStrategy::Semantic => write!(f, "semantic"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub element: ElementInfo,
    pub strategy: ResolutionStrategy,
    /// The selector string that matched, for string strategies.
    pub matched_selector: Option<String>,
    /// Matcher score, for visual and semantic strategies.
    pub score: Option<f64>,
    /// Wait condition the element satisfied, when found by waiting.
    pub condition: Option<WaitCondition>,
}

pub struct ElementResolver {
    store: Arc<dyn SelectorStore>,
    visual: VisualMatcher,
    semantic: SemanticMatcher,
    learning_order: bool,
}

impl ElementResolver {
    pub fn new(store: Arc<dyn SelectorStore>, config: &ResolverConfig) -> Self {
        Self {
            store,
            visual: VisualMatcher::new(config.visual_threshold),
            semantic: SemanticMatcher::new(config.semantic_floor),
            learning_order: config.learning_order,
        }
    }

    pub async fn find_element(
        &self,
        selector: &Selector,
        page: &BoxPage,
    ) -> Result<Option<Resolution>, PageError> {
        if let Some(element) = page.query(&selector.primary).await? {
            return Ok(Some(Resolution {
                element,
                strategy: ResolutionStrategy::Primary,
                matched_selector: Some(selector.primary.clone()),
                score: None,
                condition: None,
            }));
        }

        for (index, fallback) in self.fallback_order(selector) {
            if let Some(element) = page.query(fallback).await? {
                tracing::debug!(
                    primary = %selector.primary,
                    fallback,
                    index,
                    "resolved element through fallback selector"
                );
                self.update_selector_strategy(selector, fallback);
                return Ok(Some(Resolution {
                    element,
                    strategy: ResolutionStrategy::Fallback { index },
                    matched_selector: Some(fallback.to_string()),
                    score: None,
                    condition: None,
                }));
            }
        }

        if let Some(fingerprint) = &selector.visual_fingerprint {
            if let Some(found) = self.visual.find_similar_element(fingerprint, page).await? {
                tracing::debug!(primary = %selector.primary, score = found.score, "resolved element visually");
                return Ok(Some(Resolution {
                    element: found.element,
                    strategy: ResolutionStrategy::Visual,
                    matched_selector: None,
                    score: Some(found.score),
                    condition: None,
                }));
            }
        }

        if let Some(context) = &selector.semantic_context {
            if let Some(found) = self.semantic.find_by_semantic_context(context, page).await? {
                tracing::debug!(primary = %selector.primary, score = found.score, "resolved element semantically");
                return Ok(Some(Resolution {
                    element: found.element,
                    strategy: ResolutionStrategy::Semantic,
                    matched_selector: None,
                    score: Some(found.score),
                    condition: None,
                }));
            }
        }

        Ok(None)
    }

    /// Raise confidence in `matched` and lower it in the primary that missed.
    pub fn update_selector_strategy(&self, selector: &Selector, matched: &str) {
        let hit_key = selector.confidence_key(matched);
        let hit = self.store.get(&hit_key).unwrap_or(INITIAL_CONFIDENCE);
        self.store
            .set(&hit_key, hit * (1.0 - LEARNING_RATE) + LEARNING_RATE);

        let miss_key = selector.confidence_key(&selector.primary);
        let miss = self.store.get(&miss_key).unwrap_or(INITIAL_CONFIDENCE);
        self.store.set(&miss_key, miss * (1.0 - LEARNING_RATE));
    }

    /// Fallbacks with their declared index, reordered by learned confidence
    /// when learning order is enabled. The sort is stable, so ties keep the
    /// declared order.
    fn fallback_order<'a>(&self, selector: &'a Selector) -> Vec<(usize, &'a str)> {
        let mut ordered: Vec<(usize, &str)> = selector
            .fallbacks
            .iter()
            .map(String::as_str)
            .enumerate()
            .collect();
        if self.learning_order {
            let weight = |s: &str| self.store.get(&selector.confidence_key(s)).unwrap_or(0.0);
            ordered.sort_by(|a, b| weight(b.1).total_cmp(&weight(a.1)));
        }
        ordered
    }
}

//! Tier-based model selection.
//!
//! The [`ModelRouter`] holds a catalog of `{id, tier, rates}` entries and
//! answers "which model for this tier, given this budget". Within a tier,
//! ties break toward the lowest input cost. The budget hint is advisory:
//! when the tier's cheapest candidate still looks too expensive for the
//! hint, the router steps down a tier rather than refuse.

use tracing::debug;

use crate::types::{ModelEntry, ModelTier};

/// Nominal token counts used to turn per-million rates into a per-call
/// estimate for the advisory budget check.
const EST_INPUT_TOKENS: f64 = 2_000.0;
const EST_OUTPUT_TOKENS: f64 = 1_000.0;

/// Selects a model id for a requested complexity tier.
#[derive(Debug, Clone, Default)]
pub struct ModelRouter {
    entries: Vec<ModelEntry>,
}

impl ModelRouter {
    /// Build a router over a model catalog.
    pub fn new(entries: Vec<ModelEntry>) -> Self {
        Self { entries }
    }

    /// Build a router from a provider's catalog.
    pub fn from_provider(provider: &dyn crate::provider::Provider) -> Self {
        Self::new(provider.model_entries())
    }

    /// Select a model for `tier`.
    ///
    /// Returns the cheapest-input entry of the requested tier. When
    /// `budget_usd` is positive and even the cheapest entry's estimated
    /// call cost exceeds it, the router steps down one tier at a time
    /// (never up) and takes the first tier that fits; if nothing fits the
    /// Simple tier's pick is returned anyway. Tiers with no entries fall
    /// through to the next lower tier. Returns `None` only when the
    /// catalog is empty.
    pub fn select(&self, tier: ModelTier, budget_usd: f64) -> Option<String> {
        let mut current = tier;
        let mut fallback: Option<&ModelEntry> = None;
        loop {
            if let Some(entry) = self.cheapest_in(current) {
                fallback = Some(entry);
                if budget_usd <= 0.0 || estimate_call_cost(entry) <= budget_usd {
                    debug!(model = %entry.id, tier = ?current, "model selected");
                    return Some(entry.id.clone());
                }
            }
            current = match lower(current) {
                Some(t) => t,
                None => break,
            };
        }
        // Nothing fit the budget (or upper tiers were empty); advisory
        // means we still answer with the cheapest thing we saw.
        let picked = fallback.or_else(|| self.cheapest_any())?;
        debug!(model = %picked.id, "model selected over budget (advisory)");
        Some(picked.id.clone())
    }

    /// All entries of one tier.
    pub fn entries_for(&self, tier: ModelTier) -> Vec<&ModelEntry> {
        self.entries.iter().filter(|e| e.tier == tier).collect()
    }

    /// True when the catalog holds no models at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn cheapest_in(&self, tier: ModelTier) -> Option<&ModelEntry> {
        self.entries
            .iter()
            .filter(|e| e.tier == tier)
            .min_by(|a, b| {
                a.input_cost_per_m
                    .partial_cmp(&b.input_cost_per_m)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    fn cheapest_any(&self) -> Option<&ModelEntry> {
        self.entries.iter().min_by(|a, b| {
            a.input_cost_per_m
                .partial_cmp(&b.input_cost_per_m)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}

fn lower(tier: ModelTier) -> Option<ModelTier> {
    match tier {
        ModelTier::Complex => Some(ModelTier::Moderate),
        ModelTier::Moderate => Some(ModelTier::Simple),
        ModelTier::Simple => None,
    }
}

fn estimate_call_cost(entry: &ModelEntry) -> f64 {
    (entry.input_cost_per_m * EST_INPUT_TOKENS + entry.output_cost_per_m * EST_OUTPUT_TOKENS)
        / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<ModelEntry> {
        vec![
            ModelEntry::new("cheap-small", ModelTier::Simple, 0.2, 0.8),
            ModelEntry::new("small", ModelTier::Simple, 1.0, 5.0),
            ModelEntry::new("mid", ModelTier::Moderate, 3.0, 15.0),
            ModelEntry::new("big", ModelTier::Complex, 15.0, 75.0),
        ]
    }

    #[test]
    fn selects_by_tier() {
        let router = ModelRouter::new(catalog());
        assert_eq!(router.select(ModelTier::Moderate, 0.0).unwrap(), "mid");
        assert_eq!(router.select(ModelTier::Complex, 0.0).unwrap(), "big");
    }

    #[test]
    fn tie_breaks_on_lowest_input_cost() {
        let router = ModelRouter::new(catalog());
        assert_eq!(router.select(ModelTier::Simple, 0.0).unwrap(), "cheap-small");
    }

    #[test]
    fn zero_budget_disables_the_hint() {
        let router = ModelRouter::new(catalog());
        assert_eq!(router.select(ModelTier::Complex, 0.0).unwrap(), "big");
    }

    #[test]
    fn tight_budget_steps_down_tiers() {
        let router = ModelRouter::new(catalog());
        // big estimates at (15*2000 + 75*1000)/1e6 = $0.105; mid at $0.021.
        let picked = router.select(ModelTier::Complex, 0.05).unwrap();
        assert_eq!(picked, "mid");
    }

    #[test]
    fn impossible_budget_still_answers_with_cheapest() {
        let router = ModelRouter::new(catalog());
        let picked = router.select(ModelTier::Complex, 0.0000001).unwrap();
        assert_eq!(picked, "cheap-small");
    }

    #[test]
    fn empty_tier_falls_through_to_lower() {
        let router = ModelRouter::new(vec![ModelEntry::new(
            "only-small",
            ModelTier::Simple,
            1.0,
            1.0,
        )]);
        assert_eq!(router.select(ModelTier::Complex, 0.0).unwrap(), "only-small");
    }

    #[test]
    fn empty_catalog_returns_none() {
        let router = ModelRouter::new(vec![]);
        assert!(router.select(ModelTier::Simple, 0.0).is_none());
        assert!(router.is_empty());
    }

    #[test]
    fn entries_for_filters() {
        let router = ModelRouter::new(catalog());
        assert_eq!(router.entries_for(ModelTier::Simple).len(), 2);
        assert_eq!(router.entries_for(ModelTier::Complex).len(), 1);
    }
}

//! Specificity scoring
//!
//! Pure ranking of factors that already satisfy a query. Any registry
//! implementation can reuse [`best_match`] over its own candidate set.

use super::{EmissionFactor, FactorQuery};

/// Exact region match
pub const REGION_WEIGHT: u32 = 100;
/// Exact category match
pub const CATEGORY_WEIGHT: u32 = 50;
/// Exact source match
pub const SOURCE_WEIGHT: u32 = 25;
/// Valid at the queried instant
pub const VALIDITY_WEIGHT: u32 = 10;
/// Carries a data-source citation
pub const CITATION_WEIGHT: u32 = 5;

/// Score how precisely `factor` answers `query`. Higher is better.
///
/// Wildcard matches (a `GLOBAL` region, an empty category) contribute nothing.
pub fn specificity(factor: &EmissionFactor, query: &FactorQuery) -> u32 {
    let mut score = 0;

    if let Some(region) = &query.region {
        if factor.region.eq_ignore_ascii_case(region) {
            score += REGION_WEIGHT;
        }
    }

    if let Some(category) = &query.category {
        if !factor.category.is_empty() && factor.category.eq_ignore_ascii_case(category) {
            score += CATEGORY_WEIGHT;
        }
    }

    if let Some(source) = &query.source {
        if factor.source.eq_ignore_ascii_case(source) {
            score += SOURCE_WEIGHT;
        }
    }

    if let Some(at) = query.valid_at {
        if factor.is_valid_at(at) {
            score += VALIDITY_WEIGHT;
        }
    }

    if !factor.data_source.trim().is_empty() {
        score += CITATION_WEIGHT;
    }

    score
}

/// Pick the highest-scoring candidate that matches `query`.
///
/// Equal scores resolve to the lexicographically smallest factor id so the
/// result never depends on storage order.
pub fn best_match<'a, I>(candidates: I, query: &FactorQuery) -> Option<&'a EmissionFactor>
where
    I: IntoIterator<Item = &'a EmissionFactor>,
{
    candidates
        .into_iter()
        .filter(|f| query.matches(f))
        .map(|f| (specificity(f, query), f))
        .max_by(|(score_a, a), (score_b, b)| score_a.cmp(score_b).then_with(|| b.id.cmp(&a.id)))
        .map(|(_, f)| f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;

    fn grid(id: &str, region: &str, value: f64) -> EmissionFactor {
        EmissionFactor::new(id, Scope::Scope2, region, "electricity", "kWh", value)
    }

    #[test]
    fn test_exact_region_beats_global() {
        let factors = vec![grid("a-global", "GLOBAL", 0.4), grid("b-us", "US-WEST", 0.298)];
        let query = FactorQuery::new().scope(Scope::Scope2).region("US-WEST").source("electricity");

        let best = best_match(&factors, &query).unwrap();
        assert_eq!(best.id, "b-us");
    }

    #[test]
    fn test_weights_are_ordered() {
        // region alone outweighs category + source + validity + citation
        assert!(REGION_WEIGHT > CATEGORY_WEIGHT + SOURCE_WEIGHT + VALIDITY_WEIGHT + CITATION_WEIGHT);
        assert!(CATEGORY_WEIGHT > SOURCE_WEIGHT + VALIDITY_WEIGHT + CITATION_WEIGHT);
    }

    #[test]
    fn test_score_components() {
        let f = grid("x", "EU-UK", 0.2).with_category("grid").with_data_source("DEFRA");
        let query = FactorQuery::new()
            .region("eu-uk")
            .category("GRID")
            .source("electricity")
            .valid_at(chrono::Utc::now());
        assert_eq!(specificity(&f, &query), 190);

        let bare = FactorQuery::new();
        assert_eq!(specificity(&f, &bare), CITATION_WEIGHT);
    }

    #[test]
    fn test_category_wildcard_scores_lower() {
        let generic = EmissionFactor::new("a-generic", Scope::Scope1, "GLOBAL", "fleet", "L", 2.5);
        let specific = EmissionFactor::new("z-diesel", Scope::Scope1, "GLOBAL", "fleet", "L", 2.68).with_category("diesel");
        let query = FactorQuery::new().category("diesel").source("fleet");

        let best = best_match([&generic, &specific], &query).unwrap();
        assert_eq!(best.id, "z-diesel");
    }

    #[test]
    fn test_ties_break_by_id() {
        let factors = vec![grid("grid-c", "US-EAST", 0.3), grid("grid-a", "US-EAST", 0.5), grid("grid-b", "US-EAST", 0.1)];
        let query = FactorQuery::new().region("US-EAST");

        assert_eq!(best_match(&factors, &query).unwrap().id, "grid-a");
        // storage order does not matter
        let reversed: Vec<_> = factors.iter().rev().cloned().collect();
        assert_eq!(best_match(&reversed, &query).unwrap().id, "grid-a");
    }

    #[test]
    fn test_no_candidates() {
        let factors = vec![grid("x", "EU-UK", 0.2)];
        let query = FactorQuery::new().region("ASIA-JAPAN");
        assert!(best_match(&factors, &query).is_none());
    }
}

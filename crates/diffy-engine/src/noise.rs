//! Suppression of differences on fields known to vary

use diffy_model::{FieldDifference, NoiseRule};

/// Drops differences matched by an endpoint's noise rules
///
/// A difference is noise when any pattern of a rule for the same endpoint
/// matches its path or one of the path's ancestors. Synthetic differences
/// always survive.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoiseFilter;

impl NoiseFilter {
    /// Check if `difference` is suppressed on `endpoint`
    #[must_use]
    pub fn is_noise(endpoint: &str, difference: &FieldDifference, rules: &[NoiseRule]) -> bool {
        !difference.is_synthetic()
            && rules
                .iter()
                .any(|rule| rule.suppresses(endpoint, &difference.path))
    }

    /// Remove noise, keeping the order of the survivors
    #[must_use]
    pub fn filter(
        endpoint: &str,
        differences: Vec<FieldDifference>,
        rules: &[NoiseRule],
    ) -> Vec<FieldDifference> {
        if rules.is_empty() {
            return differences;
        }
        let before = differences.len();
        let kept: Vec<_> = differences
            .into_iter()
            .filter(|d| !Self::is_noise(endpoint, d, rules))
            .collect();
        tracing::trace!(
            endpoint,
            suppressed = before - kept.len(),
            kept = kept.len(),
            "noise filtered"
        );
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diffy_model::DifferenceKind;
    use pretty_assertions::assert_eq;

    fn diff(path: &str) -> FieldDifference {
        FieldDifference::new(
            path.parse().unwrap(),
            DifferenceKind::PrimitiveDifference,
            "a != b",
        )
    }

    fn rule(endpoint: &str, patterns: &[&str]) -> NoiseRule {
        NoiseRule::new(
            endpoint,
            patterns.iter().map(|p| p.parse().unwrap()).collect(),
        )
    }

    #[test]
    fn noise_drops_matching_paths_in_order() {
        let rules = [rule("/orders", &["items[*].ts"])];
        let kept = NoiseFilter::filter(
            "/orders",
            vec![diff("items[0].v"), diff("items[2].ts"), diff("total")],
            &rules,
        );
        let paths: Vec<_> = kept.iter().map(|d| d.path.to_string()).collect();
        assert_eq!(paths, vec!["items[0].v", "total"]);
    }

    #[test]
    fn noise_literal_index_only_matches_that_index() {
        let rules = [rule("/orders", &["items[0].ts"])];
        let kept = NoiseFilter::filter("/orders", vec![diff("items[2].ts")], &rules);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn noise_covers_descendants() {
        let rules = [rule("/users/1", &["user"])];
        let kept = NoiseFilter::filter(
            "/users/1",
            vec![diff("user.name"), diff("user"), diff("username")],
            &rules,
        );
        assert_eq!(kept, vec![diff("username")]);
    }

    #[test]
    fn noise_other_endpoint_rules_ignored() {
        let rules = [rule("/users/2", &["ts"])];
        let kept = NoiseFilter::filter("/users/1", vec![diff("ts")], &rules);
        assert_eq!(kept, vec![diff("ts")]);
    }

    #[test]
    fn noise_never_drops_synthetic() {
        let rules = [rule("/e", &["**"])];
        let failure = FieldDifference::parse_failure("candidate: EOF");
        let kept = NoiseFilter::filter("/e", vec![failure.clone(), diff("x")], &rules);
        assert_eq!(kept, vec![failure]);
    }

    #[test]
    fn noise_filter_is_idempotent() {
        let rules = [rule("/e", &["a.*"])];
        let input = vec![diff("a.b"), diff("c"), diff("a")];
        let once = NoiseFilter::filter("/e", input, &rules);
        let twice = NoiseFilter::filter("/e", once.clone(), &rules);
        assert_eq!(once, twice);
    }
}

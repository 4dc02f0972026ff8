//! Fuzzy series-name ranking.
//!
//! Exact (normalized) match first, then keys containing the query or
//! contained in it, closest length first, ties alphabetical.

use crate::catalog::SeriesKey;

use super::FuzzyMatch;

/// Rank cached series against a free-text query.
pub fn rank_candidates<I>(query: &str, candidates: I) -> Vec<FuzzyMatch>
where
    I: IntoIterator<Item = (SeriesKey, String)>,
{
    let needle = SeriesKey::normalize(query);
    if needle.is_empty() {
        return Vec::new();
    }
    let needle = needle.as_str();

    let mut matches: Vec<FuzzyMatch> = candidates
        .into_iter()
        .filter_map(|(key, display_name)| {
            let haystack = key.as_str();
            let exact = haystack == needle;
            if !exact && !haystack.contains(needle) && !needle.contains(haystack) {
                return None;
            }
            let length_difference = haystack.chars().count().abs_diff(needle.chars().count());
            Some(FuzzyMatch {
                key,
                display_name,
                exact,
                length_difference,
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.exact
            .cmp(&a.exact)
            .then(a.length_difference.cmp(&b.length_difference))
            .then_with(|| a.key.cmp(&b.key))
    });
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached(names: &[&str]) -> Vec<(SeriesKey, String)> {
        names
            .iter()
            .map(|n| (SeriesKey::normalize(n), n.to_string()))
            .collect()
    }

    #[test]
    fn test_partial_name_finds_longer_key() {
        let ranked = rank_candidates(
            "Vigilantes",
            cached(&["My Hero Academia", "My Hero Academia: Vigilantes", "Naruto"]),
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].display_name, "My Hero Academia: Vigilantes");
        assert!(!ranked[0].exact);
    }

    #[test]
    fn test_exact_match_ranks_first() {
        let ranked = rank_candidates(
            "tokyo ghoul",
            cached(&["Tokyo Ghoul:re", "Tokyo Ghoul", "Tokyo Ghoul: Jack"]),
        );
        let names: Vec<_> = ranked.iter().map(|m| m.display_name.as_str()).collect();
        assert_eq!(names, vec!["Tokyo Ghoul", "Tokyo Ghoul:re", "Tokyo Ghoul: Jack"]);
        assert!(ranked[0].exact);
    }

    #[test]
    fn test_query_containing_key_matches() {
        let ranked = rank_candidates("Naruto Volume Set", cached(&["Naruto", "Boruto"]));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].key, SeriesKey::normalize("naruto"));
    }

    #[test]
    fn test_blank_query_matches_nothing() {
        assert!(rank_candidates("   ", cached(&["Bleach"])).is_empty());
    }
}

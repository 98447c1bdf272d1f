//! Statement similarity and direction-conflict detection.
//!
//! Similarity is token-set Jaccard over canonicalized statements; the
//! stated direction of an effect is extracted with fixed cue vocabularies.
//! Two highly similar statements with opposing directions contradict each
//! other and both get flagged, never silently collapsed into one.

use once_cell::sync::Lazy;
use regex::Regex;
use sagan_core::{canonicalize_text, Hypothesis, HypothesisId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

static INCREASE_CUES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(improv\w*|increas\w*|enhanc\w*|boost\w*|rais\w*|accelerat\w*|strengthen\w*|higher|faster|more)\b")
        .unwrap()
});

static DECREASE_CUES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(impair\w*|decreas\w*|reduc\w*|worsen\w*|degrad\w*|slow\w*|weaken\w*|lower|less|fewer)\b")
        .unwrap()
});

/// Direction an effect statement claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Claims the effect goes up
    Positive,
    /// Claims the effect goes down
    Negative,
    /// No directional cue found, or cues in both directions
    Unstated,
}

/// Extract the stated direction of a statement.
pub fn direction_of(statement: &str) -> Direction {
    let canonical = canonicalize_text(statement);
    let positive = INCREASE_CUES.is_match(&canonical);
    let negative = DECREASE_CUES.is_match(&canonical);
    match (positive, negative) {
        (true, false) => Direction::Positive,
        (false, true) => Direction::Negative,
        _ => Direction::Unstated,
    }
}

/// Whether two stated directions conflict.
pub fn directions_conflict(a: Direction, b: Direction) -> bool {
    matches!(
        (a, b),
        (Direction::Positive, Direction::Negative) | (Direction::Negative, Direction::Positive)
    )
}

/// Token-set Jaccard similarity over canonicalized statements.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let tokens_a: HashSet<String> = canonicalize_text(a)
        .split(' ')
        .map(str::to_string)
        .collect();
    let tokens_b: HashSet<String> = canonicalize_text(b)
        .split(' ')
        .map(str::to_string)
        .collect();
    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count() as f64;
    let union = tokens_a.union(&tokens_b).count() as f64;
    intersection / union
}

/// A detected contradiction between two hypotheses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionFlag {
    /// First hypothesis involved
    pub hypothesis_a: HypothesisId,
    /// Second hypothesis involved
    pub hypothesis_b: HypothesisId,
    /// Similarity that triggered the comparison
    pub similarity: f64,
    /// Why both were flagged
    pub reason: String,
}

/// Compare a candidate against one active hypothesis.
pub fn check_contradiction(
    candidate: &Hypothesis,
    existing: &Hypothesis,
    threshold: f64,
) -> Option<ContradictionFlag> {
    let similarity = jaccard_similarity(&candidate.statement, &existing.statement);
    if similarity < threshold {
        return None;
    }
    let direction_a = direction_of(&candidate.statement);
    let direction_b = direction_of(&existing.statement);
    if !directions_conflict(direction_a, direction_b) {
        return None;
    }
    Some(ContradictionFlag {
        hypothesis_a: candidate.hypothesis_id,
        hypothesis_b: existing.hypothesis_id,
        similarity,
        reason: format!(
            "statements {:.0}% similar but claim opposing directions",
            similarity * 100.0
        ),
    })
}

/// Compare a candidate against every active hypothesis.
pub fn find_contradictions(
    candidate: &Hypothesis,
    active: &[&Hypothesis],
    threshold: f64,
) -> Vec<ContradictionFlag> {
    active
        .iter()
        .filter(|existing| existing.hypothesis_id != candidate.hypothesis_id)
        .filter_map(|existing| check_contradiction(candidate, existing, threshold))
        .collect()
}

/// Group supported hypotheses that are similar enough, and directionally
/// compatible enough, to merge. Greedy single-pass grouping: each
/// hypothesis joins the first group it fits.
pub fn merge_groups<'a>(
    supported: &[&'a Hypothesis],
    threshold: f64,
) -> Vec<Vec<&'a Hypothesis>> {
    let mut groups: Vec<Vec<&Hypothesis>> = Vec::new();
    for hypothesis in supported {
        let direction = direction_of(&hypothesis.statement);
        let fit = groups.iter_mut().find(|group| {
            group.iter().all(|member| {
                jaccard_similarity(&member.statement, &hypothesis.statement) >= threshold
                    && !directions_conflict(direction, direction_of(&member.statement))
            })
        });
        match fit {
            Some(group) => group.push(hypothesis),
            None => groups.push(vec![hypothesis]),
        }
    }
    groups.retain(|group| group.len() >= 2);
    groups
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const POSITIVE: &str =
        "daily caffeine intake improves delayed recall performance in healthy young adults under mild stress";
    const NEGATIVE: &str =
        "daily caffeine intake impairs delayed recall performance in healthy young adults under mild stress";

    #[test]
    fn test_direction_extraction() {
        assert_eq!(direction_of(POSITIVE), Direction::Positive);
        assert_eq!(direction_of(NEGATIVE), Direction::Negative);
        assert_eq!(
            direction_of("caffeine is associated with recall"),
            Direction::Unstated
        );
    }

    #[test]
    fn test_jaccard_identical_statements() {
        assert!((jaccard_similarity(POSITIVE, POSITIVE) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_jaccard_disjoint_statements() {
        assert_eq!(
            jaccard_similarity("alpha beta gamma", "delta epsilon zeta"),
            0.0
        );
    }

    #[test]
    fn test_near_identical_opposing_statements_are_highly_similar() {
        let similarity = jaccard_similarity(POSITIVE, NEGATIVE);
        assert!(
            similarity >= 0.8,
            "expected >= 0.8, got {similarity}"
        );
    }

    #[test]
    fn test_contradiction_flags_both_hypotheses() {
        let a = Hypothesis::new(POSITIVE, "pharmacology");
        let b = Hypothesis::new(NEGATIVE, "pharmacology");
        let flag = check_contradiction(&a, &b, 0.8).unwrap();
        assert_eq!(flag.hypothesis_a, a.hypothesis_id);
        assert_eq!(flag.hypothesis_b, b.hypothesis_id);
        assert!(flag.similarity >= 0.8);
    }

    #[test]
    fn test_no_contradiction_below_similarity_threshold() {
        let a = Hypothesis::new("caffeine improves recall", "pharmacology");
        let b = Hypothesis::new(
            "magnesium supplementation impairs deep sleep quality in older adults",
            "pharmacology",
        );
        assert!(check_contradiction(&a, &b, 0.8).is_none());
    }

    #[test]
    fn test_no_contradiction_when_directions_agree() {
        let a = Hypothesis::new(POSITIVE, "pharmacology");
        let b = Hypothesis::new(POSITIVE, "pharmacology");
        assert!(check_contradiction(&a, &b, 0.8).is_none());
    }

    #[test]
    fn test_find_contradictions_skips_self() {
        let a = Hypothesis::new(POSITIVE, "pharmacology");
        let flags = find_contradictions(&a, &[&a], 0.8);
        assert!(flags.is_empty());
    }

    #[test]
    fn test_merge_groups_compatible_similar_hypotheses() {
        let a = Hypothesis::new(POSITIVE, "pharmacology");
        let b = Hypothesis::new(
            "daily caffeine intake improves delayed recall accuracy in healthy young adults under mild stress",
            "pharmacology",
        );
        let unrelated = Hypothesis::new("magnesium improves sleep", "pharmacology");
        let groups = merge_groups(&[&a, &b, &unrelated], 0.8);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn test_merge_groups_exclude_conflicting_directions() {
        let a = Hypothesis::new(POSITIVE, "pharmacology");
        let b = Hypothesis::new(NEGATIVE, "pharmacology");
        assert!(merge_groups(&[&a, &b], 0.8).is_empty());
    }
}

use std::cmp::Ordering;

use serde::Serialize;

use crate::classifier::LabelSet;

/// A record's relevance score for the current facet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub uuid: usize,
    pub score: f32,
}

/// Descending score, then ascending uuid. NaN scores sort last.
fn rank_order(scores: &[f32], a: usize, b: usize) -> Ordering {
    let (sa, sb) = (scores[a], scores[b]);
    match (sa.is_nan(), sb.is_nan()) {
        (false, false) => sb.total_cmp(&sa),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    }
    .then(a.cmp(&b))
}

/// Rank every record by score and drop the ones used for training.
///
/// 1. Order uuids by descending score, ties by ascending uuid.
/// 2. Keep the first `n_results + |positives| + |negatives|`.
/// 3. Remove uuids that appear in either label set.
///
/// The over-allocation in step 2 usually leaves `n_results` novel
/// candidates, but fewer survive when many top-ranked records were
/// training examples.
pub fn rank_and_filter(
    scores: &[f32],
    labels: &LabelSet,
    n_results: usize,
) -> Vec<ScoredCandidate> {
    let budget = n_results
        .saturating_add(labels.positives().len())
        .saturating_add(labels.negatives().len())
        .min(scores.len());
    if budget == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    // The comparator is a total order, so partial selection followed by a
    // sort of the head gives exactly the prefix of a full sort.
    if budget < order.len() {
        order.select_nth_unstable_by(budget - 1, |&a, &b| {
            rank_order(scores, a, b)
        });
        order.truncate(budget);
    }
    order.sort_unstable_by(|&a, &b| rank_order(scores, a, b));

    order
        .into_iter()
        .filter(|&uuid| !labels.contains(uuid))
        .map(|uuid| ScoredCandidate {
            uuid,
            score: scores[uuid],
        })
        .collect()
}

//! Node selection over aggregated scores.
//!
//! Picks the highest-scoring node in a single pass. Ties at the maximum
//! are broken uniformly at random with reservoir sampling, so the number
//! of tied nodes never has to be known up front.

use rand::Rng;
use tracing::debug;

use crate::error::{PlacementError, PlacementResult};
use crate::scorer::NodeScore;

/// Select the node with the highest score.
///
/// When `k` nodes share the maximum, each is returned with probability
/// `1/k`. The caller supplies the random source so selection can be made
/// deterministic with a seeded generator.
pub fn select_host<R: Rng + ?Sized>(scores: &[NodeScore], rng: &mut R) -> PlacementResult<String> {
    let (first, rest) = scores.split_first().ok_or(PlacementError::EmptyScoreList)?;

    let mut max_score = first.score;
    let mut selected = &first.name;
    let mut count_at_max: u32 = 1;

    for ns in rest {
        if ns.score > max_score {
            max_score = ns.score;
            selected = &ns.name;
            count_at_max = 1;
        } else if ns.score == max_score {
            count_at_max += 1;
            // Replace the candidate with probability 1/count_at_max.
            if rng.gen_range(0..count_at_max) == 0 {
                selected = &ns.name;
            }
        }
    }

    debug!(
        node = %selected,
        score = max_score,
        tied = count_at_max,
        "selected host"
    );
    Ok(selected.clone())
}

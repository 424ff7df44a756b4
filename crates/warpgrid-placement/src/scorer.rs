//! Node score plumbing for the Score stage.
//!
//! Every score plugin owns one row of a [`ScoreMatrix`]: one
//! [`NodeScore`] per feasible node, indexed by the node's position in
//! the feasible list. Rows start out filled with zero placeholders and
//! are reduced to a single aggregate per node by weighted summation.

use serde::{Deserialize, Serialize};

use crate::error::{PlacementError, PlacementResult};

/// Highest score a normalized row can hold.
pub const MAX_NODE_SCORE: i64 = 100;

/// Weight applied to a score plugin that doesn't configure one.
pub const DEFAULT_SCORE_WEIGHT: i64 = 1;

/// Largest weight a score plugin may be configured with.
pub const MAX_SCORE_WEIGHT: i64 = 100;

/// Score of a single node, as produced by one plugin or by aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeScore {
    pub name: String,
    pub score: i64,
}

impl NodeScore {
    pub fn new(name: impl Into<String>, score: i64) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

pub type NodeScoreList = Vec<NodeScore>;

/// One plugin's scores across every feasible node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreRow {
    pub plugin: String,
    pub weight: i64,
    pub scores: NodeScoreList,
}

/// Plugin → per-node scores, kept in configured plugin order.
#[derive(Debug, Clone, Default)]
pub struct ScoreMatrix {
    node_names: Vec<String>,
    rows: Vec<ScoreRow>,
}

impl ScoreMatrix {
    /// Create an empty matrix for the given feasible nodes.
    pub fn new(node_names: Vec<String>) -> Self {
        Self {
            node_names,
            rows: Vec::new(),
        }
    }

    /// Append a row for `plugin`, pre-filled with zero placeholders.
    pub fn add_row(&mut self, plugin: &str, weight: i64) -> &mut ScoreRow {
        let scores = self
            .node_names
            .iter()
            .map(|name| NodeScore::new(name.clone(), 0))
            .collect();
        self.rows.push(ScoreRow {
            plugin: plugin.to_string(),
            weight,
            scores,
        });
        let last = self.rows.len() - 1;
        &mut self.rows[last]
    }

    /// Reduce the matrix to one score per node: Σ weight × score.
    ///
    /// Output order matches the node order the matrix was built with.
    /// A sum that leaves the `i64` range is an error rather than a wrap.
    pub fn aggregate(&self) -> PlacementResult<NodeScoreList> {
        let mut result: NodeScoreList = self
            .node_names
            .iter()
            .map(|name| NodeScore::new(name.clone(), 0))
            .collect();

        for row in &self.rows {
            if row.scores.len() != result.len() {
                return Err(PlacementError::RowLengthMismatch {
                    plugin: row.plugin.clone(),
                    got: row.scores.len(),
                    expected: result.len(),
                });
            }
            for (total, ns) in result.iter_mut().zip(&row.scores) {
                total.score = row
                    .weight
                    .checked_mul(ns.score)
                    .and_then(|weighted| total.score.checked_add(weighted))
                    .ok_or_else(|| PlacementError::ScoreOverflow {
                        plugin: row.plugin.clone(),
                        node: total.name.clone(),
                    })?;
            }
        }

        Ok(result)
    }
}

/// Rescale a row to `0..=max_priority` relative to its highest score.
///
/// With `reverse`, the best raw score maps to zero instead. A row whose
/// scores are all zero is left unchanged (or set to `max_priority` when
/// reversed). Results saturate at the `i64` bounds.
pub fn default_normalize_score(max_priority: i64, reverse: bool, scores: &mut [NodeScore]) {
    let max_count = scores.iter().map(|s| s.score).max().unwrap_or(0);

    if max_count == 0 {
        if reverse {
            for s in scores.iter_mut() {
                s.score = max_priority;
            }
        }
        return;
    }

    for s in scores.iter_mut() {
        let scaled = i128::from(max_priority) * i128::from(s.score) / i128::from(max_count);
        let score = saturate(scaled);
        s.score = if reverse {
            max_priority.saturating_sub(score)
        } else {
            score
        };
    }
}

fn saturate(v: i128) -> i64 {
    i64::try_from(v).unwrap_or(if v < 0 { i64::MIN } else { i64::MAX })
}

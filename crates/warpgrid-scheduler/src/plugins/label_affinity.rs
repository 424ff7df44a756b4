//! `LabelAffinity` score: prefers nodes carrying the workload's
//! `preferred_labels`.
//!
//! PreScore counts matched labels per feasible node, Score reads the
//! count back, and normalization scales the row to `0..=MAX_NODE_SCORE`
//! against the best node. The plugin must be configured for both
//! PreScore and Score.

use std::collections::HashMap;
use std::sync::Arc;

use warpgrid_placement::{MAX_NODE_SCORE, NodeScore, default_normalize_score};

use crate::cycle_state::CycleState;
use crate::plugin::{Plugin, PreScorePlugin, ScoreExtensions, ScorePlugin};
use crate::status::Status;
use crate::types::{Node, Workload};

const PRE_SCORE_STATE_KEY: &str = "PreScoreLabelAffinity";

/// Matched preferred-label count per node name.
struct MatchCounts(HashMap<String, i64>);

pub struct LabelAffinity;

impl LabelAffinity {
    pub const NAME: &'static str = "LabelAffinity";
}

impl Plugin for LabelAffinity {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn pre_score_ext(self: Arc<Self>) -> Option<Arc<dyn PreScorePlugin>> {
        Some(self)
    }

    fn score_ext(self: Arc<Self>) -> Option<Arc<dyn ScorePlugin>> {
        Some(self)
    }
}

impl PreScorePlugin for LabelAffinity {
    fn pre_score(&self, state: &mut CycleState, workload: &Workload, nodes: &[Node]) -> Status {
        let counts = nodes
            .iter()
            .map(|node| {
                let matched = workload
                    .preferred_labels
                    .iter()
                    .filter(|(k, v)| node.labels.get(*k) == Some(*v))
                    .count();
                (node.name.clone(), matched as i64)
            })
            .collect();
        state.write(PRE_SCORE_STATE_KEY, MatchCounts(counts));
        Status::success()
    }
}

impl ScorePlugin for LabelAffinity {
    fn score(&self, state: &CycleState, _workload: &Workload, node_name: &str) -> Result<i64, Status> {
        let counts = state
            .read::<MatchCounts>(PRE_SCORE_STATE_KEY)
            .ok_or_else(|| Status::error("no PreScore state; LabelAffinity must also run as a PreScore plugin"))?;
        Ok(counts.0.get(node_name).copied().unwrap_or(0))
    }

    fn score_extensions(&self) -> Option<&dyn ScoreExtensions> {
        Some(self)
    }
}

impl ScoreExtensions for LabelAffinity {
    fn normalize_score(&self, _state: &CycleState, _workload: &Workload, scores: &mut [NodeScore]) -> Status {
        default_normalize_score(MAX_NODE_SCORE, false, scores);
        Status::success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload() -> Workload {
        let mut w = Workload::new("u1", "default", "cache");
        w.preferred_labels.insert("zone".into(), "eu".into());
        w.preferred_labels.insert("disk".into(), "ssd".into());
        w
    }

    #[test]
    fn counts_matched_labels() {
        let nodes = vec![
            Node::new("both").with_label("zone", "eu").with_label("disk", "ssd"),
            Node::new("one").with_label("zone", "eu").with_label("disk", "hdd"),
            Node::new("none"),
        ];
        let w = workload();
        let mut state = CycleState::new();
        assert!(LabelAffinity.pre_score(&mut state, &w, &nodes).is_success());

        assert_eq!(LabelAffinity.score(&state, &w, "both").unwrap(), 2);
        assert_eq!(LabelAffinity.score(&state, &w, "one").unwrap(), 1);
        assert_eq!(LabelAffinity.score(&state, &w, "none").unwrap(), 0);
    }

    #[test]
    fn score_without_pre_score_is_error() {
        let status = LabelAffinity
            .score(&CycleState::new(), &workload(), "n1")
            .unwrap_err();
        assert!(status.is_error());
    }

    #[test]
    fn normalizes_against_best_node() {
        let mut scores = vec![
            NodeScore::new("a", 2),
            NodeScore::new("b", 1),
            NodeScore::new("c", 0),
        ];
        let status = LabelAffinity.normalize_score(&CycleState::new(), &workload(), &mut scores);
        assert!(status.is_success());
        let got: Vec<i64> = scores.iter().map(|s| s.score).collect();
        assert_eq!(got, vec![100, 50, 0]);
    }
}

//! `NodeSelector` filter: the node must carry every selector label.

use std::sync::Arc;

use crate::cycle_state::CycleState;
use crate::plugin::{FilterPlugin, Plugin};
use crate::status::Status;
use crate::types::{Node, Workload};

pub struct NodeSelector;

impl NodeSelector {
    pub const NAME: &'static str = "NodeSelector";
}

impl Plugin for NodeSelector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn filter_ext(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
        Some(self)
    }
}

impl FilterPlugin for NodeSelector {
    fn filter(&self, _state: &CycleState, workload: &Workload, node: &Node) -> Status {
        let mut missing: Vec<&str> = workload
            .node_selector
            .iter()
            .filter(|(k, v)| node.labels.get(*k) != Some(*v))
            .map(|(k, _)| k.as_str())
            .collect();

        if missing.is_empty() {
            return Status::success();
        }
        missing.sort_unstable();
        Status::unschedulable(format!(
            "node(s) didn't match node selector: {}",
            missing.join(", ")
        ))
    }
}

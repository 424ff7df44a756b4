//! `NodeName` filter: honours a workload pinned to one node.

use std::sync::Arc;

use crate::cycle_state::CycleState;
use crate::plugin::{FilterPlugin, Plugin};
use crate::status::Status;
use crate::types::{Node, Workload};

pub const ERR_REASON: &str = "node(s) didn't match the requested node name";

pub struct NodeName;

impl NodeName {
    pub const NAME: &'static str = "NodeName";
}

impl Plugin for NodeName {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn filter_ext(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
        Some(self)
    }
}

impl FilterPlugin for NodeName {
    fn filter(&self, _state: &CycleState, workload: &Workload, node: &Node) -> Status {
        match &workload.node_name {
            Some(pinned) if pinned != &node.name => Status::unschedulable(ERR_REASON),
            _ => Status::success(),
        }
    }
}

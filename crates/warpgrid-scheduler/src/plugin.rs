//! Plugin interfaces for the scheduling pipeline.
//!
//! A plugin is a named object that implements one or more extension
//! points. The framework asks each configured plugin for the extension
//! it needs through the `*_ext` accessors, so a single instance can serve
//! PreScore, Score and Permit at once and share its configuration.

use std::sync::Arc;
use std::time::Duration;

use warpgrid_placement::NodeScore;

use crate::cycle_state::CycleState;
use crate::status::Status;
use crate::types::{Node, Workload, WorkloadId};
use crate::waiting::{WaitingPod, WaitingPods};

/// Base trait for every plugin.
pub trait Plugin: Send + Sync {
    /// Stable name used for failure attribution and permit wait keys.
    fn name(&self) -> &str;

    fn filter_ext(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
        None
    }

    fn pre_score_ext(self: Arc<Self>) -> Option<Arc<dyn PreScorePlugin>> {
        None
    }

    fn score_ext(self: Arc<Self>) -> Option<Arc<dyn ScorePlugin>> {
        None
    }

    fn permit_ext(self: Arc<Self>) -> Option<Arc<dyn PermitPlugin>> {
        None
    }
}

/// Decides whether a node can host the workload.
pub trait FilterPlugin: Plugin {
    fn filter(&self, state: &CycleState, workload: &Workload, node: &Node) -> Status;
}

/// Runs once per attempt over all feasible nodes before scoring.
pub trait PreScorePlugin: Plugin {
    fn pre_score(&self, state: &mut CycleState, workload: &Workload, nodes: &[Node]) -> Status;
}

/// Ranks feasible nodes.
pub trait ScorePlugin: Plugin {
    fn score(&self, state: &CycleState, workload: &Workload, node_name: &str) -> Result<i64, Status>;

    /// Normalization applied once the plugin has scored every node.
    fn score_extensions(&self) -> Option<&dyn ScoreExtensions> {
        None
    }
}

/// Optional post-processing of a complete score row.
pub trait ScoreExtensions: Send + Sync {
    fn normalize_score(&self, state: &CycleState, workload: &Workload, scores: &mut [NodeScore]) -> Status;
}

/// Approves, rejects, or delays binding to the selected node.
pub trait PermitPlugin: Plugin {
    /// Return `Wait` with a timeout to hold the workload until
    /// [`Handle::allow`] or [`Handle::reject`] is called.
    fn permit(&self, state: &CycleState, workload: &Workload, node_name: &str) -> (Status, Duration);
}

/// Plugin-facing view of the scheduler.
///
/// Handed to plugin factories so plugins can resolve waiting workloads
/// from their own tasks.
#[derive(Clone)]
pub struct Handle {
    waiting_pods: Arc<WaitingPods>,
}

impl Handle {
    pub fn new(waiting_pods: Arc<WaitingPods>) -> Self {
        Self { waiting_pods }
    }

    pub fn waiting_pod(&self, uid: &WorkloadId) -> Option<Arc<WaitingPod>> {
        self.waiting_pods.get(uid)
    }

    pub fn allow(&self, uid: &WorkloadId, plugin: &str) -> bool {
        self.waiting_pods.allow(uid, plugin)
    }

    pub fn reject(&self, uid: &WorkloadId, plugin: &str, reason: &str) -> bool {
        self.waiting_pods.reject(uid, plugin, reason)
    }

    pub fn waiting_pods(&self) -> &Arc<WaitingPods> {
        &self.waiting_pods
    }
}

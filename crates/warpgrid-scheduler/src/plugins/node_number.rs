//! `NodeNumber` plugin: prefers nodes whose trailing digit matches the
//! workload's, and delays binding by that digit.
//!
//! - PreScore records the workload name's trailing digit in cycle state.
//! - Score gives `match_score` to nodes ending in the same digit.
//! - Permit on a node ending in digit `n > 0` waits and allows the
//!   workload after `n × delay_unit`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cycle_state::CycleState;
use crate::plugin::{Handle, PermitPlugin, Plugin, PreScorePlugin, ScorePlugin};
use crate::status::Status;
use crate::types::{Node, Workload};

const PRE_SCORE_STATE_KEY: &str = "PreScoreNodeNumber";

/// `[plugin_args.NodeNumber]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeNumberArgs {
    /// Score for a node whose trailing digit matches.
    pub match_score: i64,
    /// How long Permit lets the workload wait.
    pub permit_timeout_ms: u64,
    /// Allow delay per unit of the node's trailing digit.
    pub delay_unit_ms: u64,
}

impl Default for NodeNumberArgs {
    fn default() -> Self {
        Self {
            match_score: 10,
            permit_timeout_ms: 10_000,
            delay_unit_ms: 1_000,
        }
    }
}

impl NodeNumberArgs {
    pub fn from_value(value: Option<&toml::Value>) -> anyhow::Result<Self> {
        let args = match value {
            Some(v) => v
                .clone()
                .try_into::<Self>()
                .context("parse NodeNumber args")?,
            None => Self::default(),
        };
        if args.delay_unit_ms == 0 {
            bail!("delay_unit_ms must be positive");
        }
        Ok(args)
    }

    pub fn permit_timeout(&self) -> Duration {
        Duration::from_millis(self.permit_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PreScoreState {
    workload_suffix: u32,
}

pub struct NodeNumber {
    args: NodeNumberArgs,
    handle: Handle,
}

impl NodeNumber {
    pub const NAME: &'static str = "NodeNumber";

    pub fn new(args: NodeNumberArgs, handle: Handle) -> Self {
        Self { args, handle }
    }
}

fn trailing_digit(s: &str) -> Option<u32> {
    s.chars().last()?.to_digit(10)
}

impl Plugin for NodeNumber {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn pre_score_ext(self: Arc<Self>) -> Option<Arc<dyn PreScorePlugin>> {
        Some(self)
    }

    fn score_ext(self: Arc<Self>) -> Option<Arc<dyn ScorePlugin>> {
        Some(self)
    }

    fn permit_ext(self: Arc<Self>) -> Option<Arc<dyn PermitPlugin>> {
        Some(self)
    }
}

impl PreScorePlugin for NodeNumber {
    fn pre_score(&self, state: &mut CycleState, workload: &Workload, _nodes: &[Node]) -> Status {
        // A name without a trailing digit simply scores zero everywhere.
        if let Some(workload_suffix) = trailing_digit(&workload.name) {
            state.write(PRE_SCORE_STATE_KEY, PreScoreState { workload_suffix });
        }
        Status::success()
    }
}

impl ScorePlugin for NodeNumber {
    fn score(&self, state: &CycleState, _workload: &Workload, node_name: &str) -> Result<i64, Status> {
        let Some(pre) = state.read::<PreScoreState>(PRE_SCORE_STATE_KEY) else {
            return Ok(0);
        };
        match trailing_digit(node_name) {
            Some(n) if n == pre.workload_suffix => Ok(self.args.match_score),
            _ => Ok(0),
        }
    }
}

impl PermitPlugin for NodeNumber {
    fn permit(&self, _state: &CycleState, workload: &Workload, node_name: &str) -> (Status, Duration) {
        let Some(n) = trailing_digit(node_name).filter(|n| *n > 0) else {
            return (Status::success(), Duration::ZERO);
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return (
                Status::error("no async runtime to schedule the delayed allow"),
                Duration::ZERO,
            );
        };

        let delay = Duration::from_millis(self.args.delay_unit_ms) * n;
        let handle = self.handle.clone();
        let uid = workload.uid.clone();
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if !handle.allow(&uid, NodeNumber::NAME) {
                debug!(workload = %uid, "delayed allow found no waiting workload");
            }
        });

        (
            Status::wait(format!("allowing after {delay:?} on node {node_name}")),
            self.args.permit_timeout(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::waiting::{Resolution, WaitingPod, WaitingPods};

    fn plugin() -> (NodeNumber, Arc<WaitingPods>) {
        let waiting = Arc::new(WaitingPods::new());
        let plugin = NodeNumber::new(NodeNumberArgs::default(), Handle::new(waiting.clone()));
        (plugin, waiting)
    }

    #[test]
    fn args_default_and_parse() {
        assert_eq!(NodeNumberArgs::from_value(None).unwrap(), NodeNumberArgs::default());

        let value: toml::Value = toml::from_str("match_score = 20\npermit_timeout_ms = 500").unwrap();
        let args = NodeNumberArgs::from_value(Some(&value)).unwrap();
        assert_eq!(args.match_score, 20);
        assert_eq!(args.permit_timeout(), Duration::from_millis(500));
        assert_eq!(args.delay_unit_ms, 1_000);
    }

    #[test]
    fn args_reject_unknown_and_zero_delay() {
        let unknown: toml::Value = toml::from_str("bogus = 1").unwrap();
        assert!(NodeNumberArgs::from_value(Some(&unknown)).is_err());

        let zero: toml::Value = toml::from_str("delay_unit_ms = 0").unwrap();
        assert!(NodeNumberArgs::from_value(Some(&zero)).is_err());
    }

    #[test]
    fn scores_matching_suffix() {
        let (plugin, _) = plugin();
        let w = Workload::new("u1", "default", "web-3");
        let mut state = CycleState::new();
        assert!(plugin.pre_score(&mut state, &w, &[]).is_success());

        assert_eq!(plugin.score(&state, &w, "node3").unwrap(), 10);
        assert_eq!(plugin.score(&state, &w, "node4").unwrap(), 0);
        assert_eq!(plugin.score(&state, &w, "node").unwrap(), 0);
    }

    #[test]
    fn non_numeric_name_scores_zero() {
        let (plugin, _) = plugin();
        let w = Workload::new("u1", "default", "web");
        let mut state = CycleState::new();
        assert!(plugin.pre_score(&mut state, &w, &[]).is_success());
        assert!(state.is_empty());
        assert_eq!(plugin.score(&state, &w, "node3").unwrap(), 0);
    }

    #[tokio::test]
    async fn permit_succeeds_on_zero_or_non_numeric_node() {
        let (plugin, _) = plugin();
        let w = Workload::new("u1", "default", "web-1");
        assert!(plugin.permit(&CycleState::new(), &w, "node0").0.is_success());
        assert!(plugin.permit(&CycleState::new(), &w, "control").0.is_success());
    }

    #[test]
    fn permit_without_runtime_is_error() {
        let (plugin, _) = plugin();
        let w = Workload::new("u1", "default", "web-1");
        assert!(plugin.permit(&CycleState::new(), &w, "node2").0.is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn permit_waits_then_allows_after_digit_delay() {
        let (plugin, waiting) = plugin();
        let w = Arc::new(Workload::new("u1", "default", "web-1"));

        let (status, timeout) = plugin.permit(&CycleState::new(), &w, "node3");
        assert!(status.is_wait());
        assert_eq!(timeout, Duration::from_secs(10));

        let mut waits = HashMap::new();
        waits.insert(NodeNumber::NAME.to_string(), timeout);
        waiting.add(WaitingPod::new(w.clone(), waits));

        let start = tokio::time::Instant::now();
        assert_eq!(waiting.get_resolution(&w.uid).await, Resolution::Approved);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(10));
    }
}

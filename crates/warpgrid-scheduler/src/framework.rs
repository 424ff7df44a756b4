//! Scheduling framework — runs plugins at each extension point.
//!
//! The framework is built once from a [`Registry`] and a profile. Each
//! configured plugin is instantiated a single time and shared by every
//! extension point it appears in.
//!
//! Stage contracts:
//! - **Filter**: per node, plugins in order; the first failure excludes
//!   the node and later plugins never see it.
//! - **PreScore**: once per attempt; any failure aborts.
//! - **Score**: per plugin, every node; normalization runs once over the
//!   complete row; rows are summed with their weights.
//! - **Permit**: may approve, reject, or park the workload in the
//!   waiting pod registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};
use warpgrid_placement::{NodeScoreList, ScoreMatrix};

use crate::config::SchedulerConfig;
use crate::cycle_state::CycleState;
use crate::error::{SchedulerError, SchedulerResult};
use crate::plugin::{FilterPlugin, Handle, PermitPlugin, Plugin, PreScorePlugin, ScorePlugin};
use crate::registry::Registry;
use crate::status::{Code, Status};
use crate::types::{Node, Workload};
use crate::waiting::{WaitingPod, WaitingPods};

/// Upper bound on any single permit plugin's wait.
pub const MAX_PERMIT_WAIT: Duration = Duration::from_secs(15 * 60);

struct WeightedScorePlugin {
    plugin: Arc<dyn ScorePlugin>,
    weight: i64,
}

/// Outcome of the Filter stage.
#[derive(Debug, Clone, Default)]
pub struct FilterResult {
    /// Feasible nodes, in input order.
    pub feasible: Vec<Node>,
    /// Rejected node name → status of the plugin that rejected it.
    pub diagnosis: BTreeMap<String, Status>,
}

impl FilterResult {
    /// Summary like `0/3 nodes are available: 2 NodeName, 1 NodeSelector.`
    pub fn fit_error(&self, total_nodes: usize) -> String {
        let mut per_plugin: BTreeMap<&str, usize> = BTreeMap::new();
        for status in self.diagnosis.values() {
            *per_plugin.entry(status.failed_plugin().unwrap_or("unknown")).or_insert(0) += 1;
        }
        if per_plugin.is_empty() {
            return format!("0/{total_nodes} nodes are available.");
        }
        let parts: Vec<String> = per_plugin
            .iter()
            .map(|(plugin, count)| format!("{count} {plugin}"))
            .collect();
        format!("0/{total_nodes} nodes are available: {}.", parts.join(", "))
    }
}

/// Outcome of the Permit stage.
#[derive(Debug)]
pub struct PermitResult {
    pub status: Status,
    /// The pod registered for this attempt when `status` is `Wait`.
    pub waiting: Option<Arc<WaitingPod>>,
}

impl PermitResult {
    fn done(status: Status) -> Self {
        Self {
            status,
            waiting: None,
        }
    }
}

pub struct Framework {
    filter_plugins: Vec<Arc<dyn FilterPlugin>>,
    pre_score_plugins: Vec<Arc<dyn PreScorePlugin>>,
    score_plugins: Vec<WeightedScorePlugin>,
    permit_plugins: Vec<Arc<dyn PermitPlugin>>,
    waiting_pods: Arc<WaitingPods>,
}

impl Framework {
    /// Build the framework for `config.profile` from `registry`.
    pub fn new(registry: &Registry, config: &SchedulerConfig, handle: Handle) -> SchedulerResult<Self> {
        let mut instances: HashMap<String, Arc<dyn Plugin>> = HashMap::new();
        for name in config.plugin_names() {
            let plugin = registry.instantiate(&name, config.plugin_args.get(&name), &handle)?;
            debug!(plugin = %name, "plugin initialized");
            instances.insert(name, plugin);
        }

        let instance = |name: &str| -> SchedulerResult<Arc<dyn Plugin>> {
            instances
                .get(name)
                .cloned()
                .ok_or_else(|| SchedulerError::UnknownPlugin(name.to_string()))
        };
        let missing = |name: &str, extension: &'static str| SchedulerError::MissingExtension {
            plugin: name.to_string(),
            extension,
        };

        let profile = &config.profile;
        let filter_plugins = profile
            .filter
            .iter()
            .map(|n| instance(n)?.filter_ext().ok_or_else(|| missing(n, "Filter")))
            .collect::<SchedulerResult<Vec<_>>>()?;
        let pre_score_plugins = profile
            .pre_score
            .iter()
            .map(|n| instance(n)?.pre_score_ext().ok_or_else(|| missing(n, "PreScore")))
            .collect::<SchedulerResult<Vec<_>>>()?;
        let score_plugins = profile
            .score
            .iter()
            .map(|sp| {
                let plugin = instance(&sp.name)?
                    .score_ext()
                    .ok_or_else(|| missing(&sp.name, "Score"))?;
                Ok(WeightedScorePlugin {
                    plugin,
                    weight: sp.weight,
                })
            })
            .collect::<SchedulerResult<Vec<_>>>()?;
        let permit_plugins = profile
            .permit
            .iter()
            .map(|n| instance(n)?.permit_ext().ok_or_else(|| missing(n, "Permit")))
            .collect::<SchedulerResult<Vec<_>>>()?;

        info!(
            filter = filter_plugins.len(),
            pre_score = pre_score_plugins.len(),
            score = score_plugins.len(),
            permit = permit_plugins.len(),
            "scheduling framework initialized"
        );

        Ok(Self {
            filter_plugins,
            pre_score_plugins,
            score_plugins,
            permit_plugins,
            waiting_pods: handle.waiting_pods().clone(),
        })
    }

    pub fn waiting_pods(&self) -> &Arc<WaitingPods> {
        &self.waiting_pods
    }

    /// Run Filter plugins against every node.
    pub fn run_filter_plugins(&self, state: &CycleState, workload: &Workload, nodes: &[Node]) -> FilterResult {
        let mut result = FilterResult {
            feasible: Vec::with_capacity(nodes.len()),
            diagnosis: BTreeMap::new(),
        };

        for node in nodes {
            let status = self.run_filter_plugins_on_node(state, workload, node);
            if status.is_success() {
                result.feasible.push(node.clone());
            } else {
                debug!(
                    workload = %workload.key(),
                    node = %node.name,
                    %status,
                    "node filtered out"
                );
                result.diagnosis.insert(node.name.clone(), status);
            }
        }

        result
    }

    fn run_filter_plugins_on_node(&self, state: &CycleState, workload: &Workload, node: &Node) -> Status {
        for pl in &self.filter_plugins {
            let status = pl.filter(state, workload, node);
            if !status.is_success() {
                return stage_failure(status, pl.name(), "Filter");
            }
        }
        Status::success()
    }

    /// Run PreScore plugins once over the feasible nodes.
    pub fn run_pre_score_plugins(&self, state: &mut CycleState, workload: &Workload, nodes: &[Node]) -> Status {
        for pl in &self.pre_score_plugins {
            let status = pl.pre_score(state, workload, nodes);
            if !status.is_success() {
                return stage_failure(status, pl.name(), "PreScore");
            }
        }
        Status::success()
    }

    /// Score every feasible node and return the weighted aggregate, in
    /// node order.
    pub fn run_score_plugins(
        &self,
        state: &CycleState,
        workload: &Workload,
        nodes: &[Node],
    ) -> Result<NodeScoreList, Status> {
        let mut matrix = ScoreMatrix::new(nodes.iter().map(|n| n.name.clone()).collect());

        for wp in &self.score_plugins {
            let pl = &wp.plugin;
            let row = matrix.add_row(pl.name(), wp.weight);

            for (index, node) in nodes.iter().enumerate() {
                let score = pl
                    .score(state, workload, &node.name)
                    .map_err(|status| stage_failure(status, pl.name(), "Score"))?;
                row.scores[index].score = score;
            }

            // Only after the whole row is filled in.
            if let Some(ext) = pl.score_extensions() {
                let status = ext.normalize_score(state, workload, &mut row.scores);
                if !status.is_success() {
                    return Err(stage_failure(status, pl.name(), "NormalizeScore"));
                }
            }
        }

        matrix
            .aggregate()
            .map_err(|e| Status::error(format!("aggregate scores: {e}")))
    }

    /// Run Permit plugins for the selected node.
    ///
    /// Returns `Success`, a terminal rejection/error attributed to the
    /// plugin, or `Wait` together with the waiting pod it registered.
    pub fn run_permit_plugins(
        &self,
        state: &CycleState,
        workload: &Arc<Workload>,
        node_name: &str,
    ) -> PermitResult {
        let mut plugin_wait_times: HashMap<String, Duration> = HashMap::new();

        for pl in &self.permit_plugins {
            let (status, timeout) = pl.permit(state, workload, node_name);
            match status.code() {
                Code::Success => {}
                Code::Unschedulable => {
                    info!(
                        workload = %workload.key(),
                        plugin = pl.name(),
                        status = status.message(),
                        "workload rejected by permit plugin"
                    );
                    return PermitResult::done(status.with_failed_plugin(pl.name()));
                }
                Code::Wait => {
                    plugin_wait_times.insert(pl.name().to_string(), timeout.min(MAX_PERMIT_WAIT));
                }
                Code::Error => {
                    error!(
                        workload = %workload.key(),
                        plugin = pl.name(),
                        error = status.message(),
                        "failed running permit plugin"
                    );
                    return PermitResult::done(
                        Status::error(format!(
                            "running Permit plugin {}: {}",
                            pl.name(),
                            status.message()
                        ))
                        .with_failed_plugin(pl.name()),
                    );
                }
            }
        }

        if plugin_wait_times.is_empty() {
            return PermitResult::done(Status::success());
        }

        debug!(
            workload = %workload.key(),
            plugins = plugin_wait_times.len(),
            "one or more plugins asked to wait and no plugin rejected the workload"
        );
        let pod = WaitingPod::new(workload.clone(), plugin_wait_times);
        self.waiting_pods.add(pod.clone());
        PermitResult {
            status: Status::wait(format!(
                "one or more plugins asked to wait and no plugin rejected workload {}",
                workload.key()
            )),
            waiting: Some(pod),
        }
    }

    /// Block until the pod registered by [`run_permit_plugins`](Self::run_permit_plugins)
    /// is allowed or rejected.
    ///
    /// A pod superseded by a later attempt for the same workload comes
    /// back rejected.
    pub async fn wait_on_permit(&self, pod: &Arc<WaitingPod>) -> Status {
        let status = self.waiting_pods.wait_for(pod).await.into_status();
        if !status.is_success() {
            info!(
                workload = %pod.workload().key(),
                %status,
                "workload rejected while waiting on permit"
            );
        }
        status
    }
}

/// Attribute a failing status to `plugin`. `Wait` is only meaningful from
/// Permit and becomes an error anywhere else.
fn stage_failure(status: Status, plugin: &str, stage: &str) -> Status {
    let status = match status.code() {
        Code::Wait => Status::error(format!(
            "{stage} plugin returned Wait, which only Permit plugins may return"
        )),
        Code::Success => Status::error(format!("{stage} plugin failed with a Success status")),
        Code::Unschedulable | Code::Error => status,
    };
    status.with_failed_plugin(plugin)
}

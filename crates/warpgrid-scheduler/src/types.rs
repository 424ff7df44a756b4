//! Domain types consumed by the scheduling pipeline.
//!
//! Workloads and nodes are snapshots handed in by the surrounding system.
//! The scheduler reads them but never mutates them.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a workload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkloadId(String);

impl WorkloadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkloadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── Workload ──────────────────────────────────────────────────────

/// A unit of work awaiting placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub uid: WorkloadId,
    pub namespace: String,
    pub name: String,
    /// Pin the workload to a single node by name.
    #[serde(default)]
    pub node_name: Option<String>,
    /// Labels a node must carry (all must match).
    #[serde(default)]
    pub node_selector: HashMap<String, String>,
    /// Labels that make a node more attractive (soft affinity).
    #[serde(default)]
    pub preferred_labels: HashMap<String, String>,
}

impl Workload {
    /// Create a workload with no placement constraints.
    pub fn new(uid: impl Into<String>, namespace: &str, name: &str) -> Self {
        Self {
            uid: WorkloadId::new(uid),
            namespace: namespace.to_string(),
            name: name.to_string(),
            node_name: None,
            node_selector: HashMap::new(),
            preferred_labels: HashMap::new(),
        }
    }

    /// `{namespace}/{name}`, used in log lines.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

// ── Node ──────────────────────────────────────────────────────────

/// A placement target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Node {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            labels: HashMap::new(),
        }
    }

    /// Builder-style label setter.
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }
}

// ── Binding ───────────────────────────────────────────────────────

/// A placement decision handed to the binder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub workload_id: WorkloadId,
    pub namespace: String,
    pub name: String,
    pub node_name: String,
}

impl Binding {
    pub fn new(workload: &Workload, node_name: &str) -> Self {
        Self {
            workload_id: workload.uid.clone(),
            namespace: workload.namespace.clone(),
            name: workload.name.clone(),
            node_name: node_name.to_string(),
        }
    }
}

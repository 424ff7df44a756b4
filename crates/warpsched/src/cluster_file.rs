//! Cluster file — the nodes and pending workloads the daemon starts with.
//!
//! ```toml
//! [[nodes]]
//! name = "node1"
//! labels = { zone = "eu" }
//!
//! [[workloads]]
//! uid = "w-1"
//! namespace = "default"
//! name = "web-1"
//! node_selector = { zone = "eu" }
//! ```

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use warpgrid_scheduler::{Node, Workload};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterFile {
    pub nodes: Vec<Node>,
    pub workloads: Vec<Workload>,
}

impl ClusterFile {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parse {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let file: ClusterFile = toml::from_str(content)?;
        file.validate()?;
        Ok(file)
    }

    /// Node names must be unique and non-empty.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.name.is_empty() {
                bail!("node with empty name");
            }
            if !seen.insert(node.name.as_str()) {
                bail!("duplicate node {}", node.name);
            }
        }
        Ok(())
    }
}

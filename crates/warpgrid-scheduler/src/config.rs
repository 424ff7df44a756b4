//! Scheduler configuration (TOML).
//!
//! ```toml
//! seed = 42
//!
//! [profile]
//! filter = ["NodeName", "NodeSelector"]
//! pre_score = ["NodeNumber", "LabelAffinity"]
//! score = [{ name = "NodeNumber", weight = 1 }, { name = "LabelAffinity", weight = 2 }]
//! permit = ["NodeNumber"]
//!
//! [plugin_args.NodeNumber]
//! permit_timeout_ms = 10000
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use warpgrid_placement::{DEFAULT_SCORE_WEIGHT, MAX_SCORE_WEIGHT};

use crate::error::{SchedulerError, SchedulerResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seed for the tie-break random source. Random when unset.
    pub seed: Option<u64>,
    pub profile: ProfileConfig,
    /// Per-plugin arguments, keyed by plugin name.
    pub plugin_args: HashMap<String, toml::Value>,
}

/// Ordered plugin names per extension point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub filter: Vec<String>,
    pub pre_score: Vec<String>,
    pub score: Vec<ScorePluginConfig>,
    pub permit: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorePluginConfig {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: i64,
}

fn default_weight() -> i64 {
    DEFAULT_SCORE_WEIGHT
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            filter: vec!["NodeName".to_string()],
            pre_score: vec!["NodeNumber".to_string()],
            score: vec![ScorePluginConfig {
                name: "NodeNumber".to_string(),
                weight: DEFAULT_SCORE_WEIGHT,
            }],
            permit: vec!["NodeNumber".to_string()],
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            seed: None,
            profile: ProfileConfig::default(),
            plugin_args: HashMap::new(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_file(path: &Path) -> SchedulerResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SchedulerError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> SchedulerResult<Self> {
        let config: SchedulerConfig =
            toml::from_str(content).map_err(|e| SchedulerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> SchedulerResult<String> {
        toml::to_string_pretty(self).map_err(|e| SchedulerError::Config(e.to_string()))
    }

    /// Reject weights outside `1..=MAX_SCORE_WEIGHT` and duplicate names
    /// within a stage.
    pub fn validate(&self) -> SchedulerResult<()> {
        for sp in &self.profile.score {
            if sp.weight <= 0 {
                return Err(SchedulerError::Config(format!(
                    "score plugin {} has non-positive weight {}",
                    sp.name, sp.weight
                )));
            }
            if sp.weight > MAX_SCORE_WEIGHT {
                return Err(SchedulerError::Config(format!(
                    "score plugin {} weight {} exceeds the maximum of {MAX_SCORE_WEIGHT}",
                    sp.name, sp.weight
                )));
            }
        }

        let score_names: Vec<String> = self.profile.score.iter().map(|s| s.name.clone()).collect();
        let stages: [(&str, &[String]); 4] = [
            ("filter", &self.profile.filter),
            ("pre_score", &self.profile.pre_score),
            ("score", &score_names),
            ("permit", &self.profile.permit),
        ];
        for (stage, names) in stages {
            let mut seen = std::collections::HashSet::new();
            for name in names {
                if !seen.insert(name) {
                    return Err(SchedulerError::Config(format!(
                        "plugin {name} listed twice in {stage}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Every distinct plugin name in the profile, in first-seen order.
    pub fn plugin_names(&self) -> Vec<String> {
        let p = &self.profile;
        let mut names: Vec<String> = Vec::new();
        let all = p
            .filter
            .iter()
            .chain(&p.pre_score)
            .chain(p.score.iter().map(|s| &s.name))
            .chain(&p.permit);
        for name in all {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_matches_builtin_pipeline() {
        let config = SchedulerConfig::default();
        assert_eq!(config.profile.filter, vec!["NodeName"]);
        assert_eq!(config.profile.score[0].weight, 1);
        assert_eq!(config.plugin_names(), vec!["NodeName", "NodeNumber"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_full_config() {
        let config = SchedulerConfig::from_toml_str(
            r#"
            seed = 7

            [profile]
            filter = ["NodeName", "NodeSelector"]
            pre_score = []
            score = [{ name = "LabelAffinity", weight = 3 }, { name = "NodeNumber" }]
            permit = []

            [plugin_args.NodeNumber]
            match_score = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.seed, Some(7));
        assert_eq!(config.profile.filter.len(), 2);
        assert_eq!(config.profile.score[0].weight, 3);
        assert_eq!(config.profile.score[1].weight, 1);
        assert!(config.profile.permit.is_empty());
        assert!(config.plugin_args.contains_key("NodeNumber"));
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config = SchedulerConfig::from_toml_str("seed = 1").unwrap();
        assert_eq!(config.profile, ProfileConfig::default());
    }

    #[test]
    fn rejects_zero_weight() {
        let err = SchedulerConfig::from_toml_str(
            r#"
            [profile]
            score = [{ name = "NodeNumber", weight = 0 }]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("non-positive weight"));
    }

    #[test]
    fn rejects_oversized_weight() {
        let err = SchedulerConfig::from_toml_str(
            r#"
            [profile]
            score = [{ name = "NodeNumber", weight = 9223372036854775807 }]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exceeds the maximum of 100"));

        let ok = SchedulerConfig::from_toml_str(
            r#"
            [profile]
            score = [{ name = "NodeNumber", weight = 100 }]
            "#,
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn rejects_duplicate_stage_entry() {
        let err = SchedulerConfig::from_toml_str(
            r#"
            [profile]
            filter = ["NodeName", "NodeName"]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn toml_round_trip() {
        let mut config = SchedulerConfig::default();
        config.seed = Some(99);
        let text = config.to_toml_string().unwrap();
        let back = SchedulerConfig::from_toml_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler.toml");
        std::fs::write(&path, "seed = 3\n[profile]\npermit = []\n").unwrap();

        let config = SchedulerConfig::from_file(&path).unwrap();
        assert_eq!(config.seed, Some(3));
        assert!(config.profile.permit.is_empty());
    }

    #[test]
    fn from_file_missing_is_config_error() {
        let err = SchedulerConfig::from_file(Path::new("/nonexistent/scheduler.toml")).unwrap_err();
        assert!(matches!(err, SchedulerError::Config(_)));
    }
}

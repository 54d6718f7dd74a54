//! Experiment configuration: one shared scenario plus per-strategy
//! sections. Loaded from a JSON file, every field individually optional.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use sumo::ScenarioConfig;

use crate::agents::{DqnConfig, QlConfig};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FixedSection {
    pub name: String,
    pub color: String,
}

impl Default for FixedSection {
    fn default() -> Self {
        Self {
            name: "fixed".to_string(),
            color: "#7f7f7f".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QlSection {
    pub name: String,
    pub color: String,
    #[serde(flatten)]
    pub hyper: QlConfig,
}

impl Default for QlSection {
    fn default() -> Self {
        Self {
            name: "ql".to_string(),
            color: "#1f77b4".to_string(),
            hyper: QlConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DqnSection {
    pub name: String,
    pub color: String,
    #[serde(flatten)]
    pub hyper: DqnConfig,
}

impl Default for DqnSection {
    fn default() -> Self {
        Self {
            name: "dqn".to_string(),
            color: "#ff7f0e".to_string(),
            hyper: DqnConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Base URL of the sumo-http bridge.
    pub api_url: String,
    pub out_dir: PathBuf,
    pub scenario: ScenarioConfig,
    pub fixed: FixedSection,
    pub ql: QlSection,
    pub dqn: DqnSection,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:40004".to_string(),
            out_dir: PathBuf::from("outputs"),
            scenario: ScenarioConfig::default(),
            fixed: FixedSection::default(),
            ql: QlSection::default(),
            dqn: DqnSection::default(),
        }
    }
}

impl ExperimentConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::*;

    #[test]
    fn empty_object_yields_defaults() {
        let cfg: ExperimentConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.api_url, "http://127.0.0.1:40004");
        assert_eq!(cfg.ql.name, "ql");
        assert_float_eq!(cfg.dqn.hyper.gamma, 0.99, abs <= 1e-12);
        assert_eq!(cfg.scenario.num_seconds, 20000);
    }

    #[test]
    fn sections_flatten_their_hyperparameters() {
        let cfg: ExperimentConfig = serde_json::from_str(
            r#"{
                "scenario": { "num_seconds": 5000 },
                "ql": { "name": "ql-fast", "alpha": 0.5 },
                "dqn": { "learning_rate": 0.0001, "hidden_layers": [32] }
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.scenario.num_seconds, 5000);
        assert_eq!(cfg.ql.name, "ql-fast");
        assert_float_eq!(cfg.ql.hyper.alpha, 0.5, abs <= 1e-12);
        // Untouched fields keep their defaults.
        assert_float_eq!(cfg.ql.hyper.gamma, 0.99, abs <= 1e-12);
        assert_float_eq!(cfg.dqn.hyper.learning_rate, 1e-4, abs <= 1e-12);
        assert_eq!(cfg.dqn.hyper.hidden_layers, vec![32]);
    }

    #[test]
    fn load_reports_the_offending_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = ExperimentConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("broken.json"));
    }
}

//! Run configuration.
//!
//! `SplitConfig` is built by the CLI (or directly by library callers),
//! validated once, and written into the run workspace as
//! `split_config.json` so a kept workspace records how it was produced.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SplitError};
use crate::resource::TuningProfile;

pub const CONFIG_FILE: &str = "split_config.json";

pub const DEFAULT_OUT_PREFIX: &str = "dataset";
pub const DEFAULT_SPLIT_RATIO: f64 = 0.8;
pub const DEFAULT_EDGE_UPDATE_RATIO: f64 = 0.2;

// ── Field Names ────────────────────────────────────────────────────

/// Names of the identifier fields in input records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldNames {
    /// Vertex identifier.
    pub id: String,
    /// Edge source endpoint.
    pub out_v: String,
    /// Edge target endpoint.
    pub in_v: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            id: "_id".to_string(),
            out_v: "_outV".to_string(),
            in_v: "_inV".to_string(),
        }
    }
}

// ── Split Config ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Source graph document.
    pub input: PathBuf,
    /// Prefix for the four output files.
    pub out_prefix: String,
    /// Fraction of vertices assigned to Load.
    pub split_ratio: f64,
    /// Fraction of referentially valid edges assigned to Update.
    pub edge_update_ratio: f64,
    /// Number of edge shards.
    pub shards: usize,
    /// Parallel shard workers. None = min(shards, cpu count).
    #[serde(default)]
    pub workers: Option<usize>,
    /// Base RNG seed. None = drawn from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Parent directory for the run workspace. None = system temp dir.
    #[serde(default)]
    pub tmp_dir: Option<PathBuf>,
    /// Keep the run workspace after the run ends.
    #[serde(default)]
    pub keep_tmp: bool,
    /// Membership entries buffered before spilling. None = from RAM.
    #[serde(default)]
    pub membership_buffer: Option<usize>,
    #[serde(default)]
    pub fields: FieldNames,
}

impl SplitConfig {
    /// Config with defaults for everything but the input path.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            out_prefix: DEFAULT_OUT_PREFIX.to_string(),
            split_ratio: DEFAULT_SPLIT_RATIO,
            edge_update_ratio: DEFAULT_EDGE_UPDATE_RATIO,
            shards: TuningProfile::detect().shard_count,
            workers: None,
            seed: None,
            tmp_dir: None,
            keep_tmp: false,
            membership_buffer: None,
            fields: FieldNames::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_ratio("split ratio", self.split_ratio)?;
        check_ratio("edge update ratio", self.edge_update_ratio)?;
        if self.shards == 0 {
            return Err(SplitError::InvalidConfig("shard count must be > 0".into()));
        }
        if self.workers == Some(0) {
            return Err(SplitError::InvalidConfig("worker count must be > 0".into()));
        }
        if self.membership_buffer == Some(0) {
            return Err(SplitError::InvalidConfig(
                "membership buffer must hold at least one entry".into(),
            ));
        }
        if self.out_prefix.is_empty() {
            return Err(SplitError::InvalidConfig("output prefix is empty".into()));
        }
        for (what, name) in [
            ("id field", &self.fields.id),
            ("out field", &self.fields.out_v),
            ("in field", &self.fields.in_v),
        ] {
            if name.is_empty() {
                return Err(SplitError::InvalidConfig(format!("{what} name is empty")));
            }
        }
        Ok(())
    }

    /// Read config from a workspace. Returns None if the file doesn't exist.
    pub fn read_from(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(Some(config))
    }

    /// Write config to a workspace.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        let path = dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| SplitError::io_at(&path, e))?;
        Ok(())
    }
}

fn check_ratio(what: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SplitError::InvalidConfig(format!(
            "{what} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = SplitConfig::new("graph.json");
        assert_eq!(config.out_prefix, "dataset");
        assert_eq!(config.split_ratio, 0.8);
        assert_eq!(config.edge_update_ratio, 0.2);
        assert!(config.shards >= 4);
        assert_eq!(config.fields.id, "_id");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SplitConfig::new("graph.json");
        config.split_ratio = 1.5;
        assert!(matches!(config.validate(), Err(SplitError::InvalidConfig(_))));

        let mut config = SplitConfig::new("graph.json");
        config.edge_update_ratio = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = SplitConfig::new("graph.json");
        config.shards = 0;
        assert!(config.validate().unwrap_err().to_string().contains("shard count"));

        let mut config = SplitConfig::new("graph.json");
        config.fields.in_v.clear();
        assert!(config.validate().unwrap_err().to_string().contains("in field"));
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = TempDir::new().unwrap();
        assert!(SplitConfig::read_from(dir.path()).unwrap().is_none());

        let mut config = SplitConfig::new("graph.json");
        config.seed = Some(9);
        config.shards = 3;
        config.write_to(dir.path()).unwrap();

        let loaded = SplitConfig::read_from(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, config);
    }
}

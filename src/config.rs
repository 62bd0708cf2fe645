//! `.fednode.config` — the persisted install record.
//!
//! Its presence is what separates a fresh checkout from an installed node:
//! only `install` and `docker_clean` run without it, and `install` refuses to
//! run with it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::topology::Topology;

pub const CONFIG_FILE: &str = ".fednode.config";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FednodeConfig {
    /// Git branch the node was installed from (`master` or `develop`).
    pub branch: String,
    pub topology: Topology,
    #[serde(default)]
    pub installed_at: Option<DateTime<Utc>>,
}

/// On-disk layout: a single `[default]` table.
#[derive(Deserialize, Serialize)]
struct ConfigFile {
    default: FednodeConfig,
}

impl FednodeConfig {
    pub fn new(topology: Topology, branch: &str) -> Self {
        Self {
            branch: branch.to_string(),
            topology,
            installed_at: Some(Utc::now()),
        }
    }

    pub fn path(root: &Path) -> PathBuf {
        root.join(CONFIG_FILE)
    }

    /// `Ok(None)` when no config has been written yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&text)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(Some(file.default))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(&ConfigFile {
            default: self.clone(),
        })?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write config file: {}", path.display()))
    }

    pub fn remove(path: &Path) -> Result<()> {
        std::fs::remove_file(path)
            .with_context(|| format!("failed to remove config file: {}", path.display()))
    }

    /// Image tag the compose descriptors pull: `latest` for the stable line,
    /// the branch name otherwise.
    pub fn release_tag(&self) -> &str {
        match self.branch.as_str() {
            "master" => "latest",
            other => other,
        }
    }
}

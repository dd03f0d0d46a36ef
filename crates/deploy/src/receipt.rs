//! JSON receipt describing a finished deployment.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cluster::ClusterInfo;
use crate::program::ProgramId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentReceipt {
    pub cluster: String,
    pub url: String,
    pub program_id: Option<ProgramId>,
    pub elapsed_secs: f64,
    pub deployed_at: DateTime<Utc>,
    pub validator_pid: Option<u32>,
}

impl DeploymentReceipt {
    pub fn new(
        cluster: &ClusterInfo,
        program_id: Option<&ProgramId>,
        elapsed: Duration,
        validator_pid: Option<u32>,
    ) -> Self {
        Self {
            cluster: cluster.name.to_string(),
            url: cluster.url.clone(),
            program_id: program_id.cloned(),
            elapsed_secs: elapsed.as_secs_f64(),
            deployed_at: Utc::now(),
            validator_pid,
        }
    }

    /// Write the receipt as pretty-printed JSON, creating parent directories as needed.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create directory {}", parent.display()))?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize deployment receipt")?;
        std::fs::write(path, content)
            .context(format!("Failed to write deployment receipt to {}", path.display()))?;

        tracing::info!(path = %path.display(), "Deployment receipt written");
        Ok(())
    }
}

//! Docker `daemon.json`.
use super::{error, Result};
use super::Override;
use crate::encoding::to_json_indented;
use datamodel::constants;
use serde::Serialize;
use snafu::ResultExt;
use std::collections::BTreeMap;

pub const NVIDIA_RUNTIME: &str = "nvidia";
const NVIDIA_RUNTIME_PATH: &str = "/usr/bin/nvidia-container-runtime";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DockerConfig {
    #[serde(rename = "live-restore")]
    pub live_restore: bool,
    #[serde(rename = "log-driver")]
    pub log_driver: String,
    #[serde(rename = "log-opts")]
    pub log_opts: DockerLogOpts,
    #[serde(rename = "data-root", skip_serializing_if = "Option::is_none")]
    pub data_root: Option<String>,
    #[serde(rename = "default-runtime", skip_serializing_if = "Option::is_none")]
    pub default_runtime: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub runtimes: BTreeMap<String, DockerRuntime>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DockerLogOpts {
    #[serde(rename = "max-size")]
    pub max_size: String,
    #[serde(rename = "max-file")]
    pub max_file: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DockerRuntime {
    pub path: String,
    #[serde(rename = "runtimeArgs")]
    pub runtime_args: Vec<String>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            live_restore: true,
            log_driver: "json-file".to_string(),
            log_opts: DockerLogOpts {
                max_size: "50m".to_string(),
                max_file: "5".to_string(),
            },
            data_root: None,
            default_runtime: None,
            runtimes: BTreeMap::new(),
        }
    }
}

/// Builds `daemon.json` from the default. Overrides run in order; `opts["dataDir"]` then moves the
/// docker data root.
pub fn get_docker_config(
    opts: &BTreeMap<String, String>,
    overrides: &[Override<DockerConfig>],
) -> Result<String> {
    let mut config = DockerConfig::default();
    for apply in overrides {
        apply(&mut config)?;
    }
    if let Some(data_dir) = opts
        .get(constants::CONTAINER_DATA_DIR_KEY)
        .filter(|dir| !dir.is_empty())
    {
        config.data_root = Some(data_dir.clone());
    }
    to_json_indented(&config).context(error::JsonSerializeSnafu)
}

/// Makes the NVIDIA container runtime the default.
pub fn nvidia_runtime_override() -> Override<DockerConfig> {
    Box::new(|config| {
        config.default_runtime = Some(NVIDIA_RUNTIME.to_string());
        config.runtimes.insert(
            NVIDIA_RUNTIME.to_string(),
            DockerRuntime {
                path: NVIDIA_RUNTIME_PATH.to_string(),
                runtime_args: Vec::new(),
            },
        );
        Ok(())
    })
}

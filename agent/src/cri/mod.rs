//! Container runtime configuration: containerd `config.toml` and docker `daemon.json`.
//!
//! Both renderers start from a default, apply a list of [`Override`]s in order and finally honour
//! the `dataDir` runtime option. The functions at this level pick the overrides a node needs.
pub mod containerd;
pub mod docker;

use crate::sku;
use containerd::{ContainerdConfig, ContainerdSchema};
use datamodel::constants;
use datamodel::NodeBootstrappingConfiguration;
use docker::DockerConfig;
use std::collections::BTreeMap;
use tracing::{event, Level};

/// A single edit of a runtime configuration.
pub type Override<T> = Box<dyn Fn(&mut T) -> Result<()> + Send + Sync>;

/// The runtime options of the NBC, cluster-wide then pool-level.
pub fn runtime_options(nbc: &NodeBootstrappingConfiguration) -> BTreeMap<String, String> {
    let mut opts = BTreeMap::new();
    if let Some(config) = nbc.kubernetes_config() {
        opts.extend(config.container_runtime_config.clone());
    }
    if let Some(config) = &nbc.agent_pool_profile.kubernetes_config {
        opts.extend(config.container_runtime_config.clone());
    }
    opts
}

/// Whether the node gets the NVIDIA container runtime.
pub fn needs_nvidia_runtime(nbc: &NodeBootstrappingConfiguration) -> bool {
    nbc.enable_nvidia || sku::is_nvidia_enabled_sku(&nbc.agent_pool_profile.vm_size)
}

fn network_plugin(nbc: &NodeBootstrappingConfiguration) -> &str {
    nbc.kubernetes_config()
        .map(|config| config.network_plugin.as_str())
        .unwrap_or_default()
}

/// The containerd configuration of a node. With `include_gpu` false the NVIDIA runtime is left out
/// even on GPU sizes; that variant is used when the driver install is skipped.
pub fn containerd_config_for(
    nbc: &NodeBootstrappingConfiguration,
    include_gpu: bool,
) -> Result<String> {
    let schema = ContainerdSchema::for_kubernetes_version(nbc.orchestrator_version());
    let mut overrides: Vec<Override<ContainerdConfig>> = Vec::new();

    let sandbox_image = &nbc.k8s_components.pod_infra_container_image_url;
    if !sandbox_image.is_empty() {
        overrides.push(containerd::sandbox_image_override(sandbox_image.clone()));
    }
    if network_plugin(nbc) == constants::NETWORK_PLUGIN_KUBENET {
        overrides.push(containerd::kubenet_template_override());
    }
    if include_gpu && needs_nvidia_runtime(nbc) {
        overrides.push(containerd::nvidia_runtime_override());
    }
    if nbc.agent_pool_profile.distro.is_kata() {
        overrides.push(containerd::kata_runtime_override());
    }
    if nbc.enable_artifact_streaming {
        overrides.push(containerd::overlaybd_snapshotter_override());
    } else if nbc.enable_acr_teleport_plugin {
        overrides.push(containerd::snapshotter_override(
            containerd::TELEPORTD_SNAPSHOTTER.to_string(),
        ));
    }

    event!(
        Level::DEBUG,
        schema = ?schema,
        include_gpu,
        "Rendering containerd configuration"
    );
    containerd::get_containerd_config(schema, &runtime_options(nbc), &overrides)
}

/// The docker configuration of a node.
pub fn docker_config_for(nbc: &NodeBootstrappingConfiguration) -> Result<String> {
    let mut overrides: Vec<Override<DockerConfig>> = Vec::new();
    if needs_nvidia_runtime(nbc) {
        overrides.push(docker::nvidia_runtime_override());
    }
    docker::get_docker_config(&runtime_options(nbc), &overrides)
}

pub mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum CriError {
        #[snafu(display("Invalid {} override: {}", name, reason))]
        InvalidOverride { name: String, reason: String },

        #[snafu(display("Unable to encode containerd configuration: '{}'", source))]
        TomlSerialize { source: toml_edit::ser::Error },

        #[snafu(display("Unable to encode docker configuration: '{}'", source))]
        JsonSerialize { source: serde_json::Error },
    }
}

type Result<T> = std::result::Result<T, CriError>;
pub use error::CriError;

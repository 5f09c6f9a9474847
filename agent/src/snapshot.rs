//! The frozen view of one request that every template function reads from.
//!
//! The builder clones the caller's NBC once, reconciles the clone's kubelet flags and precomputes
//! every derived value that can fail. Template functions then only read from the snapshot, so the
//! custom data and CSE paths always observe the same values and never fail halfway through a
//! template.
use crate::assets::{self, AssetSource};
use crate::cri;
use crate::encoding::{base64_encode, to_json_indented};
use crate::error::{self, Result};
use crate::extensions;
use crate::kubelet;
use crate::linux_os;
use crate::packager::archive;
use crate::params;
use datamodel::NodeBootstrappingConfiguration;
use serde_json::Value;
use snafu::ResultExt;
use std::collections::BTreeMap;
use tracing::{event, instrument, Level};

pub const KUBENET_TEMPLATE: &str = "linux/cloud-init/artifacts/kubenet-template.conf";

/// Everything derived from one NBC before any template runs.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    /// The reconciled private copy of the request.
    pub nbc: NodeBootstrappingConfiguration,
    pub parameters: BTreeMap<String, Value>,
    pub kubelet_flags: String,
    pub kubelet_flags_psh: String,
    pub kubelet_config_file: String,
    pub containerd_config: String,
    pub containerd_config_no_gpu: String,
    pub docker_config: String,
    pub sysctl_content: String,
    /// base64 of the kubenet CNI template, Linux only.
    pub kubenet_template: String,
    pub preprovision_command: String,
    /// base64 of the zipped Windows helper scripts, Windows only.
    pub windows_agent_functions: String,
    /// base64 of the custom cloud environment as JSON.
    pub environment_json: String,
}

impl Snapshot {
    #[instrument(skip(nbc, assets), fields(distro = %nbc.agent_pool_profile.distro))]
    pub fn new(nbc: &NodeBootstrappingConfiguration, assets: &dyn AssetSource) -> Result<Self> {
        let mut nbc = nbc.clone();
        kubelet::reconcile_kubelet_flags(&mut nbc);

        let is_windows = nbc.agent_pool_profile.is_windows();
        let kubelet_config_file =
            kubelet::kubelet_config_file_content(&nbc).context(error::KubeletSnafu)?;

        let (containerd_config, containerd_config_no_gpu, kubenet_template) = if is_windows {
            (String::new(), String::new(), String::new())
        } else {
            (
                cri::containerd_config_for(&nbc, true).context(error::CriSnafu)?,
                cri::containerd_config_for(&nbc, false).context(error::CriSnafu)?,
                base64_encode(assets::load_bytes(assets, KUBENET_TEMPLATE)?),
            )
        };
        let docker_config = cri::docker_config_for(&nbc).context(error::CriSnafu)?;

        let windows_agent_functions = if is_windows {
            let mut files = Vec::with_capacity(assets::WINDOWS_HELPER_SCRIPTS.len());
            for name in assets::WINDOWS_HELPER_SCRIPTS {
                files.push((*name, assets::load_bytes(assets, name)?));
            }
            archive::zip_base64(&files).context(error::PackagerSnafu)?
        } else {
            String::new()
        };

        let environment_json = match &nbc.container_service.properties.custom_cloud_env {
            Some(env) => base64_encode(to_json_indented(env).context(error::SerializeSnafu {
                name: "custom cloud environment",
            })?),
            None => String::new(),
        };

        let snapshot = Self {
            parameters: params::get_parameters(&nbc),
            kubelet_flags: kubelet::kubelet_flag_string(&nbc),
            kubelet_flags_psh: kubelet::kubelet_flag_string_psh(&nbc),
            kubelet_config_file,
            containerd_config,
            containerd_config_no_gpu,
            docker_config,
            sysctl_content: linux_os::sysctl_content(
                nbc.agent_pool_profile.custom_linux_os_config.as_ref(),
            ),
            kubenet_template,
            preprovision_command: extensions::preprovision_command(&nbc)?,
            windows_agent_functions,
            environment_json,
            nbc,
        };
        event!(
            Level::DEBUG,
            kubelet_config_file = kubelet::is_kubelet_config_file_enabled(&snapshot.nbc),
            "Built request snapshot"
        );
        Ok(snapshot)
    }
}

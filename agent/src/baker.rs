/*!
The entry point: turns one node bootstrapping configuration into the custom data and CSE command
a node is created with, plus the image it boots from.

A request is derived in one pass. The image is resolved first so an unknown cloud or distro fails
before any template runs. The NBC is then frozen into a [`Snapshot`] that both the custom data and
the CSE are expanded from, which keeps the two artifacts consistent and leaves the caller's value
untouched.
*/
use crate::assets::{self, AssetSource, EmbeddedAssets};
use crate::context::Context;
use crate::error::{self, Result};
use crate::funcmap::{base_func_map, outer_func_map};
use crate::image::{self, ImageSelection};
use crate::packager::{self, windows, Envelope};
use crate::snapshot::Snapshot;
use crate::template;
use crate::toggles::{Entity, Toggles};
use crate::variables;
use datamodel::image::{get_sig_azure_cloud_spec_config, SigAzureEnvironmentSpecConfig};
use datamodel::{
    constants, AzureOsImageConfig, Distro, EnvironmentInfo, NodeBootstrappingConfiguration,
    SigConfig, SigImageConfig,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// Everything a node needs to be created and provisioned.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeBootstrapping {
    /// The packaged custom data, empty when the request disables custom data.
    pub custom_data: String,
    /// The one-line command the custom script extension runs.
    pub cse: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_image_config: Option<AzureOsImageConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig_image_config: Option<SigImageConfig>,
}

/// Builds node bootstrapping artifacts from the assets in `A`.
///
/// A builder holds no per-request state and can be shared between threads.
#[derive(Clone, Debug)]
pub struct AgentBaker<A: AssetSource = EmbeddedAssets> {
    toggles: Toggles,
    assets: A,
}

impl AgentBaker<EmbeddedAssets> {
    pub fn new(toggles: Toggles) -> Self {
        Self::with_assets(toggles, EmbeddedAssets)
    }
}

impl<A: AssetSource> AgentBaker<A> {
    pub fn with_assets(toggles: Toggles, assets: A) -> Self {
        AgentBaker { toggles, assets }
    }

    /// Derives the custom data, the CSE command and the image of the node `nbc` describes.
    #[instrument(skip(self, ctx, nbc), fields(distro = %nbc.agent_pool_profile.distro), err)]
    pub fn get_node_bootstrapping(
        &self,
        ctx: &Context,
        nbc: &NodeBootstrappingConfiguration,
    ) -> Result<NodeBootstrapping> {
        ensure!(!ctx.is_cancelled(), error::CancelledSnafu);

        let selection = self.select_image(nbc)?;
        let snapshot = Arc::new(Snapshot::new(nbc, &self.assets)?);
        let pool = &snapshot.nbc.agent_pool_profile;
        let envelope = Envelope::for_distro(pool.distro, pool.is_windows());
        event!(
            Level::INFO,
            distro = %pool.distro,
            family = ?pool.distro.family(),
            ?envelope,
            "Building node bootstrapping"
        );

        let root = serde_json::to_value(pool).context(error::SerializeSnafu {
            name: "agent pool profile",
        })?;
        let cse_variables = serde_json::to_value(variables::cse_command_variables(&snapshot))
            .context(error::SerializeSnafu {
                name: "CSE variables",
            })?;

        let custom_data = if snapshot.nbc.disable_custom_data {
            event!(Level::DEBUG, "Custom data disabled by request");
            String::new()
        } else {
            self.custom_data(&snapshot, envelope, &root, &cse_variables)?
        };
        let cse = self.cse(&snapshot, envelope, &root, cse_variables)?;

        Ok(NodeBootstrapping {
            custom_data,
            cse,
            os_image_config: selection.os_image_config,
            sig_image_config: selection.sig_image_config,
        })
    }

    /// The gallery image of `distro` in the region of `env`, with its version subject to the node
    /// image version toggle.
    #[instrument(skip(self, sig_config), err)]
    pub fn get_latest_sig_image_config(
        &self,
        sig_config: &SigConfig,
        distro: Distro,
        env: &EnvironmentInfo,
    ) -> Result<SigImageConfig> {
        let spec = get_sig_azure_cloud_spec_config(sig_config, &env.region)
            .context(error::SigConfigSnafu)?;
        let versions = self.linux_node_image_versions(&Entity::from_environment_info(env));
        image::sig_image_config(&spec, distro, &versions).context(error::DistroNotFoundSnafu {
            distro,
            cloud: spec.cloud_name.clone(),
        })
    }

    /// Every gallery image available in the region of `env`, keyed by distro.
    #[instrument(skip(self, sig_config), err)]
    pub fn get_distro_sig_image_config(
        &self,
        sig_config: &SigConfig,
        env: &EnvironmentInfo,
    ) -> Result<BTreeMap<Distro, SigImageConfig>> {
        let spec = get_sig_azure_cloud_spec_config(sig_config, &env.region)
            .context(error::SigConfigSnafu)?;
        let versions = self.linux_node_image_versions(&Entity::from_environment_info(env));
        Ok(image::distro_sig_image_configs(&spec, &versions))
    }

    fn linux_node_image_versions(&self, entity: &Entity) -> BTreeMap<String, String> {
        self.toggles
            .get_map(constants::LINUX_NODE_IMAGE_VERSION_TOGGLE, entity)
    }

    fn sig_spec(&self, nbc: &NodeBootstrappingConfiguration) -> Result<SigAzureEnvironmentSpecConfig> {
        let sig_config = if nbc.sig_config == SigConfig::default() {
            SigConfig::public()
        } else {
            nbc.sig_config.clone()
        };
        get_sig_azure_cloud_spec_config(&sig_config, &nbc.container_service.location)
            .context(error::SigConfigSnafu)
    }

    fn select_image(&self, nbc: &NodeBootstrappingConfiguration) -> Result<ImageSelection> {
        let cloud = match nbc.cloud_spec_config.cloud_name.as_str() {
            "" => constants::AZURE_PUBLIC_CLOUD,
            cloud => cloud,
        };
        let spec = self.sig_spec(nbc)?;
        let versions = self.linux_node_image_versions(&Entity::from_nbc(nbc));
        image::select_image(cloud, &spec, nbc.agent_pool_profile.distro, &versions)
    }

    fn custom_data(
        &self,
        snapshot: &Arc<Snapshot>,
        envelope: Envelope,
        root: &Value,
        cse_variables: &Value,
    ) -> Result<String> {
        let (name, variables) = match envelope {
            Envelope::Windows => (assets::WINDOWS_CUSTOM_DATA_TEMPLATE, cse_variables.clone()),
            Envelope::CloudInit | Envelope::Ignition => {
                let base = base_func_map(Arc::clone(snapshot));
                (
                    assets::LINUX_CLOUD_INIT_TEMPLATE,
                    variables::custom_data_variables(snapshot, &self.assets, root, &base)?,
                )
            }
        };
        let body = self.expand(name, snapshot, root, variables)?;
        packager::package(envelope, &body, &snapshot.preprovision_command)
    }

    fn cse(
        &self,
        snapshot: &Arc<Snapshot>,
        envelope: Envelope,
        root: &Value,
        cse_variables: Value,
    ) -> Result<String> {
        if envelope == Envelope::Windows {
            let expanded = self.expand(assets::WINDOWS_CSE_CMD, snapshot, root, cse_variables)?;
            return Ok(windows::cse_command(&expanded));
        }
        let expanded = self.expand(assets::LINUX_CSE_CMD, snapshot, root, cse_variables)?;
        Ok(expanded.replace('\n', " "))
    }

    fn expand(
        &self,
        name: &str,
        snapshot: &Arc<Snapshot>,
        root: &Value,
        variables: Value,
    ) -> Result<String> {
        let src = assets::load_text(&self.assets, name)?;
        let funcs = outer_func_map(Arc::clone(snapshot), variables);
        template::render(name, &src, root, &funcs).context(error::TemplateSnafu)
    }
}

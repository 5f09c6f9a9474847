//! containerd `config.toml`.
//!
//! The two on-disk schemas are separate types: version 2 nests everything CRI related under the
//! `io.containerd.grpc.v1.cri` plugin, version 3 (containerd 2.x) splits it between the
//! `io.containerd.cri.v1.images` and `io.containerd.cri.v1.runtime` plugins. Overrides work on
//! the schema-neutral accessors of [`ContainerdConfig`].
use super::{error, Result};
use super::Override;
use datamodel::constants;
use datamodel::version::is_kubernetes_version_ge;
use serde::Serialize;
use snafu::{ensure, ResultExt};
use std::collections::BTreeMap;

pub const DEFAULT_SANDBOX_IMAGE: &str = "mcr.microsoft.com/oss/kubernetes/pause:3.6";
pub const RUNC_RUNTIME: &str = "runc";
pub const UNTRUSTED_RUNTIME: &str = "untrusted";
pub const NVIDIA_RUNTIME: &str = "nvidia";
pub const KATA_RUNTIME: &str = "kata";
pub const TELEPORTD_SNAPSHOTTER: &str = "teleportd";
pub const OVERLAYBD_SNAPSHOTTER: &str = "overlaybd";
pub const OVERLAYBD_SOCKET: &str = "/run/overlaybd-snapshotter/overlaybd.sock";

const RUNC_SHIM: &str = "io.containerd.runc.v2";
const KATA_SHIM: &str = "io.containerd.kata.v2";
const RUNC_BINARY: &str = "/usr/bin/runc";
const NVIDIA_BINARY: &str = "/usr/bin/nvidia-container-runtime";

/// Which config schema to emit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ContainerdSchema {
    V2,
    V3,
}

impl ContainerdSchema {
    pub fn for_kubernetes_version(version: &str) -> Self {
        if is_kubernetes_version_ge(version, constants::CONTAINERD_V3_MIN_KUBE_VERSION) {
            ContainerdSchema::V3
        } else {
            ContainerdSchema::V2
        }
    }
}

/// A containerd configuration in one of its two schemas.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ContainerdConfig {
    V2(ContainerdConfigV2),
    V3(ContainerdConfigV3),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContainerdConfigV2 {
    pub version: i64,
    pub oom_score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    pub plugins: PluginsV2,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub proxy_plugins: BTreeMap<String, ProxyPlugin>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PluginsV2 {
    #[serde(rename = "io.containerd.grpc.v1.cri")]
    pub cri: CriPluginV2,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CriPluginV2 {
    pub sandbox_image: String,
    pub containerd: RuntimeSettings,
    pub cni: CniSettings,
    pub registry: RegistrySettings,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContainerdConfigV3 {
    pub version: i64,
    pub oom_score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    pub plugins: PluginsV3,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub proxy_plugins: BTreeMap<String, ProxyPlugin>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PluginsV3 {
    #[serde(rename = "io.containerd.cri.v1.images")]
    pub images: CriImagesPlugin,
    #[serde(rename = "io.containerd.cri.v1.runtime")]
    pub runtime: CriRuntimePlugin,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CriImagesPlugin {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshotter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_snapshot_annotations: Option<bool>,
    pub pinned_images: PinnedImages,
    pub registry: RegistrySettings,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PinnedImages {
    pub sandbox: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CriRuntimePlugin {
    pub containerd: RuntimeSettings,
    pub cni: CniSettings,
}

/// The `containerd` table: runtimes and, in version 2, the snapshotter.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RuntimeSettings {
    pub default_runtime_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshotter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_snapshot_annotations: Option<bool>,
    pub runtimes: BTreeMap<String, Runtime>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Runtime {
    pub runtime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<RuntimeOptions>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RuntimeOptions {
    #[serde(rename = "BinaryName")]
    pub binary_name: String,
    #[serde(rename = "SystemdCgroup", skip_serializing_if = "Option::is_none")]
    pub systemd_cgroup: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CniSettings {
    pub bin_dir: String,
    pub conf_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conf_template: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegistrySettings {
    pub config_path: String,
    pub headers: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProxyPlugin {
    #[serde(rename = "type")]
    pub plugin_type: String,
    pub address: String,
}

fn runc_runtime(systemd_cgroup: Option<bool>) -> Runtime {
    Runtime {
        runtime_type: RUNC_SHIM.to_string(),
        options: Some(RuntimeOptions {
            binary_name: RUNC_BINARY.to_string(),
            systemd_cgroup,
        }),
    }
}

fn default_runtime_settings() -> RuntimeSettings {
    RuntimeSettings {
        default_runtime_name: RUNC_RUNTIME.to_string(),
        snapshotter: None,
        disable_snapshot_annotations: None,
        runtimes: maplit::btreemap! {
            RUNC_RUNTIME.to_string() => runc_runtime(Some(true)),
            UNTRUSTED_RUNTIME.to_string() => runc_runtime(None),
        },
    }
}

fn default_cni_settings() -> CniSettings {
    CniSettings {
        bin_dir: "/opt/cni/bin".to_string(),
        conf_dir: "/etc/cni/net.d".to_string(),
        conf_template: None,
    }
}

fn default_registry_settings() -> RegistrySettings {
    RegistrySettings {
        config_path: "/etc/containerd/certs.d".to_string(),
        headers: maplit::btreemap! {
            "X-Meta-Source-Client".to_string() => vec!["azure/aks".to_string()],
        },
    }
}

impl ContainerdConfig {
    /// The default configuration of a schema.
    pub fn new(schema: ContainerdSchema) -> Self {
        match schema {
            ContainerdSchema::V2 => ContainerdConfig::V2(ContainerdConfigV2 {
                version: 2,
                oom_score: 0,
                root: None,
                plugins: PluginsV2 {
                    cri: CriPluginV2 {
                        sandbox_image: DEFAULT_SANDBOX_IMAGE.to_string(),
                        containerd: default_runtime_settings(),
                        cni: default_cni_settings(),
                        registry: default_registry_settings(),
                    },
                },
                proxy_plugins: BTreeMap::new(),
            }),
            ContainerdSchema::V3 => ContainerdConfig::V3(ContainerdConfigV3 {
                version: 3,
                oom_score: 0,
                root: None,
                plugins: PluginsV3 {
                    images: CriImagesPlugin {
                        snapshotter: None,
                        disable_snapshot_annotations: None,
                        pinned_images: PinnedImages {
                            sandbox: DEFAULT_SANDBOX_IMAGE.to_string(),
                        },
                        registry: default_registry_settings(),
                    },
                    runtime: CriRuntimePlugin {
                        containerd: default_runtime_settings(),
                        cni: default_cni_settings(),
                    },
                },
                proxy_plugins: BTreeMap::new(),
            }),
        }
    }

    pub fn schema(&self) -> ContainerdSchema {
        match self {
            ContainerdConfig::V2(_) => ContainerdSchema::V2,
            ContainerdConfig::V3(_) => ContainerdSchema::V3,
        }
    }

    pub fn set_root(&mut self, root: &str) {
        let slot = match self {
            ContainerdConfig::V2(config) => &mut config.root,
            ContainerdConfig::V3(config) => &mut config.root,
        };
        *slot = Some(root.to_string());
    }

    pub fn set_sandbox_image(&mut self, image: &str) {
        match self {
            ContainerdConfig::V2(config) => config.plugins.cri.sandbox_image = image.to_string(),
            ContainerdConfig::V3(config) => {
                config.plugins.images.pinned_images.sandbox = image.to_string()
            }
        }
    }

    pub fn sandbox_image(&self) -> &str {
        match self {
            ContainerdConfig::V2(config) => &config.plugins.cri.sandbox_image,
            ContainerdConfig::V3(config) => &config.plugins.images.pinned_images.sandbox,
        }
    }

    pub fn runtime_settings_mut(&mut self) -> &mut RuntimeSettings {
        match self {
            ContainerdConfig::V2(config) => &mut config.plugins.cri.containerd,
            ContainerdConfig::V3(config) => &mut config.plugins.runtime.containerd,
        }
    }

    pub fn runtime_settings(&self) -> &RuntimeSettings {
        match self {
            ContainerdConfig::V2(config) => &config.plugins.cri.containerd,
            ContainerdConfig::V3(config) => &config.plugins.runtime.containerd,
        }
    }

    pub fn cni_mut(&mut self) -> &mut CniSettings {
        match self {
            ContainerdConfig::V2(config) => &mut config.plugins.cri.cni,
            ContainerdConfig::V3(config) => &mut config.plugins.runtime.cni,
        }
    }

    /// Sets the snapshotter. Remote snapshotters need the snapshot annotations.
    pub fn set_snapshotter(&mut self, snapshotter: &str) {
        let (slot, annotations) = match self {
            ContainerdConfig::V2(config) => {
                let settings = &mut config.plugins.cri.containerd;
                (
                    &mut settings.snapshotter,
                    &mut settings.disable_snapshot_annotations,
                )
            }
            ContainerdConfig::V3(config) => {
                let images = &mut config.plugins.images;
                (&mut images.snapshotter, &mut images.disable_snapshot_annotations)
            }
        };
        *slot = Some(snapshotter.to_string());
        *annotations = Some(false);
    }

    pub fn snapshotter(&self) -> Option<&str> {
        match self {
            ContainerdConfig::V2(config) => config.plugins.cri.containerd.snapshotter.as_deref(),
            ContainerdConfig::V3(config) => config.plugins.images.snapshotter.as_deref(),
        }
    }

    pub fn proxy_plugins_mut(&mut self) -> &mut BTreeMap<String, ProxyPlugin> {
        match self {
            ContainerdConfig::V2(config) => &mut config.proxy_plugins,
            ContainerdConfig::V3(config) => &mut config.proxy_plugins,
        }
    }

    /// Encodes the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml_edit::ser::to_string_pretty(self).context(error::TomlSerializeSnafu)
    }
}

/// Builds a containerd configuration from the schema default. Overrides run in order and the first
/// failure aborts; `opts["dataDir"]` then relocates the containerd root.
pub fn get_containerd_config(
    schema: ContainerdSchema,
    opts: &BTreeMap<String, String>,
    overrides: &[Override<ContainerdConfig>],
) -> Result<String> {
    let mut config = ContainerdConfig::new(schema);
    for apply in overrides {
        apply(&mut config)?;
    }
    if let Some(data_dir) = opts
        .get(constants::CONTAINER_DATA_DIR_KEY)
        .filter(|dir| !dir.is_empty())
    {
        config.set_root(data_dir);
    }
    config.to_toml()
}

/// Points CNI at the kubenet bridge template.
pub fn kubenet_template_override() -> Override<ContainerdConfig> {
    Box::new(|config| {
        config.cni_mut().conf_template =
            Some(constants::CONTAINERD_KUBENET_TEMPLATE_FILEPATH.to_string());
        Ok(())
    })
}

pub fn sandbox_image_override(image: String) -> Override<ContainerdConfig> {
    Box::new(move |config| {
        ensure!(
            !image.is_empty(),
            error::InvalidOverrideSnafu {
                name: "sandbox image",
                reason: "the image is empty",
            }
        );
        config.set_sandbox_image(&image);
        Ok(())
    })
}

/// Makes the NVIDIA container runtime the default.
pub fn nvidia_runtime_override() -> Override<ContainerdConfig> {
    Box::new(|config| {
        let settings = config.runtime_settings_mut();
        settings.default_runtime_name = NVIDIA_RUNTIME.to_string();
        settings.runtimes.insert(
            NVIDIA_RUNTIME.to_string(),
            Runtime {
                runtime_type: RUNC_SHIM.to_string(),
                options: Some(RuntimeOptions {
                    binary_name: NVIDIA_BINARY.to_string(),
                    systemd_cgroup: Some(true),
                }),
            },
        );
        Ok(())
    })
}

pub fn kata_runtime_override() -> Override<ContainerdConfig> {
    Box::new(|config| {
        config.runtime_settings_mut().runtimes.insert(
            KATA_RUNTIME.to_string(),
            Runtime {
                runtime_type: KATA_SHIM.to_string(),
                options: None,
            },
        );
        Ok(())
    })
}

pub fn snapshotter_override(snapshotter: String) -> Override<ContainerdConfig> {
    Box::new(move |config| {
        ensure!(
            !snapshotter.is_empty(),
            error::InvalidOverrideSnafu {
                name: "snapshotter",
                reason: "the snapshotter name is empty",
            }
        );
        config.set_snapshotter(&snapshotter);
        Ok(())
    })
}

/// Registers the overlaybd proxy snapshotter and makes it the default.
pub fn overlaybd_snapshotter_override() -> Override<ContainerdConfig> {
    Box::new(|config| {
        config.proxy_plugins_mut().insert(
            OVERLAYBD_SNAPSHOTTER.to_string(),
            ProxyPlugin {
                plugin_type: "snapshot".to_string(),
                address: OVERLAYBD_SOCKET.to_string(),
            },
        );
        config.set_snapshotter(OVERLAYBD_SNAPSHOTTER);
        Ok(())
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use toml_edit::Document;

    fn render(schema: ContainerdSchema, overrides: &[Override<ContainerdConfig>]) -> Document {
        get_containerd_config(schema, &BTreeMap::new(), overrides)
            .unwrap()
            .parse::<Document>()
            .unwrap()
    }

    #[test]
    fn test_schema_selection() {
        let test_cases = vec![
            ("1.31.9", ContainerdSchema::V2),
            ("1.32.0", ContainerdSchema::V3),
            ("1.33", ContainerdSchema::V3),
            ("", ContainerdSchema::V2),
        ];
        for (version, expected) in test_cases {
            assert_eq!(
                ContainerdSchema::for_kubernetes_version(version),
                expected,
                "{}",
                version
            );
        }
    }

    #[test]
    fn test_v2_default() {
        let doc = render(ContainerdSchema::V2, &[]);
        let cri = &doc["plugins"]["io.containerd.grpc.v1.cri"];
        assert_eq!(doc["version"].as_integer(), Some(2));
        assert_eq!(cri["sandbox_image"].as_str(), Some(DEFAULT_SANDBOX_IMAGE));
        assert_eq!(
            cri["containerd"]["default_runtime_name"].as_str(),
            Some(RUNC_RUNTIME)
        );
        assert_eq!(
            cri["containerd"]["runtimes"]["runc"]["options"]["SystemdCgroup"].as_bool(),
            Some(true)
        );
        assert!(doc.get("proxy_plugins").is_none());
        assert!(doc["plugins"].get("io.containerd.cri.v1.runtime").is_none());
    }

    #[test]
    fn test_v3_never_contains_v2_cri_plugin() {
        let overrides = vec![
            sandbox_image_override("mcr.microsoft.com/oss/kubernetes/pause:3.9".to_string()),
            kubenet_template_override(),
            snapshotter_override(TELEPORTD_SNAPSHOTTER.to_string()),
        ];
        let content =
            get_containerd_config(ContainerdSchema::V3, &BTreeMap::new(), &overrides).unwrap();
        assert!(content.contains("version = 3"));
        assert!(content.contains("io.containerd.cri.v1.runtime"));
        assert!(!content.contains("io.containerd.grpc.v1.cri"));

        let doc = content.parse::<Document>().unwrap();
        let images = &doc["plugins"]["io.containerd.cri.v1.images"];
        assert_eq!(
            images["pinned_images"]["sandbox"].as_str(),
            Some("mcr.microsoft.com/oss/kubernetes/pause:3.9")
        );
        assert_eq!(images["snapshotter"].as_str(), Some(TELEPORTD_SNAPSHOTTER));
        assert_eq!(images["disable_snapshot_annotations"].as_bool(), Some(false));
        assert_eq!(
            doc["plugins"]["io.containerd.cri.v1.runtime"]["cni"]["conf_template"].as_str(),
            Some(constants::CONTAINERD_KUBENET_TEMPLATE_FILEPATH)
        );
    }

    #[test]
    fn test_overlaybd_snapshotter() {
        let content = get_containerd_config(
            ContainerdSchema::V2,
            &BTreeMap::new(),
            &[overlaybd_snapshotter_override()],
        )
        .unwrap();
        assert!(content.contains("[proxy_plugins.overlaybd]"));

        let doc = content.parse::<Document>().unwrap();
        assert_eq!(doc["proxy_plugins"]["overlaybd"]["type"].as_str(), Some("snapshot"));
        assert_eq!(
            doc["proxy_plugins"]["overlaybd"]["address"].as_str(),
            Some(OVERLAYBD_SOCKET)
        );
        let containerd = &doc["plugins"]["io.containerd.grpc.v1.cri"]["containerd"];
        assert_eq!(containerd["snapshotter"].as_str(), Some(OVERLAYBD_SNAPSHOTTER));
        assert_eq!(containerd["disable_snapshot_annotations"].as_bool(), Some(false));
    }

    #[test]
    fn test_nvidia_and_kata_runtimes() {
        let doc = render(
            ContainerdSchema::V2,
            &[nvidia_runtime_override(), kata_runtime_override()],
        );
        let containerd = &doc["plugins"]["io.containerd.grpc.v1.cri"]["containerd"];
        assert_eq!(containerd["default_runtime_name"].as_str(), Some(NVIDIA_RUNTIME));
        assert_eq!(
            containerd["runtimes"]["nvidia"]["options"]["BinaryName"].as_str(),
            Some(NVIDIA_BINARY)
        );
        assert_eq!(
            containerd["runtimes"]["kata"]["runtime_type"].as_str(),
            Some(KATA_SHIM)
        );
    }

    #[test]
    fn test_data_dir_and_failing_override() {
        let opts = maplit::btreemap! {
            constants::CONTAINER_DATA_DIR_KEY.to_string() => "/mnt/containerd".to_string(),
        };
        let doc = get_containerd_config(ContainerdSchema::V3, &opts, &[])
            .unwrap()
            .parse::<Document>()
            .unwrap();
        assert_eq!(doc["root"].as_str(), Some("/mnt/containerd"));

        let result = get_containerd_config(
            ContainerdSchema::V2,
            &opts,
            &[snapshotter_override(String::new())],
        );
        assert!(matches!(
            result,
            Err(super::super::CriError::InvalidOverride { .. })
        ));
    }
}

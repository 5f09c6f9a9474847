//! Functions about the node itself: its pool, image, container runtime, kubelet and OS tuning.
use super::{string_arg, Registry};
use crate::cri;
use crate::encoding::base64_encode;
use crate::kubelet;
use crate::linux_os;
use crate::sku;
use crate::snapshot::Snapshot;
use datamodel::constants;
use datamodel::nbc::{AgentPoolProfile, OsType, SshStatus};
use datamodel::{AzureOsImageConfig, Distro, NodeBootstrappingConfiguration};
use serde_json::Value;

/// Where container data lives when the kubelet runs from the temporary disk.
const TEMP_DISK_CONTAINER_DATA_DIR: &str = "/mnt/aks/containers";

/// `agentpool=<name>,kubernetes.azure.com/agentpool=<name>` followed by the pool's own labels in
/// key order.
pub fn agent_kubernetes_labels(pool: &AgentPoolProfile) -> String {
    let mut labels = format!(
        "agentpool={},kubernetes.azure.com/agentpool={}",
        pool.name, pool.name
    );
    for (key, value) in &pool.custom_node_labels {
        labels.push_str(&format!(",{}={}", key, value));
    }
    labels
}

/// The container data directory: the pool's runtime option, then the temporary disk, then the
/// cluster's runtime option.
pub fn data_dir(nbc: &NodeBootstrappingConfiguration) -> String {
    let pool_dir = nbc
        .agent_pool_profile
        .kubernetes_config
        .as_ref()
        .and_then(|k| k.container_runtime_config.get(constants::CONTAINER_DATA_DIR_KEY))
        .filter(|dir| !dir.is_empty());
    if let Some(dir) = pool_dir {
        return dir.clone();
    }
    if nbc.agent_pool_profile.kubelet_disk_type == constants::KUBELET_DISK_TYPE_TEMPORARY {
        return TEMP_DISK_CONTAINER_DATA_DIR.to_string();
    }
    nbc.kubernetes_config()
        .and_then(|k| k.container_runtime_config.get(constants::CONTAINER_DATA_DIR_KEY))
        .cloned()
        .unwrap_or_default()
}

fn all_pools(nbc: &NodeBootstrappingConfiguration) -> impl Iterator<Item = &AgentPoolProfile> {
    std::iter::once(&nbc.agent_pool_profile).chain(
        nbc.container_service
            .properties
            .agent_pool_profiles
            .iter(),
    )
}

fn os_image(nbc: &NodeBootstrappingConfiguration, distro: Distro) -> AzureOsImageConfig {
    nbc.cloud_spec_config
        .os_image_config
        .get(&distro)
        .cloned()
        .unwrap_or_default()
}

fn master_distro(nbc: &NodeBootstrappingConfiguration) -> Distro {
    nbc.container_service
        .properties
        .linux_profile
        .as_ref()
        .map(|linux| linux.distro)
        .unwrap_or_default()
}

/// Registers the four PIR coordinate getters for the distro `distro_of` picks.
macro_rules! os_image_getters {
    ($registry:expr, $distro_of:expr, $offer:literal, $publisher:literal, $sku:literal, $version:literal) => {
        $registry.add($offer, |s| os_image(&s.nbc, $distro_of(&s.nbc)).image_offer);
        $registry.add($publisher, |s| os_image(&s.nbc, $distro_of(&s.nbc)).image_publisher);
        $registry.add($sku, |s| os_image(&s.nbc, $distro_of(&s.nbc)).image_sku);
        $registry.add($version, |s| os_image(&s.nbc, $distro_of(&s.nbc)).image_version);
    };
}

fn linux_os_config(s: &Snapshot) -> Option<&datamodel::kubelet::CustomLinuxOsConfig> {
    s.nbc.agent_pool_profile.custom_linux_os_config.as_ref()
}

pub(super) fn register(registry: &mut Registry) {
    registry.add_with_args("IsNSeriesSKU", |s, args| {
        let vm_size = match args.first() {
            Some(Value::String(size)) => size.as_str(),
            _ => s.nbc.agent_pool_profile.vm_size.as_str(),
        };
        Ok(sku::is_nvidia_enabled_sku(vm_size).into())
    });
    registry.add("HasNSeriesSKU", |s| {
        all_pools(&s.nbc).any(|pool| sku::is_nvidia_enabled_sku(&pool.vm_size))
    });
    registry.add("HasDCSeriesSKU", |s| {
        all_pools(&s.nbc).any(|pool| sku::is_sgx_enabled_sku(&pool.vm_size))
    });
    registry.add("IsMIGEnabledNode", |s| {
        sku::is_mig_enabled_node(&s.nbc.agent_pool_profile.vm_size, &s.nbc.gpu_instance_profile)
    });
    registry.add("GetGPUInstanceProfile", |s| s.nbc.gpu_instance_profile.clone());
    registry.add("AnyAgentIsLinux", |s| {
        all_pools(&s.nbc).any(|pool| pool.os_type == OsType::Linux)
    });
    registry.add("HasAvailabilityZones", |s| {
        s.nbc.agent_pool_profile.has_availability_zones()
    });
    registry.add_with_args("GetAgentKubernetesLabels", |s, _| {
        Ok(agent_kubernetes_labels(&s.nbc.agent_pool_profile).into())
    });
    registry.add_with_args("GetAgentKubernetesLabelsDeprecated", |s, args| {
        let mut labels = format!(
            "kubernetes.azure.com/role=agent,{}",
            agent_kubernetes_labels(&s.nbc.agent_pool_profile)
        );
        if let Ok(resource_group) = string_arg("GetAgentKubernetesLabelsDeprecated", args, 1) {
            labels.push_str(&format!(",kubernetes.azure.com/cluster={}", resource_group));
        }
        Ok(labels.into())
    });

    registry.add("IsVHDDistro", |s| s.nbc.agent_pool_profile.distro.is_vhd());
    registry.add("IsCgroupV2", |s| s.nbc.agent_pool_profile.distro.is_cgroup_v2());
    registry.add("IsFlatcar", |s| s.nbc.agent_pool_profile.distro.is_flatcar());
    registry.add("HasCoreOS", |s| s.nbc.agent_pool_profile.distro.is_flatcar());
    registry.add("IsMariner", |s| s.nbc.agent_pool_profile.distro.is_mariner_based());
    registry.add("IsKata", |s| s.nbc.agent_pool_profile.distro.is_kata());
    registry.add("IsCustomImage", |s| s.nbc.agent_pool_profile.distro.is_customized());
    os_image_getters!(
        registry,
        |nbc: &NodeBootstrappingConfiguration| nbc.agent_pool_profile.distro,
        "GetAgentOSImageOffer",
        "GetAgentOSImagePublisher",
        "GetAgentOSImageSKU",
        "GetAgentOSImageVersion"
    );
    os_image_getters!(
        registry,
        master_distro,
        "GetMasterOSImageOffer",
        "GetMasterOSImagePublisher",
        "GetMasterOSImageSKU",
        "GetMasterOSImageVersion"
    );

    registry.add("IsKataContainerRuntime", |s| {
        s.nbc.container_runtime() == constants::KATA_CONTAINERS
    });
    registry.add("IsDockerContainerRuntime", |s| {
        s.nbc.container_runtime() == constants::DOCKER
    });
    registry.add("RequiresDocker", |s| {
        s.nbc.container_runtime() == constants::DOCKER
    });
    registry.add("NeedsContainerd", |s| {
        let runtime = s.nbc.container_runtime();
        runtime == constants::CONTAINERD || runtime == constants::KATA_CONTAINERS
    });
    registry.add("GetContainerdConfigContent", |s| {
        base64_encode(&s.containerd_config)
    });
    registry.add("GetContainerdConfigNoGPUContent", |s| {
        base64_encode(&s.containerd_config_no_gpu)
    });
    registry.add("GetDockerConfig", |s| s.docker_config.clone());
    registry.add("GetDockerConfigBase64", |s| base64_encode(&s.docker_config));
    registry.add("GetKubenetTemplate", |s| s.kubenet_template.clone());
    registry.add("TeleportEnabled", |s| s.nbc.enable_acr_teleport_plugin);
    registry.add("IsArtifactStreamingEnabled", |s| s.nbc.enable_artifact_streaming);
    registry.add("UseRuncShimV2", |s| s.nbc.enable_runc_shim_v2);
    registry.add("NeedsNvidiaRuntime", |s| cri::needs_nvidia_runtime(&s.nbc));
    registry.add("HasDataDir", |s| !data_dir(&s.nbc).is_empty());
    registry.add("GetDataDir", |s| data_dir(&s.nbc));
    registry.add("HasKubeletDiskType", |s| {
        !s.nbc.agent_pool_profile.kubelet_disk_type.is_empty()
    });
    registry.add("GetKubeletDiskType", |s| {
        s.nbc.agent_pool_profile.kubelet_disk_type.clone()
    });

    registry.add_with_args("GetKubeletConfigKeyVals", |s, _| {
        Ok(s.kubelet_flags.clone().into())
    });
    registry.add("GetKubeletConfigFileContent", |s| s.kubelet_config_file.clone());
    registry.add("GetKubeletConfigFileContentBase64", |s| {
        base64_encode(&s.kubelet_config_file)
    });
    registry.add("IsKubeletConfigFileEnabled", |s| {
        kubelet::is_kubelet_config_file_enabled(&s.nbc)
    });
    registry.add("EnableKubeletServingCertificateRotation", |s| {
        kubelet::is_serving_certificate_rotation_enabled(&s.nbc)
    });

    registry.add("ShouldConfigCustomSysctl", |s| {
        linux_os::should_config_custom_sysctl(linux_os_config(s))
    });
    registry.add_with_args("GetCustomSysctlConfigByName", |s, args| {
        let name = string_arg("GetCustomSysctlConfigByName", args, 0)?;
        Ok(linux_os::custom_sysctl(linux_os_config(s), name)
            .map(Value::String)
            .unwrap_or(Value::Null))
    });
    registry.add("GetSysctlContent", |s| base64_encode(&s.sysctl_content));
    registry.add("ShouldConfigTransparentHugePage", |s| {
        linux_os::should_config_transparent_huge_page(linux_os_config(s))
    });
    registry.add("GetTransparentHugePageEnabled", |s| {
        linux_os::transparent_huge_page_enabled(linux_os_config(s))
    });
    registry.add("GetTransparentHugePageDefrag", |s| {
        linux_os::transparent_huge_page_defrag(linux_os_config(s))
    });
    registry.add("ShouldConfigSwapFile", |s| {
        linux_os::should_config_swap_file(linux_os_config(s))
    });
    registry.add("GetSwapFileSizeMB", |s| {
        linux_os::swap_file_size_mb(linux_os_config(s))
    });
    registry.add("ShouldConfigContainerdUlimits", |s| {
        linux_os::should_config_containerd_ulimits(linux_os_config(s))
    });
    registry.add("GetContainerdUlimitString", |s| {
        linux_os::containerd_ulimit_string(linux_os_config(s))
    });

    registry.add("GetMessageOfTheDay", |s| {
        s.nbc.agent_pool_profile.message_of_the_day.clone()
    });
    registry.add("ShouldDisableSSH", |s| s.nbc.ssh_status == SshStatus::Off);
    registry.add("ShouldEnableCustomData", |s| !s.nbc.disable_custom_data);
    registry.add("GetKubernetesAgentPreprovisionYaml", |s| {
        if s.preprovision_command.is_empty() {
            String::new()
        } else {
            format!("\n{}", s.preprovision_command)
        }
    });
    registry.add_with_args("BoolPtrToInt", |_, args| {
        Ok(match args.first() {
            Some(Value::Bool(true)) => 1,
            _ => 0,
        }
        .into())
    });

    registry.add("GetCSEHelpersScriptFilepath", |_| {
        constants::CSE_HELPERS_SCRIPT_FILEPATH
    });
    registry.add("GetCSEHelpersScriptDistroFilepath", |_| {
        constants::CSE_HELPERS_SCRIPT_DISTRO_FILEPATH
    });
    registry.add("GetCSEInstallScriptFilepath", |_| {
        constants::CSE_INSTALL_SCRIPT_FILEPATH
    });
    registry.add("GetCSEInstallScriptDistroFilepath", |_| {
        constants::CSE_INSTALL_SCRIPT_DISTRO_FILEPATH
    });
    registry.add("GetCSEConfigScriptFilepath", |_| {
        constants::CSE_CONFIG_SCRIPT_FILEPATH
    });
    registry.add("GetContainerdKubenetTemplateFilepath", |_| {
        constants::CONTAINERD_KUBENET_TEMPLATE_FILEPATH
    });
}

//! Target-cloud constants supplied by the caller alongside the NBC.
use crate::constants;
use crate::distro::Distro;
use crate::image::AzureOsImageConfig;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-cloud URL bases, telemetry ids and marketplace image tables.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AzureEnvironmentSpecConfig {
    pub cloud_name: String,
    pub docker_spec_config: DockerSpecConfig,
    pub kubernetes_spec_config: KubernetesSpecConfig,
    pub endpoint_config: AzureEndpointConfig,
    #[serde(rename = "osImageConfig")]
    pub os_image_config: BTreeMap<Distro, AzureOsImageConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DockerSpecConfig {
    pub docker_engine_repo: String,
    #[serde(rename = "dockerComposeDownloadURL")]
    pub docker_compose_download_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesSpecConfig {
    #[serde(rename = "azureTelemetryPID")]
    pub azure_telemetry_pid: String,
    pub kubernetes_image_base: String,
    pub mcr_kubernetes_image_base: String,
    #[serde(rename = "kubeBinariesSASURLBase")]
    pub kube_binaries_sas_url_base: String,
    #[serde(rename = "windowsTelemetryGUID")]
    pub windows_telemetry_guid: String,
    #[serde(rename = "cniPluginsDownloadURL")]
    pub cni_plugins_download_url: String,
    #[serde(rename = "vnetCNILinuxPluginsDownloadURL")]
    pub vnet_cni_linux_plugins_download_url: String,
    #[serde(rename = "vnetCNIWindowsPluginsDownloadURL")]
    pub vnet_cni_windows_plugins_download_url: String,
    #[serde(rename = "vnetCNIARM64PluginsDownloadURL")]
    pub vnet_cni_arm64_plugins_download_url: String,
    #[serde(rename = "containerdDownloadURLBase")]
    pub containerd_download_url_base: String,
    #[serde(rename = "cseScriptsPackageURL")]
    pub cse_scripts_package_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AzureEndpointConfig {
    #[serde(rename = "resourceManagerVMDNSSuffix")]
    pub resource_manager_vm_dns_suffix: String,
}

/// Determines whether a region belongs to a sovereign cloud (China, Germany, US Gov and the
/// air-gapped US clouds) or to the public cloud.
pub fn get_cloud_target_env(location: &str) -> &'static str {
    let loc: String = location
        .split_whitespace()
        .collect::<String>()
        .to_lowercase();
    match loc.as_str() {
        "chinaeast" | "chinanorth" | "chinaeast2" | "chinanorth2" | "chinaeast3"
        | "chinanorth3" => constants::AZURE_CHINA_CLOUD,
        "germanynortheast" | "germanycentral" => constants::AZURE_GERMAN_CLOUD,
        l if l.starts_with("usgov") || l.starts_with("usdod") => {
            constants::AZURE_US_GOVERNMENT_CLOUD
        }
        l if l.starts_with("usnat") => constants::USNAT_CLOUD,
        l if l.starts_with("ussec") => constants::USSEC_CLOUD,
        _ => constants::AZURE_PUBLIC_CLOUD,
    }
}

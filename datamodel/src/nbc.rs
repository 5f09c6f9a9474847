//! The `NodeBootstrappingConfiguration` record and everything it is composed of.
//!
//! All records mirror the JSON contract callers send: camelCase keys, absent optional fields
//! omitted. Nothing in this module derives values; derivation lives in the builder crate.
use crate::cloud::AzureEnvironmentSpecConfig;
use crate::constants;
use crate::distro::Distro;
use crate::image::SigConfig;
use crate::kubelet::{CustomKubeletConfig, CustomLinuxOsConfig};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The single input record of the builder.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeBootstrappingConfiguration {
    pub container_service: ContainerService,
    pub cloud_spec_config: AzureEnvironmentSpecConfig,
    pub k8s_components: K8sComponents,
    pub agent_pool_profile: AgentPoolProfile,
    #[serde(rename = "tenantID")]
    pub tenant_id: String,
    #[serde(rename = "subscriptionID")]
    pub subscription_id: String,
    pub resource_group_name: String,
    #[serde(rename = "userAssignedIdentityClientID")]
    pub user_assigned_identity_client_id: String,
    #[serde(rename = "osSKU")]
    pub os_sku: String,
    #[serde(rename = "configGPUDriverIfNeeded")]
    pub config_gpu_driver_if_needed: bool,
    #[serde(rename = "enableGPUDevicePluginIfNeeded")]
    pub enable_gpu_device_plugin_if_needed: bool,
    pub enable_kubelet_config_file: bool,
    pub enable_dynamic_kubelet: bool,
    pub enable_nvidia: bool,
    #[serde(rename = "enableACRTeleportPlugin")]
    pub enable_acr_teleport_plugin: bool,
    #[serde(rename = "teleportdPluginURL")]
    pub teleportd_plugin_url: String,
    pub enable_artifact_streaming: bool,
    pub containerd_version: String,
    pub runc_version: String,
    #[serde(rename = "containerdPackageURL")]
    pub containerd_package_url: String,
    #[serde(rename = "runcPackageURL")]
    pub runc_package_url: String,
    #[serde(
        rename = "kubeletClientTLSBootstrapToken",
        skip_serializing_if = "Option::is_none"
    )]
    pub kubelet_client_tls_bootstrap_token: Option<String>,
    #[serde(rename = "enableSecureTLSBootstrapping")]
    pub enable_secure_tls_bootstrapping: bool,
    #[serde(rename = "fipsEnabled")]
    pub fips_enabled: bool,
    #[serde(rename = "httpProxyConfig", skip_serializing_if = "Option::is_none")]
    pub http_proxy_config: Option<HttpProxyConfig>,
    pub kubelet_config: BTreeMap<String, String>,
    pub kubeproxy_config: BTreeMap<String, String>,
    pub enable_runc_shim_v2: bool,
    #[serde(rename = "gpuInstanceProfile")]
    pub gpu_instance_profile: String,
    pub primary_scale_set_name: String,
    #[serde(rename = "sigConfig")]
    pub sig_config: SigConfig,
    #[serde(rename = "isARM64")]
    pub is_arm64: bool,
    #[serde(rename = "customCATrustConfig", skip_serializing_if = "Option::is_none")]
    pub custom_ca_trust_config: Option<CustomCaTrustConfig>,
    pub disable_unattended_upgrades: bool,
    #[serde(rename = "sshStatus")]
    pub ssh_status: SshStatus,
    pub disable_custom_data: bool,
    pub outbound_type: String,
    #[serde(rename = "enableIMDSRestriction")]
    pub enable_imds_restriction: bool,
    #[serde(rename = "insertIMDSRestrictionRuleToMangleTable")]
    pub insert_imds_restriction_rule_to_mangle_table: bool,
    pub enable_kubelet_serving_certificate_rotation: bool,
}

/// Whether SSH is reachable on the node.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum SshStatus {
    #[default]
    #[serde(rename = "")]
    Unspecified,
    Off,
    On,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerService {
    pub id: String,
    pub location: String,
    pub name: String,
    pub properties: Properties,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Properties {
    pub provisioning_state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orchestrator_profile: Option<OrchestratorProfile>,
    pub agent_pool_profiles: Vec<AgentPoolProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linux_profile: Option<LinuxProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub windows_profile: Option<WindowsProfile>,
    pub extension_profiles: Vec<ExtensionProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_principal_profile: Option<ServicePrincipalProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_profile: Option<CertificateProfile>,
    #[serde(rename = "aadProfile", skip_serializing_if = "Option::is_none")]
    pub aad_profile: Option<AadProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosted_master_profile: Option<HostedMasterProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_flags: Option<FeatureFlags>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_cloud_env: Option<CustomCloudEnv>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_configuration: Option<CustomConfiguration>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorProfile {
    pub orchestrator_type: String,
    pub orchestrator_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_config: Option<KubernetesConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesConfig {
    pub kubernetes_image_base: String,
    pub mcr_kubernetes_image_base: String,
    pub cluster_subnet: String,
    pub network_policy: String,
    pub network_plugin: String,
    pub network_plugin_mode: String,
    pub network_mode: String,
    pub ebpf_dataplane: String,
    pub container_runtime: String,
    pub max_pods: i32,
    pub docker_bridge_subnet: String,
    #[serde(rename = "dnsServiceIP")]
    pub dns_service_ip: String,
    pub service_cidr: String,
    pub use_managed_identity: bool,
    #[serde(rename = "userAssignedID")]
    pub user_assigned_id: String,
    #[serde(rename = "userAssignedClientID")]
    pub user_assigned_client_id: String,
    pub custom_hyperkube_image: String,
    pub custom_kube_proxy_image: String,
    #[serde(rename = "customKubeBinaryURL")]
    pub custom_kube_binary_url: String,
    pub moby_version: String,
    pub containerd_version: String,
    #[serde(rename = "windowsContainerdURL")]
    pub windows_containerd_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_instance_metadata: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_rbac: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_secure_kubelet: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_aggregated_apis: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_data_encryption_at_rest: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_encryption_with_external_kms: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_pod_security_policy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_cloud_controller_manager: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_cluster: Option<PrivateCluster>,
    pub addons: Vec<KubernetesAddon>,
    pub container_runtime_config: BTreeMap<String, String>,
    pub load_balancer_sku: String,
    #[serde(rename = "excludeMasterFromStandardLB", skip_serializing_if = "Option::is_none")]
    pub exclude_master_from_standard_lb: Option<bool>,
    pub maximum_load_balancer_rule_count: i32,
    pub private_azure_registry_server: String,
    #[serde(rename = "azureCNIURLLinux")]
    pub azure_cni_url_linux: String,
    #[serde(rename = "azureCNIURLARM64Linux")]
    pub azure_cni_url_arm64_linux: String,
    #[serde(rename = "azureCNIURLWindows")]
    pub azure_cni_url_windows: String,
    pub etcd_storage_limit_gb: i32,
    pub kubelet_config: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivateCluster {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_hosts_config_agent: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesAddon {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    pub config: BTreeMap<String, String>,
}

/// The OS a pool runs.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum OsType {
    #[default]
    Linux,
    Windows,
}

/// Per-pool facts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentPoolProfile {
    pub name: String,
    pub vm_size: String,
    pub kubelet_disk_type: String,
    pub os_type: OsType,
    pub distro: Distro,
    pub availability_profile: String,
    pub availability_zones: Vec<String>,
    pub storage_profile: String,
    pub mode: String,
    #[serde(rename = "vnetSubnetID")]
    pub vnet_subnet_id: String,
    pub vnet_cidrs: Vec<String>,
    pub windows_name_version: String,
    pub custom_node_labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprovision_extension: Option<Extension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_config: Option<KubernetesConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_kubelet_config: Option<CustomKubeletConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_linux_os_config: Option<CustomLinuxOsConfig>,
    /// Base64 encoded text written to `/etc/motd`.
    pub message_of_the_day: String,
    #[serde(rename = "auditDEnabled", skip_serializing_if = "Option::is_none")]
    pub auditd_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Extension {
    pub name: String,
    pub single_or_all: String,
    pub template: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtensionProfile {
    pub name: String,
    pub version: String,
    pub extension_parameters: String,
    #[serde(rename = "rootURL")]
    pub root_url: String,
    pub script: String,
    #[serde(rename = "urlQuery")]
    pub url_query: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinuxProfile {
    pub admin_username: String,
    pub ssh: SshConfig,
    pub secrets: Vec<KeyVaultSecrets>,
    pub distro: Distro,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_search_domain: Option<CustomSearchDomain>,
    #[serde(rename = "customNodesDNS", skip_serializing_if = "Option::is_none")]
    pub custom_nodes_dns: Option<CustomNodesDns>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomNodesDns {
    #[serde(rename = "dnsServer")]
    pub dns_server: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SshConfig {
    pub public_keys: Vec<PublicKey>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublicKey {
    pub key_data: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomSearchDomain {
    pub name: String,
    pub realm_user: String,
    pub realm_password: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyVaultSecrets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_vault: Option<KeyVaultId>,
    pub vault_certificates: Vec<KeyVaultCertificate>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyVaultId {
    pub id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyVaultCertificate {
    #[serde(rename = "certificateUrl")]
    pub certificate_url: String,
    pub certificate_store: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WindowsProfile {
    pub admin_username: String,
    pub admin_password: String,
    pub image_version: String,
    #[serde(rename = "windowsImageSourceURL")]
    pub windows_image_source_url: String,
    pub windows_publisher: String,
    pub windows_offer: String,
    pub windows_sku: String,
    pub windows_docker_version: String,
    #[serde(rename = "windowsPauseImageURL")]
    pub windows_pause_image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub always_pull_windows_pause_image: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_enabled: Option<bool>,
    #[serde(rename = "csiProxyURL")]
    pub csi_proxy_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_csi_proxy: Option<bool>,
    pub secrets: Vec<KeyVaultSecrets>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hns_remediator_interval_in_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_generator_interval_in_minutes: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServicePrincipalProfile {
    pub client_id: String,
    pub secret: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CertificateProfile {
    pub ca_certificate: String,
    pub api_server_certificate: String,
    pub client_certificate: String,
    pub client_private_key: String,
    pub kube_config_certificate: String,
    pub kube_config_private_key: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AadProfile {
    #[serde(rename = "adminGroupID")]
    pub admin_group_id: String,
    #[serde(rename = "clientAppID")]
    pub client_app_id: String,
    #[serde(rename = "serverAppID")]
    pub server_app_id: String,
    #[serde(rename = "tenantID")]
    pub tenant_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostedMasterProfile {
    #[serde(rename = "fqdn")]
    pub fqdn: String,
    #[serde(rename = "ipAddress")]
    pub ip_address: String,
    pub dns_prefix: String,
    pub fqdn_subdomain: String,
    pub subnet: String,
    pub ip_masq_agent: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureFlags {
    #[serde(rename = "enableCSERunInBackground")]
    pub enable_cse_run_in_background: bool,
    pub block_outbound_internet: bool,
    #[serde(rename = "enableIPv6DualStack")]
    pub enable_ipv6_dual_stack: bool,
    #[serde(rename = "enableIPv6Only")]
    pub enable_ipv6_only: bool,
    #[serde(rename = "enableWinDSR")]
    pub enable_win_dsr: bool,
    pub enable_telemetry: bool,
}

/// Endpoints of an air-gapped or otherwise custom Azure cloud.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomCloudEnv {
    pub name: String,
    #[serde(rename = "mcrURL")]
    pub mcr_url: String,
    pub repo_depot_endpoint: String,
    #[serde(rename = "managementPortalURL")]
    pub management_portal_url: String,
    #[serde(rename = "publishSettingsURL")]
    pub publish_settings_url: String,
    pub service_management_endpoint: String,
    pub resource_manager_endpoint: String,
    pub active_directory_endpoint: String,
    pub gallery_endpoint: String,
    pub key_vault_endpoint: String,
    pub graph_endpoint: String,
    pub service_bus_endpoint: String,
    pub batch_management_endpoint: String,
    pub storage_endpoint_suffix: String,
    #[serde(rename = "sqlDatabaseDNSSuffix")]
    pub sql_database_dns_suffix: String,
    #[serde(rename = "trafficManagerDNSSuffix")]
    pub traffic_manager_dns_suffix: String,
    #[serde(rename = "keyVaultDNSSuffix")]
    pub key_vault_dns_suffix: String,
    pub service_bus_endpoint_suffix: String,
    #[serde(rename = "serviceManagementVMDNSSuffix")]
    pub service_management_vm_dns_suffix: String,
    #[serde(rename = "resourceManagerVMDNSSuffix")]
    pub resource_manager_vm_dns_suffix: String,
    #[serde(rename = "containerRegistryDNSSuffix")]
    pub container_registry_dns_suffix: String,
    #[serde(rename = "cosmosDBDNSSuffix")]
    pub cosmos_db_dns_suffix: String,
    pub token_audience: String,
    pub resource_identifiers: ResourceIdentifiers,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceIdentifiers {
    pub graph: String,
    pub key_vault: String,
    pub datalake: String,
    pub batch: String,
    pub operational_insights: String,
    pub storage: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubelet: Option<ComponentConfiguration>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComponentConfiguration {
    pub config: BTreeMap<String, String>,
}

/// Per-kubernetes-version image and binary URLs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct K8sComponents {
    #[serde(rename = "podInfraContainerImageURL")]
    pub pod_infra_container_image_url: String,
    #[serde(rename = "hyperkubeImageURL")]
    pub hyperkube_image_url: String,
    #[serde(rename = "windowsPackageURL")]
    pub windows_package_url: String,
    #[serde(rename = "linuxPrivatePackageURL")]
    pub linux_private_package_url: String,
    #[serde(rename = "windowsCredentialProviderURL")]
    pub windows_credential_provider_url: String,
    #[serde(rename = "linuxCredentialProviderURL")]
    pub linux_credential_provider_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpProxyConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub https_proxy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_proxy: Option<Vec<String>>,
    #[serde(rename = "trustedCa", skip_serializing_if = "Option::is_none")]
    pub trusted_ca: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomCaTrustConfig {
    #[serde(rename = "customCATrustCerts")]
    pub custom_ca_trust_certs: Vec<String>,
}

impl NodeBootstrappingConfiguration {
    /// The orchestrator version, or an empty string when no orchestrator profile is present.
    pub fn orchestrator_version(&self) -> &str {
        self.container_service
            .properties
            .orchestrator_profile
            .as_ref()
            .map(|profile| profile.orchestrator_version.as_str())
            .unwrap_or_default()
    }

    /// The cluster-wide kubernetes config, if any.
    pub fn kubernetes_config(&self) -> Option<&KubernetesConfig> {
        self.container_service
            .properties
            .orchestrator_profile
            .as_ref()
            .and_then(|profile| profile.kubernetes_config.as_ref())
    }

    pub fn is_kubernetes(&self) -> bool {
        self.container_service
            .properties
            .orchestrator_profile
            .as_ref()
            .map(|profile| profile.orchestrator_type == constants::KUBERNETES)
            .unwrap_or(false)
    }

    pub fn feature_flags(&self) -> FeatureFlags {
        self.container_service
            .properties
            .feature_flags
            .clone()
            .unwrap_or_default()
    }

    /// The container runtime, with pool-level configuration taking precedence.
    pub fn container_runtime(&self) -> &str {
        let pool_runtime = self
            .agent_pool_profile
            .kubernetes_config
            .as_ref()
            .map(|k| k.container_runtime.as_str())
            .filter(|runtime| !runtime.is_empty());
        let cluster_runtime = self
            .kubernetes_config()
            .map(|k| k.container_runtime.as_str())
            .filter(|runtime| !runtime.is_empty());
        pool_runtime
            .or(cluster_runtime)
            .unwrap_or(constants::CONTAINERD)
    }

    /// Whether this node needs the custom-cloud bootstrap (air-gapped clouds).
    pub fn is_aks_custom_cloud(&self) -> bool {
        self.container_service
            .properties
            .custom_cloud_env
            .as_ref()
            .map(|env| env.name.eq_ignore_ascii_case(constants::AKS_CUSTOM_CLOUD_NAME))
            .unwrap_or(false)
    }
}

impl AgentPoolProfile {
    pub fn is_windows(&self) -> bool {
        self.os_type == OsType::Windows
    }

    pub fn is_virtual_machine_scale_sets(&self) -> bool {
        self.availability_profile == constants::VIRTUAL_MACHINE_SCALE_SETS
    }

    pub fn is_availability_sets(&self) -> bool {
        self.availability_profile == constants::AVAILABILITY_SET
    }

    pub fn has_availability_zones(&self) -> bool {
        !self.availability_zones.is_empty()
    }

    pub fn is_custom_vnet(&self) -> bool {
        !self.vnet_subnet_id.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_deserialize_minimal_nbc() {
        let json = r#"{
            "containerService": {
                "location": "southcentralus",
                "properties": {
                    "orchestratorProfile": {
                        "orchestratorType": "Kubernetes",
                        "orchestratorVersion": "1.31.0"
                    }
                }
            },
            "agentPoolProfile": {
                "name": "nodepool1",
                "vmSize": "Standard_DS1_v2",
                "distro": "aks-ubuntu-containerd-22.04-gen2"
            },
            "kubeletConfig": {"--max-pods": "110"},
            "outboundType": "block"
        }"#;

        let nbc: NodeBootstrappingConfiguration = serde_json::from_str(json).unwrap();
        assert_eq!(nbc.container_service.location, "southcentralus");
        assert_eq!(nbc.orchestrator_version(), "1.31.0");
        assert!(nbc.is_kubernetes());
        assert_eq!(
            nbc.agent_pool_profile.distro,
            Distro::AKSUbuntuContainerd2204Gen2
        );
        assert_eq!(nbc.kubelet_config["--max-pods"], "110");
        assert_eq!(nbc.outbound_type, "block");
        assert_eq!(nbc.container_runtime(), constants::CONTAINERD);
        assert!(nbc.http_proxy_config.is_none());
    }

    #[test]
    fn test_pool_runtime_overrides_cluster_runtime() {
        let mut nbc = NodeBootstrappingConfiguration::default();
        nbc.container_service.properties.orchestrator_profile = Some(OrchestratorProfile {
            kubernetes_config: Some(KubernetesConfig {
                container_runtime: constants::DOCKER.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert_eq!(nbc.container_runtime(), constants::DOCKER);

        nbc.agent_pool_profile.kubernetes_config = Some(KubernetesConfig {
            container_runtime: constants::KATA_CONTAINERS.to_string(),
            ..Default::default()
        });
        assert_eq!(nbc.container_runtime(), constants::KATA_CONTAINERS);
    }
}

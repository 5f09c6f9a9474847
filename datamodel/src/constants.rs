/// Helper macro to avoid retyping the directory that every provisioning script lands in. When given
/// no parameters, this returns the directory itself. When given a string literal parameter it adds
/// `/parameter` to the end.
#[macro_export]
macro_rules! containers_path {
    () => {
        "/opt/azure/containers"
    };
    ($s:literal) => {
        concat!(containers_path!(), "/", $s)
    };
}

/// Same as `containers_path!`, rooted at the systemd unit directory.
#[macro_export]
macro_rules! systemd_path {
    () => {
        "/etc/systemd/system"
    };
    ($s:literal) => {
        concat!(systemd_path!(), "/", $s)
    };
}

// Script destinations written by cloud-init and sourced by provision.sh
pub const CSE_HELPERS_SCRIPT_FILEPATH: &str = containers_path!("provision_source.sh");
pub const CSE_HELPERS_SCRIPT_DISTRO_FILEPATH: &str = containers_path!("provision_source_distro.sh");
pub const CSE_INSTALL_SCRIPT_FILEPATH: &str = containers_path!("provision_installs.sh");
pub const CSE_INSTALL_SCRIPT_DISTRO_FILEPATH: &str =
    containers_path!("provision_installs_distro.sh");
pub const CSE_CONFIG_SCRIPT_FILEPATH: &str = containers_path!("provision_configs.sh");
pub const CSE_MAIN_SCRIPT_FILEPATH: &str = containers_path!("provision.sh");
pub const CUSTOM_SEARCH_DOMAINS_CSE_SCRIPT_FILEPATH: &str =
    containers_path!("setup-custom-search-domains.sh");
pub const DHCPV6_SERVICE_CSE_SCRIPT_FILEPATH: &str = systemd_path!("dhcpv6.service");
pub const DHCPV6_CONFIG_CSE_SCRIPT_FILEPATH: &str = containers_path!("enable-dhcpv6.sh");
pub const INIT_AKS_CUSTOM_CLOUD_FILEPATH: &str = containers_path!("init-aks-custom-cloud.sh");
pub const CONTAINERD_KUBENET_TEMPLATE_FILEPATH: &str = "/etc/containerd/kubenet_template.conf";
pub const KUBELET_CONFIG_FILEPATH: &str = "/etc/default/kubeletconfig.json";
pub const AZURE_STACK_CA_CERT_LOCATION: &str = "/etc/ssl/certs/azurestackcerts.pem";
pub const CSE_PROVISION_LOG_FILEPATH: &str = "/var/log/azure/cluster-provision.log";

// Orchestrators
pub const KUBERNETES: &str = "Kubernetes";

// Container runtimes
pub const CONTAINERD: &str = "containerd";
pub const DOCKER: &str = "docker";
pub const KATA_CONTAINERS: &str = "kata-containers";

// Network plugins and policies
pub const NETWORK_PLUGIN_AZURE: &str = "azure";
pub const NETWORK_PLUGIN_KUBENET: &str = "kubenet";
pub const NETWORK_PLUGIN_NONE: &str = "none";
pub const NETWORK_PLUGIN_FLANNEL: &str = "flannel";
pub const NETWORK_PLUGIN_CILIUM: &str = "cilium";
pub const NETWORK_POLICY_CALICO: &str = "calico";
pub const NETWORK_POLICY_CILIUM: &str = "cilium";
pub const NETWORK_POLICY_ANTREA: &str = "antrea";
pub const NETWORK_PLUGIN_MODE_OVERLAY: &str = "overlay";
pub const NETWORK_DATAPLANE_CILIUM: &str = "cilium";

pub const DEFAULT_VNET_CIDR: &str = "10.0.0.0/8";
pub const DEFAULT_VNET_CIDR_IPV6: &str = "2001:1234:5678:9a00::/56";
pub const DEFAULT_KUBERNETES_DNS_SERVICE_IP: &str = "10.0.0.10";

// VM types
pub const VMSS_VM_TYPE: &str = "vmss";
pub const STANDARD_VM_TYPE: &str = "standard";
pub const VIRTUAL_MACHINE_SCALE_SETS: &str = "VirtualMachineScaleSets";
pub const AVAILABILITY_SET: &str = "AvailabilitySet";

// Kubelet disk types
pub const KUBELET_DISK_TYPE_OS: &str = "OS";
pub const KUBELET_DISK_TYPE_TEMPORARY: &str = "Temporary";

// Outbound types
pub const OUTBOUND_TYPE_NONE: &str = "none";
pub const OUTBOUND_TYPE_BLOCK: &str = "block";

pub const CONTAINER_DATA_DIR_KEY: &str = "dataDir";

/// Kubernetes versions at or above this use the containerd 2.x (config version 3) schema.
pub const CONTAINERD_V3_MIN_KUBE_VERSION: &str = "1.32.0";

// Cloud names
pub const AZURE_PUBLIC_CLOUD: &str = "AzurePublicCloud";
pub const AZURE_CHINA_CLOUD: &str = "AzureChinaCloud";
pub const AZURE_US_GOVERNMENT_CLOUD: &str = "AzureUSGovernmentCloud";
pub const AZURE_GERMAN_CLOUD: &str = "AzureGermanCloud";
pub const USNAT_CLOUD: &str = "USNatCloud";
pub const USSEC_CLOUD: &str = "USSecCloud";
pub const AZURE_STACK_CLOUD: &str = "AzureStackCloud";
pub const AKS_CUSTOM_CLOUD_NAME: &str = "akscustom";

// Outbound connectivity probe endpoints
pub const MCR_ENDPOINT: &str = "mcr.microsoft.com";
pub const MCR_CHINA_ENDPOINT: &str = "gcr.azk8s.cn";
pub const ERR_OUTBOUND_CONN_FAIL: u32 = 50;

// Image galleries
pub const AKS_UBUNTU_RESOURCE_GROUP: &str = "AKS-Ubuntu";
pub const AKS_MARINER_RESOURCE_GROUP: &str = "AKS-CBLMariner";
pub const AKS_AZURE_LINUX_RESOURCE_GROUP: &str = "AKS-AzureLinux";
pub const AKS_WINDOWS_RESOURCE_GROUP: &str = "AKS-Windows";
pub const AKS_FLATCAR_RESOURCE_GROUP: &str = "AKS-Flatcar";
pub const AKS_UBUNTU_GALLERY_NAME: &str = "AKSUbuntu";
pub const AKS_MARINER_GALLERY_NAME: &str = "AKSCBLMariner";
pub const AKS_AZURE_LINUX_GALLERY_NAME: &str = "AKSAzureLinux";
pub const AKS_WINDOWS_GALLERY_NAME: &str = "AKSWindows";
pub const AKS_FLATCAR_GALLERY_NAME: &str = "AKSFlatcar";

pub const PUBLIC_SIG_TENANT_ID: &str = "33e01921-4d64-4f8c-a055-5bdaffd5e33d";
pub const PUBLIC_SIG_SUBSCRIPTION_ID: &str = "109a5e88-712a-48ae-9078-9ca8b3c81345";

/// Default node image version for every Linux SIG definition.
pub const LINUX_SIG_IMAGE_VERSION: &str = "202501.05.0";
/// Default node image version for every Windows SIG definition.
pub const WINDOWS_SIG_IMAGE_VERSION: &str = "26100.2454.241217";

// Toggles
pub const LINUX_NODE_IMAGE_VERSION_TOGGLE: &str = "linux-node-image-version";

// Kubelet
pub const KUBELET_CONFIG_API_VERSION: &str = "kubelet.config.k8s.io/v1beta1";
pub const KUBELET_CONFIG_KIND: &str = "KubeletConfiguration";
pub const KUBELET_CONFIG_FILE_MIN_KUBE_VERSION: &str = "1.14.0";

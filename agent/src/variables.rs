/*!
The variable maps the outer templates read through `GetVariable`.

The custom data template embeds every provisioning script and unit as gzipped base64 under
`cloudInitData`. Each script is itself a template, expanded with the same functions as the outer
document. The CSE template reads a flat map of upper case shell variable names, all string valued,
which become the environment of the provisioning script.
*/
use crate::assets::{self, AssetSource};
use crate::components;
use crate::encoding::{as_base64, base64_encode, gzip_base64, normalize_line_endings};
use crate::error::{self, Result};
use crate::funcmap::node;
use crate::funcmap::network;
use crate::kubelet;
use crate::linux_os;
use crate::proxy;
use crate::sku;
use crate::snapshot::Snapshot;
use crate::template::{self, FuncMap};
use datamodel::{DistroFamily, NodeBootstrappingConfiguration};
use serde_json::{Map, Value};
use snafu::ResultExt;
use std::collections::BTreeMap;
use tracing::{event, instrument, Level};

const ARTIFACTS: &str = "linux/cloud-init/artifacts";

/// A script or unit embedded in the cloud-init document.
struct CloudInitFile {
    key: &'static str,
    asset: &'static str,
    include: fn(&NodeBootstrappingConfiguration) -> bool,
}

fn always(_: &NodeBootstrappingConfiguration) -> bool {
    true
}

fn non_vhd(nbc: &NodeBootstrappingConfiguration) -> bool {
    !nbc.agent_pool_profile.distro.is_vhd()
}

fn custom_cloud(nbc: &NodeBootstrappingConfiguration) -> bool {
    nbc.is_aks_custom_cloud()
}

macro_rules! cloud_init_files {
    ($($key:literal => $asset:literal if $include:ident,)*) => {
        &[$(CloudInitFile { key: $key, asset: $asset, include: $include },)*]
    };
}

const CLOUD_INIT_FILES: &[CloudInitFile] = cloud_init_files! {
    "provisionScript" => "cse_main.sh" if always,
    "provisionSource" => "cse_helpers.sh" if always,
    "provisionInstalls" => "cse_install.sh" if always,
    "provisionConfigs" => "cse_config.sh" if always,
    "customSearchDomainsScript" => "setup-custom-search-domains.sh" if always,
    "dhcpv6SystemdService" => "dhcpv6.service" if always,
    "dhcpv6ConfigurationScript" => "enable-dhcpv6.sh" if always,
    "kubeletSystemdService" => "kubelet.service" if always,
    "reconcilePrivateHostsScript" => "reconcile-private-hosts.sh" if always,
    "reconcilePrivateHostsService" => "reconcile-private-hosts.service" if always,
    "bindMountScript" => "bind-mount.sh" if always,
    "bindMountSystemdService" => "bind-mount.service" if always,
    "containerdKubeletDropin" => "10-containerd.conf" if always,
    "cgroupv2KubeletDropin" => "10-cgroupv2.conf" if always,
    "tlsBootstrapDropin" => "10-tlsbootstrap.conf" if always,
    "httpProxyDropin" => "10-httpproxy.conf" if always,
    "initAKSCustomCloud" => "init-aks-custom-cloud.sh" if custom_cloud,
    "provisionCIS" => "cis.sh" if non_vhd,
    "healthMonitorScript" => "health-monitor.sh" if non_vhd,
    "kubeletMonitorSystemdService" => "kubelet-monitor.service" if non_vhd,
    "aptPreferences" => "apt-preferences" if non_vhd,
};

/// The helper and install scripts of the node's distro family. Customized images get the Ubuntu
/// ones.
fn distro_scripts(nbc: &NodeBootstrappingConfiguration) -> (&'static str, &'static str) {
    match nbc.agent_pool_profile.distro.family() {
        DistroFamily::Mariner | DistroFamily::AzureLinux => (
            "mariner/cse_helpers_mariner.sh",
            "mariner/cse_install_mariner.sh",
        ),
        DistroFamily::Flatcar => (
            "flatcar/cse_helpers_flatcar.sh",
            "flatcar/cse_install_flatcar.sh",
        ),
        _ => (
            "ubuntu/cse_helpers_ubuntu.sh",
            "ubuntu/cse_install_ubuntu.sh",
        ),
    }
}

fn expand_and_encode(
    assets: &dyn AssetSource,
    asset: &str,
    root: &Value,
    funcs: &FuncMap,
) -> Result<String> {
    let name = format!("{}/{}", ARTIFACTS, asset);
    let src = assets::load_text(assets, &name)?;
    let expanded = template::render(&name, &src, root, funcs).context(error::TemplateSnafu)?;
    gzip_base64(&name, normalize_line_endings(&expanded).as_bytes())
}

/// `{"cloudInitData": {<key>: <gzipped base64 script>}}` for every script the node needs.
#[instrument(skip_all)]
pub fn custom_data_variables(
    snapshot: &Snapshot,
    assets: &dyn AssetSource,
    root: &Value,
    funcs: &FuncMap,
) -> Result<Value> {
    let nbc = &snapshot.nbc;
    let mut files = Map::new();
    for file in CLOUD_INIT_FILES.iter().filter(|file| (file.include)(nbc)) {
        files.insert(
            file.key.to_string(),
            Value::String(expand_and_encode(assets, file.asset, root, funcs)?),
        );
    }

    let (helpers, installs) = distro_scripts(nbc);
    files.insert(
        "provisionSourceDistro".to_string(),
        Value::String(expand_and_encode(assets, helpers, root, funcs)?),
    );
    files.insert(
        "provisionInstallsDistro".to_string(),
        Value::String(expand_and_encode(assets, installs, root, funcs)?),
    );

    let manifest = serde_json::to_vec_pretty(&components::component_images(
        nbc.orchestrator_version(),
    ))
    .context(error::SerializeSnafu {
        name: "component manifest",
    })?;
    files.insert(
        "componentManifestFile".to_string(),
        Value::String(gzip_base64("component manifest", &manifest)?),
    );

    event!(Level::DEBUG, files = files.len(), "Composed cloud-init variables");
    let mut variables = Map::new();
    variables.insert("cloudInitData".to_string(), Value::Object(files));
    Ok(Value::Object(variables))
}

/// The resource group, virtual network and subnet named by an ARM subnet ID.
fn split_subnet_id(subnet_id: &str) -> (String, String, String) {
    let parts: Vec<&str> = subnet_id.split('/').collect();
    let part = |index: usize| parts.get(index).copied().unwrap_or_default().to_string();
    (part(4), part(8), part(10))
}

/// The flat map of shell variables the CSE hands to the provisioning script.
#[instrument(skip_all)]
pub fn cse_command_variables(snapshot: &Snapshot) -> BTreeMap<String, String> {
    let nbc = &snapshot.nbc;
    let pool = &nbc.agent_pool_profile;
    let properties = &nbc.container_service.properties;
    let k8s = nbc.kubernetes_config().cloned().unwrap_or_default();
    let os_config = pool.custom_linux_os_config.as_ref();
    let proxy_config = nbc.http_proxy_config.as_ref();

    let mut vars = BTreeMap::new();
    let mut set = |name: &str, value: String| {
        vars.insert(name.to_string(), value);
    };

    set("TENANT_ID", nbc.tenant_id.clone());
    set("SUBSCRIPTION_ID", nbc.subscription_id.clone());
    set("RESOURCE_GROUP", nbc.resource_group_name.clone());
    set("LOCATION", nbc.container_service.location.clone());

    let any_vmss = std::iter::once(pool)
        .chain(properties.agent_pool_profiles.iter())
        .any(|profile| profile.is_virtual_machine_scale_sets());
    let vm_type = if any_vmss {
        datamodel::constants::VMSS_VM_TYPE
    } else {
        datamodel::constants::STANDARD_VM_TYPE
    };
    set("VM_TYPE", vm_type.to_string());

    let (vnet_resource_group, vnet_name, subnet) = if pool.is_custom_vnet() {
        split_subnet_id(&pool.vnet_subnet_id)
    } else {
        (String::new(), "aks-vnet".to_string(), "aks-subnet".to_string())
    };
    set("SUBNET", subnet);
    set("VNET_NAME", vnet_name);
    set("VIRTUAL_NETWORK_RESOURCE_GROUP_NAME", vnet_resource_group);
    set("NSG_NAME", "aks-agentpool-nsg".to_string());
    set("ROUTE_TABLE_NAME", "aks-agentpool-routetable".to_string());
    let availability_set = match properties.agent_pool_profiles.first() {
        Some(first) if !any_vmss => format!("{}-availabilitySet", first.name),
        _ => String::new(),
    };
    set("PRIMARY_AVAILABILITY_SET", availability_set);
    set("PRIMARY_SCALE_SET", nbc.primary_scale_set_name.clone());
    set(
        "USE_MANAGED_IDENTITY_EXTENSION",
        k8s.use_managed_identity.to_string(),
    );
    set(
        "USER_ASSIGNED_IDENTITY_ID",
        nbc.user_assigned_identity_client_id.clone(),
    );
    set(
        "USE_INSTANCE_METADATA",
        k8s.use_instance_metadata.unwrap_or(false).to_string(),
    );
    set("LOADBALANCER_SKU", k8s.load_balancer_sku.clone());
    set("EXCLUDE_MASTER_FROM_STANDARD_LB", "true".to_string());
    set(
        "MAXIMUM_LOADBALANCER_RULE_COUNT",
        k8s.maximum_load_balancer_rule_count.to_string(),
    );

    set("KUBERNETES_VERSION", nbc.orchestrator_version().to_string());
    set("CONTAINER_RUNTIME", nbc.container_runtime().to_string());
    set("NETWORK_PLUGIN", k8s.network_plugin.clone());
    set("NETWORK_POLICY", k8s.network_policy.clone());
    set("IS_VHD", pool.distro.is_vhd().to_string());
    set("GPU_NODE", sku::is_nvidia_enabled_sku(&pool.vm_size).to_string());
    set("SGX_NODE", sku::is_sgx_enabled_sku(&pool.vm_size).to_string());
    set(
        "MIG_NODE",
        sku::is_mig_enabled_node(&pool.vm_size, &nbc.gpu_instance_profile).to_string(),
    );
    set("GPU_INSTANCE_PROFILE", nbc.gpu_instance_profile.clone());
    set(
        "AUDITD_ENABLED",
        pool.auditd_enabled.unwrap_or(false).to_string(),
    );
    set(
        "CONFIG_GPU_DRIVER_IF_NEEDED",
        nbc.config_gpu_driver_if_needed.to_string(),
    );
    set(
        "ENABLE_GPU_DEVICE_PLUGIN_IF_NEEDED",
        nbc.enable_gpu_device_plugin_if_needed.to_string(),
    );
    set(
        "ENABLE_UNATTENDED_UPGRADES",
        (!nbc.disable_unattended_upgrades).to_string(),
    );
    set("IS_MARINER", pool.distro.is_mariner_based().to_string());
    set("IS_FLATCAR", pool.distro.is_flatcar().to_string());
    set("IS_KATA", pool.distro.is_kata().to_string());
    set("NEEDS_CGROUPV2", pool.distro.is_cgroup_v2().to_string());

    set("KUBELET_FLAGS", snapshot.kubelet_flags.clone());
    set("KUBELET_NODE_LABELS", node::agent_kubernetes_labels(pool));
    set(
        "KUBELET_CONFIG_FILE_ENABLED",
        kubelet::is_kubelet_config_file_enabled(nbc).to_string(),
    );
    set(
        "KUBELET_CONFIG_FILE_CONTENT",
        base64_encode(&snapshot.kubelet_config_file),
    );
    set(
        "ENABLE_KUBELET_SERVING_CERTIFICATE_ROTATION",
        kubelet::is_serving_certificate_rotation_enabled(nbc).to_string(),
    );
    set(
        "ENABLE_SECURE_TLS_BOOTSTRAPPING",
        nbc.enable_secure_tls_bootstrapping.to_string(),
    );
    set("HAS_KUBELET_DISK_TYPE", (!pool.kubelet_disk_type.is_empty()).to_string());

    set(
        "CONTAINERD_CONFIG_CONTENT",
        base64_encode(&snapshot.containerd_config),
    );
    set(
        "CONTAINERD_CONFIG_NO_GPU_CONTENT",
        base64_encode(&snapshot.containerd_config_no_gpu),
    );
    set("CONTAINERD_VERSION", nbc.containerd_version.clone());
    set("RUNC_VERSION", nbc.runc_version.clone());
    set("TELEPORT_ENABLED", nbc.enable_acr_teleport_plugin.to_string());
    set(
        "TELEPORTD_PLUGIN_DOWNLOAD_URL",
        nbc.teleportd_plugin_url.clone(),
    );
    set(
        "ARTIFACT_STREAMING_ENABLED",
        nbc.enable_artifact_streaming.to_string(),
    );

    set("SYSCTL_CONTENT", base64_encode(&snapshot.sysctl_content));
    set(
        "SHOULD_CONFIG_CONTAINERD_ULIMITS",
        linux_os::should_config_containerd_ulimits(os_config).to_string(),
    );
    set(
        "CONTAINERD_ULIMITS",
        linux_os::containerd_ulimit_string(os_config),
    );
    set(
        "SHOULD_CONFIG_TRANSPARENT_HUGE_PAGE",
        linux_os::should_config_transparent_huge_page(os_config).to_string(),
    );
    set(
        "THP_ENABLED",
        linux_os::transparent_huge_page_enabled(os_config),
    );
    set("THP_DEFRAG", linux_os::transparent_huge_page_defrag(os_config));
    set(
        "SHOULD_CONFIG_SWAP_FILE",
        linux_os::should_config_swap_file(os_config).to_string(),
    );
    set(
        "SWAP_FILE_SIZE_MB",
        linux_os::swap_file_size_mb(os_config).to_string(),
    );

    set(
        "ENABLE_IMDS_RESTRICTION",
        nbc.enable_imds_restriction.to_string(),
    );
    set(
        "INSERT_IMDS_RESTRICTION_RULE_TO_MANGLE_TABLE",
        nbc.insert_imds_restriction_rule_to_mangle_table.to_string(),
    );
    set(
        "BLOCK_OUTBOUND_NETWORK",
        network::block_outbound_network(nbc).to_string(),
    );
    set("OUTBOUND_COMMAND", network::outbound_command(nbc));

    set(
        "SHOULD_CONFIGURE_HTTP_PROXY",
        proxy::should_configure_http_proxy(proxy_config).to_string(),
    );
    set(
        "SHOULD_CONFIGURE_HTTP_PROXY_CA",
        proxy::should_configure_http_proxy_ca(proxy_config).to_string(),
    );
    set(
        "HTTP_PROXY",
        proxy::http_proxy(proxy_config).unwrap_or_default().to_string(),
    );
    set(
        "HTTPS_PROXY",
        proxy::https_proxy(proxy_config).unwrap_or_default().to_string(),
    );
    set(
        "NO_PROXY",
        proxy::no_proxy(proxy_config).unwrap_or_default(),
    );
    set(
        "HTTP_PROXY_TRUSTED_CA",
        proxy::trusted_ca(proxy_config).unwrap_or_default(),
    );

    let certs = proxy::custom_ca_trust_certs(nbc.custom_ca_trust_config.as_ref());
    set(
        "SHOULD_CONFIGURE_CUSTOM_CA_TRUST",
        proxy::should_configure_custom_ca_trust(nbc.custom_ca_trust_config.as_ref()).to_string(),
    );
    set("CUSTOM_CA_TRUST_COUNT", certs.len().to_string());
    for (index, cert) in certs.into_iter().enumerate() {
        set(&format!("CUSTOM_CA_CERT_{}", index), cert);
    }

    set(
        "DISABLE_SSH",
        (nbc.ssh_status == datamodel::nbc::SshStatus::Off).to_string(),
    );
    set("MESSAGE_OF_THE_DAY", as_base64(&pool.message_of_the_day));
    set("IS_CUSTOM_CLOUD", nbc.is_aks_custom_cloud().to_string());

    event!(Level::DEBUG, variables = vars.len(), "Composed CSE variables");
    vars
}

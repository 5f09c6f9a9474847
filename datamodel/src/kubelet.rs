//! Kubelet and node OS tuning records: the caller-facing custom configuration and the typed
//! kubelet configuration file.
use crate::constants;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kubelet settings a user can customize per pool.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomKubeletConfig {
    pub cpu_manager_policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_cfs_quota: Option<bool>,
    pub cpu_cfs_quota_period: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_gc_high_threshold: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_gc_low_threshold: Option<i32>,
    pub topology_manager_policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_unsafe_sysctls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_swap_on: Option<bool>,
    #[serde(rename = "containerLogMaxSizeMB", skip_serializing_if = "Option::is_none")]
    pub container_log_max_size_mb: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_log_max_files: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_max_pids: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seccomp_default: Option<bool>,
}

/// Node OS settings a user can customize per pool.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomLinuxOsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sysctls: Option<SysctlConfig>,
    pub transparent_huge_page_enabled: String,
    pub transparent_huge_page_defrag: String,
    #[serde(rename = "swapFileSizeMB", skip_serializing_if = "Option::is_none")]
    pub swap_file_size_mb: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ulimit_config: Option<UlimitConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UlimitConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_locked_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_file: Option<String>,
}

/// Declares `SysctlConfig` with one optional field per supported sysctl, plus a way to list the
/// fields that are set under their dotted sysctl names.
macro_rules! sysctls {
    ($( $field:ident : $ty:ty => $name:literal, )*) => {
        /// Supported sysctl overrides.
        #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase", default)]
        pub struct SysctlConfig {
            $(
                #[serde(skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
        }

        impl SysctlConfig {
            /// Every field that is set, as `(sysctl name, value)`.
            pub fn entries(&self) -> Vec<(&'static str, String)> {
                let mut entries = Vec::new();
                $(
                    if let Some(value) = &self.$field {
                        entries.push(($name, value.to_string()));
                    }
                )*
                entries
            }
        }
    };
}

sysctls! {
    net_core_somaxconn: i32 => "net.core.somaxconn",
    net_core_netdev_max_backlog: i32 => "net.core.netdev_max_backlog",
    net_core_rmem_default: i32 => "net.core.rmem_default",
    net_core_rmem_max: i32 => "net.core.rmem_max",
    net_core_wmem_default: i32 => "net.core.wmem_default",
    net_core_wmem_max: i32 => "net.core.wmem_max",
    net_core_optmem_max: i32 => "net.core.optmem_max",
    net_ipv4_tcp_max_syn_backlog: i32 => "net.ipv4.tcp_max_syn_backlog",
    net_ipv4_tcp_max_tw_buckets: i32 => "net.ipv4.tcp_max_tw_buckets",
    net_ipv4_tcp_fin_timeout: i32 => "net.ipv4.tcp_fin_timeout",
    net_ipv4_tcp_keepalive_time: i32 => "net.ipv4.tcp_keepalive_time",
    net_ipv4_tcp_keepalive_probes: i32 => "net.ipv4.tcp_keepalive_probes",
    net_ipv4_tcpkeepalive_intvl: i32 => "net.ipv4.tcp_keepalive_intvl",
    net_ipv4_tcp_tw_reuse: bool => "net.ipv4.tcp_tw_reuse",
    net_ipv4_ip_local_port_range: String => "net.ipv4.ip_local_port_range",
    net_ipv4_neigh_default_gc_thresh1: i32 => "net.ipv4.neigh.default.gc_thresh1",
    net_ipv4_neigh_default_gc_thresh2: i32 => "net.ipv4.neigh.default.gc_thresh2",
    net_ipv4_neigh_default_gc_thresh3: i32 => "net.ipv4.neigh.default.gc_thresh3",
    net_netfilter_nf_conntrack_max: i32 => "net.netfilter.nf_conntrack_max",
    net_netfilter_nf_conntrack_buckets: i32 => "net.netfilter.nf_conntrack_buckets",
    fs_inotify_max_user_watches: i32 => "fs.inotify.max_user_watches",
    fs_file_max: i32 => "fs.file-max",
    fs_aio_max_nr: i32 => "fs.aio-max-nr",
    fs_nr_open: i32 => "fs.nr_open",
    kernel_threads_max: i32 => "kernel.threads-max",
    vm_max_map_count: i32 => "vm.max_map_count",
    vm_swappiness: i32 => "vm.swappiness",
    vm_vfs_cache_pressure: i32 => "vm.vfs_cache_pressure",
}

/// The kubelet configuration file (`kubelet.config.k8s.io/v1beta1`).
///
/// Every field is optional so that only settings that were actually configured are written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeletConfiguration {
    pub kind: String,
    pub api_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_pod_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only_port: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_cert_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_private_key_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_cipher_suites: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotate_certificates: Option<bool>,
    #[serde(rename = "serverTLSBootstrap", skip_serializing_if = "Option::is_none")]
    pub server_tls_bootstrap: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<KubeletAuthentication>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<KubeletAuthorization>,
    #[serde(rename = "eventRecordQPS", skip_serializing_if = "Option::is_none")]
    pub event_record_qps: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_domain: Option<String>,
    #[serde(rename = "clusterDNS", skip_serializing_if = "Option::is_none")]
    pub cluster_dns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming_connection_idle_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_status_update_frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_status_report_frequency: Option<String>,
    #[serde(rename = "imageGCHighThresholdPercent", skip_serializing_if = "Option::is_none")]
    pub image_gc_high_threshold_percent: Option<i32>,
    #[serde(rename = "imageGCLowThresholdPercent", skip_serializing_if = "Option::is_none")]
    pub image_gc_low_threshold_percent: Option<i32>,
    #[serde(rename = "cgroupsPerQOS", skip_serializing_if = "Option::is_none")]
    pub cgroups_per_qos: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cgroup_driver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_manager_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology_manager_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pods: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_pids_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolv_conf: Option<String>,
    #[serde(rename = "cpuCFSQuota", skip_serializing_if = "Option::is_none")]
    pub cpu_cfs_quota: Option<bool>,
    #[serde(rename = "cpuCFSQuotaPeriod", skip_serializing_if = "Option::is_none")]
    pub cpu_cfs_quota_period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serialize_image_pulls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eviction_hard: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protect_kernel_defaults: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_gates: Option<BTreeMap<String, bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_swap_on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_log_max_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_log_max_files: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_reserved: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kube_reserved: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforce_node_allocatable: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_unsafe_sysctls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seccomp_default: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_node: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthz_port: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallel_image_pulls: Option<i32>,
}

impl Default for KubeletConfiguration {
    fn default() -> Self {
        Self {
            kind: constants::KUBELET_CONFIG_KIND.to_string(),
            api_version: constants::KUBELET_CONFIG_API_VERSION.to_string(),
            static_pod_path: None,
            address: None,
            read_only_port: None,
            tls_cert_file: None,
            tls_private_key_file: None,
            tls_cipher_suites: None,
            rotate_certificates: None,
            server_tls_bootstrap: None,
            authentication: None,
            authorization: None,
            event_record_qps: None,
            cluster_domain: None,
            cluster_dns: None,
            streaming_connection_idle_timeout: None,
            node_status_update_frequency: None,
            node_status_report_frequency: None,
            image_gc_high_threshold_percent: None,
            image_gc_low_threshold_percent: None,
            cgroups_per_qos: None,
            cgroup_driver: None,
            cpu_manager_policy: None,
            topology_manager_policy: None,
            max_pods: None,
            pod_pids_limit: None,
            resolv_conf: None,
            cpu_cfs_quota: None,
            cpu_cfs_quota_period: None,
            serialize_image_pulls: None,
            eviction_hard: None,
            protect_kernel_defaults: None,
            feature_gates: None,
            fail_swap_on: None,
            container_log_max_size: None,
            container_log_max_files: None,
            system_reserved: None,
            kube_reserved: None,
            enforce_node_allocatable: None,
            allowed_unsafe_sysctls: None,
            seccomp_default: None,
            register_node: None,
            healthz_port: None,
            max_parallel_image_pulls: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeletAuthentication {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x509: Option<KubeletX509Authentication>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<KubeletWebhookAuthentication>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymous: Option<KubeletAnonymousAuthentication>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeletX509Authentication {
    #[serde(rename = "clientCAFile")]
    pub client_ca_file: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeletWebhookAuthentication {
    pub enabled: bool,
    #[serde(rename = "cacheTTL", skip_serializing_if = "Option::is_none")]
    pub cache_ttl: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeletAnonymousAuthentication {
    pub enabled: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeletAuthorization {
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<KubeletWebhookAuthorization>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeletWebhookAuthorization {
    #[serde(rename = "cacheAuthorizedTTL", skip_serializing_if = "Option::is_none")]
    pub cache_authorized_ttl: Option<String>,
    #[serde(rename = "cacheUnauthorizedTTL", skip_serializing_if = "Option::is_none")]
    pub cache_unauthorized_ttl: Option<String>,
}

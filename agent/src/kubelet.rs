//! Kubelet configuration synthesis.
//!
//! The kubelet flag map on the NBC is the single source: the command line (`KUBELET_FLAGS`) and
//! the typed configuration file (`KUBELET_CONFIG_FILE_CONTENT`) are both derived from it. When the
//! configuration file is in use, every *translated* flag moves into the file and is dropped from the
//! command line. A few more flags are *mirrored*: written to the file and kept on the command line.
use datamodel::constants;
use datamodel::kubelet::{
    CustomKubeletConfig, KubeletAnonymousAuthentication, KubeletAuthentication,
    KubeletAuthorization, KubeletConfiguration, KubeletWebhookAuthentication,
    KubeletX509Authentication,
};
use datamodel::version::is_kubernetes_version_ge;
use datamodel::NodeBootstrappingConfiguration;
use snafu::ResultExt;
use std::collections::BTreeMap;
use tracing::{event, instrument, Level};

const DYNAMIC_CONFIG_DIR_FLAG: &str = "--dynamic-config-dir";
const FEATURE_GATES_FLAG: &str = "--feature-gates";
const ROTATE_SERVER_CERTIFICATES_FLAG: &str = "--rotate-server-certificates";

/// Flags that are never put on the kubelet command line.
const COMMAND_LINE_OMITTED_FLAGS: &[&str] = &["--node-status-report-frequency"];

/// Flags only the dockershim understood.
const DOCKERSHIM_FLAGS: &[&str] = &[
    "--network-plugin",
    "--network-plugin-mtu",
    "--image-pull-progress-deadline",
    "--non-masquerade-cidr",
];
const DOCKERSHIM_FLAG_PREFIX: &str = "--docker-";
const DOCKERSHIM_REMOVED_KUBE_VERSION: &str = "1.24.0";
const DYNAMIC_KUBELET_GATE_REMOVED_KUBE_VERSION: &str = "1.26.0";

type Setter = fn(&mut KubeletConfiguration, &str, &str) -> Result<()>;

/// How a kubelet flag lands in the configuration file.
struct FlagMapping {
    flag: &'static str,
    /// Translated flags are removed from the command line when the file is in use.
    translated: bool,
    set: Setter,
}

macro_rules! mapping {
    ($flag:literal, translated, $set:expr) => {
        FlagMapping {
            flag: $flag,
            translated: true,
            set: $set,
        }
    };
    ($flag:literal, mirrored, $set:expr) => {
        FlagMapping {
            flag: $flag,
            translated: false,
            set: $set,
        }
    };
}

const FLAG_MAPPINGS: &[FlagMapping] = &[
    mapping!("--address", translated, |c, _, v| {
        c.address = Some(v.to_string());
        Ok(())
    }),
    mapping!("--anonymous-auth", translated, |c, f, v| {
        authentication(c).anonymous = Some(KubeletAnonymousAuthentication {
            enabled: parse_bool(f, v)?,
        });
        Ok(())
    }),
    mapping!("--client-ca-file", translated, |c, _, v| {
        authentication(c).x509 = Some(KubeletX509Authentication {
            client_ca_file: v.to_string(),
        });
        Ok(())
    }),
    mapping!("--authentication-token-webhook", translated, |c, f, v| {
        authentication(c).webhook = Some(KubeletWebhookAuthentication {
            enabled: parse_bool(f, v)?,
            cache_ttl: None,
        });
        Ok(())
    }),
    mapping!("--authorization-mode", translated, |c, _, v| {
        c.authorization = Some(KubeletAuthorization {
            mode: v.to_string(),
            webhook: None,
        });
        Ok(())
    }),
    mapping!("--pod-manifest-path", translated, |c, _, v| {
        c.static_pod_path = Some(v.to_string());
        Ok(())
    }),
    mapping!("--cluster-dns", translated, |c, _, v| {
        c.cluster_dns = Some(split_list(v));
        Ok(())
    }),
    mapping!("--cgroups-per-qos", translated, |c, f, v| {
        c.cgroups_per_qos = Some(parse_bool(f, v)?);
        Ok(())
    }),
    mapping!("--tls-cert-file", translated, |c, _, v| {
        c.tls_cert_file = Some(v.to_string());
        Ok(())
    }),
    mapping!("--tls-private-key-file", translated, |c, _, v| {
        c.tls_private_key_file = Some(v.to_string());
        Ok(())
    }),
    mapping!("--tls-cipher-suites", translated, |c, _, v| {
        c.tls_cipher_suites = Some(split_list(v));
        Ok(())
    }),
    mapping!("--cluster-domain", translated, |c, _, v| {
        c.cluster_domain = Some(v.to_string());
        Ok(())
    }),
    mapping!("--max-pods", translated, |c, f, v| {
        c.max_pods = Some(parse_int(f, v)?);
        Ok(())
    }),
    mapping!("--eviction-hard", translated, |c, _, v| {
        c.eviction_hard = Some(parse_key_values(v, ',', '<'));
        Ok(())
    }),
    mapping!("--node-status-update-frequency", translated, |c, _, v| {
        c.node_status_update_frequency = Some(v.to_string());
        Ok(())
    }),
    mapping!("--image-gc-high-threshold", translated, |c, f, v| {
        c.image_gc_high_threshold_percent = Some(parse_int(f, v)?);
        Ok(())
    }),
    mapping!("--image-gc-low-threshold", translated, |c, f, v| {
        c.image_gc_low_threshold_percent = Some(parse_int(f, v)?);
        Ok(())
    }),
    mapping!("--event-qps", translated, |c, f, v| {
        c.event_record_qps = Some(parse_int(f, v)?);
        Ok(())
    }),
    mapping!("--pod-max-pids", translated, |c, f, v| {
        c.pod_pids_limit = Some(parse_int(f, v)?);
        Ok(())
    }),
    mapping!("--enforce-node-allocatable", translated, |c, _, v| {
        c.enforce_node_allocatable = Some(split_list(v));
        Ok(())
    }),
    mapping!("--streaming-connection-idle-timeout", translated, |c, _, v| {
        c.streaming_connection_idle_timeout = Some(v.to_string());
        Ok(())
    }),
    mapping!("--rotate-certificates", translated, |c, f, v| {
        c.rotate_certificates = Some(parse_bool(f, v)?);
        Ok(())
    }),
    mapping!("--read-only-port", translated, |c, f, v| {
        c.read_only_port = Some(parse_int(f, v)?);
        Ok(())
    }),
    mapping!("--feature-gates", translated, |c, f, v| {
        let mut gates = BTreeMap::new();
        for (gate, enabled) in parse_key_values(v, ',', '=') {
            gates.insert(gate, parse_bool(f, &enabled)?);
        }
        c.feature_gates = Some(gates);
        Ok(())
    }),
    mapping!("--protect-kernel-defaults", translated, |c, f, v| {
        c.protect_kernel_defaults = Some(parse_bool(f, v)?);
        Ok(())
    }),
    mapping!("--resolv-conf", translated, |c, _, v| {
        c.resolv_conf = Some(v.to_string());
        Ok(())
    }),
    mapping!("--system-reserved", translated, |c, _, v| {
        c.system_reserved = Some(parse_key_values(v, ',', '='));
        Ok(())
    }),
    mapping!("--kube-reserved", translated, |c, _, v| {
        c.kube_reserved = Some(parse_key_values(v, ',', '='));
        Ok(())
    }),
    mapping!("--node-status-report-frequency", mirrored, |c, _, v| {
        c.node_status_report_frequency = Some(v.to_string());
        Ok(())
    }),
    mapping!("--rotate-server-certificates", mirrored, |c, f, v| {
        // Only a true value is written; false is the kubelet default.
        if parse_bool(f, v)? {
            c.server_tls_bootstrap = Some(true);
        }
        Ok(())
    }),
    mapping!("--serialize-image-pulls", mirrored, |c, f, v| {
        c.serialize_image_pulls = Some(parse_bool(f, v)?);
        Ok(())
    }),
    mapping!("--cpu-manager-policy", mirrored, |c, _, v| {
        c.cpu_manager_policy = Some(v.to_string());
        Ok(())
    }),
    mapping!("--cpu-cfs-quota", mirrored, |c, f, v| {
        c.cpu_cfs_quota = Some(parse_bool(f, v)?);
        Ok(())
    }),
    mapping!("--cpu-cfs-quota-period", mirrored, |c, _, v| {
        c.cpu_cfs_quota_period = Some(v.to_string());
        Ok(())
    }),
    mapping!("--topology-manager-policy", mirrored, |c, _, v| {
        c.topology_manager_policy = Some(v.to_string());
        Ok(())
    }),
    mapping!("--allowed-unsafe-sysctls", mirrored, |c, _, v| {
        c.allowed_unsafe_sysctls = Some(split_list(v));
        Ok(())
    }),
    mapping!("--fail-swap-on", mirrored, |c, f, v| {
        c.fail_swap_on = Some(parse_bool(f, v)?);
        Ok(())
    }),
    mapping!("--container-log-max-size", mirrored, |c, _, v| {
        c.container_log_max_size = Some(v.to_string());
        Ok(())
    }),
    mapping!("--container-log-max-files", mirrored, |c, f, v| {
        c.container_log_max_files = Some(parse_int(f, v)?);
        Ok(())
    }),
    mapping!("--seccomp-default", mirrored, |c, f, v| {
        c.seccomp_default = Some(parse_bool(f, v)?);
        Ok(())
    }),
    mapping!("--cgroup-driver", mirrored, |c, _, v| {
        c.cgroup_driver = Some(v.to_string());
        Ok(())
    }),
    mapping!("--healthz-port", mirrored, |c, f, v| {
        c.healthz_port = Some(parse_int(f, v)?);
        Ok(())
    }),
    mapping!("--max-parallel-image-pulls", mirrored, |c, f, v| {
        c.max_parallel_image_pulls = Some(parse_int(f, v)?);
        Ok(())
    }),
];

fn authentication(config: &mut KubeletConfiguration) -> &mut KubeletAuthentication {
    config
        .authentication
        .get_or_insert_with(KubeletAuthentication::default)
}

/// Whether `flag` moves into the configuration file when the file is in use.
pub fn is_translated_flag(flag: &str) -> bool {
    FLAG_MAPPINGS
        .iter()
        .any(|mapping| mapping.translated && mapping.flag == flag)
}

/// Accepts the same spellings as Go's `strconv.ParseBool`.
fn parse_bool(flag: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => error::InvalidFlagValueSnafu { flag, value }.fail(),
    }
}

fn parse_int<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .ok()
        .ok_or_else(|| error::KubeletError::InvalidFlagValue {
            flag: flag.to_string(),
            value: value.to_string(),
        })
}

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(|item| item.to_string()).collect()
}

/// Parses `k1<d>v1,k2<d>v2`. Malformed pairs are skipped.
fn parse_key_values(value: &str, item_delim: char, pair_delim: char) -> BTreeMap<String, String> {
    value
        .split(item_delim)
        .filter_map(|pair| {
            let parts: Vec<&str> = pair.split(pair_delim).collect();
            match parts.as_slice() {
                [key, val] => Some((key.trim().to_string(), val.trim().to_string())),
                _ => None,
            }
        })
        .collect()
}

fn join_key_values(values: &BTreeMap<String, String>) -> String {
    values
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Brings the kubelet flags of a snapshot in line with the rest of its configuration. Runs once, on
/// the builder's private copy, before anything is derived from the flags.
#[instrument(skip(nbc))]
pub fn reconcile_kubelet_flags(nbc: &mut NodeBootstrappingConfiguration) {
    let version = nbc.orchestrator_version().to_string();
    let containerd = nbc.container_runtime() == constants::CONTAINERD;
    let rotation = nbc.enable_kubelet_serving_certificate_rotation;
    let flags = &mut nbc.kubelet_config;

    flags.remove(DYNAMIC_CONFIG_DIR_FLAG);

    let mut gates = flags
        .get(FEATURE_GATES_FLAG)
        .map(|gates| parse_key_values(gates, ',', '='))
        .unwrap_or_default();
    let gates_before = gates.clone();

    if rotation {
        flags.insert(
            ROTATE_SERVER_CERTIFICATES_FLAG.to_string(),
            "true".to_string(),
        );
        gates.insert(
            "RotateKubeletServerCertificate".to_string(),
            "true".to_string(),
        );
    }

    if containerd && is_kubernetes_version_ge(&version, DOCKERSHIM_REMOVED_KUBE_VERSION) {
        flags.retain(|flag, _| {
            !DOCKERSHIM_FLAGS.contains(&flag.as_str()) && !flag.starts_with(DOCKERSHIM_FLAG_PREFIX)
        });
    }

    if is_kubernetes_version_ge(&version, DYNAMIC_KUBELET_GATE_REMOVED_KUBE_VERSION) {
        gates.remove("DynamicKubeletConfig");
    }

    if gates != gates_before {
        if gates.is_empty() {
            flags.remove(FEATURE_GATES_FLAG);
        } else {
            flags.insert(FEATURE_GATES_FLAG.to_string(), join_key_values(&gates));
        }
    }
}

/// Whether kubelet reads its settings from a configuration file rather than flags alone.
pub fn is_kubelet_config_file_enabled(nbc: &NodeBootstrappingConfiguration) -> bool {
    nbc.agent_pool_profile.custom_kubelet_config.is_some()
        || nbc.agent_pool_profile.custom_linux_os_config.is_some()
        || (nbc.enable_kubelet_config_file
            && nbc.is_kubernetes()
            && is_kubernetes_version_ge(
                nbc.orchestrator_version(),
                constants::KUBELET_CONFIG_FILE_MIN_KUBE_VERSION,
            ))
}

/// The effective flag map: the NBC flags with any custom kubelet configuration merged over them.
pub fn effective_flags(nbc: &NodeBootstrappingConfiguration) -> BTreeMap<String, String> {
    let mut flags = nbc.kubelet_config.clone();
    if let Some(custom) = nbc
        .container_service
        .properties
        .custom_configuration
        .as_ref()
        .and_then(|custom| custom.kubelet.as_ref())
    {
        flags.extend(
            custom
                .config
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }
    flags.remove(DYNAMIC_CONFIG_DIR_FLAG);
    flags
}

fn command_line_flags(nbc: &NodeBootstrappingConfiguration) -> Vec<(String, String)> {
    let use_config_file = is_kubelet_config_file_enabled(nbc);
    effective_flags(nbc)
        .into_iter()
        .filter(|(flag, _)| !(use_config_file && is_translated_flag(flag)))
        .filter(|(flag, _)| !COMMAND_LINE_OMITTED_FLAGS.contains(&flag.as_str()))
        .collect()
}

/// The sorted `--flag=value ` string passed to kubelet on Linux.
pub fn kubelet_flag_string(nbc: &NodeBootstrappingConfiguration) -> String {
    command_line_flags(nbc)
        .iter()
        .map(|(flag, value)| format!("{}={} ", flag, value))
        .collect()
}

/// The sorted `"--flag=value", ...` list passed to kubelet by the Windows setup script. Custom
/// kubelet settings are folded into flags, since Windows nodes never use the file.
pub fn kubelet_flag_string_psh(nbc: &NodeBootstrappingConfiguration) -> String {
    let mut flags = effective_flags(nbc);
    if let Some(custom) = &nbc.agent_pool_profile.custom_kubelet_config {
        apply_custom_to_flags(custom, &mut flags);
    }
    flags
        .iter()
        .filter(|(flag, _)| !COMMAND_LINE_OMITTED_FLAGS.contains(&flag.as_str()))
        .map(|(flag, value)| format!("\"{}={}\"", flag, value))
        .collect::<Vec<_>>()
        .join(", ")
}

fn apply_custom_to_flags(custom: &CustomKubeletConfig, flags: &mut BTreeMap<String, String>) {
    let mut set = |flag: &str, value: String| {
        flags.insert(flag.to_string(), value);
    };
    if !custom.cpu_manager_policy.is_empty() {
        set("--cpu-manager-policy", custom.cpu_manager_policy.clone());
    }
    if let Some(quota) = custom.cpu_cfs_quota {
        set("--cpu-cfs-quota", quota.to_string());
    }
    if !custom.cpu_cfs_quota_period.is_empty() {
        set("--cpu-cfs-quota-period", custom.cpu_cfs_quota_period.clone());
    }
    if let Some(high) = custom.image_gc_high_threshold {
        set("--image-gc-high-threshold", high.to_string());
    }
    if let Some(low) = custom.image_gc_low_threshold {
        set("--image-gc-low-threshold", low.to_string());
    }
    if !custom.topology_manager_policy.is_empty() {
        set(
            "--topology-manager-policy",
            custom.topology_manager_policy.clone(),
        );
    }
    if let Some(sysctls) = &custom.allowed_unsafe_sysctls {
        set("--allowed-unsafe-sysctls", sysctls.join(","));
    }
    if let Some(fail_swap_on) = custom.fail_swap_on {
        set("--fail-swap-on", fail_swap_on.to_string());
    }
    if let Some(size) = custom.container_log_max_size_mb {
        set("--container-log-max-size", format!("{}M", size));
    }
    if let Some(files) = custom.container_log_max_files {
        set("--container-log-max-files", files.to_string());
    }
    if let Some(pids) = custom.pod_max_pids {
        set("--pod-max-pids", pids.to_string());
    }
}

/// Whether the kubelet serves with a certificate from the cluster CA.
pub fn is_serving_certificate_rotation_enabled(nbc: &NodeBootstrappingConfiguration) -> bool {
    effective_flags(nbc)
        .get(ROTATE_SERVER_CERTIFICATES_FLAG)
        .map(|value| value == "true")
        .unwrap_or(false)
}

/// Builds the typed configuration file from the effective flags, then applies the pool's custom
/// kubelet settings.
pub fn kubelet_configuration(nbc: &NodeBootstrappingConfiguration) -> Result<KubeletConfiguration> {
    let flags = effective_flags(nbc);
    let mut config = KubeletConfiguration::default();
    for mapping in FLAG_MAPPINGS {
        if let Some(value) = flags.get(mapping.flag) {
            (mapping.set)(&mut config, mapping.flag, value)?;
        }
    }
    if let Some(custom) = &nbc.agent_pool_profile.custom_kubelet_config {
        apply_custom_to_configuration(custom, &mut config);
    }
    Ok(config)
}

fn enable_gate(config: &mut KubeletConfiguration, gate: &str) {
    config
        .feature_gates
        .get_or_insert_with(BTreeMap::new)
        .insert(gate.to_string(), true);
}

fn apply_custom_to_configuration(custom: &CustomKubeletConfig, config: &mut KubeletConfiguration) {
    if !custom.cpu_manager_policy.is_empty() {
        config.cpu_manager_policy = Some(custom.cpu_manager_policy.clone());
    }
    if custom.cpu_cfs_quota.is_some() {
        config.cpu_cfs_quota = custom.cpu_cfs_quota;
    }
    if !custom.cpu_cfs_quota_period.is_empty() {
        config.cpu_cfs_quota_period = Some(custom.cpu_cfs_quota_period.clone());
        enable_gate(config, "CustomCPUCFSQuotaPeriod");
    }
    if custom.image_gc_high_threshold.is_some() {
        config.image_gc_high_threshold_percent = custom.image_gc_high_threshold;
    }
    if custom.image_gc_low_threshold.is_some() {
        config.image_gc_low_threshold_percent = custom.image_gc_low_threshold;
    }
    if !custom.topology_manager_policy.is_empty() {
        config.topology_manager_policy = Some(custom.topology_manager_policy.clone());
        enable_gate(config, "TopologyManager");
    }
    if custom.allowed_unsafe_sysctls.is_some() {
        config.allowed_unsafe_sysctls = custom.allowed_unsafe_sysctls.clone();
    }
    if custom.fail_swap_on.is_some() {
        config.fail_swap_on = custom.fail_swap_on;
    }
    if let Some(size) = custom.container_log_max_size_mb {
        config.container_log_max_size = Some(format!("{}M", size));
    }
    if custom.container_log_max_files.is_some() {
        config.container_log_max_files = custom.container_log_max_files;
    }
    if let Some(pids) = custom.pod_max_pids {
        config.pod_pids_limit = Some(i64::from(pids));
    }
    if custom.seccomp_default.is_some() {
        config.seccomp_default = custom.seccomp_default;
    }
}

/// The configuration file as written to disk: JSON indented by four spaces.
pub fn kubelet_config_file_content(nbc: &NodeBootstrappingConfiguration) -> Result<String> {
    let config = kubelet_configuration(nbc)?;
    event!(
        Level::DEBUG,
        use_config_file = is_kubelet_config_file_enabled(nbc),
        "Synthesized kubelet configuration file"
    );
    crate::encoding::to_json_indented(&config).context(error::SerializeSnafu)
}

pub mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum KubeletError {
        #[snafu(display("Invalid value '{}' for kubelet flag '{}'", value, flag))]
        InvalidFlagValue { flag: String, value: String },

        #[snafu(display("Unable to serialize kubelet configuration: '{}'", source))]
        Serialize { source: serde_json::Error },
    }
}

type Result<T> = std::result::Result<T, KubeletError>;
pub use error::KubeletError;

//! Node OS tuning derived from the pool's custom Linux OS configuration.
use datamodel::kubelet::{CustomLinuxOsConfig, UlimitConfig};
use std::collections::BTreeMap;

/// Sysctls every AKS node gets unless the pool overrides them.
const DEFAULT_SYSCTLS: &[(&str, &str)] = &[
    ("net.ipv4.tcp_retries2", "8"),
    ("net.core.message_burst", "80"),
    ("net.core.message_cost", "40"),
    ("net.core.somaxconn", "16384"),
    ("net.ipv4.tcp_max_syn_backlog", "16384"),
    ("net.ipv4.neigh.default.gc_thresh1", "4096"),
    ("net.ipv4.neigh.default.gc_thresh2", "8192"),
    ("net.ipv4.neigh.default.gc_thresh3", "16384"),
];

/// The sysctl drop-in: sorted `key=value` lines, defaults overlaid with the pool's settings.
pub fn sysctl_content(config: Option<&CustomLinuxOsConfig>) -> String {
    let mut sysctls: BTreeMap<&str, String> = DEFAULT_SYSCTLS
        .iter()
        .map(|(key, value)| (*key, value.to_string()))
        .collect();
    if let Some(custom) = config.and_then(|config| config.sysctls.as_ref()) {
        sysctls.extend(custom.entries());
    }
    sysctls
        .iter()
        .map(|(key, value)| format!("{}={}\n", key, value))
        .collect()
}

/// Whether the pool sets a sysctl the defaults don't cover.
pub fn should_config_custom_sysctl(config: Option<&CustomLinuxOsConfig>) -> bool {
    config
        .and_then(|config| config.sysctls.as_ref())
        .map(|sysctls| !sysctls.entries().is_empty())
        .unwrap_or(false)
}

/// The value of one custom sysctl, by its dotted name.
pub fn custom_sysctl(config: Option<&CustomLinuxOsConfig>, name: &str) -> Option<String> {
    config
        .and_then(|config| config.sysctls.as_ref())
        .and_then(|sysctls| {
            sysctls
                .entries()
                .into_iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value)
        })
}

fn ulimits(config: Option<&CustomLinuxOsConfig>) -> Option<&UlimitConfig> {
    config.and_then(|config| config.ulimit_config.as_ref())
}

pub fn should_config_containerd_ulimits(config: Option<&CustomLinuxOsConfig>) -> bool {
    ulimits(config).is_some()
}

/// The containerd service drop-in carrying the pool's ulimits.
pub fn containerd_ulimit_string(config: Option<&CustomLinuxOsConfig>) -> String {
    let ulimit = match ulimits(config) {
        Some(ulimit) => ulimit,
        None => return String::new(),
    };
    let mut limits = BTreeMap::new();
    if let Some(memlock) = ulimit.max_locked_memory.as_deref().filter(|v| !v.is_empty()) {
        limits.insert("LimitMEMLOCK", memlock);
    }
    if let Some(nofile) = ulimit.no_file.as_deref().filter(|v| !v.is_empty()) {
        limits.insert("LimitNOFILE", nofile);
    }
    let entries: Vec<String> = limits
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    format!("[Service]\n{}", entries.join(" "))
}

pub fn transparent_huge_page_enabled(config: Option<&CustomLinuxOsConfig>) -> String {
    config
        .map(|config| config.transparent_huge_page_enabled.clone())
        .unwrap_or_default()
}

pub fn transparent_huge_page_defrag(config: Option<&CustomLinuxOsConfig>) -> String {
    config
        .map(|config| config.transparent_huge_page_defrag.clone())
        .unwrap_or_default()
}

pub fn should_config_transparent_huge_page(config: Option<&CustomLinuxOsConfig>) -> bool {
    !transparent_huge_page_enabled(config).is_empty()
        || !transparent_huge_page_defrag(config).is_empty()
}

pub fn swap_file_size_mb(config: Option<&CustomLinuxOsConfig>) -> i32 {
    config
        .and_then(|config| config.swap_file_size_mb)
        .unwrap_or(0)
}

pub fn should_config_swap_file(config: Option<&CustomLinuxOsConfig>) -> bool {
    swap_file_size_mb(config) > 0
}

#[cfg(test)]
mod test {
    use super::*;
    use datamodel::kubelet::SysctlConfig;

    #[test]
    fn test_sysctl_content() {
        let default = sysctl_content(None);
        assert!(default.starts_with("net.core.message_burst=80\n"));
        assert!(default.contains("net.core.somaxconn=16384\n"));
        assert_eq!(default.lines().count(), DEFAULT_SYSCTLS.len());

        let custom = CustomLinuxOsConfig {
            sysctls: Some(SysctlConfig {
                net_core_somaxconn: Some(32768),
                vm_max_map_count: Some(262144),
                ..Default::default()
            }),
            ..Default::default()
        };
        let content = sysctl_content(Some(&custom));
        assert!(content.contains("net.core.somaxconn=32768\n"));
        assert!(content.ends_with("vm.max_map_count=262144\n"));
        assert!(should_config_custom_sysctl(Some(&custom)));
        assert_eq!(
            custom_sysctl(Some(&custom), "vm.max_map_count").as_deref(),
            Some("262144")
        );
        assert_eq!(custom_sysctl(Some(&custom), "fs.file-max"), None);
    }

    #[test]
    fn test_containerd_ulimit_string() {
        let test_cases = vec![
            (None, None, "[Service]\n"),
            (Some("75000"), None, "[Service]\nLimitMEMLOCK=75000"),
            (
                Some("75000"),
                Some("1048576"),
                "[Service]\nLimitMEMLOCK=75000 LimitNOFILE=1048576",
            ),
        ];
        for (memlock, nofile, expected) in test_cases {
            let config = CustomLinuxOsConfig {
                ulimit_config: Some(UlimitConfig {
                    max_locked_memory: memlock.map(str::to_string),
                    no_file: nofile.map(str::to_string),
                }),
                ..Default::default()
            };
            assert!(should_config_containerd_ulimits(Some(&config)));
            assert_eq!(containerd_ulimit_string(Some(&config)), expected);
        }
        assert!(!should_config_containerd_ulimits(None));
        assert_eq!(containerd_ulimit_string(None), "");
    }

    #[test]
    fn test_thp_and_swap() {
        let config = CustomLinuxOsConfig {
            transparent_huge_page_enabled: "madvise".to_string(),
            swap_file_size_mb: Some(1500),
            ..Default::default()
        };
        assert!(should_config_transparent_huge_page(Some(&config)));
        assert_eq!(transparent_huge_page_defrag(Some(&config)), "");
        assert!(should_config_swap_file(Some(&config)));
        assert_eq!(swap_file_size_mb(Some(&config)), 1500);
        assert!(!should_config_swap_file(None));
    }
}

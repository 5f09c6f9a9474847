//! Functions only the Windows custom data and CSE templates call.
use super::Registry;
use datamodel::constants;
use datamodel::nbc::WindowsProfile;
use datamodel::NodeBootstrappingConfiguration;

fn windows_profile(nbc: &NodeBootstrappingConfiguration) -> Option<&WindowsProfile> {
    nbc.container_service.properties.windows_profile.as_ref()
}

/// The cluster's SSH keys as a PowerShell array body: `"key1", "key2"`.
pub fn ssh_public_keys_powershell(nbc: &NodeBootstrappingConfiguration) -> String {
    nbc.container_service
        .properties
        .linux_profile
        .as_ref()
        .map(|linux| {
            linux
                .ssh
                .public_keys
                .iter()
                .map(|key| format!("\"{}\"", key.key_data.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

pub(super) fn register(registry: &mut Registry) {
    registry.add("WindowsSSHEnabled", |s| {
        windows_profile(&s.nbc)
            .and_then(|profile| profile.ssh_enabled)
            .unwrap_or(true)
    });
    registry.add("GetSshPublicKeysPowerShell", |s| ssh_public_keys_powershell(&s.nbc));
    registry.add("HasWindowsCustomImage", |s| {
        windows_profile(&s.nbc)
            .map(|profile| !profile.windows_image_source_url.is_empty())
            .unwrap_or(false)
    });
    registry.add("GetWindowsMasterSubnetARMParam", |s| {
        s.nbc
            .container_service
            .properties
            .hosted_master_profile
            .as_ref()
            .map(|master| master.subnet.clone())
            .filter(|subnet| !subnet.is_empty())
            .unwrap_or_else(|| constants::DEFAULT_VNET_CIDR.to_string())
    });
    registry.add("GetKubernetesWindowsAgentFunctions", |s| {
        s.windows_agent_functions.clone()
    });
    registry.add_with_args("GetKubeletConfigKeyValsPsh", |s, _| {
        Ok(s.kubelet_flags_psh.clone().into())
    });
    registry.add("IsCSIProxyEnabled", |s| {
        windows_profile(&s.nbc)
            .and_then(|profile| profile.enable_csi_proxy)
            .unwrap_or(false)
    });
    registry.add("GetCSIProxyURL", |s| {
        windows_profile(&s.nbc)
            .map(|profile| profile.csi_proxy_url.clone())
            .unwrap_or_default()
    });
    registry.add("AlwaysPullWindowsPauseImage", |s| {
        windows_profile(&s.nbc)
            .and_then(|profile| profile.always_pull_windows_pause_image)
            .unwrap_or(false)
    });
    registry.add("EnableWinDSR", |s| s.nbc.feature_flags().enable_win_dsr);
    registry.add("GetHnsRemediatorIntervalInMinutes", |s| {
        windows_profile(&s.nbc)
            .and_then(|profile| profile.hns_remediator_interval_in_minutes)
            .unwrap_or(0)
    });
    registry.add("GetLogGeneratorIntervalInMinutes", |s| {
        windows_profile(&s.nbc)
            .and_then(|profile| profile.log_generator_interval_in_minutes)
            .unwrap_or(0)
    });
}

#[cfg(test)]
mod test {
    use super::super::test::{expand, nbc};
    use super::*;
    use datamodel::nbc::{LinuxProfile, PublicKey, SshConfig};

    #[test]
    fn test_ssh_public_keys_powershell() {
        let mut input = nbc();
        assert_eq!(ssh_public_keys_powershell(&input), "");

        input.container_service.properties.linux_profile = Some(LinuxProfile {
            ssh: SshConfig {
                public_keys: vec![
                    PublicKey {
                        key_data: "ssh-rsa AAA user@a \n".to_string(),
                    },
                    PublicKey {
                        key_data: "ssh-rsa BBB user@b".to_string(),
                    },
                ],
            },
            ..Default::default()
        });
        assert_eq!(
            ssh_public_keys_powershell(&input),
            "\"ssh-rsa AAA user@a\", \"ssh-rsa BBB user@b\""
        );
    }

    #[test]
    fn test_windows_profile_functions() {
        let mut input = nbc();
        let test_cases = vec![
            ("{{WindowsSSHEnabled}}", "true"),
            ("{{HasWindowsCustomImage}}", "false"),
            ("{{IsCSIProxyEnabled}}", "false"),
            ("{{GetWindowsMasterSubnetARMParam}}", "10.0.0.0/8"),
            ("{{GetHnsRemediatorIntervalInMinutes}}", "0"),
        ];
        for (src, expected) in test_cases {
            assert_eq!(expand(input.clone(), src), expected, "{}", src);
        }

        input.container_service.properties.windows_profile = Some(WindowsProfile {
            ssh_enabled: Some(false),
            enable_csi_proxy: Some(true),
            csi_proxy_url: "https://csi/proxy.tar".to_string(),
            windows_image_source_url: "https://images/win.vhd".to_string(),
            ..Default::default()
        });
        let test_cases = vec![
            ("{{WindowsSSHEnabled}}", "false"),
            ("{{HasWindowsCustomImage}}", "true"),
            ("{{IsCSIProxyEnabled}}", "true"),
            ("{{GetCSIProxyURL}}", "https://csi/proxy.tar"),
        ];
        for (src, expected) in test_cases {
            assert_eq!(expand(input.clone(), src), expected, "{}", src);
        }
    }
}

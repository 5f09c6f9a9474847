//! The `parameters` map the outer templates read through `GetParameter`.
use crate::encoding::base64_encode;
use datamodel::constants;
use datamodel::NodeBootstrappingConfiguration;
use serde_json::{json, Value};
use std::collections::BTreeMap;

const DEFAULT_MASTER_DNS_PREFIX: &str = "localcluster";

/// Every parameter as `name -> {"value": v}`.
pub fn get_parameters(nbc: &NodeBootstrappingConfiguration) -> BTreeMap<String, Value> {
    let mut params = BTreeMap::new();
    let mut add = |name: &str, value: Value| {
        params.insert(name.to_string(), json!({ "value": value }));
    };

    let cs = &nbc.container_service;
    let properties = &cs.properties;
    let k8s = nbc.kubernetes_config().cloned().unwrap_or_default();
    let cloud = &nbc.cloud_spec_config.kubernetes_spec_config;
    let components = &nbc.k8s_components;

    add("location", json!(cs.location));
    if let Some(linux) = &properties.linux_profile {
        add("linuxAdminUsername", json!(linux.admin_username));
    }
    let dns_prefix = properties
        .hosted_master_profile
        .as_ref()
        .and_then(|master| {
            [&master.dns_prefix, &master.fqdn_subdomain]
                .iter()
                .find(|value| !value.is_empty())
                .map(|value| value.to_string())
        })
        .unwrap_or_else(|| DEFAULT_MASTER_DNS_PREFIX.to_string());
    add("masterEndpointDNSNamePrefix", json!(dns_prefix));
    add("vnetCidr", json!(constants::DEFAULT_VNET_CIDR));

    add("kubernetesVersion", json!(nbc.orchestrator_version()));
    add("kubeBinaryURL", json!(k8s.custom_kube_binary_url));
    add("kubeProxySpec", json!(k8s.custom_kube_proxy_image));
    add("kubernetesHyperkubeSpec", json!(components.hyperkube_image_url));
    let dns_service_ip = if k8s.dns_service_ip.is_empty() {
        constants::DEFAULT_KUBERNETES_DNS_SERVICE_IP.to_string()
    } else {
        k8s.dns_service_ip.clone()
    };
    add("kubeDNSServiceIP", json!(dns_service_ip));
    add("kubeClusterCidr", json!(k8s.cluster_subnet));
    add("dockerBridgeCidr", json!(k8s.docker_bridge_subnet));
    add("kubeServiceCidr", json!(k8s.service_cidr));

    add("networkPolicy", json!(k8s.network_policy));
    add("networkPlugin", json!(k8s.network_plugin));
    add("networkMode", json!(k8s.network_mode));
    let runtime = nbc.container_runtime();
    add("containerRuntime", json!(runtime));
    let cli_tool = if runtime == constants::CONTAINERD {
        "ctr"
    } else {
        constants::DOCKER
    };
    add("cliTool", json!(cli_tool));

    add(
        "containerdDownloadURLBase",
        json!(cloud.containerd_download_url_base),
    );
    add("containerdVersion", json!(nbc.containerd_version));
    add("runcVersion", json!(nbc.runc_version));
    add("runcPackageURL", json!(nbc.runc_package_url));
    add("containerdPackageURL", json!(nbc.containerd_package_url));
    add("teleportdPluginURL", json!(nbc.teleportd_plugin_url));

    let linux_cni = if nbc.is_arm64 {
        &cloud.vnet_cni_arm64_plugins_download_url
    } else {
        &cloud.vnet_cni_linux_plugins_download_url
    };
    add("vnetCniLinuxPluginsURL", json!(linux_cni));
    add(
        "vnetCniWindowsPluginsURL",
        json!(cloud.vnet_cni_windows_plugins_download_url),
    );
    add("cniPluginsURL", json!(cloud.cni_plugins_download_url));
    add(
        "linuxCredentialProviderURL",
        json!(components.linux_credential_provider_url),
    );

    if let Some(sp) = &properties.service_principal_profile {
        add("servicePrincipalClientId", json!(sp.client_id));
        add(
            "encodedServicePrincipalClientSecret",
            json!(base64_encode(&sp.secret)),
        );
    }
    if let Some(certs) = &properties.certificate_profile {
        add("caCertificate", json!(certs.ca_certificate));
        add("clientCertificate", json!(certs.client_certificate));
        add("clientPrivateKey", json!(certs.client_private_key));
        add("kubeConfigCertificate", json!(certs.kube_config_certificate));
        add("kubeConfigPrivateKey", json!(certs.kube_config_private_key));
    }

    if let Some(windows) = &properties.windows_profile {
        add("windowsDockerVersion", json!(windows.windows_docker_version));
        add("windowsCSIProxyURL", json!(windows.csi_proxy_url));
        add("windowsPauseImageURL", json!(windows.windows_pause_image_url));
        add("agentWindowsVersion", json!(windows.image_version));
    }
    add("windowsContainerdURL", json!(k8s.windows_containerd_url));
    add("windowsTelemetryGUID", json!(cloud.windows_telemetry_guid));
    add("windowsPackageURL", json!(components.windows_package_url));
    add(
        "windowsCredentialProviderURL",
        json!(components.windows_credential_provider_url),
    );

    params
}

#[cfg(test)]
mod test {
    use super::*;
    use datamodel::nbc::{
        HostedMasterProfile, KubernetesConfig, OrchestratorProfile, ServicePrincipalProfile,
    };

    fn value<'a>(params: &'a BTreeMap<String, Value>, name: &str) -> &'a Value {
        &params[name]["value"]
    }

    #[test]
    fn test_get_parameters() {
        let mut nbc = NodeBootstrappingConfiguration::default();
        nbc.container_service.location = "westus2".to_string();
        nbc.container_service.properties.orchestrator_profile = Some(OrchestratorProfile {
            orchestrator_type: constants::KUBERNETES.to_string(),
            orchestrator_version: "1.31.0".to_string(),
            kubernetes_config: Some(KubernetesConfig {
                network_plugin: constants::NETWORK_PLUGIN_AZURE.to_string(),
                ..Default::default()
            }),
        });
        nbc.container_service.properties.service_principal_profile =
            Some(ServicePrincipalProfile {
                client_id: "msi".to_string(),
                secret: "s3cret".to_string(),
            });
        nbc.is_arm64 = true;
        nbc.cloud_spec_config
            .kubernetes_spec_config
            .vnet_cni_arm64_plugins_download_url = "https://arm64".to_string();
        nbc.containerd_version = "1.7.20".to_string();

        let params = get_parameters(&nbc);
        assert_eq!(value(&params, "location"), "westus2");
        assert_eq!(value(&params, "kubernetesVersion"), "1.31.0");
        assert_eq!(value(&params, "masterEndpointDNSNamePrefix"), "localcluster");
        assert_eq!(value(&params, "kubeDNSServiceIP"), "10.0.0.10");
        assert_eq!(value(&params, "cliTool"), "ctr");
        assert_eq!(value(&params, "vnetCniLinuxPluginsURL"), "https://arm64");
        assert_eq!(value(&params, "containerdVersion"), "1.7.20");
        assert_eq!(
            value(&params, "encodedServicePrincipalClientSecret"),
            "czNjcmV0"
        );
        assert!(!params.contains_key("caCertificate"));
    }

    #[test]
    fn test_dns_prefix_falls_back_to_fqdn_subdomain() {
        let mut nbc = NodeBootstrappingConfiguration::default();
        nbc.container_service.properties.hosted_master_profile = Some(HostedMasterProfile {
            fqdn_subdomain: "sub".to_string(),
            ..Default::default()
        });
        assert_eq!(
            value(&get_parameters(&nbc), "masterEndpointDNSNamePrefix"),
            "sub"
        );
    }
}

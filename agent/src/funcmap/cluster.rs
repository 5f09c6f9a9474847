//! Orchestrator, identity, certificate and custom cloud functions.
use super::{k8s_field, k8s_flag, string_arg, Registry};
use crate::components::component_images;
use crate::encoding::base64_encode;
use datamodel::cloud::get_cloud_target_env;
use datamodel::constants;
use datamodel::nbc::CustomCloudEnv;
use datamodel::version::is_kubernetes_version_ge;
use datamodel::NodeBootstrappingConfiguration;
use serde_json::Value;

const IDENTITY_SYSTEM_AZURE_AD: &str = "azure_ad";

fn custom_cloud(nbc: &NodeBootstrappingConfiguration) -> Option<&CustomCloudEnv> {
    nbc.container_service.properties.custom_cloud_env.as_ref()
}

/// Registers a getter over one field of the custom cloud environment.
macro_rules! custom_cloud_getters {
    ($registry:expr, $( $name:literal => |$env:ident| $field:expr, )*) => {
        $(
            $registry.add($name, |s| {
                custom_cloud(&s.nbc)
                    .map(|$env| $field.clone())
                    .unwrap_or_default()
            });
        )*
    };
}

fn image_base(nbc: &NodeBootstrappingConfiguration) -> String {
    let base = k8s_field(nbc, |k| &k.mcr_kubernetes_image_base);
    if base.is_empty() {
        nbc.cloud_spec_config
            .kubernetes_spec_config
            .mcr_kubernetes_image_base
            .clone()
    } else {
        base.to_string()
    }
}

pub(super) fn register(registry: &mut Registry) {
    registry.add("IsKubernetes", |s| s.nbc.is_kubernetes());
    registry.add_with_args("IsKubernetesVersionGe", |s, args| {
        let version = string_arg("IsKubernetesVersionGe", args, 0)?;
        Ok(is_kubernetes_version_ge(s.nbc.orchestrator_version(), version).into())
    });
    registry.add_with_args("IsKubernetesVersionLt", |s, args| {
        let version = string_arg("IsKubernetesVersionLt", args, 0)?;
        Ok((!is_kubernetes_version_ge(s.nbc.orchestrator_version(), version)).into())
    });
    registry.add("IsAzureStackCloud", |s| {
        s.nbc.cloud_spec_config.cloud_name == constants::AZURE_STACK_CLOUD
    });
    registry.add("IsAKSCustomCloud", |s| s.nbc.is_aks_custom_cloud());
    registry.add("GetLocation", |s| s.nbc.container_service.location.clone());
    registry.add("GetTargetEnvironment", |s| match custom_cloud(&s.nbc) {
        Some(env) if s.nbc.is_aks_custom_cloud() => env.name.clone(),
        _ => get_cloud_target_env(&s.nbc.container_service.location).to_string(),
    });
    registry.add("GetKubernetesEndpoint", |s| {
        s.nbc
            .container_service
            .properties
            .hosted_master_profile
            .as_ref()
            .map(|master| {
                if master.ip_address.is_empty() {
                    master.fqdn.clone()
                } else {
                    master.ip_address.clone()
                }
            })
            .unwrap_or_default()
    });
    registry.add("GetIdentitySystem", |_| IDENTITY_SYSTEM_AZURE_AD);
    registry.add("HasTelemetryEnabled", |s| s.nbc.feature_flags().enable_telemetry);

    registry.add("IsPrivateCluster", |s| {
        s.nbc
            .kubernetes_config()
            .and_then(|k| k.private_cluster.as_ref())
            .and_then(|private| private.enabled)
            .unwrap_or(false)
    });
    registry.add("IsIPMasqAgentEnabled", |s| {
        s.nbc
            .container_service
            .properties
            .hosted_master_profile
            .as_ref()
            .map(|master| master.ip_masq_agent)
            .unwrap_or(false)
    });
    // Hosted control planes keep etcd off the nodes.
    registry.add("HasCosmosEtcd", |_| false);
    registry.add("EnableDataEncryptionAtRest", |s| {
        k8s_flag(&s.nbc, |k| k.enable_data_encryption_at_rest)
    });
    registry.add("EnableEncryptionWithExternalKms", |s| {
        k8s_flag(&s.nbc, |k| k.enable_encryption_with_external_kms)
    });
    registry.add("EnableAggregatedAPIs", |s| {
        k8s_flag(&s.nbc, |k| k.enable_aggregated_apis)
    });
    registry.add("EnablePodSecurityPolicy", |s| {
        k8s_flag(&s.nbc, |k| k.enable_pod_security_policy)
    });
    registry.add("UseCloudControllerManager", |s| {
        k8s_flag(&s.nbc, |k| k.use_cloud_controller_manager)
    });
    registry.add("UseManagedIdentity", |s| {
        s.nbc
            .kubernetes_config()
            .map(|k| k.use_managed_identity)
            .unwrap_or(false)
    });
    registry.add("AdminGroupID", |s| {
        s.nbc
            .container_service
            .properties
            .aad_profile
            .as_ref()
            .map(|aad| !aad.admin_group_id.is_empty())
            .unwrap_or(false)
    });
    registry.add("HasLinuxSecrets", |s| {
        s.nbc
            .container_service
            .properties
            .linux_profile
            .as_ref()
            .map(|linux| !linux.secrets.is_empty())
            .unwrap_or(false)
    });
    registry.add("HasWindowsSecrets", |s| {
        s.nbc
            .container_service
            .properties
            .windows_profile
            .as_ref()
            .map(|windows| !windows.secrets.is_empty())
            .unwrap_or(false)
    });

    let private_registry = |s: &crate::snapshot::Snapshot| {
        !k8s_field(&s.nbc, |k| &k.private_azure_registry_server).is_empty()
    };
    registry.add("HasPrivateRegistry", private_registry);
    registry.add("HasPrivateAzureRegistryServer", private_registry);
    registry.add("GetPrivateAzureRegistryServer", |s| {
        k8s_field(&s.nbc, |k| &k.private_azure_registry_server).to_string()
    });

    registry.add("GetPodInfraContainerSpec", |s| {
        s.nbc.k8s_components.pod_infra_container_image_url.clone()
    });
    registry.add_with_args("GetComponentImageReference", |s, args| {
        let component = string_arg("GetComponentImageReference", args, 0)?;
        let images = component_images(s.nbc.orchestrator_version());
        Ok(match images.get(component) {
            Some(image) => Value::String(format!("{}{}", image_base(&s.nbc), image)),
            None => Value::String(String::new()),
        })
    });
    registry.add("GetHyperkubeImageReference", |s| {
        let custom = k8s_field(&s.nbc, |k| &k.custom_hyperkube_image);
        if custom.is_empty() {
            s.nbc.k8s_components.hyperkube_image_url.clone()
        } else {
            custom.to_string()
        }
    });

    registry.add("GetBase64EncodedEnvironmentJSON", |s| {
        s.environment_json.clone()
    });
    registry.add("GetBase64CertificateAuthorityData", |s| {
        s.nbc
            .container_service
            .properties
            .certificate_profile
            .as_ref()
            .map(|certs| certs.ca_certificate.as_str())
            .filter(|ca| !ca.is_empty())
            .map(base64_encode)
            .unwrap_or_default()
    });
    registry.add("EnableSecureTLSBootstrapping", |s| {
        s.nbc.enable_secure_tls_bootstrapping
    });
    registry.add("GetTLSBootstrapTokenForKubeConfig", |s| {
        s.nbc
            .kubelet_client_tls_bootstrap_token
            .clone()
            .unwrap_or_default()
    });
    registry.add("FIPSEnabled", |s| s.nbc.fips_enabled);

    registry.add("GetCustomCloudConfigCSEScriptFilepath", |_| {
        constants::INIT_AKS_CUSTOM_CLOUD_FILEPATH
    });
    registry.add("GetInitAKSCustomCloudFilepath", |_| {
        constants::INIT_AKS_CUSTOM_CLOUD_FILEPATH
    });
    custom_cloud_getters! {
        registry,
        "AKSCustomCloudRepoDepotEndpoint" => |env| env.repo_depot_endpoint,
        "AKSCustomCloudManagementPortalURL" => |env| env.management_portal_url,
        "AKSCustomCloudPublishSettingsURL" => |env| env.publish_settings_url,
        "AKSCustomCloudServiceManagementEndpoint" => |env| env.service_management_endpoint,
        "AKSCustomCloudResourceManagerEndpoint" => |env| env.resource_manager_endpoint,
        "AKSCustomCloudActiveDirectoryEndpoint" => |env| env.active_directory_endpoint,
        "AKSCustomCloudGalleryEndpoint" => |env| env.gallery_endpoint,
        "AKSCustomCloudKeyVaultEndpoint" => |env| env.key_vault_endpoint,
        "AKSCustomCloudGraphEndpoint" => |env| env.graph_endpoint,
        "AKSCustomCloudServiceBusEndpoint" => |env| env.service_bus_endpoint,
        "AKSCustomCloudBatchManagementEndpoint" => |env| env.batch_management_endpoint,
        "AKSCustomCloudStorageEndpointSuffix" => |env| env.storage_endpoint_suffix,
        "AKSCustomCloudSqlDatabaseDNSSuffix" => |env| env.sql_database_dns_suffix,
        "AKSCustomCloudTrafficManagerDNSSuffix" => |env| env.traffic_manager_dns_suffix,
        "AKSCustomCloudKeyVaultDNSSuffix" => |env| env.key_vault_dns_suffix,
        "AKSCustomCloudServiceBusEndpointSuffix" => |env| env.service_bus_endpoint_suffix,
        "AKSCustomCloudServiceManagementVMDNSSuffix" => |env| env.service_management_vm_dns_suffix,
        "AKSCustomCloudResourceManagerVMDNSSuffix" => |env| env.resource_manager_vm_dns_suffix,
        "AKSCustomCloudContainerRegistryDNSSuffix" => |env| env.container_registry_dns_suffix,
        "AKSCustomCloudCosmosDBDNSSuffix" => |env| env.cosmos_db_dns_suffix,
        "AKSCustomCloudTokenAudience" => |env| env.token_audience,
        "AKSCustomCloudResourceIdentifierGraph" => |env| env.resource_identifiers.graph,
        "AKSCustomCloudResourceIdentifierKeyVault" => |env| env.resource_identifiers.key_vault,
        "AKSCustomCloudResourceIdentifierDatalake" => |env| env.resource_identifiers.datalake,
        "AKSCustomCloudResourceIdentifierBatch" => |env| env.resource_identifiers.batch,
        "AKSCustomCloudResourceIdentifierOperationalInsights" => |env| env.resource_identifiers.operational_insights,
        "AKSCustomCloudResourceIdentifierStorage" => |env| env.resource_identifiers.storage,
    }
}

#[cfg(test)]
mod test {
    use super::super::test::{expand, nbc};
    use super::*;
    use datamodel::nbc::{AadProfile, CertificateProfile};

    #[test]
    fn test_version_predicates() {
        let test_cases = vec![
            ("{{IsKubernetesVersionGe \"1.31.0\"}}", "true"),
            ("{{IsKubernetesVersionGe \"1.32\"}}", "false"),
            ("{{IsKubernetesVersionLt \"1.32\"}}", "true"),
            ("{{IsKubernetes}}", "true"),
        ];
        for (src, expected) in test_cases {
            assert_eq!(expand(nbc(), src), expected, "{}", src);
        }
    }

    #[test]
    fn test_cluster_getters() {
        let mut input = nbc();
        input.container_service.properties.aad_profile = Some(AadProfile {
            admin_group_id: "group".to_string(),
            ..Default::default()
        });
        input.container_service.properties.certificate_profile = Some(CertificateProfile {
            ca_certificate: "ca".to_string(),
            ..Default::default()
        });
        input.k8s_components.hyperkube_image_url = "hyperkube:v1.31.0".to_string();
        let test_cases = vec![
            ("{{GetLocation}}", "southcentralus"),
            ("{{GetTargetEnvironment}}", "AzurePublicCloud"),
            ("{{GetIdentitySystem}}", "azure_ad"),
            ("{{AdminGroupID}}", "true"),
            ("{{GetBase64CertificateAuthorityData}}", "Y2E="),
            ("{{GetHyperkubeImageReference}}", "hyperkube:v1.31.0"),
            ("{{IsPrivateCluster}}", "false"),
            ("{{HasPrivateRegistry}}", "false"),
            ("{{GetTLSBootstrapTokenForKubeConfig}}", ""),
        ];
        for (src, expected) in test_cases {
            assert_eq!(expand(input.clone(), src), expected, "{}", src);
        }
    }

    #[test]
    fn test_component_image_reference() {
        let mut input = nbc();
        input
            .cloud_spec_config
            .kubernetes_spec_config
            .mcr_kubernetes_image_base = "mcr.microsoft.com/".to_string();
        assert_eq!(
            expand(input.clone(), "{{GetComponentImageReference \"kube-proxy\"}}"),
            "mcr.microsoft.com/kube-proxy:v1.31.0"
        );
        assert_eq!(
            expand(input, "{{GetComponentImageReference \"unknown\"}}"),
            ""
        );
    }

    #[test]
    fn test_custom_cloud_getters() {
        let mut input = nbc();
        assert_eq!(expand(input.clone(), "{{AKSCustomCloudRepoDepotEndpoint}}"), "");
        input.container_service.properties.custom_cloud_env = Some(CustomCloudEnv {
            name: "akscustom".to_string(),
            repo_depot_endpoint: "https://repodepot".to_string(),
            ..Default::default()
        });
        assert_eq!(
            expand(input.clone(), "{{AKSCustomCloudRepoDepotEndpoint}}"),
            "https://repodepot"
        );
        assert_eq!(expand(input.clone(), "{{IsAKSCustomCloud}}"), "true");
        assert_eq!(expand(input, "{{GetTargetEnvironment}}"), "akscustom");
    }
}

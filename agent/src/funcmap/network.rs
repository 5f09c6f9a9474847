//! Network plugin, proxy, CA trust and outbound policy functions.
use super::{k8s_field, Registry};
use crate::proxy;
use crate::snapshot::Snapshot;
use datamodel::constants;
use datamodel::nbc::CustomSearchDomain;
use datamodel::NodeBootstrappingConfiguration;
use serde_json::Value;

fn network_plugin(nbc: &NodeBootstrappingConfiguration) -> &str {
    k8s_field(nbc, |k| &k.network_plugin)
}

fn network_policy(nbc: &NodeBootstrappingConfiguration) -> &str {
    k8s_field(nbc, |k| &k.network_policy)
}

fn custom_search_domain(nbc: &NodeBootstrappingConfiguration) -> Option<&CustomSearchDomain> {
    nbc.container_service
        .properties
        .linux_profile
        .as_ref()
        .and_then(|linux| linux.custom_search_domain.as_ref())
}

/// Whether the node must not reach the internet during bootstrap.
pub fn block_outbound_network(nbc: &NodeBootstrappingConfiguration) -> bool {
    nbc.outbound_type == constants::OUTBOUND_TYPE_BLOCK
        || nbc.outbound_type == constants::OUTBOUND_TYPE_NONE
}

/// The connectivity check against the node's container registry. Empty when the
/// `BlockOutboundInternet` feature flag is set or the custom cloud names no registry.
pub fn outbound_command(nbc: &NodeBootstrappingConfiguration) -> String {
    if nbc.feature_flags().block_outbound_internet {
        return String::new();
    }
    let registry = if nbc.cloud_spec_config.cloud_name == constants::AZURE_CHINA_CLOUD {
        constants::MCR_CHINA_ENDPOINT.to_string()
    } else if nbc.is_aks_custom_cloud() {
        nbc.container_service
            .properties
            .custom_cloud_env
            .as_ref()
            .map(|env| env.mcr_url.clone())
            .unwrap_or_default()
    } else {
        constants::MCR_ENDPOINT.to_string()
    };
    if registry.is_empty() {
        return String::new();
    }
    format!(
        "retrycmd_if_failure 50 1 5 nc -vz {} 443 || exit {}",
        registry,
        constants::ERR_OUTBOUND_CONN_FAIL
    )
}

fn proxy_config(s: &Snapshot) -> Option<&datamodel::nbc::HttpProxyConfig> {
    s.nbc.http_proxy_config.as_ref()
}

pub(super) fn register(registry: &mut Registry) {
    registry.add("IsKubenet", |s| {
        network_plugin(&s.nbc) == constants::NETWORK_PLUGIN_KUBENET
    });
    registry.add("IsAzureCNI", |s| {
        network_plugin(&s.nbc) == constants::NETWORK_PLUGIN_AZURE
    });
    registry.add("IsNoneCNI", |s| {
        network_plugin(&s.nbc) == constants::NETWORK_PLUGIN_NONE
    });
    registry.add("HasFlannelNetworkPlugin", |s| {
        network_plugin(&s.nbc) == constants::NETWORK_PLUGIN_FLANNEL
    });
    registry.add("HasCiliumNetworkPlugin", |s| {
        network_plugin(&s.nbc) == constants::NETWORK_PLUGIN_CILIUM
    });
    registry.add("HasAntreaNetworkPolicy", |s| {
        network_policy(&s.nbc) == constants::NETWORK_POLICY_ANTREA
    });
    registry.add("IsAzureCNIOverlayFeatureEnabled", |s| {
        network_plugin(&s.nbc) == constants::NETWORK_PLUGIN_AZURE
            && k8s_field(&s.nbc, |k| &k.network_plugin_mode) == constants::NETWORK_PLUGIN_MODE_OVERLAY
    });
    registry.add("CiliumDataplaneEnabled", |s| {
        k8s_field(&s.nbc, |k| &k.ebpf_dataplane) == constants::NETWORK_DATAPLANE_CILIUM
    });
    registry.add("IsIPv6DualStackFeatureEnabled", |s| {
        s.nbc.feature_flags().enable_ipv6_dual_stack
    });
    registry.add("IsCustomVNET", |s| s.nbc.agent_pool_profile.is_custom_vnet());
    registry.add("GetDefaultVNETCIDR", |_| constants::DEFAULT_VNET_CIDR);
    registry.add("GetDefaultVNETCIDRIPv6", |_| constants::DEFAULT_VNET_CIDR_IPV6);

    registry.add("HasCustomSearchDomain", |s| {
        custom_search_domain(&s.nbc)
            .map(|domain| !domain.name.is_empty())
            .unwrap_or(false)
    });
    registry.add("GetSearchDomainName", |s| {
        custom_search_domain(&s.nbc).map(|d| d.name.clone()).unwrap_or_default()
    });
    registry.add("GetSearchDomainRealmUser", |s| {
        custom_search_domain(&s.nbc)
            .map(|d| d.realm_user.clone())
            .unwrap_or_default()
    });
    registry.add("GetSearchDomainRealmPassword", |s| {
        custom_search_domain(&s.nbc)
            .map(|d| d.realm_password.clone())
            .unwrap_or_default()
    });
    registry.add("HasCustomNodesDNS", |s| {
        s.nbc
            .container_service
            .properties
            .linux_profile
            .as_ref()
            .and_then(|linux| linux.custom_nodes_dns.as_ref())
            .map(|dns| !dns.dns_server.is_empty())
            .unwrap_or(false)
    });
    registry.add("GetCustomSearchDomainsCSEScriptFilepath", |_| {
        constants::CUSTOM_SEARCH_DOMAINS_CSE_SCRIPT_FILEPATH
    });
    registry.add("GetDHCPv6ServiceCSEScriptFilepath", |_| {
        constants::DHCPV6_SERVICE_CSE_SCRIPT_FILEPATH
    });
    registry.add("GetDHCPv6ConfigCSEScriptFilepath", |_| {
        constants::DHCPV6_CONFIG_CSE_SCRIPT_FILEPATH
    });

    registry.add("ShouldConfigureHTTPProxy", |s| {
        proxy::should_configure_http_proxy(proxy_config(s))
    });
    registry.add("ShouldConfigureHTTPProxyCA", |s| {
        proxy::should_configure_http_proxy_ca(proxy_config(s))
    });
    registry.add("HasHTTPProxy", |s| proxy::http_proxy(proxy_config(s)).is_some());
    registry.add("HasHTTPSProxy", |s| proxy::https_proxy(proxy_config(s)).is_some());
    registry.add("HasNoProxy", |s| proxy::no_proxy(proxy_config(s)).is_some());
    registry.add("GetHTTPProxy", |s| {
        proxy::http_proxy(proxy_config(s))
            .unwrap_or_default()
            .to_string()
    });
    registry.add("GetHTTPSProxy", |s| {
        proxy::https_proxy(proxy_config(s))
            .unwrap_or_default()
            .to_string()
    });
    registry.add("GetNoProxy", |s| {
        proxy::no_proxy(proxy_config(s)).unwrap_or_default()
    });
    registry.add("GetHTTPProxyCA", |s| {
        proxy::trusted_ca(proxy_config(s)).unwrap_or_default()
    });
    registry.add("GetProxyVariables", |s| {
        proxy::proxy_variables(proxy_config(s))
    });
    registry.add("ShouldConfigureCustomCATrust", |s| {
        proxy::should_configure_custom_ca_trust(s.nbc.custom_ca_trust_config.as_ref())
    });
    registry.add("GetCustomCATrustConfigCerts", |s| {
        Value::Array(
            proxy::custom_ca_trust_certs(s.nbc.custom_ca_trust_config.as_ref())
                .into_iter()
                .map(Value::String)
                .collect(),
        )
    });

    registry.add("GetOutboundCommand", |s| outbound_command(&s.nbc));
    registry.add("BlockOutboundNetwork", |s| block_outbound_network(&s.nbc));
    registry.add("EnableIMDSRestriction", |s| s.nbc.enable_imds_restriction);
    registry.add("InsertIMDSRestrictionRuleToMangleTable", |s| {
        s.nbc.insert_imds_restriction_rule_to_mangle_table
    });
}

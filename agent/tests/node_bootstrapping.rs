//! End-to-end derivation of node bootstrapping artifacts.
use agentbaker::{AgentBaker, Context, Error, NodeBootstrapping, Toggles};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use datamodel::constants;
use datamodel::kubelet::CustomKubeletConfig;
use datamodel::nbc::{
    CustomCaTrustConfig, CustomCloudEnv, FeatureFlags, HttpProxyConfig, KubernetesConfig,
    OrchestratorProfile,
};
use datamodel::{Distro, EnvironmentInfo, NodeBootstrappingConfiguration, SigConfig};
use flate2::read::GzDecoder;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Read;
use toml_edit::Document;

const PROVISION_SCRIPT: &str = "/opt/azure/containers/provision.sh";
const DOCKER_DAEMON_JSON: &str = "/etc/docker/daemon.json";
const WAIT_FOR_PROVISION_SCRIPT: &str = "for i in $(seq 1 1200); do grep -Fq \"EOF\" /opt/azure/containers/provision.sh && break; if [ $i -eq 1200 ]; then exit 100; else sleep 1; fi; done;";
const RUN_PROVISION_SCRIPT: &str = "/usr/bin/nohup /bin/bash -c \"/bin/bash /opt/azure/containers/provision.sh >> /var/log/azure/cluster-provision.log 2>&1\"";

const TEST_CERT: &str = "-----BEGIN CERTIFICATE-----
MIIBszCCAVmgAwIBAgIUEb9JhRHJ3Lh2Yl0mOCbPm9TNp+4wCgYIKoZIzj0EAwIw
FjEUMBIGA1UEAwwLZXhhbXBsZS5jb20wHhcNMjQwMTAxMDAwMDAwWhcNMzQwMTAx
MDAwMDAwWjAWMRQwEgYDVQQDDAtleGFtcGxlLmNvbTBZMBMGByqGSM49AgEGCCqG
SM49AwEHA0IABGx1c2VyLWNlcnQtZm9yLXRlc3RzLW9ubHktbm90LWEtcmVhbC1r
ZXktbWF0ZXJpYWwtMDEyMzQ1Njc4OWFiY2RlZqNTMFEwHQYDVR0OBBYEFAAAAAAA
-----END CERTIFICATE-----
";

fn nbc(distro: Distro, version: &str) -> NodeBootstrappingConfiguration {
    let mut nbc = NodeBootstrappingConfiguration::default();
    nbc.container_service.location = "southcentralus".to_string();
    nbc.container_service.properties.orchestrator_profile = Some(OrchestratorProfile {
        orchestrator_type: constants::KUBERNETES.to_string(),
        orchestrator_version: version.to_string(),
        kubernetes_config: Some(KubernetesConfig {
            network_plugin: "kubenet".to_string(),
            ..Default::default()
        }),
    });
    nbc.agent_pool_profile.name = "nodepool1".to_string();
    nbc.agent_pool_profile.vm_size = "Standard_DS2_v2".to_string();
    nbc.agent_pool_profile.distro = distro;
    nbc.tenant_id = "tenant".to_string();
    nbc.subscription_id = "sub".to_string();
    nbc.resource_group_name = "rg".to_string();
    nbc.kubelet_config = maplit::btreemap! {
        "--cluster-dns".to_string() => "10.0.0.10".to_string(),
        "--max-pods".to_string() => "110".to_string(),
        "--node-labels".to_string() => "agentpool=nodepool1".to_string(),
    };
    nbc
}

fn ubuntu() -> NodeBootstrappingConfiguration {
    nbc(Distro::AKSUbuntuContainerd2204Gen2, "1.31.0")
}

fn bake(nbc: &NodeBootstrappingConfiguration) -> NodeBootstrapping {
    AgentBaker::new(Toggles::new())
        .get_node_bootstrapping(&Context::background(), nbc)
        .unwrap()
}

fn gunzip(bytes: &[u8]) -> String {
    let mut out = String::new();
    GzDecoder::new(bytes).read_to_string(&mut out).unwrap();
    out
}

fn decode_base64(text: &str) -> Vec<u8> {
    let compact: String = text.split_whitespace().collect();
    STANDARD.decode(compact).unwrap()
}

/// The cloud-init document inside Linux custom data.
fn cloud_init(bootstrapping: &NodeBootstrapping) -> serde_yaml::Value {
    let yaml = gunzip(&decode_base64(&bootstrapping.custom_data));
    serde_yaml::from_str(&yaml).unwrap()
}

/// The decoded content of the cloud-init write-file at `path`.
fn write_file(doc: &serde_yaml::Value, path: &str) -> Option<String> {
    let files = doc["write_files"].as_sequence()?;
    let file = files.iter().find(|f| f["path"].as_str() == Some(path))?;
    let content = file["content"].as_str().unwrap_or_default();
    let decoded = match file["encoding"].as_str() {
        Some("gz+b64") => gunzip(&decode_base64(content)),
        Some("base64") => String::from_utf8(decode_base64(content)).unwrap(),
        _ => content.to_string(),
    };
    Some(decoded)
}

/// Reads `NAME="value"` out of the one-line CSE command.
fn cse_variable(cse: &str, name: &str) -> Option<String> {
    let marker = format!(" {}=\"", name);
    let start = cse.find(&marker)? + marker.len();
    let end = cse[start..].find('"')? + start;
    Some(cse[start..end].to_string())
}

fn decoded_cse_variable(cse: &str, name: &str) -> String {
    let value = cse_variable(cse, name).unwrap();
    String::from_utf8(STANDARD.decode(value).unwrap()).unwrap()
}

fn kubelet_config_file(cse: &str) -> Value {
    serde_json::from_str(&decoded_cse_variable(cse, "KUBELET_CONFIG_FILE_CONTENT")).unwrap()
}

fn containerd_config(cse: &str, name: &str) -> Document {
    decoded_cse_variable(cse, name).parse::<Document>().unwrap()
}

#[test]
fn test_derivation_is_deterministic_and_isolated() {
    let mut input = ubuntu();
    let first = bake(&input);
    let copy = bake(&input.clone());
    let second = bake(&input);
    assert_eq!(first, copy);
    assert_eq!(first, second);

    let snapshot = first.clone();
    input.agent_pool_profile.name = "changed".to_string();
    input.kubelet_config.clear();
    assert_eq!(first, snapshot);
    assert_ne!(bake(&input).cse, first.cse);
}

#[test]
fn test_cse_does_not_depend_on_custom_data() {
    let input = ubuntu();
    let mut without_custom_data = input.clone();
    without_custom_data.disable_custom_data = true;
    let full = bake(&input);
    let cse_only = bake(&without_custom_data);
    assert_eq!(cse_only.custom_data, "");
    assert_eq!(full.cse, cse_only.cse);
}

#[test]
fn test_dynamic_config_dir_is_never_emitted() {
    let mut input = ubuntu();
    input
        .kubelet_config
        .insert("--dynamic-config-dir".to_string(), "/var/lib/kubelet".to_string());
    input.enable_dynamic_kubelet = true;
    let result = bake(&input);
    assert!(!result.cse.contains("--dynamic-config-dir"));
    assert!(!kubelet_config_file(&result.cse)
        .to_string()
        .contains("dynamic-config-dir"));
    let provision = write_file(&cloud_init(&result), PROVISION_SCRIPT).unwrap();
    assert!(!provision.contains("--dynamic-config-dir"));
}

#[test]
fn test_serving_certificate_rotation() {
    let test_cases = vec![(Some("true"), true), (Some("false"), false), (None, false)];
    for (flag, enabled) in test_cases {
        let mut input = ubuntu();
        if let Some(flag) = flag {
            input
                .kubelet_config
                .insert("--rotate-server-certificates".to_string(), flag.to_string());
        }
        let cse = bake(&input).cse;
        let file = kubelet_config_file(&cse);
        assert_eq!(
            cse_variable(&cse, "ENABLE_KUBELET_SERVING_CERTIFICATE_ROTATION").as_deref(),
            Some(if enabled { "true" } else { "false" }),
            "{:?}",
            flag
        );
        if enabled {
            assert_eq!(file["serverTLSBootstrap"], true);
        } else {
            assert!(file.get("serverTLSBootstrap").is_none(), "{:?}", flag);
        }
    }
}

#[test]
fn test_custom_kubelet_config_overrides() {
    let mut input = ubuntu();
    input.agent_pool_profile.custom_kubelet_config = Some(CustomKubeletConfig {
        cpu_cfs_quota_period: "200ms".to_string(),
        container_log_max_size_mb: Some(1000),
        ..Default::default()
    });
    let file = kubelet_config_file(&bake(&input).cse);
    assert_eq!(file["cpuCFSQuotaPeriod"], "200ms");
    assert_eq!(file["featureGates"]["CustomCPUCFSQuotaPeriod"], true);
    assert_eq!(file["containerLogMaxSize"], "1000M");
}

#[test]
fn test_serialize_image_pulls_in_flags_and_file() {
    let mut input = ubuntu();
    input
        .kubelet_config
        .insert("--serialize-image-pulls".to_string(), "false".to_string());
    let cse = bake(&input).cse;
    assert!(cse_variable(&cse, "KUBELET_FLAGS")
        .unwrap()
        .contains("--serialize-image-pulls=false"));
    assert!(decoded_cse_variable(&cse, "KUBELET_CONFIG_FILE_CONTENT")
        .contains("\"serializeImagePulls\": false"));
}

#[test]
fn test_containerd_schema_follows_kubernetes_version() {
    let v3 = bake(&nbc(Distro::AKSUbuntuContainerd2404, "1.32.0")).cse;
    let content = decoded_cse_variable(&v3, "CONTAINERD_CONFIG_CONTENT");
    assert!(content.contains("version = 3"));
    assert!(content.contains("io.containerd.cri.v1.runtime"));
    assert!(!content.contains("io.containerd.grpc.v1.cri"));

    let v2 = bake(&ubuntu()).cse;
    let doc = containerd_config(&v2, "CONTAINERD_CONFIG_CONTENT");
    assert_eq!(doc["version"].as_integer(), Some(2));
    assert!(doc["plugins"].get("io.containerd.grpc.v1.cri").is_some());
    assert!(doc["plugins"].get("io.containerd.cri.v1.runtime").is_none());
}

#[test]
fn test_teleport_snapshotter_on_v3() {
    let mut input = nbc(Distro::AKSUbuntuContainerd2404, "1.32.0");
    input.enable_acr_teleport_plugin = true;
    let cse = bake(&input).cse;
    let content = decoded_cse_variable(&cse, "CONTAINERD_CONFIG_CONTENT");
    assert!(content.contains("version = 3"));
    assert!(content.contains("snapshotter = \"teleportd\""));

    let doc = content.parse::<Document>().unwrap();
    let images = &doc["plugins"]["io.containerd.cri.v1.images"];
    assert_eq!(images["snapshotter"].as_str(), Some("teleportd"));
    assert_eq!(images["disable_snapshot_annotations"].as_bool(), Some(false));
}

#[test]
fn test_artifact_streaming_snapshotter() {
    let mut input = ubuntu();
    input.enable_artifact_streaming = true;
    let doc = containerd_config(&bake(&input).cse, "CONTAINERD_CONFIG_CONTENT");
    let containerd = &doc["plugins"]["io.containerd.grpc.v1.cri"]["containerd"];
    assert_eq!(containerd["snapshotter"].as_str(), Some("overlaybd"));
    assert_eq!(doc["proxy_plugins"]["overlaybd"]["type"].as_str(), Some("snapshot"));
    assert_eq!(
        doc["proxy_plugins"]["overlaybd"]["address"].as_str(),
        Some("/run/overlaybd-snapshotter/overlaybd.sock")
    );
}

#[test]
fn test_mig_pool_has_gpu_free_containerd_config() {
    let mut input = ubuntu();
    input.agent_pool_profile.vm_size = "Standard_ND96asr_v4".to_string();
    input.gpu_instance_profile = "MIG1g".to_string();
    let cse = bake(&input).cse;
    assert_eq!(cse_variable(&cse, "MIG_NODE").as_deref(), Some("true"));

    let with_gpu = decoded_cse_variable(&cse, "CONTAINERD_CONFIG_CONTENT");
    let without_gpu = decoded_cse_variable(&cse, "CONTAINERD_CONFIG_NO_GPU_CONTENT");
    assert!(with_gpu.contains("nvidia"));
    assert!(!without_gpu.contains("nvidia"));
    let doc = without_gpu.parse::<Document>().unwrap();
    assert_eq!(
        doc["plugins"]["io.containerd.grpc.v1.cri"]["containerd"]["default_runtime_name"].as_str(),
        Some("runc")
    );
}

#[test]
fn test_outbound_and_imds_variables() {
    let test_cases = vec![
        ("block", "true"),
        ("none", "true"),
        ("loadBalancer", "false"),
        ("", "false"),
    ];
    for (outbound_type, expected) in test_cases {
        let mut input = ubuntu();
        input.outbound_type = outbound_type.to_string();
        let cse = bake(&input).cse;
        assert_eq!(
            cse_variable(&cse, "BLOCK_OUTBOUND_NETWORK").as_deref(),
            Some(expected),
            "{}",
            outbound_type
        );
    }

    let mut input = ubuntu();
    input.enable_imds_restriction = true;
    input.insert_imds_restriction_rule_to_mangle_table = true;
    let cse = bake(&input).cse;
    assert_eq!(cse_variable(&cse, "ENABLE_IMDS_RESTRICTION").as_deref(), Some("true"));
    assert_eq!(
        cse_variable(&cse, "INSERT_IMDS_RESTRICTION_RULE_TO_MANGLE_TABLE").as_deref(),
        Some("true")
    );
}

#[test]
fn test_linux_cse_layout() {
    let test_cases = vec![
        ("", false, Some("nc -vz mcr.microsoft.com 443")),
        ("AzureChinaCloud", false, Some("nc -vz gcr.azk8s.cn 443")),
        ("", true, None),
        ("AzureChinaCloud", true, None),
    ];
    for (cloud, block_internet, connectivity_check) in test_cases {
        let mut input = ubuntu();
        input.cloud_spec_config.cloud_name = cloud.to_string();
        input.container_service.properties.feature_flags = Some(FeatureFlags {
            block_outbound_internet: block_internet,
            ..Default::default()
        });
        let cse = bake(&input).cse;
        assert!(cse.starts_with("echo $(date),$(hostname);"), "{}", cse);
        assert!(!cse.contains('\n'));

        let wait = cse.find(WAIT_FOR_PROVISION_SCRIPT).unwrap();
        let tenant = cse.find(" TENANT_ID=\"").unwrap();
        let run = cse.find(RUN_PROVISION_SCRIPT).unwrap();
        assert!(wait < tenant && tenant < run, "{}", cse);
        assert!(cse.trim_end().ends_with(RUN_PROVISION_SCRIPT));

        match connectivity_check {
            Some(check) => {
                let at = cse.find(check).unwrap();
                assert!(at < wait, "{}", cse);
                assert!(cse.contains(&format!("{} || exit 50;", check)));
            }
            None => assert!(!cse.contains("nc -vz"), "{}", cse),
        }
        assert_eq!(
            cse_variable(&cse, "OUTBOUND_COMMAND").is_some_and(|c| !c.is_empty()),
            connectivity_check.is_some()
        );
    }
}

#[test]
fn test_custom_cloud_cse_waits_for_init_script() {
    let mut input = ubuntu();
    input.cloud_spec_config.cloud_name = constants::AKS_CUSTOM_CLOUD_NAME.to_string();
    input.container_service.properties.custom_cloud_env = Some(CustomCloudEnv {
        name: constants::AKS_CUSTOM_CLOUD_NAME.to_string(),
        mcr_url: "mcr.microsoft.fakecustomcloud".to_string(),
        ..Default::default()
    });
    let cse = bake(&input).cse;
    let check = cse.find("nc -vz mcr.microsoft.fakecustomcloud 443").unwrap();
    let wait = cse.find(WAIT_FOR_PROVISION_SCRIPT).unwrap();
    let init = cse
        .find(&format!("grep -Fq \"EOF\" {}", constants::INIT_AKS_CUSTOM_CLOUD_FILEPATH))
        .unwrap();
    let run_init = cse
        .find(&format!(
            "{} >> /var/log/azure/cluster-provision.log 2>&1;",
            constants::INIT_AKS_CUSTOM_CLOUD_FILEPATH
        ))
        .unwrap();
    assert!(check < wait && wait < init && init < run_init, "{}", cse);
    assert!(run_init < cse.find(RUN_PROVISION_SCRIPT).unwrap());

    let cse = bake(&ubuntu()).cse;
    assert!(!cse.contains(constants::INIT_AKS_CUSTOM_CLOUD_FILEPATH));
}

#[test]
fn test_message_of_the_day_is_base64_in_cse() {
    let mut input = ubuntu();
    input.agent_pool_profile.message_of_the_day = "Welcome to \"$(hostname)\"".to_string();
    let cse = bake(&input).cse;
    assert_eq!(
        decoded_cse_variable(&cse, "MESSAGE_OF_THE_DAY"),
        "Welcome to \"$(hostname)\""
    );

    input.agent_pool_profile.message_of_the_day = STANDARD.encode("hello");
    let cse = bake(&input).cse;
    assert_eq!(decoded_cse_variable(&cse, "MESSAGE_OF_THE_DAY"), "hello");
}

#[test]
fn test_http_proxy() {
    let mut input = ubuntu();
    input.http_proxy_config = Some(HttpProxyConfig {
        http_proxy: Some("http://p:80/".to_string()),
        no_proxy: Some(vec!["localhost".to_string(), "127.0.0.1".to_string()]),
        trusted_ca: Some(TEST_CERT.replace('\n', "\r\n")),
        ..Default::default()
    });
    let result = bake(&input);

    let export = "export http_proxy=\"http://p:80/\"";
    assert!(result.cse.contains(export));
    assert!(result.cse.contains("export no_proxy=\"localhost,127.0.0.1\""));

    let provision = write_file(&cloud_init(&result), PROVISION_SCRIPT).unwrap();
    assert!(provision.contains(export));
    let proxy = provision.find("eval $PROXY_VARS").unwrap();
    let outbound = provision.find("$OUTBOUND_COMMAND").unwrap();
    assert!(proxy < outbound);

    let trusted_ca = cse_variable(&result.cse, "HTTP_PROXY_TRUSTED_CA").unwrap();
    assert!(!trusted_ca.contains('\n'));
    assert_eq!(
        String::from_utf8(STANDARD.decode(&trusted_ca).unwrap()).unwrap(),
        TEST_CERT
    );
    assert_eq!(
        cse_variable(&result.cse, "SHOULD_CONFIGURE_HTTP_PROXY_CA").as_deref(),
        Some("true")
    );
}

#[test]
fn test_custom_ca_trust() {
    let mut input = ubuntu();
    input.custom_ca_trust_config = Some(CustomCaTrustConfig {
        custom_ca_trust_certs: vec![
            TEST_CERT.to_string(),
            STANDARD.encode(TEST_CERT),
            TEST_CERT.replace('\n', "\\n"),
        ],
    });
    let cse = bake(&input).cse;
    assert_eq!(cse_variable(&cse, "CUSTOM_CA_TRUST_COUNT").as_deref(), Some("3"));
    assert_eq!(
        cse_variable(&cse, "SHOULD_CONFIGURE_CUSTOM_CA_TRUST").as_deref(),
        Some("true")
    );
    for index in 0..3 {
        let cert = decoded_cse_variable(&cse, &format!("CUSTOM_CA_CERT_{}", index));
        assert!(cert.starts_with("-----BEGIN CERTIFICATE-----"), "{}", index);
        assert!(cert.trim_end().ends_with("-----END CERTIFICATE-----"), "{}", index);
    }
}

#[test]
fn test_distro_sig_image_configs() {
    let env = EnvironmentInfo {
        subscription_id: "sub".to_string(),
        tenant_id: "tenant".to_string(),
        region: "westus2".to_string(),
    };
    let toggles = Toggles::new().with_map_toggle(constants::LINUX_NODE_IMAGE_VERSION_TOGGLE, |_| {
        maplit::btreemap! {
            Distro::AKSAzureLinuxV3Gen2.as_str().to_string() => "202501.01.0".to_string(),
        }
    });
    let configs = AgentBaker::new(toggles)
        .get_distro_sig_image_config(&SigConfig::public(), &env)
        .unwrap();
    assert!(!configs.is_empty());
    for (distro, config) in &configs {
        assert!(config.is_complete(), "{}", distro);
        if distro.is_windows() {
            continue;
        }
        let expected = if *distro == Distro::AKSAzureLinuxV3Gen2 {
            "202501.01.0"
        } else {
            constants::LINUX_SIG_IMAGE_VERSION
        };
        assert_eq!(config.version, expected, "{}", distro);
    }
}

#[test]
fn test_unknown_cloud() {
    let mut input = ubuntu();
    input.cloud_spec_config.cloud_name = "UnknownCloud".to_string();
    let result = AgentBaker::new(Toggles::new()).get_node_bootstrapping(&Context::background(), &input);
    assert!(matches!(result, Err(Error::UnknownCloud { cloud }) if cloud == "UnknownCloud"));
}

#[test]
fn test_customized_image() {
    let result = bake(&nbc(Distro::CustomizedImage, "1.31.0"));
    assert!(result.sig_image_config.is_none());
    let doc = cloud_init(&result);
    let files = doc["write_files"].as_sequence().unwrap();
    for file in files {
        assert!(!file["path"].as_str().unwrap().contains("provision_start.sh"));
    }
    let yaml = gunzip(&decode_base64(&result.custom_data));
    assert!(!yaml.contains("provision_start.sh"));
    assert!(!result.cse.contains("provision_start.sh"));
}

#[test]
fn test_flatcar_ignition() {
    let result = bake(&nbc(Distro::AKSFlatcarGen2, "1.31.0"));
    let outer: Value = serde_json::from_slice(&decode_base64(&result.custom_data)).unwrap();
    assert_eq!(outer["ignition"]["version"], "3.4.0");
    let replace = &outer["ignition"]["config"]["replace"];
    assert_eq!(replace["compression"], "gzip");
    let source = replace["source"].as_str().unwrap();
    let payload = source.strip_prefix("data:;base64,").unwrap();

    let inner: Value = serde_json::from_str(&gunzip(&decode_base64(payload))).unwrap();
    let files = inner["storage"]["files"].as_array().unwrap();
    let paths: Vec<&str> = files.iter().filter_map(|f| f["path"].as_str()).collect();
    assert!(paths.contains(&PROVISION_SCRIPT));
    assert!(paths.contains(&"/etc/systemd/system/kubelet.service"));
    assert!(paths.contains(&"/etc/tmpfiles.d/protocols.conf"));

    let units: Vec<&str> = inner["systemd"]["units"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|u| u["name"].as_str())
        .collect();
    assert!(units.contains(&"kubelet.service"));
    assert!(units.contains(&"update-ca.service"));
}

#[test]
fn test_windows_custom_data_and_cse() {
    let mut input = nbc(Distro::AKSWindows2022Containerd, "1.31.0");
    input.agent_pool_profile.os_type = datamodel::nbc::OsType::Windows;
    let result = bake(&input);
    assert!(result.custom_data.starts_with("{\"customData\": \"[base64(concat('"));
    assert!(!result.custom_data.contains("PREPROVISION_EXTENSION"));
    assert!(result.cse.starts_with(
        "echo %DATE%,%TIME%,%COMPUTERNAME% && powershell.exe -ExecutionPolicy Unrestricted -command \""
    ));
    assert!(!result.cse.contains('\n'));
    assert!(result.cse.contains("CustomDataSetupScript.ps1"));
}

#[test]
fn test_docker_daemon_json() {
    let mut input = ubuntu();
    let mut runtime = BTreeMap::new();
    runtime.insert("dataDir".to_string(), "/mnt/docker".to_string());
    input.container_service.properties.orchestrator_profile = Some(OrchestratorProfile {
        orchestrator_type: constants::KUBERNETES.to_string(),
        orchestrator_version: "1.23.12".to_string(),
        kubernetes_config: Some(KubernetesConfig {
            network_plugin: "kubenet".to_string(),
            container_runtime: constants::DOCKER.to_string(),
            container_runtime_config: runtime,
            ..Default::default()
        }),
    });
    let daemon_json = write_file(&cloud_init(&bake(&input)), DOCKER_DAEMON_JSON).unwrap();
    let daemon_json = daemon_json.trim_end();
    insta::assert_snapshot!("docker_daemon_json", daemon_json);
}

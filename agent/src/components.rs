//! Image references of the kubernetes components for a given orchestrator version.
use datamodel::version::parse_kubernetes_version;
use std::collections::BTreeMap;

const PAUSE_IMAGE: &str = "oss/kubernetes/pause:3.6";
const COREDNS_IMAGE: &str = "oss/kubernetes/coredns:v1.9.4";
const AZURE_CCM_IMAGE: &str = "oss/kubernetes/azure-cloud-controller-manager";
const AZURE_CNM_IMAGE: &str = "oss/kubernetes/azure-cloud-node-manager";

/// Hyperkube stopped shipping with 1.19.
const LAST_HYPERKUBE_MINOR: u64 = 18;

/// Component name to image path (relative to the kubernetes image base) for `version`.
pub fn component_images(version: &str) -> BTreeMap<&'static str, String> {
    let parsed = parse_kubernetes_version(version);
    let tag = format!("v{}.{}.{}", parsed.major, parsed.minor, parsed.patch);
    let cloud_provider_tag = format!("v{}.{}.0", parsed.major, parsed.minor);

    let mut images = maplit::btreemap! {
        "kube-apiserver" => format!("kube-apiserver:{}", tag),
        "kube-controller-manager" => format!("kube-controller-manager:{}", tag),
        "kube-proxy" => format!("kube-proxy:{}", tag),
        "kube-scheduler" => format!("kube-scheduler:{}", tag),
        "ccm" => format!("{}:{}", AZURE_CCM_IMAGE, cloud_provider_tag),
        "cloud-node-manager" => format!("{}:{}", AZURE_CNM_IMAGE, cloud_provider_tag),
        "windowszip" => format!("{}/windowszip/{}-1int.zip", tag, tag),
        "pause" => PAUSE_IMAGE.to_string(),
        "coredns" => COREDNS_IMAGE.to_string(),
    };
    if parsed.major == 1 && parsed.minor <= LAST_HYPERKUBE_MINOR {
        images.insert("hyperkube", format!("hyperkube-amd64:{}", tag));
    }
    images
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_component_images() {
        let images = component_images("1.31.2");
        assert_eq!(images["kube-proxy"], "kube-proxy:v1.31.2");
        assert_eq!(
            images["ccm"],
            "oss/kubernetes/azure-cloud-controller-manager:v1.31.0"
        );
        assert_eq!(images["windowszip"], "v1.31.2/windowszip/v1.31.2-1int.zip");
        assert!(!images.contains_key("hyperkube"));

        let old = component_images("1.18.1");
        assert_eq!(old["hyperkube"], "hyperkube-amd64:v1.18.1");
    }
}

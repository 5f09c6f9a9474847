//! The node image catalogue: marketplace (PIR) images per cloud and the gallery definition of every
//! distro, with the Linux SIG version overridable per request through the
//! `linux-node-image-version` toggle.
use crate::error::{self, Result};
use datamodel::constants;
use datamodel::image::{SigAzureEnvironmentSpecConfig, SigImageFamily};
use datamodel::{AzureOsImageConfig, Distro, SigImageConfig};
use lazy_static::lazy_static;
use std::collections::BTreeMap;
use tracing::{event, Level};

lazy_static! {
    static ref UBUNTU_2204_GEN2_PIR: AzureOsImageConfig = AzureOsImageConfig {
        image_offer: "aks".to_string(),
        image_sku: "aks-ubuntu-containerd-22.04-gen2".to_string(),
        image_publisher: "microsoft-aks".to_string(),
        image_version: "2025.06.02".to_string(),
    };
    static ref WINDOWS_2019_PIR: AzureOsImageConfig = AzureOsImageConfig {
        image_offer: "aks-windows".to_string(),
        image_sku: "2019-datacenter-core-smalldisk-2007".to_string(),
        image_publisher: "microsoft-aks".to_string(),
        image_version: "17763.1339.200717".to_string(),
    };

    /// Marketplace images by cloud.
    static ref PIR_CATALOGUE: BTreeMap<&'static str, BTreeMap<Distro, AzureOsImageConfig>> = {
        let public = maplit::btreemap! {
            Distro::AKSUbuntuContainerd2204Gen2 => UBUNTU_2204_GEN2_PIR.clone(),
            Distro::AKSWindows2019PIR => WINDOWS_2019_PIR.clone(),
        };
        let sovereign = maplit::btreemap! {
            Distro::AKSUbuntuContainerd2204Gen2 => UBUNTU_2204_GEN2_PIR.clone(),
        };
        maplit::btreemap! {
            constants::AZURE_PUBLIC_CLOUD => public,
            constants::AZURE_CHINA_CLOUD => sovereign.clone(),
            constants::AZURE_US_GOVERNMENT_CLOUD => sovereign.clone(),
            constants::AZURE_GERMAN_CLOUD => sovereign.clone(),
            constants::USNAT_CLOUD => sovereign.clone(),
            constants::USSEC_CLOUD => sovereign.clone(),
            constants::AKS_CUSTOM_CLOUD_NAME => sovereign,
        }
    };
}

/// The gallery family and image definition a distro is published under.
pub fn sig_definition(distro: Distro) -> Option<(SigImageFamily, &'static str)> {
    use Distro::*;
    use SigImageFamily::*;
    let definition = match distro {
        Ubuntu1804 => (Ubuntu, "1804"),
        AKSUbuntuContainerd1804 => (Ubuntu, "1804containerd"),
        AKSUbuntuContainerd1804Gen2 => (Ubuntu, "1804gen2containerd"),
        AKSUbuntuContainerd2004CVMGen2 => (Ubuntu, "2004gen2CVMcontainerd"),
        AKSUbuntuContainerd2204 => (Ubuntu, "2204containerd"),
        AKSUbuntuContainerd2204Gen2 => (Ubuntu, "2204gen2containerd"),
        AKSUbuntuContainerd2204TLGen2 => (Ubuntu, "2204gen2TLcontainerd"),
        AKSUbuntuArm64Containerd2204Gen2 => (Ubuntu, "2204gen2arm64containerd"),
        AKSUbuntuFipsContainerd2204 => (Ubuntu, "2204fipscontainerd"),
        AKSUbuntuFipsContainerd2204Gen2 => (Ubuntu, "2204gen2fipscontainerd"),
        AKSUbuntuMinimalContainerd2204 => (Ubuntu, "2204minimalcontainerd"),
        AKSUbuntuMinimalContainerd2204Gen2 => (Ubuntu, "2204gen2minimalcontainerd"),
        AKSUbuntuEgressContainerd2204Gen2 => (Ubuntu, "2204gen2egresscontainerd"),
        AKSUbuntuContainerd2404 => (Ubuntu, "2404containerd"),
        AKSUbuntuContainerd2404Gen2 => (Ubuntu, "2404gen2containerd"),
        AKSUbuntuArm64Containerd2404Gen2 => (Ubuntu, "2404gen2arm64containerd"),
        AKSCBLMarinerV2 => (Mariner, "V2"),
        AKSCBLMarinerV2Gen2 => (Mariner, "V2gen2"),
        AKSCBLMarinerV2FIPS => (Mariner, "V2fips"),
        AKSCBLMarinerV2Gen2FIPS => (Mariner, "V2gen2fips"),
        AKSCBLMarinerV2Gen2Kata => (Mariner, "V2katagen2"),
        AKSCBLMarinerV2Gen2TL => (Mariner, "V2gen2TL"),
        AKSCBLMarinerV2KataGen2TL => (Mariner, "V2katagen2TL"),
        AKSCBLMarinerV2Arm64Gen2 => (Mariner, "V2gen2arm64"),
        AKSAzureLinuxV2 => (AzureLinux, "V2"),
        AKSAzureLinuxV2Gen2 => (AzureLinux, "V2gen2"),
        AKSAzureLinuxV2FIPS => (AzureLinux, "V2fips"),
        AKSAzureLinuxV2Gen2FIPS => (AzureLinux, "V2gen2fips"),
        AKSAzureLinuxV2Gen2Kata => (AzureLinux, "V2katagen2"),
        AKSAzureLinuxV2Arm64Gen2 => (AzureLinux, "V2gen2arm64"),
        AKSAzureLinuxV3 => (AzureLinux, "V3"),
        AKSAzureLinuxV3Gen2 => (AzureLinux, "V3gen2"),
        AKSAzureLinuxV3FIPS => (AzureLinux, "V3fips"),
        AKSAzureLinuxV3Gen2FIPS => (AzureLinux, "V3gen2fips"),
        AKSAzureLinuxV3Gen2Kata => (AzureLinux, "V3katagen2"),
        AKSAzureLinuxV3Arm64Gen2 => (AzureLinux, "V3gen2arm64"),
        AKSFlatcarGen2 => (Flatcar, "flatcargen2"),
        AKSFlatcarArm64Gen2 => (Flatcar, "flatcargen2arm64"),
        AKSWindows2019Containerd => (Windows, "windows-2019-containerd"),
        AKSWindows2022Containerd => (Windows, "windows-2022-containerd"),
        AKSWindows2022ContainerdGen2 => (Windows, "windows-2022-containerd-gen2"),
        AKSWindows23H2 => (Windows, "windows-23H2"),
        AKSWindows23H2Gen2 => (Windows, "windows-23H2-gen2"),
        Unspecified | AKSWindows2019PIR | CustomizedImage | CustomizedImageKata
        | CustomizedWindowsOSImage => return None,
    };
    Some(definition)
}

/// The marketplace image of `distro` in `cloud`. Fails when the cloud is not catalogued at all.
pub fn os_image_config(cloud: &str, distro: Distro) -> Result<Option<AzureOsImageConfig>> {
    let images = PIR_CATALOGUE
        .get(cloud)
        .ok_or_else(|| error::Error::UnknownCloud {
            cloud: cloud.to_string(),
        })?;
    Ok(images.get(&distro).cloned())
}

/// The gallery image of `distro`. Linux versions come from `linux_versions` (keyed by the distro's
/// wire name) when present there.
pub fn sig_image_config(
    spec: &SigAzureEnvironmentSpecConfig,
    distro: Distro,
    linux_versions: &BTreeMap<String, String>,
) -> Option<SigImageConfig> {
    let (family, definition) = sig_definition(distro)?;
    let version = if family == SigImageFamily::Windows {
        constants::WINDOWS_SIG_IMAGE_VERSION
    } else {
        match linux_versions.get(distro.as_str()) {
            Some(version) if !version.is_empty() => {
                event!(Level::INFO, %distro, %version, "Node image version overridden by toggle");
                version.as_str()
            }
            _ => constants::LINUX_SIG_IMAGE_VERSION,
        }
    };
    spec.image(family, definition, version)
}

/// Every gallery image `spec` can serve, keyed by distro.
pub fn distro_sig_image_configs(
    spec: &SigAzureEnvironmentSpecConfig,
    linux_versions: &BTreeMap<String, String>,
) -> BTreeMap<Distro, SigImageConfig> {
    Distro::ALL
        .iter()
        .filter_map(|distro| {
            sig_image_config(spec, *distro, linux_versions).map(|config| (*distro, config))
        })
        .collect()
}

/// The images a node can be created from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImageSelection {
    pub os_image_config: Option<AzureOsImageConfig>,
    pub sig_image_config: Option<SigImageConfig>,
}

/// Resolves the images of `distro` in `cloud`. Customized distros bring their own image and
/// always resolve to nothing.
pub fn select_image(
    cloud: &str,
    spec: &SigAzureEnvironmentSpecConfig,
    distro: Distro,
    linux_versions: &BTreeMap<String, String>,
) -> Result<ImageSelection> {
    if distro.is_customized() {
        return Ok(ImageSelection::default());
    }
    let selection = ImageSelection {
        os_image_config: os_image_config(cloud, distro)?,
        sig_image_config: sig_image_config(spec, distro, linux_versions),
    };
    if selection.os_image_config.is_none() && selection.sig_image_config.is_none() {
        return error::DistroNotFoundSnafu { distro, cloud }.fail();
    }
    event!(
        Level::DEBUG,
        %distro,
        pir = selection.os_image_config.is_some(),
        sig = selection.sig_image_config.is_some(),
        "Resolved node image"
    );
    Ok(selection)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;
    use datamodel::image::get_sig_azure_cloud_spec_config;
    use datamodel::SigConfig;

    fn spec() -> SigAzureEnvironmentSpecConfig {
        get_sig_azure_cloud_spec_config(&SigConfig::public(), "eastus").unwrap()
    }

    #[test]
    fn test_every_vhd_distro_has_an_image() {
        for distro in Distro::ALL {
            if distro.is_customized() || *distro == Distro::Unspecified {
                continue;
            }
            let selection = select_image(
                constants::AZURE_PUBLIC_CLOUD,
                &spec(),
                *distro,
                &BTreeMap::new(),
            )
            .unwrap();
            assert!(
                selection.os_image_config.is_some() || selection.sig_image_config.is_some(),
                "{}",
                distro
            );
        }
    }

    #[test]
    fn test_linux_version_override() {
        let versions = maplit::btreemap! {
            Distro::AKSUbuntuContainerd2204Gen2.as_str().to_string() => "202502.01.0".to_string(),
            Distro::AKSWindows2022Containerd.as_str().to_string() => "ignored".to_string(),
        };
        let test_cases = vec![
            (Distro::AKSUbuntuContainerd2204Gen2, "202502.01.0"),
            (Distro::AKSAzureLinuxV3Gen2, constants::LINUX_SIG_IMAGE_VERSION),
            (Distro::AKSWindows2022Containerd, constants::WINDOWS_SIG_IMAGE_VERSION),
        ];
        for (distro, expected) in test_cases {
            let config = sig_image_config(&spec(), distro, &versions).unwrap();
            assert_eq!(config.version, expected, "{}", distro);
        }
    }

    #[test]
    fn test_selection_errors() {
        assert!(matches!(
            select_image("UnknownCloud", &spec(), Distro::AKSUbuntuContainerd2204, &BTreeMap::new()),
            Err(Error::UnknownCloud { cloud }) if cloud == "UnknownCloud"
        ));
        assert!(matches!(
            select_image(constants::AZURE_PUBLIC_CLOUD, &spec(), Distro::Unspecified, &BTreeMap::new()),
            Err(Error::DistroNotFound { .. })
        ));
        let customized = select_image(
            "UnknownCloud",
            &spec(),
            Distro::CustomizedImage,
            &BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(customized, ImageSelection::default());
    }

    #[test]
    fn test_distro_sig_image_configs() {
        let all = distro_sig_image_configs(&spec(), &BTreeMap::new());
        let mariner = &all[&Distro::AKSCBLMarinerV2Gen2];
        assert_eq!(mariner.gallery, constants::AKS_MARINER_GALLERY_NAME);
        assert_eq!(mariner.definition, "V2gen2");
        assert!(!all.contains_key(&Distro::CustomizedImage));
        assert!(all.values().all(SigImageConfig::is_complete));
    }
}

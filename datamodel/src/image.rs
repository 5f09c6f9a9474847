//! Image coordinates: marketplace (PIR) and Shared Image Gallery (SIG) records, and the per-cloud
//! SIG environment derived from a caller's gallery configuration.
use crate::cloud::get_cloud_target_env;
use crate::constants;

use serde::{Deserialize, Serialize};
use snafu::ensure;
use std::collections::BTreeMap;

/// A platform image reference.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AzureOsImageConfig {
    pub image_offer: String,
    pub image_sku: String,
    pub image_publisher: String,
    pub image_version: String,
}

/// A Shared Image Gallery image reference.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SigImageConfig {
    pub subscription_id: String,
    pub resource_group: String,
    pub gallery: String,
    pub definition: String,
    pub version: String,
}

impl SigImageConfig {
    pub fn is_complete(&self) -> bool {
        !self.resource_group.is_empty()
            && !self.gallery.is_empty()
            && !self.definition.is_empty()
            && !self.version.is_empty()
    }
}

/// A gallery a caller publishes node images into.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SigGalleryConfig {
    pub gallery_name: String,
    pub resource_group: String,
}

/// The caller-supplied gallery layout.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SigConfig {
    #[serde(rename = "tenantID")]
    pub tenant_id: String,
    #[serde(rename = "subscriptionID")]
    pub subscription_id: String,
    pub galleries: BTreeMap<String, SigGalleryConfig>,
}

impl SigConfig {
    /// The gallery layout AKS publishes its own images with.
    pub fn public() -> Self {
        let gallery = |name: &str, rg: &str| SigGalleryConfig {
            gallery_name: name.to_string(),
            resource_group: rg.to_string(),
        };
        Self {
            tenant_id: constants::PUBLIC_SIG_TENANT_ID.to_string(),
            subscription_id: constants::PUBLIC_SIG_SUBSCRIPTION_ID.to_string(),
            galleries: maplit::btreemap! {
                constants::AKS_UBUNTU_GALLERY_NAME.to_string() => gallery(constants::AKS_UBUNTU_GALLERY_NAME, constants::AKS_UBUNTU_RESOURCE_GROUP),
                constants::AKS_MARINER_GALLERY_NAME.to_string() => gallery(constants::AKS_MARINER_GALLERY_NAME, constants::AKS_MARINER_RESOURCE_GROUP),
                constants::AKS_AZURE_LINUX_GALLERY_NAME.to_string() => gallery(constants::AKS_AZURE_LINUX_GALLERY_NAME, constants::AKS_AZURE_LINUX_RESOURCE_GROUP),
                constants::AKS_WINDOWS_GALLERY_NAME.to_string() => gallery(constants::AKS_WINDOWS_GALLERY_NAME, constants::AKS_WINDOWS_RESOURCE_GROUP),
                constants::AKS_FLATCAR_GALLERY_NAME.to_string() => gallery(constants::AKS_FLATCAR_GALLERY_NAME, constants::AKS_FLATCAR_RESOURCE_GROUP),
            },
        }
    }
}

/// The region a request targets, plus the caller identity used for toggle lookups.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvironmentInfo {
    #[serde(rename = "subscriptionID")]
    pub subscription_id: String,
    #[serde(rename = "tenantID")]
    pub tenant_id: String,
    pub region: String,
}

/// The OS lineage a gallery hosts.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SigImageFamily {
    Ubuntu,
    Mariner,
    AzureLinux,
    Windows,
    Flatcar,
}

impl SigImageFamily {
    fn gallery_key(&self) -> &'static str {
        match self {
            SigImageFamily::Ubuntu => constants::AKS_UBUNTU_GALLERY_NAME,
            SigImageFamily::Mariner => constants::AKS_MARINER_GALLERY_NAME,
            SigImageFamily::AzureLinux => constants::AKS_AZURE_LINUX_GALLERY_NAME,
            SigImageFamily::Windows => constants::AKS_WINDOWS_GALLERY_NAME,
            SigImageFamily::Flatcar => constants::AKS_FLATCAR_GALLERY_NAME,
        }
    }

    fn required(&self) -> bool {
        !matches!(self, SigImageFamily::Flatcar)
    }

    pub const ALL: &'static [SigImageFamily] = &[
        SigImageFamily::Ubuntu,
        SigImageFamily::Mariner,
        SigImageFamily::AzureLinux,
        SigImageFamily::Windows,
        SigImageFamily::Flatcar,
    ];
}

/// Where each image family lives for one cloud.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SigAzureEnvironmentSpecConfig {
    pub cloud_name: String,
    pub sig_tenant_id: String,
    pub subscription_id: String,
    pub galleries: BTreeMap<SigImageFamily, SigGalleryConfig>,
}

impl SigAzureEnvironmentSpecConfig {
    /// Builds the SIG record of one image definition in the gallery hosting `family`.
    pub fn image(
        &self,
        family: SigImageFamily,
        definition: &str,
        version: &str,
    ) -> Option<SigImageConfig> {
        self.galleries.get(&family).map(|gallery| SigImageConfig {
            subscription_id: self.subscription_id.clone(),
            resource_group: gallery.resource_group.clone(),
            gallery: gallery.gallery_name.clone(),
            definition: definition.to_string(),
            version: version.to_string(),
        })
    }
}

/// Validates a caller's gallery layout and binds it to the cloud hosting `region`.
pub fn get_sig_azure_cloud_spec_config(
    sig_config: &SigConfig,
    region: &str,
) -> Result<SigAzureEnvironmentSpecConfig> {
    ensure!(
        !sig_config.subscription_id.is_empty() && !sig_config.tenant_id.is_empty(),
        error::MissingIdentitySnafu
    );
    ensure!(!sig_config.galleries.is_empty(), error::NoGalleriesSnafu);

    let mut galleries = BTreeMap::new();
    for family in SigImageFamily::ALL {
        match sig_config.galleries.get(family.gallery_key()) {
            Some(gallery) => {
                galleries.insert(*family, gallery.clone());
            }
            None if family.required() => {
                return error::MissingGallerySnafu {
                    gallery: family.gallery_key(),
                }
                .fail()
            }
            None => {}
        }
    }

    Ok(SigAzureEnvironmentSpecConfig {
        cloud_name: get_cloud_target_env(region).to_string(),
        sig_tenant_id: sig_config.tenant_id.clone(),
        subscription_id: sig_config.subscription_id.clone(),
        galleries,
    })
}

pub mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum SigConfigError {
        #[snafu(display("SIGConfig must have both a subscription and a tenant"))]
        MissingIdentity {},

        #[snafu(display("SIGConfig must have at least one gallery"))]
        NoGalleries {},

        #[snafu(display("SIGConfig is missing the required gallery '{}'", gallery))]
        MissingGallery { gallery: String },
    }
}

type Result<T> = std::result::Result<T, SigConfigError>;
pub use error::SigConfigError;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_public_sig_config_is_valid() {
        let spec = get_sig_azure_cloud_spec_config(&SigConfig::public(), "chinaeast2").unwrap();
        assert_eq!(spec.cloud_name, constants::AZURE_CHINA_CLOUD);
        assert_eq!(spec.subscription_id, constants::PUBLIC_SIG_SUBSCRIPTION_ID);
        assert_eq!(spec.galleries.len(), SigImageFamily::ALL.len());

        let image = spec
            .image(SigImageFamily::Ubuntu, "2204gen2containerd", "1.0.0")
            .unwrap();
        assert_eq!(image.resource_group, constants::AKS_UBUNTU_RESOURCE_GROUP);
        assert_eq!(image.gallery, constants::AKS_UBUNTU_GALLERY_NAME);
        assert!(image.is_complete());
    }

    #[test]
    fn test_invalid_sig_configs() {
        let mut missing_tenant = SigConfig::public();
        missing_tenant.tenant_id.clear();

        let mut no_galleries = SigConfig::public();
        no_galleries.galleries.clear();

        let mut missing_windows = SigConfig::public();
        missing_windows
            .galleries
            .remove(constants::AKS_WINDOWS_GALLERY_NAME);

        let mut missing_flatcar = SigConfig::public();
        missing_flatcar
            .galleries
            .remove(constants::AKS_FLATCAR_GALLERY_NAME);

        assert!(matches!(
            get_sig_azure_cloud_spec_config(&missing_tenant, "eastus"),
            Err(SigConfigError::MissingIdentity {})
        ));
        assert!(matches!(
            get_sig_azure_cloud_spec_config(&no_galleries, "eastus"),
            Err(SigConfigError::NoGalleries {})
        ));
        assert!(matches!(
            get_sig_azure_cloud_spec_config(&missing_windows, "eastus"),
            Err(SigConfigError::MissingGallery { gallery }) if gallery == constants::AKS_WINDOWS_GALLERY_NAME
        ));
        // Flatcar images are optional.
        let spec = get_sig_azure_cloud_spec_config(&missing_flatcar, "eastus").unwrap();
        assert!(spec
            .image(SigImageFamily::Flatcar, "flatcargen2", "1")
            .is_none());
    }
}

//! The catalogue of node image lineages a pool can be built from.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declares the `Distro` enum together with its wire names and the full variant list.
macro_rules! distros {
    ($( $(#[$meta:meta])* $variant:ident => $wire:literal, )*) => {
        /// An OS family, version and flavour that uniquely identifies an image lineage.
        #[derive(
            Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
        )]
        pub enum Distro {
            $(
                $(#[$meta])*
                #[serde(rename = $wire)]
                $variant,
            )*
        }

        impl Distro {
            /// Every known distro, in declaration order.
            pub const ALL: &'static [Distro] = &[$(Distro::$variant,)*];

            /// The wire name of this distro.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Distro::$variant => $wire,)*
                }
            }
        }
    };
}

distros! {
    #[default]
    Unspecified => "",
    Ubuntu1804 => "ubuntu-18.04",
    AKSUbuntuContainerd1804 => "aks-ubuntu-containerd-18.04",
    AKSUbuntuContainerd1804Gen2 => "aks-ubuntu-containerd-18.04-gen2",
    AKSUbuntuContainerd2004CVMGen2 => "aks-ubuntu-containerd-20.04-cvm-gen2",
    AKSUbuntuContainerd2204 => "aks-ubuntu-containerd-22.04",
    AKSUbuntuContainerd2204Gen2 => "aks-ubuntu-containerd-22.04-gen2",
    AKSUbuntuContainerd2204TLGen2 => "aks-ubuntu-containerd-22.04-tl-gen2",
    AKSUbuntuArm64Containerd2204Gen2 => "aks-ubuntu-arm64-containerd-22.04-gen2",
    AKSUbuntuFipsContainerd2204 => "aks-ubuntu-fips-containerd-22.04",
    AKSUbuntuFipsContainerd2204Gen2 => "aks-ubuntu-fips-containerd-22.04-gen2",
    AKSUbuntuMinimalContainerd2204 => "aks-ubuntu-minimal-containerd-22.04",
    AKSUbuntuMinimalContainerd2204Gen2 => "aks-ubuntu-minimal-containerd-22.04-gen2",
    AKSUbuntuEgressContainerd2204Gen2 => "aks-ubuntu-egress-containerd-22.04-gen2",
    AKSUbuntuContainerd2404 => "aks-ubuntu-containerd-24.04",
    AKSUbuntuContainerd2404Gen2 => "aks-ubuntu-containerd-24.04-gen2",
    AKSUbuntuArm64Containerd2404Gen2 => "aks-ubuntu-arm64-containerd-24.04-gen2",
    AKSCBLMarinerV2 => "aks-cblmariner-v2",
    AKSCBLMarinerV2Gen2 => "aks-cblmariner-v2-gen2",
    AKSCBLMarinerV2FIPS => "aks-cblmariner-v2-fips",
    AKSCBLMarinerV2Gen2FIPS => "aks-cblmariner-v2-gen2-fips",
    AKSCBLMarinerV2Gen2Kata => "aks-cblmariner-v2-gen2-kata",
    AKSCBLMarinerV2Gen2TL => "aks-cblmariner-v2-gen2-tl",
    AKSCBLMarinerV2KataGen2TL => "aks-cblmariner-v2-kata-gen2-tl",
    AKSCBLMarinerV2Arm64Gen2 => "aks-cblmariner-v2-arm64-gen2",
    AKSAzureLinuxV2 => "aks-azurelinux-v2",
    AKSAzureLinuxV2Gen2 => "aks-azurelinux-v2-gen2",
    AKSAzureLinuxV2FIPS => "aks-azurelinux-v2-fips",
    AKSAzureLinuxV2Gen2FIPS => "aks-azurelinux-v2-gen2-fips",
    AKSAzureLinuxV2Gen2Kata => "aks-azurelinux-v2-gen2-kata",
    AKSAzureLinuxV2Arm64Gen2 => "aks-azurelinux-v2-arm64-gen2",
    AKSAzureLinuxV3 => "aks-azurelinux-v3",
    AKSAzureLinuxV3Gen2 => "aks-azurelinux-v3-gen2",
    AKSAzureLinuxV3FIPS => "aks-azurelinux-v3-fips",
    AKSAzureLinuxV3Gen2FIPS => "aks-azurelinux-v3-gen2-fips",
    AKSAzureLinuxV3Gen2Kata => "aks-azurelinux-v3-gen2-kata",
    AKSAzureLinuxV3Arm64Gen2 => "aks-azurelinux-v3-arm64-gen2",
    AKSFlatcarGen2 => "aks-flatcar-gen2",
    AKSFlatcarArm64Gen2 => "aks-flatcar-arm64-gen2",
    AKSWindows2019Containerd => "aks-windows-2019-containerd",
    AKSWindows2019PIR => "aks-windows-2019-pir",
    AKSWindows2022Containerd => "aks-windows-2022-containerd",
    AKSWindows2022ContainerdGen2 => "aks-windows-2022-containerd-gen2",
    AKSWindows23H2 => "aks-windows-23H2",
    AKSWindows23H2Gen2 => "aks-windows-23H2-gen2",
    CustomizedImage => "CustomizedImage",
    CustomizedImageKata => "CustomizedImageKata",
    CustomizedWindowsOSImage => "CustomizedWindowsOSImage",
}

/// The OS family a distro belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, strum_macros::Display)]
pub enum DistroFamily {
    Ubuntu,
    Mariner,
    AzureLinux,
    Flatcar,
    Windows,
    Customized,
}

/// Flags decoded from a distro tag.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DistroInfo {
    pub family: DistroFamily,
    pub gen2: bool,
    pub fips: bool,
    pub trusted_launch: bool,
    pub cvm: bool,
    pub kata: bool,
    pub arm64: bool,
}

impl Distro {
    pub fn family(&self) -> DistroFamily {
        use Distro::*;
        match self {
            Unspecified
            | Ubuntu1804
            | AKSUbuntuContainerd1804
            | AKSUbuntuContainerd1804Gen2
            | AKSUbuntuContainerd2004CVMGen2
            | AKSUbuntuContainerd2204
            | AKSUbuntuContainerd2204Gen2
            | AKSUbuntuContainerd2204TLGen2
            | AKSUbuntuArm64Containerd2204Gen2
            | AKSUbuntuFipsContainerd2204
            | AKSUbuntuFipsContainerd2204Gen2
            | AKSUbuntuMinimalContainerd2204
            | AKSUbuntuMinimalContainerd2204Gen2
            | AKSUbuntuEgressContainerd2204Gen2
            | AKSUbuntuContainerd2404
            | AKSUbuntuContainerd2404Gen2
            | AKSUbuntuArm64Containerd2404Gen2 => DistroFamily::Ubuntu,
            AKSCBLMarinerV2
            | AKSCBLMarinerV2Gen2
            | AKSCBLMarinerV2FIPS
            | AKSCBLMarinerV2Gen2FIPS
            | AKSCBLMarinerV2Gen2Kata
            | AKSCBLMarinerV2Gen2TL
            | AKSCBLMarinerV2KataGen2TL
            | AKSCBLMarinerV2Arm64Gen2 => DistroFamily::Mariner,
            AKSAzureLinuxV2
            | AKSAzureLinuxV2Gen2
            | AKSAzureLinuxV2FIPS
            | AKSAzureLinuxV2Gen2FIPS
            | AKSAzureLinuxV2Gen2Kata
            | AKSAzureLinuxV2Arm64Gen2
            | AKSAzureLinuxV3
            | AKSAzureLinuxV3Gen2
            | AKSAzureLinuxV3FIPS
            | AKSAzureLinuxV3Gen2FIPS
            | AKSAzureLinuxV3Gen2Kata
            | AKSAzureLinuxV3Arm64Gen2 => DistroFamily::AzureLinux,
            AKSFlatcarGen2 | AKSFlatcarArm64Gen2 => DistroFamily::Flatcar,
            AKSWindows2019Containerd
            | AKSWindows2019PIR
            | AKSWindows2022Containerd
            | AKSWindows2022ContainerdGen2
            | AKSWindows23H2
            | AKSWindows23H2Gen2 => DistroFamily::Windows,
            CustomizedImage | CustomizedImageKata | CustomizedWindowsOSImage => {
                DistroFamily::Customized
            }
        }
    }

    pub fn info(&self) -> DistroInfo {
        let tag = self.as_str();
        DistroInfo {
            family: self.family(),
            gen2: tag.contains("gen2"),
            fips: tag.contains("fips"),
            trusted_launch: tag.ends_with("-tl-gen2") || tag.ends_with("-gen2-tl"),
            cvm: tag.contains("-cvm-"),
            kata: self.is_kata(),
            arm64: tag.contains("arm64"),
        }
    }

    /// Whether the image ships with the node components preinstalled.
    pub fn is_vhd(&self) -> bool {
        !matches!(
            self,
            Distro::Unspecified
                | Distro::Ubuntu1804
                | Distro::CustomizedImage
                | Distro::CustomizedImageKata
                | Distro::CustomizedWindowsOSImage
        )
    }

    pub fn is_kata(&self) -> bool {
        matches!(
            self,
            Distro::AKSCBLMarinerV2Gen2Kata
                | Distro::AKSCBLMarinerV2KataGen2TL
                | Distro::AKSAzureLinuxV2Gen2Kata
                | Distro::AKSAzureLinuxV3Gen2Kata
                | Distro::CustomizedImageKata
        )
    }

    pub fn is_customized(&self) -> bool {
        self.family() == DistroFamily::Customized
    }

    /// Mariner and AzureLinux share the same helper scripts.
    pub fn is_mariner_based(&self) -> bool {
        matches!(
            self.family(),
            DistroFamily::Mariner | DistroFamily::AzureLinux
        )
    }

    pub fn is_flatcar(&self) -> bool {
        self.family() == DistroFamily::Flatcar
    }

    pub fn is_windows(&self) -> bool {
        self.family() == DistroFamily::Windows || *self == Distro::CustomizedWindowsOSImage
    }

    /// Ubuntu 22.04 and later boot with the unified cgroup hierarchy, as do AzureLinux v3 and Flatcar.
    pub fn is_cgroup_v2(&self) -> bool {
        let tag = self.as_str();
        tag.contains("22.04")
            || tag.contains("24.04")
            || tag.contains("azurelinux-v3")
            || self.is_flatcar()
    }
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

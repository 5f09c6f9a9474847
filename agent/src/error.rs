use crate::cri::CriError;
use crate::kubelet::KubeletError;
use crate::packager::PackagerError;
use crate::template::TemplateError;
use datamodel::image::SigConfigError;
use datamodel::Distro;
use snafu::Snafu;

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The crate-wide error type.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Cloud '{}' is not in the image catalogue", cloud))]
    UnknownCloud { cloud: String },

    #[snafu(display("Distro '{}' has no image in cloud '{}'", distro, cloud))]
    DistroNotFound { distro: Distro, cloud: String },

    #[snafu(display("Asset '{}' is not embedded", name))]
    AssetMissing { name: String },

    #[snafu(display("Asset '{}' is not valid UTF-8: '{}'", name, source))]
    AssetEncoding {
        name: String,
        source: std::string::FromUtf8Error,
    },

    #[snafu(display("Failed to expand template: '{}'", source))]
    Template { source: TemplateError },

    #[snafu(display("The request was cancelled before it started"))]
    Cancelled {},

    #[snafu(display("Failed to synthesize kubelet configuration: '{}'", source))]
    Kubelet { source: KubeletError },

    #[snafu(display("Failed to synthesize container runtime configuration: '{}'", source))]
    Cri { source: CriError },

    #[snafu(display("Failed to package custom data: '{}'", source))]
    Packager { source: PackagerError },

    #[snafu(display("Invalid SIG configuration: '{}'", source))]
    SigConfig { source: SigConfigError },

    #[snafu(display("Extension '{}' is not defined in the cluster's extension profiles", name))]
    ExtensionNotFound { name: String },

    #[snafu(display("Failed to compress '{}': '{}'", name, source))]
    Compress {
        name: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to serialize '{}': '{}'", name, source))]
    Serialize {
        name: String,
        source: serde_json::Error,
    },
}

/*!
Custom data envelopes.

Linux nodes receive the expanded cloud-init document gzipped and base64 encoded. Flatcar nodes
receive an Ignition config that replaces itself with a gzipped inner config carrying the same files.
Windows nodes receive an ARM `base64(concat(..))` expression around the escaped setup script.
*/
pub mod archive;
pub mod ignition;
pub mod windows;

use crate::encoding::{base64_encode, gzip_base64};
use crate::error::{self as crate_error, Result as CrateResult};
use datamodel::{Distro, DistroFamily};
use snafu::ResultExt;
use tracing::{event, instrument, Level};

/// The wrapper a node's custom data is delivered in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Envelope {
    CloudInit,
    Ignition,
    Windows,
}

impl Envelope {
    pub fn for_distro(distro: Distro, is_windows_pool: bool) -> Self {
        if is_windows_pool || distro.is_windows() {
            Envelope::Windows
        } else if distro.family() == DistroFamily::Flatcar {
            Envelope::Ignition
        } else {
            Envelope::CloudInit
        }
    }
}

/// Wraps expanded custom data in `envelope`. `preprovision_command` only applies to Windows.
#[instrument(skip(body, preprovision_command))]
pub fn package(envelope: Envelope, body: &str, preprovision_command: &str) -> CrateResult<String> {
    event!(Level::DEBUG, bytes = body.len(), "Packaging custom data");
    match envelope {
        Envelope::CloudInit => gzip_base64("customData", body.as_bytes()),
        Envelope::Ignition => flatcar_custom_data(body),
        Envelope::Windows => Ok(windows::custom_data(body, preprovision_command)),
    }
}

fn flatcar_custom_data(cloud_init: &str) -> CrateResult<String> {
    let inner = ignition::from_cloud_init(cloud_init).context(crate_error::PackagerSnafu)?;
    let inner_json = serde_json::to_vec(&inner).context(crate_error::SerializeSnafu {
        name: "ignition config",
    })?;
    let source = format!(
        "data:;base64,{}",
        gzip_base64("ignition config", &inner_json)?
    );
    let outer_json = serde_json::to_vec(&ignition::envelope(source))
        .context(crate_error::SerializeSnafu {
            name: "ignition envelope",
        })?;
    Ok(base64_encode(outer_json))
}

pub mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum PackagerError {
        #[snafu(display("Unable to parse expanded cloud-init document: '{}'", source))]
        CloudInitParse { source: serde_yaml::Error },

        #[snafu(display("Expanded cloud-init document has no write_files"))]
        NoWriteFiles {},

        #[snafu(display("Invalid permissions '{}' for '{}': '{}'", permissions, path, source))]
        InvalidPermissions {
            path: String,
            permissions: String,
            source: std::num::ParseIntError,
        },

        #[snafu(display("Unable to decode base64 content of '{}': '{}'", path, source))]
        Base64Decode {
            path: String,
            source: base64::DecodeError,
        },

        #[snafu(display("Unsupported encoding '{}' for '{}'", encoding, path))]
        UnsupportedEncoding { path: String, encoding: String },

        #[snafu(display("Unable to add '{}' to archive: '{}'", name, source))]
        Archive {
            name: String,
            source: zip::result::ZipError,
        },

        #[snafu(display("Unable to write '{}' to archive: '{}'", name, source))]
        ArchiveWrite {
            name: String,
            source: std::io::Error,
        },
    }
}

type Result<T> = std::result::Result<T, PackagerError>;
pub use error::PackagerError;

//! The embedded bootstrap assets: cloud-init and PowerShell templates, provisioning scripts and
//! systemd units, keyed by their path under `parts/`.
use crate::error::{self, Result};
#[cfg(test)]
use mockall::automock;
use rust_embed::RustEmbed;
use snafu::{OptionExt, ResultExt};

pub const LINUX_CLOUD_INIT_TEMPLATE: &str = "linux/cloud-init/nodecustomdata.yml";
pub const LINUX_CSE_CMD: &str = "linux/cloud-init/artifacts/cse_cmd.sh";
pub const WINDOWS_CUSTOM_DATA_TEMPLATE: &str = "windows/kuberneteswindowssetup.ps1";
pub const WINDOWS_CSE_CMD: &str = "windows/csecmd.ps1";

/// Helper scripts zipped into the Windows custom data.
pub const WINDOWS_HELPER_SCRIPTS: &[&str] = &["windows/windowscsehelper.ps1", "windows/sendlogs.ps1"];

#[derive(RustEmbed, Default)]
#[folder = "parts/"]
struct Parts;

/// Where assets are loaded from.
#[cfg_attr(test, automock)]
pub trait AssetSource: Send + Sync {
    fn get(&self, name: &str) -> Option<Vec<u8>>;
}

/// The assets compiled into this crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbeddedAssets;

impl AssetSource for EmbeddedAssets {
    fn get(&self, name: &str) -> Option<Vec<u8>> {
        Parts::get(name).map(|file| file.data.into_owned())
    }
}

/// Loads a text asset.
pub fn load_text(source: &dyn AssetSource, name: &str) -> Result<String> {
    let bytes = source
        .get(name)
        .context(error::AssetMissingSnafu { name })?;
    String::from_utf8(bytes).context(error::AssetEncodingSnafu { name })
}

/// Loads a binary asset.
pub fn load_bytes(source: &dyn AssetSource, name: &str) -> Result<Vec<u8>> {
    source.get(name).context(error::AssetMissingSnafu { name })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_entry_assets_are_embedded() {
        let test_cases = vec![
            LINUX_CLOUD_INIT_TEMPLATE,
            LINUX_CSE_CMD,
            WINDOWS_CUSTOM_DATA_TEMPLATE,
            WINDOWS_CSE_CMD,
        ];
        for name in test_cases.into_iter().chain(WINDOWS_HELPER_SCRIPTS.iter().copied()) {
            assert!(load_text(&EmbeddedAssets, name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_missing_asset() {
        let mut source = MockAssetSource::new();
        source.expect_get().returning(|_| None);
        assert!(matches!(
            load_text(&source, "linux/nope.sh"),
            Err(Error::AssetMissing { name }) if name == "linux/nope.sh"
        ));
    }

    #[test]
    fn test_invalid_utf8_asset() {
        let mut source = MockAssetSource::new();
        source.expect_get().returning(|_| Some(vec![0xff, 0xfe]));
        assert!(matches!(
            load_text(&source, "bad"),
            Err(Error::AssetEncoding { .. })
        ));
    }
}

//! Commands that download and run a pool's preprovision extension before the node joins.
use crate::error::{self, Result};
use datamodel::constants;
use datamodel::nbc::{Extension, ExtensionProfile};
use datamodel::NodeBootstrappingConfiguration;
use snafu::OptionExt;

const LINUX_EXTENSIONS_DIR: &str = "/opt/azure/containers/extensions";
const WINDOWS_EXTENSIONS_DIR: &str = "$env:SystemDrive:/AzureData/extensions";

/// Where an extension's script is downloaded from.
pub fn extension_url(profile: &ExtensionProfile) -> String {
    let mut url = format!(
        "{}extensions/{}/{}/{}",
        profile.root_url, profile.name, profile.version, profile.script
    );
    if !profile.url_query.is_empty() {
        url.push('?');
        url.push_str(&profile.url_query);
    }
    url
}

fn find_profile<'a>(
    nbc: &'a NodeBootstrappingConfiguration,
    extension: &Extension,
) -> Result<&'a ExtensionProfile> {
    nbc.container_service
        .properties
        .extension_profiles
        .iter()
        .find(|profile| profile.name.eq_ignore_ascii_case(&extension.name))
        .context(error::ExtensionNotFoundSnafu {
            name: extension.name.clone(),
        })
}

fn linux_command(profile: &ExtensionProfile, curl_ca_cert_opt: &str) -> String {
    let script_path = format!(
        "{}/{}/{}",
        LINUX_EXTENSIONS_DIR, profile.name, profile.script
    );
    format!(
        "- sudo /usr/bin/curl --retry 5 --retry-delay 10 --retry-max-time 30 -o {path} --create-dirs {cacert} \"{url}\" \n\
         - sudo /bin/chmod 744 {path} \n\
         - sudo {path} ',parameters('{name}Parameters'),' > /var/log/{name}-output.log",
        path = script_path,
        cacert = curl_ca_cert_opt,
        url = extension_url(profile),
        name = profile.name,
    )
}

fn windows_command(profile: &ExtensionProfile) -> String {
    let dir = format!("{}/{}", WINDOWS_EXTENSIONS_DIR, profile.name);
    let script_path = format!("{}/{}", dir, profile.script);
    format!(
        "New-Item -ItemType Directory -Force -Path \"{dir}\" ; Invoke-WebRequest -Uri \"{url}\" -OutFile \"{path}\" ; powershell \"{path} `\"',parameters('{name}Parameters'),'`\"\"\n",
        dir = dir,
        url = extension_url(profile),
        path = script_path,
        name = profile.name,
    )
}

/// The command block that runs the pool's preprovision extension, or an empty string when the pool
/// has none. Fails when the pool names an extension the cluster does not define.
pub fn preprovision_command(nbc: &NodeBootstrappingConfiguration) -> Result<String> {
    let pool = &nbc.agent_pool_profile;
    let extension = match &pool.preprovision_extension {
        Some(extension) => extension,
        None => return Ok(String::new()),
    };
    let profile = find_profile(nbc, extension)?;
    if pool.is_windows() {
        return Ok(windows_command(profile));
    }
    let curl_ca_cert_opt = if nbc.cloud_spec_config.cloud_name == constants::AZURE_STACK_CLOUD {
        format!("--cacert {}", constants::AZURE_STACK_CA_CERT_LOCATION)
    } else {
        String::new()
    };
    Ok(linux_command(profile, &curl_ca_cert_opt))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;
    use datamodel::nbc::OsType;

    fn nbc_with_extension(os_type: OsType) -> NodeBootstrappingConfiguration {
        let mut nbc = NodeBootstrappingConfiguration::default();
        nbc.container_service.properties.extension_profiles = vec![ExtensionProfile {
            name: "hello".to_string(),
            version: "v1".to_string(),
            root_url: "https://example.com/".to_string(),
            script: "hello.sh".to_string(),
            url_query: "sig=abc".to_string(),
            ..Default::default()
        }];
        nbc.agent_pool_profile.os_type = os_type;
        nbc.agent_pool_profile.preprovision_extension = Some(Extension {
            name: "HELLO".to_string(),
            ..Default::default()
        });
        nbc
    }

    #[test]
    fn test_extension_url() {
        let nbc = nbc_with_extension(OsType::Linux);
        let profile = &nbc.container_service.properties.extension_profiles[0];
        assert_eq!(
            extension_url(profile),
            "https://example.com/extensions/hello/v1/hello.sh?sig=abc"
        );
    }

    #[test]
    fn test_linux_preprovision_command() {
        let command = preprovision_command(&nbc_with_extension(OsType::Linux)).unwrap();
        assert!(command.starts_with("- sudo /usr/bin/curl --retry 5"));
        assert!(command.contains("-o /opt/azure/containers/extensions/hello/hello.sh"));
        assert!(command.contains("',parameters('helloParameters'),'"));
        assert!(command.ends_with("> /var/log/hello-output.log"));
        assert!(!command.contains("--cacert"));

        let mut stack = nbc_with_extension(OsType::Linux);
        stack.cloud_spec_config.cloud_name = constants::AZURE_STACK_CLOUD.to_string();
        let command = preprovision_command(&stack).unwrap();
        assert!(command.contains("--cacert /etc/ssl/certs/azurestackcerts.pem"));
    }

    #[test]
    fn test_windows_preprovision_command() {
        let command = preprovision_command(&nbc_with_extension(OsType::Windows)).unwrap();
        assert!(command.starts_with(
            "New-Item -ItemType Directory -Force -Path \"$env:SystemDrive:/AzureData/extensions/hello\""
        ));
        assert!(command.contains("-OutFile \"$env:SystemDrive:/AzureData/extensions/hello/hello.sh\""));
        assert!(command.ends_with("'`\"\"\n"));
    }

    #[test]
    fn test_no_extension() {
        let mut nbc = nbc_with_extension(OsType::Linux);
        nbc.agent_pool_profile.preprovision_extension = None;
        assert_eq!(preprovision_command(&nbc).unwrap(), "");
    }

    #[test]
    fn test_unknown_extension() {
        let mut nbc = nbc_with_extension(OsType::Linux);
        nbc.container_service.properties.extension_profiles.clear();
        assert!(matches!(
            preprovision_command(&nbc),
            Err(Error::ExtensionNotFound { name }) if name == "HELLO"
        ));
    }
}

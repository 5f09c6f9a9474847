//! Ignition 3.4 configs for Flatcar nodes, built from the `write_files` of the expanded cloud-init
//! document.
use super::{error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use snafu::{ensure, ResultExt};

pub const IGNITION_VERSION: &str = "3.4.0";

const SYSTEMD_UNIT_DIR: &str = "/etc/systemd/system/";
const UNIT_SUFFIXES: &[&str] = &[".service", ".timer", ".mount", ".socket"];

const PROTOCOLS_PATH: &str = "/etc/tmpfiles.d/protocols.conf";
const PROTOCOLS_CONTENT: &str = "C /etc/protocols - - - - /usr/share/baselayout/protocols\n";
const UPDATE_CA_UNIT: &str = "update-ca.service";
const UPDATE_CA_CONTENT: &str = "[Unit]
Description=Update CA certificates if missing or symlink
DefaultDependencies=no
After=local-fs.target
ExecCondition=/bin/sh -c '[ ! -e /etc/ssl/certs/ca-certificates.crt ] || [ -L /etc/ssl/certs/ca-certificates.crt ]'

[Service]
Type=oneshot
ExecStartPre=/usr/bin/rm -f /etc/ssl/certs/ca-certificates.crt
ExecStart=/usr/sbin/update-ca-certificates
RemainAfterExit=yes

[Install]
WantedBy=multi-user.target
";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IgnitionConfig {
    pub ignition: IgnitionSection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<Storage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub systemd: Option<Systemd>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IgnitionSection {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigReferences>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigReferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replace: Option<Resource>,
}

/// A remote or embedded piece of content.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Storage {
    #[serde(default)]
    pub files: Vec<File>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<Resource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<FileUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileUser {
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Systemd {
    #[serde(default)]
    pub units: Vec<Unit>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
}

/// The parts of a cloud-init document that carry over to Ignition.
#[derive(Debug, Default, Deserialize)]
struct CloudConfig {
    #[serde(default)]
    write_files: Vec<WriteFile>,
}

#[derive(Debug, Default, Deserialize)]
struct WriteFile {
    path: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
    #[serde(default)]
    owner: String,
    #[serde(default)]
    permissions: String,
}

fn data_url(content: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(content.as_bytes()).collect();
    format!("data:,{}", encoded)
}

fn to_ignition_file(file: &WriteFile) -> Result<File> {
    let mode = if file.permissions.is_empty() {
        None
    } else {
        Some(
            u32::from_str_radix(&file.permissions, 8).context(error::InvalidPermissionsSnafu {
                path: file.path.clone(),
                permissions: file.permissions.clone(),
            })?,
        )
    };
    let user = file
        .owner
        .split(':')
        .next()
        .filter(|owner| !owner.is_empty())
        .map(|owner| FileUser {
            name: owner.to_string(),
        });

    let contents = if file.content.is_empty() {
        None
    } else {
        Some(match file.encoding.as_str() {
            "gzip" | "gz" | "gz+b64" | "gz+base64" | "gzip+b64" | "gzip+base64" => Resource {
                source: Some(format!("data:;base64,{}", compact(&file.content))),
                compression: Some("gzip".to_string()),
                ..Default::default()
            },
            "base64" | "b64" => {
                let decoded = STANDARD
                    .decode(compact(&file.content))
                    .context(error::Base64DecodeSnafu {
                        path: file.path.clone(),
                    })?;
                Resource {
                    inline: Some(String::from_utf8_lossy(&decoded).into_owned()),
                    ..Default::default()
                }
            }
            "" | "text/plain" => Resource {
                source: Some(data_url(&file.content)),
                ..Default::default()
            },
            other => {
                return error::UnsupportedEncodingSnafu {
                    path: file.path.clone(),
                    encoding: other,
                }
                .fail()
            }
        })
    };

    Ok(File {
        path: file.path.clone(),
        contents,
        mode,
        user,
        overwrite: Some(true),
    })
}

fn compact(content: &str) -> String {
    content.split_whitespace().collect()
}

fn unit_name(path: &str) -> Option<&str> {
    let name = path.strip_prefix(SYSTEMD_UNIT_DIR)?;
    if !name.contains('/') && UNIT_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
        Some(name)
    } else {
        None
    }
}

/// The files and units every Flatcar node gets.
fn base_config() -> IgnitionConfig {
    IgnitionConfig {
        ignition: IgnitionSection {
            version: IGNITION_VERSION.to_string(),
            config: None,
        },
        storage: Some(Storage {
            files: vec![File {
                path: PROTOCOLS_PATH.to_string(),
                contents: Some(Resource {
                    source: Some(data_url(PROTOCOLS_CONTENT)),
                    ..Default::default()
                }),
                mode: Some(0o644),
                ..Default::default()
            }],
        }),
        systemd: Some(Systemd {
            units: vec![Unit {
                name: UPDATE_CA_UNIT.to_string(),
                enabled: Some(true),
                contents: Some(UPDATE_CA_CONTENT.to_string()),
            }],
        }),
    }
}

/// Converts an expanded cloud-init document into the Ignition config that lays down the same files.
pub fn from_cloud_init(cloud_init: &str) -> Result<IgnitionConfig> {
    let cloud_config: CloudConfig =
        serde_yaml::from_str(cloud_init).context(error::CloudInitParseSnafu)?;
    ensure!(!cloud_config.write_files.is_empty(), error::NoWriteFilesSnafu);

    let mut files = Vec::with_capacity(cloud_config.write_files.len() + 1);
    let mut units = Vec::new();
    for write_file in &cloud_config.write_files {
        files.push(to_ignition_file(write_file)?);
        if let Some(name) = unit_name(&write_file.path) {
            units.push(Unit {
                name: name.to_string(),
                enabled: Some(true),
                contents: None,
            });
        }
    }

    let mut config = base_config();
    if let Some(storage) = config.storage.as_mut() {
        files.append(&mut storage.files);
        storage.files = files;
    }
    if let Some(systemd) = config.systemd.as_mut() {
        units.append(&mut systemd.units);
        systemd.units = units;
    }
    Ok(config)
}

/// An Ignition config whose only job is to replace itself with `source`.
pub fn envelope(source: String) -> IgnitionConfig {
    IgnitionConfig {
        ignition: IgnitionSection {
            version: IGNITION_VERSION.to_string(),
            config: Some(ConfigReferences {
                replace: Some(Resource {
                    source: Some(source),
                    compression: Some("gzip".to_string()),
                    ..Default::default()
                }),
            }),
        },
        ..Default::default()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::packager::PackagerError;

    const CLOUD_INIT: &str = r#"#cloud-config

write_files:
- path: /opt/azure/containers/provision.sh
  permissions: "0744"
  encoding: gz+b64
  owner: root
  content: |
    H4sIAAAAAAAC/0tMSgYAUK0hcQMAAAA=
- path: /etc/systemd/system/kubelet.service
  permissions: "0644"
  owner: root:root
  content: |
    [Unit]
    Description=Kubelet
- path: /etc/motd
  encoding: b64
  content: aGVsbG8=

runcmd:
- echo done
"#;

    #[test]
    fn test_from_cloud_init() {
        let config = from_cloud_init(CLOUD_INIT).unwrap();
        assert_eq!(config.ignition.version, "3.4.0");

        let files = config.storage.unwrap().files;
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/opt/azure/containers/provision.sh",
                "/etc/systemd/system/kubelet.service",
                "/etc/motd",
                PROTOCOLS_PATH,
            ]
        );

        let provision = &files[0];
        assert_eq!(provision.mode, Some(0o744));
        assert_eq!(provision.overwrite, Some(true));
        assert_eq!(provision.user.as_ref().unwrap().name, "root");
        let contents = provision.contents.as_ref().unwrap();
        assert_eq!(
            contents.source.as_deref(),
            Some("data:;base64,H4sIAAAAAAAC/0tMSgYAUK0hcQMAAAA=")
        );
        assert_eq!(contents.compression.as_deref(), Some("gzip"));

        let kubelet = files[1].contents.as_ref().unwrap();
        assert_eq!(
            kubelet.source.as_deref(),
            Some("data:,%5BUnit%5D%0ADescription%3DKubelet%0A")
        );
        assert_eq!(files[2].contents.as_ref().unwrap().inline.as_deref(), Some("hello"));
        assert_eq!(files[3].mode, Some(420));

        let units: Vec<_> = config
            .systemd
            .unwrap()
            .units
            .into_iter()
            .map(|u| (u.name, u.enabled))
            .collect();
        assert_eq!(
            units,
            vec![
                ("kubelet.service".to_string(), Some(true)),
                (UPDATE_CA_UNIT.to_string(), Some(true)),
            ]
        );
    }

    #[test]
    fn test_from_cloud_init_errors() {
        assert!(matches!(
            from_cloud_init("#cloud-config\nruncmd: []\n"),
            Err(PackagerError::NoWriteFiles {})
        ));
        assert!(matches!(
            from_cloud_init("write_files:\n- path: /a\n  permissions: \"9z\"\n"),
            Err(PackagerError::InvalidPermissions { .. })
        ));
        assert!(matches!(
            from_cloud_init("write_files:\n- path: /a\n  encoding: zstd\n  content: x\n"),
            Err(PackagerError::UnsupportedEncoding { encoding, .. }) if encoding == "zstd"
        ));
    }

    #[test]
    fn test_envelope_serialization() {
        let json = serde_json::to_value(envelope("data:;base64,AAAA".to_string())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "ignition": {
                    "version": "3.4.0",
                    "config": {
                        "replace": {
                            "source": "data:;base64,AAAA",
                            "compression": "gzip"
                        }
                    }
                }
            })
        );
    }
}

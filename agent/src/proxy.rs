//! Outbound HTTP proxy and custom CA trust settings.
use crate::encoding::{base64_encode, normalize_line_endings};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use datamodel::nbc::{CustomCaTrustConfig, HttpProxyConfig};

const PEM_MARKER: &str = "-----BEGIN";

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

pub fn http_proxy(config: Option<&HttpProxyConfig>) -> Option<&str> {
    config.and_then(|config| non_empty(&config.http_proxy))
}

pub fn https_proxy(config: Option<&HttpProxyConfig>) -> Option<&str> {
    config.and_then(|config| non_empty(&config.https_proxy))
}

/// The no-proxy list, comma joined.
pub fn no_proxy(config: Option<&HttpProxyConfig>) -> Option<String> {
    config
        .and_then(|config| config.no_proxy.as_ref())
        .filter(|hosts| !hosts.is_empty())
        .map(|hosts| hosts.join(","))
}

/// The proxy CA bundle as single-line base64, whatever shape it was supplied in.
pub fn trusted_ca(config: Option<&HttpProxyConfig>) -> Option<String> {
    config
        .and_then(|config| non_empty(&config.trusted_ca))
        .map(encode_certificate)
}

pub fn should_configure_http_proxy(config: Option<&HttpProxyConfig>) -> bool {
    http_proxy(config).is_some() || https_proxy(config).is_some()
}

pub fn should_configure_http_proxy_ca(config: Option<&HttpProxyConfig>) -> bool {
    trusted_ca(config).is_some()
}

/// Shell exports for every configured proxy setting, in both the lower and upper case spelling.
pub fn proxy_variables(config: Option<&HttpProxyConfig>) -> String {
    let mut exports = Vec::new();
    let mut export = |name: &str, value: &str| {
        exports.push(format!(
            "export {}=\"{}\"; export {}=\"{}\";",
            name,
            value,
            name.to_uppercase(),
            value
        ));
    };
    if let Some(proxy) = http_proxy(config) {
        export("http_proxy", proxy);
    }
    if let Some(proxy) = https_proxy(config) {
        export("https_proxy", proxy);
    }
    if let Some(hosts) = no_proxy(config) {
        export("no_proxy", &hosts);
    }
    exports.join(" ")
}

pub fn should_configure_custom_ca_trust(config: Option<&CustomCaTrustConfig>) -> bool {
    config
        .map(|config| !config.custom_ca_trust_certs.is_empty())
        .unwrap_or(false)
}

/// Each custom CA certificate as single-line base64.
pub fn custom_ca_trust_certs(config: Option<&CustomCaTrustConfig>) -> Vec<String> {
    config
        .map(|config| {
            config
                .custom_ca_trust_certs
                .iter()
                .map(|cert| encode_certificate(cert))
                .collect()
        })
        .unwrap_or_default()
}

/// Accepts a PEM bundle either as text (with CRLF or escaped `\n` line breaks) or as base64 that
/// may itself be wrapped over several lines, and returns the base64 of the LF-terminated PEM.
pub fn encode_certificate(input: &str) -> String {
    let unescaped = input.replace("\\r\\n", "\n").replace("\\n", "\n");
    let compact: String = unescaped.split_whitespace().collect();
    let pem = match STANDARD.decode(compact.as_bytes()) {
        Ok(decoded) if decoded.windows(PEM_MARKER.len()).any(|w| w == PEM_MARKER.as_bytes()) => {
            String::from_utf8_lossy(&decoded).into_owned()
        }
        _ => unescaped,
    };
    base64_encode(normalize_line_endings(&pem))
}

#[cfg(test)]
mod test {
    use super::*;

    const PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIBszCCAVmgAwIBAgIU\n-----END CERTIFICATE-----\n";

    fn decode(value: &str) -> String {
        String::from_utf8(STANDARD.decode(value).unwrap()).unwrap()
    }

    #[test]
    fn test_proxy_variables() {
        let config = HttpProxyConfig {
            http_proxy: Some("http://p:80/".to_string()),
            https_proxy: None,
            no_proxy: Some(vec!["localhost".to_string(), "127.0.0.1".to_string()]),
            trusted_ca: None,
        };
        assert_eq!(
            proxy_variables(Some(&config)),
            "export http_proxy=\"http://p:80/\"; export HTTP_PROXY=\"http://p:80/\"; \
             export no_proxy=\"localhost,127.0.0.1\"; export NO_PROXY=\"localhost,127.0.0.1\";"
        );
        assert!(should_configure_http_proxy(Some(&config)));
        assert!(!should_configure_http_proxy_ca(Some(&config)));
        assert_eq!(proxy_variables(None), "");
        assert!(!should_configure_http_proxy(None));
    }

    #[test]
    fn test_encode_certificate() {
        let crlf = PEM.replace('\n', "\r\n");
        let escaped = PEM.replace('\n', "\\n");
        let wrapped = {
            let encoded = STANDARD.encode(PEM);
            let (head, tail) = encoded.split_at(20);
            format!("{}\n{}", head, tail)
        };
        let test_cases = vec![PEM.to_string(), crlf, escaped, wrapped];
        for input in test_cases {
            let encoded = encode_certificate(&input);
            assert!(!encoded.contains('\n'), "{}", input);
            assert_eq!(decode(&encoded), PEM, "{}", input);
        }
    }

    #[test]
    fn test_custom_ca_trust_certs() {
        let config = CustomCaTrustConfig {
            custom_ca_trust_certs: vec![PEM.to_string(), STANDARD.encode(PEM)],
        };
        assert!(should_configure_custom_ca_trust(Some(&config)));
        let certs = custom_ca_trust_certs(Some(&config));
        assert_eq!(certs.len(), 2);
        for cert in certs {
            assert_eq!(decode(&cert), PEM);
        }
        assert!(!should_configure_custom_ca_trust(None));
    }
}

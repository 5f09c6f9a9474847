//! Lenient kubernetes version comparison.
use semver::Version;

/// Parses `1.32`, `v1.31.2` or `1.30.0-alpha.1` into a semantic version, padding missing parts.
/// Anything unparseable compares as `0.0.0`.
pub fn parse_kubernetes_version(version: &str) -> Version {
    let trimmed = version.trim().trim_start_matches('v');
    if let Ok(parsed) = Version::parse(trimmed) {
        return parsed;
    }
    let (core, rest) = match trimmed.find(|c| c == '-' || c == '+') {
        Some(i) => trimmed.split_at(i),
        None => (trimmed, ""),
    };
    let mut parts: Vec<&str> = core.split('.').collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    Version::parse(&format!("{}{}", parts.join("."), rest)).unwrap_or_else(|_| Version::new(0, 0, 0))
}

/// Returns true if `actual` is greater than or equal to `minimum`.
pub fn is_kubernetes_version_ge(actual: &str, minimum: &str) -> bool {
    parse_kubernetes_version(actual) >= parse_kubernetes_version(minimum)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_is_kubernetes_version_ge() {
        let test_cases = vec![
            ("1.32.0", "1.32", true),
            ("1.31.9", "1.32.0", false),
            ("v1.33.1", "1.32.0", true),
            ("1.24.0", "1.24.0", true),
            ("1.14", "1.14.0", true),
            ("garbage", "1.14.0", false),
            ("", "0.0.0", true),
        ];

        for (actual, minimum, expected) in test_cases {
            assert_eq!(
                is_kubernetes_version_ge(actual, minimum),
                expected,
                "{} >= {}",
                actual,
                minimum
            );
        }
    }
}

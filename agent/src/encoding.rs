//! Byte-level encodings shared by the composers and packagers.
use crate::error::{self, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use serde::Serialize;
use snafu::ResultExt;
use std::io::Write;

pub fn base64_encode<T: AsRef<[u8]>>(input: T) -> String {
    STANDARD.encode(input)
}

/// Returns `input` unchanged when it is already standard base64, otherwise its encoding. The
/// result only holds base64 characters, so it is safe inside a double-quoted shell assignment.
pub fn as_base64(input: &str) -> String {
    if STANDARD.decode(input).is_ok() {
        input.to_string()
    } else {
        base64_encode(input)
    }
}

/// Gzips `content` with a zeroed header timestamp, so equal input always yields equal output.
pub fn gzip(name: &str, content: &[u8]) -> Result<Vec<u8>> {
    let mut encoder: GzEncoder<Vec<u8>> = GzBuilder::new()
        .mtime(0)
        .write(Vec::new(), Compression::best());
    encoder
        .write_all(content)
        .context(error::CompressSnafu { name })?;
    encoder.finish().context(error::CompressSnafu { name })
}

/// `base64(gzip(content))`, the form every embedded file takes.
pub fn gzip_base64(name: &str, content: &[u8]) -> Result<String> {
    Ok(base64_encode(gzip(name, content)?))
}

/// Serializes to JSON indented by four spaces.
pub fn to_json_indented<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    // serde_json only writes valid UTF-8.
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Converts CRLF and lone CR line endings to LF.
pub fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod test {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_gzip_is_deterministic() {
        let first = gzip_base64("a", b"hello world").unwrap();
        let second = gzip_base64("a", b"hello world").unwrap();
        assert_eq!(first, second);

        let bytes = STANDARD.decode(first).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "hello world");
    }

    #[test]
    fn test_as_base64() {
        let test_cases = vec![
            ("", ""),
            ("d2VsY29tZQ==", "d2VsY29tZQ=="),
            ("hi \"$USER\"", "aGkgIiRVU0VSIg=="),
            ("line one\nline two", "bGluZSBvbmUKbGluZSB0d28="),
        ];
        for (input, expected) in test_cases {
            assert_eq!(as_base64(input), expected, "{:?}", input);
        }
    }

    #[test]
    fn test_to_json_indented() {
        let value = serde_json::json!({"a": {"b": 1}});
        assert_eq!(
            to_json_indented(&value).unwrap(),
            "{\n    \"a\": {\n        \"b\": 1\n    }\n}"
        );
    }

    #[test]
    fn test_normalize_line_endings() {
        let test_cases = vec![("a\r\nb", "a\nb"), ("a\rb\n", "a\nb\n"), ("plain", "plain")];
        for (input, expected) in test_cases {
            assert_eq!(normalize_line_endings(input), expected);
        }
    }
}

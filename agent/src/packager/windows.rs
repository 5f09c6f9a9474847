//! ARM-evaluated wrappers for Windows custom data and the Windows CSE.

const PREPROVISION_PLACEHOLDER: &str = "PREPROVISION_EXTENSION";

/// Escapes text so it fits on one line inside a JSON string.
pub fn escape_single_line(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
        .replace('"', "\\\"")
}

/// Wraps the expanded setup script as `{"customData": "[base64(concat('<script>'))]"}`, with the
/// preprovision command spliced in. ARM evaluates the expression at deployment time.
pub fn custom_data(script: &str, preprovision_command: &str) -> String {
    let escaped = escape_single_line(script).replace(
        PREPROVISION_PLACEHOLDER,
        &escape_single_line(preprovision_command.trim()),
    );
    format!(
        "{{\"customData\": \"[base64(concat('{}'))]\"}}",
        escaped.replace('\'', "''")
    )
}

/// The Windows CSE: quotes the template escaped for the template engine are restored and line
/// breaks are dropped.
pub fn cse_command(expanded: &str) -> String {
    expanded
        .replace("\\\"", "\"")
        .replace("\r\n", " ")
        .replace('\n', " ")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_escape_single_line() {
        let test_cases = vec![
            ("a\r\nb\nc", "a\\nb\\nc"),
            ("say \"hi\"", "say \\\"hi\\\""),
            ("C:\\k", "C:\\\\k"),
        ];
        for (input, expected) in test_cases {
            assert_eq!(escape_single_line(input), expected, "{}", input);
        }
    }

    #[test]
    fn test_custom_data() {
        let script = "$x = 'a'\r\nPREPROVISION_EXTENSION\r\nWrite-Log \"done\"";
        let wrapped = custom_data(script, "  Invoke-WebRequest -Uri \"u\"\n");
        assert_eq!(
            wrapped,
            "{\"customData\": \"[base64(concat('$x = ''a''\\nInvoke-WebRequest -Uri \\\"u\\\"\\nWrite-Log \\\"done\\\"'))]\"}"
        );
        let value: serde_json::Value = serde_json::from_str(&wrapped).unwrap();
        assert!(value["customData"]
            .as_str()
            .unwrap()
            .starts_with("[base64(concat('"));
    }

    #[test]
    fn test_cse_command() {
        assert_eq!(
            cse_command("powershell.exe -command \\\"a\\\"\r\n; b\n"),
            "powershell.exe -command \"a\" ; b "
        );
    }
}

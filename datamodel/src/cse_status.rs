//! Post-mortem parsing of the message a CSE run reports back to the platform.
//!
//! On Linux the extension message wraps the JSON status the provisioning script prints:
//! `...[stdout]\n{"ExitCode": "0", ...}\n[stderr]...`. When the script never got that far, the
//! message only carries the extension handler's own failure text and the exit code has to be
//! recovered from it. On Windows the extension reports a plain sentence with the exit code.
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref LINUX_FAILURE_MESSAGE_RE: Regex = Regex::new(
        r"Enable failed: failed to execute command: command terminated with exit status=(\d+)"
    )
    .unwrap();
    static ref LINUX_FAILURE_CODE_RE: Regex = Regex::new(r"ProvisioningState/failed/(\d+)").unwrap();
    static ref WINDOWS_EXIT_CODE_RE: Regex =
        Regex::new(r"a non-zero exit code of: '?(-?\d+)'?").unwrap();
}

const STDOUT_MARKER: &str = "[stdout]";
const STDERR_MARKER: &str = "[stderr]";
const WINDOWS_SUCCESS_MARKER: &str = "Command execution finished";

/// The status record a provisioning run prints on completion.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CseStatus {
    #[serde(rename = "ExitCode")]
    pub exit_code: String,
    #[serde(rename = "Output")]
    pub output: String,
    #[serde(rename = "Error")]
    pub error: String,
    #[serde(rename = "ExecDuration")]
    pub exec_duration: String,
    #[serde(rename = "KernelStartTime")]
    pub kernel_start_time: String,
    #[serde(rename = "SystemdSummary")]
    pub systemd_summary: String,
    #[serde(rename = "CSEStartTime")]
    pub cse_start_time: String,
    #[serde(rename = "GuestAgentStartTime")]
    pub guest_agent_start_time: String,
    #[serde(rename = "BootDatapoints")]
    pub boot_datapoints: serde_json::Value,
}

/// Why a CSE message could not be interpreted.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CseStatusParsingErrorCode {
    #[serde(rename = "CSEMessageUnmarshalError")]
    CseMessageUnmarshalError,
    #[serde(rename = "CSEMessageExitCodeEmptyError")]
    CseMessageExitCodeEmptyError,
    InvalidCSEMessage,
}

impl fmt::Display for CseStatusParsingErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            CseStatusParsingErrorCode::CseMessageUnmarshalError => "CSEMessageUnmarshalError",
            CseStatusParsingErrorCode::CseMessageExitCodeEmptyError => {
                "CSEMessageExitCodeEmptyError"
            }
            CseStatusParsingErrorCode::InvalidCSEMessage => "InvalidCSEMessage",
        };
        f.write_str(code)
    }
}

/// A typed parse failure, carrying the message that could not be interpreted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CseStatusParsingError {
    pub code: CseStatusParsingErrorCode,
    pub message: String,
}

impl CseStatusParsingError {
    fn new(code: CseStatusParsingErrorCode, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for CseStatusParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CSE has invalid message={:?}, InstanceErrorCode={}",
            self.message, self.code
        )
    }
}

impl std::error::Error for CseStatusParsingError {}

type Result<T> = std::result::Result<T, CseStatusParsingError>;

/// Interprets the status message of a Linux CSE run.
pub fn parse_linux_cse_message(code: Option<&str>, message: Option<&str>) -> Result<CseStatus> {
    let (code, message) = match (code, message) {
        (Some(code), Some(message)) => (code, message),
        _ => {
            return Err(CseStatusParsingError::new(
                CseStatusParsingErrorCode::InvalidCSEMessage,
                message.unwrap_or_default(),
            ))
        }
    };

    let start = message.find(STDOUT_MARKER).map(|i| i + STDOUT_MARKER.len());
    let end = message.find(STDERR_MARKER);
    let body = match (start, end) {
        (Some(start), Some(end)) if end > start => &message[start..end],
        _ => {
            return Err(CseStatusParsingError::new(
                CseStatusParsingErrorCode::InvalidCSEMessage,
                message,
            ))
        }
    };

    let status = match serde_json::from_str::<CseStatus>(body.trim()) {
        Ok(status) => status,
        Err(_) => recover_linux_exit_code(code, message).ok_or_else(|| {
            CseStatusParsingError::new(CseStatusParsingErrorCode::CseMessageUnmarshalError, message)
        })?,
    };

    if status.exit_code.is_empty() {
        return Err(CseStatusParsingError::new(
            CseStatusParsingErrorCode::CseMessageExitCodeEmptyError,
            message,
        ));
    }
    Ok(status)
}

/// Recovers the exit code when the extension handler failed before the script printed its status.
fn recover_linux_exit_code(code: &str, message: &str) -> Option<CseStatus> {
    let exit_status = LINUX_FAILURE_MESSAGE_RE.captures(message)?.get(1)?.as_str();
    let provisioning_code = LINUX_FAILURE_CODE_RE.captures(code)?.get(1)?.as_str();
    if exit_status != provisioning_code {
        return None;
    }
    Some(CseStatus {
        exit_code: exit_status.to_string(),
        error: message.to_string(),
        ..Default::default()
    })
}

/// Interprets the status message of a Windows CSE run.
pub fn parse_windows_cse_message(code: Option<&str>, message: Option<&str>) -> Result<CseStatus> {
    let message = match (code, message) {
        (Some(_), Some(message)) => message,
        _ => {
            return Err(CseStatusParsingError::new(
                CseStatusParsingErrorCode::InvalidCSEMessage,
                message.unwrap_or_default(),
            ))
        }
    };

    if let Some(exit_code) = WINDOWS_EXIT_CODE_RE
        .captures(message)
        .and_then(|captures| captures.get(1))
    {
        return Ok(CseStatus {
            exit_code: exit_code.as_str().to_string(),
            error: message.to_string(),
            ..Default::default()
        });
    }

    if message.contains(WINDOWS_SUCCESS_MARKER) {
        return Ok(CseStatus {
            exit_code: "0".to_string(),
            output: message.to_string(),
            ..Default::default()
        });
    }

    Err(CseStatusParsingError::new(
        CseStatusParsingErrorCode::CseMessageExitCodeEmptyError,
        message,
    ))
}

//! Structured logging setup for processes that host the builder.
//!
//! The builder crates only emit `tracing` events. A hosting process calls
//! [`init_telemetry_from_env`] once to choose the filter, the output format and colouring.
use serde::Deserialize;
use snafu::ResultExt;
use std::env;
use tracing::Subscriber;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

const DEFAULT_FILTER: &str = "info";

const TRACING_FILTER_DIRECTIVE_ENV_VAR: &str = "TRACING_FILTER_DIRECTIVE";
const LOGGING_FORMATTER_ENV_VAR: &str = "LOGGING_FORMATTER";
const LOGGING_ANSI_ENABLED_ENV_VAR: &str = "LOGGING_ANSI_ENABLED";

/// How each event is rendered.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Full,
    Compact,
    /// Multi-line, for reading provisioning traces locally.
    Pretty,
    /// One JSON object per line, for log collectors.
    #[default]
    Json,
}

/// Everything the logging environment variables select.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TelemetrySettings {
    pub filter: String,
    pub format: LogFormat,
    pub ansi: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        TelemetrySettings {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::default(),
            ansi: false,
        }
    }
}

impl TelemetrySettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the settings through `lookup`, which maps a variable name to its value. Unset and
    /// empty variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut settings = TelemetrySettings::default();

        if let Some(filter) = value(TRACING_FILTER_DIRECTIVE_ENV_VAR) {
            settings.filter = filter;
        }
        if let Some(format) = value(LOGGING_FORMATTER_ENV_VAR) {
            settings.format = serde_plain::from_str(&format.to_lowercase())
                .context(error::LogFormatterEnvSnafu { env_value: format })?;
        }
        if let Some(ansi) = value(LOGGING_ANSI_ENABLED_ENV_VAR) {
            settings.ansi = ansi
                .to_lowercase()
                .parse()
                .context(error::LogAnsiEnvSnafu { env_value: ansi })?;
        }
        Ok(settings)
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_new(&self.filter).context(error::FilterDirectiveSnafu {
            directive: self.filter.clone(),
        })
    }

    /// A registry filtered by the directive with one formatting layer on top.
    pub fn subscriber(&self) -> Result<Box<dyn Subscriber + Send + Sync>> {
        let registry = Registry::default().with(self.env_filter()?);
        let layer = fmt::layer().with_ansi(self.ansi);
        // Each format is a distinct layer type.
        let subscriber: Box<dyn Subscriber + Send + Sync> = match self.format {
            LogFormat::Full => Box::new(registry.with(layer)),
            LogFormat::Compact => Box::new(registry.with(layer.compact())),
            LogFormat::Pretty => Box::new(registry.with(layer.pretty())),
            LogFormat::Json => Box::new(registry.with(layer.json())),
        };
        Ok(subscriber)
    }
}

/// Installs the global subscriber described by the logging environment variables.
pub fn init_telemetry_from_env() -> Result<()> {
    let settings = TelemetrySettings::from_env()?;
    let subscriber = settings.subscriber()?;
    tracing::subscriber::set_global_default(subscriber)
        .context(error::TracingConfigurationSnafu)?;
    tracing::event!(
        tracing::Level::DEBUG,
        filter = %settings.filter,
        format = ?settings.format,
        "Telemetry initialized"
    );
    Ok(())
}

pub mod error {
    use super::{LOGGING_ANSI_ENABLED_ENV_VAR, LOGGING_FORMATTER_ENV_VAR};
    use snafu::Snafu;
    use std::str::ParseBoolError;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum TelemetryConfigError {
        #[snafu(display("Error installing the tracing subscriber: '{}'", source))]
        TracingConfiguration {
            source: tracing::subscriber::SetGlobalDefaultError,
        },

        #[snafu(display("Invalid tracing filter directive '{}': '{}'", directive, source))]
        FilterDirective {
            source: tracing_subscriber::filter::ParseError,
            directive: String,
        },

        #[snafu(display(
            "Could not parse formatter from environment variable '{}={}': '{}'",
            LOGGING_FORMATTER_ENV_VAR,
            env_value,
            source
        ))]
        LogFormatterEnv {
            source: serde_plain::Error,
            env_value: String,
        },

        #[snafu(display(
            "Could not parse ANSI enablement from environment variable '{}={}': '{}'",
            LOGGING_ANSI_ENABLED_ENV_VAR,
            env_value,
            source
        ))]
        LogAnsiEnv {
            source: ParseBoolError,
            env_value: String,
        },
    }
}

pub use error::TelemetryConfigError;
type Result<T> = std::result::Result<T, TelemetryConfigError>;

//! Configuration for the proxy
//!
//! All environment reads happen here, once, at startup. The resulting
//! [`Config`] is immutable and passed by reference for the lifetime of the
//! process.

use secrecy::SecretString;
use thiserror::Error;

use claudeproxy_tools::OsFamily;

/// Which backend adapter the proxy runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    /// xAI chat-completions backend
    Xai,
    /// Groq OpenAI-compatible backend
    Groq,
}

impl AdapterKind {
    /// Default listening port for this adapter
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Xai => 5000,
            Self::Groq => 5003,
        }
    }

    /// Environment variable holding this backend's credential
    pub const fn credential_var(self) -> &'static str {
        match self {
            Self::Xai => "XAI_API_KEY",
            Self::Groq => "GROQ_API_KEY",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Xai => "xai",
            Self::Groq => "groq",
        }
    }
}

impl std::str::FromStr for AdapterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xai" => Ok(Self::Xai),
            "groq" => Ok(Self::Groq),
            other => Err(ConfigError::UnknownAdapter(other.to_owned())),
        }
    }
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration assembled from CLI flags and environment variables
#[derive(Debug)]
pub struct Config {
    /// Active backend adapter
    pub adapter: AdapterKind,
    /// Loopback port to listen on
    pub port: u16,
    /// Backend credential; never printed
    pub api_key: SecretString,
    /// Host OS family (detected, or overridden for tests)
    pub os_family: OsFamily,
    /// Route haiku-class model names through the high-reasoning model when
    /// the text also matches reasoning keywords
    pub haiku_high_reasoning: bool,
}

/// Errors building a [`Config`]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown adapter `{0}` (expected `xai` or `groq`)")]
    UnknownAdapter(String),

    #[error("invalid value for {var}: `{value}`")]
    InvalidValue { var: &'static str, value: String },

    #[error("{var} not set; the {adapter} adapter needs it")]
    MissingCredential {
        var: &'static str,
        adapter: AdapterKind,
    },
}

impl ConfigError {
    /// Process exit code for this error (2 = configuration, 4 = credential)
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::MissingCredential { .. } => 4,
            Self::UnknownAdapter(_) | Self::InvalidValue { .. } => 2,
        }
    }
}

impl Config {
    /// Build the configuration from resolved flag values plus the environment
    ///
    /// `adapter` and `port` come from the CLI layer (which itself falls back
    /// to `CLAUDEPROXY_ADAPTER` / `CLAUDEPROXY_PORT`); the credential and the
    /// OS override are read here.
    ///
    /// # Errors
    ///
    /// Returns an error when the credential variable is unset or an override
    /// value does not parse.
    pub fn build(adapter: AdapterKind, port: Option<u16>) -> Result<Self, ConfigError> {
        let var = adapter.credential_var();
        let api_key = match std::env::var(var) {
            // "NA" is the installer's placeholder for an unconfigured key
            Ok(key) if !key.is_empty() && key != "NA" => SecretString::from(key),
            _ => return Err(ConfigError::MissingCredential { var, adapter }),
        };

        let os_family = match std::env::var("CLAUDEPROXY_OS_OVERRIDE") {
            Ok(value) => OsFamily::parse(&value).ok_or(ConfigError::InvalidValue {
                var: "CLAUDEPROXY_OS_OVERRIDE",
                value,
            })?,
            Err(_) => OsFamily::detect(),
        };

        let haiku_high_reasoning = std::env::var("CLAUDEPROXY_HAIKU_REASONING")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            adapter,
            port: port.unwrap_or_else(|| adapter.default_port()),
            api_key,
            os_family,
            haiku_high_reasoning,
        })
    }
}

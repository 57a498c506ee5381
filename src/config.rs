//! Environment configuration for the server binary.

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use agent_provider::{DATA_LOOKUP_TOOL, IMAGE_GENERATION_TOOL};
use chat_server::gate::DEFAULT_HISTORY_LIMIT;
use chat_server::{GateSettings, QuotaPolicy};
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is not valid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// JSONL session directory; sessions stay in memory when unset.
    pub store_dir: Option<PathBuf>,
    pub chat_limit: u32,
    pub chat_window: Duration,
    pub render_limit: u32,
    pub lookup_limit: u32,
    pub history_limit: usize,
    pub log_filter: String,
    /// Shared bearer secret. Requests are anonymous when unset.
    pub api_token: Option<String>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("store_dir", &self.store_dir)
            .field("chat_limit", &self.chat_limit)
            .field("chat_window", &self.chat_window)
            .field("render_limit", &self.render_limit)
            .field("lookup_limit", &self.lookup_limit)
            .field("history_limit", &self.history_limit)
            .field("log_filter", &self.log_filter)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind = match env_string_opt("CHATWIRE_BIND") {
            Some(value) => value
                .parse()
                .map_err(|error| ConfigError::invalid("CHATWIRE_BIND", &value, error))?,
            None => SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
        };

        Ok(Self {
            bind,
            store_dir: env_string_opt("CHATWIRE_STORE_DIR").map(PathBuf::from),
            chat_limit: env_number("CHATWIRE_CHAT_LIMIT", QuotaPolicy::CHAT_LIMIT)?,
            chat_window: Duration::from_secs(env_number(
                "CHATWIRE_CHAT_WINDOW_SECS",
                QuotaPolicy::CHAT_WINDOW.as_secs(),
            )?),
            render_limit: env_number("CHATWIRE_RENDER_LIMIT", QuotaPolicy::TOOL_LIMIT)?,
            lookup_limit: env_number("CHATWIRE_LOOKUP_LIMIT", QuotaPolicy::TOOL_LIMIT)?,
            history_limit: env_number("CHATWIRE_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?,
            log_filter: env_string_opt("CHATWIRE_LOG")
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            api_token: env_string_opt("CHATWIRE_API_TOKEN"),
        })
    }

    pub fn gate_settings(&self) -> GateSettings {
        GateSettings {
            chat_policy: QuotaPolicy::new(self.chat_limit, self.chat_window),
            tool_policies: HashMap::from([
                (
                    IMAGE_GENERATION_TOOL.to_string(),
                    QuotaPolicy::new(self.render_limit, QuotaPolicy::TOOL_WINDOW),
                ),
                (
                    DATA_LOOKUP_TOOL.to_string(),
                    QuotaPolicy::new(self.lookup_limit, QuotaPolicy::TOOL_WINDOW),
                ),
            ]),
            history_limit: self.history_limit,
            ..GateSettings::default()
        }
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value.trim().to_string())
        }
    })
}

fn env_number<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let Some(value) = env_string_opt(key) else {
        return Ok(default);
    };
    let parsed: T = value
        .parse()
        .map_err(|error| ConfigError::invalid(key, &value, error))?;
    if parsed <= T::default() {
        return Err(ConfigError::invalid(key, &value, "must be greater than zero"));
    }
    Ok(parsed)
}

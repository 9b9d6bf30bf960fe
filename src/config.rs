//! Process configuration, read once from the environment at startup.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

use crate::gemini::GeminiConfig;
use crate::phone::NumberingPlan;
use crate::webhook::WebhookConfig;
use crate::whatsapp::NgumzoConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub redis_url: String,
    pub redis_prefix: String,
    pub gemini: GeminiConfig,
    pub ngumzo: NgumzoConfig,
    pub webhook: WebhookConfig,
    pub numbering_plan: NumberingPlan,
    /// Send a WhatsApp confirmation to every new waiting list entry.
    pub send_confirmation: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let host = or_default("HOST", "127.0.0.1");
        let host: IpAddr = host.parse().map_err(|_| ConfigError::Invalid {
            key: "HOST",
            value: host.clone(),
            reason: "expected an IP address".to_string(),
        })?;
        let port = or_default("PORT", "3000");
        let port: u16 = port.parse().map_err(|_| ConfigError::Invalid {
            key: "PORT",
            value: port.clone(),
            reason: "expected a port number".to_string(),
        })?;

        let timeout_secs = or_default("UPSTREAM_TIMEOUT_SECS", "30");
        let timeout = match timeout_secs.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                return Err(ConfigError::Invalid {
                    key: "UPSTREAM_TIMEOUT_SECS",
                    value: timeout_secs,
                    reason: "expected a positive number of seconds".to_string(),
                })
            }
        };

        let country_code = or_default("PHONE_COUNTRY_CODE", "254");
        let numbering_plan = NumberingPlan::new(country_code.trim_start_matches('+'), '0', 9)
            .ok_or_else(|| ConfigError::Invalid {
                key: "PHONE_COUNTRY_CODE",
                value: country_code.clone(),
                reason: "expected 1 to 3 digits".to_string(),
            })?;

        let confirmation = or_default("WAITLIST_CONFIRMATION", "true");
        let send_confirmation = match confirmation.to_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => {
                return Err(ConfigError::Invalid {
                    key: "WAITLIST_CONFIRMATION",
                    value: confirmation,
                    reason: "expected true or false".to_string(),
                })
            }
        };

        let gemini = GeminiConfig {
            api_key: required("GEMINI_API_KEY")?,
            base_url: or_default("GEMINI_API_URL", &GeminiConfig::default().base_url),
            model: or_default("GEMINI_MODEL", &GeminiConfig::default().model),
            timeout,
        };
        let ngumzo = NgumzoConfig {
            api_key: required("NGUMZO_API_KEY")?,
            base_url: or_default("NGUMZO_API_URL", &NgumzoConfig::default().base_url),
            sender_id: required("NGUMZO_SENDER_ID")?,
            timeout,
        };
        let webhook = WebhookConfig {
            verify_token: get("WHATSAPP_VERIFY_TOKEN"),
            app_secret: get("WHATSAPP_APP_SECRET"),
        };

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            redis_url: or_default("REDIS_URL", "redis://127.0.0.1/"),
            redis_prefix: or_default("REDIS_KEY_PREFIX", "aisha"),
            gemini,
            ngumzo,
            webhook,
            numbering_plan,
            send_confirmation,
        })
    }
}

//! Service configuration from environment variables.
//!
//! Read once at start-up. Every key is optional; see [`ServiceConfig::default`]
//! for the values used when a key is unset.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use nightshift_invoicing::{CompositionOptions, MissingValuePolicy};
use nightshift_render::{ChromiumConfig, PoolConfig};

pub const BIND_ADDR: &str = "NIGHTSHIFT_BIND_ADDR";
pub const TEMPLATE_PATH: &str = "NIGHTSHIFT_TEMPLATE_PATH";
pub const TEMPLATE_RELOAD: &str = "NIGHTSHIFT_TEMPLATE_RELOAD";
pub const CURRENCY_SYMBOL: &str = "NIGHTSHIFT_CURRENCY_SYMBOL";
pub const STRICT_PLACEHOLDERS: &str = "NIGHTSHIFT_STRICT_PLACEHOLDERS";
pub const CHROMIUM_PATH: &str = "NIGHTSHIFT_CHROMIUM_PATH";
pub const CHROMIUM_NO_SANDBOX: &str = "NIGHTSHIFT_CHROMIUM_NO_SANDBOX";
pub const RENDER_POOL_SIZE: &str = "NIGHTSHIFT_RENDER_POOL_SIZE";
pub const RENDER_REUSE_CONTEXTS: &str = "NIGHTSHIFT_RENDER_REUSE_CONTEXTS";
pub const RENDER_ACQUIRE_TIMEOUT_MS: &str = "NIGHTSHIFT_RENDER_ACQUIRE_TIMEOUT_MS";
pub const RENDER_QUIESCENCE_TIMEOUT_MS: &str = "NIGHTSHIFT_RENDER_QUIESCENCE_TIMEOUT_MS";
pub const REQUEST_DEADLINE_MS: &str = "NIGHTSHIFT_REQUEST_DEADLINE_MS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    /// `None` uses the embedded invoice template.
    pub template_path: Option<PathBuf>,
    pub template_reload: bool,
    pub currency_symbol: String,
    /// Fail composition when a placeholder has no value instead of rendering it empty.
    pub strict_placeholders: bool,
    pub chromium: ChromiumConfig,
    pub pool: PoolConfig,
    pub quiescence_timeout: Duration,
    /// Upper bound on one request, end to end.
    pub request_deadline: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            template_path: None,
            template_reload: false,
            currency_symbol: CompositionOptions::default().currency_symbol,
            strict_placeholders: false,
            chromium: ChromiumConfig::default(),
            pool: PoolConfig::default(),
            quiescence_timeout: Duration::from_secs(30),
            request_deadline: Duration::from_secs(60),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let env = Env { lookup: &lookup };

        let chromium = ChromiumConfig {
            binary: env
                .string(CHROMIUM_PATH)
                .map(PathBuf::from)
                .unwrap_or(defaults.chromium.binary.clone()),
            no_sandbox: env.flag(CHROMIUM_NO_SANDBOX, defaults.chromium.no_sandbox)?,
            ..defaults.chromium.clone()
        };

        let pool = PoolConfig {
            max_contexts: env.parse(RENDER_POOL_SIZE, defaults.pool.max_contexts)?,
            acquire_timeout: env.millis(RENDER_ACQUIRE_TIMEOUT_MS, defaults.pool.acquire_timeout)?,
            reuse_contexts: env.flag(RENDER_REUSE_CONTEXTS, defaults.pool.reuse_contexts)?,
        };
        if pool.max_contexts == 0 {
            return Err(ConfigError::Invalid {
                key: RENDER_POOL_SIZE,
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            bind_addr: env.parse(BIND_ADDR, defaults.bind_addr)?,
            template_path: env.string(TEMPLATE_PATH).map(PathBuf::from),
            template_reload: env.flag(TEMPLATE_RELOAD, defaults.template_reload)?,
            currency_symbol: lookup(CURRENCY_SYMBOL).unwrap_or(defaults.currency_symbol),
            strict_placeholders: env.flag(STRICT_PLACEHOLDERS, defaults.strict_placeholders)?,
            chromium,
            pool,
            quiescence_timeout: env.millis(RENDER_QUIESCENCE_TIMEOUT_MS, defaults.quiescence_timeout)?,
            request_deadline: env.millis(REQUEST_DEADLINE_MS, defaults.request_deadline)?,
        })
    }

    pub fn composition_options(&self) -> CompositionOptions {
        CompositionOptions {
            currency_symbol: self.currency_symbol.clone(),
            missing_values: if self.strict_placeholders {
                MissingValuePolicy::Fail
            } else {
                MissingValuePolicy::RenderEmpty
            },
        }
    }
}

struct Env<'a, F> {
    lookup: &'a F,
}

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed, non-empty value.
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: core::fmt::Display,
    {
        match self.string(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.string(key) {
            None => Ok(default),
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    key,
                    value: raw,
                    reason: "expected true/false".into(),
                }),
            },
        }
    }

    fn millis(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        let ms: u64 = self.parse(key, default.as_millis() as u64)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<ServiceConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.template_path, None);
        assert_eq!(cfg.currency_symbol, "₹");
        assert_eq!(cfg.pool.max_contexts, 4);
        assert!(cfg.chromium.no_sandbox);
        assert_eq!(cfg.request_deadline, Duration::from_secs(60));
        assert_eq!(cfg.composition_options().missing_values, MissingValuePolicy::RenderEmpty);
    }

    #[test]
    fn values_are_read_from_lookup() {
        let cfg = config(&[
            (BIND_ADDR, "127.0.0.1:9000"),
            (TEMPLATE_PATH, "/srv/invoice.html"),
            (TEMPLATE_RELOAD, "yes"),
            (CURRENCY_SYMBOL, "$"),
            (STRICT_PLACEHOLDERS, "true"),
            (CHROMIUM_PATH, "/usr/bin/google-chrome"),
            (CHROMIUM_NO_SANDBOX, "0"),
            (RENDER_POOL_SIZE, "8"),
            (RENDER_REUSE_CONTEXTS, "off"),
            (RENDER_ACQUIRE_TIMEOUT_MS, "250"),
            (RENDER_QUIESCENCE_TIMEOUT_MS, "1500"),
            (REQUEST_DEADLINE_MS, "9000"),
        ])
        .unwrap();

        assert_eq!(cfg.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(cfg.template_path, Some(PathBuf::from("/srv/invoice.html")));
        assert!(cfg.template_reload);
        assert_eq!(cfg.currency_symbol, "$");
        assert_eq!(cfg.composition_options().missing_values, MissingValuePolicy::Fail);
        assert_eq!(cfg.chromium.binary, PathBuf::from("/usr/bin/google-chrome"));
        assert!(!cfg.chromium.no_sandbox);
        assert_eq!(cfg.pool.max_contexts, 8);
        assert!(!cfg.pool.reuse_contexts);
        assert_eq!(cfg.pool.acquire_timeout, Duration::from_millis(250));
        assert_eq!(cfg.quiescence_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.request_deadline, Duration::from_millis(9000));
    }

    #[test]
    fn empty_currency_symbol_is_allowed() {
        assert_eq!(config(&[(CURRENCY_SYMBOL, "")]).unwrap().currency_symbol, "");
    }

    #[test]
    fn bad_number_names_the_key() {
        let err = config(&[(RENDER_POOL_SIZE, "many")]).unwrap_err();
        assert!(err.to_string().starts_with(RENDER_POOL_SIZE));
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        assert!(config(&[(RENDER_POOL_SIZE, "0")]).is_err());
    }

    #[test]
    fn bad_flag_is_rejected() {
        let err = config(&[(TEMPLATE_RELOAD, "maybe")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: TEMPLATE_RELOAD,
                value: "maybe".into(),
                reason: "expected true/false".into(),
            }
        );
    }
}

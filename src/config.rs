use std::str::FromStr;

use strum_macros::{Display, EnumString};

use crate::ast::CachePolicy;

/// Byte order used when memory words are assembled from bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum WordOrder {
    Big,
    Little,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `tracing_subscriber` filter directive, e.g. `watchexpr=debug`.
    pub log_filter: String,

    pub memory_size: usize,
    pub word_order: WordOrder,

    /// Policy roots are re-evaluated with on a per-step refresh.
    pub refresh_policy: CachePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_filter: "warn".to_owned(),
            memory_size: 0x1_00_00,
            word_order: WordOrder::Big,
            refresh_policy: CachePolicy::UseNonVolatiles,
        }
    }
}

impl Config {
    pub fn from_env() -> Config {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset or unparseable keys
    /// keep their default.
    pub fn from_lookup<F>(lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(filter) = lookup("WATCHEXPR_LOG") {
            config.log_filter = filter;
        }

        if let Some(size) = lookup("WATCHEXPR_MEMORY_SIZE") {
            match parse_size(&size) {
                Some(size) => config.memory_size = size,
                None => tracing::warn!("ignoring WATCHEXPR_MEMORY_SIZE={size}"),
            }
        }

        if let Some(order) = lookup("WATCHEXPR_WORD_ORDER") {
            match WordOrder::from_str(order.trim()) {
                Ok(order) => config.word_order = order,
                Err(_) => tracing::warn!("ignoring WATCHEXPR_WORD_ORDER={order}"),
            }
        }

        if let Some(policy) = lookup("WATCHEXPR_REFRESH_POLICY") {
            match CachePolicy::from_str(policy.trim()) {
                Ok(policy) => config.refresh_policy = policy,
                Err(_) => tracing::warn!("ignoring WATCHEXPR_REFRESH_POLICY={policy}"),
            }
        }

        config
    }
}

fn parse_size(s: &str) -> Option<usize> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

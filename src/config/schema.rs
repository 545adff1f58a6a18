//! Daemon configuration document, per spec §6. Every section carries
//! `#[serde(default)]` so unknown or missing keys never break startup,
//! following the teacher's `config/schema.rs` split of "schema struct +
//! default fns". Secret-bearing structs get a redacting `Debug` impl via
//! the teacher's `redact_debug!` macro so `tracing::debug!("{:?}",
//! config)` never leaks a token.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Generates a `Debug` impl that redacts secret fields. Lifted verbatim
/// from the teacher's `config/schema.rs`.
macro_rules! redact_debug {
    (@field $builder:ident, $self:ident, redact($field:ident)) => {
        $builder.field(
            stringify!($field),
            &if $self.$field.is_empty() { "[empty]" } else { "[REDACTED]" },
        );
    };
    (@field $builder:ident, $self:ident, redact_option($field:ident)) => {
        $builder.field(stringify!($field), &$self.$field.as_ref().map(|_| "[REDACTED]"));
    };
    (@field $builder:ident, $self:ident, $field:ident) => {
        $builder.field(stringify!($field), &$self.$field);
    };
    (@fields $builder:ident, $self:ident,) => {};
    (@fields $builder:ident, $self:ident, redact($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, redact_option($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact_option($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, $field:ident, $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, $field);
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    ($struct_name:ident, $($fields:tt)*) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut builder = f.debug_struct(stringify!($struct_name));
                redact_debug!(@fields builder, self, $($fields)*);
                builder.finish()
            }
        }
    };
}

fn default_true() -> bool {
    true
}

fn default_max_messages_per_minute() -> u32 {
    60
}

fn default_code_ttl_seconds() -> i64 {
    300
}

fn default_idle_timeout_seconds() -> u64 {
    300
}

/// Idle-reaper sweep cadence, per spec §4.4 ("configurable interval,
/// default every 5 minutes") — distinct from `idle_timeout_seconds`, the
/// threshold a session's `last_active` must fall behind to be reaped.
fn default_reap_interval_seconds() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub channels: HashMap<String, ChannelConfig>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cron: CronConfig,
    #[serde(default = "default_files_dir")]
    pub files_dir: PathBuf,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channels: HashMap::new(),
            auth: AuthConfig::default(),
            cron: CronConfig::default(),
            files_dir: default_files_dir(),
            admin: AdminConfig::default(),
            agents: HashMap::new(),
        }
    }
}

fn default_files_dir() -> PathBuf {
    PathBuf::from("files")
}

/// One configured channel instance: `{ type, ...channel-specific }`. The
/// channel-specific keys are kept as a raw `Value` and deserialized by the
/// concrete adapter's own config struct at construction time (per spec
/// §4.1, the registry resolves `type` to a factory that does this).
#[derive(Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(rename = "type")]
    pub channel_type: String,
    #[serde(flatten)]
    pub settings: serde_json::Value,
}

redact_debug!(ChannelConfig, channel_type, settings);

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_pairing_db_path")]
    pub pairing_db_path: PathBuf,
    #[serde(default = "default_max_messages_per_minute")]
    pub max_messages_per_minute: u32,
    #[serde(default = "default_code_ttl_seconds")]
    pub code_ttl_seconds: i64,
    #[serde(default = "default_idle_timeout_seconds")]
    pub idle_timeout_seconds: u64,
    #[serde(default = "default_reap_interval_seconds")]
    pub reap_interval_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            pairing_db_path: default_pairing_db_path(),
            max_messages_per_minute: default_max_messages_per_minute(),
            code_ttl_seconds: default_code_ttl_seconds(),
            idle_timeout_seconds: default_idle_timeout_seconds(),
            reap_interval_seconds: default_reap_interval_seconds(),
        }
    }
}

redact_debug!(
    AuthConfig,
    pairing_db_path,
    max_messages_per_minute,
    code_ttl_seconds,
    idle_timeout_seconds,
    reap_interval_seconds,
);

fn default_pairing_db_path() -> PathBuf {
    crate::utils::home_dir()
        .map(|h| h.join("pairing.json"))
        .unwrap_or_else(|_| PathBuf::from("pairing.json"))
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CronConfig {
    #[serde(default = "default_cron_log_path")]
    pub log_path: PathBuf,
    #[serde(default)]
    pub jobs: Vec<CronJobConfig>,
}

fn default_cron_log_path() -> PathBuf {
    crate::utils::home_dir()
        .map(|h| h.join("cron.log.jsonl"))
        .unwrap_or_else(|_| PathBuf::from("cron.log.jsonl"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJobConfig {
    pub name: String,
    pub cron: String,
    pub recipe: String,
    #[serde(default)]
    pub context: serde_json::Value,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub token: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: String::new(),
        }
    }
}

redact_debug!(AdminConfig, enabled, redact(token));

impl AdminConfig {
    /// Admin only mounts iff enabled and token non-empty (fail-closed), per
    /// spec §4.8.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.token.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub workspace: PathBuf,
    #[serde(default)]
    pub heartbeat_channels: Vec<String>,
    #[serde(default = "default_true")]
    pub heartbeat_enabled: bool,
    #[serde(default = "default_heartbeat_interval_seconds")]
    pub heartbeat_interval_seconds: u64,
}

fn default_heartbeat_interval_seconds() -> u64 {
    3600
}

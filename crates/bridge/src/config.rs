use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

fn parse_agent_id_alias(raw: &str) -> Result<(String, String), String> {
    let (old, new) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected OLD=NEW, got {raw:?}"))?;
    if old.is_empty() || new.is_empty() {
        return Err(format!("expected OLD=NEW, got {raw:?}"));
    }
    Ok((old.to_string(), new.to_string()))
}

/// Configuration surface for the bridge binary. Non-secret fields may also
/// be supplied via an optional TOML file (`--config-file`); flags and env
/// vars always take precedence over the file.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "bridge",
    about = "Bridges a realtime agent gateway to an HTTP state store",
    version
)]
pub struct Cli {
    #[arg(long = "gateway-url", env = "GATEWAY_URL")]
    pub gateway_url: String,

    #[arg(long = "gateway-token", env = "GATEWAY_TOKEN")]
    pub gateway_token: String,

    #[arg(long = "client-id", env = "CLIENT_ID", default_value = "bridge")]
    pub client_id: String,

    #[arg(
        long = "client-version",
        env = "CLIENT_VERSION",
        default_value = env!("CARGO_PKG_VERSION")
    )]
    pub client_version: String,

    #[arg(long = "state-store-url", env = "STATE_STORE_URL")]
    pub state_store_url: String,

    #[arg(long = "state-store-secret", env = "STATE_STORE_SECRET")]
    pub state_store_secret: String,

    #[arg(
        long = "reconnect-interval-ms",
        env = "RECONNECT_INTERVAL_MS",
        default_value_t = 1_000
    )]
    pub reconnect_interval_ms: u64,

    #[arg(
        long = "max-reconnect-attempts",
        env = "MAX_RECONNECT_ATTEMPTS",
        default_value_t = 0,
        help = "0 = unlimited"
    )]
    pub max_reconnect_attempts: u32,

    #[arg(long = "batch-size", env = "BATCH_SIZE", default_value_t = 25)]
    pub batch_size: usize,

    #[arg(
        long = "batch-interval-ms",
        env = "BATCH_INTERVAL_MS",
        default_value_t = 2_000
    )]
    pub batch_interval_ms: u64,

    #[arg(
        long = "request-timeout-ms",
        env = "REQUEST_TIMEOUT_MS",
        default_value_t = 10_000
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "agent-id-alias",
        value_parser = parse_agent_id_alias,
        help = "Repeatable OLD=NEW agent id alias"
    )]
    pub agent_id_alias: Vec<(String, String)>,

    #[arg(long = "control-port", env = "CONTROL_PORT", default_value_t = 8787)]
    pub control_port: u16,

    #[arg(long = "control-secret", env = "CONTROL_SECRET")]
    pub control_secret: Option<String>,

    #[arg(
        long = "poll-interval-ms",
        env = "POLL_INTERVAL_MS",
        default_value_t = 2_000
    )]
    pub poll_interval_ms: u64,

    #[arg(
        long = "poll-batch-size",
        env = "POLL_BATCH_SIZE",
        default_value_t = 25
    )]
    pub poll_batch_size: usize,

    #[arg(
        long = "retry-backoff-ms",
        env = "RETRY_BACKOFF_MS",
        default_value_t = 5_000
    )]
    pub retry_backoff_ms: u64,

    #[arg(long = "history-limit", env = "HISTORY_LIMIT", default_value_t = 50)]
    pub history_limit: usize,

    #[arg(
        long = "gap-threshold-ms",
        env = "GAP_THRESHOLD_MS",
        default_value_t = 5_000
    )]
    pub gap_threshold_ms: u64,

    #[arg(
        long = "busy-activity-window-ms",
        env = "BUSY_ACTIVITY_WINDOW_MS",
        default_value_t = 120_000
    )]
    pub busy_activity_window_ms: u64,

    #[arg(
        long = "control-max-body-bytes",
        env = "CONTROL_MAX_BODY_BYTES",
        default_value_t = 1_048_576
    )]
    pub control_max_body_bytes: usize,

    #[arg(
        long = "config-file",
        env = "BRIDGE_CONFIG_FILE",
        help = "Optional TOML file layering non-secret overrides beneath flags/env"
    )]
    pub config_file: Option<PathBuf>,
}

/// Non-secret overrides loadable from `--config-file`. Every field is
/// optional; anything present in the file fills in a value the caller left
/// at its built-in default, never a value set explicitly via flag or env.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileOverrides {
    reconnect_interval_ms: Option<u64>,
    max_reconnect_attempts: Option<u32>,
    batch_size: Option<usize>,
    batch_interval_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    agent_id_aliases: Option<HashMap<String, String>>,
    control_port: Option<u16>,
    poll_interval_ms: Option<u64>,
    poll_batch_size: Option<usize>,
    retry_backoff_ms: Option<u64>,
    history_limit: Option<usize>,
    gap_threshold_ms: Option<u64>,
    busy_activity_window_ms: Option<u64>,
    control_max_body_bytes: Option<usize>,
}

impl Cli {
    /// Parses CLI flags/env, then layers in any optional TOML config file,
    /// and finally collapses `agent_id_alias` into a lookup map.
    pub fn load() -> Result<ResolvedConfig> {
        let mut cli = Cli::parse();
        let mut agent_id_aliases: HashMap<String, String> =
            cli.agent_id_alias.iter().cloned().collect();

        if let Some(path) = cli.config_file.clone() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            let overrides: FileOverrides = toml::from_str(&contents)
                .with_context(|| format!("failed to parse config file {}", path.display()))?;
            if let Some(file_aliases) = overrides.agent_id_aliases.clone() {
                for (old, new) in file_aliases {
                    agent_id_aliases.entry(old).or_insert(new);
                }
            }
            cli.apply_file_overrides(overrides);
        }

        Ok(ResolvedConfig {
            cli,
            agent_id_aliases,
        })
    }

    fn apply_file_overrides(&mut self, overrides: FileOverrides) {
        let defaults = Cli::default_scalars();
        if self.reconnect_interval_ms == defaults.reconnect_interval_ms {
            if let Some(v) = overrides.reconnect_interval_ms {
                self.reconnect_interval_ms = v;
            }
        }
        if self.max_reconnect_attempts == defaults.max_reconnect_attempts {
            if let Some(v) = overrides.max_reconnect_attempts {
                self.max_reconnect_attempts = v;
            }
        }
        if self.batch_size == defaults.batch_size {
            if let Some(v) = overrides.batch_size {
                self.batch_size = v;
            }
        }
        if self.batch_interval_ms == defaults.batch_interval_ms {
            if let Some(v) = overrides.batch_interval_ms {
                self.batch_interval_ms = v;
            }
        }
        if self.request_timeout_ms == defaults.request_timeout_ms {
            if let Some(v) = overrides.request_timeout_ms {
                self.request_timeout_ms = v;
            }
        }
        if self.control_port == defaults.control_port {
            if let Some(v) = overrides.control_port {
                self.control_port = v;
            }
        }
        if self.poll_interval_ms == defaults.poll_interval_ms {
            if let Some(v) = overrides.poll_interval_ms {
                self.poll_interval_ms = v;
            }
        }
        if self.poll_batch_size == defaults.poll_batch_size {
            if let Some(v) = overrides.poll_batch_size {
                self.poll_batch_size = v;
            }
        }
        if self.retry_backoff_ms == defaults.retry_backoff_ms {
            if let Some(v) = overrides.retry_backoff_ms {
                self.retry_backoff_ms = v;
            }
        }
        if self.history_limit == defaults.history_limit {
            if let Some(v) = overrides.history_limit {
                self.history_limit = v;
            }
        }
        if self.gap_threshold_ms == defaults.gap_threshold_ms {
            if let Some(v) = overrides.gap_threshold_ms {
                self.gap_threshold_ms = v;
            }
        }
        if self.busy_activity_window_ms == defaults.busy_activity_window_ms {
            if let Some(v) = overrides.busy_activity_window_ms {
                self.busy_activity_window_ms = v;
            }
        }
        if self.control_max_body_bytes == defaults.control_max_body_bytes {
            if let Some(v) = overrides.control_max_body_bytes {
                self.control_max_body_bytes = v;
            }
        }
    }

    /// The hardcoded defaults declared on the `#[arg(default_value_t = ...)]`
    /// attributes above, used to detect whether a flag/env var was left
    /// unset (and therefore eligible for a file override).
    fn default_scalars() -> DefaultScalars {
        DefaultScalars {
            reconnect_interval_ms: 1_000,
            max_reconnect_attempts: 0,
            batch_size: 25,
            batch_interval_ms: 2_000,
            request_timeout_ms: 10_000,
            control_port: 8787,
            poll_interval_ms: 2_000,
            poll_batch_size: 25,
            retry_backoff_ms: 5_000,
            history_limit: 50,
            gap_threshold_ms: 5_000,
            busy_activity_window_ms: 120_000,
            control_max_body_bytes: 1_048_576,
        }
    }
}

struct DefaultScalars {
    reconnect_interval_ms: u64,
    max_reconnect_attempts: u32,
    batch_size: usize,
    batch_interval_ms: u64,
    request_timeout_ms: u64,
    control_port: u16,
    poll_interval_ms: u64,
    poll_batch_size: usize,
    retry_backoff_ms: u64,
    history_limit: usize,
    gap_threshold_ms: u64,
    busy_activity_window_ms: u64,
    control_max_body_bytes: usize,
}

/// The fully resolved configuration the orchestrator runs with.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub cli: Cli,
    pub agent_id_aliases: HashMap<String, String>,
}

impl std::ops::Deref for ResolvedConfig {
    type Target = Cli;

    fn deref(&self) -> &Cli {
        &self.cli
    }
}

use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use wyvern_core::error::{ActionError, Result};
use wyvern_core::traits::Action;

use super::parse_config;
use crate::backoff::Backoff;

pub const PLUGIN: &str = "command";

/// Hours of the day during which the command may start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveHours {
    /// Start hour (0-23), inclusive.
    pub start_hour: u8,
    /// End hour (0-23), exclusive.
    pub end_hour: u8,
    /// Simple UTC offset in hours (e.g., 2 for UTC+2). Default: 0
    #[serde(default)]
    pub utc_offset_hours: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CommandConfig {
    command: String,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    max_backoff_ms: u64,
    #[serde(default)]
    active_hours: Option<ActiveHours>,
}

fn default_timeout_secs() -> u64 { 120 }
fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff_ms() -> u64 { 1000 }
fn default_max_backoff_ms() -> u64 { 60_000 }

/// Runs a shell command. Failures are retried with exponential backoff
/// until `max_retries` retries have been spent.
#[derive(Debug, Default)]
pub struct CommandAction {
    config: Option<CommandConfig>,
}

impl CommandAction {
    fn backoff(config: &CommandConfig) -> Backoff {
        Backoff::new(config.initial_backoff_ms, config.max_backoff_ms)
    }

    fn failure(config: &CommandConfig, attempt: u32, message: String) -> ActionError {
        if attempt < config.max_retries {
            let at = Self::backoff(config).next_wake(attempt);
            warn!(command = %config.command, attempt, retry_at = %at, "Command failed, will retry");
            ActionError::retry_at(message, at)
        } else {
            warn!(command = %config.command, attempt, "Command failed, retries exhausted");
            ActionError::fatal(message)
        }
    }
}

impl Action for CommandAction {
    fn plugin(&self) -> &str {
        PLUGIN
    }

    fn plugin_config(&self) -> serde_json::Value {
        self.config
            .as_ref()
            .and_then(|c| serde_json::to_value(c).ok())
            .unwrap_or(serde_json::Value::Null)
    }

    fn from_config(&mut self, config: &serde_json::Value) -> Result<()> {
        self.config = Some(parse_config(PLUGIN, config)?);
        Ok(())
    }

    fn condition(&self) -> bool {
        match self.config.as_ref().and_then(|c| c.active_hours.as_ref()) {
            Some(ah) => is_within_window(Utc::now(), ah.start_hour, ah.end_hour, ah.utc_offset_hours),
            None => true,
        }
    }

    fn execute(&self, attempt: u32) -> BoxFuture<'_, std::result::Result<(), ActionError>> {
        Box::pin(async move {
            let config = self
                .config
                .as_ref()
                .ok_or_else(|| ActionError::fatal("command action was never configured"))?;

            debug!(command = %config.command, attempt, "Executing command");

            let timeout = Duration::from_secs(config.timeout_secs);
            let result = tokio::time::timeout(timeout, async {
                tokio::process::Command::new("sh")
                    .arg("-c")
                    .arg(&config.command)
                    .kill_on_drop(true)
                    .output()
                    .await
            })
            .await;

            match result {
                Ok(Ok(output)) if output.status.success() => Ok(()),
                Ok(Ok(output)) => {
                    let code = output.status.code().unwrap_or(-1);
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(Self::failure(
                        config,
                        attempt,
                        format!("exit code {}: {}", code, stderr.trim()),
                    ))
                }
                // Spawn failures will not fix themselves
                Ok(Err(e)) => Err(ActionError::fatal(format!("spawn failed: {}", e))),
                Err(_) => Err(Self::failure(
                    config,
                    attempt,
                    format!("timed out after {}s", config.timeout_secs),
                )),
            }
        })
    }
}

/// Check whether `now` (UTC) falls within the `start_hour..end_hour` window
/// after applying `utc_offset_hours`. Supports wrapping windows (22..06).
fn is_within_window(now: DateTime<Utc>, start_hour: u8, end_hour: u8, utc_offset_hours: i32) -> bool {
    let local_hour = ((now.hour() as i32 + utc_offset_hours).rem_euclid(24)) as u8;

    if start_hour <= end_hour {
        local_hour >= start_hour && local_hour < end_hour
    } else {
        local_hour >= start_hour || local_hour < end_hour
    }
}

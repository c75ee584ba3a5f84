use std::io::Write;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use wyvern_core::error::{ActionError, Result};
use wyvern_core::traits::Action;

use super::parse_config;

pub const PLUGIN: &str = "print";

/// Where a print action writes.
#[derive(Debug, Clone, Default)]
pub enum PrintTarget {
    #[default]
    Stdout,
    Buffer(Arc<Mutex<String>>),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PrintConfig {
    msg: String,
}

/// Writes its message verbatim (no trailing newline) and succeeds.
#[derive(Debug, Default)]
pub struct PrintAction {
    config: PrintConfig,
    target: PrintTarget,
}

impl PrintAction {
    pub fn with_target(target: PrintTarget) -> Self {
        Self {
            config: PrintConfig::default(),
            target,
        }
    }

    pub fn msg(&self) -> &str {
        &self.config.msg
    }
}

impl Action for PrintAction {
    fn plugin(&self) -> &str {
        PLUGIN
    }

    fn plugin_config(&self) -> serde_json::Value {
        serde_json::json!({ "msg": self.config.msg })
    }

    fn from_config(&mut self, config: &serde_json::Value) -> Result<()> {
        self.config = parse_config(PLUGIN, config)?;
        Ok(())
    }

    fn execute(&self, _attempt: u32) -> BoxFuture<'_, std::result::Result<(), ActionError>> {
        Box::pin(async move {
            match &self.target {
                PrintTarget::Stdout => {
                    let mut out = std::io::stdout().lock();
                    out.write_all(self.config.msg.as_bytes())
                        .and_then(|_| out.flush())
                        .map_err(|e| ActionError::fatal(format!("print failed: {}", e)))?;
                }
                PrintTarget::Buffer(buf) => {
                    let mut buf = buf
                        .lock()
                        .map_err(|e| ActionError::fatal(format!("print buffer poisoned: {}", e)))?;
                    buf.push_str(&self.config.msg);
                }
            }
            tracing::debug!(msg = %self.config.msg, "Printed");
            Ok(())
        })
    }
}

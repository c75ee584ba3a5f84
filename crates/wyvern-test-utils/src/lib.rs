//! Test helpers for Wyvern: a scripted action whose outcomes are fixed up
//! front, a tally to observe it, and registry/config fixtures.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use wyvern_actions::{ActionRegistry, PrintAction, PrintTarget};
use wyvern_core::config::{FlapConfig, SoarConfig};
use wyvern_core::error::{ActionError, Result, WyvernError};
use wyvern_core::traits::Action;

pub const SCRIPTED_PLUGIN: &str = "scripted";

/// Result of one scripted execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    Fatal,
    RetryAfterMs(u64),
    Panic,
}

#[derive(Debug, Default)]
struct TallyState {
    calls: Mutex<Vec<(String, u32)>>,
    blocked: AtomicBool,
    condition_panics: AtomicBool,
}

/// Shared view into what scripted actions did.
#[derive(Debug, Clone, Default)]
pub struct Tally {
    state: Arc<TallyState>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, label: &str, attempt: u32) {
        if let Ok(mut calls) = self.state.calls.lock() {
            calls.push((label.to_string(), attempt));
        }
    }

    fn calls(&self) -> Vec<(String, u32)> {
        self.state
            .calls
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Total executions across every action sharing this tally.
    pub fn executions(&self) -> usize {
        self.calls().len()
    }

    /// Attempt numbers passed to `execute`, in call order.
    pub fn attempts(&self) -> Vec<u32> {
        self.calls().into_iter().map(|(_, a)| a).collect()
    }

    /// Labels of executed actions, in call order.
    pub fn order(&self) -> Vec<String> {
        self.calls().into_iter().map(|(l, _)| l).collect()
    }

    /// Executions of the action labelled `label`.
    pub fn executions_of(&self, label: &str) -> usize {
        self.calls().iter().filter(|(l, _)| l == label).count()
    }

    /// Drive `Action::condition` for every action sharing this tally.
    pub fn set_condition(&self, ready: bool) {
        self.state.blocked.store(!ready, Ordering::SeqCst);
    }

    /// Make `Action::condition` panic for every action sharing this tally.
    pub fn panic_in_condition(&self) {
        self.state.condition_panics.store(true, Ordering::SeqCst);
    }

    fn condition(&self) -> bool {
        if self.state.condition_panics.load(Ordering::SeqCst) {
            panic!("scripted condition panic");
        }
        !self.state.blocked.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ScriptConfig {
    #[serde(default)]
    label: String,
    #[serde(default)]
    outcomes: Vec<Outcome>,
}

/// Action that replays a fixed list of outcomes. Once the list runs out the
/// last outcome repeats; an empty list always succeeds.
#[derive(Debug, Default)]
pub struct ScriptedAction {
    config: ScriptConfig,
    calls: AtomicUsize,
    tally: Tally,
}

impl ScriptedAction {
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        Self {
            config: ScriptConfig {
                label: String::new(),
                outcomes,
            },
            ..Self::default()
        }
    }

    pub fn always_ok() -> Self {
        Self::new(vec![Outcome::Ok])
    }

    pub fn with_tally(tally: Tally) -> Self {
        Self {
            tally,
            ..Self::default()
        }
    }

    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.config.label = label.into();
        self
    }

    pub fn tally(&self) -> Tally {
        self.tally.clone()
    }

    fn next_outcome(&self) -> Outcome {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.config
            .outcomes
            .get(n)
            .or_else(|| self.config.outcomes.last())
            .copied()
            .unwrap_or(Outcome::Ok)
    }
}

impl Action for ScriptedAction {
    fn plugin(&self) -> &str {
        SCRIPTED_PLUGIN
    }

    fn plugin_config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
    }

    fn from_config(&mut self, config: &serde_json::Value) -> Result<()> {
        self.config = serde_json::from_value(config.clone()).map_err(|e| {
            WyvernError::InvalidPluginConfig {
                plugin: SCRIPTED_PLUGIN.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(())
    }

    fn condition(&self) -> bool {
        self.tally.condition()
    }

    fn execute(&self, attempt: u32) -> BoxFuture<'_, std::result::Result<(), ActionError>> {
        Box::pin(async move {
            self.tally.record(&self.config.label, attempt);
            match self.next_outcome() {
                Outcome::Ok => Ok(()),
                Outcome::Fatal => Err(ActionError::fatal("scripted failure")),
                Outcome::RetryAfterMs(ms) => Err(ActionError::retry_after(
                    "scripted retry",
                    Duration::from_millis(ms),
                )),
                Outcome::Panic => panic!("scripted panic"),
            }
        })
    }
}

/// Registry fixture: the built-ins, with `print` writing into a shared
/// buffer, plus `scripted` actions reporting to one tally.
pub struct Fixture {
    pub registry: ActionRegistry,
    pub output: Arc<Mutex<String>>,
    pub tally: Tally,
}

impl Fixture {
    pub fn new() -> Self {
        let output = Arc::new(Mutex::new(String::new()));
        let tally = Tally::new();
        let mut registry = ActionRegistry::with_builtins();

        let buffer = output.clone();
        registry.register(wyvern_actions::builtin::print::PLUGIN, move || {
            Box::new(PrintAction::with_target(PrintTarget::Buffer(buffer.clone())))
        });
        let shared = tally.clone();
        registry.register(SCRIPTED_PLUGIN, move || {
            Box::new(ScriptedAction::with_tally(shared.clone()))
        });

        Self {
            registry,
            output,
            tally,
        }
    }

    /// Everything print actions have written so far.
    pub fn output(&self) -> String {
        self.output.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A `print` flap.
pub fn print_flap(name: &str, msg: &str) -> FlapConfig {
    FlapConfig::new(name, "print").with_config(serde_json::json!({ "msg": msg }))
}

/// A `scripted` flap labelled with its own name.
pub fn scripted_flap(name: &str, outcomes: &[Outcome]) -> FlapConfig {
    FlapConfig::new(name, SCRIPTED_PLUGIN)
        .with_config(serde_json::json!({ "label": name, "outcomes": outcomes }))
}

/// The two-flap hello world soar: "hello " then "world".
pub fn hello_world() -> SoarConfig {
    SoarConfig {
        name: "hello".to_string(),
        flaps: vec![
            print_flap("hello", "hello ").before("world"),
            print_flap("world", "world"),
        ],
    }
}

/// Poll `check` every few milliseconds until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

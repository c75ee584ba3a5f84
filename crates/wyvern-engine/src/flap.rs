use std::panic::AssertUnwindSafe;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tracing::{debug, info, warn};

use wyvern_actions::ActionRegistry;
use wyvern_core::config::FlapConfig;
use wyvern_core::error::{Result, TickError};
use wyvern_core::traits::Action;
use wyvern_core::types::{FlapId, FlapRecord, FlapState};

/// What a successful tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ticked {
    /// The action ran and succeeded; the flap is now `Success`.
    Succeeded,
    /// The action failed with a retryable error; woken again at `at`.
    Retrying { at: DateTime<Utc> },
}

/// One node of a soar: identity, edges, retry bookkeeping, and its action.
///
/// Neighbors are stored as IDs and always resolved through a `FlapIndex`.
pub struct Flap {
    id: FlapId,
    conf_name: String,
    prev_ids: Vec<FlapId>,
    next_ids: Vec<FlapId>,
    state: FlapState,
    start: DateTime<Utc>,
    next_awake_time: Option<DateTime<Utc>>,
    attempt_retry_count: u32,
    action: Box<dyn Action>,
}

impl std::fmt::Debug for Flap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flap")
            .field("id", &self.id)
            .field("conf_name", &self.conf_name)
            .field("prev_ids", &self.prev_ids)
            .field("next_ids", &self.next_ids)
            .field("state", &self.state)
            .field("attempt_retry_count", &self.attempt_retry_count)
            .field("plugin", &self.action.plugin())
            .finish()
    }
}

impl Flap {
    /// Create a flap in `Wait` around an already hydrated action.
    pub fn new(id: FlapId, conf_name: impl Into<String>, action: Box<dyn Action>) -> Self {
        Self {
            id,
            conf_name: conf_name.into(),
            prev_ids: vec![],
            next_ids: vec![],
            state: FlapState::Wait,
            start: Utc::now(),
            next_awake_time: None,
            attempt_retry_count: 0,
            action,
        }
    }

    /// Build a flap from configuration, instantiating its action via the registry.
    /// Edges are resolved later by the soar builder.
    pub fn from_config(config: &FlapConfig, id: FlapId, registry: &ActionRegistry) -> Result<Self> {
        let action = registry.make(&config.plugin, &config.plugin_config)?;
        Ok(Self::new(id, config.name.clone(), action))
    }

    /// Recreate a flap from a persisted record, edges and state included.
    pub fn from_record(record: &FlapRecord, registry: &ActionRegistry) -> Result<Self> {
        let action = registry.make(&record.plugin, &record.plugin_config)?;
        let mut flap = Self::new(record.id.clone(), record.conf_name.clone(), action);
        flap.prev_ids = record.prev_ids.clone();
        flap.next_ids = record.next_ids.clone();
        flap.load(record);
        Ok(flap)
    }

    /// Hydrate execution state from a record. Identity, edges, and action
    /// are left untouched.
    pub fn load(&mut self, record: &FlapRecord) {
        self.state = record.state;
        self.start = record.start;
        self.next_awake_time = record.next_awake_time;
        self.attempt_retry_count = record.attempt_retry_count;
    }

    /// Serializable snapshot.
    pub fn record(&self) -> FlapRecord {
        FlapRecord {
            id: self.id.clone(),
            conf_name: self.conf_name.clone(),
            prev_ids: self.prev_ids.clone(),
            next_ids: self.next_ids.clone(),
            state: self.state,
            start: self.start,
            next_awake_time: self.next_awake_time,
            attempt_retry_count: self.attempt_retry_count,
            plugin: self.action.plugin().to_string(),
            plugin_config: self.action.plugin_config(),
        }
    }

    pub fn id(&self) -> &FlapId {
        &self.id
    }

    pub fn conf_name(&self) -> &str {
        &self.conf_name
    }

    pub fn prev_ids(&self) -> &[FlapId] {
        &self.prev_ids
    }

    pub fn next_ids(&self) -> &[FlapId] {
        &self.next_ids
    }

    pub fn state(&self) -> FlapState {
        self.state
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn next_awake_time(&self) -> Option<DateTime<Utc>> {
        self.next_awake_time
    }

    pub fn attempt_retry_count(&self) -> u32 {
        self.attempt_retry_count
    }

    pub fn has_prev(&self, id: &FlapId) -> bool {
        self.prev_ids.contains(id)
    }

    pub fn has_next(&self, id: &FlapId) -> bool {
        self.next_ids.contains(id)
    }

    /// Success or Failed.
    pub fn is_completed(&self) -> bool {
        self.state.is_completed()
    }

    /// Parents done and the action's own condition holds. A panicking
    /// condition is reported as `ActionPanicked`.
    pub fn is_ready(&self, parents_succeeded: bool) -> std::result::Result<bool, TickError> {
        if !parents_succeeded {
            return Ok(false);
        }
        std::panic::catch_unwind(AssertUnwindSafe(|| self.action.condition()))
            .map_err(|panic| TickError::ActionPanicked(panic_message(panic.as_ref())))
    }

    // Only `FlapIdTable::add_edge` calls these, always in mirrored pairs.
    pub(crate) fn push_prev(&mut self, id: &FlapId) {
        if !self.has_prev(id) {
            self.prev_ids.push(id.clone());
        }
    }

    pub(crate) fn push_next(&mut self, id: &FlapId) {
        if !self.has_next(id) {
            self.next_ids.push(id.clone());
        }
    }

    /// Advance the state machine by one step.
    ///
    /// `parents_succeeded` must reflect whether every predecessor is in
    /// `Success` right now. Gates are checked in a fixed order: parents,
    /// terminal state, readiness, backoff window. Only when all pass does
    /// the action run.
    pub async fn tick(
        &mut self,
        parents_succeeded: bool,
        now: DateTime<Utc>,
    ) -> std::result::Result<Ticked, TickError> {
        if self.state == FlapState::Wait {
            if !parents_succeeded {
                return Err(TickError::ParentsNotAllFinished);
            }
            self.state = FlapState::InProgress;
            self.start = now;
            debug!(flap_id = %self.id, flap = %self.conf_name, "Flap in progress");
        }

        match self.state {
            FlapState::Success => return Err(TickError::AlreadySuccess),
            FlapState::Failed => return Err(TickError::AlreadyFailed),
            _ => {}
        }

        if !self.is_ready(parents_succeeded)? {
            return Err(TickError::NotReady);
        }

        if self.state == FlapState::Started {
            self.state = FlapState::InProgress;
            self.start = now;
        }

        if let Some(awake) = self.next_awake_time {
            if now < awake {
                return Err(TickError::WaitForAwake);
            }
        }

        let attempt = self.attempt_retry_count;
        let outcome = AssertUnwindSafe(self.action.execute(attempt))
            .catch_unwind()
            .await
            .map_err(|panic| TickError::ActionPanicked(panic_message(panic.as_ref())))?;

        match outcome {
            Ok(()) => {
                self.state = FlapState::Success;
                info!(flap_id = %self.id, flap = %self.conf_name, attempt, "Flap succeeded");
                Ok(Ticked::Succeeded)
            }
            Err(e) => match e.retry_at {
                Some(at) => {
                    self.state = FlapState::ErrorRetry;
                    self.attempt_retry_count += 1;
                    self.next_awake_time = Some(at);
                    warn!(
                        flap_id = %self.id,
                        flap = %self.conf_name,
                        attempt,
                        retry_at = %at,
                        error = %e,
                        "Flap attempt failed, retry scheduled"
                    );
                    Ok(Ticked::Retrying { at })
                }
                None => {
                    self.state = FlapState::Failed;
                    warn!(flap_id = %self.id, flap = %self.conf_name, attempt, error = %e, "Flap failed");
                    Err(TickError::AlreadyFailed)
                }
            },
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

use futures::future::BoxFuture;

use crate::error::{ActionError, Result};
use crate::types::{FlapId, FlapRecord, SoarId, SoarRecord};

/// The executable behavior owned by a flap.
///
/// Actions are built in two phases: a registry factory produces an empty
/// instance, then `from_config` hydrates it from the untyped plugin block.
pub trait Action: Send + Sync + 'static {
    /// Plugin name this action was registered under.
    fn plugin(&self) -> &str;

    /// Serializable copy of the hydrated configuration.
    fn plugin_config(&self) -> serde_json::Value;

    /// Hydrate from the raw `plugin_config` block.
    fn from_config(&mut self, config: &serde_json::Value) -> Result<()>;

    /// Extra readiness gate on top of dependency completion.
    fn condition(&self) -> bool {
        true
    }

    /// Run the action. `attempt` is the number of earlier retryable failures.
    fn execute(&self, attempt: u32) -> BoxFuture<'_, std::result::Result<(), ActionError>>;
}

/// Durable state for soars and flaps.
///
/// A store never builds soars or flaps from configuration; it only saves
/// and loads their state, and issues identities that stay unique across
/// process restarts.
pub trait Store: Send + Sync + 'static {
    fn make_soar_id(&self) -> Result<SoarId>;

    fn make_flap_id(&self) -> Result<FlapId>;

    fn save_soar(&self, soar: &SoarRecord) -> Result<()>;

    fn save_flap(&self, soar: &SoarId, flap: &FlapRecord) -> Result<()>;

    fn load_soar(&self, id: &SoarId) -> Result<SoarRecord>;

    fn load_flap(&self, id: &FlapId) -> Result<FlapRecord>;

    /// All flaps belonging to a soar, in insertion order.
    fn load_flaps(&self, soar: &SoarId) -> Result<Vec<FlapRecord>>;
}

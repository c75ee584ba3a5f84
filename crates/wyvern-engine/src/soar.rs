use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use wyvern_actions::ActionRegistry;
use wyvern_core::config::SoarConfig;
use wyvern_core::error::{Result, TickError, WyvernError};
use wyvern_core::traits::Store;
use wyvern_core::types::{FlapId, FlapRecord, FlapState, SoarId, SoarRecord};

use crate::flap::Flap;
use crate::index::{missing, FlapIdTable, FlapIndex};
use crate::traversal::{self, FirstUnfinished, FlapVisitor, Lookup};

/// Pause between two tick passes.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Diagnostics stamped on every tick pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassDiagnostics {
    pub soar_id: SoarId,
    pub iteration: u64,
    pub started_at: DateTime<Utc>,
}

/// Summary of one tick pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Flaps whose tick ran (completed flaps are skipped).
    pub ticked: usize,
    /// Flaps whose action executed during this pass.
    pub executed: usize,
    /// Reachable flaps not in `Success` after the pass.
    pub pending: usize,
}

/// One workflow instance: a DAG of flaps plus its scheduler loop.
///
/// The graph never changes shape after construction; only flap states do.
/// Every traversal, tick passes and lookups alike, holds the graph lock.
pub struct Soar {
    id: SoarId,
    name: String,
    root_ids: Vec<FlapId>,
    graph: Mutex<Box<dyn FlapIndex>>,
    tick_count: AtomicU64,
    interval: Duration,
    store: Option<Arc<dyn Store>>,
    started: AtomicBool,
    running: Arc<AtomicBool>,
}

impl std::fmt::Debug for Soar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Soar")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("root_ids", &self.root_ids)
            .field("tick_count", &self.tick_count())
            .finish()
    }
}

impl Soar {
    /// Build a soar from configuration.
    ///
    /// Flaps are instantiated through the registry, named edges are resolved
    /// and mirrored, and roots are the flaps left without predecessors.
    /// IDs are issued by the store.
    pub fn new(config: &SoarConfig, registry: &ActionRegistry, store: &dyn Store) -> Result<Self> {
        let mut table = FlapIdTable::new();
        let mut by_name: HashMap<&str, FlapId> = HashMap::new();

        for flap_conf in &config.flaps {
            if by_name.contains_key(flap_conf.name.as_str()) {
                return Err(WyvernError::DuplicateFlapName(flap_conf.name.clone()));
            }
            let flap = Flap::from_config(flap_conf, store.make_flap_id()?, registry)?;
            by_name.insert(flap_conf.name.as_str(), flap.id().clone());
            table.insert(flap);
        }

        let resolve = |flap: &str, reference: &str| {
            by_name
                .get(reference)
                .cloned()
                .ok_or_else(|| WyvernError::UnknownFlapReference {
                    flap: flap.to_string(),
                    reference: reference.to_string(),
                })
        };

        for flap_conf in &config.flaps {
            let id = resolve(&flap_conf.name, &flap_conf.name)?;
            for next in &flap_conf.next_flaps {
                table.add_edge(&id, &resolve(&flap_conf.name, next)?)?;
            }
            for prev in &flap_conf.prev_flaps {
                table.add_edge(&resolve(&flap_conf.name, prev)?, &id)?;
            }
        }

        let root_ids = table.roots();
        if root_ids.is_empty() && !table.is_empty() {
            return Err(WyvernError::CyclicGraph(config.name.clone()));
        }

        let id = store.make_soar_id()?;
        info!(
            soar_id = %id,
            soar = %config.name,
            flaps = table.len(),
            roots = root_ids.len(),
            "Soar built"
        );

        Ok(Self::from_parts(id, config.name.clone(), root_ids, Box::new(table), 0))
    }

    /// Reconstruct a soar from durable state, e.g. after a restart or a
    /// leader change.
    pub fn rebuild(id: &SoarId, store: Arc<dyn Store>, registry: &ActionRegistry) -> Result<Self> {
        let record = store.load_soar(id)?;
        let mut table = FlapIdTable::new();
        for flap_record in store.load_flaps(id)? {
            table.insert(Flap::from_record(&flap_record, registry)?);
        }
        table.validate_edges()?;
        for root in &record.root_ids {
            table.get(root).ok_or_else(|| missing(root))?;
        }

        info!(soar_id = %id, soar = %record.name, flaps = table.len(), "Soar rebuilt");
        let soar = Self::from_parts(
            record.id,
            record.name,
            record.root_ids,
            Box::new(table),
            record.tick_count,
        );
        Ok(soar.with_store(store))
    }

    /// Assemble a soar around any index implementation.
    pub fn from_parts(
        id: SoarId,
        name: String,
        root_ids: Vec<FlapId>,
        index: Box<dyn FlapIndex>,
        tick_count: u64,
    ) -> Self {
        Self {
            id,
            name,
            root_ids,
            graph: Mutex::new(index),
            tick_count: AtomicU64::new(tick_count),
            interval: DEFAULT_TICK_INTERVAL,
            store: None,
            started: AtomicBool::new(false),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the pause between tick passes.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Persist state to `store` after every tick pass.
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn id(&self) -> &SoarId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_ids(&self) -> &[FlapId] {
        &self.root_ids
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Completed scheduler iterations.
    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn record(&self) -> SoarRecord {
        SoarRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            root_ids: self.root_ids.clone(),
            tick_count: self.tick_count(),
        }
    }

    /// Depth-first walk over the graph under the traversal lock.
    pub async fn dfs_until<V>(&self, visitor: &mut V) -> Result<Option<FlapId>>
    where
        V: FlapVisitor + ?Sized,
    {
        let mut graph = self.graph.lock().await;
        traversal::dfs_until(&mut **graph, &self.root_ids, visitor).await
    }

    async fn find(&self, mut lookup: Lookup) -> Option<FlapRecord> {
        let mut graph = self.graph.lock().await;
        let found = traversal::dfs_until(&mut **graph, &self.root_ids, &mut lookup).await;
        match found {
            Ok(found) => found.and_then(|id| graph.get(&id).map(Flap::record)),
            Err(e) => {
                warn!(soar_id = %self.id, error = %e, "Flap lookup failed");
                None
            }
        }
    }

    /// First flap reachable from the roots with the given configuration name.
    pub async fn find_flap_by_name(&self, name: &str) -> Option<FlapRecord> {
        self.find(Lookup::Name(name.to_string())).await
    }

    pub async fn find_flap_by_id(&self, id: &FlapId) -> Option<FlapRecord> {
        self.find(Lookup::Id(id.clone())).await
    }

    /// Records of every flap, reachable or not, in index order.
    pub async fn snapshot(&self) -> Vec<FlapRecord> {
        let graph = self.graph.lock().await;
        graph
            .ids()
            .iter()
            .filter_map(|id| graph.get(id).map(Flap::record))
            .collect()
    }

    /// Whether every flap reachable from the roots has succeeded.
    pub async fn is_completed(&self) -> Result<bool> {
        Ok(self.dfs_until(&mut FirstUnfinished).await?.is_none())
    }

    /// Run one tick pass over the whole graph.
    ///
    /// Transient tick outcomes are swallowed. A flap that fails for good
    /// aborts the pass with `FlapFailed`; a panicking action aborts it with
    /// `Traversal`.
    pub async fn tick_pass(&self, diag: &PassDiagnostics) -> Result<PassReport> {
        let mut pass = TickPass {
            now: diag.started_at,
            report: PassReport::default(),
        };
        self.dfs_until(&mut pass).await?;
        debug!(
            ticked = pass.report.ticked,
            executed = pass.report.executed,
            pending = pass.report.pending,
            "Tick pass complete"
        );
        Ok(pass.report)
    }

    /// Persist the soar record and every flap.
    pub async fn save(&self, store: &dyn Store) -> Result<()> {
        let graph = self.graph.lock().await;
        store.save_soar(&self.record())?;
        for id in graph.ids() {
            if let Some(flap) = graph.get(&id) {
                store.save_flap(&self.id, &flap.record())?;
            }
        }
        Ok(())
    }

    /// Start the scheduler loop on its own task. A soar is started at most
    /// once; the loop ends on a terminal failure, once every reachable flap
    /// has succeeded, or when `cancel` fires.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> Result<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(WyvernError::SoarAlreadyRunning(self.id.to_string()));
        }
        self.running.store(true, Ordering::SeqCst);
        let soar = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let _running = RunningGuard(Arc::clone(&soar.running));
            soar.run_loop(cancel).await;
        }))
    }

    async fn run_loop(&self, cancel: CancellationToken) {
        info!(soar_id = %self.id, soar = %self.name, "Soar started");

        loop {
            let diag = PassDiagnostics {
                soar_id: self.id.clone(),
                iteration: self.tick_count(),
                started_at: Utc::now(),
            };
            let span = info_span!("tick_pass", soar_id = %diag.soar_id, iteration = diag.iteration);
            let result = self.tick_pass(&diag).instrument(span).await;
            if result.is_ok() {
                self.tick_count.fetch_add(1, Ordering::SeqCst);
            }

            if let Some(store) = &self.store {
                if let Err(e) = self.save(store.as_ref()).await {
                    warn!(soar_id = %self.id, error = %e, "Failed to persist soar state");
                }
            }

            match result {
                Ok(report) => {
                    if report.pending == 0 {
                        info!(soar_id = %self.id, iterations = self.tick_count(), "Soar finished");
                        break;
                    }
                }
                Err(e) => {
                    warn!(soar_id = %self.id, error = %e, "Soar stopped");
                    break;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = cancel.cancelled() => {
                    info!(soar_id = %self.id, "Soar shutting down");
                    break;
                }
            }
        }
    }
}

/// Clears the running flag when the loop ends, panics included.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct TickPass {
    now: DateTime<Utc>,
    report: PassReport,
}

impl FlapVisitor for TickPass {
    fn visit<'a>(
        &'a mut self,
        index: &'a mut dyn FlapIndex,
        id: &'a FlapId,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let parents_succeeded = index.parents_succeeded(id)?;
            let flap = index.get_mut(id).ok_or_else(|| missing(id))?;
            match flap.state() {
                FlapState::Success => return Ok(true),
                // A flap restored in `Failed` wedges the soar just like a fresh failure.
                FlapState::Failed => return Err(failed(flap)),
                _ => {}
            }

            self.report.ticked += 1;
            let result = flap.tick(parents_succeeded, self.now).await;
            if matches!(result, Ok(_) | Err(TickError::AlreadyFailed)) {
                self.report.executed += 1;
            }
            if flap.state() != FlapState::Success {
                self.report.pending += 1;
            }

            match result {
                Ok(_) => Ok(true),
                Err(e) if e.is_transient() => {
                    debug!(flap_id = %flap.id(), flap = %flap.conf_name(), reason = %e, "Flap not run");
                    Ok(true)
                }
                Err(TickError::ActionPanicked(message)) => Err(WyvernError::Traversal(format!(
                    "action of flap {} panicked: {}",
                    flap.id(),
                    message
                ))),
                Err(_) => Err(failed(flap)),
            }
        })
    }
}

fn failed(flap: &Flap) -> WyvernError {
    WyvernError::FlapFailed {
        flap: flap.conf_name().to_string(),
        flap_id: flap.id().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wyvern_core::config::FlapConfig;
    use wyvern_store::MemoryStore;
    use wyvern_test_utils::{hello_world, print_flap, scripted_flap, Fixture, Outcome};

    fn soar_config(name: &str, flaps: Vec<FlapConfig>) -> SoarConfig {
        SoarConfig {
            name: name.to_string(),
            flaps,
        }
    }

    fn build(config: &SoarConfig, fixture: &Fixture) -> Result<Soar> {
        Soar::new(config, &fixture.registry, &MemoryStore::new())
    }

    fn diag(soar: &Soar) -> PassDiagnostics {
        PassDiagnostics {
            soar_id: soar.id().clone(),
            iteration: soar.tick_count(),
            started_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_hello_world_in_one_pass() {
        let fixture = Fixture::new();
        let soar = build(&hello_world(), &fixture).unwrap();
        assert_eq!(soar.root_ids().len(), 1);

        let report = soar.tick_pass(&diag(&soar)).await.unwrap();
        assert_eq!(fixture.output(), "hello world");
        assert_eq!(report.executed, 2);
        assert_eq!(report.pending, 0);
        assert!(soar.is_completed().await.unwrap());

        // Completed flaps are skipped on later passes.
        let report = soar.tick_pass(&diag(&soar)).await.unwrap();
        assert_eq!(report.ticked, 0);
        assert_eq!(fixture.output(), "hello world");
    }

    #[tokio::test]
    async fn test_child_waits_for_retrying_parent() {
        let fixture = Fixture::new();
        let config = soar_config(
            "retry",
            vec![
                scripted_flap("a", &[Outcome::RetryAfterMs(60_000)]),
                scripted_flap("b", &[Outcome::Ok]).after("a"),
            ],
        );
        let soar = build(&config, &fixture).unwrap();

        let report = soar.tick_pass(&diag(&soar)).await.unwrap();
        assert_eq!(report.executed, 1);
        assert_eq!(report.pending, 2);

        // Still inside the backoff window: nothing executes.
        soar.tick_pass(&diag(&soar)).await.unwrap();
        assert_eq!(fixture.tally.order(), vec!["a".to_string()]);

        let a = soar.find_flap_by_name("a").await.unwrap();
        assert_eq!(a.state, FlapState::ErrorRetry);
        assert_eq!(a.attempt_retry_count, 1);
        let b = soar.find_flap_by_name("b").await.unwrap();
        assert_eq!(b.state, FlapState::Wait);
    }

    #[tokio::test]
    async fn test_fatal_failure_aborts_pass() {
        let fixture = Fixture::new();
        let config = soar_config(
            "fatal",
            vec![
                scripted_flap("a", &[Outcome::Fatal]),
                scripted_flap("b", &[Outcome::Ok]).after("a"),
            ],
        );
        let soar = build(&config, &fixture).unwrap();

        let err = soar.tick_pass(&diag(&soar)).await.unwrap_err();
        assert!(matches!(err, WyvernError::FlapFailed { ref flap, .. } if flap == "a"));
        assert_eq!(fixture.tally.executions_of("b"), 0);
        assert!(!soar.is_completed().await.unwrap());
    }

    #[tokio::test]
    async fn test_panicking_action_aborts_pass() {
        let fixture = Fixture::new();
        let config = soar_config("panic", vec![scripted_flap("boom", &[Outcome::Panic])]);
        let soar = build(&config, &fixture).unwrap();
        let err = soar.tick_pass(&diag(&soar)).await.unwrap_err();
        assert!(matches!(err, WyvernError::Traversal(ref m) if m.contains("scripted panic")));
    }

    #[tokio::test]
    async fn test_panicking_condition_aborts_pass() {
        let fixture = Fixture::new();
        fixture.tally.panic_in_condition();
        let config = soar_config("gate", vec![scripted_flap("gate", &[Outcome::Ok])]);
        let soar = build(&config, &fixture).unwrap();

        let err = soar.tick_pass(&diag(&soar)).await.unwrap_err();
        assert!(matches!(err, WyvernError::Traversal(ref m) if m.contains("condition panic")));
        assert_eq!(fixture.tally.executions(), 0);
        // The traversal lock was released.
        assert!(soar.find_flap_by_name("gate").await.is_some());
    }

    #[tokio::test]
    async fn test_rebuilt_failed_soar_stops_loop() {
        let fixture = Fixture::new();
        let config = soar_config(
            "wedged",
            vec![
                scripted_flap("a", &[Outcome::Fatal]),
                scripted_flap("b", &[Outcome::Ok]).after("a"),
            ],
        );
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let soar = Soar::new(&config, &fixture.registry, store.as_ref()).unwrap();
        assert!(soar.tick_pass(&diag(&soar)).await.is_err());
        soar.save(store.as_ref()).await.unwrap();

        let rebuilt = Arc::new(
            Soar::rebuild(soar.id(), store.clone(), &fixture.registry)
                .unwrap()
                .with_interval(Duration::from_millis(5)),
        );
        let err = rebuilt.tick_pass(&diag(&rebuilt)).await.unwrap_err();
        assert!(matches!(err, WyvernError::FlapFailed { ref flap, .. } if flap == "a"));

        let handle = rebuilt.start(CancellationToken::new()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!rebuilt.is_running());
        assert_eq!(rebuilt.tick_count(), 0);
        assert_eq!(fixture.tally.executions(), 1);
    }

    #[test]
    fn test_roots_are_flaps_without_predecessors() {
        let fixture = Fixture::new();
        let config = soar_config(
            "fan-in",
            vec![
                print_flap("a", "a").before("c"),
                print_flap("b", "b"),
                print_flap("c", "c").after("b"),
            ],
        );
        let soar = build(&config, &fixture).unwrap();
        assert_eq!(soar.root_ids().len(), 2);
    }

    #[test]
    fn test_construction_errors() {
        let fixture = Fixture::new();

        let dup = soar_config("dup", vec![print_flap("a", "1"), print_flap("a", "2")]);
        assert!(matches!(build(&dup, &fixture), Err(WyvernError::DuplicateFlapName(n)) if n == "a"));

        let dangling = soar_config("dangling", vec![print_flap("a", "1").before("ghost")]);
        assert!(matches!(
            build(&dangling, &fixture),
            Err(WyvernError::UnknownFlapReference { ref reference, .. }) if reference == "ghost"
        ));

        let unknown = soar_config("unknown", vec![FlapConfig::new("a", "teleport")]);
        assert!(matches!(build(&unknown, &fixture), Err(WyvernError::PluginNotFound(p)) if p == "teleport"));

        let bad = soar_config(
            "bad",
            vec![FlapConfig::new("a", "print").with_config(serde_json::json!({"msg": 3}))],
        );
        assert!(matches!(build(&bad, &fixture), Err(WyvernError::InvalidPluginConfig { .. })));
    }

    #[test]
    fn test_fully_cyclic_graph_rejected() {
        let fixture = Fixture::new();
        let cyclic = soar_config(
            "loop",
            vec![print_flap("a", "a").before("b"), print_flap("b", "b").before("a")],
        );
        assert!(matches!(build(&cyclic, &fixture), Err(WyvernError::CyclicGraph(_))));

        // A cycle hanging off a root is walked once per pass.
        let partial = soar_config(
            "tail",
            vec![
                print_flap("r", "r").before("a"),
                print_flap("a", "a").before("b"),
                print_flap("b", "b").before("a"),
            ],
        );
        assert!(build(&partial, &fixture).is_ok());
    }

    #[tokio::test]
    async fn test_empty_soar_is_trivially_complete() {
        let fixture = Fixture::new();
        let soar = build(&soar_config("empty", vec![]), &fixture).unwrap();
        assert!(soar.root_ids().is_empty());
        assert!(soar.is_completed().await.unwrap());
        assert_eq!(soar.tick_pass(&diag(&soar)).await.unwrap(), PassReport::default());
    }

    #[tokio::test]
    async fn test_lookups_return_records() {
        let fixture = Fixture::new();
        let soar = build(&hello_world(), &fixture).unwrap();

        let world = soar.find_flap_by_name("world").await.unwrap();
        assert_eq!(world.plugin, "print");
        assert_eq!(world.plugin_config["msg"], "world");
        assert_eq!(world.prev_ids.len(), 1);

        let by_id = soar.find_flap_by_id(&world.id).await.unwrap();
        assert_eq!(by_id, world);
        assert!(soar.find_flap_by_name("nobody").await.is_none());
        assert_eq!(soar.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn test_loop_runs_to_completion() {
        let fixture = Fixture::new();
        let config = soar_config(
            "loop",
            vec![scripted_flap("a", &[Outcome::RetryAfterMs(1), Outcome::Ok])],
        );
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let soar = Arc::new(
            Soar::new(&config, &fixture.registry, store.as_ref())
                .unwrap()
                .with_interval(Duration::from_millis(5))
                .with_store(store.clone()),
        );

        let handle = soar.start(CancellationToken::new()).unwrap();
        assert!(matches!(
            soar.start(CancellationToken::new()),
            Err(WyvernError::SoarAlreadyRunning(_))
        ));
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(!soar.is_running());
        assert!(soar.is_completed().await.unwrap());
        assert!(soar.tick_count() >= 2);
        assert_eq!(fixture.tally.attempts(), vec![0, 1]);

        let saved = store.load_flaps(soar.id()).unwrap();
        assert_eq!(saved[0].state, FlapState::Success);
        assert_eq!(store.load_soar(soar.id()).unwrap().tick_count, soar.tick_count());
    }

    #[tokio::test]
    async fn test_loop_stops_on_cancel() {
        let fixture = Fixture::new();
        fixture.tally.set_condition(false);
        let config = soar_config("blocked", vec![scripted_flap("a", &[Outcome::Ok])]);
        let soar = Arc::new(
            build(&config, &fixture)
                .unwrap()
                .with_interval(Duration::from_millis(5)),
        );

        let cancel = CancellationToken::new();
        let handle = soar.start(cancel.clone()).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(soar.is_running());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!soar.is_running());
        assert_eq!(fixture.tally.executions(), 0);
    }

    #[tokio::test]
    async fn test_rebuild_restores_progress() {
        let fixture = Fixture::new();
        let config = soar_config(
            "resume",
            vec![
                scripted_flap("a", &[Outcome::Ok]),
                scripted_flap("b", &[Outcome::RetryAfterMs(60_000)]).after("a"),
            ],
        );
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let soar = Soar::new(&config, &fixture.registry, store.as_ref()).unwrap();
        soar.tick_pass(&diag(&soar)).await.unwrap();
        soar.save(store.as_ref()).await.unwrap();

        let rebuilt = Soar::rebuild(soar.id(), store.clone(), &fixture.registry).unwrap();
        assert_eq!(rebuilt.name(), "resume");
        assert_eq!(rebuilt.root_ids(), soar.root_ids());
        assert_eq!(rebuilt.snapshot().await, soar.snapshot().await);

        // The finished parent is not executed again.
        rebuilt.tick_pass(&diag(&rebuilt)).await.unwrap();
        assert_eq!(fixture.tally.executions_of("a"), 1);
    }
}

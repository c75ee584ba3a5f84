use std::collections::HashMap;
use std::sync::Mutex;

use wyvern_core::error::{Result, WyvernError};
use wyvern_core::traits::Store;
use wyvern_core::types::{FlapId, FlapRecord, SoarId, SoarRecord};

#[derive(Default)]
struct Inner {
    soars: HashMap<SoarId, SoarRecord>,
    flaps: HashMap<FlapId, FlapRecord>,
    /// Flap IDs per soar, in first-save order.
    members: HashMap<SoarId, Vec<FlapId>>,
}

/// Process-local store. IDs are random UUIDs.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| WyvernError::Store(e.to_string()))
    }
}

impl Store for MemoryStore {
    fn make_soar_id(&self) -> Result<SoarId> {
        Ok(SoarId(uuid::Uuid::new_v4().to_string()))
    }

    fn make_flap_id(&self) -> Result<FlapId> {
        Ok(FlapId(uuid::Uuid::new_v4().to_string()))
    }

    fn save_soar(&self, soar: &SoarRecord) -> Result<()> {
        self.lock()?.soars.insert(soar.id.clone(), soar.clone());
        Ok(())
    }

    fn save_flap(&self, soar: &SoarId, flap: &FlapRecord) -> Result<()> {
        let mut inner = self.lock()?;
        let members = inner.members.entry(soar.clone()).or_default();
        if !members.contains(&flap.id) {
            members.push(flap.id.clone());
        }
        inner.flaps.insert(flap.id.clone(), flap.clone());
        Ok(())
    }

    fn load_soar(&self, id: &SoarId) -> Result<SoarRecord> {
        self.lock()?
            .soars
            .get(id)
            .cloned()
            .ok_or_else(|| WyvernError::RecordNotFound(format!("soar {}", id)))
    }

    fn load_flap(&self, id: &FlapId) -> Result<FlapRecord> {
        self.lock()?
            .flaps
            .get(id)
            .cloned()
            .ok_or_else(|| WyvernError::RecordNotFound(format!("flap {}", id)))
    }

    fn load_flaps(&self, soar: &SoarId) -> Result<Vec<FlapRecord>> {
        let inner = self.lock()?;
        if !inner.soars.contains_key(soar) {
            return Err(WyvernError::RecordNotFound(format!("soar {}", soar)));
        }
        Ok(inner
            .members
            .get(soar)
            .map(|ids| ids.iter().filter_map(|id| inner.flaps.get(id).cloned()).collect())
            .unwrap_or_default())
    }
}

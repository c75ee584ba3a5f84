use std::collections::HashMap;

use wyvern_core::error::{Result, WyvernError};
use wyvern_core::types::{FlapId, FlapState};

use crate::flap::Flap;

/// Resolves flap identities to flaps.
///
/// Flaps only know their neighbors by ID, so every neighbor lookup goes
/// through an index. The in-memory `FlapIdTable` is the default; a
/// store-backed implementation can be swapped in without touching traversal.
pub trait FlapIndex: Send + Sync {
    fn get(&self, id: &FlapId) -> Option<&Flap>;

    fn get_mut(&mut self, id: &FlapId) -> Option<&mut Flap>;

    /// All flap IDs, in insertion order.
    fn ids(&self) -> Vec<FlapId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every predecessor of `id` is in `Success`.
    fn parents_succeeded(&self, id: &FlapId) -> Result<bool> {
        let flap = self.get(id).ok_or_else(|| missing(id))?;
        for parent_id in flap.prev_ids() {
            let parent = self.get(parent_id).ok_or_else(|| missing(parent_id))?;
            if parent.state() != FlapState::Success {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

pub(crate) fn missing(id: &FlapId) -> WyvernError {
    WyvernError::Traversal(format!("flap {} is missing from the index", id))
}

/// In-memory index owned by exactly one soar.
#[derive(Debug, Default)]
pub struct FlapIdTable {
    flaps: HashMap<FlapId, Flap>,
    order: Vec<FlapId>,
}

impl FlapIdTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a flap. Replacing an existing ID keeps its original position.
    pub fn insert(&mut self, flap: Flap) {
        let id = flap.id().clone();
        if self.flaps.insert(id.clone(), flap).is_none() {
            self.order.push(id);
        }
    }

    /// Add the edge `from -> to` to both endpoints. Adding an edge twice,
    /// or from the other end, is a no-op.
    pub fn add_edge(&mut self, from: &FlapId, to: &FlapId) -> Result<()> {
        if !self.flaps.contains_key(from) {
            return Err(missing(from));
        }
        if !self.flaps.contains_key(to) {
            return Err(missing(to));
        }
        if let Some(f) = self.flaps.get_mut(from) {
            f.push_next(to);
        }
        if let Some(t) = self.flaps.get_mut(to) {
            t.push_prev(from);
        }
        Ok(())
    }

    /// Flaps with no predecessors, in insertion order.
    pub fn roots(&self) -> Vec<FlapId> {
        self.order
            .iter()
            .filter(|id| {
                self.flaps
                    .get(*id)
                    .map(|f| f.prev_ids().is_empty())
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Check that every edge points at a known flap and is mirrored on the
    /// other end.
    pub fn validate_edges(&self) -> Result<()> {
        for flap in self.flaps.values() {
            for next in flap.next_ids() {
                let other = self.flaps.get(next).ok_or_else(|| dangling(flap.id(), next))?;
                if !other.has_prev(flap.id()) {
                    return Err(half_edge(flap.id(), next));
                }
            }
            for prev in flap.prev_ids() {
                let other = self.flaps.get(prev).ok_or_else(|| dangling(flap.id(), prev))?;
                if !other.has_next(flap.id()) {
                    return Err(half_edge(prev, flap.id()));
                }
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flap> {
        self.order.iter().filter_map(|id| self.flaps.get(id))
    }
}

fn dangling(from: &FlapId, to: &FlapId) -> WyvernError {
    WyvernError::Traversal(format!("flap {} references missing flap {}", from, to))
}

fn half_edge(from: &FlapId, to: &FlapId) -> WyvernError {
    WyvernError::Traversal(format!("edge {} -> {} is not mirrored", from, to))
}

impl FlapIndex for FlapIdTable {
    fn get(&self, id: &FlapId) -> Option<&Flap> {
        self.flaps.get(id)
    }

    fn get_mut(&mut self, id: &FlapId) -> Option<&mut Flap> {
        self.flaps.get_mut(id)
    }

    fn ids(&self) -> Vec<FlapId> {
        self.order.clone()
    }

    fn len(&self) -> usize {
        self.flaps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wyvern_test_utils::ScriptedAction;

    fn table(names: &[&str]) -> FlapIdTable {
        let mut t = FlapIdTable::new();
        for name in names {
            t.insert(Flap::new(FlapId::from(*name), *name, Box::new(ScriptedAction::always_ok())));
        }
        t
    }

    fn id(s: &str) -> FlapId {
        FlapId::from(s)
    }

    fn assert_symmetric(t: &FlapIdTable) {
        for a in t.iter() {
            for b in t.iter() {
                assert_eq!(
                    a.has_next(b.id()),
                    b.has_prev(a.id()),
                    "asymmetric edge {} -> {}",
                    a.id(),
                    b.id()
                );
            }
        }
        t.validate_edges().unwrap();
    }

    #[test]
    fn test_edges_are_symmetric_and_idempotent() {
        let mut t = table(&["a", "b", "c"]);
        t.add_edge(&id("a"), &id("b")).unwrap();
        t.add_edge(&id("a"), &id("b")).unwrap();
        t.add_edge(&id("b"), &id("c")).unwrap();
        t.add_edge(&id("a"), &id("c")).unwrap();

        assert_eq!(t.get(&id("a")).unwrap().next_ids(), &[id("b"), id("c")]);
        assert_eq!(t.get(&id("b")).unwrap().prev_ids(), &[id("a")]);
        assert_eq!(t.get(&id("c")).unwrap().prev_ids(), &[id("b"), id("a")]);
        assert_symmetric(&t);
    }

    #[test]
    fn test_self_loop_is_symmetric() {
        let mut t = table(&["a"]);
        t.add_edge(&id("a"), &id("a")).unwrap();
        t.add_edge(&id("a"), &id("a")).unwrap();
        let a = t.get(&id("a")).unwrap();
        assert_eq!(a.next_ids(), &[id("a")]);
        assert_eq!(a.prev_ids(), &[id("a")]);
        assert_symmetric(&t);
        assert!(t.roots().is_empty());
    }

    #[test]
    fn test_roots_in_insertion_order() {
        let mut t = table(&["x", "a", "b", "c"]);
        t.add_edge(&id("a"), &id("b")).unwrap();
        assert_eq!(t.roots(), vec![id("x"), id("a"), id("c")]);
    }

    #[test]
    fn test_edge_to_unknown_flap() {
        let mut t = table(&["a"]);
        assert!(matches!(t.add_edge(&id("a"), &id("zz")), Err(WyvernError::Traversal(_))));
        assert!(t.get(&id("a")).unwrap().next_ids().is_empty());
    }

    #[test]
    fn test_parents_succeeded() {
        let mut t = table(&["a", "b"]);
        t.add_edge(&id("a"), &id("b")).unwrap();
        assert!(t.parents_succeeded(&id("a")).unwrap());
        assert!(!t.parents_succeeded(&id("b")).unwrap());
        assert!(t.parents_succeeded(&id("nope")).is_err());
    }
}

use std::collections::HashSet;

use futures::future::BoxFuture;

use wyvern_core::error::Result;
use wyvern_core::types::FlapId;

use crate::flap::Flap;
use crate::index::{missing, FlapIndex};

/// Callbacks for one depth-first walk.
pub trait FlapVisitor: Send {
    /// Checked before a flap is visited. Returning true ends the walk and
    /// yields that flap's ID.
    fn should_stop(&mut self, flap: &Flap) -> bool {
        let _ = flap;
        false
    }

    /// Visit a flap. `Ok(false)` prunes its children for this walk, an
    /// error aborts the whole walk.
    fn visit<'a>(
        &'a mut self,
        index: &'a mut dyn FlapIndex,
        id: &'a FlapId,
    ) -> BoxFuture<'a, Result<bool>>;
}

/// Point lookup by identity or configuration name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Id(FlapId),
    Name(String),
}

impl FlapVisitor for Lookup {
    fn should_stop(&mut self, flap: &Flap) -> bool {
        match self {
            Lookup::Id(id) => flap.id() == id,
            Lookup::Name(name) => flap.conf_name() == name,
        }
    }

    fn visit<'a>(
        &'a mut self,
        _index: &'a mut dyn FlapIndex,
        _id: &'a FlapId,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async { Ok(true) })
    }
}

/// Stops at the first reachable flap that has not succeeded.
pub(crate) struct FirstUnfinished;

impl FlapVisitor for FirstUnfinished {
    fn should_stop(&mut self, flap: &Flap) -> bool {
        flap.state() != wyvern_core::types::FlapState::Success
    }

    fn visit<'a>(
        &'a mut self,
        _index: &'a mut dyn FlapIndex,
        _id: &'a FlapId,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async { Ok(true) })
    }
}

enum Cursor {
    /// Sentinel whose successors are the root flaps. Never visited itself.
    Root,
    Flap(FlapId),
}

/// Depth-first walk from `roots` until the visitor stops it.
///
/// Each flap is visited at most once per walk, so cycles and diamonds are
/// safe. Children are walked in successor-list order.
pub async fn dfs_until<V>(
    index: &mut dyn FlapIndex,
    roots: &[FlapId],
    visitor: &mut V,
) -> Result<Option<FlapId>>
where
    V: FlapVisitor + ?Sized,
{
    let mut visited: HashSet<FlapId> = HashSet::new();
    let mut stack = vec![Cursor::Root];

    while let Some(cursor) = stack.pop() {
        let children: Vec<FlapId> = match cursor {
            Cursor::Root => roots.to_vec(),
            Cursor::Flap(id) => {
                if visited.contains(&id) {
                    continue;
                }
                let flap = index.get(&id).ok_or_else(|| missing(&id))?;
                if visitor.should_stop(flap) {
                    return Ok(Some(id));
                }
                visited.insert(id.clone());

                if !visitor.visit(&mut *index, &id).await? {
                    continue;
                }
                index.get(&id).ok_or_else(|| missing(&id))?.next_ids().to_vec()
            }
        };
        stack.extend(children.into_iter().rev().map(Cursor::Flap));
    }

    Ok(None)
}

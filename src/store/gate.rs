//! Mutation Gate
//!
//! Every setter call passes through here. The setter's return value decides
//! whether a mutation happened: [`Mutation::Unchanged`] is the only "no change"
//! signal, anything else (including a setter that returns nothing) counts as a
//! change and invalidates the whole getter cache.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::cache::GetterCache;

/// What a setter reports about its effect on the backing state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutation {
    Changed,
    Unchanged,
}

impl Mutation {
    pub fn is_change(self) -> bool {
        matches!(self, Mutation::Changed)
    }
}

impl From<()> for Mutation {
    fn from(_: ()) -> Self {
        Mutation::Changed
    }
}

/// Apply a setter's verdict to the cache. Returns whether an update should be
/// announced.
pub(crate) fn commit(setter: &str, mutation: Mutation, cache: &mut GetterCache) -> bool {
    match mutation {
        Mutation::Unchanged => {
            debug!(setter, "Setter reported no change, getter cache retained");
            false
        }
        Mutation::Changed => {
            let dropped = cache.invalidate_all();
            debug!(setter, dropped, "Setter changed state, getter cache invalidated");
            true
        }
    }
}

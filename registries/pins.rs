/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::BTreeSet;
use std::sync::Arc;

use appshelf_core::{AppId, NetworkContext};

use crate::persistence::{RegistryPersistence, StorageError};

/// Persisted set of pinned app ids per network context.
#[derive(Clone)]
pub struct PinRegistry {
    persistence: Arc<dyn RegistryPersistence>,
}

impl PinRegistry {
    pub fn new(persistence: Arc<dyn RegistryPersistence>) -> Self {
        Self { persistence }
    }

    pub fn ids(&self, ctx: &NetworkContext) -> Result<BTreeSet<AppId>, StorageError> {
        self.persistence.load_pinned_ids(ctx)
    }

    /// Flip membership of `id`; returns whether it is pinned afterwards.
    pub fn toggle(&self, ctx: &NetworkContext, id: AppId) -> Result<bool, StorageError> {
        let mut ids = self.persistence.load_pinned_ids(ctx)?;
        let pinned = if ids.remove(&id) {
            false
        } else {
            ids.insert(id);
            true
        };
        self.persistence.save_pinned_ids(ctx, &ids)?;
        Ok(pinned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryPersistence;

    #[test]
    fn toggle_twice_restores_original_set() {
        let pins = PinRegistry::new(Arc::new(MemoryPersistence::new()));
        let ctx = NetworkContext::new("1", "eth");
        assert!(pins.toggle(&ctx, AppId::Catalog(4)).unwrap());
        assert_eq!(pins.ids(&ctx).unwrap(), BTreeSet::from([AppId::Catalog(4)]));
        assert!(!pins.toggle(&ctx, AppId::Catalog(4)).unwrap());
        assert!(pins.ids(&ctx).unwrap().is_empty());
    }
}

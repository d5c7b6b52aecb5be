/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::Arc;

use appshelf_core::{AppDescriptor, AppId, NetworkContext};

use crate::persistence::{RegistryPersistence, StorageError};

/// Ordered, persisted user-added apps of each network context.
#[derive(Clone)]
pub struct CustomAppStore {
    persistence: Arc<dyn RegistryPersistence>,
}

impl CustomAppStore {
    pub fn new(persistence: Arc<dyn RegistryPersistence>) -> Self {
        Self { persistence }
    }

    pub fn list(&self, ctx: &NetworkContext) -> Result<Vec<AppDescriptor>, StorageError> {
        self.persistence.load_custom_apps(ctx)
    }

    pub fn append(&self, ctx: &NetworkContext, app: AppDescriptor) -> Result<(), StorageError> {
        let mut apps = self.persistence.load_custom_apps(ctx)?;
        apps.push(app);
        self.persistence.save_custom_apps(ctx, &apps)
    }

    /// Remove `id`, returning the removed descriptor. Nothing is written when
    /// `id` is absent.
    pub fn remove(
        &self,
        ctx: &NetworkContext,
        id: &AppId,
    ) -> Result<Option<AppDescriptor>, StorageError> {
        let mut apps = self.persistence.load_custom_apps(ctx)?;
        let Some(index) = apps.iter().position(|app| app.id == *id) else {
            return Ok(None);
        };
        let removed = apps.remove(index);
        self.persistence.save_custom_apps(ctx, &apps)?;
        Ok(Some(removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryPersistence;

    fn app(url: &str, name: &str) -> AppDescriptor {
        AppDescriptor::custom(url, name, "", "", Vec::new())
    }

    #[test]
    fn append_preserves_insertion_order() {
        let store = CustomAppStore::new(Arc::new(MemoryPersistence::new()));
        let ctx = NetworkContext::new("1", "eth");
        store.append(&ctx, app("https://z.io", "Zulu")).unwrap();
        store.append(&ctx, app("https://a.io", "Alpha")).unwrap();

        let names = store
            .list(&ctx)
            .unwrap()
            .into_iter()
            .map(|app| app.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Zulu", "Alpha"]);
    }

    #[test]
    fn remove_missing_id_does_not_write() {
        let persistence = Arc::new(MemoryPersistence::new());
        let store = CustomAppStore::new(persistence.clone());
        let ctx = NetworkContext::new("1", "eth");
        store.append(&ctx, app("https://a.io", "Alpha")).unwrap();

        persistence.set_fail_writes(true);
        let missing = AppId::for_custom_url("https://nope.io");
        assert_eq!(store.remove(&ctx, &missing), Ok(None));
        assert!(store.remove(&ctx, &AppId::for_custom_url("https://a.io")).is_err());
        assert_eq!(store.list(&ctx).unwrap().len(), 1);
    }
}

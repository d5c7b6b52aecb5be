/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! In-memory [`RegistryPersistence`] for ephemeral sessions and tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use appshelf_core::{AppDescriptor, AppId, NetworkContext};
use parking_lot::Mutex;

use super::{PersistedAppUsage, RegistryPersistence, StorageError};

#[derive(Debug, Default)]
struct ContextDocuments {
    custom_apps: Vec<AppDescriptor>,
    pinned_ids: BTreeSet<AppId>,
    usage: PersistedAppUsage,
}

#[derive(Debug, Default)]
pub struct MemoryPersistence {
    contexts: Mutex<HashMap<String, ContextDocuments>>,
    fail_writes: AtomicBool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every save and clear fails with [`StorageError::Unavailable`]
    /// and leaves the stored documents untouched.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "memory persistence rejected write".to_string(),
            ));
        }
        Ok(())
    }

    fn with_context<R>(&self, ctx: &NetworkContext, f: impl FnOnce(&mut ContextDocuments) -> R) -> R {
        let mut contexts = self.contexts.lock();
        f(contexts.entry(ctx.storage_key()).or_default())
    }
}

impl RegistryPersistence for MemoryPersistence {
    fn load_custom_apps(&self, ctx: &NetworkContext) -> Result<Vec<AppDescriptor>, StorageError> {
        Ok(self.with_context(ctx, |docs| docs.custom_apps.clone()))
    }

    fn save_custom_apps(
        &self,
        ctx: &NetworkContext,
        apps: &[AppDescriptor],
    ) -> Result<(), StorageError> {
        self.check_writable()?;
        self.with_context(ctx, |docs| docs.custom_apps = apps.to_vec());
        Ok(())
    }

    fn load_pinned_ids(&self, ctx: &NetworkContext) -> Result<BTreeSet<AppId>, StorageError> {
        Ok(self.with_context(ctx, |docs| docs.pinned_ids.clone()))
    }

    fn save_pinned_ids(
        &self,
        ctx: &NetworkContext,
        ids: &BTreeSet<AppId>,
    ) -> Result<(), StorageError> {
        self.check_writable()?;
        self.with_context(ctx, |docs| docs.pinned_ids = ids.clone());
        Ok(())
    }

    fn load_app_usage(&self, ctx: &NetworkContext) -> Result<PersistedAppUsage, StorageError> {
        Ok(self.with_context(ctx, |docs| docs.usage.clone()))
    }

    fn save_app_usage(
        &self,
        ctx: &NetworkContext,
        usage: &PersistedAppUsage,
    ) -> Result<(), StorageError> {
        self.check_writable()?;
        self.with_context(ctx, |docs| docs.usage = usage.clone());
        Ok(())
    }

    fn clear_context(&self, ctx: &NetworkContext) -> Result<(), StorageError> {
        self.check_writable()?;
        self.contexts.lock().remove(&ctx.storage_key());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_write_keeps_previous_document() {
        let store = MemoryPersistence::new();
        let ctx = NetworkContext::new("1", "eth");
        let pins = BTreeSet::from([AppId::Catalog(1)]);
        store.save_pinned_ids(&ctx, &pins).unwrap();

        store.set_fail_writes(true);
        let result = store.save_pinned_ids(&ctx, &BTreeSet::new());
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
        assert_eq!(store.load_pinned_ids(&ctx).unwrap(), pins);

        store.set_fail_writes(false);
        store.save_pinned_ids(&ctx, &BTreeSet::new()).unwrap();
        assert!(store.load_pinned_ids(&ctx).unwrap().is_empty());
    }
}

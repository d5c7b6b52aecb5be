/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::path::Path;
use std::sync::Arc;

use appshelf::appshelf_core::{AppDescriptor, AppId, NetworkContext};
use appshelf::onboarding::ManifestError;
use appshelf::permissions::{CapabilityScope, CapabilityStores};
use appshelf::persistence::{MemoryPersistence, RegistryStore};
use appshelf::registries::AppRegistry;
use appshelf::registries::catalog::CatalogCache;

pub fn ctx() -> NetworkContext {
    NetworkContext::new("100", "gno")
}

pub fn catalog_app(id: u64, name: &str, url: &str) -> AppDescriptor {
    AppDescriptor {
        id: AppId::Catalog(id),
        name: name.to_string(),
        url: url.to_string(),
        icon_url: String::new(),
        description: String::new(),
        chain_ids: vec![ctx().chain_id().to_string()],
        tags: Vec::new(),
    }
}

pub fn catalog_with(apps: Vec<AppDescriptor>) -> CatalogCache {
    let catalog = CatalogCache::empty();
    catalog.replace(&ctx(), apps);
    catalog
}

pub fn memory_registry(remote: Vec<AppDescriptor>) -> (AppRegistry, Arc<MemoryPersistence>) {
    let persistence = Arc::new(MemoryPersistence::new());
    let registry = AppRegistry::new(
        persistence.clone(),
        catalog_with(remote),
        CapabilityStores::in_memory(),
    );
    (registry, persistence)
}

pub fn disk_registry(dir: &Path, remote: Vec<AppDescriptor>) -> AppRegistry {
    let store = RegistryStore::open(dir.to_path_buf()).unwrap();
    let capabilities = CapabilityStores::new(
        Arc::new(store.capability_store(CapabilityScope::Wallet)),
        Arc::new(store.capability_store(CapabilityScope::Browser)),
    );
    AppRegistry::new(Arc::new(store), catalog_with(remote), capabilities)
}

/// Manifest that names the app after its host.
pub fn named_after_host(url: &str, ctx: &NetworkContext) -> Result<AppDescriptor, ManifestError> {
    let name = url::Url::parse(url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_default();
    Ok(AppDescriptor::custom(
        url,
        name,
        "custom app",
        format!("{url}/logo.svg"),
        vec![ctx.chain_id().to_string()],
    ))
}

pub fn names(apps: &[AppDescriptor]) -> Vec<&str> {
    apps.iter().map(|app| app.name.as_str()).collect()
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! App registry: the remote catalog and user-added apps composed into the
//! views the shell renders, plus every mutation of that state.
//!
//! [`AppRegistry`] is the only writer of custom apps, pins and usage, and the
//! only place that revokes capabilities when an app goes away. Each mutation
//! runs under one write lock, so a remove and its revocations are never
//! interleaved with another add or remove.

pub mod catalog;
pub mod custom_apps;
pub mod pins;
pub mod ranking;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use appshelf_core::{
    AppDescriptor, AppId, InvalidUrlError, NetworkContext, is_same_url, locale_compare,
    normalize_app_url, parse_app_url,
};
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::diagnostics::{
    CHANNEL_CUSTOM_APP_ADDED, CHANNEL_CUSTOM_APP_DUPLICATE_REJECTED, CHANNEL_CUSTOM_APP_REMOVED,
    CHANNEL_PIN_TOGGLED, CHANNEL_STORAGE_WRITE_FAILED, DiagnosticsSender,
};
use crate::permissions::{CapabilityStores, RevocationReport};
use crate::persistence::{RegistryPersistence, StorageError};

use self::catalog::{CatalogCache, CatalogError, CatalogLoad};
use self::custom_apps::CustomAppStore;
use self::pins::PinRegistry;
use self::ranking::{RankingInput, RankingStrategy, UsageRanking};

/// Rejected add: the URL already belongs to an app in the aggregated list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateAppError {
    pub url: String,
    pub existing_id: AppId,
    pub existing_name: String,
}

impl std::fmt::Display for DuplicateAppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} is already in the list as '{}' ({})",
            self.url, self.existing_name, self.existing_id
        )
    }
}

impl std::error::Error for DuplicateAppError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    Duplicate(DuplicateAppError),
    Storage(StorageError),
    InvalidUrl(InvalidUrlError),
    UnknownApp(AppId),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplicate(e) => write!(f, "{e}"),
            Self::Storage(e) => write!(f, "{e}"),
            Self::InvalidUrl(e) => write!(f, "{e}"),
            Self::UnknownApp(id) => write!(f, "no custom app with id {id}"),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<DuplicateAppError> for RegistryError {
    fn from(e: DuplicateAppError) -> Self {
        Self::Duplicate(e)
    }
}

impl From<StorageError> for RegistryError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<InvalidUrlError> for RegistryError {
    fn from(e: InvalidUrlError) -> Self {
        Self::InvalidUrl(e)
    }
}

/// Every derived list for one network context, computed together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryView {
    pub all: Vec<AppDescriptor>,
    pub pinned: Vec<AppDescriptor>,
    pub pinned_ids: BTreeSet<AppId>,
    pub remote: Vec<AppDescriptor>,
    pub custom: Vec<AppDescriptor>,
    pub ranked: Vec<AppDescriptor>,
    pub remote_loading: bool,
    pub remote_error: Option<CatalogError>,
}

impl RegistryView {
    pub fn find(&self, id: &AppId) -> Option<&AppDescriptor> {
        self.all.iter().find(|app| app.id == *id)
    }

    pub fn find_by_url(&self, url: &str) -> Option<&AppDescriptor> {
        self.all.iter().find(|app| is_same_url(&app.url, url))
    }

    pub fn remote_by_url(&self, url: &str) -> Option<&AppDescriptor> {
        self.remote.iter().find(|app| is_same_url(&app.url, url))
    }
}

/// `remote ++ custom`, stably sorted by display name.
pub fn aggregate_apps(remote: &[AppDescriptor], custom: &[AppDescriptor]) -> Vec<AppDescriptor> {
    let mut all = remote.iter().chain(custom).cloned().collect::<Vec<_>>();
    all.sort_by(|a, b| locale_compare(&a.name, &b.name));
    all
}

/// Remote apps whose id is pinned, in catalog order. Custom apps never
/// appear even when their id is in `pinned_ids`.
pub fn pinned_apps(remote: &[AppDescriptor], pinned_ids: &BTreeSet<AppId>) -> Vec<AppDescriptor> {
    remote
        .iter()
        .filter(|app| pinned_ids.contains(&app.id))
        .cloned()
        .collect()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

pub struct AppRegistry {
    persistence: Arc<dyn RegistryPersistence>,
    custom_apps: CustomAppStore,
    pins: PinRegistry,
    catalog: CatalogCache,
    capabilities: CapabilityStores,
    ranking: Box<dyn RankingStrategy>,
    diagnostics: DiagnosticsSender,
    write_lock: Mutex<()>,
}

impl AppRegistry {
    pub fn new(
        persistence: Arc<dyn RegistryPersistence>,
        catalog: CatalogCache,
        capabilities: CapabilityStores,
    ) -> Self {
        Self {
            custom_apps: CustomAppStore::new(Arc::clone(&persistence)),
            pins: PinRegistry::new(Arc::clone(&persistence)),
            persistence,
            catalog,
            capabilities,
            ranking: Box::new(UsageRanking::default()),
            diagnostics: DiagnosticsSender::disabled(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_ranking(mut self, ranking: impl RankingStrategy + 'static) -> Self {
        self.ranking = Box::new(ranking);
        self
    }

    /// Route registry, catalog and capability events to `diagnostics`.
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticsSender) -> Self {
        self.catalog = self.catalog.with_diagnostics(diagnostics.clone());
        self.capabilities = self.capabilities.with_diagnostics(diagnostics.clone());
        self.diagnostics = diagnostics;
        self
    }

    pub fn catalog(&self) -> &CatalogCache {
        &self.catalog
    }

    pub fn capabilities(&self) -> &CapabilityStores {
        &self.capabilities
    }

    pub fn view(&self, ctx: &NetworkContext) -> Result<RegistryView, StorageError> {
        let CatalogLoad {
            apps: remote,
            loading: remote_loading,
            error: remote_error,
        } = self.catalog.load(ctx);
        let custom = self.custom_apps.list(ctx)?;
        let pinned_ids = self.pins.ids(ctx)?;
        let usage = self.persistence.load_app_usage(ctx)?;

        let all = aggregate_apps(&remote, &custom);
        let pinned = pinned_apps(&remote, &pinned_ids);
        let ranked = self.ranking.rank(RankingInput {
            all: &all,
            pinned: &pinned,
            usage: &usage,
        });

        Ok(RegistryView {
            all,
            pinned,
            pinned_ids,
            remote,
            custom,
            ranked,
            remote_loading,
            remote_error,
        })
    }

    pub fn all(&self, ctx: &NetworkContext) -> Result<Vec<AppDescriptor>, StorageError> {
        Ok(self.view(ctx)?.all)
    }

    pub fn pinned(&self, ctx: &NetworkContext) -> Result<Vec<AppDescriptor>, StorageError> {
        let remote = self.catalog.load(ctx).apps;
        Ok(pinned_apps(&remote, &self.pins.ids(ctx)?))
    }

    pub fn ranked(&self, ctx: &NetworkContext) -> Result<Vec<AppDescriptor>, StorageError> {
        Ok(self.view(ctx)?.ranked)
    }

    pub fn custom_apps(&self, ctx: &NetworkContext) -> Result<Vec<AppDescriptor>, StorageError> {
        self.custom_apps.list(ctx)
    }

    pub fn pinned_ids(&self, ctx: &NetworkContext) -> Result<BTreeSet<AppId>, StorageError> {
        self.pins.ids(ctx)
    }

    /// Append a resolved app to the context's custom apps.
    ///
    /// The URL is canonicalized and the id re-derived from it. Fails before
    /// any write when the URL matches an app already in `all`.
    pub fn add_custom_app(
        &self,
        ctx: &NetworkContext,
        descriptor: AppDescriptor,
    ) -> Result<AppDescriptor, RegistryError> {
        let _guard = self.write_lock.lock();
        parse_app_url(&descriptor.url)?;

        let url = normalize_app_url(&descriptor.url);
        let app = AppDescriptor {
            id: AppId::for_custom_url(&url),
            url,
            ..descriptor
        };

        // A cold or expired catalog is fetched here so the check sees it.
        let remote = self.catalog.load_blocking(ctx).apps;
        let custom = self.custom_apps.list(ctx)?;
        if let Some(existing) = remote
            .iter()
            .chain(custom.iter())
            .find(|existing| is_same_url(&existing.url, &app.url))
        {
            debug!("Rejected duplicate custom app {} in {ctx}", app.url);
            self.diagnostics
                .sent(CHANNEL_CUSTOM_APP_DUPLICATE_REJECTED, app.url.len());
            return Err(DuplicateAppError {
                url: app.url,
                existing_id: existing.id,
                existing_name: existing.name.clone(),
            }
            .into());
        }

        if let Err(e) = self.custom_apps.append(ctx, app.clone()) {
            warn!("Failed to persist custom app {}: {e}", app.url);
            self.diagnostics
                .sent(CHANNEL_STORAGE_WRITE_FAILED, app.url.len());
            return Err(e.into());
        }
        info!("Added custom app '{}' ({}) in {ctx}", app.name, app.url);
        self.diagnostics.sent(CHANNEL_CUSTOM_APP_ADDED, app.url.len());
        Ok(app)
    }

    /// Remove a custom app, then revoke its origin in both capability stores.
    ///
    /// Revocation runs even when the app never held a grant. Revocation
    /// failures are reported, not returned as errors: the app stays removed.
    /// Grants are keyed by origin alone, so the same origin loses its grants
    /// in every network context. The app's usage record is dropped on a best
    /// effort basis.
    pub fn remove_custom_app(
        &self,
        ctx: &NetworkContext,
        id: &AppId,
    ) -> Result<RevocationReport, RegistryError> {
        let _guard = self.write_lock.lock();
        let removed = match self.custom_apps.remove(ctx, id) {
            Ok(Some(removed)) => removed,
            Ok(None) => return Err(RegistryError::UnknownApp(*id)),
            Err(e) => {
                warn!("Failed to persist removal of {id}: {e}");
                self.diagnostics
                    .sent(CHANNEL_STORAGE_WRITE_FAILED, id.to_string().len());
                return Err(e.into());
            },
        };
        info!("Removed custom app '{}' ({}) in {ctx}", removed.name, removed.url);
        self.diagnostics
            .sent(CHANNEL_CUSTOM_APP_REMOVED, removed.url.len());
        if let Err(e) = self.forget_usage(ctx, id) {
            warn!("Failed to forget usage of {id}: {e}");
            self.diagnostics
                .sent(CHANNEL_STORAGE_WRITE_FAILED, id.to_string().len());
        }
        Ok(self.capabilities.revoke_all(&removed.url))
    }

    /// Flip the pin of `id`; returns whether it is pinned afterwards.
    pub fn toggle_pin(&self, ctx: &NetworkContext, id: AppId) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock();
        let pinned = self.pins.toggle(ctx, id)?;
        let name = self
            .catalog
            .load(ctx)
            .apps
            .into_iter()
            .find(|app| app.id == id)
            .map(|app| app.name);
        match (&name, pinned) {
            (Some(name), true) => info!("Pinned '{name}' in {ctx}"),
            (Some(name), false) => info!("Unpinned '{name}' in {ctx}"),
            (None, _) => debug!("Toggled pin of {id} (not in the catalog of {ctx})"),
        }
        self.diagnostics
            .sent(CHANNEL_PIN_TOGGLED, id.to_string().len());
        Ok(pinned)
    }

    fn forget_usage(&self, ctx: &NetworkContext, id: &AppId) -> Result<(), StorageError> {
        let mut usage = self.persistence.load_app_usage(ctx)?;
        if usage.open_count(id) == 0 {
            return Ok(());
        }
        usage.forget(id);
        self.persistence.save_app_usage(ctx, &usage)
    }

    /// Count an open of `id` for ranking; returns the new open count.
    pub fn record_app_open(&self, ctx: &NetworkContext, id: AppId) -> Result<u64, StorageError> {
        let _guard = self.write_lock.lock();
        let mut usage = self.persistence.load_app_usage(ctx)?;
        let count = usage.record_open(id, now_secs());
        self.persistence.save_app_usage(ctx, &usage)?;
        Ok(count)
    }

    /// Forget every custom app, pin and usage record of `ctx`, then revoke
    /// the grants of each forgotten custom app.
    pub fn clear_context(&self, ctx: &NetworkContext) -> Result<Vec<RevocationReport>, StorageError> {
        let _guard = self.write_lock.lock();
        let custom = self.custom_apps.list(ctx)?;
        self.persistence.clear_context(ctx)?;
        info!("Cleared {} custom apps from {ctx}", custom.len());
        Ok(custom
            .iter()
            .map(|app| self.capabilities.revoke_all(&app.url))
            .collect())
    }
}

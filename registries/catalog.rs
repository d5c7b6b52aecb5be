/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Remote app catalog: sources and the per-context cache.
//!
//! The cache never blocks the read path. [`CatalogCache::load`] returns what
//! is known (possibly nothing) and starts a background fetch when the entry
//! is missing or expired; the worker thread stores its result in the cache
//! when it completes. The last successful list stays visible while a refresh
//! is running or after a refresh fails.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use appshelf_core::{AppDescriptor, AppId, NetworkContext, normalize_app_url};
use log::{debug, warn};
use moka::sync::Cache;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::diagnostics::{
    CHANNEL_CATALOG_FETCH_FAILED, CHANNEL_CATALOG_FETCH_STARTED, CHANNEL_CATALOG_FETCH_SUCCEEDED,
    DiagnosticsSender,
};
use crate::services::http::{TextFetcher, fetch_text};

pub const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(600);
const CATALOG_CACHE_CAPACITY: u64 = 64;
const CHAIN_ID_PLACEHOLDER: &str = "{chain_id}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    Io(String),
    Fetch(String),
    Parse(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "catalog IO error: {e}"),
            Self::Fetch(e) => write!(f, "catalog fetch failed: {e}"),
            Self::Parse(e) => write!(f, "catalog is malformed: {e}"),
        }
    }
}

impl std::error::Error for CatalogError {}

pub trait CatalogSource: Send + Sync {
    fn fetch(&self, ctx: &NetworkContext) -> Result<Vec<AppDescriptor>, CatalogError>;
}

impl<F> CatalogSource for F
where
    F: Fn(&NetworkContext) -> Result<Vec<AppDescriptor>, CatalogError> + Send + Sync,
{
    fn fetch(&self, ctx: &NetworkContext) -> Result<Vec<AppDescriptor>, CatalogError> {
        self(ctx)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChainIdJson {
    Text(String),
    Number(u64),
}

impl ChainIdJson {
    fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEntryJson {
    id: u64,
    name: String,
    url: String,
    #[serde(default)]
    icon_url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    chain_ids: Vec<ChainIdJson>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Parse a JSON catalog (an array of entries) and keep the entries that
/// support `ctx`.
pub fn parse_catalog_json(
    text: &str,
    ctx: &NetworkContext,
) -> Result<Vec<AppDescriptor>, CatalogError> {
    let entries: Vec<CatalogEntryJson> =
        serde_json::from_str(text).map_err(|e| CatalogError::Parse(format!("{e}")))?;
    Ok(entries
        .into_iter()
        .map(|entry| AppDescriptor {
            id: AppId::Catalog(entry.id),
            name: entry.name,
            url: normalize_app_url(&entry.url),
            icon_url: entry.icon_url,
            description: entry.description,
            chain_ids: entry
                .chain_ids
                .into_iter()
                .map(ChainIdJson::into_string)
                .collect(),
            tags: entry.tags,
        })
        .filter(|app| app.supports_chain(ctx.chain_id()))
        .collect())
}

/// Catalog read from a local JSON file on every fetch.
#[derive(Debug, Clone)]
pub struct JsonFileCatalogSource {
    path: PathBuf,
}

impl JsonFileCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CatalogSource for JsonFileCatalogSource {
    fn fetch(&self, ctx: &NetworkContext) -> Result<Vec<AppDescriptor>, CatalogError> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            CatalogError::Io(format!("Failed to read {}: {e}", self.path.display()))
        })?;
        parse_catalog_json(&text, ctx)
    }
}

/// Catalog served over HTTP. `{chain_id}` in the URL template is replaced by
/// the context's chain id.
pub struct HttpCatalogSource {
    fetcher: Arc<dyn TextFetcher>,
    url_template: String,
}

impl HttpCatalogSource {
    pub fn new(fetcher: Arc<dyn TextFetcher>, url_template: impl Into<String>) -> Self {
        Self {
            fetcher,
            url_template: url_template.into(),
        }
    }

    fn url_for(&self, ctx: &NetworkContext) -> String {
        self.url_template
            .replace(CHAIN_ID_PLACEHOLDER, ctx.chain_id())
    }
}

impl CatalogSource for HttpCatalogSource {
    fn fetch(&self, ctx: &NetworkContext) -> Result<Vec<AppDescriptor>, CatalogError> {
        let text = fetch_text(self.fetcher.as_ref(), &self.url_for(ctx))
            .map_err(|e| CatalogError::Fetch(format!("{e}")))?;
        parse_catalog_json(&text, ctx)
    }
}

/// Snapshot of one context's remote catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogLoad {
    pub apps: Vec<AppDescriptor>,
    pub loading: bool,
    pub error: Option<CatalogError>,
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    apps: Arc<Vec<AppDescriptor>>,
    error: Option<CatalogError>,
}

struct CatalogShared {
    source: Arc<dyn CatalogSource>,
    entries: Cache<String, CatalogEntry>,
    last_known: Mutex<HashMap<String, Arc<Vec<AppDescriptor>>>>,
    in_flight: Mutex<HashSet<String>>,
    diagnostics: Mutex<DiagnosticsSender>,
}

impl CatalogShared {
    fn last_known(&self, key: &str) -> Arc<Vec<AppDescriptor>> {
        self.last_known.lock().get(key).cloned().unwrap_or_default()
    }

    fn fetch_and_store(&self, key: &str, ctx: &NetworkContext) -> CatalogEntry {
        let started = Instant::now();
        let diagnostics = self.diagnostics.lock().clone();
        diagnostics.sent(CHANNEL_CATALOG_FETCH_STARTED, key.len());
        let entry = match self.source.fetch(ctx) {
            Ok(apps) => {
                debug!("Loaded {} catalog apps for {ctx}", apps.len());
                let apps = Arc::new(apps);
                self.last_known.lock().insert(key.to_string(), Arc::clone(&apps));
                diagnostics.received(
                    CHANNEL_CATALOG_FETCH_SUCCEEDED,
                    started.elapsed().as_micros() as u64,
                );
                CatalogEntry { apps, error: None }
            },
            Err(e) => {
                warn!("Catalog fetch for {ctx} failed: {e}");
                diagnostics.received(
                    CHANNEL_CATALOG_FETCH_FAILED,
                    started.elapsed().as_micros() as u64,
                );
                CatalogEntry {
                    apps: self.last_known(key),
                    error: Some(e),
                }
            },
        };
        self.entries.insert(key.to_string(), entry.clone());
        self.in_flight.lock().remove(key);
        entry
    }
}

/// Per-context catalog cache with a time-to-live.
#[derive(Clone)]
pub struct CatalogCache {
    shared: Arc<CatalogShared>,
}

impl CatalogCache {
    pub fn new(source: Arc<dyn CatalogSource>, ttl: Duration) -> Self {
        Self {
            shared: Arc::new(CatalogShared {
                source,
                entries: Cache::builder()
                    .max_capacity(CATALOG_CACHE_CAPACITY)
                    .time_to_live(ttl)
                    .build(),
                last_known: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashSet::new()),
                diagnostics: Mutex::new(DiagnosticsSender::disabled()),
            }),
        }
    }

    /// Cache with no remote source; every context has an empty catalog.
    pub fn empty() -> Self {
        let source = |_: &NetworkContext| -> Result<Vec<AppDescriptor>, CatalogError> {
            Ok(Vec::new())
        };
        Self::new(Arc::new(source), DEFAULT_CATALOG_TTL)
    }

    /// Applies to every clone of this cache.
    pub fn with_diagnostics(self, diagnostics: DiagnosticsSender) -> Self {
        *self.shared.diagnostics.lock() = diagnostics;
        self
    }

    /// Current state for `ctx`, starting a background fetch if needed.
    pub fn load(&self, ctx: &NetworkContext) -> CatalogLoad {
        let key = ctx.storage_key();
        if let Some(entry) = self.shared.entries.get(&key) {
            return CatalogLoad {
                apps: entry.apps.as_ref().clone(),
                loading: self.shared.in_flight.lock().contains(&key),
                error: entry.error,
            };
        }

        let spawn = self.shared.in_flight.lock().insert(key.clone());
        if spawn {
            let shared = Arc::clone(&self.shared);
            let ctx = ctx.clone();
            let worker_key = key.clone();
            std::thread::spawn(move || {
                shared.fetch_and_store(&worker_key, &ctx);
            });
        }
        CatalogLoad {
            apps: self.shared.last_known(&key).as_ref().clone(),
            loading: true,
            error: None,
        }
    }

    /// Like [`Self::load`] but fetches on the calling thread when nothing is
    /// cached. Concurrent callers may fetch twice; the later result wins.
    pub fn load_blocking(&self, ctx: &NetworkContext) -> CatalogLoad {
        let key = ctx.storage_key();
        let entry = match self.shared.entries.get(&key) {
            Some(entry) => entry,
            None => {
                self.shared.in_flight.lock().insert(key.clone());
                self.shared.fetch_and_store(&key, ctx)
            },
        };
        CatalogLoad {
            apps: entry.apps.as_ref().clone(),
            loading: false,
            error: entry.error,
        }
    }

    /// Poll [`Self::load`] until the catalog stops loading or `timeout`
    /// elapses.
    pub fn wait_until_loaded(&self, ctx: &NetworkContext, timeout: Duration) -> CatalogLoad {
        let deadline = Instant::now() + timeout;
        loop {
            let load = self.load(ctx);
            if !load.loading || Instant::now() >= deadline {
                return load;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Drop the cached entry so the next load refetches.
    pub fn invalidate(&self, ctx: &NetworkContext) {
        self.shared.entries.invalidate(&ctx.storage_key());
    }

    /// Replace a context's catalog wholesale without consulting the source.
    pub fn replace(&self, ctx: &NetworkContext, apps: Vec<AppDescriptor>) {
        let key = ctx.storage_key();
        let apps = Arc::new(apps);
        self.shared
            .last_known
            .lock()
            .insert(key.clone(), Arc::clone(&apps));
        self.shared
            .entries
            .insert(key, CatalogEntry { apps, error: None });
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Registry persistence backed by redb.
//!
//! One database file (`registry.redb`) holds every table:
//! - `custom_apps`, `pinned_apps`, `app_usage`: keyed by the network
//!   context's storage key, value is a JSON document from [`types`].
//! - `capabilities_wallet`, `capabilities_browser`: keyed by origin, value is
//!   a JSON capability set (see [`crate::permissions::persisted`]).
//!
//! Every save is a single write transaction, so a failed write leaves the
//! previous document in place.

pub mod memory;
pub mod types;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use appshelf_core::{AppDescriptor, AppId, NetworkContext};
use log::{debug, info};
use redb::{ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use memory::MemoryPersistence;
pub use types::{AppUsageRecord, PersistedAppUsage, PersistedCustomApps, PersistedPins};

use crate::permissions::CapabilityScope;
use crate::permissions::persisted::PersistedCapabilityStore;

pub(crate) type JsonTable = redb::TableDefinition<'static, &'static str, &'static [u8]>;

const CUSTOM_APPS_TABLE: JsonTable = redb::TableDefinition::new("custom_apps");
const PINNED_APPS_TABLE: JsonTable = redb::TableDefinition::new("pinned_apps");
const APP_USAGE_TABLE: JsonTable = redb::TableDefinition::new("app_usage");
pub(crate) const CAPABILITIES_WALLET_TABLE: JsonTable =
    redb::TableDefinition::new("capabilities_wallet");
pub(crate) const CAPABILITIES_BROWSER_TABLE: JsonTable =
    redb::TableDefinition::new("capabilities_browser");

const ALL_TABLES: [JsonTable; 5] = [
    CUSTOM_APPS_TABLE,
    PINNED_APPS_TABLE,
    APP_USAGE_TABLE,
    CAPABILITIES_WALLET_TABLE,
    CAPABILITIES_BROWSER_TABLE,
];

pub const DATABASE_FILE_NAME: &str = "registry.redb";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    Io(String),
    Redb(String),
    Serialization(String),
    Unavailable(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "IO error: {e}"),
            StorageError::Redb(e) => write!(f, "Redb error: {e}"),
            StorageError::Serialization(e) => write!(f, "Serialization error: {e}"),
            StorageError::Unavailable(e) => write!(f, "Storage unavailable: {e}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Per-context persistence of the mutable registry state.
pub trait RegistryPersistence: Send + Sync {
    fn load_custom_apps(&self, ctx: &NetworkContext) -> Result<Vec<AppDescriptor>, StorageError>;
    fn save_custom_apps(
        &self,
        ctx: &NetworkContext,
        apps: &[AppDescriptor],
    ) -> Result<(), StorageError>;
    fn load_pinned_ids(&self, ctx: &NetworkContext) -> Result<BTreeSet<AppId>, StorageError>;
    fn save_pinned_ids(
        &self,
        ctx: &NetworkContext,
        ids: &BTreeSet<AppId>,
    ) -> Result<(), StorageError>;
    fn load_app_usage(&self, ctx: &NetworkContext) -> Result<PersistedAppUsage, StorageError>;
    fn save_app_usage(
        &self,
        ctx: &NetworkContext,
        usage: &PersistedAppUsage,
    ) -> Result<(), StorageError>;
    /// Drop every document stored for `ctx`.
    fn clear_context(&self, ctx: &NetworkContext) -> Result<(), StorageError>;
}

/// On-disk registry database.
#[derive(Clone)]
pub struct RegistryStore {
    db: Arc<redb::Database>,
    path: PathBuf,
}

impl RegistryStore {
    pub fn open(base_dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&base_dir)
            .map_err(|e| StorageError::Io(format!("Failed to create dir: {e}")))?;
        let path = base_dir.join(DATABASE_FILE_NAME);
        let db = redb::Database::create(&path).map_err(|e| StorageError::Redb(format!("{e}")))?;

        let write_txn = db
            .begin_write()
            .map_err(|e| StorageError::Redb(format!("{e}")))?;
        for table_def in ALL_TABLES {
            write_txn
                .open_table(table_def)
                .map_err(|e| StorageError::Redb(format!("{e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| StorageError::Redb(format!("{e}")))?;

        debug!("Opened registry database at {}", path.display());
        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Capability store for `scope`, sharing this database file.
    pub fn capability_store(&self, scope: CapabilityScope) -> PersistedCapabilityStore {
        let table = match scope {
            CapabilityScope::Wallet => CAPABILITIES_WALLET_TABLE,
            CapabilityScope::Browser => CAPABILITIES_BROWSER_TABLE,
        };
        PersistedCapabilityStore::new(Arc::clone(&self.db), scope, table)
    }

    fn read_json<T>(&self, table_def: JsonTable, key: &str) -> Result<T, StorageError>
    where
        T: DeserializeOwned + Default,
    {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StorageError::Redb(format!("{e}")))?;
        let table = match read_txn.open_table(table_def) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(T::default()),
            Err(e) => return Err(StorageError::Redb(format!("{e}"))),
        };
        let Some(entry) = table
            .get(key)
            .map_err(|e| StorageError::Redb(format!("{e}")))?
        else {
            return Ok(T::default());
        };
        serde_json::from_slice(entry.value())
            .map_err(|e| StorageError::Serialization(format!("{e}")))
    }

    fn write_json<T>(&self, table_def: JsonTable, key: &str, document: &T) -> Result<(), StorageError>
    where
        T: Serialize,
    {
        let bytes = serde_json::to_vec(document)
            .map_err(|e| StorageError::Serialization(format!("{e}")))?;
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StorageError::Redb(format!("{e}")))?;
        {
            let mut table = write_txn
                .open_table(table_def)
                .map_err(|e| StorageError::Redb(format!("{e}")))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(|e| StorageError::Redb(format!("{e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| StorageError::Redb(format!("{e}")))?;
        Ok(())
    }
}

impl RegistryPersistence for RegistryStore {
    fn load_custom_apps(&self, ctx: &NetworkContext) -> Result<Vec<AppDescriptor>, StorageError> {
        let document: PersistedCustomApps = self.read_json(CUSTOM_APPS_TABLE, &ctx.storage_key())?;
        Ok(document.apps)
    }

    fn save_custom_apps(
        &self,
        ctx: &NetworkContext,
        apps: &[AppDescriptor],
    ) -> Result<(), StorageError> {
        let document = PersistedCustomApps {
            apps: apps.to_vec(),
        };
        self.write_json(CUSTOM_APPS_TABLE, &ctx.storage_key(), &document)
    }

    fn load_pinned_ids(&self, ctx: &NetworkContext) -> Result<BTreeSet<AppId>, StorageError> {
        let document: PersistedPins = self.read_json(PINNED_APPS_TABLE, &ctx.storage_key())?;
        Ok(document.ids)
    }

    fn save_pinned_ids(
        &self,
        ctx: &NetworkContext,
        ids: &BTreeSet<AppId>,
    ) -> Result<(), StorageError> {
        let document = PersistedPins { ids: ids.clone() };
        self.write_json(PINNED_APPS_TABLE, &ctx.storage_key(), &document)
    }

    fn load_app_usage(&self, ctx: &NetworkContext) -> Result<PersistedAppUsage, StorageError> {
        self.read_json(APP_USAGE_TABLE, &ctx.storage_key())
    }

    fn save_app_usage(
        &self,
        ctx: &NetworkContext,
        usage: &PersistedAppUsage,
    ) -> Result<(), StorageError> {
        self.write_json(APP_USAGE_TABLE, &ctx.storage_key(), usage)
    }

    fn clear_context(&self, ctx: &NetworkContext) -> Result<(), StorageError> {
        let key = ctx.storage_key();
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StorageError::Redb(format!("{e}")))?;
        for table_def in [CUSTOM_APPS_TABLE, PINNED_APPS_TABLE, APP_USAGE_TABLE] {
            let mut table = write_txn
                .open_table(table_def)
                .map_err(|e| StorageError::Redb(format!("{e}")))?;
            table
                .remove(key.as_str())
                .map_err(|e| StorageError::Redb(format!("{e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| StorageError::Redb(format!("{e}")))?;
        info!("Cleared registry state for context {ctx}");
        Ok(())
    }
}

/// Keys currently present in `table_def`, in key order.
pub(crate) fn table_keys(db: &redb::Database, table_def: JsonTable) -> Result<Vec<String>, StorageError> {
    let read_txn = db
        .begin_read()
        .map_err(|e| StorageError::Redb(format!("{e}")))?;
    let table = match read_txn.open_table(table_def) {
        Ok(table) => table,
        Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::Redb(format!("{e}"))),
    };
    let mut keys = Vec::new();
    for entry in table
        .iter()
        .map_err(|e| StorageError::Redb(format!("{e}")))?
    {
        let (key, _) = entry.map_err(|e| StorageError::Redb(format!("{e}")))?;
        keys.push(key.value().to_string());
    }
    Ok(keys)
}

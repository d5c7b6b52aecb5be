/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! redb-backed capability store sharing the registry database.

use std::collections::BTreeSet;
use std::sync::Arc;

use redb::{ReadableDatabase, ReadableTable};

use super::{Capability, CapabilityScope, CapabilityStore, origin_key};
use crate::persistence::{JsonTable, StorageError, table_keys};

pub struct PersistedCapabilityStore {
    db: Arc<redb::Database>,
    scope: CapabilityScope,
    table: JsonTable,
}

impl PersistedCapabilityStore {
    pub(crate) fn new(db: Arc<redb::Database>, scope: CapabilityScope, table: JsonTable) -> Self {
        Self { db, scope, table }
    }
}

fn decode_set(bytes: &[u8]) -> Result<BTreeSet<Capability>, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(format!("{e}")))
}

impl CapabilityStore for PersistedCapabilityStore {
    fn scope(&self) -> CapabilityScope {
        self.scope
    }

    fn grant(&self, origin: &str, capability: Capability) -> Result<(), StorageError> {
        let key = origin_key(origin);
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StorageError::Redb(format!("{e}")))?;
        {
            let mut table = write_txn
                .open_table(self.table)
                .map_err(|e| StorageError::Redb(format!("{e}")))?;
            let existing = table
                .get(key.as_str())
                .map_err(|e| StorageError::Redb(format!("{e}")))?
                .map(|entry| entry.value().to_vec());
            let mut capabilities = match existing {
                Some(bytes) => decode_set(&bytes)?,
                None => BTreeSet::new(),
            };
            capabilities.insert(capability);
            let bytes = serde_json::to_vec(&capabilities)
                .map_err(|e| StorageError::Serialization(format!("{e}")))?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(|e| StorageError::Redb(format!("{e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| StorageError::Redb(format!("{e}")))?;
        Ok(())
    }

    fn query(&self, origin: &str) -> Result<BTreeSet<Capability>, StorageError> {
        let key = origin_key(origin);
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StorageError::Redb(format!("{e}")))?;
        let table = match read_txn.open_table(self.table) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(BTreeSet::new()),
            Err(e) => return Err(StorageError::Redb(format!("{e}"))),
        };
        match table
            .get(key.as_str())
            .map_err(|e| StorageError::Redb(format!("{e}")))?
        {
            Some(entry) => decode_set(entry.value()),
            None => Ok(BTreeSet::new()),
        }
    }

    fn revoke(&self, origin: &str) -> Result<(), StorageError> {
        let key = origin_key(origin);
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StorageError::Redb(format!("{e}")))?;
        {
            let mut table = write_txn
                .open_table(self.table)
                .map_err(|e| StorageError::Redb(format!("{e}")))?;
            table
                .remove(key.as_str())
                .map_err(|e| StorageError::Redb(format!("{e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| StorageError::Redb(format!("{e}")))?;
        Ok(())
    }

    fn origins(&self) -> Result<Vec<String>, StorageError> {
        table_keys(&self.db, self.table)
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Serializable documents stored per network context.

use std::collections::BTreeSet;

use appshelf_core::{AppDescriptor, AppId};
use serde::{Deserialize, Serialize};

/// Ordered user-added apps of one context, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCustomApps {
    pub apps: Vec<AppDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedPins {
    pub ids: BTreeSet<AppId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUsageRecord {
    pub app_id: AppId,
    pub open_count: u64,
    /// Seconds since the Unix epoch of the most recent open.
    pub last_opened_at_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedAppUsage {
    pub entries: Vec<AppUsageRecord>,
}

impl PersistedAppUsage {
    pub fn open_count(&self, id: &AppId) -> u64 {
        self.entries
            .iter()
            .find(|entry| entry.app_id == *id)
            .map_or(0, |entry| entry.open_count)
    }

    /// Bump the open counter for `id`, creating the record on first open.
    pub fn record_open(&mut self, id: AppId, now_secs: u64) -> u64 {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.app_id == id) {
            entry.open_count += 1;
            entry.last_opened_at_secs = now_secs;
            return entry.open_count;
        }
        self.entries.push(AppUsageRecord {
            app_id: id,
            open_count: 1,
            last_opened_at_secs: now_secs,
        });
        1
    }

    pub fn forget(&mut self, id: &AppId) {
        self.entries.retain(|entry| entry.app_id != *id);
    }
}

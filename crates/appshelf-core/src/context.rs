/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use serde::{Deserialize, Serialize};

/// The active network (chain) that scopes custom apps, pins and the remote
/// catalog. Passed explicitly into every registry call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkContext {
    chain_id: String,
    short_name: String,
}

impl NetworkContext {
    pub fn new(chain_id: impl Into<String>, short_name: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into().trim().to_string(),
            short_name: short_name.into().trim().to_string(),
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Human-facing network prefix (`eth`, `gno`, ...); used in share links.
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Key under which per-context state is persisted.
    pub fn storage_key(&self) -> String {
        format!("chain:{}", self.chain_id)
    }
}

impl std::fmt::Display for NetworkContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.short_name.is_empty() {
            write!(f, "{}", self.chain_id)
        } else {
            write!(f, "{} ({})", self.short_name, self.chain_id)
        }
    }
}

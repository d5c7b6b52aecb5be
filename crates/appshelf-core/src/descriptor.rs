/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Mini-app identity and descriptors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_url::normalize_app_url;

/// Stable app identity.
///
/// Catalog ids are assigned by the remote catalog. Custom ids are a UUID v5
/// of the normalized, lowercased URL, so the same URL always maps to the
/// same id across reloads and two different URLs never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AppId {
    Catalog(u64),
    Custom(Uuid),
}

impl AppId {
    pub fn for_custom_url(url: &str) -> Self {
        let canonical = normalize_app_url(url).to_ascii_lowercase();
        Self::Custom(Uuid::new_v5(&Uuid::NAMESPACE_URL, canonical.as_bytes()))
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog(id) => write!(f, "catalog:{id}"),
            Self::Custom(uuid) => write!(f, "custom:{uuid}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdParseError(pub String);

impl fmt::Display for AppIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid app id '{}' (expected catalog:<n>, custom:<uuid> or a bare number)",
            self.0
        )
    }
}

impl std::error::Error for AppIdParseError {}

impl FromStr for AppId {
    type Err = AppIdParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let err = || AppIdParseError(trimmed.to_string());
        match trimmed.split_once(':') {
            Some(("catalog", id)) => id.parse().map(Self::Catalog).map_err(|_| err()),
            Some(("custom", uuid)) => Uuid::parse_str(uuid).map(Self::Custom).map_err(|_| err()),
            Some(_) => Err(err()),
            None => trimmed.parse().map(Self::Catalog).map_err(|_| err()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDescriptor {
    pub id: AppId,
    pub name: String,
    /// Canonical origin of the app; also the key of its capability grants.
    pub url: String,
    pub icon_url: String,
    pub description: String,
    /// Chains the app declares support for. Empty means unrestricted.
    #[serde(default)]
    pub chain_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl AppDescriptor {
    /// Build a user-added app descriptor; the URL is normalized and the id is
    /// derived from it.
    pub fn custom(
        url: &str,
        name: impl Into<String>,
        description: impl Into<String>,
        icon_url: impl Into<String>,
        chain_ids: Vec<String>,
    ) -> Self {
        let url = normalize_app_url(url);
        Self {
            id: AppId::for_custom_url(&url),
            name: name.into(),
            url,
            icon_url: icon_url.into(),
            description: description.into(),
            chain_ids,
            tags: Vec::new(),
        }
    }

    pub fn is_custom(&self) -> bool {
        self.id.is_custom()
    }

    pub fn supports_chain(&self, chain_id: &str) -> bool {
        self.chain_ids.is_empty() || self.chain_ids.iter().any(|id| id == chain_id)
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Capability grants held by mini-apps, keyed by origin.
//!
//! Two stores exist side by side: wallet-level permissions (signing,
//! account access) and browser-level permissions (camera, clipboard). They
//! are independent backends but one consistency domain: an app's grants are
//! dropped from both through [`CapabilityStores::revoke_all`].

pub mod persisted;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use appshelf_core::normalize_app_url;
use log::{debug, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::diagnostics::{
    CHANNEL_CAPABILITY_REVOKE_FAILED, CHANNEL_CAPABILITY_REVOKED, DiagnosticsSender,
};
use crate::persistence::StorageError;

pub use persisted::PersistedCapabilityStore;

/// Opaque capability token such as `eth_accounts` or `camera`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Capability {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityScope {
    Wallet,
    Browser,
}

impl CapabilityScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wallet => "wallet",
            Self::Browser => "browser",
        }
    }
}

impl fmt::Display for CapabilityScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical store key for an origin: normalized and lowercased.
pub fn origin_key(origin: &str) -> String {
    normalize_app_url(origin).to_ascii_lowercase()
}

/// Origin -> capability set mapping.
///
/// `revoke` is idempotent: revoking an origin without grants succeeds.
pub trait CapabilityStore: Send + Sync {
    fn scope(&self) -> CapabilityScope;
    fn grant(&self, origin: &str, capability: Capability) -> Result<(), StorageError>;
    fn query(&self, origin: &str) -> Result<BTreeSet<Capability>, StorageError>;
    fn revoke(&self, origin: &str) -> Result<(), StorageError>;
    /// Origins holding at least one grant, sorted.
    fn origins(&self) -> Result<Vec<String>, StorageError>;
}

#[derive(Debug)]
pub struct MemoryCapabilityStore {
    scope: CapabilityScope,
    grants: RwLock<HashMap<String, BTreeSet<Capability>>>,
    fail_revoke: AtomicBool,
}

impl MemoryCapabilityStore {
    pub fn new(scope: CapabilityScope) -> Self {
        Self {
            scope,
            grants: RwLock::new(HashMap::new()),
            fail_revoke: AtomicBool::new(false),
        }
    }

    /// Make `revoke` fail with [`StorageError::Unavailable`] while set.
    pub fn set_fail_revoke(&self, fail: bool) {
        self.fail_revoke.store(fail, Ordering::SeqCst);
    }
}

impl CapabilityStore for MemoryCapabilityStore {
    fn scope(&self) -> CapabilityScope {
        self.scope
    }

    fn grant(&self, origin: &str, capability: Capability) -> Result<(), StorageError> {
        self.grants
            .write()
            .entry(origin_key(origin))
            .or_default()
            .insert(capability);
        Ok(())
    }

    fn query(&self, origin: &str) -> Result<BTreeSet<Capability>, StorageError> {
        Ok(self
            .grants
            .read()
            .get(&origin_key(origin))
            .cloned()
            .unwrap_or_default())
    }

    fn revoke(&self, origin: &str) -> Result<(), StorageError> {
        if self.fail_revoke.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!(
                "{} capability store rejected revoke",
                self.scope
            )));
        }
        self.grants.write().remove(&origin_key(origin));
        Ok(())
    }

    fn origins(&self) -> Result<Vec<String>, StorageError> {
        let mut origins = self
            .grants
            .read()
            .iter()
            .filter(|(_, capabilities)| !capabilities.is_empty())
            .map(|(origin, _)| origin.clone())
            .collect::<Vec<_>>();
        origins.sort();
        Ok(origins)
    }
}

/// Outcome of a best-effort revocation across both stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationReport {
    pub origin: String,
    pub failures: Vec<(CapabilityScope, StorageError)>,
}

impl RevocationReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Clone)]
pub struct CapabilityStores {
    wallet: Arc<dyn CapabilityStore>,
    browser: Arc<dyn CapabilityStore>,
    diagnostics: DiagnosticsSender,
}

impl CapabilityStores {
    pub fn new(wallet: Arc<dyn CapabilityStore>, browser: Arc<dyn CapabilityStore>) -> Self {
        Self {
            wallet,
            browser,
            diagnostics: DiagnosticsSender::disabled(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryCapabilityStore::new(CapabilityScope::Wallet)),
            Arc::new(MemoryCapabilityStore::new(CapabilityScope::Browser)),
        )
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticsSender) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn wallet(&self) -> &dyn CapabilityStore {
        self.wallet.as_ref()
    }

    pub fn browser(&self) -> &dyn CapabilityStore {
        self.browser.as_ref()
    }

    pub fn store(&self, scope: CapabilityScope) -> &dyn CapabilityStore {
        match scope {
            CapabilityScope::Wallet => self.wallet(),
            CapabilityScope::Browser => self.browser(),
        }
    }

    /// Revoke `origin` in the wallet store, then in the browser store.
    ///
    /// A failure in one store is logged and reported but never stops the
    /// other; nothing is rolled back.
    pub fn revoke_all(&self, origin: &str) -> RevocationReport {
        let origin = origin_key(origin);
        let mut failures = Vec::new();
        for store in [self.wallet(), self.browser()] {
            match store.revoke(&origin) {
                Ok(()) => {
                    debug!("Revoked {} capabilities for {origin}", store.scope());
                    self.diagnostics
                        .sent(CHANNEL_CAPABILITY_REVOKED, origin.len());
                },
                Err(e) => {
                    warn!(
                        "Failed to revoke {} capabilities for {origin}: {e}",
                        store.scope()
                    );
                    self.diagnostics
                        .sent(CHANNEL_CAPABILITY_REVOKE_FAILED, origin.len());
                    failures.push((store.scope(), e));
                },
            }
        }
        RevocationReport { origin, failures }
    }

    /// Grants held by `origin` in both stores.
    pub fn query_all(
        &self,
        origin: &str,
    ) -> Result<(BTreeSet<Capability>, BTreeSet<Capability>), StorageError> {
        Ok((self.wallet.query(origin)?, self.browser.query(origin)?))
    }
}

impl fmt::Debug for CapabilityStores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityStores").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticsState;

    #[test]
    fn origin_keys_ignore_case_and_trailing_slash() {
        let store = MemoryCapabilityStore::new(CapabilityScope::Wallet);
        store.grant("https://B.io/", "eth_accounts".into()).unwrap();
        assert_eq!(
            store.query("https://b.io").unwrap(),
            BTreeSet::from([Capability::new("eth_accounts")])
        );
        assert_eq!(store.origins().unwrap(), vec!["https://b.io".to_string()]);
    }

    #[test]
    fn revoke_is_idempotent() {
        let store = MemoryCapabilityStore::new(CapabilityScope::Browser);
        store.grant("https://b.io", "camera".into()).unwrap();
        store.revoke("https://b.io").unwrap();
        let after_first = store.query("https://b.io").unwrap();
        store.revoke("https://b.io").unwrap();
        assert_eq!(store.query("https://b.io").unwrap(), after_first);
        assert!(after_first.is_empty());
        store.revoke("https://never-granted.io").unwrap();
    }

    #[test]
    fn revoke_all_continues_past_failing_store() {
        let wallet = Arc::new(MemoryCapabilityStore::new(CapabilityScope::Wallet));
        let browser = Arc::new(MemoryCapabilityStore::new(CapabilityScope::Browser));
        wallet.grant("https://b.io", "eth_sign".into()).unwrap();
        browser.grant("https://b.io", "camera".into()).unwrap();
        wallet.set_fail_revoke(true);

        let mut diagnostics = DiagnosticsState::new();
        let stores = CapabilityStores::new(wallet.clone(), browser.clone())
            .with_diagnostics(diagnostics.sender());
        let report = stores.revoke_all("https://b.io/");

        assert!(!report.is_complete());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, CapabilityScope::Wallet);
        assert!(browser.query("https://b.io").unwrap().is_empty());
        assert!(!wallet.query("https://b.io").unwrap().is_empty());

        diagnostics.drain();
        assert_eq!(diagnostics.channel_count(CHANNEL_CAPABILITY_REVOKE_FAILED), 1);
        assert_eq!(diagnostics.channel_count(CHANNEL_CAPABILITY_REVOKED), 1);
    }
}

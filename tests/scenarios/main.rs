/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

mod harness;

use std::sync::Arc;
use std::time::{Duration, Instant};

use appshelf::VERSION;
use appshelf::appshelf_core::{AppDescriptor, AppId, NetworkContext};
use appshelf::diagnostics::{CHANNEL_MANIFEST_RESOLVE_STALE, DiagnosticsState};
use appshelf::onboarding::{
    CandidateState, CustomAppOnboarding, ManifestError, ManifestResolver, SubmissionGate,
};
use appshelf::permissions::{
    Capability, CapabilityScope, CapabilityStore, CapabilityStores, MemoryCapabilityStore,
};
use appshelf::persistence::MemoryPersistence;
use appshelf::registries::{AppRegistry, RegistryError};
use harness::{catalog_app, catalog_with, ctx, disk_registry, memory_registry, named_after_host, names};

const SETTLE: Duration = Duration::from_secs(5);

#[test]
fn scenarios_binary_smoke_runs() {
    assert!(!VERSION.is_empty());
}

#[test]
fn add_pin_remove_round_trip() {
    let (registry, _) = memory_registry(vec![catalog_app(1, "Zeta", "https://zeta.io")]);
    let ctx = ctx();
    let resolver = |url: &str, ctx: &NetworkContext| -> Result<AppDescriptor, ManifestError> {
        Ok(AppDescriptor::custom(
            url,
            "Alpha",
            "custom app",
            "",
            vec![ctx.chain_id().to_string()],
        ))
    };
    let mut onboarding =
        CustomAppOnboarding::new(Arc::new(resolver), ctx.clone()).with_debounce(Duration::ZERO);

    onboarding.set_input("https://b.io/", Instant::now());
    onboarding.wait_for_outcome(SETTLE);
    onboarding.set_risk_acknowledged(true);
    let added = onboarding.submit(&registry).unwrap();
    assert_eq!(added.url, "https://b.io");
    assert_eq!(names(&registry.all(&ctx).unwrap()), vec!["Alpha", "Zeta"]);

    assert!(registry.toggle_pin(&ctx, AppId::Catalog(1)).unwrap());
    assert_eq!(names(&registry.pinned(&ctx).unwrap()), vec!["Zeta"]);

    let capabilities = registry.capabilities();
    capabilities
        .wallet()
        .grant("https://b.io", Capability::new("eth_sendTransaction"))
        .unwrap();
    capabilities
        .browser()
        .grant("https://b.io", Capability::new("camera"))
        .unwrap();

    let report = registry.remove_custom_app(&ctx, &added.id).unwrap();
    assert!(report.is_complete());
    assert_eq!(names(&registry.all(&ctx).unwrap()), vec!["Zeta"]);
    assert_eq!(names(&registry.pinned(&ctx).unwrap()), vec!["Zeta"]);
    let (wallet, browser) = capabilities.query_all("https://b.io").unwrap();
    assert!(wallet.is_empty());
    assert!(browser.is_empty());
}

#[test]
fn late_resolution_for_abandoned_url_is_discarded() {
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
    let resolver = move |url: &str, ctx: &NetworkContext| -> Result<AppDescriptor, ManifestError> {
        if url == "https://x.io" {
            let _ = release_rx.recv_timeout(SETTLE);
        }
        named_after_host(url, ctx)
    };
    let mut diagnostics = DiagnosticsState::new();
    let mut onboarding = CustomAppOnboarding::new(Arc::new(resolver), ctx())
        .with_debounce(Duration::ZERO)
        .with_diagnostics(diagnostics.sender());

    let now = Instant::now();
    onboarding.set_input("https://x.io", now);
    onboarding.tick(now);
    assert!(matches!(onboarding.state(), CandidateState::Resolving { .. }));

    onboarding.set_input("https://y.io", now);
    onboarding.wait_for_outcome(SETTLE);
    assert_eq!(
        onboarding.resolved_app().map(|app| app.name.as_str()),
        Some("y.io")
    );

    release_tx.send(()).unwrap();
    let give_up = Instant::now() + SETTLE;
    while diagnostics.channel_count(CHANNEL_MANIFEST_RESOLVE_STALE) == 0 && Instant::now() < give_up {
        onboarding.tick(Instant::now());
        diagnostics.drain();
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(diagnostics.channel_count(CHANNEL_MANIFEST_RESOLVE_STALE), 1);
    assert_eq!(
        onboarding.resolved_app().map(|app| app.url.as_str()),
        Some("https://y.io")
    );
}

#[test]
fn trailing_slash_variant_is_a_duplicate() {
    let (registry, _) = memory_registry(Vec::new());
    let ctx = ctx();
    registry
        .add_custom_app(&ctx, named_after_host("https://b.io", &ctx).unwrap())
        .unwrap();

    let err = registry
        .add_custom_app(&ctx, named_after_host("https://b.io/", &ctx).unwrap())
        .unwrap_err();
    assert!(matches!(err, RegistryError::Duplicate(_)));
    assert_eq!(registry.custom_apps(&ctx).unwrap().len(), 1);

    let mut onboarding = CustomAppOnboarding::new(Arc::new(named_after_host), ctx.clone())
        .with_debounce(Duration::ZERO);
    onboarding.set_input("https://b.io///", Instant::now());
    onboarding.wait_for_outcome(SETTLE);
    onboarding.set_risk_acknowledged(true);
    let view = registry.view(&ctx).unwrap();
    assert!(matches!(
        onboarding.gate(&view),
        SubmissionGate::Duplicate { .. }
    ));
}

#[test]
fn catalog_url_is_never_added_as_custom() {
    let (registry, _) = memory_registry(vec![catalog_app(1, "Zeta", "https://zeta.io")]);
    let ctx = ctx();
    let err = registry
        .add_custom_app(&ctx, named_after_host("https://zeta.io/", &ctx).unwrap())
        .unwrap_err();
    match err {
        RegistryError::Duplicate(duplicate) => {
            assert_eq!(duplicate.existing_id, AppId::Catalog(1));
            assert_eq!(duplicate.existing_name, "Zeta");
        },
        other => panic!("expected duplicate, got {other:?}"),
    }
}

#[test]
fn revoking_unknown_origin_is_a_no_op() {
    let capabilities = CapabilityStores::in_memory();
    let first = capabilities.revoke_all("https://never-granted.io");
    let second = capabilities.revoke_all("https://never-granted.io");
    assert!(first.is_complete());
    assert_eq!(first, second);
}

#[test]
fn custom_pins_never_surface() {
    let (registry, _) = memory_registry(vec![catalog_app(1, "Zeta", "https://zeta.io")]);
    let ctx = ctx();
    let custom = registry
        .add_custom_app(&ctx, named_after_host("https://b.io", &ctx).unwrap())
        .unwrap();

    assert!(registry.toggle_pin(&ctx, custom.id).unwrap());
    assert!(registry.pinned_ids(&ctx).unwrap().contains(&custom.id));
    assert!(registry.pinned(&ctx).unwrap().is_empty());

    assert!(!registry.toggle_pin(&ctx, custom.id).unwrap());
    assert!(registry.pinned_ids(&ctx).unwrap().is_empty());
}

#[test]
fn registry_and_grants_survive_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let ctx = ctx();
    let custom = {
        let registry = disk_registry(dir.path(), vec![catalog_app(1, "Zeta", "https://zeta.io")]);
        let custom = registry
            .add_custom_app(&ctx, named_after_host("https://b.io", &ctx).unwrap())
            .unwrap();
        registry.toggle_pin(&ctx, AppId::Catalog(1)).unwrap();
        registry.record_app_open(&ctx, custom.id).unwrap();
        registry
            .capabilities()
            .wallet()
            .grant("https://b.io", Capability::new("eth_accounts"))
            .unwrap();
        custom
    };

    let registry = disk_registry(dir.path(), vec![catalog_app(1, "Zeta", "https://zeta.io")]);
    assert_eq!(registry.custom_apps(&ctx).unwrap(), vec![custom.clone()]);
    assert_eq!(names(&registry.pinned(&ctx).unwrap()), vec!["Zeta"]);
    assert_eq!(registry.ranked(&ctx).unwrap().first().map(|app| app.id), Some(custom.id));
    assert_eq!(
        registry
            .capabilities()
            .store(CapabilityScope::Wallet)
            .origins()
            .unwrap(),
        vec!["https://b.io".to_string()]
    );

    let report = registry.remove_custom_app(&ctx, &custom.id).unwrap();
    assert!(report.is_complete());
    assert!(registry.capabilities().wallet().origins().unwrap().is_empty());

    let other_chain = NetworkContext::new("1", "eth");
    assert!(registry.custom_apps(&other_chain).unwrap().is_empty());
}

#[test]
fn failed_write_leaves_lists_untouched() {
    let (registry, persistence) = memory_registry(vec![catalog_app(1, "Zeta", "https://zeta.io")]);
    let ctx = ctx();
    let custom = registry
        .add_custom_app(&ctx, named_after_host("https://b.io", &ctx).unwrap())
        .unwrap();
    registry
        .capabilities()
        .browser()
        .grant("https://b.io", Capability::new("camera"))
        .unwrap();
    let before = registry.view(&ctx).unwrap();

    persistence.set_fail_writes(true);
    assert!(registry
        .add_custom_app(&ctx, named_after_host("https://c.io", &ctx).unwrap())
        .is_err());
    assert!(registry.toggle_pin(&ctx, AppId::Catalog(1)).is_err());
    assert!(matches!(
        registry.remove_custom_app(&ctx, &custom.id),
        Err(RegistryError::Storage(_))
    ));

    assert_eq!(registry.view(&ctx).unwrap(), before);
    let (_, browser) = registry.capabilities().query_all("https://b.io").unwrap();
    assert_eq!(browser.len(), 1);
}

#[test]
fn failing_wallet_store_does_not_block_browser_revocation() {
    let wallet = Arc::new(MemoryCapabilityStore::new(CapabilityScope::Wallet));
    let browser = Arc::new(MemoryCapabilityStore::new(CapabilityScope::Browser));
    let registry = AppRegistry::new(
        Arc::new(MemoryPersistence::new()),
        catalog_with(Vec::new()),
        CapabilityStores::new(wallet.clone(), browser.clone()),
    );
    let ctx = ctx();
    let custom = registry
        .add_custom_app(&ctx, named_after_host("https://b.io", &ctx).unwrap())
        .unwrap();
    wallet
        .grant("https://b.io", Capability::new("eth_accounts"))
        .unwrap();
    browser
        .grant("https://b.io", Capability::new("camera"))
        .unwrap();

    wallet.set_fail_revoke(true);
    let report = registry.remove_custom_app(&ctx, &custom.id).unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, CapabilityScope::Wallet);
    assert!(browser.query("https://b.io").unwrap().is_empty());
    assert!(registry.custom_apps(&ctx).unwrap().is_empty());
}

#[test]
fn resolver_trait_objects_are_shareable() {
    let resolver: Arc<dyn ManifestResolver> = Arc::new(named_after_host);
    let app = resolver.resolve("https://b.io", &ctx()).unwrap();
    assert_eq!(app.id, AppId::for_custom_url("https://b.io"));
}

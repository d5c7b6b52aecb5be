/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! `appshelf` command line.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use appshelf_core::{AppDescriptor, AppId, NetworkContext};
use bpaf::Bpaf;
use log::{error, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::diagnostics::{DiagnosticsSender, DiagnosticsState};
use crate::onboarding::{
    CandidateState, CustomAppOnboarding, HttpManifestResolver, ManifestResolver, OnboardingError,
    SubmissionGate,
};
use crate::permissions::{Capability, CapabilityScope, CapabilityStores};
use crate::persistence::{RegistryStore, StorageError};
use crate::prefs::AppshelfConfig;
use crate::registries::catalog::{
    CatalogCache, CatalogError, CatalogSource, HttpCatalogSource, JsonFileCatalogSource,
};
use crate::registries::ranking::UsageRanking;
use crate::registries::{AppRegistry, RegistryError, RegistryView};
use crate::services::http::{HttpFetcher, OutboundFetchError};

/// Slack on top of debounce and request timeout before `add` gives up.
const ADD_WAIT_MARGIN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Bpaf)]
#[bpaf(options, version)]
/// Manage the mini-apps available on a network: the remote catalog, apps you
/// added yourself, pins, and the permissions apps hold.
pub struct CliArgs {
    /// Config file (defaults to <config_dir>/appshelf/config.toml)
    #[bpaf(long, argument("PATH"))]
    pub config: Option<PathBuf>,
    /// Chain id of the active network
    #[bpaf(long, argument("ID"), fallback("1".to_string()))]
    pub chain: String,
    /// Short network name used in share links
    #[bpaf(long("chain-name"), argument("SHORT"), fallback(String::new()))]
    pub chain_name: String,
    /// Print diagnostics channel counts after the command
    #[bpaf(long)]
    pub diagnostics: bool,
    #[bpaf(external(command))]
    pub command: Command,
}

#[derive(Debug, Clone, Bpaf)]
pub enum Command {
    #[bpaf(command)]
    /// List apps, sorted by name
    List {
        /// Only pinned catalog apps
        #[bpaf(long)]
        pinned: bool,
        /// Most used apps first
        #[bpaf(long)]
        ranked: bool,
        /// Only apps you added
        #[bpaf(long)]
        custom: bool,
    },
    #[bpaf(command)]
    /// Add a custom app from the manifest it hosts
    Add {
        /// Acknowledge that the app is not vetted and used at your own risk
        #[bpaf(long("accept-risk"))]
        accept_risk: bool,
        #[bpaf(positional("URL"))]
        url: String,
    },
    #[bpaf(command)]
    /// Remove a custom app and revoke everything it was granted
    Remove {
        #[bpaf(positional("ID"))]
        id: AppId,
    },
    #[bpaf(command)]
    /// Pin or unpin a catalog app
    Pin {
        #[bpaf(positional("ID"))]
        id: AppId,
    },
    #[bpaf(command)]
    /// Record that an app was opened
    Open {
        #[bpaf(positional("ID"))]
        id: AppId,
    },
    #[bpaf(command)]
    /// Grant a capability to an app origin
    Grant {
        /// Grant a browser permission instead of a wallet permission
        #[bpaf(long)]
        browser: bool,
        #[bpaf(positional("ORIGIN"))]
        origin: String,
        #[bpaf(positional("CAPABILITY"))]
        capability: String,
    },
    #[bpaf(command)]
    /// Show the capabilities held by an origin
    Permissions {
        #[bpaf(positional("ORIGIN"))]
        origin: String,
    },
}

#[derive(Debug)]
pub enum CliError {
    Config(String),
    Http(OutboundFetchError),
    Storage(StorageError),
    Registry(RegistryError),
    Onboarding(OnboardingError),
    Rejected(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::Http(e) => write!(f, "{e}"),
            Self::Storage(e) => write!(f, "{e}"),
            Self::Registry(e) => write!(f, "{e}"),
            Self::Onboarding(e) => write!(f, "{e}"),
            Self::Rejected(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<OutboundFetchError> for CliError {
    fn from(e: OutboundFetchError) -> Self {
        Self::Http(e)
    }
}

impl From<StorageError> for CliError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<RegistryError> for CliError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl From<OnboardingError> for CliError {
    fn from(e: OnboardingError) -> Self {
        Self::Onboarding(e)
    }
}

/// Install the `log`-bridging fmt subscriber. Safe to call more than once.
pub fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

/// Catalog source named by the `catalog` config key: an http(s) URL
/// template, a JSON file path, or nothing.
pub fn catalog_source_from_config(
    config: &AppshelfConfig,
) -> Result<Arc<dyn CatalogSource>, CliError> {
    let Some(catalog) = config.catalog.as_deref().map(str::trim) else {
        let empty = |_: &NetworkContext| -> Result<Vec<AppDescriptor>, CatalogError> {
            Ok(Vec::new())
        };
        return Ok(Arc::new(empty));
    };
    if catalog.starts_with("http://") || catalog.starts_with("https://") {
        let fetcher = HttpFetcher::new(config.manifest_timeout())?;
        return Ok(Arc::new(HttpCatalogSource::new(Arc::new(fetcher), catalog)));
    }
    Ok(Arc::new(JsonFileCatalogSource::new(catalog)))
}

/// Open the on-disk registry described by `config`.
pub fn open_registry(
    config: &AppshelfConfig,
    diagnostics: DiagnosticsSender,
) -> Result<AppRegistry, CliError> {
    let data_dir = config
        .data_dir()
        .ok_or_else(|| CliError::Config("no data directory available".to_string()))?;
    let store = RegistryStore::open(data_dir)?;
    let capabilities = CapabilityStores::new(
        Arc::new(store.capability_store(CapabilityScope::Wallet)),
        Arc::new(store.capability_store(CapabilityScope::Browser)),
    );
    let catalog = CatalogCache::new(catalog_source_from_config(config)?, config.catalog_ttl());
    Ok(AppRegistry::new(Arc::new(store), catalog, capabilities)
        .with_ranking(UsageRanking::new(config.max_ranked))
        .with_diagnostics(diagnostics))
}

fn print_apps(apps: &[AppDescriptor], view: &RegistryView) {
    for app in apps {
        let marker = if view.pinned_ids.contains(&app.id) && !app.is_custom() {
            "*"
        } else {
            " "
        };
        println!("{marker} {:<44} {:<24} {}", app.id.to_string(), app.name, app.url);
    }
}

fn run_add(
    registry: &AppRegistry,
    config: &AppshelfConfig,
    ctx: &NetworkContext,
    diagnostics: DiagnosticsSender,
    url: &str,
    accept_risk: bool,
) -> Result<(), CliError> {
    let resolver: Arc<dyn ManifestResolver> =
        Arc::new(HttpManifestResolver::with_timeout(config.manifest_timeout())?);
    let mut onboarding = CustomAppOnboarding::new(resolver, ctx.clone())
        .with_debounce(config.debounce())
        .with_diagnostics(diagnostics);
    onboarding.set_input(url, Instant::now());
    onboarding.set_risk_acknowledged(accept_risk);
    onboarding.wait_for_outcome(config.debounce() + config.manifest_timeout() + ADD_WAIT_MARGIN);

    let view = registry.view(ctx)?;
    if let Some(field_error) = onboarding.field_error(&view)
        && !matches!(onboarding.gate(&view), SubmissionGate::AlreadyRegistered { .. })
    {
        return Err(CliError::Rejected(format!("{url}: {field_error}")));
    }

    match onboarding.gate(&view) {
        SubmissionGate::Ready => {
            let added = onboarding.submit(registry)?;
            println!("Added {} ({}) as {}", added.name, added.url, added.id);
            Ok(())
        },
        SubmissionGate::AlreadyRegistered { app_id } => {
            println!("This app is already registered as {app_id}");
            if let Some(share_url) = onboarding.share_url(&config.share_base_url) {
                println!("Share it with: {share_url}");
            }
            Ok(())
        },
        SubmissionGate::AwaitingRiskAcknowledgement => Err(CliError::Rejected(
            "This app is not part of the catalog. Re-run with --accept-risk to use it at your own risk."
                .to_string(),
        )),
        SubmissionGate::Duplicate { existing_id } => Err(CliError::Rejected(format!(
            "{url} is already in the list as {existing_id}"
        ))),
        SubmissionGate::Incomplete => {
            let reason = match onboarding.state() {
                CandidateState::Debouncing { .. } | CandidateState::Resolving { .. } => {
                    "manifest resolution timed out".to_string()
                },
                state => format!("{state:?}"),
            };
            Err(CliError::Rejected(format!("{url}: {reason}")))
        },
    }
}

fn run_command(
    args: &CliArgs,
    config: &AppshelfConfig,
    registry: &AppRegistry,
    diagnostics: DiagnosticsSender,
) -> Result<(), CliError> {
    let ctx = NetworkContext::new(args.chain.clone(), args.chain_name.clone());
    let catalog = registry.catalog().load_blocking(&ctx);
    if let Some(e) = &catalog.error {
        warn!("Remote catalog unavailable for {ctx}: {e}");
    }

    match &args.command {
        Command::List {
            pinned,
            ranked,
            custom,
        } => {
            let view = registry.view(&ctx)?;
            let apps = if *pinned {
                &view.pinned
            } else if *ranked {
                &view.ranked
            } else if *custom {
                &view.custom
            } else {
                &view.all
            };
            print_apps(apps, &view);
        },
        Command::Add { accept_risk, url } => {
            run_add(registry, config, &ctx, diagnostics, url, *accept_risk)?;
        },
        Command::Remove { id } => {
            let report = registry.remove_custom_app(&ctx, id)?;
            println!("Removed {id}");
            for (scope, e) in &report.failures {
                eprintln!("warning: {scope} permissions of {} not revoked: {e}", report.origin);
            }
        },
        Command::Pin { id } => {
            let pinned = registry.toggle_pin(&ctx, *id)?;
            println!("{} {id}", if pinned { "Pinned" } else { "Unpinned" });
            if !catalog.apps.iter().any(|app| app.id == *id) {
                eprintln!("note: {id} is not in the catalog of {ctx}; pins only show for catalog apps");
            }
        },
        Command::Open { id } => {
            let view = registry.view(&ctx)?;
            let Some(app) = view.find(id) else {
                return Err(CliError::Rejected(format!("no app with id {id} on {ctx}")));
            };
            let count = registry.record_app_open(&ctx, *id)?;
            println!("{} {} (opened {count} times)", app.name, app.url);
        },
        Command::Grant {
            browser,
            origin,
            capability,
        } => {
            let view = registry.view(&ctx)?;
            let Some(app) = view.find_by_url(origin) else {
                return Err(CliError::Rejected(format!("{origin} is not a known app on {ctx}")));
            };
            let scope = if *browser {
                CapabilityScope::Browser
            } else {
                CapabilityScope::Wallet
            };
            registry
                .capabilities()
                .store(scope)
                .grant(&app.url, Capability::new(capability.as_str()))?;
            println!("Granted {scope} capability {capability} to {}", app.url);
        },
        Command::Permissions { origin } => {
            let (wallet, browser) = registry.capabilities().query_all(origin)?;
            for (scope, capabilities) in [
                (CapabilityScope::Wallet, wallet),
                (CapabilityScope::Browser, browser),
            ] {
                let listed = capabilities
                    .iter()
                    .map(Capability::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("{scope}: {listed}");
            }
        },
    }
    Ok(())
}

pub fn main() -> ExitCode {
    let args = cli_args().run();
    let config = AppshelfConfig::load(args.config.as_deref());
    init_logging(&config.log_filter);

    let mut diagnostics = DiagnosticsState::new();
    let result = open_registry(&config, diagnostics.sender())
        .and_then(|registry| run_command(&args, &config, &registry, diagnostics.sender()));

    if args.diagnostics {
        diagnostics.drain();
        for stats in diagnostics.channel_stats() {
            eprintln!(
                "{}: {} events, {} bytes sent, {} us total latency",
                stats.channel_id, stats.count, stats.bytes_sent, stats.latency_us
            );
        }
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("appshelf: {e}");
            ExitCode::FAILURE
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_options_and_command() {
        let args = cli_args()
            .run_inner(&["--chain", "100", "--chain-name", "gno", "add", "--accept-risk", "https://b.io"])
            .unwrap();
        assert_eq!(args.chain, "100");
        assert_eq!(args.chain_name, "gno");
        assert!(matches!(
            args.command,
            Command::Add { accept_risk: true, ref url } if url == "https://b.io"
        ));
    }

    #[test]
    fn app_ids_parse_in_positional_arguments() {
        let args = cli_args().run_inner(&["pin", "catalog:7"]).unwrap();
        assert!(matches!(args.command, Command::Pin { id: AppId::Catalog(7) }));
        assert_eq!(args.chain, "1");
        assert!(cli_args().run_inner(&["remove", "bogus:1"]).is_err());
    }

    #[test]
    fn catalog_source_follows_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, r#"[{"id": 1, "name": "Zeta", "url": "https://zeta.io"}]"#).unwrap();
        let config = AppshelfConfig {
            catalog: Some(path.display().to_string()),
            ..AppshelfConfig::default()
        };
        let source = catalog_source_from_config(&config).unwrap();
        assert_eq!(source.fetch(&NetworkContext::new("1", "eth")).unwrap().len(), 1);

        let source = catalog_source_from_config(&AppshelfConfig::default()).unwrap();
        assert!(source.fetch(&NetworkContext::new("1", "eth")).unwrap().is_empty());
    }

    #[test]
    fn registry_reports_catalog_fetches_to_diagnostics() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AppshelfConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..AppshelfConfig::default()
        };
        let mut diagnostics = DiagnosticsState::new();
        let registry = open_registry(&config, diagnostics.sender()).unwrap();
        registry
            .catalog()
            .load_blocking(&NetworkContext::new("1", "eth"));

        diagnostics.drain();
        let channels = diagnostics
            .channel_stats()
            .into_iter()
            .map(|stats| (stats.channel_id, stats.count))
            .collect::<Vec<_>>();
        assert_eq!(
            channels,
            vec![
                (crate::diagnostics::CHANNEL_CATALOG_FETCH_STARTED, 1),
                (crate::diagnostics::CHANNEL_CATALOG_FETCH_SUCCEEDED, 1),
            ]
        );
        assert_eq!(
            diagnostics.channel_bytes_sent(crate::diagnostics::CHANNEL_CATALOG_FETCH_STARTED),
            "chain:1".len() as u64
        );
    }

    #[test]
    fn open_registry_uses_data_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AppshelfConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..AppshelfConfig::default()
        };
        let registry = open_registry(&config, DiagnosticsSender::disabled()).unwrap();
        let ctx = NetworkContext::new("1", "eth");
        registry
            .add_custom_app(&ctx, AppDescriptor::custom("https://b.io", "Alpha", "", "", Vec::new()))
            .unwrap();
        drop(registry);

        let reopened = open_registry(&config, DiagnosticsSender::disabled()).unwrap();
        assert_eq!(reopened.custom_apps(&ctx).unwrap().len(), 1);
        assert!(dir.path().join(crate::persistence::DATABASE_FILE_NAME).exists());
    }
}

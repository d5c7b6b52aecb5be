/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Custom app onboarding: from a typed URL to a registered app.
//!
//! The caller feeds raw input with [`CustomAppOnboarding::set_input`] and
//! drives time with [`CustomAppOnboarding::tick`]. Input is normalized and
//! syntax-checked immediately. A valid URL waits out the debounce window and
//! is then resolved on a worker thread. Every resolution result carries the
//! URL and chain it was issued for, and only a result matching the URL
//! currently being resolved is applied; anything else is dropped.

pub mod manifest;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use appshelf_core::{
    AppDescriptor, AppId, InvalidUrlError, NetworkContext, normalize_app_url, parse_app_url,
};
use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};

use crate::diagnostics::{
    CHANNEL_MANIFEST_RESOLVE_FAILED, CHANNEL_MANIFEST_RESOLVE_STALE,
    CHANNEL_MANIFEST_RESOLVE_STARTED, CHANNEL_MANIFEST_RESOLVE_SUCCEEDED, DiagnosticsSender,
};
use crate::persistence::StorageError;
use crate::registries::{AppRegistry, RegistryError, RegistryView};

pub use manifest::{HttpManifestResolver, ManifestError, ManifestResolver};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
const RESOLUTION_POLL_INTERVAL: Duration = Duration::from_millis(25);
const SHARE_ROUTE: &str = "/share/safe-app";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateState {
    Empty,
    Invalid {
        url: String,
        error: InvalidUrlError,
    },
    Debouncing {
        url: String,
        deadline: Instant,
    },
    Resolving {
        url: String,
    },
    Resolved {
        url: String,
        app: AppDescriptor,
    },
    Unsupported {
        url: String,
        error: ManifestError,
    },
}

impl CandidateState {
    /// Normalized URL the state refers to.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Empty => None,
            Self::Invalid { url, .. }
            | Self::Debouncing { url, .. }
            | Self::Resolving { url }
            | Self::Resolved { url, .. }
            | Self::Unsupported { url, .. } => Some(url),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Debouncing { .. } | Self::Resolving { .. })
    }
}

/// Error shown against the URL field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    InvalidUrl(InvalidUrlError),
    AlreadyInList { existing_id: AppId, existing_name: String },
    Unsupported(ManifestError),
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUrl(_) => write!(f, "Invalid URL"),
            Self::AlreadyInList { .. } => write!(f, "This app is already in the list"),
            Self::Unsupported(_) => write!(f, "The app doesn't support mini-app functionality"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionGate {
    /// Nothing resolved yet, or resolution failed.
    Incomplete,
    /// The URL belongs to a catalog app; no disclaimer, nothing to add.
    AlreadyRegistered { app_id: AppId },
    /// The URL belongs to an app the user already added.
    Duplicate { existing_id: AppId },
    AwaitingRiskAcknowledgement,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnboardingError {
    Registry(RegistryError),
    Storage(StorageError),
    NotReady(SubmissionGate),
}

impl std::fmt::Display for OnboardingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registry(e) => write!(f, "{e}"),
            Self::Storage(e) => write!(f, "{e}"),
            Self::NotReady(gate) => write!(f, "custom app cannot be submitted yet: {gate:?}"),
        }
    }
}

impl std::error::Error for OnboardingError {}

impl From<RegistryError> for OnboardingError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl From<StorageError> for OnboardingError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

struct ResolutionOutcome {
    url: String,
    chain_id: String,
    issued_at: Instant,
    result: Result<AppDescriptor, ManifestError>,
}

pub struct CustomAppOnboarding {
    resolver: Arc<dyn ManifestResolver>,
    ctx: NetworkContext,
    debounce: Duration,
    input: String,
    state: CandidateState,
    risk_acknowledged: bool,
    outcome_tx: Sender<ResolutionOutcome>,
    outcome_rx: Receiver<ResolutionOutcome>,
    diagnostics: DiagnosticsSender,
}

impl CustomAppOnboarding {
    pub fn new(resolver: Arc<dyn ManifestResolver>, ctx: NetworkContext) -> Self {
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded();
        Self {
            resolver,
            ctx,
            debounce: DEFAULT_DEBOUNCE,
            input: String::new(),
            state: CandidateState::Empty,
            risk_acknowledged: false,
            outcome_tx,
            outcome_rx,
            diagnostics: DiagnosticsSender::disabled(),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticsSender) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn state(&self) -> &CandidateState {
        &self.state
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn context(&self) -> &NetworkContext {
        &self.ctx
    }

    pub fn risk_acknowledged(&self) -> bool {
        self.risk_acknowledged
    }

    pub fn resolved_app(&self) -> Option<&AppDescriptor> {
        match &self.state {
            CandidateState::Resolved { app, .. } => Some(app),
            _ => None,
        }
    }

    /// Record new raw input. Input whose normalized form equals the current
    /// candidate leaves the state (and any running debounce) alone.
    pub fn set_input(&mut self, raw: &str, now: Instant) {
        self.input = raw.to_string();
        let url = normalize_app_url(raw);
        if self.state.url().unwrap_or_default() == url {
            return;
        }
        self.state = if url.is_empty() {
            CandidateState::Empty
        } else {
            match parse_app_url(&url) {
                Ok(_) => CandidateState::Debouncing {
                    url,
                    deadline: now + self.debounce,
                },
                Err(error) => CandidateState::Invalid { url, error },
            }
        };
    }

    /// Switch network; a valid candidate is debounced and resolved again for
    /// the new chain.
    pub fn set_context(&mut self, ctx: NetworkContext, now: Instant) {
        if ctx == self.ctx {
            return;
        }
        self.ctx = ctx;
        let url = match &self.state {
            CandidateState::Empty | CandidateState::Invalid { .. } => return,
            state => state.url().unwrap_or_default().to_string(),
        };
        self.state = CandidateState::Debouncing {
            url,
            deadline: now + self.debounce,
        };
    }

    pub fn set_risk_acknowledged(&mut self, acknowledged: bool) {
        self.risk_acknowledged = acknowledged;
    }

    /// Apply finished resolutions and start one whose debounce has elapsed.
    pub fn tick(&mut self, now: Instant) {
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            self.apply_outcome(outcome);
        }

        if let CandidateState::Debouncing { url, deadline } = &self.state
            && now >= *deadline
        {
            let url = url.clone();
            self.spawn_resolution(&url);
            self.state = CandidateState::Resolving { url };
        }
    }

    /// Block until the candidate settles or `timeout` elapses.
    pub fn wait_for_outcome(&mut self, timeout: Duration) -> &CandidateState {
        let give_up = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            self.tick(now);
            if !self.state.is_pending() || now >= give_up {
                break;
            }
            let remaining = give_up.saturating_duration_since(now);
            let debounce_left = match &self.state {
                CandidateState::Debouncing { deadline, .. } => {
                    Some(deadline.saturating_duration_since(now))
                },
                _ => None,
            };
            match debounce_left {
                Some(left) => thread::sleep(left.min(remaining)),
                None => {
                    if let Ok(outcome) = self
                        .outcome_rx
                        .recv_timeout(RESOLUTION_POLL_INTERVAL.min(remaining))
                    {
                        self.apply_outcome(outcome);
                    }
                },
            }
        }
        &self.state
    }

    fn spawn_resolution(&self, url: &str) {
        debug!("Resolving manifest for {url} on {}", self.ctx);
        self.diagnostics
            .sent(CHANNEL_MANIFEST_RESOLVE_STARTED, url.len());
        let resolver = Arc::clone(&self.resolver);
        let ctx = self.ctx.clone();
        let tx = self.outcome_tx.clone();
        let url = url.to_string();
        thread::spawn(move || {
            let issued_at = Instant::now();
            let result = resolver.resolve(&url, &ctx);
            let _ = tx.send(ResolutionOutcome {
                url,
                chain_id: ctx.chain_id().to_string(),
                issued_at,
                result,
            });
        });
    }

    fn apply_outcome(&mut self, outcome: ResolutionOutcome) {
        let current = matches!(
            &self.state,
            CandidateState::Resolving { url } if *url == outcome.url
        ) && outcome.chain_id == self.ctx.chain_id();
        if !current {
            debug!("Discarding stale manifest resolution for {}", outcome.url);
            self.diagnostics
                .sent(CHANNEL_MANIFEST_RESOLVE_STALE, outcome.url.len());
            return;
        }

        let latency_us = outcome.issued_at.elapsed().as_micros() as u64;
        self.state = match outcome.result {
            Ok(app) => {
                self.diagnostics
                    .received(CHANNEL_MANIFEST_RESOLVE_SUCCEEDED, latency_us);
                CandidateState::Resolved {
                    url: outcome.url,
                    app,
                }
            },
            Err(error) => {
                warn!("Manifest resolution for {} failed: {error}", outcome.url);
                self.diagnostics
                    .received(CHANNEL_MANIFEST_RESOLVE_FAILED, latency_us);
                CandidateState::Unsupported {
                    url: outcome.url,
                    error,
                }
            },
        };
    }

    pub fn field_error(&self, view: &RegistryView) -> Option<FieldError> {
        if let CandidateState::Invalid { error, .. } = &self.state {
            return Some(FieldError::InvalidUrl(error.clone()));
        }
        if let Some(existing) = self.state.url().and_then(|url| view.find_by_url(url)) {
            return Some(FieldError::AlreadyInList {
                existing_id: existing.id,
                existing_name: existing.name.clone(),
            });
        }
        match &self.state {
            CandidateState::Unsupported { error, .. } => Some(FieldError::Unsupported(error.clone())),
            _ => None,
        }
    }

    pub fn gate(&self, view: &RegistryView) -> SubmissionGate {
        let CandidateState::Resolved { url, .. } = &self.state else {
            return SubmissionGate::Incomplete;
        };
        if let Some(remote) = view.remote_by_url(url) {
            return SubmissionGate::AlreadyRegistered { app_id: remote.id };
        }
        if let Some(existing) = view.find_by_url(url) {
            return SubmissionGate::Duplicate {
                existing_id: existing.id,
            };
        }
        if !self.risk_acknowledged {
            return SubmissionGate::AwaitingRiskAcknowledgement;
        }
        SubmissionGate::Ready
    }

    /// Add the resolved app to `registry`, then reset to `Empty`.
    pub fn submit(&mut self, registry: &AppRegistry) -> Result<AppDescriptor, OnboardingError> {
        let view = registry.view(&self.ctx)?;
        let gate = self.gate(&view);
        let Some(app) = self.resolved_app().filter(|_| gate == SubmissionGate::Ready) else {
            return Err(OnboardingError::NotReady(gate));
        };
        let added = registry.add_custom_app(&self.ctx, app.clone())?;
        info!("Onboarded custom app '{}' ({})", added.name, added.url);
        self.reset();
        Ok(added)
    }

    pub fn reset(&mut self) {
        self.input.clear();
        self.state = CandidateState::Empty;
        self.risk_acknowledged = false;
    }

    /// Share link for the resolved app under `base` (the host's origin).
    pub fn share_url(&self, base: &str) -> Option<String> {
        let app = self.resolved_app()?;
        let encoded = url::form_urlencoded::byte_serialize(app.url.as_bytes()).collect::<String>();
        Some(format!(
            "{}{SHARE_ROUTE}?appUrl={encoded}&chain={}",
            base.trim_end_matches('/'),
            self.ctx.short_name()
        ))
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Diagnostics channels.
//!
//! Components emit lightweight events on named channels through a
//! [`DiagnosticsSender`] handed to them at construction time. A
//! [`DiagnosticsState`] owns the receiving end and folds drained events into
//! per-channel counters for inspection (CLI `--diagnostics`, tests).

use std::collections::HashMap;

use crossbeam_channel::{Receiver, Sender};

pub const CHANNEL_CUSTOM_APP_ADDED: &str = "registry.custom_app.added";
pub const CHANNEL_CUSTOM_APP_REMOVED: &str = "registry.custom_app.removed";
pub const CHANNEL_CUSTOM_APP_DUPLICATE_REJECTED: &str = "registry.custom_app.duplicate_rejected";
pub const CHANNEL_PIN_TOGGLED: &str = "registry.pin.toggled";
pub const CHANNEL_STORAGE_WRITE_FAILED: &str = "registry.storage.write_failed";
pub const CHANNEL_CAPABILITY_REVOKED: &str = "registry.capability.revoked";
pub const CHANNEL_CAPABILITY_REVOKE_FAILED: &str = "registry.capability.revoke_failed";
pub const CHANNEL_CATALOG_FETCH_STARTED: &str = "registry.catalog.fetch_started";
pub const CHANNEL_CATALOG_FETCH_SUCCEEDED: &str = "registry.catalog.fetch_succeeded";
pub const CHANNEL_CATALOG_FETCH_FAILED: &str = "registry.catalog.fetch_failed";
pub const CHANNEL_MANIFEST_RESOLVE_STARTED: &str = "onboarding.manifest.resolve_started";
pub const CHANNEL_MANIFEST_RESOLVE_SUCCEEDED: &str = "onboarding.manifest.resolve_succeeded";
pub const CHANNEL_MANIFEST_RESOLVE_FAILED: &str = "onboarding.manifest.resolve_failed";
pub const CHANNEL_MANIFEST_RESOLVE_STALE: &str = "onboarding.manifest.resolve_stale";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    MessageSent {
        channel_id: &'static str,
        byte_len: usize,
    },
    MessageReceived {
        channel_id: &'static str,
        latency_us: u64,
    },
}

impl DiagnosticEvent {
    fn channel_id(&self) -> &'static str {
        match self {
            Self::MessageSent { channel_id, .. } | Self::MessageReceived { channel_id, .. } => {
                channel_id
            },
        }
    }
}

/// Cloneable emitting end. A disabled sender drops every event.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsSender {
    tx: Option<Sender<DiagnosticEvent>>,
}

impl DiagnosticsSender {
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: DiagnosticEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn sent(&self, channel_id: &'static str, byte_len: usize) {
        self.emit(DiagnosticEvent::MessageSent {
            channel_id,
            byte_len,
        });
    }

    pub fn received(&self, channel_id: &'static str, latency_us: u64) {
        self.emit(DiagnosticEvent::MessageReceived {
            channel_id,
            latency_us,
        });
    }
}

/// Aggregated totals for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    pub channel_id: &'static str,
    pub count: u64,
    pub bytes_sent: u64,
    /// Sum over received events.
    pub latency_us: u64,
}

#[derive(Debug)]
pub struct DiagnosticsState {
    event_tx: Sender<DiagnosticEvent>,
    event_rx: Receiver<DiagnosticEvent>,
    message_counts: HashMap<&'static str, u64>,
    message_bytes_sent: HashMap<&'static str, u64>,
    message_latency_us: HashMap<&'static str, u64>,
}

impl DiagnosticsState {
    pub fn new() -> Self {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        Self {
            event_tx,
            event_rx,
            message_counts: HashMap::new(),
            message_bytes_sent: HashMap::new(),
            message_latency_us: HashMap::new(),
        }
    }

    pub fn sender(&self) -> DiagnosticsSender {
        DiagnosticsSender {
            tx: Some(self.event_tx.clone()),
        }
    }

    /// Fold every pending event into the counters. Returns how many were drained.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            drained += 1;
            *self.message_counts.entry(event.channel_id()).or_default() += 1;
            match event {
                DiagnosticEvent::MessageSent {
                    channel_id,
                    byte_len,
                } => {
                    *self.message_bytes_sent.entry(channel_id).or_default() += byte_len as u64;
                },
                DiagnosticEvent::MessageReceived {
                    channel_id,
                    latency_us,
                } => {
                    *self.message_latency_us.entry(channel_id).or_default() += latency_us;
                },
            }
        }
        drained
    }

    pub fn channel_count(&self, channel_id: &str) -> u64 {
        self.message_counts.get(channel_id).copied().unwrap_or(0)
    }

    pub fn channel_bytes_sent(&self, channel_id: &str) -> u64 {
        self.message_bytes_sent.get(channel_id).copied().unwrap_or(0)
    }

    pub fn channel_latency_us(&self, channel_id: &str) -> u64 {
        self.message_latency_us.get(channel_id).copied().unwrap_or(0)
    }

    /// Channels with at least one event, sorted by id.
    pub fn channel_stats(&self) -> Vec<ChannelStats> {
        let mut stats = self
            .message_counts
            .iter()
            .map(|(channel_id, count)| ChannelStats {
                channel_id: *channel_id,
                count: *count,
                bytes_sent: self.channel_bytes_sent(channel_id),
                latency_us: self.channel_latency_us(channel_id),
            })
            .collect::<Vec<_>>();
        stats.sort_by_key(|stats| stats.channel_id);
        stats
    }
}

impl Default for DiagnosticsState {
    fn default() -> Self {
        Self::new()
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! appshelf: third-party mini-app registry with capability revocation.
//!
//! - [`registries`]: the remote catalog and user-added apps aggregated per
//!   network context, pins, ranking, and every registry mutation.
//! - [`onboarding`]: debounced validation of a typed URL into a resolved,
//!   addable app.
//! - [`permissions`]: wallet and browser capability stores, revoked together
//!   when an app is removed.
//! - [`persistence`]: the redb database behind all of the above.

pub mod cli;
pub mod diagnostics;
pub mod onboarding;
pub mod permissions;
pub mod persistence;
pub mod prefs;
pub mod registries;
pub mod services;

pub use appshelf_core;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

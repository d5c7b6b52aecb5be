/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Portable kernel types for the appshelf mini-app registry.
//!
//! Everything here is free of I/O: app identity and descriptors, URL
//! canonicalization used for duplicate detection, the explicit network
//! context that scopes registry state, and the name collation used to order
//! aggregated app lists.

pub mod app_url;
pub mod collation;
pub mod context;
pub mod descriptor;

pub use app_url::{
    InvalidUrlError, is_same_url, is_valid_app_url, normalize_app_url, parse_app_url,
};
pub use collation::locale_compare;
pub use context::NetworkContext;
pub use descriptor::{AppDescriptor, AppId, AppIdParseError};

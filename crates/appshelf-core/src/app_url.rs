/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! App URL canonicalization.
//!
//! App URLs are compared in their canonical form: surrounding whitespace and
//! trailing slashes removed, compared ASCII-case-insensitively. Only absolute
//! `http`/`https` URLs with a host are accepted as app locations.

use url::Url;

const ALLOWED_SCHEMES: [&str; 2] = ["https", "http"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidUrlError {
    Empty,
    Malformed(String),
    UnsupportedScheme(String),
    MissingHost,
}

impl std::fmt::Display for InvalidUrlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "app URL is empty"),
            Self::Malformed(e) => write!(f, "invalid URL: {e}"),
            Self::UnsupportedScheme(scheme) => {
                write!(f, "unsupported URL scheme '{scheme}' (expected http or https)")
            },
            Self::MissingHost => write!(f, "app URL has no host"),
        }
    }
}

impl std::error::Error for InvalidUrlError {}

fn trim_trailing_slash(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// Canonical textual form of an app URL as typed or stored.
pub fn normalize_app_url(raw: &str) -> String {
    trim_trailing_slash(raw.trim()).to_string()
}

/// Parse a (normalized or raw) app URL, rejecting anything that cannot host
/// a mini-app.
pub fn parse_app_url(raw: &str) -> Result<Url, InvalidUrlError> {
    let normalized = normalize_app_url(raw);
    if normalized.is_empty() {
        return Err(InvalidUrlError::Empty);
    }
    let parsed = Url::parse(&normalized).map_err(|e| InvalidUrlError::Malformed(format!("{e}")))?;
    if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
        return Err(InvalidUrlError::UnsupportedScheme(parsed.scheme().to_string()));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(InvalidUrlError::MissingHost);
    }
    Ok(parsed)
}

pub fn is_valid_app_url(raw: &str) -> bool {
    parse_app_url(raw).is_ok()
}

/// Trailing-slash and ASCII-case-insensitive URL equality.
pub fn is_same_url(a: &str, b: &str) -> bool {
    normalize_app_url(a).eq_ignore_ascii_case(&normalize_app_url(b))
}

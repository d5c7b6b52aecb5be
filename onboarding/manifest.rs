/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Turning a candidate app URL into a descriptor via its hosted manifest.

use std::sync::Arc;
use std::time::Duration;

use appshelf_core::{AppDescriptor, NetworkContext, normalize_app_url, parse_app_url};
use serde::Deserialize;
use url::Url;

use crate::services::http::{HttpFetcher, OutboundFetchError, TextFetcher};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";
pub const DEFAULT_MANIFEST_TIMEOUT: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    InvalidUrl(String),
    Fetch(String),
    Malformed(String),
    MissingField(&'static str),
}

impl std::fmt::Display for ManifestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUrl(e) => write!(f, "invalid app URL: {e}"),
            Self::Fetch(e) => write!(f, "failed to fetch manifest: {e}"),
            Self::Malformed(e) => write!(f, "malformed manifest: {e}"),
            Self::MissingField(field) => write!(f, "manifest is missing '{field}'"),
        }
    }
}

impl std::error::Error for ManifestError {}

pub trait ManifestResolver: Send + Sync {
    fn resolve(&self, url: &str, ctx: &NetworkContext) -> Result<AppDescriptor, ManifestError>;
}

impl<F> ManifestResolver for F
where
    F: Fn(&str, &NetworkContext) -> Result<AppDescriptor, ManifestError> + Send + Sync,
{
    fn resolve(&self, url: &str, ctx: &NetworkContext) -> Result<AppDescriptor, ManifestError> {
        self(url, ctx)
    }
}

#[derive(Debug, Deserialize)]
struct ManifestIconJson {
    src: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppManifestJson {
    name: Option<String>,
    description: Option<String>,
    icon_path: Option<String>,
    #[serde(default)]
    icons: Vec<ManifestIconJson>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn icon_url_for(app_url: &str, icon_path: &str) -> String {
    if Url::parse(icon_path).is_ok() {
        return icon_path.to_string();
    }
    format!("{app_url}/{}", icon_path.trim_start_matches('/'))
}

/// Build a custom-app descriptor from manifest JSON served at `app_url`.
///
/// Only `name`, `description` and an icon (`iconPath`, or the first entry of
/// `icons`) are required. The resulting app declares support for `ctx` only.
pub fn descriptor_from_manifest(
    app_url: &str,
    manifest_json: &str,
    ctx: &NetworkContext,
) -> Result<AppDescriptor, ManifestError> {
    let manifest: AppManifestJson = serde_json::from_str(manifest_json)
        .map_err(|e| ManifestError::Malformed(format!("{e}")))?;
    let name = non_empty(manifest.name).ok_or(ManifestError::MissingField("name"))?;
    let description =
        non_empty(manifest.description).ok_or(ManifestError::MissingField("description"))?;
    let icon_path = non_empty(manifest.icon_path)
        .or_else(|| non_empty(manifest.icons.into_iter().next().map(|icon| icon.src)))
        .ok_or(ManifestError::MissingField("iconPath"))?;

    let app_url = normalize_app_url(app_url);
    let icon_url = icon_url_for(&app_url, &icon_path);
    Ok(AppDescriptor::custom(
        &app_url,
        name,
        description,
        icon_url,
        vec![ctx.chain_id().to_string()],
    ))
}

/// Fetches `<url>/manifest.json` over HTTP(S).
#[derive(Clone)]
pub struct HttpManifestResolver {
    fetcher: Arc<dyn TextFetcher>,
}

impl HttpManifestResolver {
    pub fn new(fetcher: Arc<dyn TextFetcher>) -> Self {
        Self { fetcher }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, OutboundFetchError> {
        Ok(Self::new(Arc::new(HttpFetcher::new(timeout)?)))
    }
}

impl ManifestResolver for HttpManifestResolver {
    fn resolve(&self, url: &str, ctx: &NetworkContext) -> Result<AppDescriptor, ManifestError> {
        parse_app_url(url).map_err(|e| ManifestError::InvalidUrl(format!("{e}")))?;
        let app_url = normalize_app_url(url);
        let manifest_url = Url::parse(&format!("{app_url}/{MANIFEST_FILE_NAME}"))
            .map_err(|e| ManifestError::InvalidUrl(format!("{e}")))?;
        let manifest_json = self
            .fetcher
            .fetch_text(&manifest_url)
            .map_err(|e| ManifestError::Fetch(format!("{e}")))?;
        descriptor_from_manifest(&app_url, &manifest_json, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const MANIFEST: &str = r#"{"name": "Alpha", "description": "A test app", "iconPath": "logo.svg"}"#;

    fn ctx() -> NetworkContext {
        NetworkContext::new("100", "gno")
    }

    #[test]
    fn manifest_maps_to_custom_descriptor() {
        let app = descriptor_from_manifest("https://b.io/", MANIFEST, &ctx()).unwrap();
        assert_eq!(app.name, "Alpha");
        assert_eq!(app.url, "https://b.io");
        assert_eq!(app.icon_url, "https://b.io/logo.svg");
        assert_eq!(app.chain_ids, vec!["100".to_string()]);
        assert!(app.is_custom());
    }

    #[test]
    fn icons_array_and_absolute_icon_urls_are_accepted() {
        let json = r#"{"name": "A", "description": "d", "icons": [{"src": "https://cdn.io/a.png"}]}"#;
        let app = descriptor_from_manifest("https://b.io", json, &ctx()).unwrap();
        assert_eq!(app.icon_url, "https://cdn.io/a.png");
    }

    #[rstest]
    #[case(r#"{"description": "d", "iconPath": "i.svg"}"#, ManifestError::MissingField("name"))]
    #[case(r#"{"name": "A", "iconPath": "i.svg"}"#, ManifestError::MissingField("description"))]
    #[case(r#"{"name": "A", "description": "d"}"#, ManifestError::MissingField("iconPath"))]
    #[case(r#"{"name": " ", "description": "d", "iconPath": "i.svg"}"#, ManifestError::MissingField("name"))]
    fn manifest_without_required_field_is_rejected(
        #[case] json: &str,
        #[case] expected: ManifestError,
    ) {
        assert_eq!(
            descriptor_from_manifest("https://b.io", json, &ctx()),
            Err(expected)
        );
    }

    #[test]
    fn http_resolver_requests_manifest_next_to_app() {
        let fetcher = |url: &Url| -> Result<String, OutboundFetchError> {
            assert_eq!(url.as_str(), "https://b.io/app/manifest.json");
            Ok(MANIFEST.to_string())
        };
        let resolver = HttpManifestResolver::new(Arc::new(fetcher));
        let app = resolver.resolve("https://b.io/app/", &ctx()).unwrap();
        assert_eq!(app.url, "https://b.io/app");
    }

    #[test]
    fn http_resolver_maps_fetch_failures() {
        let fetcher = |_: &Url| -> Result<String, OutboundFetchError> {
            Err(OutboundFetchError::HttpStatus(404))
        };
        let resolver = HttpManifestResolver::new(Arc::new(fetcher));
        assert!(matches!(
            resolver.resolve("https://b.io", &ctx()),
            Err(ManifestError::Fetch(_))
        ));
        assert!(matches!(
            resolver.resolve("mailto:x@b.io", &ctx()),
            Err(ManifestError::InvalidUrl(_))
        ));
    }
}

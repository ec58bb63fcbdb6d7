//! Runtime configuration
//!
//! Two layers live here:
//!
//! - [`Configuration`]: base URL and endpoint paths, read once per page from
//!   the embedded `<script id="api-config">` element.
//! - [`Settings`]: process-level knobs (origin, timeouts, page links).
//!
//! ## Settings priority (highest to lowest)
//!
//! 1. Environment variables (`TRADEMARK_PAGES_ORIGIN`, `TRADEMARK_PAGES_BASE_URL`)
//! 2. Settings file (YAML)
//! 3. Defaults

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::dom::Document;
use crate::error::{PageError, Result};

/// Element holding the embedded configuration JSON
pub const CONFIG_ELEMENT_ID: &str = "api-config";

pub const DEFAULT_BASE_URL: &str = "/api";

/// Escaped inside a `{name}` path value, `+` included
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'+')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

static PATH_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid path param regex"));

// ============================================================================
// ENDPOINTS
// ============================================================================

/// Logical endpoint names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Endpoint {
    Home,
    Search,
    AdvancedSearch,
    ImageSearch,
    Export,
    Bookmark,
    Track,
    Contact,
    Trademark,
    Language,
    Banner,
    Articles,
    Faq,
}

impl Endpoint {
    pub const ALL: &'static [Endpoint] = &[
        Endpoint::Home,
        Endpoint::Search,
        Endpoint::AdvancedSearch,
        Endpoint::ImageSearch,
        Endpoint::Export,
        Endpoint::Bookmark,
        Endpoint::Track,
        Endpoint::Contact,
        Endpoint::Trademark,
        Endpoint::Language,
        Endpoint::Banner,
        Endpoint::Articles,
        Endpoint::Faq,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Endpoint::Home => "home",
            Endpoint::Search => "search",
            Endpoint::AdvancedSearch => "advanced-search",
            Endpoint::ImageSearch => "image-search",
            Endpoint::Export => "export",
            Endpoint::Bookmark => "bookmark",
            Endpoint::Track => "track",
            Endpoint::Contact => "contact",
            Endpoint::Trademark => "trademark",
            Endpoint::Language => "language",
            Endpoint::Banner => "banner",
            Endpoint::Articles => "articles",
            Endpoint::Faq => "faq",
        }
    }

    pub fn default_path(self) -> &'static str {
        match self {
            Endpoint::Home => "/home",
            Endpoint::Search => "/search",
            Endpoint::AdvancedSearch => "/search/advanced",
            Endpoint::ImageSearch => "/search/image",
            Endpoint::Export => "/search/export",
            Endpoint::Bookmark => "/bookmarks",
            Endpoint::Track => "/tracking",
            Endpoint::Contact => "/contact",
            Endpoint::Trademark => "/trademark/{id}",
            Endpoint::Language => "/language",
            Endpoint::Banner => "/banner",
            Endpoint::Articles => "/articles",
            Endpoint::Faq => "/faq",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Endpoint {
    type Err = PageError;

    fn from_str(s: &str) -> Result<Self> {
        Endpoint::ALL
            .iter()
            .copied()
            .find(|e| e.name() == s)
            .ok_or_else(|| PageError::UnknownEndpoint { name: s.to_string() })
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Base URL plus endpoint paths. Immutable for the page's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub base_url: String,
    pub endpoints: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfiguration {
    base_url: Option<String>,
    #[serde(default)]
    endpoints: BTreeMap<String, String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            endpoints: Endpoint::ALL
                .iter()
                .map(|e| (e.name().to_string(), e.default_path().to_string()))
                .collect(),
        }
    }
}

impl Configuration {
    /// Parse configuration JSON; endpoints given here override the defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawConfiguration =
            serde_json::from_str(text).map_err(|e| PageError::ConfigInvalid {
                reason: e.to_string(),
            })?;
        let mut config = Self::default();
        if let Some(base_url) = raw.base_url {
            config.base_url = base_url;
        }
        config.endpoints.extend(raw.endpoints);
        Ok(config)
    }

    /// Read `#api-config` from the page, or fall back to the defaults.
    ///
    /// A malformed element is logged and ignored.
    pub fn from_document(doc: &Document) -> Self {
        let Some(element) = doc.element_by_id(CONFIG_ELEMENT_ID) else {
            tracing::debug!("no #{} element, using default configuration", CONFIG_ELEMENT_ID);
            return Self::default();
        };
        match Self::from_json(&doc.text_content(element)) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed page configuration");
                Self::default()
            }
        }
    }

    /// Apply the settings-level base URL override, if any.
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        if let Some(base_url) = &settings.base_url {
            self.base_url = base_url.clone();
        }
        self
    }

    pub fn path(&self, endpoint: Endpoint) -> &str {
        self.endpoints
            .get(endpoint.name())
            .map(String::as_str)
            .unwrap_or_else(|| endpoint.default_path())
    }

    /// Compose the absolute URL for `endpoint`.
    ///
    /// `{name}` placeholders are filled from `params`; relative base URLs
    /// are resolved against `origin`.
    pub fn url(
        &self,
        origin: &str,
        endpoint: Endpoint,
        params: &[(String, String)],
        query: &[(String, String)],
    ) -> Result<Url> {
        let template = self.path(endpoint);
        let mut missing = None;
        let path = PATH_PARAM.replace_all(template, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match params.iter().find(|(k, _)| k == name) {
                Some((_, value)) => utf8_percent_encode(value, PATH_SEGMENT).to_string(),
                None => {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            }
        });
        if let Some(param) = missing {
            return Err(PageError::MissingPathParam {
                endpoint: endpoint.name().to_string(),
                param,
            });
        }

        let raw = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let mut url = match Url::parse(&raw) {
            Ok(url) => url,
            Err(_) => Url::parse(origin)
                .and_then(|base| base.join(&raw))
                .map_err(|e| PageError::InvalidUrl {
                    url: raw.clone(),
                    details: e.to_string(),
                })?,
        };

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

/// Links used when a handler navigates away from the current page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageLinks {
    pub search: String,
    pub detail: String,
    pub login: String,
}

impl Default for PageLinks {
    fn default() -> Self {
        Self {
            search: "honda-search.html".to_string(),
            detail: "honda.html".to_string(),
            login: "/login".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Origin that relative base URLs are resolved against
    pub origin: String,
    /// Overrides the page's configured base URL
    pub base_url: Option<String>,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// How long a notification stays visible
    pub notification_ms: u64,
    pub max_upload_bytes: u64,
    pub pages: PageLinks,
    /// Keyword searches the results page can answer from its embedded
    /// snapshot. The home page sends these there even when the API is down.
    pub snapshot_queries: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".to_string(),
            base_url: None,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            notification_ms: 3000,
            max_upload_bytes: 5 * 1024 * 1024,
            pages: PageLinks::default(),
            snapshot_queries: vec!["honda".to_string()],
        }
    }
}

impl Settings {
    /// Load from an optional YAML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => Self::from_yaml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        Ok(settings.with_env())
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Environment variables take precedence over file values.
    pub fn with_env(mut self) -> Self {
        if let Ok(origin) = std::env::var("TRADEMARK_PAGES_ORIGIN") {
            if !origin.is_empty() {
                self.origin = origin;
            }
        }
        if let Ok(base_url) = std::env::var("TRADEMARK_PAGES_BASE_URL") {
            if !base_url.is_empty() {
                self.base_url = Some(base_url);
            }
        }
        self
    }

    pub fn has_snapshot_for(&self, query: &str) -> bool {
        let query = query.trim();
        self.snapshot_queries
            .iter()
            .any(|q| q.trim().eq_ignore_ascii_case(query))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn notification_duration(&self) -> Duration {
        Duration::from_millis(self.notification_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn default_covers_every_endpoint() {
        let config = Configuration::default();
        for endpoint in Endpoint::ALL {
            assert_eq!(config.path(*endpoint), endpoint.default_path());
        }
        assert_eq!(config.base_url, "/api");
    }

    #[test]
    fn embedded_config_overrides_defaults() {
        let doc = Document::parse(
            r#"<html><head><script type="application/json" id="api-config">
            {"baseUrl": "https://api.example.vn/v2", "endpoints": {"search": "/tim-kiem"}}
            </script></head><body></body></html>"#,
        );
        let config = Configuration::from_document(&doc);
        assert_eq!(config.base_url, "https://api.example.vn/v2");
        assert_eq!(config.path(Endpoint::Search), "/tim-kiem");
        assert_eq!(config.path(Endpoint::Banner), "/banner");
    }

    #[test]
    fn malformed_config_falls_back_to_default() {
        let doc = Document::parse(
            r#"<html><head><script id="api-config">{not json</script></head><body></body></html>"#,
        );
        assert_eq!(Configuration::from_document(&doc), Configuration::default());
        assert!(Configuration::from_json("{not json").is_err());
    }

    #[test]
    fn url_joins_relative_base_onto_origin() {
        let config = Configuration::default();
        let url = config
            .url(
                "http://localhost:8080",
                Endpoint::Search,
                &[],
                &params(&[("q", "honda việt nam")]),
            )
            .unwrap();
        assert_eq!(url.path(), "/api/search");
        assert_eq!(url.query(), Some("q=honda+vi%E1%BB%87t+nam"));
    }

    #[test]
    fn url_fills_path_params() {
        let config = Configuration::default();
        let url = config
            .url(
                "http://localhost:8080",
                Endpoint::Trademark,
                &params(&[("id", "VN-4-2019-12345")]),
                &[],
            )
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/trademark/VN-4-2019-12345");
    }

    #[test]
    fn path_params_are_percent_encoded_not_form_encoded() {
        let config = Configuration::default();
        let url = config
            .url(
                "http://localhost:8080",
                Endpoint::Trademark,
                &params(&[("id", "VN 4+1/x")]),
                &[],
            )
            .unwrap();
        assert_eq!(url.path(), "/api/trademark/VN%204%2B1%2Fx");
    }

    #[test]
    fn url_missing_param_is_an_error() {
        let config = Configuration::default();
        let err = config
            .url("http://localhost:8080", Endpoint::Trademark, &[], &[])
            .unwrap_err();
        assert!(matches!(err, PageError::MissingPathParam { ref param, .. } if param == "id"));
    }

    #[test]
    fn endpoint_names_round_trip() {
        assert_eq!("image-search".parse::<Endpoint>().unwrap(), Endpoint::ImageSearch);
        assert!("nope".parse::<Endpoint>().is_err());
    }

    #[test]
    fn settings_from_yaml_keeps_defaults_for_missing_fields() {
        let settings = Settings::from_yaml(
            r#"
origin: "https://tracuu.example.vn"
notification_ms: 1500
pages:
  search: "search.html"
"#,
        )
        .unwrap();
        assert_eq!(settings.origin, "https://tracuu.example.vn");
        assert_eq!(settings.notification_ms, 1500);
        assert_eq!(settings.pages.search, "search.html");
        assert_eq!(settings.pages.login, "/login");
        assert_eq!(settings.max_upload_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn snapshot_queries_match_case_insensitively() {
        let settings = Settings::default();
        assert!(settings.has_snapshot_for("Honda"));
        assert!(settings.has_snapshot_for(" HONDA "));
        assert!(!settings.has_snapshot_for("yamaha"));

        let none = Settings::from_yaml("snapshot_queries: []\n").unwrap();
        assert!(!none.has_snapshot_for("honda"));
    }

    #[test]
    fn settings_base_url_overrides_page() {
        let settings = Settings {
            base_url: Some("http://127.0.0.1:9000/api".to_string()),
            ..Settings::default()
        };
        let config = Configuration::default().with_settings(&settings);
        assert_eq!(config.base_url, "http://127.0.0.1:9000/api");
    }
}

//! Error types with fix suggestions
//!
//! Gateway failures never surface as `PageError` to a page: they are folded
//! into [`crate::gateway::Outcome`]. What remains here is configuration,
//! document, and handler-level errors.

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::action::Action;
use crate::config::Endpoint;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

pub type Result<T, E = PageError> = std::result::Result<T, E>;

/// Fallback text shown when a handler error carries no user-facing message.
pub const GENERIC_FAILURE_MESSAGE: &str = "Đã xảy ra lỗi. Vui lòng thử lại.";

#[derive(Error, Debug)]
pub enum PageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings parse error: {0}")]
    SettingsParse(#[from] serde_yaml::Error),

    // ─────────────────────────────────────────────────────────────
    // Configuration errors (TMP-010 to TMP-014)
    // ─────────────────────────────────────────────────────────────
    #[error("TMP-010: Invalid configuration: {reason}")]
    ConfigInvalid { reason: String },

    #[error("TMP-011: Unknown endpoint '{name}'")]
    UnknownEndpoint { name: String },

    #[error("TMP-012: Endpoint '{endpoint}' needs path parameter '{param}'")]
    MissingPathParam { endpoint: String, param: String },

    #[error("TMP-013: Cannot build URL '{url}': {details}")]
    InvalidUrl { url: String, details: String },

    #[error("TMP-014: Failed to build HTTP client: {details}")]
    HttpClient { details: String },

    // ─────────────────────────────────────────────────────────────
    // Document errors (TMP-020 to TMP-022)
    // ─────────────────────────────────────────────────────────────
    #[error("TMP-020: Invalid binding path '{path}'")]
    InvalidPath { path: String },

    #[error("TMP-021: Unsupported selector '{selector}'")]
    UnsupportedSelector { selector: String },

    #[error("TMP-022: No element matches '{selector}'")]
    ElementNotFound { selector: String },

    #[error("TMP-023: Cannot detect page kind (no data template element)")]
    UnknownPage,

    // ─────────────────────────────────────────────────────────────
    // Dispatch errors (TMP-030 to TMP-036)
    // ─────────────────────────────────────────────────────────────
    #[error("TMP-030: Unknown action '{name}'")]
    UnknownAction { name: String },

    #[error("TMP-031: Action '{action}' is declared for this page but has no handler")]
    MissingActionHandler { action: Action },

    #[error("TMP-032: Action '{action}' needs attribute 'data-{attribute}'")]
    MissingAttribute { action: Action, attribute: String },

    #[error("TMP-033: Action '{action}' failed: {message}")]
    ActionFailed { action: Action, message: String },

    #[error("TMP-034: Login required")]
    LoginRequired,

    #[error("TMP-035: Image rejected: {reason}")]
    ImageRejected { reason: String },

    #[error("TMP-036: Action '{action}' needs an attached file")]
    MissingAttachment { action: Action },
}

impl PageError {
    /// Text shown to the visitor in a notification.
    pub fn user_message(&self) -> &str {
        match self {
            PageError::ActionFailed { message, .. } => message,
            PageError::ImageRejected { reason } => reason,
            _ => GENERIC_FAILURE_MESSAGE,
        }
    }
}

static ENDPOINT_HINT: Lazy<String> = Lazy::new(|| {
    let names: Vec<&str> = Endpoint::ALL.iter().map(|e| e.name()).collect();
    format!("Use one of: {}", names.join(", "))
});

impl FixSuggestion for PageError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            PageError::Io(_) => Some("Check file path and permissions"),
            PageError::SettingsParse(_) => Some("Check YAML syntax of the settings file"),
            PageError::ConfigInvalid { .. } => {
                Some("Fix the JSON inside <script id=\"api-config\">")
            }
            PageError::UnknownEndpoint { .. } => Some(ENDPOINT_HINT.as_str()),
            PageError::MissingPathParam { .. } => {
                Some("Pass the parameter with ApiRequest::param (e.g. id for trademark)")
            }
            PageError::InvalidUrl { .. } => {
                Some("Set an absolute origin (TRADEMARK_PAGES_ORIGIN) or an absolute baseUrl")
            }
            PageError::HttpClient { .. } => Some("Check TLS setup and timeout settings"),
            PageError::InvalidPath { .. } => Some("Use dotted paths like results.0.trademarkName"),
            PageError::UnsupportedSelector { .. } => {
                Some("Use tag, #id, .class, [attr] or [attr=\"value\"] joined by spaces")
            }
            PageError::ElementNotFound { .. } => Some("Check the selector against the page markup"),
            PageError::UnknownPage => Some(
                "Add home-data-template, search-results-template or trademark-data-template, or pass --page",
            ),
            PageError::UnknownAction { .. } => {
                Some("Check data-action values against the supported action names")
            }
            PageError::MissingActionHandler { .. } => {
                Some("Register a handler for the action when building the dispatcher")
            }
            PageError::MissingAttribute { .. } => {
                Some("Add the data attribute to the element carrying data-action")
            }
            PageError::ActionFailed { .. } => None,
            PageError::LoginRequired => Some("Sign in and retry"),
            PageError::ImageRejected { .. } => Some("Pick an image the page accepts, under the size limit"),
            PageError::MissingAttachment { .. } => Some("Attach the selected file to the action"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_failed_exposes_its_message() {
        let err = PageError::ActionFailed {
            action: Action::Bookmark,
            message: "Không thể lưu nhãn hiệu".to_string(),
        };
        assert_eq!(err.user_message(), "Không thể lưu nhãn hiệu");
        assert!(err.to_string().starts_with("TMP-033"));
    }

    #[test]
    fn other_errors_use_generic_message() {
        let err = PageError::MissingAttribute {
            action: Action::Bookmark,
            attribute: "trademark-id".to_string(),
        };
        assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);
        assert!(err.fix_suggestion().is_some());
    }

    #[test]
    fn unknown_endpoint_hint_lists_every_endpoint() {
        let err = "nowhere".parse::<Endpoint>().unwrap_err();
        let hint = err.fix_suggestion().unwrap();
        for endpoint in Endpoint::ALL {
            assert!(hint.contains(endpoint.name()), "{} missing from hint", endpoint.name());
        }
    }
}

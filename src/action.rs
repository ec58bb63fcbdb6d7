//! Page actions
//!
//! Elements opt into behavior with `data-action="<name>"`; parameters ride
//! along as sibling `data-*` attributes. Names are parsed into [`Action`]
//! once, at the delegation boundary.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::dom::{Document, NodeId};
use crate::error::PageError;
use crate::upload::ImageUpload;

/// Action marker attribute
pub const ACTION_ATTR: &str = "data-action";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Search,
    /// Toggle the advanced search panel
    AdvancedSearch,
    SubmitAdvancedSearch,
    ClearAdvancedSearch,
    /// Open the file picker
    UploadImage,
    /// A picked file is ready to send
    ImageSearch,
    CloseBanner,
    ChangeLanguage,
    // Login-gated features
    ViewGuide,
    ViewArticle,
    ViewFaq,
    ViewPricing,
    ViewPartnership,
    ViewAnnouncements,
    ViewDisclaimer,
    SavedTrademarks,
    TrackedTrademarks,
    Pricing,
    Login,
    PremiumFeature,
    // Login modal
    CloseLogin,
    GoToLogin,
    // Records
    Bookmark,
    Track,
    Export,
    Contact,
    ViewTrademark,
    OpenImage,
    Copy,
    // Support widgets
    OpenZalo,
    OpenFeedback,
}

impl Action {
    pub const ALL: &'static [Action] = &[
        Action::Search,
        Action::AdvancedSearch,
        Action::SubmitAdvancedSearch,
        Action::ClearAdvancedSearch,
        Action::UploadImage,
        Action::ImageSearch,
        Action::CloseBanner,
        Action::ChangeLanguage,
        Action::ViewGuide,
        Action::ViewArticle,
        Action::ViewFaq,
        Action::ViewPricing,
        Action::ViewPartnership,
        Action::ViewAnnouncements,
        Action::ViewDisclaimer,
        Action::SavedTrademarks,
        Action::TrackedTrademarks,
        Action::Pricing,
        Action::Login,
        Action::PremiumFeature,
        Action::CloseLogin,
        Action::GoToLogin,
        Action::Bookmark,
        Action::Track,
        Action::Export,
        Action::Contact,
        Action::ViewTrademark,
        Action::OpenImage,
        Action::Copy,
        Action::OpenZalo,
        Action::OpenFeedback,
    ];

    /// Features that only show the login prompt to anonymous visitors
    pub const LOGIN_GATED: &'static [Action] = &[
        Action::ViewGuide,
        Action::ViewArticle,
        Action::ViewFaq,
        Action::ViewPricing,
        Action::ViewPartnership,
        Action::ViewAnnouncements,
        Action::ViewDisclaimer,
        Action::SavedTrademarks,
        Action::TrackedTrademarks,
        Action::Pricing,
        Action::Login,
        Action::PremiumFeature,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Search => "search",
            Action::AdvancedSearch => "advanced-search",
            Action::SubmitAdvancedSearch => "submit-advanced-search",
            Action::ClearAdvancedSearch => "clear-advanced-search",
            Action::UploadImage => "upload-image",
            Action::ImageSearch => "image-search",
            Action::CloseBanner => "close-banner",
            Action::ChangeLanguage => "change-language",
            Action::ViewGuide => "view-guide",
            Action::ViewArticle => "view-article",
            Action::ViewFaq => "view-faq",
            Action::ViewPricing => "view-pricing",
            Action::ViewPartnership => "view-partnership",
            Action::ViewAnnouncements => "view-announcements",
            Action::ViewDisclaimer => "view-disclaimer",
            Action::SavedTrademarks => "saved-trademarks",
            Action::TrackedTrademarks => "tracked-trademarks",
            Action::Pricing => "pricing",
            Action::Login => "login",
            Action::PremiumFeature => "premium-feature",
            Action::CloseLogin => "close-login",
            Action::GoToLogin => "go-to-login",
            Action::Bookmark => "bookmark",
            Action::Track => "track",
            Action::Export => "export",
            Action::Contact => "contact",
            Action::ViewTrademark => "view-trademark",
            Action::OpenImage => "open-image",
            Action::Copy => "copy",
            Action::OpenZalo => "open-zalo",
            Action::OpenFeedback => "open-feedback",
        }
    }

    pub fn is_login_gated(self) -> bool {
        Self::LOGIN_GATED.contains(&self)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = PageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == name)
            .ok_or_else(|| PageError::UnknownAction {
                name: name.to_string(),
            })
    }
}

// ============================================================================
// DESCRIPTOR
// ============================================================================

/// One resolved trigger: the action, the element that declared it, and its
/// data attributes (prefix stripped, `action` itself excluded).
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDescriptor {
    pub action: Action,
    pub element: NodeId,
    pub data: BTreeMap<String, String>,
    /// File handed over by the host for `image-search`
    pub attachment: Option<ImageUpload>,
}

impl ActionDescriptor {
    pub fn new(action: Action, element: NodeId) -> Self {
        Self {
            action,
            element,
            data: BTreeMap::new(),
            attachment: None,
        }
    }

    /// Resolve a click on `target` by walking up to the nearest action marker.
    ///
    /// `Ok(None)` when nothing on the path declares an action;
    /// `Err(UnknownAction)` when the declared name is not an [`Action`].
    pub fn from_target(doc: &Document, target: NodeId) -> Result<Option<Self>, PageError> {
        let Some(element) = doc.closest_with_attribute(target, ACTION_ATTR) else {
            return Ok(None);
        };
        let name = doc.attr(element, ACTION_ATTR).unwrap_or_default();
        let action: Action = name.parse()?;

        let mut data = doc.data_attributes(element);
        data.remove("action");
        Ok(Some(Self {
            action,
            element,
            data,
            attachment: None,
        }))
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_attachment(mut self, upload: ImageUpload) -> Self {
        self.attachment = Some(upload);
        self
    }

    /// Non-empty data attribute
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Data attribute the action cannot run without
    pub fn require(&self, key: &str) -> Result<&str, PageError> {
        self.get(key).ok_or_else(|| PageError::MissingAttribute {
            action: self.action,
            attribute: key.to_string(),
        })
    }

    /// Identity of an in-flight trigger: same action, same parameters.
    pub fn flight_key(&self) -> String {
        self.flight_key_with(&[])
    }

    /// [`flight_key`](Self::flight_key) extended with parameters read from
    /// the page at trigger time.
    pub fn flight_key_with(&self, page_params: &[(String, String)]) -> String {
        let mut key = self.action.as_str().to_string();
        let pairs = self
            .data
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .chain(page_params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        for (k, v) in pairs {
            key.push('|');
            key.push_str(k);
            key.push('=');
            key.push_str(v);
        }
        if let Some(upload) = &self.attachment {
            key.push_str("|file=");
            key.push_str(&upload.file_name);
        }
        key
    }
}

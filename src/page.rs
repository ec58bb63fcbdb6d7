//! Page assembly
//!
//! One [`Page`] per loaded document. Everything a handler can touch lives in
//! the [`PageContext`] built here; nothing is global.
//!
//! Execution is single-threaded: the document sits in a `RefCell` and
//! handlers never hold a borrow across an `.await`.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::action::{Action, ActionDescriptor};
use crate::binder::{
    detail_templates, home_templates, search_templates, BindReport, BindSequencer, BindTicket,
    Binder, CollectionTemplate,
};
use crate::config::{Configuration, Endpoint, Settings};
use crate::dispatch::{AuditFinding, DispatchOutcome, Dispatcher, Effect};
use crate::dom::{Document, NodeId};
use crate::error::{PageError, Result};
use crate::event_log::{EventKind, EventLog};
use crate::feedback::{DomFeedback, Feedback, Severity};
use crate::gateway::{ApiRequest, Failure, Gateway, Transport};
use crate::handlers::handler_for;
use crate::upload::{ImageRules, ImageUpload};

/// Element holding the search results on the results page
pub const RESULTS_SCOPE_ID: &str = "search-results";

// ============================================================================
// PAGE KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageKind {
    Home,
    SearchResults,
    TrademarkDetail,
}

const HOME_ACTIONS: &[Action] = &[
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
    Action::CloseLogin,
    Action::GoToLogin,
];

const SEARCH_ACTIONS: &[Action] = &[
    Action::Search,
    Action::AdvancedSearch,
    Action::SubmitAdvancedSearch,
    Action::ClearAdvancedSearch,
    Action::UploadImage,
    Action::ImageSearch,
    Action::ViewTrademark,
    Action::OpenImage,
    Action::Bookmark,
    Action::Track,
    Action::Export,
    Action::SavedTrademarks,
    Action::TrackedTrademarks,
    Action::Pricing,
    Action::Login,
    Action::PremiumFeature,
    Action::CloseLogin,
    Action::GoToLogin,
];

const DETAIL_ACTIONS: &[Action] = &[
    Action::Search,
    Action::AdvancedSearch,
    Action::OpenImage,
    Action::Copy,
    Action::Bookmark,
    Action::Track,
    Action::Contact,
    Action::SavedTrademarks,
    Action::TrackedTrademarks,
    Action::Pricing,
    Action::Login,
    Action::PremiumFeature,
    Action::CloseLogin,
    Action::GoToLogin,
    Action::OpenZalo,
    Action::OpenFeedback,
];

impl PageKind {
    pub const ALL: &'static [PageKind] = &[
        PageKind::Home,
        PageKind::SearchResults,
        PageKind::TrademarkDetail,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PageKind::Home => "home",
            PageKind::SearchResults => "search",
            PageKind::TrademarkDetail => "trademark",
        }
    }

    /// Id of the element embedding the fallback payload
    pub fn template_id(self) -> &'static str {
        match self {
            PageKind::Home => "home-data-template",
            PageKind::SearchResults => "search-results-template",
            PageKind::TrademarkDetail => "trademark-data-template",
        }
    }

    /// Recognize a page by its fallback template element.
    pub fn detect(doc: &Document) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| doc.element_by_id(kind.template_id()).is_some())
    }

    /// Actions this page must handle
    pub fn actions(self) -> &'static [Action] {
        match self {
            PageKind::Home => HOME_ACTIONS,
            PageKind::SearchResults => SEARCH_ACTIONS,
            PageKind::TrademarkDetail => DETAIL_ACTIONS,
        }
    }

    pub fn templates(self) -> Vec<CollectionTemplate> {
        match self {
            PageKind::Home => home_templates(),
            PageKind::SearchResults => search_templates(),
            PageKind::TrademarkDetail => detail_templates(),
        }
    }

    /// Endpoint the page's own data comes from
    pub fn endpoint(self) -> Endpoint {
        match self {
            PageKind::Home => Endpoint::Home,
            PageKind::SearchResults => Endpoint::Search,
            PageKind::TrademarkDetail => Endpoint::Trademark,
        }
    }

    pub fn search_input_selector(self) -> &'static str {
        match self {
            PageKind::Home => ".search-box input",
            PageKind::SearchResults | PageKind::TrademarkDetail => ".hs-input",
        }
    }

    pub fn image_rules(self) -> ImageRules {
        match self {
            PageKind::Home => ImageRules::AnyImage,
            PageKind::SearchResults | PageKind::TrademarkDetail => ImageRules::WebFormats,
        }
    }

    pub fn file_input_id(self) -> &'static str {
        match self {
            PageKind::Home => "fileInput",
            PageKind::SearchResults | PageKind::TrademarkDetail => "hsFileInput",
        }
    }

    pub fn advanced_form_id(self) -> &'static str {
        match self {
            PageKind::Home => "advancedPanel",
            PageKind::SearchResults | PageKind::TrademarkDetail => "advancedSearchForm",
        }
    }

    /// The load-time request, or `None` when the page lacks what it needs
    /// to ask (a detail page without a trademark id).
    pub fn initial_request(self, params: &PageParams) -> Option<ApiRequest> {
        match self {
            PageKind::Home => Some(ApiRequest::get(Endpoint::Home)),
            PageKind::SearchResults => {
                let request = ApiRequest::get(Endpoint::Search);
                Some(match &params.query {
                    Some(query) => request.query("q", query.clone()),
                    None => request,
                })
            }
            PageKind::TrademarkDetail => params
                .trademark_id
                .as_ref()
                .map(|id| ApiRequest::get(Endpoint::Trademark).param("id", id.clone())),
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PageKind {
    type Err = PageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "home" => Ok(PageKind::Home),
            "search" | "search-results" => Ok(PageKind::SearchResults),
            "trademark" | "detail" | "trademark-detail" => Ok(PageKind::TrademarkDetail),
            _ => Err(PageError::UnknownPage),
        }
    }
}

/// What the page was opened with (the URL's query string, in a browser)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageParams {
    pub query: Option<String>,
    pub trademark_id: Option<String>,
}

// ============================================================================
// CONTEXT
// ============================================================================

/// Everything handlers share, owned by one page
pub struct PageContext {
    kind: PageKind,
    params: PageParams,
    settings: Settings,
    document: RefCell<Document>,
    gateway: Gateway,
    binder: Binder,
    sequencer: BindSequencer,
    feedback: Box<dyn Feedback>,
    events: EventLog,
}

impl PageContext {
    pub fn kind(&self) -> PageKind {
        self.kind
    }

    pub fn params(&self) -> &PageParams {
        &self.params
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn document(&self) -> Ref<'_, Document> {
        self.document.borrow()
    }

    pub fn document_mut(&self) -> RefMut<'_, Document> {
        self.document.borrow_mut()
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn binder(&self) -> &Binder {
        &self.binder
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn notify(&self, message: &str, severity: Severity) {
        self.feedback
            .notify(&mut self.document.borrow_mut(), message, severity);
    }

    pub fn prompt_login(&self) {
        self.feedback.prompt_login(&mut self.document.borrow_mut());
    }

    pub fn dismiss_login(&self) {
        self.feedback.dismiss_login(&mut self.document.borrow_mut());
    }

    /// Trimmed, non-empty value of the page's search box
    pub fn search_input_value(&self) -> Option<String> {
        let doc = self.document.borrow();
        let input = doc.query(self.kind.search_input_selector()).ok()??;
        let value = doc.attr(input, "value")?.trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    /// Where page-level payloads are bound
    pub fn page_scope(&self) -> NodeId {
        self.document.borrow().body()
    }

    /// Where result sets are bound on the results page
    pub fn results_scope(&self) -> NodeId {
        let doc = self.document.borrow();
        doc.element_by_id(RESULTS_SCOPE_ID)
            .unwrap_or_else(|| doc.body())
    }

    /// Take a ticket before the request whose result will be bound.
    pub fn issue_ticket(&self, scope: NodeId) -> BindTicket {
        self.sequencer.issue(scope)
    }

    /// Bind unless a newer ticket for the same scope was issued meanwhile.
    pub fn bind(&self, ticket: BindTicket, payload: &Value) -> Option<BindReport> {
        if !self.sequencer.is_current(ticket) {
            debug!(seq = ticket.seq, "discarding superseded bind");
            self.events.emit(EventKind::BindDiscarded { ticket: ticket.seq });
            return None;
        }
        let report = self
            .binder
            .bind(&mut self.document.borrow_mut(), ticket.scope, payload);
        self.events.emit(EventKind::Bound {
            written: report.written,
            gaps: report.gaps,
            rows: report.rows,
        });
        Some(report)
    }

    /// Remove expired notifications
    pub fn sweep_notifications(&self, now: Instant) -> usize {
        self.feedback.sweep(&mut self.document.borrow_mut(), now)
    }
}

impl fmt::Debug for PageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageContext")
            .field("kind", &self.kind)
            .field("params", &self.params)
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PAGE
// ============================================================================

/// Result of the load-time fetch and bind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    /// `live`, `fallback` or `empty`
    pub source: &'static str,
    pub bind: Option<BindReport>,
}

/// A key press the page reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    pub key: String,
    pub ctrl: bool,
    pub meta: bool,
}

impl KeyPress {
    pub fn plain(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ctrl: false,
            meta: false,
        }
    }

    pub fn ctrl(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ctrl: true,
            meta: false,
        }
    }
}

pub struct Page {
    ctx: PageContext,
    dispatcher: Dispatcher,
}

impl Page {
    /// Parse `html` and wire up a page.
    ///
    /// `kind` overrides detection from the page's template element.
    pub fn load(
        html: &str,
        kind: Option<PageKind>,
        params: PageParams,
        settings: Settings,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let mut document = Document::parse(html);
        let kind = kind
            .or_else(|| PageKind::detect(&document))
            .ok_or(PageError::UnknownPage)?;

        let dispatcher = kind
            .actions()
            .iter()
            .fold(Dispatcher::builder(), |builder, action| {
                builder.register(*action, handler_for(*action))
            })
            .build(kind.actions())?;

        let events = EventLog::new();
        let config = Configuration::from_document(&document).with_settings(&settings);
        let fallback = Gateway::load_fallback(&document, kind.template_id());
        let has_fallback = fallback.is_some();
        let gateway = Gateway::new(config, settings.origin.clone(), transport, events.clone())
            .with_fallback(fallback);

        if let Some(query) = &params.query {
            if let Ok(Some(input)) = document.query(kind.search_input_selector()) {
                document.set_attr(input, "value", query);
            }
        }

        for finding in dispatcher.audit(&document) {
            warn!(page = %kind, "{finding}");
        }

        events.emit(EventKind::PageLoaded {
            page: kind.name().to_string(),
            has_fallback,
        });
        info!(page = %kind, has_fallback, "page loaded");

        let ctx = PageContext {
            kind,
            params,
            feedback: Box::new(DomFeedback::new(
                settings.notification_duration(),
                events.clone(),
            )),
            settings,
            document: RefCell::new(document),
            gateway,
            binder: Binder::new(kind.templates()),
            sequencer: BindSequencer::new(),
            events,
        };
        Ok(Self { ctx, dispatcher })
    }

    /// Fetch the page's data and bind it (live, else the embedded snapshot).
    #[instrument(skip(self), fields(page = %self.ctx.kind))]
    pub async fn initialize(&self) -> LoadReport {
        let kind = self.ctx.kind;
        let scope = match kind {
            PageKind::SearchResults => self.ctx.results_scope(),
            _ => self.ctx.page_scope(),
        };
        let ticket = self.ctx.issue_ticket(scope);

        let outcome = match kind.initial_request(&self.ctx.params) {
            Some(request) => self.ctx.gateway.request(request).await,
            None => self
                .ctx
                .gateway
                .degrade(kind.endpoint(), Failure::request("no trademark id given")),
        };

        let source = outcome.label();
        let bind = match outcome.payload() {
            Some(payload) => self.ctx.bind(ticket, payload),
            None => {
                debug!("nothing to bind");
                None
            }
        };
        LoadReport { source, bind }
    }

    /// Delegated click on `target`
    pub async fn click(&self, target: NodeId) -> DispatchOutcome {
        self.dispatcher.click(&self.ctx, target).await
    }

    /// Click the first element matching `selector`
    pub async fn click_selector(&self, selector: &str) -> Result<DispatchOutcome> {
        let target = self
            .ctx
            .document()
            .query(selector)?
            .ok_or_else(|| PageError::ElementNotFound {
                selector: selector.to_string(),
            })?;
        Ok(self.click(target).await)
    }

    /// Run a trigger built by the host
    pub async fn trigger(&self, descriptor: ActionDescriptor) -> DispatchOutcome {
        self.dispatcher.dispatch(&self.ctx, descriptor).await
    }

    /// A file was picked (or dropped) for image search
    pub async fn submit_image(&self, upload: ImageUpload) -> DispatchOutcome {
        let element = {
            let doc = self.ctx.document();
            doc.element_by_id(self.ctx.kind.file_input_id())
                .unwrap_or_else(|| doc.body())
        };
        let descriptor = ActionDescriptor::new(Action::ImageSearch, element).with_attachment(upload);
        self.trigger(descriptor).await
    }

    /// Keyboard shortcuts: Enter searches, Escape closes the login gate,
    /// Ctrl/Cmd+K focuses the search box.
    pub async fn press_key(&self, press: &KeyPress) -> Vec<Effect> {
        let selector = self.ctx.kind.search_input_selector();
        match press.key.as_str() {
            "Escape" => {
                self.ctx.dismiss_login();
                Vec::new()
            }
            "k" | "K" if press.ctrl || press.meta => vec![Effect::Focus {
                selector: selector.to_string(),
            }],
            "Enter" => {
                let input = self.ctx.document().query(selector).ok().flatten();
                match input {
                    Some(input) => {
                        let descriptor = ActionDescriptor::new(Action::Search, input);
                        self.trigger(descriptor).await.effects().to_vec()
                    }
                    None => Vec::new(),
                }
            }
            _ => Vec::new(),
        }
    }

    pub fn sweep_notifications(&self, now: Instant) -> usize {
        self.ctx.sweep_notifications(now)
    }

    /// Action markers that do nothing on this page
    pub fn audit(&self) -> Vec<AuditFinding> {
        self.dispatcher.audit(&self.ctx.document())
    }

    pub fn html(&self) -> String {
        self.ctx.document().to_html()
    }

    pub fn kind(&self) -> PageKind {
        self.ctx.kind
    }

    pub fn context(&self) -> &PageContext {
        &self.ctx
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn events(&self) -> &EventLog {
        &self.ctx.events
    }

    pub fn configuration(&self) -> &Configuration {
        self.ctx.gateway.config()
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("ctx", &self.ctx)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MockResponse, MockTransport};
    use serde_json::json;

    const SEARCH_PAGE: &str = r#"<html><body>
<input class="hs-input" value="">
<div id="search-results"><span data-bind="totalResults">0</span><table><tbody data-bind="results"></tbody></table></div>
<script type="application/json" id="search-results-template">{"totalResults": 1, "results": [{"trademarkId": "F1", "trademarkName": "Snapshot"}]}</script>
</body></html>"#;

    fn load(transport: Arc<MockTransport>, params: PageParams) -> Page {
        Page::load(SEARCH_PAGE, None, params, Settings::default(), transport).unwrap()
    }

    #[test]
    fn kind_is_detected_from_template() {
        let doc = Document::parse(SEARCH_PAGE);
        assert_eq!(PageKind::detect(&doc), Some(PageKind::SearchResults));
        assert_eq!("detail".parse::<PageKind>().unwrap(), PageKind::TrademarkDetail);
        assert!("blog".parse::<PageKind>().is_err());
    }

    #[test]
    fn page_without_template_needs_explicit_kind() {
        let err = Page::load(
            "<html><body></body></html>",
            None,
            PageParams::default(),
            Settings::default(),
            Arc::new(MockTransport::offline()),
        )
        .unwrap_err();
        assert!(matches!(err, PageError::UnknownPage));
    }

    #[test]
    fn every_page_registers_its_declared_actions() {
        let page = Page::load(
            "<html><body></body></html>",
            Some(PageKind::TrademarkDetail),
            PageParams::default(),
            Settings::default(),
            Arc::new(MockTransport::offline()),
        )
        .unwrap();
        for action in PageKind::TrademarkDetail.actions() {
            assert!(page.dispatcher().handles(*action));
        }
        assert!(!page.dispatcher().handles(Action::CloseBanner));
    }

    #[test]
    fn detail_request_carries_the_id() {
        let params = PageParams {
            trademark_id: Some("4-2019-12345".into()),
            ..Default::default()
        };
        let request = PageKind::TrademarkDetail.initial_request(&params).unwrap();
        assert_eq!(request.endpoint, Endpoint::Trademark);
        assert!(PageKind::TrademarkDetail
            .initial_request(&PageParams::default())
            .is_none());
    }

    #[tokio::test]
    async fn offline_load_binds_the_snapshot() {
        let page = load(Arc::new(MockTransport::offline()), PageParams::default());
        let report = page.initialize().await;
        assert_eq!(report.source, "fallback");
        assert_eq!(report.bind.map(|b| b.rows), Some(1));
        assert!(page.html().contains(r#"data-trademark-id="F1""#));
    }

    #[tokio::test]
    async fn live_load_uses_query_param() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            "/api/search",
            MockResponse::json(200, json!({"totalResults": 0, "results": []})),
        );
        let page = load(
            transport.clone(),
            PageParams {
                query: Some("honda".into()),
                ..Default::default()
            },
        );
        let report = page.initialize().await;
        assert_eq!(report.source, "live");
        assert_eq!(
            transport.last_request().unwrap().url.query(),
            Some("q=honda")
        );
        assert_eq!(page.context().search_input_value().as_deref(), Some("honda"));
    }

    #[tokio::test]
    async fn shortcuts() {
        let page = load(Arc::new(MockTransport::offline()), PageParams::default());
        assert_eq!(
            page.press_key(&KeyPress::ctrl("k")).await,
            vec![Effect::Focus {
                selector: ".hs-input".into()
            }]
        );
        page.context().prompt_login();
        assert!(page.html().contains("loginModal"));
        page.press_key(&KeyPress::plain("Escape")).await;
        assert!(!page.html().contains("loginModal"));
    }
}

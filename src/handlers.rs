//! Concrete action handlers
//!
//! Each handler reads what it needs from the trigger and the document,
//! talks to the gateway, and either writes its result into the page or
//! returns effects for the host. Errors go back to the dispatcher, which
//! owns the user-facing reporting.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use url::form_urlencoded;

use crate::action::{Action, ActionDescriptor};
use crate::config::Endpoint;
use crate::dispatch::{ActionHandler, Effect};
use crate::dom::{Document, NodeId};
use crate::error::PageError;
use crate::feedback::Severity;
use crate::gateway::{ApiRequest, Outcome};
use crate::page::{PageContext, PageKind};

const EMPTY_QUERY: &str = "Vui lòng nhập từ khóa tìm kiếm";
const EMPTY_CRITERIA: &str = "Vui lòng nhập ít nhất một tiêu chí tìm kiếm";
const SEARCH_FAILED: &str = "Lỗi tìm kiếm. Vui lòng thử lại.";
const NO_MATCHES: &str = "Không tìm thấy kết quả phù hợp";
const IMAGE_SEARCH_FAILED: &str = "Lỗi tìm kiếm hình ảnh. Vui lòng thử lại.";
const IMAGE_UPLOADED: &str = "Hình ảnh đã được tải lên thành công!";
const LANGUAGE_FAILED: &str = "Lỗi chuyển đổi ngôn ngữ";
const ADVANCED_UNAVAILABLE: &str = "Tính năng tìm kiếm nâng cao sẽ được triển khai...";
const CONTACT_INCOMPLETE: &str = "Vui lòng nhập họ tên và số điện thoại";
const CONTACT_SENT: &str = "Cảm ơn bạn! Chúng tôi sẽ liên hệ lại sớm.";
const CONTACT_FAILED: &str = "Không thể gửi yêu cầu liên hệ. Vui lòng thử lại.";
const EXPORT_STARTED: &str = "Đang tải xuống kết quả tìm kiếm";
const EXPORT_FAILED: &str = "Không thể xuất kết quả. Vui lòng thử lại.";
const COPIED: &str = "Đã sao chép vào bộ nhớ tạm";
const ZALO_NOTICE: &str = "Mở ứng dụng Zalo hỗ trợ...";
const FEEDBACK_NOTICE: &str = "Mở form góp ý...";

/// Handler for `action`. Every action has one; which of them a page
/// registers is decided by [`PageKind::actions`].
pub fn handler_for(action: Action) -> Box<dyn ActionHandler> {
    match action {
        Action::Search => Box::new(SearchHandler::keyword()),
        Action::SubmitAdvancedSearch => Box::new(SearchHandler::advanced()),
        Action::AdvancedSearch => Box::new(ToggleAdvancedHandler),
        Action::ClearAdvancedSearch => Box::new(ClearAdvancedHandler),
        Action::UploadImage => Box::new(FilePickerHandler),
        Action::ImageSearch => Box::new(ImageSearchHandler),
        Action::CloseBanner => Box::new(BannerHandler),
        Action::ChangeLanguage => Box::new(LanguageHandler),
        Action::CloseLogin => Box::new(CloseLoginHandler),
        Action::GoToLogin => Box::new(GoToLoginHandler),
        Action::Bookmark => Box::new(RecordHandler::bookmark()),
        Action::Track => Box::new(RecordHandler::track()),
        Action::Export => Box::new(ExportHandler),
        Action::Contact => Box::new(ContactHandler),
        Action::ViewTrademark => Box::new(NavigateHandler::Trademark),
        Action::OpenImage => Box::new(NavigateHandler::Image),
        Action::Copy => Box::new(CopyHandler),
        Action::OpenZalo => Box::new(NoticeHandler::new(ZALO_NOTICE, Severity::Info)),
        Action::OpenFeedback => Box::new(NoticeHandler::new(FEEDBACK_NOTICE, Severity::Info)),
        Action::ViewGuide
        | Action::ViewArticle
        | Action::ViewFaq
        | Action::ViewPricing
        | Action::ViewPartnership
        | Action::ViewAnnouncements
        | Action::ViewDisclaimer
        | Action::SavedTrademarks
        | Action::TrackedTrademarks
        | Action::Pricing
        | Action::Login
        | Action::PremiumFeature => Box::new(LoginGateHandler),
    }
}

fn failed(action: Action, message: impl Into<String>) -> PageError {
    PageError::ActionFailed {
        action,
        message: message.into(),
    }
}

fn query_string(pairs: &[(String, String)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        serializer.append_pair(k, v);
    }
    serializer.finish()
}

fn required_element(doc: &Document, id: &str) -> Result<NodeId, PageError> {
    doc.element_by_id(id).ok_or_else(|| PageError::ElementNotFound {
        selector: format!("#{id}"),
    })
}

/// Named, non-empty fields of a form-like container
fn form_fields(doc: &Document, form: NodeId) -> Result<Vec<(String, String)>, PageError> {
    let mut fields = Vec::new();
    for input in doc.query_all_within(form, "[name]")? {
        let Some(name) = doc.attr(input, "name") else {
            continue;
        };
        let value = match (doc.tag(input), doc.attr(input, "type")) {
            (Some("input"), Some("checkbox" | "radio")) => {
                if !doc.has_attr(input, "checked") {
                    continue;
                }
                doc.attr(input, "value").unwrap_or("on").to_string()
            }
            (Some("input"), _) => doc.attr(input, "value").unwrap_or_default().to_string(),
            (Some("textarea"), _) => doc.text_content(input),
            _ => continue,
        };
        let value = value.trim();
        if !value.is_empty() {
            fields.push((name.to_string(), value.to_string()));
        }
    }
    Ok(fields)
}

/// Empty the text inputs of `form` and untick its checkboxes.
fn reset_form(doc: &mut Document, form: NodeId) -> Result<(), PageError> {
    for input in doc.query_all_within(form, "input")? {
        let kind = doc.attr(input, "type").unwrap_or("text").to_ascii_lowercase();
        match kind.as_str() {
            "checkbox" | "radio" => doc.remove_attr(input, "checked"),
            "text" | "search" | "tel" | "email" | "number" | "date" => doc.set_attr(input, "value", ""),
            _ => {}
        }
    }
    for textarea in doc.query_all_within(form, "textarea")? {
        doc.set_text_content(textarea, "");
    }
    Ok(())
}

// ============================================================================
// SEARCH
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuerySource {
    /// The page's single search box
    Keyword,
    /// Every filled field of the advanced panel
    AdvancedForm,
}

/// Keyword and advanced search.
///
/// On the results page the results scope is rebound in place; elsewhere a
/// live answer sends the visitor to the results page.
#[derive(Debug)]
pub struct SearchHandler {
    source: QuerySource,
}

impl SearchHandler {
    pub fn keyword() -> Self {
        Self {
            source: QuerySource::Keyword,
        }
    }

    pub fn advanced() -> Self {
        Self {
            source: QuerySource::AdvancedForm,
        }
    }

    fn criteria(
        &self,
        ctx: &PageContext,
        descriptor: &ActionDescriptor,
    ) -> Result<(Endpoint, Vec<(String, String)>), PageError> {
        let action = descriptor.action;
        match self.source {
            QuerySource::Keyword => {
                let query = descriptor
                    .get("query")
                    .map(str::to_string)
                    .or_else(|| ctx.search_input_value())
                    .ok_or_else(|| failed(action, EMPTY_QUERY))?;
                Ok((Endpoint::Search, vec![("q".to_string(), query)]))
            }
            QuerySource::AdvancedForm => {
                let doc = ctx.document();
                let form = required_element(&doc, ctx.kind().advanced_form_id())?;
                let fields = form_fields(&doc, form)?;
                if fields.is_empty() {
                    return Err(failed(action, EMPTY_CRITERIA));
                }
                Ok((Endpoint::AdvancedSearch, fields))
            }
        }
    }

    fn has_snapshot(&self, ctx: &PageContext, criteria: &[(String, String)]) -> bool {
        match (self.source, criteria) {
            (QuerySource::Keyword, [(_, query)]) => ctx.settings().has_snapshot_for(query),
            _ => false,
        }
    }

    fn no_results_message(&self, criteria: &[(String, String)]) -> String {
        match (self.source, criteria.first()) {
            (QuerySource::Keyword, Some((_, query))) => {
                format!("Không tìm thấy kết quả cho từ khóa: {query}")
            }
            _ => NO_MATCHES.to_string(),
        }
    }
}

#[async_trait(?Send)]
impl ActionHandler for SearchHandler {
    async fn handle(
        &self,
        ctx: &PageContext,
        descriptor: &ActionDescriptor,
    ) -> Result<Vec<Effect>, PageError> {
        let action = descriptor.action;
        let (endpoint, criteria) = self.criteria(ctx, descriptor)?;

        let mut request = ApiRequest::get(endpoint);
        for (k, v) in &criteria {
            request = request.query(k.clone(), v.clone());
        }

        if ctx.kind() == PageKind::SearchResults {
            let ticket = ctx.issue_ticket(ctx.results_scope());
            let outcome = ctx.gateway().request(request).await;
            return match outcome.into_payload() {
                Some(payload) => {
                    ctx.bind(ticket, &payload);
                    Ok(Vec::new())
                }
                None => Err(failed(action, SEARCH_FAILED)),
            };
        }

        let results_page = Effect::Navigate {
            url: format!("{}?{}", ctx.settings().pages.search, query_string(&criteria)),
            new_tab: false,
        };
        match ctx.gateway().request(request).await {
            Outcome::Live(_) => Ok(vec![results_page]),
            _ if self.has_snapshot(ctx, &criteria) => {
                debug!("search failed; results page has a snapshot for this query");
                Ok(vec![results_page])
            }
            other => {
                debug!(outcome = other.label(), "search did not reach the server");
                Err(failed(action, self.no_results_message(&criteria)))
            }
        }
    }

    fn page_params(
        &self,
        ctx: &PageContext,
        descriptor: &ActionDescriptor,
    ) -> Vec<(String, String)> {
        self.criteria(ctx, descriptor)
            .map(|(_, criteria)| criteria)
            .unwrap_or_default()
    }
}

/// Show or hide the advanced search panel
#[derive(Debug)]
pub struct ToggleAdvancedHandler;

#[async_trait(?Send)]
impl ActionHandler for ToggleAdvancedHandler {
    async fn handle(
        &self,
        ctx: &PageContext,
        _descriptor: &ActionDescriptor,
    ) -> Result<Vec<Effect>, PageError> {
        match ctx.kind() {
            PageKind::Home => {
                let mut doc = ctx.document_mut();
                let body = doc.body();
                let open = doc.toggle_class(body, "advanced-open");
                if let Some(panel) = doc.element_by_id("advancedPanel") {
                    doc.set_attr(panel, "aria-hidden", if open { "false" } else { "true" });
                }
                if let Some(toggle) = doc.element_by_id("advToggle") {
                    let label = if open {
                        "Đóng tìm kiếm nâng cao"
                    } else {
                        "Tìm kiếm nâng cao"
                    };
                    doc.set_text_content(toggle, label);
                }
            }
            PageKind::SearchResults => {
                let mut doc = ctx.document_mut();
                let form = required_element(&doc, "advancedSearchForm")?;
                let hidden = doc
                    .style(form, "display")
                    .map_or(true, |d| d.is_empty() || d == "none");
                doc.set_style(form, "display", if hidden { "block" } else { "none" });
                if let Some(caret) = doc.query(".hs-caret")? {
                    doc.set_text_content(caret, if hidden { "▲" } else { "▼" });
                }
            }
            PageKind::TrademarkDetail => ctx.notify(ADVANCED_UNAVAILABLE, Severity::Info),
        }
        Ok(Vec::new())
    }
}

#[derive(Debug)]
pub struct ClearAdvancedHandler;

#[async_trait(?Send)]
impl ActionHandler for ClearAdvancedHandler {
    async fn handle(
        &self,
        ctx: &PageContext,
        _descriptor: &ActionDescriptor,
    ) -> Result<Vec<Effect>, PageError> {
        let mut doc = ctx.document_mut();
        let form = required_element(&doc, ctx.kind().advanced_form_id())?;
        reset_form(&mut doc, form)?;
        Ok(Vec::new())
    }
}

// ============================================================================
// IMAGE SEARCH
// ============================================================================

#[derive(Debug)]
pub struct FilePickerHandler;

#[async_trait(?Send)]
impl ActionHandler for FilePickerHandler {
    async fn handle(
        &self,
        ctx: &PageContext,
        _descriptor: &ActionDescriptor,
    ) -> Result<Vec<Effect>, PageError> {
        Ok(vec![Effect::OpenFilePicker {
            input_id: ctx.kind().file_input_id().to_string(),
        }])
    }
}

/// Validates the attached image, then uploads it as multipart form data.
#[derive(Debug)]
pub struct ImageSearchHandler;

impl ImageSearchHandler {
    fn show_selection(doc: &mut Document, file_name: &str) {
        let Some(zone) = doc.element_by_id("dropZone") else {
            return;
        };
        doc.clear_children(zone);
        let p = doc.create_element("p");
        doc.append_text(p, "📷 Hình đã chọn: ");
        let b = doc.create_element("b");
        doc.set_text_content(b, file_name);
        doc.append_child(p, b);
        doc.append_child(zone, p);
        doc.set_style(zone, "border-color", "#00cc66");
        doc.set_style(zone, "background", "#e9fff1");
    }
}

#[async_trait(?Send)]
impl ActionHandler for ImageSearchHandler {
    async fn handle(
        &self,
        ctx: &PageContext,
        descriptor: &ActionDescriptor,
    ) -> Result<Vec<Effect>, PageError> {
        let action = descriptor.action;
        let upload = descriptor
            .attachment
            .as_ref()
            .ok_or(PageError::MissingAttachment { action })?;
        upload.validate(ctx.kind().image_rules(), ctx.settings().max_upload_bytes)?;

        if ctx.kind() == PageKind::Home {
            Self::show_selection(&mut ctx.document_mut(), &upload.file_name);
        }

        let request = ApiRequest::upload(Endpoint::ImageSearch, upload.clone());
        if ctx.kind() == PageKind::SearchResults {
            let ticket = ctx.issue_ticket(ctx.results_scope());
            return match ctx.gateway().request(request).await {
                Outcome::Live(payload) => {
                    ctx.bind(ticket, &payload);
                    ctx.notify(IMAGE_UPLOADED, Severity::Success);
                    Ok(Vec::new())
                }
                _ => Err(failed(action, IMAGE_SEARCH_FAILED)),
            };
        }

        match ctx.gateway().request(request).await {
            Outcome::Live(_) => Ok(vec![Effect::Navigate {
                url: ctx.settings().pages.search.clone(),
                new_tab: false,
            }]),
            _ => Err(failed(action, IMAGE_SEARCH_FAILED)),
        }
    }
}

// ============================================================================
// PAGE CHROME
// ============================================================================

/// Dismiss the top banner for good
#[derive(Debug)]
pub struct BannerHandler;

#[async_trait(?Send)]
impl ActionHandler for BannerHandler {
    async fn handle(
        &self,
        ctx: &PageContext,
        _descriptor: &ActionDescriptor,
    ) -> Result<Vec<Effect>, PageError> {
        let outcome = ctx.gateway().request(ApiRequest::delete(Endpoint::Banner)).await;
        if outcome.is_live() {
            let mut doc = ctx.document_mut();
            if let Some(banner) = doc.query(".top-banner")? {
                doc.set_style(banner, "display", "none");
            }
        } else {
            debug!("banner stays: dismissal was not stored");
        }
        Ok(Vec::new())
    }
}

#[derive(Debug)]
pub struct LanguageHandler;

#[async_trait(?Send)]
impl ActionHandler for LanguageHandler {
    async fn handle(
        &self,
        ctx: &PageContext,
        descriptor: &ActionDescriptor,
    ) -> Result<Vec<Effect>, PageError> {
        let lang = descriptor.require("lang")?.to_string();
        let request = ApiRequest::put_json(Endpoint::Language, json!({ "language": lang }));
        if !ctx.gateway().request(request).await.is_live() {
            return Err(failed(descriptor.action, LANGUAGE_FAILED));
        }

        ctx.notify(&format!("Đã chuyển sang ngôn ngữ {lang}"), Severity::Success);
        let mut doc = ctx.document_mut();
        if let Some(label) = doc.query("[data-bind=\"current-language\"]")? {
            doc.set_text_content(label, &format!("{lang} ▼"));
        }
        Ok(Vec::new())
    }
}

// ============================================================================
// LOGIN
// ============================================================================

/// Features reserved for signed-in visitors
#[derive(Debug)]
pub struct LoginGateHandler;

#[async_trait(?Send)]
impl ActionHandler for LoginGateHandler {
    async fn handle(
        &self,
        ctx: &PageContext,
        _descriptor: &ActionDescriptor,
    ) -> Result<Vec<Effect>, PageError> {
        ctx.prompt_login();
        Ok(Vec::new())
    }
}

#[derive(Debug)]
pub struct CloseLoginHandler;

#[async_trait(?Send)]
impl ActionHandler for CloseLoginHandler {
    async fn handle(
        &self,
        ctx: &PageContext,
        _descriptor: &ActionDescriptor,
    ) -> Result<Vec<Effect>, PageError> {
        ctx.dismiss_login();
        Ok(Vec::new())
    }
}

#[derive(Debug)]
pub struct GoToLoginHandler;

#[async_trait(?Send)]
impl ActionHandler for GoToLoginHandler {
    async fn handle(
        &self,
        ctx: &PageContext,
        _descriptor: &ActionDescriptor,
    ) -> Result<Vec<Effect>, PageError> {
        ctx.dismiss_login();
        Ok(vec![Effect::Navigate {
            url: ctx.settings().pages.login.clone(),
            new_tab: false,
        }])
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// Bookmark or track a trademark for the signed-in visitor.
#[derive(Debug)]
pub struct RecordHandler {
    endpoint: Endpoint,
    done: &'static str,
    failure: &'static str,
}

impl RecordHandler {
    pub fn bookmark() -> Self {
        Self {
            endpoint: Endpoint::Bookmark,
            done: "Đã lưu nhãn hiệu",
            failure: "Không thể lưu nhãn hiệu. Vui lòng thử lại.",
        }
    }

    pub fn track() -> Self {
        Self {
            endpoint: Endpoint::Track,
            done: "Đã thêm nhãn hiệu vào danh sách theo dõi",
            failure: "Không thể theo dõi nhãn hiệu. Vui lòng thử lại.",
        }
    }
}

#[async_trait(?Send)]
impl ActionHandler for RecordHandler {
    async fn handle(
        &self,
        ctx: &PageContext,
        descriptor: &ActionDescriptor,
    ) -> Result<Vec<Effect>, PageError> {
        let id = match descriptor.get("trademark-id") {
            Some(id) => id.to_string(),
            None => ctx
                .params()
                .trademark_id
                .clone()
                .ok_or_else(|| PageError::MissingAttribute {
                    action: descriptor.action,
                    attribute: "trademark-id".to_string(),
                })?,
        };

        let request = ApiRequest::post_json(self.endpoint, json!({ "trademarkId": id }));
        match ctx.gateway().request(request).await {
            Outcome::Live(_) => {
                ctx.document_mut().add_class(descriptor.element, "active");
                ctx.notify(self.done, Severity::Success);
                Ok(Vec::new())
            }
            Outcome::Fallback { failure, .. } | Outcome::Empty(failure) => {
                if failure.is_unauthorized() {
                    Err(PageError::LoginRequired)
                } else {
                    Err(failed(descriptor.action, self.failure))
                }
            }
        }
    }
}

/// Contact request about a trademark, from `#contactForm`
#[derive(Debug)]
pub struct ContactHandler;

#[async_trait(?Send)]
impl ActionHandler for ContactHandler {
    async fn handle(
        &self,
        ctx: &PageContext,
        descriptor: &ActionDescriptor,
    ) -> Result<Vec<Effect>, PageError> {
        let action = descriptor.action;
        let (form, fields) = {
            let doc = ctx.document();
            let form = required_element(&doc, "contactForm")?;
            (form, form_fields(&doc, form)?)
        };
        let field = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };
        let (Some(name), Some(phone)) = (field("name"), field("phone")) else {
            return Err(failed(action, CONTACT_INCOMPLETE));
        };

        let trademark_id = descriptor
            .get("trademark-id")
            .map(str::to_string)
            .or_else(|| ctx.params().trademark_id.clone());
        let body = json!({
            "trademarkId": trademark_id,
            "name": name,
            "phone": phone,
            "message": field("message").unwrap_or_default(),
        });

        if !ctx
            .gateway()
            .request(ApiRequest::post_json(Endpoint::Contact, body))
            .await
            .is_live()
        {
            return Err(failed(action, CONTACT_FAILED));
        }
        reset_form(&mut ctx.document_mut(), form)?;
        ctx.notify(CONTACT_SENT, Severity::Success);
        Ok(Vec::new())
    }
}

/// Export the current result set
#[derive(Debug)]
pub struct ExportHandler;

#[async_trait(?Send)]
impl ActionHandler for ExportHandler {
    async fn handle(
        &self,
        ctx: &PageContext,
        descriptor: &ActionDescriptor,
    ) -> Result<Vec<Effect>, PageError> {
        let query = descriptor
            .get("query")
            .map(str::to_string)
            .or_else(|| ctx.params().query.clone())
            .or_else(|| ctx.search_input_value());

        let mut request = ApiRequest::get(Endpoint::Export);
        if let Some(query) = query {
            request = request.query("q", query);
        }
        // The page snapshot is not an export
        match ctx.gateway().request(request).await {
            Outcome::Live(payload) => {
                ctx.notify(EXPORT_STARTED, Severity::Success);
                Ok(vec![Effect::Download { payload }])
            }
            _ => Err(failed(descriptor.action, EXPORT_FAILED)),
        }
    }
}

// ============================================================================
// NAVIGATION AND SMALL WIDGETS
// ============================================================================

#[derive(Debug)]
pub enum NavigateHandler {
    /// Detail page of `data-trademark-id`
    Trademark,
    /// `data-image-url` in a new tab
    Image,
}

#[async_trait(?Send)]
impl ActionHandler for NavigateHandler {
    async fn handle(
        &self,
        ctx: &PageContext,
        descriptor: &ActionDescriptor,
    ) -> Result<Vec<Effect>, PageError> {
        let effect = match self {
            NavigateHandler::Trademark => {
                let id = descriptor.require("trademark-id")?;
                let pairs = [("id".to_string(), id.to_string())];
                Effect::Navigate {
                    url: format!("{}?{}", ctx.settings().pages.detail, query_string(&pairs)),
                    new_tab: false,
                }
            }
            NavigateHandler::Image => Effect::Navigate {
                url: descriptor.require("image-url")?.to_string(),
                new_tab: true,
            },
        };
        Ok(vec![effect])
    }
}

#[derive(Debug)]
pub struct CopyHandler;

#[async_trait(?Send)]
impl ActionHandler for CopyHandler {
    async fn handle(
        &self,
        ctx: &PageContext,
        descriptor: &ActionDescriptor,
    ) -> Result<Vec<Effect>, PageError> {
        let text = descriptor.require("copy-text")?.to_string();
        ctx.notify(COPIED, Severity::Success);
        Ok(vec![Effect::CopyToClipboard { text }])
    }
}

/// Fixed message, no request
#[derive(Debug)]
pub struct NoticeHandler {
    message: &'static str,
    severity: Severity,
}

impl NoticeHandler {
    pub fn new(message: &'static str, severity: Severity) -> Self {
        Self { message, severity }
    }
}

#[async_trait(?Send)]
impl ActionHandler for NoticeHandler {
    async fn handle(
        &self,
        ctx: &PageContext,
        _descriptor: &ActionDescriptor,
    ) -> Result<Vec<Effect>, PageError> {
        ctx.notify(self.message, self.severity);
        Ok(Vec::new())
    }
}

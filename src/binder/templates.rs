//! Collection templates
//!
//! One template per repeated structure on a page. Each renderer builds a
//! detached subtree from one array item, or returns `None` when the item
//! lacks the fields the row needs. All payload strings go in as text nodes
//! or attribute values, never as markup.

use serde::Serialize;
use serde_json::Value;

use crate::dom::{Document, NodeId};
use crate::path::scalar_text;

pub type RenderFn = fn(&mut Document, &Value) -> Option<NodeId>;

#[derive(Clone, Copy)]
pub struct CollectionTemplate {
    /// Binding marker value of the container element
    pub key: &'static str,
    /// Payload path of the source array
    pub source: &'static str,
    /// Text placed between rendered children
    pub separator: Option<&'static str>,
    pub render: RenderFn,
}

impl CollectionTemplate {
    /// Replace the container's children with one child per renderable item.
    pub fn render_into(&self, doc: &mut Document, container: NodeId, items: &[Value]) -> usize {
        doc.clear_children(container);
        let mut rendered = 0;
        for item in items {
            let Some(child) = (self.render)(doc, item) else {
                continue;
            };
            if rendered > 0 {
                if let Some(separator) = self.separator {
                    doc.append_text(container, separator);
                }
            }
            doc.append_child(container, child);
            rendered += 1;
        }
        rendered
    }
}

impl std::fmt::Debug for CollectionTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionTemplate")
            .field("key", &self.key)
            .field("source", &self.source)
            .finish()
    }
}

// ============================================================================
// PAGE TEMPLATE SETS
// ============================================================================

pub fn home_templates() -> Vec<CollectionTemplate> {
    vec![
        CollectionTemplate {
            key: "info-links",
            source: "infoLinks",
            separator: None,
            render: render_info_link,
        },
        CollectionTemplate {
            key: "faq-links",
            source: "faqLinks",
            separator: None,
            render: render_faq_link,
        },
        CollectionTemplate {
            key: "footer-links",
            source: "footerLinks",
            separator: Some(" | "),
            render: render_footer_link,
        },
    ]
}

pub fn search_templates() -> Vec<CollectionTemplate> {
    vec![CollectionTemplate {
        key: "results",
        source: "results",
        separator: None,
        render: render_result_row,
    }]
}

pub fn detail_templates() -> Vec<CollectionTemplate> {
    vec![
        CollectionTemplate {
            key: "classes",
            source: "classes",
            separator: None,
            render: render_class_item,
        },
        CollectionTemplate {
            key: "owners",
            source: "owners",
            separator: None,
            render: render_owner_item,
        },
    ]
}

// ============================================================================
// STATUS BADGES
// ============================================================================

/// Visual class of a trademark's legal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusClass {
    Active,
    Pending,
    Rejected,
    Expired,
    Unknown,
}

impl StatusClass {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "cấp bằng" | "đã cấp bằng" | "granted" | "active" | "registered" => StatusClass::Active,
            "đang giải quyết" | "đang xử lý" | "đang thẩm định" | "pending" => StatusClass::Pending,
            "từ chối" | "bị từ chối" | "rejected" | "refused" => StatusClass::Rejected,
            "hết hạn" | "hết hiệu lực" | "expired" => StatusClass::Expired,
            _ => StatusClass::Unknown,
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            StatusClass::Active => "status-active",
            StatusClass::Pending => "status-pending",
            StatusClass::Rejected => "status-rejected",
            StatusClass::Expired => "status-expired",
            StatusClass::Unknown => "status-unknown",
        }
    }
}

// ============================================================================
// RENDERERS
// ============================================================================

fn field(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(scalar_text)
        .filter(|s| !s.trim().is_empty())
}

fn element(doc: &mut Document, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
    let node = doc.create_element(tag);
    for (name, value) in attrs {
        doc.set_attr(node, name, value);
    }
    node
}

fn element_with_text(doc: &mut Document, tag: &str, attrs: &[(&str, &str)], text: &str) -> NodeId {
    let node = element(doc, tag, attrs);
    doc.set_text_content(node, text);
    node
}

fn cell(doc: &mut Document, row: NodeId, class: &str, text: Option<&str>) -> NodeId {
    let td = element(doc, "td", &[("class", class)]);
    if let Some(text) = text {
        doc.set_text_content(td, text);
    }
    doc.append_child(row, td);
    td
}

fn linked_list_item(doc: &mut Document, item: &Value, action: &str, data_key: &str) -> Option<NodeId> {
    let title = field(item, "title")?;
    let li = doc.create_element("li");
    let data_attr = format!("data-{data_key}");
    let reference = field(item, data_key).unwrap_or_default();
    let a = element_with_text(
        doc,
        "a",
        &[("href", "#"), ("data-action", action), (data_attr.as_str(), reference.as_str())],
        &title,
    );
    doc.append_child(li, a);
    Some(li)
}

fn render_info_link(doc: &mut Document, item: &Value) -> Option<NodeId> {
    linked_list_item(doc, item, "view-article", "article")
}

fn render_faq_link(doc: &mut Document, item: &Value) -> Option<NodeId> {
    linked_list_item(doc, item, "view-faq", "faq")
}

fn render_footer_link(doc: &mut Document, item: &Value) -> Option<NodeId> {
    let title = field(item, "title")?;
    let a = element_with_text(doc, "a", &[("href", "#")], &title);
    if let Some(action) = field(item, "action") {
        doc.set_attr(a, "data-action", &action);
    }
    Some(a)
}

fn render_result_row(doc: &mut Document, item: &Value) -> Option<NodeId> {
    let id = field(item, "trademarkId")?;
    let name = field(item, "trademarkName").unwrap_or_default();
    let status = field(item, "status").unwrap_or_default();

    let row = element(doc, "tr", &[("class", "result-row"), ("data-trademark-id", id.as_str())]);

    let logo_cell = cell(doc, row, "col-logo", None);
    if let Some(logo) = field(item, "logoUrl") {
        let img = element(
            doc,
            "img",
            &[
                ("class", "result-logo"),
                ("src", logo.as_str()),
                ("alt", name.as_str()),
                ("data-action", "open-image"),
                ("data-image-url", logo.as_str()),
            ],
        );
        doc.append_child(logo_cell, img);
    }

    let name_cell = cell(doc, row, "col-name", None);
    let link = element_with_text(
        doc,
        "a",
        &[
            ("href", "#"),
            ("data-action", "view-trademark"),
            ("data-trademark-id", id.as_str()),
        ],
        &name,
    );
    doc.append_child(name_cell, link);

    cell(doc, row, "col-number", field(item, "applicationNumber").as_deref());
    cell(doc, row, "col-owner", field(item, "owner").as_deref());
    cell(doc, row, "col-date", field(item, "applicationDate").as_deref());

    let status_cell = cell(doc, row, "col-status", None);
    let badge_class = format!("status {}", StatusClass::from_label(&status).css_class());
    let badge = element_with_text(doc, "span", &[("class", badge_class.as_str())], &status);
    doc.append_child(status_cell, badge);

    let actions_cell = cell(doc, row, "col-actions", None);
    for (action, class, label) in [
        ("bookmark", "bookmark-btn", "Lưu"),
        ("track", "track-btn", "Theo dõi"),
    ] {
        let button = element_with_text(
            doc,
            "button",
            &[
                ("type", "button"),
                ("class", class),
                ("data-action", action),
                ("data-trademark-id", id.as_str()),
            ],
            label,
        );
        doc.append_child(actions_cell, button);
    }

    Some(row)
}

fn render_class_item(doc: &mut Document, item: &Value) -> Option<NodeId> {
    let code = field(item, "code")?;
    let li = element(doc, "li", &[("class", "nice-class"), ("data-class-code", code.as_str())]);
    let code_el = element_with_text(doc, "strong", &[("class", "class-code")], &code);
    doc.append_child(li, code_el);
    if let Some(description) = field(item, "description") {
        let desc = element_with_text(doc, "span", &[("class", "class-description")], &description);
        doc.append_child(li, desc);
    }
    Some(li)
}

fn render_owner_item(doc: &mut Document, item: &Value) -> Option<NodeId> {
    let name = field(item, "name")?;
    let li = element(doc, "li", &[("class", "owner")]);
    let name_el = element_with_text(doc, "span", &[("class", "owner-name")], &name);
    doc.append_child(li, name_el);
    if let Some(address) = field(item, "address") {
        let addr = element_with_text(doc, "span", &[("class", "owner-address")], &address);
        doc.append_child(li, addr);
    }
    Some(li)
}

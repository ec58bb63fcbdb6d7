//! Data Binder
//!
//! Writes payload values into elements tagged with `data-bind`.
//!
//! Two passes per [`Binder::bind`] call:
//!
//! 1. Scalar pass: every tagged element in scope (containers excluded)
//!    resolves its dotted path; a hit is written by element role, a miss
//!    leaves the element untouched.
//! 2. Collection pass: every container whose marker names a registered
//!    [`CollectionTemplate`] is rebuilt from its source array.
//!
//! Both passes are idempotent: the same payload gives the same DOM.

mod templates;

pub use templates::{
    detail_templates, home_templates, search_templates, CollectionTemplate, RenderFn, StatusClass,
};

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::dom::{Document, NodeId};
use crate::path;

/// Binding marker attribute
pub const BIND_ATTR: &str = "data-bind";

/// How an element receives a bound value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRole {
    /// `<img>`: value becomes `src`
    Image,
    /// `<a>`: value becomes visible text, `href` untouched
    Hyperlink,
    /// Anything else: value becomes text content
    Text,
}

impl ElementRole {
    pub fn of(doc: &Document, element: NodeId) -> Self {
        match doc.tag(element) {
            Some("img") => ElementRole::Image,
            Some("a") => ElementRole::Hyperlink,
            _ => ElementRole::Text,
        }
    }
}

/// Counts from one bind pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BindReport {
    /// Scalar elements written
    pub written: usize,
    /// Paths that did not resolve to something displayable
    pub gaps: usize,
    /// Containers rebuilt
    pub collections: usize,
    /// Children rendered across all containers
    pub rows: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Binder {
    collections: Vec<CollectionTemplate>,
}

impl Binder {
    pub fn new(collections: Vec<CollectionTemplate>) -> Self {
        Self { collections }
    }

    pub fn collections(&self) -> &[CollectionTemplate] {
        &self.collections
    }

    fn is_container_key(&self, key: &str) -> bool {
        self.collections.iter().any(|t| t.key == key)
    }

    /// Bind `payload` into `scope` (inclusive).
    pub fn bind(&self, doc: &mut Document, scope: NodeId, payload: &Value) -> BindReport {
        let mut report = BindReport::default();

        let tagged: Vec<NodeId> = std::iter::once(scope)
            .chain(doc.descendants(scope))
            .filter(|n| doc.has_attr(*n, BIND_ATTR))
            .collect();

        // Scalar pass
        for element in &tagged {
            let element = *element;
            // A previous write in this pass may have replaced an ancestor's children
            if !doc.contains(scope, element) {
                continue;
            }
            let Some(key) = doc.attr(element, BIND_ATTR).map(str::to_string) else {
                continue;
            };
            if self.is_container_key(&key) {
                continue;
            }

            let text = match path::resolve(payload, &key) {
                Ok(Some(value)) => path::scalar_text(value),
                Ok(None) => None,
                Err(e) => {
                    debug!(path = %key, error = %e, "skipping malformed binding path");
                    None
                }
            };
            match text {
                Some(text) => {
                    write_value(doc, element, &text);
                    report.written += 1;
                }
                None => {
                    trace!(path = %key, "binding gap");
                    report.gaps += 1;
                }
            }
        }

        // Collection pass
        for template in &self.collections {
            let containers: Vec<NodeId> = tagged
                .iter()
                .copied()
                .filter(|n| doc.contains(scope, *n) && doc.attr(*n, BIND_ATTR) == Some(template.key))
                .collect();
            if containers.is_empty() {
                continue;
            }

            let items = match path::resolve(payload, template.source) {
                Ok(Some(Value::Array(items))) => items,
                _ => {
                    trace!(source = template.source, "collection source absent");
                    report.gaps += 1;
                    continue;
                }
            };

            for container in containers {
                report.rows += template.render_into(doc, container, items);
                report.collections += 1;
            }
        }

        debug!(
            written = report.written,
            gaps = report.gaps,
            rows = report.rows,
            "bind pass complete"
        );
        report
    }
}

fn write_value(doc: &mut Document, element: NodeId, text: &str) {
    match ElementRole::of(doc, element) {
        ElementRole::Image => doc.set_attr(element, "src", text),
        ElementRole::Hyperlink | ElementRole::Text => doc.set_text_content(element, text),
    }
}

// ============================================================================
// BIND SEQUENCING
// ============================================================================

/// Issued before a gateway call whose result will be bound into `scope`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindTicket {
    pub scope: NodeId,
    pub seq: u64,
}

/// Last-issued-wins ordering of binds per scope.
///
/// A result only binds if no newer ticket was issued for its scope while it
/// was in flight, so a slow stale response cannot overwrite a newer one.
#[derive(Debug, Default)]
pub struct BindSequencer {
    next: Cell<u64>,
    latest: RefCell<HashMap<NodeId, u64>>,
}

impl BindSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, scope: NodeId) -> BindTicket {
        let seq = self.next.get() + 1;
        self.next.set(seq);
        self.latest.borrow_mut().insert(scope, seq);
        BindTicket { scope, seq }
    }

    pub fn is_current(&self, ticket: BindTicket) -> bool {
        self.latest.borrow().get(&ticket.scope) == Some(&ticket.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const HOME: &str = r##"<html><body>
<h1 data-bind="hero.title">Old title</h1>
<img data-bind="hero.image" src="placeholder.png" alt="hero">
<a href="/guide" data-bind="hero.guideLabel">Old label</a>
<span data-bind="stats.count">?</span>
<span data-bind="hero.missing.deep">keep me</span>
<ul data-bind="info-links"><li>stale</li></ul>
<div data-bind="footer-links"></div>
</body></html>"##;

    fn home_binder() -> Binder {
        Binder::new(home_templates())
    }

    fn payload() -> Value {
        json!({
            "hero": {"title": "Tra cứu nhãn hiệu", "image": "/img/hero.png", "guideLabel": "Hướng dẫn"},
            "stats": {"count": 1200},
            "infoLinks": [
                {"title": "Bài viết 1", "article": "a1"},
                {"title": "Bài viết 2", "article": "a2"}
            ],
            "footerLinks": [{"title": "Liên hệ", "action": "view-partnership"}]
        })
    }

    #[test]
    fn writes_by_role() {
        let mut doc = Document::parse(HOME);
        let root = doc.root();
        let report = home_binder().bind(&mut doc, root, &payload());

        let h1 = doc.query("h1").unwrap().unwrap();
        assert_eq!(doc.text_content(h1), "Tra cứu nhãn hiệu");

        let img = doc.query("img").unwrap().unwrap();
        assert_eq!(doc.attr(img, "src"), Some("/img/hero.png"));
        assert!(doc.children(img).is_empty());

        let a = doc.query("a[href=\"/guide\"]").unwrap().unwrap();
        assert_eq!(doc.text_content(a), "Hướng dẫn");
        assert_eq!(doc.attr(a, "href"), Some("/guide"));

        let count = doc.query("[data-bind=\"stats.count\"]").unwrap().unwrap();
        assert_eq!(doc.text_content(count), "1200");

        assert_eq!(report.written, 4);
        assert_eq!(report.gaps, 1);
    }

    #[test]
    fn missing_intermediate_leaves_content_unchanged() {
        let mut doc = Document::parse(HOME);
        let root = doc.root();
        home_binder().bind(&mut doc, root, &json!({"hero": {}}));

        let deep = doc.query("[data-bind=\"hero.missing.deep\"]").unwrap().unwrap();
        assert_eq!(doc.text_content(deep), "keep me");
        let h1 = doc.query("h1").unwrap().unwrap();
        assert_eq!(doc.text_content(h1), "Old title");
        let ul = doc.query("ul").unwrap().unwrap();
        assert_eq!(doc.text_content(ul), "stale");
    }

    #[test]
    fn bind_is_idempotent() {
        let mut doc = Document::parse(HOME);
        let root = doc.root();
        let binder = home_binder();
        binder.bind(&mut doc, root, &payload());
        let first = doc.to_html();
        binder.bind(&mut doc, root, &payload());
        assert_eq!(doc.to_html(), first);
    }

    #[test]
    fn shorter_array_removes_stale_rows() {
        let mut doc = Document::parse(HOME);
        let root = doc.root();
        let binder = home_binder();
        binder.bind(&mut doc, root, &payload());
        let ul = doc.query("ul").unwrap().unwrap();
        assert_eq!(doc.child_elements(ul).len(), 2);

        binder.bind(
            &mut doc,
            root,
            &json!({"infoLinks": [{"title": "Chỉ một", "article": "a9"}]}),
        );
        assert_eq!(doc.child_elements(ul).len(), 1);
        assert_eq!(doc.text_content(ul), "Chỉ một");

        binder.bind(&mut doc, root, &json!({"infoLinks": []}));
        assert!(doc.children(ul).is_empty());
    }

    #[test]
    fn container_is_not_written_as_scalar() {
        let mut doc = Document::parse(r#"<html><body><ul data-bind="results"><li>x</li></ul></body></html>"#);
        let root = doc.root();
        // "results" resolves to a string here, but the key is a container
        Binder::new(search_templates()).bind(&mut doc, root, &json!({"results": "oops"}));
        let ul = doc.query("ul").unwrap().unwrap();
        assert_eq!(doc.text_content(ul), "x");
    }

    #[test]
    fn composite_values_are_gaps() {
        let mut doc = Document::parse(r#"<html><body><p data-bind="hero">keep</p></body></html>"#);
        let root = doc.root();
        let report = Binder::default().bind(&mut doc, root, &json!({"hero": {"title": "x"}}));
        let p = doc.query("p").unwrap().unwrap();
        assert_eq!(doc.text_content(p), "keep");
        assert_eq!(report.gaps, 1);
    }

    #[test]
    fn scope_limits_the_pass() {
        let mut doc = Document::parse(
            r#"<html><body><section id="a"><p data-bind="title">A</p></section>
            <section id="b"><p data-bind="title">B</p></section></body></html>"#,
        );
        let scope = doc.element_by_id("b").unwrap();
        Binder::default().bind(&mut doc, scope, &json!({"title": "new"}));
        let a = doc.query("#a p").unwrap().unwrap();
        let b = doc.query("#b p").unwrap().unwrap();
        assert_eq!(doc.text_content(a), "A");
        assert_eq!(doc.text_content(b), "new");
    }

    #[test]
    fn search_scenario_renders_one_active_row() {
        let mut doc = Document::parse(
            r#"<html><body><div id="search-results" data-scope="results">
            <span data-bind="totalResults">0</span>
            <table><tbody data-bind="results"></tbody></table></div></body></html>"#,
        );
        let scope = doc.element_by_id("search-results").unwrap();
        let payload = json!({
            "totalResults": 3,
            "results": [{"trademarkId": "T1", "trademarkName": "Honda", "status": "Cấp bằng"}]
        });
        let report = Binder::new(search_templates()).bind(&mut doc, scope, &payload);

        let rows = doc.query_all(".result-row").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(doc.attr(rows[0], "data-trademark-id"), Some("T1"));
        let badge = doc.query_within(rows[0], ".status").unwrap().unwrap();
        assert!(doc.has_class(badge, "status-active"));
        let total = doc.query("[data-bind=\"totalResults\"]").unwrap().unwrap();
        assert_eq!(doc.text_content(total), "3");
        assert_eq!(report.rows, 1);
    }

    #[test]
    fn sequencer_keeps_only_latest_ticket_current() {
        let doc = Document::new();
        let scope = doc.root();
        let seq = BindSequencer::new();
        let first = seq.issue(scope);
        assert!(seq.is_current(first));
        let second = seq.issue(scope);
        assert!(!seq.is_current(first));
        assert!(seq.is_current(second));
    }
}

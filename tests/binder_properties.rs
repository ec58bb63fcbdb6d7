//! Property tests for data binding
//!
//! Arbitrary payloads must never panic the binder, binding must be
//! idempotent, and collections must always mirror the latest array.

use proptest::prelude::*;
use serde_json::{json, Value};
use trademark_pages::binder::search_templates;
use trademark_pages::{path, Binder, Document};

const PAGE: &str = r#"<html><body>
<div id="search-results">
  <strong data-bind="totalResults">0</strong>
  <span data-bind="query">...</span>
  <img data-bind="results[0].logoUrl" src="x.png">
  <table><tbody data-bind="results"></tbody></table>
</div>
</body></html>"#;

prop_compose! {
    fn arb_row()(
        id in "[A-Z][0-9]{1,4}",
        name in "[ -~]{0,20}",
        status in prop::sample::select(vec!["Cấp bằng", "Đang giải quyết", "Từ chối", "Hết hạn", "?"]),
    ) -> Value {
        json!({"trademarkId": id, "trademarkName": name, "status": status})
    }
}

prop_compose! {
    fn arb_payload()(
        rows in prop::collection::vec(arb_row(), 0..8),
        query in "[ -~]{0,16}",
    ) -> Value {
        json!({"query": query, "totalResults": rows.len(), "results": rows})
    }
}

/// Arbitrary JSON up to a small depth
fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[ -~]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-zA-Z]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn bound(payload: &Value) -> Document {
    let mut doc = Document::parse(PAGE);
    let scope = doc.element_by_id("search-results").unwrap();
    Binder::new(search_templates()).bind(&mut doc, scope, payload);
    doc
}

proptest! {
    /// Binding the same payload twice gives the same document
    #[test]
    fn binding_is_idempotent(payload in arb_payload()) {
        let mut doc = bound(&payload);
        let once = doc.to_html();
        let scope = doc.element_by_id("search-results").unwrap();
        Binder::new(search_templates()).bind(&mut doc, scope, &payload);
        prop_assert_eq!(once, doc.to_html());
    }

    /// Rows always mirror the latest array, shrinking included
    #[test]
    fn rows_follow_latest_array(first in arb_payload(), second in arb_payload()) {
        let mut doc = bound(&first);
        let scope = doc.element_by_id("search-results").unwrap();
        let report = Binder::new(search_templates()).bind(&mut doc, scope, &second);

        let expected = second["results"].as_array().map_or(0, Vec::len);
        prop_assert_eq!(report.rows, expected);
        prop_assert_eq!(doc.query_all("tr.result-row").unwrap().len(), expected);
    }

    /// Whatever the server sends, binding completes and counts every marker
    #[test]
    fn arbitrary_payload_never_panics(payload in arb_json()) {
        let mut doc = Document::parse(PAGE);
        let scope = doc.element_by_id("search-results").unwrap();
        let report = Binder::new(search_templates()).bind(&mut doc, scope, &payload);
        // Three scalar markers; each is either written or a gap
        prop_assert_eq!(report.written + report.gaps, 3 + usize::from(!payload["results"].is_array()));
    }

    /// Path parsing never panics and resolution is total
    #[test]
    fn path_resolution_is_total(path_text in "[a-z\\[\\]0-9.]{0,16}", payload in arb_json()) {
        let _ = path::resolve(&payload, &path_text);
    }
}

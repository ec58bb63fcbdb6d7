//! Dotted binding paths
//!
//! Supports:
//! - `a.b.c` (field lookup)
//! - `items.0.name` and `items[0].name` (array index)
//! - `$.a.b` (optional root prefix)
//!
//! Resolution short-circuits to `None` on the first missing segment.

use serde_json::Value;

use crate::error::PageError;

/// A parsed path segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object field access: .field
    Field(String),
    /// Array index access: [0] or .0
    Index(usize),
}

/// Parse a dotted path into segments
///
/// - `"hero.title"` → `[Field("hero"), Field("title")]`
/// - `"results[0].status"` → `[Field("results"), Index(0), Field("status")]`
pub fn parse(path: &str) -> Result<Vec<Segment>, PageError> {
    let trimmed = path.trim();
    let body = if let Some(rest) = trimmed.strip_prefix("$.") {
        rest
    } else if trimmed == "$" {
        return Ok(vec![]);
    } else {
        trimmed
    };

    if body.is_empty() {
        return Ok(vec![]);
    }

    let invalid = || PageError::InvalidPath {
        path: path.to_string(),
    };

    let mut segments = Vec::new();
    for part in body.split('.') {
        if part.is_empty() {
            return Err(invalid());
        }

        if let Some(bracket) = part.find('[') {
            let field = &part[..bracket];
            if !field.is_empty() {
                segments.push(Segment::Field(field.to_string()));
            }
            if !part.ends_with(']') {
                return Err(invalid());
            }
            let index = part[bracket + 1..part.len() - 1]
                .parse::<usize>()
                .map_err(|_| invalid())?;
            segments.push(Segment::Index(index));
        } else if let Ok(index) = part.parse::<usize>() {
            segments.push(Segment::Index(index));
        } else {
            segments.push(Segment::Field(part.to_string()));
        }
    }

    Ok(segments)
}

/// Walk `segments` from `value`, borrowing.
pub fn apply<'a>(value: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    segments.iter().try_fold(value, |current, segment| match segment {
        Segment::Field(name) => current.get(name.as_str()),
        Segment::Index(idx) => current.get(*idx),
    })
}

/// Parse and apply in one step
pub fn resolve<'a>(value: &'a Value, path: &str) -> Result<Option<&'a Value>, PageError> {
    let segments = parse(path)?;
    Ok(apply(value, &segments))
}

/// Text written into an element for a resolved scalar.
///
/// Returns `None` for arrays and objects: those are not displayable by a
/// scalar binding.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_simple_path() {
        assert_eq!(
            parse("hero.title").unwrap(),
            vec![
                Segment::Field("hero".to_string()),
                Segment::Field("title".to_string()),
            ]
        );
    }

    #[test]
    fn parse_root_prefix_and_indices() {
        assert_eq!(
            parse("$.results[0].status").unwrap(),
            vec![
                Segment::Field("results".to_string()),
                Segment::Index(0),
                Segment::Field("status".to_string()),
            ]
        );
        assert_eq!(
            parse("results.1").unwrap(),
            vec![Segment::Field("results".to_string()), Segment::Index(1)]
        );
    }

    #[test]
    fn parse_rejects_empty_segment() {
        assert!(matches!(parse("a..b"), Err(PageError::InvalidPath { .. })));
        assert!(matches!(parse("a[x]"), Err(PageError::InvalidPath { .. })));
    }

    #[test]
    fn resolve_missing_intermediate_is_none() {
        let data = json!({"hero": {"title": "Tra cứu nhãn hiệu"}});
        assert_eq!(resolve(&data, "hero.subtitle.text").unwrap(), None);
        assert_eq!(resolve(&data, "footer.copyright").unwrap(), None);
        assert_eq!(
            resolve(&data, "hero.title").unwrap(),
            Some(&json!("Tra cứu nhãn hiệu"))
        );
    }

    #[test]
    fn resolve_through_arrays() {
        let data = json!({"results": [{"trademarkName": "Honda"}]});
        assert_eq!(
            resolve(&data, "results.0.trademarkName").unwrap(),
            Some(&json!("Honda"))
        );
        assert_eq!(resolve(&data, "results.3.trademarkName").unwrap(), None);
    }

    #[test]
    fn scalar_text_formats() {
        assert_eq!(scalar_text(&json!(3)).as_deref(), Some("3"));
        assert_eq!(scalar_text(&json!(1.5)).as_deref(), Some("1.5"));
        assert_eq!(scalar_text(&json!(true)).as_deref(), Some("true"));
        assert_eq!(scalar_text(&Value::Null).as_deref(), Some(""));
        assert_eq!(scalar_text(&json!([1, 2])), None);
        assert_eq!(scalar_text(&json!({"a": 1})), None);
    }
}

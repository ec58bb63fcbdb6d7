//! Page document model
//!
//! An arena of nodes addressed by [`NodeId`]. Ids are never reused, so a
//! stale id can be checked with [`Document::is_attached`]. Removing a
//! subtree ([`Document::remove`], [`Document::clear_children`]) frees its
//! contents; the arena keeps one empty slot per id for the page's lifetime.
//!
//! The selector subset is deliberately small: compounds of `tag`, `#id`,
//! `.class`, `[attr]` and `[attr="value"]`, joined by the descendant
//! combinator (whitespace).

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::error::PageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Element(Element),
    Text(String),
    /// Slot of a removed node
    Removed,
}

#[derive(Debug, Clone)]
struct Element {
    tag: String,
    attrs: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    doctype: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Empty document (root only)
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
            root: NodeId(0),
            doctype: false,
        }
    }

    /// Parse an HTML page. Parsing is lenient and never fails.
    pub fn parse(html: &str) -> Self {
        let parsed = scraper::Html::parse_document(html);
        let mut doc = Self::new();

        let mut mapping = HashMap::new();
        mapping.insert(parsed.tree.root().id(), doc.root);

        for source in parsed.tree.root().descendants().skip(1) {
            let Some(parent) = source
                .parent()
                .and_then(|p| mapping.get(&p.id()).copied())
            else {
                continue;
            };
            match source.value() {
                scraper::Node::Element(element) => {
                    let attrs = element
                        .attrs()
                        .map(|(name, value)| (name.to_string(), value.to_string()))
                        .collect();
                    let id = doc.push(
                        Some(parent),
                        NodeKind::Element(Element {
                            tag: element.name().to_ascii_lowercase(),
                            attrs,
                        }),
                    );
                    mapping.insert(source.id(), id);
                }
                scraper::Node::Text(text) => {
                    doc.append_text(parent, &**text);
                }
                scraper::Node::Doctype(_) => doc.doctype = true,
                _ => {}
            }
        }

        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// `<body>` if present, otherwise the document root.
    pub fn body(&self) -> NodeId {
        self.descendants(self.root)
            .into_iter()
            .find(|id| self.tag(*id) == Some("body"))
            .unwrap_or(self.root)
    }

    fn push(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            kind,
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        id
    }

    // ─────────────────────────────────────────────────────────────
    // Tree structure
    // ─────────────────────────────────────────────────────────────

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(
            None,
            NodeKind::Element(Element {
                tag: tag.to_ascii_lowercase(),
                attrs: Vec::new(),
            }),
        )
    }

    /// Move `child` under `parent`, detaching it from any previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.push(Some(parent), NodeKind::Text(text.to_string()))
    }

    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != node);
        }
    }

    /// Drop every child subtree of `node`.
    pub fn clear_children(&mut self, node: NodeId) {
        let children = std::mem::take(&mut self.nodes[node.0].children);
        for child in children {
            self.release(child);
        }
    }

    /// Detach `node` and drop its subtree. Later calls with its id are no-ops.
    pub fn remove(&mut self, node: NodeId) {
        if node == self.root {
            return;
        }
        self.detach(node);
        self.release(node);
    }

    fn release(&mut self, node: NodeId) {
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let slot = &mut self.nodes[id.0];
            stack.append(&mut slot.children);
            slot.parent = None;
            slot.kind = NodeKind::Removed;
        }
    }

    /// Nodes still holding content, attached or not
    pub fn live_nodes(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| !matches!(n.kind, NodeKind::Removed))
            .count()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// Element children only
    pub fn child_elements(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .iter()
            .copied()
            .filter(|c| self.is_element(*c))
            .collect()
    }

    /// Whether `node` is `ancestor` or lies beneath it
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    pub fn is_attached(&self, node: NodeId) -> bool {
        let mut cursor = node;
        loop {
            if cursor == self.root {
                return true;
            }
            match self.parent(cursor) {
                Some(parent) => cursor = parent,
                None => return false,
            }
        }
    }

    /// Element descendants of `scope` in document order, excluding `scope`.
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if self.is_element(id) {
                out.push(id);
            }
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    // ─────────────────────────────────────────────────────────────
    // Elements and attributes
    // ─────────────────────────────────────────────────────────────

    fn element(&self, node: NodeId) -> Option<&Element> {
        match &self.nodes[node.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, node: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[node.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|e| e.tag.as_str())
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node)?
            .attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, node: NodeId, name: &str) -> bool {
        self.attr(node, name).is_some()
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        let Some(element) = self.element_mut(node) else {
            return;
        };
        match element.attrs.iter_mut().find(|(k, _)| k == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => element.attrs.push((name.to_string(), value.to_string())),
        }
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        if let Some(element) = self.element_mut(node) {
            element.attrs.retain(|(k, _)| k != name);
        }
    }

    /// `data-*` attributes with the prefix stripped
    pub fn data_attributes(&self, node: NodeId) -> BTreeMap<String, String> {
        self.element(node)
            .map(|e| {
                e.attrs
                    .iter()
                    .filter_map(|(k, v)| k.strip_prefix("data-").map(|s| (s.to_string(), v.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|n| self.attr(*n, "id") == Some(id))
    }

    /// Nearest inclusive ancestor carrying `name`
    pub fn closest_with_attribute(&self, node: NodeId, name: &str) -> Option<NodeId> {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if self.has_attr(current, name) {
                return Some(current);
            }
            cursor = self.parent(current);
        }
        None
    }

    // ─────────────────────────────────────────────────────────────
    // Classes and inline style
    // ─────────────────────────────────────────────────────────────

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .map(|c| c.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if self.has_class(node, class) {
            return;
        }
        let joined = match self.attr(node, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
            _ => class.to_string(),
        };
        self.set_attr(node, "class", &joined);
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        let Some(existing) = self.attr(node, "class") else {
            return;
        };
        let kept: Vec<&str> = existing.split_whitespace().filter(|c| *c != class).collect();
        let kept = kept.join(" ");
        self.set_attr(node, "class", &kept);
    }

    /// Returns whether the class is present afterwards
    pub fn toggle_class(&mut self, node: NodeId, class: &str) -> bool {
        if self.has_class(node, class) {
            self.remove_class(node, class);
            false
        } else {
            self.add_class(node, class);
            true
        }
    }

    pub fn style(&self, node: NodeId, property: &str) -> Option<String> {
        parse_style(self.attr(node, "style")?)
            .into_iter()
            .find(|(k, _)| k == property)
            .map(|(_, v)| v)
    }

    pub fn set_style(&mut self, node: NodeId, property: &str, value: &str) {
        let mut declarations = self.attr(node, "style").map(parse_style).unwrap_or_default();
        match declarations.iter_mut().find(|(k, _)| k == property) {
            Some((_, existing)) => *existing = value.to_string(),
            None => declarations.push((property.to_string(), value.to_string())),
        }
        let rendered = declarations
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("; ");
        self.set_attr(node, "style", &rendered);
    }

    // ─────────────────────────────────────────────────────────────
    // Text
    // ─────────────────────────────────────────────────────────────

    pub fn text_content(&self, node: NodeId) -> String {
        match &self.nodes[node.0].kind {
            NodeKind::Text(text) => text.clone(),
            NodeKind::Removed => String::new(),
            NodeKind::Document | NodeKind::Element(_) => self
                .children(node)
                .iter()
                .map(|c| self.text_content(*c))
                .collect(),
        }
    }

    /// Replace all children with a single text node. The value is never
    /// interpreted as markup.
    pub fn set_text_content(&mut self, node: NodeId, text: &str) {
        if !self.is_element(node) {
            return;
        }
        self.clear_children(node);
        if !text.is_empty() {
            self.append_text(node, text);
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Selectors
    // ─────────────────────────────────────────────────────────────

    pub fn query_all(&self, selector: &str) -> Result<Vec<NodeId>, PageError> {
        self.query_all_within(self.root, selector)
    }

    pub fn query_all_within(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>, PageError> {
        let compounds = parse_selector(selector)?;
        Ok(self
            .descendants(scope)
            .into_iter()
            .filter(|n| self.matches_chain(*n, &compounds))
            .collect())
    }

    pub fn query(&self, selector: &str) -> Result<Option<NodeId>, PageError> {
        Ok(self.query_all(selector)?.into_iter().next())
    }

    pub fn query_within(&self, scope: NodeId, selector: &str) -> Result<Option<NodeId>, PageError> {
        Ok(self.query_all_within(scope, selector)?.into_iter().next())
    }

    fn matches_chain(&self, node: NodeId, chain: &[Compound]) -> bool {
        let Some((last, ancestors)) = chain.split_last() else {
            return false;
        };
        if !self.matches_compound(node, last) {
            return false;
        }
        let mut remaining = ancestors;
        let mut cursor = self.parent(node);
        while let Some((wanted, rest)) = remaining.split_last() {
            let Some(current) = cursor else {
                return false;
            };
            if self.matches_compound(current, wanted) {
                remaining = rest;
            }
            cursor = self.parent(current);
        }
        true
    }

    fn matches_compound(&self, node: NodeId, compound: &Compound) -> bool {
        let Some(element) = self.element(node) else {
            return false;
        };
        if let Some(tag) = &compound.tag {
            if &element.tag != tag {
                return false;
            }
        }
        if let Some(id) = &compound.id {
            if self.attr(node, "id") != Some(id.as_str()) {
                return false;
            }
        }
        if !compound.classes.iter().all(|c| self.has_class(node, c)) {
            return false;
        }
        compound.attrs.iter().all(|(name, value)| match value {
            Some(value) => self.attr(node, name) == Some(value.as_str()),
            None => self.has_attr(node, name),
        })
    }

    // ─────────────────────────────────────────────────────────────
    // Serialization
    // ─────────────────────────────────────────────────────────────

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        if self.doctype {
            out.push_str("<!DOCTYPE html>");
        }
        for child in self.children(self.root) {
            self.write_node(&mut out, *child, false);
        }
        out
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_node(&mut out, node, false);
        out
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        let raw = self
            .tag(node)
            .map(|t| RAW_TEXT_ELEMENTS.contains(&t))
            .unwrap_or(false);
        let mut out = String::new();
        for child in self.children(node) {
            self.write_node(&mut out, *child, raw);
        }
        out
    }

    fn write_node(&self, out: &mut String, node: NodeId, raw: bool) {
        match &self.nodes[node.0].kind {
            NodeKind::Document => {
                for child in self.children(node) {
                    self.write_node(out, *child, raw);
                }
            }
            NodeKind::Text(text) if raw => out.push_str(text),
            NodeKind::Text(text) => escape_text(out, text),
            NodeKind::Removed => {}
            NodeKind::Element(element) => {
                out.push('<');
                out.push_str(&element.tag);
                for (name, value) in &element.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_attr(out, value);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&element.tag.as_str()) {
                    return;
                }
                let raw_child = RAW_TEXT_ELEMENTS.contains(&element.tag.as_str());
                for child in self.children(node) {
                    self.write_node(out, *child, raw_child);
                }
                out.push_str("</");
                out.push_str(&element.tag);
                out.push('>');
            }
        }
    }
}

fn escape_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (k, v) = decl.split_once(':')?;
            let k = k.trim();
            (!k.is_empty()).then(|| (k.to_string(), v.trim().to_string()))
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

fn parse_selector(selector: &str) -> Result<Vec<Compound>, PageError> {
    let unsupported = || PageError::UnsupportedSelector {
        selector: selector.to_string(),
    };

    // Split on whitespace outside of brackets
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_brackets = false;
    for ch in selector.chars() {
        match ch {
            '[' => {
                in_brackets = true;
                current.push(ch);
            }
            ']' => {
                in_brackets = false;
                current.push(ch);
            }
            c if c.is_whitespace() && !in_brackets => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if in_brackets {
        return Err(unsupported());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    if tokens.is_empty() {
        return Err(unsupported());
    }

    tokens
        .iter()
        .map(|token| parse_compound(token).ok_or_else(unsupported))
        .collect()
}

fn parse_compound(token: &str) -> Option<Compound> {
    let is_ident = |c: char| c.is_alphanumeric() || c == '-' || c == '_';
    let mut compound = Compound::default();
    let mut rest = token;

    let tag_len = rest.find(|c: char| !is_ident(c)).unwrap_or(rest.len());
    if tag_len > 0 {
        compound.tag = Some(rest[..tag_len].to_ascii_lowercase());
        rest = &rest[tag_len..];
    } else if let Some(after) = rest.strip_prefix('*') {
        rest = after;
    }

    while let Some(marker) = rest.chars().next() {
        rest = &rest[marker.len_utf8()..];
        match marker {
            '#' | '.' => {
                let len = rest.find(|c: char| !is_ident(c)).unwrap_or(rest.len());
                if len == 0 {
                    return None;
                }
                let name = rest[..len].to_string();
                if marker == '#' {
                    compound.id = Some(name);
                } else {
                    compound.classes.push(name);
                }
                rest = &rest[len..];
            }
            '[' => {
                let end = rest.find(']')?;
                let inner = &rest[..end];
                rest = &rest[end + 1..];
                let (name, value) = match inner.split_once('=') {
                    Some((name, value)) => {
                        let value = value.trim();
                        let unquoted = value
                            .strip_prefix('"')
                            .and_then(|v| v.strip_suffix('"'))
                            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                            .unwrap_or(value);
                        (name.trim(), Some(unquoted.to_string()))
                    }
                    None => (inner.trim(), None),
                };
                if name.is_empty() {
                    return None;
                }
                compound.attrs.push((name.to_string(), value));
            }
            _ => return None,
        }
    }

    Some(compound)
}

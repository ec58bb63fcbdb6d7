//! Ephemeral UI feedback
//!
//! Transient notifications and the login gate. Both only write to the
//! document; nothing the core does depends on their result.

use std::cell::RefCell;
use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::dom::{Document, NodeId};
use crate::event_log::{EventKind, EventLog};

/// Id of the modal created on demand
pub const LOGIN_MODAL_ID: &str = "loginModal";
/// Id of a login popup already present in the page markup
pub const LOGIN_POPUP_ID: &str = "loginPopup";

const LOGIN_PROMPT_TITLE: &str = "Đăng nhập để sử dụng tính năng này";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Feedback {
    /// Show a message that disappears on its own
    fn notify(&self, doc: &mut Document, message: &str, severity: Severity);

    /// Show the login gate. Repeated calls show one gate.
    fn prompt_login(&self, doc: &mut Document);

    fn dismiss_login(&self, doc: &mut Document);

    /// Remove notifications whose time is up; returns how many went away.
    fn sweep(&self, doc: &mut Document, now: Instant) -> usize;
}

/// Feedback rendered into the page itself
pub struct DomFeedback {
    duration: Duration,
    visible: RefCell<Vec<(NodeId, Instant)>>,
    events: EventLog,
}

impl DomFeedback {
    pub fn new(duration: Duration, events: EventLog) -> Self {
        Self {
            duration,
            visible: RefCell::new(Vec::new()),
            events,
        }
    }

    /// Notifications still on screen
    pub fn visible_count(&self) -> usize {
        self.visible.borrow().len()
    }

    fn build_modal(doc: &mut Document) -> NodeId {
        let modal = doc.create_element("div");
        doc.set_attr(modal, "id", LOGIN_MODAL_ID);
        doc.set_attr(modal, "class", "login-modal");
        doc.set_attr(modal, "role", "dialog");

        let panel = doc.create_element("div");
        doc.set_attr(panel, "class", "login-modal-content");
        doc.append_child(modal, panel);

        let title = doc.create_element("h2");
        doc.set_text_content(title, LOGIN_PROMPT_TITLE);
        doc.append_child(panel, title);

        for (action, label) in [("go-to-login", "Đăng nhập"), ("close-login", "Đóng")] {
            let button = doc.create_element("button");
            doc.set_attr(button, "type", "button");
            doc.set_attr(button, "data-action", action);
            doc.set_text_content(button, label);
            doc.append_child(panel, button);
        }
        modal
    }
}

impl Feedback for DomFeedback {
    fn notify(&self, doc: &mut Document, message: &str, severity: Severity) {
        let node = doc.create_element("div");
        doc.set_attr(node, "class", &format!("notification notification-{severity}"));
        doc.set_attr(node, "role", "status");
        doc.set_text_content(node, message);
        let body = doc.body();
        doc.append_child(body, node);

        self.visible
            .borrow_mut()
            .push((node, Instant::now() + self.duration));
        debug!(%severity, message, "notification shown");
        self.events.emit(EventKind::Notified {
            severity: severity.as_str().to_string(),
            message: message.to_string(),
        });
    }

    fn prompt_login(&self, doc: &mut Document) {
        // Search and detail pages ship their own popup
        if let Some(popup) = doc.element_by_id(LOGIN_POPUP_ID) {
            doc.set_style(popup, "display", "flex");
        } else if doc.element_by_id(LOGIN_MODAL_ID).is_none() {
            let modal = Self::build_modal(doc);
            let body = doc.body();
            doc.append_child(body, modal);
        }
        self.events.emit(EventKind::LoginPrompted);
    }

    fn dismiss_login(&self, doc: &mut Document) {
        if let Some(popup) = doc.element_by_id(LOGIN_POPUP_ID) {
            doc.set_style(popup, "display", "none");
        }
        if let Some(modal) = doc.element_by_id(LOGIN_MODAL_ID) {
            doc.remove(modal);
        }
    }

    fn sweep(&self, doc: &mut Document, now: Instant) -> usize {
        let mut visible = self.visible.borrow_mut();
        let before = visible.len();
        visible.retain(|(node, expires)| {
            if *expires <= now {
                doc.remove(*node);
                false
            } else {
                true
            }
        });
        before - visible.len()
    }
}

impl fmt::Debug for DomFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomFeedback")
            .field("duration", &self.duration)
            .field("visible", &self.visible_count())
            .finish()
    }
}

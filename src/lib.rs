//! Trademark Pages - page logic for a trademark search site
//!
//! Loads page configuration, fetches data with a fallback snapshot, binds it
//! into `data-bind` markers, and routes `data-action` clicks to handlers.

pub mod action;
pub mod binder;
pub mod config;
pub mod dispatch;
pub mod dom;
pub mod error;
pub mod event_log;
pub mod feedback;
pub mod gateway;
pub mod handlers;
pub mod page;
pub mod path;
pub mod upload;

pub use action::{Action, ActionDescriptor};
pub use binder::{BindReport, BindSequencer, BindTicket, Binder, ElementRole, StatusClass};
pub use config::{Configuration, Endpoint, PageLinks, Settings};
pub use dispatch::{
    ActionHandler, ActionState, AuditFinding, AuditIssue, DispatchOutcome, Dispatcher, Effect,
};
pub use dom::{Document, NodeId};
pub use error::{FixSuggestion, PageError};
pub use event_log::{Event, EventKind, EventLog};
pub use feedback::{DomFeedback, Feedback, Severity};
pub use gateway::{
    ApiRequest, Failure, FailureKind, Gateway, HttpTransport, Method, MockResponse, MockTransport,
    Outcome, Transport,
};
pub use page::{KeyPress, LoadReport, Page, PageContext, PageKind, PageParams};
pub use upload::{ImageRules, ImageUpload};

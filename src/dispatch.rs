//! Action Dispatcher
//!
//! Delegated click handling: a click anywhere resolves to the nearest
//! `data-action` ancestor, which is parsed into an [`Action`] and routed to
//! its registered [`ActionHandler`].
//!
//! ## Per-trigger state
//!
//! ```text
//! Idle ──▶ Pending ──▶ Succeeded
//!             │
//!             └──────▶ Failed
//! ```
//!
//! A trigger whose flight key is already `Pending` is suppressed rather than
//! run twice. The key covers the trigger's data attributes and whatever the
//! handler reads from the page ([`ActionHandler::page_params`]). Only the
//! last settled state of each action is kept. Handler errors end here: they
//! become feedback, never a panic or an error returned to the host.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::action::{Action, ActionDescriptor, ACTION_ATTR};
use crate::dom::{Document, NodeId};
use crate::error::PageError;
use crate::event_log::EventKind;
use crate::feedback::Severity;
use crate::page::PageContext;

/// Side effects the page cannot perform itself; the host carries them out.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    Navigate { url: String, new_tab: bool },
    OpenFilePicker { input_id: String },
    CopyToClipboard { text: String },
    Download { payload: Value },
    Focus { selector: String },
}

#[async_trait(?Send)]
pub trait ActionHandler {
    async fn handle(
        &self,
        ctx: &PageContext,
        descriptor: &ActionDescriptor,
    ) -> Result<Vec<Effect>, PageError>;

    /// Parameters the handler will read from the page rather than from the
    /// trigger, such as the search box. Part of the flight key.
    fn page_params(
        &self,
        _ctx: &PageContext,
        _descriptor: &ActionDescriptor,
    ) -> Vec<(String, String)> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionState {
    #[default]
    Idle,
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Nothing on the click path declares an action
    NoAction,
    /// Unknown name, or an action this page does not handle
    Ignored { name: String },
    /// Same trigger already in flight
    Suppressed { action: Action },
    Completed { action: Action, effects: Vec<Effect> },
    /// The handler failed; the visitor has been told
    Failed { action: Action, reason: String },
}

impl DispatchOutcome {
    pub fn effects(&self) -> &[Effect] {
        match self {
            DispatchOutcome::Completed { effects, .. } => effects,
            _ => &[],
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, DispatchOutcome::Completed { .. })
    }
}

// ============================================================================
// AUDIT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditIssue {
    /// Not an action name at all
    Unknown,
    /// A real action with no handler on this page
    Unregistered,
}

/// An action marker in the markup that will never do anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditFinding {
    pub name: String,
    pub element: NodeId,
    pub issue: AuditIssue,
}

impl fmt::Display for AuditFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.issue {
            AuditIssue::Unknown => write!(f, "unknown action '{}'", self.name),
            AuditIssue::Unregistered => {
                write!(f, "action '{}' has no handler on this page", self.name)
            }
        }
    }
}

// ============================================================================
// DISPATCHER
// ============================================================================

#[derive(Default)]
pub struct DispatcherBuilder {
    handlers: HashMap<Action, Box<dyn ActionHandler>>,
}

impl DispatcherBuilder {
    pub fn register(mut self, action: Action, handler: Box<dyn ActionHandler>) -> Self {
        self.handlers.insert(action, handler);
        self
    }

    /// Fails if any of `required` has no handler.
    pub fn build(self, required: &[Action]) -> Result<Dispatcher, PageError> {
        if let Some(missing) = required.iter().find(|a| !self.handlers.contains_key(a)) {
            return Err(PageError::MissingActionHandler { action: *missing });
        }
        Ok(Dispatcher {
            handlers: self.handlers,
            states: RefCell::new(HashMap::new()),
        })
    }
}

pub struct Dispatcher {
    handlers: HashMap<Action, Box<dyn ActionHandler>>,
    /// Flight key to (action, state): everything pending, plus the last
    /// settled trigger of each action
    states: RefCell<HashMap<String, (Action, ActionState)>>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn handles(&self, action: Action) -> bool {
        self.handlers.contains_key(&action)
    }

    pub fn registered(&self) -> BTreeSet<Action> {
        self.handlers.keys().copied().collect()
    }

    /// State of the trigger with this flight key. Settled keys are forgotten
    /// once another trigger of the same action settles.
    pub fn state(&self, flight_key: &str) -> ActionState {
        self.states
            .borrow()
            .get(flight_key)
            .map_or(ActionState::Idle, |(_, state)| *state)
    }

    /// Number of flight keys being remembered
    pub fn tracked(&self) -> usize {
        self.states.borrow().len()
    }

    /// Flight key of `descriptor` as this dispatcher computes it
    pub fn flight_key(&self, ctx: &PageContext, descriptor: &ActionDescriptor) -> String {
        match self.handlers.get(&descriptor.action) {
            Some(handler) => descriptor.flight_key_with(&handler.page_params(ctx, descriptor)),
            None => descriptor.flight_key(),
        }
    }

    fn settle(&self, key: String, action: Action, state: ActionState) {
        let mut states = self.states.borrow_mut();
        states.retain(|_, (a, s)| *s == ActionState::Pending || *a != action);
        states.insert(key, (action, state));
    }

    /// Action markers in `doc` that cannot do anything on this page.
    pub fn audit(&self, doc: &Document) -> Vec<AuditFinding> {
        std::iter::once(doc.root())
            .chain(doc.descendants(doc.root()))
            .filter_map(|element| {
                let name = doc.attr(element, ACTION_ATTR)?;
                let issue = match name.parse::<Action>() {
                    Ok(action) if self.handles(action) => return None,
                    Ok(_) => AuditIssue::Unregistered,
                    Err(_) => AuditIssue::Unknown,
                };
                Some(AuditFinding {
                    name: name.to_string(),
                    element,
                    issue,
                })
            })
            .collect()
    }

    /// Delegated click on `target`.
    pub async fn click(&self, ctx: &PageContext, target: NodeId) -> DispatchOutcome {
        let resolved = ActionDescriptor::from_target(&ctx.document(), target);
        match resolved {
            Ok(Some(descriptor)) => self.dispatch(ctx, descriptor).await,
            Ok(None) => DispatchOutcome::NoAction,
            Err(PageError::UnknownAction { name }) => self.ignore(ctx, name),
            Err(e) => self.ignore(ctx, e.to_string()),
        }
    }

    /// Run a resolved trigger.
    #[instrument(skip(self, ctx, descriptor), fields(action = %descriptor.action))]
    pub async fn dispatch(&self, ctx: &PageContext, descriptor: ActionDescriptor) -> DispatchOutcome {
        let action = descriptor.action;
        let Some(handler) = self.handlers.get(&action) else {
            return self.ignore(ctx, action.as_str().to_string());
        };

        let key = descriptor.flight_key_with(&handler.page_params(ctx, &descriptor));
        {
            let mut states = self.states.borrow_mut();
            if matches!(states.get(&key), Some((_, ActionState::Pending))) {
                debug!(key = %key, "trigger already in flight");
                ctx.events().emit(EventKind::ActionSuppressed {
                    action: action.as_str().to_string(),
                });
                return DispatchOutcome::Suppressed { action };
            }
            states.insert(key.clone(), (action, ActionState::Pending));
        }

        ctx.events().emit(EventKind::ActionStarted {
            action: action.as_str().to_string(),
        });
        let start = Instant::now();
        let result = handler.handle(ctx, &descriptor).await;

        match result {
            Ok(effects) => {
                self.settle(key, action, ActionState::Succeeded);
                ctx.events().emit(EventKind::ActionSucceeded {
                    action: action.as_str().to_string(),
                    duration_ms: start.elapsed().as_millis() as u64,
                });
                debug!(effects = effects.len(), "action completed");
                DispatchOutcome::Completed { action, effects }
            }
            Err(e) => {
                self.settle(key, action, ActionState::Failed);
                warn!(error = %e, "action failed");
                ctx.events().emit(EventKind::ActionFailed {
                    action: action.as_str().to_string(),
                    error: e.to_string(),
                });
                report(ctx, &e);
                DispatchOutcome::Failed {
                    action,
                    reason: e.to_string(),
                }
            }
        }
    }

    fn ignore(&self, ctx: &PageContext, name: String) -> DispatchOutcome {
        debug!(name = %name, "ignoring action");
        ctx.events().emit(EventKind::ActionIgnored { name: name.clone() });
        DispatchOutcome::Ignored { name }
    }
}

/// Turn a handler error into what the visitor sees.
fn report(ctx: &PageContext, error: &PageError) {
    match error {
        PageError::LoginRequired => ctx.prompt_login(),
        other => ctx.notify(other.user_message(), Severity::Error),
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registered", &self.registered())
            .finish()
    }
}

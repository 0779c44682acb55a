//! Script bridge
//!
//! Every interaction with the embedded script context goes through a single owner task.
//! Commands are queued with [`ScriptBridge::execute`], which returns immediately with a
//! [`PendingScript`] that resolves to exactly one [`ScriptValue`]. Unsolicited messages
//! posted by the page enter the same queue through [`ScriptBridge::post_message`] and are
//! handed to the registered [`PushMessageHandler`], so a call's events reach the handler
//! in the order the page emitted them.
//!
//! ```text
//!  host command ──execute()──┐
//!                            ▼
//!                  ┌──────────────────┐   execute_script()   ┌────────────────┐
//!                  │   owner task     │ ───────────────────► │ ScriptContext  │
//!                  │ (mpsc consumer)  │ ◄─────────────────── │  (web engine)  │
//!                  └──────────────────┘     raw result       └────────────────┘
//!                     │           ▲                                 │
//!    oneshot ◄────────┘           └────────── post_message() ◄──────┘
//!    (PendingScript)         push ──► PushMessageHandler
//! ```

pub mod commands;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Diagnostic carried by a completion when the engine reports an execution fault
pub const EXECUTION_FAILED: &str = "JavaScript execution failed";

/// Diagnostic carried by a completion when the owner task is gone
pub const CONTEXT_CLOSED: &str = "Script context closed";

/// Fault reported by the script engine for a single execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFault {
    /// Engine diagnostic
    pub details: String,
}

impl ScriptFault {
    /// Create a fault with the given diagnostic
    pub fn new(details: impl Into<String>) -> Self {
        Self {
            details: details.into(),
        }
    }
}

impl std::fmt::Display for ScriptFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.details)
    }
}

/// The embedded script engine
///
/// Implementations run `script` in the page and return the JSON-serialized completion
/// value, the way browser engines report `ExecuteScript` results.
#[async_trait]
pub trait ScriptContext: Send + Sync + 'static {
    /// Run a script and return its JSON-encoded completion value
    async fn execute_script(&self, script: &str) -> Result<String, ScriptFault>;
}

/// Receiver for messages the page posts without being asked
pub trait PushMessageHandler: Send + Sync + 'static {
    /// Called on the owner task for every pushed message, in arrival order
    fn on_push_message(&self, message: String);
}

/// A completion value decoded once at the bridge boundary
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    /// `null` or `undefined`
    Null,
    /// A boolean completion
    Bool(bool),
    /// A string completion, already unquoted
    Text(String),
    /// Any other JSON value (objects, arrays, numbers)
    Json(Value),
    /// The engine failed to run the script, or the result was not JSON
    Fault(String),
}

/// Success/failure view of a completion for commands that answer with a boolean
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The script returned a boolean
    Success(bool),
    /// Anything else, with a diagnostic
    Failure(String),
}

impl ScriptValue {
    /// Decode a raw completion string
    pub fn decode(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Null) => Self::Null,
            Ok(Value::Bool(b)) => Self::Bool(b),
            Ok(Value::String(s)) => Self::Text(s),
            Ok(other) => Self::Json(other),
            Err(_) => Self::Fault(raw.to_string()),
        }
    }

    /// The boolean value, if this is one
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// True for `{}`, the completion of a script that returns a promise
    pub fn is_empty_object(&self) -> bool {
        matches!(self, Self::Json(Value::Object(map)) if map.is_empty())
    }

    /// True when the engine itself failed
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }

    /// Text suitable for an error message
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Text(s) | Self::Fault(s) => s.clone(),
            Self::Json(v) => v.to_string(),
        }
    }

    /// Collapse into a boolean success or a failure message
    pub fn into_outcome(self) -> CommandOutcome {
        match self {
            Self::Bool(b) => CommandOutcome::Success(b),
            other => CommandOutcome::Failure(other.diagnostic()),
        }
    }
}

/// A queued script execution
///
/// Resolves exactly once. If the owner task shuts down first, resolves to
/// [`ScriptValue::Fault`] with [`CONTEXT_CLOSED`].
#[derive(Debug)]
pub struct PendingScript {
    rx: oneshot::Receiver<ScriptValue>,
}

impl Future for PendingScript {
    type Output = ScriptValue;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| ScriptValue::Fault(CONTEXT_CLOSED.to_string())))
    }
}

enum OwnerRequest {
    Execute {
        script: String,
        reply: oneshot::Sender<ScriptValue>,
    },
    Push(String),
}

type HandlerSlot = Arc<RwLock<Option<Arc<dyn PushMessageHandler>>>>;

/// Handle to the script owner task
///
/// Cheap to clone; every clone feeds the same queue.
#[derive(Clone)]
pub struct ScriptBridge {
    requests: mpsc::UnboundedSender<OwnerRequest>,
    handler: HandlerSlot,
}

impl std::fmt::Debug for ScriptBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptBridge")
            .field("closed", &self.requests.is_closed())
            .field("has_handler", &self.handler.read().is_some())
            .finish()
    }
}

impl ScriptBridge {
    /// Spawn the owner task on the current tokio runtime
    pub fn spawn(context: Arc<dyn ScriptContext>) -> (Self, JoinHandle<()>) {
        let (requests, rx) = mpsc::unbounded_channel();
        let handler: HandlerSlot = Arc::new(RwLock::new(None));
        let task = tokio::spawn(run_owner(context, rx, handler.clone()));
        (Self { requests, handler }, task)
    }

    /// Queue a script; the returned future yields its single completion value
    pub fn execute(&self, script: impl Into<String>) -> PendingScript {
        let (reply, rx) = oneshot::channel();
        let request = OwnerRequest::Execute {
            script: script.into(),
            reply,
        };
        if self.requests.send(request).is_err() {
            debug!("script owner gone, execution dropped");
        }
        PendingScript { rx }
    }

    /// Deliver a message posted by the page
    pub fn post_message(&self, message: impl Into<String>) {
        if self.requests.send(OwnerRequest::Push(message.into())).is_err() {
            debug!("script owner gone, push message dropped");
        }
    }

    /// Install the push message handler, replacing any previous one
    pub fn set_message_handler(&self, handler: Arc<dyn PushMessageHandler>) {
        *self.handler.write() = Some(handler);
    }

    /// Remove the push message handler; later pushes are dropped
    pub fn clear_message_handler(&self) {
        self.handler.write().take();
    }

    /// True once the owner task has stopped
    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }
}

async fn run_owner(
    context: Arc<dyn ScriptContext>,
    mut rx: mpsc::UnboundedReceiver<OwnerRequest>,
    handler: HandlerSlot,
) {
    while let Some(request) = rx.recv().await {
        match request {
            OwnerRequest::Execute { script, reply } => {
                let value = match context.execute_script(&script).await {
                    Ok(raw) => {
                        trace!(result = %raw, "script completed");
                        ScriptValue::decode(&raw)
                    }
                    Err(fault) => {
                        debug!(error = %fault, "script execution failed");
                        ScriptValue::Fault(EXECUTION_FAILED.to_string())
                    }
                };
                if reply.send(value).is_err() {
                    trace!("script completion discarded, caller went away");
                }
            }
            OwnerRequest::Push(message) => {
                let current = handler.read().clone();
                match current {
                    Some(h) => h.on_push_message(message),
                    None => trace!("no push handler installed, message dropped"),
                }
            }
        }
    }
    debug!("script owner task stopped");
}

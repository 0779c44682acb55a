//! Notification activation routing
//!
//! When the user clicks a notification button the OS invokes the process with the
//! button's invocation string (`accept:<callId>`, `reject:<callId>`, `call:<callId>`).
//! That entry point is synchronous and has no constructor arguments, so the router lives
//! in a process-wide registry. [`activate`] decodes the string and queues a
//! [`RoutedAction`] for the call-control consumer running on the owner side. No host
//! listener is involved; outcomes of routed actions are only logged.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{ActivationError, NotifierError};
use crate::notification::{NotificationAction, NotificationCoordinator};

/// OS registration of the process as a notification activation target
pub trait ActivationRegistrar: Send + Sync + 'static {
    /// Register the activation target under the application identity
    fn register(&self, app_id: &str, display_name: &str) -> Result<(), NotifierError>;

    /// Remove the registration
    fn unregister(&self, app_id: &str) -> Result<(), NotifierError>;
}

/// A decoded activation, ready for call control
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutedAction {
    /// Answer the ringing call
    Accept {
        /// Call the notification was shown for
        call_id: String,
    },
    /// Reject the ringing call
    Reject {
        /// Call the notification was shown for
        call_id: String,
    },
    /// Place a call using the stored activation context
    CallBack {
        /// Caller string from the context
        from: String,
        /// Callee string from the context
        to: String,
    },
}

/// Split an invocation string on its first `:`
pub fn decode(invoked: &str) -> Result<(NotificationAction, &str), ActivationError> {
    let (action, call_id) = invoked.split_once(':').ok_or_else(|| {
        ActivationError::InvalidArgument(format!("missing ':' in `{}`", invoked))
    })?;
    let action = action
        .parse::<NotificationAction>()
        .map_err(ActivationError::InvalidArgument)?;
    Ok((action, call_id))
}

/// Routes activations into the call-control queue
#[derive(Debug)]
pub struct ActivationRouter {
    actions: mpsc::UnboundedSender<RoutedAction>,
    coordinator: Arc<NotificationCoordinator>,
}

impl ActivationRouter {
    /// Create a router and the receiving end of its action queue
    pub fn new(
        coordinator: Arc<NotificationCoordinator>,
    ) -> (Self, mpsc::UnboundedReceiver<RoutedAction>) {
        let (actions, rx) = mpsc::unbounded_channel();
        (
            Self {
                actions,
                coordinator,
            },
            rx,
        )
    }

    /// Decode an invocation string and queue the action
    ///
    /// A malformed string fails before anything is queued. If the consumer has gone away
    /// the action is dropped and the activation still succeeds.
    pub fn activate(&self, invoked: &str) -> Result<RoutedAction, ActivationError> {
        let (action, call_id) = decode(invoked)?;
        let routed = match action {
            NotificationAction::Accept => RoutedAction::Accept {
                call_id: call_id.to_string(),
            },
            NotificationAction::Reject => RoutedAction::Reject {
                call_id: call_id.to_string(),
            },
            NotificationAction::CallBack => {
                let context = self.coordinator.activation_context().unwrap_or_default();
                let (from, to) = context.call_back_parties();
                RoutedAction::CallBack { from, to }
            }
        };

        info!(action = action.as_str(), call_id = %call_id, "notification activated");
        if self.actions.send(routed.clone()).is_err() {
            warn!(action = action.as_str(), "no call control session, activation dropped");
        }
        Ok(routed)
    }
}

static ROUTER: Lazy<RwLock<Option<Arc<ActivationRouter>>>> = Lazy::new(|| RwLock::new(None));

/// Install the process-wide router, replacing any previous one
pub fn register(router: Arc<ActivationRouter>) {
    if ROUTER.write().replace(router).is_some() {
        debug!("replaced registered activation router");
    }
}

/// Remove the process-wide router; returns `false` if none was registered
pub fn unregister() -> bool {
    ROUTER.write().take().is_some()
}

/// Remove `router` if it is the one registered; another router is left in place
pub fn unregister_router(router: &Arc<ActivationRouter>) -> bool {
    let mut slot = ROUTER.write();
    match slot.as_ref() {
        Some(current) if Arc::ptr_eq(current, router) => {
            slot.take();
            true
        }
        _ => false,
    }
}

/// The registered router
pub fn registered() -> Result<Arc<ActivationRouter>, ActivationError> {
    ROUTER.read().clone().ok_or(ActivationError::NotRegistered)
}

/// OS activation entry point
///
/// Fails only on a malformed invocation string. With no router registered the action is
/// validated, logged and dropped.
pub fn activate(invoked: &str) -> Result<(), ActivationError> {
    match registered() {
        Ok(router) => router.activate(invoked).map(|_| ()),
        Err(ActivationError::NotRegistered) => {
            let (action, call_id) = decode(invoked)?;
            warn!(action = action.as_str(), call_id = %call_id, "activation with no router registered");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

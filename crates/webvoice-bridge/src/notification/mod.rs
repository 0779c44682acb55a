//! Notification coordination
//!
//! [`NotificationCoordinator`] owns the mapping from call id to the live OS notification
//! for that call. At most one notification exists per call id; showing a second one for
//! the same call first hides the existing one. Hides only act on an exact
//! `(call id, kind)` match, so they are safe to repeat.
//!
//! OS failures never propagate. A notification that cannot be shown or hidden is logged
//! and the call carries on without it.
//!
//! Per-call states:
//!
//! ```text
//!   None ──incoming──► ShowingIncoming ──accept/cancel──► Cleared
//!                            │
//!                          cancel
//!                            ▼
//!                      ShowingMissed ──hide──► Cleared
//! ```

mod context;
mod toast;

pub use context::ActivationContext;
pub use toast::{NotificationAction, NotificationKind, ToastAction, ToastContent};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::NotifierError;

/// Opaque handle to a shown OS notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToastHandle(u64);

impl ToastHandle {
    /// Wrap an OS handle value
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The OS handle value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// OS notification service
///
/// Calls are synchronous and may come from the owner task or from the activation
/// boundary; the coordinator serializes them.
pub trait Notifier: Send + Sync + 'static {
    /// Whether the application may currently post notifications
    fn has_permission(&self) -> bool;

    /// Retry notifier setup (identity registration, notifier creation)
    fn initialize(&self) -> Result<(), NotifierError>;

    /// Show a notification
    fn show(&self, toast: &ToastContent) -> Result<ToastHandle, NotifierError>;

    /// Remove a shown notification
    fn hide(&self, handle: ToastHandle) -> Result<(), NotifierError>;
}

/// Where a call stands with respect to notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationState {
    /// Nothing was ever shown
    None,
    /// The incoming notification is up
    ShowingIncoming,
    /// The missed notification is up
    ShowingMissed,
    /// A notification was shown and has been hidden
    Cleared,
}

/// A live notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveNotification {
    /// OS handle
    pub handle: ToastHandle,
    /// Incoming or missed
    pub kind: NotificationKind,
    /// When it was shown
    pub shown_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    active: HashMap<String, ActiveNotification>,
    cleared: HashSet<String>,
    activation: Option<ActivationContext>,
}

/// Owner of every live call notification
pub struct NotificationCoordinator {
    notifier: Arc<dyn Notifier>,
    unknown_caller_label: String,
    state: Mutex<CoordinatorState>,
}

impl std::fmt::Debug for NotificationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("NotificationCoordinator")
            .field("active", &state.active.len())
            .field("cleared", &state.cleared.len())
            .finish()
    }
}

impl NotificationCoordinator {
    /// Create a coordinator over an OS notifier
    pub fn new(notifier: Arc<dyn Notifier>, unknown_caller_label: impl Into<String>) -> Self {
        Self {
            notifier,
            unknown_caller_label: unknown_caller_label.into(),
            state: Mutex::new(CoordinatorState::default()),
        }
    }

    /// Show the incoming-call notification for `call_id`
    ///
    /// Returns `true` if a notification is now up.
    pub fn show_incoming(&self, caller: &str, call_id: &str) -> bool {
        self.show(NotificationKind::Incoming, caller, call_id)
    }

    /// Show the missed-call notification for `call_id`
    pub fn show_missed(&self, caller: &str, call_id: &str) -> bool {
        self.show(NotificationKind::Missed, caller, call_id)
    }

    fn show(&self, kind: NotificationKind, caller: &str, call_id: &str) -> bool {
        if !self.ensure_permission() {
            return false;
        }

        let call_id = strip_quotes(call_id);
        let caller = if caller.is_empty() {
            self.unknown_caller_label.as_str()
        } else {
            caller
        };
        let toast = ToastContent::for_call(kind, caller, call_id);

        let mut state = self.state.lock();
        state.activation = Some(ActivationContext::for_notification(kind, caller, call_id));

        if let Some(previous) = state.active.remove(call_id) {
            debug!(call_id = %call_id, kind = ?previous.kind, "replacing existing notification");
            if let Err(e) = self.notifier.hide(previous.handle) {
                warn!(call_id = %call_id, error = %e, "failed to hide replaced notification");
            }
        }

        match self.notifier.show(&toast) {
            Ok(handle) => {
                info!(call_id = %call_id, kind = ?kind, caller = %caller, "notification shown");
                state.cleared.remove(call_id);
                state.active.insert(
                    call_id.to_string(),
                    ActiveNotification {
                        handle,
                        kind,
                        shown_at: Utc::now(),
                    },
                );
                true
            }
            Err(e) => {
                error!(call_id = %call_id, kind = ?kind, error = %e, "failed to show notification");
                false
            }
        }
    }

    /// Hide the notification of `kind` for `call_id`
    ///
    /// A missing handle or a kind mismatch is a no-op. Returns `true` if a notification
    /// was removed.
    pub fn hide(&self, call_id: &str, kind: NotificationKind) -> bool {
        let call_id = strip_quotes(call_id);
        let mut state = self.state.lock();

        let matches = state
            .active
            .get(call_id)
            .map(|active| active.kind == kind)
            .unwrap_or(false);
        if !matches {
            debug!(call_id = %call_id, kind = ?kind, "no matching notification to hide");
            return false;
        }

        if let Some(active) = state.active.remove(call_id) {
            if let Err(e) = self.notifier.hide(active.handle) {
                warn!(call_id = %call_id, error = %e, "failed to hide notification");
            }
            state.cleared.insert(call_id.to_string());
            debug!(call_id = %call_id, kind = ?kind, "notification hidden");
        }
        true
    }

    /// Hide every live notification, returning how many were removed
    pub fn hide_all(&self) -> usize {
        let mut state = self.state.lock();
        let drained: Vec<(String, ActiveNotification)> = state.active.drain().collect();
        for (call_id, active) in &drained {
            if let Err(e) = self.notifier.hide(active.handle) {
                warn!(call_id = %call_id, error = %e, "failed to hide notification");
            }
            state.cleared.insert(call_id.clone());
        }
        drained.len()
    }

    /// Current state of a call
    pub fn state_of(&self, call_id: &str) -> NotificationState {
        let call_id = strip_quotes(call_id);
        let state = self.state.lock();
        match state.active.get(call_id) {
            Some(active) => match active.kind {
                NotificationKind::Incoming => NotificationState::ShowingIncoming,
                NotificationKind::Missed => NotificationState::ShowingMissed,
            },
            None if state.cleared.contains(call_id) => NotificationState::Cleared,
            None => NotificationState::None,
        }
    }

    /// The live notification for a call, if any
    pub fn active(&self, call_id: &str) -> Option<ActiveNotification> {
        self.state.lock().active.get(strip_quotes(call_id)).cloned()
    }

    /// Number of live notifications
    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// The context left by the most recent notification
    pub fn activation_context(&self) -> Option<ActivationContext> {
        self.state.lock().activation.clone()
    }

    /// Forget that a call was ever cleared
    ///
    /// Live notifications are left alone; a missed notification outlives its call.
    pub fn release(&self, call_id: &str) {
        self.state.lock().cleared.remove(strip_quotes(call_id));
    }

    fn ensure_permission(&self) -> bool {
        if self.notifier.has_permission() {
            return true;
        }

        warn!("notification permission missing, retrying notifier setup");
        match self.notifier.initialize() {
            Ok(()) if self.notifier.has_permission() => true,
            Ok(()) => {
                warn!("notifications still not permitted after setup retry");
                false
            }
            Err(e) => {
                error!(error = %e, "notifier setup retry failed");
                false
            }
        }
    }
}

fn strip_quotes(raw: &str) -> &str {
    raw.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw)
}

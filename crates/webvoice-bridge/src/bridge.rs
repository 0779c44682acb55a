//! Runtime wiring
//!
//! [`VoiceBridge`] owns the script owner task, the push-message dispatcher, the
//! activation consumer and the shared state they work on. The embedding host feeds
//! page messages in with [`VoiceBridge::post_message`], issues commands through
//! [`VoiceBridge::handle_method_call`] or [`VoiceBridge::controller`], and reads
//! host events from [`VoiceBridge::listen`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::activation::{self, ActivationRegistrar, ActivationRouter, RoutedAction};
use crate::call::{CallDirection, CallRecord};
use crate::config::BridgeConfig;
use crate::control::{CallController, Platform, ResultSink};
use crate::error::{BridgeError, BridgeResult, CommandResult};
use crate::events::{self, CallEvent, PushMessage};
use crate::notification::{NotificationCoordinator, NotificationKind, Notifier};
use crate::script::commands::{self, DeviceOptions};
use crate::script::{PushMessageHandler, ScriptBridge, ScriptContext, ScriptValue, CONTEXT_CLOSED};
use crate::sink::{HostEventChannel, HostEventStream};

/// Forwards pushes from the owner task to the dispatcher without blocking it
struct PushForwarder {
    tx: mpsc::Sender<String>,
}

impl PushMessageHandler for PushForwarder {
    fn on_push_message(&self, message: String) {
        if let Err(e) = self.tx.try_send(message) {
            warn!(error = %e, "push message queue unavailable, message dropped");
        }
    }
}

/// Applies translated call events to notifications, the platform and the host stream
struct Dispatcher {
    controller: Arc<CallController>,
    coordinator: Arc<NotificationCoordinator>,
    platform: Arc<dyn Platform>,
    events: Arc<HostEventChannel>,
    active_call: Arc<Mutex<Option<CallRecord>>>,
    caller_name_key: String,
}

impl Dispatcher {
    async fn run(self, mut rx: mpsc::Receiver<String>) {
        while let Some(raw) = rx.recv().await {
            match events::parse_push(&raw) {
                Some(PushMessage::Call(event)) => self.handle_call_event(event),
                Some(PushMessage::PermissionResult { granted }) => {
                    self.controller.resolve_permission(granted)
                }
                None => {}
            }
        }
        debug!("push dispatcher stopped");
    }

    fn handle_call_event(&self, event: CallEvent) {
        debug!(event = %event.name(), "call event");

        match &event {
            CallEvent::Incoming(parties) => {
                self.platform.flash_window(true);
                let controller = self.controller.clone();
                tokio::spawn(async move {
                    match controller.has_mic_permission().await {
                        Ok(true) => {}
                        Ok(false) => warn!("incoming call without microphone permission"),
                        Err(e) => debug!(error = %e, "microphone check did not complete"),
                    }
                });
                let caller = parties.params.get(&self.caller_name_key).unwrap_or_default();
                self.coordinator.show_incoming(caller, &parties.call_sid);
            }
            CallEvent::Cancel(parties) => {
                self.platform.flash_window(false);
                self.coordinator
                    .hide(&parties.call_sid, NotificationKind::Incoming);
                if self.is_outgoing(&parties.call_sid) {
                    debug!(call_id = %parties.call_sid, "outgoing call cancelled, no missed notification");
                } else {
                    let caller = parties.params.get(&self.caller_name_key).unwrap_or_default();
                    self.coordinator.show_missed(caller, &parties.call_sid);
                }
            }
            CallEvent::Accept(parties) => {
                self.platform.flash_window(false);
                self.coordinator
                    .hide(&parties.call_sid, NotificationKind::Incoming);
            }
            CallEvent::Other { .. } => {}
            _ => self.platform.flash_window(false),
        }

        self.track_call(&event);

        for host_event in event.host_events() {
            self.events.send(&host_event);
        }
    }

    fn is_outgoing(&self, call_id: &str) -> bool {
        self.active_call
            .lock()
            .as_ref()
            .map(|record| record.call_id == call_id && record.direction == CallDirection::Outgoing)
            .unwrap_or(false)
    }

    fn track_call(&self, event: &CallEvent) {
        let mut active = self.active_call.lock();
        if let Some(record) = event.call_record() {
            info!(call_id = %record.call_id, direction = %record.direction, peer = %record.peer, "call active");
            *active = Some(record);
            return;
        }
        if !event.is_terminal() {
            return;
        }

        let ended = match event.parties().map(|p| p.call_sid.as_str()) {
            Some(call_id) if !call_id.is_empty() => {
                if active.as_ref().map(|r| r.call_id == call_id).unwrap_or(false) {
                    active.take();
                }
                Some(call_id.to_string())
            }
            _ => active.take().map(|record| record.call_id),
        };
        if let Some(call_id) = ended {
            info!(call_id = %call_id, "call ended");
            self.coordinator.release(&call_id);
        }
    }
}

async fn run_activation(mut rx: mpsc::UnboundedReceiver<RoutedAction>, controller: Arc<CallController>) {
    while let Some(action) = rx.recv().await {
        debug!(action = ?action, "routing notification action");
        match action {
            RoutedAction::Accept { .. } => controller.answer_with(ResultSink::FireAndForget).await,
            RoutedAction::Reject { .. } => controller.hang_up_with(ResultSink::FireAndForget).await,
            RoutedAction::CallBack { from, to } => {
                controller
                    .make_call_with(&from, &to, ResultSink::FireAndForget)
                    .await
            }
        }
    }
    debug!("activation consumer stopped");
}

/// A running bridge between the host and the embedded script context
pub struct VoiceBridge {
    app_id: String,
    script: ScriptBridge,
    controller: Arc<CallController>,
    coordinator: Arc<NotificationCoordinator>,
    events: Arc<HostEventChannel>,
    router: Arc<ActivationRouter>,
    registrar: Arc<dyn ActivationRegistrar>,
    active_call: Arc<Mutex<Option<CallRecord>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl std::fmt::Debug for VoiceBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceBridge")
            .field("app_id", &self.app_id)
            .field("script", &self.script)
            .field("coordinator", &self.coordinator)
            .field("events", &self.events)
            .field("stopped", &self.stopped.load(Ordering::SeqCst))
            .finish()
    }
}

impl VoiceBridge {
    /// Start the bridge
    ///
    /// Registers the activation target, installs the push handler and clears any
    /// listeners a previous page session left on the device. Registration failures are
    /// logged; only an unusable configuration or a dead script context fail the start.
    pub async fn start(
        config: BridgeConfig,
        context: Arc<dyn ScriptContext>,
        notifier: Arc<dyn Notifier>,
        platform: Arc<dyn Platform>,
        registrar: Arc<dyn ActivationRegistrar>,
    ) -> BridgeResult<Self> {
        config.validate()?;

        let app_id = config.resolve_app_id();
        match registrar.register(&app_id, &config.display_name) {
            Ok(()) => info!(app_id = %app_id, "activation target registered"),
            Err(e) => warn!(app_id = %app_id, error = %e, "activation target registration failed"),
        }

        let events = Arc::new(HostEventChannel::new());
        let coordinator = Arc::new(NotificationCoordinator::new(
            notifier,
            config.unknown_caller_label.clone(),
        ));
        let (script, owner_task) = ScriptBridge::spawn(context);
        let controller = Arc::new(CallController::new(
            script.clone(),
            coordinator.clone(),
            platform.clone(),
            events.clone(),
            DeviceOptions {
                codec_preferences: config.codec_preferences.clone(),
                close_protection: config.close_protection,
            },
            config.permission_timeout(),
        ));
        let active_call = Arc::new(Mutex::new(None));

        let (push_tx, push_rx) = mpsc::channel(config.event_buffer);
        script.set_message_handler(Arc::new(PushForwarder { tx: push_tx }));
        let dispatcher = Dispatcher {
            controller: controller.clone(),
            coordinator: coordinator.clone(),
            platform,
            events: events.clone(),
            active_call: active_call.clone(),
            caller_name_key: config.caller_name_key.clone(),
        };
        let dispatch_task = tokio::spawn(dispatcher.run(push_rx));

        let (router, action_rx) = ActivationRouter::new(coordinator.clone());
        let router = Arc::new(router);
        activation::register(router.clone());
        let activation_task = tokio::spawn(run_activation(action_rx, controller.clone()));

        let bridge = Self {
            app_id,
            script,
            controller,
            coordinator,
            events,
            router,
            registrar,
            active_call,
            tasks: Mutex::new(vec![owner_task, dispatch_task, activation_task]),
            stopped: AtomicBool::new(false),
        };

        match bridge.script.execute(commands::reset_device_listeners()).await {
            ScriptValue::Fault(details) if details == CONTEXT_CLOSED => {
                bridge.shutdown().await;
                return Err(BridgeError::script_unavailable(details));
            }
            ScriptValue::Fault(details) => warn!(error = %details, "listener reset failed"),
            _ => debug!("device listeners reset"),
        }

        info!(app_id = %bridge.app_id, version = crate::VERSION, "voice bridge started");
        Ok(bridge)
    }

    /// The resolved application identity
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Attach the host listener, replacing any previous one
    pub fn listen(&self) -> HostEventStream {
        self.events.listen()
    }

    /// Detach the host listener; `true` only for the call that released it
    pub fn detach_listener(&self) -> bool {
        self.events.detach()
    }

    /// Feed a message the page posted
    pub fn post_message(&self, message: impl Into<String>) {
        self.script.post_message(message);
    }

    /// Dispatch a host method call
    pub async fn handle_method_call(&self, method: &str, args: &Value) -> CommandResult<Value> {
        self.controller.handle_method_call(method, args).await
    }

    /// Call control
    pub fn controller(&self) -> Arc<CallController> {
        self.controller.clone()
    }

    /// Notification state
    pub fn coordinator(&self) -> Arc<NotificationCoordinator> {
        self.coordinator.clone()
    }

    /// The call currently bound to the page's connection
    pub fn active_call(&self) -> Option<CallRecord> {
        self.active_call.lock().clone()
    }

    /// True once [`shutdown`](Self::shutdown) has run
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop the bridge; later calls are no-ops
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!("voice bridge already stopped");
            return;
        }

        self.events.detach();
        self.controller.cancel_pending();
        let hidden = self.coordinator.hide_all();
        self.script.clear_message_handler();

        match self.script.execute(commands::cleanup()).await {
            ScriptValue::Bool(true) => debug!("page cleaned up"),
            other => warn!(result = %other.diagnostic(), "page cleanup incomplete"),
        }

        activation::unregister_router(&self.router);
        if let Err(e) = self.registrar.unregister(&self.app_id) {
            warn!(app_id = %self.app_id, error = %e, "activation target deregistration failed");
        }

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!(app_id = %self.app_id, hidden, "voice bridge stopped");
    }
}

//! Host control surface
//!
//! [`CallController`] turns host commands into scripts and script completions into
//! typed results. Every operation has a plain `async` form returning a
//! [`CommandResult`] and, where activation needs it, a `_with` form taking a
//! [`ResultSink`] so the outcome can be dropped when nobody is listening.
//!
//! [`CallController::handle_method_call`] is the method-name dispatcher used by the
//! host channel. Arguments are validated before any script runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::error::{CommandError, CommandResult};
use crate::events::HostEvent;
use crate::notification::{NotificationCoordinator, NotificationKind};
use crate::script::commands::{self, DeviceOptions};
use crate::script::{CommandOutcome, ScriptBridge, ScriptValue};
use crate::sink::HostEventChannel;

const NOT_READY: &str = "WebView not initialized";

/// Where the outcome of a command goes
#[derive(Debug)]
pub enum ResultSink<T> {
    /// Deliver the outcome to a waiting caller
    WithSink(oneshot::Sender<CommandResult<T>>),
    /// Nobody is waiting; the outcome is only logged
    FireAndForget,
}

impl<T> ResultSink<T> {
    /// A sink and the receiver its outcome arrives on
    ///
    /// ```rust
    /// # use webvoice_bridge::ResultSink;
    /// # tokio_test::block_on(async {
    /// let (sink, outcome) = ResultSink::<bool>::channel();
    /// sink.deliver(Ok(true));
    /// assert_eq!(outcome.await.unwrap(), Ok(true));
    /// # })
    /// ```
    pub fn channel() -> (Self, oneshot::Receiver<CommandResult<T>>) {
        let (tx, rx) = oneshot::channel();
        (Self::WithSink(tx), rx)
    }

    /// True when there is no caller to deliver to
    pub fn is_fire_and_forget(&self) -> bool {
        matches!(self, Self::FireAndForget)
    }

    /// Hand over the outcome
    pub fn deliver(self, result: CommandResult<T>) {
        match self {
            Self::WithSink(tx) => {
                if tx.send(result).is_err() {
                    debug!("command result receiver dropped");
                }
            }
            Self::FireAndForget => {
                if let Err(e) = result {
                    warn!(kind = e.kind(), error = %e.message(), "fire-and-forget command failed");
                }
            }
        }
    }
}

/// Host platform services outside the script context
pub trait Platform: Send + Sync + 'static {
    /// Whether the OS lets this application use the microphone
    fn microphone_permitted(&self) -> bool;

    /// Start or stop flashing the host window to draw attention
    fn flash_window(&self, active: bool);
}

/// Permission checks waiting for a `permission_result` push, oldest first
#[derive(Debug, Default)]
struct PendingCommands {
    next_id: AtomicU64,
    waiting: Mutex<BTreeMap<u64, oneshot::Sender<bool>>>,
}

impl PendingCommands {
    fn register(&self) -> (u64, oneshot::Receiver<bool>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().insert(id, tx);
        (id, rx)
    }

    fn resolve_oldest(&self, granted: bool) -> Option<u64> {
        let (id, tx) = self.waiting.lock().pop_first()?;
        if tx.send(granted).is_err() {
            debug!(key = %pending_key(id), "permission check abandoned before result");
        }
        Some(id)
    }

    fn forget(&self, id: u64) {
        self.waiting.lock().remove(&id);
    }

    fn cancel_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.waiting.lock());
        drained.len()
    }

    fn len(&self) -> usize {
        self.waiting.lock().len()
    }
}

fn pending_key(id: u64) -> String {
    format!("permission_check_{}", id)
}

/// Call control over the script bridge
pub struct CallController {
    script: ScriptBridge,
    coordinator: Arc<NotificationCoordinator>,
    platform: Arc<dyn Platform>,
    events: Arc<HostEventChannel>,
    device: DeviceOptions,
    permission_timeout: Duration,
    pending: PendingCommands,
}

impl std::fmt::Debug for CallController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallController")
            .field("script", &self.script)
            .field("device", &self.device)
            .field("permission_timeout", &self.permission_timeout)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl CallController {
    /// Create a controller
    pub fn new(
        script: ScriptBridge,
        coordinator: Arc<NotificationCoordinator>,
        platform: Arc<dyn Platform>,
        events: Arc<HostEventChannel>,
        device: DeviceOptions,
        permission_timeout: Duration,
    ) -> Self {
        Self {
            script,
            coordinator,
            platform,
            events,
            device,
            permission_timeout,
            pending: PendingCommands::default(),
        }
    }

    /// Fail with `NOT_READY` once the script context is gone
    pub fn ensure_ready(&self) -> CommandResult<()> {
        if self.script.is_closed() {
            return Err(CommandError::NotReady(NOT_READY.to_string()));
        }
        Ok(())
    }

    /// Register the device with an access token
    pub async fn set_token(&self, access_token: &str) -> CommandResult<bool> {
        self.ensure_ready()?;
        let value = self
            .script
            .execute(commands::device_setup(access_token, &self.device))
            .await;
        match value {
            ScriptValue::Bool(false) | ScriptValue::Fault(_) => {
                error!(result = %value.diagnostic(), "device setup failed");
                Err(CommandError::SetupFailed(value.diagnostic()))
            }
            _ => {
                info!("device setup issued");
                Ok(true)
            }
        }
    }

    /// Place an outgoing call
    pub async fn make_call(&self, from: &str, to: &str) -> CommandResult<bool> {
        self.ensure_ready()?;
        if from.is_empty() || to.is_empty() {
            return Err(CommandError::InvalidArgumentValues(
                "From and To parameters are required".to_string(),
            ));
        }

        info!(from = %from, to = %to, "placing call");
        let value = self
            .script
            .execute(commands::connect(from, to, &self.device.codec_preferences))
            .await;
        if value.is_empty_object() {
            Ok(true)
        } else {
            error!(result = %value.diagnostic(), "call setup failed");
            Err(CommandError::CallFailed(value.diagnostic()))
        }
    }

    /// [`make_call`](Self::make_call), delivering the outcome to `sink`
    pub async fn make_call_with(&self, from: &str, to: &str, sink: ResultSink<bool>) {
        sink.deliver(self.make_call(from, to).await);
    }

    /// Answer the ringing call
    ///
    /// Hides the call's incoming notification first. `Ok(false)` means there was no
    /// call to answer.
    pub async fn answer(&self) -> CommandResult<bool> {
        self.ensure_ready()?;
        self.clear_incoming_notification().await;

        match self.script.execute(commands::accept()).await.into_outcome() {
            CommandOutcome::Success(true) => Ok(true),
            CommandOutcome::Success(false) => {
                warn!("no pending call to answer");
                Ok(false)
            }
            CommandOutcome::Failure(message) => Err(CommandError::AnswerFailed(format!(
                "Failed to answer call: {}",
                message
            ))),
        }
    }

    /// [`answer`](Self::answer), delivering the outcome to `sink`
    pub async fn answer_with(&self, sink: ResultSink<bool>) {
        sink.deliver(self.answer().await);
    }

    /// Reject a ringing call or end the established one
    pub async fn hang_up(&self) -> CommandResult<bool> {
        self.hang_up_inner(false).await
    }

    async fn hang_up_inner(&self, teardown: bool) -> CommandResult<bool> {
        self.ensure_ready()?;
        self.clear_incoming_notification().await;

        match self.script.execute(commands::hang_up(teardown)).await.into_outcome() {
            CommandOutcome::Success(true) => Ok(true),
            CommandOutcome::Success(false) => {
                warn!("no active call to hang up");
                Ok(false)
            }
            CommandOutcome::Failure(message) => Err(CommandError::HangUpFailed(format!(
                "Failed to hang up call: {}",
                message
            ))),
        }
    }

    /// [`hang_up`](Self::hang_up), delivering the outcome to `sink`
    ///
    /// Without a caller, a successful hang-up also tears down the connection listeners.
    pub async fn hang_up_with(&self, sink: ResultSink<bool>) {
        let teardown = sink.is_fire_and_forget();
        let result = self.hang_up_inner(teardown).await;
        if teardown && matches!(result, Ok(true)) {
            debug!("connection listeners torn down");
        }
        sink.deliver(result);
    }

    /// Set the mute state; `Ok(None)` when there is no call
    pub async fn toggle_mute(&self, muted: bool) -> CommandResult<Option<bool>> {
        self.ensure_ready()?;
        match self.script.execute(commands::toggle_mute(muted)).await {
            ScriptValue::Null => Ok(None),
            ScriptValue::Bool(is_muted) => {
                let event = if is_muted {
                    HostEvent::Mute
                } else {
                    HostEvent::Unmute
                };
                self.events.send(&event);
                Ok(Some(is_muted))
            }
            other => Err(CommandError::MuteFailed(other.diagnostic())),
        }
    }

    /// Current mute state; `Ok(None)` when there is no call
    pub async fn is_muted(&self) -> CommandResult<Option<bool>> {
        self.ensure_ready()?;
        match self.script.execute(commands::is_muted()).await {
            ScriptValue::Null => Ok(None),
            ScriptValue::Bool(is_muted) => Ok(Some(is_muted)),
            other => Err(CommandError::MuteFailed(other.diagnostic())),
        }
    }

    /// Show a missed-call notification
    pub async fn missed_call(&self, from: &str, call_sid: &str) -> CommandResult<bool> {
        self.ensure_ready()?;
        if from.is_empty() || call_sid.is_empty() {
            return Err(CommandError::InvalidArgumentValues(
                "From and CallSid parameters are required".to_string(),
            ));
        }
        self.coordinator.show_missed(from, call_sid);
        Ok(true)
    }

    /// Whether the microphone may be used
    ///
    /// The OS capability is checked first. Otherwise the page is asked and the answer
    /// arrives as a `permission_result` push; no answer within the configured timeout
    /// counts as denied.
    pub async fn has_mic_permission(&self) -> CommandResult<bool> {
        if !self.platform.microphone_permitted() {
            info!("microphone access denied by the OS");
            return Ok(false);
        }
        self.ensure_ready()?;

        let (id, result) = self.pending.register();
        let completion = self.script.execute(commands::microphone_permission()).await;
        if completion.is_fault() {
            self.pending.forget(id);
            warn!(key = %pending_key(id), result = %completion.diagnostic(), "permission query failed");
            return Ok(false);
        }

        match tokio::time::timeout(self.permission_timeout, result).await {
            Ok(Ok(granted)) => {
                debug!(key = %pending_key(id), granted, "permission result");
                Ok(granted)
            }
            Ok(Err(_)) => Err(CommandError::Cancelled(format!(
                "{} cancelled",
                pending_key(id)
            ))),
            Err(_) => {
                self.pending.forget(id);
                warn!(key = %pending_key(id), "permission check timed out");
                Ok(false)
            }
        }
    }

    /// Same as [`has_mic_permission`](Self::has_mic_permission); the page prompts if needed
    pub async fn request_mic_permission(&self) -> CommandResult<bool> {
        self.has_mic_permission().await
    }

    /// Resolve the oldest waiting permission check
    pub fn resolve_permission(&self, granted: bool) {
        match self.pending.resolve_oldest(granted) {
            Some(id) => debug!(key = %pending_key(id), granted, "permission check resolved"),
            None => debug!(granted, "permission result with no check waiting"),
        }
    }

    /// Cancel every waiting permission check
    pub fn cancel_pending(&self) -> usize {
        let cancelled = self.pending.cancel_all();
        if cancelled > 0 {
            info!(cancelled, "cancelled pending permission checks");
        }
        cancelled
    }

    /// Number of permission checks waiting for a result
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Unregister the device
    pub async fn unregister(&self) -> CommandResult<bool> {
        self.ensure_ready()?;
        match self.script.execute(commands::unregister()).await {
            ScriptValue::Bool(true) => Ok(true),
            other => {
                error!(result = %other.diagnostic(), "failed to unregister device");
                Err(CommandError::UnregisterFailed(other.diagnostic()))
            }
        }
    }

    /// Hold is not supported on this platform
    pub fn is_holding(&self) -> bool {
        false
    }

    /// Bluetooth routing is not supported on this platform
    pub fn is_bluetooth_on(&self) -> bool {
        false
    }

    /// Speaker routing is not supported on this platform
    pub fn toggle_speaker(&self) -> bool {
        true
    }

    /// Speaker routing is not supported on this platform
    pub fn is_on_speaker(&self) -> bool {
        true
    }

    /// Dispatch a host method call by name
    pub async fn handle_method_call(&self, method: &str, args: &Value) -> CommandResult<Value> {
        debug!(method = %method, "host method call");
        match method {
            "tokens" => {
                let args = argument_map(args, "Expected access token", "Expected map with access token")?;
                let token = args.get("accessToken").and_then(Value::as_str).ok_or_else(|| {
                    CommandError::InvalidArguments("Missing access token".to_string())
                })?;
                self.set_token(token).await.map(Value::Bool)
            }
            "makeCall" => {
                self.ensure_ready()?;
                let args = args.as_object().ok_or_else(|| {
                    CommandError::InvalidArgumentValues("Invalid arguments for makeCall".to_string())
                })?;
                self.make_call(string_arg(args, "From"), string_arg(args, "To"))
                    .await
                    .map(Value::Bool)
            }
            "toggleMute" => {
                let args = argument_map(args, "Expected mute state", "Expected map with mute state")?;
                let muted = args.get("muted").and_then(Value::as_bool).ok_or_else(|| {
                    CommandError::InvalidArguments("Missing 'muted' parameter".to_string())
                })?;
                self.toggle_mute(muted).await.map(optional_bool)
            }
            "isMuted" => self.is_muted().await.map(optional_bool),
            "hangUp" => self.hang_up().await.map(Value::Bool),
            "answer" => self.answer().await.map(Value::Bool),
            "missedCall" => {
                self.ensure_ready()?;
                let args = args.as_object().ok_or_else(|| {
                    CommandError::InvalidArgumentValues("Invalid arguments for missedCall".to_string())
                })?;
                self.missed_call(string_arg(args, "From"), string_arg(args, "CallSid"))
                    .await
                    .map(Value::Bool)
            }
            "hasMicPermission" => self.has_mic_permission().await.map(Value::Bool),
            "requestMicPermission" => self.request_mic_permission().await.map(Value::Bool),
            "isHolding" => Ok(json!(self.is_holding())),
            "isBluetoothOn" => Ok(json!(self.is_bluetooth_on())),
            "toggleSpeaker" => Ok(json!(self.toggle_speaker())),
            "isOnSpeaker" => Ok(json!(self.is_on_speaker())),
            "unregister" => self.unregister().await.map(Value::Bool),
            other => Err(CommandError::NotImplemented(other.to_string())),
        }
    }

    async fn clear_incoming_notification(&self) {
        match self.script.execute(commands::active_call_sid()).await {
            ScriptValue::Text(call_sid) if !call_sid.is_empty() => {
                self.coordinator.hide(&call_sid, NotificationKind::Incoming);
            }
            other => debug!(result = %other.diagnostic(), "no active call sid"),
        }
    }
}

fn argument_map<'a>(
    args: &'a Value,
    missing: &str,
    not_a_map: &str,
) -> CommandResult<&'a Map<String, Value>> {
    if args.is_null() {
        return Err(CommandError::InvalidArguments(missing.to_string()));
    }
    args.as_object()
        .ok_or_else(|| CommandError::InvalidArguments(not_a_map.to_string()))
}

/// A string argument, or `""` when absent or not a string
fn string_arg<'a>(args: &'a Map<String, Value>, key: &str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn optional_bool(value: Option<bool>) -> Value {
    value.map(Value::Bool).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifierError;
    use crate::notification::{Notifier, ToastContent, ToastHandle};
    use crate::script::{ScriptContext, ScriptFault};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;

    /// Answers scripts by matching a marker substring
    struct CannedContext {
        answers: Vec<(&'static str, &'static str)>,
        scripts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ScriptContext for CannedContext {
        async fn execute_script(&self, script: &str) -> Result<String, ScriptFault> {
            self.scripts.lock().push(script.to_string());
            for (marker, answer) in &self.answers {
                if script.contains(marker) {
                    return Ok(answer.to_string());
                }
            }
            Ok("null".to_string())
        }
    }

    struct NullNotifier;

    impl Notifier for NullNotifier {
        fn has_permission(&self) -> bool {
            true
        }
        fn initialize(&self) -> Result<(), NotifierError> {
            Ok(())
        }
        fn show(&self, _toast: &ToastContent) -> Result<ToastHandle, NotifierError> {
            Ok(ToastHandle::new(0))
        }
        fn hide(&self, _handle: ToastHandle) -> Result<(), NotifierError> {
            Ok(())
        }
    }

    struct FixedPlatform {
        microphone: AtomicBool,
    }

    impl Platform for FixedPlatform {
        fn microphone_permitted(&self) -> bool {
            self.microphone.load(Ordering::SeqCst)
        }
        fn flash_window(&self, _active: bool) {}
    }

    fn controller(answers: Vec<(&'static str, &'static str)>) -> (Arc<CannedContext>, CallController) {
        controller_with(answers, true)
    }

    fn controller_with(
        answers: Vec<(&'static str, &'static str)>,
        microphone: bool,
    ) -> (Arc<CannedContext>, CallController) {
        let context = Arc::new(CannedContext {
            answers,
            scripts: Mutex::new(Vec::new()),
        });
        let (script, _task) = ScriptBridge::spawn(context.clone());
        let controller = CallController::new(
            script,
            Arc::new(NotificationCoordinator::new(Arc::new(NullNotifier), "Unknown Caller")),
            Arc::new(FixedPlatform {
                microphone: AtomicBool::new(microphone),
            }),
            Arc::new(HostEventChannel::new()),
            DeviceOptions::default(),
            Duration::from_millis(50),
        );
        (context, controller)
    }

    #[tokio::test]
    async fn tokens_argument_validation() {
        let (context, ctl) = controller(vec![]);
        let err = ctl.handle_method_call("tokens", &Value::Null).await.unwrap_err();
        assert_eq!((err.kind(), err.message()), ("Invalid Arguments", "Expected access token"));
        let err = ctl.handle_method_call("tokens", &json!("abc")).await.unwrap_err();
        assert_eq!(err.message(), "Expected map with access token");
        let err = ctl.handle_method_call("tokens", &json!({})).await.unwrap_err();
        assert_eq!(err.message(), "Missing access token");
        assert!(context.scripts.lock().is_empty());
    }

    #[tokio::test]
    async fn setup_false_is_setup_failed() {
        let (_context, ctl) = controller(vec![("new Twilio.Device", "false")]);
        let err = ctl.set_token("tok").await.unwrap_err();
        assert_eq!((err.kind(), err.message()), ("Setup Failed", "false"));
    }

    #[tokio::test]
    async fn setup_promise_counts_as_success() {
        let (_context, ctl) = controller(vec![("new Twilio.Device", "{}")]);
        assert_eq!(ctl.handle_method_call("tokens", &json!({"accessToken": "tok"})).await, Ok(json!(true)));
    }

    #[tokio::test]
    async fn make_call_requires_both_parties() {
        let (context, ctl) = controller(vec![]);
        let err = ctl
            .handle_method_call("makeCall", &json!({"From": "+1A"}))
            .await
            .unwrap_err();
        assert_eq!((err.kind(), err.message()), ("INVALID_ARGUMENTS", "From and To parameters are required"));
        assert!(context.scripts.lock().is_empty());
    }

    #[tokio::test]
    async fn make_call_success_and_failure() {
        let (_context, ctl) = controller(vec![("device.connect", "{}")]);
        assert_eq!(ctl.make_call("+1A", "+1B").await, Ok(true));

        let (_context, ctl) = controller(vec![("device.connect", "\"Twilio Device not initialized\"")]);
        let err = ctl.make_call("+1A", "+1B").await.unwrap_err();
        assert_eq!(err.kind(), "CALL_FAILED");
    }

    #[tokio::test]
    async fn answer_outcomes() {
        let (_context, ctl) = controller(vec![("connection.accept()", "true")]);
        assert_eq!(ctl.answer().await, Ok(true));

        let (_context, ctl) = controller(vec![("connection.accept()", "false")]);
        assert_eq!(ctl.answer().await, Ok(false));

        let (_context, ctl) = controller(vec![("connection.accept()", "\"boom\"")]);
        let err = ctl.answer().await.unwrap_err();
        assert_eq!((err.kind(), err.message()), ("ANSWER_FAILED", "Failed to answer call: boom"));
    }

    #[tokio::test]
    async fn toggle_mute_reports_state() {
        let (_context, ctl) = controller(vec![("mute(true)", "true")]);
        let mut stream = ctl.events.listen();
        assert_eq!(
            ctl.handle_method_call("toggleMute", &json!({"muted": true})).await,
            Ok(json!(true))
        );
        assert_eq!(stream.next().await.as_deref(), Some("Mute"));

        let err = ctl.handle_method_call("toggleMute", &json!({})).await.unwrap_err();
        assert_eq!(err.message(), "Missing 'muted' parameter");
    }

    #[tokio::test]
    async fn no_call_mutes_to_null() {
        let (_context, ctl) = controller(vec![]);
        assert_eq!(ctl.handle_method_call("isMuted", &Value::Null).await, Ok(Value::Null));
    }

    #[tokio::test]
    async fn stubs_and_unknown_methods() {
        let (_context, ctl) = controller(vec![]);
        assert_eq!(ctl.handle_method_call("isHolding", &Value::Null).await, Ok(json!(false)));
        assert_eq!(ctl.handle_method_call("toggleSpeaker", &Value::Null).await, Ok(json!(true)));
        let err = ctl.handle_method_call("transfer", &Value::Null).await.unwrap_err();
        assert_eq!(err.kind(), "NOT_IMPLEMENTED");
    }

    #[tokio::test]
    async fn unregister_failure_carries_result() {
        let (_context, ctl) = controller(vec![("device.unregister()", "false")]);
        let err = ctl.unregister().await.unwrap_err();
        assert_eq!((err.kind(), err.message()), ("UNREGISTER_FAILED", "false"));
    }

    #[tokio::test]
    async fn os_denied_microphone_skips_script() {
        let (context, ctl) = controller_with(vec![], false);
        assert_eq!(ctl.has_mic_permission().await, Ok(false));
        assert!(context.scripts.lock().is_empty());
    }

    #[tokio::test]
    async fn permission_check_times_out_to_false() {
        let (_context, ctl) = controller(vec![("navigator.permissions", "{}")]);
        assert_eq!(ctl.has_mic_permission().await, Ok(false));
        assert_eq!(ctl.pending_count(), 0);
    }

    #[tokio::test]
    async fn permission_results_resolve_oldest_first() {
        let pending = PendingCommands::default();
        let (first, rx1) = pending.register();
        let (_second, rx2) = pending.register();
        assert_eq!(pending.resolve_oldest(true), Some(first));
        assert_eq!(rx1.await, Ok(true));
        assert_eq!(pending.cancel_all(), 1);
        assert!(rx2.await.is_err());
        assert_eq!(pending.resolve_oldest(false), None);
    }

    #[tokio::test]
    async fn fire_and_forget_sink_swallows_errors() {
        let sink: ResultSink<bool> = ResultSink::FireAndForget;
        sink.deliver(Err(CommandError::HangUpFailed("x".into())));

        let (sink, rx) = ResultSink::channel();
        sink.deliver(Ok(true));
        assert_eq!(rx.await, Ok(Ok(true)));
    }
}

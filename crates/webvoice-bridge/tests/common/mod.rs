//! Shared test doubles for the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use webvoice_bridge::{
    ActivationRegistrar, BridgeConfig, HostEventStream, Notifier, NotifierError, Platform,
    ScriptContext, ToastContent, ToastHandle, VoiceBridge,
};
use webvoice_bridge::script::ScriptFault;

/// How the fake page answers a script containing `marker`
#[derive(Clone)]
pub struct Rule {
    pub marker: &'static str,
    pub result: &'static str,
    pub push: Option<String>,
}

pub fn rule(marker: &'static str, result: &'static str) -> Rule {
    Rule {
        marker,
        result,
        push: None,
    }
}

pub fn rule_with_push(marker: &'static str, result: &'static str, push: String) -> Rule {
    Rule {
        marker,
        result,
        push: Some(push),
    }
}

/// Script context that answers from a rule table and records every script
pub struct FakePage {
    rules: Mutex<Vec<Rule>>,
    scripts: Mutex<Vec<String>>,
    outbox: mpsc::UnboundedSender<String>,
}

impl FakePage {
    pub fn new(rules: Vec<Rule>) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (outbox, rx) = mpsc::unbounded_channel();
        let page = Arc::new(Self {
            rules: Mutex::new(rules),
            scripts: Mutex::new(Vec::new()),
            outbox,
        });
        (page, rx)
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().clone()
    }

    pub fn ran(&self, marker: &str) -> usize {
        self.scripts.lock().iter().filter(|s| s.contains(marker)).count()
    }
}

#[async_trait]
impl ScriptContext for FakePage {
    async fn execute_script(&self, script: &str) -> Result<String, ScriptFault> {
        self.scripts.lock().push(script.to_string());
        let matched = self
            .rules
            .lock()
            .iter()
            .find(|rule| script.contains(rule.marker))
            .cloned();
        match matched {
            Some(rule) => {
                if let Some(push) = rule.push {
                    let _ = self.outbox.send(push);
                }
                Ok(rule.result.to_string())
            }
            None => Ok("null".to_string()),
        }
    }
}

/// Notifier that records what it was asked to do
#[derive(Default)]
pub struct RecordingNotifier {
    next: AtomicU64,
    pub shown: Mutex<Vec<ToastContent>>,
    pub hidden: Mutex<Vec<ToastHandle>>,
}

impl Notifier for RecordingNotifier {
    fn has_permission(&self) -> bool {
        true
    }

    fn initialize(&self) -> Result<(), NotifierError> {
        Ok(())
    }

    fn show(&self, toast: &ToastContent) -> Result<ToastHandle, NotifierError> {
        self.shown.lock().push(toast.clone());
        Ok(ToastHandle::new(self.next.fetch_add(1, Ordering::SeqCst)))
    }

    fn hide(&self, handle: ToastHandle) -> Result<(), NotifierError> {
        self.hidden.lock().push(handle);
        Ok(())
    }
}

/// Platform with a fixed microphone answer that records window flashes
pub struct FixedPlatform {
    microphone: AtomicBool,
    pub flashes: Mutex<Vec<bool>>,
}

impl FixedPlatform {
    pub fn new(microphone: bool) -> Self {
        Self {
            microphone: AtomicBool::new(microphone),
            flashes: Mutex::new(Vec::new()),
        }
    }
}

impl Platform for FixedPlatform {
    fn microphone_permitted(&self) -> bool {
        self.microphone.load(Ordering::SeqCst)
    }

    fn flash_window(&self, active: bool) {
        self.flashes.lock().push(active);
    }
}

/// Registrar that counts registrations
#[derive(Default)]
pub struct RecordingRegistrar {
    pub registered: Mutex<Vec<String>>,
    pub unregistered: Mutex<Vec<String>>,
}

impl ActivationRegistrar for RecordingRegistrar {
    fn register(&self, app_id: &str, _display_name: &str) -> Result<(), NotifierError> {
        self.registered.lock().push(app_id.to_string());
        Ok(())
    }

    fn unregister(&self, app_id: &str) -> Result<(), NotifierError> {
        self.unregistered.lock().push(app_id.to_string());
        Ok(())
    }
}

/// A started bridge with every collaborator exposed
pub struct Harness {
    pub bridge: Arc<VoiceBridge>,
    pub page: Arc<FakePage>,
    pub notifier: Arc<RecordingNotifier>,
    pub platform: Arc<FixedPlatform>,
    pub registrar: Arc<RecordingRegistrar>,
}

impl Harness {
    pub async fn start(rules: Vec<Rule>) -> Self {
        let config = BridgeConfig::builder()
            .app_id("Tests.WebVoice")
            .permission_timeout(Duration::from_millis(100))
            .build()
            .expect("valid config");
        Self::start_with(config, rules, true).await
    }

    pub async fn start_with(config: BridgeConfig, rules: Vec<Rule>, microphone: bool) -> Self {
        let (page, mut outbox) = FakePage::new(rules);
        let notifier = Arc::new(RecordingNotifier::default());
        let platform = Arc::new(FixedPlatform::new(microphone));
        let registrar = Arc::new(RecordingRegistrar::default());

        let bridge = Arc::new(
            VoiceBridge::start(
                config,
                page.clone(),
                notifier.clone(),
                platform.clone(),
                registrar.clone(),
            )
            .await
            .expect("bridge starts"),
        );

        // page.postMessage from inside scripts
        let forward = bridge.clone();
        tokio::spawn(async move {
            while let Some(message) = outbox.recv().await {
                forward.post_message(message);
            }
        });

        Self {
            bridge,
            page,
            notifier,
            platform,
            registrar,
        }
    }
}

/// A `call_event` record as the page posts it
pub fn call_event(event: &str, from: &str, to: &str, call_sid: &str, params: &str) -> String {
    serde_json::json!({
        "type": "call_event",
        "event": event,
        "from": from,
        "to": to,
        "callSid": call_sid,
        "customParams": params,
    })
    .to_string()
}

/// Next host event, failing the test after a second
pub async fn next_event(stream: &mut HostEventStream) -> String {
    tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("host event within timeout")
        .expect("host stream open")
}

/// Wait until `check` holds, failing the test after a second
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

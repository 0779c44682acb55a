//! # WebVoice Bridge - native host ⇄ web VoIP SDK call bridge
//!
//! This crate connects a native host application to a VoIP SDK running inside an
//! embedded web page. It:
//! - **script**: serializes host commands into scripts run on a single owner task
//! - **events**: translates messages the page pushes into call lifecycle events
//! - **notification**: keeps one OS notification per ringing or missed call
//! - **activation**: routes notification clicks back into call control, even when no
//!   host listener is attached
//!
//! The web engine, the OS notifier and the window are collaborators behind traits
//! ([`ScriptContext`], [`Notifier`], [`Platform`], [`ActivationRegistrar`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use webvoice_bridge::{BridgeConfig, VoiceBridge};
//! # use webvoice_bridge::{ActivationRegistrar, Notifier, Platform, ScriptContext};
//! # async fn run(
//! #     page: Arc<dyn ScriptContext>,
//! #     notifier: Arc<dyn Notifier>,
//! #     platform: Arc<dyn Platform>,
//! #     registrar: Arc<dyn ActivationRegistrar>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let bridge = VoiceBridge::start(BridgeConfig::default(), page, notifier, platform, registrar).await?;
//! let mut events = bridge.listen();
//!
//! bridge
//!     .handle_method_call("tokens", &serde_json::json!({ "accessToken": "eyJ..." }))
//!     .await?;
//!
//! while let Some(event) = events.next().await {
//!     println!("host event: {}", event);
//! }
//!
//! bridge.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! host command ──► CallController ──► ScriptBridge ──► page
//!                                                        │ postMessage
//! host events ◄── HostEventChannel ◄── Dispatcher ◄──────┘
//!                                          │
//!                                          ▼
//!                               NotificationCoordinator ──► OS notifier
//!                                          ▲
//! notification click ──► activation::activate ──► CallController
//! ```

#![warn(missing_docs)]

pub mod activation;
pub mod bridge;
pub mod call;
pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod logging;
pub mod notification;
pub mod params;
pub mod script;
pub mod sink;

// Re-export main types
pub use activation::{ActivationRegistrar, ActivationRouter, RoutedAction};
pub use bridge::VoiceBridge;
pub use call::{CallDirection, CallRecord};
pub use config::{BridgeConfig, BridgeConfigBuilder};
pub use control::{CallController, Platform, ResultSink};
pub use error::{
    ActivationError, BridgeError, BridgeResult, CommandError, CommandResult, ConfigError,
    NotifierError,
};
pub use events::{CallEvent, CallParties, HostEvent};
pub use logging::{setup_logging, LoggingConfig};
pub use notification::{
    ActivationContext, NotificationCoordinator, NotificationKind, NotificationState, Notifier,
    ToastContent, ToastHandle,
};
pub use params::CustomParams;
pub use script::{CommandOutcome, PushMessageHandler, ScriptBridge, ScriptContext, ScriptValue};
pub use sink::{HostEventChannel, HostEventStream};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Event translation
//!
//! Push messages from the page are structured records. [`parse_push`] turns one raw
//! message into at most one [`PushMessage`]; [`translate`] keeps only call events.
//! Each [`CallEvent`] then expands into the [`HostEvent`] strings the host listens for.
//!
//! # Host event strings
//!
//! | Call event     | Host strings                                    |
//! |----------------|-------------------------------------------------|
//! | `incoming`     | `Incoming\|<from>\|<to>\|Incoming\|<params>`    |
//! | `connected`    | `Connected\|<from>\|<to>\|Outgoing\|<params>`   |
//! | `accept`       | `Answer\|<from>\|<to>\|<params>`                |
//! | `cancel`       | `Missed Call`, then `Call Ended`                |
//! | `disconnected` | `Call Ended`                                    |
//! | `reject`       | `LOG\|Call Rejected`                            |
//! | `error`        | `Error\|<message>`                              |
//! | anything else  | the event name, first letter capitalized        |

use serde::Deserialize;
use tracing::{debug, warn};

use crate::call::{CallDirection, CallRecord};
use crate::params::CustomParams;

const CALL_EVENT_TYPE: &str = "call_event";
const PERMISSION_RESULT_TYPE: &str = "permission_result";
const UNKNOWN_ERROR: &str = "Unknown error";

/// Addresses and metadata carried by call lifecycle events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallParties {
    /// Caller address
    pub from: String,
    /// Callee address
    pub to: String,
    /// Call identifier, empty when the page did not send one
    pub call_sid: String,
    /// Decoded custom parameters
    pub params: CustomParams,
}

impl CallParties {
    /// Build the parties block for an event
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        call_sid: impl Into<String>,
        params: CustomParams,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            call_sid: call_sid.into(),
            params,
        }
    }
}

/// A normalized call lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    /// An inbound call is ringing
    Incoming(CallParties),
    /// The caller gave up before the call was answered
    Cancel(CallParties),
    /// An outbound call connected
    Connected(CallParties),
    /// The call was answered
    Accept(CallParties),
    /// The call ended
    Disconnected,
    /// The call was rejected
    Reject,
    /// The SDK reported an error
    Error {
        /// SDK diagnostic
        message: String,
    },
    /// Any event this bridge does not interpret
    Other {
        /// Event name as sent by the page
        name: String,
    },
}

/// Anything the page pushes that the bridge understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMessage {
    /// A call lifecycle event
    Call(CallEvent),
    /// Answer to a microphone permission query
    PermissionResult {
        /// Whether the page holds microphone permission
        granted: bool,
    },
}

#[derive(Debug, Deserialize)]
struct PushRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default, rename = "callSid")]
    call_sid: Option<String>,
    #[serde(default, rename = "customParams")]
    custom_params: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    granted: Option<bool>,
}

impl PushRecord {
    fn parties(&self) -> CallParties {
        CallParties {
            from: self.from.clone().unwrap_or_default(),
            to: self.to.clone().unwrap_or_default(),
            call_sid: self.call_sid.clone().unwrap_or_default(),
            params: self
                .custom_params
                .as_deref()
                .map(CustomParams::from_query)
                .unwrap_or_default(),
        }
    }
}

/// Cut the outermost `{ ... }` out of a possibly wrapped message
pub fn extract_payload(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

/// Parse one raw push message
///
/// Malformed or unrecognised messages are logged and yield `None`.
pub fn parse_push(raw: &str) -> Option<PushMessage> {
    let Some(payload) = extract_payload(raw) else {
        debug!(message = %raw, "push message carries no structured payload");
        return None;
    };

    let record: PushRecord = match serde_json::from_str(payload) {
        Ok(record) => record,
        Err(e) => {
            warn!(error = %e, "discarding malformed push message");
            return None;
        }
    };

    match record.kind.as_str() {
        CALL_EVENT_TYPE => call_event(&record).map(PushMessage::Call),
        PERMISSION_RESULT_TYPE => Some(PushMessage::PermissionResult {
            granted: record.granted.unwrap_or(false),
        }),
        other => {
            debug!(kind = %other, "ignoring push message of unknown type");
            None
        }
    }
}

/// Translate one raw push message into a call event
pub fn translate(raw: &str) -> Option<CallEvent> {
    match parse_push(raw)? {
        PushMessage::Call(event) => Some(event),
        PushMessage::PermissionResult { .. } => None,
    }
}

fn call_event(record: &PushRecord) -> Option<CallEvent> {
    let Some(name) = record.event.as_deref() else {
        debug!("call_event record without an event name");
        return None;
    };

    let event = match name {
        "incoming" => CallEvent::Incoming(record.parties()),
        "cancel" => CallEvent::Cancel(record.parties()),
        "connected" => CallEvent::Connected(record.parties()),
        "accept" => CallEvent::Accept(record.parties()),
        "disconnected" => CallEvent::Disconnected,
        "reject" => CallEvent::Reject,
        "error" => CallEvent::Error {
            message: record.error.clone().unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
        },
        "" => {
            debug!("call_event record with an empty event name");
            return None;
        }
        other => CallEvent::Other {
            name: other.to_string(),
        },
    };
    Some(event)
}

impl CallEvent {
    /// Short name for logging
    pub fn name(&self) -> &str {
        match self {
            Self::Incoming(_) => "incoming",
            Self::Cancel(_) => "cancel",
            Self::Connected(_) => "connected",
            Self::Accept(_) => "accept",
            Self::Disconnected => "disconnected",
            Self::Reject => "reject",
            Self::Error { .. } => "error",
            Self::Other { name } => name,
        }
    }

    /// The parties block, for events that carry one
    pub fn parties(&self) -> Option<&CallParties> {
        match self {
            Self::Incoming(p) | Self::Cancel(p) | Self::Connected(p) | Self::Accept(p) => Some(p),
            _ => None,
        }
    }

    /// True for events after which the call no longer exists
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancel(_) | Self::Disconnected | Self::Reject)
    }

    /// The call record this event creates, if any
    pub fn call_record(&self) -> Option<CallRecord> {
        match self {
            Self::Incoming(p) => Some(CallRecord::new(
                &p.call_sid,
                &p.from,
                CallDirection::Incoming,
                p.params.clone(),
            )),
            Self::Connected(p) => Some(CallRecord::new(
                &p.call_sid,
                &p.to,
                CallDirection::Outgoing,
                p.params.clone(),
            )),
            _ => None,
        }
    }

    /// Host event strings for this event, in delivery order
    pub fn host_events(&self) -> Vec<HostEvent> {
        match self {
            Self::Incoming(p) => vec![HostEvent::Incoming(p.clone())],
            Self::Connected(p) => vec![HostEvent::Connected(p.clone())],
            Self::Accept(p) => vec![HostEvent::Answer(p.clone())],
            Self::Cancel(_) => vec![HostEvent::MissedCall, HostEvent::CallEnded],
            Self::Disconnected => vec![HostEvent::CallEnded],
            Self::Reject => vec![HostEvent::CallRejected],
            Self::Error { message } => vec![HostEvent::Error(message.clone())],
            Self::Other { name } => vec![HostEvent::Signal(capitalize(name))],
        }
    }
}

/// An event delivered to the host as a pipe-delimited string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// `Incoming|<from>|<to>|Incoming|<params>`
    Incoming(CallParties),
    /// `Connected|<from>|<to>|Outgoing|<params>`
    Connected(CallParties),
    /// `Answer|<from>|<to>|<params>`
    Answer(CallParties),
    /// `Missed Call`
    MissedCall,
    /// `Call Ended`
    CallEnded,
    /// `LOG|Call Rejected`
    CallRejected,
    /// `Error|<message>`
    Error(String),
    /// `Mute`
    Mute,
    /// `Unmute`
    Unmute,
    /// A bare event name
    Signal(String),
}

impl HostEvent {
    /// Encode for the host event channel
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for HostEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incoming(p) => write!(
                f,
                "Incoming|{}|{}|{}|{}",
                p.from,
                p.to,
                CallDirection::Incoming,
                p.params.to_json()
            ),
            Self::Connected(p) => write!(
                f,
                "Connected|{}|{}|{}|{}",
                p.from,
                p.to,
                CallDirection::Outgoing,
                p.params.to_json()
            ),
            Self::Answer(p) => write!(f, "Answer|{}|{}|{}", p.from, p.to, p.params.to_json()),
            Self::MissedCall => f.write_str("Missed Call"),
            Self::CallEnded => f.write_str("Call Ended"),
            Self::CallRejected => f.write_str("LOG|Call Rejected"),
            Self::Error(message) => write!(f, "Error|{}", message),
            Self::Mute => f.write_str("Mute"),
            Self::Unmute => f.write_str("Unmute"),
            Self::Signal(name) => f.write_str(name),
        }
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn incoming_json(custom: &str) -> String {
        serde_json::json!({
            "type": "call_event",
            "event": "incoming",
            "from": "+15551234",
            "to": "+15555678",
            "callSid": "CA123",
            "customParams": custom,
        })
        .to_string()
    }

    #[test]
    fn incoming_encodes_exactly() {
        let event = translate(&incoming_json("")).unwrap();
        let host: Vec<String> = event.host_events().iter().map(HostEvent::encode).collect();
        assert_eq!(host, vec!["Incoming|+15551234|+15555678|Incoming|{}"]);
    }

    #[test]
    fn custom_params_are_decoded_and_reencoded() {
        let event = translate(&incoming_json("\"__TWI_CALLER_NAME=Jane+Doe&ref=a%26b\"")).unwrap();
        let parties = event.parties().unwrap();
        assert_eq!(parties.params.get("__TWI_CALLER_NAME"), Some("Jane Doe"));
        assert_eq!(
            event.host_events()[0].encode(),
            r#"Incoming|+15551234|+15555678|Incoming|{"__TWI_CALLER_NAME":"Jane Doe","ref":"a&b"}"#
        );
    }

    #[test]
    fn wrapped_payload_is_unwrapped() {
        let raw = format!("log: {} trailing", incoming_json(""));
        assert!(matches!(translate(&raw), Some(CallEvent::Incoming(_))));
        assert_eq!(extract_payload("no braces"), None);
        assert_eq!(extract_payload("} backwards {"), None);
    }

    #[test]
    fn malformed_messages_are_discarded() {
        assert_eq!(translate("{not json}"), None);
        assert_eq!(translate("\"Disconnected\""), None);
        assert_eq!(translate(r#"{"event":"incoming"}"#), None);
        assert_eq!(translate(r#"{"type":"call_event"}"#), None);
        assert_eq!(translate(r#"{"type":"telemetry","event":"x"}"#), None);
    }

    #[test]
    #[traced_test]
    fn malformed_json_is_logged() {
        assert_eq!(parse_push("{\"type\": }"), None);
        assert!(logs_contain("discarding malformed push message"));
    }

    #[test]
    fn cancel_expands_to_missed_then_ended() {
        let raw = r#"{"type":"call_event","event":"cancel","from":"a","to":"b","callSid":"CA9"}"#;
        let event = translate(raw).unwrap();
        assert!(event.is_terminal());
        let host: Vec<String> = event.host_events().iter().map(HostEvent::encode).collect();
        assert_eq!(host, vec!["Missed Call", "Call Ended"]);
    }

    #[test]
    fn fixed_literals() {
        let encode = |raw: &str| -> Vec<String> {
            translate(raw).unwrap().host_events().iter().map(HostEvent::encode).collect()
        };
        assert_eq!(encode(r#"{"type":"call_event","event":"disconnected"}"#), vec!["Call Ended"]);
        assert_eq!(encode(r#"{"type":"call_event","event":"reject"}"#), vec!["LOG|Call Rejected"]);
        assert_eq!(
            encode(r#"{"type":"call_event","event":"error","error":"31005"}"#),
            vec!["Error|31005"]
        );
        assert_eq!(encode(r#"{"type":"call_event","event":"error"}"#), vec!["Error|Unknown error"]);
        assert_eq!(
            encode(r#"{"type":"call_event","event":"accept","from":"a","to":"b"}"#),
            vec!["Answer|a|b|{}"]
        );
        assert_eq!(
            encode(r#"{"type":"call_event","event":"connected","from":"+1A","to":"+1B"}"#),
            vec!["Connected|+1A|+1B|Outgoing|{}"]
        );
    }

    #[test]
    fn unknown_events_become_capitalized_signals() {
        let event = translate(r#"{"type":"call_event","event":"ringing"}"#).unwrap();
        assert_eq!(event, CallEvent::Other { name: "ringing".into() });
        assert_eq!(event.host_events(), vec![HostEvent::Signal("Ringing".into())]);
    }

    #[test]
    fn permission_results_are_not_call_events() {
        let raw = r#"{"type":"permission_result","granted":true}"#;
        assert_eq!(parse_push(raw), Some(PushMessage::PermissionResult { granted: true }));
        assert_eq!(translate(raw), None);
    }

    #[test]
    fn call_records_follow_direction() {
        let incoming = translate(&incoming_json("")).unwrap().call_record().unwrap();
        assert_eq!(incoming.direction, CallDirection::Incoming);
        assert_eq!(incoming.peer, "+15551234");

        let raw = r#"{"type":"call_event","event":"connected","from":"+1A","to":"+1B","callSid":"CA7"}"#;
        let outgoing = translate(raw).unwrap().call_record().unwrap();
        assert_eq!(outgoing.direction, CallDirection::Outgoing);
        assert_eq!(outgoing.peer, "+1B");
        assert_eq!(outgoing.call_id, "CA7");
    }
}

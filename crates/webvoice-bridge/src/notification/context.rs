//! Activation context
//!
//! The OS may activate the process long after the notification was shown, without any
//! host listener. The coordinator keeps the arguments of the most recent notification so
//! a "call back" can be re-issued from them.

use std::collections::BTreeMap;

use super::toast::{NotificationAction, NotificationKind};

/// Single-slot context left behind by the most recent notification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationContext {
    /// The primary action of the notification that produced this context
    pub last_action: String,
    /// Arguments reconstructed from the `key:value|key:value` encoding
    pub last_args: BTreeMap<String, String>,
}

impl ActivationContext {
    /// Context for a freshly shown notification
    pub fn for_notification(kind: NotificationKind, from: &str, call_id: &str) -> Self {
        let action = match kind {
            NotificationKind::Incoming => NotificationAction::Accept,
            NotificationKind::Missed => NotificationAction::CallBack,
        };
        Self::parse(action.as_str(), &encode_args(from, call_id))
    }

    /// Rebuild a context from its pipe-delimited encoding
    ///
    /// Segments without `:` are skipped. Values may themselves contain `:`.
    pub fn parse(action: &str, encoded: &str) -> Self {
        let last_args = encoded
            .split('|')
            .filter_map(|segment| segment.split_once(':'))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            last_action: action.to_string(),
            last_args,
        }
    }

    /// The pipe-delimited encoding, `from:<from>|to:<callId>`
    pub fn encode(&self) -> String {
        self.last_args
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Look up an argument
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.last_args.get(key).map(String::as_str)
    }

    /// Caller and callee strings for a call back, as stored
    pub fn call_back_parties(&self) -> (String, String) {
        (
            self.arg("from").unwrap_or_default().to_string(),
            self.arg("to").unwrap_or_default().to_string(),
        )
    }
}

fn encode_args(from: &str, call_id: &str) -> String {
    format!("from:{}|to:{}", from, call_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incoming_context_encodes_from_and_call_id() {
        let ctx = ActivationContext::for_notification(NotificationKind::Incoming, "+1555", "CA1");
        assert_eq!(ctx.last_action, "accept");
        assert_eq!(ctx.encode(), "from:+1555|to:CA1");
        assert_eq!(ctx.call_back_parties(), ("+1555".to_string(), "CA1".to_string()));
    }

    #[test]
    fn missed_context_prepares_call_back() {
        let ctx = ActivationContext::for_notification(NotificationKind::Missed, "Jane", "CA2");
        assert_eq!(ctx.last_action, "call");
        assert_eq!(ctx.arg("to"), Some("CA2"));
    }

    #[test]
    fn parse_skips_junk_and_keeps_colons_in_values() {
        let ctx = ActivationContext::parse("call", "from:sip:alice@example.com|junk|to:CA9");
        assert_eq!(ctx.arg("from"), Some("sip:alice@example.com"));
        assert_eq!(ctx.arg("to"), Some("CA9"));
        assert_eq!(ctx.last_args.len(), 2);
    }

    #[test]
    fn empty_context_yields_empty_parties() {
        let ctx = ActivationContext::default();
        assert_eq!(ctx.call_back_parties(), (String::new(), String::new()));
    }
}

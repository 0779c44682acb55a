//! Notification content and action encoding

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a notification announces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    /// A ringing inbound call
    Incoming,
    /// An inbound call nobody answered
    Missed,
}

impl NotificationKind {
    /// Title line of the notification
    pub fn title(&self) -> &'static str {
        match self {
            Self::Incoming => "Incoming Call",
            Self::Missed => "Missed Call",
        }
    }
}

/// A user action carried by a notification, encoded as `action:callId`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationAction {
    /// Answer the ringing call
    Accept,
    /// Reject the ringing call
    Reject,
    /// Call the missed caller back
    CallBack,
}

impl NotificationAction {
    /// The action token used in invocation strings
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::CallBack => "call",
        }
    }

    /// Button label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Accept => "Accept",
            Self::Reject => "Reject",
            Self::CallBack => "Call Back",
        }
    }

    /// The invocation string the OS hands back when the action is clicked
    pub fn invocation(&self, call_id: &str) -> String {
        format!("{}:{}", self.as_str(), call_id)
    }
}

impl FromStr for NotificationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(Self::Accept),
            "reject" => Ok(Self::Reject),
            "call" => Ok(Self::CallBack),
            other => Err(format!("unknown notification action `{}`", other)),
        }
    }
}

/// A button on a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToastAction {
    /// Button label
    pub label: String,
    /// Invocation string, `action:callId`
    pub arguments: String,
}

/// Everything needed to render one OS notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToastContent {
    /// Incoming or missed
    pub kind: NotificationKind,
    /// First line
    pub title: String,
    /// Caller identity line
    pub caller: String,
    /// Tag used to address the notification later (the call id)
    pub tag: String,
    /// Buttons, in display order
    pub actions: Vec<ToastAction>,
}

impl ToastContent {
    /// Build the notification for a call
    ///
    /// Incoming calls get Accept and Reject buttons. Missed calls carry no actions yet.
    pub fn for_call(kind: NotificationKind, caller: &str, call_id: &str) -> Self {
        let actions = match kind {
            NotificationKind::Incoming => [NotificationAction::Accept, NotificationAction::Reject]
                .iter()
                .map(|action| ToastAction {
                    label: action.label().to_string(),
                    arguments: action.invocation(call_id),
                })
                .collect(),
            NotificationKind::Missed => Vec::new(),
        };

        Self {
            kind,
            title: kind.title().to_string(),
            caller: caller.to_string(),
            tag: call_id.to_string(),
            actions,
        }
    }

    /// Render the toast XML document
    pub fn to_xml(&self) -> String {
        let scenario = match self.kind {
            NotificationKind::Incoming => " scenario='alarm' silent='true'",
            NotificationKind::Missed => "",
        };

        let mut xml = format!(
            "<toast{}><visual><binding template='ToastGeneric'><text>{}</text><text>{}</text></binding></visual><actions>",
            scenario,
            xml_escape(&self.title),
            xml_escape(&self.caller),
        );
        for action in &self.actions {
            xml.push_str(&format!(
                "<action content='{}' arguments='{}' activationType='foreground'/>",
                xml_escape(&action.label),
                xml_escape(&action.arguments),
            ));
        }
        xml.push_str("</actions></toast>");
        xml
    }
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incoming_toast_has_accept_and_reject() {
        let toast = ToastContent::for_call(NotificationKind::Incoming, "Jane", "CA1");
        assert_eq!(toast.title, "Incoming Call");
        assert_eq!(toast.tag, "CA1");
        let args: Vec<&str> = toast.actions.iter().map(|a| a.arguments.as_str()).collect();
        assert_eq!(args, vec!["accept:CA1", "reject:CA1"]);
    }

    #[test]
    fn missed_toast_has_no_actions() {
        let toast = ToastContent::for_call(NotificationKind::Missed, "Jane", "CA1");
        assert_eq!(toast.title, "Missed Call");
        assert!(toast.actions.is_empty());
        assert!(!toast.to_xml().contains("scenario"));
        assert!(!toast.to_xml().contains("silent"));
    }

    #[test]
    fn xml_is_escaped() {
        let toast = ToastContent::for_call(NotificationKind::Incoming, "Tom & 'Jerry'", "CA<1>");
        let xml = toast.to_xml();
        assert!(xml.starts_with("<toast scenario='alarm' silent='true'>"));
        assert!(!xml.contains("<audio"));
        assert!(xml.contains("<text>Tom &amp; &apos;Jerry&apos;</text>"));
        assert!(xml.contains("arguments='accept:CA&lt;1&gt;'"));
    }

    #[test]
    fn action_tokens_round_trip() {
        for action in [NotificationAction::Accept, NotificationAction::Reject, NotificationAction::CallBack] {
            assert_eq!(action.as_str().parse::<NotificationAction>(), Ok(action));
        }
        assert!("bogus".parse::<NotificationAction>().is_err());
    }
}

//! Script text for every command the bridge issues
//!
//! The page hosts the VoIP SDK as `Twilio.Device`; the active device lives in
//! `window.device` and the active call in `window.connection`. Call lifecycle listeners
//! post `{type: 'call_event', event, from, to, callSid, customParams, error}` records back
//! through `window.chrome.webview.postMessage`.

/// Device-level listeners the bridge installs and removes
const DEVICE_EVENTS: [&str; 6] = ["incoming", "connect", "disconnect", "error", "offline", "ready"];

/// Connection-level listeners the bridge installs and removes
const CONNECTION_EVENTS: [&str; 5] = ["accept", "disconnect", "error", "reject", "cancel"];

/// Options baked into the device setup script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOptions {
    /// Codec preference list, most preferred first
    pub codec_preferences: Vec<String>,
    /// Warn before the page unloads during a call
    pub close_protection: bool,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            codec_preferences: vec!["opus".to_string(), "pcmu".to_string()],
            close_protection: true,
        }
    }
}

/// Escape text for use inside a single-quoted JS string literal
pub fn js_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            '<' => out.push_str("\\x3c"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn js_array(values: &[String]) -> String {
    let items: Vec<String> = values.iter().map(|v| js_string(v)).collect();
    format!("[{}]", items.join(", "))
}

fn remove_listeners(target: &str, events: &[&str]) -> String {
    events
        .iter()
        .map(|event| format!("{}.removeAllListeners('{}');", target, event))
        .collect::<Vec<_>>()
        .join(" ")
}

fn post_call_event(event: &str, fields: &str) -> String {
    if fields.is_empty() {
        format!(
            "window.chrome.webview.postMessage({{ type: 'call_event', event: '{}' }});",
            event
        )
    } else {
        format!(
            "window.chrome.webview.postMessage({{ type: 'call_event', event: '{}', {} }});",
            event, fields
        )
    }
}

/// Register the device with an access token and install the call listeners
///
/// Completes with `true` once registered, `false` if registration failed.
pub fn device_setup(access_token: &str, options: &DeviceOptions) -> String {
    let incoming_fields = "from: params.From, to: params.To, callSid: params.CallSid, customParams: customParamsStr";
    format!(
        r#"(() => {{
  window.device = new Twilio.Device({token}, {{
    closeProtection: {close},
    codecPreferences: {codecs}
  }});
  return window.device.register().then(() => {{
    window.device.on('incoming', (call) => {{
      const params = call.parameters;
      window.connection = call;
      const customParamsStr = JSON.stringify(params.Params);
      {incoming}
      call.on('accept', () => {{ {accept} }});
      call.on('cancel', () => {{ {cancel} }});
      call.on('disconnect', () => {{ {disconnected} }});
      call.on('error', (error) => {{ {error} }});
      call.on('reject', () => {{ {reject} }});
    }});
    window.device.on('connect', (call) => {{
      const params = call.parameters;
      const customParamsStr = JSON.stringify(params.Params);
      {connected}
    }});
    window.device.on('disconnect', () => window.chrome.webview.postMessage('Disconnected'));
    window.device.on('error', (error) => window.chrome.webview.postMessage('Error|' + error.message));
    window.device.on('offline', () => window.chrome.webview.postMessage('Offline'));
    window.device.on('ready', () => window.chrome.webview.postMessage('Ready'));
    return true;
  }}).catch((error) => {{
    console.error('Failed to register device:', error);
    return false;
  }});
}})()"#,
        token = js_string(access_token),
        close = options.close_protection,
        codecs = js_array(&options.codec_preferences),
        incoming = post_call_event("incoming", incoming_fields),
        accept = post_call_event("accept", incoming_fields),
        cancel = post_call_event("cancel", incoming_fields),
        disconnected = post_call_event("disconnected", ""),
        error = post_call_event("error", "error: error.message"),
        reject = post_call_event("reject", ""),
        connected = post_call_event("connected", incoming_fields),
    )
}

/// Drop any device listeners left behind by a previous page session
pub fn reset_device_listeners() -> String {
    format!(
        "(() => {{ if (window.device) {{ {} }} }})()",
        remove_listeners("window.device", &DEVICE_EVENTS)
    )
}

/// Place an outgoing call
///
/// The script is asynchronous, so a successful launch completes with `{}`.
pub fn connect(from: &str, to: &str, codecs: &[String]) -> String {
    format!(
        r#"(async () => {{
  try {{
    {ringing}
    if (typeof Twilio === 'undefined') {{
      throw new Error('Twilio SDK not loaded - please wait for initialization');
    }}
    if (!window.device) {{
      throw new Error('Twilio Device not initialized - please call tokens() first');
    }}
    const params = {{
      params: {{ To: {to}, From: {from} }},
      codecPreferences: {codecs}
    }};
    window.connection = await window.device.connect(params);
    if (!window.connection) {{
      throw new Error('Failed to create connection - connection is null');
    }}
    window.connection.on('accept', () => {{ {accept} }});
    window.connection.on('disconnect', () => {{ {disconnected} }});
    window.connection.on('error', (error) => {{ {error} }});
    window.connection.on('reject', () => {{ {reject} }});
    window.connection.on('cancel', () => {{ {cancel} }});
    return '';
  }} catch (error) {{
    {error}
    throw error;
  }}
}})()"#,
        ringing = post_call_event("ringing", ""),
        to = js_string(to),
        from = js_string(from),
        codecs = js_array(codecs),
        accept = post_call_event("accept", ""),
        disconnected = post_call_event("disconnected", ""),
        error = post_call_event("error", "error: error.message"),
        reject = post_call_event("reject", ""),
        cancel = post_call_event(
            "cancel",
            "from: window.connection.parameters.From, to: window.connection.parameters.To, callSid: window.connection.parameters.CallSid"
        ),
    )
}

/// Accept the pending call; completes `true`, `false` (no call) or an error message
pub fn accept() -> String {
    r#"(() => {
  try {
    if (window.connection) {
      window.connection.accept();
      return true;
    }
    return false;
  } catch (error) {
    return error.message;
  }
})()"#
        .to_string()
}

/// Reject a ringing call or disconnect an established one
///
/// With `teardown`, the connection's listeners are removed while it is still live.
pub fn hang_up(teardown: bool) -> String {
    let listeners = if teardown {
        remove_listeners("window.connection", &CONNECTION_EVENTS)
    } else {
        String::new()
    };
    format!(
        r#"(() => {{
  try {{
    if (window.connection) {{
      const status = window.connection.status();
      if (status === 'pending' || status === 'ringing') {{
        window.connection.reject();
      }} else {{
        window.connection.disconnect();
      }}
      {disconnected}
      {listeners}
      window.connection = null;
      return true;
    }}
    return false;
  }} catch (error) {{
    return error.message;
  }}
}})()"#,
        disconnected = post_call_event("disconnected", ""),
        listeners = listeners,
    )
}

/// Set the mute state and report the resulting state
pub fn toggle_mute(muted: bool) -> String {
    format!(
        "window.connection.mute({}); window.connection.isMuted()",
        muted
    )
}

/// Report the current mute state
pub fn is_muted() -> String {
    "window.connection.isMuted()".to_string()
}

/// Unregister the device and drop its listeners
pub fn unregister() -> String {
    format!(
        r#"(() => {{
  try {{
    if (window.device) {{
      window.device.unregister();
      {listeners}
      return true;
    }}
    return false;
  }} catch (error) {{
    return error.message;
  }}
}})()"#,
        listeners = remove_listeners("window.device", &DEVICE_EVENTS),
    )
}

/// The CallSid of the active call, or an empty string
pub fn active_call_sid() -> String {
    "window.connection ? window.connection.parameters.CallSid : ''".to_string()
}

/// Disconnect everything before the page goes away
pub fn cleanup() -> String {
    format!(
        r#"(() => {{
  try {{
    if (window.connection) {{
      window.connection.disconnect();
      window.connection = null;
    }}
    if (window.device) {{
      {listeners}
      window.device.unregister();
      window.device = null;
    }}
    return true;
  }} catch (error) {{
    return false;
  }}
}})()"#,
        listeners = remove_listeners("window.device", &DEVICE_EVENTS),
    )
}

/// Query the page's microphone permission and post a `permission_result` record
pub fn microphone_permission() -> String {
    r#"(async () => {
  try {
    const permission = await navigator.permissions.query({ name: 'microphone' });
    const permissionGranted = permission.state === 'granted';
    window.chrome.webview.postMessage({ type: 'permission_result', granted: permissionGranted });
    return permissionGranted;
  } catch (error) {
    window.chrome.webview.postMessage({ type: 'permission_result', granted: false });
    return false;
  }
})()"#
        .to_string()
}

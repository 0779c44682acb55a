//! Call records

use serde::{Deserialize, Serialize};

use crate::params::CustomParams;

/// Which side placed the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    /// The remote party called us
    Incoming,
    /// We placed the call
    Outgoing,
}

impl CallDirection {
    /// The literal used in host event strings
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "Incoming",
            Self::Outgoing => "Outgoing",
        }
    }
}

impl std::fmt::Display for CallDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The call currently bound to the page's connection
///
/// Only one record is live at a time; the bridge does not support concurrent calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// Opaque call identifier (the SDK's CallSid)
    pub call_id: String,
    /// The other party's address
    pub peer: String,
    /// Who placed the call
    pub direction: CallDirection,
    /// Decoded custom parameters
    pub custom_params: CustomParams,
}

impl CallRecord {
    /// Create a record
    pub fn new(
        call_id: impl Into<String>,
        peer: impl Into<String>,
        direction: CallDirection,
        custom_params: CustomParams,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            peer: peer.into(),
            direction,
            custom_params,
        }
    }
}

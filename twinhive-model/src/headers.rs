//! Request headers carried by every signal.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthSubject, AuthorizationContext};

/// Content type of machine-readable twin descriptions. Retrieve commands
/// carrying this accept header take the public description path instead of
/// policy enforcement (when the integration toggle permits it).
pub const CONTENT_TYPE_TD_JSON: &str = "application/td+json";

/// The channel a signal travels on.
///
/// `Twin` addresses the persisted entity; `Live` addresses the device
/// directly and follows a separate enforcement path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Twin,
    Live,
}

/// Headers describing who is asking and how the answer should be handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeaders {
    /// Who is asking. `None` only on the public description path.
    pub authorization_context: Option<AuthorizationContext>,
    /// The channel the signal was addressed to.
    #[serde(default)]
    pub channel: Channel,
    /// Whether the caller expects a response.
    #[serde(default = "default_true")]
    pub response_required: bool,
    /// Conditional-read expression gating the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Condition deciding whether a query may be answered from the live
    /// channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_channel_condition: Option<String>,
    /// Requested response content type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<String>,
    /// Correlates a signal with its response across async boundaries.
    pub correlation_id: String,
    /// Subjects holding unrestricted READ at the signal's resource,
    /// stamped after successful authorization for downstream consumers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub read_granted_subjects: Vec<AuthSubject>,
}

fn default_true() -> bool {
    true
}

impl RequestHeaders {
    /// Headers for an authenticated caller with a fresh correlation id.
    pub fn new(authorization_context: AuthorizationContext) -> Self {
        Self {
            authorization_context: Some(authorization_context),
            channel: Channel::Twin,
            response_required: true,
            condition: None,
            live_channel_condition: None,
            accept: None,
            correlation_id: Uuid::new_v4().to_string(),
            read_granted_subjects: Vec::new(),
        }
    }

    /// Headers without any authenticated subject. Only the public
    /// description path accepts these.
    pub fn anonymous() -> Self {
        Self {
            authorization_context: None,
            channel: Channel::Twin,
            response_required: true,
            condition: None,
            live_channel_condition: None,
            accept: None,
            correlation_id: Uuid::new_v4().to_string(),
            read_granted_subjects: Vec::new(),
        }
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_response_required(mut self, response_required: bool) -> Self {
        self.response_required = response_required;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_live_channel_condition(mut self, condition: impl Into<String>) -> Self {
        self.live_channel_condition = Some(condition.into());
        self
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn with_read_granted_subjects(mut self, subjects: Vec<AuthSubject>) -> Self {
        self.read_granted_subjects = subjects;
        self
    }

    /// Whether the signal travels on the live channel.
    pub fn is_live(&self) -> bool {
        self.channel == Channel::Live
    }

    /// Whether the accept header requests a machine-readable description.
    pub fn accepts_description(&self) -> bool {
        self.accept.as_deref() == Some(CONTENT_TYPE_TD_JSON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let headers = RequestHeaders::new(AuthorizationContext::single("alice"));
        assert_eq!(headers.channel, Channel::Twin);
        assert!(headers.response_required);
        assert!(!headers.is_live());
        assert!(!headers.accepts_description());
        assert!(!headers.correlation_id.is_empty());
    }

    #[test]
    fn test_accepts_description() {
        let headers = RequestHeaders::anonymous().with_accept(CONTENT_TYPE_TD_JSON);
        assert!(headers.accepts_description());
        let headers = RequestHeaders::anonymous().with_accept("application/json");
        assert!(!headers.accepts_description());
    }

    #[test]
    fn test_deserialization_defaults_response_required() {
        let headers: RequestHeaders = serde_json::from_str(
            r#"{"authorization_context": ["alice"], "correlation_id": "c-1"}"#,
        )
        .unwrap();
        assert!(headers.response_required);
        assert_eq!(headers.channel, Channel::Twin);
    }
}

//! Inbound deployment request as received by the trigger endpoint.

/// Header carrying the legacy HMAC-SHA1 signature (`sha1=<hex>`).
pub const SIGNATURE_SHA1_HEADER: &str = "x-hub-signature";

/// Header carrying the HMAC-SHA256 signature (`sha256=<hex>`).
pub const SIGNATURE_SHA256_HEADER: &str = "x-hub-signature-256";

/// Header carrying the manual override credential.
pub const OVERRIDE_HEADER: &str = "x-sitesync-key";

/// Header carrying the declared event type (`push`, `ping`, ...).
pub const EVENT_TYPE_HEADER: &str = "x-github-event";

/// Header carrying the sender's delivery identifier.
pub const DELIVERY_HEADER: &str = "x-github-delivery";

/// A raw deployment notification.
///
/// The body is kept as the exact bytes received so that signature
/// verification runs over what the sender actually signed. Nothing in this
/// type parses the body.
#[derive(Clone)]
pub struct DeploymentRequest {
    body: Vec<u8>,
    signature: Option<String>,
    override_credential: Option<Vec<u8>>,
    event_type: Option<String>,
    delivery_id: Option<String>,
}

impl DeploymentRequest {
    /// Create a request from its raw body. Headers are attached with the
    /// `with_*` builders.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            signature: None,
            override_credential: None,
            event_type: None,
            delivery_id: None,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Attach the override header as received. Header values are not
    /// guaranteed to be UTF-8, so the raw bytes are kept.
    pub fn with_override_credential(mut self, credential: impl Into<Vec<u8>>) -> Self {
        self.override_credential = Some(credential.into());
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_delivery_id(mut self, delivery_id: impl Into<String>) -> Self {
        self.delivery_id = Some(delivery_id.into());
        self
    }

    /// The exact bytes received.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The signature header value, e.g. `sha256=9f86d0...`.
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// The override credential, if the header was present and non-empty.
    pub fn override_credential(&self) -> Option<&[u8]> {
        self.override_credential.as_deref().filter(|c| !c.is_empty())
    }

    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    pub fn delivery_id(&self) -> Option<&str> {
        self.delivery_id.as_deref()
    }
}

// Credentials must never reach the logs, so Debug only reports presence.
impl std::fmt::Debug for DeploymentRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentRequest")
            .field("body_len", &self.body.len())
            .field("has_signature", &self.signature.is_some())
            .field("has_override", &self.override_credential.is_some())
            .field("event_type", &self.event_type)
            .field("delivery_id", &self.delivery_id)
            .finish()
    }
}

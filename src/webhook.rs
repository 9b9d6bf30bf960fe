//! WhatsApp webhook handling
//!
//! The provider verifies the callback URL with a GET carrying `hub.*` query
//! parameters, then POSTs message events. Event payloads are parsed leniently:
//! the provider retries anything that is not a 2xx, so a payload we cannot read
//! is logged and dropped instead of rejected.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, warn};

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    /// Token the provider must echo during subscription; unset rejects all.
    pub verify_token: Option<String>,
    /// Secret used to sign event payloads; unset skips the signature check.
    pub app_secret: Option<String>,
}

/// Query parameters for webhook verification
#[derive(Debug, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Returns the challenge to echo when the subscription request is genuine.
pub fn verify_subscription<'a>(query: &'a VerifyQuery, config: &WebhookConfig) -> Option<&'a str> {
    let expected = config.verify_token.as_deref()?;
    if query.mode.as_deref() != Some("subscribe") {
        warn!(mode = ?query.mode, "webhook verification with unexpected mode");
        return None;
    }
    if query.verify_token.as_deref() != Some(expected) {
        warn!("webhook verification with wrong verify token");
        return None;
    }
    Some(query.challenge.as_deref().unwrap_or_default())
}

/// Checks an `X-Hub-Signature-256: sha256=<hex>` header against the body.
pub fn verify_signature(app_secret: &str, body: &[u8], signature_header: &str) -> bool {
    let Some(hex_sig) = signature_header.trim().strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Produces the header value the provider would send for `body`.
pub fn sign(app_secret: &str, body: &[u8]) -> String {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
        return String::new();
    };
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender as reported by the provider, usually digits without `+`.
    pub sender: String,
    pub kind: String,
    pub body: String,
    pub provider_message_id: String,
}

// --- Webhook payload types ---

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    value: Option<ChangeValue>,
}

#[derive(Debug, Deserialize)]
struct ChangeValue {
    // Read one by one so a single odd message does not sink its neighbours.
    #[serde(default)]
    messages: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    from: String,
    id: String,
    #[serde(rename = "type", default = "default_kind")]
    kind: String,
    text: Option<TextBody>,
    image: Option<MediaBody>,
    video: Option<MediaBody>,
    document: Option<MediaBody>,
}

#[derive(Debug, Deserialize)]
struct TextBody {
    body: String,
}

#[derive(Debug, Deserialize)]
struct MediaBody {
    caption: Option<String>,
}

fn default_kind() -> String {
    "text".to_string()
}

impl RawMessage {
    fn into_inbound(self) -> InboundMessage {
        let caption = [&self.image, &self.video, &self.document]
            .into_iter()
            .flatten()
            .find_map(|media| media.caption.clone());
        let body = match (self.text, caption) {
            (Some(text), _) => text.body,
            (None, Some(caption)) => caption,
            (None, None) => format!("[{}]", self.kind),
        };
        InboundMessage {
            sender: self.from,
            kind: self.kind,
            body,
            provider_message_id: self.id,
        }
    }
}

/// Extracts every message in a callback payload.
///
/// Status updates and other events produce no messages; a malformed payload
/// yields an empty list.
pub fn parse_inbound(body: &[u8]) -> Vec<InboundMessage> {
    let payload: WebhookPayload = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("ignoring unreadable webhook payload: {}", e);
            return Vec::new();
        }
    };

    let messages: Vec<InboundMessage> = payload
        .entry
        .into_iter()
        .flat_map(|entry| entry.changes)
        .filter_map(|change| change.value)
        .flat_map(|value| value.messages)
        .filter_map(|raw| match serde_json::from_value::<RawMessage>(raw) {
            Ok(message) => Some(message.into_inbound()),
            Err(e) => {
                warn!("skipping unreadable webhook message: {}", e);
                None
            }
        })
        .collect();
    debug!(count = messages.len(), "parsed webhook payload");
    messages
}

//! Outbound WhatsApp messaging through the Ngumzo API, plus the message history
//! kept for every number we talk to.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::phone::{NumberingPlan, PhoneNumber};
use crate::upstream::{self, UpstreamError};
use crate::webhook::InboundMessage;

const PROVIDER: &str = "ngumzo";

#[derive(Debug, Clone)]
pub struct NgumzoConfig {
    pub api_key: String,
    pub base_url: String,
    pub sender_id: String,
    pub timeout: Duration,
}

impl Default for NgumzoConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://ngumzo.com/v1".to_string(),
            sender_id: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Document,
    Video,
    Audio,
}

serde_plain::derive_display_from_serialize!(MediaKind);
serde_plain::derive_fromstr_from_deserialize!(MediaKind);

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundContent {
    Text {
        body: String,
    },
    Media {
        kind: MediaKind,
        url: String,
        caption: Option<String>,
    },
    Template {
        name: String,
        parameters: Vec<String>,
    },
}

impl OutboundContent {
    /// Message type tag used by the provider and the history.
    pub fn kind(&self) -> String {
        match self {
            OutboundContent::Text { .. } => "text".to_string(),
            OutboundContent::Media { kind, .. } => kind.to_string(),
            OutboundContent::Template { .. } => "template".to_string(),
        }
    }

    fn summary(&self) -> String {
        match self {
            OutboundContent::Text { body } => body.clone(),
            OutboundContent::Media { url, .. } => url.clone(),
            OutboundContent::Template { name, .. } => format!("Template: {name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReceipt {
    pub message_id: String,
    pub status: String,
    pub to: PhoneNumber,
}

/// A messaging provider able to deliver WhatsApp messages.
#[async_trait]
pub trait Messenger: Send + Sync {
    fn name(&self) -> &str;

    async fn send(
        &self,
        to: &PhoneNumber,
        content: &OutboundContent,
    ) -> Result<DeliveryReceipt, UpstreamError>;
}

pub struct NgumzoClient {
    config: NgumzoConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    success: Option<bool>,
    error: Option<serde_json::Value>,
    #[serde(default)]
    messages: Vec<SentMessage>,
    message_id: Option<String>,
    id: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
    message_status: Option<String>,
}

impl NgumzoClient {
    pub fn new(config: NgumzoConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn payload(&self, to: &PhoneNumber, content: &OutboundContent) -> serde_json::Value {
        let mut payload = json!({
            "api_key": self.config.api_key,
            "sender_id": self.config.sender_id,
            "to": to.as_str(),
            "message_type": content.kind(),
        });
        match content {
            OutboundContent::Text { body } => {
                payload["message"] = json!(body);
            }
            OutboundContent::Media { url, caption, .. } => {
                payload["media_url"] = json!(url);
                payload["caption"] = json!(caption);
            }
            OutboundContent::Template { name, parameters } => {
                payload["template_name"] = json!(name);
                payload["parameters"] = json!(parameters);
            }
        }
        payload
    }

    fn parse_receipt(
        response: SendResponse,
        to: &PhoneNumber,
    ) -> Result<DeliveryReceipt, UpstreamError> {
        if response.success == Some(false) {
            let message = match response.error {
                Some(serde_json::Value::String(message)) => message,
                Some(other) => upstream::error_message(&other.to_string()),
                None => "provider reported failure".to_string(),
            };
            return Err(UpstreamError::Rejected {
                provider: PROVIDER,
                status: 200,
                message,
            });
        }

        let first = response.messages.into_iter().next();
        let status = first
            .as_ref()
            .and_then(|m| m.message_status.clone())
            .or(response.status)
            .unwrap_or_else(|| "sent".to_string());
        let message_id = first
            .map(|m| m.id)
            .or(response.message_id)
            .or(response.id)
            .ok_or_else(|| UpstreamError::invalid_response(PROVIDER, "no message id in response"))?;

        Ok(DeliveryReceipt {
            message_id,
            status,
            to: to.clone(),
        })
    }
}

#[async_trait]
impl Messenger for NgumzoClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn send(
        &self,
        to: &PhoneNumber,
        content: &OutboundContent,
    ) -> Result<DeliveryReceipt, UpstreamError> {
        let url = format!("{}/send-message", self.config.base_url.trim_end_matches('/'));
        debug!(%to, kind = %content.kind(), "sending WhatsApp message");

        let response = self
            .client
            .post(&url)
            .json(&self.payload(to, content))
            .send()
            .await
            .map_err(|e| UpstreamError::from_transport(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = UpstreamError::from_status(PROVIDER, status, &upstream::error_message(&body));
            warn!("Ngumzo send failed: {}", err);
            return Err(err);
        }

        let body: SendResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::from_transport(PROVIDER, e))?;
        Self::parse_receipt(body, to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outbound,
    Inbound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: Uuid,
    pub phone_number: PhoneNumber,
    pub direction: Direction,
    pub kind: String,
    pub content: String,
    pub status: String,
    pub provider_message_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn outbound(content: &OutboundContent, receipt: &DeliveryReceipt) -> Self {
        Self {
            id: Uuid::new_v4(),
            phone_number: receipt.to.clone(),
            direction: Direction::Outbound,
            kind: content.kind(),
            content: content.summary(),
            status: receipt.status.clone(),
            provider_message_id: Some(receipt.message_id.clone()),
            recorded_at: Utc::now().trunc_subsecs(6),
        }
    }

    pub fn inbound(from: PhoneNumber, kind: &str, body: &str, provider_message_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            phone_number: from,
            direction: Direction::Inbound,
            kind: kind.to_string(),
            content: body.to_string(),
            status: "received".to_string(),
            provider_message_id: Some(provider_message_id.to_string()),
            recorded_at: Utc::now().trunc_subsecs(6),
        }
    }
}

/// History of messages exchanged with each phone number.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn record(&self, record: &MessageRecord) -> AppResult<()>;

    /// Records for `phone`, newest first.
    async fn history(&self, phone: &PhoneNumber) -> AppResult<Vec<MessageRecord>>;
}

#[derive(Clone)]
pub struct MessagingService {
    messenger: Arc<dyn Messenger>,
    log: Arc<dyn MessageStore>,
    plan: NumberingPlan,
}

impl MessagingService {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        log: Arc<dyn MessageStore>,
        plan: NumberingPlan,
    ) -> Self {
        Self {
            messenger,
            log,
            plan,
        }
    }

    fn recipient(&self, raw_phone: &str) -> AppResult<PhoneNumber> {
        self.plan
            .normalize(raw_phone)
            .map_err(|e| AppError::InvalidRecipient(e.to_string()))
    }

    pub async fn send_text(&self, raw_phone: &str, message: &str) -> AppResult<DeliveryReceipt> {
        let to = self.recipient(raw_phone)?;
        if message.trim().is_empty() {
            return Err(AppError::Validation("message must not be empty".to_string()));
        }
        self.deliver(
            &to,
            OutboundContent::Text {
                body: message.to_string(),
            },
        )
        .await
    }

    pub async fn send_media(
        &self,
        raw_phone: &str,
        media_url: &str,
        media_type: &str,
        caption: Option<String>,
    ) -> AppResult<DeliveryReceipt> {
        let to = self.recipient(raw_phone)?;
        let kind: MediaKind = media_type
            .trim()
            .to_lowercase()
            .parse()
            .map_err(|_| AppError::UnsupportedMediaType(media_type.to_string()))?;
        let url = media_url.trim();
        let absolute = Url::parse(url)
            .map(|parsed| matches!(parsed.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !absolute {
            return Err(AppError::Validation(
                "mediaUrl must be an absolute http(s) URL".to_string(),
            ));
        }
        let caption = caption.filter(|c| !c.trim().is_empty());

        self.deliver(
            &to,
            OutboundContent::Media {
                kind,
                url: url.to_string(),
                caption,
            },
        )
        .await
    }

    pub async fn send_template(
        &self,
        raw_phone: &str,
        template_name: &str,
        parameters: Vec<String>,
    ) -> AppResult<DeliveryReceipt> {
        let to = self.recipient(raw_phone)?;
        if template_name.trim().is_empty() {
            return Err(AppError::Validation(
                "templateName must not be empty".to_string(),
            ));
        }
        self.deliver(
            &to,
            OutboundContent::Template {
                name: template_name.trim().to_string(),
                parameters,
            },
        )
        .await
    }

    /// Sends to an already-normalized number.
    #[instrument(skip(self, content), fields(provider = self.messenger.name()))]
    pub async fn deliver(
        &self,
        to: &PhoneNumber,
        content: OutboundContent,
    ) -> AppResult<DeliveryReceipt> {
        let receipt = self.messenger.send(to, &content).await?;
        info!(message_id = %receipt.message_id, status = %receipt.status, "WhatsApp message sent");

        // The message is already out; a history failure must not invite a resend.
        if let Err(e) = self.log.record(&MessageRecord::outbound(&content, &receipt)).await {
            warn!("failed to record outbound message: {}", e);
        }
        Ok(receipt)
    }

    pub async fn history(&self, raw_phone: &str) -> AppResult<Vec<MessageRecord>> {
        let phone = self.recipient(raw_phone)?;
        self.log.history(&phone).await
    }

    /// Stores an inbound message; senders outside the numbering plan are skipped.
    pub async fn record_inbound(&self, message: &InboundMessage) -> AppResult<bool> {
        let Ok(from) = self.plan.normalize(&message.sender) else {
            debug!(
                sender = %message.sender,
                "ignoring inbound message from number outside the plan"
            );
            return Ok(false);
        };
        let record = MessageRecord::inbound(
            from,
            &message.kind,
            &message.body,
            &message.provider_message_id,
        );
        self.log.record(&record).await?;
        Ok(true)
    }
}

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_macros::FromRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::gemini::{self, GeminiClient, LanguageModel};
use crate::phone::PhoneNumber;
use crate::queue::{Placement, QueueEntry, QueueStatus, WaitingList};
use crate::store::RedisStore;
use crate::webhook::{self, VerifyQuery, WebhookConfig};
use crate::whatsapp::{
    DeliveryReceipt, MessageRecord, MessagingService, NgumzoClient, OutboundContent,
};

/// JSON body extractor whose rejections become [`AppError`]s.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntryRequest {
    #[serde(alias = "username", alias = "display_name")]
    pub display_name: String,
    #[serde(alias = "phone_number")]
    pub phone_number: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntryResponse {
    pub id: Uuid,
    pub display_name: String,
    pub phone_number: PhoneNumber,
    pub position: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub status: QueueStatus,
    pub whatsapp_sent: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryStatusResponse {
    pub id: Uuid,
    pub display_name: String,
    pub position: Option<u32>,
    pub status: QueueStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTextRequest {
    #[serde(alias = "phone_number")]
    pub phone_number: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMediaRequest {
    #[serde(alias = "phone_number")]
    pub phone_number: String,
    #[serde(alias = "media_url")]
    pub media_url: String,
    #[serde(alias = "media_type")]
    pub media_type: String,
    pub caption: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTemplateRequest {
    #[serde(alias = "phone_number")]
    pub phone_number: String,
    #[serde(alias = "template_name")]
    pub template_name: String,
    #[serde(default)]
    pub parameters: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub success: bool,
    pub data: DeliveryReceipt,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub count: usize,
    pub messages: Vec<MessageRecord>,
}

#[derive(Clone)]
pub struct AppState {
    pub waiting_list: WaitingList,
    pub messaging: MessagingService,
    pub model: Arc<dyn LanguageModel>,
    pub webhook: Arc<WebhookConfig>,
    pub send_confirmation: bool,
}

impl AppState {
    /// Wires the production adapters: Redis, Gemini and Ngumzo.
    pub async fn from_config(config: &AppConfig) -> AppResult<Self> {
        let store = Arc::new(RedisStore::connect(&config.redis_url, &config.redis_prefix).await?);
        let model = Arc::new(GeminiClient::new(config.gemini.clone())?);
        let messenger = Arc::new(NgumzoClient::new(config.ngumzo.clone())?);

        Ok(Self {
            waiting_list: WaitingList::new(store.clone(), config.numbering_plan.clone()),
            messaging: MessagingService::new(messenger, store, config.numbering_plan.clone()),
            model,
            webhook: Arc::new(config.webhook.clone()),
            send_confirmation: config.send_confirmation,
        })
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/waiting-list", post(create_entry))
        .route("/waiting-list/", post(create_entry))
        .route("/waiting-list/:id", get(get_entry))
        .route("/gemini", post(relay_prompt))
        .route("/whatsapp/send-text", post(send_text))
        .route("/whatsapp/send-media", post(send_media))
        .route("/whatsapp/send-template", post(send_template))
        .route("/whatsapp/messages/:phone_number", get(message_history))
        .route("/webhook/whatsapp", get(verify_webhook).post(receive_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "message": "Aisha Backend API is running" }))
}

async fn create_entry(
    State(state): State<AppState>,
    AppJson(request): AppJson<CreateEntryRequest>,
) -> AppResult<(StatusCode, Json<CreateEntryResponse>)> {
    let Placement { entry, position } = state
        .waiting_list
        .enqueue(&request.display_name, &request.phone_number)
        .await?;

    let whatsapp_sent =
        state.send_confirmation && send_confirmation(&state.messaging, &entry).await;

    Ok((
        StatusCode::CREATED,
        Json(CreateEntryResponse {
            id: entry.id,
            display_name: entry.display_name,
            phone_number: entry.phone_number,
            position,
            created_at: entry.created_at,
            status: entry.status,
            whatsapp_sent,
        }),
    ))
}

/// Welcomes a new entry over WhatsApp; failures are logged and reported as `false`.
async fn send_confirmation(messaging: &MessagingService, entry: &QueueEntry) -> bool {
    let body = format!(
        "Hello {}, 👋\n\nThanks for joining our waiting list! \
         We'll notify you soon when we launch. 🚀",
        entry.display_name
    );
    match messaging
        .deliver(&entry.phone_number, OutboundContent::Text { body })
        .await
    {
        Ok(_) => true,
        Err(e) => {
            warn!(id = %entry.id, "confirmation message not sent: {}", e);
            false
        }
    }
}

async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<EntryStatusResponse>> {
    let Placement { entry, position } = state.waiting_list.get_by_id(&id).await?;

    Ok(Json(EntryStatusResponse {
        id: entry.id,
        display_name: entry.display_name,
        position,
        status: entry.status,
    }))
}

async fn relay_prompt(
    State(state): State<AppState>,
    AppJson(request): AppJson<PromptRequest>,
) -> AppResult<Json<PromptResponse>> {
    let generation = gemini::relay_prompt(state.model.as_ref(), &request.prompt).await?;

    Ok(Json(PromptResponse {
        response: generation.text,
        tokens_used: generation.tokens_used,
    }))
}

async fn send_text(
    State(state): State<AppState>,
    AppJson(request): AppJson<SendTextRequest>,
) -> AppResult<Json<SendResponse>> {
    let receipt = state
        .messaging
        .send_text(&request.phone_number, &request.message)
        .await?;
    Ok(Json(SendResponse {
        success: true,
        data: receipt,
    }))
}

async fn send_media(
    State(state): State<AppState>,
    AppJson(request): AppJson<SendMediaRequest>,
) -> AppResult<Json<SendResponse>> {
    let receipt = state
        .messaging
        .send_media(
            &request.phone_number,
            &request.media_url,
            &request.media_type,
            request.caption,
        )
        .await?;
    Ok(Json(SendResponse {
        success: true,
        data: receipt,
    }))
}

async fn send_template(
    State(state): State<AppState>,
    AppJson(request): AppJson<SendTemplateRequest>,
) -> AppResult<Json<SendResponse>> {
    let receipt = state
        .messaging
        .send_template(
            &request.phone_number,
            &request.template_name,
            request.parameters,
        )
        .await?;
    Ok(Json(SendResponse {
        success: true,
        data: receipt,
    }))
}

async fn message_history(
    State(state): State<AppState>,
    Path(phone_number): Path<String>,
) -> AppResult<Json<HistoryResponse>> {
    let messages = state.messaging.history(&phone_number).await?;
    Ok(Json(HistoryResponse {
        count: messages.len(),
        messages,
    }))
}

async fn verify_webhook(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    match webhook::verify_subscription(&query, &state.webhook) {
        Some(challenge) => {
            info!("webhook verification successful");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain")],
                challenge.to_string(),
            )
                .into_response()
        }
        None => (
            StatusCode::FORBIDDEN,
            Json(json!({ "success": false, "error": "Verification failed" })),
        )
            .into_response(),
    }
}

// The provider retries anything but a 2xx, so every outcome below acknowledges.
async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Json<Value> {
    let acknowledged = Json(json!({ "received": true }));

    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(
                status = %rejection.status(),
                "dropping unreadable webhook body: {}",
                rejection.body_text()
            );
            return acknowledged;
        }
    };

    if let Some(secret) = state.webhook.app_secret.as_deref() {
        let signature = headers
            .get(webhook::SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !webhook::verify_signature(secret, &body, signature) {
            warn!("dropping webhook payload with invalid signature");
            return acknowledged;
        }
    }

    for message in webhook::parse_inbound(&body) {
        info!(
            sender = %message.sender,
            message_id = %message.provider_message_id,
            kind = %message.kind,
            "received WhatsApp message"
        );
        if let Err(e) = state.messaging.record_inbound(&message).await {
            warn!("failed to record inbound message: {}", e);
        }
    }

    acknowledged
}

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use validator::Validate;

use super::{attachment, ValidatedJson};
use crate::{
    entities::chat_message,
    errors::ServiceError,
    middleware_helpers::ChatIdentity,
    services::charts::ChartKind,
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 2000, message = "El mensaje debe tener entre 1 y 2000 caracteres"))]
    pub message: String,
}

/// Chart rendered while answering a statistics question
#[derive(Debug, Serialize, ToSchema)]
pub struct ChatChart {
    pub kind: ChartKind,
    /// PNG, base64 encoded
    pub image_base64: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatReply {
    pub user_message: String,
    pub bot_response: String,
    /// Display time, `%H:%M`
    #[schema(example = "14:05")]
    pub timestamp: String,
    /// Anonymous session the exchange was stored under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChatChart>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatHistoryEntry {
    pub user_message: String,
    pub bot_response: String,
    #[schema(example = "14:05")]
    pub timestamp: String,
    pub created_at: DateTime<Utc>,
}

impl From<chat_message::Model> for ChatHistoryEntry {
    fn from(m: chat_message::Model) -> Self {
        Self {
            timestamp: m.created_at.format("%H:%M").to_string(),
            user_message: m.user_message,
            bot_response: m.bot_response,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChatActionRequest {
    /// `download_pdf` or `compare_products`
    pub action: String,
    #[serde(default)]
    pub product_ids: Vec<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ComparisonReply {
    pub comparison: String,
}

/// Adds the session cookie when the identity was minted for this request.
fn with_session_cookie(identity: &ChatIdentity, response: impl IntoResponse) -> Response {
    let mut response = response.into_response();
    if let Some(cookie) = identity.session_cookie() {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

#[utoipa::path(
    post,
    path = "/chat",
    summary = "Send a chat message",
    description = "Answers with a statistics report when the message asks for one, otherwise with the language model or the rule-based responder. The exchange is stored in the caller's history.",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant reply", body = ApiResponse<ChatReply>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Malformed or empty message", body = crate::errors::ErrorResponse),
        (status = 500, description = "History could not be stored", body = crate::errors::ErrorResponse),
    ),
    tag = "chat"
)]
pub async fn send_message(
    State(state): State<AppState>,
    identity: ChatIdentity,
    ValidatedJson(payload): ValidatedJson<ChatRequest>,
) -> Result<Response, ServiceError> {
    let outcome = state
        .services
        .chat
        .handle_message(&identity.owner, &payload.message)
        .await?;

    let reply = ChatReply {
        user_message: outcome.user_message,
        bot_response: outcome.bot_response,
        timestamp: outcome.created_at.format("%H:%M").to_string(),
        session_key: identity.session_key().map(str::to_string),
        chart: outcome.chart.map(|chart| ChatChart {
            kind: chart.kind,
            image_base64: chart.image_base64(),
        }),
    };

    Ok(with_session_cookie(&identity, Json(ApiResponse::success(reply))))
}

#[utoipa::path(
    get,
    path = "/chat/history",
    summary = "Chat history",
    description = "Most recent exchanges of the caller, oldest first",
    responses(
        (status = 200, description = "History", body = ApiResponse<Vec<ChatHistoryEntry>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "chat"
)]
pub async fn history(
    State(state): State<AppState>,
    identity: ChatIdentity,
) -> Result<Response, ServiceError> {
    let entries: Vec<ChatHistoryEntry> = state
        .services
        .chat
        .history_page(&identity.owner)
        .await?
        .into_iter()
        .map(ChatHistoryEntry::from)
        .collect();

    Ok(with_session_cookie(&identity, Json(ApiResponse::success(entries))))
}

#[utoipa::path(
    post,
    path = "/chat/action",
    summary = "Run a chat quick action",
    description = "`download_pdf` returns the stock report; `compare_products` compares `product_ids`",
    request_body = ChatActionRequest,
    responses(
        (status = 200, description = "PDF attachment, comparison or an unrecognised-action notice"),
        (status = 400, description = "Fewer than two products to compare", body = crate::errors::ErrorResponse),
        (status = 500, description = "Report generation failed", body = crate::errors::ErrorResponse),
    ),
    tag = "chat"
)]
pub async fn chat_action(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ChatActionRequest>,
) -> Result<Response, ServiceError> {
    match payload.action.as_str() {
        "download_pdf" => {
            let pdf = state.services.stock_report.generate().await?;
            Ok(attachment("application/pdf", "stock_report.pdf", pdf))
        }
        "compare_products" => {
            let comparison = state
                .services
                .comparison
                .compare(&payload.product_ids)
                .await?;
            Ok(Json(ApiResponse::success(ComparisonReply { comparison })).into_response())
        }
        _ => Ok(Json(json!({ "response": "Acción no reconocida." })).into_response()),
    }
}

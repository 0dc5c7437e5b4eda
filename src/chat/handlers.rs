// src/chat/handlers.rs
// HTTP handlers for chats, history, votes and the strategy proxy

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use chrono::Utc;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use tracing::{info, warn};
use uuid::Uuid;

use super::entitlements::{Entitlements, QUOTA_WINDOW_HOURS};
use super::events::UiEvent;
use super::render::{RenderBlock, render_message};
use super::request::PostRequestBody;
use super::stream::{TurnInput, spawn_turn};
use super::strategy::RawReply;
use super::title::generate_title;
use crate::api::error::{ApiError, ApiResult, IntoApiErrorOption, Surface};
use crate::auth::AuthSession;
use crate::db::{ChatPage, chats, messages, votes};
use crate::error::AppError;
use crate::models::{Chat, Message, Role, Visibility, Vote};
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: i64 = 10;
const MAX_HISTORY_LIMIT: i64 = 100;

// ============================================================================
// POST /api/chat
// ============================================================================

pub async fn chat_handler(
    State(state): State<AppState>,
    auth: AuthSession,
    body: Bytes,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let body = PostRequestBody::parse(&body)?;
    let user = auth.user;

    let used = messages::get_message_count_by_user_id(&state.pool, &user.id, QUOTA_WINDOW_HOURS)
        .await?;
    Entitlements::for_user_type(user.user_type, &state.config)
        .check(used, body.selected_chat_model)?;

    let existing = chats::get_chat_by_id(&state.pool, &body.id).await?;
    if existing.as_ref().is_some_and(|chat| chat.user_id != user.id) {
        return Err(ApiError::forbidden(Surface::Chat));
    }

    // A message id may only be reused inside its own chat
    let previous = messages::get_message_by_id(&state.pool, &body.message.id).await?;
    if previous.as_ref().is_some_and(|message| message.chat_id != body.id) {
        return Err(ApiError::bad_request(Surface::Api).with_cause("message id already in use"));
    }

    let chat = match existing {
        Some(chat) => chat,
        None => {
            let title = generate_title(
                state.model.as_ref(),
                &state.config.title_model,
                body.first_text(),
            )
            .await;
            chats::save_chat(
                &state.pool,
                &body.id,
                &user.id,
                &title,
                body.selected_visibility_type,
            )
            .await?
        }
    };

    // Re-sending an existing message id edits that turn: drop it and everything after
    if let Some(previous) = previous {
        let removed =
            messages::delete_messages_after(&state.pool, &chat.id, previous.created_at).await?;
        info!(chat_id = %chat.id, removed, "Editing earlier turn");
    }

    let mut history = messages::get_messages_by_chat_id(&state.pool, &chat.id).await?;
    let user_message = Message {
        id: body.message.id.clone(),
        chat_id: chat.id.clone(),
        role: Role::User,
        parts: body
            .message
            .parts
            .into_iter()
            .map(|p| p.into_part())
            .collect(),
        created_at: Utc::now(),
    };
    messages::save_messages(&state.pool, std::slice::from_ref(&user_message)).await?;
    history.push(user_message);

    info!(
        chat_id = %chat.id,
        user_id = %user.id,
        model = body.selected_chat_model.id(),
        turns = history.len(),
        "Starting chat turn"
    );

    let mut rx = spawn_turn(
        state,
        TurnInput {
            chat_id: chat.id,
            user_id: user.id,
            model: body.selected_chat_model,
            history,
            assistant_message_id: Uuid::new_v4().to_string(),
        },
    );

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield Ok(event.to_sse());
        }
        yield Ok(UiEvent::done());
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ============================================================================
// Chat CRUD
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: String,
}

async fn owned_chat(state: &AppState, id: &str, user_id: &str, surface: Surface) -> ApiResult<Chat> {
    let chat = chats::get_chat_by_id(&state.pool, id)
        .await?
        .ok_or_not_found(Surface::Chat)?;
    if chat.user_id != user_id {
        return Err(ApiError::forbidden(surface));
    }
    Ok(chat)
}

/// DELETE /api/chat?id=
pub async fn delete_chat_handler(
    State(state): State<AppState>,
    auth: AuthSession,
    Query(query): Query<IdQuery>,
) -> ApiResult<Json<Chat>> {
    owned_chat(&state, &query.id, &auth.user.id, Surface::Chat).await?;
    let deleted = chats::delete_chat_by_id(&state.pool, &query.id)
        .await?
        .ok_or_not_found(Surface::Chat)?;
    info!(chat_id = %deleted.id, "Chat deleted");
    Ok(Json(deleted))
}

#[derive(Debug, Serialize)]
pub struct RenderedMessage {
    #[serde(flatten)]
    pub message: Message,
    pub blocks: Vec<RenderBlock>,
}

#[derive(Debug, Serialize)]
pub struct ChatView {
    pub chat: Chat,
    pub messages: Vec<RenderedMessage>,
}

/// GET /api/chat/{id}
pub async fn get_chat_handler(
    State(state): State<AppState>,
    auth: Option<AuthSession>,
    Path(id): Path<String>,
) -> ApiResult<Json<ChatView>> {
    let chat = chats::get_chat_by_id(&state.pool, &id)
        .await?
        .ok_or_not_found(Surface::Chat)?;

    if chat.visibility == Visibility::Private {
        match &auth {
            None => return Err(ApiError::unauthorized(Surface::Chat)),
            Some(session) if session.user.id != chat.user_id => {
                return Err(ApiError::forbidden(Surface::Chat));
            }
            Some(_) => {}
        }
    }

    let messages = messages::get_messages_by_chat_id(&state.pool, &chat.id)
        .await?
        .into_iter()
        .map(|message| RenderedMessage {
            blocks: render_message(&message),
            message,
        })
        .collect();

    Ok(Json(ChatView { chat, messages }))
}

#[derive(Debug, Deserialize)]
pub struct VisibilityBody {
    pub visibility: Visibility,
}

/// PATCH /api/chat/{id}/visibility
pub async fn update_visibility_handler(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(id): Path<String>,
    Json(body): Json<VisibilityBody>,
) -> ApiResult<Json<Chat>> {
    let chat = owned_chat(&state, &id, &auth.user.id, Surface::Chat).await?;
    chats::update_chat_visibility(&state.pool, &id, body.visibility).await?;
    Ok(Json(Chat {
        visibility: body.visibility,
        ..chat
    }))
}

// ============================================================================
// History
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub starting_after: Option<String>,
    pub ending_before: Option<String>,
}

/// GET /api/history
pub async fn history_handler(
    State(state): State<AppState>,
    auth: AuthSession,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<ChatPage>> {
    if query.starting_after.is_some() && query.ending_before.is_some() {
        return Err(ApiError::bad_request(Surface::History));
    }
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let page = chats::get_chats_by_user_id(
        &state.pool,
        &auth.user.id,
        limit,
        query.starting_after.as_deref(),
        query.ending_before.as_deref(),
    )
    .await
    .map_err(|e| match e {
        AppError::NotFound(cause) => ApiError::not_found(Surface::Chat).with_cause(cause),
        other => other.into(),
    })?;

    Ok(Json(page))
}

// ============================================================================
// Votes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotesQuery {
    pub chat_id: String,
}

/// GET /api/vote?chatId=
pub async fn get_votes_handler(
    State(state): State<AppState>,
    auth: AuthSession,
    Query(query): Query<VotesQuery>,
) -> ApiResult<Json<Vec<Vote>>> {
    owned_chat(&state, &query.chat_id, &auth.user.id, Surface::Vote).await?;
    let votes = votes::get_votes_by_chat_id(&state.pool, &query.chat_id).await?;
    Ok(Json(votes))
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Up,
    Down,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteBody {
    pub chat_id: String,
    pub message_id: String,
    #[serde(rename = "type")]
    pub vote_type: VoteType,
}

/// PATCH /api/vote
pub async fn vote_handler(
    State(state): State<AppState>,
    auth: AuthSession,
    Json(body): Json<VoteBody>,
) -> ApiResult<Json<Vote>> {
    owned_chat(&state, &body.chat_id, &auth.user.id, Surface::Vote).await?;

    let message = messages::get_message_by_id(&state.pool, &body.message_id)
        .await?
        .filter(|m| m.chat_id == body.chat_id)
        .ok_or_not_found(Surface::Vote)?;

    let vote = votes::vote_message(
        &state.pool,
        &body.chat_id,
        &message.id,
        matches!(body.vote_type, VoteType::Up),
    )
    .await?;
    Ok(Json(vote))
}

// ============================================================================
// Strategy service proxy
// ============================================================================

fn relay(reply: RawReply) -> Response {
    let status = reply.status;
    if !status.is_success() {
        warn!(%status, "Strategy service returned an error");
    }
    (status, Json(reply.json())).into_response()
}

/// POST /api/strategy/parse
pub async fn parse_strategy_handler(
    State(state): State<AppState>,
    _auth: AuthSession,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    Ok(relay(state.strategy.parse(&body).await?))
}

/// POST /api/strategy/validate
pub async fn validate_strategy_handler(
    State(state): State<AppState>,
    _auth: AuthSession,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    Ok(relay(state.strategy.validate(&body).await?))
}

/// POST /api/strategy/run
pub async fn run_backtest_handler(
    State(state): State<AppState>,
    _auth: AuthSession,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    Ok(relay(state.strategy.run(&body).await?))
}

/// POST /api/strategy/run-config
pub async fn run_config_handler(
    State(state): State<AppState>,
    _auth: AuthSession,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    Ok(relay(state.strategy.run_config(&body).await?))
}

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use rhyme_db::chat::ChatAccess;
use rhyme_db::models::ChatMessageRow;
use rhyme_types::api::{ChatMessageResponse, Claims, SendChatRequest};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::state::{AppState, blocking, resolve_user};

const MAX_CHAT_CHARS: usize = 2000;

/// POST /api/friends/chat/{username}
pub async fn send(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(username): Path<String>,
    ApiJson(req): ApiJson<SendChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::BadRequest("Message content required".into()));
    }
    if content.chars().count() > MAX_CHAT_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Message must be at most {MAX_CHAT_CHARS} characters"
        )));
    }

    let (receiver, _) = resolve_user(&state, &username).await?;
    let me = claims.sub;
    let now = state.clock.now();
    let access = blocking(&state, move |db| db.send_chat_message(&me, &receiver, &content, now)).await?;

    match access {
        ChatAccess::Granted(row) => Ok((StatusCode::CREATED, Json(to_response(row)?))),
        ChatAccess::NotFriends => Err(not_friends()),
    }
}

/// GET /api/friends/chat/{username}: the last 24 hours, oldest first.
pub async fn history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(username): Path<String>,
) -> Result<Json<Vec<ChatMessageResponse>>, ApiError> {
    let (other, _) = resolve_user(&state, &username).await?;
    let me = claims.sub;
    let now = state.clock.now();
    let access = blocking(&state, move |db| db.chat_history(&me, &other, now)).await?;

    match access {
        ChatAccess::Granted(rows) => {
            let messages = rows
                .into_iter()
                .map(to_response)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Json(messages))
        }
        ChatAccess::NotFriends => Err(not_friends()),
    }
}

fn not_friends() -> ApiError {
    ApiError::Forbidden("Can only chat with friends".into())
}

fn to_response(row: ChatMessageRow) -> Result<ChatMessageResponse, ApiError> {
    Ok(ChatMessageResponse {
        id: row
            .id
            .parse()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Corrupt message id '{}': {}", row.id, e)))?,
        sender: row.sender_username,
        content: row.content,
        created_at: row.created_at,
    })
}

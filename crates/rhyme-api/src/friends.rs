use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde::Deserialize;
use tracing::info;

use rhyme_db::friends::FollowOutcome;
use rhyme_db::models::UserRow;
use rhyme_types::api::{
    Claims, FollowResponse, FriendSummary, IncomingRequest, RemoveResponse, RespondRequest,
    RespondResponse, StatusResponse, UsernameRequest,
};
use rhyme_types::models::{LinkStatus, RespondAction};

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::state::{AppState, blocking, parse_user_id, resolve_user};

const DEFAULT_SEARCH_LIMIT: u32 = 10;
const MAX_SEARCH_LIMIT: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u32>,
}

/// POST /api/friends/follow: send (or re-send) a friend request.
pub async fn follow(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UsernameRequest>,
) -> Result<Json<FollowResponse>, ApiError> {
    let (target, _) = resolve_user(&state, &req.username).await?;
    if target == claims.sub {
        return Err(ApiError::BadRequest("Cannot follow yourself".into()));
    }

    let me = claims.sub;
    let now = state.clock.now();
    let outcome = blocking(&state, move |db| db.request_friend(&me, &target, now)).await?;

    let detail = match outcome {
        FollowOutcome::Requested => "Friend request sent",
        FollowOutcome::AlreadyPending => "Request already sent",
        FollowOutcome::Rerequested => "Friend request re-sent",
        FollowOutcome::AlreadyFriends => return Err(ApiError::Conflict("Already friends".into())),
    };
    Ok(Json(FollowResponse {
        status: LinkStatus::Pending.as_str(),
        detail,
    }))
}

/// GET /api/friends/list
pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<FriendSummary>>, ApiError> {
    let me = claims.sub;
    let rows = blocking(&state, move |db| db.list_friends(&me)).await?;
    let friends = rows
        .into_iter()
        .map(summary)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(friends))
}

/// GET /api/friends/requests: pending requests addressed to the caller.
pub async fn incoming_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<IncomingRequest>>, ApiError> {
    let me = claims.sub;
    let rows = blocking(&state, move |db| db.incoming_requests(&me)).await?;
    let requests = rows
        .into_iter()
        .map(|row| {
            Ok(IncomingRequest {
                user_id: parse_user_id(&row.user_id)?,
                username: row.username,
                name: row.name,
                requested_at: row.requested_at,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;
    Ok(Json(requests))
}

/// POST /api/friends/respond: accept or decline a request from `username`.
pub async fn respond(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<RespondRequest>,
) -> Result<Json<RespondResponse>, ApiError> {
    let action: RespondAction = req
        .action
        .parse()
        .map_err(|_| ApiError::BadRequest("action must be 'accept' or 'decline'".into()))?;
    let (requester, requester_row) = resolve_user(&state, &req.username).await?;

    let me = claims.sub;
    let now = state.clock.now();
    let status = blocking(&state, move |db| db.respond_to_request(&requester, &me, action, now))
        .await?
        .ok_or_else(|| ApiError::Conflict("Friend request not found".into()))?;

    info!("{} {} request from {}", claims.username, status, requester_row.username);
    Ok(Json(RespondResponse {
        status: status.as_str(),
        friend: requester_row.username,
    }))
}

/// GET /api/friends/status/{username}
pub async fn status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(username): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let (target, _) = resolve_user(&state, &username).await?;
    let me = claims.sub;
    let status = blocking(&state, move |db| db.friendship_status(&me, &target)).await?;

    Ok(Json(StatusResponse {
        status: status.as_str(),
        direction: status.direction(),
    }))
}

/// DELETE /api/friends/remove: drop both directions between caller and `username`.
pub async fn remove(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UsernameRequest>,
) -> Result<Json<RemoveResponse>, ApiError> {
    let (target, target_row) = resolve_user(&state, &req.username).await?;
    let me = claims.sub;
    let removed = blocking(&state, move |db| db.remove_friendship(&me, &target)).await?;

    info!("{} removed {} ({} links)", claims.username, target_row.username, removed);
    Ok(Json(RemoveResponse {
        status: "removed",
        friend: target_row.username,
    }))
}

/// GET /api/friends/search?q=&limit=
pub async fn search(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Vec<FriendSummary>>, ApiError> {
    let needle = query.q.trim().to_string();
    if needle.is_empty() {
        return Err(ApiError::BadRequest("Search query required".into()));
    }
    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
        return Err(ApiError::BadRequest(format!("limit must be between 1 and {MAX_SEARCH_LIMIT}")));
    }

    let me = claims.sub;
    let rows = blocking(&state, move |db| db.search_users(&needle, &me, limit)).await?;
    let users = rows
        .into_iter()
        .map(summary)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(users))
}

fn summary(row: UserRow) -> Result<FriendSummary, ApiError> {
    Ok(FriendSummary {
        user_id: parse_user_id(&row.id)?,
        username: row.username,
        name: row.name,
    })
}

use std::collections::HashMap;

use axum::{
    extract::{rejection::JsonRejection, Json, Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use shared_types::{
    CreateTagRequest, EmailListResponse, HealthMode, HealthResponse, SearchResponse, Tag,
    UserResponse, UserTagRequest,
};
use uuid::Uuid;

use crate::db::{self, tags, users};
use crate::error::{ApiError, ApiResult};
use crate::mail::{Aggregator, AggregatorConfig, MailSearch, MailboxScope};
use crate::AppState;

// Mailbox handlers

pub async fn list_emails(State(state): State<AppState>) -> ApiResult<Json<EmailListResponse>> {
    let emails = state
        .credentials
        .list(MailboxScope::Monitored)
        .await?
        .into_iter()
        .map(|c| c.email)
        .collect();

    Ok(Json(EmailListResponse { emails }))
}

#[derive(Debug, Deserialize)]
pub struct HealthQuery {
    pub email: Option<String>,
    pub mode: Option<String>,
}

fn health_cache_key(mode: HealthMode, sender: &str) -> String {
    format!("health:{}:{}", mode.as_str(), sender.to_lowercase())
}

pub async fn email_health(
    State(state): State<AppState>,
    Query(query): Query<HealthQuery>,
) -> ApiResult<Json<HealthResponse>> {
    let sender = query
        .email
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("Email parameter is required"))?;

    let mode = match query.mode.as_deref() {
        None => HealthMode::default(),
        Some(raw) => raw
            .parse::<HealthMode>()
            .map_err(|_| ApiError::bad_request("mode must be 'quick' or 'full'"))?,
    };

    let cache_key = health_cache_key(mode, sender);
    if state.config.health_cache_ttl.is_some() {
        match state.cache.get(&cache_key).await {
            Ok(Some(cached)) => match serde_json::from_str::<HealthResponse>(&cached) {
                Ok(response) => return Ok(Json(response)),
                Err(e) => tracing::warn!("Discarding unreadable cache entry {}: {}", cache_key, e),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!("Cache read failed for {}: {:?}", cache_key, e),
        }
    }

    let credentials = state.credentials.list(MailboxScope::Monitored).await?;
    if credentials.is_empty() {
        return Err(ApiError::NotFound("No users found".to_string()));
    }

    let config = AggregatorConfig::for_mode(mode, state.config.health_full_max_results);
    let summary = Aggregator::new(&state.executor, config)
        .check_sender(&credentials, sender)
        .await;

    tracing::info!(
        "Health of {} ({} mode): {} across {} users",
        sender,
        mode.as_str(),
        summary.status.as_str(),
        summary.total_users
    );

    // A verdict with unchecked mailboxes is not pinned in the cache.
    let cacheable = !summary.has_failures();
    let response = HealthResponse::for_mode(mode, summary);

    if let Some(ttl) = state.config.health_cache_ttl.filter(|_| cacheable) {
        let stored = match serde_json::to_string(&response) {
            Ok(raw) => state.cache.set(&cache_key, &raw, Some(ttl)).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = stored {
            tracing::warn!("Cache write failed for {}: {:?}", cache_key, e);
        }
    }

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

pub async fn search_emails(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let sender = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("Search query is required"))?;

    let credentials = state.credentials.list(MailboxScope::Authenticated).await?;
    let messages = MailSearch::new(&state.executor, state.config.search_max_results)
        .search_sender(&credentials, sender)
        .await;

    Ok(Json(SearchResponse { messages }))
}

// User handlers

pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<UserResponse>>> {
    let mut conn = db::get_conn(&state.pool).await?;

    let all_users = users::list_all(&mut conn).await?;
    let mut tags_by_user: HashMap<Uuid, Vec<Tag>> = HashMap::new();
    for (user_id, tag) in users::list_tag_links(&mut conn).await? {
        tags_by_user.entry(user_id).or_default().push(tag);
    }

    let responses = all_users
        .into_iter()
        .map(|user| {
            let tags = tags_by_user.remove(&user.id).unwrap_or_default();
            user.into_response(tags)
        })
        .collect();

    Ok(Json(responses))
}

// Tag handlers

pub async fn list_tags(State(state): State<AppState>) -> ApiResult<Json<Vec<Tag>>> {
    let mut conn = db::get_conn(&state.pool).await?;
    let all_tags = tags::list_all(&mut conn).await?;
    Ok(Json(all_tags))
}

pub async fn create_tag(
    State(state): State<AppState>,
    payload: Result<Json<CreateTagRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Tag>)> {
    let Json(payload) = payload?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Tag name is required"));
    }

    let mut conn = db::get_conn(&state.pool).await?;
    let tag = tags::upsert_by_name(&mut conn, name).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

pub async fn delete_tag(
    State(state): State<AppState>,
    Path(tag_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = db::get_conn(&state.pool).await?;

    if !tags::delete(&mut conn, tag_id).await? {
        return Err(ApiError::not_found("Tag"));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_user_tags(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Tag>>> {
    let mut conn = db::get_conn(&state.pool).await?;

    users::get_by_id(&mut conn, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    Ok(Json(tags::list_for_user(&mut conn, user_id).await?))
}

pub async fn add_user_tag(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    payload: Result<Json<UserTagRequest>, JsonRejection>,
) -> ApiResult<Json<Vec<Tag>>> {
    let Json(payload) = payload?;
    let mut conn = db::get_conn(&state.pool).await?;

    users::get_by_id(&mut conn, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    tags::get_by_id(&mut conn, payload.tag_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tag"))?;

    tags::attach(&mut conn, user_id, payload.tag_id).await?;
    Ok(Json(tags::list_for_user(&mut conn, user_id).await?))
}

pub async fn remove_user_tag(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    payload: Result<Json<UserTagRequest>, JsonRejection>,
) -> ApiResult<Json<Vec<Tag>>> {
    let Json(payload) = payload?;
    let mut conn = db::get_conn(&state.pool).await?;

    users::get_by_id(&mut conn, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    tags::detach(&mut conn, user_id, payload.tag_id).await?;
    Ok(Json(tags::list_for_user(&mut conn, user_id).await?))
}

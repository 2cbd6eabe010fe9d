//! Authentication HTTP handlers.

use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use serde::Deserialize;

use crate::db::{self, users};
use crate::error::{ApiError, ApiResult};
use crate::models::NewUser;
use crate::AppState;

use super::{
    build_auth_cookie, build_logout_cookie, jwt,
    types::{AuthUser, AuthUserResponse, LoginInitResponse, LogoutResponse},
};

/// How long a login attempt may take between consent and callback
const STATE_TTL: Duration = Duration::from_secs(600);

fn state_key(csrf_state: &str) -> String {
    format!("oauth_state:{}", csrf_state)
}

/// Create a CSRF state for a new login attempt and return the consent URL.
async fn begin_login(state: &AppState) -> ApiResult<String> {
    let csrf_state = uuid::Uuid::new_v4().to_string();
    state
        .cache
        .set(&state_key(&csrf_state), "1", Some(STATE_TTL))
        .await?;

    Ok(state.config.google.authorization_url(&csrf_state))
}

/// Redirect the browser to the Google consent screen.
pub async fn auth_login(State(state): State<AppState>) -> ApiResult<Redirect> {
    let auth_url = begin_login(&state).await?;
    Ok(Redirect::to(&auth_url))
}

/// Start Google OAuth login flow.
///
/// Returns a URL that the frontend should redirect the user to.
pub async fn auth_google(State(state): State<AppState>) -> ApiResult<Json<LoginInitResponse>> {
    let auth_url = begin_login(&state).await?;
    Ok(Json(LoginInitResponse { auth_url }))
}

#[derive(Debug, Deserialize)]
pub struct AuthCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// Handle Google OAuth callback.
///
/// Exchanges the authorization code for tokens, stores the user with those
/// tokens and sets the session cookie on success.
pub async fn auth_callback(
    State(state): State<AppState>,
    Query(params): Query<AuthCallbackParams>,
) -> Response {
    let code = match params.code {
        Some(code) if !code.is_empty() => code,
        _ => return Redirect::to("/?auth_error=no_code").into_response(),
    };

    match consume_state(&state, params.state.as_deref()).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!("OAuth callback with unknown state");
            return Redirect::to("/?auth_error=invalid_state").into_response();
        }
        Err(e) => {
            tracing::error!("Auth callback error: {:?}", e);
            return Redirect::to("/?auth_error=callback_failed").into_response();
        }
    }

    match handle_callback_inner(&state, &code).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Auth callback error: {:?}", e);
            Redirect::to("/?auth_error=callback_failed").into_response()
        }
    }
}

async fn consume_state(state: &AppState, csrf_state: Option<&str>) -> anyhow::Result<bool> {
    let Some(csrf_state) = csrf_state else {
        return Ok(false);
    };

    let key = state_key(csrf_state);
    if state.cache.get(&key).await?.is_none() {
        return Ok(false);
    }

    state.cache.forget(&key).await?;
    Ok(true)
}

async fn handle_callback_inner(state: &AppState, code: &str) -> Result<Response, ApiError> {
    let tokens = state
        .identity
        .exchange_code(code)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Token exchange failed: {}", e)))?;

    let user_info = state
        .identity
        .user_info(&tokens.access_token)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to get user info: {}", e)))?;

    tracing::info!("OAuth login from: {}", user_info.email);
    if tokens.refresh_token.is_none() {
        tracing::warn!(
            "No refresh token received for {}, keeping any stored one",
            user_info.email
        );
    }

    let mut conn = db::get_conn(&state.pool).await?;
    let user = users::upsert_from_oauth(
        &mut conn,
        NewUser {
            email: &user_info.email,
            name: user_info.name.as_deref().unwrap_or(&user_info.email),
            picture: user_info.picture.as_deref(),
            google_id: &user_info.id,
            access_token: Some(&tokens.access_token),
            refresh_token: tokens.refresh_token.as_deref(),
        },
    )
    .await?;

    let session_user = AuthUser {
        user_id: user.id,
        email: user.email,
        name: Some(user.name),
        picture: user.picture,
    };
    let config = &state.auth_config;
    let token = jwt::create_token(config, &session_user)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to create token: {}", e)))?;
    let cookie = build_auth_cookie(config, &token);

    tracing::info!("Successful login for: {}", session_user.email);

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/"),
            (header::SET_COOKIE, cookie.as_str()),
        ],
    )
        .into_response())
}

/// Get current authenticated user info.
pub async fn auth_me(Extension(user): Extension<AuthUser>) -> Json<AuthUserResponse> {
    Json(user.into())
}

/// Logout - clear the session cookie.
pub async fn auth_logout(State(state): State<AppState>) -> impl IntoResponse {
    let cookie = build_logout_cookie(&state.auth_config);

    (
        [(header::SET_COOKIE, cookie)],
        Json(LogoutResponse { success: true }),
    )
}

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;

use crate::auth::session_token;

use super::{error::ApiError, handlers::AppState};

/// 認証済みユーザー
///
/// ハンドラーの引数に置くと、有効なセッションがないリクエストは401で拒否される。
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        session_token(&parts.headers)
            .and_then(|token| state.auth.resolve(&token))
            .map(CurrentUser)
            .ok_or(ApiError::Unauthorized)
    }
}

/// ログインしていれば`Some`（拒否はしない）
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<String>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            session_token(&parts.headers).and_then(|token| state.auth.resolve(&token)),
        ))
    }
}

use crate::application::{FieldErrors, LibraryError};
use crate::auth::AuthError;
use crate::ports::StoreError;
use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};

use super::types::ErrorResponse;

/// API層のエラー型
///
/// アプリケーション層のエラーをラップし、HTTPレスポンスへのマッピングを提供する。
#[derive(Debug)]
pub enum ApiError {
    Library(LibraryError),
    /// 認証が必要なエンドポイントにセッションなしでアクセスした
    Unauthorized,
    /// リクエストの形式エラー（項目ごとのエラーなし）
    BadRequest(String),
}

impl From<LibraryError> for ApiError {
    fn from(err: LibraryError) -> Self {
        ApiError::Library(err)
    }
}

impl From<FieldErrors> for ApiError {
    fn from(errors: FieldErrors) -> Self {
        ApiError::Library(LibraryError::InvalidInput(errors))
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => ApiError::BadRequest(err.to_string()),
            AuthError::Hash(e) => {
                tracing::error!("Password hashing failed: {}", e);
                ApiError::Library(LibraryError::Store(StoreError::Backend(e.into())))
            }
        }
    }
}

// 形式エラーはaxumの既定のテキスト応答ではなく`{ok: false, msg}`で返す
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(status = %rejection.status(), "Rejected JSON body: {}", rejection);
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new("Authentication required"),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::new(msg)),

            // 400 Bad Request - 項目ごとの入力エラー
            ApiError::Library(LibraryError::InvalidInput(errors)) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::with_errors("Invalid input", errors),
            ),

            // 409 Conflict - 一意キーの重複（項目ごと）
            ApiError::Library(LibraryError::DuplicateKey { field, message }) => (
                StatusCode::CONFLICT,
                ErrorResponse::with_errors(message.clone(), FieldErrors::single(field, message)),
            ),

            // 404 Not Found - リクエストされたリソースが存在しない
            ApiError::Library(LibraryError::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, ErrorResponse::new(msg))
            }

            // 409 Conflict - ビジネスルール違反
            ApiError::Library(LibraryError::Conflict(msg)) => {
                (StatusCode::CONFLICT, ErrorResponse::new(msg))
            }

            // 503 Service Unavailable - 競合による一時的な失敗。再試行可能
            ApiError::Library(err @ LibraryError::Busy) => {
                let mut response = (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ErrorResponse::new(err.to_string())),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from_static("1"));
                return response;
            }

            // 500 Internal Server Error - システム障害
            // 内部エラーの詳細はログに記録し、クライアントには一般的なメッセージのみを返す
            ApiError::Library(LibraryError::Store(e)) => {
                tracing::error!(error = ?e, "Store error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("An unexpected error occurred"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

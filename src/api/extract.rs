use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Path, Query},
};

use super::error::ApiError;

/// JSONボディ
///
/// JSONでない本文や型の合わない項目は`ApiError`として`{ok: false, msg}`で返す。
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// パスパラメータ（形式エラーは`ApiError`）
#[derive(Debug, FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// クエリパラメータ（形式エラーは`ApiError`）
#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

//! Credential check and session tokens for the mutation endpoints
//!
//! Users and sessions live in memory. Passwords are stored as argon2 PHC
//! strings; sessions are opaque UUID v4 tokens carried either as a bearer
//! token or in the `library_session` cookie.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::http::{HeaderMap, header::AUTHORIZATION};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use uuid::Uuid;

/// セッションCookie名
pub const SESSION_COOKIE: &str = "library_session";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("username/password required")]
    MissingCredentials,

    #[error("failed to hash password: {0}")]
    Hash(String),
}

#[derive(Debug, Clone)]
struct Session {
    username: String,
    expires_at: DateTime<Utc>,
}

/// 認証ゲート
///
/// 更新系エンドポイントの前段で、リクエストに有効なセッションがあるかを判定する。
/// 貸出エンジン側は認証済みであることを前提とし、認証情報を参照しない。
#[derive(Debug)]
pub struct AuthGate {
    /// username -> argon2 hash
    users: RwLock<HashMap<String, String>>,
    /// token -> session
    sessions: RwLock<HashMap<String, Session>>,
    session_ttl: Duration,
}

impl AuthGate {
    pub fn new(session_ttl: Duration) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            session_ttl,
        }
    }

    /// ユーザーが1人もいない場合に初期管理者を登録する
    pub fn seed_admin(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let empty = self
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty();
        if empty {
            self.register_user(username, password)?;
            tracing::info!(%username, "Bootstrap admin registered");
        }
        Ok(())
    }

    /// ユーザーを登録する。既に存在する場合は`false`
    pub fn register_user(&self, username: &str, password: &str) -> Result<bool, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::Hash(e.to_string()))?
            .to_string();

        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        if users.contains_key(username) {
            return Ok(false);
        }
        users.insert(username.to_string(), hash);
        Ok(true)
    }

    /// ユーザー名とパスワードを照合する
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        let Some(hash) = users.get(username.trim()) else {
            return false;
        };
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::error!(%username, "Stored password hash is invalid: {}", e);
                false
            }
        }
    }

    /// 照合に成功したらセッションを発行する
    pub fn login(&self, username: &str, password: &str) -> Result<Option<String>, AuthError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        if !self.authenticate(username, password) {
            return Ok(None);
        }
        Ok(Some(self.start_session(username.trim(), Utc::now())))
    }

    /// 登録に成功したらそのままセッションを発行する
    pub fn register(&self, username: &str, password: &str) -> Result<Option<String>, AuthError> {
        if !self.register_user(username, password)? {
            return Ok(None);
        }
        Ok(Some(self.start_session(username.trim(), Utc::now())))
    }

    pub fn logout(&self, token: &str) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);
    }

    /// トークンからユーザー名を引く（期限切れのセッションは破棄する）
    pub fn resolve(&self, token: &str) -> Option<String> {
        self.resolve_at(token, Utc::now())
    }

    pub fn resolve_at(&self, token: &str, now: DateTime<Utc>) -> Option<String> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        match sessions.get(token) {
            Some(session) if session.expires_at > now => Some(session.username.clone()),
            Some(_) => {
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    fn start_session(&self, username: &str, now: DateTime<Utc>) -> String {
        let token = Uuid::new_v4().to_string();
        let session = Session {
            username: username.to_string(),
            expires_at: now
                .checked_add_signed(self.session_ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.clone(), session);
        token
    }
}

/// リクエストヘッダーからセッショントークンを取り出す
///
/// `Authorization: Bearer <token>` を優先し、なければセッションCookieを見る。
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

use super::locks::LockTimeout;
use crate::domain::ValidationError;
use crate::ports::StoreError;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// 入力項目名 → エラーメッセージ
///
/// クライアントはこのキーでフォームの該当項目にエラーを表示する。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.insert(field, message);
        errors
    }

    pub fn insert(&mut self, field: &str, message: impl Into<String>) {
        self.0.insert(field.to_string(), message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<ValidationError> for FieldErrors {
    fn from(err: ValidationError) -> Self {
        let mut errors = Self::default();
        for violation in err.0 {
            errors.insert(violation.field, violation.message);
        }
        errors
    }
}

/// 図書館アプリケーション層のエラー
#[derive(Debug, Error)]
pub enum LibraryError {
    /// 入力エラー（項目ごと）
    #[error("Invalid input")]
    InvalidInput(FieldErrors),

    /// 一意キーの重複（項目ごと）
    #[error("{message}")]
    DuplicateKey {
        field: &'static str,
        message: String,
    },

    /// 参照先が存在しない
    #[error("{0}")]
    NotFound(String),

    /// 不変条件に違反する操作（在庫なし、貸出中、削除不可、返却済みなど）
    #[error("{0}")]
    Conflict(String),

    /// 競合による一時的な失敗。副作用はなく、再試行できる
    #[error("The library is busy, please retry")]
    Busy,

    /// ストアの障害
    #[error("Store error")]
    Store(#[source] StoreError),
}

impl LibraryError {
    pub fn not_found(message: impl Into<String>) -> Self {
        LibraryError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        LibraryError::Conflict(message.into())
    }

    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        LibraryError::InvalidInput(FieldErrors::single(field, message))
    }

    /// 呼び出し側が再試行してよいか
    pub fn is_retryable(&self) -> bool {
        matches!(self, LibraryError::Busy)
    }
}

impl From<ValidationError> for LibraryError {
    fn from(err: ValidationError) -> Self {
        LibraryError::InvalidInput(err.into())
    }
}

impl From<StoreError> for LibraryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Stale | StoreError::Timeout => {
                tracing::warn!("Store contention: {}", err);
                LibraryError::Busy
            }
            StoreError::Constraint(msg) => LibraryError::Conflict(msg),
            other => LibraryError::Store(other),
        }
    }
}

impl From<LockTimeout> for LibraryError {
    fn from(_: LockTimeout) -> Self {
        LibraryError::Busy
    }
}

/// アプリケーション層の Result型
pub type Result<T> = std::result::Result<T, LibraryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FieldViolation;

    #[test]
    fn test_validation_error_becomes_field_errors() {
        let err: LibraryError = ValidationError(vec![
            FieldViolation::new("isbn", "ISBN is required."),
            FieldViolation::new("copies", "Copies must be >= 0."),
        ])
        .into();

        match err {
            LibraryError::InvalidInput(errors) => {
                assert_eq!(errors.get("isbn"), Some("ISBN is required."));
                assert_eq!(errors.get("copies"), Some("Copies must be >= 0."));
                assert_eq!(errors.get("title"), None);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_store_contention_is_busy() {
        assert!(LibraryError::from(StoreError::Stale).is_retryable());
        assert!(LibraryError::from(StoreError::Timeout).is_retryable());
        assert!(matches!(
            LibraryError::from(StoreError::Constraint("x".into())),
            LibraryError::Conflict(_)
        ));
    }

    #[test]
    fn test_field_errors_serialize_as_object() {
        let errors = FieldErrors::single("name", "Name is required.");
        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            serde_json::json!({ "name": "Name is required." })
        );
    }
}

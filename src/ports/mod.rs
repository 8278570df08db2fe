pub mod book_store;
pub mod library_store;
pub mod loan_store;
pub mod member_store;

pub use book_store::*;
pub use library_store::*;
pub use loan_store::*;
pub use member_store::*;

use thiserror::Error;

/// ストアポート共通のエラー
#[derive(Debug, Error)]
pub enum StoreError {
    /// 一意キーの重複
    #[error("{0} already exists")]
    Duplicate(String),

    /// 版番号の不一致
    #[error("record was modified concurrently")]
    Stale,

    /// ストアの制約違反
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// ストア側のロック待ちが時間切れ
    #[error("store operation timed out")]
    Timeout,

    /// バックエンドの障害
    #[error("store backend error")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, StoreError>;

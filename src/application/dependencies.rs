use crate::domain::loan::DEFAULT_LOAN_PERIOD_DAYS;
use crate::ports::LibraryStore;
use std::sync::Arc;
use std::time::Duration;

use super::locks::KeyLocks;

/// 貸出ルールの設定値
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LendingPolicy {
    /// 貸出期間（日数）
    pub loan_period_days: u64,
    /// 会員1人あたりの最大貸出冊数（Noneは無制限）
    pub max_loans_per_member: Option<usize>,
    /// エンティティロック取得の待ち時間の上限
    pub lock_timeout: Duration,
    /// 目録検索で大文字・小文字を区別するか
    pub case_sensitive_search: bool,
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            loan_period_days: DEFAULT_LOAN_PERIOD_DAYS,
            max_loans_per_member: None,
            lock_timeout: Duration::from_millis(2000),
            case_sensitive_search: false,
        }
    }
}

/// サービスの依存関係
///
/// 関数型DDDの原則に従い、データ構造として定義。
/// 振る舞い（メソッド）は持たず、各ユースケース関数に明示的に渡す。
/// ストアはインスタンスごとに独立しているため、テストごとに新しい状態を用意できる。
#[derive(Clone)]
pub struct ServiceDependencies {
    pub store: Arc<dyn LibraryStore>,
    pub locks: Arc<KeyLocks>,
    pub policy: LendingPolicy,
}

impl ServiceDependencies {
    pub fn new(store: Arc<dyn LibraryStore>, policy: LendingPolicy) -> Self {
        Self {
            store,
            locks: Arc::new(KeyLocks::new()),
            policy,
        }
    }
}

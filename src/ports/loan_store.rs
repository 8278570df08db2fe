use crate::domain::{Isbn, Loan, LoanId, MemberId};
use async_trait::async_trait;

use super::Result;

/// 貸出台帳ストアポート
///
/// 台帳は追記専用。貸出レコードの追加・更新は`LibraryStore::commit`経由で行い、
/// 削除の操作は存在しない。
#[async_trait]
pub trait LoanStore: Send + Sync {
    /// IDで貸出を取得する
    async fn get_loan(&self, loan_id: LoanId) -> Result<Option<Loan>>;

    /// 全貸出を貸出日順で取得する
    async fn list_loans(&self) -> Result<Vec<Loan>>;

    /// 会員の全貸出を貸出日順で取得する
    ///
    /// 会員の貸出履歴表示に使用される。
    async fn list_loans_for_member(&self, member_id: &MemberId) -> Result<Vec<Loan>>;

    /// 会員と書籍の組に対する貸出中の貸出を取得する
    ///
    /// 同じ組の貸出中の貸出は高々1件。
    async fn find_active_loan(&self, member_id: &MemberId, isbn: &Isbn) -> Result<Option<Loan>>;

    /// 書籍に対する貸出中の貸出の件数
    ///
    /// 書籍削除の可否判定に使用される。
    async fn count_active_loans_for_book(&self, isbn: &Isbn) -> Result<u32>;
}

use crate::domain::{Isbn, Loan, LoanId, MemberId};

use super::dependencies::ServiceDependencies;
use super::errors::{LibraryError, Result};

/// 会員と書籍の組に対する貸出中の貸出を探す
pub async fn find_active(
    deps: &ServiceDependencies,
    member_id: &MemberId,
    isbn: &Isbn,
) -> Result<Option<Loan>> {
    Ok(deps.store.find_active_loan(member_id, isbn).await?)
}

/// IDで貸出を取得する
pub async fn get_loan(deps: &ServiceDependencies, loan_id: LoanId) -> Result<Loan> {
    deps.store
        .get_loan(loan_id)
        .await?
        .ok_or_else(|| LibraryError::not_found("Loan not found."))
}

/// 全貸出を取得する（返却済みを含む）
pub async fn list_loans(deps: &ServiceDependencies) -> Result<Vec<Loan>> {
    Ok(deps.store.list_loans().await?)
}

/// 会員の全貸出を取得する
pub async fn list_loans_for_member(
    deps: &ServiceDependencies,
    member_id: &MemberId,
) -> Result<Vec<Loan>> {
    Ok(deps.store.list_loans_for_member(member_id).await?)
}

/// 書籍に対する貸出中の貸出の件数
pub async fn count_active_for_book(deps: &ServiceDependencies, isbn: &Isbn) -> Result<u32> {
    Ok(deps.store.count_active_loans_for_book(isbn).await?)
}

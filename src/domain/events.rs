use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Isbn, LoanId, MemberId};

/// イベント：書籍が貸し出された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookIssued {
    pub loan_id: LoanId,
    pub isbn: Isbn,
    pub member_id: MemberId,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// イベント：書籍が返却された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookReturned {
    pub loan_id: LoanId,
    pub isbn: Isbn,
    pub member_id: MemberId,
    pub returned_at: DateTime<Utc>,
    pub was_overdue: bool,
}

/// イベント：返却が取り消され、貸出中に戻った
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanReopened {
    pub loan_id: LoanId,
    pub isbn: Isbn,
    pub member_id: MemberId,
    pub reopened_at: DateTime<Utc>,
}

/// イベント：返却期限が変更された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRescheduled {
    pub loan_id: LoanId,
    pub old_due_date: NaiveDate,
    pub new_due_date: NaiveDate,
}

/// 貸出ドメインイベント統合型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LendingEvent {
    BookIssued(BookIssued),
    BookReturned(BookReturned),
    LoanReopened(LoanReopened),
    LoanRescheduled(LoanRescheduled),
}

impl LendingEvent {
    /// イベント種別名（ログ出力用）
    pub fn event_type(&self) -> &'static str {
        match self {
            LendingEvent::BookIssued(_) => "BookIssued",
            LendingEvent::BookReturned(_) => "BookReturned",
            LendingEvent::LoanReopened(_) => "LoanReopened",
            LendingEvent::LoanRescheduled(_) => "LoanRescheduled",
        }
    }

    pub fn loan_id(&self) -> LoanId {
        match self {
            LendingEvent::BookIssued(e) => e.loan_id,
            LendingEvent::BookReturned(e) => e.loan_id,
            LendingEvent::LoanReopened(e) => e.loan_id,
            LendingEvent::LoanRescheduled(e) => e.loan_id,
        }
    }
}

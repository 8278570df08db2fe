use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{
    BookIssued, BookReturned, Isbn, LoanId, LoanReopened, LoanRescheduled, MemberId,
    ReopenLoanError, RescheduleError, ReturnBookError,
};

/// 貸出期間（日数）の既定値
pub const DEFAULT_LOAN_PERIOD_DAYS: u64 = 14;

/// 貸出の状態
///
/// Active → Returned の2状態。Returned → Active は管理者による
/// 返却取り消し（`reopen_loan`）でのみ発生する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum LoanState {
    Active,
    Returned { returned_at: DateTime<Utc> },
}

/// 貸出レコード - 1冊の書籍の1回の貸出
///
/// 台帳は追記専用で、貸出レコードは削除されない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub loan_id: LoanId,
    pub member_id: MemberId,
    pub isbn: Isbn,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub state: LoanState,
}

impl Loan {
    pub fn is_active(&self) -> bool {
        matches!(self.state, LoanState::Active)
    }

    pub fn returned_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            LoanState::Active => None,
            LoanState::Returned { returned_at } => Some(returned_at),
        }
    }
}

/// 貸出日から返却期限を計算する
pub fn due_date_for(issue_date: NaiveDate, loan_period_days: u64) -> NaiveDate {
    issue_date
        .checked_add_days(Days::new(loan_period_days))
        .unwrap_or(NaiveDate::MAX)
}

/// 純粋関数：貸出を記録する
///
/// 副作用なし。Active状態の新しいLoanとイベントを返す。
pub fn record(
    member_id: MemberId,
    isbn: Isbn,
    issue_date: NaiveDate,
    due_date: NaiveDate,
) -> (Loan, BookIssued) {
    let loan = Loan {
        loan_id: LoanId::new(),
        member_id,
        isbn,
        issue_date,
        due_date,
        state: LoanState::Active,
    };

    let event = BookIssued {
        loan_id: loan.loan_id,
        isbn: loan.isbn.clone(),
        member_id: loan.member_id.clone(),
        issue_date,
        due_date,
    };

    (loan, event)
}

/// 純粋関数：返却済みにする
///
/// ビジネスルール：
/// - 延滞していても返却は受け付ける
/// - 返却済みの貸出は再返却できない
pub fn mark_returned(
    loan: &Loan,
    returned_at: DateTime<Utc>,
) -> Result<(Loan, BookReturned), ReturnBookError> {
    if !loan.is_active() {
        return Err(ReturnBookError::AlreadyReturned);
    }

    let returned = set_returned_flag(loan, true, returned_at);
    let event = BookReturned {
        loan_id: loan.loan_id,
        isbn: loan.isbn.clone(),
        member_id: loan.member_id.clone(),
        returned_at,
        was_overdue: returned_at.date_naive() > loan.due_date,
    };

    Ok((returned, event))
}

/// 純粋関数：返却を取り消して貸出中に戻す
pub fn reopen_loan(
    loan: &Loan,
    reopened_at: DateTime<Utc>,
) -> Result<(Loan, LoanReopened), ReopenLoanError> {
    if loan.is_active() {
        return Err(ReopenLoanError::NotReturned);
    }

    let reopened = set_returned_flag(loan, false, reopened_at);
    let event = LoanReopened {
        loan_id: loan.loan_id,
        isbn: loan.isbn.clone(),
        member_id: loan.member_id.clone(),
        reopened_at,
    };

    Ok((reopened, event))
}

/// 純粋関数：返却フラグを直接設定する
///
/// 書籍・会員側の整合は取らない。貸出エンジンの状態遷移からのみ使うこと。
pub fn set_returned_flag(loan: &Loan, returned: bool, at: DateTime<Utc>) -> Loan {
    let state = if returned {
        LoanState::Returned { returned_at: at }
    } else {
        LoanState::Active
    };
    Loan {
        state,
        ..loan.clone()
    }
}

/// 純粋関数：返却期限を変更する
pub fn update_due(
    loan: &Loan,
    new_due_date: NaiveDate,
) -> Result<(Loan, LoanRescheduled), RescheduleError> {
    if new_due_date < loan.issue_date {
        return Err(RescheduleError::BeforeIssueDate);
    }

    let event = LoanRescheduled {
        loan_id: loan.loan_id,
        old_due_date: loan.due_date,
        new_due_date,
    };
    let rescheduled = Loan {
        due_date: new_due_date,
        ..loan.clone()
    };

    Ok((rescheduled, event))
}

/// 純粋関数：延滞判定
pub fn is_overdue(loan: &Loan, today: NaiveDate) -> bool {
    loan.is_active() && today > loan.due_date
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn issue_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 1).unwrap()
    }

    fn active_loan() -> Loan {
        let (loan, _) = record(
            MemberId::parse("m1").unwrap(),
            Isbn::parse("111").unwrap(),
            issue_date(),
            due_date_for(issue_date(), DEFAULT_LOAN_PERIOD_DAYS),
        );
        loan
    }

    #[test]
    fn test_due_date_for_default_period() {
        assert_eq!(
            due_date_for(issue_date(), DEFAULT_LOAN_PERIOD_DAYS),
            NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
        );
    }

    #[test]
    fn test_record_creates_active_loan() {
        let (loan, event) = record(
            MemberId::parse("m1").unwrap(),
            Isbn::parse("111").unwrap(),
            issue_date(),
            due_date_for(issue_date(), 14),
        );

        assert!(loan.is_active());
        assert_eq!(loan.returned_at(), None);
        assert_eq!(event.loan_id, loan.loan_id);
        assert_eq!(event.due_date, loan.due_date);
    }

    #[test]
    fn test_record_generates_distinct_ids() {
        let a = active_loan();
        let b = active_loan();
        assert_ne!(a.loan_id, b.loan_id);
    }

    #[test]
    fn test_mark_returned_success() {
        let loan = active_loan();
        let returned_at = Utc.with_ymd_and_hms(2026, 10, 7, 10, 0, 0).unwrap();

        let (returned, event) = mark_returned(&loan, returned_at).unwrap();

        assert_eq!(returned.returned_at(), Some(returned_at));
        assert_eq!(returned.loan_id, loan.loan_id);
        assert!(!event.was_overdue);
    }

    #[test]
    fn test_mark_returned_late_is_overdue() {
        let loan = active_loan();
        let returned_at = Utc.with_ymd_and_hms(2026, 10, 20, 10, 0, 0).unwrap();

        let (_, event) = mark_returned(&loan, returned_at).unwrap();
        assert!(event.was_overdue);
    }

    #[test]
    fn test_mark_returned_twice_fails() {
        let loan = active_loan();
        let (returned, _) = mark_returned(&loan, Utc::now()).unwrap();

        assert_eq!(
            mark_returned(&returned, Utc::now()),
            Err(ReturnBookError::AlreadyReturned)
        );
    }

    #[test]
    fn test_reopen_loan() {
        let loan = active_loan();
        assert_eq!(
            reopen_loan(&loan, Utc::now()),
            Err(ReopenLoanError::NotReturned)
        );

        let (returned, _) = mark_returned(&loan, Utc::now()).unwrap();
        let (reopened, event) = reopen_loan(&returned, Utc::now()).unwrap();
        assert!(reopened.is_active());
        assert_eq!(event.loan_id, loan.loan_id);
    }

    #[test]
    fn test_update_due() {
        let loan = active_loan();
        let new_due = NaiveDate::from_ymd_opt(2026, 11, 1).unwrap();

        let (rescheduled, event) = update_due(&loan, new_due).unwrap();
        assert_eq!(rescheduled.due_date, new_due);
        assert_eq!(event.old_due_date, loan.due_date);

        let too_early = NaiveDate::from_ymd_opt(2026, 9, 30).unwrap();
        assert_eq!(
            update_due(&loan, too_early),
            Err(RescheduleError::BeforeIssueDate)
        );
    }

    #[test]
    fn test_is_overdue() {
        let loan = active_loan();
        assert!(!is_overdue(&loan, loan.due_date));
        assert!(is_overdue(&loan, NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()));

        let (returned, _) = mark_returned(&loan, Utc::now()).unwrap();
        assert!(!is_overdue(&returned, NaiveDate::from_ymd_opt(2027, 1, 1).unwrap()));
    }
}

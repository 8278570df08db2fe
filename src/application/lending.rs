use crate::domain::{
    self, Book, BorrowError, CheckInError, CheckOutError, GiveBackError, Isbn, LendingEvent,
    Loan, LoanId, Member, MemberId, ReopenLoanError, RescheduleError, ReturnBookError, commands::*,
};
use crate::ports::Changeset;
use chrono::{DateTime, Utc};

use super::catalog::load_book;
use super::dependencies::ServiceDependencies;
use super::directory::load_member;
use super::errors::{LibraryError, Result};
use super::locks::{HeldLocks, LockKey};

/// 状態遷移の結果：コミットする変更と、発生したイベント
struct Transition {
    changeset: Changeset,
    loan: Loan,
    event: LendingEvent,
}

fn no_copies_available(_: CheckOutError) -> LibraryError {
    LibraryError::conflict("No copies available.")
}

fn borrow_refused(err: BorrowError) -> LibraryError {
    match err {
        BorrowError::AlreadyBorrowed => {
            LibraryError::conflict("Member has already borrowed this book.")
        }
        BorrowError::LimitReached { limit } => {
            LibraryError::conflict(format!("Borrowing limit of {limit} books reached."))
        }
    }
}

/// 貸出に関わる書籍・会員のロックを取得する
///
/// ロックの取得順序は`KeyLocks`が保証する。
async fn lock_pair(
    deps: &ServiceDependencies,
    isbn: &Isbn,
    member_id: &MemberId,
) -> Result<HeldLocks> {
    let held = deps
        .locks
        .acquire(
            [
                LockKey::Book(isbn.clone()),
                LockKey::Member(member_id.clone()),
            ],
            deps.policy.lock_timeout,
        )
        .await?;
    Ok(held)
}

fn log_event(event: &LendingEvent) {
    tracing::info!(
        event_type = event.event_type(),
        loan_id = %event.loan_id(),
        "Lending event committed"
    );
}

/// 書籍を貸し出す
///
/// ビジネスルール：
/// - 会員と書籍が存在すること
/// - 貸出可能冊数が1冊以上であること（最後の1冊も貸し出せる）
/// - 同じ会員が同じ書籍を貸出中でないこと
/// - 貸出上限が設定されている場合、上限に達していないこと
///
/// 書籍の貸出可能冊数・会員の借用記録・新しい貸出は1つの変更集合として
/// アトミックにコミットされる。
///
/// # 引数
/// * `deps` - サービスの依存関係
/// * `cmd` - 貸出コマンド
///
/// # 戻り値
/// 作成された貸出
pub async fn issue_book(deps: &ServiceDependencies, cmd: IssueBook) -> Result<Loan> {
    let _locks = lock_pair(deps, &cmd.isbn, &cmd.member_id).await?;

    // 1. 会員・書籍の存在確認
    let member = load_member(deps, &cmd.member_id).await?;
    let book = load_book(deps, &cmd.isbn).await?;

    // 2. 在庫確認
    let book = domain::book::check_out(&book).map_err(no_copies_available)?;

    // 3. 同じ組の貸出中の貸出がないこと
    if deps
        .store
        .find_active_loan(&cmd.member_id, &cmd.isbn)
        .await?
        .is_some()
    {
        return Err(LibraryError::conflict(
            "Member has already borrowed this book.",
        ));
    }

    // 4. 会員の借用記録（貸出上限を含む）
    let member = domain::member::borrow(&member, &cmd.isbn, deps.policy.max_loans_per_member)
        .map_err(borrow_refused)?;

    // 5. 貸出を記録
    let issue_date = cmd.issued_at.date_naive();
    let due_date = domain::loan::due_date_for(issue_date, deps.policy.loan_period_days);
    let (loan, event) = domain::loan::record(cmd.member_id, cmd.isbn, issue_date, due_date);

    // 6. アトミックにコミット
    deps.store
        .commit(Changeset {
            books: vec![book],
            members: vec![member],
            loans: vec![loan.clone()],
        })
        .await?;

    log_event(&LendingEvent::BookIssued(event));
    Ok(loan)
}

/// 書籍を返却する
///
/// ビジネスルール：
/// - 会員が存在すること
/// - その会員・書籍の組に貸出中の貸出があること
/// - 延滞していても返却は受け付ける
///
/// # 戻り値
/// 返却済みになった貸出
pub async fn return_book(deps: &ServiceDependencies, cmd: ReturnBook) -> Result<Loan> {
    let _locks = lock_pair(deps, &cmd.isbn, &cmd.member_id).await?;

    let member = load_member(deps, &cmd.member_id).await?;
    let loan = deps
        .store
        .find_active_loan(&cmd.member_id, &cmd.isbn)
        .await?
        .ok_or_else(|| LibraryError::not_found("No active loan for this member and book."))?;
    let book = load_book(deps, &cmd.isbn).await?;

    let transition = close(&book, &member, &loan, cmd.returned_at)?;
    commit_transition(deps, transition).await
}

/// 貸出の状態を遷移させる
///
/// - 貸出中 → 返却済み：返却と同じ処理
/// - 返却済み → 貸出中：貸出と同じ条件で検証し、在庫と借用記録を戻す
/// - 同じ状態への遷移：何もしない
///
/// # 引数
/// * `returned` - 遷移後の返却フラグ
pub async fn set_loan_state(
    deps: &ServiceDependencies,
    loan_id: LoanId,
    returned: bool,
    at: DateTime<Utc>,
) -> Result<Loan> {
    let loan = super::ledger::get_loan(deps, loan_id).await?;
    let _locks = lock_pair(deps, &loan.isbn, &loan.member_id).await?;

    // ロック待ちの間に変わっている可能性があるため読み直す
    let loan = super::ledger::get_loan(deps, loan_id).await?;
    match transition(deps, &loan, returned, at).await? {
        Some(transition) => commit_transition(deps, transition).await,
        None => Ok(loan),
    }
}

/// 貸出を管理者が修正する
///
/// 返却フラグの変更は`set_loan_state`と同じ遷移を通り、返却期限の変更と
/// 合わせて1つの変更集合としてコミットされる。
pub async fn edit_loan(deps: &ServiceDependencies, cmd: EditLoan) -> Result<Loan> {
    let loan = super::ledger::get_loan(deps, cmd.loan_id).await?;
    let _locks = lock_pair(deps, &loan.isbn, &loan.member_id).await?;
    let loan = super::ledger::get_loan(deps, cmd.loan_id).await?;

    let mut changeset = Changeset::default();
    let mut events = Vec::new();
    let mut current = loan;

    if let Some(returned) = cmd.returned {
        if let Some(t) = transition(deps, &current, returned, cmd.edited_at).await? {
            changeset = changeset.merge(t.changeset);
            events.push(t.event);
            current = t.loan;
        }
    }

    if let Some(due_date) = cmd.due_date {
        if due_date != current.due_date {
            let (rescheduled, event) =
                domain::loan::update_due(&current, due_date).map_err(|e| match e {
                    RescheduleError::BeforeIssueDate => LibraryError::invalid(
                        "due_date",
                        "Due date cannot be before the issue date.",
                    ),
                })?;
            changeset = changeset.merge(Changeset {
                loans: vec![rescheduled.clone()],
                ..Default::default()
            });
            events.push(LendingEvent::LoanRescheduled(event));
            current = rescheduled;
        }
    }

    if changeset.is_empty() {
        return Ok(current);
    }

    deps.store.commit(changeset).await?;
    events.iter().for_each(log_event);
    Ok(current)
}

/// 返却フラグに応じた遷移を組み立てる（同じ状態なら`None`）
async fn transition(
    deps: &ServiceDependencies,
    loan: &Loan,
    returned: bool,
    at: DateTime<Utc>,
) -> Result<Option<Transition>> {
    if loan.is_active() != returned {
        return Ok(None);
    }

    let member = load_member(deps, &loan.member_id).await?;
    let book = load_book(deps, &loan.isbn).await?;

    if returned {
        close(&book, &member, loan, at).map(Some)
    } else {
        reopen(deps, &book, &member, loan, at).await.map(Some)
    }
}

/// 貸出中 → 返却済み
fn close(book: &Book, member: &Member, loan: &Loan, at: DateTime<Utc>) -> Result<Transition> {
    let (returned, event) = domain::loan::mark_returned(loan, at).map_err(|e| match e {
        ReturnBookError::AlreadyReturned => LibraryError::conflict("Loan is already returned."),
    })?;
    let book = domain::book::check_in(book).map_err(|e| match e {
        CheckInError::NothingCheckedOut => {
            LibraryError::conflict("Book has no copies checked out.")
        }
    })?;
    let member = domain::member::give_back(member, &loan.isbn).map_err(|e| match e {
        GiveBackError::NotBorrowed => {
            LibraryError::conflict("Member has not borrowed this book.")
        }
    })?;

    Ok(Transition {
        changeset: Changeset {
            books: vec![book],
            members: vec![member],
            loans: vec![returned.clone()],
        },
        loan: returned,
        event: LendingEvent::BookReturned(event),
    })
}

/// 返却済み → 貸出中（返却の取り消し）
async fn reopen(
    deps: &ServiceDependencies,
    book: &Book,
    member: &Member,
    loan: &Loan,
    at: DateTime<Utc>,
) -> Result<Transition> {
    let (reopened, event) = domain::loan::reopen_loan(loan, at).map_err(|e| match e {
        ReopenLoanError::NotReturned => LibraryError::conflict("Loan is not returned."),
    })?;
    let book = domain::book::check_out(book).map_err(no_copies_available)?;

    if deps
        .store
        .find_active_loan(&loan.member_id, &loan.isbn)
        .await?
        .is_some()
    {
        return Err(LibraryError::conflict(
            "Member has already borrowed this book.",
        ));
    }

    let member = domain::member::borrow(member, &loan.isbn, deps.policy.max_loans_per_member)
        .map_err(borrow_refused)?;

    Ok(Transition {
        changeset: Changeset {
            books: vec![book],
            members: vec![member],
            loans: vec![reopened.clone()],
        },
        loan: reopened,
        event: LendingEvent::LoanReopened(event),
    })
}

async fn commit_transition(deps: &ServiceDependencies, transition: Transition) -> Result<Loan> {
    deps.store.commit(transition.changeset).await?;
    log_event(&transition.event);
    Ok(transition.loan)
}

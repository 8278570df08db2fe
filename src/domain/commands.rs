use chrono::{DateTime, NaiveDate, Utc};

use super::{BookEdit, Isbn, LoanId, MemberId};

/// コマンド：書籍を目録に登録する
///
/// 入力検証はドメイン関数で行うため、値は未検証のまま保持する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddBook {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub copies: i64,
}

/// コマンド：書籍情報を編集する
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateBook {
    pub isbn: Isbn,
    pub edit: BookEdit,
}

/// コマンド：会員を登録する
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterMember {
    pub member_id: String,
    pub name: String,
}

/// コマンド：会員情報を編集する
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateMember {
    pub member_id: MemberId,
    pub name: Option<String>,
}

/// コマンド：書籍を貸し出す
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueBook {
    pub member_id: MemberId,
    pub isbn: Isbn,
    pub issued_at: DateTime<Utc>,
}

/// コマンド：書籍を返却する
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnBook {
    pub member_id: MemberId,
    pub isbn: Isbn,
    pub returned_at: DateTime<Utc>,
}

/// コマンド：貸出を管理者が修正する（返却期限・返却フラグ）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditLoan {
    pub loan_id: LoanId,
    pub due_date: Option<NaiveDate>,
    pub returned: Option<bool>,
    pub edited_at: DateTime<Utc>,
}

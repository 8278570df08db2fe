use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::application::FieldErrors;
use crate::domain::{Book, Loan, Member, SearchField, loan::is_overdue};

// ============================================================================
// Requests
// ============================================================================

/// 目録検索のクエリパラメータ（GET /api/books?q=&by=）
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub by: Option<SearchField>,
}

/// POST /api/books
///
/// フォームからの入力を受けるため、すべての項目を省略可能として受け取り、
/// 検証はドメイン関数で行う。
#[derive(Debug, Default, Deserialize)]
pub struct AddBookRequest {
    pub isbn: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    /// 数値または数値文字列
    pub copies: Option<Value>,
}

/// PUT /api/books/:isbn
#[derive(Debug, Default, Deserialize)]
pub struct UpdateBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub copies: Option<Value>,
}

/// POST /api/members
#[derive(Debug, Default, Deserialize)]
pub struct RegisterMemberRequest {
    pub member_id: Option<String>,
    pub name: Option<String>,
}

/// PUT /api/members/:id
#[derive(Debug, Default, Deserialize)]
pub struct UpdateMemberRequest {
    pub name: Option<String>,
}

/// POST /api/issue, POST /api/return
#[derive(Debug, Default, Deserialize)]
pub struct LendingRequest {
    pub member_id: Option<String>,
    pub isbn: Option<String>,
}

/// PUT /api/loans/:id
#[derive(Debug, Default, Deserialize)]
pub struct EditLoanRequest {
    /// YYYY-MM-DD
    pub due_date: Option<String>,
    pub returned: Option<bool>,
}

/// POST /api/login, POST /api/register
#[derive(Debug, Default, Deserialize)]
pub struct CredentialsRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// 所蔵数の入力値を解釈する
///
/// 省略・nullは0冊。数値文字列も受け付ける。
pub fn parse_copies(value: Option<&Value>) -> Result<i64, FieldErrors> {
    let invalid = || FieldErrors::single("copies", "Copies must be a number.");
    match value {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n.as_i64().ok_or_else(invalid),
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

/// 返却期限の入力値を解釈する（YYYY-MM-DD）
pub fn parse_due_date(value: &str) -> Result<NaiveDate, FieldErrors> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        FieldErrors::single("due_date", "Invalid date format, expected YYYY-MM-DD")
    })
}

// ============================================================================
// Responses
// ============================================================================

/// 書籍レスポンス
///
/// `copies`は一覧表示用に貸出可能冊数を重複して持つ。
#[derive(Debug, Serialize)]
pub struct BookResponse {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub copies: u32,
    pub total_copies: u32,
    pub available_copies: u32,
}

impl From<Book> for BookResponse {
    fn from(book: Book) -> Self {
        Self {
            isbn: book.isbn.to_string(),
            title: book.title,
            author: book.author,
            copies: book.available_copies,
            total_copies: book.total_copies,
            available_copies: book.available_copies,
        }
    }
}

/// 会員レスポンス
#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub member_id: String,
    pub name: String,
    pub borrowed_books: Vec<String>,
}

impl From<Member> for MemberResponse {
    fn from(member: Member) -> Self {
        Self {
            member_id: member.member_id.to_string(),
            name: member.name,
            borrowed_books: member
                .borrowed_isbns
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// 貸出レスポンス
#[derive(Debug, Serialize)]
pub struct LoanResponse {
    pub loan_id: Uuid,
    pub member_id: String,
    pub isbn: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub returned: bool,
    pub returned_at: Option<DateTime<Utc>>,
    pub overdue: bool,
}

impl LoanResponse {
    pub fn new(loan: Loan, today: NaiveDate) -> Self {
        Self {
            overdue: is_overdue(&loan, today),
            loan_id: loan.loan_id.value(),
            member_id: loan.member_id.to_string(),
            isbn: loan.isbn.to_string(),
            issue_date: loan.issue_date,
            due_date: loan.due_date,
            returned: !loan.is_active(),
            returned_at: loan.returned_at(),
        }
    }
}

/// 更新系の成功レスポンス `{ok, msg}`
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub ok: bool,
    pub msg: String,
}

impl MessageResponse {
    pub fn ok(msg: impl Into<String>) -> Self {
        Self {
            ok: true,
            msg: msg.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookMutationResponse {
    pub ok: bool,
    pub msg: String,
    pub book: BookResponse,
}

#[derive(Debug, Serialize)]
pub struct MemberMutationResponse {
    pub ok: bool,
    pub msg: String,
    pub member: MemberResponse,
}

#[derive(Debug, Serialize)]
pub struct LoanMutationResponse {
    pub ok: bool,
    pub msg: String,
    pub loan: LoanResponse,
}

/// ログイン・ユーザー登録のレスポンス
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// GET /api/me
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: Option<String>,
}

/// エラーレスポンス `{ok: false, msg, errors?}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            msg: msg.into(),
            errors: None,
        }
    }

    pub fn with_errors(msg: impl Into<String>, errors: FieldErrors) -> Self {
        Self {
            ok: false,
            msg: msg.into(),
            errors: Some(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_copies_accepts_numbers_and_numeric_strings() {
        assert_eq!(parse_copies(None), Ok(0));
        assert_eq!(parse_copies(Some(&json!(null))), Ok(0));
        assert_eq!(parse_copies(Some(&json!(3))), Ok(3));
        assert_eq!(parse_copies(Some(&json!(" 5 "))), Ok(5));
        assert_eq!(parse_copies(Some(&json!(-1))), Ok(-1));

        let err = parse_copies(Some(&json!("many"))).unwrap_err();
        assert_eq!(err.get("copies"), Some("Copies must be a number."));
        assert!(parse_copies(Some(&json!(1.5))).is_err());
    }

    #[test]
    fn test_parse_due_date() {
        assert_eq!(
            parse_due_date("2026-10-30"),
            Ok(NaiveDate::from_ymd_opt(2026, 10, 30).unwrap())
        );
        assert!(parse_due_date("30/10/2026").is_err());
    }

    #[test]
    fn test_error_response_omits_empty_errors() {
        let body = serde_json::to_value(ErrorResponse::new("Book not found.")).unwrap();
        assert_eq!(body, json!({ "ok": false, "msg": "Book not found." }));
    }
}

use crate::application::{
    FieldErrors, LibraryError, ServiceDependencies, catalog, directory, ledger, lending,
};
use crate::auth::{AuthGate, SESSION_COOKIE, session_token};
use crate::domain::{
    BookEdit, Isbn, LoanId, MemberId, book::catalog_book, commands::*,
};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    error::ApiError,
    extract::{ApiJson, ApiPath, ApiQuery},
    session::{CurrentUser, MaybeUser},
    types::*,
};

// ============================================================================
// State
// ============================================================================

/// ハンドラー間で共有されるアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub service_deps: ServiceDependencies,
    pub auth: Arc<AuthGate>,
}

fn book_isbn(raw: &str) -> Result<Isbn, ApiError> {
    Isbn::parse(raw).map_err(|_| LibraryError::not_found("Book not found.").into())
}

fn member_key(raw: &str) -> Result<MemberId, ApiError> {
    MemberId::parse(raw).map_err(|_| LibraryError::not_found("Member not found.").into())
}

fn lending_pair(req: LendingRequest) -> Result<(MemberId, Isbn), ApiError> {
    let member_id = req.member_id.as_deref().and_then(|s| MemberId::parse(s).ok());
    let isbn = req.isbn.as_deref().and_then(|s| Isbn::parse(s).ok());
    match (member_id, isbn) {
        (Some(member_id), Some(isbn)) => Ok((member_id, isbn)),
        _ => Err(ApiError::BadRequest(
            "member_id and isbn required".to_string(),
        )),
    }
}

fn loan_response(loan: crate::domain::Loan) -> LoanResponse {
    LoanResponse::new(loan, Utc::now().date_naive())
}

// ============================================================================
// Catalog
// ============================================================================

/// GET /api/books - 書籍一覧（`q`があれば検索）
pub async fn list_books(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Vec<BookResponse>>, ApiError> {
    let books = match query.q.as_deref() {
        Some(q) => {
            catalog::search_books(&state.service_deps, q, query.by.unwrap_or_default()).await?
        }
        None => catalog::list_books(&state.service_deps).await?,
    };
    Ok(Json(books.into_iter().map(BookResponse::from).collect()))
}

/// GET /api/books/:isbn
pub async fn get_book(
    State(state): State<Arc<AppState>>,
    ApiPath(isbn): ApiPath<String>,
) -> Result<Json<BookResponse>, ApiError> {
    let book = catalog::get_book(&state.service_deps, &book_isbn(&isbn)?).await?;
    Ok(Json(book.into()))
}

/// POST /api/books - 書籍を登録（要ログイン）
///
/// 所蔵数が数値でない場合も、他の項目のエラーと合わせて返す。
pub async fn add_book(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    ApiJson(req): ApiJson<AddBookRequest>,
) -> Result<(StatusCode, Json<BookMutationResponse>), ApiError> {
    let isbn = req.isbn.unwrap_or_default();
    let title = req.title.unwrap_or_default();
    let author = req.author.unwrap_or_default();

    let copies = match parse_copies(req.copies.as_ref()) {
        Ok(copies) => copies,
        Err(mut errors) => {
            if let Err(other) = catalog_book(&isbn, &title, &author, 0) {
                for violation in other.0 {
                    errors.insert(violation.field, violation.message);
                }
            }
            return Err(errors.into());
        }
    };

    let cmd = AddBook {
        isbn,
        title,
        author,
        copies,
    };
    let book = catalog::add_book(&state.service_deps, cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(BookMutationResponse {
            ok: true,
            msg: "Book added".to_string(),
            book: book.into(),
        }),
    ))
}

/// PUT /api/books/:isbn - 書籍情報を編集（要ログイン）
pub async fn update_book(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    ApiPath(isbn): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateBookRequest>,
) -> Result<Json<BookMutationResponse>, ApiError> {
    let copies = match req.copies.as_ref() {
        Some(value) if !value.is_null() => Some(parse_copies(Some(value))?),
        _ => None,
    };

    let cmd = UpdateBook {
        isbn: book_isbn(&isbn)?,
        edit: BookEdit {
            title: req.title,
            author: req.author,
            copies,
        },
    };
    let book = catalog::update_book(&state.service_deps, cmd).await?;

    Ok(Json(BookMutationResponse {
        ok: true,
        msg: "Book updated".to_string(),
        book: book.into(),
    }))
}

/// DELETE /api/books/:isbn - 書籍を削除（要ログイン）
pub async fn delete_book(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    ApiPath(isbn): ApiPath<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    catalog::remove_book(&state.service_deps, &book_isbn(&isbn)?).await?;
    Ok(Json(MessageResponse::ok("Book removed")))
}

// ============================================================================
// Members
// ============================================================================

/// GET /api/members
pub async fn list_members(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MemberResponse>>, ApiError> {
    let members = directory::list_members(&state.service_deps).await?;
    Ok(Json(members.into_iter().map(MemberResponse::from).collect()))
}

/// GET /api/members/:id
pub async fn get_member(
    State(state): State<Arc<AppState>>,
    ApiPath(member_id): ApiPath<String>,
) -> Result<Json<MemberResponse>, ApiError> {
    let member = directory::get_member(&state.service_deps, &member_key(&member_id)?).await?;
    Ok(Json(member.into()))
}

/// POST /api/members - 会員を登録（ログイン不要）
pub async fn register_member(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterMemberRequest>,
) -> Result<(StatusCode, Json<MemberMutationResponse>), ApiError> {
    let cmd = RegisterMember {
        member_id: req.member_id.unwrap_or_default(),
        name: req.name.unwrap_or_default(),
    };
    let member = directory::register_member(&state.service_deps, cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(MemberMutationResponse {
            ok: true,
            msg: "Member added".to_string(),
            member: member.into(),
        }),
    ))
}

/// PUT /api/members/:id - 会員名を変更（要ログイン）
pub async fn update_member(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    ApiPath(member_id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateMemberRequest>,
) -> Result<Json<MemberMutationResponse>, ApiError> {
    let cmd = UpdateMember {
        member_id: member_key(&member_id)?,
        name: req.name,
    };
    let member = directory::update_member(&state.service_deps, cmd).await?;

    Ok(Json(MemberMutationResponse {
        ok: true,
        msg: "Member updated".to_string(),
        member: member.into(),
    }))
}

/// DELETE /api/members/:id - 会員を削除（要ログイン）
pub async fn delete_member(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    ApiPath(member_id): ApiPath<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    directory::remove_member(&state.service_deps, &member_key(&member_id)?).await?;
    Ok(Json(MessageResponse::ok("Member removed")))
}

// ============================================================================
// Lending
// ============================================================================

/// POST /api/issue - 書籍を貸し出す
///
/// 強制されるビジネスルール:
/// - 会員・書籍が存在すること
/// - 貸出可能冊数が残っていること
/// - 同じ会員が同じ書籍を貸出中でないこと
pub async fn issue_book(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LendingRequest>,
) -> Result<Json<LoanMutationResponse>, ApiError> {
    let (member_id, isbn) = lending_pair(req)?;
    let cmd = IssueBook {
        member_id,
        isbn,
        issued_at: Utc::now(),
    };
    let loan = lending::issue_book(&state.service_deps, cmd).await?;

    Ok(Json(LoanMutationResponse {
        ok: true,
        msg: format!("Book issued, due {}", loan.due_date),
        loan: loan_response(loan),
    }))
}

/// POST /api/return - 書籍を返却する
///
/// 延滞中の貸出も返却できる。
pub async fn return_book(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LendingRequest>,
) -> Result<Json<LoanMutationResponse>, ApiError> {
    let (member_id, isbn) = lending_pair(req)?;
    let cmd = ReturnBook {
        member_id,
        isbn,
        returned_at: Utc::now(),
    };
    let loan = lending::return_book(&state.service_deps, cmd).await?;

    Ok(Json(LoanMutationResponse {
        ok: true,
        msg: "Book returned".to_string(),
        loan: loan_response(loan),
    }))
}

/// 貸出一覧のクエリパラメータ
#[derive(Debug, Default, Deserialize)]
pub struct ListLoansQuery {
    /// 会員IDでフィルタリング
    pub member_id: Option<String>,
}

/// GET /api/loans - 貸出一覧（返却済みを含む）
pub async fn list_loans(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ListLoansQuery>,
) -> Result<Json<Vec<LoanResponse>>, ApiError> {
    let loans = match query.member_id.as_deref().map(MemberId::parse) {
        Some(Ok(member_id)) => ledger::list_loans_for_member(&state.service_deps, &member_id).await?,
        Some(Err(_)) => {
            return Err(FieldErrors::single("member_id", "Member ID is required.").into());
        }
        None => ledger::list_loans(&state.service_deps).await?,
    };

    let today = Utc::now().date_naive();
    Ok(Json(
        loans
            .into_iter()
            .map(|loan| LoanResponse::new(loan, today))
            .collect(),
    ))
}

/// GET /api/loans/:id
pub async fn get_loan(
    State(state): State<Arc<AppState>>,
    ApiPath(loan_id): ApiPath<Uuid>,
) -> Result<Json<LoanResponse>, ApiError> {
    let loan = ledger::get_loan(&state.service_deps, LoanId::from_uuid(loan_id)).await?;
    Ok(Json(loan_response(loan)))
}

/// PUT /api/loans/:id - 貸出を修正（要ログイン）
///
/// 返却フラグの変更は貸出・返却と同じ検証を通る。
pub async fn edit_loan(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    ApiPath(loan_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<EditLoanRequest>,
) -> Result<Json<LoanMutationResponse>, ApiError> {
    let due_date = req.due_date.as_deref().map(parse_due_date).transpose()?;
    let cmd = EditLoan {
        loan_id: LoanId::from_uuid(loan_id),
        due_date,
        returned: req.returned,
        edited_at: Utc::now(),
    };
    let loan = lending::edit_loan(&state.service_deps, cmd).await?;

    Ok(Json(LoanMutationResponse {
        ok: true,
        msg: "Loan updated".to_string(),
        loan: loan_response(loan),
    }))
}

// ============================================================================
// Session
// ============================================================================

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn credentials(req: CredentialsRequest) -> (String, String) {
    (
        req.username.unwrap_or_default(),
        req.password.unwrap_or_default(),
    )
}

fn with_session(jar: CookieJar, token: Option<String>) -> (CookieJar, Json<AuthResponse>) {
    match token {
        Some(token) => (
            jar.add(session_cookie(token.clone())),
            Json(AuthResponse {
                ok: true,
                token: Some(token),
            }),
        ),
        None => (
            jar,
            Json(AuthResponse {
                ok: false,
                token: None,
            }),
        ),
    }
}

/// POST /api/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ApiJson(req): ApiJson<CredentialsRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let (username, password) = credentials(req);
    let token = state.auth.login(&username, &password)?;
    if token.is_none() {
        tracing::warn!(%username, "Login failed");
    }
    Ok(with_session(jar, token))
}

/// POST /api/register - ユーザー登録してそのままログイン
pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ApiJson(req): ApiJson<CredentialsRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let (username, password) = credentials(req);
    let token = state.auth.register(&username, &password)?;
    Ok(with_session(jar, token))
}

/// POST /api/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> (CookieJar, Json<AuthResponse>) {
    if let Some(token) = session_token(&headers) {
        state.auth.logout(&token);
    }
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Json(AuthResponse {
            ok: true,
            token: None,
        }),
    )
}

/// GET /api/me
pub async fn me(MaybeUser(user): MaybeUser) -> Json<MeResponse> {
    Json(MeResponse { user })
}

use crate::domain::{Book, Isbn, Loan, LoanId, LoanState, Member, MemberId};
use crate::ports::{
    BookStore, Changeset, LibraryStore as LibraryStoreTrait, LoanStore, MemberStore, Result,
    StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use std::collections::BTreeSet;
use std::time::Duration;

/// 一意制約違反 (unique_violation)
const UNIQUE_VIOLATION: &str = "23505";
/// ロック取得の時間切れ (lock_not_available)
const LOCK_NOT_AVAILABLE: &str = "55P03";
/// 直列化の失敗 (serialization_failure)
const SERIALIZATION_FAILURE: &str = "40001";

const MEMBER_COLUMNS: &str = r#"
    m.member_id,
    m.name,
    m.revision,
    COALESCE(
        (SELECT array_agg(l.isbn ORDER BY l.isbn)
         FROM loans l
         WHERE l.member_id = m.member_id AND NOT l.returned),
        '{}'
    ) AS borrowed_isbns
"#;

const LOAN_COLUMNS: &str =
    "loan_id, member_id, isbn, issue_date, due_date, returned, returned_at";

fn invalid_data(message: String) -> StoreError {
    StoreError::Backend(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    )))
}

/// sqlxのエラーをストアエラーに変換する
///
/// 一意制約違反は`on_unique`で呼び出し側が意味を決める。
fn map_sqlx_error(err: sqlx::Error, on_unique: impl FnOnce(String) -> StoreError) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => return on_unique(db.message().to_string()),
            Some(LOCK_NOT_AVAILABLE) => return StoreError::Timeout,
            Some(SERIALIZATION_FAILURE) => return StoreError::Stale,
            _ => {}
        }
    }
    StoreError::Backend(Box::new(err))
}

fn backend(err: sqlx::Error) -> StoreError {
    map_sqlx_error(err, StoreError::Constraint)
}

fn to_i32(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| invalid_data(format!("{column} out of range: {value}")))
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| invalid_data(format!("revision out of range: {value}")))
}

fn parse_isbn(value: String) -> Result<Isbn> {
    Isbn::parse(&value).map_err(|_| invalid_data("empty isbn in database".to_string()))
}

fn parse_member_id(value: String) -> Result<MemberId> {
    MemberId::parse(&value).map_err(|_| invalid_data("empty member_id in database".to_string()))
}

/// PostgreSQLの行データをBookに変換する
fn map_row_to_book(row: &PgRow) -> Result<Book> {
    let total: i32 = row.get("total_copies");
    let available: i32 = row.get("available_copies");
    let revision: i64 = row.get("revision");

    Ok(Book {
        isbn: parse_isbn(row.get("isbn"))?,
        title: row.get("title"),
        author: row.get("author"),
        total_copies: u32::try_from(total)
            .map_err(|_| invalid_data(format!("total_copies out of range: {total}")))?,
        available_copies: u32::try_from(available)
            .map_err(|_| invalid_data(format!("available_copies out of range: {available}")))?,
        revision: u64::try_from(revision)
            .map_err(|_| invalid_data(format!("revision out of range: {revision}")))?,
    })
}

/// PostgreSQLの行データをMemberに変換する
///
/// 借用中のISBNは貸出台帳から導出した列を使う。
fn map_row_to_member(row: &PgRow) -> Result<Member> {
    let revision: i64 = row.get("revision");
    let borrowed: Vec<String> = row.get("borrowed_isbns");

    Ok(Member {
        member_id: parse_member_id(row.get("member_id"))?,
        name: row.get("name"),
        borrowed_isbns: borrowed
            .into_iter()
            .map(parse_isbn)
            .collect::<Result<BTreeSet<_>>>()?,
        revision: u64::try_from(revision)
            .map_err(|_| invalid_data(format!("revision out of range: {revision}")))?,
    })
}

/// PostgreSQLの行データをLoanに変換する
fn map_row_to_loan(row: &PgRow) -> Result<Loan> {
    let returned: bool = row.get("returned");
    let returned_at: Option<DateTime<Utc>> = row.get("returned_at");
    let state = match (returned, returned_at) {
        (false, _) => LoanState::Active,
        (true, Some(returned_at)) => LoanState::Returned { returned_at },
        (true, None) => return Err(invalid_data("returned loan without returned_at".into())),
    };

    Ok(Loan {
        loan_id: LoanId::from_uuid(row.get("loan_id")),
        member_id: parse_member_id(row.get("member_id"))?,
        isbn: parse_isbn(row.get("isbn"))?,
        issue_date: row.get("issue_date"),
        due_date: row.get("due_date"),
        state,
    })
}

/// LibraryStoreのPostgreSQL実装
///
/// 書籍・会員・貸出を3つのテーブルに保存する。コミットは`lock_timeout`を
/// 設定した1つのトランザクションで実行し、書籍・会員のUPDATEは直前の
/// 版番号で条件付けする。
pub struct LibraryStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl LibraryStore {
    /// PostgreSQLコネクションプールからストアを作成する
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// `./migrations`のマイグレーションを適用する
    pub async fn migrate(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn update_book(tx: &mut Transaction<'_, Postgres>, book: &Book) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET title = $2,
                author = $3,
                total_copies = $4,
                available_copies = $5,
                revision = $6
            WHERE isbn = $1 AND revision = $7
            "#,
        )
        .bind(book.isbn.as_str())
        .bind(&book.title)
        .bind(&book.author)
        .bind(to_i32(book.total_copies, "total_copies")?)
        .bind(to_i32(book.available_copies, "available_copies")?)
        .bind(to_i64(book.revision)?)
        .bind(to_i64(book.revision.saturating_sub(1))?)
        .execute(&mut **tx)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Stale);
        }
        Ok(())
    }

    async fn update_member(tx: &mut Transaction<'_, Postgres>, member: &Member) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE members
            SET name = $2, revision = $3
            WHERE member_id = $1 AND revision = $4
            "#,
        )
        .bind(member.member_id.as_str())
        .bind(&member.name)
        .bind(to_i64(member.revision)?)
        .bind(to_i64(member.revision.saturating_sub(1))?)
        .execute(&mut **tx)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Stale);
        }
        Ok(())
    }

    /// 貸出を追加または更新する（貸出台帳は追記専用のため削除はない）
    async fn upsert_loan(tx: &mut Transaction<'_, Postgres>, loan: &Loan) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO loans (
                loan_id,
                member_id,
                isbn,
                issue_date,
                due_date,
                returned,
                returned_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (loan_id)
            DO UPDATE SET
                due_date = EXCLUDED.due_date,
                returned = EXCLUDED.returned,
                returned_at = EXCLUDED.returned_at
            "#,
        )
        .bind(loan.loan_id.value())
        .bind(loan.member_id.as_str())
        .bind(loan.isbn.as_str())
        .bind(loan.issue_date)
        .bind(loan.due_date)
        .bind(!loan.is_active())
        .bind(loan.returned_at())
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            map_sqlx_error(e, |_| {
                StoreError::Constraint(format!(
                    "member {} already has an active loan for {}",
                    loan.member_id, loan.isbn
                ))
            })
        })?;

        Ok(())
    }
}

#[async_trait]
impl BookStore for LibraryStore {
    async fn get_book(&self, isbn: &Isbn) -> Result<Option<Book>> {
        let row = sqlx::query(
            r#"
            SELECT isbn, title, author, total_copies, available_copies, revision
            FROM books
            WHERE isbn = $1
            "#,
        )
        .bind(isbn.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(map_row_to_book).transpose()
    }

    async fn list_books(&self) -> Result<Vec<Book>> {
        let rows = sqlx::query(
            r#"
            SELECT isbn, title, author, total_copies, available_copies, revision
            FROM books
            ORDER BY isbn
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(map_row_to_book).collect()
    }

    async fn insert_book(&self, book: Book) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO books (isbn, title, author, total_copies, available_copies, revision)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(book.isbn.as_str())
        .bind(&book.title)
        .bind(&book.author)
        .bind(to_i32(book.total_copies, "total_copies")?)
        .bind(to_i32(book.available_copies, "available_copies")?)
        .bind(to_i64(book.revision)?)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, |_| StoreError::Duplicate(format!("book {}", book.isbn))))?;

        Ok(())
    }

    async fn delete_book(&self, book: &Book) -> Result<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM books
            WHERE isbn = $1
              AND revision = $2
              AND NOT EXISTS (
                  SELECT 1 FROM loans WHERE loans.isbn = $1 AND NOT loans.returned
              )
            "#,
        )
        .bind(book.isbn.as_str())
        .bind(to_i64(book.revision)?)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Stale);
        }
        Ok(())
    }
}

#[async_trait]
impl MemberStore for LibraryStore {
    async fn get_member(&self, member_id: &MemberId) -> Result<Option<Member>> {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM members m WHERE m.member_id = $1");
        let row = sqlx::query(&sql)
            .bind(member_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.as_ref().map(map_row_to_member).transpose()
    }

    async fn list_members(&self) -> Result<Vec<Member>> {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM members m ORDER BY m.member_id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.iter().map(map_row_to_member).collect()
    }

    async fn insert_member(&self, member: Member) -> Result<()> {
        sqlx::query("INSERT INTO members (member_id, name, revision) VALUES ($1, $2, $3)")
            .bind(member.member_id.as_str())
            .bind(&member.name)
            .bind(to_i64(member.revision)?)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                map_sqlx_error(e, |_| {
                    StoreError::Duplicate(format!("member {}", member.member_id))
                })
            })?;

        Ok(())
    }

    async fn delete_member(&self, member: &Member) -> Result<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM members
            WHERE member_id = $1
              AND revision = $2
              AND NOT EXISTS (
                  SELECT 1 FROM loans WHERE loans.member_id = $1 AND NOT loans.returned
              )
            "#,
        )
        .bind(member.member_id.as_str())
        .bind(to_i64(member.revision)?)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Stale);
        }
        Ok(())
    }
}

#[async_trait]
impl LoanStore for LibraryStore {
    async fn get_loan(&self, loan_id: LoanId) -> Result<Option<Loan>> {
        let sql = format!("SELECT {LOAN_COLUMNS} FROM loans WHERE loan_id = $1");
        let row = sqlx::query(&sql)
            .bind(loan_id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.as_ref().map(map_row_to_loan).transpose()
    }

    async fn list_loans(&self) -> Result<Vec<Loan>> {
        let sql = format!("SELECT {LOAN_COLUMNS} FROM loans ORDER BY issue_date, seq");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.iter().map(map_row_to_loan).collect()
    }

    async fn list_loans_for_member(&self, member_id: &MemberId) -> Result<Vec<Loan>> {
        let sql = format!(
            "SELECT {LOAN_COLUMNS} FROM loans WHERE member_id = $1 ORDER BY issue_date, seq"
        );
        let rows = sqlx::query(&sql)
            .bind(member_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.iter().map(map_row_to_loan).collect()
    }

    /// (member_id, isbn) の部分一意インデックスを使用する
    async fn find_active_loan(&self, member_id: &MemberId, isbn: &Isbn) -> Result<Option<Loan>> {
        let sql = format!(
            "SELECT {LOAN_COLUMNS} FROM loans WHERE member_id = $1 AND isbn = $2 AND NOT returned"
        );
        let row = sqlx::query(&sql)
            .bind(member_id.as_str())
            .bind(isbn.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.as_ref().map(map_row_to_loan).transpose()
    }

    async fn count_active_loans_for_book(&self, isbn: &Isbn) -> Result<u32> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE isbn = $1 AND NOT returned")
                .bind(isbn.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(backend)?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

#[async_trait]
impl LibraryStoreTrait for LibraryStore {
    /// 変更集合を1つのトランザクションで反映する
    ///
    /// 版番号の不一致や制約違反があれば、`tx`のdrop時にトランザクション
    /// 全体がロールバックされる。
    async fn commit(&self, changeset: Changeset) -> Result<()> {
        if changeset.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(backend)?;

        // SET LOCALはバインドパラメータを受け付けない
        let lock_timeout_ms = self.lock_timeout.as_millis().max(1);
        sqlx::query(&format!("SET LOCAL lock_timeout = '{lock_timeout_ms}ms'"))
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        for book in &changeset.books {
            Self::update_book(&mut tx, book).await?;
        }
        for member in &changeset.members {
            Self::update_member(&mut tx, member).await?;
        }
        // 返却を先に書き込み、部分一意インデックスを空けてから貸出中の行を書き込む
        let (closing, opening): (Vec<&Loan>, Vec<&Loan>) =
            changeset.loans.iter().partition(|loan| !loan.is_active());
        for loan in closing.into_iter().chain(opening) {
            Self::upsert_loan(&mut tx, loan).await?;
        }

        tx.commit().await.map_err(backend)?;
        Ok(())
    }
}

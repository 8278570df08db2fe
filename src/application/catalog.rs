use crate::domain::{self, Book, Isbn, SearchField, commands::*};
use crate::ports::{Changeset, StoreError};

use super::dependencies::ServiceDependencies;
use super::errors::{LibraryError, Result};
use super::locks::LockKey;

/// ISBNで書籍を取得するヘルパー関数
///
/// 存在しない場合は`NotFound`。
pub(super) async fn load_book(deps: &ServiceDependencies, isbn: &Isbn) -> Result<Book> {
    deps.store
        .get_book(isbn)
        .await?
        .ok_or_else(|| LibraryError::not_found("Book not found."))
}

/// 書籍を目録に登録する
///
/// ビジネスルール：
/// - ISBN・タイトル必須、所蔵数は0以上
/// - 同じISBNは登録できない
pub async fn add_book(deps: &ServiceDependencies, cmd: AddBook) -> Result<Book> {
    let book = domain::book::catalog_book(&cmd.isbn, &cmd.title, &cmd.author, cmd.copies)?;

    deps.store
        .insert_book(book.clone())
        .await
        .map_err(|e| match e {
            StoreError::Duplicate(_) => LibraryError::DuplicateKey {
                field: "isbn",
                message: "A book with this ISBN already exists.".to_string(),
            },
            other => other.into(),
        })?;

    tracing::info!(isbn = %book.isbn, copies = book.total_copies, "Book added");
    Ok(book)
}

/// 書籍情報を編集する
///
/// ビジネスルール：
/// - 所蔵数を貸出中の冊数より少なくできない
/// - 所蔵数の増減分だけ貸出可能冊数も増減する
///
/// 同じ書籍への貸出・返却と直列化するため書籍のロックを取得する。
pub async fn update_book(deps: &ServiceDependencies, cmd: UpdateBook) -> Result<Book> {
    let _locks = deps
        .locks
        .acquire([LockKey::Book(cmd.isbn.clone())], deps.policy.lock_timeout)
        .await?;

    let book = load_book(deps, &cmd.isbn).await?;
    if cmd.edit.is_empty() {
        return Ok(book);
    }

    let revised = domain::book::revise_book(&book, &cmd.edit)?;
    deps.store
        .commit(Changeset {
            books: vec![revised.clone()],
            ..Default::default()
        })
        .await?;

    tracing::info!(isbn = %revised.isbn, "Book updated");
    Ok(revised)
}

/// 書籍を目録から削除する
///
/// ビジネスルール：貸出中の貸出がある書籍は削除できない
pub async fn remove_book(deps: &ServiceDependencies, isbn: &Isbn) -> Result<()> {
    let _locks = deps
        .locks
        .acquire([LockKey::Book(isbn.clone())], deps.policy.lock_timeout)
        .await?;

    let book = load_book(deps, isbn).await?;
    let active = super::ledger::count_active_for_book(deps, isbn).await?;
    if active > 0 || book.loaned_out() > 0 {
        return Err(LibraryError::conflict(
            "Book has active loans and cannot be removed.",
        ));
    }

    deps.store.delete_book(&book).await?;

    tracing::info!(%isbn, "Book removed");
    Ok(())
}

/// ISBNで書籍を取得する
pub async fn get_book(deps: &ServiceDependencies, isbn: &Isbn) -> Result<Book> {
    load_book(deps, isbn).await
}

/// 全書籍を取得する
pub async fn list_books(deps: &ServiceDependencies) -> Result<Vec<Book>> {
    Ok(deps.store.list_books().await?)
}

/// 目録を検索する
///
/// タイトル・著者は部分一致（設定により大文字・小文字を区別）、ISBNは完全一致。
/// 空の検索語は全件を返す。
pub async fn search_books(
    deps: &ServiceDependencies,
    query: &str,
    field: SearchField,
) -> Result<Vec<Book>> {
    let books = deps.store.list_books().await?;
    if query.trim().is_empty() {
        return Ok(books);
    }

    let case_sensitive = deps.policy.case_sensitive_search;
    Ok(books
        .into_iter()
        .filter(|book| domain::book::matches(book, field, query, case_sensitive))
        .collect())
}

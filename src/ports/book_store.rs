use crate::domain::{Book, Isbn};
use async_trait::async_trait;

use super::Result;

/// 蔵書目録ストアポート
///
/// 書籍レコードの読み取りと、単一レコードの追加・削除を抽象化する。
/// 既存レコードの更新は`LibraryStore::commit`経由でのみ行う。
#[async_trait]
pub trait BookStore: Send + Sync {
    /// ISBNで書籍を取得する
    async fn get_book(&self, isbn: &Isbn) -> Result<Option<Book>>;

    /// 全書籍をISBN順で取得する
    async fn list_books(&self) -> Result<Vec<Book>>;

    /// 書籍を追加する
    ///
    /// 同じISBNが既にある場合は`StoreError::Duplicate`を返す。
    async fn insert_book(&self, book: Book) -> Result<()>;

    /// 書籍を削除する
    ///
    /// 保存済みの版番号が`book.revision`と異なる場合、または
    /// 貸出中の貸出が残っている場合は`StoreError::Stale`を返す。
    async fn delete_book(&self, book: &Book) -> Result<()>;
}

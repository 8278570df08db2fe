use crate::domain::{Book, Loan, Member};
use async_trait::async_trait;

use super::{BookStore, LoanStore, MemberStore, Result};

/// 1回のコミットで反映する変更の集合
///
/// - `books`, `members`: 更新後のレコード。保存済みの版番号が`revision - 1`であること
/// - `loans`: 追加または更新する貸出レコード
///
/// ストアはすべてを反映するか、何も反映しないかのどちらかでなければならない。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    pub books: Vec<Book>,
    pub members: Vec<Member>,
    pub loans: Vec<Loan>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.books.is_empty() && self.members.is_empty() && self.loans.is_empty()
    }

    /// 同じレコードの変更は後から加えたもので置き換える
    pub fn merge(mut self, other: Changeset) -> Self {
        for book in other.books {
            self.books.retain(|b| b.isbn != book.isbn);
            self.books.push(book);
        }
        for member in other.members {
            self.members.retain(|m| m.member_id != member.member_id);
            self.members.push(member);
        }
        for loan in other.loans {
            self.loans.retain(|l| l.loan_id != loan.loan_id);
            self.loans.push(loan);
        }
        self
    }
}

/// 図書館ストアポート
///
/// 蔵書目録・会員名簿・貸出台帳の3つのストアと、それらをまたぐ
/// アトミックなコミットを提供する。
#[async_trait]
pub trait LibraryStore: BookStore + MemberStore + LoanStore {
    /// 変更の集合をアトミックに反映する
    ///
    /// # エラー
    /// - `StoreError::Stale`: 版番号の不一致（他の書き込みと競合した）
    /// - `StoreError::Constraint`: 同じ会員・書籍の組に貸出中の貸出が2件になる
    /// - `StoreError::Timeout`: ストア側のロック待ちが時間切れになった
    async fn commit(&self, changeset: Changeset) -> Result<()>;
}

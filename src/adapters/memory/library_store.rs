use crate::domain::{Book, Isbn, Loan, LoanId, Member, MemberId};
use crate::ports::{
    BookStore, Changeset, LibraryStore as LibraryStoreTrait, LoanStore, MemberStore, Result,
    StoreError,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// 1つのロックで守られるインメモリのテーブル群
#[derive(Debug, Default)]
struct Tables {
    books: BTreeMap<Isbn, Book>,
    members: BTreeMap<MemberId, Member>,
    loans: HashMap<LoanId, Loan>,
    /// 貸出の登録順
    loan_order: Vec<LoanId>,
    /// (会員, ISBN) → 貸出中の貸出
    active: HashMap<(MemberId, Isbn), LoanId>,
}

impl Tables {
    fn sorted_loans(&self, filter: impl Fn(&Loan) -> bool) -> Vec<Loan> {
        let mut loans: Vec<&Loan> = self
            .loan_order
            .iter()
            .filter_map(|id| self.loans.get(id))
            .filter(|loan| filter(*loan))
            .collect();
        // 安定ソートのため、同じ貸出日の中では登録順が保たれる
        loans.sort_by_key(|loan| loan.issue_date);
        loans.into_iter().cloned().collect()
    }

    /// 変更集合全体を現在のテーブルと照合する（テーブルは変更しない）
    fn check(&self, changeset: &Changeset) -> Result<()> {
        for book in &changeset.books {
            let stored = self.books.get(&book.isbn).ok_or(StoreError::Stale)?;
            if stored.revision + 1 != book.revision {
                return Err(StoreError::Stale);
            }
        }
        for member in &changeset.members {
            let stored = self
                .members
                .get(&member.member_id)
                .ok_or(StoreError::Stale)?;
            if stored.revision + 1 != member.revision {
                return Err(StoreError::Stale);
            }
        }
        for loan in changeset.loans.iter().filter(|l| l.is_active()) {
            let key = (loan.member_id.clone(), loan.isbn.clone());
            match self.active.get(&key) {
                Some(existing) if *existing != loan.loan_id => {
                    // 同じ変更集合で既存の貸出が返却済みになる場合がある
                    let closed_here = changeset
                        .loans
                        .iter()
                        .any(|l| l.loan_id == *existing && !l.is_active());
                    if !closed_here {
                        return Err(StoreError::Constraint(format!(
                            "member {} already has an active loan for {}",
                            loan.member_id, loan.isbn
                        )));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply(&mut self, changeset: Changeset) {
        for book in changeset.books {
            self.books.insert(book.isbn.clone(), book);
        }
        for member in changeset.members {
            self.members.insert(member.member_id.clone(), member);
        }
        for loan in changeset.loans {
            let key = (loan.member_id.clone(), loan.isbn.clone());
            if loan.is_active() {
                self.active.insert(key, loan.loan_id);
            } else if self.active.get(&key) == Some(&loan.loan_id) {
                self.active.remove(&key);
            }
            if !self.loans.contains_key(&loan.loan_id) {
                self.loan_order.push(loan.loan_id);
            }
            self.loans.insert(loan.loan_id, loan);
        }
    }
}

/// LibraryStoreのインメモリ実装
///
/// 3つのテーブルを1つの`RwLock`に収め、コミットの検証と反映を同じ書き込み
/// ロックの中で行う。読み取り側から見えるのはコミット前か後の状態だけで、
/// 途中の状態は見えない。
#[derive(Debug, Default)]
pub struct LibraryStore {
    tables: RwLock<Tables>,
}

impl LibraryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BookStore for LibraryStore {
    async fn get_book(&self, isbn: &Isbn) -> Result<Option<Book>> {
        Ok(self.read().books.get(isbn).cloned())
    }

    async fn list_books(&self) -> Result<Vec<Book>> {
        Ok(self.read().books.values().cloned().collect())
    }

    async fn insert_book(&self, book: Book) -> Result<()> {
        let mut tables = self.write();
        if tables.books.contains_key(&book.isbn) {
            return Err(StoreError::Duplicate(format!("book {}", book.isbn)));
        }
        tables.books.insert(book.isbn.clone(), book);
        Ok(())
    }

    async fn delete_book(&self, book: &Book) -> Result<()> {
        let mut tables = self.write();
        let has_active = tables.active.keys().any(|(_, isbn)| *isbn == book.isbn);
        let stored_revision = tables.books.get(&book.isbn).map(|b| b.revision);
        if has_active || stored_revision != Some(book.revision) {
            return Err(StoreError::Stale);
        }
        tables.books.remove(&book.isbn);
        Ok(())
    }
}

#[async_trait]
impl MemberStore for LibraryStore {
    async fn get_member(&self, member_id: &MemberId) -> Result<Option<Member>> {
        Ok(self.read().members.get(member_id).cloned())
    }

    async fn list_members(&self) -> Result<Vec<Member>> {
        Ok(self.read().members.values().cloned().collect())
    }

    async fn insert_member(&self, member: Member) -> Result<()> {
        let mut tables = self.write();
        if tables.members.contains_key(&member.member_id) {
            return Err(StoreError::Duplicate(format!("member {}", member.member_id)));
        }
        tables.members.insert(member.member_id.clone(), member);
        Ok(())
    }

    async fn delete_member(&self, member: &Member) -> Result<()> {
        let mut tables = self.write();
        let stored_revision = tables.members.get(&member.member_id).map(|m| m.revision);
        if stored_revision != Some(member.revision) {
            return Err(StoreError::Stale);
        }
        tables.members.remove(&member.member_id);
        Ok(())
    }
}

#[async_trait]
impl LoanStore for LibraryStore {
    async fn get_loan(&self, loan_id: LoanId) -> Result<Option<Loan>> {
        Ok(self.read().loans.get(&loan_id).cloned())
    }

    async fn list_loans(&self) -> Result<Vec<Loan>> {
        Ok(self.read().sorted_loans(|_| true))
    }

    async fn list_loans_for_member(&self, member_id: &MemberId) -> Result<Vec<Loan>> {
        Ok(self.read().sorted_loans(|loan| loan.member_id == *member_id))
    }

    async fn find_active_loan(&self, member_id: &MemberId, isbn: &Isbn) -> Result<Option<Loan>> {
        let tables = self.read();
        let key = (member_id.clone(), isbn.clone());
        Ok(tables
            .active
            .get(&key)
            .and_then(|id| tables.loans.get(id))
            .cloned())
    }

    async fn count_active_loans_for_book(&self, isbn: &Isbn) -> Result<u32> {
        let count = self
            .read()
            .active
            .keys()
            .filter(|(_, active_isbn)| active_isbn == isbn)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

#[async_trait]
impl LibraryStoreTrait for LibraryStore {
    async fn commit(&self, changeset: Changeset) -> Result<()> {
        let mut tables = self.write();
        tables.check(&changeset)?;
        tables.apply(changeset);
        Ok(())
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{BorrowError, FieldViolation, GiveBackError, Isbn, MemberId, ValidationError};

/// 会員レコード
///
/// `borrowed_isbns` は貸出中の貸出があるISBNの集合と常に一致する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub member_id: MemberId,
    pub name: String,
    pub borrowed_isbns: BTreeSet<Isbn>,
    /// コミットごとに増える版番号（楽観的排他制御用）
    pub revision: u64,
}

impl Member {
    pub fn has_borrowed(&self, isbn: &Isbn) -> bool {
        self.borrowed_isbns.contains(isbn)
    }
}

/// 純粋関数：会員を登録する
pub fn register_member(member_id: &str, name: &str) -> Result<Member, ValidationError> {
    let mut violations = Vec::new();

    let member_id = MemberId::parse(member_id)
        .map_err(|_| violations.push(FieldViolation::new("member_id", "Member ID is required.")))
        .ok();

    let name = name.trim();
    if name.is_empty() {
        violations.push(FieldViolation::new("name", "Name is required."));
    }

    match member_id {
        Some(member_id) if violations.is_empty() => Ok(Member {
            member_id,
            name: name.to_string(),
            borrowed_isbns: BTreeSet::new(),
            revision: 0,
        }),
        _ => Err(ValidationError(violations)),
    }
}

/// 純粋関数：会員名を変更する
pub fn rename_member(member: &Member, name: &str) -> Result<Member, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::single("name", "Name is required."));
    }
    Ok(Member {
        name: name.to_string(),
        revision: member.revision + 1,
        ..member.clone()
    })
}

/// 純粋関数：借用記録にISBNを追加する
///
/// ビジネスルール：
/// - 同じ書籍を同時に2冊借りることはできない
/// - 上限が設定されている場合、借用中の冊数は上限未満であること
pub fn borrow(member: &Member, isbn: &Isbn, limit: Option<usize>) -> Result<Member, BorrowError> {
    if member.has_borrowed(isbn) {
        return Err(BorrowError::AlreadyBorrowed);
    }
    if let Some(limit) = limit {
        if member.borrowed_isbns.len() >= limit {
            return Err(BorrowError::LimitReached { limit });
        }
    }

    let mut borrowed_isbns = member.borrowed_isbns.clone();
    borrowed_isbns.insert(isbn.clone());
    Ok(Member {
        borrowed_isbns,
        revision: member.revision + 1,
        ..member.clone()
    })
}

/// 純粋関数：借用記録からISBNを外す
pub fn give_back(member: &Member, isbn: &Isbn) -> Result<Member, GiveBackError> {
    if !member.has_borrowed(isbn) {
        return Err(GiveBackError::NotBorrowed);
    }

    let mut borrowed_isbns = member.borrowed_isbns.clone();
    borrowed_isbns.remove(isbn);
    Ok(Member {
        borrowed_isbns,
        revision: member.revision + 1,
        ..member.clone()
    })
}

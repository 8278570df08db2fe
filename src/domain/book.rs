use serde::{Deserialize, Serialize};

use super::{CheckInError, CheckOutError, FieldViolation, Isbn, ValidationError};

/// 書籍レコード
///
/// 不変条件: `available_copies <= total_copies`
/// （`total_copies - available_copies` が貸出中の冊数）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub isbn: Isbn,
    pub title: String,
    pub author: String,
    pub total_copies: u32,
    pub available_copies: u32,
    /// コミットごとに増える版番号（楽観的排他制御用）
    pub revision: u64,
}

impl Book {
    /// 貸出中の冊数
    pub fn loaned_out(&self) -> u32 {
        self.total_copies - self.available_copies
    }

    pub fn is_available(&self) -> bool {
        self.available_copies > 0
    }
}

/// 書籍編集の入力（指定された項目のみ変更する）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookEdit {
    pub title: Option<String>,
    pub author: Option<String>,
    pub copies: Option<i64>,
}

impl BookEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.author.is_none() && self.copies.is_none()
    }
}

fn parse_copies(copies: i64) -> Result<u32, FieldViolation> {
    if copies < 0 {
        return Err(FieldViolation::new("copies", "Copies must be >= 0."));
    }
    u32::try_from(copies).map_err(|_| FieldViolation::new("copies", "Copies is too large."))
}

/// 純粋関数：書籍を目録に登録する
///
/// ビジネスルール：
/// - ISBN・タイトルは必須
/// - 所蔵数は0以上
/// - 登録時は全冊が貸出可能
pub fn catalog_book(
    isbn: &str,
    title: &str,
    author: &str,
    copies: i64,
) -> Result<Book, ValidationError> {
    let mut violations = Vec::new();

    let isbn = Isbn::parse(isbn)
        .map_err(|_| violations.push(FieldViolation::new("isbn", "ISBN is required.")))
        .ok();

    let title = title.trim();
    if title.is_empty() {
        violations.push(FieldViolation::new("title", "Title is required."));
    }

    let copies = parse_copies(copies).map_err(|v| violations.push(v)).ok();

    match (isbn, copies) {
        (Some(isbn), Some(copies)) if violations.is_empty() => Ok(Book {
            isbn,
            title: title.to_string(),
            author: author.trim().to_string(),
            total_copies: copies,
            available_copies: copies,
            revision: 0,
        }),
        _ => Err(ValidationError(violations)),
    }
}

/// 純粋関数：書籍情報を編集する
///
/// ビジネスルール：
/// - タイトルを指定する場合は空にできない
/// - 所蔵数は貸出中の冊数を下回れない
/// - 所蔵数の増減分だけ貸出可能冊数も増減する
pub fn revise_book(book: &Book, edit: &BookEdit) -> Result<Book, ValidationError> {
    let mut violations = Vec::new();
    let mut revised = book.clone();

    if let Some(title) = &edit.title {
        let title = title.trim();
        if title.is_empty() {
            violations.push(FieldViolation::new("title", "Title is required."));
        } else {
            revised.title = title.to_string();
        }
    }

    if let Some(author) = &edit.author {
        revised.author = author.trim().to_string();
    }

    if let Some(copies) = edit.copies {
        match parse_copies(copies) {
            Ok(total) if total < book.loaned_out() => violations.push(FieldViolation::new(
                "copies",
                format!(
                    "Copies cannot be lower than the {} currently on loan.",
                    book.loaned_out()
                ),
            )),
            Ok(total) => {
                revised.available_copies = total - book.loaned_out();
                revised.total_copies = total;
            }
            Err(v) => violations.push(v),
        }
    }

    if !violations.is_empty() {
        return Err(ValidationError(violations));
    }

    revised.revision = book.revision + 1;
    Ok(revised)
}

/// 純粋関数：1冊貸し出す（貸出可能冊数を1減らす）
pub fn check_out(book: &Book) -> Result<Book, CheckOutError> {
    if !book.is_available() {
        return Err(CheckOutError::NoCopiesAvailable);
    }
    Ok(Book {
        available_copies: book.available_copies - 1,
        revision: book.revision + 1,
        ..book.clone()
    })
}

/// 純粋関数：1冊戻す（貸出可能冊数を1増やす）
pub fn check_in(book: &Book) -> Result<Book, CheckInError> {
    if book.available_copies >= book.total_copies {
        return Err(CheckInError::NothingCheckedOut);
    }
    Ok(Book {
        available_copies: book.available_copies + 1,
        revision: book.revision + 1,
        ..book.clone()
    })
}

/// 目録検索の対象項目
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchField {
    #[default]
    Title,
    Author,
    Isbn,
}

/// 純粋関数：検索条件に一致するか
///
/// タイトル・著者は部分一致、ISBNは完全一致。
pub fn matches(book: &Book, field: SearchField, query: &str, case_sensitive: bool) -> bool {
    let query = query.trim();
    let haystack = match field {
        SearchField::Isbn => return book.isbn.as_str() == query,
        SearchField::Title => &book.title,
        SearchField::Author => &book.author,
    };
    if case_sensitive {
        haystack.contains(query)
    } else {
        haystack.to_lowercase().contains(&query.to_lowercase())
    }
}

/// 入力項目ごとの違反
///
/// `field`はクライアントのフォーム項目名（`isbn`, `title`, `copies`, `member_id`, `name`, `due_date`）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// 書籍・会員の登録や編集時の入力エラー
///
/// 違反はまとめて返す（フォームの全項目に同時にエラー表示するため）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub Vec<FieldViolation>);

impl ValidationError {
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        Self(vec![FieldViolation::new(field, message)])
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.0
    }
}

/// 貸出可能冊数を減らせない
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutError {
    /// 在庫が0冊
    NoCopiesAvailable,
}

/// 貸出可能冊数を戻せない
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInError {
    /// 貸出可能冊数が既に所蔵数と同じ（貸し出していない冊を戻そうとした）
    NothingCheckedOut,
}

/// 会員の借用記録に追加できない
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BorrowError {
    /// 同じ書籍を既に借りている
    AlreadyBorrowed,
    /// 貸出上限に達している
    LimitReached { limit: usize },
}

/// 会員の借用記録から外せない
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GiveBackError {
    /// その書籍を借りていない
    NotBorrowed,
}

/// 返却のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnBookError {
    /// 既に返却済み
    AlreadyReturned,
}

/// 返却取り消しのエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReopenLoanError {
    /// 貸出中の貸出は取り消せない
    NotReturned,
}

/// 返却期限変更のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescheduleError {
    /// 貸出日より前の返却期限
    BeforeIssueDate,
}

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 識別子が空だった
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyIdentifier;

/// 貸出ID - 貸出台帳のレコードID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanId(Uuid);

impl LoanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for LoanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// ISBN - 蔵書目録のキー
///
/// 前後の空白を除いた空でない文字列。形式（ISBN-10/13）の検証は行わない。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Isbn(String);

impl Isbn {
    pub fn parse(raw: &str) -> Result<Self, EmptyIdentifier> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EmptyIdentifier);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 会員ID - 会員名簿のキー
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    pub fn parse(raw: &str) -> Result<Self, EmptyIdentifier> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EmptyIdentifier);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loan_id_creation() {
        let id1 = LoanId::new();
        let id2 = LoanId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_loan_id_from_uuid() {
        let uuid = Uuid::new_v4();
        let id = LoanId::from_uuid(uuid);
        assert_eq!(id.value(), uuid);
    }

    #[test]
    fn test_isbn_parse_trims_whitespace() {
        let isbn = Isbn::parse("  978-4-00-310101-8 ").unwrap();
        assert_eq!(isbn.as_str(), "978-4-00-310101-8");
    }

    #[test]
    fn test_isbn_parse_rejects_empty() {
        assert_eq!(Isbn::parse(""), Err(EmptyIdentifier));
        assert_eq!(Isbn::parse("   "), Err(EmptyIdentifier));
    }

    #[test]
    fn test_member_id_parse() {
        assert_eq!(MemberId::parse("m1").unwrap().as_str(), "m1");
        assert_eq!(MemberId::parse("\t"), Err(EmptyIdentifier));
    }

    #[test]
    fn test_identifiers_serialize_as_plain_strings() {
        let isbn = Isbn::parse("111").unwrap();
        assert_eq!(serde_json::to_string(&isbn).unwrap(), "\"111\"");

        let member_id = MemberId::parse("m1").unwrap();
        assert_eq!(serde_json::to_string(&member_id).unwrap(), "\"m1\"");
    }
}

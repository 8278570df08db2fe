use crate::domain::{Member, MemberId};
use async_trait::async_trait;

use super::Result;

/// 会員名簿ストアポート
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// 会員IDで会員を取得する
    async fn get_member(&self, member_id: &MemberId) -> Result<Option<Member>>;

    /// 全会員を会員ID順で取得する
    async fn list_members(&self) -> Result<Vec<Member>>;

    /// 会員を追加する
    ///
    /// 同じ会員IDが既にある場合は`StoreError::Duplicate`を返す。
    async fn insert_member(&self, member: Member) -> Result<()>;

    /// 会員を削除する
    ///
    /// 保存済みの版番号が`member.revision`と異なる場合は`StoreError::Stale`を返す。
    async fn delete_member(&self, member: &Member) -> Result<()>;
}

use crate::domain::{self, Member, MemberId, commands::*};
use crate::ports::{Changeset, StoreError};

use super::dependencies::ServiceDependencies;
use super::errors::{LibraryError, Result};
use super::locks::LockKey;

/// 会員IDで会員を取得するヘルパー関数
pub(super) async fn load_member(deps: &ServiceDependencies, member_id: &MemberId) -> Result<Member> {
    deps.store
        .get_member(member_id)
        .await?
        .ok_or_else(|| LibraryError::not_found("Member not found."))
}

/// 会員を登録する
pub async fn register_member(deps: &ServiceDependencies, cmd: RegisterMember) -> Result<Member> {
    let member = domain::member::register_member(&cmd.member_id, &cmd.name)?;

    deps.store
        .insert_member(member.clone())
        .await
        .map_err(|e| match e {
            StoreError::Duplicate(_) => LibraryError::DuplicateKey {
                field: "member_id",
                message: "A member with this ID already exists.".to_string(),
            },
            other => other.into(),
        })?;

    tracing::info!(member_id = %member.member_id, "Member registered");
    Ok(member)
}

/// 会員情報を編集する
pub async fn update_member(deps: &ServiceDependencies, cmd: UpdateMember) -> Result<Member> {
    let _locks = deps
        .locks
        .acquire(
            [LockKey::Member(cmd.member_id.clone())],
            deps.policy.lock_timeout,
        )
        .await?;

    let member = load_member(deps, &cmd.member_id).await?;
    let name = cmd
        .name
        .ok_or_else(|| LibraryError::invalid("name", "Nothing to update."))?;

    let renamed = domain::member::rename_member(&member, &name)?;
    deps.store
        .commit(Changeset {
            members: vec![renamed.clone()],
            ..Default::default()
        })
        .await?;

    Ok(renamed)
}

/// 会員を削除する
///
/// ビジネスルール：借用中の書籍がある会員は削除できない
pub async fn remove_member(deps: &ServiceDependencies, member_id: &MemberId) -> Result<()> {
    let _locks = deps
        .locks
        .acquire([LockKey::Member(member_id.clone())], deps.policy.lock_timeout)
        .await?;

    let member = load_member(deps, member_id).await?;
    if !member.borrowed_isbns.is_empty() {
        return Err(LibraryError::conflict(
            "Member has borrowed books and cannot be removed.",
        ));
    }

    deps.store.delete_member(&member).await?;

    tracing::info!(%member_id, "Member removed");
    Ok(())
}

/// 会員IDで会員を取得する
pub async fn get_member(deps: &ServiceDependencies, member_id: &MemberId) -> Result<Member> {
    load_member(deps, member_id).await
}

/// 全会員を取得する
pub async fn list_members(deps: &ServiceDependencies) -> Result<Vec<Member>> {
    Ok(deps.store.list_members().await?)
}

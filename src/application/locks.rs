use crate::domain::{Isbn, MemberId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// ロック対象のエンティティキー
///
/// 派生した`Ord`が全体の取得順序になる：書籍キーが会員キーより先、
/// 同じ種類の中ではキーの辞書順。全リクエストがこの順序で取得するため
/// デッドロックは起きない。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    Book(Isbn),
    Member(MemberId),
}

/// ロック取得の時間切れ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTimeout {
    pub key: LockKey,
}

/// エンティティキーごとの非同期ロック表
///
/// 使われなくなったエントリは解放時に表から取り除く。
#[derive(Debug, Default)]
pub struct KeyLocks {
    table: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

/// 取得済みロックの集合。dropで全て解放する
#[derive(Debug)]
pub struct HeldLocks {
    owner: Arc<KeyLocks>,
    keys: Vec<LockKey>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl HeldLocks {
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &LockKey) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(table.entry(key.clone()).or_default())
    }

    /// 表に残っているエントリ数
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 複数キーのロックを全体の取得順序で取得する
    ///
    /// `timeout`は全キー合計の待ち時間の上限。時間切れの場合は
    /// それまでに取得したロックを全て解放して`LockTimeout`を返す。
    pub async fn acquire(
        self: &Arc<Self>,
        keys: impl IntoIterator<Item = LockKey>,
        timeout: Duration,
    ) -> Result<HeldLocks, LockTimeout> {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let deadline = tokio::time::Instant::now() + timeout;
        let mut held = HeldLocks {
            owner: Arc::clone(self),
            keys: Vec::with_capacity(keys.len()),
            guards: Vec::with_capacity(keys.len()),
        };

        for key in keys {
            let mutex = self.entry(&key);
            held.keys.push(key.clone());
            match tokio::time::timeout_at(deadline, mutex.lock_owned()).await {
                Ok(guard) => held.guards.push(guard),
                Err(_) => {
                    tracing::warn!(?key, "Timed out waiting for entity lock");
                    return Err(LockTimeout { key });
                }
            }
        }

        Ok(held)
    }
}

impl Drop for HeldLocks {
    fn drop(&mut self) {
        self.guards.clear();

        let mut table = self
            .owner
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for key in self.keys.drain(..) {
            // 表自身だけが参照しているエントリは待機者がいない
            if table.get(&key).is_some_and(|m| Arc::strong_count(m) == 1) {
                table.remove(&key);
            }
        }
    }
}

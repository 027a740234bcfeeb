//! 会话存储抽象层
//!
//! 会话键 -> 有序 Turn 序列。只追加、保持插入顺序；未知键视为空历史。
//! 内存实现为每个键持有独立的互斥锁，同一键的读写串行，不同键互不阻塞。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::core::StoreError;
use crate::memory::Turn;

#[cfg(feature = "async-sqlite")]
use super::sqlite::SqliteSessionStore;

/// 会话存储接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 获取会话完整历史；未知键返回空
    async fn get_history(&self, key: &str) -> Result<Vec<Turn>, StoreError>;

    /// 按顺序追加一批 Turn（整批原子写入）
    async fn append(&self, key: &str, turns: Vec<Turn>) -> Result<(), StoreError>;

    /// 会话中的 Turn 数
    async fn len(&self, key: &str) -> Result<usize, StoreError>;

    /// 外部清除会话；返回是否存在
    async fn purge(&self, key: &str) -> Result<bool, StoreError>;

    /// 已知会话数
    async fn session_count(&self) -> Result<usize, StoreError>;
}

type SessionSlot = Arc<Mutex<Vec<Turn>>>;

/// 内存会话存储
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionSlot>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, key: &str) -> Option<SessionSlot> {
        self.sessions.read().await.get(key).cloned()
    }

    async fn slot_or_create(&self, key: &str) -> SessionSlot {
        if let Some(slot) = self.slot(key).await {
            return slot;
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(key.to_string())
            .or_insert_with(|| {
                tracing::debug!(session = %key, "New session");
                Arc::new(Mutex::new(Vec::new()))
            })
            .clone()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_history(&self, key: &str) -> Result<Vec<Turn>, StoreError> {
        match self.slot(key).await {
            Some(slot) => Ok(slot.lock().await.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn append(&self, key: &str, turns: Vec<Turn>) -> Result<(), StoreError> {
        if turns.is_empty() {
            return Ok(());
        }
        let slot = self.slot_or_create(key).await;
        slot.lock().await.extend(turns);
        Ok(())
    }

    async fn len(&self, key: &str) -> Result<usize, StoreError> {
        match self.slot(key).await {
            Some(slot) => Ok(slot.lock().await.len()),
            None => Ok(0),
        }
    }

    async fn purge(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(key).is_some())
    }

    async fn session_count(&self) -> Result<usize, StoreError> {
        Ok(self.sessions.read().await.len())
    }
}

/// 创建会话存储
///
/// 如果提供了 db_path 且启用了 async-sqlite feature，则使用持久化存储；否则使用内存存储
pub async fn create_session_store(db_path: Option<&std::path::Path>) -> Arc<dyn SessionStore> {
    #[cfg(feature = "async-sqlite")]
    if let Some(path) = db_path {
        match SqliteSessionStore::new(path).await {
            Ok(store) => {
                tracing::info!("Using persistent session store: {:?}", path);
                return Arc::new(store);
            }
            Err(e) => {
                tracing::warn!("Failed to create persistent store, falling back to memory: {}", e);
            }
        }
    }

    #[cfg(not(feature = "async-sqlite"))]
    if db_path.is_some() {
        tracing::warn!(
            "Persistent session store requested but async-sqlite feature not enabled, using memory store"
        );
    }

    tracing::info!("Using in-memory session store");
    Arc::new(MemorySessionStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_key_is_empty() {
        let store = MemorySessionStore::new();
        assert!(store.get_history("never-seen").await.unwrap().is_empty());
        assert_eq!(store.len("never-seen").await.unwrap(), 0);
        assert_eq!(store.session_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = MemorySessionStore::new();
        let t1 = Turn::user("t1");
        let t2 = Turn::dispatcher("t2");
        store.append("k", vec![t1.clone(), t2.clone()]).await.unwrap();
        assert_eq!(store.get_history("k").await.unwrap(), vec![t1.clone(), t2.clone()]);

        let t3 = Turn::user("t3");
        store.append("k", vec![t3.clone()]).await.unwrap();
        let history = store.get_history("k").await.unwrap();
        assert_eq!(history, vec![t1, t2, t3]);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = MemorySessionStore::new();
        store.append("k1", vec![Turn::user("only in k1")]).await.unwrap();
        store.append("k2", vec![Turn::user("only in k2")]).await.unwrap();

        let h2 = store.get_history("k2").await.unwrap();
        assert_eq!(h2.len(), 1);
        assert!(h2.iter().all(|t| t.content != "only in k1"));
        assert_eq!(store.session_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_append_does_not_create_session() {
        let store = MemorySessionStore::new();
        store.append("k", Vec::new()).await.unwrap();
        assert_eq!(store.session_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge() {
        let store = MemorySessionStore::new();
        store.append("k", vec![Turn::user("x")]).await.unwrap();
        assert!(store.purge("k").await.unwrap());
        assert!(!store.purge("k").await.unwrap());
        assert!(store.get_history("k").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_batches_do_not_interleave() {
        let store = Arc::new(MemorySessionStore::new());
        let mut handles = Vec::new();
        for w in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let batch: Vec<Turn> = (0..5).map(|i| Turn::user(format!("w{w}-{i}"))).collect();
                store.append("shared", batch).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let history = store.get_history("shared").await.unwrap();
        assert_eq!(history.len(), 40);
        for chunk in history.chunks(5) {
            let writer = chunk[0].content.split('-').next().unwrap().to_string();
            for (i, turn) in chunk.iter().enumerate() {
                assert_eq!(turn.content, format!("{writer}-{i}"));
            }
        }
    }

    #[tokio::test]
    async fn test_create_session_store_defaults_to_memory() {
        let store = create_session_store(None).await;
        store.append("k", vec![Turn::user("x")]).await.unwrap();
        assert_eq!(store.len("k").await.unwrap(), 1);
    }
}

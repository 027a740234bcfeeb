//! 会话监管：按会话 key 串行化调度周期
//!
//! 同一会话的两个请求排队执行，不同会话互不阻塞。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// 每个会话一把锁；持有 guard 期间该会话的其他调度周期等待
#[derive(Debug, Default, Clone)]
pub struct SessionSupervisor {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取会话租约（guard 释放即归还）
    pub async fn lease(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// 归还租约后调用：没有其他周期持有或等待时移除该会话的锁，map 不随会话数无限增长
    pub async fn release(&self, key: &str) {
        let mut locks = self.locks.lock().await;
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    pub(crate) async fn tracked_sessions(&self) -> usize {
        self.locks.lock().await.len()
    }
}

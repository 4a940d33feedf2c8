use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use application::{SessionAttributes, SessionError, SessionStore};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct Entry {
    attributes: SessionAttributes,
    expires_at: Instant,
}

/// 带过期时间的内存会话存储
#[derive(Default)]
pub struct InMemorySessionStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 启动定时清理任务，取消令牌触发后退出
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match store.sweep_expired().await {
                            Ok(0) => {}
                            Ok(removed) => tracing::debug!(removed, "已清理过期会话"),
                            Err(err) => tracing::warn!(error = %err, "会话清理失败"),
                        }
                    }
                }
            }
            tracing::info!("会话清理任务已退出");
        })
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<SessionAttributes>, SessionError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.attributes.clone()))
    }

    async fn put(
        &self,
        key: &str,
        attributes: SessionAttributes,
        ttl: Duration,
    ) -> Result<(), SessionError> {
        let entry = Entry {
            attributes,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.to_owned(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<Option<SessionAttributes>, SessionError> {
        Ok(self
            .entries
            .write()
            .await
            .remove(key)
            .map(|entry| entry.attributes))
    }

    async fn sweep_expired(&self) -> Result<usize, SessionError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use domain::UserId;

    use super::*;

    fn attributes() -> SessionAttributes {
        SessionAttributes {
            user_id: UserId::generate(),
            username: "ivy".to_owned(),
            token: "token".to_owned(),
            bound_at: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = InMemorySessionStore::new();
        let attrs = attributes();
        store.put("conn-1", attrs.clone(), Duration::from_secs(30)).await.unwrap();
        assert_eq!(store.get("conn-1").await.unwrap(), Some(attrs));

        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(store.get("conn-1").await.unwrap(), None);
        assert_eq!(store.sweep_expired().await.unwrap(), 1);
        assert_eq!(store.sweep_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn remove_returns_previous_attributes() {
        let store = InMemorySessionStore::new();
        let attrs = attributes();
        store.put("conn-2", attrs.clone(), Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.remove("conn-2").await.unwrap(), Some(attrs));
        assert_eq!(store.remove("conn-2").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_stops_on_cancel() {
        let store = Arc::new(InMemorySessionStore::new());
        store.put("conn-3", attributes(), Duration::from_secs(1)).await.unwrap();
        let shutdown = CancellationToken::new();
        let handle = store.spawn_sweeper(Duration::from_secs(5), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(store.entries.read().await.is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }
}

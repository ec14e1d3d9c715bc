use std::time::Duration;

use async_trait::async_trait;
use bazaar_core::types::ConnectionId;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::directory::{PresenceDirectory, PresenceError, Transition};

/// Presence directory shared by every server instance through Redis.
///
/// Each user maps to a sorted set at `{prefix}presence:{user_id}` whose
/// members are connection ids scored by the last time their process vouched
/// for them (unix millis). The owning process refreshes its handles on every
/// heartbeat; a handle older than `ttl` belongs to a process that died and is
/// pruned before any count or read, so it can neither hide a `user joined`
/// nor keep a user online. The key itself expires `ttl` after the last write.
///
/// Mutations run as one `MULTI`/`EXEC` of prune, change and cardinality read,
/// so the transition each caller sees is exact.
#[derive(Clone)]
pub struct RedisPresenceDirectory {
    conn: ConnectionManager,
    prefix: String,
    ttl: Duration,
}

impl RedisPresenceDirectory {
    pub async fn connect(
        url: &str,
        prefix: impl Into<String>,
        ttl: Duration,
    ) -> Result<Self, PresenceError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, prefix, ttl))
    }

    pub fn new(conn: ConnectionManager, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
            ttl,
        }
    }

    fn key(&self, user_id: &str) -> String {
        presence_key(&self.prefix, user_id)
    }

    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }
}

fn presence_key(prefix: &str, user_id: &str) -> String {
    format!("{prefix}presence:{user_id}")
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Handles last refreshed at or before this score are stale.
fn stale_before(now_ms: i64, ttl_ms: i64) -> i64 {
    now_ms.saturating_sub(ttl_ms)
}

#[async_trait]
impl PresenceDirectory for RedisPresenceDirectory {
    async fn register(
        &self,
        user_id: &str,
        conn_id: ConnectionId,
    ) -> Result<Transition, PresenceError> {
        let key = self.key(user_id);
        let now = now_ms();
        let mut conn = self.conn.clone();
        let (pruned, added, handles): (usize, usize, usize) = redis::pipe()
            .atomic()
            .zrembyscore(&key, "-inf", stale_before(now, self.ttl_ms()))
            .zadd(&key, conn_id.to_string(), now)
            .zcard(&key)
            .pexpire(&key, self.ttl_ms())
            .ignore()
            .query_async(&mut conn)
            .await?;

        if pruned > 0 {
            tracing::info!(user_id, pruned, "Pruned stale presence handles");
        }
        tracing::debug!(user_id, %conn_id, handles, "Handle registered");
        Ok(Transition {
            handles,
            changed: added == 1 && handles == 1,
        })
    }

    async fn unregister(
        &self,
        user_id: &str,
        conn_id: ConnectionId,
    ) -> Result<Transition, PresenceError> {
        let key = self.key(user_id);
        let mut conn = self.conn.clone();
        let (pruned, removed, handles): (usize, usize, usize) = redis::pipe()
            .atomic()
            .zrembyscore(&key, "-inf", stale_before(now_ms(), self.ttl_ms()))
            .zrem(&key, conn_id.to_string())
            .zcard(&key)
            .query_async(&mut conn)
            .await?;

        if pruned > 0 {
            tracing::info!(user_id, pruned, "Pruned stale presence handles");
        }
        tracing::debug!(user_id, %conn_id, handles, "Handle unregistered");
        Ok(Transition {
            handles,
            // Pruning a dead process's last handle empties the user as well.
            changed: handles == 0 && (removed == 1 || pruned > 0),
        })
    }

    async fn lookup(&self, user_id: &str) -> Result<Vec<ConnectionId>, PresenceError> {
        let mut conn = self.conn.clone();
        let cutoff = stale_before(now_ms(), self.ttl_ms());
        let members: Vec<String> = conn
            .zrangebyscore(self.key(user_id), format!("({cutoff}"), "+inf")
            .await?;

        Ok(members
            .iter()
            .filter_map(|raw| match raw.parse() {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!(user_id, handle = %raw, error = %e, "Skipping malformed presence handle");
                    None
                }
            })
            .collect())
    }

    async fn refresh(&self, user_id: &str, conn_ids: &[ConnectionId]) -> Result<(), PresenceError> {
        if conn_ids.is_empty() {
            return Ok(());
        }
        let key = self.key(user_id);
        let now = now_ms();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for conn_id in conn_ids {
            // XX: only bump handles that are still registered.
            pipe.cmd("ZADD")
                .arg(&key)
                .arg("XX")
                .arg(now)
                .arg(conn_id.to_string())
                .ignore();
        }
        pipe.pexpire(&key, self.ttl_ms()).ignore();

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn keys_are_prefixed_per_user() {
        assert_eq!(presence_key("bazaar:", "alice"), "bazaar:presence:alice");
        assert_ne!(presence_key("bazaar:", "alice"), presence_key("bazaar:", "bob"));
    }

    #[test]
    fn stale_cutoff_trails_now_by_ttl() {
        assert_eq!(stale_before(10_000, 3_000), 7_000);
        assert_eq!(stale_before(i64::MIN + 1, 3_000), i64::MIN);
    }

    // -----------------------------------------------------------------------
    // Against a live Redis. Run with: cargo test -p bazaar-presence -- --ignored
    // -----------------------------------------------------------------------

    fn redis_url() -> String {
        env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    /// Two directories on one Redis, as two server processes would hold.
    async fn two_processes(ttl: Duration) -> (RedisPresenceDirectory, RedisPresenceDirectory) {
        let prefix = format!("bazaar-test:{}:", ConnectionId::new());
        let a = RedisPresenceDirectory::connect(&redis_url(), prefix.clone(), ttl)
            .await
            .expect("Redis must be reachable");
        let b = RedisPresenceDirectory::connect(&redis_url(), prefix, ttl)
            .await
            .expect("Redis must be reachable");
        (a, b)
    }

    fn sorted(mut ids: Vec<ConnectionId>) -> Vec<ConnectionId> {
        ids.sort();
        ids
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn handles_are_shared_between_processes() {
        let (a, b) = two_processes(Duration::from_secs(30)).await;
        let phone = ConnectionId::new();
        let laptop = ConnectionId::new();

        let first = a.register("alice", phone).await.unwrap();
        let second = b.register("alice", laptop).await.unwrap();
        assert!(first.became_present());
        assert!(!second.became_present());
        assert_eq!(second.handles, 2);

        assert_eq!(sorted(a.lookup("alice").await.unwrap()), sorted(vec![phone, laptop]));

        let one_left = a.unregister("alice", laptop).await.unwrap();
        let none_left = b.unregister("alice", phone).await.unwrap();
        assert!(!one_left.became_absent());
        assert!(none_left.became_absent());
        assert!(a.lookup("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn concurrent_calls_across_processes_see_one_transition_each_way() {
        let (a, b) = two_processes(Duration::from_secs(30)).await;
        let handles: Vec<ConnectionId> = (0..16).map(|_| ConnectionId::new()).collect();

        let mut tasks = Vec::new();
        for (i, conn_id) in handles.iter().copied().enumerate() {
            let directory = if i % 2 == 0 { a.clone() } else { b.clone() };
            tasks.push(tokio::spawn(async move {
                directory.register("alice", conn_id).await.unwrap()
            }));
        }
        let mut present = 0;
        for task in tasks {
            if task.await.unwrap().became_present() {
                present += 1;
            }
        }
        assert_eq!(present, 1);

        let mut tasks = Vec::new();
        for (i, conn_id) in handles.iter().copied().enumerate() {
            let directory = if i % 2 == 0 { b.clone() } else { a.clone() };
            tasks.push(tokio::spawn(async move {
                directory.unregister("alice", conn_id).await.unwrap()
            }));
        }
        let mut absent = 0;
        for task in tasks {
            if task.await.unwrap().became_absent() {
                absent += 1;
            }
        }
        assert_eq!(absent, 1);
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn handles_of_a_silent_process_are_pruned() {
        let (crashed, live) = two_processes(Duration::from_millis(300)).await;
        crashed.register("alice", ConnectionId::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let conn_id = ConnectionId::new();
        assert!(live.register("alice", conn_id).await.unwrap().became_present());
        assert_eq!(live.lookup("alice").await.unwrap(), vec![conn_id]);
        assert!(live.unregister("alice", conn_id).await.unwrap().became_absent());
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn refresh_keeps_live_handles_and_ignores_gone_ones() {
        let (a, _) = two_processes(Duration::from_millis(300)).await;
        let phone = ConnectionId::new();
        let gone = ConnectionId::new();
        a.register("alice", phone).await.unwrap();

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(150)).await;
            a.refresh("alice", &[phone, gone]).await.unwrap();
        }

        assert_eq!(a.lookup("alice").await.unwrap(), vec![phone]);
    }
}

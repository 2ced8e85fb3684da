//! Best-effort, TTL-bounded cache of named query results, persisted in the
//! `response_cache` table.
//!
//! Reads never fail: a missing, expired, unreadable or corrupted entry is a
//! miss, and expired or corrupted entries are evicted on the way out. Writes
//! never fail either; a rejected write is logged and dropped.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::clock::Clock;
use crate::date_util::{to_iso, DayRange};
use crate::error::Result;
use crate::storage::{repository, Database};

/// Namespace for every stored cache key.
pub const CACHE_PREFIX: &str = "linealyzer_";

/// Entries older than this are stale.
pub const DEFAULT_TTL_SECS: i64 = 5 * 60;

/// Workspace scope used when no credential fingerprint is supplied.
pub const DEFAULT_WORKSPACE: &str = "default";

/// Short, non-reversible identity of the endpoint and credential a response
/// was fetched with. Queries keyed only by what the credential can see
/// (the team list) are scoped by it.
pub fn workspace_fingerprint(endpoint: &str, token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(endpoint.trim().as_bytes());
    hasher.update(b"\n");
    hasher.update(token.trim().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Identity of one cached query result.
///
/// Every parameter that changes the result set is part of the key, so two
/// different queries (or the same query with different parameters) can
/// never share an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey {
    Teams { workspace: String },
    TeamMembers { team_id: String },
    IssuesUpdated { team_id: String, range: DayRange },
    IssuesCreated { team_id: String, range: DayRange },
    IssuesCompleted { team_id: String, range: DayRange },
    CommentsSince { team_id: String, since: DateTime<Utc> },
}

impl CacheKey {
    fn name(&self) -> &'static str {
        match self {
            CacheKey::Teams { .. } => "teams",
            CacheKey::TeamMembers { .. } => "members",
            CacheKey::IssuesUpdated { .. } => "issues_updated",
            CacheKey::IssuesCreated { .. } => "issues_created",
            CacheKey::IssuesCompleted { .. } => "issues_completed",
            CacheKey::CommentsSince { .. } => "comments",
        }
    }

    fn params(&self) -> Vec<String> {
        match self {
            CacheKey::Teams { workspace } => vec![workspace.clone()],
            CacheKey::TeamMembers { team_id } => vec![team_id.clone()],
            CacheKey::IssuesUpdated { team_id, range }
            | CacheKey::IssuesCreated { team_id, range }
            | CacheKey::IssuesCompleted { team_id, range } => {
                vec![team_id.clone(), to_iso(range.start), to_iso(range.end)]
            }
            CacheKey::CommentsSince { team_id, since } => vec![team_id.clone(), to_iso(*since)],
        }
    }

    /// Logical key: the query name, then each parameter form-urlencoded and
    /// `/`-separated. Encoding removes `/` from parameters, which keeps the
    /// mapping injective.
    pub fn to_key(&self) -> String {
        let mut key = self.name().to_string();
        for param in self.params() {
            key.push('/');
            key.extend(url::form_urlencoded::byte_serialize(param.as_bytes()));
        }
        key
    }
}

/// Stored value layout: `{data, timestamp}` with `timestamp` in epoch milliseconds.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    data: T,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ResponseCache {
    db: Database,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            clock,
            ttl: Duration::seconds(DEFAULT_TTL_SECS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn storage_key(key: &CacheKey) -> String {
        format!("{CACHE_PREFIX}{}", key.to_key())
    }

    pub async fn get<T: DeserializeOwned + Send>(&self, key: &CacheKey) -> Option<T> {
        let storage_key = Self::storage_key(key);
        let raw = match self
            .db
            .reader()
            .call({
                let storage_key = storage_key.clone();
                move |conn| repository::get_cache_value(conn, &storage_key)
            })
            .await
        {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Cache read failed for {storage_key}: {e}");
                return None;
            }
        };

        let fresh = match serde_json::from_str::<CacheEntry<T>>(&raw) {
            Ok(entry) if self.clock.now() - entry.timestamp <= self.ttl => Some(entry.data),
            Ok(_) => {
                log::debug!("Cache entry {storage_key} expired");
                None
            }
            Err(e) => {
                log::warn!("Discarding corrupted cache entry {storage_key}: {e}");
                None
            }
        };

        match fresh {
            Some(data) => {
                log::debug!("Cache hit: {storage_key}");
                Some(data)
            }
            None => {
                self.evict(storage_key).await;
                None
            }
        }
    }

    pub async fn set<T: Serialize + Sync + ?Sized>(&self, key: &CacheKey, data: &T) {
        let now = self.clock.now();
        let value = match serde_json::to_string(&CacheEntry {
            data,
            timestamp: now,
        }) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("Could not serialize cache entry {}: {e}", key.to_key());
                return;
            }
        };

        let storage_key = Self::storage_key(key);
        let result = self
            .db
            .writer()
            .call({
                let storage_key = storage_key.clone();
                move |conn| {
                    repository::put_cache_value(conn, &storage_key, &value, now.timestamp_millis())
                }
            })
            .await;
        if let Err(e) = result {
            log::warn!("Cache write failed for {storage_key}: {e}");
        }
    }

    async fn evict(&self, storage_key: String) {
        let result = self
            .db
            .writer()
            .call({
                let storage_key = storage_key.clone();
                move |conn| repository::delete_cache_value(conn, &storage_key)
            })
            .await;
        if let Err(e) = result {
            log::warn!("Cache eviction failed for {storage_key}: {e}");
        }
    }

    /// Remove every cached response. Returns the number of entries removed.
    pub async fn clear(&self) -> Result<usize> {
        let n = self
            .db
            .writer()
            .call(|conn| repository::clear_cache(conn, CACHE_PREFIX))
            .await?;
        Ok(n)
    }

    /// Remove entries older than the TTL. Returns the number of entries removed.
    pub async fn prune_expired(&self) -> Result<usize> {
        let cutoff = (self.clock.now() - self.ttl).timestamp_millis();
        let n = self
            .db
            .writer()
            .call(move |conn| repository::prune_cache(conn, CACHE_PREFIX, cutoff))
            .await?;
        Ok(n)
    }

    pub async fn len(&self) -> Result<u64> {
        let n = self
            .db
            .reader()
            .call(|conn| repository::count_cache_entries(conn, CACHE_PREFIX))
            .await?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{NaiveDate, TimeZone};

    use super::*;
    use crate::clock::ManualClock;
    use crate::date_util::{day_range, lookback_since};
    use crate::model::Team;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap()
    }

    async fn cache() -> (ResponseCache, Arc<ManualClock>, Database) {
        let db = Database::open_memory().await.unwrap();
        let clock = Arc::new(ManualClock::new(t0()));
        (ResponseCache::new(db.clone(), clock.clone()), clock, db)
    }

    fn teams_key() -> CacheKey {
        CacheKey::Teams {
            workspace: "w1".into(),
        }
    }

    fn teams() -> Vec<Team> {
        vec![Team {
            id: "t1".into(),
            name: "Engineering".into(),
            key: "ENG".into(),
        }]
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (cache, _, _) = cache().await;
        cache.set(&teams_key(), &teams()).await;

        let hit: Option<Vec<Team>> = cache.get(&teams_key()).await;
        assert_eq!(hit, Some(teams()));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let (cache, _, _) = cache().await;
        let hit: Option<Vec<Team>> = cache.get(&teams_key()).await;
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_entry_valid_until_ttl() {
        let (cache, clock, _) = cache().await;
        cache.set(&teams_key(), &teams()).await;

        clock.advance(Duration::seconds(DEFAULT_TTL_SECS));
        let hit: Option<Vec<Team>> = cache.get(&teams_key()).await;
        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn test_expired_entry_is_evicted() {
        let (cache, clock, _) = cache().await;
        cache.set(&teams_key(), &teams()).await;
        assert_eq!(cache.len().await.unwrap(), 1);

        clock.advance(Duration::seconds(DEFAULT_TTL_SECS + 1));
        let hit: Option<Vec<Team>> = cache.get(&teams_key()).await;
        assert!(hit.is_none());
        assert_eq!(cache.len().await.unwrap(), 0);

        // Even if the clock were rewound, the entry is gone.
        clock.set(t0());
        let hit: Option<Vec<Team>> = cache.get(&teams_key()).await;
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_custom_ttl() {
        let (cache, clock, _) = cache().await;
        let cache = cache.with_ttl(Duration::seconds(10));
        cache.set(&teams_key(), &teams()).await;

        clock.advance(Duration::seconds(11));
        let hit: Option<Vec<Team>> = cache.get(&teams_key()).await;
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_a_miss() {
        let (cache, _, db) = cache().await;
        let storage_key = format!("{CACHE_PREFIX}teams/w1");
        db.writer()
            .call(move |conn| repository::put_cache_value(conn, &storage_key, "{\"data\": [tru", 0))
            .await
            .unwrap();

        let hit: Option<Vec<Team>> = cache.get(&teams_key()).await;
        assert!(hit.is_none());
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wrong_shape_is_a_miss() {
        let (cache, _, _) = cache().await;
        cache.set(&teams_key(), "not a team list").await;

        let hit: Option<Vec<Team>> = cache.get(&teams_key()).await;
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let (cache, _, db) = cache().await;
        db.writer()
            .call(|conn| conn.execute_batch("DROP TABLE response_cache"))
            .await
            .unwrap();

        cache.set(&teams_key(), &teams()).await;
        let hit: Option<Vec<Team>> = cache.get(&teams_key()).await;
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_clear_and_prune() {
        let (cache, clock, _) = cache().await;
        cache.set(&teams_key(), &teams()).await;
        clock.advance(Duration::seconds(DEFAULT_TTL_SECS + 60));
        cache
            .set(&CacheKey::TeamMembers { team_id: "t1".into() }, &Vec::<String>::new())
            .await;

        assert_eq!(cache.prune_expired().await.unwrap(), 1);
        assert_eq!(cache.len().await.unwrap(), 1);
        assert_eq!(cache.clear().await.unwrap(), 1);
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[test]
    fn test_key_format() {
        let range = day_range(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        assert_eq!(teams_key().to_key(), "teams/w1");
        assert_eq!(
            CacheKey::TeamMembers { team_id: "abc".into() }.to_key(),
            "members/abc"
        );
        assert_eq!(
            CacheKey::IssuesUpdated { team_id: "abc".into(), range }.to_key(),
            "issues_updated/abc/2025-01-15T00%3A00%3A00.000Z/2025-01-16T00%3A00%3A00.000Z"
        );
    }

    #[test]
    fn test_keys_are_distinct() {
        let d1 = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 1, 16).unwrap();
        let keys = vec![
            teams_key(),
            CacheKey::Teams { workspace: "w2".into() },
            CacheKey::TeamMembers { team_id: "a".into() },
            CacheKey::TeamMembers { team_id: "b".into() },
            CacheKey::TeamMembers { team_id: "a/b".into() },
            CacheKey::IssuesUpdated { team_id: "a".into(), range: day_range(d1) },
            CacheKey::IssuesUpdated { team_id: "a".into(), range: day_range(d2) },
            CacheKey::IssuesUpdated { team_id: "b".into(), range: day_range(d1) },
            CacheKey::IssuesCreated { team_id: "a".into(), range: day_range(d1) },
            CacheKey::IssuesCompleted { team_id: "a".into(), range: day_range(d1) },
            CacheKey::CommentsSince { team_id: "a".into(), since: lookback_since(d1, 14).unwrap() },
            CacheKey::CommentsSince { team_id: "a".into(), since: lookback_since(d1, 7).unwrap() },
            CacheKey::CommentsSince { team_id: "a".into(), since: lookback_since(d2, 14).unwrap() },
        ];
        let rendered: HashSet<String> = keys.iter().map(|k| k.to_key()).collect();
        assert_eq!(rendered.len(), keys.len());
    }

    #[test]
    fn test_workspace_fingerprint() {
        let a = workspace_fingerprint("https://api.linear.app/graphql", "lin_api_one");
        let b = workspace_fingerprint("https://api.linear.app/graphql", "lin_api_two");
        let c = workspace_fingerprint("http://localhost:8080/graphql", "lin_api_one");
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert!(!a.contains("lin_api"));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(
            a,
            workspace_fingerprint(" https://api.linear.app/graphql", "lin_api_one ")
        );
    }

    #[test]
    fn test_separator_in_param_is_encoded() {
        let key = CacheKey::TeamMembers { team_id: "a/b".into() }.to_key();
        assert_eq!(key, "members/a%2Fb");
    }
}

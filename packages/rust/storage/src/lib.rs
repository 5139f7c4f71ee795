//! Questionnaire session storage with a fixed retention period.
//!
//! [`SessionStore`] is the key-value seam the questionnaire workflow talks
//! to. Two implementations ship:
//! - [`Storage`]: a libSQL file database (sole writer is the CLI process)
//! - [`MemoryStore`]: a process-local map, used by tests and one-shot runs
//!
//! Every write stamps the record with `now + ttl`; reads treat records past
//! that instant as absent even before [`SessionStore::purge_expired`] runs.

mod memory;
mod migrations;

use std::path::Path;

use chrono::{DateTime, Datelike, Duration, SecondsFormat, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, info};

use lvkit_shared::{LvkitError, Result, Session, SessionId};

pub use memory::MemoryStore;

/// Key-value store for questionnaire sessions.
#[allow(async_fn_in_trait)]
pub trait SessionStore {
    /// Insert or replace a session and restart its retention period.
    async fn put(&self, session: &Session) -> Result<()>;

    /// A live session by id; expired sessions read as `None`.
    async fn get(&self, id: &SessionId) -> Result<Option<Session>>;

    /// Remove a session. Returns whether a record existed.
    async fn delete(&self, id: &SessionId) -> Result<bool>;

    /// All live sessions, oldest first.
    async fn list(&self) -> Result<Vec<Session>>;

    /// Drop expired records. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}

/// Fixed-width timestamp encoding used for every stored instant.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `now + ttl`, rejected when it lies past year 9999, the last instant
/// [`timestamp`] encodes at fixed width.
pub(crate) fn expires_at(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>> {
    now.checked_add_signed(ttl)
        .filter(|at| at.year() <= 9999)
        .ok_or_else(|| {
            LvkitError::Storage(format!(
                "session ttl of {} hours is out of range",
                ttl.num_hours()
            ))
        })
}

fn db_err(e: impl std::fmt::Display) -> LvkitError {
    LvkitError::Storage(e.to_string())
}

/// Session store handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    ttl: Duration,
}

impl Storage {
    /// Open or create a database at `path`, keeping sessions for `ttl`.
    pub async fn open(path: &Path, ttl: Duration) -> Result<Self> {
        expires_at(Utc::now(), ttl)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LvkitError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        let storage = Self { db, conn, ttl };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        LvkitError::Storage(format!("migration v{} failed: {e}", migration.version))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

}

impl SessionStore for Storage {
    async fn put(&self, session: &Session) -> Result<()> {
        let data = serde_json::to_string(session)
            .map_err(|e| LvkitError::Storage(format!("session serialization failed: {e}")))?;
        let now = Utc::now();
        let expires = expires_at(now, self.ttl)?;
        let id = session.id.to_string();

        self.conn
            .execute(
                "INSERT INTO sessions (id, data_json, created_at, updated_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                   data_json = excluded.data_json,
                   updated_at = excluded.updated_at,
                   expires_at = excluded.expires_at",
                params![
                    id.as_str(),
                    data.as_str(),
                    timestamp(session.created_at),
                    timestamp(now),
                    timestamp(expires),
                ],
            )
            .await
            .map_err(db_err)?;

        debug!(session = %session.id, "session stored");
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        let id = id.to_string();
        let mut rows = self
            .conn
            .query(
                "SELECT data_json FROM sessions WHERE id = ?1 AND expires_at > ?2",
                params![id.as_str(), timestamp(Utc::now())],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => {
                let data = row.get::<String>(0).map_err(db_err)?;
                let session = serde_json::from_str(&data).map_err(|e| {
                    LvkitError::Storage(format!("corrupt session record {id}: {e}"))
                })?;
                Ok(Some(session))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn delete(&self, id: &SessionId) -> Result<bool> {
        let id = id.to_string();
        let affected = self
            .conn
            .execute("DELETE FROM sessions WHERE id = ?1", params![id.as_str()])
            .await
            .map_err(db_err)?;
        Ok(affected > 0)
    }

    async fn list(&self) -> Result<Vec<Session>> {
        let mut rows = self
            .conn
            .query(
                "SELECT data_json FROM sessions WHERE expires_at > ?1 ORDER BY created_at, id",
                params![timestamp(Utc::now())],
            )
            .await
            .map_err(db_err)?;

        let mut sessions = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let data = row.get::<String>(0).map_err(db_err)?;
            let session = serde_json::from_str(&data)
                .map_err(|e| LvkitError::Storage(format!("corrupt session record: {e}")))?;
            sessions.push(session);
        }
        Ok(sessions)
    }

    async fn purge_expired(&self) -> Result<usize> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM sessions WHERE expires_at <= ?1",
                params![timestamp(Utc::now())],
            )
            .await
            .map_err(db_err)?;

        if removed > 0 {
            info!(removed, "expired sessions purged");
        }
        Ok(removed as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lvkit_shared::ProjectInfo;
    use std::path::PathBuf;
    use uuid::Uuid;

    /// A fresh directory holding the test database; removed by each test.
    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("lvkit-storage-test-{}", Uuid::now_v7()))
    }

    async fn test_storage(dir: &Path, ttl: Duration) -> Storage {
        Storage::open(&dir.join("sessions.db"), ttl).await.expect("open test db")
    }

    fn session(description: &str) -> Session {
        Session::new(
            ProjectInfo {
                category: "Renovierung".into(),
                description: description.into(),
            },
            vec!["sanitaer".into(), "fliesen".into()],
        )
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let tmp = temp_dir();
        let storage = test_storage(&tmp, Duration::hours(24)).await;
        assert_eq!(storage.get_schema_version().await, 1);

        drop(storage);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = temp_dir();
        let s1 = test_storage(&tmp, Duration::hours(1)).await;
        drop(s1);
        let s2 = test_storage(&tmp, Duration::hours(1)).await;
        assert_eq!(s2.get_schema_version().await, 1);

        drop(s2);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let tmp = temp_dir();
        let storage = test_storage(&tmp, Duration::hours(24)).await;
        let s = session("Bad sanieren");
        storage.put(&s).await.expect("put");

        let found = storage.get(&s.id).await.expect("get").expect("present");
        assert_eq!(found, s);

        drop(storage);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn put_replaces_existing_record() {
        let tmp = temp_dir();
        let storage = test_storage(&tmp, Duration::hours(24)).await;
        let mut s = session("Bad sanieren");
        storage.put(&s).await.unwrap();

        s.current_trade_index = 1;
        storage.put(&s).await.unwrap();

        let found = storage.get(&s.id).await.unwrap().unwrap();
        assert_eq!(found.current_trade_index, 1);
        assert_eq!(storage.list().await.unwrap().len(), 1);

        drop(storage);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn unknown_id_is_absent() {
        let tmp = temp_dir();
        let storage = test_storage(&tmp, Duration::hours(24)).await;
        assert!(storage.get(&SessionId::new()).await.unwrap().is_none());
        assert!(!storage.delete(&SessionId::new()).await.unwrap());

        drop(storage);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let tmp = temp_dir();
        let storage = test_storage(&tmp, Duration::hours(24)).await;
        let s = session("Küche streichen");
        storage.put(&s).await.unwrap();

        assert!(storage.delete(&s.id).await.unwrap());
        assert!(storage.get(&s.id).await.unwrap().is_none());

        drop(storage);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn list_is_oldest_first() {
        let tmp = temp_dir();
        let storage = test_storage(&tmp, Duration::hours(24)).await;
        let first = session("eins");
        let second = session("zwei");
        storage.put(&second).await.unwrap();
        storage.put(&first).await.unwrap();

        let ids: Vec<SessionId> = storage.list().await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);

        drop(storage);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn expired_sessions_read_as_absent_and_purge() {
        let tmp = temp_dir();
        let storage = test_storage(&tmp, Duration::zero()).await;
        let s = session("Bad");
        storage.put(&s).await.unwrap();

        assert!(storage.get(&s.id).await.unwrap().is_none());
        assert!(storage.list().await.unwrap().is_empty());
        assert_eq!(storage.purge_expired().await.unwrap(), 1);
        assert_eq!(storage.purge_expired().await.unwrap(), 0);

        drop(storage);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn sessions_survive_reopen() {
        let tmp = temp_dir();
        let s = session("Bad");
        {
            let storage = test_storage(&tmp, Duration::hours(1)).await;
            storage.put(&s).await.unwrap();
        }
        let storage = test_storage(&tmp, Duration::hours(1)).await;
        assert_eq!(storage.get(&s.id).await.unwrap(), Some(s));

        drop(storage);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn open_rejects_ttl_past_year_9999() {
        let tmp = temp_dir();
        for hours in [100_000_000, 10_000_000_000] {
            let ttl = Duration::try_hours(hours).unwrap();
            let err = Storage::open(&tmp.join("sessions.db"), ttl).await.err();
            assert!(matches!(err, Some(LvkitError::Storage(_))), "ttl {hours}h accepted");
        }
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn century_ttl_keeps_sessions_live() {
        let tmp = temp_dir();
        let storage = test_storage(&tmp, Duration::try_hours(24 * 365 * 100).unwrap()).await;
        let s = session("Bad");
        storage.put(&s).await.unwrap();

        assert_eq!(storage.get(&s.id).await.unwrap(), Some(s));
        assert_eq!(storage.purge_expired().await.unwrap(), 0);

        drop(storage);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn expiry_is_checked() {
        let now = Utc::now();
        assert_eq!(expires_at(now, Duration::hours(1)).unwrap(), now + Duration::hours(1));
        assert!(expires_at(now, Duration::try_hours(100_000_000).unwrap()).is_err());
        assert!(expires_at(now, Duration::try_hours(10_000_000_000).unwrap()).is_err());
    }

    #[test]
    fn timestamps_are_fixed_width() {
        let a = timestamp(DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z").unwrap().to_utc());
        let b = timestamp(DateTime::parse_from_rfc3339("2026-01-02T03:04:05.123Z").unwrap().to_utc());
        assert_eq!(a, "2026-01-02T03:04:05.000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }
}

//! Append-only log of granted unlock sessions.
//!
//! Provides:
//! - Idempotent recording keyed by (target, grant time)
//! - Per-target history for escalation lookups
//! - The active exemption set at a given instant
//! - Lock-down watermarks that end every exemption granted before them
//! - A per-day usage feed for the statistics uploader

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

use super::{data_dir, migrations, open_connection};
use crate::error::StoreError;
use crate::target::RestrictionTarget;
use crate::unlock::UnlockSession;

/// Unlock activity for one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub unlock_count: u64,
    pub task_seconds: u64,
}

const SESSION_COLUMNS: &str = "target, granted_at_ms, expires_at_ms, completed_secs";

pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Default location: `<data_dir>/sessions.db`.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        Ok(data_dir()?.join("sessions.db"))
    }

    /// Open (creating if needed) the session log at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::with_connection(open_connection(path)?)
    }

    /// Open an in-memory log (tests, embedding).
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        migrations::migrate_sessions(&conn)
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Append a session. Returns `false` if an identical (target, grant
    /// time) pair was already recorded, in which case nothing changes.
    pub fn record(&self, session: &UnlockSession) -> Result<bool, StoreError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO unlock_sessions (target, granted_at_ms, expires_at_ms, completed_secs)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.target.as_bytes(),
                session.granted_at.timestamp_millis(),
                session.expires_at.timestamp_millis(),
                session.completed_secs as i64,
            ],
        )?;
        Ok(inserted == 1)
    }

    /// Sessions for `target` granted strictly after `since`, oldest first.
    pub fn recent_sessions(
        &self,
        target: &RestrictionTarget,
        since: DateTime<Utc>,
    ) -> Result<Vec<UnlockSession>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM unlock_sessions
             WHERE target = ?1 AND granted_at_ms > ?2
             ORDER BY granted_at_ms ASC"
        ))?;
        let rows = stmt.query_map(
            params![target.as_bytes(), since.timestamp_millis()],
            read_row,
        )?;
        collect_sessions(rows)
    }

    /// Every session, any target, granted strictly after `since`.
    pub fn sessions_since(&self, since: DateTime<Utc>) -> Result<Vec<UnlockSession>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM unlock_sessions
             WHERE granted_at_ms > ?1
             ORDER BY granted_at_ms ASC"
        ))?;
        let rows = stmt.query_map(params![since.timestamp_millis()], read_row)?;
        collect_sessions(rows)
    }

    /// Sessions still granting access at `now`: unexpired and granted after
    /// the latest lock-down at or before `now`.
    pub fn active_sessions(&self, now: DateTime<Utc>) -> Result<Vec<UnlockSession>, StoreError> {
        let now_ms = now.timestamp_millis();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM unlock_sessions
             WHERE expires_at_ms > ?1
               AND granted_at_ms <= ?1
               AND NOT EXISTS (
                   SELECT 1 FROM lockdowns
                   WHERE revoked_at_ms <= ?1
                     AND revoked_at_ms >= unlock_sessions.granted_at_ms)
             ORDER BY granted_at_ms ASC"
        ))?;
        let rows = stmt.query_map(params![now_ms], read_row)?;
        collect_sessions(rows)
    }

    /// Targets with at least one active session at `now`.
    pub fn active_targets(&self, now: DateTime<Utc>) -> Result<BTreeSet<RestrictionTarget>, StoreError> {
        Ok(self
            .active_sessions(now)?
            .into_iter()
            .map(|s| s.target)
            .collect())
    }

    /// End every exemption granted at or before `at`. Returns the sessions
    /// that were active and are now revoked.
    ///
    /// Sessions are not modified; they keep counting toward escalation.
    pub fn revoke_all(&self, at: DateTime<Utc>) -> Result<Vec<UnlockSession>, StoreError> {
        let revoked = self.active_sessions(at)?;
        self.conn.execute(
            "INSERT INTO lockdowns (revoked_at_ms) VALUES (?1)",
            params![at.timestamp_millis()],
        )?;
        Ok(revoked)
    }

    /// Delete sessions granted strictly before `before`, plus lock-down
    /// watermarks that are older than `before` and superseded by a newer one.
    /// Returns the number of sessions deleted.
    pub fn prune(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        let before_ms = before.timestamp_millis();
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let deleted = tx.execute(
            "DELETE FROM unlock_sessions WHERE granted_at_ms < ?1",
            params![before_ms],
        )?;
        tx.execute(
            "DELETE FROM lockdowns
             WHERE revoked_at_ms < ?1
               AND revoked_at_ms < (SELECT MAX(revoked_at_ms) FROM lockdowns)",
            params![before_ms],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    /// Per-day unlock counts and completed attention seconds since `since`,
    /// oldest day first. Source feed for the statistics uploader.
    pub fn daily_usage(&self, since: DateTime<Utc>) -> Result<Vec<DailyUsage>, StoreError> {
        let mut days: BTreeMap<NaiveDate, DailyUsage> = BTreeMap::new();
        for session in self.sessions_since(since)? {
            let date = session.granted_at.date_naive();
            let day = days.entry(date).or_insert_with(|| DailyUsage {
                date,
                unlock_count: 0,
                task_seconds: 0,
            });
            day.unlock_count += 1;
            day.task_seconds += session.completed_secs;
        }
        Ok(days.into_values().collect())
    }

    /// Total number of stored sessions.
    pub fn count(&self) -> Result<u64, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM unlock_sessions", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

type RawSession = (Vec<u8>, i64, i64, i64);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawSession> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

/// Rows with unrepresentable timestamps are skipped and logged.
fn collect_sessions(
    rows: impl Iterator<Item = rusqlite::Result<RawSession>>,
) -> Result<Vec<UnlockSession>, StoreError> {
    let mut sessions = Vec::new();
    for row in rows {
        let (target, granted_ms, expires_ms, completed) = row?;
        match (
            DateTime::from_timestamp_millis(granted_ms),
            DateTime::from_timestamp_millis(expires_ms),
        ) {
            (Some(granted_at), Some(expires_at)) => sessions.push(UnlockSession {
                target: RestrictionTarget::from_bytes(target),
                granted_at,
                expires_at,
                completed_secs: completed.max(0) as u64,
            }),
            _ => tracing::warn!(granted_ms, expires_ms, "skipping undecodable unlock session"),
        }
    }
    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t(s: &str) -> RestrictionTarget {
        RestrictionTarget::from_bytes(s.as_bytes())
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn session(target: &str, granted: i64) -> UnlockSession {
        UnlockSession::new(t(target), at(granted), Duration::seconds(900), 60)
    }

    #[test]
    fn record_is_idempotent() {
        let store = SessionStore::open_memory().unwrap();
        assert!(store.record(&session("a", 0)).unwrap());
        assert!(!store.record(&session("a", 0)).unwrap());
        assert!(store.record(&session("b", 0)).unwrap());
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn recent_sessions_are_per_target_and_ordered() {
        let store = SessionStore::open_memory().unwrap();
        store.record(&session("a", 300)).unwrap();
        store.record(&session("a", 100)).unwrap();
        store.record(&session("b", 200)).unwrap();
        store.record(&session("a", 0)).unwrap();

        let recent = store.recent_sessions(&t("a"), at(0)).unwrap();
        let grants: Vec<_> = recent.iter().map(|s| s.granted_at).collect();
        assert_eq!(grants, vec![at(100), at(300)]);
    }

    #[test]
    fn active_sessions_respect_expiry() {
        let store = SessionStore::open_memory().unwrap();
        store.record(&session("a", 0)).unwrap();
        assert_eq!(store.active_sessions(at(899)).unwrap().len(), 1);
        assert!(store.active_sessions(at(900)).unwrap().is_empty());
        assert!(store.active_sessions(at(-1)).unwrap().is_empty());
    }

    #[test]
    fn revoke_all_ends_current_exemptions_only() {
        let store = SessionStore::open_memory().unwrap();
        store.record(&session("a", 0)).unwrap();
        store.record(&session("b", 10)).unwrap();

        let revoked = store.revoke_all(at(20)).unwrap();
        assert_eq!(revoked.len(), 2);
        assert!(store.active_targets(at(21)).unwrap().is_empty());

        store.record(&session("a", 30)).unwrap();
        let active = store.active_targets(at(31)).unwrap();
        assert_eq!(active.into_iter().collect::<Vec<_>>(), vec![t("a")]);

        // Revoked sessions are still history.
        assert_eq!(store.recent_sessions(&t("a"), at(-1)).unwrap().len(), 2);
    }

    #[test]
    fn prune_removes_only_older_sessions() {
        let store = SessionStore::open_memory().unwrap();
        store.record(&session("a", 0)).unwrap();
        store.record(&session("a", 100)).unwrap();
        assert_eq!(store.prune(at(100)).unwrap(), 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn prune_keeps_latest_lockdown() {
        let store = SessionStore::open_memory().unwrap();
        store.record(&session("a", 0)).unwrap();
        store.revoke_all(at(10)).unwrap();
        store.prune(at(5_000)).unwrap();

        // A session granted before the surviving watermark stays revoked.
        store.record(&session("b", 5)).unwrap();
        assert!(store.active_sessions(at(11)).unwrap().is_empty());
    }

    #[test]
    fn daily_usage_groups_by_utc_day() {
        let store = SessionStore::open_memory().unwrap();
        let day_one = DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z").unwrap().with_timezone(&Utc);
        let day_two = DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z").unwrap().with_timezone(&Utc);
        for (granted, secs) in [(day_one, 60), (day_one + Duration::hours(1), 180), (day_two, 60)] {
            store
                .record(&UnlockSession::new(t("a"), granted, Duration::seconds(900), secs))
                .unwrap();
        }

        let usage = store.daily_usage(day_one - Duration::days(1)).unwrap();
        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].date, day_one.date_naive());
        assert_eq!(usage[0].unlock_count, 2);
        assert_eq!(usage[0].task_seconds, 240);
        assert_eq!(usage[1].unlock_count, 1);
    }
}

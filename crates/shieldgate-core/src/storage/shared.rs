//! The durable shared store.
//!
//! Every execution context (foreground app, interval callback, threshold
//! callback, overlay button) opens this same SQLite file. It carries the
//! current [`RestrictionSelection`], a single-slot pending unlock request,
//! and the schedule registrations published to the host.
//!
//! Writes are whole-value replacements or single-statement takes, so
//! concurrent processes resolve by last-writer-wins and never observe a
//! partially written value.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

use super::config::DecodeFailurePolicy;
use super::{data_dir, migrations, open_connection};
use crate::error::StoreError;
use crate::host::{DailyInterval, ScheduleRegistrations, UsageThresholdWatch};
use crate::selection::{self, RestrictionSelection};
use crate::target::RestrictionTarget;

const SELECTION_KEY: &str = "selection";
const SELECTION_BACKUP_KEY: &str = "selection.last_good";
const DAILY_INTERVAL_KEY: &str = "schedule.daily_interval";

/// An unlock request handed from the overlay to the interactive context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub target: RestrictionTarget,
    pub hint: String,
    pub requested_at: DateTime<Utc>,
}

/// One change to the schedule registrations.
#[derive(Debug, Clone, Copy)]
pub enum ScheduleChange<'a> {
    DailyInterval(&'a DailyInterval),
    Watch(&'a UsageThresholdWatch),
    Unwatch(&'a RestrictionTarget),
}

pub struct SharedStore {
    conn: Connection,
    decode_failure: DecodeFailurePolicy,
}

impl SharedStore {
    /// Default location: `<data_dir>/shared.db`.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        Ok(data_dir()?.join("shared.db"))
    }

    /// Open (creating if needed) the shared store at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = open_connection(path)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory store (tests, embedding).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        migrations::migrate_shared(&conn)
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn,
            decode_failure: DecodeFailurePolicy::default(),
        })
    }

    /// Choose what [`load_selection`](Self::load_selection) does with an
    /// undecodable payload.
    pub fn with_decode_failure(mut self, policy: DecodeFailurePolicy) -> Self {
        self.decode_failure = policy;
        self
    }

    pub fn decode_failure(&self) -> DecodeFailurePolicy {
        self.decode_failure
    }

    // ── Selection ────────────────────────────────────────────────────

    /// Replace the stored selection.
    ///
    /// The previous payload is kept as the last-known-good backup when it
    /// still decodes, so a fail-closed reader has something to fall back on.
    ///
    /// # Errors
    /// Returns an error if encoding or the write transaction fails.
    pub fn save_selection(&self, selection: &RestrictionSelection) -> Result<(), StoreError> {
        let payload = selection::encode(selection)?;
        let now_ms = Utc::now().timestamp_millis();

        // IMMEDIATE takes the write lock before the read, so a concurrent
        // writer makes this wait on the busy timeout instead of failing with a
        // stale snapshot.
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let previous = get_kv(&tx, SELECTION_KEY)?;
        if let Some(previous) = previous {
            if selection::decode(&previous).is_ok() {
                put_kv(&tx, SELECTION_BACKUP_KEY, &previous, now_ms)?;
            }
        }
        put_kv(&tx, SELECTION_KEY, &payload, now_ms)?;
        tx.commit()?;

        tracing::debug!(entries = selection.len(), "saved selection");
        Ok(())
    }

    /// Load the current selection.
    ///
    /// A missing selection is the empty selection. An undecodable one is
    /// handled by the configured [`DecodeFailurePolicy`] and never errors.
    ///
    /// # Errors
    /// Returns an error only if the database itself cannot be read.
    pub fn load_selection(&self) -> Result<RestrictionSelection, StoreError> {
        let Some(payload) = get_kv(&self.conn, SELECTION_KEY)? else {
            return Ok(RestrictionSelection::default());
        };

        match selection::decode(&payload) {
            Ok(selection) => Ok(selection),
            Err(err) => {
                tracing::warn!(error = %err, policy = ?self.decode_failure, "stored selection failed to decode");
                match self.decode_failure {
                    DecodeFailurePolicy::FailOpen => Ok(RestrictionSelection::default()),
                    DecodeFailurePolicy::FailClosed => self.load_backup_selection(),
                }
            }
        }
    }

    fn load_backup_selection(&self) -> Result<RestrictionSelection, StoreError> {
        let backup = get_kv(&self.conn, SELECTION_BACKUP_KEY)?;
        match backup.as_deref().map(selection::decode) {
            Some(Ok(selection)) => {
                tracing::warn!(entries = selection.len(), "re-asserting last known good selection");
                Ok(selection)
            }
            Some(Err(err)) => {
                tracing::error!(error = %err, "backup selection also failed to decode");
                Ok(RestrictionSelection::default())
            }
            None => {
                tracing::error!("no backup selection available");
                Ok(RestrictionSelection::default())
            }
        }
    }

    // ── Pending request ──────────────────────────────────────────────

    /// Publish an unlock request, overwriting any unconsumed one.
    pub fn publish_pending_request(
        &self,
        target: &RestrictionTarget,
        hint: &str,
        at: DateTime<Utc>,
    ) -> Result<PendingRequest, StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO pending_request (slot, target, hint, requested_at_ms)
             VALUES (0, ?1, ?2, ?3)",
            params![target.as_bytes(), hint, at.timestamp_millis()],
        )?;
        Ok(PendingRequest {
            target: target.clone(),
            hint: hint.to_string(),
            requested_at: at,
        })
    }

    /// Take the pending request, if any. A request is returned at most once.
    pub fn consume_pending_request(&self) -> Result<Option<PendingRequest>, StoreError> {
        let row = self
            .conn
            .query_row(
                "DELETE FROM pending_request WHERE slot = 0
                 RETURNING target, hint, requested_at_ms",
                [],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.and_then(pending_from_row))
    }

    /// Read the pending request without consuming it.
    pub fn peek_pending_request(&self) -> Result<Option<PendingRequest>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT target, hint, requested_at_ms FROM pending_request WHERE slot = 0",
                [],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.and_then(pending_from_row))
    }

    // ── Schedule registrations ───────────────────────────────────────

    /// Current schedule registrations, watches ordered by registration time.
    pub fn schedule(&self) -> Result<ScheduleRegistrations, StoreError> {
        read_schedule(&self.conn)
    }

    /// Apply `change`, then hand the resulting registrations to `publish`
    /// while the write lock is still held.
    ///
    /// Nothing is committed if `publish` fails. Concurrent writers are
    /// serialized, so the last publish always carries every change.
    pub fn update_schedule<E>(
        &self,
        change: ScheduleChange<'_>,
        publish: impl FnOnce(&ScheduleRegistrations) -> Result<(), E>,
    ) -> Result<ScheduleRegistrations, E>
    where
        E: From<StoreError>,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        apply_schedule_change(&tx, change)?;
        let registrations = read_schedule(&tx)?;
        publish(&registrations)?;
        tx.commit().map_err(StoreError::from)?;
        tracing::debug!(watches = registrations.usage_watches.len(), "updated schedule");
        Ok(registrations)
    }

    #[cfg(test)]
    fn kv_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        put_kv(&self.conn, key, value, Utc::now().timestamp_millis())
    }
}

fn apply_schedule_change(conn: &Connection, change: ScheduleChange<'_>) -> Result<(), StoreError> {
    let now_ms = Utc::now().timestamp_millis();
    match change {
        ScheduleChange::DailyInterval(interval) => {
            put_kv(conn, DAILY_INTERVAL_KEY, &serde_json::to_string(interval)?, now_ms)?;
        }
        ScheduleChange::Watch(watch) => {
            conn.execute(
                "INSERT OR REPLACE INTO usage_watches (target, threshold_secs, registered_at_ms)
                 VALUES (?1, ?2, ?3)",
                params![
                    watch.target.as_bytes(),
                    watch.threshold_secs as i64,
                    watch.registered_at.timestamp_millis(),
                ],
            )?;
        }
        ScheduleChange::Unwatch(target) => {
            conn.execute(
                "DELETE FROM usage_watches WHERE target = ?1",
                params![target.as_bytes()],
            )?;
        }
    }
    Ok(())
}

fn read_schedule(conn: &Connection) -> Result<ScheduleRegistrations, StoreError> {
    let daily_interval = match get_kv(conn, DAILY_INTERVAL_KEY)? {
        Some(json) => match serde_json::from_str(&json) {
            Ok(interval) => Some(interval),
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable daily interval");
                None
            }
        },
        None => None,
    };

    let mut stmt = conn.prepare(
        "SELECT target, threshold_secs, registered_at_ms FROM usage_watches
         ORDER BY registered_at_ms, target",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, Vec<u8>>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;
    let mut usage_watches = Vec::new();
    for row in rows {
        let (target, threshold_secs, at_ms) = row?;
        let Some(registered_at) = DateTime::from_timestamp_millis(at_ms) else {
            tracing::warn!(at_ms, "dropping usage watch with invalid timestamp");
            continue;
        };
        usage_watches.push(UsageThresholdWatch {
            target: RestrictionTarget::from_bytes(target),
            threshold_secs: threshold_secs.max(0) as u64,
            registered_at,
        });
    }

    Ok(ScheduleRegistrations {
        daily_interval,
        usage_watches,
    })
}

fn pending_from_row((target, hint, at_ms): (Vec<u8>, String, i64)) -> Option<PendingRequest> {
    match DateTime::from_timestamp_millis(at_ms) {
        Some(requested_at) => Some(PendingRequest {
            target: RestrictionTarget::from_bytes(target),
            hint,
            requested_at,
        }),
        None => {
            tracing::warn!(at_ms, "dropping pending request with invalid timestamp");
            None
        }
    }
}

fn get_kv(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    let value = conn
        .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get::<_, String>(0)
        })
        .optional()?;
    Ok(value)
}

fn put_kv(conn: &Connection, key: &str, value: &str, at_ms: i64) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO kv (key, value, updated_at_ms) VALUES (?1, ?2, ?3)",
        params![key, value, at_ms],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetKind;

    fn t(s: &str) -> RestrictionTarget {
        RestrictionTarget::from_bytes(s.as_bytes())
    }

    fn sample() -> RestrictionSelection {
        RestrictionSelection::new()
            .with(TargetKind::App, t("appA"))
            .with(TargetKind::Domain, t("example"))
    }

    #[test]
    fn load_without_save_is_empty() {
        let store = SharedStore::open_memory().unwrap();
        assert!(store.load_selection().unwrap().is_empty());
    }

    #[test]
    fn save_then_load() {
        let store = SharedStore::open_memory().unwrap();
        store.save_selection(&sample()).unwrap();
        assert_eq!(store.load_selection().unwrap(), sample());

        store.save_selection(&RestrictionSelection::new()).unwrap();
        assert!(store.load_selection().unwrap().is_empty());
    }

    #[test]
    fn corrupt_selection_fails_open_by_default() {
        let store = SharedStore::open_memory().unwrap();
        store.save_selection(&sample()).unwrap();
        store.kv_set(SELECTION_KEY, "{not json").unwrap();
        assert!(store.load_selection().unwrap().is_empty());
    }

    #[test]
    fn corrupt_selection_fails_closed_to_last_good() {
        let store = SharedStore::open_memory()
            .unwrap()
            .with_decode_failure(DecodeFailurePolicy::FailClosed);
        store.save_selection(&sample()).unwrap();
        let newer = sample().with(TargetKind::App, t("appB"));
        store.save_selection(&newer).unwrap();
        store.kv_set(SELECTION_KEY, "{not json").unwrap();

        // The backup is the payload replaced by the most recent save.
        assert_eq!(store.load_selection().unwrap(), sample());
    }

    #[test]
    fn corrupt_payload_is_never_promoted_to_backup() {
        let store = SharedStore::open_memory()
            .unwrap()
            .with_decode_failure(DecodeFailurePolicy::FailClosed);
        store.save_selection(&sample()).unwrap();
        store.save_selection(&sample()).unwrap();
        store.kv_set(SELECTION_KEY, "garbage").unwrap();
        store.save_selection(&RestrictionSelection::new()).unwrap();
        store.kv_set(SELECTION_KEY, "garbage").unwrap();

        assert_eq!(store.load_selection().unwrap(), sample());
    }

    #[test]
    fn pending_request_is_read_once() {
        let store = SharedStore::open_memory().unwrap();
        assert!(store.consume_pending_request().unwrap().is_none());

        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        store.publish_pending_request(&t("appA"), "Video app", at).unwrap();
        assert!(store.peek_pending_request().unwrap().is_some());

        let taken = store.consume_pending_request().unwrap().unwrap();
        assert_eq!(taken.target, t("appA"));
        assert_eq!(taken.hint, "Video app");
        assert_eq!(taken.requested_at, at);
        assert!(store.consume_pending_request().unwrap().is_none());
    }

    #[test]
    fn newer_request_overwrites_unconsumed_one() {
        let store = SharedStore::open_memory().unwrap();
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        store.publish_pending_request(&t("appA"), "", at).unwrap();
        store.publish_pending_request(&t("appB"), "", at).unwrap();
        assert_eq!(store.consume_pending_request().unwrap().unwrap().target, t("appB"));
        assert!(store.consume_pending_request().unwrap().is_none());
    }

    #[test]
    fn schedule_change_replaces_watch_per_target() {
        let store = SharedStore::open_memory().unwrap();
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        for threshold_secs in [900, 600] {
            let watch = UsageThresholdWatch {
                target: t("appA"),
                threshold_secs,
                registered_at: at,
            };
            store
                .update_schedule(ScheduleChange::Watch(&watch), |_| Ok::<_, StoreError>(()))
                .unwrap();
        }
        let regs = store.schedule().unwrap();
        assert!(regs.daily_interval.is_none());
        assert_eq!(regs.usage_watches.len(), 1);
        assert_eq!(regs.usage_watches[0].threshold_secs, 600);

        store
            .update_schedule(ScheduleChange::Unwatch(&t("appA")), |_| Ok::<_, StoreError>(()))
            .unwrap();
        assert!(store.schedule().unwrap().usage_watches.is_empty());
    }

    #[test]
    fn failed_publish_rolls_back_schedule_change() {
        let store = SharedStore::open_memory().unwrap();
        let watch = UsageThresholdWatch {
            target: t("appA"),
            threshold_secs: 60,
            registered_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };
        let result = store.update_schedule(ScheduleChange::Watch(&watch), |regs| {
            assert_eq!(regs.usage_watches.len(), 1);
            Err(StoreError::Locked)
        });
        assert!(result.is_err());
        assert!(store.schedule().unwrap().usage_watches.is_empty());
    }
}

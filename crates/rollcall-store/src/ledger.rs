//! Attendance ledger — per (identity, date) first-seen / last-seen records.
//!
//! The only transition is `mark_seen`: first recognition of the day creates
//! the record with `intime = outtime = t`; every later recognition that day
//! overwrites `outtime`. Records are never deleted.

use crate::store::{Store, StoreError};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

/// One ledger row. Dates are `%Y-%m-%d`, times `%H:%M:%S` wall clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    pub name: String,
    pub date: String,
    pub intime: String,
    pub outtime: String,
}

impl Store {
    /// Record that `name` was seen at `time` on `date`.
    ///
    /// A single upsert: the create-vs-update branch is resolved inside
    /// SQLite, so concurrent sightings of the same identity on the same day
    /// cannot produce duplicate rows. `intime` is written once and never
    /// changed; `outtime` is overwritten unconditionally — no ordering
    /// validation against the previous value.
    pub fn mark_seen(&self, name: &str, date: &str, time: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO attendance (name, date, intime, outtime) VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT (name, date) DO UPDATE SET outtime = excluded.outtime",
            params![name, date, time],
        )?;
        Ok(())
    }

    pub fn get_record(&self, name: &str, date: &str) -> Result<Option<AttendanceRecord>, StoreError> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT name, date, intime, outtime FROM attendance
                 WHERE name = ?1 AND date = ?2",
                params![name, date],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Number of identities with a ledger row on the given date.
    pub fn present_count(&self, date: &str) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM attendance WHERE date = ?1",
            params![date],
            |row| row.get(0),
        )?)
    }

    /// Per-day row counts for the seven given dates (Monday..Sunday of one
    /// week). Rows outside the window are excluded by date-string
    /// comparison; days without rows count zero.
    pub fn week_counts(&self, dates: &[String; 7]) -> Result<[i64; 7], StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT date, COUNT(*) FROM attendance
             WHERE date >= ?1 AND date <= ?2 GROUP BY date",
        )?;
        let rows = stmt.query_map(params![dates[0], dates[6]], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = [0i64; 7];
        for row in rows {
            let (date, count) = row?;
            if let Some(slot) = dates.iter().position(|d| *d == date) {
                counts[slot] = count;
            }
        }
        Ok(counts)
    }

    /// Enrolled names with no ledger row on the given date, in name order.
    /// Together with the present set this partitions the enrolled set.
    pub fn absent_names(&self, date: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM identities
             WHERE name NOT IN (SELECT name FROM attendance WHERE date = ?1)
             ORDER BY name",
        )?;
        let rows = stmt.query_map(params![date], |row| row.get::<_, String>(0))?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    /// Every ledger row, ordered by date then name. Feeds the CSV export.
    pub fn all_records(&self) -> Result<Vec<AttendanceRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT name, date, intime, outtime FROM attendance ORDER BY date, name",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        name: row.get(0)?,
        date: row.get(1)?,
        intime: row.get(2)?,
        outtime: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::{Embedding, Identity, EMBEDDING_DIM};

    fn enroll(store: &Store, name: &str) {
        store
            .insert_identity(&Identity {
                name: name.into(),
                mobile: None,
                email: None,
                embedding: Embedding { values: vec![0.0; EMBEDDING_DIM] },
            })
            .unwrap();
    }

    #[test]
    fn first_sighting_sets_both_times() {
        let store = Store::open_in_memory().unwrap();
        store.mark_seen("alice", "2026-08-24", "09:00:00").unwrap();

        let record = store.get_record("alice", "2026-08-24").unwrap().unwrap();
        assert_eq!(record.intime, "09:00:00");
        assert_eq!(record.outtime, "09:00:00");
    }

    #[test]
    fn later_sighting_updates_only_outtime() {
        let store = Store::open_in_memory().unwrap();
        store.mark_seen("alice", "2026-08-24", "09:00:00").unwrap();
        store.mark_seen("alice", "2026-08-24", "17:00:00").unwrap();

        let record = store.get_record("alice", "2026-08-24").unwrap().unwrap();
        assert_eq!(record.intime, "09:00:00");
        assert_eq!(record.outtime, "17:00:00");
        assert_eq!(store.present_count("2026-08-24").unwrap(), 1);
    }

    #[test]
    fn out_of_order_time_still_overwrites() {
        let store = Store::open_in_memory().unwrap();
        store.mark_seen("alice", "2026-08-24", "17:00:00").unwrap();
        store.mark_seen("alice", "2026-08-24", "09:00:00").unwrap();

        let record = store.get_record("alice", "2026-08-24").unwrap().unwrap();
        assert_eq!(record.intime, "17:00:00");
        assert_eq!(record.outtime, "09:00:00");
    }

    #[test]
    fn new_date_creates_new_record() {
        let store = Store::open_in_memory().unwrap();
        store.mark_seen("alice", "2026-08-24", "09:00:00").unwrap();
        store.mark_seen("alice", "2026-08-25", "08:30:00").unwrap();

        let monday = store.get_record("alice", "2026-08-24").unwrap().unwrap();
        assert_eq!(monday.outtime, "09:00:00");
        let tuesday = store.get_record("alice", "2026-08-25").unwrap().unwrap();
        assert_eq!(tuesday.intime, "08:30:00");
        assert_eq!(store.all_records().unwrap().len(), 2);
    }

    #[test]
    fn week_counts_fills_empty_days_with_zero() {
        let store = Store::open_in_memory().unwrap();
        // Monday and Wednesday of the week starting 2026-08-24
        store.mark_seen("alice", "2026-08-24", "09:00:00").unwrap();
        store.mark_seen("bob", "2026-08-26", "10:00:00").unwrap();
        // Outside the window
        store.mark_seen("alice", "2026-08-31", "09:00:00").unwrap();

        let dates: [String; 7] = std::array::from_fn(|i| format!("2026-08-{:02}", 24 + i));
        let counts = store.week_counts(&dates).unwrap();
        assert_eq!(counts, [1, 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn week_counts_sum_matches_rows_in_window() {
        let store = Store::open_in_memory().unwrap();
        store.mark_seen("alice", "2026-08-24", "09:00:00").unwrap();
        store.mark_seen("bob", "2026-08-24", "09:05:00").unwrap();
        store.mark_seen("alice", "2026-08-28", "09:00:00").unwrap();

        let dates: [String; 7] = std::array::from_fn(|i| format!("2026-08-{:02}", 24 + i));
        let counts = store.week_counts(&dates).unwrap();
        assert_eq!(counts.iter().sum::<i64>(), 3);
    }

    #[test]
    fn absent_and_present_partition_the_enrolled_set() {
        let store = Store::open_in_memory().unwrap();
        enroll(&store, "alice");
        enroll(&store, "bob");
        enroll(&store, "carol");
        store.mark_seen("bob", "2026-08-24", "09:00:00").unwrap();

        let absent = store.absent_names("2026-08-24").unwrap();
        assert_eq!(absent, vec!["alice", "carol"]);
        assert_eq!(
            absent.len() as i64 + store.present_count("2026-08-24").unwrap(),
            store.enrolled_count().unwrap()
        );
    }

    #[test]
    fn all_records_ordered_by_date_then_name() {
        let store = Store::open_in_memory().unwrap();
        store.mark_seen("zoe", "2026-08-24", "09:00:00").unwrap();
        store.mark_seen("anna", "2026-08-24", "09:10:00").unwrap();
        store.mark_seen("bob", "2026-08-23", "09:00:00").unwrap();

        let keys: Vec<(String, String)> = store
            .all_records()
            .unwrap()
            .into_iter()
            .map(|r| (r.date, r.name))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("2026-08-23".into(), "bob".into()),
                ("2026-08-24".into(), "anna".into()),
                ("2026-08-24".into(), "zoe".into()),
            ]
        );
    }
}

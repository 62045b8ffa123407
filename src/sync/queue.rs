use std::path::Path;

use rusqlite::{params, params_from_iter, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::ingest::{
    DistanceEventPayload, HrSamplePayload, Spo2SamplePayload, StepsEventPayload,
};
use crate::sync::SyncError;

const PENDING_TABLES: [&str; 4] = [
    "pending_steps",
    "pending_distance",
    "pending_hr",
    "pending_spo2",
];

/// Device-local durable queue of samples not yet acknowledged by the
/// server. Entries are keyed by the same record identity the server dedups
/// on, so re-capturing the same platform record never queues it twice, and
/// a replayed upload can never double-count.
pub struct OfflineQueue {
    conn: Connection,
}

impl OfflineQueue {
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, SyncError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, SyncError> {
        for table in PENDING_TABLES {
            conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                         record_uid TEXT PRIMARY KEY,
                         payload TEXT NOT NULL
                     )"
                ),
                [],
            )?;
        }
        Ok(OfflineQueue { conn })
    }

    /// Queue a sample; returns false when an entry with the same record
    /// identity is already pending.
    pub fn enqueue_steps(&self, item: &StepsEventPayload) -> Result<bool, SyncError> {
        self.enqueue_in("pending_steps", &item.record_uid, item)
    }

    pub fn enqueue_distance(&self, item: &DistanceEventPayload) -> Result<bool, SyncError> {
        self.enqueue_in("pending_distance", &item.record_uid, item)
    }

    pub fn enqueue_hr(&self, item: &HrSamplePayload) -> Result<bool, SyncError> {
        self.enqueue_in("pending_hr", &item.record_uid, item)
    }

    pub fn enqueue_spo2(&self, item: &Spo2SamplePayload) -> Result<bool, SyncError> {
        self.enqueue_in("pending_spo2", &item.record_uid, item)
    }

    pub fn pending_steps(&self, limit: usize) -> Result<Vec<StepsEventPayload>, SyncError> {
        self.pending_in("pending_steps", limit)
    }

    pub fn pending_distance(&self, limit: usize) -> Result<Vec<DistanceEventPayload>, SyncError> {
        self.pending_in("pending_distance", limit)
    }

    pub fn pending_hr(&self, limit: usize) -> Result<Vec<HrSamplePayload>, SyncError> {
        self.pending_in("pending_hr", limit)
    }

    pub fn pending_spo2(&self, limit: usize) -> Result<Vec<Spo2SamplePayload>, SyncError> {
        self.pending_in("pending_spo2", limit)
    }

    /// Delete exactly the given confirmed-delivered entries.
    pub fn delete_steps(&self, uids: &[String]) -> Result<usize, SyncError> {
        self.delete_in("pending_steps", uids)
    }

    pub fn delete_distance(&self, uids: &[String]) -> Result<usize, SyncError> {
        self.delete_in("pending_distance", uids)
    }

    pub fn delete_hr(&self, uids: &[String]) -> Result<usize, SyncError> {
        self.delete_in("pending_hr", uids)
    }

    pub fn delete_spo2(&self, uids: &[String]) -> Result<usize, SyncError> {
        self.delete_in("pending_spo2", uids)
    }

    /// Total entries across all pending tables.
    pub fn pending_total(&self) -> Result<u64, SyncError> {
        let mut total = 0u64;
        for table in PENDING_TABLES {
            let count: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?;
            total += count as u64;
        }
        Ok(total)
    }

    fn enqueue_in<T: Serialize>(
        &self,
        table: &str,
        record_uid: &str,
        item: &T,
    ) -> Result<bool, SyncError> {
        let payload = serde_json::to_string(item)?;
        let inserted = self.conn.execute(
            &format!("INSERT OR IGNORE INTO {table} (record_uid, payload) VALUES (?1, ?2)"),
            params![record_uid, payload],
        )?;
        Ok(inserted > 0)
    }

    fn pending_in<T: DeserializeOwned>(
        &self,
        table: &str,
        limit: usize,
    ) -> Result<Vec<T>, SyncError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT payload FROM {table} ORDER BY record_uid LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;
        let mut items = Vec::new();
        for payload in rows {
            items.push(serde_json::from_str(&payload?)?);
        }
        Ok(items)
    }

    fn delete_in(&self, table: &str, uids: &[String]) -> Result<usize, SyncError> {
        if uids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; uids.len()].join(",");
        let deleted = self.conn.execute(
            &format!("DELETE FROM {table} WHERE record_uid IN ({placeholders})"),
            params_from_iter(uids.iter()),
        )?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn steps_item(record_uid: &str) -> StepsEventPayload {
        StepsEventPayload {
            patient_id: Some(Uuid::new_v4()),
            origin_id: "android_health_connect".into(),
            device_id: "pixel-8".into(),
            start_ts: "2025-03-01T10:00:00.000Z".into(),
            end_ts: "2025-03-01T10:05:00.000Z".into(),
            count: 50,
            record_uid: record_uid.into(),
            tz_offset_min: 480,
            first_name: None,
            last_name: None,
            date_of_birth: None,
        }
    }

    #[test]
    fn enqueue_is_keyed_by_record_identity() {
        let queue = OfflineQueue::open_in_memory().unwrap();
        assert!(queue.enqueue_steps(&steps_item("uid-1")).unwrap());
        assert!(!queue.enqueue_steps(&steps_item("uid-1")).unwrap());
        assert!(queue.enqueue_steps(&steps_item("uid-2")).unwrap());
        assert_eq!(queue.pending_total().unwrap(), 2);
    }

    #[test]
    fn delete_removes_only_the_given_uids() {
        let queue = OfflineQueue::open_in_memory().unwrap();
        queue.enqueue_steps(&steps_item("uid-1")).unwrap();
        queue.enqueue_steps(&steps_item("uid-2")).unwrap();
        queue.enqueue_steps(&steps_item("uid-3")).unwrap();
        let deleted = queue
            .delete_steps(&["uid-1".to_string(), "uid-3".to_string()])
            .unwrap();
        assert_eq!(deleted, 2);
        let left = queue.pending_steps(10).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].record_uid, "uid-2");
    }

    #[test]
    fn payload_round_trips_through_the_queue() {
        let queue = OfflineQueue::open_in_memory().unwrap();
        let item = steps_item("uid-1");
        queue.enqueue_steps(&item).unwrap();
        let loaded = queue.pending_steps(10).unwrap();
        assert_eq!(loaded[0].count, item.count);
        assert_eq!(loaded[0].start_ts, item.start_ts);
        assert_eq!(loaded[0].patient_id, item.patient_id);
    }
}

use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::ingest::{
    DistanceEventPayload, HrSamplePayload, Spo2SamplePayload, StepsEventPayload,
};
use crate::sync::client::IngestClient;
use crate::sync::identity;
use crate::sync::queue::OfflineQueue;
use crate::sync::SyncError;

/// Heart-rate uploads are chunked: one night of wrist data can run to
/// thousands of samples, and per-chunk acknowledgement keeps a partial
/// failure from re-uploading what already landed.
const DEFAULT_HR_CHUNK_SIZE: usize = 200;
/// Pending-entry count at which a capacity warning is logged. Entries never
/// expire (eventual delivery beats bounded storage), so the warning is the
/// only backpressure signal.
const DEFAULT_QUEUE_WARN_THRESHOLD: u64 = 10_000;

/// Who the captured samples belong to and where they came from.
#[derive(Debug, Clone)]
pub struct SyncIdentity {
    pub patient_id: Uuid,
    pub origin_id: String,
    pub device_id: String,
}

#[derive(Debug, Clone, Copy)]
pub struct IntervalReading {
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub value: f64,
    pub tz_offset_min: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct InstantReading {
    pub ts: DateTime<Utc>,
    pub value: f64,
    pub tz_offset_min: i32,
}

/// Capability handle over the platform health store (Health Connect on the
/// real device). Injected so the sync loop can be driven by a fake in
/// tests.
pub trait HealthSource {
    fn steps(&self) -> Vec<IntervalReading>;
    fn distance(&self) -> Vec<IntervalReading>;
    fn heart_rate(&self) -> Vec<InstantReading>;
    fn spo2(&self) -> Vec<InstantReading>;
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct CaptureSummary {
    pub queued: usize,
    pub already_pending: usize,
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct MetricDrainOutcome {
    pub delivered: usize,
    pub failed: usize,
}

/// Per-metric success/failure counts for one drain pass, so callers can
/// surface partial sync outcomes instead of a single opaque pass/fail.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct DrainReport {
    pub steps: MetricDrainOutcome,
    pub distance: MetricDrainOutcome,
    pub heart_rate: MetricDrainOutcome,
    pub spo2: MetricDrainOutcome,
}

impl DrainReport {
    pub fn delivered(&self) -> usize {
        self.steps.delivered
            + self.distance.delivered
            + self.heart_rate.delivered
            + self.spo2.delivered
    }

    pub fn failed(&self) -> usize {
        self.steps.failed + self.distance.failed + self.heart_rate.failed + self.spo2.failed
    }
}

/// Owns the offline queue and the upload client. Captured samples go into
/// the queue first; `drain` opportunistically pushes them to the server and
/// deletes exactly what was acknowledged.
pub struct SyncAgent {
    queue: Mutex<OfflineQueue>,
    client: IngestClient,
    drain_gate: tokio::sync::Mutex<()>,
    hr_chunk_size: usize,
    queue_warn_threshold: u64,
}

impl SyncAgent {
    pub fn new(queue: OfflineQueue, client: IngestClient) -> Self {
        SyncAgent {
            queue: Mutex::new(queue),
            client,
            drain_gate: tokio::sync::Mutex::new(()),
            hr_chunk_size: DEFAULT_HR_CHUNK_SIZE,
            queue_warn_threshold: DEFAULT_QUEUE_WARN_THRESHOLD,
        }
    }

    pub fn with_hr_chunk_size(mut self, chunk_size: usize) -> Self {
        self.hr_chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_queue_warn_threshold(mut self, threshold: u64) -> Self {
        self.queue_warn_threshold = threshold;
        self
    }

    /// Read the platform store and queue everything it returns. Re-capture
    /// of already-pending records is a no-op thanks to the record-identity
    /// key.
    pub fn capture<S: HealthSource>(
        &self,
        source: &S,
        who: &SyncIdentity,
    ) -> Result<CaptureSummary, SyncError> {
        let queue = self.queue.lock().expect("offline queue lock poisoned");
        let mut summary = CaptureSummary::default();

        for reading in source.steps() {
            let start_ts = wire_ts(reading.start_ts);
            let end_ts = wire_ts(reading.end_ts);
            let count = reading.value.round() as i64;
            let item = StepsEventPayload {
                patient_id: Some(who.patient_id),
                origin_id: who.origin_id.clone(),
                device_id: who.device_id.clone(),
                record_uid: identity::steps_record_uid(
                    who.patient_id,
                    &who.origin_id,
                    &who.device_id,
                    &start_ts,
                    &end_ts,
                    count,
                ),
                start_ts,
                end_ts,
                count,
                tz_offset_min: reading.tz_offset_min,
                first_name: None,
                last_name: None,
                date_of_birth: None,
            };
            tally(&mut summary, queue.enqueue_steps(&item)?);
        }

        for reading in source.distance() {
            let start_ts = wire_ts(reading.start_ts);
            let end_ts = wire_ts(reading.end_ts);
            let item = DistanceEventPayload {
                patient_id: Some(who.patient_id),
                origin_id: who.origin_id.clone(),
                device_id: who.device_id.clone(),
                record_uid: identity::distance_record_uid(
                    who.patient_id,
                    &who.origin_id,
                    &who.device_id,
                    &start_ts,
                    &end_ts,
                    reading.value,
                ),
                start_ts,
                end_ts,
                meters: reading.value,
                tz_offset_min: reading.tz_offset_min,
                first_name: None,
                last_name: None,
                date_of_birth: None,
            };
            tally(&mut summary, queue.enqueue_distance(&item)?);
        }

        for reading in source.heart_rate() {
            let time_ts = wire_ts(reading.ts);
            let item = HrSamplePayload {
                patient_id: Some(who.patient_id),
                origin_id: who.origin_id.clone(),
                device_id: who.device_id.clone(),
                record_uid: identity::hr_record_uid(
                    who.patient_id,
                    &who.origin_id,
                    &who.device_id,
                    &time_ts,
                    reading.value,
                ),
                time_ts,
                bpm: reading.value,
                tz_offset_min: reading.tz_offset_min,
                first_name: None,
                last_name: None,
                date_of_birth: None,
            };
            tally(&mut summary, queue.enqueue_hr(&item)?);
        }

        for reading in source.spo2() {
            let time_ts = wire_ts(reading.ts);
            let item = Spo2SamplePayload {
                patient_id: Some(who.patient_id),
                origin_id: who.origin_id.clone(),
                device_id: who.device_id.clone(),
                record_uid: identity::spo2_record_uid(
                    who.patient_id,
                    &who.origin_id,
                    &who.device_id,
                    &time_ts,
                    reading.value,
                ),
                time_ts,
                spo2_pct: reading.value,
                tz_offset_min: reading.tz_offset_min,
                first_name: None,
                last_name: None,
                date_of_birth: None,
            };
            tally(&mut summary, queue.enqueue_spo2(&item)?);
        }

        let pending = queue.pending_total()?;
        if pending >= self.queue_warn_threshold {
            tracing::warn!(pending, "offline queue is nearing capacity");
        }
        Ok(summary)
    }

    /// Upload up to `batch_size` pending entries per metric. At most one
    /// drain runs at a time; entries are deleted only after the server
    /// acknowledged their chunk, and failed chunks stay queued for the next
    /// pass.
    pub async fn drain(&self, batch_size: usize) -> Result<DrainReport, SyncError> {
        let _in_flight = self.drain_gate.lock().await;
        let mut report = DrainReport::default();

        let pending = {
            let queue = self.queue.lock().expect("offline queue lock poisoned");
            queue.pending_steps(batch_size)?
        };
        if !pending.is_empty() {
            match self.client.post_steps(&pending).await {
                Ok(_) => {
                    let uids: Vec<String> =
                        pending.iter().map(|i| i.record_uid.clone()).collect();
                    self.queue
                        .lock()
                        .expect("offline queue lock poisoned")
                        .delete_steps(&uids)?;
                    report.steps.delivered = pending.len();
                }
                Err(e) => {
                    tracing::warn!("steps upload failed, keeping entries queued: {}", e);
                    report.steps.failed = pending.len();
                }
            }
        }

        let pending = {
            let queue = self.queue.lock().expect("offline queue lock poisoned");
            queue.pending_distance(batch_size)?
        };
        if !pending.is_empty() {
            match self.client.post_distance(&pending).await {
                Ok(_) => {
                    let uids: Vec<String> =
                        pending.iter().map(|i| i.record_uid.clone()).collect();
                    self.queue
                        .lock()
                        .expect("offline queue lock poisoned")
                        .delete_distance(&uids)?;
                    report.distance.delivered = pending.len();
                }
                Err(e) => {
                    tracing::warn!("distance upload failed, keeping entries queued: {}", e);
                    report.distance.failed = pending.len();
                }
            }
        }

        let pending = {
            let queue = self.queue.lock().expect("offline queue lock poisoned");
            queue.pending_hr(batch_size)?
        };
        for chunk in pending.chunks(self.hr_chunk_size) {
            match self.client.post_hr(chunk).await {
                Ok(_) => {
                    let uids: Vec<String> = chunk.iter().map(|i| i.record_uid.clone()).collect();
                    self.queue
                        .lock()
                        .expect("offline queue lock poisoned")
                        .delete_hr(&uids)?;
                    report.heart_rate.delivered += chunk.len();
                }
                Err(e) => {
                    tracing::warn!("heart rate chunk failed, keeping entries queued: {}", e);
                    report.heart_rate.failed += chunk.len();
                }
            }
        }

        let pending = {
            let queue = self.queue.lock().expect("offline queue lock poisoned");
            queue.pending_spo2(batch_size)?
        };
        if !pending.is_empty() {
            match self.client.post_spo2(&pending).await {
                Ok(_) => {
                    let uids: Vec<String> =
                        pending.iter().map(|i| i.record_uid.clone()).collect();
                    self.queue
                        .lock()
                        .expect("offline queue lock poisoned")
                        .delete_spo2(&uids)?;
                    report.spo2.delivered = pending.len();
                }
                Err(e) => {
                    tracing::warn!("SpO2 upload failed, keeping entries queued: {}", e);
                    report.spo2.failed = pending.len();
                }
            }
        }

        Ok(report)
    }

    pub fn pending_total(&self) -> Result<u64, SyncError> {
        self.queue
            .lock()
            .expect("offline queue lock poisoned")
            .pending_total()
    }
}

fn wire_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn tally(summary: &mut CaptureSummary, queued: bool) {
    if queued {
        summary.queued += 1;
    } else {
        summary.already_pending += 1;
    }
}

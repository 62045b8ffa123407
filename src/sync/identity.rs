use uuid::Uuid;

/// Record identity derivation. The concatenation order and field choice are
/// part of the wire contract: the server dedups on these exact strings, so
/// the client and any replays must produce them bit-exactly. Timestamps are
/// the RFC 3339 strings carried on the wire.
pub fn steps_record_uid(
    patient_id: Uuid,
    origin_id: &str,
    device_id: &str,
    start_ts: &str,
    end_ts: &str,
    count: i64,
) -> String {
    format!("{patient_id}|{origin_id}|{device_id}|{start_ts}|{end_ts}|{count}")
}

pub fn distance_record_uid(
    patient_id: Uuid,
    origin_id: &str,
    device_id: &str,
    start_ts: &str,
    end_ts: &str,
    meters: f64,
) -> String {
    format!("{patient_id}|{origin_id}|{device_id}|{start_ts}|{end_ts}|{meters}")
}

pub fn hr_record_uid(
    patient_id: Uuid,
    origin_id: &str,
    device_id: &str,
    time_ts: &str,
    bpm: f64,
) -> String {
    format!("{patient_id}|{origin_id}|{device_id}|{time_ts}|{bpm}")
}

pub fn spo2_record_uid(
    patient_id: Uuid,
    origin_id: &str,
    device_id: &str,
    time_ts: &str,
    spo2_pct: f64,
) -> String {
    format!("{patient_id}|{origin_id}|{device_id}|{time_ts}|{spo2_pct}")
}

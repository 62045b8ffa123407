use std::net::TcpListener;

use once_cell::sync::Lazy;
use serde_json::json;
use uuid::Uuid;

use cardiolink_backend::run;
use cardiolink_backend::storage::Storage;
use cardiolink_backend::telemetry::{get_subscriber, init_subscriber};

// Ensure that the `tracing` stack is only initialised once using `once_cell`
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_subscriber(subscriber);
    } else {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_subscriber(subscriber);
    }
});

pub struct TestApp {
    pub address: String,
    pub storage: Storage,
}

pub async fn spawn_app() -> TestApp {
    Lazy::force(&TRACING);

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let storage = Storage::memory();
    let server = run(listener, storage.clone()).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp { address, storage }
}

/// Register an account with role `patient` in the auth directory and return
/// its id.
pub async fn seed_patient_account(app: &TestApp) -> Uuid {
    let patient_id = Uuid::new_v4();
    app.storage
        .upsert_account(patient_id, "patient")
        .await
        .expect("Failed to seed patient account");
    patient_id
}

pub fn steps_event(
    patient_id: Uuid,
    start_ts: &str,
    end_ts: &str,
    count: i64,
    tz_offset_min: i32,
) -> serde_json::Value {
    let record_uid = cardiolink_backend::sync::identity::steps_record_uid(
        patient_id,
        "android_health_connect",
        "pixel-8",
        start_ts,
        end_ts,
        count,
    );
    json!({
        "patientId": patient_id,
        "originId": "android_health_connect",
        "deviceId": "pixel-8",
        "startTs": start_ts,
        "endTs": end_ts,
        "count": count,
        "recordUid": record_uid,
        "tzOffsetMin": tz_offset_min,
    })
}

pub fn hr_sample(patient_id: Uuid, time_ts: &str, bpm: f64, tz_offset_min: i32) -> serde_json::Value {
    let record_uid = cardiolink_backend::sync::identity::hr_record_uid(
        patient_id,
        "android_health_connect",
        "pixel-8",
        time_ts,
        bpm,
    );
    json!({
        "patientId": patient_id,
        "originId": "android_health_connect",
        "deviceId": "pixel-8",
        "timeTs": time_ts,
        "bpm": bpm,
        "recordUid": record_uid,
        "tzOffsetMin": tz_offset_min,
    })
}

pub fn spo2_sample(
    patient_id: Uuid,
    time_ts: &str,
    spo2_pct: f64,
    tz_offset_min: i32,
) -> serde_json::Value {
    let record_uid = cardiolink_backend::sync::identity::spo2_record_uid(
        patient_id,
        "android_health_connect",
        "pixel-8",
        time_ts,
        spo2_pct,
    );
    json!({
        "patientId": patient_id,
        "originId": "android_health_connect",
        "deviceId": "pixel-8",
        "timeTs": time_ts,
        "spo2Pct": spo2_pct,
        "recordUid": record_uid,
        "tzOffsetMin": tz_offset_min,
    })
}

pub fn distance_event(
    patient_id: Uuid,
    start_ts: &str,
    end_ts: &str,
    meters: f64,
    tz_offset_min: i32,
) -> serde_json::Value {
    let record_uid = cardiolink_backend::sync::identity::distance_record_uid(
        patient_id,
        "android_health_connect",
        "pixel-8",
        start_ts,
        end_ts,
        meters,
    );
    json!({
        "patientId": patient_id,
        "originId": "android_health_connect",
        "deviceId": "pixel-8",
        "startTs": start_ts,
        "endTs": end_ts,
        "meters": meters,
        "recordUid": record_uid,
        "tzOffsetMin": tz_offset_min,
    })
}

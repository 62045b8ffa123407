use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde_json::json;
use uuid::Uuid;

mod common;
use common::utils::{hr_sample, seed_patient_account, spawn_app, spo2_sample, steps_event};

use cardiolink_backend::aggregate::bucket::{BucketDay, BucketHour};
use cardiolink_backend::models::vitals::{MetricKind, RawSampleRow, StatDayRow, StatHourRow, StatMetric};

#[tokio::test]
async fn summary_returns_latest_aggregates_and_sync_timestamp() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = seed_patient_account(&app).await;

    let hr_batch = json!([
        hr_sample(patient_id, "2025-03-01T08:00:00.000Z", 60.0, 0),
        hr_sample(patient_id, "2025-03-01T08:10:00.000Z", 63.0, 0),
    ]);
    client
        .post(format!("{}/ingest/hr-samples", app.address))
        .json(&hr_batch)
        .send()
        .await
        .expect("Failed to ingest heart rate");

    let steps_batch = json!([steps_event(
        patient_id,
        "2025-03-01T09:00:00.000Z",
        "2025-03-01T09:30:00.000Z",
        1200,
        0
    )]);
    client
        .post(format!("{}/ingest/steps-events", app.address))
        .json(&steps_batch)
        .send()
        .await
        .expect("Failed to ingest steps");

    client
        .post(format!("{}/patient/bp-readings", app.address))
        .json(&json!({
            "patientId": patient_id,
            "systolic": 128,
            "diastolic": 82,
            "pulse": 66,
        }))
        .send()
        .await
        .expect("Failed to add BP reading");

    let response = client
        .get(format!(
            "{}/patient/summary?patientId={}",
            app.address, patient_id
        ))
        .send()
        .await
        .expect("Failed to fetch summary");
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    let summary = &body["summary"];

    assert_eq!(summary["heartRate"], 62); // round(123 / 2) = 62
    assert_eq!(summary["stepsToday"], 1200);
    assert_eq!(summary["bpSystolic"], 128);
    assert_eq!(summary["bpDiastolic"], 82);
    assert_eq!(summary["bpPulse"], 66);
    // Sync status carries the max observation timestamp seen in a batch.
    assert_eq!(summary["lastSyncTs"], "2025-03-01T09:30:00.000Z");
}

#[tokio::test]
async fn summary_infers_last_sync_from_raw_rows_when_no_status_exists() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = Uuid::new_v4();

    // Seed a raw row directly, bypassing the pipeline (and its sync-status
    // upsert), as for data that predates sync-status tracking.
    let ts = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
    let row = RawSampleRow {
        record_uid: "legacy-row".into(),
        patient_id,
        origin_id: "android_health_connect".into(),
        device_id: "pixel-8".into(),
        start_ts: None,
        sample_ts: ts,
        tz_offset_min: 0,
        value: 61.0,
        hour_bucket: BucketHour::from_utc(ts, 0),
        day_bucket: BucketDay::from_utc(ts, 0),
    };
    app.storage
        .insert_raw_ignore_duplicates(MetricKind::HeartRate, &[row])
        .await
        .unwrap();

    let response = client
        .get(format!(
            "{}/patient/summary?patientId={}",
            app.address, patient_id
        ))
        .send()
        .await
        .expect("Failed to fetch summary");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["summary"]["lastSyncTs"], "2025-03-01T08:00:00.000Z");
}

#[tokio::test]
async fn hourly_series_returns_local_hour_buckets_for_the_requested_day() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = seed_patient_account(&app).await;

    // 23:30Z at +08:00 belongs to the 07:00 bucket of the NEXT local day.
    let batch = json!([
        hr_sample(patient_id, "2025-03-01T23:30:00.000Z", 60.0, 480),
        spo2_sample(patient_id, "2025-03-01T23:40:00.000Z", 97.5, 480),
        spo2_sample(patient_id, "2025-03-01T23:50:00.000Z", 96.25, 480),
    ]);
    client
        .post(format!("{}/ingest/hr-samples", app.address))
        .json(&json!([batch[0]]))
        .send()
        .await
        .expect("Failed to ingest heart rate");
    client
        .post(format!("{}/ingest/spo2-samples", app.address))
        .json(&json!([batch[1], batch[2]]))
        .send()
        .await
        .expect("Failed to ingest SpO2");

    let response = client
        .get(format!(
            "{}/patient/vitals?patientId={}&period=hourly&date=2025-03-02&tzOffsetMin=480",
            app.address, patient_id
        ))
        .send()
        .await
        .expect("Failed to fetch vitals");
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();

    let hr = body["hr"].as_array().unwrap();
    assert_eq!(hr.len(), 1);
    assert_eq!(hr[0]["time"], "2025-03-02T07:00:00.000Z");
    assert_eq!(hr[0]["avg"], 60);

    let spo2 = body["spo2"].as_array().unwrap();
    assert_eq!(spo2.len(), 1);
    assert_eq!(spo2[0]["min"], 96.25);
    assert_eq!(spo2[0]["avg"], 96.9); // (97.5 + 96.25) / 2, one decimal
    assert_eq!(spo2[0]["max"], 97.5);

    // The previous local day must be empty.
    let response = client
        .get(format!(
            "{}/patient/vitals?patientId={}&period=hourly&date=2025-03-01",
            app.address, patient_id
        ))
        .send()
        .await
        .expect("Failed to fetch vitals");
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["hr"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn weekly_series_carries_resting_heart_rate_estimates() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = seed_patient_account(&app).await;

    // 2025-03-05: night hours 02/03/04 with solid sample counts.
    for (hour, avg) in [(2u32, 60.0f64), (3, 62.0), (4, 58.0)] {
        let ts = Utc.with_ymd_and_hms(2025, 3, 5, hour, 0, 0).unwrap();
        app.storage
            .upsert_stat_hour(
                StatMetric::HeartRate,
                &StatHourRow {
                    patient_id,
                    hour_ts: BucketHour::from_utc(ts, 0),
                    min_value: avg - 4.0,
                    max_value: avg + 4.0,
                    sum_value: avg * 12.0,
                    sample_count: 12,
                },
            )
            .await
            .unwrap();
    }
    app.storage
        .upsert_stat_day(
            StatMetric::HeartRate,
            &StatDayRow {
                patient_id,
                date: BucketDay::from_date(chrono::NaiveDate::from_ymd_opt(2025, 3, 5).unwrap()),
                min_value: 58.0,
                max_value: 96.0,
                sum_value: 25000.0,
                sample_count: 360,
            },
        )
        .await
        .unwrap();

    // 2025-03-06: day aggregate only, no qualifying night hours.
    app.storage
        .upsert_stat_day(
            StatMetric::HeartRate,
            &StatDayRow {
                patient_id,
                date: BucketDay::from_date(chrono::NaiveDate::from_ymd_opt(2025, 3, 6).unwrap()),
                min_value: 54.6,
                max_value: 101.0,
                sum_value: 27000.0,
                sample_count: 380,
            },
        )
        .await
        .unwrap();

    let response = client
        .get(format!(
            "{}/patient/vitals?patientId={}&period=weekly&date=2025-03-07",
            app.address, patient_id
        ))
        .send()
        .await
        .expect("Failed to fetch vitals");
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();

    let hr = body["hr"].as_array().unwrap();
    assert_eq!(hr.len(), 2);
    assert_eq!(hr[0]["time"], "2025-03-05");
    // Median of the lowest-scoring 3-hour window [60, 62, 58], not min=58.
    assert_eq!(hr[0]["resting"], 60);
    assert_eq!(hr[1]["time"], "2025-03-06");
    // No qualifying night hours: fall back to the day minimum.
    assert_eq!(hr[1]["resting"], 55);
}

#[tokio::test]
async fn monthly_series_covers_the_anchor_calendar_month() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = seed_patient_account(&app).await;

    // One sample inside February, one outside.
    client
        .post(format!("{}/ingest/steps-events", app.address))
        .json(&json!([
            steps_event(patient_id, "2025-02-10T09:00:00.000Z", "2025-02-10T09:30:00.000Z", 500, 0),
            steps_event(patient_id, "2025-03-01T09:00:00.000Z", "2025-03-01T09:30:00.000Z", 900, 0),
        ]))
        .send()
        .await
        .expect("Failed to ingest steps");

    let response = client
        .get(format!(
            "{}/patient/vitals?patientId={}&period=monthly&date=2025-02-15",
            app.address, patient_id
        ))
        .send()
        .await
        .expect("Failed to fetch vitals");
    let body: serde_json::Value = response.json().await.unwrap();
    let steps = body["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0]["time"], "2025-02-10");
    assert_eq!(steps[0]["count"], 500);
}

#[tokio::test]
async fn unknown_period_is_rejected() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = seed_patient_account(&app).await;

    let response = client
        .get(format!(
            "{}/patient/vitals?patientId={}&period=yearly",
            app.address, patient_id
        ))
        .send()
        .await
        .expect("Failed to fetch vitals");
    assert_eq!(response.status().as_u16(), 400);
}

use reqwest::Client;
use serde_json::json;

mod common;
use common::utils::{distance_event, seed_patient_account, spawn_app, spo2_sample};

use cardiolink_backend::models::vitals::{StatMetric, SumMetric};

#[tokio::test]
async fn spo2_extremes_keep_fractional_percentages() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = seed_patient_account(&app).await;

    let batch = json!([
        spo2_sample(patient_id, "2025-03-01T02:00:00.000Z", 97.5, 0),
        spo2_sample(patient_id, "2025-03-01T02:20:00.000Z", 96.25, 0),
        spo2_sample(patient_id, "2025-03-01T02:40:00.000Z", 98.0, 0),
    ]);
    let response = client
        .post(format!("{}/ingest/spo2-samples", app.address))
        .json(&batch)
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());

    let day = app
        .storage
        .latest_stat_day(StatMetric::Spo2, patient_id)
        .await
        .unwrap()
        .expect("day aggregate missing");
    // Fractional clinically meaningful extremes survive as received.
    assert_eq!(day.min_value, 96.25);
    assert_eq!(day.max_value, 98.0);
    assert_eq!(day.sample_count, 3);
}

#[tokio::test]
async fn heart_rate_extremes_are_rounded_to_whole_bpm() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = seed_patient_account(&app).await;

    let batch = json!([
        common::utils::hr_sample(patient_id, "2025-03-01T02:00:00.000Z", 61.4, 0),
        common::utils::hr_sample(patient_id, "2025-03-01T02:20:00.000Z", 72.6, 0),
    ]);
    let response = client
        .post(format!("{}/ingest/hr-samples", app.address))
        .json(&batch)
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());

    let day = app
        .storage
        .latest_stat_day(StatMetric::HeartRate, patient_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(day.min_value, 61.0);
    assert_eq!(day.max_value, 73.0);
    // The sum is never rounded; the average derives from it.
    assert_eq!(day.sum_value, 134.0);
}

#[tokio::test]
async fn distance_intervals_sum_per_bucket_and_dedup_on_replay() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = seed_patient_account(&app).await;

    let batch = json!([
        distance_event(patient_id, "2025-03-01T07:00:00.000Z", "2025-03-01T07:15:00.000Z", 420.5, 120),
        distance_event(patient_id, "2025-03-01T07:30:00.000Z", "2025-03-01T07:45:00.000Z", 310.25, 120),
    ]);
    let response = client
        .post(format!("{}/ingest/distance-events", app.address))
        .json(&batch)
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["inserted"], 2);

    let day = app
        .storage
        .latest_sum_day(SumMetric::Distance, patient_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(day.total, 730.75);

    // Replay one record; the total must not move.
    let replay = json!([distance_event(
        patient_id,
        "2025-03-01T07:00:00.000Z",
        "2025-03-01T07:15:00.000Z",
        420.5,
        120
    )]);
    let response = client
        .post(format!("{}/ingest/distance-events", app.address))
        .json(&replay)
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["inserted"], 0);

    let day = app
        .storage
        .latest_sum_day(SumMetric::Distance, patient_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(day.total, 730.75);
}

#[tokio::test]
async fn interval_bucketing_uses_the_end_timestamp() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = seed_patient_account(&app).await;

    // Starts 07:58, ends 08:02: the whole interval lands in the 08:00 hour.
    let batch = json!([distance_event(
        patient_id,
        "2025-03-01T07:58:00.000Z",
        "2025-03-01T08:02:00.000Z",
        120.0,
        0
    )]);
    let response = client
        .post(format!("{}/ingest/distance-events", app.address))
        .json(&batch)
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());

    use cardiolink_backend::aggregate::bucket::BucketHour;
    use chrono::TimeZone;
    let eight = BucketHour::from_utc(
        chrono::Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
        0,
    );
    let hours = app
        .storage
        .sum_hours_in_range(SumMetric::Distance, patient_id, eight, eight)
        .await
        .unwrap();
    assert_eq!(hours.len(), 1);
    assert_eq!(hours[0].total, 120.0);
}

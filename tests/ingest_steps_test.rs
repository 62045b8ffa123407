use reqwest::Client;
use serde_json::json;
use uuid::Uuid;

mod common;
use common::utils::{seed_patient_account, spawn_app, steps_event};

use cardiolink_backend::models::vitals::{MetricKind, SumMetric};

#[tokio::test]
async fn empty_batch_is_a_no_op_success() {
    let app = spawn_app().await;
    let client = Client::new();

    let response = client
        .post(format!("{}/ingest/steps-events", app.address))
        .json(&json!([]))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["inserted"], 0);
    assert_eq!(body["upserted_hour"], 0);
    assert_eq!(body["upserted_day"], 0);
}

#[tokio::test]
async fn missing_patient_id_is_rejected_without_writes() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = seed_patient_account(&app).await;

    let mut item = steps_event(patient_id, "2025-03-01T10:00:00.000Z", "2025-03-01T10:05:00.000Z", 50, 480);
    item.as_object_mut().unwrap().remove("patientId");

    let response = client
        .post(format!("{}/ingest/steps-events", app.address))
        .json(&json!([item]))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("patientId"));
    assert_eq!(
        app.storage
            .raw_row_count(MetricKind::Steps, patient_id)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn unknown_account_is_rejected() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = Uuid::new_v4(); // never registered

    let item = steps_event(patient_id, "2025-03-01T10:00:00.000Z", "2025-03-01T10:05:00.000Z", 50, 480);
    let response = client
        .post(format!("{}/ingest/steps-events", app.address))
        .json(&json!([item]))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn non_patient_role_cannot_submit_health_data() {
    let app = spawn_app().await;
    let client = Client::new();
    let account_id = Uuid::new_v4();
    app.storage
        .upsert_account(account_id, "clinician")
        .await
        .unwrap();

    let item = steps_event(account_id, "2025-03-01T10:00:00.000Z", "2025-03-01T10:05:00.000Z", 50, 480);
    let response = client
        .post(format!("{}/ingest/steps-events", app.address))
        .json(&json!([item]))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 403);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("clinician"));
}

#[tokio::test]
async fn mixed_patient_batch_is_rejected() {
    let app = spawn_app().await;
    let client = Client::new();
    let first = seed_patient_account(&app).await;
    let second = seed_patient_account(&app).await;

    let batch = json!([
        steps_event(first, "2025-03-01T10:00:00.000Z", "2025-03-01T10:05:00.000Z", 50, 480),
        steps_event(second, "2025-03-01T10:00:00.000Z", "2025-03-01T10:05:00.000Z", 20, 480),
    ]);
    let response = client
        .post(format!("{}/ingest/steps-events", app.address))
        .json(&batch)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("mixed patient"));
    assert_eq!(
        app.storage
            .raw_row_count(MetricKind::Steps, first)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn identical_resubmission_never_double_counts() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = seed_patient_account(&app).await;

    // 10:05Z at +08:00 is 18:05 local, still 2025-03-01.
    let batch = json!([steps_event(
        patient_id,
        "2025-03-01T10:00:00.000Z",
        "2025-03-01T10:05:00.000Z",
        50,
        480
    )]);

    let response = client
        .post(format!("{}/ingest/steps-events", app.address))
        .json(&batch)
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["inserted"], 1);
    assert_eq!(body["upserted_hour"], 1);
    assert_eq!(body["upserted_day"], 1);

    let day = app
        .storage
        .latest_sum_day(SumMetric::Steps, patient_id)
        .await
        .unwrap()
        .expect("day aggregate missing");
    assert_eq!(day.date.to_string(), "2025-03-01");
    assert_eq!(day.total, 50.0);

    // Replay the exact same batch: one raw row, unchanged totals.
    let response = client
        .post(format!("{}/ingest/steps-events", app.address))
        .json(&batch)
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["inserted"], 0);

    assert_eq!(
        app.storage
            .raw_row_count(MetricKind::Steps, patient_id)
            .await
            .unwrap(),
        1
    );
    let day = app
        .storage
        .latest_sum_day(SumMetric::Steps, patient_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(day.total, 50.0);
}

#[tokio::test]
async fn batch_counts_reflect_touched_buckets() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = seed_patient_account(&app).await;

    let batch = json!([
        steps_event(patient_id, "2025-03-01T09:00:00.000Z", "2025-03-01T09:10:00.000Z", 120, 0),
        steps_event(patient_id, "2025-03-01T10:00:00.000Z", "2025-03-01T10:10:00.000Z", 80, 0),
    ]);
    let response = client
        .post(format!("{}/ingest/steps-events", app.address))
        .json(&batch)
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["inserted"], 2);
    assert_eq!(body["upserted_hour"], 2);
    assert_eq!(body["upserted_day"], 1);

    let day = app
        .storage
        .latest_sum_day(SumMetric::Steps, patient_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(day.total, 200.0);
}

#[tokio::test]
async fn profile_fields_on_first_record_upsert_the_patient_without_blanking() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = seed_patient_account(&app).await;

    let mut item = steps_event(patient_id, "2025-03-01T10:00:00.000Z", "2025-03-01T10:05:00.000Z", 50, 0);
    let obj = item.as_object_mut().unwrap();
    obj.insert("firstName".into(), json!("Maria"));
    obj.insert("lastName".into(), json!("Silva"));
    obj.insert("dateOfBirth".into(), json!("1950-06-01"));
    let response = client
        .post(format!("{}/ingest/steps-events", app.address))
        .json(&json!([item]))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());

    // A later batch without profile fields must not blank the stored ones.
    let item = steps_event(patient_id, "2025-03-01T11:00:00.000Z", "2025-03-01T11:05:00.000Z", 30, 0);
    let response = client
        .post(format!("{}/ingest/steps-events", app.address))
        .json(&json!([item]))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());

    let patient = app
        .storage
        .get_patient(patient_id)
        .await
        .unwrap()
        .expect("patient missing");
    assert_eq!(patient.first_name, "Maria");
    assert_eq!(patient.last_name, "Silva");
    assert_eq!(patient.date_of_birth.unwrap().to_string(), "1950-06-01");
}

#[tokio::test]
async fn negative_step_count_is_a_validation_failure() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = seed_patient_account(&app).await;

    let item = steps_event(patient_id, "2025-03-01T10:00:00.000Z", "2025-03-01T10:05:00.000Z", -5, 0);
    let response = client
        .post(format!("{}/ingest/steps-events", app.address))
        .json(&json!([item]))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

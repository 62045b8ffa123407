use reqwest::Client;
use serde_json::json;
use uuid::Uuid;

mod common;
use common::utils::{seed_patient_account, spawn_app, steps_event};

use cardiolink_backend::models::vitals::{MetricKind, SumMetric};

#[tokio::test]
async fn ensure_patient_upserts_and_preserves_existing_fields() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = Uuid::new_v4();

    let response = client
        .post(format!("{}/admin/ensure-patient", app.address))
        .json(&json!({
            "patientId": patient_id,
            "firstName": "Maria",
            "lastName": "Silva",
            "dateOfBirth": "1950-06-01",
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());

    // Repeat without profile fields; stored values must survive.
    let response = client
        .post(format!("{}/admin/ensure-patient", app.address))
        .json(&json!({ "patientId": patient_id }))
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
async fn ensure_patient_requires_a_patient_id() {
    let app = spawn_app().await;
    let client = Client::new();

    let response = client
        .post(format!("{}/admin/ensure-patient", app.address))
        .json(&json!({ "firstName": "Maria" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn patient_info_reports_profile_and_device_count() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = seed_patient_account(&app).await;

    client
        .post(format!("{}/ingest/steps-events", app.address))
        .json(&json!([steps_event(
            patient_id,
            "2025-03-01T10:00:00.000Z",
            "2025-03-01T10:05:00.000Z",
            50,
            0
        )]))
        .send()
        .await
        .expect("Failed to ingest steps");

    let response = client
        .get(format!(
            "{}/admin/patient-info?patientId={}",
            app.address, patient_id
        ))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["patient"]["patientId"], patient_id.to_string());
    assert_eq!(body["devicesCount"], 1);

    let response = client
        .get(format!(
            "{}/admin/patient-info?patientId={}",
            app.address,
            Uuid::new_v4()
        ))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn cascade_delete_removes_all_patient_data() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = seed_patient_account(&app).await;

    client
        .post(format!("{}/ingest/steps-events", app.address))
        .json(&json!([steps_event(
            patient_id,
            "2025-03-01T10:00:00.000Z",
            "2025-03-01T10:05:00.000Z",
            50,
            0
        )]))
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
        .post(format!("{}/admin/delete-patient", app.address))
        .json(&json!({ "patientId": patient_id }))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["deleted"].as_u64().unwrap() > 0);

    assert_eq!(
        app.storage
            .raw_row_count(MetricKind::Steps, patient_id)
            .await
            .unwrap(),
        0
    );
    assert!(app
        .storage
        .latest_sum_day(SumMetric::Steps, patient_id)
        .await
        .unwrap()
        .is_none());
    assert!(app.storage.get_patient(patient_id).await.unwrap().is_none());
    assert!(app
        .storage
        .latest_bp_reading(patient_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn near_identical_bp_reading_within_ten_seconds_is_rejected() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = seed_patient_account(&app).await;

    let reading = json!({
        "patientId": patient_id,
        "systolic": 128,
        "diastolic": 82,
        "pulse": 66,
    });
    let response = client
        .post(format!("{}/patient/bp-readings", app.address))
        .json(&reading)
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());

    let response = client
        .post(format!("{}/patient/bp-readings", app.address))
        .json(&reading)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("uplicate"));

    // A clearly different reading is accepted right away.
    let response = client
        .post(format!("{}/patient/bp-readings", app.address))
        .json(&json!({
            "patientId": patient_id,
            "systolic": 145,
            "diastolic": 95,
            "pulse": 80,
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());
}

#[tokio::test]
async fn bp_reading_requires_all_three_values() {
    let app = spawn_app().await;
    let client = Client::new();
    let patient_id = seed_patient_account(&app).await;

    let response = client
        .post(format!("{}/patient/bp-readings", app.address))
        .json(&json!({ "patientId": patient_id, "systolic": 128 }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 400);
}

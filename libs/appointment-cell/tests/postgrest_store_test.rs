// Error translation at the PostgREST seam: constraint violations become
// conflicts and a stale conditional PATCH surfaces the winner's status.

use chrono::{Duration, Utc};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{Appointment, AppointmentStatus};
use appointment_cell::store::{AppointmentStore, PostgrestAppointmentStore, StoreError};
use provider_cell::models::Modality;
use shared_config::AppConfig;
use shared_database::PostgrestClient;

fn store_for(server: &MockServer) -> PostgrestAppointmentStore {
    let config = AppConfig {
        postgrest_url: server.uri(),
        postgrest_service_key: "test-key".to_string(),
    };
    PostgrestAppointmentStore::new(PostgrestClient::new(&config))
}

fn appointment(status: AppointmentStatus) -> Appointment {
    let now = Utc::now();
    Appointment {
        id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
        provider_id: Uuid::new_v4(),
        scheduled_start_time: now + Duration::days(2),
        duration_minutes: 30,
        modality: Modality::Virtual,
        status,
        reason: None,
        cancellation_reason: None,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn test_insert_returns_stored_representation() {
    let server = MockServer::start().await;
    let store = store_for(&server);
    let apt = appointment(AppointmentStatus::Agendada);

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(vec![serde_json::to_value(&apt).unwrap()]),
        )
        .mount(&server)
        .await;

    let stored = store.insert_exclusive(apt.clone()).await.unwrap();
    assert_eq!(stored.id, apt.id);
    assert_eq!(stored.status, AppointmentStatus::Agendada);
}

#[tokio::test]
async fn test_exclusion_violation_translates_to_conflict() {
    let server = MockServer::start().await;
    let store = store_for(&server);

    // The appointments table carries an exclusion constraint over
    // (provider_id, time range); PostgREST reports a violation as 409.
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "code": "23P01",
            "message": "conflicting key value violates exclusion constraint \"appointments_no_overlap\""
        })))
        .mount(&server)
        .await;

    let result = store
        .insert_exclusive(appointment(AppointmentStatus::Agendada))
        .await;
    assert!(matches!(result, Err(StoreError::Conflict)));
}

#[tokio::test]
async fn test_missing_appointment_is_not_found() {
    let server = MockServer::start().await;
    let store = store_for(&server);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&server)
        .await;

    let result = store.find(Uuid::new_v4()).await;
    assert!(matches!(result, Err(StoreError::NotFound)));
}

#[tokio::test]
async fn test_stale_conditional_update_reports_current_status() {
    let server = MockServer::start().await;
    let store = store_for(&server);

    let mut current = appointment(AppointmentStatus::Confirmada);

    // The conditional PATCH matches no row: someone else already moved the
    // status past Agendada.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&server)
        .await;

    // The re-read sees the winner's state.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![serde_json::to_value(&current).unwrap()]),
        )
        .mount(&server)
        .await;

    let result = store
        .transition_status(
            current.id,
            AppointmentStatus::Agendada,
            AppointmentStatus::Cancelada,
            None,
        )
        .await;

    assert!(matches!(
        result,
        Err(StoreError::StaleStatus {
            current: AppointmentStatus::Confirmada
        })
    ));

    // A matching PATCH applies and returns the representation.
    server.reset().await;
    current.status = AppointmentStatus::Cancelada;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![serde_json::to_value(&current).unwrap()]),
        )
        .mount(&server)
        .await;

    let updated = store
        .transition_status(
            current.id,
            AppointmentStatus::Confirmada,
            AppointmentStatus::Cancelada,
            Some("Patient request".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(updated.status, AppointmentStatus::Cancelada);
}

#[tokio::test]
async fn test_range_scan_keeps_only_overlapping_rows() {
    let server = MockServer::start().await;
    let store = store_for(&server);

    let from = Utc::now() + Duration::days(1);
    let to = from + Duration::hours(1);

    // Starts 45 minutes before the window but, at 30 minutes long, ends
    // before it opens; the scan returns it, the overlap filter drops it.
    let mut before = appointment(AppointmentStatus::Agendada);
    before.scheduled_start_time = from - Duration::minutes(45);

    let mut inside = appointment(AppointmentStatus::Agendada);
    inside.scheduled_start_time = from + Duration::minutes(15);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            serde_json::to_value(&before).unwrap(),
            serde_json::to_value(&inside).unwrap(),
        ]))
        .mount(&server)
        .await;

    let result = store
        .for_provider_in_range(inside.provider_id, from, to)
        .await
        .unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].id, inside.id);
}

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::NaiveTime;
use uuid::Uuid;

use provider_cell::models::{AvailabilityError, Modality, WeeklyBlockSpec};
use provider_cell::services::AvailabilityService;
use provider_cell::store::{InMemoryAvailabilityStore, StaticProviderDirectory};

fn spec(day: i32, start: &str, end: &str, modality: Modality) -> WeeklyBlockSpec {
    WeeklyBlockSpec {
        day_of_week: day,
        start_time: NaiveTime::parse_from_str(start, "%H:%M").unwrap(),
        end_time: NaiveTime::parse_from_str(end, "%H:%M").unwrap(),
        modality,
    }
}

fn service_for(provider_id: Uuid) -> AvailabilityService {
    AvailabilityService::new(
        Arc::new(InMemoryAvailabilityStore::new()),
        Arc::new(StaticProviderDirectory::with_providers([provider_id])),
    )
}

#[tokio::test]
async fn test_set_availability_stores_active_blocks() {
    let provider_id = Uuid::new_v4();
    let service = service_for(provider_id);

    let stored = service
        .set_availability(
            provider_id,
            vec![
                spec(1, "09:00", "12:00", Modality::Presencial),
                spec(3, "14:00", "18:00", Modality::Virtual),
            ],
        )
        .await
        .unwrap();

    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|b| b.is_active));
    assert!(stored.iter().all(|b| b.provider_id == provider_id));

    let fetched = service.get_availability(provider_id).await.unwrap();
    assert_eq!(fetched.len(), 2);
    // Ordered by weekday then start time.
    assert_eq!(fetched[0].day_of_week, 1);
    assert_eq!(fetched[1].day_of_week, 3);
}

#[tokio::test]
async fn test_reconfiguration_replaces_previous_set() {
    let provider_id = Uuid::new_v4();
    let service = service_for(provider_id);

    service
        .set_availability(
            provider_id,
            vec![
                spec(1, "09:00", "12:00", Modality::Presencial),
                spec(2, "09:00", "12:00", Modality::Presencial),
            ],
        )
        .await
        .unwrap();

    // The second configuration call fully replaces the first.
    service
        .set_availability(provider_id, vec![spec(5, "10:00", "13:00", Modality::Virtual)])
        .await
        .unwrap();

    let fetched = service.get_availability(provider_id).await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].day_of_week, 5);
    assert_eq!(fetched[0].modality, Modality::Virtual);
}

#[tokio::test]
async fn test_empty_set_clears_schedule() {
    let provider_id = Uuid::new_v4();
    let service = service_for(provider_id);

    service
        .set_availability(provider_id, vec![spec(1, "09:00", "12:00", Modality::Presencial)])
        .await
        .unwrap();
    service.set_availability(provider_id, vec![]).await.unwrap();

    let fetched = service.get_availability(provider_id).await.unwrap();
    assert!(fetched.is_empty());
}

#[tokio::test]
async fn test_unknown_provider_rejected() {
    let service = service_for(Uuid::new_v4());
    let unknown = Uuid::new_v4();

    let result = service
        .set_availability(unknown, vec![spec(1, "09:00", "12:00", Modality::Presencial)])
        .await;
    assert_matches!(result, Err(AvailabilityError::ProviderNotFound));

    let result = service.get_availability(unknown).await;
    assert_matches!(result, Err(AvailabilityError::ProviderNotFound));
}

#[tokio::test]
async fn test_invalid_specs_leave_schedule_untouched() {
    let provider_id = Uuid::new_v4();
    let service = service_for(provider_id);

    service
        .set_availability(provider_id, vec![spec(1, "09:00", "12:00", Modality::Presencial)])
        .await
        .unwrap();

    let result = service
        .set_availability(provider_id, vec![spec(1, "15:00", "14:00", Modality::Presencial)])
        .await;
    assert_matches!(result, Err(AvailabilityError::ValidationError(_)));

    // Rejected configurations are not applied, not even partially.
    let fetched = service.get_availability(provider_id).await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].day_of_week, 1);
}

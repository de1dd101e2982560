// libs/appointment-cell/src/store.rs
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::{PostgrestClient, PostgrestError};

use crate::models::{Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus};
use crate::services::conflict::overlaps;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Appointment overlaps an existing booking")]
    Conflict,

    #[error("Appointment not found")]
    NotFound,

    #[error("Status changed concurrently, current status: {current}")]
    StaleStatus { current: AppointmentStatus },

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AppointmentError::ConflictDetected,
            StoreError::NotFound => AppointmentError::NotFound,
            StoreError::StaleStatus { current } => {
                AppointmentError::InvalidStatusTransition(current)
            }
            StoreError::Backend(msg) => AppointmentError::DatabaseError(msg),
        }
    }
}

/// Persistence seam for appointments.
///
/// The two write operations carry the engine's concurrency guarantees:
/// `insert_exclusive` enforces the provider/time-range exclusion check
/// atomically with the insert, and `transition_status` is an optimistic
/// compare-and-set on the current status. Appointments are never deleted;
/// cancelled rows are retained for audit.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Insert the appointment unless it overlaps a calendar-blocking
    /// (non-cancelled) appointment of the same provider. Check and insert
    /// are a single atomic operation; among concurrent overlapping inserts
    /// at most one succeeds, the rest fail with `StoreError::Conflict`.
    async fn insert_exclusive(&self, appointment: Appointment) -> Result<Appointment, StoreError>;

    async fn find(&self, id: Uuid) -> Result<Appointment, StoreError>;

    /// Calendar-blocking appointments of the provider whose interval
    /// intersects `[from, to)`, ordered by start time.
    async fn for_provider_in_range(
        &self,
        provider_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError>;

    /// Set the status to `to` only if it still equals `expected`; a lost
    /// race fails with `StoreError::StaleStatus` carrying the status the
    /// winner left behind.
    async fn transition_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        to: AppointmentStatus,
        cancellation_reason: Option<String>,
    ) -> Result<Appointment, StoreError>;

    async fn search(&self, query: &AppointmentSearchQuery)
        -> Result<Vec<Appointment>, StoreError>;
}

// ==============================================================================
// IN-MEMORY IMPLEMENTATION
// ==============================================================================

/// Reference store. Each write operation holds the write lock for its whole
/// critical section, which is what makes check-then-insert and
/// compare-and-set atomic here.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn insert_exclusive(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        let mut guard = self.appointments.write().await;

        let start = appointment.scheduled_start_time;
        let end = appointment.scheduled_end_time();
        let conflicting = guard.values().any(|existing| {
            existing.provider_id == appointment.provider_id
                && existing.blocks_calendar()
                && overlaps(
                    start,
                    end,
                    existing.scheduled_start_time,
                    existing.scheduled_end_time(),
                )
        });

        if conflicting {
            warn!(
                "Exclusion check rejected appointment for provider {} at {}",
                appointment.provider_id, start
            );
            return Err(StoreError::Conflict);
        }

        guard.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn find(&self, id: Uuid) -> Result<Appointment, StoreError> {
        let guard = self.appointments.read().await;
        guard.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn for_provider_in_range(
        &self,
        provider_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError> {
        let guard = self.appointments.read().await;
        let mut result: Vec<Appointment> = guard
            .values()
            .filter(|apt| {
                apt.provider_id == provider_id
                    && apt.blocks_calendar()
                    && overlaps(
                        apt.scheduled_start_time,
                        apt.scheduled_end_time(),
                        from,
                        to,
                    )
            })
            .cloned()
            .collect();
        result.sort_by_key(|apt| apt.scheduled_start_time);
        Ok(result)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        to: AppointmentStatus,
        cancellation_reason: Option<String>,
    ) -> Result<Appointment, StoreError> {
        let mut guard = self.appointments.write().await;
        let appointment = guard.get_mut(&id).ok_or(StoreError::NotFound)?;

        if appointment.status != expected {
            return Err(StoreError::StaleStatus {
                current: appointment.status,
            });
        }

        appointment.status = to;
        if cancellation_reason.is_some() {
            appointment.cancellation_reason = cancellation_reason;
        }
        appointment.updated_at = Utc::now();

        Ok(appointment.clone())
    }

    async fn search(
        &self,
        query: &AppointmentSearchQuery,
    ) -> Result<Vec<Appointment>, StoreError> {
        let guard = self.appointments.read().await;
        let mut result: Vec<Appointment> = guard
            .values()
            .filter(|apt| {
                query.patient_id.map_or(true, |id| apt.patient_id == id)
                    && query.provider_id.map_or(true, |id| apt.provider_id == id)
                    && query.status.map_or(true, |s| apt.status == s)
                    && query
                        .from_date
                        .map_or(true, |from| apt.scheduled_start_time >= from)
                    && query
                        .to_date
                        .map_or(true, |to| apt.scheduled_start_time <= to)
            })
            .cloned()
            .collect();
        result.sort_by_key(|apt| apt.scheduled_start_time);

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let result: Vec<Appointment> = match query.limit {
            Some(limit) => result.into_iter().skip(offset).take(limit.max(0) as usize).collect(),
            None => result.into_iter().skip(offset).collect(),
        };

        Ok(result)
    }
}

// ==============================================================================
// POSTGREST IMPLEMENTATION
// ==============================================================================

/// Store backed by the PostgREST data plane. The `appointments` table
/// carries an exclusion constraint over `(provider_id, time range)` for
/// non-cancelled rows; the database rejects an overlapping insert with 409,
/// which surfaces here as `StoreError::Conflict`.
pub struct PostgrestAppointmentStore {
    client: PostgrestClient,
}

impl PostgrestAppointmentStore {
    pub fn new(client: PostgrestClient) -> Self {
        Self { client }
    }

    fn representation_headers() -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );
        headers
    }

    fn parse_rows(rows: Vec<Value>) -> Result<Vec<Appointment>, StoreError> {
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| StoreError::Backend(format!("Failed to parse appointments: {}", e)))
    }
}

#[async_trait]
impl AppointmentStore for PostgrestAppointmentStore {
    async fn insert_exclusive(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        debug!(
            "Inserting appointment {} for provider {}",
            appointment.id, appointment.provider_id
        );

        let body = serde_json::to_value(&appointment)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let result: Vec<Value> = self
            .client
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(body),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| match e {
                PostgrestError::Conflict(_) => StoreError::Conflict,
                other => StoreError::Backend(other.to_string()),
            })?;

        Self::parse_rows(result)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("Insert returned no representation".to_string()))
    }

    async fn find(&self, id: Uuid) -> Result<Appointment, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        let result: Vec<Value> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Self::parse_rows(result)?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound)
    }

    async fn for_provider_in_range(
        &self,
        provider_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError> {
        // End times are not stored; bound the start-time scan by the maximum
        // appointment duration so nothing reaching into [from, to) is missed.
        let scan_from = from - Duration::minutes(240);
        let path = format!(
            "/rest/v1/appointments?provider_id=eq.{}&status=neq.cancelada&scheduled_start_time=gte.{}&scheduled_start_time=lt.{}&order=scheduled_start_time.asc",
            provider_id,
            urlencoding::encode(&scan_from.to_rfc3339()),
            urlencoding::encode(&to.to_rfc3339()),
        );

        let result: Vec<Value> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let appointments = Self::parse_rows(result)?
            .into_iter()
            .filter(|apt| {
                overlaps(apt.scheduled_start_time, apt.scheduled_end_time(), from, to)
            })
            .collect();

        Ok(appointments)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        to: AppointmentStatus,
        cancellation_reason: Option<String>,
    ) -> Result<Appointment, StoreError> {
        // Conditional update: the status filter makes this a compare-and-set.
        // An empty representation means another actor transitioned first.
        let path = format!("/rest/v1/appointments?id=eq.{}&status=eq.{}", id, expected);

        let mut body = serde_json::Map::new();
        body.insert("status".to_string(), json!(to));
        if let Some(reason) = cancellation_reason {
            body.insert("cancellation_reason".to_string(), json!(reason));
        }
        body.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let result: Vec<Value> = self
            .client
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(Value::Object(body)),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        if let Some(updated) = Self::parse_rows(result)?.into_iter().next() {
            return Ok(updated);
        }

        // Lost the race or the row never existed; re-read to tell which.
        let current = self.find(id).await?;
        Err(StoreError::StaleStatus {
            current: current.status,
        })
    }

    async fn search(
        &self,
        query: &AppointmentSearchQuery,
    ) -> Result<Vec<Appointment>, StoreError> {
        let mut query_parts = Vec::new();

        if let Some(patient_id) = query.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(provider_id) = query.provider_id {
            query_parts.push(format!("provider_id=eq.{}", provider_id));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(from_date) = query.from_date {
            query_parts.push(format!(
                "scheduled_start_time=gte.{}",
                urlencoding::encode(&from_date.to_rfc3339())
            ));
        }
        if let Some(to_date) = query.to_date {
            query_parts.push(format!(
                "scheduled_start_time=lte.{}",
                urlencoding::encode(&to_date.to_rfc3339())
            ));
        }
        if let Some(limit) = query.limit {
            query_parts.push(format!("limit={}", limit));
        }
        if let Some(offset) = query.offset {
            query_parts.push(format!("offset={}", offset));
        }
        query_parts.push("order=scheduled_start_time.asc".to_string());

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));

        let result: Vec<Value> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Self::parse_rows(result)
    }
}

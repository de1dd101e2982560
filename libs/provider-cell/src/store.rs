// libs/provider-cell/src/store.rs
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_database::PostgrestClient;

use crate::models::{AvailabilityBlock, AvailabilityError};

// ==============================================================================
// STORE PORTS
// ==============================================================================

/// Persistence seam for weekly availability blocks.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// Discard the provider's previous block set and store the new one as a
    /// single atomic operation. Readers never observe a partially applied
    /// schedule.
    async fn replace_for_provider(
        &self,
        provider_id: Uuid,
        blocks: Vec<AvailabilityBlock>,
    ) -> Result<Vec<AvailabilityBlock>, AvailabilityError>;

    /// Active blocks for a provider, ordered by weekday then start time.
    async fn active_blocks_for(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<AvailabilityBlock>, AvailabilityError>;
}

/// Lookup seam for provider existence. Provider CRUD itself lives outside
/// this cell.
#[async_trait]
pub trait ProviderDirectory: Send + Sync {
    async fn exists(&self, provider_id: Uuid) -> Result<bool, AvailabilityError>;
}

// ==============================================================================
// IN-MEMORY IMPLEMENTATIONS
// ==============================================================================

/// Reference store. A single write lock spans the whole replace, which gives
/// the full-replace atomicity the engine relies on.
#[derive(Default)]
pub struct InMemoryAvailabilityStore {
    blocks: RwLock<HashMap<Uuid, Vec<AvailabilityBlock>>>,
}

impl InMemoryAvailabilityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AvailabilityStore for InMemoryAvailabilityStore {
    async fn replace_for_provider(
        &self,
        provider_id: Uuid,
        blocks: Vec<AvailabilityBlock>,
    ) -> Result<Vec<AvailabilityBlock>, AvailabilityError> {
        let mut guard = self.blocks.write().await;
        guard.insert(provider_id, blocks.clone());
        Ok(blocks)
    }

    async fn active_blocks_for(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<AvailabilityBlock>, AvailabilityError> {
        let guard = self.blocks.read().await;
        let mut blocks: Vec<AvailabilityBlock> = guard
            .get(&provider_id)
            .map(|blocks| blocks.iter().filter(|b| b.is_active).cloned().collect())
            .unwrap_or_default();
        blocks.sort_by_key(|b| (b.day_of_week, b.start_time));
        Ok(blocks)
    }
}

/// Directory backed by a fixed set of provider ids, for tests and embedded
/// deployments.
#[derive(Default)]
pub struct StaticProviderDirectory {
    known: std::collections::HashSet<Uuid>,
}

impl StaticProviderDirectory {
    pub fn with_providers(ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            known: ids.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ProviderDirectory for StaticProviderDirectory {
    async fn exists(&self, provider_id: Uuid) -> Result<bool, AvailabilityError> {
        Ok(self.known.contains(&provider_id))
    }
}

// ==============================================================================
// POSTGREST IMPLEMENTATIONS
// ==============================================================================

pub struct PostgrestAvailabilityStore {
    client: PostgrestClient,
}

impl PostgrestAvailabilityStore {
    pub fn new(client: PostgrestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AvailabilityStore for PostgrestAvailabilityStore {
    async fn replace_for_provider(
        &self,
        provider_id: Uuid,
        blocks: Vec<AvailabilityBlock>,
    ) -> Result<Vec<AvailabilityBlock>, AvailabilityError> {
        debug!("Replacing availability for provider {}", provider_id);

        // One RPC call = one server-side transaction: delete + insert are
        // never observed half-applied.
        let stored: Vec<AvailabilityBlock> = self
            .client
            .rpc(
                "replace_provider_availability",
                json!({
                    "p_provider_id": provider_id,
                    "p_blocks": blocks,
                }),
            )
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        Ok(stored)
    }

    async fn active_blocks_for(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<AvailabilityBlock>, AvailabilityError> {
        let path = format!(
            "/rest/v1/availability_blocks?provider_id=eq.{}&is_active=eq.true&order=day_of_week.asc,start_time.asc",
            provider_id
        );

        let result: Vec<Value> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let blocks: Vec<AvailabilityBlock> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AvailabilityBlock>, _>>()
            .map_err(|e| {
                AvailabilityError::DatabaseError(format!("Failed to parse blocks: {}", e))
            })?;

        Ok(blocks)
    }
}

pub struct PostgrestProviderDirectory {
    client: PostgrestClient,
}

impl PostgrestProviderDirectory {
    pub fn new(client: PostgrestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderDirectory for PostgrestProviderDirectory {
    async fn exists(&self, provider_id: Uuid) -> Result<bool, AvailabilityError> {
        let path = format!("/rest/v1/providers?id=eq.{}&select=id", provider_id);

        let result: Vec<Value> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        Ok(!result.is_empty())
    }
}

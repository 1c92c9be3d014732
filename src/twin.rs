use crate::entity::Entity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Last-confirmed remote representation of a twin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwinRecord {
    pub entity_id: String,
    pub model_id: String,
    pub contents: serde_json::Map<String, serde_json::Value>,
}

/// Typed failure reported by the remote twin service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("twin service request failed ({status}): {message}")]
pub struct TwinServiceError {
    pub status: u16,
    pub message: String,
}

impl TwinServiceError {
    pub fn new(status: u16, message: &str) -> Self {
        Self {
            status,
            message: message.to_string(),
        }
    }
}

/// The cloud twin-store capability consumed by the controller.
#[async_trait]
pub trait TwinService: Send + Sync {
    async fn create_or_replace(
        &self,
        entity_id: &str,
        model_id: &str,
        contents: serde_json::Map<String, serde_json::Value>,
    ) -> Result<TwinRecord, TwinServiceError>;

    async fn delete(&self, entity_id: &str) -> Result<(), TwinServiceError>;

    async fn publish_telemetry(
        &self,
        entity_id: &str,
        message_id: &str,
        payload: &str,
    ) -> Result<(), TwinServiceError>;

    async fn get(&self, entity_id: &str) -> Result<TwinRecord, TwinServiceError>;
}

// Shared service handles delegate, so a controller can borrow a service that
// the caller keeps observing.
#[async_trait]
impl<S: TwinService + ?Sized> TwinService for Arc<S> {
    async fn create_or_replace(
        &self,
        entity_id: &str,
        model_id: &str,
        contents: serde_json::Map<String, serde_json::Value>,
    ) -> Result<TwinRecord, TwinServiceError> {
        (**self).create_or_replace(entity_id, model_id, contents).await
    }

    async fn delete(&self, entity_id: &str) -> Result<(), TwinServiceError> {
        (**self).delete(entity_id).await
    }

    async fn publish_telemetry(
        &self,
        entity_id: &str,
        message_id: &str,
        payload: &str,
    ) -> Result<(), TwinServiceError> {
        (**self).publish_telemetry(entity_id, message_id, payload).await
    }

    async fn get(&self, entity_id: &str) -> Result<TwinRecord, TwinServiceError> {
        (**self).get(entity_id).await
    }
}

#[derive(Debug, Error)]
pub enum TwinError {
    #[error("twin create-or-replace failed for {entity_id}: {source}")]
    CreateFailed {
        entity_id: String,
        source: TwinServiceError,
    },
    #[error("telemetry publish failed for {entity_id}: {source}")]
    PublishFailed {
        entity_id: String,
        source: TwinServiceError,
    },
    #[error("twin delete failed for {entity_id}: {source}")]
    DeleteFailed {
        entity_id: String,
        source: TwinServiceError,
    },
}

/// Synchronizes entity lifecycle against the remote twin store.
///
/// The local cache deduplicates standup/shutdown against the remote service:
/// an entity present in the cache is assumed to exist remotely until a delete
/// succeeds. Calls are serialized per entity id; distinct entities proceed
/// independently. Each lifecycle trigger makes at most one remote attempt;
/// cross-call retry is a caller-level policy.
pub struct TwinLifecycleController<S> {
    service: S,
    twins: Mutex<HashMap<String, TwinRecord>>,
    guards: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: TwinService> TwinLifecycleController<S> {
    pub fn new(service: S) -> Self {
        info!("creating twin ingress controller");
        Self {
            service,
            twins: Mutex::new(HashMap::new()),
            guards: Mutex::new(HashMap::new()),
        }
    }

    /// Creates or replaces the remote twin for an entity. A cached entity is
    /// already initialized and the call is a no-op.
    pub async fn standup(&self, entity: &Entity) -> Result<(), TwinError> {
        let guard = self.entity_guard(&entity.entity_id).await;
        let _serialized = guard.lock().await;

        if self.twins.lock().await.contains_key(&entity.entity_id) {
            debug!(
                "twin {} already initialized during this runtime",
                entity.entity_id
            );
            return Ok(());
        }

        info!(
            "creating twin of model {} for entity {}",
            entity.model_id, entity.entity_id
        );
        match self
            .service
            .create_or_replace(&entity.entity_id, &entity.model_id, entity.contents_json())
            .await
        {
            Ok(record) => {
                info!("twin created or replaced for entity {}", entity.entity_id);
                self.twins
                    .lock()
                    .await
                    .insert(entity.entity_id.clone(), record);
                Ok(())
            }
            Err(source) => Err(TwinError::CreateFailed {
                entity_id: entity.entity_id.clone(),
                source,
            }),
        }
    }

    /// Publishes one snapshot payload against the entity's twin, tagged with
    /// a fresh message id. A no-op when the entity was never stood up.
    pub async fn publish(&self, entity: &Entity, payload: &str) -> Result<(), TwinError> {
        let guard = self.entity_guard(&entity.entity_id).await;
        let _serialized = guard.lock().await;

        if !self.twins.lock().await.contains_key(&entity.entity_id) {
            debug!(
                "skipping telemetry for {}: twin not initialized",
                entity.entity_id
            );
            return Ok(());
        }

        let message_id = Uuid::new_v4().to_string();
        debug!(
            "publishing telemetry {} for twin {}: {payload}",
            message_id, entity.entity_id
        );
        self.service
            .publish_telemetry(&entity.entity_id, &message_id, payload)
            .await
            .map_err(|source| TwinError::PublishFailed {
                entity_id: entity.entity_id.clone(),
                source,
            })
    }

    /// Deletes the remote twin. On success the cache entry is removed; on
    /// failure it stays, so the twin is still assumed to exist remotely.
    pub async fn shutdown(&self, entity: &Entity) -> Result<(), TwinError> {
        let guard = self.entity_guard(&entity.entity_id).await;
        let _serialized = guard.lock().await;

        if !self.twins.lock().await.contains_key(&entity.entity_id) {
            return Ok(());
        }

        info!("deleting twin {}", entity.entity_id);
        match self.service.delete(&entity.entity_id).await {
            Ok(()) => {
                self.twins.lock().await.remove(&entity.entity_id);
                info!("twin {} deleted", entity.entity_id);
                Ok(())
            }
            Err(source) => Err(TwinError::DeleteFailed {
                entity_id: entity.entity_id.clone(),
                source,
            }),
        }
    }

    /// Fetches the remote representation, bypassing the cache.
    pub async fn fetch(&self, entity_id: &str) -> Result<TwinRecord, TwinServiceError> {
        debug!("getting twin {entity_id}");
        self.service.get(entity_id).await
    }

    pub async fn contains(&self, entity_id: &str) -> bool {
        self.twins.lock().await.contains_key(entity_id)
    }

    pub async fn cached_count(&self) -> usize {
        self.twins.lock().await.len()
    }

    async fn entity_guard(&self, entity_id: &str) -> Arc<Mutex<()>> {
        let mut guards = self.guards.lock().await;
        guards
            .entry(entity_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

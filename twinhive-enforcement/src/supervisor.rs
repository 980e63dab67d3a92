//! Supervision of per-entity enforcement units.
//!
//! The supervisor owns one [`EnforcerHandle`] per entity id, spawning
//! units lazily on first use. A unit that fail-stopped after a load
//! failure is detected by its closed mailbox, discarded, and recreated;
//! the triggering request is redelivered exactly once. The unit itself
//! never retries.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use twinhive_model::{EntityId, TwinCommand, TwinResponse};

use crate::actor::{spawn_enforcer_actor, EnforcerDeps, EnforcerHandle};
use crate::authorize::{AuthorizationOutcome, CommandAuthorizer};
use crate::condition::ConditionParser;
use crate::config::EnforcementConfig;
use crate::error::{EnforcementError, Result};
use crate::events::ClusterEvents;
use crate::loader::{PolicyEnforcerResolver, PolicyIdResolver};

/// Owns the lifecycle of one enforcement unit per entity.
pub struct EnforcerSupervisor {
    deps: EnforcerDeps,
    mailbox_capacity: usize,
    units: Mutex<HashMap<EntityId, EnforcerHandle>>,
}

impl EnforcerSupervisor {
    pub fn new(
        config: EnforcementConfig,
        parser: Arc<dyn ConditionParser>,
        id_resolver: Arc<dyn PolicyIdResolver>,
        enforcer_resolver: Arc<dyn PolicyEnforcerResolver>,
        events: ClusterEvents,
    ) -> Result<Self> {
        config.validate().map_err(EnforcementError::Config)?;
        let mailbox_capacity = config.mailbox_capacity;
        let authorizer = Arc::new(CommandAuthorizer::new(config, parser));
        Ok(Self {
            deps: EnforcerDeps {
                authorizer,
                id_resolver,
                enforcer_resolver,
                events,
            },
            mailbox_capacity,
            units: Mutex::new(HashMap::new()),
        })
    }

    /// Authorize a command through the entity's enforcement unit.
    ///
    /// If the unit stopped itself (load failure fail-stop), it is
    /// recreated and the command is redelivered once.
    pub async fn authorize(&self, command: TwinCommand) -> Result<AuthorizationOutcome> {
        let handle = self.unit_for(&command.entity_id).await;
        match handle.authorize(command.clone()).await {
            Err(EnforcementError::UnitTerminated) => {
                info!(
                    entity_id = %command.entity_id,
                    "Enforcement unit terminated; recreating and redelivering"
                );
                let handle = self.recreate_unit(&command.entity_id).await;
                handle.authorize(command).await
            }
            other => other,
        }
    }

    /// Filter a response through the entity's enforcement unit.
    pub async fn filter_response(&self, response: TwinResponse) -> Result<TwinResponse> {
        let handle = self.unit_for(&response.entity_id).await;
        match handle.filter_response(response.clone()).await {
            Err(EnforcementError::UnitTerminated) => {
                info!(
                    entity_id = %response.entity_id,
                    "Enforcement unit terminated; recreating and redelivering"
                );
                let handle = self.recreate_unit(&response.entity_id).await;
                handle.filter_response(response).await
            }
            other => other,
        }
    }

    /// The number of live units (terminated ones are counted until their
    /// next use discards them).
    pub async fn unit_count(&self) -> usize {
        self.units.lock().await.len()
    }

    async fn unit_for(&self, entity_id: &EntityId) -> EnforcerHandle {
        let mut units = self.units.lock().await;
        if let Some(handle) = units.get(entity_id) {
            if !handle.is_terminated() {
                return handle.clone();
            }
            debug!(entity_id = %entity_id, "Discarding terminated enforcement unit");
        }
        let handle = spawn_enforcer_actor(entity_id.clone(), self.deps.clone(), self.mailbox_capacity);
        units.insert(entity_id.clone(), handle.clone());
        handle
    }

    async fn recreate_unit(&self, entity_id: &EntityId) -> EnforcerHandle {
        let mut units = self.units.lock().await;
        match units.get(entity_id) {
            // another caller already replaced the stopped unit
            Some(handle) if !handle.is_terminated() => handle.clone(),
            _ => {
                let handle =
                    spawn_enforcer_actor(entity_id.clone(), self.deps.clone(), self.mailbox_capacity);
                units.insert(entity_id.clone(), handle.clone());
                handle
            }
        }
    }
}

impl std::fmt::Debug for EnforcerSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnforcerSupervisor")
            .field("mailbox_capacity", &self.mailbox_capacity)
            .finish()
    }
}

//! Shared collaborators for the power action handlers.

use std::sync::Arc;

use tracing::{info, warn};

use powermgmt_core::config::DeferredConfig;
use powermgmt_core::tags::AuditTagFormat;
use powermgmt_core::{Clock, Config, PowerMgmtError, ResourceId, ResourceKind, ResourceState};

use crate::error::{EngineError, Result};
use crate::outbox::Outbox;
use crate::provider::{AlertSuppressor, PowerProvider, ProviderFactory};
use crate::retry::RetryPolicy;

pub struct WorkflowContext {
    pub providers: Arc<dyn ProviderFactory>,
    pub suppressor: Arc<dyn AlertSuppressor>,
    pub outbox: Outbox,
    pub clock: Arc<dyn Clock>,
    pub tag_format: AuditTagFormat,
    pub retry: RetryPolicy,
    pub deferred: DeferredConfig,
}

/// A resource re-read from its provider for one handler invocation.
pub struct LoadedResource {
    pub id: ResourceId,
    pub provider: Arc<dyn PowerProvider>,
    pub state: ResourceState,
}

impl WorkflowContext {
    pub fn new(
        config: &Config,
        providers: Arc<dyn ProviderFactory>,
        suppressor: Arc<dyn AlertSuppressor>,
        outbox: Outbox,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            providers,
            suppressor,
            outbox,
            clock,
            tag_format: AuditTagFormat::new(config.schedule.timezone, config.audit.timestamp_suffix.clone()),
            retry: RetryPolicy::from_config(&config.retry),
            deferred: config.deferred.clone(),
        }
    }

    /// Look up the provider for a message's resource and read its current
    /// state. `None` when the resource no longer exists.
    pub async fn load(&self, kind: &'static str, raw_id: &str, sub_type: Option<&str>) -> Result<Option<LoadedResource>> {
        let id = ResourceId::parse(raw_id).map_err(|e| EngineError::malformed(kind, e.to_string()))?;
        let resource_kind = ResourceKind::resolve(id.resource_type(), sub_type)
            .map_err(|e| EngineError::malformed(kind, e.to_string()))?;
        let provider = self.providers.provider(id.subscription_id(), resource_kind)?;

        match self.retry.run("get", || provider.get(&id)).await {
            Ok(state) => Ok(Some(LoadedResource { id, provider, state })),
            Err(PowerMgmtError::NotFound(_)) => {
                warn!(resource_id = %raw_id, "Resource not found, nothing to do");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the status and last-updated tags. Returns whether the write
    /// applied.
    pub async fn write_status(&self, provider: &dyn PowerProvider, resource: &ResourceState, text: &str) -> Result<bool> {
        let tags = self.tag_format.tags(text, self.clock.now());
        let applied = self
            .retry
            .run("add_tags", || provider.add_tags(resource, tags.clone()))
            .await?;
        if applied {
            info!(resource = %resource.name(), status = %text, "Updated status tags");
        } else {
            warn!(resource = %resource.name(), status = %text, "Status tag update did not apply");
        }
        Ok(applied)
    }
}

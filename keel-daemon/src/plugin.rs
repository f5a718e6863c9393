//! Plugin that applies config requests to disk.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use keel_core::{
    ConfigApplyOutcome, ConfigApplyRequest, ConfigApplySettings, FileAction, FileOverview,
    InstanceId,
};
use keel_sync::{CallContext, FileManagerService, SyncError};

use crate::bus::{BusHandle, Message, Plugin, PluginInfo, Topic};
use crate::error::DaemonError;

pub const FILE_PLUGIN: &str = "file";

/// Runs each [`ConfigApplyRequest`] through a [`FileManagerService`] and
/// publishes a [`ConfigApplyOutcome`] for it.
pub struct FilePlugin {
    manager: FileManagerService,
    settings: ConfigApplySettings,
    shutdown: CancellationToken,
    bus: Option<BusHandle>,
}

impl FilePlugin {
    /// `shutdown` cancels in-flight applies when the daemon stops.
    pub fn new(manager: FileManagerService, shutdown: CancellationToken) -> Self {
        let settings = manager.config().config_apply.clone();
        Self {
            manager,
            settings,
            shutdown,
            bus: None,
        }
    }

    async fn handle_request(&mut self, request: ConfigApplyRequest) -> ConfigApplyOutcome {
        let ctx = CallContext::new()
            .with_correlation_id(request.correlation_id.clone())
            .with_timeout(self.settings.timeout)
            .with_cancel(self.shutdown.child_token());

        let (instance_id, version) = match &request.overview {
            Some(overview) => (
                overview.config_version.instance_id.clone(),
                overview.config_version.version.clone(),
            ),
            None => (self.manager.config().instance_id.clone(), String::new()),
        };

        let result = match &request.overview {
            Some(overview) => self.apply(&ctx, overview, &instance_id).await,
            None => Err(SyncError::InvalidOverview(
                "request carries no overview".to_string(),
            )),
        };

        let error = match result {
            Ok(()) => {
                tracing::info!(
                    correlation_id = %ctx.correlation_id,
                    instance = %instance_id,
                    version = %version,
                    "config apply succeeded",
                );
                None
            }
            Err(err) => {
                tracing::error!(
                    correlation_id = %ctx.correlation_id,
                    instance = %instance_id,
                    error = %err,
                    "config apply failed",
                );
                if self.settings.rollback_on_failure && !err.is_validation() {
                    if let Err(rollback_err) = self.manager.rollback() {
                        tracing::error!(error = %rollback_err, "rollback incomplete");
                    }
                }
                Some(err.to_string())
            }
        };

        ConfigApplyOutcome {
            correlation_id: ctx.correlation_id,
            instance_id,
            version,
            success: error.is_none(),
            error,
            completed_at: Utc::now(),
        }
    }

    async fn apply(
        &mut self,
        ctx: &CallContext,
        overview: &FileOverview,
        instance_id: &InstanceId,
    ) -> Result<(), SyncError> {
        self.manager.config_apply(ctx, overview).await?;

        // Report what is on disk now; a failed report does not undo the apply.
        let present: Vec<PathBuf> = overview
            .files
            .iter()
            .filter(|f| f.action != FileAction::Delete)
            .map(|f| PathBuf::from(f.path()))
            .collect();
        if let Err(err) = self
            .manager
            .update_overview(ctx, instance_id.clone(), &present)
            .await
        {
            tracing::warn!(instance = %instance_id, error = %err, "overview report failed");
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for FilePlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo { name: FILE_PLUGIN }
    }

    fn subscriptions(&self) -> Vec<Topic> {
        vec![Topic::ConfigApplyRequest]
    }

    async fn init(&mut self, bus: BusHandle) -> Result<(), DaemonError> {
        self.bus = Some(bus);
        Ok(())
    }

    async fn process(&mut self, message: Message) {
        let Message::ConfigApplyRequest(request) = message else {
            return;
        };
        let outcome = self.handle_request(request).await;
        match &self.bus {
            Some(bus) => {
                bus.publish(Message::ConfigApplyComplete(outcome));
            }
            None => tracing::warn!("file plugin used before init, outcome dropped"),
        }
    }

    async fn close(&mut self) -> Result<(), DaemonError> {
        tracing::debug!("file plugin closed");
        Ok(())
    }
}

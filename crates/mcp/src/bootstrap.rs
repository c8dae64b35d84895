use std::sync::Arc;

use impltrack_core::config::{AppConfig, ConfigError};
use impltrack_core::errors::GatewayError;
use impltrack_crm::{AccessControlPolicy, ClientBuildError, SalesforceApi, SalesforceClient};
use thiserror::Error;
use tracing::info;

use crate::gateway::Gateway;

pub struct Application {
    pub config: AppConfig,
    pub gateway: Arc<Gateway>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Client(#[from] ClientBuildError),
    #[error("startup token exchange failed: {0}")]
    Authentication(#[source] GatewayError),
    #[error("operating user could not be resolved: {0}")]
    Identity(#[source] GatewayError),
}

/// Authenticates, resolves the operating user, and assembles the gateway.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        instance_url = %config.salesforce.instance_url,
        "starting application bootstrap"
    );

    let client = Arc::new(SalesforceClient::new(&config.salesforce)?);
    client.authenticate().await.map_err(BootstrapError::Authentication)?;
    info!(
        event_name = "system.bootstrap.authenticated",
        correlation_id = "bootstrap",
        "salesforce session established"
    );

    let api: Arc<dyn SalesforceApi> = client;
    let access = AccessControlPolicy::resolve(
        api.clone(),
        &config.access.user_email,
        config.access.manager_email.as_deref(),
    )
    .await
    .map_err(BootstrapError::Identity)?;
    info!(
        event_name = "system.bootstrap.identity_resolved",
        correlation_id = "bootstrap",
        user_id = %access.identity().user_id,
        "operating user resolved"
    );

    let gateway = Gateway::new(api, access, config.limits.policy());
    Ok(Application { config, gateway: Arc::new(gateway) })
}

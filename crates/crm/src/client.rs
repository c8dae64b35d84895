//! Authenticated Salesforce REST client.
//!
//! Tokens come from the OAuth2 client-credentials flow. Every request carries the
//! current bearer token; a 401 triggers exactly one re-authentication and one retry.

use std::time::Duration;

use async_trait::async_trait;
use impltrack_core::config::SalesforceConfig;
use impltrack_core::errors::{GatewayError, GatewayResult, UpstreamError};
use reqwest::{Client, Method, Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("impltrack/", env!("CARGO_PKG_VERSION"));

/// Field name to value map, the shape Salesforce uses for record bodies.
pub type Record = Map<String, Value>;

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct QueryResult {
    #[serde(rename = "totalSize", default)]
    pub total_size: u64,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub records: Vec<Record>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct CreatedRecord {
    pub id: String,
}

/// The four REST calls the gateway needs.
#[async_trait]
pub trait SalesforceApi: Send + Sync {
    async fn query(&self, soql: &str) -> GatewayResult<QueryResult>;

    async fn get_record(&self, object: &str, id: &str, fields: &[&str]) -> GatewayResult<Record>;

    async fn create_record(&self, object: &str, fields: &Record) -> GatewayResult<CreatedRecord>;

    async fn update_record(&self, object: &str, id: &str, fields: &Record) -> GatewayResult<()>;
}

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("invalid Salesforce instance url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
}

struct AccessToken {
    generation: u64,
    value: SecretString,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AuthAttempt {
    Initial,
    AfterReauth,
}

impl AuthAttempt {
    fn next(self) -> Option<Self> {
        match self {
            Self::Initial => Some(Self::AfterReauth),
            Self::AfterReauth => None,
        }
    }
}

pub struct SalesforceClient {
    http: Client,
    data_url: Url,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    token: RwLock<Option<AccessToken>>,
    reauth: Mutex<()>,
}

impl std::fmt::Debug for SalesforceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SalesforceClient")
            .field("data_url", &self.data_url.as_str())
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl SalesforceClient {
    pub fn new(config: &SalesforceConfig) -> Result<Self, ClientBuildError> {
        let data_url = config.data_url();
        let parsed = Url::parse(&data_url).map_err(|error| ClientBuildError::InvalidUrl {
            url: config.instance_url.clone(),
            reason: error.to_string(),
        })?;
        if parsed.cannot_be_a_base() || !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientBuildError::InvalidUrl {
                url: config.instance_url.clone(),
                reason: "expected an http(s) url".to_string(),
            });
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            data_url: parsed,
            token_url: config.token_url(),
            client_id: config.client_id.clone(),
            client_secret: SecretString::from(config.client_secret.expose_secret().to_owned()),
            token: RwLock::new(None),
            reauth: Mutex::new(()),
        })
    }

    /// Acquires a fresh access token, replacing any held one.
    pub async fn authenticate(&self) -> GatewayResult<()> {
        let _guard = self.reauth.lock().await;
        self.exchange_token().await
    }

    /// Re-authenticates unless another caller already replaced the token seen as stale.
    async fn refresh(&self, stale_generation: Option<u64>) -> GatewayResult<()> {
        let _guard = self.reauth.lock().await;
        let current = self.token.read().await.as_ref().map(|token| token.generation);
        if current.is_some() && current != stale_generation {
            debug!(event_name = "salesforce.auth.refresh_skipped", "token already refreshed");
            return Ok(());
        }
        self.exchange_token().await
    }

    async fn exchange_token(&self) -> GatewayResult<()> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
            ])
            .send()
            .await
            .map_err(|error| {
                warn!(
                    event_name = "salesforce.auth.request_failed",
                    error = %error,
                    "token request failed"
                );
                GatewayError::Authentication(format!("token request failed: {error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                event_name = "salesforce.auth.rejected",
                status = status.as_u16(),
                "token endpoint rejected credentials"
            );
            return Err(GatewayError::Authentication(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: OAuthTokenResponse = response.json().await.map_err(|error| {
            GatewayError::Authentication(format!("failed to decode token response: {error}"))
        })?;
        if token.access_token.is_empty() {
            return Err(GatewayError::Authentication(
                "token endpoint returned empty access token".to_string(),
            ));
        }

        let mut slot = self.token.write().await;
        let generation = slot.as_ref().map_or(1, |held| held.generation + 1);
        *slot = Some(AccessToken { generation, value: SecretString::from(token.access_token) });
        info!(event_name = "salesforce.auth.token_acquired", generation, "access token acquired");
        Ok(())
    }

    async fn bearer(&self) -> GatewayResult<(u64, String)> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok((token.generation, token.value.expose_secret().to_owned()));
        }

        self.refresh(None).await?;
        let slot = self.token.read().await;
        slot.as_ref()
            .map(|token| (token.generation, token.value.expose_secret().to_owned()))
            .ok_or_else(|| GatewayError::Authentication("no access token available".to_string()))
    }

    fn endpoint(&self, segments: &[&str]) -> GatewayResult<Url> {
        let mut url = self.data_url.clone();
        url.path_segments_mut()
            .map_err(|()| UpstreamError::transport("instance url cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        params: &[(&str, String)],
        body: Option<&Record>,
    ) -> GatewayResult<Response> {
        let mut attempt = AuthAttempt::Initial;
        loop {
            let (generation, bearer) = self.bearer().await?;
            let mut request = self.http.request(method.clone(), url.clone()).bearer_auth(bearer);
            if !params.is_empty() {
                request = request.query(params);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!(event_name = "salesforce.request", method = %method, path = url.path());
            let response = request
                .send()
                .await
                .map_err(|error| UpstreamError::transport(error.to_string()))?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                if let Some(next) = attempt.next() {
                    warn!(
                        event_name = "salesforce.auth.expired",
                        path = url.path(),
                        "request unauthorized, re-authenticating once"
                    );
                    self.refresh(Some(generation)).await?;
                    attempt = next;
                    continue;
                }
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!(
                    event_name = "salesforce.request_failed",
                    method = %method,
                    path = url.path(),
                    status = status.as_u16(),
                    "salesforce request failed"
                );
                return Err(UpstreamError::status(status.as_u16(), body).into());
            }

            return Ok(response);
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> GatewayResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|error| UpstreamError::transport(format!("invalid response body: {error}")).into())
}

#[async_trait]
impl SalesforceApi for SalesforceClient {
    async fn query(&self, soql: &str) -> GatewayResult<QueryResult> {
        let url = self.endpoint(&["query", ""])?;
        let response = self.send(Method::GET, url, &[("q", soql.to_string())], None).await?;
        decode(response).await
    }

    async fn get_record(&self, object: &str, id: &str, fields: &[&str]) -> GatewayResult<Record> {
        let url = self.endpoint(&["sobjects", object, id])?;
        let params =
            if fields.is_empty() { Vec::new() } else { vec![("fields", fields.join(","))] };
        let response = self.send(Method::GET, url, &params, None).await?;
        decode(response).await
    }

    async fn create_record(&self, object: &str, fields: &Record) -> GatewayResult<CreatedRecord> {
        let url = self.endpoint(&["sobjects", object])?;
        let response = self.send(Method::POST, url, &[], Some(fields)).await?;
        decode(response).await
    }

    async fn update_record(&self, object: &str, id: &str, fields: &Record) -> GatewayResult<()> {
        let url = self.endpoint(&["sobjects", object, id])?;
        self.send(Method::PATCH, url, &[], Some(fields)).await?;
        Ok(())
    }
}

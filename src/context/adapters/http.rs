use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};

use crate::{
    context::{
        error::{ContextError, not_found, timeout, transport},
        ports::{IdentityGraphPort, MemoryServicePort, PreferenceEnginePort},
        types::{ContextWindow, IdentityRecord, MemoryRecord, SoftConstraint},
    },
    types::{CallContext, CreatorId},
};

pub const CORRELATION_HEADER: &str = "x-correlation-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared JSON-over-HTTP transport for the three context stores.
#[derive(Clone)]
pub struct HttpContextClient {
    client: Client,
    base_url: String,
    service: &'static str,
}

impl HttpContextClient {
    pub fn new(client: Client, base_url: impl Into<String>, service: &'static str) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        call: &CallContext,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ContextError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header(CORRELATION_HEADER, &call.correlation_id)
            .header(REQUEST_ID_HEADER, &call.request_id)
            .query(query)
            .send()
            .await
            .map_err(|err| self.map_send_error(err))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(not_found(format!("{} has no record at {}", self.service, path)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = body.chars().take(240).collect::<String>();
            return Err(transport(format!(
                "{} returned status {}: {}",
                self.service,
                status.as_u16(),
                body
            )));
        }

        response.json::<T>().await.map_err(|err| {
            transport(format!("{} returned an invalid body: {}", self.service, err))
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> ContextError {
        if err.is_timeout() {
            timeout(format!("{} timed out", self.service))
        } else {
            transport(format!("{} request failed: {}", self.service, err))
        }
    }
}

pub fn build_http_client(request_timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .pool_idle_timeout(Duration::from_secs(30))
        .timeout(request_timeout)
        .build()
}

pub struct HttpIdentityGraph {
    inner: HttpContextClient,
}

impl HttpIdentityGraph {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            inner: HttpContextClient::new(client, base_url, "identity_graph"),
        }
    }
}

#[async_trait]
impl IdentityGraphPort for HttpIdentityGraph {
    async fn get_snapshot(
        &self,
        call: &CallContext,
        creator_id: &CreatorId,
    ) -> Result<IdentityRecord, ContextError> {
        self.inner
            .get_json(call, &format!("/v1/identity/{creator_id}"), &[])
            .await
    }
}

#[derive(Debug, Deserialize)]
struct ModifiersBody {
    #[serde(default)]
    modifiers: Vec<SoftConstraint>,
}

pub struct HttpPreferenceEngine {
    inner: HttpContextClient,
}

impl HttpPreferenceEngine {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            inner: HttpContextClient::new(client, base_url, "preference_engine"),
        }
    }
}

#[async_trait]
impl PreferenceEnginePort for HttpPreferenceEngine {
    async fn get_modifiers(
        &self,
        call: &CallContext,
        creator_id: &CreatorId,
    ) -> Result<Vec<SoftConstraint>, ContextError> {
        let body: ModifiersBody = self
            .inner
            .get_json(call, &format!("/v1/preferences/{creator_id}"), &[])
            .await?;
        Ok(body.modifiers)
    }
}

#[derive(Debug, Deserialize)]
struct SlicesBody {
    #[serde(default)]
    records: Vec<MemoryRecord>,
}

pub struct HttpMemoryService {
    inner: HttpContextClient,
}

impl HttpMemoryService {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            inner: HttpContextClient::new(client, base_url, "memory_service"),
        }
    }
}

#[async_trait]
impl MemoryServicePort for HttpMemoryService {
    async fn get_relevant_slices(
        &self,
        call: &CallContext,
        creator_id: &CreatorId,
        window: ContextWindow,
    ) -> Result<Vec<MemoryRecord>, ContextError> {
        let body: SlicesBody = self
            .inner
            .get_json(
                call,
                &format!("/v1/memory/{creator_id}/slices"),
                &[
                    ("lookback_days", window.lookback_days.to_string()),
                    ("max_records", window.max_records.to_string()),
                ],
            )
            .await?;
        Ok(body.records)
    }
}

//! HTTP client for the machines REST API.
//!
//! Implements [`MachinePlatform`] and [`AppDirectory`] for one app.
//! Non-2xx responses are classified into [`MachineError`] variants so the
//! application layer never sees raw HTTP statuses.

use std::time::Duration;

use anyhow::{Context, Result};
use flotilla_common::{App, LaunchInput, LeaseGrant, Machine, MachineConfig, MachineEvent};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::application::ports::{AppDirectory, MachineFilter, MachinePlatform};
use crate::domain::MachineError;

/// Upper bound for a single API request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying the lease nonce on mutating requests.
pub const LEASE_NONCE_HEADER: &str = "flotilla-lease-nonce";

#[derive(Serialize)]
struct LeaseRequest {
    ttl: u64,
}

#[derive(Serialize)]
struct UpdateRequest<'a> {
    config: &'a MachineConfig,
}

#[derive(Serialize)]
struct StopRequest {
    timeout: u64,
}

/// Machines API client scoped to a single app.
pub struct HttpPlatformClient {
    client: reqwest::Client,
    base_url: String,
    app: String,
}

impl HttpPlatformClient {
    /// Build a client authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not a valid header value or the
    /// HTTP client cannot be constructed.
    pub fn new(base_url: &str, token: &str, app: &str) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .context("API token contains characters not allowed in an HTTP header")?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("flotilla/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            app: app.to_string(),
        })
    }

    fn app_url(&self) -> String {
        format!("{}/v1/apps/{}", self.base_url, self.app)
    }

    fn machines_url(&self) -> String {
        format!("{}/machines", self.app_url())
    }

    fn machine_url(&self, machine_id: &str) -> String {
        format!("{}/{machine_id}", self.machines_url())
    }

    async fn send(&self, request: RequestBuilder, machine_id: Option<&str>) -> Result<Response> {
        let request = request.build().context("failed to build API request")?;
        let method = request.method().clone();
        let url = request.url().clone();
        tracing::debug!(%method, %url, "platform request");

        let response = self
            .client
            .execute(request)
            .await
            .with_context(|| format!("{method} {url} failed"))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(%method, %url, status = status.as_u16(), %body, "platform error response");
        Err(classify(status, error_message(&body), machine_id).into())
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        machine_id: Option<&str>,
    ) -> Result<T> {
        self.send(request, machine_id)
            .await?
            .json::<T>()
            .await
            .context("cannot parse platform response")
    }
}

/// Map a failed response onto the error taxonomy.
#[must_use]
pub fn classify(status: StatusCode, message: String, machine_id: Option<&str>) -> MachineError {
    match (status.as_u16(), machine_id) {
        (404, Some(id)) => MachineError::NotFound { id: id.to_string() },
        (409, Some(id)) => MachineError::LeaseConflict { id: id.to_string() },
        (400 | 422, _) => MachineError::Validation { message },
        (code, _) => MachineError::Api {
            status: code,
            message,
        },
    }
}

/// Extract the human-readable message from an error body.
#[must_use]
pub fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "message"] {
            if let Some(msg) = value.get(key).and_then(serde_json::Value::as_str) {
                return msg.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no details provided".to_string()
    } else {
        trimmed.to_string()
    }
}

impl MachinePlatform for HttpPlatformClient {
    async fn get(&self, machine_id: &str) -> Result<Machine> {
        self.send_json(self.client.get(self.machine_url(machine_id)), Some(machine_id))
            .await
    }

    async fn list(&self, filter: &MachineFilter) -> Result<Vec<Machine>> {
        let mut request = self.client.get(self.machines_url());
        if let Some(region) = &filter.region {
            request = request.query(&[("region", region.as_str())]);
        }
        if filter.include_deleted {
            request = request.query(&[("include_deleted", "true")]);
        }
        let machines: Vec<Machine> = self.send_json(request, None).await?;
        Ok(machines
            .into_iter()
            .filter(|m| filter.state.is_none_or(|s| m.state == s))
            .collect())
    }

    async fn acquire_lease(&self, machine_id: &str, ttl: Duration) -> Result<LeaseGrant> {
        let request = self
            .client
            .post(format!("{}/lease", self.machine_url(machine_id)))
            .json(&LeaseRequest { ttl: ttl.as_secs() });
        self.send_json(request, Some(machine_id)).await
    }

    async fn release_lease(&self, machine_id: &str, nonce: &str) -> Result<()> {
        let request = self
            .client
            .delete(format!("{}/lease", self.machine_url(machine_id)))
            .header(LEASE_NONCE_HEADER, nonce);
        self.send(request, Some(machine_id)).await?;
        Ok(())
    }

    async fn update(
        &self,
        machine_id: &str,
        config: &MachineConfig,
        nonce: &str,
    ) -> Result<Machine> {
        let request = self
            .client
            .post(self.machine_url(machine_id))
            .header(LEASE_NONCE_HEADER, nonce)
            .json(&UpdateRequest { config });
        self.send_json(request, Some(machine_id)).await
    }

    async fn launch(&self, input: &LaunchInput) -> Result<Machine> {
        let request = self.client.post(self.machines_url()).json(input);
        self.send_json(request, None).await
    }

    async fn stop(&self, machine_id: &str, nonce: Option<&str>, timeout: Duration) -> Result<()> {
        let mut request = self
            .client
            .post(format!("{}/stop", self.machine_url(machine_id)))
            .timeout(timeout.max(Duration::from_secs(1)))
            .json(&StopRequest {
                timeout: timeout.as_secs(),
            });
        if let Some(nonce) = nonce {
            request = request.header(LEASE_NONCE_HEADER, nonce);
        }
        self.send(request, Some(machine_id)).await?;
        Ok(())
    }

    async fn events(&self, machine_id: &str) -> Result<Vec<MachineEvent>> {
        let request = self
            .client
            .get(format!("{}/events", self.machine_url(machine_id)));
        let mut events: Vec<MachineEvent> = self.send_json(request, Some(machine_id)).await?;
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }
}

impl AppDirectory for HttpPlatformClient {
    async fn app(&self, name: &str) -> Result<App> {
        let url = format!("{}/v1/apps/{name}", self.base_url);
        match self.send_json(self.client.get(url), None).await {
            Err(err)
                if matches!(
                    err.downcast_ref::<MachineError>(),
                    Some(MachineError::Api { status: 404, .. })
                ) =>
            {
                Err(anyhow::anyhow!("app {name} not found"))
            }
            other => other,
        }
    }
}

//! reqwest-backed control-plane gateway.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response};
use tracing::debug;
use url::Url;

use super::ControlPlaneGateway;
use super::error::ControlPlaneError;
use super::error_mapping::{map_status_error, map_transport_error};
use super::models::{
    Acknowledgement, ApiApplication, ApiApplicationRequest, ApiRepositoryRequest, ApiSyncRequest,
    Observation, SyncOptions,
};
use crate::application::{ApplicationName, ApplicationSpec};
use crate::repository::RepositoryCredential;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Where and how to reach the control-plane API.
#[derive(Clone, PartialEq, Eq)]
pub struct ControlPlaneEndpoint {
    /// Base URL of the API server, e.g. `https://cd.example.com`.
    pub api_url: String,
    /// Bearer token sent with every request.
    pub auth_token: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl ControlPlaneEndpoint {
    /// Endpoint with the default request timeout.
    #[must_use]
    pub fn new(api_url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            api_url: api_url.into(),
            auth_token,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl std::fmt::Debug for ControlPlaneEndpoint {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ControlPlaneEndpoint")
            .field("api_url", &self.api_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Gateway speaking the control plane's REST API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: Client,
    api_base: Url,
    auth_token: Option<String>,
}

impl HttpControlPlane {
    /// Builds a gateway for the endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::InvalidUrl`] when the API URL cannot be
    /// parsed or the HTTP client cannot be configured.
    pub fn new(endpoint: &ControlPlaneEndpoint) -> Result<Self, ControlPlaneError> {
        let mut api_base =
            Url::parse(endpoint.api_url.trim()).map_err(|error| ControlPlaneError::InvalidUrl {
                message: format!("{}: {error}", endpoint.api_url),
            })?;
        if !api_base.path().ends_with('/') {
            let with_slash = format!("{}/", api_base.path());
            api_base.set_path(&with_slash);
        }

        let client = Client::builder()
            .timeout(endpoint.request_timeout)
            .build()
            .map_err(|error| ControlPlaneError::InvalidUrl {
                message: format!("failed to configure HTTP client: {error}"),
            })?;

        Ok(Self {
            client,
            api_base,
            auth_token: endpoint.auth_token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ControlPlaneError> {
        self.api_base
            .join(path)
            .map_err(|error| ControlPlaneError::InvalidUrl {
                message: format!("{path}: {error}"),
            })
    }

    fn application_url(
        &self,
        name: &ApplicationName,
        suffix: &str,
    ) -> Result<Url, ControlPlaneError> {
        self.endpoint(&format!("api/v1/applications/{}{suffix}", name.as_str()))
    }

    fn authorise(&self, request: RequestBuilder) -> RequestBuilder {
        match self.auth_token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        operation: &str,
        resource: &str,
        request: RequestBuilder,
    ) -> Result<Response, ControlPlaneError> {
        let response = self
            .authorise(request)
            .send()
            .await
            .map_err(|error| map_transport_error(operation, &error))?;

        let status = response.status();
        debug!(operation, resource, status = status.as_u16(), "control-plane response");
        if status.is_success() {
            return Ok(response);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(error) => format!("failed to read response body: {error}"),
        };
        Err(map_status_error(operation, resource, status, &body))
    }
}

#[async_trait]
impl ControlPlaneGateway for HttpControlPlane {
    async fn upsert_repository(
        &self,
        credential: &RepositoryCredential,
    ) -> Result<Acknowledgement, ControlPlaneError> {
        let mut url = self.endpoint("api/v1/repositories")?;
        url.query_pairs_mut().append_pair("upsert", "true");
        let payload = ApiRepositoryRequest::from(credential);
        let resource = format!("repository {}", credential.url());

        self.send("register repository", &resource, self.client.post(url).json(&payload))
            .await?;
        Ok(Acknowledgement {
            message: format!("repository '{}' registered", credential.url()),
        })
    }

    async fn create_application(
        &self,
        spec: &ApplicationSpec,
    ) -> Result<Acknowledgement, ControlPlaneError> {
        let url = self.endpoint("api/v1/applications")?;
        let payload = ApiApplicationRequest::from(spec);
        let resource = format!("application {}", spec.name());

        self.send("create application", &resource, self.client.post(url).json(&payload))
            .await?;
        Ok(Acknowledgement {
            message: format!("application '{}' created", spec.name()),
        })
    }

    async fn sync_application(
        &self,
        name: &ApplicationName,
        options: &SyncOptions,
    ) -> Result<Acknowledgement, ControlPlaneError> {
        let url = self.application_url(name, "/sync")?;
        let payload = ApiSyncRequest {
            prune: options.prune,
        };
        let resource = format!("application {name}");

        self.send("sync application", &resource, self.client.post(url).json(&payload))
            .await?;
        Ok(Acknowledgement {
            message: format!("sync of application '{name}' requested"),
        })
    }

    async fn delete_application(
        &self,
        name: &ApplicationName,
        cascade: bool,
    ) -> Result<Acknowledgement, ControlPlaneError> {
        let mut url = self.application_url(name, "")?;
        url.query_pairs_mut()
            .append_pair("cascade", if cascade { "true" } else { "false" });
        let resource = format!("application {name}");

        self.send("delete application", &resource, self.client.delete(url))
            .await?;
        Ok(Acknowledgement {
            message: format!("application '{name}' deleted"),
        })
    }

    async fn application(&self, name: &ApplicationName) -> Result<Observation, ControlPlaneError> {
        let url = self.application_url(name, "")?;
        let resource = format!("application {name}");

        let outcome = self
            .send("get application", &resource, self.client.get(url))
            .await;
        let response = match outcome {
            Ok(response) => response,
            Err(ControlPlaneError::NotFound { .. }) => {
                return Ok(Observation::Absent {
                    name: name.as_str().to_owned(),
                });
            }
            Err(error) => return Err(error),
        };

        let application: ApiApplication = response
            .json()
            .await
            .map_err(|error| map_transport_error("decode application", &error))?;
        Ok(Observation::Present(application.into_snapshot(name, Utc::now())))
    }
}

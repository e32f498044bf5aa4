//! HTTP client for the PrusaLink status API.

use std::time::Duration;

use digest_auth::AuthContext;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::trace;

use crate::config::PrinterConfig;
use crate::status::{InfoResponse, JobResponse, PrinterSnapshot, StatusResponse, VersionResponse};

pub const VERSION_PATH: &str = "/api/version";
pub const STATUS_PATH: &str = "/api/v1/status";
pub const INFO_PATH: &str = "/api/v1/info";
pub const JOB_PATH: &str = "/api/v1/job";

/// Reasons a fetch from the printer failed.
///
/// The metrics layer treats all of these the same way; the variants exist
/// so the poller can log something useful.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("Request to {path} timed out")]
    Timeout { path: &'static str },
    #[error("Request to {path} failed: {source}")]
    Request {
        path: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Authentication for {path} failed: {reason}")]
    Auth { path: &'static str, reason: String },
    #[error("{path} returned HTTP {status}")]
    Status {
        path: &'static str,
        status: StatusCode,
    },
    #[error("Failed to parse {path}: {source}")]
    Decode {
        path: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Client for a single printer.
#[derive(Debug, Clone)]
pub struct PrinterClient {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    api_key: Option<String>,
}

impl PrinterClient {
    /// Create a client whose requests each time out after `timeout`.
    pub fn new(printer: &PrinterConfig, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("prusalink-exporter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            client,
            base_url: printer.base_url(),
            username: printer.username.clone(),
            password: printer.password.clone(),
            api_key: printer.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch every endpoint. Any single failure fails the whole snapshot.
    pub async fn fetch(&self) -> Result<PrinterSnapshot, ClientError> {
        let version = self.get_json::<VersionResponse>(VERSION_PATH).await?;
        let status = self.get_json::<StatusResponse>(STATUS_PATH).await?;
        let info = self.get_json::<InfoResponse>(INFO_PATH).await?;
        let job = self.get_json::<JobResponse>(JOB_PATH).await?;

        Ok(PrinterSnapshot {
            version: version.unwrap_or_default(),
            status: status.unwrap_or_default(),
            info: info.unwrap_or_default(),
            job,
        })
    }

    /// GET a path and decode its JSON body. `Ok(None)` means 204 No Content.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &'static str,
    ) -> Result<Option<T>, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        trace!(%url, "GET");

        let mut response = self.send(path, &url, None).await?;

        // PrusaLink answers user/password access with a Digest challenge.
        if response.status() == StatusCode::UNAUTHORIZED
            && let Some(username) = &self.username
        {
            let authorization = self.digest_authorization(path, &response, username)?;
            response = self.send(path, &url, Some(authorization)).await?;
        }

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ClientError::Status { path, status });
        }

        let body = response.bytes().await.map_err(|e| request_error(path, e))?;
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|source| ClientError::Decode { path, source })
    }

    async fn send(
        &self,
        path: &'static str,
        url: &str,
        authorization: Option<String>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }
        if let Some(authorization) = authorization {
            request = request.header(AUTHORIZATION, authorization);
        }

        request.send().await.map_err(|e| request_error(path, e))
    }

    /// Answer the `WWW-Authenticate: Digest` challenge carried by a 401.
    fn digest_authorization(
        &self,
        path: &'static str,
        response: &reqwest::Response,
        username: &str,
    ) -> Result<String, ClientError> {
        let auth_error = |reason: String| ClientError::Auth { path, reason };

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| auth_error("missing WWW-Authenticate challenge".to_string()))?;

        let mut prompt = digest_auth::parse(challenge).map_err(|e| auth_error(e.to_string()))?;
        let context = AuthContext::new(
            username,
            self.password.as_deref().unwrap_or(""),
            response.url().path(),
        );
        let answer = prompt
            .respond(&context)
            .map_err(|e| auth_error(e.to_string()))?;

        Ok(answer.to_header_string())
    }
}

fn request_error(path: &'static str, source: reqwest::Error) -> ClientError {
    if source.is_timeout() {
        ClientError::Timeout { path }
    } else {
        ClientError::Request { path, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_uses_printer_base_url() {
        let printer = PrinterConfig::new("prusaxl.local/");
        let client = PrinterClient::new(&printer, Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://prusaxl.local");
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        // Port 1 is privileged and nothing listens there in test environments.
        let printer = PrinterConfig::new("127.0.0.1:1");
        let client = PrinterClient::new(&printer, Duration::from_secs(2)).unwrap();

        let err = client.fetch().await.unwrap_err();
        assert!(err.to_string().contains(VERSION_PATH), "{}", err);
    }
}

//! HTTP wrapper for the Petasync admin API.
//!
//! Every backend call goes through [`ApiClient::request`]: it attaches the
//! bearer token when one is supplied, retries transient failures (5xx and
//! transport errors) with linear backoff, and classifies `401` separately so
//! the session layer can drive refresh-and-retry or logout. The wrapper
//! never panics; every failure path resolves to an [`ApiError`].

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{debug, info_span, warn, Instrument};
use url::Url;

use crate::APP_USER_AGENT;

pub mod types;

/// Total attempts per request: the first try plus two retries.
pub const MAX_ATTEMPTS: u32 = 3;

const BACKOFF_UNIT_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The server rejected the credential (`401`). Never retried; the caller
    /// decides between refresh-and-retry and falling back to anonymous.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Any other non-2xx response, carrying the server-provided message.
    /// Never retried.
    #[error("{0}")]
    Rejected(String),
    /// Transient failures (5xx or transport errors) that survived the whole
    /// retry budget.
    #[error("request failed after {attempts} attempts: {message}")]
    Exhausted { attempts: u32, message: String },
    /// The client itself could not be set up (bad base URL).
    #[error("invalid API configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// True for `401` rejections.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

fn api_error_message(status: StatusCode, body: &Value) -> String {
    body.get("error")
        .and_then(Value::as_str)
        .map_or_else(|| status.to_string(), ToString::to_string)
}

/// JSON client for the admin API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client for the given base URL (scheme + host + optional path
    /// prefix, e.g. `http://localhost:8080/api`).
    ///
    /// # Errors
    /// Returns an error if the URL cannot be parsed, has no host, or uses an
    /// unsupported scheme.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let parsed = Url::parse(base_url).map_err(|err| ApiError::Config(err.to_string()))?;

        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(ApiError::Config(format!("unsupported scheme {scheme}")));
            }
        }

        if parsed.host().is_none() {
            return Err(ApiError::Config("no host specified".to_string()));
        }

        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()
            .map_err(|err| ApiError::Config(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Issue a request, retrying 5xx and transport errors with backoff
    /// `1000ms * (attempt + 1)` up to `max_attempts` total attempts.
    ///
    /// # Errors
    /// - [`ApiError::Unauthorized`] on `401`, immediately.
    /// - [`ApiError::Rejected`] on any other non-2xx, immediately.
    /// - [`ApiError::Exhausted`] once the retry budget is spent.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        bearer: Option<&str>,
        max_attempts: u32,
    ) -> Result<Value, ApiError> {
        let url = self.endpoint_url(path);
        let max_attempts = max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let backoff = Duration::from_millis(BACKOFF_UNIT_MS * u64::from(attempt));
                warn!("Retrying {url} in {}ms: {last_error}", backoff.as_millis());
                sleep(backoff).await;
            }

            let mut builder = self.client.request(method.clone(), &url);
            if let Some(token) = bearer {
                builder = builder.bearer_auth(token);
            }
            if let Some(payload) = body {
                builder = builder.json(payload);
            }

            let span = info_span!(
                "api.request",
                http.method = %method,
                url = %url,
                attempt
            );

            match builder.send().instrument(span).await {
                Ok(response) => {
                    let status = response.status();
                    let json_body = response
                        .text()
                        .await
                        .ok()
                        .filter(|text| !text.is_empty())
                        .and_then(|text| serde_json::from_str::<Value>(&text).ok())
                        .unwrap_or(Value::Null);

                    if status.is_success() {
                        debug!("{url} - {status}");
                        return Ok(json_body);
                    }

                    let message = api_error_message(status, &json_body);

                    if status == StatusCode::UNAUTHORIZED {
                        return Err(ApiError::Unauthorized(message));
                    }

                    if status.is_server_error() {
                        last_error = format!("{url} - {status}, {message}");
                        continue;
                    }

                    return Err(ApiError::Rejected(message));
                }
                Err(err) => {
                    last_error = format!("{url} - {err}");
                    continue;
                }
            }
        }

        Err(ApiError::Exhausted {
            attempts: max_attempts,
            message: last_error,
        })
    }

    /// `POST` a JSON body with the default retry budget.
    ///
    /// # Errors
    /// See [`ApiClient::request`].
    pub async fn post(
        &self,
        path: &str,
        body: &Value,
        bearer: Option<&str>,
    ) -> Result<Value, ApiError> {
        self.request(Method::POST, path, Some(body), bearer, MAX_ATTEMPTS)
            .await
    }

    /// `GET` with the default retry budget.
    ///
    /// # Errors
    /// See [`ApiClient::request`].
    pub async fn get(&self, path: &str, bearer: Option<&str>) -> Result<Value, ApiError> {
        self.request(Method::GET, path, None, bearer, MAX_ATTEMPTS)
            .await
    }
}

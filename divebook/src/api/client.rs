use std::time::Duration;

use reqwest::multipart::Form;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::session::Session;

/// How a request authenticates against the booking API.
#[derive(Debug, Clone, Copy)]
pub enum Auth<'a> {
    Anonymous,
    /// Bearer token taken from the visitor's session.
    Session(&'a Session),
    Token(&'a str),
}

impl<'a> Auth<'a> {
    fn bearer(self) -> Result<Option<&'a str>, ClientError> {
        match self {
            Auth::Anonymous => Ok(None),
            Auth::Session(session) => session
                .token()
                .map(Some)
                .ok_or(ClientError::MissingToken),
            Auth::Token(token) if !token.trim().is_empty() => Ok(Some(token)),
            Auth::Token(_) => Err(ClientError::MissingToken),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("authentication required")]
    MissingToken,
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// Non-2xx answer; `body` is the backend's error payload, untouched.
    #[error("{message}")]
    Api {
        status: StatusCode,
        message: String,
        body: Value,
    },
    #[error("unexpected response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Data { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Envelope::Data { data } => data,
            Envelope::Bare(inner) => inner,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("divebook/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        auth: Auth<'_>,
    ) -> Result<T, ClientError> {
        self.send(Method::GET, endpoint, auth, |request| request)
            .await
    }

    pub async fn get_query<Q, T>(
        &self,
        endpoint: &str,
        query: &Q,
        auth: Auth<'_>,
    ) -> Result<T, ClientError>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(Method::GET, endpoint, auth, |request| request.query(query))
            .await
    }

    pub async fn post<B, T>(&self, endpoint: &str, data: &B, auth: Auth<'_>) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(Method::POST, endpoint, auth, |request| request.json(data))
            .await
    }

    pub async fn put<B, T>(&self, endpoint: &str, data: &B, auth: Auth<'_>) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(Method::PUT, endpoint, auth, |request| request.json(data))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        auth: Auth<'_>,
    ) -> Result<T, ClientError> {
        self.send(Method::DELETE, endpoint, auth, |request| request)
            .await
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        form: Form,
        auth: Auth<'_>,
    ) -> Result<T, ClientError> {
        self.send(Method::POST, endpoint, auth, |request| request.multipart(form))
            .await
    }

    async fn send<T, F>(
        &self,
        method: Method,
        endpoint: &str,
        auth: Auth<'_>,
        build: F,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        let token = auth.bearer()?;
        let mut request = self.http.request(method.clone(), self.url(endpoint));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = build(request).send().await.map_err(|source| {
            warn!(%method, endpoint, error = %source, "backend unreachable");
            ClientError::Transport {
                endpoint: endpoint.to_string(),
                source,
            }
        })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|source| ClientError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        if !status.is_success() {
            let error = api_error(status, &bytes);
            warn!(
                %method,
                endpoint,
                status = status.as_u16(),
                error = %error,
                "backend request failed"
            );
            return Err(error);
        }

        debug!(%method, endpoint, status = status.as_u16(), "backend request ok");
        decode_body(endpoint, &bytes)
    }
}

/// Decode a success body, bare or wrapped in `{"data": ...}`. An empty body
/// reads as `null`.
fn decode_body<T: DeserializeOwned>(endpoint: &str, bytes: &[u8]) -> Result<T, ClientError> {
    let decode_error = |source| ClientError::Decode {
        endpoint: endpoint.to_string(),
        source,
    };

    let value = if bytes.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(bytes).map_err(decode_error)?
    };

    serde_json::from_value::<Envelope<T>>(value)
        .map(Envelope::into_inner)
        .map_err(decode_error)
}

fn api_error(status: StatusCode, bytes: &[u8]) -> ClientError {
    let body = serde_json::from_slice::<Value>(bytes).unwrap_or_else(|_| {
        let text = String::from_utf8_lossy(bytes).trim().to_string();
        if text.is_empty() {
            Value::Null
        } else {
            Value::String(text)
        }
    });

    let message = extract_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });

    ClientError::Api {
        status,
        message,
        body,
    }
}

fn extract_message(body: &Value) -> Option<String> {
    match body {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Object(fields) => ["message", "error", "detail", "msg"]
            .iter()
            .find_map(|key| match fields.get(*key) {
                Some(Value::String(text)) if !text.is_empty() => Some(text.clone()),
                Some(Value::Object(nested)) => nested
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            }),
        _ => None,
    }
}

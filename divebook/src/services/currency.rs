//! Currency conversion through an external exchange-rate API. The upstream
//! JSON is returned to the caller unchanged.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CurrencyError {
    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("currency service unreachable: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("currency service answered {status}")]
    Upstream { status: StatusCode, body: Value },
    #[error("currency service returned invalid json: {0}")]
    Decode(#[source] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct CurrencyConverter {
    http: reqwest::Client,
    endpoint: String,
}

impl CurrencyConverter {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, CurrencyError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("divebook/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(CurrencyError::Build)?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
        })
    }

    pub async fn convert(&self, amount: &str, from: &str, to: &str) -> Result<Value, CurrencyError> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("amount", amount), ("from", from), ("to", to)])
            .send()
            .await
            .map_err(|err| {
                warn!(error = %err, "currency service unreachable");
                CurrencyError::Transport(err)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.json::<Value>().await.unwrap_or(Value::Null);
            warn!(status = status.as_u16(), from, to, "currency conversion rejected upstream");
            return Err(CurrencyError::Upstream { status, body });
        }

        let body = response.json::<Value>().await.map_err(CurrencyError::Decode)?;
        debug!(amount, from, to, "currency converted");
        Ok(body)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use mockito::Matcher;
    use serde_json::json;

    use super::{CurrencyConverter, CurrencyError};

    #[tokio::test]
    async fn passes_query_and_returns_body_unchanged() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let upstream = json!({"amount": 10.0, "base": "USD", "rates": {"EUR": 9.2}});
        server
            .mock("GET", "/latest")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("amount".into(), "10".into()),
                Matcher::UrlEncoded("from".into(), "USD".into()),
                Matcher::UrlEncoded("to".into(), "EUR".into()),
            ]))
            .with_status(200)
            .with_body(upstream.to_string())
            .create_async()
            .await;

        let converter =
            CurrencyConverter::new(&format!("{}/latest", server.url()), Duration::from_secs(5))?;
        let body = converter.convert("10", "USD", "EUR").await?;

        assert_eq!(body, upstream);
        Ok(())
    }

    #[tokio::test]
    async fn upstream_failure_keeps_status() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/latest")
            .match_query(Matcher::Any)
            .with_status(422)
            .with_body(r#"{"message": "not found"}"#)
            .create_async()
            .await;

        let converter =
            CurrencyConverter::new(&format!("{}/latest", server.url()), Duration::from_secs(5))?;
        let error = converter.convert("10", "USD", "XXX").await.unwrap_err();

        assert!(matches!(
            error,
            CurrencyError::Upstream { status, .. } if status.as_u16() == 422
        ));
        Ok(())
    }
}

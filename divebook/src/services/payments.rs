//! Hosted-page payments. The backend opens an invoice with the gateway and
//! hands back the page URL the view embeds in an iframe; completion is learned
//! by polling the invoice status.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tokio::time::{sleep, Instant};
use tracing::debug;

use super::{deserialize_id, encode_segment};
use crate::api::{ApiClient, Auth, ClientError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvoiceStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Expired,
    Cancelled,
    Unknown,
}

impl InvoiceStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "initiated" | "processing" | "unpaid" => Self::Pending,
            "paid" | "success" | "successful" | "completed" => Self::Paid,
            "failed" | "declined" | "error" => Self::Failed,
            "expired" => Self::Expired,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// No further change is expected from the gateway.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Paid | Self::Failed | Self::Expired | Self::Cancelled
        )
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for InvoiceStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for InvoiceStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRequest {
    pub booking_id: String,
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Merchant reference; filled with a fresh UUID when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
}

fn default_currency() -> String {
    String::from("USD")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    #[serde(alias = "_id", alias = "invoiceId", deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(alias = "url", alias = "invoiceUrl")]
    pub payment_url: String,
    #[serde(default)]
    pub status: InvoiceStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceState {
    #[serde(alias = "invoiceStatus")]
    pub status: InvoiceStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub struct Payments {
    client: ApiClient,
}

impl Payments {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn create_invoice(
        &self,
        request: &InvoiceRequest,
        auth: Auth<'_>,
    ) -> Result<Invoice, ClientError> {
        let mut request = request.clone();
        if request.reference.as_deref().map_or(true, str::is_empty) {
            request.reference = Some(uuid::Uuid::new_v4().to_string());
        }
        self.client
            .post("/payments/create-invoice", &request, auth)
            .await
    }

    pub async fn invoice_status(
        &self,
        invoice_id: &str,
        auth: Auth<'_>,
    ) -> Result<InvoiceState, ClientError> {
        let path = format!("/payments/invoice-status/{}", encode_segment(invoice_id));
        self.client.get(&path, auth).await
    }

    /// Poll until the invoice settles or `deadline` passes, returning the last
    /// state seen.
    pub async fn wait_for_settlement(
        &self,
        invoice_id: &str,
        auth: Auth<'_>,
        interval: Duration,
        deadline: Duration,
    ) -> Result<InvoiceState, ClientError> {
        let give_up_at = Instant::now() + deadline;
        loop {
            let state = self.invoice_status(invoice_id, auth).await?;
            if state.status.is_terminal() || Instant::now() + interval > give_up_at {
                debug!(invoice_id, status = %state.status, "invoice poll finished");
                return Ok(state);
            }
            sleep(interval).await;
        }
    }
}

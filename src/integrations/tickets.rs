use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

/// Body posted to the support-ticket API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketRequest {
    pub order_id: String,
    pub buyer_id: String,
    pub buyer_handle: String,
    pub product: String,
    pub subject: String,
}

#[derive(Debug, Default, Deserialize)]
struct TicketResponse {
    #[serde(default, alias = "ticket_id")]
    id: Option<serde_json::Value>,
}

/// Client for the external support-ticket API, authenticated with a bearer key.
#[derive(Clone)]
pub struct TicketClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl TicketClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let endpoint = endpoint.into();
        url::Url::parse(&endpoint)?;
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint,
            api_key: api_key.into(),
        })
    }

    /// Opens a ticket. Returns the ticket id when the API reports one.
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn open_ticket(&self, request: &TicketRequest) -> anyhow::Result<Option<String>> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Ticket API returned {status}: {text}");
        }

        // Some deployments answer with an empty body.
        let body = resp.bytes().await?;
        let parsed: TicketResponse = serde_json::from_slice(&body).unwrap_or_default();
        let ticket_id = parsed.id.map(|id| match id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });
        info!(ticket_id = ?ticket_id, "Support ticket opened");
        Ok(ticket_id)
    }
}

impl std::fmt::Debug for TicketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

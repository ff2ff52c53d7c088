//! Best-effort downstream actions triggered by a newly recorded order.
//!
//! Every action reports an [`ActionOutcome`] instead of an error; the runner
//! logs each outcome and always attempts the full list.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::integrations::{DiscordClient, TicketClient, TicketRequest};
use crate::models::OrderRecord;
use crate::notifications::{self, Channel, Notifier};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum ActionOutcome {
    Completed,
    Skipped(String),
    Failed(String),
}

impl ActionOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            ActionOutcome::Completed => "completed",
            ActionOutcome::Skipped(_) => "skipped",
            ActionOutcome::Failed(_) => "failed",
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            ActionOutcome::Completed => None,
            ActionOutcome::Skipped(reason) | ActionOutcome::Failed(reason) => Some(reason),
        }
    }

    fn skipped(reason: &str) -> Self {
        ActionOutcome::Skipped(reason.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReport {
    pub action: &'static str,
    pub outcome: ActionOutcome,
}

#[async_trait]
pub trait OrderAction: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, record: &OrderRecord) -> ActionOutcome;
}

/// Posts the order summary to the orders channel.
pub struct NotifyAction {
    notifier: Option<Arc<dyn Notifier>>,
    store_name: String,
}

impl NotifyAction {
    pub fn new(notifier: Option<Arc<dyn Notifier>>, store_name: String) -> Self {
        Self {
            notifier,
            store_name,
        }
    }
}

#[async_trait]
impl OrderAction for NotifyAction {
    fn name(&self) -> &'static str {
        "notify"
    }

    async fn run(&self, record: &OrderRecord) -> ActionOutcome {
        let Some(notifier) = &self.notifier else {
            return ActionOutcome::skipped("notifier not configured");
        };
        let embed = notifications::order_summary(record, &self.store_name);
        match notifier.notify(Channel::Orders, &embed).await {
            Ok(()) => ActionOutcome::Completed,
            Err(e) => ActionOutcome::Failed(e.to_string()),
        }
    }
}

struct RoleTarget {
    client: DiscordClient,
    guild_id: String,
    role_id: String,
}

/// Grants the buyer role in the community guild.
pub struct RoleGrantAction {
    target: Option<RoleTarget>,
}

impl RoleGrantAction {
    pub fn unconfigured() -> Self {
        Self { target: None }
    }

    pub fn new(client: DiscordClient, guild_id: String, role_id: String) -> Self {
        Self {
            target: Some(RoleTarget {
                client,
                guild_id,
                role_id,
            }),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        match (
            cfg.discord_bot_token.as_deref(),
            cfg.discord_guild_id.as_deref(),
            cfg.buyer_role_id.as_deref(),
        ) {
            (Some(token), Some(guild), Some(role)) => Ok(Self::new(
                DiscordClient::new(token, cfg.outbound_timeout())?,
                guild.to_string(),
                role.to_string(),
            )),
            _ => Ok(Self::unconfigured()),
        }
    }
}

#[async_trait]
impl OrderAction for RoleGrantAction {
    fn name(&self) -> &'static str {
        "role_grant"
    }

    async fn run(&self, record: &OrderRecord) -> ActionOutcome {
        let Some(target) = &self.target else {
            return ActionOutcome::skipped("role grant not configured");
        };
        let Some(user_id) = record.buyer.platform_user_id.as_deref() else {
            return ActionOutcome::skipped("buyer has no linked platform account");
        };
        match target
            .client
            .add_member_role(&target.guild_id, user_id, &target.role_id)
            .await
        {
            Ok(()) => ActionOutcome::Completed,
            Err(e) => ActionOutcome::Failed(e.to_string()),
        }
    }
}

/// Opens a support ticket for the buyer.
pub struct TicketAction {
    client: Option<TicketClient>,
}

impl TicketAction {
    pub fn new(client: Option<TicketClient>) -> Self {
        Self { client }
    }

    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let client = match (cfg.ticket_api_url.as_deref(), cfg.ticket_api_key.as_deref()) {
            (Some(url), Some(key)) => Some(TicketClient::new(url, key, cfg.outbound_timeout())?),
            _ => None,
        };
        Ok(Self::new(client))
    }

    fn request(record: &OrderRecord, buyer_id: &str) -> TicketRequest {
        TicketRequest {
            order_id: record.order_id().to_string(),
            buyer_id: buyer_id.to_string(),
            buyer_handle: record.buyer.handle.clone(),
            product: record.product_summary(),
            subject: format!("Support for order {}", record.order_id()),
        }
    }
}

#[async_trait]
impl OrderAction for TicketAction {
    fn name(&self) -> &'static str {
        "ticket"
    }

    async fn run(&self, record: &OrderRecord) -> ActionOutcome {
        let Some(client) = &self.client else {
            return ActionOutcome::skipped("ticket API not configured");
        };
        let Some(buyer_id) = record.buyer.platform_user_id.as_deref() else {
            return ActionOutcome::skipped("buyer has no linked platform account");
        };
        match client.open_ticket(&Self::request(record, buyer_id)).await {
            Ok(_) => ActionOutcome::Completed,
            Err(e) => ActionOutcome::Failed(e.to_string()),
        }
    }
}

/// Ordered list of actions run for each newly created order.
#[derive(Clone)]
pub struct SideEffects {
    actions: Vec<Arc<dyn OrderAction>>,
    ticket: Arc<dyn OrderAction>,
}

impl SideEffects {
    pub fn new(actions: Vec<Arc<dyn OrderAction>>, ticket: Arc<dyn OrderAction>) -> Self {
        Self { actions, ticket }
    }

    /// Notify, role grant, ticket; each unconfigured action reports `Skipped`.
    pub fn from_config(cfg: &AppConfig, notifier: Option<Arc<dyn Notifier>>) -> anyhow::Result<Self> {
        let ticket: Arc<dyn OrderAction> = Arc::new(TicketAction::from_config(cfg)?);
        let actions: Vec<Arc<dyn OrderAction>> = vec![
            Arc::new(NotifyAction::new(notifier, cfg.store_name.clone())),
            Arc::new(RoleGrantAction::from_config(cfg)?),
            ticket.clone(),
        ];
        Ok(Self::new(actions, ticket))
    }

    /// Runs every action in order; a failure never stops the next one.
    pub async fn run_all(&self, record: &OrderRecord) -> Vec<ActionReport> {
        let mut reports = Vec::with_capacity(self.actions.len());
        for action in &self.actions {
            let outcome = action.run(record).await;
            log_outcome(record.order_id(), action.name(), &outcome);
            reports.push(ActionReport {
                action: action.name(),
                outcome,
            });
        }
        reports
    }

    /// Fire-and-forget variant of [`run_all`](Self::run_all).
    pub fn spawn(&self, record: OrderRecord) -> tokio::task::JoinHandle<Vec<ActionReport>> {
        let effects = self.clone();
        tokio::spawn(async move { effects.run_all(&record).await })
    }

    /// Runs only the ticket action, for the buyer-facing support button.
    pub async fn open_ticket(&self, record: &OrderRecord) -> ActionOutcome {
        let outcome = self.ticket.run(record).await;
        log_outcome(record.order_id(), self.ticket.name(), &outcome);
        outcome
    }
}

fn log_outcome(order_id: &str, action: &str, outcome: &ActionOutcome) {
    match outcome {
        ActionOutcome::Completed => info!(%order_id, action, "Action completed"),
        ActionOutcome::Skipped(reason) => debug!(%order_id, action, %reason, "Action skipped"),
        ActionOutcome::Failed(reason) => warn!(%order_id, action, %reason, "Action failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::Embed;
    use crate::models::{BuyerInfo, NormalizedOrder, OrderTotals, PaymentStatus};
    use assert_matches::assert_matches;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(platform_user_id: Option<&str>) -> OrderRecord {
        OrderRecord::new(
            NormalizedOrder {
                order_id: "1001".into(),
                lines: Vec::new(),
                buyer: BuyerInfo {
                    email: "a@b.com".into(),
                    country: "US".into(),
                    handle: "alice".into(),
                    platform_user_id: platform_user_id.map(str::to_string),
                },
                coupon: "None".into(),
                totals: OrderTotals {
                    currency: "GBP".into(),
                    amount: None,
                    secondary_currency: "USD".into(),
                    secondary_amount: None,
                    secondary_is_estimate: true,
                },
                payment_status: PaymentStatus::Paid,
                created_at: Utc::now(),
            },
            "tok".into(),
        )
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _channel: Channel, _embed: &Embed) -> anyhow::Result<()> {
            anyhow::bail!("channel unavailable")
        }
    }

    struct CountingAction(Arc<AtomicUsize>);

    #[async_trait]
    impl OrderAction for CountingAction {
        fn name(&self) -> &'static str {
            "count"
        }

        async fn run(&self, _record: &OrderRecord) -> ActionOutcome {
            self.0.fetch_add(1, Ordering::SeqCst);
            ActionOutcome::Completed
        }
    }

    #[tokio::test]
    async fn failure_does_not_stop_later_actions() {
        let count = Arc::new(AtomicUsize::new(0));
        let notifier: Arc<dyn Notifier> = Arc::new(FailingNotifier);
        let ticket: Arc<dyn OrderAction> = Arc::new(TicketAction::new(None));
        let effects = SideEffects::new(
            vec![
                Arc::new(NotifyAction::new(Some(notifier), "Shop".into())),
                Arc::new(CountingAction(count.clone())),
                ticket.clone(),
            ],
            ticket,
        );

        let reports = effects.run_all(&record(Some("42"))).await;
        assert_eq!(reports.len(), 3);
        assert_matches!(reports[0].outcome, ActionOutcome::Failed(ref r) if r.contains("unavailable"));
        assert_eq!(reports[1].outcome, ActionOutcome::Completed);
        assert_eq!(reports[2].outcome.status(), "skipped");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unconfigured_actions_are_skipped() {
        let cfg = AppConfig::new("a-long-enough-receipt-secret");
        let effects = SideEffects::from_config(&cfg, None).unwrap();
        let reports = effects.run_all(&record(Some("42"))).await;
        let names: Vec<_> = reports.iter().map(|r| r.action).collect();
        assert_eq!(names, ["notify", "role_grant", "ticket"]);
        assert!(reports
            .iter()
            .all(|r| matches!(r.outcome, ActionOutcome::Skipped(_))));
    }

    #[tokio::test]
    async fn actions_needing_buyer_id_skip_without_one() {
        let server = MockServer::start().await;
        let client =
            DiscordClient::with_base_url(server.uri(), "t", Duration::from_secs(2)).unwrap();
        let action = RoleGrantAction::new(client, "g".into(), "r".into());
        assert_matches!(action.run(&record(None)).await, ActionOutcome::Skipped(_));
    }

    #[tokio::test]
    async fn role_grant_calls_guild_member_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/guilds/g/members/42/roles/r"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            DiscordClient::with_base_url(server.uri(), "t", Duration::from_secs(2)).unwrap();
        let action = RoleGrantAction::new(client, "g".into(), "r".into());
        assert_eq!(action.run(&record(Some("42"))).await, ActionOutcome::Completed);
    }

    #[tokio::test]
    async fn ticket_failure_is_reported_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = TicketClient::new(server.uri(), "k", Duration::from_secs(2)).unwrap();
        let ticket: Arc<dyn OrderAction> = Arc::new(TicketAction::new(Some(client)));
        let effects = SideEffects::new(Vec::new(), ticket);
        let outcome = effects.open_ticket(&record(Some("42"))).await;
        assert_eq!(outcome.status(), "failed");
    }

    #[test]
    fn outcome_serializes_with_status_and_detail() {
        let value = serde_json::to_value(ActionOutcome::Skipped("nope".into())).unwrap();
        assert_eq!(value, serde_json::json!({"status": "skipped", "detail": "nope"}));
    }
}

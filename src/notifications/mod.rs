//! Notification Dispatcher: formats order events and posts them to the
//! configured chat channels.

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::config::AppConfig;
use crate::integrations::{DiscordClient, Embed, EmbedField};
use crate::models::{OrderRecord, ParticipantRole};

const ORDER_COLOR: u32 = 0x2ECC71;
const COMPLETED_COLOR: u32 = 0x3498DB;

/// Destination of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// New-order summaries
    Orders,
    /// Staff-facing notices such as chat completions
    Staff,
}

/// Pushes formatted notices to an external chat channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: Channel, embed: &Embed) -> anyhow::Result<()>;
}

/// Posts notices as Discord embeds.
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: DiscordClient,
    order_channel: String,
    staff_channel: String,
}

impl DiscordNotifier {
    pub fn new(client: DiscordClient, order_channel: String, staff_channel: String) -> Self {
        Self {
            client,
            order_channel,
            staff_channel,
        }
    }

    /// Builds a notifier when a bot token and order channel are configured.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Option<Self>> {
        let (Some(token), Some(order_channel)) =
            (cfg.discord_bot_token.as_deref(), cfg.order_channel_id.as_deref())
        else {
            return Ok(None);
        };
        let client = DiscordClient::new(token, cfg.outbound_timeout())?;
        let staff_channel = cfg.staff_channel().unwrap_or(order_channel).to_string();
        Ok(Some(Self::new(client, order_channel.to_string(), staff_channel)))
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    #[instrument(skip(self, embed), fields(title = %embed.title))]
    async fn notify(&self, channel: Channel, embed: &Embed) -> anyhow::Result<()> {
        let channel_id = match channel {
            Channel::Orders => &self.order_channel,
            Channel::Staff => &self.staff_channel,
        };
        let message_id = self.client.post_embed(channel_id, embed).await?;
        info!(%channel_id, %message_id, "Notification delivered");
        Ok(())
    }
}

/// Summary card posted once per newly recorded order.
pub fn order_summary(record: &OrderRecord, store_name: &str) -> Embed {
    let products = record
        .lines
        .iter()
        .map(|line| {
            format!(
                "{} × {} ({})",
                line.name, line.quantity, line.buyer_attribute
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    Embed {
        title: format!("New order on {}", store_name),
        description: Some(format!("Order `{}` has been paid.", record.order_id())),
        color: ORDER_COLOR,
        fields: vec![
            EmbedField::wide("Products", non_empty(products)),
            EmbedField::new("Total", record.totals.display_primary()),
            EmbedField::new("Estimate", record.totals.display_secondary()),
            EmbedField::new("Coupon", record.coupon.clone()),
            EmbedField::new("Payment", record.payment_status.label()),
            EmbedField::new("Buyer", record.buyer.handle.clone()),
            EmbedField::new("Email", record.masked_email()),
            EmbedField::new("Country", record.buyer.country.clone()),
            EmbedField::new("Order ID", record.order_id()),
            EmbedField::new("Created", record.created_at_display()),
        ],
        timestamp: Some(record.created_at.to_rfc3339()),
    }
}

/// Staff notice posted when a chat marks an order completed.
pub fn chat_completed(record: &OrderRecord, by: ParticipantRole) -> Embed {
    Embed {
        title: format!("Order {} completed", record.order_id()),
        description: Some(format!("Marked complete by the {} in live chat.", by.label())),
        color: COMPLETED_COLOR,
        fields: vec![
            EmbedField::new("Products", record.product_summary()),
            EmbedField::new("Buyer", record.buyer.handle.clone()),
        ],
        timestamp: record.completed_at().map(|at| at.to_rfc3339()),
    }
}

fn non_empty(value: String) -> String {
    if value.is_empty() {
        "Unknown".to_string()
    } else {
        value
    }
}

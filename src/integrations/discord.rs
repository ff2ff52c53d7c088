use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// One rich message card.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline: true,
        }
    }

    pub fn wide(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            inline: false,
            ..Self::new(name, value)
        }
    }
}

#[derive(Deserialize)]
struct CreateMessageResp {
    id: String,
}

/// Bot-authenticated Discord REST client.
#[derive(Clone)]
pub struct DiscordClient {
    client: Client,
    base_url: String,
    bot_token: String,
}

impl DiscordClient {
    pub fn new(bot_token: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Self::with_base_url(DISCORD_API_BASE, bot_token, timeout)
    }

    /// Points the client at another API root (used by tests).
    pub fn with_base_url(
        base_url: impl Into<String>,
        bot_token: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        })
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    /// Posts an embed to a channel and returns the new message id.
    #[instrument(skip(self, embed), fields(title = %embed.title))]
    pub async fn post_embed(&self, channel_id: &str, embed: &Embed) -> anyhow::Result<String> {
        let path = format!("/channels/{channel_id}/messages");
        let body = serde_json::json!({ "embeds": [embed] });
        let resp = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("Authorization", self.auth())
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Discord API {path} returned {status}: {text}");
        }

        let created: CreateMessageResp = resp.json().await?;
        debug!(message_id = %created.id, "Posted channel message");
        Ok(created.id)
    }

    /// Adds a role to a guild member.
    #[instrument(skip(self))]
    pub async fn add_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> anyhow::Result<()> {
        let path = format!("/guilds/{guild_id}/members/{user_id}/roles/{role_id}");
        let resp = self
            .client
            .put(format!("{}{path}", self.base_url))
            .header("Authorization", self.auth())
            .header("X-Audit-Log-Reason", "Order paid")
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Discord API {path} returned {status}: {text}");
        }
        Ok(())
    }
}

impl std::fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

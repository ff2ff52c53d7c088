use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Customer,
    Staff,
}

impl ParticipantRole {
    pub fn label(&self) -> &'static str {
        match self {
            ParticipantRole::Customer => "customer",
            ParticipantRole::Staff => "staff",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Position in the order's conversation, starting at 1
    pub seq: u64,
    pub sender: ParticipantRole,
    /// Optional display name supplied by the client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

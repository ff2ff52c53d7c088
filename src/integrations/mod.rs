//! Outbound REST clients for the chat platform and the support-ticket API.

pub mod discord;
pub mod tickets;

pub use discord::{DiscordClient, Embed, EmbedField};
pub use tickets::{TicketClient, TicketRequest};

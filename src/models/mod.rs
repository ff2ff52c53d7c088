// Order snapshots and chat payloads shared by services and handlers
pub mod chat;
pub mod order;

pub use chat::{ChatMessage, ParticipantRole};
pub use order::{
    mask_email, BuyerInfo, NormalizedOrder, OrderLine, OrderRecord, OrderTotals, PaymentStatus,
    Review,
};

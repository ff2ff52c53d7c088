// Order intake
pub mod extraction;
pub mod intake;
pub mod order_store;

// Best-effort downstream actions
pub mod actions;

// Live chat relay
pub mod chat;

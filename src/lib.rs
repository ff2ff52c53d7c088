//! Order receipts service
//!
//! Receives paid-order webhooks from the storefront, keeps an in-memory
//! record per order, serves token-gated receipt pages and relays live chat
//! between buyers and staff.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod errors;
pub mod handlers;
pub mod integrations;
pub mod models;
pub mod money;
pub mod notifications;
pub mod pages;
pub mod services;
pub mod token;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AppConfig;
use crate::notifications::{DiscordNotifier, Notifier};
use crate::pages::Pages;
use crate::services::{
    actions::SideEffects,
    chat::{ChatHub, ChatRelay},
    extraction::ExtractionSettings,
    intake::IntakePipeline,
    order_store::OrderStore,
};
use crate::token::TokenIssuer;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tokens: TokenIssuer,
    pub store: OrderStore,
    pub intake: IntakePipeline,
    pub effects: SideEffects,
    pub chat: ChatRelay,
    pub pages: Pages,
}

impl AppState {
    /// Wires the services around one notifier (or none).
    pub fn new(config: AppConfig, notifier: Option<Arc<dyn Notifier>>) -> anyhow::Result<Self> {
        let tokens = TokenIssuer::new(&config.receipt_secret);
        let store = OrderStore::new();
        let effects = SideEffects::from_config(&config, notifier.clone())?;
        let intake = IntakePipeline::new(
            ExtractionSettings::from_config(&config),
            tokens.clone(),
            store.clone(),
            effects.clone(),
        );
        let chat = ChatRelay::new(
            ChatHub::new(),
            store.clone(),
            tokens.clone(),
            config.staff_chat_key.clone(),
            notifier,
        );

        Ok(Self {
            config: Arc::new(config),
            tokens,
            store,
            intake,
            effects,
            chat,
            pages: Pages::new()?,
        })
    }

    /// Builds the state with the Discord notifier when it is configured.
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let notifier = DiscordNotifier::from_config(&config)?.map(|n| {
            info!("Discord notifications enabled");
            Arc::new(n) as Arc<dyn Notifier>
        });
        if notifier.is_none() {
            info!("Discord notifications not configured; order summaries will be skipped");
        }
        Self::new(config, notifier)
    }
}

/// All routes of the service.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(handlers::webhooks::order_webhook))
        .route("/success", get(handlers::receipts::success))
        .route("/receipt", get(handlers::receipts::receipt))
        .route("/receipt/confirm-email", post(handlers::receipts::confirm_email))
        .route("/review", post(handlers::reviews::submit_review))
        .route("/support/ticket", post(handlers::support::open_ticket))
        .route("/chat/ws", get(handlers::chat::chat_socket))
        .route("/health", get(handlers::health::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

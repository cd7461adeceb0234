//! Rackline
//!
//! Warehouse quantity reconciliation and rack allocation. Materials issued to
//! a job are reconciled into returned-good, damaged and consumed quantities;
//! incoming shipments are split into pallets and loose boxes and committed
//! onto racks without ever exceeding rack capacity.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod commands;
pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod services;
pub mod store;

use std::sync::Arc;
use tokio::sync::mpsc;

pub use crate::config::{AppConfig, BatchPolicy};
pub use crate::errors::{ErrorResponse, ServiceError};
pub use crate::events::{Event, EventSender};
pub use crate::services::{AllocationService, ReturnService};
pub use crate::store::WarehouseStore;

/// Crate version, as published
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<WarehouseStore>,
    pub event_sender: Arc<EventSender>,
    pub returns: ReturnService,
    pub allocations: AllocationService,
}

impl AppState {
    /// Wires the store, event channel and services from `config`.
    ///
    /// The receiving end of the event channel is handed back to the caller,
    /// typically to be drained by [`events::process_events`].
    pub fn new(config: AppConfig) -> (Self, mpsc::Receiver<Event>) {
        let (sender, rx) = EventSender::channel(config.event_channel_capacity.max(1));
        let store = Arc::new(WarehouseStore::new());
        let event_sender = Arc::new(sender);

        let returns = ReturnService::new(
            Arc::clone(&store),
            Arc::clone(&event_sender),
            config.batch_policy(),
        );
        let allocations = AllocationService::new(
            Arc::clone(&store),
            Arc::clone(&event_sender),
            &config.allocation,
        );

        (
            Self {
                config,
                store,
                event_sender,
                returns,
                allocations,
            },
            rx,
        )
    }
}

#![allow(dead_code)]

use rackline::{
    config::AppConfig,
    events::{self, Event},
    models::{Material, MaterialIssue, Rack, Shipment},
    AppState,
};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Application state with seeding helpers for workflow tests.
pub struct TestApp {
    pub state: AppState,
    events: Option<mpsc::Receiver<Event>>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let (state, rx) = AppState::new(config);
        Self {
            state,
            events: Some(rx),
        }
    }

    /// Drains events in the background, for tests that do not inspect them.
    pub fn spawn_event_loop(&mut self) -> Option<tokio::task::JoinHandle<()>> {
        self.events.take().map(|rx| tokio::spawn(events::process_events(rx)))
    }

    /// Every event published so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut drained = Vec::new();
        if let Some(rx) = self.events.as_mut() {
            while let Ok(event) = rx.try_recv() {
                drained.push(event);
            }
        }
        drained
    }

    pub fn seed_material(&self, sku: &str, unit_cost: Decimal, available: Decimal) -> Material {
        let material = Material::new(sku, format!("{} stock", sku), unit_cost, available);
        self.state
            .store
            .insert_material(material.clone())
            .expect("seed material");
        material
    }

    pub fn seed_issue(&self, job_id: Uuid, material: &Material, quantity: Decimal) -> Uuid {
        let issue = MaterialIssue::new(job_id, material, quantity).expect("valid issue");
        self.state.store.insert_issue(issue).expect("seed issue")
    }

    pub fn seed_shipment(&self, total_boxes: u32, boxes_per_pallet: u32) -> Uuid {
        let shipment = Shipment::new(
            format!("SHP-{}", Uuid::new_v4().simple()),
            total_boxes,
            boxes_per_pallet,
        );
        self.state
            .store
            .insert_shipment(shipment)
            .expect("seed shipment")
    }

    pub fn seed_rack(&self, capacity_total: u32, capacity_used: u32) -> Uuid {
        let rack = Rack::with_usage(Uuid::new_v4(), "R-TEST", capacity_total, capacity_used)
            .expect("valid rack");
        self.state.store.insert_rack(rack).expect("seed rack")
    }
}

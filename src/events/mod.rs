use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::ShipmentStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with its receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// Domain events emitted after a transition has been applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Reconciliation events
    ReturnReconciled {
        issue_id: Uuid,
        job_id: Uuid,
        material_id: Uuid,
        quantity_good: Decimal,
        quantity_damaged: Decimal,
        quantity_used: Decimal,
    },
    DamageRecorded {
        damage_record_id: Uuid,
        issue_id: Uuid,
        material_id: Uuid,
        quantity_damaged: Decimal,
        value_loss: Decimal,
    },
    StockAdjusted {
        material_id: Uuid,
        delta: Decimal,
        new_available: Decimal,
    },

    // Allocation events
    AllocationCommitted {
        shipment_id: Uuid,
        rack_id: Uuid,
        boxes: u32,
        box_ids: Vec<Uuid>,
    },
    ShipmentStatusChanged {
        shipment_id: Uuid,
        old_status: ShipmentStatus,
        new_status: ShipmentStatus,
    },
    RackCapacityChanged {
        rack_id: Uuid,
        capacity_used: u32,
        capacity_total: u32,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::ReturnReconciled { .. } => "return_reconciled",
            Event::DamageRecorded { .. } => "damage_recorded",
            Event::StockAdjusted { .. } => "stock_adjusted",
            Event::AllocationCommitted { .. } => "allocation_committed",
            Event::ShipmentStatusChanged { .. } => "shipment_status_changed",
            Event::RackCapacityChanged { .. } => "rack_capacity_changed",
        }
    }
}

// Drains the channel and logs each event until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::DamageRecorded {
                issue_id,
                material_id,
                quantity_damaged,
                value_loss,
                ..
            } => {
                warn!(
                    %issue_id,
                    %material_id,
                    %quantity_damaged,
                    %value_loss,
                    "Damaged material reported"
                );
            }
            Event::ShipmentStatusChanged {
                shipment_id,
                old_status,
                new_status,
            } => {
                info!(
                    %shipment_id,
                    %old_status,
                    %new_status,
                    downstream = new_status.downstream_code(),
                    "Shipment status changed"
                );
            }
            other => {
                info!(event = other.name(), payload = ?other, "Received event");
            }
        }
    }

    info!("Event processing loop stopped");
}

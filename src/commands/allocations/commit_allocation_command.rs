use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};
use validator::Validate;

use crate::{
    commands::Command,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{AllocationOutcome, AllocationRequest},
    services::allocator,
    store::{Reservation, StoredAllocation, WarehouseStore},
};

const DEFAULT_IDEMPOTENCY_TTL: Duration =
    Duration::from_secs(crate::config::DEFAULT_IDEMPOTENCY_TTL_SECS);

fn default_idempotency_ttl() -> Duration {
    DEFAULT_IDEMPOTENCY_TTL
}

/// Commits an operator-confirmed allocation of boxes onto a rack.
///
/// A request carrying a `request_id` that was already committed within the
/// TTL replays the stored outcome instead of allocating twice. The id is
/// claimed before either entity is locked and released again if the commit
/// is rejected.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CommitAllocationCommand {
    #[validate]
    pub request: AllocationRequest,
    #[serde(skip, default = "default_idempotency_ttl")]
    pub idempotency_ttl: Duration,
}

impl CommitAllocationCommand {
    pub fn new(request: AllocationRequest) -> Self {
        Self {
            request,
            idempotency_ttl: DEFAULT_IDEMPOTENCY_TTL,
        }
    }

    pub fn with_idempotency_ttl(mut self, ttl: Duration) -> Self {
        self.idempotency_ttl = ttl;
        self
    }

    /// Claims the request id, if there is one.
    fn reserve(&self, store: &WarehouseStore) -> Result<Option<Reservation>, ServiceError> {
        let Some(request_id) = self.request.request_id else {
            return Ok(None);
        };
        let requests = store.allocation_requests();
        requests.cleanup(self.idempotency_ttl);
        requests
            .reserve(request_id, &self.request, self.idempotency_ttl)
            .map(Some)
    }
}

#[async_trait]
impl Command for CommitAllocationCommand {
    type Result = AllocationOutcome;

    #[instrument(
        skip(self, store, event_sender),
        fields(shipment_id = %self.request.shipment_id, rack_id = %self.request.rack_id)
    )]
    async fn execute(
        &self,
        store: Arc<WarehouseStore>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        // Dropping `pending` on any early return frees the request id
        let pending = match self.reserve(&store)? {
            Some(Reservation::Replay(outcome)) => {
                info!(request_id = ?self.request.request_id, "Replaying committed allocation");
                return Ok(outcome);
            }
            Some(Reservation::Reserved(pending)) => Some(pending),
            None => None,
        };

        let shipment_handle = store.shipment_handle(self.request.shipment_id)?;
        let rack_handle = store.rack_handle(self.request.rack_id)?;
        let mut shipment = shipment_handle.lock().await;
        let mut rack = rack_handle.lock().await;

        let outcome = allocator::commit(&self.request, &shipment, &rack)?;
        *shipment = outcome.shipment.clone();
        *rack = outcome.rack.clone();

        if let Some(pending) = pending {
            pending.complete(StoredAllocation::new(self.request.clone(), outcome.clone()));
        }
        drop(rack);
        drop(shipment);

        info!(
            boxes = outcome.allocated_boxes,
            pallets = self.request.pallets,
            loose_boxes = self.request.loose_boxes,
            status = %outcome.shipment.status(),
            rack_remaining = outcome.rack.remaining(),
            "Allocation committed"
        );

        publish_allocation(&event_sender, &outcome).await;
        Ok(outcome)
    }
}

async fn publish_allocation(event_sender: &EventSender, outcome: &AllocationOutcome) {
    let shipment_id = outcome.shipment.id();
    let mut events = vec![Event::AllocationCommitted {
        shipment_id,
        rack_id: outcome.rack.id(),
        boxes: outcome.allocated_boxes,
        box_ids: outcome.assigned_box_ids.clone(),
    }];
    if outcome.status_changed() {
        events.push(Event::ShipmentStatusChanged {
            shipment_id,
            old_status: outcome.previous_status,
            new_status: outcome.shipment.status(),
        });
    }
    events.push(Event::RackCapacityChanged {
        rack_id: outcome.rack.id(),
        capacity_used: outcome.rack.capacity_used(),
        capacity_total: outcome.rack.capacity_total(),
    });

    for event in events {
        let name = event.name();
        if let Err(e) = event_sender.send(event).await {
            error!(event = name, %shipment_id, "{}", e);
        }
    }
}

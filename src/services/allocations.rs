use crate::{
    commands::allocations::CommitAllocationCommand,
    commands::Command,
    config::AllocationConfig,
    errors::ServiceError,
    events::EventSender,
    models::{AllocationOutcome, AllocationProposal, AllocationRequest},
    services::allocator,
    store::WarehouseStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Service for placing shipment boxes on racks
#[derive(Clone)]
pub struct AllocationService {
    store: Arc<WarehouseStore>,
    event_sender: Arc<EventSender>,
    idempotency_ttl: Duration,
    require_request_id: bool,
}

impl AllocationService {
    pub fn new(
        store: Arc<WarehouseStore>,
        event_sender: Arc<EventSender>,
        config: &AllocationConfig,
    ) -> Self {
        Self {
            store,
            event_sender,
            idempotency_ttl: Duration::from_secs(config.idempotency_ttl_secs),
            require_request_id: config.require_request_id,
        }
    }

    /// Splits the shipment's unassigned boxes into pallets and loose boxes
    #[instrument(skip(self))]
    pub async fn propose(&self, shipment_id: Uuid) -> Result<AllocationProposal, ServiceError> {
        let shipment = self.store.shipment(shipment_id).await?;
        Ok(allocator::propose(&shipment))
    }

    /// The largest request the rack can take right now. Advisory only: the
    /// commit re-checks against current state.
    #[instrument(skip(self))]
    pub async fn propose_for_rack(
        &self,
        shipment_id: Uuid,
        rack_id: Uuid,
    ) -> Result<AllocationRequest, ServiceError> {
        let proposal = self.propose(shipment_id).await?;
        let rack = self.store.rack(rack_id).await?;
        Ok(allocator::fit_to_rack(&proposal, &rack))
    }

    /// Commits an allocation
    #[instrument(
        skip(self, request),
        fields(shipment_id = %request.shipment_id, rack_id = %request.rack_id)
    )]
    pub async fn commit(
        &self,
        request: AllocationRequest,
    ) -> Result<AllocationOutcome, ServiceError> {
        if self.require_request_id && request.request_id.is_none() {
            warn!("Allocation commit without request id refused");
            return Err(ServiceError::ValidationError(
                "A request id is required to commit an allocation".to_string(),
            ));
        }

        CommitAllocationCommand::new(request)
            .with_idempotency_ttl(self.idempotency_ttl)
            .execute(self.store.clone(), self.event_sender.clone())
            .await
    }

    pub async fn rack_remaining(&self, rack_id: Uuid) -> Result<u32, ServiceError> {
        Ok(self.store.rack(rack_id).await?.remaining())
    }
}

//! Box/pallet allocator
//!
//! Splits a shipment's unassigned boxes into whole pallets plus loose boxes
//! and commits an operator-adjusted split against a rack. `commit` works on
//! snapshots: it returns the next shipment and rack together, or an error
//! with both inputs untouched.

use chrono::Utc;

use crate::errors::ServiceError;
use crate::models::{AllocationOutcome, AllocationProposal, AllocationRequest, Rack, Shipment};

pub fn propose(shipment: &Shipment) -> AllocationProposal {
    let remaining_boxes = shipment.remaining_boxes();
    let boxes_per_pallet = shipment.boxes_per_pallet();
    let (total_pallets, loose_boxes) = if boxes_per_pallet > 0 {
        (
            remaining_boxes / boxes_per_pallet,
            remaining_boxes % boxes_per_pallet,
        )
    } else {
        (0, remaining_boxes)
    };

    AllocationProposal {
        shipment_id: shipment.id(),
        remaining_boxes,
        boxes_per_pallet,
        total_pallets,
        loose_boxes,
    }
}

/// Trims a proposal so it fits what `rack` can still hold, keeping whole
/// pallets before loose boxes.
pub fn fit_to_rack(proposal: &AllocationProposal, rack: &Rack) -> AllocationRequest {
    let space = rack.remaining();
    let pallets = if proposal.boxes_per_pallet > 0 {
        proposal
            .total_pallets
            .min(space / proposal.boxes_per_pallet)
    } else {
        0
    };
    let loose_boxes = proposal
        .loose_boxes
        .min(space - pallets * proposal.boxes_per_pallet);

    AllocationRequest::new(proposal.shipment_id, rack.id(), pallets, loose_boxes)
}

/// Applies `request` to copies of `shipment` and `rack`.
///
/// Checks, first failure wins: the request stays within the proposal, it
/// moves at least one box, and the rack has room for it.
pub fn commit(
    request: &AllocationRequest,
    shipment: &Shipment,
    rack: &Rack,
) -> Result<AllocationOutcome, ServiceError> {
    if request.shipment_id != shipment.id() {
        return Err(ServiceError::InvalidInput(format!(
            "Request targets shipment {} but shipment {} was supplied",
            request.shipment_id,
            shipment.id()
        )));
    }
    if request.rack_id != rack.id() {
        return Err(ServiceError::InvalidInput(format!(
            "Request targets rack {} but rack {} was supplied",
            request.rack_id,
            rack.id()
        )));
    }

    let proposal = propose(shipment);
    if !proposal.admits(request) {
        return Err(ServiceError::OverAllocation {
            requested_pallets: request.pallets,
            available_pallets: proposal.total_pallets,
            requested_loose: request.loose_boxes,
            available_loose: proposal.loose_boxes,
        });
    }

    // Bounded by remaining_boxes once the proposal admits the request
    let total = request
        .total_boxes(shipment.boxes_per_pallet())
        .ok_or_else(|| ServiceError::InvalidInput("Allocation size overflows".into()))?;
    if total == 0 {
        return Err(ServiceError::EmptyAllocation);
    }

    let mut next_rack = rack.clone();
    next_rack.occupy(total)?;

    let mut next_shipment = shipment.clone();
    let assigned_box_ids = next_shipment.assign_boxes(rack.id(), total, Utc::now());
    if assigned_box_ids.len() != total as usize {
        return Err(ServiceError::InternalError(format!(
            "Shipment {} tagged {} boxes for an allocation of {}",
            shipment.id(),
            assigned_box_ids.len(),
            total
        )));
    }
    if !shipment.status().can_transition_to(next_shipment.status()) {
        return Err(ServiceError::InternalError(format!(
            "Shipment {} would move back from {} to {}",
            shipment.id(),
            shipment.status(),
            next_shipment.status()
        )));
    }

    Ok(AllocationOutcome {
        previous_status: shipment.status(),
        shipment: next_shipment,
        rack: next_rack,
        allocated_boxes: total,
        assigned_box_ids,
        request_id: request.request_id,
    })
}

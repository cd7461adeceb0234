use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::rack::Rack;
use super::shipment::{Shipment, ShipmentStatus};

/// How a shipment's remaining boxes split into whole pallets and loose boxes.
///
/// The operator may lower either count before committing, never raise it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationProposal {
    pub shipment_id: Uuid,
    pub remaining_boxes: u32,
    pub boxes_per_pallet: u32,
    pub total_pallets: u32,
    pub loose_boxes: u32,
}

impl AllocationProposal {
    /// Boxes the full proposal would move
    pub fn total_boxes(&self) -> u32 {
        self.total_pallets * self.boxes_per_pallet + self.loose_boxes
    }

    /// Whether `request` stays within this proposal on both counts.
    pub fn admits(&self, request: &AllocationRequest) -> bool {
        request.pallets <= self.total_pallets && request.loose_boxes <= self.loose_boxes
    }
}

/// A unit of work moving boxes of one shipment onto one rack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct AllocationRequest {
    pub shipment_id: Uuid,
    pub rack_id: Uuid,
    #[validate(range(max = 100000, message = "Pallet count is implausibly large"))]
    pub pallets: u32,
    #[validate(range(max = 1000000, message = "Loose box count is implausibly large"))]
    pub loose_boxes: u32,
    /// Client-supplied id that makes retries of this commit safe
    #[serde(default)]
    pub request_id: Option<Uuid>,
}

impl AllocationRequest {
    pub fn new(shipment_id: Uuid, rack_id: Uuid, pallets: u32, loose_boxes: u32) -> Self {
        Self {
            shipment_id,
            rack_id,
            pallets,
            loose_boxes,
            request_id: None,
        }
    }

    /// Accepts a proposal as-is for `rack_id`.
    pub fn from_proposal(proposal: &AllocationProposal, rack_id: Uuid) -> Self {
        Self::new(
            proposal.shipment_id,
            rack_id,
            proposal.total_pallets,
            proposal.loose_boxes,
        )
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// `pallets × boxes_per_pallet + loose_boxes`, or `None` on overflow.
    pub fn total_boxes(&self, boxes_per_pallet: u32) -> Option<u32> {
        self.pallets
            .checked_mul(boxes_per_pallet)?
            .checked_add(self.loose_boxes)
    }

    /// True when `other` asks for exactly the same move.
    pub fn same_payload(&self, other: &AllocationRequest) -> bool {
        self.shipment_id == other.shipment_id
            && self.rack_id == other.rack_id
            && self.pallets == other.pallets
            && self.loose_boxes == other.loose_boxes
    }
}

/// Result of a committed allocation, ready for the caller to persist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationOutcome {
    pub shipment: Shipment,
    pub rack: Rack,
    pub allocated_boxes: u32,
    pub assigned_box_ids: Vec<Uuid>,
    pub previous_status: ShipmentStatus,
    pub request_id: Option<Uuid>,
}

impl AllocationOutcome {
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.shipment.status()
    }
}

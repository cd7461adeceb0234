use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Box-level fulfillment of a shipment.
///
/// Only moves forward as allocations commit. `FullyAllocated` is terminal
/// here; release and later lifecycle belong to other workflows.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Pending,
    Partial,
    FullyAllocated,
}

impl ShipmentStatus {
    /// Status implied by the number of boxes still unassigned.
    pub fn derive(total_boxes: u32, remaining_boxes: u32) -> Self {
        if remaining_boxes == 0 {
            ShipmentStatus::FullyAllocated
        } else if remaining_boxes >= total_boxes {
            ShipmentStatus::Pending
        } else {
            ShipmentStatus::Partial
        }
    }

    /// Status code understood by the storage workflow downstream
    pub fn downstream_code(&self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "PENDING",
            ShipmentStatus::Partial => "PARTIAL",
            ShipmentStatus::FullyAllocated => "IN_STORAGE",
        }
    }

    /// Staying put is allowed; moving backwards is not.
    pub fn can_transition_to(&self, next: ShipmentStatus) -> bool {
        next.rank() >= self.rank()
    }

    fn rank(&self) -> u8 {
        match self {
            ShipmentStatus::Pending => 0,
            ShipmentStatus::Partial => 1,
            ShipmentStatus::FullyAllocated => 2,
        }
    }
}

/// A single physical box carrying its own identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentBox {
    pub id: Uuid,
    pub sequence: u32,
    pub rack_id: Option<Uuid>,
    pub assigned_at: Option<DateTime<Utc>>,
}

impl ShipmentBox {
    pub fn unassigned(id: Uuid, sequence: u32) -> Self {
        Self {
            id,
            sequence,
            rack_id: None,
            assigned_at: None,
        }
    }

    /// A box that an earlier commit already placed on `rack_id`.
    pub fn assigned(id: Uuid, sequence: u32, rack_id: Uuid) -> Self {
        Self {
            id,
            sequence,
            rack_id: Some(rack_id),
            assigned_at: None,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.rack_id.is_some()
    }
}

/// A shipment whose boxes are stored across one or more racks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Shipment {
    id: Uuid,
    reference: String,
    total_boxes: u32,
    boxes_per_pallet: u32,
    boxes: Vec<ShipmentBox>,
    status: ShipmentStatus,
}

impl Shipment {
    /// New shipment with `total_boxes` freshly minted, unassigned boxes.
    pub fn new(reference: impl Into<String>, total_boxes: u32, boxes_per_pallet: u32) -> Self {
        let boxes = (1..=total_boxes)
            .map(|sequence| ShipmentBox::unassigned(Uuid::new_v4(), sequence))
            .collect();
        Self::assemble(Uuid::new_v4(), reference.into(), total_boxes, boxes_per_pallet, boxes)
    }

    /// Rebuilds a shipment from persisted boxes, some of which may already
    /// sit on racks.
    pub fn from_parts(
        id: Uuid,
        reference: impl Into<String>,
        boxes_per_pallet: u32,
        mut boxes: Vec<ShipmentBox>,
    ) -> Result<Self, ServiceError> {
        let total_boxes = u32::try_from(boxes.len()).map_err(|_| {
            ServiceError::InvalidInput(format!("Shipment {} has too many boxes", id))
        })?;
        boxes.sort_by_key(|b| b.sequence);
        if boxes.windows(2).any(|pair| pair[0].sequence == pair[1].sequence) {
            return Err(ServiceError::InvalidInput(format!(
                "Shipment {} has duplicate box sequence numbers",
                id
            )));
        }
        Ok(Self::assemble(
            id,
            reference.into(),
            total_boxes,
            boxes_per_pallet,
            boxes,
        ))
    }

    fn assemble(
        id: Uuid,
        reference: String,
        total_boxes: u32,
        boxes_per_pallet: u32,
        boxes: Vec<ShipmentBox>,
    ) -> Self {
        let mut shipment = Self {
            id,
            reference,
            total_boxes,
            boxes_per_pallet,
            boxes,
            status: ShipmentStatus::Pending,
        };
        shipment.status = ShipmentStatus::derive(total_boxes, shipment.remaining_boxes());
        shipment
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn total_boxes(&self) -> u32 {
        self.total_boxes
    }

    /// Boxes grouped per pallet; 0 means the shipment is not palletized
    pub fn boxes_per_pallet(&self) -> u32 {
        self.boxes_per_pallet
    }

    pub fn boxes(&self) -> &[ShipmentBox] {
        &self.boxes
    }

    pub fn status(&self) -> ShipmentStatus {
        self.status
    }

    /// Boxes not yet linked to any rack.
    pub fn remaining_boxes(&self) -> u32 {
        // Bounded by total_boxes, which fits in u32
        self.boxes.iter().filter(|b| !b.is_assigned()).count() as u32
    }

    /// Ids of boxes not yet on a rack, in sequence order.
    pub fn unassigned_box_ids(&self) -> Vec<Uuid> {
        self.boxes
            .iter()
            .filter(|b| !b.is_assigned())
            .map(|b| b.id)
            .collect()
    }

    pub fn boxes_on_rack(&self, rack_id: Uuid) -> Vec<Uuid> {
        self.boxes
            .iter()
            .filter(|b| b.rack_id == Some(rack_id))
            .map(|b| b.id)
            .collect()
    }

    /// Tags the first `count` unassigned boxes (by sequence) with `rack_id`
    /// and recomputes the status. Callers check `count` against
    /// `remaining_boxes` beforehand.
    pub(crate) fn assign_boxes(
        &mut self,
        rack_id: Uuid,
        count: u32,
        at: DateTime<Utc>,
    ) -> Vec<Uuid> {
        let assigned: Vec<Uuid> = self
            .boxes
            .iter_mut()
            .filter(|b| !b.is_assigned())
            .take(count as usize)
            .map(|b| {
                b.rack_id = Some(rack_id);
                b.assigned_at = Some(at);
                b.id
            })
            .collect();
        self.status = ShipmentStatus::derive(self.total_boxes, self.remaining_boxes());
        assigned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case(10, 10, ShipmentStatus::Pending)]
    #[case(10, 4, ShipmentStatus::Partial)]
    #[case(10, 1, ShipmentStatus::Partial)]
    #[case(10, 0, ShipmentStatus::FullyAllocated)]
    #[case(0, 0, ShipmentStatus::FullyAllocated)]
    fn status_follows_remaining(
        #[case] total: u32,
        #[case] remaining: u32,
        #[case] expected: ShipmentStatus,
    ) {
        assert_eq!(ShipmentStatus::derive(total, remaining), expected);
    }

    #[test]
    fn status_only_moves_forward() {
        assert!(ShipmentStatus::Pending.can_transition_to(ShipmentStatus::Partial));
        assert!(ShipmentStatus::Partial.can_transition_to(ShipmentStatus::Partial));
        assert!(ShipmentStatus::Partial.can_transition_to(ShipmentStatus::FullyAllocated));
        assert!(!ShipmentStatus::FullyAllocated.can_transition_to(ShipmentStatus::Partial));
        assert!(!ShipmentStatus::Partial.can_transition_to(ShipmentStatus::Pending));
    }

    #[test]
    fn status_strings() {
        assert_eq!(ShipmentStatus::FullyAllocated.to_string(), "FULLY_ALLOCATED");
        assert_eq!(ShipmentStatus::FullyAllocated.downstream_code(), "IN_STORAGE");
        assert_eq!(
            ShipmentStatus::from_str("PARTIAL").unwrap(),
            ShipmentStatus::Partial
        );
    }

    #[test]
    fn assign_tags_first_unassigned_boxes_in_sequence() {
        let mut shipment = Shipment::new("SHP-1001", 5, 0);
        let rack = Uuid::new_v4();
        let expected: Vec<Uuid> = shipment.boxes()[..3].iter().map(|b| b.id).collect();

        let assigned = shipment.assign_boxes(rack, 3, Utc::now());

        assert_eq!(assigned, expected);
        assert_eq!(shipment.remaining_boxes(), 2);
        assert_eq!(shipment.status(), ShipmentStatus::Partial);
        assert_eq!(shipment.boxes_on_rack(rack), expected);
    }

    #[test]
    fn unassigned_ids_shrink_from_the_front() {
        let mut shipment = Shipment::new("SHP-1002", 6, 3);
        let all: Vec<Uuid> = shipment.boxes().iter().map(|b| b.id).collect();
        assert_eq!(shipment.unassigned_box_ids(), all);

        shipment.assign_boxes(Uuid::new_v4(), 4, Utc::now());
        assert_eq!(shipment.unassigned_box_ids(), all[4..].to_vec());

        shipment.assign_boxes(Uuid::new_v4(), 2, Utc::now());
        assert!(shipment.unassigned_box_ids().is_empty());
        assert_eq!(shipment.status(), ShipmentStatus::FullyAllocated);
    }

    #[test]
    fn from_parts_restores_partial_shipment() {
        let rack = Uuid::new_v4();
        let boxes = vec![
            ShipmentBox::unassigned(Uuid::new_v4(), 2),
            ShipmentBox::assigned(Uuid::new_v4(), 1, rack),
            ShipmentBox::unassigned(Uuid::new_v4(), 3),
        ];
        let shipment = Shipment::from_parts(Uuid::new_v4(), "SHP-1002", 2, boxes).unwrap();

        assert_eq!(shipment.total_boxes(), 3);
        assert_eq!(shipment.remaining_boxes(), 2);
        assert_eq!(shipment.status(), ShipmentStatus::Partial);
        assert_eq!(shipment.boxes()[0].sequence, 1);
    }

    #[test]
    fn from_parts_rejects_duplicate_sequences() {
        let boxes = vec![
            ShipmentBox::unassigned(Uuid::new_v4(), 1),
            ShipmentBox::unassigned(Uuid::new_v4(), 1),
        ];
        let result = Shipment::from_parts(Uuid::new_v4(), "SHP-1003", 0, boxes);
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    }
}

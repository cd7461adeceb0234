use serde::Serialize;
use uuid::Uuid;

use crate::errors::ServiceError;

/// A storage rack measured in boxes.
///
/// `capacity_used` never decreases here and never exceeds `capacity_total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rack {
    id: Uuid,
    label: String,
    capacity_total: u32,
    capacity_used: u32,
}

impl Rack {
    pub fn new(label: impl Into<String>, capacity_total: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            capacity_total,
            capacity_used: 0,
        }
    }

    /// Rebuilds a rack that already holds boxes.
    pub fn with_usage(
        id: Uuid,
        label: impl Into<String>,
        capacity_total: u32,
        capacity_used: u32,
    ) -> Result<Self, ServiceError> {
        if capacity_used > capacity_total {
            return Err(ServiceError::InvalidInput(format!(
                "Rack {} uses {} of only {} slots",
                id, capacity_used, capacity_total
            )));
        }
        Ok(Self {
            id,
            label: label.into(),
            capacity_total,
            capacity_used,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn capacity_total(&self) -> u32 {
        self.capacity_total
    }

    pub fn capacity_used(&self) -> u32 {
        self.capacity_used
    }

    pub fn remaining(&self) -> u32 {
        self.capacity_total - self.capacity_used
    }

    pub fn can_hold(&self, boxes: u32) -> bool {
        boxes <= self.remaining()
    }

    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// Reserves space for `boxes`; fails without touching the rack when
    /// they do not fit.
    pub(crate) fn occupy(&mut self, boxes: u32) -> Result<u32, ServiceError> {
        if !self.can_hold(boxes) {
            return Err(ServiceError::CapacityExceeded {
                requested: boxes,
                remaining: self.remaining(),
                capacity_total: self.capacity_total,
            });
        }
        self.capacity_used += boxes;
        Ok(self.capacity_used)
    }
}

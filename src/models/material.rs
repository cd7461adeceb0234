use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{effective_scale, validate_non_negative};
use crate::errors::ServiceError;

/// Largest number of decimal places a material unit may be counted in.
pub const MAX_UNIT_SCALE: u32 = 6;

/// A stocked material that can be issued to jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Material {
    pub id: Uuid,

    #[validate(length(min = 1, max = 64, message = "SKU must be between 1 and 64 characters"))]
    pub sku: String,

    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    /// Cost of one unit, used to value damage
    #[validate(custom = "validate_non_negative")]
    pub unit_cost: Decimal,

    /// Quantity on the shelf and free to issue
    #[validate(custom = "validate_non_negative")]
    pub available_quantity: Decimal,

    /// Decimal places a quantity of this material may carry; 0 means whole units
    #[validate(range(max = 6, message = "Unit scale must be at most 6"))]
    pub unit_scale: u32,
}

impl Material {
    pub fn new(
        sku: impl Into<String>,
        name: impl Into<String>,
        unit_cost: Decimal,
        available_quantity: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sku: sku.into(),
            name: name.into(),
            unit_cost,
            available_quantity,
            unit_scale: 0,
        }
    }

    pub fn with_unit_scale(mut self, unit_scale: u32) -> Self {
        self.unit_scale = unit_scale;
        self
    }

    /// Whether `quantity` is expressible in this material's unit granularity.
    pub fn accepts(&self, quantity: Decimal) -> bool {
        effective_scale(quantity) <= self.unit_scale
    }

    /// Applies a stock delta and returns the new available quantity.
    /// The material is left untouched when the delta does not belong to it
    /// or would overflow.
    pub(crate) fn apply_delta(&mut self, delta: &StockDelta) -> Result<Decimal, ServiceError> {
        if delta.material_id != self.id {
            return Err(ServiceError::InvalidInput(format!(
                "Stock delta for material {} applied to material {}",
                delta.material_id, self.id
            )));
        }
        let updated = self
            .available_quantity
            .checked_add(delta.quantity)
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Stock level overflow for material {}",
                    self.id
                ))
            })?;
        self.available_quantity = updated;
        Ok(updated)
    }
}

/// Change to a material's available quantity produced by a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDelta {
    pub material_id: Uuid,
    pub quantity: Decimal,
}

impl StockDelta {
    pub fn is_zero(&self) -> bool {
        self.quantity.is_zero()
    }
}

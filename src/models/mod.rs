//! Domain entities for material reconciliation and rack allocation.

pub mod allocation;
pub mod damage_record;
pub mod material;
pub mod material_issue;
pub mod rack;
pub mod reconciliation;
pub mod shipment;

pub use allocation::{AllocationOutcome, AllocationProposal, AllocationRequest};
pub use damage_record::DamageRecord;
pub use material::{Material, StockDelta};
pub use material_issue::MaterialIssue;
pub use rack::Rack;
pub use reconciliation::ReturnReconciliation;
pub use shipment::{Shipment, ShipmentBox, ShipmentStatus};

use rust_decimal::Decimal;
use validator::ValidationError;

/// Validates that a decimal quantity or amount is not negative
pub(crate) fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("Value must not be negative".into());
        return Err(err);
    }
    Ok(())
}

/// Number of decimal places a quantity actually uses (trailing zeros ignored)
pub(crate) fn effective_scale(value: Decimal) -> u32 {
    value.normalize().scale()
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::material_issue::MaterialIssue;
use crate::errors::ServiceError;

/// Evidence attached to a reconciliation that reports damaged units.
///
/// A record can only be built with a non-blank reason and at least one
/// photo, so holding one is proof the justification was supplied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DamageRecord {
    id: Uuid,
    issue_id: Uuid,
    job_id: Uuid,
    material_id: Uuid,
    quantity_damaged: Decimal,
    reason: String,
    photo_count: u32,
    unit_cost: Decimal,
    value_loss: Decimal,
    recorded_at: DateTime<Utc>,
}

impl DamageRecord {
    /// Checks reason then evidence, in that order.
    pub fn new(
        issue: &MaterialIssue,
        quantity_damaged: Decimal,
        reason: &str,
        photo_count: u32,
    ) -> Result<Self, ServiceError> {
        if quantity_damaged <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(format!(
                "Damage record requires a positive damaged quantity, got {}",
                quantity_damaged
            )));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::MissingDamageReason { quantity_damaged });
        }
        if photo_count == 0 {
            return Err(ServiceError::MissingEvidence { quantity_damaged });
        }

        let value_loss = quantity_damaged
            .checked_mul(issue.unit_cost())
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Value loss overflow for issue {}",
                    issue.id()
                ))
            })?;

        Ok(Self {
            id: Uuid::new_v4(),
            issue_id: issue.id(),
            job_id: issue.job_id(),
            material_id: issue.material_id(),
            quantity_damaged,
            reason: reason.to_string(),
            photo_count,
            unit_cost: issue.unit_cost(),
            value_loss,
            recorded_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn issue_id(&self) -> Uuid {
        self.issue_id
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn material_id(&self) -> Uuid {
        self.material_id
    }

    pub fn quantity_damaged(&self) -> Decimal {
        self.quantity_damaged
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn photo_count(&self) -> u32 {
        self.photo_count
    }

    pub fn unit_cost(&self) -> Decimal {
        self.unit_cost
    }

    /// Damaged quantity valued at the issue's unit cost
    pub fn value_loss(&self) -> Decimal {
        self.value_loss
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

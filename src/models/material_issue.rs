use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::material::Material;
use crate::errors::ServiceError;

/// A quantity of one material granted to one job.
///
/// Immutable once created. The unit cost is captured at issue time so later
/// price changes do not alter the value of damage reported against it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialIssue {
    id: Uuid,
    job_id: Uuid,
    material_id: Uuid,
    quantity: Decimal,
    unit_cost: Decimal,
    issued_at: DateTime<Utc>,
}

impl MaterialIssue {
    pub fn new(job_id: Uuid, material: &Material, quantity: Decimal) -> Result<Self, ServiceError> {
        if !material.accepts(quantity) {
            return Err(ServiceError::InvalidInput(format!(
                "Quantity {} is finer than the {} decimal places allowed for {}",
                quantity, material.unit_scale, material.sku
            )));
        }
        Self::from_parts(
            Uuid::new_v4(),
            job_id,
            material.id,
            quantity,
            material.unit_cost,
            Utc::now(),
        )
    }

    /// Rebuilds an issue loaded from storage, keeping its id and cost snapshot.
    pub fn from_parts(
        id: Uuid,
        job_id: Uuid,
        material_id: Uuid,
        quantity: Decimal,
        unit_cost: Decimal,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(format!(
                "Issued quantity must be positive, got {}",
                quantity
            )));
        }
        if unit_cost < Decimal::ZERO {
            return Err(ServiceError::InvalidInput(format!(
                "Unit cost of issue {} must not be negative, got {}",
                id, unit_cost
            )));
        }
        Ok(Self {
            id,
            job_id,
            material_id,
            quantity,
            unit_cost,
            issued_at,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn material_id(&self) -> Uuid {
        self.material_id
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit_cost(&self) -> Decimal {
        self.unit_cost
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

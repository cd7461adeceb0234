//! Quantity ledger
//!
//! Splits an issued quantity into returned-good, damaged and consumed. The
//! consumed amount is always derived, and a damage record is produced for
//! every damaged return. Functions here are pure: they take snapshots and
//! return new records plus the stock delta the caller must apply.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::models::{
    validate_non_negative, DamageRecord, Material, MaterialIssue, ReturnReconciliation, StockDelta,
};

/// Quantities reported back for one issue when a job completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ReturnInput {
    #[validate(custom = "validate_non_negative")]
    pub quantity_good: Decimal,

    #[validate(custom = "validate_non_negative")]
    pub quantity_damaged: Decimal,

    #[serde(default)]
    #[validate(length(max = 1000, message = "Damage reason must be at most 1000 characters"))]
    pub damage_reason: String,

    /// Number of evidence photos attached; the photos themselves live elsewhere
    #[serde(default)]
    pub photo_count: u32,
}

impl ReturnInput {
    /// A return with nothing damaged.
    pub fn good(quantity_good: Decimal) -> Self {
        Self {
            quantity_good,
            quantity_damaged: Decimal::ZERO,
            damage_reason: String::new(),
            photo_count: 0,
        }
    }

    pub fn with_damage(
        mut self,
        quantity_damaged: Decimal,
        reason: impl Into<String>,
        photo_count: u32,
    ) -> Self {
        self.quantity_damaged = quantity_damaged;
        self.damage_reason = reason.into();
        self.photo_count = photo_count;
        self
    }
}

/// Everything a successful reconciliation produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationOutcome {
    pub reconciliation: ReturnReconciliation,
    pub damage_record: Option<DamageRecord>,
    /// Only good units go back on the shelf
    pub stock_delta: StockDelta,
}

/// Reconciles one issue.
///
/// An issue that already has a reconciliation is refused whatever the input.
/// Otherwise the checks run in order and the first failure wins: over-return,
/// missing damage reason, missing evidence.
pub fn reconcile(
    issue: &MaterialIssue,
    existing: Option<&ReturnReconciliation>,
    material: &Material,
    input: &ReturnInput,
) -> Result<ReconciliationOutcome, ServiceError> {
    if existing.is_some() {
        return Err(ServiceError::AlreadyReconciled {
            issue_id: issue.id(),
        });
    }
    if material.id != issue.material_id() {
        return Err(ServiceError::InvalidInput(format!(
            "Issue {} is for material {}, not {}",
            issue.id(),
            issue.material_id(),
            material.id
        )));
    }

    input.validate()?;
    for quantity in [input.quantity_good, input.quantity_damaged] {
        if !material.accepts(quantity) {
            return Err(ServiceError::InvalidInput(format!(
                "Quantity {} is finer than the {} decimal places allowed for {}",
                quantity, material.unit_scale, material.sku
            )));
        }
    }

    let returned = input
        .quantity_good
        .checked_add(input.quantity_damaged)
        .ok_or_else(|| ServiceError::InvalidInput("Returned quantity overflows".into()))?;
    if returned > issue.quantity() {
        return Err(ServiceError::OverReturn {
            requested: returned,
            limit: issue.quantity(),
        });
    }

    let damage_record = if input.quantity_damaged > Decimal::ZERO {
        Some(DamageRecord::new(
            issue,
            input.quantity_damaged,
            &input.damage_reason,
            input.photo_count,
        )?)
    } else {
        None
    };

    let reconciliation = ReturnReconciliation::new(
        issue,
        input.quantity_good,
        input.quantity_damaged,
        damage_record.as_ref().map(DamageRecord::id),
    )?;

    Ok(ReconciliationOutcome {
        stock_delta: StockDelta {
            material_id: issue.material_id(),
            quantity: input.quantity_good,
        },
        reconciliation,
        damage_record,
    })
}

/// Damage totals for one material.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaterialLoss {
    pub quantity_damaged: Decimal,
    pub value_loss: Decimal,
    pub records: usize,
}

/// Aggregated value lost to damage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LossSummary {
    pub total_quantity_damaged: Decimal,
    pub total_value_loss: Decimal,
    pub by_material: BTreeMap<Uuid, MaterialLoss>,
}

pub fn summarize_losses<'a>(records: impl IntoIterator<Item = &'a DamageRecord>) -> LossSummary {
    records
        .into_iter()
        .fold(LossSummary::default(), |mut summary, record| {
            summary.total_quantity_damaged += record.quantity_damaged();
            summary.total_value_loss += record.value_loss();

            let entry = summary.by_material.entry(record.material_id()).or_default();
            entry.quantity_damaged += record.quantity_damaged();
            entry.value_loss += record.value_loss();
            entry.records += 1;
            summary
        })
}

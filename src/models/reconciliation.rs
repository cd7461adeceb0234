use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::material_issue::MaterialIssue;
use crate::errors::ServiceError;

/// The split of an issued quantity into returned-good, damaged and consumed.
///
/// `quantity_used` is derived and cannot be supplied by callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnReconciliation {
    id: Uuid,
    issue_id: Uuid,
    job_id: Uuid,
    material_id: Uuid,
    quantity_issued: Decimal,
    quantity_good: Decimal,
    quantity_damaged: Decimal,
    quantity_used: Decimal,
    damage_record_id: Option<Uuid>,
    reconciled_at: DateTime<Utc>,
}

impl ReturnReconciliation {
    /// Builds the reconciliation, rejecting any split that returns more than
    /// was issued.
    pub(crate) fn new(
        issue: &MaterialIssue,
        quantity_good: Decimal,
        quantity_damaged: Decimal,
        damage_record_id: Option<Uuid>,
    ) -> Result<Self, ServiceError> {
        Self::from_parts(
            Uuid::new_v4(),
            issue,
            quantity_good,
            quantity_damaged,
            damage_record_id,
            Utc::now(),
        )
    }

    /// Rebuilds a stored reconciliation of `issue`.
    ///
    /// `quantity_used` is derived again from the stored split, and a split
    /// that is negative or returns more than was issued is refused.
    pub fn from_parts(
        id: Uuid,
        issue: &MaterialIssue,
        quantity_good: Decimal,
        quantity_damaged: Decimal,
        damage_record_id: Option<Uuid>,
        reconciled_at: DateTime<Utc>,
    ) -> Result<Self, ServiceError> {
        for quantity in [quantity_good, quantity_damaged] {
            if quantity < Decimal::ZERO {
                return Err(ServiceError::InvalidInput(format!(
                    "Reconciled quantity must not be negative, got {}",
                    quantity
                )));
            }
        }
        if quantity_damaged.is_zero() != damage_record_id.is_none() {
            return Err(ServiceError::InvalidInput(format!(
                "Reconciliation {} must reference a damage record exactly when units are damaged",
                id
            )));
        }

        let returned = quantity_good
            .checked_add(quantity_damaged)
            .ok_or_else(|| ServiceError::InvalidInput("Returned quantity overflows".into()))?;
        if returned > issue.quantity() {
            return Err(ServiceError::OverReturn {
                requested: returned,
                limit: issue.quantity(),
            });
        }

        Ok(Self {
            id,
            issue_id: issue.id(),
            job_id: issue.job_id(),
            material_id: issue.material_id(),
            quantity_issued: issue.quantity(),
            quantity_good,
            quantity_damaged,
            quantity_used: issue.quantity() - returned,
            damage_record_id,
            reconciled_at,
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

    pub fn quantity_issued(&self) -> Decimal {
        self.quantity_issued
    }

    pub fn quantity_good(&self) -> Decimal {
        self.quantity_good
    }

    pub fn quantity_damaged(&self) -> Decimal {
        self.quantity_damaged
    }

    pub fn quantity_used(&self) -> Decimal {
        self.quantity_used
    }

    pub fn damage_record_id(&self) -> Option<Uuid> {
        self.damage_record_id
    }

    pub fn reconciled_at(&self) -> DateTime<Utc> {
        self.reconciled_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Material;
    use rust_decimal_macros::dec;

    #[test]
    fn used_quantity_is_derived() {
        let material = Material::new("STRAP", "Ratchet strap", dec!(6), dec!(20));
        let issue = MaterialIssue::new(Uuid::new_v4(), &material, dec!(10)).unwrap();

        let rec =
            ReturnReconciliation::new(&issue, dec!(7), dec!(2), Some(Uuid::new_v4())).unwrap();
        assert_eq!(rec.quantity_used(), dec!(1));
        assert_eq!(rec.quantity_issued(), dec!(10));
    }

    #[test]
    fn stored_reconciliation_is_rebuilt_with_derived_usage() {
        let material = Material::new("STRAP", "Ratchet strap", dec!(6), dec!(20));
        let issue = MaterialIssue::new(Uuid::new_v4(), &material, dec!(10)).unwrap();
        let id = Uuid::new_v4();
        let damage_id = Uuid::new_v4();
        let at = Utc::now();

        let rec =
            ReturnReconciliation::from_parts(id, &issue, dec!(5), dec!(3), Some(damage_id), at)
                .unwrap();

        assert_eq!(rec.id(), id);
        assert_eq!(rec.issue_id(), issue.id());
        assert_eq!(rec.quantity_used(), dec!(2));
        assert_eq!(rec.damage_record_id(), Some(damage_id));
        assert_eq!(rec.reconciled_at(), at);
    }

    #[test]
    fn inconsistent_stored_reconciliation_is_refused() {
        let material = Material::new("STRAP", "Ratchet strap", dec!(6), dec!(20));
        let issue = MaterialIssue::new(Uuid::new_v4(), &material, dec!(4)).unwrap();
        let rebuild = |good: Decimal, damaged: Decimal, damage_id: Option<Uuid>| {
            ReturnReconciliation::from_parts(
                Uuid::new_v4(),
                &issue,
                good,
                damaged,
                damage_id,
                Utc::now(),
            )
        };

        assert!(matches!(
            rebuild(dec!(4), dec!(1), Some(Uuid::new_v4())),
            Err(ServiceError::OverReturn { .. })
        ));
        assert!(matches!(
            rebuild(dec!(-1), Decimal::ZERO, None),
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            rebuild(dec!(1), dec!(1), None),
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[test]
    fn full_return_leaves_nothing_used() {
        let material = Material::new("STRAP", "Ratchet strap", dec!(6), dec!(20));
        let issue = MaterialIssue::new(Uuid::new_v4(), &material, dec!(4)).unwrap();

        let rec = ReturnReconciliation::new(&issue, dec!(4), Decimal::ZERO, None).unwrap();
        assert_eq!(rec.quantity_used(), Decimal::ZERO);
    }
}

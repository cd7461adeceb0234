//! In-memory warehouse state.
//!
//! Each entity sits behind its own async mutex so that transitions on
//! different shipments, racks or issues proceed in parallel while two
//! transitions on the same entity are serialized. Handles are cloned out of
//! the maps before they are awaited; no map shard lock is ever held across
//! an `.await`.
//!
//! Lock order for callers taking more than one lock: issues before
//! materials, shipments before racks, and ascending id within a kind.

pub mod idempotency;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::models::{DamageRecord, Material, MaterialIssue, Rack, ReturnReconciliation, Shipment};
use crate::services::ledger::ReconciliationOutcome;

pub use idempotency::{IdempotencyStore, PendingRequest, Reservation, StoredAllocation};

pub(crate) type Shared<T> = Arc<Mutex<T>>;

/// An issue together with whatever its reconciliation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueLedgerEntry {
    pub issue: MaterialIssue,
    pub reconciliation: Option<ReturnReconciliation>,
    pub damage_record: Option<DamageRecord>,
}

impl IssueLedgerEntry {
    fn new(issue: MaterialIssue) -> Self {
        Self {
            issue,
            reconciliation: None,
            damage_record: None,
        }
    }

    pub fn is_reconciled(&self) -> bool {
        self.reconciliation.is_some()
    }

    pub(crate) fn record(&mut self, outcome: &ReconciliationOutcome) {
        self.reconciliation = Some(outcome.reconciliation.clone());
        self.damage_record = outcome.damage_record.clone();
    }
}

#[derive(Default)]
pub struct WarehouseStore {
    materials: DashMap<Uuid, Shared<Material>>,
    issues: DashMap<Uuid, Shared<IssueLedgerEntry>>,
    job_issues: DashMap<Uuid, Vec<Uuid>>,
    shipments: DashMap<Uuid, Shared<Shipment>>,
    racks: DashMap<Uuid, Shared<Rack>>,
    allocation_requests: IdempotencyStore,
}

fn insert_new<T>(
    map: &DashMap<Uuid, Shared<T>>,
    id: Uuid,
    value: T,
    kind: &str,
) -> Result<Uuid, ServiceError> {
    match map.entry(id) {
        Entry::Occupied(_) => Err(ServiceError::Conflict(format!(
            "{} {} already exists",
            kind, id
        ))),
        Entry::Vacant(slot) => {
            slot.insert(Arc::new(Mutex::new(value)));
            debug!(%id, kind, "Stored entity");
            Ok(id)
        }
    }
}

fn handle<T>(
    map: &DashMap<Uuid, Shared<T>>,
    id: Uuid,
    kind: &str,
) -> Result<Shared<T>, ServiceError> {
    map.get(&id)
        .map(|entry| Arc::clone(entry.value()))
        .ok_or_else(|| ServiceError::NotFound(format!("{} {} not found", kind, id)))
}

impl WarehouseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_material(&self, material: Material) -> Result<Uuid, ServiceError> {
        material.validate()?;
        insert_new(&self.materials, material.id, material, "Material")
    }

    /// Records an issue made by an upstream flow. The material must already
    /// be known; stock was drawn down when the issue was made.
    pub fn insert_issue(&self, issue: MaterialIssue) -> Result<Uuid, ServiceError> {
        if !self.materials.contains_key(&issue.material_id()) {
            return Err(ServiceError::NotFound(format!(
                "Material {} not found",
                issue.material_id()
            )));
        }
        let (id, job_id) = (issue.id(), issue.job_id());
        insert_new(&self.issues, id, IssueLedgerEntry::new(issue), "Issue")?;
        self.job_issues.entry(job_id).or_default().push(id);
        Ok(id)
    }

    pub fn insert_shipment(&self, shipment: Shipment) -> Result<Uuid, ServiceError> {
        insert_new(&self.shipments, shipment.id(), shipment, "Shipment")
    }

    pub fn insert_rack(&self, rack: Rack) -> Result<Uuid, ServiceError> {
        insert_new(&self.racks, rack.id(), rack, "Rack")
    }

    pub async fn material(&self, id: Uuid) -> Result<Material, ServiceError> {
        Ok(self.material_handle(id)?.lock().await.clone())
    }

    pub async fn issue(&self, id: Uuid) -> Result<MaterialIssue, ServiceError> {
        Ok(self.issue_handle(id)?.lock().await.issue.clone())
    }

    pub async fn issue_entry(&self, id: Uuid) -> Result<IssueLedgerEntry, ServiceError> {
        Ok(self.issue_handle(id)?.lock().await.clone())
    }

    /// The reconciliation stored for an issue, if it has been reconciled.
    pub async fn reconciliation(
        &self,
        issue_id: Uuid,
    ) -> Result<Option<ReturnReconciliation>, ServiceError> {
        Ok(self.issue_handle(issue_id)?.lock().await.reconciliation.clone())
    }

    pub async fn shipment(&self, id: Uuid) -> Result<Shipment, ServiceError> {
        Ok(self.shipment_handle(id)?.lock().await.clone())
    }

    pub async fn rack(&self, id: Uuid) -> Result<Rack, ServiceError> {
        Ok(self.rack_handle(id)?.lock().await.clone())
    }

    /// Issue ids recorded for a job, in insertion order.
    pub fn issue_ids_for_job(&self, job_id: Uuid) -> Vec<Uuid> {
        self.job_issues
            .get(&job_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default()
    }

    pub async fn damage_records_for_job(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<DamageRecord>, ServiceError> {
        let mut records = Vec::new();
        for issue_id in self.issue_ids_for_job(job_id) {
            let entry = self.issue_handle(issue_id)?;
            if let Some(record) = entry.lock().await.damage_record.clone() {
                records.push(record);
            };
        }
        Ok(records)
    }

    /// Box ids of `shipment_id` that sit on `rack_id`.
    pub async fn boxes_on_rack(
        &self,
        shipment_id: Uuid,
        rack_id: Uuid,
    ) -> Result<Vec<Uuid>, ServiceError> {
        let shipment = self.shipment_handle(shipment_id)?;
        let boxes = shipment.lock().await.boxes_on_rack(rack_id);
        Ok(boxes)
    }

    pub(crate) fn material_handle(&self, id: Uuid) -> Result<Shared<Material>, ServiceError> {
        handle(&self.materials, id, "Material")
    }

    pub(crate) fn issue_handle(&self, id: Uuid) -> Result<Shared<IssueLedgerEntry>, ServiceError> {
        handle(&self.issues, id, "Issue")
    }

    pub(crate) fn shipment_handle(&self, id: Uuid) -> Result<Shared<Shipment>, ServiceError> {
        handle(&self.shipments, id, "Shipment")
    }

    pub(crate) fn rack_handle(&self, id: Uuid) -> Result<Shared<Rack>, ServiceError> {
        handle(&self.racks, id, "Rack")
    }

    pub(crate) fn allocation_requests(&self) -> &IdempotencyStore {
        &self.allocation_requests
    }
}

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    commands::Command,
    errors::ServiceError,
    events::{Event, EventSender},
    models::MaterialIssue,
    services::ledger::{self, ReconciliationOutcome, ReturnInput},
    store::WarehouseStore,
};

/// Reconciles the return quantities of a single issue.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReconcileIssueCommand {
    pub issue_id: Uuid,
    #[validate]
    pub input: ReturnInput,
}

impl ReconcileIssueCommand {
    pub fn new(issue_id: Uuid, input: ReturnInput) -> Self {
        Self { issue_id, input }
    }
}

#[async_trait]
impl Command for ReconcileIssueCommand {
    type Result = ReconciliationOutcome;

    #[instrument(skip(self, store, event_sender), fields(issue_id = %self.issue_id))]
    async fn execute(
        &self,
        store: Arc<WarehouseStore>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let applied = apply_reconciliation(&store, self.issue_id, None, &self.input).await?;
        publish_reconciliation(&event_sender, &applied).await;

        Ok(applied.outcome)
    }
}

/// A reconciliation that has been written to the store.
pub(crate) struct AppliedReconciliation {
    pub outcome: ReconciliationOutcome,
    pub new_available: Decimal,
}

/// Reconciles one issue under its lock and its material's lock.
///
/// When `expected_job` is set the issue must belong to that job. Nothing is
/// written unless every check passes and the stock delta applies.
pub(crate) async fn apply_reconciliation(
    store: &WarehouseStore,
    issue_id: Uuid,
    expected_job: Option<Uuid>,
    input: &ReturnInput,
) -> Result<AppliedReconciliation, ServiceError> {
    let entry_handle = store.issue_handle(issue_id)?;
    let mut entry = entry_handle.lock().await;

    if let Some(job_id) = expected_job {
        ensure_issue_in_job(&entry.issue, job_id)?;
    }

    let material_handle = store.material_handle(entry.issue.material_id())?;
    let mut material = material_handle.lock().await;

    let outcome = ledger::reconcile(&entry.issue, entry.reconciliation.as_ref(), &material, input)?;
    let new_available = material.apply_delta(&outcome.stock_delta)?;
    entry.record(&outcome);

    info!(
        issue_id = %issue_id,
        job_id = %entry.issue.job_id(),
        quantity_good = %outcome.reconciliation.quantity_good(),
        quantity_damaged = %outcome.reconciliation.quantity_damaged(),
        quantity_used = %outcome.reconciliation.quantity_used(),
        "Issue reconciled"
    );

    Ok(AppliedReconciliation {
        outcome,
        new_available,
    })
}

pub(crate) fn ensure_issue_in_job(issue: &MaterialIssue, job_id: Uuid) -> Result<(), ServiceError> {
    if issue.job_id() != job_id {
        return Err(ServiceError::InvalidInput(format!(
            "Issue {} belongs to job {}, not {}",
            issue.id(),
            issue.job_id(),
            job_id
        )));
    }
    Ok(())
}

/// Emits the events for an applied reconciliation. The transition is already
/// committed, so a closed channel is logged rather than returned.
pub(crate) async fn publish_reconciliation(
    event_sender: &EventSender,
    applied: &AppliedReconciliation,
) {
    let reconciliation = &applied.outcome.reconciliation;
    let mut events = vec![Event::ReturnReconciled {
        issue_id: reconciliation.issue_id(),
        job_id: reconciliation.job_id(),
        material_id: reconciliation.material_id(),
        quantity_good: reconciliation.quantity_good(),
        quantity_damaged: reconciliation.quantity_damaged(),
        quantity_used: reconciliation.quantity_used(),
    }];

    if let Some(damage) = &applied.outcome.damage_record {
        events.push(Event::DamageRecorded {
            damage_record_id: damage.id(),
            issue_id: damage.issue_id(),
            material_id: damage.material_id(),
            quantity_damaged: damage.quantity_damaged(),
            value_loss: damage.value_loss(),
        });
    }

    let delta = applied.outcome.stock_delta;
    if !delta.is_zero() {
        events.push(Event::StockAdjusted {
            material_id: delta.material_id,
            delta: delta.quantity,
            new_available: applied.new_available,
        });
    }

    for event in events {
        let name = event.name();
        if let Err(e) = event_sender.send(event).await {
            error!(event = name, issue_id = %reconciliation.issue_id(), "{}", e);
        }
    }
}

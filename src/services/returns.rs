use crate::{
    commands::returns::{
        CompleteJobCommand, IssueReturn, JobCompletionReport, ReconcileIssueCommand,
    },
    commands::Command,
    config::BatchPolicy,
    errors::ServiceError,
    events::EventSender,
    models::ReturnReconciliation,
    services::ledger::{self, LossSummary, ReconciliationOutcome, ReturnInput},
    store::WarehouseStore,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Service for reconciling returned material
#[derive(Clone)]
pub struct ReturnService {
    store: Arc<WarehouseStore>,
    event_sender: Arc<EventSender>,
    batch_policy: BatchPolicy,
}

impl ReturnService {
    /// Creates a new return service instance
    pub fn new(
        store: Arc<WarehouseStore>,
        event_sender: Arc<EventSender>,
        batch_policy: BatchPolicy,
    ) -> Self {
        Self {
            store,
            event_sender,
            batch_policy,
        }
    }

    pub fn batch_policy(&self) -> BatchPolicy {
        self.batch_policy
    }

    /// Reconciles a single issue
    #[instrument(skip(self, input))]
    pub async fn reconcile_issue(
        &self,
        issue_id: Uuid,
        input: ReturnInput,
    ) -> Result<ReconciliationOutcome, ServiceError> {
        ReconcileIssueCommand::new(issue_id, input)
            .execute(self.store.clone(), self.event_sender.clone())
            .await
    }

    /// Reconciles every listed issue of a job using the configured batch policy
    #[instrument(skip(self, returns), fields(issues = returns.len()))]
    pub async fn complete_job(
        &self,
        job_id: Uuid,
        returns: Vec<IssueReturn>,
    ) -> Result<JobCompletionReport, ServiceError> {
        self.complete_job_with_policy(job_id, returns, self.batch_policy)
            .await
    }

    pub async fn complete_job_with_policy(
        &self,
        job_id: Uuid,
        returns: Vec<IssueReturn>,
        policy: BatchPolicy,
    ) -> Result<JobCompletionReport, ServiceError> {
        CompleteJobCommand::new(job_id, returns, policy)
            .execute(self.store.clone(), self.event_sender.clone())
            .await
    }

    /// Gets the stored reconciliation of an issue
    pub async fn reconciliation(
        &self,
        issue_id: Uuid,
    ) -> Result<Option<ReturnReconciliation>, ServiceError> {
        self.store.reconciliation(issue_id).await
    }

    /// Totals the value lost to damage across a job's issues
    #[instrument(skip(self))]
    pub async fn job_loss_summary(&self, job_id: Uuid) -> Result<LossSummary, ServiceError> {
        let records = self.store.damage_records_for_job(job_id).await?;
        let summary = ledger::summarize_losses(&records);
        info!(
            %job_id,
            damaged = %summary.total_quantity_damaged,
            value_loss = %summary.total_value_loss,
            "Computed job loss summary"
        );
        Ok(summary)
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::reconcile_issue_command::{
    apply_reconciliation, ensure_issue_in_job, publish_reconciliation, AppliedReconciliation,
};
use crate::{
    commands::Command,
    config::BatchPolicy,
    errors::{ErrorResponse, ServiceError},
    events::EventSender,
    models::Material,
    services::ledger::{self, ReconciliationOutcome, ReturnInput},
    store::WarehouseStore,
};

/// Return quantities for one issue of the job being completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueReturn {
    pub issue_id: Uuid,
    pub input: ReturnInput,
}

impl IssueReturn {
    pub fn new(issue_id: Uuid, input: ReturnInput) -> Self {
        Self { issue_id, input }
    }
}

/// Reconciles every returned issue of a job in one call.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CompleteJobCommand {
    pub job_id: Uuid,
    #[validate(length(min = 1, message = "At least one issue must be returned"))]
    pub returns: Vec<IssueReturn>,
    #[serde(default)]
    pub policy: BatchPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum IssueOutcome {
    Reconciled {
        issue_id: Uuid,
        outcome: ReconciliationOutcome,
    },
    Rejected {
        issue_id: Uuid,
        error: ServiceError,
    },
}

impl IssueOutcome {
    pub fn issue_id(&self) -> Uuid {
        match self {
            IssueOutcome::Reconciled { issue_id, .. } | IssueOutcome::Rejected { issue_id, .. } => {
                *issue_id
            }
        }
    }

    pub fn is_reconciled(&self) -> bool {
        matches!(self, IssueOutcome::Reconciled { .. })
    }

    /// Rendered error body for a rejected issue.
    pub fn error_response(&self) -> Option<ErrorResponse> {
        match self {
            IssueOutcome::Rejected { error, .. } => Some(ErrorResponse::from(error)),
            IssueOutcome::Reconciled { .. } => None,
        }
    }
}

/// Per-issue results of a job completion, in request order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobCompletionReport {
    pub job_id: Uuid,
    pub policy: BatchPolicy,
    pub outcomes: Vec<IssueOutcome>,
}

impl JobCompletionReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_reconciled()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn is_complete(&self) -> bool {
        self.failed() == 0
    }

    pub fn outcome_for(&self, issue_id: Uuid) -> Option<&IssueOutcome> {
        self.outcomes.iter().find(|o| o.issue_id() == issue_id)
    }
}

impl CompleteJobCommand {
    pub fn new(job_id: Uuid, returns: Vec<IssueReturn>, policy: BatchPolicy) -> Self {
        Self {
            job_id,
            returns,
            policy,
        }
    }

    fn ensure_unique_issues(&self) -> Result<(), ServiceError> {
        let mut seen = HashSet::with_capacity(self.returns.len());
        for item in &self.returns {
            if !seen.insert(item.issue_id) {
                return Err(ServiceError::ValidationError(format!(
                    "Issue {} appears more than once",
                    item.issue_id
                )));
            }
        }
        Ok(())
    }

    async fn run_best_effort(
        &self,
        store: &WarehouseStore,
        event_sender: &EventSender,
    ) -> Vec<IssueOutcome> {
        let mut outcomes = Vec::with_capacity(self.returns.len());
        for item in &self.returns {
            match apply_reconciliation(store, item.issue_id, Some(self.job_id), &item.input).await {
                Ok(applied) => {
                    publish_reconciliation(event_sender, &applied).await;
                    outcomes.push(IssueOutcome::Reconciled {
                        issue_id: item.issue_id,
                        outcome: applied.outcome,
                    });
                }
                Err(error) => {
                    warn!(
                        job_id = %self.job_id,
                        issue_id = %item.issue_id,
                        code = error.code(),
                        "Issue return rejected: {}",
                        error
                    );
                    outcomes.push(IssueOutcome::Rejected {
                        issue_id: item.issue_id,
                        error,
                    });
                }
            }
        }
        outcomes
    }

    /// Locks every issue and material of the batch, validates all returns
    /// against staged copies, and only then writes them back.
    async fn run_atomic(
        &self,
        store: &WarehouseStore,
        event_sender: &EventSender,
    ) -> Result<Vec<IssueOutcome>, ServiceError> {
        let issue_ids: BTreeSet<Uuid> = self.returns.iter().map(|r| r.issue_id).collect();
        let issue_handles = issue_ids
            .iter()
            .map(|id| Ok((*id, store.issue_handle(*id)?)))
            .collect::<Result<Vec<_>, ServiceError>>()?;

        let mut entries = HashMap::with_capacity(issue_handles.len());
        for (id, handle) in &issue_handles {
            entries.insert(*id, handle.lock().await);
        }

        let material_ids: BTreeSet<Uuid> =
            entries.values().map(|e| e.issue.material_id()).collect();
        let material_handles = material_ids
            .iter()
            .map(|id| Ok((*id, store.material_handle(*id)?)))
            .collect::<Result<Vec<_>, ServiceError>>()?;

        let mut materials = BTreeMap::new();
        for (id, handle) in &material_handles {
            materials.insert(*id, handle.lock().await);
        }

        let mut staged: BTreeMap<Uuid, Material> = materials
            .iter()
            .map(|(id, guard)| (*id, (**guard).clone()))
            .collect();
        let mut planned = Vec::with_capacity(self.returns.len());

        for item in &self.returns {
            let entry = entries.get(&item.issue_id).ok_or_else(|| missing("issue", item.issue_id))?;
            ensure_issue_in_job(&entry.issue, self.job_id)?;

            let material_id = entry.issue.material_id();
            let material = staged
                .get_mut(&material_id)
                .ok_or_else(|| missing("material", material_id))?;
            let outcome = ledger::reconcile(
                &entry.issue,
                entry.reconciliation.as_ref(),
                material,
                &item.input,
            )?;
            let new_available = material.apply_delta(&outcome.stock_delta)?;

            planned.push((
                item.issue_id,
                AppliedReconciliation {
                    outcome,
                    new_available,
                },
            ));
        }

        for (id, material) in staged {
            if let Some(guard) = materials.get_mut(&id) {
                **guard = material;
            }
        }
        for (issue_id, applied) in &planned {
            if let Some(entry) = entries.get_mut(issue_id) {
                entry.record(&applied.outcome);
            }
        }
        drop(materials);
        drop(entries);

        let mut outcomes = Vec::with_capacity(planned.len());
        for (issue_id, applied) in planned {
            publish_reconciliation(event_sender, &applied).await;
            outcomes.push(IssueOutcome::Reconciled {
                issue_id,
                outcome: applied.outcome,
            });
        }
        Ok(outcomes)
    }
}

fn missing(kind: &str, id: Uuid) -> ServiceError {
    ServiceError::InternalError(format!("Locked {} {} missing from batch", kind, id))
}

#[async_trait]
impl Command for CompleteJobCommand {
    type Result = JobCompletionReport;

    #[instrument(
        skip(self, store, event_sender),
        fields(job_id = %self.job_id, policy = %self.policy)
    )]
    async fn execute(
        &self,
        store: Arc<WarehouseStore>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        self.ensure_unique_issues()?;

        let outcomes = match self.policy {
            BatchPolicy::BestEffort => self.run_best_effort(&store, &event_sender).await,
            BatchPolicy::Atomic => self
                .run_atomic(&store, &event_sender)
                .await
                .map_err(|e| {
                    warn!(job_id = %self.job_id, code = e.code(), "Job completion aborted: {}", e);
                    e
                })?,
        };

        let report = JobCompletionReport {
            job_id: self.job_id,
            policy: self.policy,
            outcomes,
        };

        info!(
            job_id = %self.job_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Job completion processed"
        );

        Ok(report)
    }
}

pub mod complete_job_command;
pub mod reconcile_issue_command;

pub use complete_job_command::{CompleteJobCommand, IssueOutcome, IssueReturn, JobCompletionReport};
pub use reconcile_issue_command::ReconcileIssueCommand;

pub mod commit_allocation_command;

pub use commit_allocation_command::CommitAllocationCommand;

// Pure transition logic
pub mod allocator;
pub mod ledger;

// Facades over the store and event channel
pub mod allocations;
pub mod returns;

pub use allocations::AllocationService;
pub use returns::ReturnService;

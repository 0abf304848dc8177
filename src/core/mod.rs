mod allocation;
mod engine;
mod types;
mod validate;

pub use allocation::{AllocationSummary, summarize_allocation};
pub use engine::{
    apply_returns, project_year, refill_cash, run_projection, summarize_projection,
    withdraw_waterfall,
};
pub use types::{
    BucketBalances, BucketPolicy, BucketTag, Holding, HouseholdProfile, ProjectionSummary,
    RebalanceAction, SpouseProfile, WithdrawalSource, YearlyProjection,
};
pub use validate::{InputError, validate_inputs};

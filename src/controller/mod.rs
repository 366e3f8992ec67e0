pub mod context;
pub mod error;
pub mod reconciler;
pub mod status;
pub mod validation;

pub use context::Context;
pub use error::{BackoffConfig, Error, FailureTracker, Result};
pub use reconciler::{
    MembersOutcome, collect_members, desired_service_names, error_policy, exposed_members,
    reconcile, requeue_after, stale_services,
};
pub use status::{
    ConditionBuilder, StatusManager, failed_status, member_phase, members_status, spec_changed,
};
pub use validation::{MAX_REPLSET_SIZE, MIN_REPLSET_SIZE, exposure_warnings, validate_spec};

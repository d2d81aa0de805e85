//! Guest identity lifecycle.
//!
//! - [`resolver`]: decide who is making a request, creating a guest with a
//!   starter board when nobody is
//! - [`pipeline`]: hand a guest's boards over (or throw them away) when the
//!   guest logs in with a registered account
//! - [`sweep`]: offline reclamation of stale and never-used guests

pub mod pipeline;
pub mod resolver;
pub mod sweep;

pub use pipeline::{
    GuestHandOff, IdentityMergeService, LoginDetails, LoginEvent, LoginOutcome, MigrationContext,
    Stage,
};
pub use resolver::{
    CredentialCheck, FixedIdentity, GuestIdentityResolver, NoCredentials, Resolution, Resolved,
    SessionLogin,
};
pub use sweep::{SweepOptions, SweepReport, run_sweep, run_sweep_locked};

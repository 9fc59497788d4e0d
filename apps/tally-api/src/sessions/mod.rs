//! Logged-in sessions: credential records, the shared registry and the
//! background refresher that keeps their tokens fresh.

pub mod record;
pub mod refresher;
pub mod registry;

pub use record::{CredentialRecord, CredentialState};
pub use refresher::{CredentialRefresher, SweepReport};
pub use registry::{HydrationReport, SessionRegistry};

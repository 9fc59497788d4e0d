pub mod ledger;
pub mod sync;

pub use ledger::{VoteDelta, VoteLedger};
pub use sync::spawn_vote_sync;

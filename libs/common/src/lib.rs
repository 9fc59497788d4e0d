pub mod events;
pub mod id;

pub use events::VoteUpdate;
pub use id::PrefixedId;

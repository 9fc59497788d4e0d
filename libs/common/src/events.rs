//! Wire format of the real-time vote channel.

use serde::{Deserialize, Serialize};

/// One vote-count change, sent server → client as a JSON text frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteUpdate {
    pub track_id: String,
    pub votes: i64,
}
